//! Word substitution over existing text and markup.
//!
//! Scrambling replaces visible words with generated ones while leaving
//! every separator byte and every piece of markup exactly as found. Each
//! word gets a position-unique sub-seed so identical surface text at
//! different positions scrambles differently.

use super::generator::TextGenerator;
use regex::Regex;
use std::sync::LazyLock;

/// Text node content: everything strictly between a `>` and a `<`.
static TEXT_NODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r">([^<>]+)<").expect("valid regex"));

/// Blocks consisting only of whitespace and HTML entity references.
static ENTITY_ONLY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:\s|&[#a-zA-Z0-9]+;)+$").expect("valid regex"));

enum Token<'a> {
    Word { text: &'a str, offset: usize },
    Separator(&'a str),
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '\''
}

fn tokenize(text: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut run_start = 0;
    let mut run_is_word: Option<bool> = None;

    for (offset, c) in text.char_indices() {
        let word = is_word_char(c);
        match run_is_word {
            Some(current) if current == word => {}
            Some(current) => {
                let run = &text[run_start..offset];
                tokens.push(if current {
                    Token::Word {
                        text: run,
                        offset: run_start,
                    }
                } else {
                    Token::Separator(run)
                });
                run_start = offset;
                run_is_word = Some(word);
            }
            None => run_is_word = Some(word),
        }
    }
    if let Some(current) = run_is_word {
        let run = &text[run_start..];
        tokens.push(if current {
            Token::Word {
                text: run,
                offset: run_start,
            }
        } else {
            Token::Separator(run)
        });
    }
    tokens
}

/// Reapply the original word's capitalization shape to a replacement.
fn apply_shape(original: &str, replacement: &str) -> String {
    let has_alpha = original.chars().any(|c| c.is_alphabetic());
    let all_upper = has_alpha
        && original.chars().count() > 1
        && original
            .chars()
            .all(|c| !c.is_alphabetic() || c.is_uppercase());
    if all_upper {
        return replacement.to_uppercase();
    }
    if original.chars().next().is_some_and(|c| c.is_uppercase()) {
        let mut chars = replacement.chars();
        return match chars.next() {
            Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
            None => String::new(),
        };
    }
    replacement.to_string()
}

impl TextGenerator {
    /// Replace every word in `text` with a generated one, preserving all
    /// whitespace and punctuation byte-for-byte.
    ///
    /// If no replacement can be generated for a slot, the original word is
    /// left in place rather than producing malformed output.
    pub fn scramble_text(&self, text: &str, seed: &str) -> String {
        let total_len = text.len();
        let mut out = String::with_capacity(text.len());
        let mut word_index = 0usize;

        for token in tokenize(text) {
            match token {
                Token::Separator(run) => out.push_str(run),
                Token::Word { text: word, offset } => {
                    let sub_seed = format!("{seed}|{word_index}|{offset}|{total_len}");
                    let replacement = self
                        .generate_words(1, &sub_seed, None)
                        .into_iter()
                        .next()
                        .filter(|r| !r.is_empty());
                    match replacement {
                        Some(r) => out.push_str(&apply_shape(word, &r)),
                        None => out.push_str(word),
                    }
                    word_index += 1;
                }
            }
        }
        out
    }

    /// Scramble only the text nodes of an HTML document, leaving all tags,
    /// attributes, and markup untouched.
    ///
    /// Whitespace-only and entity-only blocks pass through unchanged. Each
    /// block gets its own derived seed so identical text blocks at
    /// different positions scramble differently.
    pub fn scramble_html(&self, html: &str, seed: &str) -> String {
        let mut block_index = 0usize;
        TEXT_NODE_RE
            .replace_all(html, |caps: &regex::Captures<'_>| {
                let block = &caps[1];
                let ordinal = block_index;
                block_index += 1;
                if block.trim().is_empty() || ENTITY_ONLY_RE.is_match(block) {
                    return caps[0].to_string();
                }
                let block_seed = format!("{seed}#{ordinal}#{}", block.len());
                format!(">{}<", self.scramble_text(block, &block_seed))
            })
            .into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markov::index::MarkovIndex;

    fn generator() -> TextGenerator {
        TextGenerator::new(MarkovIndex::from_text(
            "<p>the quick brown fox jumps over the lazy dog again and again</p>",
        ))
    }

    fn separators(text: &str) -> Vec<String> {
        tokenize(text)
            .into_iter()
            .filter_map(|t| match t {
                Token::Separator(s) => Some(s.to_string()),
                Token::Word { .. } => None,
            })
            .collect()
    }

    #[test]
    fn separators_survive_byte_for_byte() {
        let generator = generator();
        let text = "Hello, world!  This -- is\tpunctuated... right?";
        let scrambled = generator.scramble_text(text, "seed");
        assert_eq!(separators(text), separators(&scrambled));
        assert_eq!(
            tokenize(text).len(),
            tokenize(&scrambled).len(),
            "token structure must be preserved"
        );
    }

    #[test]
    fn capitalization_shape_is_reapplied() {
        let generator = generator();

        let title = generator.scramble_text("Hello", "seed");
        let first = title.chars().next().unwrap();
        assert!(first.is_uppercase());
        assert!(title.chars().skip(1).all(|c| !c.is_uppercase()));

        let shout = generator.scramble_text("HELLO", "seed");
        assert!(shout.chars().all(|c| !c.is_alphabetic() || c.is_uppercase()));

        let plain = generator.scramble_text("hello", "seed");
        assert!(plain.chars().all(|c| !c.is_uppercase()));
    }

    #[test]
    fn repeated_words_get_distinct_substitutions() {
        let generator = generator();
        let scrambled = generator.scramble_text("value value value value value value", "seed");
        let words: Vec<&str> = scrambled.split(' ').collect();
        assert_eq!(words.len(), 6);
        // Position-unique sub-seeds make a full run of identical
        // replacements effectively impossible.
        assert!(words.iter().any(|w| *w != words[0]));
    }

    #[test]
    fn determinism_over_full_text() {
        let generator = generator();
        let text = "Some readable sentence, with punctuation.";
        assert_eq!(
            generator.scramble_text(text, "seed"),
            generator.scramble_text(text, "seed")
        );
    }

    #[test]
    fn html_tags_are_immune() {
        let generator = generator();
        let html = "<p class='x'>Hello world</p>";
        let scrambled = generator.scramble_html(html, "seed");
        assert!(scrambled.starts_with("<p class='x'>"));
        assert!(scrambled.ends_with("</p>"));
        assert_ne!(scrambled, html);
    }

    #[test]
    fn whitespace_and_entity_blocks_pass_through() {
        let generator = generator();
        let html = "<div>\n  </div><span>&amp;&nbsp;</span>";
        assert_eq!(generator.scramble_html(html, "seed"), html);
    }

    #[test]
    fn identical_blocks_scramble_differently() {
        let generator = generator();
        let html = "<p>same words here</p><p>same words here</p>";
        let scrambled = generator.scramble_html(html, "seed");
        let blocks: Vec<&str> = TEXT_NODE_RE
            .captures_iter(&scrambled)
            .map(|c| c.get(1).unwrap().as_str())
            .collect();
        assert_eq!(blocks.len(), 2);
        assert_ne!(blocks[0], blocks[1]);
    }

    #[test]
    fn empty_generator_leaves_structure_intact() {
        let generator = TextGenerator::new(MarkovIndex::empty());
        let text = "Fallback words, still deterministic!";
        let scrambled = generator.scramble_text(text, "seed");
        assert_eq!(separators(text), separators(&scrambled));
    }
}
