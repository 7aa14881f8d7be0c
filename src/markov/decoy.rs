//! Full decoy page fabrication.
//!
//! When no real file backs a request, an entire HTML document is generated
//! from a seed derived from the request path. Same path, same page,
//! byte for byte. Nothing is persisted.

use super::generator::TextGenerator;
use crate::rng::SeededRng;

/// Base seed for all decoy content derived from a request path.
pub(crate) fn page_seed(path: &str) -> String {
    format!("decoy::{path}")
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        None => String::new(),
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
    }
}

fn title_case(words: &[String]) -> String {
    words
        .iter()
        .map(|w| capitalize(w))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Format a run of words into capitalized, period-terminated sentences.
/// The sentence cap derives from the word count so paragraph rhythm varies
/// with paragraph length.
fn into_sentences(words: &[String]) -> String {
    if words.is_empty() {
        return String::new();
    }
    let cap = (words.len() / 3).clamp(4, 12);
    words
        .chunks(cap)
        .map(|sentence| {
            let mut text = sentence.join(" ");
            text = capitalize(&text);
            text.push('.');
            text
        })
        .collect::<Vec<_>>()
        .join(" ")
}

impl TextGenerator {
    /// Fabricate a complete HTML document for `path`.
    ///
    /// Title, paragraph count, sentence shape, and related-article links
    /// are all deterministic functions of the path-derived seed.
    pub fn decoy_page(&self, path: &str) -> String {
        let seed = page_seed(path);
        let mut rng = SeededRng::new(&seed);

        let title = title_case(&self.generate_words(3, &format!("{seed}::title"), None));

        let paragraph_count = rng.random_int(5, 31);
        let mut body = String::new();
        for p in 0..paragraph_count {
            let word_count = rng.random_int(15, 31);
            let words = self.generate_words(word_count, &format!("{seed}::p{p}"), None);
            body.push_str("    <p>");
            body.push_str(&into_sentences(&words));
            body.push_str("</p>\n");
        }

        let link_count = rng.random_int(4, 9);
        let mut related = String::new();
        for i in 0..link_count {
            let word_count = rng.random_int(4, 7);
            let words = self.generate_words(word_count, &format!("{seed}::link{i}"), None);
            let slug = words.join("-");
            related.push_str(&format!(
                "      <li><a href=\"/{slug}.html\">{}</a></li>\n",
                title_case(&words)
            ));
        }

        format!(
            "<!DOCTYPE html>\n\
             <html lang=\"en\">\n\
             <head>\n\
             <meta charset=\"utf-8\">\n\
             <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
             <title>{title}</title>\n\
             </head>\n\
             <body>\n\
             <article>\n\
             <h1>{title}</h1>\n\
             {body}\
             </article>\n\
             <aside>\n\
             <h2>Related Articles</h2>\n\
             <ul>\n\
             {related}\
             </ul>\n\
             </aside>\n\
             </body>\n\
             </html>\n"
        )
    }
}
