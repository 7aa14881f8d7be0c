//! Word-transition index built from a corpus of reference HTML.
//!
//! The index records bigram transition counts (`word[i] -> word[i+1]`) so
//! generated text reads like the source material. Internal storage is
//! ordered (`BTreeMap`, sorted vocabulary) so that seeded generation is
//! reproducible across processes, not just within one.

use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;
use tracing::{debug, warn};

static SCRIPT_STYLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(script|style)\b[^>]*>.*?</(script|style)>").expect("valid regex")
});
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));
static WORD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[a-z0-9']+").expect("valid regex"));

/// Extract lowercase word tokens from HTML content.
///
/// Script and style blocks are removed entirely, remaining tags stripped,
/// and the visible text tokenized on `[a-z0-9']+`. Empty input yields an
/// empty vector.
pub fn extract_words(html: &str) -> Vec<String> {
    let without_scripts = SCRIPT_STYLE_RE.replace_all(html, " ");
    let text = TAG_RE.replace_all(&without_scripts, " ").to_lowercase();
    WORD_RE
        .find_iter(&text)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Diagnostic counters for a built index.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct MarkovStats {
    /// Distinct words seen anywhere in the corpus.
    pub vocabulary: usize,
    /// Distinct (word, next-word) pairs.
    pub transitions: usize,
    /// Distinct words with at least one outgoing transition.
    pub source_words: usize,
}

/// Read-only word-transition model.
///
/// Built once (or rebuilt wholesale); never mutated while in use. Callers
/// that rebuild swap in a fresh instance rather than touching a live one.
#[derive(Debug, Default)]
pub struct MarkovIndex {
    transitions: BTreeMap<String, BTreeMap<String, u32>>,
    vocabulary: Vec<String>,
}

impl MarkovIndex {
    /// Build an empty index. Generation against it uses the built-in
    /// fallback vocabulary.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build an index from a single in-memory corpus string. Used by tests
    /// and callers that already hold the reference text.
    pub fn from_text(text: &str) -> Self {
        let mut builder = IndexBuilder::default();
        builder.ingest(text);
        builder.finish()
    }

    /// Build an index by recursively walking `root` and ingesting every
    /// `.html`/`.htm` file found.
    ///
    /// Individual unreadable files or subdirectories are skipped with a
    /// warning; one bad file never aborts the build.
    pub fn build_from_dir(root: &Path) -> Self {
        let mut builder = IndexBuilder::default();
        let mut files = 0usize;
        Self::walk(root, &mut builder, &mut files);
        let index = builder.finish();
        debug!(
            root = %root.display(),
            files,
            vocabulary = index.vocabulary.len(),
            "corpus index built"
        );
        index
    }

    fn walk(dir: &Path, builder: &mut IndexBuilder, files: &mut usize) {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(error) => {
                warn!(dir = %dir.display(), %error, "skipping unreadable directory");
                return;
            }
        };
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(error) => {
                    warn!(dir = %dir.display(), %error, "skipping unreadable entry");
                    continue;
                }
            };
            let path = entry.path();
            if path.is_dir() {
                Self::walk(&path, builder, files);
                continue;
            }
            let is_html = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("html") || ext.eq_ignore_ascii_case("htm"));
            if !is_html {
                continue;
            }
            match std::fs::read_to_string(&path) {
                Ok(content) => {
                    builder.ingest(&content);
                    *files += 1;
                }
                Err(error) => {
                    warn!(file = %path.display(), %error, "skipping unreadable corpus file");
                }
            }
        }
    }

    /// True when the corpus produced no vocabulary.
    pub fn is_empty(&self) -> bool {
        self.vocabulary.is_empty()
    }

    /// Sorted vocabulary of every word seen in the corpus.
    pub fn vocabulary(&self) -> &[String] {
        &self.vocabulary
    }

    /// Outgoing transitions for a word, if any.
    pub fn transitions(&self, word: &str) -> Option<&BTreeMap<String, u32>> {
        self.transitions.get(word).filter(|t| !t.is_empty())
    }

    /// Diagnostic counters for startup logging.
    pub fn stats(&self) -> MarkovStats {
        MarkovStats {
            vocabulary: self.vocabulary.len(),
            transitions: self.transitions.values().map(|t| t.len()).sum(),
            source_words: self.transitions.len(),
        }
    }
}

#[derive(Default)]
struct IndexBuilder {
    transitions: BTreeMap<String, BTreeMap<String, u32>>,
    vocabulary: std::collections::BTreeSet<String>,
}

impl IndexBuilder {
    fn ingest(&mut self, html: &str) {
        let words = extract_words(html);
        for window in words.windows(2) {
            *self
                .transitions
                .entry(window[0].clone())
                .or_default()
                .entry(window[1].clone())
                .or_insert(0) += 1;
        }
        self.vocabulary.extend(words);
    }

    fn finish(self) -> MarkovIndex {
        MarkovIndex {
            transitions: self.transitions,
            vocabulary: self.vocabulary.into_iter().collect(),
        }
    }
}
