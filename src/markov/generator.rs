//! Deterministic word-sequence generation over the corpus index.

use super::index::{MarkovIndex, MarkovStats};
use crate::rng::SeededRng;
use std::collections::HashSet;
use std::sync::{Arc, RwLock};

/// Built-in vocabulary used when no corpus has been indexed. Generation
/// stays seeded and deterministic even before (or without) indexing.
const FALLBACK_WORDS: &[&str] = &[
    "content", "page", "article", "post", "update", "reading", "thoughts", "notes", "review",
    "guide", "story", "series", "archive", "topics", "ideas", "writing", "latest", "popular",
    "weekly", "journal", "essay", "draft", "feature", "summary",
];

/// Bounded retries when a candidate word was already used recently.
const MAX_REPEAT_RETRIES: usize = 3;

/// Probability of deliberately picking from the lower half (by count) of a
/// word's transitions, so output does not always ride the dominant path.
const LOW_PATH_PROBABILITY: f64 = 0.15;

/// Seeded text generator backed by a swappable corpus index.
///
/// The index is read-only on the hot path; rebuilds install a fresh index
/// atomically via [`TextGenerator::install_index`].
pub struct TextGenerator {
    index: RwLock<Arc<MarkovIndex>>,
}

impl TextGenerator {
    pub fn new(index: MarkovIndex) -> Self {
        Self {
            index: RwLock::new(Arc::new(index)),
        }
    }

    /// Current index snapshot.
    pub fn index(&self) -> Arc<MarkovIndex> {
        self.index.read().expect("index lock poisoned").clone()
    }

    /// Atomically replace the live index with a freshly built one.
    pub fn install_index(&self, index: MarkovIndex) {
        *self.index.write().expect("index lock poisoned") = Arc::new(index);
    }

    /// Diagnostic counters for the live index.
    pub fn stats(&self) -> MarkovStats {
        self.index().stats()
    }

    /// Generate exactly `count` words, deterministically from `seed`.
    ///
    /// With an empty index this falls back to the built-in word list; the
    /// not-ready state is decided once here, not scattered across call
    /// sites. Identical `(count, seed, start_word)` and index state always
    /// produce an identical sequence.
    pub fn generate_words(&self, count: usize, seed: &str, start_word: Option<&str>) -> Vec<String> {
        if count == 0 {
            return Vec::new();
        }
        let index = self.index();
        let mut rng = SeededRng::new(seed);

        if index.is_empty() {
            return (0..count)
                .map(|_| rng.pick(FALLBACK_WORDS).to_string())
                .collect();
        }

        let vocab = index.vocabulary();
        let mut words = Vec::with_capacity(count);
        let mut used: HashSet<String> = HashSet::new();

        let first = match start_word {
            Some(word) => word.to_lowercase(),
            None => vocab[rng.random_int(0, vocab.len())].clone(),
        };
        used.insert(first.clone());
        words.push(first.clone());

        let mut current = first;
        let mut stuck_positions = 0u8;

        while words.len() < count {
            let mut next = step(&index, &mut rng, &current);

            // Avoid visible repetition while the used set is still small
            // relative to the vocabulary; long sequences recycle naturally.
            if used.contains(&next) && used.len() * 5 < vocab.len() {
                let mut replaced = false;
                for _ in 0..MAX_REPEAT_RETRIES {
                    let alternative = step(&index, &mut rng, &current);
                    if !used.contains(&alternative) {
                        next = alternative;
                        replaced = true;
                        break;
                    }
                }
                if replaced {
                    stuck_positions = 0;
                } else {
                    stuck_positions += 1;
                    if stuck_positions >= 2 {
                        next = vocab[rng.random_int(0, vocab.len())].clone();
                        stuck_positions = 0;
                    }
                }
            } else {
                stuck_positions = 0;
            }

            if used.len() > vocab.len() / 5 {
                used.clear();
            }
            used.insert(next.clone());
            words.push(next.clone());
            current = next;
        }

        words
    }
}

/// One transition step from `current`, or a fresh random word at dead ends.
fn step(index: &MarkovIndex, rng: &mut SeededRng, current: &str) -> String {
    let vocab = index.vocabulary();
    let Some(transitions) = index.transitions(current) else {
        return vocab[rng.random_int(0, vocab.len())].clone();
    };

    if rng.next_f64() < LOW_PATH_PROBABILITY {
        let mut pairs: Vec<(&String, &u32)> = transitions.iter().collect();
        pairs.sort_by(|a, b| a.1.cmp(b.1).then_with(|| a.0.cmp(b.0)));
        let lower_half = (pairs.len() / 2).max(1);
        return pairs[rng.random_int(0, lower_half)].0.clone();
    }

    // Weighted draw proportional to observed counts.
    let total: u64 = transitions.values().map(|c| u64::from(*c)).sum();
    let target = (rng.next_f64() * total as f64) as u64;
    let mut accumulated = 0u64;
    for (word, count) in transitions {
        accumulated += u64::from(*count);
        if accumulated > target {
            return word.clone();
        }
    }
    // Unreachable in practice; the last pair always satisfies the walk.
    transitions
        .keys()
        .next_back()
        .cloned()
        .unwrap_or_else(|| vocab[rng.random_int(0, vocab.len())].clone())
}
