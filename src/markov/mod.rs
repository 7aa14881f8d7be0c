//! Procedural text generation from a Markov word-transition model.
//!
//! The flow is: [`index::MarkovIndex`] mines reference HTML into bigram
//! transition counts; [`generator::TextGenerator`] draws seeded word
//! sequences from it; the scramble and decoy modules turn those sequences
//! into word-substituted or wholly fabricated pages.

pub mod decoy;
pub mod generator;
pub mod index;
pub mod scramble;

pub use generator::TextGenerator;
pub use index::{extract_words, MarkovIndex, MarkovStats};

pub(crate) use decoy::page_seed;
