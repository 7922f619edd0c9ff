//! Approximate common-substring extraction from qualifying n-grams.

pub mod policy;
pub mod substrings;

pub use policy::{ExtractOptions, ExtractionPolicy};
pub use substrings::extract_substrings;
