//! Utility functions shared across the pipeline.
//!
//! ## Modules
//!
//! - [`app_data`] - Config file location and CPU detection
//! - [`encoding`] - Hex encoding of substrings
//! - [`ngram`] - Fixed-length byte window counting
//! - [`progress`] - Phase spinners (no-op without the `progress` feature)
//!
//! ```no_run
//! use substr_miner::utils::{ngram_histogram, to_hex};
//!
//! let hist = ngram_histogram(b"hello world", 3).unwrap();
//! // Keys are "hel", "ell", "llo", "lo ", ...
//! assert_eq!(to_hex(b"hel"), "68656c");
//! ```

pub mod app_data;
pub mod encoding;
pub mod ngram;
pub mod progress;

pub use app_data::*;
pub use encoding::*;
pub use ngram::*;
