//! # substr-miner - common substrings across binary corpora
//!
//! Finds byte sequences shared by many files of a corpus and ranks them by
//! prevalence, as raw material for detection signatures. The approach is
//! approximate and greedy: it never aligns files, it only counts.
//!
//! ## Architecture
//!
//! - [`utils`] - N-gram counting, hex encoding, progress spinners
//! - [`extract`] - Greedy merging of qualifying n-grams into substrings
//! - [`harness`] - Partition / parallel map / fold over a worker pool
//! - [`index`] - Ranking, content store and the end-to-end [`index::Miner`]
//! - [`output`] - JSON / TSV reports and the terminal preview
//! - [`config`] - Run settings, loadable from JSON
//!
//! ## Quick Start
//!
//! ```ignore
//! use substr_miner::config::MinerConfig;
//! use substr_miner::index::{collect_files, MineOutput, Miner};
//! use std::path::Path;
//!
//! let files = collect_files(Path::new("/samples"), "*", false).unwrap();
//! let miner = Miner::new(MinerConfig::default()).unwrap();
//! let (output, summary) = miner.run(&files).unwrap();
//!
//! if let MineOutput::Aggregate(list) = output {
//!     for (bytes, count) in list.iter().take(10) {
//!         println!("{}\t{}", count, substr_miner::utils::to_hex(bytes));
//!     }
//! }
//! ```
//!
//! ## Pipeline
//!
//! 1. **N-gram pass** - every file is split into overlapping windows and the
//!    per-file results are summed into one corpus histogram
//! 2. **Selection** - the histogram is ranked and the top fraction (or every
//!    n-gram above a count) becomes the qualifying set
//! 3. **Extraction** - runs of qualifying n-grams are merged into substrings
//! 4. **Report** - substrings are ranked by file count, or hashed into a
//!    content store with one occurrence row per hit

pub mod config;
pub mod error;
pub mod extract;
pub mod harness;
pub mod index;
pub mod output;
pub mod utils;

pub use error::{MinerError, Result};
