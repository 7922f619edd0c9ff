//! End-to-end mining pipeline.
//!
//! 1. Count n-grams in every file (parallel) and merge into one histogram
//! 2. Rank the histogram and select the qualifying n-grams
//! 3. Extract substrings from every file against that set (parallel)
//! 4. Either rank distinct substrings by file count (aggregate mode) or
//!    hash them into a [`ContentStore`] with one occurrence row each (tabular mode)

use crate::config::{MinerConfig, NgramCounting, OutputMode};
use crate::error::{MinerError, Result};
use crate::extract::extract_substrings;
use crate::harness::MapReduce;
use crate::index::rank::{by_count, by_count_then_len, par_ranked_by, ranked, ranked_by};
use crate::index::store::ContentStore;
use crate::index::types::{ContentHash, Histogram, Ngram, RankedList};
use crate::utils::progress::{finish_phase, phase_spinner};
use crate::utils::{distinct_ngrams, ngram_histogram};
use globset::Glob;
use ignore::WalkBuilder;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Result of a mining run
#[derive(Debug)]
pub enum MineOutput {
    /// Distinct substrings ranked by the number of files containing them
    Aggregate(RankedList<Vec<u8>>),
    /// Deduplicated content and one occurrence row per extracted substring
    Tabular(ContentStore),
}

/// Counters reported at the end of a run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub files: usize,
    pub bytes_read: u64,
    pub distinct_ngrams: usize,
    pub qualifying_ngrams: usize,
    pub distinct_substrings: usize,
    pub occurrences: usize,
}

/// Substrings found in one file, ready to be hashed on the main thread
struct FileSubstrings {
    file_hash: ContentHash,
    substrings: Vec<(Vec<u8>, usize)>,
}

/// List corpus files under `dir` whose relative path matches `pattern`.
///
/// Hidden and git-ignored files are included. Paths are sorted so partitions
/// are the same from run to run.
pub fn collect_files(dir: &Path, pattern: &str, recursive: bool) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(MinerError::invalid(format!(
            "{} is not a directory",
            dir.display()
        )));
    }
    let matcher = Glob::new(pattern)
        .map_err(|e| MinerError::invalid(format!("bad glob {:?}: {}", pattern, e)))?
        .compile_matcher();

    let walker = WalkBuilder::new(dir)
        .standard_filters(false)
        .max_depth(if recursive { None } else { Some(1) })
        .build();

    let mut files = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|e| {
            let io = e
                .into_io_error()
                .unwrap_or_else(|| std::io::Error::other("directory walk failed"));
            MinerError::io(dir, io)
        })?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let rel = path.strip_prefix(dir).unwrap_or(path);
        if matcher.is_match(rel) {
            files.push(path.to_path_buf());
        }
    }
    files.sort();
    Ok(files)
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| MinerError::io(path, e))
}

/// Add `by` to `key`, allocating an owned key only on first sight
fn bump_owned(hist: &mut Histogram<Vec<u8>>, key: &[u8], by: u64) {
    match hist.get_mut(key) {
        Some(count) => *count += by,
        None => {
            hist.insert(key.to_vec(), by);
        }
    }
}

/// Runs the pipeline with one configuration and one worker pool
pub struct Miner {
    config: MinerConfig,
    harness: MapReduce,
    quiet: bool,
}

impl Miner {
    pub fn new(config: MinerConfig) -> Result<Self> {
        config.validate()?;
        let harness = MapReduce::new(config.effective_workers(), config.task_timeout())?;
        Ok(Self {
            config,
            harness,
            quiet: false,
        })
    }

    /// Suppress progress spinners
    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    /// Corpus-wide n-gram histogram plus the size of each file read
    pub fn count_ngrams(&self, files: &[PathBuf]) -> Result<(Histogram<Ngram>, Vec<u64>)> {
        let n = self.config.ngram_len;
        let counting = self.config.counting;

        self.harness.map_merge(files, move |part| {
            part.try_fold(
                (Histogram::new(), Vec::new()),
                |(mut hist, mut sizes): (Histogram<Ngram>, Vec<u64>), path| {
                    let content = read_file(path)?;
                    match counting {
                        NgramCounting::DistinctFiles => {
                            let grams = distinct_ngrams(&content, n).map_err(|e| e.in_file(path))?;
                            for gram in grams {
                                bump_owned(&mut hist, gram, 1);
                            }
                        }
                        NgramCounting::Occurrences => {
                            let grams = ngram_histogram(&content, n).map_err(|e| e.in_file(path))?;
                            for (gram, count) in grams {
                                bump_owned(&mut hist, gram, count);
                            }
                        }
                    }
                    sizes.push(content.len() as u64);
                    Ok((hist, sizes))
                },
            )
        })
    }

    /// Rank the corpus histogram and keep the qualifying n-grams
    pub fn select_qualifying(&self, hist: Histogram<Ngram>) -> Result<Histogram<Ngram>> {
        let distinct = hist.len();
        let floor = self.config.rank_floor;
        let ranked_grams = if distinct > self.config.partitioned_sort_threshold {
            debug!(distinct, "using partitioned sort for n-grams");
            par_ranked_by(hist, floor, &self.harness, by_count)
        } else {
            ranked(hist, floor)
        };
        let qualifying = self.config.selection.select(ranked_grams);
        if qualifying.is_empty() {
            return Err(MinerError::invalid(format!(
                "no n-gram qualifies: {} distinct n-grams, none left after ranking with floor {} and {:?}",
                distinct, floor, self.config.selection
            )));
        }
        Ok(qualifying)
    }

    /// Distinct substrings ranked by the number of files they were extracted from
    pub fn aggregate_substrings(
        &self,
        files: &[PathBuf],
        qualifying: &Arc<Histogram<Ngram>>,
    ) -> Result<RankedList<Vec<u8>>> {
        let n = self.config.ngram_len;
        let opts = self.config.extract_options();
        let qualifying = Arc::clone(qualifying);

        let hist: Histogram<Vec<u8>> = self.harness.map_merge(files, move |part| {
            part.try_fold(Histogram::new(), |mut hist: Histogram<Vec<u8>>, path| {
                let content = read_file(path)?;
                let found = extract_substrings(&content, n, &*qualifying, &opts)
                    .map_err(|e| e.in_file(path))?;
                // each substring is reported once per file, so this counts files
                for sub in found {
                    bump_owned(&mut hist, sub.bytes, 1);
                }
                Ok(hist)
            })
        })?;

        let floor = self.config.rank_floor;
        if hist.len() > self.config.partitioned_sort_threshold {
            debug!(distinct = hist.len(), "using partitioned sort for substrings");
            Ok(par_ranked_by(hist, floor, &self.harness, by_count_then_len))
        } else {
            Ok(ranked_by(hist, floor, by_count_then_len))
        }
    }

    /// Hash every extracted substring into a content store with one row per occurrence
    pub fn tabulate_substrings(
        &self,
        files: &[PathBuf],
        qualifying: &Arc<Histogram<Ngram>>,
    ) -> Result<ContentStore> {
        let n = self.config.ngram_len;
        let opts = self.config.extract_options();
        let qualifying = Arc::clone(qualifying);

        let per_file: Vec<FileSubstrings> = self.harness.map_merge(files, move |part| {
            part.try_fold(Vec::new(), |mut out: Vec<FileSubstrings>, path| {
                let content = read_file(path)?;
                let found = extract_substrings(&content, n, &*qualifying, &opts)
                    .map_err(|e| e.in_file(path))?;
                out.push(FileSubstrings {
                    file_hash: ContentHash::of(&content),
                    substrings: found
                        .into_iter()
                        .map(|sub| (sub.bytes.to_vec(), sub.offset))
                        .collect(),
                });
                Ok(out)
            })
        })?;

        let mut store = ContentStore::new();
        for file in per_file {
            for (bytes, offset) in file.substrings {
                let substr_hash = store.put(&bytes);
                store.record(file.file_hash, substr_hash, offset as u64);
            }
        }
        Ok(store)
    }

    /// Run every phase over `files`
    pub fn run(&self, files: &[PathBuf]) -> Result<(MineOutput, RunSummary)> {
        let mut summary = RunSummary {
            files: files.len(),
            ..Default::default()
        };
        info!(
            files = files.len(),
            workers = self.harness.workers(),
            n = self.config.ngram_len,
            "mining corpus"
        );

        let start = Instant::now();
        let spinner = phase_spinner("Counting n-grams...", self.quiet);
        let (hist, sizes) = self.count_ngrams(files)?;
        summary.bytes_read = sizes.iter().sum();
        summary.distinct_ngrams = hist.len();
        finish_phase(spinner, format!("Read {} files", files.len()));
        info!(
            files = files.len(),
            distinct_ngrams = hist.len(),
            elapsed = ?start.elapsed(),
            "n-gram counting complete"
        );

        let start = Instant::now();
        let qualifying = Arc::new(self.select_qualifying(hist)?);
        summary.qualifying_ngrams = qualifying.len();
        info!(
            qualifying = qualifying.len(),
            elapsed = ?start.elapsed(),
            "n-gram selection complete"
        );

        let start = Instant::now();
        let spinner = phase_spinner("Extracting substrings...", self.quiet);
        let output = match self.config.mode {
            OutputMode::Aggregate => {
                let list = self.aggregate_substrings(files, &qualifying)?;
                summary.distinct_substrings = list.len();
                MineOutput::Aggregate(list)
            }
            OutputMode::Tabular => {
                let store = self.tabulate_substrings(files, &qualifying)?;
                summary.distinct_substrings = store.len();
                summary.occurrences = store.occurrences().len();
                MineOutput::Tabular(store)
            }
        };
        finish_phase(
            spinner,
            format!("Extracted {} substrings", summary.distinct_substrings),
        );
        info!(
            distinct_substrings = summary.distinct_substrings,
            occurrences = summary.occurrences,
            elapsed = ?start.elapsed(),
            "substring extraction complete"
        );

        Ok((output, summary))
    }
}
