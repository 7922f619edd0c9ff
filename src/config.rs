use crate::error::{MinerError, Result};
use crate::extract::policy::{ExtractOptions, ExtractionPolicy, DEFAULT_MIN_LEN, SIMPLE_MIN_LEN};
use crate::index::rank::Selection;
use crate::utils::{default_config_path, num_cpus};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// What the run produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum OutputMode {
    /// Ranked distinct substrings with the number of files containing each
    #[default]
    Aggregate,
    /// One row per extracted substring occurrence, plus a content store
    Tabular,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum OutputFormat {
    Json,
    #[default]
    Tsv,
}

/// What the corpus n-gram histogram counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum NgramCounting {
    /// Number of distinct files containing the n-gram
    #[default]
    DistinctFiles,
    /// Total number of windows across all files
    Occurrences,
}

/// Settings for one mining run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinerConfig {
    /// N-gram length in bytes
    #[serde(default = "default_ngram_len")]
    pub ngram_len: usize,

    /// Worker count; 0 means one per detected core
    #[serde(default)]
    pub workers: usize,

    /// Per-partition time limit in seconds
    #[serde(default)]
    pub task_timeout_secs: Option<u64>,

    #[serde(default)]
    pub policy: ExtractionPolicy,

    #[serde(default)]
    pub selection: Selection,

    /// N-grams counted this many times or fewer never qualify
    #[serde(default = "default_rank_floor")]
    pub rank_floor: u64,

    /// Exclusive lower bound on substring length; None picks the mode default
    #[serde(default)]
    pub min_substring_len: Option<usize>,

    #[serde(default)]
    pub counting: NgramCounting,

    #[serde(default)]
    pub mode: OutputMode,

    #[serde(default)]
    pub format: OutputFormat,

    /// Where tabular runs store substring content, one file per hash
    #[serde(default)]
    pub content_dir: Option<PathBuf>,

    /// Re-hash existing content files instead of trusting their names
    #[serde(default)]
    pub verify_existing_content: bool,

    /// Histograms larger than this are ranked with the partitioned merge sort
    #[serde(default = "default_partitioned_sort_threshold")]
    pub partitioned_sort_threshold: usize,

    /// Rows shown when an aggregate run has no output file
    #[serde(default = "default_preview_rows")]
    pub preview_rows: usize,
}

fn default_ngram_len() -> usize {
    3
}

fn default_rank_floor() -> u64 {
    1
}

fn default_partitioned_sort_threshold() -> usize {
    4 * 1024 * 1024
}

fn default_preview_rows() -> usize {
    10
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            ngram_len: default_ngram_len(),
            workers: 0,
            task_timeout_secs: None,
            policy: ExtractionPolicy::default(),
            selection: Selection::default(),
            rank_floor: default_rank_floor(),
            min_substring_len: None,
            counting: NgramCounting::default(),
            mode: OutputMode::default(),
            format: OutputFormat::default(),
            content_dir: None,
            verify_existing_content: false,
            partitioned_sort_threshold: default_partitioned_sort_threshold(),
            preview_rows: default_preview_rows(),
        }
    }
}

impl MinerConfig {
    /// Load from `path`, else from the user config file if present, else defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match default_config_path() {
                Some(p) if p.is_file() => p,
                _ => return Ok(Self::default()),
            },
        };
        let content = fs::read_to_string(&path).map_err(|e| MinerError::io(&path, e))?;
        serde_json::from_str(&content).map_err(|e| {
            MinerError::invalid(format!("cannot parse config {}: {}", path.display(), e))
        })
    }

    /// Reject out-of-range values and option combinations that cannot run
    pub fn validate(&self) -> Result<()> {
        if self.ngram_len == 0 {
            return Err(MinerError::invalid("n-gram length must be greater than zero"));
        }
        if self.task_timeout_secs == Some(0) {
            return Err(MinerError::invalid("task timeout must be at least one second"));
        }
        self.selection.validate()?;
        if self.mode == OutputMode::Aggregate {
            if let Some(dir) = &self.content_dir {
                return Err(MinerError::ConfigConflict(format!(
                    "content directory {} requires tabular mode",
                    dir.display()
                )));
            }
        }
        if let Some(dir) = &self.content_dir {
            if !dir.is_dir() {
                return Err(MinerError::invalid(format!(
                    "content directory {} is not a directory",
                    dir.display()
                )));
            }
        }
        Ok(())
    }

    /// Worker count with 0 resolved to the CPU count
    pub fn effective_workers(&self) -> usize {
        if self.workers == 0 {
            num_cpus()
        } else {
            self.workers
        }
    }

    pub fn task_timeout(&self) -> Option<Duration> {
        self.task_timeout_secs.map(Duration::from_secs)
    }

    /// Length bound with the mode default filled in
    pub fn effective_min_substring_len(&self) -> usize {
        self.min_substring_len.unwrap_or(match self.mode {
            OutputMode::Aggregate => SIMPLE_MIN_LEN,
            OutputMode::Tabular => DEFAULT_MIN_LEN,
        })
    }

    pub fn extract_options(&self) -> ExtractOptions {
        ExtractOptions {
            policy: self.policy,
            min_len: self.effective_min_substring_len(),
        }
    }
}
