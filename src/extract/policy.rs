use serde::{Deserialize, Serialize};

/// Minimum membership count for the threshold policy
pub const DEFAULT_MIN_MEMBERSHIP: u64 = 10;

/// Substrings must be strictly longer than this under the threshold policy
pub const DEFAULT_MIN_LEN: usize = 8;

/// Substrings must be strictly longer than this under the run policy
pub const SIMPLE_MIN_LEN: usize = 4;

/// How a run of qualifying n-grams is grown into a substring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "kind")]
pub enum ExtractionPolicy {
    /// Extend while each following n-gram is in the qualifying set, whatever its count
    Run,
    /// Extend while each following n-gram has exactly the starting n-gram's count
    EqualCount,
    /// Start and extend only on n-grams counted at least `min_count` times,
    /// optionally also requiring the starting n-gram's count
    Threshold {
        min_count: u64,
        require_equal_counts: bool,
    },
}

impl Default for ExtractionPolicy {
    fn default() -> Self {
        ExtractionPolicy::Threshold {
            min_count: DEFAULT_MIN_MEMBERSHIP,
            require_equal_counts: true,
        }
    }
}

impl ExtractionPolicy {
    /// Can a match start on an n-gram with this count?
    #[inline]
    pub fn admits_start(&self, count: u64) -> bool {
        match *self {
            ExtractionPolicy::Run | ExtractionPolicy::EqualCount => true,
            ExtractionPolicy::Threshold { min_count, .. } => count >= min_count,
        }
    }

    /// Can a match that started on `start` grow over an n-gram with `count`?
    #[inline]
    pub fn extends(&self, start: u64, count: u64) -> bool {
        match *self {
            ExtractionPolicy::Run => true,
            ExtractionPolicy::EqualCount => count == start,
            ExtractionPolicy::Threshold {
                min_count,
                require_equal_counts,
            } => count >= min_count && (!require_equal_counts || count == start),
        }
    }
}

/// Extraction parameters shared by every file of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractOptions {
    pub policy: ExtractionPolicy,
    /// Exclusive lower bound on emitted substring length
    pub min_len: usize,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            policy: ExtractionPolicy::default(),
            min_len: DEFAULT_MIN_LEN,
        }
    }
}

impl ExtractOptions {
    /// Plain run merging with the short length bound
    pub fn simple() -> Self {
        Self {
            policy: ExtractionPolicy::Run,
            min_len: SIMPLE_MIN_LEN,
        }
    }
}
