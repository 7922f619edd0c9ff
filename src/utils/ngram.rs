use crate::error::{MinerError, Result};
use crate::index::types::Histogram;
use ahash::AHashSet;

/// Reject window lengths that do not fit strictly inside the buffer.
#[inline]
pub fn check_ngram_len(len: usize, n: usize) -> Result<()> {
    if n == 0 {
        return Err(MinerError::invalid("n-gram length must be greater than zero"));
    }
    if n >= len {
        return Err(MinerError::invalid(format!(
            "n-gram length must be less than the buffer length: {} >= {}",
            n, len
        )));
    }
    Ok(())
}

/// Count every overlapping window of `n` bytes in `content`.
///
/// The histogram borrows its keys from `content`; counts sum to
/// `content.len() - n + 1`.
pub fn ngram_histogram(content: &[u8], n: usize) -> Result<Histogram<&[u8]>> {
    check_ngram_len(content.len(), n)?;

    // Distinct windows are bounded by both the window count and 256^n
    let windows = content.len() - n + 1;
    let mut hist = Histogram::with_capacity(windows.min(1 << 16));
    for window in content.windows(n) {
        *hist.entry(window).or_insert(0) += 1;
    }
    Ok(hist)
}

/// Distinct windows of `n` bytes in `content`, each reported once.
///
/// Used when the corpus histogram counts files rather than occurrences.
pub fn distinct_ngrams(content: &[u8], n: usize) -> Result<AHashSet<&[u8]>> {
    check_ngram_len(content.len(), n)?;
    Ok(content.windows(n).collect())
}
