use crate::error::{MinerError, Result};
use crate::extract::policy::ExtractOptions;
use crate::index::types::{Histogram, Substring};
use crate::utils::check_ngram_len;
use ahash::AHashSet;
use std::borrow::Borrow;
use std::hash::Hash;

/// Greedily merge runs of qualifying n-grams in `content` into substrings.
///
/// Scanning goes left to right over n-gram start positions. A match starts on
/// a qualifying n-gram the policy admits and grows one position at a time
/// while the policy accepts the next n-gram. A span longer than
/// `opts.min_len` is consumed whole; a shorter one is dropped and scanning
/// resumes one byte later. Spans never overlap.
///
/// Each distinct substring is reported once per buffer, at its first offset.
/// Later spans with the same bytes are still consumed but not reported.
pub fn extract_substrings<'a, K>(
    content: &'a [u8],
    n: usize,
    qualifying: &Histogram<K>,
    opts: &ExtractOptions,
) -> Result<Vec<Substring<'a>>>
where
    K: Borrow<[u8]> + Hash + Eq,
{
    check_ngram_len(content.len(), n)?;
    if qualifying.is_empty() {
        return Err(MinerError::invalid("qualifying histogram must be non-empty"));
    }

    let count_at = |pos: usize| qualifying.get(&content[pos..pos + n]).copied();
    let policy = opts.policy;
    let last_start = content.len() - n;

    let mut seen: AHashSet<&'a [u8]> = AHashSet::new();
    let mut found = Vec::new();
    let mut i = 0;

    while i <= last_start {
        let start_count = match count_at(i) {
            Some(count) if policy.admits_start(count) => count,
            _ => {
                i += 1;
                continue;
            }
        };

        let mut end = i + n;
        for j in (i + 1)..=last_start {
            match count_at(j) {
                Some(count) if policy.extends(start_count, count) => end = j + n,
                _ => break,
            }
        }

        if end - i > opts.min_len {
            let bytes = &content[i..end];
            if seen.insert(bytes) {
                found.push(Substring { offset: i, bytes });
            }
            i = end;
        } else {
            i += 1;
        }
    }

    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::policy::ExtractionPolicy;
    use proptest::prelude::*;

    fn hist(entries: &[(&[u8], u64)]) -> Histogram<Vec<u8>> {
        entries.iter().map(|(k, v)| (k.to_vec(), *v)).collect()
    }

    fn opts(policy: ExtractionPolicy, min_len: usize) -> ExtractOptions {
        ExtractOptions { policy, min_len }
    }

    #[test]
    fn test_two_uniform_runs() {
        let q = hist(&[(b"aaa", 5), (b"bbb", 5)]);
        let subs = extract_substrings(
            b"aaaaaaaabbbbbbbb",
            3,
            &q,
            &opts(ExtractionPolicy::EqualCount, 4),
        )
        .unwrap();
        assert_eq!(
            subs,
            vec![
                Substring { offset: 0, bytes: b"aaaaaaaa" },
                Substring { offset: 8, bytes: b"bbbbbbbb" },
            ]
        );
    }

    #[test]
    fn test_run_policy_crosses_count_changes() {
        let q = hist(&[(b"abc", 2), (b"bcd", 7), (b"cde", 3)]);
        let run = extract_substrings(b"xabcdey", 3, &q, &opts(ExtractionPolicy::Run, 4)).unwrap();
        assert_eq!(run, vec![Substring { offset: 1, bytes: b"abcde" }]);

        // Equal counts stop at the first count change
        let eq =
            extract_substrings(b"xabcdey", 3, &q, &opts(ExtractionPolicy::EqualCount, 2)).unwrap();
        assert_eq!(eq, vec![Substring { offset: 1, bytes: b"abc" }]);
        assert!(
            extract_substrings(b"xabcdey", 3, &q, &opts(ExtractionPolicy::EqualCount, 4))
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn test_threshold_requires_membership_count() {
        let q = hist(&[(b"abc", 9), (b"bcd", 9), (b"cde", 9), (b"def", 9)]);
        let strict = ExtractionPolicy::Threshold {
            min_count: 10,
            require_equal_counts: true,
        };
        assert!(
            extract_substrings(b"abcdef", 3, &q, &opts(strict, 4))
                .unwrap()
                .is_empty()
        );

        let lenient = ExtractionPolicy::Threshold {
            min_count: 9,
            require_equal_counts: true,
        };
        let subs = extract_substrings(b"abcdef!", 3, &q, &opts(lenient, 4)).unwrap();
        assert_eq!(subs, vec![Substring { offset: 0, bytes: b"abcdef" }]);
    }

    #[test]
    fn test_loose_threshold_ignores_equal_counts() {
        let q = hist(&[(b"abc", 10), (b"bcd", 30), (b"cde", 12)]);
        let loose = ExtractionPolicy::Threshold {
            min_count: 10,
            require_equal_counts: false,
        };
        let strict = ExtractionPolicy::Threshold {
            min_count: 10,
            require_equal_counts: true,
        };
        let subs = extract_substrings(b"abcde!", 3, &q, &opts(loose, 4)).unwrap();
        assert_eq!(subs, vec![Substring { offset: 0, bytes: b"abcde" }]);
        assert!(
            extract_substrings(b"abcde!", 3, &q, &opts(strict, 4))
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn test_short_span_retries_next_byte() {
        // "zab" qualifies but only reaches 4 bytes; "abcdef" starting one later is long enough
        let q = hist(&[(b"zab", 1), (b"abc", 2), (b"bcd", 2), (b"cde", 2), (b"def", 2)]);
        let subs =
            extract_substrings(b"zabcdef", 3, &q, &opts(ExtractionPolicy::EqualCount, 5)).unwrap();
        assert_eq!(subs, vec![Substring { offset: 1, bytes: b"abcdef" }]);
    }

    #[test]
    fn test_repeated_substring_reported_once() {
        let q = hist(&[(b"abc", 4), (b"bcd", 4), (b"cde", 4)]);
        let subs = extract_substrings(
            b"abcde..abcde..abcde",
            3,
            &q,
            &opts(ExtractionPolicy::EqualCount, 4),
        )
        .unwrap();
        assert_eq!(subs, vec![Substring { offset: 0, bytes: b"abcde" }]);
    }

    #[test]
    fn test_span_reaching_buffer_end() {
        let q = hist(&[(b"xyz", 3), (b"yzx", 3), (b"zxy", 3)]);
        let subs =
            extract_substrings(b"-xyzxyz", 3, &q, &opts(ExtractionPolicy::Run, 4)).unwrap();
        assert_eq!(subs, vec![Substring { offset: 1, bytes: b"xyzxyz" }]);
    }

    #[test]
    fn test_invalid_input() {
        let q = hist(&[(b"abc", 1)]);
        assert!(extract_substrings(b"ab", 3, &q, &ExtractOptions::default()).is_err());
        assert!(extract_substrings(b"abcd", 0, &q, &ExtractOptions::default()).is_err());

        let empty: Histogram<Vec<u8>> = Histogram::new();
        let err = extract_substrings(b"abcdef", 3, &empty, &ExtractOptions::default()).unwrap_err();
        assert!(err.to_string().contains("non-empty"));
    }

    proptest! {
        #[test]
        fn prop_spans_never_overlap(
            content in proptest::collection::vec(0u8..4, 4..400),
            keep in proptest::collection::vec(any::<bool>(), 64),
            equal in any::<bool>(),
        ) {
            // Qualify a pseudo-random subset of the 64 possible 3-grams over a 4-letter alphabet
            let mut q: Histogram<Vec<u8>> = Histogram::new();
            for (idx, &on) in keep.iter().enumerate() {
                if on {
                    let gram = vec![(idx / 16) as u8, ((idx / 4) % 4) as u8, (idx % 4) as u8];
                    q.insert(gram, (idx % 3) as u64 + 1);
                }
            }
            prop_assume!(!q.is_empty());
            let policy = if equal { ExtractionPolicy::EqualCount } else { ExtractionPolicy::Run };
            let subs = extract_substrings(&content, 3, &q, &opts(policy, 4)).unwrap();

            for pair in subs.windows(2) {
                prop_assert!(pair[0].end() <= pair[1].offset);
            }
            for sub in &subs {
                prop_assert!(sub.bytes.len() > 4);
                prop_assert!(sub.end() <= content.len());
                prop_assert_eq!(&content[sub.offset..sub.end()], sub.bytes);
            }
        }
    }
}
