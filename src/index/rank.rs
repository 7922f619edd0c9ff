//! Ranking histograms into descending `(key, count)` lists.
//!
//! The default path is a plain stable sort. [`par_ranked_by`] splits the
//! entries into one run per worker, merge-sorts the runs in parallel and
//! k-way merges them; it exists for histograms too large to sort comfortably
//! in one piece and yields the same order as [`ranked_by`].

use crate::error::{MinerError, Result};
use crate::harness::MapReduce;
use crate::index::types::{Histogram, RankedList};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::hash::Hash;

/// Comparator over `(key, count)` entries
pub trait EntryOrder<K>: Fn(&(K, u64), &(K, u64)) -> Ordering {}
impl<K, F: Fn(&(K, u64), &(K, u64)) -> Ordering> EntryOrder<K> for F {}

/// Count descending, then key ascending
pub fn by_count<K: Ord>(a: &(K, u64), b: &(K, u64)) -> Ordering {
    b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0))
}

/// Count descending, then longer substrings first, then bytes ascending
pub fn by_count_then_len(a: &(Vec<u8>, u64), b: &(Vec<u8>, u64)) -> Ordering {
    b.1.cmp(&a.1)
        .then_with(|| b.0.len().cmp(&a.0.len()))
        .then_with(|| a.0.cmp(&b.0))
}

/// Entries with `count > min_t`, unsorted
fn above_floor<K>(hist: Histogram<K>, min_t: u64) -> Vec<(K, u64)> {
    hist.into_iter().filter(|&(_, count)| count > min_t).collect()
}

/// Rank by count descending with ties broken by key
pub fn ranked<K: Ord>(hist: Histogram<K>, min_t: u64) -> RankedList<K> {
    ranked_by(hist, min_t, by_count)
}

/// Rank with a caller-supplied order; entries with `count <= min_t` are dropped
pub fn ranked_by<K, F: EntryOrder<K>>(hist: Histogram<K>, min_t: u64, order: F) -> RankedList<K> {
    let mut entries = above_floor(hist, min_t);
    entries.sort_by(|a, b| order(a, b));
    entries
}

/// Partitioned variant of [`ranked_by`] running on the harness pool
pub fn par_ranked_by<K, F>(
    hist: Histogram<K>,
    min_t: u64,
    harness: &MapReduce,
    order: F,
) -> RankedList<K>
where
    K: Send,
    F: EntryOrder<K> + Sync,
{
    let entries = above_floor(hist, min_t);
    let chunk = entries.len().div_ceil(harness.workers()).max(1);

    let mut runs: Vec<Vec<(K, u64)>> = Vec::with_capacity(harness.workers());
    let mut rest = entries.into_iter();
    loop {
        let run: Vec<_> = rest.by_ref().take(chunk).collect();
        if run.is_empty() {
            break;
        }
        runs.push(run);
    }

    let sorted: Vec<Vec<(K, u64)>> = harness.install(|| {
        runs.into_par_iter()
            .map(|run| merge_sort_by(run, &order))
            .collect()
    });
    kway_merge(sorted, &order)
}

/// Top-down merge sort; stable
pub fn merge_sort_by<T, F>(mut items: Vec<T>, cmp: &F) -> Vec<T>
where
    F: Fn(&T, &T) -> Ordering,
{
    if items.len() <= 1 {
        return items;
    }
    let right = items.split_off(items.len() / 2);
    let left = merge_sort_by(items, cmp);
    let right = merge_sort_by(right, cmp);
    kway_merge(vec![left, right], cmp)
}

/// Merge sorted runs into one sorted list.
///
/// Equal heads are taken from the earliest run, which keeps the merge stable.
pub fn kway_merge<T, F>(runs: Vec<Vec<T>>, cmp: &F) -> Vec<T>
where
    F: Fn(&T, &T) -> Ordering,
{
    let total = runs.iter().map(Vec::len).sum();
    // (current head, rest of the run), in run order
    let mut heads: Vec<(T, std::vec::IntoIter<T>)> = runs
        .into_iter()
        .filter_map(|run| {
            let mut rest = run.into_iter();
            rest.next().map(|head| (head, rest))
        })
        .collect();
    let mut out = Vec::with_capacity(total);

    while !heads.is_empty() {
        let mut best = 0;
        for idx in 1..heads.len() {
            if cmp(&heads[idx].0, &heads[best].0) == Ordering::Less {
                best = idx;
            }
        }
        match heads[best].1.next() {
            Some(next) => out.push(std::mem::replace(&mut heads[best].0, next)),
            None => {
                let (last, _) = heads.remove(best);
                out.push(last);
            }
        }
    }

    debug_assert_eq!(out.len(), total);
    out
}

/// How the qualifying n-gram set is chosen from the ranked corpus histogram
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "kind")]
pub enum Selection {
    /// The highest-ranked `floor(len * ratio)` entries
    TopFraction { ratio: f64 },
    /// Every entry with `count > threshold`
    MinCount { threshold: u64 },
}

impl Default for Selection {
    fn default() -> Self {
        Selection::TopFraction { ratio: 0.25 }
    }
}

impl Selection {
    pub fn validate(&self) -> Result<()> {
        match *self {
            Selection::TopFraction { ratio } if !(ratio > 0.0 && ratio <= 1.0) => Err(
                MinerError::invalid(format!("top fraction must be in (0, 1], got {}", ratio)),
            ),
            _ => Ok(()),
        }
    }

    /// Pick the qualifying entries from a list ranked by count descending
    pub fn select<K: Hash + Eq>(&self, ranked: RankedList<K>) -> Histogram<K> {
        match *self {
            Selection::TopFraction { ratio } => {
                // tolerate float error such as 0.29 * 100 = 28.999...
                let keep = ((ranked.len() as f64) * ratio + 1e-9).floor() as usize;
                ranked.into_iter().take(keep).collect()
            }
            Selection::MinCount { threshold } => ranked
                .into_iter()
                .filter(|&(_, count)| count > threshold)
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn hist_of(entries: &[(&str, u64)]) -> Histogram<String> {
        entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_ranked_descending_with_floor() {
        let hist = hist_of(&[("a", 1), ("b", 5), ("c", 3), ("d", 5), ("e", 0)]);
        let list = ranked(hist, 1);
        let keys: Vec<&str> = list.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["b", "d", "c"]);
    }

    #[test]
    fn test_ranked_zero_floor_keeps_positive_counts() {
        let hist = hist_of(&[("a", 1), ("b", 0)]);
        assert_eq!(ranked(hist, 0), vec![("a".to_string(), 1)]);
    }

    #[test]
    fn test_substring_order_prefers_longer() {
        let hist: Histogram<Vec<u8>> = [
            (b"short".to_vec(), 4),
            (b"much longer".to_vec(), 4),
            (b"top".to_vec(), 9),
        ]
        .into_iter()
        .collect();
        let list = ranked_by(hist, 0, by_count_then_len);
        assert_eq!(list[0].0, b"top");
        assert_eq!(list[1].0, b"much longer");
        assert_eq!(list[2].0, b"short");
    }

    #[test]
    fn test_merge_sort_is_stable() {
        let items = vec![(3, 'a'), (1, 'b'), (3, 'c'), (2, 'd'), (1, 'e')];
        let sorted = merge_sort_by(items, &|a: &(i32, char), b: &(i32, char)| a.0.cmp(&b.0));
        assert_eq!(sorted, vec![(1, 'b'), (1, 'e'), (2, 'd'), (3, 'a'), (3, 'c')]);
    }

    #[test]
    fn test_kway_merge_handles_empty_runs() {
        let runs = vec![vec![1, 4, 9], vec![], vec![2, 3], vec![10]];
        assert_eq!(kway_merge(runs, &|a: &i32, b: &i32| a.cmp(b)), vec![1, 2, 3, 4, 9, 10]);
        assert!(kway_merge(Vec::<Vec<i32>>::new(), &|a: &i32, b: &i32| a.cmp(b)).is_empty());
    }

    #[test]
    fn test_partitioned_matches_plain() {
        let hist: Histogram<u32> = (0..1000u32).map(|k| (k, (k * 7919 % 37) as u64)).collect();
        let plain = ranked(hist.clone(), 2);
        for workers in [1, 3, 8] {
            let harness = MapReduce::new(workers, None).unwrap();
            assert_eq!(par_ranked_by(hist.clone(), 2, &harness, by_count), plain);
        }
    }

    #[test]
    fn test_partitioned_substring_order_matches_plain() {
        // Many equal counts so the length and byte tiebreaks decide most pairs
        let hist: Histogram<Vec<u8>> = (0..600u32)
            .map(|k| {
                let len = 1 + (k % 9) as usize;
                let bytes: Vec<u8> = (0..len).map(|i| ((k as usize * 31 + i) % 251) as u8).collect();
                (bytes, (k % 4) as u64 + 1)
            })
            .collect();
        let plain = ranked_by(hist.clone(), 1, by_count_then_len);
        for workers in [1, 2, 5] {
            let harness = MapReduce::new(workers, None).unwrap();
            assert_eq!(par_ranked_by(hist.clone(), 1, &harness, by_count_then_len), plain);
        }
    }

    #[test]
    fn test_top_fraction_selects_exact_count() {
        // 100 entries with distinct counts 1..=100
        let hist: Histogram<u32> = (1..=100u32).map(|k| (k, k as u64)).collect();
        let selected = Selection::TopFraction { ratio: 0.25 }.select(ranked(hist, 0));
        assert_eq!(selected.len(), 25);
        assert!(selected.keys().all(|&k| k > 75));
    }

    #[test]
    fn test_top_fraction_ties_break_by_key() {
        // All counts equal: the 25 smallest keys are chosen
        let hist: Histogram<u32> = (0..100u32).map(|k| (k, 7)).collect();
        let selected = Selection::TopFraction { ratio: 0.25 }.select(ranked(hist, 0));
        assert_eq!(selected.len(), 25);
        assert!(selected.keys().all(|&k| k < 25));
    }

    #[test]
    fn test_min_count_selection() {
        let hist = hist_of(&[("a", 30), ("b", 31), ("c", 100)]);
        let selected = Selection::MinCount { threshold: 30 }.select(ranked(hist, 0));
        assert_eq!(selected.len(), 2);
        assert!(!selected.contains_key("a"));
    }

    #[test]
    fn test_selection_validation() {
        assert!(Selection::TopFraction { ratio: 0.0 }.validate().is_err());
        assert!(Selection::TopFraction { ratio: 1.5 }.validate().is_err());
        assert!(Selection::TopFraction { ratio: f64::NAN }.validate().is_err());
        assert!(Selection::TopFraction { ratio: 1.0 }.validate().is_ok());
        assert!(Selection::MinCount { threshold: 0 }.validate().is_ok());
    }

    proptest! {
        #[test]
        fn prop_ranking_is_monotone_and_idempotent(
            entries in proptest::collection::hash_map(any::<u16>(), 0u64..50, 0..300),
            min_t in 0u64..5,
        ) {
            let hist: Histogram<u16> = entries.into_iter().collect();
            let list = ranked(hist, min_t);
            prop_assert!(list.windows(2).all(|w| w[0].1 >= w[1].1));
            prop_assert!(list.iter().all(|&(_, c)| c > min_t));

            let again = ranked(list.iter().copied().collect(), min_t);
            prop_assert_eq!(again, list);
        }
    }
}
