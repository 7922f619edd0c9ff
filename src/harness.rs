//! Partition / parallel map / fold harness used for every corpus-wide pass.
//!
//! Items are split into at most `W` contiguous partitions, each partition is
//! handed to one task on a dedicated rayon pool, and the partial results are
//! sent back to the calling thread and folded once every task has reported. Tasks share
//! nothing mutable except a failure flag that lets siblings stop early.

use crate::error::{MinerError, Result};
use crate::index::types::{merge_histograms, Histogram};
use crate::utils::num_cpus;
use std::hash::Hash;
use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Split `items` into at most `workers` contiguous, non-empty partitions.
///
/// Partitions are `ceil(len / workers)` long with the last one taking the
/// remainder, so every item lands in exactly one partition.
pub fn partition<T>(items: &[T], workers: usize) -> Vec<&[T]> {
    if items.is_empty() {
        return Vec::new();
    }
    let chunk = items.len().div_ceil(workers.max(1));
    let parts: Vec<&[T]> = items.chunks(chunk).collect();

    let covered: usize = parts.iter().map(|p| p.len()).sum();
    assert_eq!(covered, items.len(), "partitions must cover every item");
    parts
}

/// Index ranges of the partitions [`partition`] would produce
fn partition_ranges<T>(items: &[T], workers: usize) -> Vec<Range<usize>> {
    let mut start = 0;
    partition(items, workers)
        .iter()
        .map(|part| {
            let range = start..start + part.len();
            start = range.end;
            range
        })
        .collect()
}

/// A partial result that can absorb another partial of the same shape.
///
/// Merging must be commutative and associative in content so the reduced
/// result does not depend on partition count or completion order.
pub trait Partial: Default + Send {
    fn merge(&mut self, other: Self);
}

impl<K: Hash + Eq + Send> Partial for Histogram<K> {
    fn merge(&mut self, other: Self) {
        merge_histograms(self, other);
    }
}

impl<T: Send> Partial for Vec<T> {
    fn merge(&mut self, mut other: Self) {
        self.append(&mut other);
    }
}

impl<A: Partial, B: Partial> Partial for (A, B) {
    fn merge(&mut self, other: Self) {
        self.0.merge(other.0);
        self.1.merge(other.1);
    }
}

/// The slice of work handed to one task
pub struct Partition<'a, T> {
    pub index: usize,
    pub items: &'a [T],
    started: Instant,
    timeout: Option<Duration>,
    failed: &'a AtomicBool,
}

impl<T> Partition<'_, T> {
    /// Fail if this task ran past its time limit or a sibling already failed
    pub fn checkpoint(&self) -> Result<()> {
        if self.failed.load(Ordering::Relaxed) {
            return Err(MinerError::Aborted {
                partition: self.index,
            });
        }
        if let Some(limit) = self.timeout {
            let elapsed = self.started.elapsed();
            if elapsed > limit {
                return Err(MinerError::Timeout {
                    partition: self.index,
                    elapsed,
                });
            }
        }
        Ok(())
    }

    /// Fold over the items, checking the deadline before each one
    pub fn try_fold<P, F>(&self, init: P, mut f: F) -> Result<P>
    where
        F: FnMut(P, &T) -> Result<P>,
    {
        let mut acc = init;
        for item in self.items {
            self.checkpoint()?;
            acc = f(acc, item)?;
        }
        Ok(acc)
    }
}

/// Fixed-size worker pool running one task per partition
pub struct MapReduce {
    workers: usize,
    task_timeout: Option<Duration>,
    pool: rayon::ThreadPool,
}

impl MapReduce {
    /// Create a harness with `workers` threads (0 = detected core count)
    pub fn new(workers: usize, task_timeout: Option<Duration>) -> Result<Self> {
        let workers = if workers == 0 { num_cpus() } else { workers };
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("miner-worker-{}", i))
            .build()
            .map_err(|e| {
                MinerError::invalid(format!("cannot start a pool of {} workers: {}", workers, e))
            })?;
        Ok(Self {
            workers,
            task_timeout,
            pool,
        })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run `op` inside the worker pool so nested rayon calls use its threads
    pub fn install<R, OP>(&self, op: OP) -> R
    where
        R: Send,
        OP: FnOnce() -> R + Send,
    {
        self.pool.install(op)
    }

    /// Run `map` over every partition of `items` and fold the partials with `reduce`.
    ///
    /// The first failing partition aborts the run; no partial result is returned.
    /// With a task timeout the calling thread stops waiting once the limit has
    /// passed, even if a task is stuck inside a single item. Abandoned tasks own
    /// their inputs and stop at their next checkpoint.
    pub fn map_reduce<T, P, F, R>(&self, items: &[T], map: F, reduce: R) -> Result<P>
    where
        T: Clone + Send + Sync + 'static,
        P: Default + Send + 'static,
        F: Fn(Partition<'_, T>) -> Result<P> + Send + Sync + 'static,
        R: FnMut(P, P) -> P,
    {
        let ranges = partition_ranges(items, self.workers);
        let expected = ranges.len();
        let shared: Arc<[T]> = items.into();
        let failed = Arc::new(AtomicBool::new(false));
        let map = Arc::new(map);
        let timeout = self.task_timeout;
        debug!(
            items = items.len(),
            partitions = expected,
            workers = self.workers,
            "dispatching partitions"
        );

        let (tx, rx) = mpsc::channel();
        let dispatched = Instant::now();
        for (index, range) in ranges.into_iter().enumerate() {
            let (shared, failed, map, tx) = (shared.clone(), failed.clone(), map.clone(), tx.clone());
            self.pool.spawn(move || {
                let part = Partition {
                    index,
                    items: &shared[range],
                    started: Instant::now(),
                    timeout,
                    failed: &*failed,
                };
                let result = (*map)(part);
                if result.is_err() {
                    failed.store(true, Ordering::Relaxed);
                }
                // the receiver is gone once the run has already failed
                let _ = tx.send((index, result));
            });
        }
        drop(tx);

        let deadline = timeout.map(|limit| dispatched + limit);
        let mut received: Vec<Option<P>> = (0..expected).map(|_| None).collect();
        let mut aborted = None;
        for _ in 0..expected {
            let next = match deadline {
                Some(deadline) => rx.recv_timeout(deadline.saturating_duration_since(Instant::now())),
                None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };
            match next {
                Ok((index, Ok(partial))) => received[index] = Some(partial),
                // Report the root cause, not a sibling's abort
                Ok((_, Err(e))) if e.is_abort() => {
                    aborted.get_or_insert(e);
                }
                Ok((_, Err(e))) => return Err(e),
                Err(RecvTimeoutError::Timeout) => {
                    failed.store(true, Ordering::Relaxed);
                    let partition = received.iter().position(Option::is_none).unwrap_or(0);
                    return Err(MinerError::Timeout {
                        partition,
                        elapsed: dispatched.elapsed(),
                    });
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(MinerError::invalid("a worker exited without reporting a result"));
                }
            }
        }
        if let Some(e) = aborted {
            return Err(e);
        }

        // fold in partition order so list results keep input order
        Ok(received.into_iter().flatten().reduce(reduce).unwrap_or_default())
    }

    /// [`map_reduce`](Self::map_reduce) folding with [`Partial::merge`]
    pub fn map_merge<T, P, F>(&self, items: &[T], map: F) -> Result<P>
    where
        T: Clone + Send + Sync + 'static,
        P: Partial + 'static,
        F: Fn(Partition<'_, T>) -> Result<P> + Send + Sync + 'static,
    {
        self.map_reduce(items, map, |mut acc, partial| {
            acc.merge(partial);
            acc
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_partition_sizes() {
        let items: Vec<u32> = (0..10).collect();
        let lens: Vec<usize> = partition(&items, 4).iter().map(|p| p.len()).collect();
        assert_eq!(lens, vec![3, 3, 3, 1]);

        let items: Vec<u32> = (0..9).collect();
        let lens: Vec<usize> = partition(&items, 4).iter().map(|p| p.len()).collect();
        assert_eq!(lens, vec![3, 3, 3]);

        let items = [1, 2];
        assert_eq!(partition(&items, 8).len(), 2);
        assert!(partition::<u8>(&[], 3).is_empty());
        assert_eq!(partition(&items, 0).len(), 1);
    }

    #[test]
    fn test_partitions_are_contiguous_and_ordered() {
        let items: Vec<u32> = (0..23).collect();
        let flat: Vec<u32> = partition(&items, 5).concat();
        assert_eq!(flat, items);
    }

    fn letter_histogram(harness: &MapReduce, words: &[&'static str]) -> Histogram<u8> {
        harness
            .map_merge(words, |part| {
                part.try_fold(Histogram::new(), |mut hist, word| {
                    for b in word.bytes() {
                        *hist.entry(b).or_insert(0) += 1;
                    }
                    Ok(hist)
                })
            })
            .unwrap()
    }

    #[test]
    fn test_worker_count_invariance() {
        let words = [
            "alpha", "beta", "gamma", "delta", "epsilon", "zeta", "eta", "theta", "iota",
            "kappa", "lambda",
        ];
        let one = letter_histogram(&MapReduce::new(1, None).unwrap(), &words);
        let two = letter_histogram(&MapReduce::new(2, None).unwrap(), &words);
        let eight = letter_histogram(&MapReduce::new(8, None).unwrap(), &words);
        assert_eq!(one, two);
        assert_eq!(one, eight);
        assert_eq!(one[&b'a'], 14);
    }

    #[test]
    fn test_list_reduce_keeps_every_item() {
        let harness = MapReduce::new(3, None).unwrap();
        let items: Vec<u32> = (0..100).collect();
        let mut doubled: Vec<u32> = harness
            .map_merge(&items, |part| Ok(part.items.iter().map(|x| x * 2).collect::<Vec<_>>()))
            .unwrap();
        doubled.sort_unstable();
        assert_eq!(doubled, (0..100).map(|x| x * 2).collect::<Vec<_>>());
    }

    #[test]
    fn test_tuple_partials() {
        let harness = MapReduce::new(4, None).unwrap();
        let items: Vec<u8> = b"abracadabra".to_vec();
        let (hist, list): (Histogram<u8>, Vec<u8>) = harness
            .map_merge(&items, |part| {
                let mut hist = Histogram::new();
                for &b in part.items {
                    *hist.entry(b).or_insert(0) += 1;
                }
                Ok((hist, part.items.to_vec()))
            })
            .unwrap();
        assert_eq!(hist[&b'a'], 5);
        assert_eq!(list.len(), items.len());
    }

    #[test]
    fn test_empty_input_reduces_to_default() {
        let harness = MapReduce::new(4, None).unwrap();
        let hist: Histogram<u8> = harness
            .map_merge(&Vec::<u8>::new(), |_| Ok(Histogram::new()))
            .unwrap();
        assert!(hist.is_empty());
    }

    #[test]
    fn test_worker_failure_is_fatal() {
        let harness = MapReduce::new(4, None).unwrap();
        let items: Vec<u32> = (0..40).collect();
        let err = harness
            .map_merge(&items, |part| {
                part.try_fold(Vec::new(), |mut acc, &x| {
                    if x == 17 {
                        return Err(MinerError::invalid("item 17 is poisoned"));
                    }
                    acc.push(x);
                    Ok(acc)
                })
            })
            .unwrap_err();
        assert!(err.to_string().contains("poisoned"));
    }

    #[test]
    fn test_task_timeout_aborts_run() {
        let harness = MapReduce::new(2, Some(Duration::from_millis(5))).unwrap();
        let items: Vec<u32> = (0..4).collect();
        let err = harness
            .map_merge(&items, |part| {
                part.try_fold(Vec::new(), |mut acc, &x| {
                    std::thread::sleep(Duration::from_millis(20));
                    acc.push(x);
                    Ok(acc)
                })
            })
            .unwrap_err();
        assert!(matches!(
            err,
            MinerError::Timeout { .. } | MinerError::Aborted { .. }
        ));
    }

    #[test]
    fn test_timeout_does_not_wait_for_stuck_item() {
        let harness = MapReduce::new(2, Some(Duration::from_millis(50))).unwrap();
        let items: Vec<u32> = vec![0, 1];
        let started = Instant::now();
        let err = harness
            .map_merge(&items, |part| {
                part.try_fold(Vec::new(), |mut acc, &x| {
                    if x == 0 {
                        std::thread::sleep(Duration::from_millis(600));
                    }
                    acc.push(x);
                    Ok(acc)
                })
            })
            .unwrap_err();
        assert!(matches!(err, MinerError::Timeout { partition: 0, .. }), "{:?}", err);
        assert!(started.elapsed() < Duration::from_millis(400));
    }

    #[test]
    fn test_list_partials_keep_input_order() {
        let harness = MapReduce::new(4, None).unwrap();
        let items: Vec<u32> = (0..50).collect();
        let out: Vec<u32> = harness
            .map_merge(&items, |part| {
                // later partitions finish first
                std::thread::sleep(Duration::from_millis(20 / (part.index as u64 + 1)));
                Ok(part.items.to_vec())
            })
            .unwrap();
        assert_eq!(out, items);
    }

    proptest! {
        #[test]
        fn prop_partition_covers_input(len in 0usize..500, workers in 1usize..33) {
            let items: Vec<usize> = (0..len).collect();
            let parts = partition(&items, workers);
            prop_assert!(parts.len() <= workers);
            prop_assert!(parts.iter().all(|p| !p.is_empty()));
            prop_assert_eq!(parts.concat(), items);
        }

        #[test]
        fn prop_reduce_matches_union(
            left in proptest::collection::vec(any::<u8>(), 0..200),
            right in proptest::collection::vec(any::<u8>(), 0..200),
        ) {
            let count = |bytes: &[u8]| {
                let mut hist: Histogram<u8> = Histogram::new();
                for &b in bytes {
                    *hist.entry(b).or_insert(0) += 1;
                }
                hist
            };
            let mut merged = count(&left);
            merged.merge(count(&right));
            let union: Vec<u8> = left.iter().chain(right.iter()).copied().collect();
            prop_assert_eq!(merged, count(&union));
        }
    }
}
