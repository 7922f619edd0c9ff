#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|input: (u8, &[u8])| {
    // Window counts must cover every position exactly once
    let (n, data) = input;
    let n = n as usize % 8;
    if let Ok(hist) = substr_miner::utils::ngram_histogram(data, n) {
        let total: u64 = hist.values().sum();
        assert_eq!(total as usize, data.len() - n + 1);
    }
    let _ = substr_miner::utils::distinct_ngrams(data, n);
});
