#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use substr_miner::extract::{extract_substrings, ExtractOptions, ExtractionPolicy};
use substr_miner::utils::ngram_histogram;

#[derive(Arbitrary, Debug)]
struct Input<'a> {
    content: &'a [u8],
    corpus: &'a [u8],
    policy: u8,
    min_count: u8,
    min_len: u8,
}

fuzz_target!(|input: Input| {
    let Ok(qualifying) = ngram_histogram(input.corpus, 3) else {
        return;
    };
    let policy = match input.policy % 4 {
        0 => ExtractionPolicy::Run,
        1 => ExtractionPolicy::EqualCount,
        n => ExtractionPolicy::Threshold {
            min_count: input.min_count as u64,
            require_equal_counts: n == 2,
        },
    };
    let opts = ExtractOptions {
        policy,
        min_len: input.min_len as usize % 16,
    };
    // Spans must stay in bounds and never overlap
    if let Ok(found) = extract_substrings(input.content, 3, &qualifying, &opts) {
        let mut last_end = 0;
        for sub in found {
            assert!(sub.offset >= last_end);
            assert_eq!(&input.content[sub.offset..sub.end()], sub.bytes);
            last_end = sub.end();
        }
    }
});
