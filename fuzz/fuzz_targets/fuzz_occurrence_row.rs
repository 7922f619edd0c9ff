#![no_main]

use libfuzzer_sys::fuzz_target;
use substr_miner::index::Occurrence;

fuzz_target!(|data: &str| {
    // Any row that parses must print back to the same row
    if let Ok(row) = data.parse::<Occurrence>() {
        let printed = row.to_string();
        assert_eq!(printed.parse::<Occurrence>().ok(), Some(row));
    }
});
