use crate::error::{MinerError, Result};
use crate::utils::from_hex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hash;
use std::str::FromStr;

/// Occurrence counts keyed by n-gram, substring or any other hashable key.
/// Iteration order is unspecified.
pub type Histogram<K> = ahash::AHashMap<K, u64>;

/// An owned n-gram, used as the key of corpus-wide histograms
pub type Ngram = Vec<u8>;

/// Ranked `(key, count)` pairs, highest count first
pub type RankedList<K> = Vec<(K, u64)>;

/// Add every count of `other` into `into`
pub fn merge_histograms<K: Hash + Eq>(into: &mut Histogram<K>, other: Histogram<K>) {
    if into.len() < other.len() {
        // fold the smaller map into the larger one
        let small = std::mem::replace(into, other);
        merge_histograms(into, small);
        return;
    }
    for (key, count) in other {
        *into.entry(key).or_insert(0) += count;
    }
}

/// A substring extracted from a buffer, borrowed from that buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Substring<'a> {
    /// Starting byte position in the source buffer
    pub offset: usize,
    pub bytes: &'a [u8],
}

impl Substring<'_> {
    /// One past the last byte of the span
    pub fn end(&self) -> usize {
        self.offset + self.bytes.len()
    }
}

/// Fixed-width content digest (BLAKE3, 32 bytes) printed as lowercase hex
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentHash(pub [u8; 32]);

impl ContentHash {
    pub const HEX_LEN: usize = 64;

    pub fn of(content: &[u8]) -> Self {
        ContentHash(*blake3::hash(content).as_bytes())
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for ContentHash {
    type Err = MinerError;

    fn from_str(s: &str) -> Result<Self> {
        if s.len() != Self::HEX_LEN {
            return Err(MinerError::invalid(format!(
                "content hash must be {} hex digits, got {:?}",
                Self::HEX_LEN,
                s
            )));
        }
        let bytes = from_hex(s)?;
        let digest: [u8; 32] = bytes
            .try_into()
            .map_err(|_| MinerError::invalid(format!("bad content hash {:?}", s)))?;
        Ok(ContentHash(digest))
    }
}

impl Serialize for ContentHash {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ContentHash {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// One extraction event: which file, which substring, where
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Occurrence {
    pub file_hash: ContentHash,
    pub substr_hash: ContentHash,
    pub offset: u64,
}

impl fmt::Display for Occurrence {
    /// Tab-separated row: `file_hash<TAB>substr_hash<TAB>offset`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\t{}\t{}", self.file_hash, self.substr_hash, self.offset)
    }
}

impl FromStr for Occurrence {
    type Err = MinerError;

    fn from_str(line: &str) -> Result<Self> {
        let mut cols = line.trim_end_matches(['\r', '\n']).split('\t');
        let (Some(file), Some(substr), Some(offset), None) =
            (cols.next(), cols.next(), cols.next(), cols.next())
        else {
            return Err(MinerError::invalid(format!(
                "occurrence row must have 3 tab-separated columns: {:?}",
                line
            )));
        };
        let offset = offset
            .parse::<u64>()
            .map_err(|_| MinerError::invalid(format!("bad offset {:?} in row {:?}", offset, line)))?;
        Ok(Occurrence {
            file_hash: file.parse()?,
            substr_hash: substr.parse()?,
            offset,
        })
    }
}
