use crate::error::{MinerError, Result};
use crate::index::types::{ContentHash, Occurrence};
use ahash::AHashMap;
use std::fs;
use std::io::{BufRead, Write};
use std::path::Path;
use tracing::{debug, warn};

/// Content-addressed substring store plus the occurrence index built from it.
///
/// Populated on the orchestrating thread only; workers hand back plain
/// extraction results and never touch the store.
#[derive(Debug, Default)]
pub struct ContentStore {
    content: AHashMap<ContentHash, Vec<u8>>,
    occurrences: Vec<Occurrence>,
}

/// What a content flush did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushStats {
    pub written: usize,
    pub skipped: usize,
    /// Existing files whose content did not match their name
    pub rewritten: usize,
}

impl ContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `content` under its hash. Storing the same bytes again is a no-op.
    pub fn put(&mut self, content: &[u8]) -> ContentHash {
        let hash = ContentHash::of(content);
        self.content
            .entry(hash)
            .or_insert_with(|| content.to_vec());
        hash
    }

    /// Append one occurrence row; identical rows are kept
    pub fn record(&mut self, file_hash: ContentHash, substr_hash: ContentHash, offset: u64) {
        self.occurrences.push(Occurrence {
            file_hash,
            substr_hash,
            offset,
        });
    }

    pub fn get(&self, hash: &ContentHash) -> Option<&[u8]> {
        self.content.get(hash).map(Vec::as_slice)
    }

    /// Number of distinct stored contents
    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    pub fn occurrences(&self) -> &[Occurrence] {
        &self.occurrences
    }

    /// Write every stored content to `dir/<hex hash>` unless that file exists.
    ///
    /// Existing files are trusted unless `verify_existing` is set, in which
    /// case they are re-hashed and rewritten on mismatch. Each file goes
    /// through a temporary name and a rename, so an interrupted flush never
    /// leaves a truncated file under a valid hash name.
    pub fn flush_content(&self, dir: &Path, verify_existing: bool) -> Result<FlushStats> {
        if !dir.is_dir() {
            return Err(MinerError::invalid(format!(
                "content directory {} does not exist",
                dir.display()
            )));
        }

        let mut stats = FlushStats::default();
        for (hash, bytes) in &self.content {
            let path = dir.join(hash.to_hex());
            if path.is_file() {
                if !verify_existing {
                    stats.skipped += 1;
                    continue;
                }
                let existing = fs::read(&path).map_err(|e| MinerError::io(&path, e))?;
                if ContentHash::of(&existing) == *hash {
                    stats.skipped += 1;
                    continue;
                }
                warn!(path = %path.display(), "stored content does not match its hash, rewriting");
                stats.rewritten += 1;
            } else {
                stats.written += 1;
            }

            let tmp = path.with_extension("partial");
            fs::write(&tmp, bytes).map_err(|e| MinerError::io(&tmp, e))?;
            fs::rename(&tmp, &path).map_err(|e| MinerError::io(&path, e))?;
        }

        debug!(
            written = stats.written,
            skipped = stats.skipped,
            rewritten = stats.rewritten,
            dir = %dir.display(),
            "content flush complete"
        );
        Ok(stats)
    }

    /// Write the occurrence index as `file_hash<TAB>substr_hash<TAB>offset` lines
    pub fn write_tsv<W: Write>(&self, mut out: W) -> std::io::Result<()> {
        for occ in &self.occurrences {
            writeln!(out, "{}", occ)?;
        }
        out.flush()
    }

    /// Write the occurrence index as a JSON array of row objects
    pub fn write_json<W: Write>(&self, mut out: W) -> std::io::Result<()> {
        serde_json::to_writer(&mut out, &self.occurrences)?;
        writeln!(out)?;
        out.flush()
    }
}

/// Parse an occurrence index written by [`ContentStore::write_tsv`].
///
/// Blank lines are skipped; any malformed row fails with its line number.
pub fn read_occurrences<R: BufRead>(reader: R) -> Result<Vec<Occurrence>> {
    let mut rows = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| MinerError::io("<occurrence index>", e))?;
        if line.trim().is_empty() {
            continue;
        }
        let row = line.parse::<Occurrence>().map_err(|e| {
            MinerError::invalid(format!("line {}: {}", idx + 1, e))
        })?;
        rows.push(row);
    }
    Ok(rows)
}
