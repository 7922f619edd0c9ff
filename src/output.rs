//! Writing mining results: aggregate reports, occurrence indexes and the
//! terminal preview table.

use crate::config::OutputFormat;
use crate::error::{MinerError, Result};
use crate::index::types::RankedList;
use crate::utils::{hex_preview, to_hex};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

/// Hex characters shown per substring in the preview table
const PREVIEW_HEX_CHARS: usize = 30;

/// Fail early when `path` cannot be used as an output file
pub fn check_output_path(path: &Path) -> Result<()> {
    if path.is_dir() {
        return Err(MinerError::invalid(format!(
            "{} is a directory, can't write to it",
            path.display()
        )));
    }
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() && !parent.is_dir() => {
            Err(MinerError::invalid(format!(
                "cannot write {}: directory {} does not exist",
                path.display(),
                parent.display()
            )))
        }
        _ => Ok(()),
    }
}

/// Open `path` for buffered writing
pub fn create_output(path: &Path) -> Result<BufWriter<File>> {
    File::create(path)
        .map(BufWriter::new)
        .map_err(|e| MinerError::io(path, e))
}

/// Write ranked substrings as a JSON array of `[hex, count]` pairs
/// or as `count<TAB>hex` lines
pub fn write_aggregate<W: Write>(
    list: &RankedList<Vec<u8>>,
    format: OutputFormat,
    mut out: W,
) -> io::Result<()> {
    match format {
        OutputFormat::Json => {
            let pairs: Vec<(String, u64)> = list
                .iter()
                .map(|(bytes, count)| (to_hex(bytes), *count))
                .collect();
            serde_json::to_writer(&mut out, &pairs)?;
            writeln!(out)?;
        }
        OutputFormat::Tsv => {
            for (bytes, count) in list {
                writeln!(out, "{}\t{}", count, to_hex(bytes))?;
            }
        }
    }
    out.flush()
}

/// Print the top `rows` substrings as `Count<TAB>Length<TAB>Preview`
pub fn print_preview(list: &RankedList<Vec<u8>>, rows: usize, color: bool) -> io::Result<()> {
    let choice = if color {
        ColorChoice::Auto
    } else {
        ColorChoice::Never
    };
    let mut stdout = StandardStream::stdout(choice);

    stdout.set_color(ColorSpec::new().set_bold(true))?;
    writeln!(stdout, "Count\tLength\tPreview")?;
    stdout.reset()?;

    for (bytes, count) in list.iter().take(rows) {
        stdout.set_color(ColorSpec::new().set_fg(Some(Color::Green)))?;
        write!(stdout, "{}", count)?;
        stdout.reset()?;
        write!(stdout, "\t{}\t", bytes.len())?;
        stdout.set_color(ColorSpec::new().set_fg(Some(Color::Magenta)))?;
        writeln!(stdout, "{}", hex_preview(bytes, PREVIEW_HEX_CHARS))?;
        stdout.reset()?;
    }

    if list.len() > rows {
        writeln!(stdout, "... and {} more", list.len() - rows)?;
    }
    Ok(())
}
