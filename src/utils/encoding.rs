use crate::error::{MinerError, Result};

/// Encode bytes as lowercase hex
pub fn to_hex(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

/// Decode a hex string back into bytes
pub fn from_hex(s: &str) -> Result<Vec<u8>> {
    hex::decode(s).map_err(|e| MinerError::invalid(format!("bad hex string {:?}: {}", s, e)))
}

/// Hex preview limited to `max_chars` characters (always an even count)
pub fn hex_preview(bytes: &[u8], max_chars: usize) -> String {
    let take = (max_chars / 2).min(bytes.len());
    to_hex(&bytes[..take])
}
