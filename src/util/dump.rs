//! Hex dumps for diagnostic output.

use std::fmt::Write;

/// Render bytes as ` 0xa5 0xa5 0xff`, one entry per byte.
pub fn hex_dump(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 5);
    for byte in bytes {
        let _ = write!(out, " 0x{byte:02x}");
    }
    out
}
