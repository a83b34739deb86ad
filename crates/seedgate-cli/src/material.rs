//! Key and salt loading heuristics.
//!
//! Both secrets may arrive as a filename, a hex string, or (salt only) a
//! literal text string. Files are disambiguated by length: sizes that can
//! only be hex text are decoded, sizes that can only be raw bytes are used
//! as-is, and ambiguous sizes are decoded when they happen to parse.

use std::fs;

use seedgate_core::{PrivateKey, Salt};

/// Resolve `--key`: file first, then hex string.
pub fn load_key(arg: &str) -> Option<PrivateKey> {
    if let Ok(binary) = fs::read(arg) {
        match binary.len() {
            // must be hex text of a 24/32-byte key
            48 | 64 => {
                if let Some(decoded) = decode_hex_bytes(&binary) {
                    return PrivateKey::new(decoded).ok();
                }
            }
            // must be a raw key
            16 | 24 => return PrivateKey::new(binary).ok(),
            // raw 32-byte key or hex text of a 16-byte key
            32 => {
                let bytes = decode_hex_bytes(&binary).unwrap_or(binary);
                return PrivateKey::new(bytes).ok();
            }
            _ => {}
        }
    }

    if matches!(arg.len(), 32 | 48 | 64) {
        if let Ok(decoded) = hex::decode(arg) {
            return PrivateKey::new(decoded).ok();
        }
    }

    None
}

/// Resolve `--salt`: file first, then hex string, then literal text.
pub fn load_salt(arg: &str) -> Option<Salt> {
    if let Ok(binary) = fs::read(arg) {
        match binary.len() {
            // too long to be raw: must be hex text
            65..=128 => {
                if let Some(decoded) = decode_hex_bytes(&binary) {
                    return Salt::new(decoded).ok();
                }
            }
            // too short to be hex of a valid salt: must be raw
            24..=47 => return Salt::new(binary).ok(),
            // ambiguous: prefer a clean hex decode
            48..=64 => {
                let bytes = decode_hex_bytes(&binary).unwrap_or(binary);
                return Salt::new(bytes).ok();
            }
            _ => {}
        }
    }

    if (48..=128).contains(&arg.len()) {
        if let Ok(decoded) = hex::decode(arg) {
            if let Ok(salt) = Salt::new(decoded) {
                return Some(salt);
            }
        }
    }

    if (24..=64).contains(&arg.len()) {
        return Salt::new(arg.as_bytes().to_vec()).ok();
    }

    None
}

fn decode_hex_bytes(raw: &[u8]) -> Option<Vec<u8>> {
    let text = std::str::from_utf8(raw).ok()?;
    hex::decode(text.trim()).ok()
}
