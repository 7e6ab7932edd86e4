use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn verify_sha256_reader<R: Read>(reader: &mut R, expected_hex: &str) -> Result<bool> {
    let mut hasher = Sha256::new();
    io::copy(reader, &mut hasher).context("failed hashing stream")?;
    Ok(hex::encode(hasher.finalize()) == normalize_hex(expected_hex))
}

/// Compares the file's digest against a hex digest; case and surrounding
/// whitespace are ignored.
pub fn verify_sha256_file(path: &Path, expected_hex: &str) -> Result<bool> {
    let mut file =
        File::open(path).with_context(|| format!("failed opening {}", path.display()))?;
    verify_sha256_reader(&mut file, expected_hex)
        .with_context(|| format!("failed verifying checksum of {}", path.display()))
}

fn normalize_hex(value: &str) -> String {
    value.trim().to_ascii_lowercase()
}
