mod checksum;

pub use checksum::{sha256_hex, verify_sha256_file};
