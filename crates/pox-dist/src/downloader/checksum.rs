//! Checksum verification for downloaded artifacts.

use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};

/// Supported checksum types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumType {
    Sha1,
    Sha256,
    Sha384,
    Sha512,
    Md5,
}

impl ChecksumType {
    /// Detect checksum type from length of hex string
    pub fn from_hex_length(len: usize) -> Option<Self> {
        match len {
            32 => Some(ChecksumType::Md5),
            40 => Some(ChecksumType::Sha1),
            64 => Some(ChecksumType::Sha256),
            96 => Some(ChecksumType::Sha384),
            128 => Some(ChecksumType::Sha512),
            _ => None,
        }
    }

    /// Lowercase hex digest of `data`
    pub fn compute(&self, data: &[u8]) -> String {
        match self {
            ChecksumType::Sha1 => format!("{:x}", Sha1::digest(data)),
            ChecksumType::Sha256 => format!("{:x}", Sha256::digest(data)),
            ChecksumType::Sha384 => format!("{:x}", Sha384::digest(data)),
            ChecksumType::Sha512 => format!("{:x}", Sha512::digest(data)),
            ChecksumType::Md5 => format!("{:x}", Md5::digest(data)),
        }
    }
}

/// A failed verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumFailure {
    pub expected: String,
    /// Digest of the data, or a description when the expected checksum has no
    /// recognizable algorithm
    pub actual: String,
}

/// Verify `data` against an expected hex checksum.
///
/// No checksum passes. The algorithm is picked from the checksum's length and
/// the comparison ignores case.
pub fn verify_checksum(data: &[u8], expected: Option<&str>) -> Result<(), ChecksumFailure> {
    let Some(expected) = expected.map(str::trim).filter(|c| !c.is_empty()) else {
        return Ok(());
    };

    let Some(checksum_type) = ChecksumType::from_hex_length(expected.len()) else {
        return Err(ChecksumFailure {
            expected: expected.to_string(),
            actual: format!("unsupported checksum of length {}", expected.len()),
        });
    };

    let actual = checksum_type.compute(data);
    if actual.eq_ignore_ascii_case(expected) {
        Ok(())
    } else {
        Err(ChecksumFailure {
            expected: expected.to_string(),
            actual,
        })
    }
}
