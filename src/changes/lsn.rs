// ABOUTME: Log sequence number type used to bound change windows
// ABOUTME: Byte-comparable, hex-printable, with empty/zero detection

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use super::error::{CdcError, Result};

/// A position in the source's change log.
///
/// SQL Server LSNs are 10-byte big-endian values, so lexicographic byte
/// ordering matches log order. An empty or all-zero LSN means "no position".
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Lsn(Vec<u8>);

impl Lsn {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// True when the LSN carries no usable position.
    pub fn is_empty_or_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    /// Parse a hex string, with or without a `0x` prefix.
    pub fn from_hex(value: &str) -> Result<Self> {
        let trimmed = value.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        hex::decode(digits)
            .map(Self)
            .map_err(|e| CdcError::invalid_argument(format!("invalid LSN '{}': {}", value, e)))
    }

    /// Format as `0x` followed by upper-case hex digits.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode_upper(&self.0))
    }

    /// Collapse empty or zero values into `None`.
    pub fn into_option(self) -> Option<Self> {
        if self.is_empty_or_zero() {
            None
        } else {
            Some(self)
        }
    }
}

impl From<Vec<u8>> for Lsn {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&[u8]> for Lsn {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl AsRef<[u8]> for Lsn {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Lsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for Lsn {
    type Err = CdcError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

impl Serialize for Lsn {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Lsn {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Self::from_hex(&value).map_err(serde::de::Error::custom)
    }
}
