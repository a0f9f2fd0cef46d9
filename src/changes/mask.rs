// ABOUTME: Update mask type describing which captured columns changed
// ABOUTME: Decodes set bits into 1-based captured-column ordinals

use serde::{Serialize, Serializer};
use std::fmt;

/// Bitmask attached to each change row.
///
/// The mask is big-endian: bit 0 of the final byte is captured column
/// ordinal 1, bit 1 of the final byte is ordinal 2, and so on towards the
/// first byte. Equality and hashing are structural so masks can key a cache.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct UpdateMask(Vec<u8>);

impl UpdateMask {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty_or_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    /// Captured-column ordinals whose bit is set, in ascending order.
    pub fn changed_ordinals(&self) -> Vec<u32> {
        let mut ordinals = Vec::new();
        for (distance, byte) in self.0.iter().rev().enumerate() {
            if *byte == 0 {
                continue;
            }
            for bit in 0..8u32 {
                if byte & (1 << bit) != 0 {
                    ordinals.push(distance as u32 * 8 + bit + 1);
                }
            }
        }
        ordinals
    }

    /// Whether the column with the given 1-based ordinal is flagged.
    pub fn is_set(&self, ordinal: u32) -> bool {
        if ordinal == 0 {
            return false;
        }
        let position = (ordinal - 1) as usize;
        let Some(index) = self.0.len().checked_sub(position / 8 + 1) else {
            return false;
        };
        self.0[index] & (1 << (position % 8)) != 0
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode_upper(&self.0))
    }
}

impl From<Vec<u8>> for UpdateMask {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&[u8]> for UpdateMask {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl fmt::Display for UpdateMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for UpdateMask {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_byte_mask() {
        // 0b0000_0101: ordinals 1 and 3
        let mask = UpdateMask::new(vec![0x05]);
        assert_eq!(mask.changed_ordinals(), vec![1, 3]);
        assert!(mask.is_set(1));
        assert!(!mask.is_set(2));
        assert!(mask.is_set(3));
    }

    #[test]
    fn test_multi_byte_mask_is_big_endian() {
        // last byte holds ordinals 1..=8, first byte ordinals 9..=16
        let mask = UpdateMask::new(vec![0x01, 0x80]);
        assert_eq!(mask.changed_ordinals(), vec![8, 9]);
        assert!(mask.is_set(9));
        assert!(!mask.is_set(17));
        assert!(!mask.is_set(0));
    }

    #[test]
    fn test_masks_wider_than_64_columns() {
        let mut bytes = vec![0u8; 10];
        bytes[0] = 0x80;
        let mask = UpdateMask::new(bytes);
        assert_eq!(mask.changed_ordinals(), vec![80]);
    }

    #[test]
    fn test_zero_mask() {
        assert!(UpdateMask::default().is_empty_or_zero());
        assert!(UpdateMask::new(vec![0, 0]).is_empty_or_zero());
        assert!(UpdateMask::new(vec![0, 0]).changed_ordinals().is_empty());
    }

    #[test]
    fn test_structural_equality() {
        use std::collections::HashSet;
        let mut seen = HashSet::new();
        seen.insert(UpdateMask::new(vec![0x01, 0x02]));
        assert!(seen.contains(&UpdateMask::from(&[0x01u8, 0x02][..])));
    }
}
