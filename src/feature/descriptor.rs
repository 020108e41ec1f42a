use serde::{Deserialize, Serialize};

/// Length of an ORB descriptor in bytes (256 bits)
pub const DESCRIPTOR_BYTES: usize = 32;

/// 256-bit binary feature descriptor, compared with the Hamming distance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BinaryDescriptor(pub [u8; DESCRIPTOR_BYTES]);

impl BinaryDescriptor {
    /// Build a descriptor from one row of a descriptor matrix.
    /// Returns `None` unless the row is exactly 32 bytes long.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let bytes: [u8; DESCRIPTOR_BYTES] = bytes.try_into().ok()?;
        Some(Self(bytes))
    }

    /// Number of differing bits
    pub fn hamming(&self, other: &Self) -> u32 {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (a ^ b).count_ones())
            .sum()
    }
}
