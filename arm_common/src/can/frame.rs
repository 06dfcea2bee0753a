//! Raw CAN frame and arbitration-id packing.
//!
//! Two addressing modes are supported:
//!
//! | Mode | Arbitration id | Extended |
//! |------|----------------|----------|
//! | 29-bit | `(command << 8) \| node` | yes |
//! | 11-bit | `((command & 0x1F) << 5) \| (node & 0x1F)` | no |

use crate::consts::{MAX_NODE_ID_EXTENDED, MAX_NODE_ID_STANDARD, MAX_PAYLOAD_LEN};
use serde::{Deserialize, Serialize};

/// Frame payload, at most 8 bytes, stored inline.
pub type Payload = heapless::Vec<u8, MAX_PAYLOAD_LEN>;

/// Arbitration-id addressing mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum IdFormat {
    #[default]
    #[serde(rename = "extended_29bit")]
    Extended29Bit,
    #[serde(rename = "standard_11bit")]
    Standard11Bit,
}

impl IdFormat {
    /// Highest node id this mode can address.
    pub const fn max_node_id(&self) -> u8 {
        match self {
            Self::Extended29Bit => MAX_NODE_ID_EXTENDED,
            Self::Standard11Bit => MAX_NODE_ID_STANDARD,
        }
    }

    /// Pack a command and node id into an arbitration id.
    ///
    /// Returns `(arbitration_id, extended)`.
    #[inline]
    pub const fn pack(&self, command: u8, node_id: u8) -> (u32, bool) {
        match self {
            Self::Extended29Bit => (((command as u32) << 8) | node_id as u32, true),
            Self::Standard11Bit => (
                (((command & 0x1F) as u32) << 5) | (node_id & 0x1F) as u32,
                false,
            ),
        }
    }

    /// Inverse of [`pack`](Self::pack).
    ///
    /// Returns `None` when the frame's extended flag does not match this mode
    /// or the id does not fit its bit layout. Foreign frames are not errors.
    #[inline]
    pub const fn unpack(&self, arbitration_id: u32, extended: bool) -> Option<(u8, u8)> {
        match self {
            Self::Extended29Bit => {
                if !extended || arbitration_id > 0xFFFF {
                    return None;
                }
                Some(((arbitration_id >> 8) as u8, (arbitration_id & 0xFF) as u8))
            }
            Self::Standard11Bit => {
                if extended || arbitration_id > 0x3FF {
                    return None;
                }
                Some((
                    ((arbitration_id >> 5) & 0x1F) as u8,
                    (arbitration_id & 0x1F) as u8,
                ))
            }
        }
    }
}

/// One classic CAN frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanFrame {
    pub id: u32,
    pub extended: bool,
    pub data: Payload,
}

impl CanFrame {
    /// Build a frame; `None` if `data` exceeds 8 bytes.
    pub fn new(id: u32, extended: bool, data: &[u8]) -> Option<Self> {
        let data = Payload::from_slice(data).ok()?;
        Some(Self { id, extended, data })
    }

    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.data
    }
}
