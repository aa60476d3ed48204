//! Pre-allocated scratch lanes for the hot path.
//!
//! Everything compress/decompress needs is allocated once at context
//! creation and overwritten every call; the hot path itself never touches
//! the allocator. The lanes are sized for the worst case (a 65535-byte
//! payload), so mid-packet exhaustion cannot occur.

use crate::codec::lz77::HASH_SIZE;
use crate::dict::dictionary::MAX_PACKET_SIZE;
use crate::utils::error::{NetcError, Result};

/// Per-lane slack for headers, states and the bitstream sentinel byte.
const LANE_SLACK: usize = 16;
const LANE_SIZE: usize = MAX_PACKET_SIZE + LANE_SLACK;
/// Flag bitmap for a worst-case payload, one bit per byte.
const FLAG_LANE_SIZE: usize = MAX_PACKET_SIZE / 8 + LANE_SLACK;

/// The context's scratch memory.
pub struct Arena {
    /// Chosen delta residual of the current packet.
    pub residual: Vec<u8>,
    /// LZP-filtered raw payload.
    pub filtered: Vec<u8>,
    /// LZP-filtered delta residual.
    pub filtered2: Vec<u8>,
    /// LZP hit/miss flag bitmap scratch.
    pub flags: Vec<u8>,
    /// LZP literal scratch.
    pub lits: Vec<u8>,
    /// Current candidate's payload trial; doubles as decode staging.
    pub trial: Vec<u8>,
    /// Best payload seen so far this packet.
    pub best: Vec<u8>,
    /// Linearized ring history for the LZ77 window.
    pub window: Vec<u8>,
    /// LZ77 match table.
    pub heads: Vec<u32>,
}

impl Arena {
    /// Allocate all lanes. A nonzero `requested` below the computed
    /// minimum is an argument error; anything at or above it is accepted
    /// (the lanes are what they are; the knob exists for FFI parity).
    pub fn new(requested: usize, ring_size: usize) -> Result<Self> {
        let minimum = Self::required_size(ring_size);
        if requested != 0 && requested < minimum {
            return Err(NetcError::InvalidArg);
        }
        Ok(Self {
            residual: vec![0; LANE_SIZE],
            filtered: vec![0; LANE_SIZE],
            filtered2: vec![0; LANE_SIZE],
            flags: vec![0; FLAG_LANE_SIZE],
            lits: vec![0; LANE_SIZE],
            trial: vec![0; LANE_SIZE],
            best: vec![0; LANE_SIZE],
            window: vec![0; ring_size],
            heads: vec![0; HASH_SIZE],
        })
    }

    /// Bytes the lane set needs for a given ring size.
    pub fn required_size(ring_size: usize) -> usize {
        6 * LANE_SIZE + FLAG_LANE_SIZE + ring_size + HASH_SIZE * 4
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_allocation() {
        let a = Arena::new(0, 1024).unwrap();
        assert_eq!(a.window.len(), 1024);
        assert_eq!(a.heads.len(), HASH_SIZE);
        assert!(a.trial.len() > MAX_PACKET_SIZE);
        assert!(a.flags.len() * 8 >= MAX_PACKET_SIZE);
    }

    #[test]
    fn test_undersized_request_rejected() {
        assert!(Arena::new(100, 1024).is_err());
        assert!(Arena::new(Arena::required_size(1024), 1024).is_ok());
    }
}
