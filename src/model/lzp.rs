//! LZP: position-aware order-1 byte prediction.
//!
//! A 2^17-slot table maps a context hash of (previous byte, byte offset) to
//! a predicted byte with a confidence counter. The predictor feeds two
//! codec shapes: an XOR pre-filter that turns hits into 0x00 runs for the
//! tANS stages, and a flag-bit stream that spends one bit per byte and only
//! pays literals for misses.
//!
//! The context is always defined over *original* bytes: the decoder walks
//! its output forward and hashes the byte it just reconstructed, so both
//! sides agree without any side channel.

use bitvec::prelude::*;
use bytemuck::{Pod, Zeroable};

use crate::utils::error::{NetcError, Result};

/// log2 of the prediction-table size.
pub const LZP_HASH_BITS: u32 = 17;
/// Number of prediction slots.
pub const LZP_TABLE_SIZE: usize = 1 << LZP_HASH_BITS;

/// Training threshold: a slot must predict at least this share of its
/// observations to be stored.
const TRAIN_HIT_RATE_PCT: u64 = 40;
/// Confidence granted to slots that pass training.
const TRAIN_CONFIDENCE: u8 = 4;

/// One prediction slot. `confidence == 0` marks the slot empty.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct LzpEntry {
    pub predicted: u8,
    pub confidence: u8,
}

/// The prediction table. Dictionaries hold a frozen copy; adaptive
/// contexts clone it and mutate their copy in lockstep on both endpoints.
#[derive(Debug, Clone)]
pub struct LzpTable {
    pub entries: Vec<LzpEntry>,
}

/// Context hash: FNV-1a over the previous byte and the low 16 bits of the
/// offset, folded down to 17 bits.
#[inline]
pub fn context_hash(prev: u8, pos: usize) -> usize {
    const FNV_OFFSET: u32 = 0x811C_9DC5;
    const FNV_PRIME: u32 = 0x0100_0193;
    let mut h = FNV_OFFSET;
    h = (h ^ u32::from(prev)).wrapping_mul(FNV_PRIME);
    h = (h ^ (pos as u32 & 0xFF)).wrapping_mul(FNV_PRIME);
    h = (h ^ ((pos as u32 >> 8) & 0xFF)).wrapping_mul(FNV_PRIME);
    ((h ^ (h >> LZP_HASH_BITS)) & (LZP_TABLE_SIZE as u32 - 1)) as usize
}

impl LzpTable {
    /// All-empty table.
    pub fn empty() -> Self {
        Self { entries: vec![LzpEntry::zeroed(); LZP_TABLE_SIZE] }
    }

    /// Train over a corpus: majority-vote byte per slot (Boyer–Moore), kept
    /// only when it wins at least 40% of the slot's observations.
    ///
    /// Returns `None` when no slot qualifies; the dictionary then ships
    /// without an LZP section.
    pub fn train(packets: &[&[u8]]) -> Option<Self> {
        // Pass 1: Boyer-Moore majority candidate per slot.
        let mut candidate = vec![0u8; LZP_TABLE_SIZE];
        let mut ballot = vec![0u32; LZP_TABLE_SIZE];
        for p in packets {
            let mut prev = 0u8;
            for (i, &b) in p.iter().enumerate() {
                let slot = context_hash(prev, i);
                if ballot[slot] == 0 {
                    candidate[slot] = b;
                    ballot[slot] = 1;
                } else if candidate[slot] == b {
                    ballot[slot] += 1;
                } else {
                    ballot[slot] -= 1;
                }
                prev = b;
            }
        }

        // Pass 2: verify the candidate actually clears the hit-rate bar.
        let mut hits = vec![0u64; LZP_TABLE_SIZE];
        let mut total = vec![0u64; LZP_TABLE_SIZE];
        for p in packets {
            let mut prev = 0u8;
            for (i, &b) in p.iter().enumerate() {
                let slot = context_hash(prev, i);
                total[slot] += 1;
                if candidate[slot] == b {
                    hits[slot] += 1;
                }
                prev = b;
            }
        }

        let mut table = Self::empty();
        let mut kept = 0usize;
        for slot in 0..LZP_TABLE_SIZE {
            if total[slot] > 0 && hits[slot] * 100 >= total[slot] * TRAIN_HIT_RATE_PCT {
                table.entries[slot] = LzpEntry {
                    predicted: candidate[slot],
                    confidence: TRAIN_CONFIDENCE,
                };
                kept += 1;
            }
        }
        if kept == 0 { None } else { Some(table) }
    }

    #[inline]
    fn predict(&self, prev: u8, pos: usize) -> Option<u8> {
        let e = self.entries[context_hash(prev, pos)];
        (e.confidence > 0).then_some(e.predicted)
    }

    /// XOR pre-filter: hits become 0x00, misses pass through. Output length
    /// equals input length; the result feeds the tANS stages directly.
    pub fn filter_xor(&self, src: &[u8], dst: &mut [u8]) {
        debug_assert_eq!(src.len(), dst.len());
        let mut prev = 0u8;
        for (i, &b) in src.iter().enumerate() {
            dst[i] = b ^ self.predict(prev, i).unwrap_or(0);
            prev = b;
        }
    }

    /// Inverse of [`filter_xor`], in place: `buf` arrives filtered and
    /// leaves holding the original bytes.
    pub fn unfilter_xor(&self, buf: &mut [u8]) {
        let mut prev = 0u8;
        for i in 0..buf.len() {
            let orig = buf[i] ^ self.predict(prev, i).unwrap_or(0);
            buf[i] = orig;
            prev = orig;
        }
    }

    /// Split `src` into a hit/miss flag bitmap (MSB-first, one bit per
    /// input byte) and the literal bytes for the misses. Returns the
    /// literal count.
    ///
    /// `flags` must hold `ceil(src.len() / 8)` bytes and arrives zeroed by
    /// the caller.
    pub fn flag_split(&self, src: &[u8], flags: &mut [u8], literals: &mut [u8]) -> usize {
        let bits = BitSlice::<u8, Msb0>::from_slice_mut(flags);
        let mut n_lit = 0usize;
        let mut prev = 0u8;
        for (i, &b) in src.iter().enumerate() {
            if self.predict(prev, i) == Some(b) {
                bits.set(i, true);
            } else {
                literals[n_lit] = b;
                n_lit += 1;
            }
            prev = b;
        }
        n_lit
    }

    /// Rebuild the original bytes from a flag bitmap and literal stream.
    ///
    /// Fails with `Corrupt` when a set flag points at an empty slot or the
    /// literal stream is too short; trailing unused literals are the
    /// caller's length mismatch to reject.
    pub fn flag_reconstruct(&self, flags: &[u8], literals: &[u8], out: &mut [u8]) -> Result<usize> {
        if flags.len() * 8 < out.len() {
            return Err(NetcError::Corrupt);
        }
        let bits = BitSlice::<u8, Msb0>::from_slice(flags);
        let mut used = 0usize;
        let mut prev = 0u8;
        for i in 0..out.len() {
            let b = if bits[i] {
                self.predict(prev, i).ok_or(NetcError::Corrupt)?
            } else {
                let lit = *literals.get(used).ok_or(NetcError::Corrupt)?;
                used += 1;
                lit
            };
            out[i] = b;
            prev = b;
        }
        Ok(used)
    }

    /// Post-packet confidence walk over the original bytes.
    ///
    /// Hits saturate upward, misses decay; a slot already at confidence 1
    /// is overwritten by the miss and restarts at 1. Empty slots adopt the
    /// observed byte immediately. Both endpoints run this over identical
    /// data, so their tables stay bit-identical.
    pub fn adapt_update(&mut self, data: &[u8]) {
        let mut prev = 0u8;
        for (i, &b) in data.iter().enumerate() {
            let e = &mut self.entries[context_hash(prev, i)];
            if e.confidence == 0 {
                *e = LzpEntry { predicted: b, confidence: 1 };
            } else if e.predicted == b {
                e.confidence = e.confidence.saturating_add(1);
            } else if e.confidence == 1 {
                *e = LzpEntry { predicted: b, confidence: 1 };
            } else {
                e.confidence -= 1;
            }
            prev = b;
        }
    }
}

/// Flag bytes needed for `n` input bytes.
#[inline]
pub fn flag_bytes(n: usize) -> usize {
    n.div_ceil(8)
}
