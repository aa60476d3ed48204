//! Bit-level I/O for the entropy-coded payload region.
//!
//! The writer packs LSB-first through a 64-bit accumulator and seals the
//! stream with a single 1-bit sentinel plus zero padding. The reader walks
//! the same bytes backward: it locates the sentinel in the last byte, then
//! hands back values in reverse write order (last written, first read).
//! That LIFO pairing is exactly what the tANS loops rely on: the encoder
//! emits bits right-to-left over the payload, the decoder consumes them
//! left-to-right.

use crate::utils::error::{NetcError, Result};

/// Widest single write/read, in bits.
pub const MAX_BITS: u32 = 24;

/// LSB-first bit packer over a caller-supplied byte buffer.
///
/// Capacity is checked only when the accumulator flushes, never per write;
/// a flush past the end of the buffer fails with `BufSmall`.
pub struct BitWriter<'a> {
    dst: &'a mut [u8],
    acc: u64,
    bits: u32,
    pos: usize,
}

impl<'a> BitWriter<'a> {
    pub fn new(dst: &'a mut [u8]) -> Self {
        Self { dst, acc: 0, bits: 0, pos: 0 }
    }

    /// Append the low `nb` bits of `value` (`nb <= 24`).
    #[inline]
    pub fn write(&mut self, value: u32, nb: u32) -> Result<()> {
        debug_assert!(nb <= MAX_BITS);
        if nb == 0 {
            return Ok(());
        }
        self.acc |= ((value as u64) & ((1u64 << nb) - 1)) << self.bits;
        self.bits += nb;
        while self.bits >= 32 {
            if self.pos + 4 > self.dst.len() {
                return Err(NetcError::BufSmall);
            }
            self.dst[self.pos..self.pos + 4].copy_from_slice(&(self.acc as u32).to_le_bytes());
            self.pos += 4;
            self.acc >>= 32;
            self.bits -= 32;
        }
        Ok(())
    }

    /// Seal the stream: append the 1-bit sentinel, pad to a byte boundary,
    /// and return the total number of bytes produced.
    pub fn close(mut self) -> Result<usize> {
        self.write(1, 1)?;
        while self.bits > 0 {
            if self.pos >= self.dst.len() {
                return Err(NetcError::BufSmall);
            }
            self.dst[self.pos] = self.acc as u8;
            self.pos += 1;
            self.acc >>= 8;
            self.bits = self.bits.saturating_sub(8);
        }
        Ok(self.pos)
    }

    /// Bytes flushed so far (excluding bits still in the accumulator).
    pub fn bytes_flushed(&self) -> usize {
        self.pos
    }
}

/// Backward bit reader over a sealed stream.
///
/// Reads return the values of the corresponding writes in reverse order,
/// bit-exact. Exhausting the stream (reading past the first written bit)
/// fails with `Corrupt`, as does a final byte of zero (no sentinel).
pub struct BitReader<'a> {
    src: &'a [u8],
    /// Index of the next (lower) byte to pull into the accumulator.
    byte_pos: usize,
    acc: u64,
    bits: u32,
}

impl<'a> BitReader<'a> {
    /// Locate the sentinel and prefill the accumulator (>= 32 bits when the
    /// stream has them).
    pub fn new(src: &'a [u8]) -> Result<Self> {
        let last = *src.last().ok_or(NetcError::Corrupt)?;
        if last == 0 {
            return Err(NetcError::Corrupt);
        }
        let sentinel_bit = 7 - last.leading_zeros(); // 0..=7 within the last byte
        let mut rd = Self {
            src,
            byte_pos: src.len() - 1,
            acc: (last & ((1u8 << sentinel_bit) - 1)) as u64,
            bits: sentinel_bit,
        };
        while rd.bits < 32 && rd.byte_pos > 0 {
            rd.byte_pos -= 1;
            rd.acc = (rd.acc << 8) | rd.src[rd.byte_pos] as u64;
            rd.bits += 8;
        }
        Ok(rd)
    }

    /// Pull the next `nb` bits (`nb <= 24`); the stream's highest remaining
    /// bit becomes the returned value's MSB.
    #[inline]
    pub fn read(&mut self, nb: u32) -> Result<u32> {
        debug_assert!(nb <= MAX_BITS);
        if nb == 0 {
            return Ok(0);
        }
        while self.bits < nb {
            if self.byte_pos == 0 {
                return Err(NetcError::Corrupt);
            }
            self.byte_pos -= 1;
            self.acc = (self.acc << 8) | self.src[self.byte_pos] as u64;
            self.bits += 8;
        }
        self.bits -= nb;
        Ok(((self.acc >> self.bits) as u32) & ((1u32 << nb) - 1))
    }

    /// Bits still available to `read`.
    pub fn bits_remaining(&self) -> u32 {
        self.bits + 8 * self.byte_pos as u32
    }
}
