//! Capability detection and routine dispatch.
//!
//! Detection runs once at context creation; the hot path never re-probes.
//! Every back-end must produce byte-identical output to the scalar
//! reference, so the wide variants below are chunked u64 scalar code: the
//! dispatch seam is where target-specific intrinsics would slot in without
//! touching any caller. CRC32 stays table-driven everywhere; the x86
//! `crc32` instruction computes the Castagnoli polynomial, which would
//! break dictionary-blob portability.

use crate::context::config::SimdLevel;

/// Routines resolved once per context.
#[derive(Clone, Copy)]
pub struct Dispatch {
    /// The level detection settled on (never `Auto`).
    pub level: SimdLevel,
    /// Count of zero bytes in `buf`; drives delta-order selection.
    pub count_zeros: fn(buf: &[u8]) -> usize,
}

impl Dispatch {
    /// Resolve `requested` against what the host actually supports.
    pub fn resolve(requested: SimdLevel) -> Self {
        let level = match requested {
            SimdLevel::Auto => detect_best(),
            other => {
                if supports(other) {
                    other
                } else {
                    SimdLevel::Generic
                }
            }
        };
        // All lanes currently share the scalar reference implementation.
        Self { level, count_zeros: count_zeros_scalar }
    }
}

fn detect_best() -> SimdLevel {
    #[cfg(target_arch = "x86_64")]
    {
        if std::arch::is_x86_feature_detected!("avx2") {
            return SimdLevel::Avx2;
        }
        if std::arch::is_x86_feature_detected!("sse4.2") {
            return SimdLevel::Sse42;
        }
    }
    #[cfg(target_arch = "aarch64")]
    {
        return SimdLevel::Neon;
    }
    #[allow(unreachable_code)]
    SimdLevel::Generic
}

fn supports(level: SimdLevel) -> bool {
    match level {
        SimdLevel::Auto | SimdLevel::Generic => true,
        #[cfg(target_arch = "x86_64")]
        SimdLevel::Sse42 => std::arch::is_x86_feature_detected!("sse4.2"),
        #[cfg(target_arch = "x86_64")]
        SimdLevel::Avx2 => std::arch::is_x86_feature_detected!("avx2"),
        #[cfg(target_arch = "aarch64")]
        SimdLevel::Neon => true,
        #[allow(unreachable_patterns)]
        _ => false,
    }
}

fn count_zeros_scalar(buf: &[u8]) -> usize {
    let mut count = 0;
    let mut chunks = buf.chunks_exact(8);
    for chunk in &mut chunks {
        let word = u64::from_le_bytes(chunk.try_into().unwrap());
        // SWAR zero-byte test
        let t = word.wrapping_sub(0x0101_0101_0101_0101) & !word & 0x8080_8080_8080_8080;
        count += t.count_ones() as usize;
    }
    count + chunks.remainder().iter().filter(|&&b| b == 0).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_never_auto() {
        let d = Dispatch::resolve(SimdLevel::Auto);
        assert_ne!(d.level, SimdLevel::Auto);
    }

    #[test]
    fn test_count_zeros_matches_naive() {
        let mut buf = vec![0u8; 100];
        for i in (0..100).step_by(3) {
            buf[i] = i as u8;
        }
        let naive = buf.iter().filter(|&&b| b == 0).count();
        assert_eq!(count_zeros_scalar(&buf), naive);
    }
}
