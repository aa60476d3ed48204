//! Context configuration.

use crate::utils::error::{NetcError, Result};

/// SIMD back-end request; `Auto` resolves at context creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SimdLevel {
    #[default]
    Auto,
    Generic,
    Sse42,
    Avx2,
    Neon,
}

/// Per-context feature flags and tunables.
///
/// `stateful` and `stateless` are mutually exclusive; exactly one must be
/// set. Delta prediction and adaptive learning need cross-packet state and
/// are therefore stateful-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Keep a ring-buffer history; packets are correlated in order.
    pub stateful: bool,
    /// Every call is self-contained.
    pub stateless: bool,
    /// Try inter-packet delta prediction (order-1 and order-2).
    pub delta: bool,
    /// Try the bigram-PCTX candidate.
    pub bigram: bool,
    /// Accumulate statistics.
    pub stats: bool,
    /// 2/4-byte headers and 16-bit tANS states on the wire.
    pub compact_header: bool,
    /// Single-pass compression: trade up to ~10% ratio for throughput.
    pub fast_compress: bool,
    /// Cross-packet frequency and LZP learning (requires `stateful`).
    pub adaptive: bool,
    /// History size in bytes; 0 selects the 64 KB default.
    pub ring_buffer_size: usize,
    /// 0 = fastest .. 9 = best ratio; 5 is the default trial set.
    pub compression_level: u8,
    pub simd_level: SimdLevel,
    /// Scratch-arena size in bytes; 0 selects the computed default.
    /// An explicit size below the minimum the feature set needs is
    /// rejected at creation.
    pub arena_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            stateful: true,
            stateless: false,
            delta: true,
            bigram: true,
            stats: false,
            compact_header: false,
            fast_compress: false,
            adaptive: false,
            ring_buffer_size: 0,
            compression_level: 5,
            simd_level: SimdLevel::Auto,
            arena_size: 0,
        }
    }
}

/// Default ring-buffer capacity.
pub const DEFAULT_RING_SIZE: usize = 64 * 1024;

impl Config {
    /// Configuration for fully independent per-call operation.
    pub fn stateless() -> Self {
        Self {
            stateful: false,
            stateless: true,
            delta: false,
            adaptive: false,
            ..Self::default()
        }
    }

    /// Validate flag interactions.
    pub fn validate(&self) -> Result<()> {
        if self.stateful == self.stateless {
            return Err(NetcError::InvalidArg);
        }
        if self.stateless && (self.delta || self.adaptive) {
            return Err(NetcError::InvalidArg);
        }
        if self.adaptive && !self.stateful {
            return Err(NetcError::InvalidArg);
        }
        if self.compression_level > 9 {
            return Err(NetcError::InvalidArg);
        }
        Ok(())
    }

    pub fn ring_size(&self) -> usize {
        if self.ring_buffer_size == 0 { DEFAULT_RING_SIZE } else { self.ring_buffer_size }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(Config::default().validate().is_ok());
        assert!(Config::stateless().validate().is_ok());
    }

    #[test]
    fn test_mode_exclusivity() {
        let mut cfg = Config::default();
        cfg.stateless = true;
        assert_eq!(cfg.validate(), Err(NetcError::InvalidArg));
        cfg.stateful = false;
        cfg.stateless = false;
        assert_eq!(cfg.validate(), Err(NetcError::InvalidArg));
    }

    #[test]
    fn test_stateless_excludes_state_features() {
        let mut cfg = Config::stateless();
        cfg.delta = true;
        assert!(cfg.validate().is_err());
        let mut cfg = Config::stateless();
        cfg.adaptive = true;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_level_range() {
        let mut cfg = Config::default();
        cfg.compression_level = 10;
        assert!(cfg.validate().is_err());
    }
}
