//! Per-context statistics (gated by the `stats` config flag).

/// Accumulated counters for one context.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    pub packets_compressed: u64,
    pub packets_decompressed: u64,
    /// Raw payload bytes seen by `compress` plus bytes produced by
    /// `decompress`.
    pub bytes_in: u64,
    /// Wire bytes produced by `compress` plus wire bytes consumed by
    /// `decompress`.
    pub bytes_out: u64,
    /// Packets that fell through to verbatim emission.
    pub passthrough_count: u64,
}

impl Stats {
    /// Overall compression ratio so far (wire / raw), or 1.0 before any
    /// traffic.
    pub fn ratio(&self) -> f64 {
        if self.bytes_in == 0 {
            1.0
        } else {
            self.bytes_out as f64 / self.bytes_in as f64
        }
    }
}
