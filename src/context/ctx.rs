//! The per-connection compression context.
//!
//! One context per logical stream (per direction if traffic is
//! asymmetric). Not thread-safe; the dictionary it references is shared
//! read-only and must outlive it. All working memory is allocated here,
//! once; compress/decompress never touch the allocator.

use std::sync::Arc;

use crate::codec::{compress, decompress};
use crate::context::adaptive::AdaptiveState;
use crate::context::arena::Arena;
use crate::context::config::Config;
use crate::context::ring::RingBuffer;
use crate::context::stats::Stats;
use crate::dict::dictionary::{Dictionary, MAX_PACKET_SIZE};
use crate::utils::error::{NetcError, Result};
use crate::utils::simd::Dispatch;

pub struct Context {
    pub(crate) dict: Option<Arc<Dictionary>>,
    pub(crate) cfg: Config,
    pub(crate) dispatch: Dispatch,
    pub(crate) arena: Arena,
    pub(crate) ring: Option<RingBuffer>,
    /// Previous packet, for order-1 delta.
    pub(crate) prev: Vec<u8>,
    /// Packet before that, for order-2 delta.
    pub(crate) prev2: Vec<u8>,
    /// Wrapping packet counter; on the wire only in legacy headers.
    pub(crate) seq: u8,
    pub(crate) adaptive: Option<AdaptiveState>,
    pub(crate) stats: Stats,
}

impl Context {
    /// Create a context over a shared dictionary.
    ///
    /// `dict` may be `None`: such a context runs only the raw-byte codecs
    /// (passthrough, RLE, LZ77) and stamps packets with the reserved model
    /// id 0. Adaptive learning requires a dictionary.
    pub fn new(dict: Option<Arc<Dictionary>>, cfg: Config) -> Result<Self> {
        cfg.validate()?;
        if cfg.adaptive && dict.is_none() {
            return Err(NetcError::InvalidArg);
        }
        let ring_size = if cfg.stateful { cfg.ring_size() } else { 0 };
        let arena = Arena::new(cfg.arena_size, ring_size)?;
        let adaptive = if cfg.adaptive {
            dict.as_deref().map(AdaptiveState::new)
        } else {
            None
        };
        let (prev, prev2) = if cfg.stateful {
            (Vec::with_capacity(MAX_PACKET_SIZE), Vec::with_capacity(MAX_PACKET_SIZE))
        } else {
            (Vec::new(), Vec::new())
        };
        Ok(Self {
            dispatch: Dispatch::resolve(cfg.simd_level),
            ring: cfg.stateful.then(|| RingBuffer::new(ring_size)),
            dict,
            cfg,
            arena,
            prev,
            prev2,
            seq: 0,
            adaptive,
            stats: Stats::default(),
        })
    }

    /// Return to the freshly-created state without reallocating: zeroes
    /// the ring, the prev/prev2 slots, the sequence counter, and re-clones
    /// the adaptive state from the dictionary baseline.
    pub fn reset(&mut self) {
        if let Some(ring) = &mut self.ring {
            ring.clear();
        }
        self.prev.clear();
        self.prev2.clear();
        self.seq = 0;
        if let (Some(adaptive), Some(dict)) = (&mut self.adaptive, self.dict.as_deref()) {
            adaptive.reset(dict);
        }
        self.stats = Stats::default();
    }

    /// Accumulated statistics; `Unsupported` unless enabled at creation.
    pub fn stats(&self) -> Result<Stats> {
        if self.cfg.stats { Ok(self.stats) } else { Err(NetcError::Unsupported) }
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    pub fn dictionary(&self) -> Option<&Arc<Dictionary>> {
        self.dict.as_ref()
    }

    /// Compress one payload into `dst`; returns the packet size.
    ///
    /// `dst` must hold at least `src.len() + HEADER_MAX` bytes. On success
    /// the context state (ring, prev/prev2, sequence, adaptive tables)
    /// advances; on error nothing changes.
    pub fn compress(&mut self, src: &[u8], dst: &mut [u8]) -> Result<usize> {
        compress::run(self, src, dst)
    }

    /// Decompress one packet into `dst`; returns the payload size.
    ///
    /// Fully defensive: arbitrary input either round-trips or fails with
    /// `Corrupt`/`Version` without writing `dst` or advancing state.
    pub fn decompress(&mut self, src: &[u8], dst: &mut [u8]) -> Result<usize> {
        decompress::run(self, src, dst)
    }

    /// Shared post-success bookkeeping for both directions.
    pub(crate) fn commit_packet(&mut self, original: &[u8]) {
        if let Some(ring) = &mut self.ring {
            ring.append(original);
        }
        if self.cfg.stateful {
            std::mem::swap(&mut self.prev2, &mut self.prev);
            self.prev.clear();
            self.prev.extend_from_slice(original);
        }
        self.seq = self.seq.wrapping_add(1);
        if let (Some(adaptive), Some(dict)) = (&mut self.adaptive, self.dict.clone()) {
            adaptive.observe(original, &dict);
        }
    }
}
