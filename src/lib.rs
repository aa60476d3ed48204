//! # netc
//!
//! Compression for low-entropy binary network packets (1–65535 bytes) at
//! wire speed: game netcode, telemetry, real-time protocols. Each payload is
//! compressed into a self-describing packet with a 2–8 byte header; output
//! never exceeds the input by more than the header size.
//!
//! Against general-purpose compressors, netc's edge comes from offline
//! trained per-position probability models, inter-packet delta prediction,
//! and a bit-exact multi-codec competition per packet.
//!
//! The library is organized into several modules:
//! - `utils`: error handling, CRC32, the bitstream reader/writer, SIMD dispatch
//! - `model`: probability models (tANS tables, LZP prediction, bigram classes)
//! - `dict`: the trained dictionary bundle and its serialized blob form
//! - `codec`: delta/RLE/LZ77 transforms, packet headers, compress/decompress
//! - `context`: per-connection state: configuration, arena, ring buffer,
//!   adaptive learning
//!
//! ## Quick start
//!
//! ```no_run
//! use netc::{Config, Context, Dictionary};
//! use std::sync::Arc;
//!
//! let corpus: Vec<Vec<u8>> = vec![vec![0u8; 64]; 32];
//! let packets: Vec<&[u8]> = corpus.iter().map(|p| p.as_slice()).collect();
//! let dict = Arc::new(Dictionary::train(&packets, 1).unwrap());
//!
//! let mut enc = Context::new(Some(dict.clone()), Config::default()).unwrap();
//! let mut dec = Context::new(Some(dict), Config::default()).unwrap();
//!
//! let src = [7u8; 64];
//! let mut wire = vec![0u8; netc::max_compressed_size(src.len())];
//! let n = enc.compress(&src, &mut wire).unwrap();
//!
//! let mut out = vec![0u8; 64];
//! let m = dec.decompress(&wire[..n], &mut out).unwrap();
//! assert_eq!(&out[..m], &src[..]);
//! ```

// Re-export commonly used types at the crate root
pub use utils::error::{ErrorCode, NetcError, Result};

pub use context::config::{Config, SimdLevel};
pub use context::ctx::Context;
pub use context::stats::Stats;
pub use dict::dictionary::Dictionary;

pub mod utils {
    pub mod bitstream;
    pub mod crc32;
    pub mod error;
    pub mod simd;
}

pub mod model {
    pub mod bigram;
    pub mod buckets;
    pub mod freq;
    pub mod lzp;
    pub mod tans;
}

pub mod dict {
    pub mod blob;
    pub mod dictionary;
}

pub mod codec {
    pub mod compress;
    pub mod decompress;
    pub mod delta;
    pub mod header;
    pub mod lz77;
    pub mod rle;
}

pub mod context {
    pub mod adaptive;
    pub mod arena;
    pub mod config;
    pub mod ctx;
    pub mod ring;
    pub mod stats;
}

use std::sync::Arc;

/// Worst-case growth over the payload: the legacy 8-byte header.
///
/// Sizing `dst` to `max_compressed_size(src.len())` guarantees `compress`
/// can always emit a packet, whatever header format the context uses.
pub fn max_compressed_size(src_size: usize) -> usize {
    src_size + codec::header::LEGACY_HEADER_SIZE
}

/// One-shot stateless compression against a shared dictionary.
///
/// Every call is fully independent: no ring buffer, no delta prediction, no
/// adaptive learning. The output decompresses with [`decompress_stateless`]
/// (or any stateless context built over the same dictionary).
pub fn compress_stateless(dict: &Arc<Dictionary>, src: &[u8], dst: &mut [u8]) -> Result<usize> {
    let mut ctx = Context::new(Some(dict.clone()), Config::stateless())?;
    ctx.compress(src, dst)
}

/// One-shot stateless decompression; inverse of [`compress_stateless`].
pub fn decompress_stateless(dict: &Arc<Dictionary>, src: &[u8], dst: &mut [u8]) -> Result<usize> {
    let mut ctx = Context::new(Some(dict.clone()), Config::stateless())?;
    ctx.decompress(src, dst)
}
