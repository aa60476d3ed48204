//! Packet headers and the packet-type space.
//!
//! Two header formats exist and both sides must agree up front:
//!
//! - **Legacy** (8 bytes): original size, compressed size, flags byte,
//!   algorithm byte (bucket in the high nibble), model id, sequence
//!   counter.
//! - **Compact** (2 or 4 bytes): a packet-type byte that fuses flags and
//!   algorithm, then `[E:1][size_low:7]`: sizes up to 128 inline, larger
//!   ones as a trailing u16.
//!
//! The compact type space enumerates exactly 144 valid combinations; every
//! other byte is `Reserved` and rejected as corrupt. MREG types are
//! decoded (legacy dictionaries emitted them) but never produced here.

use byteorder::{ByteOrder, LittleEndian};

use crate::model::buckets::NUM_BUCKETS;
use crate::utils::error::{NetcError, Result};

pub const LEGACY_HEADER_SIZE: usize = 8;
pub const COMPACT_HEADER_MAX: usize = 4;

/// Count of valid compact packet types.
pub const VALID_PACKET_TYPES: usize = 144;

/// Inter-packet delta applied before the payload codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeltaMode {
    #[default]
    None,
    Order1,
    Order2,
}

impl DeltaMode {
    fn index(self) -> u8 {
        match self {
            DeltaMode::None => 0,
            DeltaMode::Order1 => 1,
            DeltaMode::Order2 => 2,
        }
    }

    fn from_index(i: u8) -> Option<Self> {
        match i {
            0 => Some(DeltaMode::None),
            1 => Some(DeltaMode::Order1),
            2 => Some(DeltaMode::Order2),
            _ => None,
        }
    }
}

/// Literal-block coding for the LZP flag-bit algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LitMode {
    #[default]
    Raw,
    Tans,
    TansX2,
}

impl LitMode {
    fn index(self) -> u8 {
        match self {
            LitMode::Raw => 0,
            LitMode::Tans => 1,
            LitMode::TansX2 => 2,
        }
    }

    fn from_index(i: u8) -> Option<Self> {
        match i {
            0 => Some(LitMode::Raw),
            1 => Some(LitMode::Tans),
            2 => Some(LitMode::TansX2),
            _ => None,
        }
    }
}

/// Payload codec selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    Passthrough,
    Rle,
    Lz77,
    /// Single-region tANS over one bucket's primary table.
    Tans,
    /// Per-position-context tANS over the 16-bucket schedule.
    TansPctx,
    /// Legacy multi-region; decodes via the PCTX path, never emitted.
    TansMreg,
    /// Bigram-conditioned PCTX.
    TansBigram,
    /// LZP flag-bit stream.
    LzpFlag,
    /// 10-bit single-region tANS (compact small packets).
    Tans10,
}

impl Algorithm {
    pub fn id(self) -> u8 {
        match self {
            Algorithm::Passthrough => 0,
            Algorithm::Rle => 1,
            Algorithm::Lz77 => 2,
            Algorithm::Tans => 3,
            Algorithm::TansPctx => 4,
            Algorithm::TansMreg => 5,
            Algorithm::TansBigram => 6,
            Algorithm::LzpFlag => 7,
            Algorithm::Tans10 => 8,
        }
    }

    fn from_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(Algorithm::Passthrough),
            1 => Some(Algorithm::Rle),
            2 => Some(Algorithm::Lz77),
            3 => Some(Algorithm::Tans),
            4 => Some(Algorithm::TansPctx),
            5 => Some(Algorithm::TansMreg),
            6 => Some(Algorithm::TansBigram),
            7 => Some(Algorithm::LzpFlag),
            8 => Some(Algorithm::Tans10),
            _ => None,
        }
    }
}

/// Everything the header says about how the payload was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketKind {
    pub algorithm: Algorithm,
    pub delta: DeltaMode,
    /// XOR pre-filter applied between delta and the payload codec.
    pub lzp_xor: bool,
    /// Dual-interleaved tANS states.
    pub x2: bool,
    /// Bucket index for the single-region algorithms.
    pub bucket: u8,
    /// Literal coding for `LzpFlag`.
    pub lit: LitMode,
}

impl PacketKind {
    pub fn plain(algorithm: Algorithm) -> Self {
        Self {
            algorithm,
            delta: DeltaMode::None,
            lzp_xor: false,
            x2: false,
            bucket: 0,
            lit: LitMode::Raw,
        }
    }

    /// Number of tANS states this packet carries in front of its payload.
    pub fn state_count(&self) -> usize {
        match self.algorithm {
            Algorithm::Tans | Algorithm::TansPctx | Algorithm::TansMreg | Algorithm::Tans10 => {
                if self.x2 { 2 } else { 1 }
            }
            Algorithm::TansBigram => {
                if self.x2 { 2 } else { 1 }
            }
            Algorithm::LzpFlag => match self.lit {
                LitMode::Raw => 0,
                LitMode::Tans => 1,
                LitMode::TansX2 => 2,
            },
            _ => 0,
        }
    }
}

/// Compact packet-type byte for a kind, `None` when the combination is not
/// in the 144-entry table (such kinds are never emitted).
pub fn packet_type_of(kind: &PacketKind) -> Option<u8> {
    let d = kind.delta.index();
    match kind.algorithm {
        Algorithm::Tans => {
            if kind.lzp_xor || kind.lit != LitMode::Raw || kind.delta == DeltaMode::Order2 {
                return None;
            }
            if kind.bucket as usize >= NUM_BUCKETS {
                return None;
            }
            let d1 = u8::from(kind.delta == DeltaMode::Order1);
            Some((kind.bucket << 2) | (d1 << 1) | u8::from(kind.x2))
        }
        Algorithm::TansPctx | Algorithm::TansMreg => {
            if kind.lit != LitMode::Raw || kind.bucket != 0 {
                return None;
            }
            let base = if kind.algorithm == Algorithm::TansPctx { 0x40 } else { 0x90 };
            Some(base + ((u8::from(kind.lzp_xor) << 3) | (d << 1) | u8::from(kind.x2)))
        }
        Algorithm::Passthrough => {
            (*kind == PacketKind::plain(Algorithm::Passthrough)).then_some(0x60)
        }
        Algorithm::Rle => {
            if kind.lzp_xor || kind.x2 || kind.bucket != 0 || kind.lit != LitMode::Raw {
                return None;
            }
            Some(0x61 + d)
        }
        Algorithm::Lz77 => {
            if kind.lzp_xor || kind.x2 || kind.bucket != 0 || kind.lit != LitMode::Raw {
                return None;
            }
            Some(0x64 + d)
        }
        Algorithm::LzpFlag => {
            if kind.lzp_xor || kind.x2 || kind.bucket != 0 {
                return None;
            }
            Some(0x70 + ((kind.lit.index() << 2) | d))
        }
        Algorithm::Tans10 => {
            if kind.lzp_xor || kind.x2 || kind.lit != LitMode::Raw || kind.delta == DeltaMode::Order2 {
                return None;
            }
            if kind.bucket as usize >= NUM_BUCKETS {
                return None;
            }
            let d1 = u8::from(kind.delta == DeltaMode::Order1);
            Some(0xB0 + ((kind.bucket << 1) | d1))
        }
        Algorithm::TansBigram => {
            if kind.bucket != 0 || kind.lit != LitMode::Raw {
                return None;
            }
            match (kind.delta, kind.lzp_xor, kind.x2) {
                (DeltaMode::None, false, false) => Some(0xD0),
                (DeltaMode::Order1, false, false) => Some(0xD1),
                (DeltaMode::None, true, false) => Some(0xD2),
                (DeltaMode::Order1, true, false) => Some(0xD3),
                (DeltaMode::Order2, false, false) => Some(0xD4),
                (DeltaMode::Order2, true, false) => Some(0xD5),
                (DeltaMode::Order2, false, true) => Some(0xD6),
                (DeltaMode::Order2, true, true) => Some(0xD7),
                _ => None,
            }
        }
    }
}

/// Total decode function over the packet-type byte; `None` is reserved.
pub fn parse_packet_type(byte: u8) -> Option<PacketKind> {
    match byte {
        0x00..=0x3F => {
            let mut kind = PacketKind::plain(Algorithm::Tans);
            kind.bucket = byte >> 2;
            kind.delta = if byte & 0x02 != 0 { DeltaMode::Order1 } else { DeltaMode::None };
            kind.x2 = byte & 0x01 != 0;
            Some(kind)
        }
        0x40..=0x4F | 0x90..=0x9F => {
            let idx = byte & 0x0F;
            let delta = DeltaMode::from_index((idx >> 1) & 0x03)?;
            let algorithm = if byte < 0x90 { Algorithm::TansPctx } else { Algorithm::TansMreg };
            let mut kind = PacketKind::plain(algorithm);
            kind.lzp_xor = idx & 0x08 != 0;
            kind.delta = delta;
            kind.x2 = idx & 0x01 != 0;
            Some(kind)
        }
        0x60 => Some(PacketKind::plain(Algorithm::Passthrough)),
        0x61..=0x63 => {
            let mut kind = PacketKind::plain(Algorithm::Rle);
            kind.delta = DeltaMode::from_index(byte - 0x61)?;
            Some(kind)
        }
        0x64..=0x66 => {
            let mut kind = PacketKind::plain(Algorithm::Lz77);
            kind.delta = DeltaMode::from_index(byte - 0x64)?;
            Some(kind)
        }
        0x70..=0x8F => {
            let idx = byte - 0x70;
            let lit = LitMode::from_index(idx >> 2)?;
            let delta = DeltaMode::from_index(idx & 0x03)?;
            let mut kind = PacketKind::plain(Algorithm::LzpFlag);
            kind.lit = lit;
            kind.delta = delta;
            Some(kind)
        }
        0xB0..=0xCF => {
            let idx = byte - 0xB0;
            let mut kind = PacketKind::plain(Algorithm::Tans10);
            kind.bucket = idx >> 1;
            kind.delta = if idx & 1 != 0 { DeltaMode::Order1 } else { DeltaMode::None };
            Some(kind)
        }
        0xD0..=0xD7 => {
            let mut kind = PacketKind::plain(Algorithm::TansBigram);
            let (delta, lzp, x2) = match byte {
                0xD0 => (DeltaMode::None, false, false),
                0xD1 => (DeltaMode::Order1, false, false),
                0xD2 => (DeltaMode::None, true, false),
                0xD3 => (DeltaMode::Order1, true, false),
                0xD4 => (DeltaMode::Order2, false, false),
                0xD5 => (DeltaMode::Order2, true, false),
                0xD6 => (DeltaMode::Order2, false, true),
                _ => (DeltaMode::Order2, true, true),
            };
            kind.delta = delta;
            kind.lzp_xor = lzp;
            kind.x2 = x2;
            Some(kind)
        }
        _ => None,
    }
}

// Legacy flags-byte bits.
const LF_DELTA: u8 = 0x01;
const LF_LZP: u8 = 0x02;
const LF_X2: u8 = 0x04;
/// Historically the RLE bit; repurposed to mark order-2 delta.
const LF_ORDER2: u8 = 0x08;
const LF_LIT_TANS: u8 = 0x10;
const LF_LIT_TANS_X2: u8 = 0x20;

fn legacy_flags_of(kind: &PacketKind) -> u8 {
    let mut f = 0u8;
    match kind.delta {
        DeltaMode::None => {}
        DeltaMode::Order1 => f |= LF_DELTA,
        DeltaMode::Order2 => f |= LF_DELTA | LF_ORDER2,
    }
    if kind.lzp_xor {
        f |= LF_LZP;
    }
    if kind.x2 {
        f |= LF_X2;
    }
    match kind.lit {
        LitMode::Raw => {}
        LitMode::Tans => f |= LF_LIT_TANS,
        LitMode::TansX2 => f |= LF_LIT_TANS_X2,
    }
    f
}

fn legacy_flags_parse(flags: u8, algorithm: Algorithm, bucket: u8) -> Option<PacketKind> {
    if flags & !(LF_DELTA | LF_LZP | LF_X2 | LF_ORDER2 | LF_LIT_TANS | LF_LIT_TANS_X2) != 0 {
        return None;
    }
    let delta = match (flags & LF_DELTA != 0, flags & LF_ORDER2 != 0) {
        (false, false) => DeltaMode::None,
        (true, false) => DeltaMode::Order1,
        (true, true) => DeltaMode::Order2,
        (false, true) => return None,
    };
    let lit = match (flags & LF_LIT_TANS != 0, flags & LF_LIT_TANS_X2 != 0) {
        (false, false) => LitMode::Raw,
        (true, false) => LitMode::Tans,
        (false, true) => LitMode::TansX2,
        (true, true) => return None,
    };
    let kind = PacketKind {
        algorithm,
        delta,
        lzp_xor: flags & LF_LZP != 0,
        x2: flags & LF_X2 != 0,
        bucket,
        lit,
    };
    // The legacy byte pair must express the same set of combinations the
    // compact table enumerates.
    packet_type_of(&kind).map(|_| kind)
}

/// Parsed header, either format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedHeader {
    pub kind: PacketKind,
    pub original_size: usize,
    /// Bytes of header consumed; the payload starts here.
    pub header_size: usize,
    /// Legacy only: the model id the packet claims.
    pub model_id: Option<u8>,
    /// Legacy only: the sender's sequence counter.
    pub seq: Option<u8>,
}

/// Emit a legacy 8-byte header.
pub fn write_legacy(
    dst: &mut [u8],
    kind: &PacketKind,
    original_size: usize,
    compressed_size: usize,
    model_id: u8,
    seq: u8,
) -> Result<usize> {
    if dst.len() < LEGACY_HEADER_SIZE {
        return Err(NetcError::BufSmall);
    }
    LittleEndian::write_u16(&mut dst[0..2], original_size as u16);
    LittleEndian::write_u16(&mut dst[2..4], compressed_size as u16);
    dst[4] = legacy_flags_of(kind);
    dst[5] = (kind.bucket << 4) | kind.algorithm.id();
    dst[6] = model_id;
    dst[7] = seq;
    Ok(LEGACY_HEADER_SIZE)
}

/// Parse and validate a legacy header. The payload length implied by the
/// compressed-size field must match what physically follows.
pub fn parse_legacy(src: &[u8]) -> Result<ParsedHeader> {
    if src.len() < LEGACY_HEADER_SIZE {
        return Err(NetcError::Corrupt);
    }
    let original_size = LittleEndian::read_u16(&src[0..2]) as usize;
    let compressed_size = LittleEndian::read_u16(&src[2..4]) as usize;
    let flags = src[4];
    let algorithm = Algorithm::from_id(src[5] & 0x0F).ok_or(NetcError::Corrupt)?;
    let bucket = src[5] >> 4;
    let kind = legacy_flags_parse(flags, algorithm, bucket).ok_or(NetcError::Corrupt)?;
    if compressed_size != src.len() - LEGACY_HEADER_SIZE {
        return Err(NetcError::Corrupt);
    }
    Ok(ParsedHeader {
        kind,
        original_size,
        header_size: LEGACY_HEADER_SIZE,
        model_id: Some(src[6]),
        seq: Some(src[7]),
    })
}

/// Emit a compact header; returns its size (2 or 4).
pub fn write_compact(dst: &mut [u8], kind: &PacketKind, original_size: usize) -> Result<usize> {
    let ty = packet_type_of(kind).ok_or(NetcError::InvalidArg)?;
    if original_size == 0 || original_size > u16::MAX as usize {
        return Err(NetcError::InvalidArg);
    }
    if original_size <= 128 {
        if dst.len() < 2 {
            return Err(NetcError::BufSmall);
        }
        dst[0] = ty;
        dst[1] = (original_size - 1) as u8;
        Ok(2)
    } else {
        if dst.len() < 4 {
            return Err(NetcError::BufSmall);
        }
        dst[0] = ty;
        dst[1] = 0x80;
        LittleEndian::write_u16(&mut dst[2..4], original_size as u16);
        Ok(4)
    }
}

/// Parse and validate a compact header.
pub fn parse_compact(src: &[u8]) -> Result<ParsedHeader> {
    if src.len() < 2 {
        return Err(NetcError::Corrupt);
    }
    let kind = parse_packet_type(src[0]).ok_or(NetcError::Corrupt)?;
    let (original_size, header_size) = if src[1] & 0x80 == 0 {
        ((src[1] & 0x7F) as usize + 1, 2)
    } else {
        if src[1] != 0x80 || src.len() < 4 {
            return Err(NetcError::Corrupt);
        }
        let size = LittleEndian::read_u16(&src[2..4]) as usize;
        // sizes up to 128 must use the short form
        if size <= 128 {
            return Err(NetcError::Corrupt);
        }
        (size, 4)
    };
    Ok(ParsedHeader { kind, original_size, header_size, model_id: None, seq: None })
}
