//! The decompressor: a security-hardened dispatcher.
//!
//! Every length, state and type read from the wire is validated before
//! use; the packet is decoded into arena staging and only copied to the
//! caller's buffer after every check passes, so an error never writes
//! `dst` or advances context state. tANS paths additionally require the
//! bitstream to be consumed exactly and the state chain to unwind to its
//! initial value, so truncated, padded or resized payloads fail closed.

use byteorder::{ByteOrder, LittleEndian};
use log::debug;

use crate::codec::header::{self, Algorithm, DeltaMode, LitMode};
use crate::codec::{delta, lz77, rle};
use crate::context::ctx::Context;
use crate::dict::dictionary::{BigramView, MAX_PACKET_SIZE};
use crate::model::lzp::flag_bytes;
use crate::model::tans;
use crate::utils::bitstream::BitReader;
use crate::utils::error::{NetcError, Result};

pub(crate) fn run(ctx: &mut Context, src: &[u8], dst: &mut [u8]) -> Result<usize> {
    let cfg = ctx.cfg;

    // Parse phase.
    let parsed = if cfg.compact_header {
        header::parse_compact(src)?
    } else {
        header::parse_legacy(src)?
    };
    let kind = parsed.kind;
    let n = parsed.original_size;
    if n == 0 || n > MAX_PACKET_SIZE {
        return Err(NetcError::Corrupt);
    }
    if n > dst.len() {
        return Err(NetcError::BufSmall);
    }

    let dict = ctx.dict.as_deref();
    if let Some(claimed) = parsed.model_id {
        let expected = dict.map(|d| d.model_id()).unwrap_or(0);
        if claimed != expected {
            return Err(NetcError::Version);
        }
    }
    if let (Some(seq), true) = (parsed.seq, cfg.stateful) {
        if seq != ctx.seq {
            return Err(NetcError::Corrupt);
        }
    }

    // A flag the sending side could not have set is corruption, not a
    // feature request.
    match kind.delta {
        DeltaMode::None => {}
        DeltaMode::Order1 => {
            if !cfg.stateful || ctx.prev.is_empty() {
                return Err(NetcError::Corrupt);
            }
        }
        DeltaMode::Order2 => {
            if !cfg.stateful || ctx.prev.is_empty() || ctx.prev2.is_empty() {
                return Err(NetcError::Corrupt);
            }
        }
    }

    let primary = match (&ctx.adaptive, dict) {
        (Some(a), _) => Some(a.tables.as_slice()),
        (None, Some(d)) => Some(d.primary()),
        (None, None) => None,
    };
    let lzp = match (&ctx.adaptive, dict) {
        (Some(a), _) => a.lzp.as_ref(),
        (None, Some(d)) => d.lzp(),
        (None, None) => None,
    };
    let needs_tables = matches!(
        kind.algorithm,
        Algorithm::Tans
            | Algorithm::TansPctx
            | Algorithm::TansMreg
            | Algorithm::TansBigram
            | Algorithm::Tans10
    );
    if needs_tables && (primary.is_none() || dict.is_none()) {
        return Err(NetcError::Corrupt);
    }
    if (kind.lzp_xor || kind.algorithm == Algorithm::LzpFlag) && lzp.is_none() {
        return Err(NetcError::Corrupt);
    }

    let payload = &src[parsed.header_size..];
    let staging = &mut ctx.arena.trial;
    let sw = if cfg.compact_header { 2 } else { 4 };

    // Dispatch phase: produce exactly `n` bytes into staging.
    match kind.algorithm {
        Algorithm::Passthrough => {
            if payload.len() != n {
                return Err(NetcError::Corrupt);
            }
            staging[..n].copy_from_slice(payload);
        }
        Algorithm::Rle => {
            rle::decode(payload, &mut staging[..n])?;
        }
        Algorithm::Lz77 => {
            let window = &mut ctx.arena.window;
            let hist_len = match &ctx.ring {
                Some(ring) => ring.linearize_into(window),
                None => 0,
            };
            lz77::decode(&window[..hist_len], payload, &mut staging[..n])?;
        }
        Algorithm::Tans
        | Algorithm::TansPctx
        | Algorithm::TansMreg
        | Algorithm::TansBigram
        | Algorithm::Tans10 => {
            let (states, stream) = read_states(payload, kind.state_count(), sw)?;
            let mut rd = BitReader::new(stream)?;
            let tables = primary.ok_or(NetcError::Corrupt)?;
            match kind.algorithm {
                Algorithm::Tans => {
                    let table =
                        tables.get(kind.bucket as usize).ok_or(NetcError::Corrupt)?;
                    if kind.x2 {
                        tans::decode_x2(table, &mut rd, (states[0], states[1]), &mut staging[..n])?;
                    } else {
                        tans::decode_single(table, &mut rd, states[0], &mut staging[..n])?;
                    }
                }
                Algorithm::Tans10 => {
                    let t10 = dict.ok_or(NetcError::Corrupt)?.primary10();
                    let table = t10.get(kind.bucket as usize).ok_or(NetcError::Corrupt)?;
                    if kind.x2 {
                        tans::decode_x2(table, &mut rd, (states[0], states[1]), &mut staging[..n])?;
                    } else {
                        tans::decode_single(table, &mut rd, states[0], &mut staging[..n])?;
                    }
                }
                // MREG survives only as a decode path; the bucket schedule
                // subsumed its region split, so it reads as PCTX.
                Algorithm::TansPctx | Algorithm::TansMreg => {
                    if kind.x2 {
                        tans::decode_pctx_x2(
                            tables,
                            &mut rd,
                            (states[0], states[1]),
                            &mut staging[..n],
                        )?;
                    } else {
                        tans::decode_pctx(tables, &mut rd, states[0], &mut staging[..n])?;
                    }
                }
                Algorithm::TansBigram => {
                    let view = BigramView {
                        dict: dict.ok_or(NetcError::Corrupt)?,
                        primary: tables,
                    };
                    if kind.x2 {
                        tans::decode_bigram_x2(
                            &view,
                            &mut rd,
                            (states[0], states[1]),
                            &mut staging[..n],
                        )?;
                    } else {
                        tans::decode_bigram(&view, &mut rd, states[0], &mut staging[..n])?;
                    }
                }
                _ => unreachable!(),
            }
            // The stream must account for every bit it carried.
            if rd.bits_remaining() != 0 {
                return Err(NetcError::Corrupt);
            }
        }
        Algorithm::LzpFlag => {
            let table = lzp.ok_or(NetcError::Corrupt)?;
            if payload.len() < 2 {
                return Err(NetcError::Corrupt);
            }
            let n_lit = LittleEndian::read_u16(&payload[0..2]) as usize;
            let fb = flag_bytes(n);
            if n_lit > n || payload.len() < 2 + fb {
                return Err(NetcError::Corrupt);
            }
            let flag_bits = &payload[2..2 + fb];
            let lit_block = &payload[2 + fb..];

            let lits_lane = &mut ctx.arena.lits;
            let literals: &[u8] = match kind.lit {
                LitMode::Raw => {
                    if lit_block.len() != n_lit {
                        return Err(NetcError::Corrupt);
                    }
                    lit_block
                }
                LitMode::Tans | LitMode::TansX2 => {
                    let x2 = kind.lit == LitMode::TansX2;
                    let (states, stream) =
                        read_states(lit_block, if x2 { 2 } else { 1 }, sw)?;
                    let mut rd = BitReader::new(stream)?;
                    let tables = primary.ok_or(NetcError::Corrupt)?;
                    let table = tables.first().ok_or(NetcError::Corrupt)?;
                    if x2 {
                        tans::decode_x2(
                            table,
                            &mut rd,
                            (states[0], states[1]),
                            &mut lits_lane[..n_lit],
                        )?;
                    } else {
                        tans::decode_single(table, &mut rd, states[0], &mut lits_lane[..n_lit])?;
                    }
                    if rd.bits_remaining() != 0 {
                        return Err(NetcError::Corrupt);
                    }
                    &lits_lane[..n_lit]
                }
            };
            let used = table.flag_reconstruct(flag_bits, literals, &mut staging[..n])?;
            if used != n_lit {
                return Err(NetcError::Corrupt);
            }
        }
    }

    // Inverse pre-filters, innermost first: XOR filter, then delta.
    if kind.lzp_xor {
        lzp.ok_or(NetcError::Corrupt)?.unfilter_xor(&mut staging[..n]);
    }
    match kind.delta {
        DeltaMode::None => {}
        DeltaMode::Order1 => delta::reconstruct_order1(&mut staging[..n], &ctx.prev),
        DeltaMode::Order2 => {
            delta::reconstruct_order2(&mut staging[..n], &ctx.prev, &ctx.prev2)
        }
    }

    dst[..n].copy_from_slice(&staging[..n]);
    debug!("decompressed {} -> {} bytes ({:?})", src.len(), n, kind.algorithm);

    // Post-emission: mirror the compressor's state updates exactly.
    ctx.commit_packet(&dst[..n]);
    if cfg.stats {
        ctx.stats.packets_decompressed += 1;
        ctx.stats.bytes_in += n as u64;
        ctx.stats.bytes_out += src.len() as u64;
    }
    Ok(n)
}

/// Split the leading state area off a tANS payload and decode the states.
fn read_states(payload: &[u8], count: usize, width: usize) -> Result<([u32; 2], &[u8])> {
    let bytes = count * width;
    if payload.len() < bytes {
        return Err(NetcError::Corrupt);
    }
    let mut states = [0u32; 2];
    for (i, st) in states[..count].iter_mut().enumerate() {
        *st = if width == 2 {
            u32::from(LittleEndian::read_u16(&payload[i * 2..i * 2 + 2]))
        } else {
            LittleEndian::read_u32(&payload[i * 4..i * 4 + 4])
        };
    }
    Ok((states, &payload[bytes..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_states_widths() {
        let payload = [0x01, 0x10, 0x02, 0x20, 0xEE];
        let (states, rest) = read_states(&payload, 2, 2).unwrap();
        assert_eq!(states[0], 0x1001);
        assert_eq!(states[1], 0x2002);
        assert_eq!(rest, &[0xEE]);

        let payload = [0x01, 0x10, 0x00, 0x00, 0xEE];
        let (states, rest) = read_states(&payload, 1, 4).unwrap();
        assert_eq!(states[0], 0x1001);
        assert_eq!(rest, &[0xEE]);

        assert!(read_states(&payload[..3], 1, 4).is_err());
    }
}
