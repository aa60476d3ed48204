//! The compressor: a multi-codec competition per packet.
//!
//! The delta residual and the LZP-filtered forms are computed up front;
//! every enabled candidate then encodes into a scratch lane capped at the
//! best size seen so far, and the smallest payload wins. Candidates run in
//! ascending algorithm-id order with strict-improvement replacement, which
//! makes tie-breaking deterministic: equal sizes keep the lower id, so a
//! packet no codec can beat ships as passthrough and output never exceeds
//! `src + HEADER_MAX`.

use byteorder::{ByteOrder, LittleEndian};
use log::{debug, trace};

use crate::codec::header::{
    self, Algorithm, DeltaMode, LitMode, PacketKind, COMPACT_HEADER_MAX, LEGACY_HEADER_SIZE,
};
use crate::codec::{delta, lz77, rle};
use crate::context::ctx::Context;
use crate::dict::dictionary::{BigramView, Dictionary, MAX_PACKET_SIZE};
use crate::model::lzp::{flag_bytes, LzpTable};
use crate::model::tans::{self, TansTable};
use crate::utils::bitstream::BitWriter;
use crate::utils::error::{NetcError, Result};

/// Payloads below this go straight to passthrough; there is no separate
/// entropy probe; the competition itself is the arbiter above it.
pub(crate) const MIN_COMPRESS_SIZE: usize = 8;

/// Everything a candidate encoder needs to see.
struct EncEnv<'a> {
    compact: bool,
    primary: Option<&'a [TansTable]>,
    dict: Option<&'a Dictionary>,
    lzp: Option<&'a LzpTable>,
}

impl EncEnv<'_> {
    fn state_width(&self) -> usize {
        if self.compact { 2 } else { 4 }
    }
}

pub(crate) fn run(ctx: &mut Context, src: &[u8], dst: &mut [u8]) -> Result<usize> {
    if src.is_empty() {
        return Err(NetcError::InvalidArg);
    }
    if src.len() > MAX_PACKET_SIZE {
        return Err(NetcError::TooBig);
    }
    let cfg = ctx.cfg;
    let header_max = if cfg.compact_header { COMPACT_HEADER_MAX } else { LEGACY_HEADER_SIZE };
    if dst.len() < src.len() + header_max {
        return Err(NetcError::BufSmall);
    }

    let n = src.len();
    let count_zeros = ctx.dispatch.count_zeros;
    let level = cfg.compression_level;
    let fast = cfg.fast_compress || level <= 2;

    // Read-only model state; disjoint from the arena borrows below.
    let dict = ctx.dict.as_deref();
    let primary: Option<&[TansTable]> = match (&ctx.adaptive, dict) {
        (Some(a), _) => Some(&a.tables),
        (None, Some(d)) => Some(d.primary()),
        (None, None) => None,
    };
    let lzp: Option<&LzpTable> = match (&ctx.adaptive, dict) {
        (Some(a), _) => a.lzp.as_ref(),
        (None, Some(d)) => d.lzp(),
        (None, None) => None,
    };
    let env = EncEnv { compact: cfg.compact_header, primary, dict, lzp };

    let arena = &mut ctx.arena;
    let residual = &mut arena.residual;
    let filtered = &mut arena.filtered;
    let filtered2 = &mut arena.filtered2;
    let flags = &mut arena.flags;
    let lits = &mut arena.lits;
    let trial = &mut arena.trial;
    let best = &mut arena.best;
    let window = &mut arena.window;
    let heads = &mut arena.heads;

    // Delta residual, order chosen by zero-byte yield.
    let mut dmode = DeltaMode::None;
    if cfg.delta && cfg.stateful && !ctx.prev.is_empty() {
        delta::residual_order1(src, &ctx.prev, &mut residual[..n]);
        dmode = DeltaMode::Order1;
        if !ctx.prev2.is_empty() {
            delta::residual_order2(src, &ctx.prev, &ctx.prev2, &mut trial[..n]);
            if count_zeros(&trial[..n]) > count_zeros(&residual[..n]) {
                residual[..n].copy_from_slice(&trial[..n]);
                dmode = DeltaMode::Order2;
            }
        }
    }
    let have_resid = dmode != DeltaMode::None;

    // LZP pre-filtered forms of both codec inputs.
    if let Some(l) = env.lzp {
        l.filter_xor(src, &mut filtered[..n]);
        if have_resid {
            l.filter_xor(&residual[..n], &mut filtered2[..n]);
        }
    }

    // Frozen views of the prepared input forms; nothing below mutates them.
    let resid: Option<&[u8]> = have_resid.then_some(&residual[..n]);
    let filt: Option<&[u8]> = env.lzp.is_some().then_some(&filtered[..n]);
    let filt2: Option<&[u8]> =
        (env.lzp.is_some() && have_resid).then_some(&filtered2[..n]);

    // The incumbent is always passthrough.
    let mut best_kind = PacketKind::plain(Algorithm::Passthrough);
    let mut best_len = n;

    macro_rules! consider {
        ($kind:expr, $res:expr) => {
            match $res {
                Ok(len) if len < best_len => {
                    trace!("candidate {:?}: {} bytes (new best)", $kind.algorithm, len);
                    best_len = len;
                    best_kind = $kind;
                    std::mem::swap(trial, best);
                }
                Ok(len) => trace!("candidate {:?}: {} bytes", $kind.algorithm, len),
                Err(_) => {}
            }
        };
    }

    if n >= MIN_COMPRESS_SIZE && fast {
        // Single PCTX pass over the better of raw/residual.
        if let Some(tables) = env.primary {
            let (data, dm): (&[u8], DeltaMode) = match resid {
                Some(r) if count_zeros(r) > count_zeros(src) => (r, dmode),
                _ => (src, DeltaMode::None),
            };
            let mut kind = PacketKind::plain(Algorithm::TansPctx);
            kind.delta = dm;
            let cap = best_len.min(trial.len());
            consider!(kind, tans_payload(&env, &kind, tables, data, &mut trial[..cap]));
        } else {
            let cap = best_len.min(trial.len());
            let kind = PacketKind::plain(Algorithm::Rle);
            consider!(kind, rle::encode(src, &mut trial[..cap]).ok_or(NetcError::BufSmall));
        }
    } else if n >= MIN_COMPRESS_SIZE {
        // RLE, on raw and on the residual.
        {
            let kind = PacketKind::plain(Algorithm::Rle);
            let cap = best_len.min(trial.len());
            consider!(kind, rle::encode(src, &mut trial[..cap]).ok_or(NetcError::BufSmall));
        }
        if let Some(r) = resid {
            let mut kind = PacketKind::plain(Algorithm::Rle);
            kind.delta = dmode;
            let cap = best_len.min(trial.len());
            consider!(kind, rle::encode(r, &mut trial[..cap]).ok_or(NetcError::BufSmall));
        }

        // LZ77 over ring history + packet, payloads of 256 up.
        if level >= 5 && n >= 256 {
            let hist_len = match &ctx.ring {
                Some(ring) => ring.linearize_into(window),
                None => 0,
            };
            {
                let kind = PacketKind::plain(Algorithm::Lz77);
                let cap = best_len.min(trial.len());
                consider!(
                    kind,
                    lz77::encode(&window[..hist_len], src, heads, &mut trial[..cap])
                        .ok_or(NetcError::BufSmall)
                );
            }
            if let Some(r) = resid {
                let mut kind = PacketKind::plain(Algorithm::Lz77);
                kind.delta = dmode;
                let cap = best_len.min(trial.len());
                consider!(
                    kind,
                    lz77::encode(&window[..hist_len], r, heads, &mut trial[..cap])
                        .ok_or(NetcError::BufSmall)
                );
            }
        }

        // tANS single-region: best bucket(s) by estimated cost.
        if let Some(tables) = env.primary {
            let single_inputs: [(Option<&[u8]>, DeltaMode); 2] = [
                (Some(src), DeltaMode::None),
                (
                    if dmode == DeltaMode::Order1 { resid } else { None },
                    DeltaMode::Order1,
                ),
            ];
            for (data, dm) in single_inputs {
                let Some(data) = data else { continue };
                let (buckets, count) = best_buckets(tables, data, level >= 6);
                for &bucket in &buckets[..count] {
                    let mut kind = PacketKind::plain(Algorithm::Tans);
                    kind.bucket = bucket as u8;
                    kind.delta = dm;
                    let cap = best_len.min(trial.len());
                    consider!(kind, tans_payload(&env, &kind, tables, data, &mut trial[..cap]));
                    if n >= 2 {
                        kind.x2 = true;
                        let cap = best_len.min(trial.len());
                        consider!(kind, tans_payload(&env, &kind, tables, data, &mut trial[..cap]));
                    }
                }
            }
        }

        // PCTX on every prepared input form.
        if let Some(tables) = env.primary {
            let pctx_inputs: [(Option<&[u8]>, DeltaMode, bool); 4] = [
                (Some(src), DeltaMode::None, false),
                (resid, dmode, false),
                (filt, DeltaMode::None, true),
                (filt2, dmode, true),
            ];
            for (data, dm, lz) in pctx_inputs {
                let Some(data) = data else { continue };
                let mut kind = PacketKind::plain(Algorithm::TansPctx);
                kind.delta = dm;
                kind.lzp_xor = lz;
                let cap = best_len.min(trial.len());
                consider!(kind, tans_payload(&env, &kind, tables, data, &mut trial[..cap]));
                if n >= 2 {
                    kind.x2 = true;
                    let cap = best_len.min(trial.len());
                    consider!(kind, tans_payload(&env, &kind, tables, data, &mut trial[..cap]));
                }
            }
        }

        // Bigram-PCTX.
        if cfg.bigram && level >= 5 {
            if let (Some(tables), Some(d)) = (env.primary, env.dict) {
                if d.has_bigram() {
                    let bg_inputs: [(Option<&[u8]>, DeltaMode, bool); 4] = [
                        (Some(src), DeltaMode::None, false),
                        (resid, dmode, false),
                        (filt, DeltaMode::None, true),
                        (filt2, dmode, true),
                    ];
                    for (data, dm, lz) in bg_inputs {
                        let Some(data) = data else { continue };
                        let mut kind = PacketKind::plain(Algorithm::TansBigram);
                        kind.delta = dm;
                        kind.lzp_xor = lz;
                        let cap = best_len.min(trial.len());
                        consider!(kind, tans_payload(&env, &kind, tables, data, &mut trial[..cap]));
                        // X2 exists only in the order-2 corner of the type
                        // space.
                        if dm == DeltaMode::Order2 && n >= 2 {
                            kind.x2 = true;
                            let cap = best_len.min(trial.len());
                            consider!(
                                kind,
                                tans_payload(&env, &kind, tables, data, &mut trial[..cap])
                            );
                        }
                    }
                }
            }
        }

        // LZP flag-bit stream, literals raw or recompressed.
        if let Some(l) = env.lzp {
            let flag_inputs: [(Option<&[u8]>, DeltaMode); 2] =
                [(Some(src), DeltaMode::None), (resid, dmode)];
            for (data, dm) in flag_inputs {
                let Some(data) = data else { continue };
                let fb = flag_bytes(n);
                flags[..fb].fill(0);
                let n_lit = l.flag_split(data, &mut flags[..fb], lits);
                let lit_modes: &[LitMode] = if env.primary.is_some() {
                    &[LitMode::Raw, LitMode::Tans, LitMode::TansX2]
                } else {
                    &[LitMode::Raw]
                };
                for &lm in lit_modes {
                    if lm == LitMode::TansX2 && n_lit < 2 {
                        continue;
                    }
                    let mut kind = PacketKind::plain(Algorithm::LzpFlag);
                    kind.delta = dm;
                    kind.lit = lm;
                    let cap = best_len.min(trial.len());
                    consider!(
                        kind,
                        lzp_flag_payload(
                            &env,
                            lm,
                            n_lit,
                            &flags[..fb],
                            &lits[..n_lit],
                            &mut trial[..cap],
                        )
                    );
                }
            }
        }

        // 10-bit small-packet tables (compact mode only).
        if env.compact && n <= 128 {
            if let Some(d) = env.dict {
                let t10 = d.primary10();
                let t10_inputs: [(Option<&[u8]>, DeltaMode); 2] = [
                    (Some(src), DeltaMode::None),
                    (
                        if dmode == DeltaMode::Order1 { resid } else { None },
                        DeltaMode::Order1,
                    ),
                ];
                for (data, dm) in t10_inputs {
                    let Some(data) = data else { continue };
                    let (buckets, count) = best_buckets(t10, data, false);
                    for &bucket in &buckets[..count] {
                        let mut kind = PacketKind::plain(Algorithm::Tans10);
                        kind.bucket = bucket as u8;
                        kind.delta = dm;
                        let cap = best_len.min(trial.len());
                        consider!(kind, tans_payload(&env, &kind, t10, data, &mut trial[..cap]));
                    }
                }
            }
        }
    }

    // Emit: header, then the winning payload.
    let model_id = dict.map(|d| d.model_id()).unwrap_or(0);
    let hl = if cfg.compact_header {
        header::write_compact(dst, &best_kind, n)?
    } else {
        header::write_legacy(dst, &best_kind, n, best_len, model_id, ctx.seq)?
    };
    if best_kind.algorithm == Algorithm::Passthrough {
        dst[hl..hl + n].copy_from_slice(src);
    } else {
        dst[hl..hl + best_len].copy_from_slice(&best[..best_len]);
    }
    let total = hl + best_len;
    debug!(
        "compressed {} -> {} bytes ({:?}, delta {:?})",
        n, total, best_kind.algorithm, best_kind.delta
    );

    ctx.commit_packet(src);
    if cfg.stats {
        ctx.stats.packets_compressed += 1;
        ctx.stats.bytes_in += n as u64;
        ctx.stats.bytes_out += total as u64;
        if best_kind.algorithm == Algorithm::Passthrough {
            ctx.stats.passthrough_count += 1;
        }
    }
    Ok(total)
}

/// Pick the cheapest bucket table(s) for a single-region trial by summed
/// high-bit cost; `None` estimates (unencodable symbols) drop the bucket.
fn best_buckets(tables: &[TansTable], data: &[u8], want_two: bool) -> ([usize; 2], usize) {
    let mut out = [0usize; 2];
    let mut costs = [u64::MAX; 2];
    for (i, t) in tables.iter().enumerate() {
        if let Some(bits) = t.estimate_bits(data) {
            if bits < costs[0] {
                out[1] = out[0];
                costs[1] = costs[0];
                out[0] = i;
                costs[0] = bits;
            } else if bits < costs[1] {
                out[1] = i;
                costs[1] = bits;
            }
        }
    }
    let count = match (costs[0] != u64::MAX, want_two && costs[1] != u64::MAX) {
        (false, _) => 0,
        (true, false) => 1,
        (true, true) => 2,
    };
    (out, count)
}

/// Encode one tANS payload: `[state(s)][bitstream]`, states 16-bit in
/// compact mode and 32-bit in legacy mode.
fn tans_payload(
    env: &EncEnv<'_>,
    kind: &PacketKind,
    tables: &[TansTable],
    data: &[u8],
    out: &mut [u8],
) -> Result<usize> {
    let sw = env.state_width();
    let ns = kind.state_count();
    if out.len() < ns * sw + 1 {
        return Err(NetcError::BufSmall);
    }
    let (state_area, stream_area) = out.split_at_mut(ns * sw);
    let mut wr = BitWriter::new(stream_area);

    let mut states = [0u32; 2];
    match kind.algorithm {
        Algorithm::Tans | Algorithm::Tans10 => {
            let table = tables.get(kind.bucket as usize).ok_or(NetcError::InvalidArg)?;
            if kind.x2 {
                let (a, b) = tans::encode_x2(table, data, &mut wr)?;
                states = [a, b];
            } else {
                states[0] = tans::encode_single(table, data, &mut wr)?;
            }
        }
        Algorithm::TansPctx => {
            if kind.x2 {
                let (a, b) = tans::encode_pctx_x2(tables, data, &mut wr)?;
                states = [a, b];
            } else {
                states[0] = tans::encode_pctx(tables, data, &mut wr)?;
            }
        }
        Algorithm::TansBigram => {
            let d = env.dict.ok_or(NetcError::InvalidArg)?;
            let view = BigramView { dict: d, primary: tables };
            if kind.x2 {
                let (a, b) = tans::encode_bigram_x2(&view, data, &mut wr)?;
                states = [a, b];
            } else {
                states[0] = tans::encode_bigram(&view, data, &mut wr)?;
            }
        }
        _ => return Err(NetcError::InvalidArg),
    }
    let stream_len = wr.close()?;

    for (i, &st) in states[..ns].iter().enumerate() {
        if sw == 2 {
            LittleEndian::write_u16(&mut state_area[i * 2..i * 2 + 2], st as u16);
        } else {
            LittleEndian::write_u32(&mut state_area[i * 4..i * 4 + 4], st);
        }
    }
    Ok(ns * sw + stream_len)
}

/// Assemble an LZP flag-bit payload:
/// `[n_literals u16 LE][flag bitmap][literal block]`.
fn lzp_flag_payload(
    env: &EncEnv<'_>,
    lit_mode: LitMode,
    n_lit: usize,
    flags: &[u8],
    lits: &[u8],
    out: &mut [u8],
) -> Result<usize> {
    let base = 2 + flags.len();
    if out.len() < base {
        return Err(NetcError::BufSmall);
    }
    LittleEndian::write_u16(&mut out[0..2], n_lit as u16);
    out[2..base].copy_from_slice(flags);
    match lit_mode {
        LitMode::Raw => {
            if out.len() < base + n_lit {
                return Err(NetcError::BufSmall);
            }
            out[base..base + n_lit].copy_from_slice(lits);
            Ok(base + n_lit)
        }
        LitMode::Tans | LitMode::TansX2 => {
            let tables = env.primary.ok_or(NetcError::InvalidArg)?;
            let mut sub = PacketKind::plain(Algorithm::Tans);
            sub.x2 = lit_mode == LitMode::TansX2;
            let sub_len = tans_payload(env, &sub, tables, lits, &mut out[base..])?;
            Ok(base + sub_len)
        }
    }
}
