//! tANS (tabular asymmetric numeral systems) entropy coding.
//!
//! Two table geometries exist: 12-bit (4096 states) for the primary and
//! bigram tables and 10-bit (1024 states) for the small-packet variants.
//! Slots are spread with a coprime step so one pass assigns every state
//! exactly once and the whole table forms a single traversable chain.
//!
//! Encoding walks the payload right-to-left pushing bits LSB-first;
//! decoding walks left-to-right pulling the same bits back out of the
//! backward reader. Only the final encoder state travels in the header.
//! Every state reachable from a valid initial state stays inside
//! `[table_size, 2 * table_size)`.

use bytemuck::{Pod, Zeroable};

use crate::utils::bitstream::{BitReader, BitWriter};
use crate::utils::error::{NetcError, Result};

use super::buckets::bucket_of;

/// 12-bit geometry: primary and bigram tables.
pub const TABLE_LOG_12: u32 = 12;
pub const TABLE_SIZE_12: usize = 1 << TABLE_LOG_12;
pub const SPREAD_STEP_12: usize = 2563;

/// 10-bit geometry: compact-header small-packet tables.
pub const TABLE_LOG_10: u32 = 10;
pub const TABLE_SIZE_10: usize = 1 << TABLE_LOG_10;
pub const SPREAD_STEP_10: usize = 643;

/// One decode-table slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct DecodeEntry {
    pub symbol: u8,
    pub nb_bits: u8,
    pub next_state_base: u16,
}

/// Per-symbol encode record.
#[derive(Debug, Clone, Copy, Default, Zeroable)]
pub struct SymbolEntry {
    pub freq: u16,
    pub cumul: u16,
    /// `freq << nb_hi`: the state threshold above which the high bit count
    /// applies.
    pub lower: u16,
    pub nb_hi: u8,
}

/// A built tANS table for one (geometry, bucket, class) slot.
#[derive(Debug, Clone)]
pub struct TansTable {
    pub table_log: u32,
    pub table_size: u32,
    /// Normalized frequencies the table was built from; kept for blob
    /// serialization and adaptive blending.
    pub freq: [u16; 256],
    decode: Vec<DecodeEntry>,
    /// `encode_state[cumul[s] + k]` is the state reached when re-emitting
    /// the k-th occurrence of `s`; pre-biased by `table_size`.
    encode_state: Vec<u16>,
    symbols: Vec<SymbolEntry>,
}

impl TansTable {
    /// Build the full encode/decode machinery from a normalized frequency
    /// table summing exactly to `1 << table_log`.
    pub fn build(freq: &[u16; 256], table_log: u32) -> Result<Self> {
        let table_size = 1usize << table_log;
        let step = match table_log {
            TABLE_LOG_12 => SPREAD_STEP_12,
            TABLE_LOG_10 => SPREAD_STEP_10,
            _ => return Err(NetcError::InvalidArg),
        };
        let sum: u32 = freq.iter().map(|&f| u32::from(f)).sum();
        if sum != table_size as u32 {
            return Err(NetcError::InvalidArg);
        }

        let mut symbols = vec![SymbolEntry::zeroed(); 256];
        let mut cumul = 0u16;
        for s in 0..256 {
            let f = freq[s];
            symbols[s].freq = f;
            symbols[s].cumul = cumul;
            if f > 0 {
                let nb_hi = table_log - u32::from(f).ilog2();
                symbols[s].nb_hi = nb_hi as u8;
                symbols[s].lower = f << nb_hi;
                cumul += f;
            }
        }

        // Single spread chain: each symbol's occurrences continue stepping
        // from wherever the previous symbol stopped.
        let mut decode = vec![DecodeEntry::zeroed(); table_size];
        let mut encode_state = vec![0u16; table_size];
        let mut pos = 0usize;
        for s in 0..256 {
            let f = freq[s];
            for k in 0..u32::from(f) {
                let nb_bits = table_log - (u32::from(f) + k).ilog2();
                decode[pos] = DecodeEntry {
                    symbol: s as u8,
                    nb_bits: nb_bits as u8,
                    next_state_base: (((u32::from(f) + k) << nb_bits) - table_size as u32) as u16,
                };
                encode_state[(symbols[s].cumul as u32 + k) as usize] =
                    (table_size + pos) as u16;
                pos = (pos + step) & (table_size - 1);
            }
        }

        Ok(Self {
            table_log,
            table_size: table_size as u32,
            freq: *freq,
            decode,
            encode_state,
            symbols,
        })
    }

    /// True when every byte of `src` has a non-zero frequency.
    pub fn can_encode_all(&self, src: &[u8]) -> bool {
        src.iter().all(|&b| self.symbols[b as usize].freq > 0)
    }

    /// Cheap upper-bound cost estimate in bits (per-symbol high bit count).
    pub fn estimate_bits(&self, src: &[u8]) -> Option<u64> {
        let mut bits = 0u64;
        for &b in src {
            let e = &self.symbols[b as usize];
            if e.freq == 0 {
                return None;
            }
            bits += u64::from(e.nb_hi);
        }
        Some(bits)
    }

    /// Push one symbol; returns the successor state.
    #[inline]
    fn encode_sym(&self, wr: &mut BitWriter<'_>, x: u32, sym: u8) -> Result<u32> {
        let e = &self.symbols[sym as usize];
        if e.freq == 0 {
            return Err(NetcError::InvalidArg);
        }
        let nb = if e.nb_hi == 0 || x >= u32::from(e.lower) {
            u32::from(e.nb_hi)
        } else {
            u32::from(e.nb_hi) - 1
        };
        wr.write(x, nb)?;
        let j = (x >> nb) - u32::from(e.freq);
        Ok(u32::from(self.encode_state[(u32::from(e.cumul) + j) as usize]))
    }

    /// Pop one symbol; `x` must already be validated in range.
    #[inline]
    fn decode_sym(&self, rd: &mut BitReader<'_>, x: &mut u32) -> Result<u8> {
        let e = self.decode[(*x - self.table_size) as usize];
        let bits = rd.read(u32::from(e.nb_bits))?;
        *x = self.table_size + u32::from(e.next_state_base) + bits;
        Ok(e.symbol)
    }

    #[inline]
    fn state_in_range(&self, x: u32) -> bool {
        x >= self.table_size && x < 2 * self.table_size
    }
}

/// Encode `src` with a single table; returns the final state for the header.
pub fn encode_single(table: &TansTable, src: &[u8], wr: &mut BitWriter<'_>) -> Result<u32> {
    let mut x = table.table_size;
    for &b in src.iter().rev() {
        x = table.encode_sym(wr, x, b)?;
    }
    Ok(x)
}

/// Decode `out.len()` symbols with a single table from header state `x0`.
pub fn decode_single(
    table: &TansTable,
    rd: &mut BitReader<'_>,
    x0: u32,
    out: &mut [u8],
) -> Result<()> {
    if !table.state_in_range(x0) {
        return Err(NetcError::Corrupt);
    }
    let mut x = x0;
    for slot in out.iter_mut() {
        *slot = table.decode_sym(rd, &mut x)?;
    }
    // A genuine stream unwinds back to the encoder's initial state.
    if x != table.table_size {
        return Err(NetcError::Corrupt);
    }
    Ok(())
}

/// Dual-interleaved encode: even offsets ride state 0, odd offsets state 1.
/// The leftover byte of an odd-length payload is even-offset by definition,
/// so it lands on state 0.
pub fn encode_x2(table: &TansTable, src: &[u8], wr: &mut BitWriter<'_>) -> Result<(u32, u32)> {
    let mut x0 = table.table_size;
    let mut x1 = table.table_size;
    for i in (0..src.len()).rev() {
        if i & 1 == 0 {
            x0 = table.encode_sym(wr, x0, src[i])?;
        } else {
            x1 = table.encode_sym(wr, x1, src[i])?;
        }
    }
    Ok((x0, x1))
}

/// Inverse of [`encode_x2`].
pub fn decode_x2(
    table: &TansTable,
    rd: &mut BitReader<'_>,
    states: (u32, u32),
    out: &mut [u8],
) -> Result<()> {
    let (mut x0, mut x1) = states;
    if !table.state_in_range(x0) || !table.state_in_range(x1) {
        return Err(NetcError::Corrupt);
    }
    for i in 0..out.len() {
        out[i] = if i & 1 == 0 {
            table.decode_sym(rd, &mut x0)?
        } else {
            table.decode_sym(rd, &mut x1)?
        };
    }
    if x0 != table.table_size || x1 != table.table_size {
        return Err(NetcError::Corrupt);
    }
    Ok(())
}

/// Per-position-context encode: the table at offset `i` is
/// `tables[bucket_of(i)]`. Costs nothing extra on the wire.
pub fn encode_pctx(tables: &[TansTable], src: &[u8], wr: &mut BitWriter<'_>) -> Result<u32> {
    debug_assert_eq!(tables.len(), super::buckets::NUM_BUCKETS);
    let mut x = tables[0].table_size;
    for i in (0..src.len()).rev() {
        x = tables[bucket_of(i)].encode_sym(wr, x, src[i])?;
    }
    Ok(x)
}

/// Inverse of [`encode_pctx`].
pub fn decode_pctx(
    tables: &[TansTable],
    rd: &mut BitReader<'_>,
    x0: u32,
    out: &mut [u8],
) -> Result<()> {
    debug_assert_eq!(tables.len(), super::buckets::NUM_BUCKETS);
    if !tables[0].state_in_range(x0) {
        return Err(NetcError::Corrupt);
    }
    let mut x = x0;
    for i in 0..out.len() {
        out[i] = tables[bucket_of(i)].decode_sym(rd, &mut x)?;
    }
    if x != tables[0].table_size {
        return Err(NetcError::Corrupt);
    }
    Ok(())
}

/// Dual-interleaved PCTX encode (both states walk the bucket schedule).
pub fn encode_pctx_x2(
    tables: &[TansTable],
    src: &[u8],
    wr: &mut BitWriter<'_>,
) -> Result<(u32, u32)> {
    let mut x0 = tables[0].table_size;
    let mut x1 = tables[0].table_size;
    for i in (0..src.len()).rev() {
        let t = &tables[bucket_of(i)];
        if i & 1 == 0 {
            x0 = t.encode_sym(wr, x0, src[i])?;
        } else {
            x1 = t.encode_sym(wr, x1, src[i])?;
        }
    }
    Ok((x0, x1))
}

/// Inverse of [`encode_pctx_x2`].
pub fn decode_pctx_x2(
    tables: &[TansTable],
    rd: &mut BitReader<'_>,
    states: (u32, u32),
    out: &mut [u8],
) -> Result<()> {
    let (mut x0, mut x1) = states;
    if !tables[0].state_in_range(x0) || !tables[0].state_in_range(x1) {
        return Err(NetcError::Corrupt);
    }
    for i in 0..out.len() {
        let t = &tables[bucket_of(i)];
        out[i] = if i & 1 == 0 {
            t.decode_sym(rd, &mut x0)?
        } else {
            t.decode_sym(rd, &mut x1)?
        };
    }
    if x0 != tables[0].table_size || x1 != tables[0].table_size {
        return Err(NetcError::Corrupt);
    }
    Ok(())
}

/// Table selector for the bigram walk: maps (bucket, previous byte) to the
/// conditional table, falling back to the unigram bucket table when the
/// class table is absent.
pub trait BigramSelect {
    fn table_for(&self, bucket: usize, prev: u8) -> &TansTable;
}

/// Bigram-PCTX encode: the table at offset `i` conditions on `src[i - 1]`
/// (0 at offset 0). The previous byte is always an *original* payload byte,
/// which is exactly what the forward-walking decoder has already produced.
pub fn encode_bigram<S: BigramSelect>(
    sel: &S,
    src: &[u8],
    wr: &mut BitWriter<'_>,
) -> Result<u32> {
    if src.is_empty() {
        return Err(NetcError::InvalidArg);
    }
    let mut x = TABLE_SIZE_12 as u32;
    for i in (0..src.len()).rev() {
        let prev = if i == 0 { 0 } else { src[i - 1] };
        x = sel.table_for(bucket_of(i), prev).encode_sym(wr, x, src[i])?;
    }
    Ok(x)
}

/// Inverse of [`encode_bigram`].
pub fn decode_bigram<S: BigramSelect>(
    sel: &S,
    rd: &mut BitReader<'_>,
    x0: u32,
    out: &mut [u8],
) -> Result<()> {
    if !(TABLE_SIZE_12 as u32..2 * TABLE_SIZE_12 as u32).contains(&x0) {
        return Err(NetcError::Corrupt);
    }
    let mut x = x0;
    let mut prev = 0u8;
    for i in 0..out.len() {
        let b = sel.table_for(bucket_of(i), prev).decode_sym(rd, &mut x)?;
        out[i] = b;
        prev = b;
    }
    if x != TABLE_SIZE_12 as u32 {
        return Err(NetcError::Corrupt);
    }
    Ok(())
}

/// Dual-interleaved bigram-PCTX encode.
pub fn encode_bigram_x2<S: BigramSelect>(
    sel: &S,
    src: &[u8],
    wr: &mut BitWriter<'_>,
) -> Result<(u32, u32)> {
    if src.is_empty() {
        return Err(NetcError::InvalidArg);
    }
    let mut x0 = TABLE_SIZE_12 as u32;
    let mut x1 = TABLE_SIZE_12 as u32;
    for i in (0..src.len()).rev() {
        let prev = if i == 0 { 0 } else { src[i - 1] };
        let t = sel.table_for(bucket_of(i), prev);
        if i & 1 == 0 {
            x0 = t.encode_sym(wr, x0, src[i])?;
        } else {
            x1 = t.encode_sym(wr, x1, src[i])?;
        }
    }
    Ok((x0, x1))
}

/// Inverse of [`encode_bigram_x2`].
pub fn decode_bigram_x2<S: BigramSelect>(
    sel: &S,
    rd: &mut BitReader<'_>,
    states: (u32, u32),
    out: &mut [u8],
) -> Result<()> {
    let range = TABLE_SIZE_12 as u32..2 * TABLE_SIZE_12 as u32;
    let (mut x0, mut x1) = states;
    if !range.contains(&x0) || !range.contains(&x1) {
        return Err(NetcError::Corrupt);
    }
    let mut prev = 0u8;
    for i in 0..out.len() {
        let t = sel.table_for(bucket_of(i), prev);
        let b = if i & 1 == 0 {
            t.decode_sym(rd, &mut x0)?
        } else {
            t.decode_sym(rd, &mut x1)?
        };
        out[i] = b;
        prev = b;
    }
    if x0 != TABLE_SIZE_12 as u32 || x1 != TABLE_SIZE_12 as u32 {
        return Err(NetcError::Corrupt);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::freq::{normalize, Histogram};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn table_for(data: &[u8], log: u32) -> TansTable {
        let mut hist: Histogram = [0; 256];
        crate::model::freq::count_into(&mut hist, data);
        let freq = normalize(&hist, 1 << log).unwrap();
        TansTable::build(&freq, log).unwrap()
    }

    fn roundtrip_single(data: &[u8], log: u32) {
        let table = table_for(data, log);
        let mut buf = vec![0u8; data.len() * 2 + 64];
        let mut wr = BitWriter::new(&mut buf);
        let x = encode_single(&table, data, &mut wr).unwrap();
        let n = wr.close().unwrap();

        let mut rd = BitReader::new(&buf[..n]).unwrap();
        let mut out = vec![0u8; data.len()];
        decode_single(&table, &mut rd, x, &mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn test_spread_visits_every_slot_once() {
        for &(size, step) in &[(TABLE_SIZE_12, SPREAD_STEP_12), (TABLE_SIZE_10, SPREAD_STEP_10)] {
            let mut seen = vec![false; size];
            let mut pos = 0usize;
            for _ in 0..size {
                assert!(!seen[pos], "slot visited twice");
                seen[pos] = true;
                pos = (pos + step) & (size - 1);
            }
            assert!(seen.iter().all(|&v| v));
            assert_eq!(pos, 0, "chain must close");
        }
    }

    #[test]
    fn test_decode_table_total() {
        let data: Vec<u8> = (0..4096u32).map(|i| (i % 7) as u8 * 31).collect();
        let table = table_for(&data, TABLE_LOG_12);
        // Every state in [N, 2N) must be the target of exactly one encode
        // chain entry.
        let mut hit = vec![0u32; TABLE_SIZE_12];
        for k in 0..TABLE_SIZE_12 {
            let st = table.encode_state[k] as usize;
            assert!(st >= TABLE_SIZE_12 && st < 2 * TABLE_SIZE_12);
            hit[st - TABLE_SIZE_12] += 1;
        }
        assert!(hit.iter().all(|&h| h == 1));
    }

    #[test]
    fn test_single_roundtrip_skewed() {
        let mut data = vec![0u8; 2000];
        for (i, b) in data.iter_mut().enumerate() {
            *b = if i % 17 == 0 { 0x41 } else { 0x00 };
        }
        roundtrip_single(&data, TABLE_LOG_12);
        roundtrip_single(&data, TABLE_LOG_10);
    }

    #[test]
    fn test_single_roundtrip_one_byte() {
        roundtrip_single(&[0xAB], TABLE_LOG_12);
    }

    #[test]
    fn test_unseen_symbol_fails_encode() {
        let table = table_for(&[1u8, 2, 3, 1, 2, 3], TABLE_LOG_12);
        let mut buf = [0u8; 64];
        let mut wr = BitWriter::new(&mut buf);
        assert!(encode_single(&table, &[9u8], &mut wr).is_err());
        assert!(!table.can_encode_all(&[1, 2, 9]));
        assert!(table.estimate_bits(&[1, 2, 9]).is_none());
    }

    #[test]
    fn test_bad_initial_state_rejected() {
        let table = table_for(&[5u8; 32], TABLE_LOG_12);
        let mut buf = [0u8; 16];
        let n = {
            let wr = BitWriter::new(&mut buf);
            wr.close().unwrap()
        };
        let mut rd = BitReader::new(&buf[..n]).unwrap();
        let mut out = [0u8; 1];
        assert!(decode_single(&table, &mut rd, 1, &mut out).is_err());
        let mut rd = BitReader::new(&buf[..n]).unwrap();
        assert!(decode_single(&table, &mut rd, 2 * TABLE_SIZE_12 as u32, &mut out).is_err());
    }

    #[test]
    fn test_x2_roundtrip() {
        let mut rng = StdRng::seed_from_u64(42);
        for len in [2usize, 3, 64, 257, 1000] {
            let data: Vec<u8> = (0..len).map(|_| rng.gen_range(0..8u8) * 3).collect();
            let table = table_for(&data, TABLE_LOG_12);
            let mut buf = vec![0u8; len * 2 + 64];
            let mut wr = BitWriter::new(&mut buf);
            let states = encode_x2(&table, &data, &mut wr).unwrap();
            let n = wr.close().unwrap();

            let mut rd = BitReader::new(&buf[..n]).unwrap();
            let mut out = vec![0u8; len];
            decode_x2(&table, &mut rd, states, &mut out).unwrap();
            assert_eq!(out, data, "len {}", len);
        }
    }

    #[test]
    fn test_pctx_roundtrip_uses_position_tables() {
        // Different distributions per region: offsets < 8 are 0-heavy,
        // the rest are 0x80-heavy.
        let mut packets: Vec<Vec<u8>> = Vec::new();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..64 {
            let mut p = vec![0u8; 300];
            for (i, b) in p.iter_mut().enumerate() {
                *b = if i < 8 {
                    rng.gen_range(0..4u8)
                } else {
                    0x80 | rng.gen_range(0..4u8)
                };
            }
            packets.push(p);
        }
        let mut tables = Vec::new();
        for b in 0..crate::model::buckets::NUM_BUCKETS {
            let mut hist: Histogram = [0; 256];
            for p in &packets {
                for (i, &byte) in p.iter().enumerate() {
                    if bucket_of(i) == b {
                        hist[byte as usize] += 1;
                    }
                }
            }
            let freq = normalize(&hist, 4096).unwrap();
            tables.push(TansTable::build(&freq, TABLE_LOG_12).unwrap());
        }

        let data = &packets[0];
        let mut buf = vec![0u8; data.len() * 2 + 64];
        let mut wr = BitWriter::new(&mut buf);
        let x = encode_pctx(&tables, data, &mut wr).unwrap();
        let n = wr.close().unwrap();

        let mut rd = BitReader::new(&buf[..n]).unwrap();
        let mut out = vec![0u8; data.len()];
        decode_pctx(&tables, &mut rd, x, &mut out).unwrap();
        assert_eq!(&out, data);

        // X2 over the same tables
        let mut buf2 = vec![0u8; data.len() * 2 + 64];
        let mut wr = BitWriter::new(&mut buf2);
        let states = encode_pctx_x2(&tables, data, &mut wr).unwrap();
        let n = wr.close().unwrap();
        let mut rd = BitReader::new(&buf2[..n]).unwrap();
        let mut out2 = vec![0u8; data.len()];
        decode_pctx_x2(&tables, &mut rd, states, &mut out2).unwrap();
        assert_eq!(&out2, data);
    }
}
