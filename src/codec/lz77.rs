//! LZ77 back-reference codec over the ring-history window.
//!
//! The match window is the linearized ring-buffer tail followed by the
//! current packet prefix; both endpoints hold identical ring contents, so
//! distances may reach back past the packet start into history. Tokens:
//! a control byte below 0x80 introduces a literal run of `c + 1` bytes;
//! 0x80 and above is a match of `(c & 0x7F) + 4` bytes at the distance
//! given by the following u16 LE. Matches may overlap their own output.

use byteorder::{ByteOrder, LittleEndian};

use crate::utils::error::{NetcError, Result};

const HASH_LOG: u32 = 15;
/// Slots in the caller-owned match table (one `u32` each).
pub const HASH_SIZE: usize = 1 << HASH_LOG;
const EMPTY: u32 = u32::MAX;

const MIN_MATCH: usize = 4;
const MAX_MATCH: usize = 0x7F + MIN_MATCH;
const MAX_LIT_RUN: usize = 0x80;
const MAX_DIST: usize = 65535;
/// How far back into history the matcher seeds its hash table. Deeper
/// references stay decodable; the encoder just stops looking for them.
const HIST_SEED: usize = 4096;

#[inline]
fn hash4(bytes: [u8; 4]) -> usize {
    (u32::from_le_bytes(bytes).wrapping_mul(2_654_435_761) >> (32 - HASH_LOG)) as usize
}

/// Greedy single-candidate matcher. `heads` is the pre-allocated match
/// table (reset here every call). Returns the token-stream size, or `None`
/// when it cannot beat `dst`, which discards the candidate.
pub fn encode(hist: &[u8], src: &[u8], heads: &mut [u32], dst: &mut [u8]) -> Option<usize> {
    debug_assert_eq!(heads.len(), HASH_SIZE);
    heads.fill(EMPTY);

    let hist_len = hist.len();
    let total = hist_len + src.len();
    let get = |v: usize| -> u8 {
        if v < hist_len { hist[v] } else { src[v - hist_len] }
    };
    let word = |v: usize| -> [u8; 4] { [get(v), get(v + 1), get(v + 2), get(v + 3)] };

    // Seed recent history so cross-packet matches are findable; windows may
    // straddle the history/packet boundary.
    for v in hist_len.saturating_sub(HIST_SEED)..hist_len {
        if v + MIN_MATCH <= total {
            heads[hash4(word(v))] = v as u32;
        }
    }

    let mut out = 0usize;
    let mut lit_start = hist_len;
    let mut flush_literals = |upto: usize, out: &mut usize, dst: &mut [u8], lit_start: &mut usize| -> bool {
        while *lit_start < upto {
            let run = (upto - *lit_start).min(MAX_LIT_RUN);
            if *out + 1 + run > dst.len() {
                return false;
            }
            dst[*out] = (run - 1) as u8;
            *out += 1;
            for k in 0..run {
                dst[*out + k] = get(*lit_start + k);
            }
            *out += run;
            *lit_start += run;
        }
        true
    };

    let mut v = hist_len;
    while v < total {
        if v + MIN_MATCH <= total {
            let h = hash4(word(v));
            let cand = heads[h];
            heads[h] = v as u32;
            if cand != EMPTY {
                let c = cand as usize;
                let dist = v - c;
                if (1..=MAX_DIST).contains(&dist) {
                    let mut len = 0usize;
                    while len < MAX_MATCH && v + len < total && get(c + len) == get(v + len) {
                        len += 1;
                    }
                    if len >= MIN_MATCH {
                        if !flush_literals(v, &mut out, dst, &mut lit_start) {
                            return None;
                        }
                        if out + 3 > dst.len() {
                            return None;
                        }
                        dst[out] = 0x80 | (len - MIN_MATCH) as u8;
                        LittleEndian::write_u16(&mut dst[out + 1..out + 3], dist as u16);
                        out += 3;
                        for w in v + 1..v + len {
                            if w + MIN_MATCH <= total {
                                heads[hash4(word(w))] = w as u32;
                            }
                        }
                        v += len;
                        lit_start = v;
                        continue;
                    }
                }
            }
        }
        v += 1;
    }
    if !flush_literals(total, &mut out, dst, &mut lit_start) {
        return None;
    }
    Some(out)
}

/// Decode a token stream; the output must land on exactly `out.len()`
/// bytes, with every distance inside `history + produced` bounds.
pub fn decode(hist: &[u8], src: &[u8], out: &mut [u8]) -> Result<()> {
    let hist_len = hist.len();
    let mut ip = 0usize;
    let mut op = 0usize;
    while ip < src.len() {
        let control = src[ip];
        ip += 1;
        if control < 0x80 {
            let run = control as usize + 1;
            if ip + run > src.len() || op + run > out.len() {
                return Err(NetcError::Corrupt);
            }
            out[op..op + run].copy_from_slice(&src[ip..ip + run]);
            ip += run;
            op += run;
        } else {
            let len = (control & 0x7F) as usize + MIN_MATCH;
            if ip + 2 > src.len() {
                return Err(NetcError::Corrupt);
            }
            let dist = LittleEndian::read_u16(&src[ip..ip + 2]) as usize;
            ip += 2;
            if dist == 0 || dist > op + hist_len || op + len > out.len() {
                return Err(NetcError::Corrupt);
            }
            // Byte-at-a-time: matches may overlap the bytes they produce.
            for k in 0..len {
                let pos = op + k;
                out[pos] = if pos >= dist {
                    out[pos - dist]
                } else {
                    hist[hist_len - (dist - pos)]
                };
            }
            op += len;
        }
    }
    if op != out.len() {
        return Err(NetcError::Corrupt);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(hist: &[u8], src: &[u8]) -> usize {
        let mut heads = vec![EMPTY; HASH_SIZE];
        let mut dst = vec![0u8; src.len() * 2 + 16];
        let n = encode(hist, src, &mut heads, &mut dst).expect("encode fits");
        let mut out = vec![0u8; src.len()];
        decode(hist, &dst[..n], &mut out).unwrap();
        assert_eq!(out, src);
        n
    }

    #[test]
    fn test_repetitive_shrinks() {
        let src: Vec<u8> = b"netpacketnetpacketnetpacketnetpacket"
            .iter()
            .cycle()
            .take(720)
            .copied()
            .collect();
        let n = roundtrip(&[], &src);
        assert!(n < src.len() / 2, "periodic data must shrink, got {}", n);
    }

    #[test]
    fn test_incompressible_still_roundtrips() {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};
        let mut rng = StdRng::seed_from_u64(5);
        let src: Vec<u8> = (0..500).map(|_| rng.r#gen()).collect();
        roundtrip(&[], &src);
    }

    #[test]
    fn test_history_matches_found() {
        let hist: Vec<u8> = (0..200u8).cycle().take(1000).collect();
        // The packet repeats a slice of recent history.
        let src: Vec<u8> = hist[800..1000].to_vec();
        let n = roundtrip(&hist, &src);
        assert!(n < src.len() / 4, "history reference must shrink, got {}", n);
    }

    #[test]
    fn test_overlapping_match() {
        // One literal byte then an overlapping self-copy (dist 1).
        let src = vec![9u8; 300];
        let n = roundtrip(&[], &src);
        assert!(n <= 12);
    }

    #[test]
    fn test_decode_rejects_bad_distance() {
        let hist = [0u8; 4];
        // match len 4, dist 9 with only 4 history bytes and 0 produced
        let stream = [0x80u8, 9, 0];
        let mut out = [0u8; 4];
        assert!(decode(&hist, &stream, &mut out).is_err());
        // dist 0
        let stream = [0x80u8, 0, 0];
        assert!(decode(&hist, &stream, &mut out).is_err());
    }

    #[test]
    fn test_decode_rejects_length_mismatch() {
        // 3 literals promised into a 5-byte output
        let stream = [2u8, 1, 2, 3];
        let mut out = [0u8; 5];
        assert!(decode(&[], &stream, &mut out).is_err());
        // truncated literal run
        let stream = [7u8, 1, 2];
        assert!(decode(&[], &stream, &mut out).is_err());
    }
}
