//! Frequency accumulation and normalization for the tANS tables.
//!
//! A normalized table is 256 counts summing to exactly the table size
//! (4096 for the 12-bit tables, 1024 for the 10-bit variants). Symbols the
//! corpus never produced stay at zero and are unencodable: the encoder
//! trial fails on them and the competition falls back to another codec.

use crate::utils::error::{NetcError, Result};

/// Raw 64-bit byte histogram.
pub type Histogram = [u64; 256];

/// Accumulate `data` into `hist`.
pub fn count_into(hist: &mut Histogram, data: &[u8]) {
    for &b in data {
        hist[b as usize] += 1;
    }
}

/// Normalize a raw histogram to sum exactly `target` (a power of two).
///
/// Two-phase floor-plus-proportional rule: every seen symbol first receives
/// 1, then the remaining slots are split proportional to raw counts, with
/// the rounding error absorbed by the most frequent symbol (spread across
/// the next symbols when absorbing would push it below 1).
///
/// A histogram with no observations at all yields a uniform table, so every
/// bucket of a dictionary is buildable even when the corpus never reached
/// its offset range.
pub fn normalize(hist: &Histogram, target: u32) -> Result<[u16; 256]> {
    debug_assert!(target.is_power_of_two() && target >= 1024);
    let total: u64 = hist.iter().sum();
    let seen = hist.iter().filter(|&&c| c > 0).count() as u32;

    if seen == 0 {
        // Unreached bucket: uniform fallback keeps the table buildable.
        let flat = (target / 256) as u16;
        return Ok([flat; 256]);
    }
    if seen > target {
        return Err(NetcError::InvalidArg);
    }

    let mut freq = [0u16; 256];
    let remaining = (target - seen) as u64;
    for s in 0..256 {
        if hist[s] > 0 {
            // Rounded proportional share on top of the floor of 1.
            let share = (hist[s] * remaining + total / 2) / total;
            freq[s] = 1 + share.min(u64::from(target - 1)) as u16;
        }
    }
    settle_residue(&mut freq, target);
    Ok(freq)
}

/// Rescale a 4096-sum table down to a 1024-sum table.
///
/// Non-zero symbols are clamped to a minimum of 1; the rounding residue
/// lands on the largest symbol, spreading downward when needed.
pub fn rescale_to_1024(freq: &[u16; 256]) -> [u16; 256] {
    let mut out = [0u16; 256];
    for s in 0..256 {
        if freq[s] > 0 {
            out[s] = ((u32::from(freq[s]) * 1024 + 2048) / 4096).max(1) as u16;
        }
    }
    settle_residue(&mut out, 1024);
    out
}

/// Force `freq` to sum exactly `target` without zeroing any live symbol.
fn settle_residue(freq: &mut [u16; 256], target: u32) {
    let sum: u32 = freq.iter().map(|&f| u32::from(f)).sum();
    let mut diff = target as i64 - sum as i64;
    if diff == 0 {
        return;
    }

    // Symbols by descending frequency, ties to the lower byte value, so the
    // same histogram always settles the same way on both endpoints.
    let mut order: Vec<usize> = (0..256).filter(|&s| freq[s] > 0).collect();
    order.sort_by_key(|&s| (std::cmp::Reverse(freq[s]), s));

    if diff > 0 {
        freq[order[0]] += diff as u16;
        return;
    }
    for &s in &order {
        if diff == 0 {
            break;
        }
        let room = i64::from(freq[s]) - 1;
        let take = room.min(-diff);
        freq[s] -= take as u16;
        diff += take;
    }
    debug_assert_eq!(diff, 0, "cannot settle below 1 per live symbol");
}
