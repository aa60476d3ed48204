//! Cross-packet adaptive learning.
//!
//! Both endpoints observe the same original bytes in the same order, so the
//! blended tables and the mutable LZP clone stay bit-identical without any
//! synchronization protocol. The LZP confidence walk runs after every
//! packet; the tANS tables rebuild every [`REBUILD_INTERVAL`] packets from
//! a 3:1 blend of observed and baseline frequencies.

use log::warn;

use crate::dict::dictionary::Dictionary;
use crate::model::buckets::{bucket_of, NUM_BUCKETS};
use crate::model::freq::{normalize, Histogram};
use crate::model::lzp::LzpTable;
use crate::model::tans::{TansTable, TABLE_LOG_12, TABLE_SIZE_12};

/// Packets between table rebuilds.
pub const REBUILD_INTERVAL: u32 = 128;

/// Blend weight: 3 parts observed, 1 part baseline.
const BLEND_NUM: u64 = 3;
const BLEND_DEN: u64 = 4;

pub struct AdaptiveState {
    freq_accum: Vec<Histogram>,
    total_accum: Vec<u64>,
    pkt_count: u32,
    /// Working primary table set; replaces the dictionary's for the
    /// single-region, X2 and PCTX paths.
    pub tables: Vec<TansTable>,
    /// Mutable LZP clone; replaces the dictionary's for every LZP path.
    pub lzp: Option<LzpTable>,
}

impl AdaptiveState {
    pub fn new(dict: &Dictionary) -> Self {
        Self {
            freq_accum: vec![[0; 256]; NUM_BUCKETS],
            total_accum: vec![0; NUM_BUCKETS],
            pkt_count: 0,
            tables: dict.primary().to_vec(),
            lzp: dict.lzp().cloned(),
        }
    }

    /// Drop everything learned and re-clone the baseline.
    pub fn reset(&mut self, dict: &Dictionary) {
        for h in self.freq_accum.iter_mut() {
            h.fill(0);
        }
        self.total_accum.fill(0);
        self.pkt_count = 0;
        self.tables.clone_from_slice(dict.primary());
        self.lzp = dict.lzp().cloned();
    }

    /// Record one packet's original bytes; called identically on both
    /// endpoints after every successful round-trip.
    pub fn observe(&mut self, data: &[u8], dict: &Dictionary) {
        for (i, &b) in data.iter().enumerate() {
            let bucket = bucket_of(i);
            self.freq_accum[bucket][b as usize] += 1;
            self.total_accum[bucket] += 1;
        }
        if let Some(lzp) = &mut self.lzp {
            lzp.adapt_update(data);
        }
        self.pkt_count += 1;
        if self.pkt_count >= REBUILD_INTERVAL {
            self.rebuild(dict);
            self.pkt_count = 0;
        }
    }

    fn rebuild(&mut self, dict: &Dictionary) {
        for b in 0..NUM_BUCKETS {
            let total = self.total_accum[b];
            if total == 0 {
                continue;
            }
            let baseline = &dict.primary()[b].freq;
            let mut blended: Histogram = [0; 256];
            for s in 0..256 {
                let observed = self.freq_accum[b][s];
                let prior = u64::from(baseline[s]) * total / TABLE_SIZE_12 as u64;
                blended[s] = (BLEND_NUM * observed + prior) / BLEND_DEN;
            }
            let rebuilt = normalize(&blended, TABLE_SIZE_12 as u32)
                .and_then(|f| TansTable::build(&f, TABLE_LOG_12));
            match rebuilt {
                Ok(t) => self.tables[b] = t,
                Err(_) => {
                    // Stay decodable on both ends: fall back to baseline.
                    warn!("adaptive rebuild failed for bucket {}, reverting to baseline", b);
                    self.tables[b] = dict.primary()[b].clone();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dict() -> Dictionary {
        let corpus: Vec<Vec<u8>> = (0..32u8)
            .map(|v| (0..64).map(|i| (i as u8).wrapping_mul(2) ^ (v & 1)).collect())
            .collect();
        let refs: Vec<&[u8]> = corpus.iter().map(|p| p.as_slice()).collect();
        Dictionary::train(&refs, 1).unwrap()
    }

    #[test]
    fn test_tables_shift_after_interval() {
        let d = dict();
        let mut a = AdaptiveState::new(&d);
        // A distribution the training corpus never saw.
        let packet: Vec<u8> = (0..64).map(|i| 0xF0 | (i as u8 & 0x0F)).collect();
        for _ in 0..REBUILD_INTERVAL {
            a.observe(&packet, &d);
        }
        let shifted = (0..NUM_BUCKETS)
            .any(|b| a.tables[b].freq != d.primary()[b].freq);
        assert!(shifted, "blended tables must diverge from baseline");
    }

    #[test]
    fn test_two_endpoints_stay_identical() {
        let d = dict();
        let mut enc = AdaptiveState::new(&d);
        let mut dec = AdaptiveState::new(&d);
        for n in 0..300usize {
            let packet: Vec<u8> = (0..48).map(|i| ((i * 3 + n) % 251) as u8).collect();
            enc.observe(&packet, &d);
            dec.observe(&packet, &d);
        }
        for b in 0..NUM_BUCKETS {
            assert_eq!(enc.tables[b].freq, dec.tables[b].freq, "bucket {}", b);
        }
        match (&enc.lzp, &dec.lzp) {
            (Some(a), Some(b)) => assert_eq!(a.entries, b.entries),
            (None, None) => {}
            _ => panic!("lzp presence must match"),
        }
    }

    #[test]
    fn test_reset_restores_baseline() {
        let d = dict();
        let mut a = AdaptiveState::new(&d);
        let packet = vec![0xEEu8; 64];
        for _ in 0..REBUILD_INTERVAL {
            a.observe(&packet, &d);
        }
        a.reset(&d);
        for b in 0..NUM_BUCKETS {
            assert_eq!(a.tables[b].freq, d.primary()[b].freq);
        }
        assert_eq!(a.pkt_count, 0);
    }
}
