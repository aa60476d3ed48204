//! The trained dictionary bundle.
//!
//! A dictionary is immutable after creation and shared read-only across any
//! number of contexts (wrap it in `Arc`). It bundles, per position bucket:
//! a primary 12-bit tANS table, a set of bigram-conditioned 12-bit tables,
//! and a 10-bit table for the compact small-packet paths, plus the
//! optional LZP prediction table and trained bigram class map.

use log::debug;

use crate::model::bigram::{self, NUM_CLASSES, NUM_CLASSES_STATIC};
use crate::model::buckets::{bucket_of, NUM_BUCKETS};
use crate::model::freq::{normalize, rescale_to_1024, Histogram};
use crate::model::lzp::LzpTable;
use crate::model::tans::{BigramSelect, TansTable, TABLE_LOG_10, TABLE_LOG_12};
use crate::utils::error::{NetcError, Result};

/// Dictionary format carrying trained LZP and an 8-way bigram class map.
pub const FORMAT_V5: u8 = 5;
/// Legacy format: no class map, 4 static bigram classes.
pub const FORMAT_V4: u8 = 4;

/// Packet payload ceiling, also the training-packet ceiling.
pub const MAX_PACKET_SIZE: usize = 65535;

#[derive(Debug)]
pub struct Dictionary {
    pub(crate) model_id: u8,
    pub(crate) version: u8,
    /// 16 primary 12-bit tables, one per position bucket.
    pub(crate) primary: Vec<TansTable>,
    /// Bigram-conditioned tables, `bucket * num_classes + class`; `None`
    /// where the corpus never produced bytes for the slot.
    pub(crate) bigram: Vec<Option<TansTable>>,
    pub(crate) num_classes: usize,
    /// 16 primary 10-bit tables for the compact small-packet paths.
    pub(crate) primary10: Vec<TansTable>,
    pub(crate) lzp: Option<LzpTable>,
    pub(crate) class_map: Option<[u8; 256]>,
}

impl Dictionary {
    /// Train a dictionary over a packet corpus.
    ///
    /// `model_id` must be in `1..=254` (0 is the reserved passthrough id,
    /// 255 is reserved). Training is fully deterministic: the same corpus
    /// and id always produce a byte-identical [`Dictionary::to_bytes`]
    /// blob.
    pub fn train(packets: &[&[u8]], model_id: u8) -> Result<Self> {
        if model_id == 0 || model_id == 255 || packets.is_empty() {
            return Err(NetcError::InvalidArg);
        }
        if packets.iter().any(|p| p.is_empty() || p.len() > MAX_PACKET_SIZE) {
            return Err(NetcError::InvalidArg);
        }

        // Per-bucket byte frequencies across the whole corpus.
        let mut hists: Vec<Histogram> = vec![[0u64; 256]; NUM_BUCKETS];
        for p in packets {
            for (i, &b) in p.iter().enumerate() {
                hists[bucket_of(i)][b as usize] += 1;
            }
        }

        let mut primary = Vec::with_capacity(NUM_BUCKETS);
        let mut primary10 = Vec::with_capacity(NUM_BUCKETS);
        for hist in &hists {
            let freq = normalize(hist, 1 << TABLE_LOG_12)?;
            primary.push(TansTable::build(&freq, TABLE_LOG_12)?);
            primary10.push(TansTable::build(&rescale_to_1024(&freq), TABLE_LOG_10)?);
        }

        let lzp = LzpTable::train(packets);

        // Bigram tables: trained 8-way when the LZP side qualified, else
        // the legacy static 4-way split.
        let (version, class_map, num_classes) = if lzp.is_some() {
            (FORMAT_V5, Some(bigram::train_class_map(packets)), NUM_CLASSES)
        } else {
            (FORMAT_V4, None, NUM_CLASSES_STATIC)
        };
        let class_of = |prev: u8| -> usize {
            match &class_map {
                Some(map) => map[prev as usize] as usize,
                None => bigram::static_class(prev),
            }
        };

        let mut bigram_hists: Vec<Histogram> = vec![[0u64; 256]; NUM_BUCKETS * num_classes];
        for p in packets {
            // position 0 always conditions on a previous byte of 0
            let mut prev = 0u8;
            for (i, &b) in p.iter().enumerate() {
                bigram_hists[bucket_of(i) * num_classes + class_of(prev)][b as usize] += 1;
                prev = b;
            }
        }

        let mut bigram_tables = Vec::with_capacity(NUM_BUCKETS * num_classes);
        for hist in &bigram_hists {
            if hist.iter().all(|&c| c == 0) {
                bigram_tables.push(None);
            } else {
                let freq = normalize(hist, 1 << TABLE_LOG_12)?;
                bigram_tables.push(Some(TansTable::build(&freq, TABLE_LOG_12)?));
            }
        }

        debug!(
            "trained dictionary: model_id={} version={} lzp={} bigram_tables={}",
            model_id,
            version,
            lzp.is_some(),
            bigram_tables.iter().filter(|t| t.is_some()).count()
        );

        Ok(Self {
            model_id,
            version,
            primary,
            bigram: bigram_tables,
            num_classes,
            primary10,
            lzp,
            class_map,
        })
    }

    pub fn model_id(&self) -> u8 {
        self.model_id
    }

    pub fn format_version(&self) -> u8 {
        self.version
    }

    /// Primary 12-bit table for one bucket.
    pub fn primary(&self) -> &[TansTable] {
        &self.primary
    }

    /// Primary 10-bit tables.
    pub fn primary10(&self) -> &[TansTable] {
        &self.primary10
    }

    pub fn lzp(&self) -> Option<&LzpTable> {
        self.lzp.as_ref()
    }

    /// Bigram class of a previous byte: trained map or static fallback.
    #[inline]
    pub fn bigram_class(&self, prev: u8) -> usize {
        match &self.class_map {
            Some(map) => map[prev as usize] as usize,
            None => bigram::static_class(prev),
        }
    }

    #[inline]
    pub fn bigram_table(&self, bucket: usize, class: usize) -> Option<&TansTable> {
        self.bigram[bucket * self.num_classes + class].as_ref()
    }

    /// True when at least one bigram-conditioned table exists.
    pub fn has_bigram(&self) -> bool {
        self.bigram.iter().any(Option::is_some)
    }
}

/// [`BigramSelect`] view pairing a dictionary's bigram tables with a
/// (possibly adaptively rebuilt) primary table set for the fallback.
pub struct BigramView<'a> {
    pub dict: &'a Dictionary,
    pub primary: &'a [TansTable],
}

impl BigramSelect for BigramView<'_> {
    #[inline]
    fn table_for(&self, bucket: usize, prev: u8) -> &TansTable {
        self.dict
            .bigram_table(bucket, self.dict.bigram_class(prev))
            .unwrap_or(&self.primary[bucket])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> Vec<Vec<u8>> {
        (0..64u8)
            .map(|v| {
                (0..120)
                    .map(|i| ((i as u8).wrapping_mul(3) ^ (v & 3)).wrapping_add(i as u8 / 16))
                    .collect()
            })
            .collect()
    }

    #[test]
    fn test_train_produces_v5_with_lzp() {
        let c = corpus();
        let refs: Vec<&[u8]> = c.iter().map(|p| p.as_slice()).collect();
        let dict = Dictionary::train(&refs, 7).unwrap();
        assert_eq!(dict.model_id(), 7);
        assert_eq!(dict.format_version(), FORMAT_V5);
        assert!(dict.lzp().is_some());
        assert!(dict.has_bigram());
        assert_eq!(dict.primary().len(), NUM_BUCKETS);
        assert_eq!(dict.primary10().len(), NUM_BUCKETS);
    }

    #[test]
    fn test_train_rejects_bad_inputs() {
        let p: &[u8] = &[1, 2, 3];
        assert!(Dictionary::train(&[p], 0).is_err());
        assert!(Dictionary::train(&[p], 255).is_err());
        assert!(Dictionary::train(&[], 1).is_err());
        let empty: &[u8] = &[];
        assert!(Dictionary::train(&[empty], 1).is_err());
    }

    #[test]
    fn test_bigram_class_fallback_static() {
        let c = corpus();
        let refs: Vec<&[u8]> = c.iter().map(|p| p.as_slice()).collect();
        let mut dict = Dictionary::train(&refs, 3).unwrap();
        dict.class_map = None;
        assert_eq!(dict.bigram_class(0xC0), 3);
        assert_eq!(dict.bigram_class(0x00), 0);
    }

    #[test]
    fn test_bigram_view_falls_back_to_primary() {
        let c = corpus();
        let refs: Vec<&[u8]> = c.iter().map(|p| p.as_slice()).collect();
        let mut dict = Dictionary::train(&refs, 3).unwrap();
        // Blank out every bigram table; the view must hand back primaries.
        for t in dict.bigram.iter_mut() {
            *t = None;
        }
        let view = BigramView { dict: &dict, primary: &dict.primary };
        let t = view.table_for(2, 0x41);
        assert_eq!(t.table_log, TABLE_LOG_12);
    }
}
