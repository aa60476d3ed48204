//! Previous-byte equivalence classes for the bigram-conditioned tables.
//!
//! Conditioning a full 256-way order-1 model per bucket would need 4096
//! tables; instead the previous byte is quantized into 8 classes learned
//! from the corpus. Legacy (v4) dictionaries carry no trained map and use
//! the static top-two-bits split.

/// Trained class count.
pub const NUM_CLASSES: usize = 8;
/// Class count under the static legacy mapping.
pub const NUM_CLASSES_STATIC: usize = 4;

/// Static legacy mapping: top two bits of the previous byte.
#[inline]
pub fn static_class(prev: u8) -> usize {
    (prev >> 6) as usize
}

/// Train the 8-way class map.
///
/// For every previous-byte value, find its peak conditional symbol across
/// the corpus; sort the 256 values by (peak symbol, value) and cut the
/// sorted order into 8 equal groups of 32. Previous bytes that tend to be
/// followed by the same thing land in the same class.
pub fn train_class_map(packets: &[&[u8]]) -> [u8; 256] {
    // cond[prev][next] observation counts.
    let mut cond = vec![[0u32; 256]; 256];
    for p in packets {
        for w in p.windows(2) {
            cond[w[0] as usize][w[1] as usize] += 1;
        }
    }

    // Peak conditional symbol per previous byte; unobserved bytes peak at
    // 0 and sort together at the front.
    let mut peak = [0u8; 256];
    for prev in 0..256 {
        let mut best = (0u32, 0usize);
        for next in 0..256 {
            let c = cond[prev][next];
            if c > best.0 {
                best = (c, next);
            }
        }
        peak[prev] = best.1 as u8;
    }

    let mut order: Vec<u8> = (0..=255u8).collect();
    order.sort_by_key(|&b| (peak[b as usize], b));

    let mut map = [0u8; 256];
    for (rank, &b) in order.iter().enumerate() {
        map[b as usize] = (rank / (256 / NUM_CLASSES)) as u8;
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_class() {
        assert_eq!(static_class(0x00), 0);
        assert_eq!(static_class(0x3F), 0);
        assert_eq!(static_class(0x40), 1);
        assert_eq!(static_class(0x80), 2);
        assert_eq!(static_class(0xFF), 3);
    }

    #[test]
    fn test_trained_map_partitions_evenly() {
        let corpus: Vec<Vec<u8>> = (0..16u8)
            .map(|v| (0..200).map(|i| (i as u8).wrapping_mul(v | 1)).collect())
            .collect();
        let refs: Vec<&[u8]> = corpus.iter().map(|p| p.as_slice()).collect();
        let map = train_class_map(&refs);

        let mut counts = [0usize; NUM_CLASSES];
        for &c in map.iter() {
            assert!((c as usize) < NUM_CLASSES);
            counts[c as usize] += 1;
        }
        assert!(counts.iter().all(|&c| c == 32), "8 classes of 32 each");
    }

    #[test]
    fn test_trained_map_groups_same_successor() {
        // Bytes 0x10 and 0x20 are always followed by 0x99; byte 0x30 by 0x01.
        let mut p = Vec::new();
        for _ in 0..50 {
            p.extend_from_slice(&[0x10, 0x99, 0x20, 0x99, 0x30, 0x01]);
        }
        let map = train_class_map(&[&p]);
        assert_eq!(map[0x10], map[0x20], "same peak successor, same class");
    }

    #[test]
    fn test_training_deterministic() {
        let p: Vec<u8> = (0..255u8).collect();
        let a = train_class_map(&[&p]);
        let b = train_class_map(&[&p]);
        assert_eq!(a, b);
    }
}
