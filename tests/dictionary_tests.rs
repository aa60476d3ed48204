//! Dictionary training and blob lifecycle over the public API.

use std::sync::Arc;

use netc::{max_compressed_size, Config, Context, Dictionary, NetcError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn corpus(seed: u64) -> Vec<Vec<u8>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..100)
        .map(|t| {
            let len = rng.gen_range(40..800);
            (0..len)
                .map(|i| ((i as u8).wrapping_mul(11) ^ ((t as u8) & 3)).wrapping_add(7))
                .collect()
        })
        .collect()
}

#[test]
fn training_reproducibility() {
    let c = corpus(1);
    let refs: Vec<&[u8]> = c.iter().map(|p| p.as_slice()).collect();
    let blob_a = Dictionary::train(&refs, 33).unwrap().to_bytes();
    let blob_b = Dictionary::train(&refs, 33).unwrap().to_bytes();
    assert_eq!(blob_a, blob_b, "training must be byte-reproducible");
}

#[test]
fn blob_roundtrip_preserves_behavior() {
    let c = corpus(2);
    let refs: Vec<&[u8]> = c.iter().map(|p| p.as_slice()).collect();
    let original = Arc::new(Dictionary::train(&refs, 44).unwrap());
    let loaded = Arc::new(Dictionary::from_bytes(&original.to_bytes()).unwrap());

    // A packet compressed under the original dictionary decodes under the
    // loaded copy, and vice versa.
    let src = c[0].clone();
    let mut wire = vec![0u8; max_compressed_size(src.len())];
    let mut enc = Context::new(Some(original.clone()), Config::default()).unwrap();
    let n = enc.compress(&src, &mut wire).unwrap();

    let mut dec = Context::new(Some(loaded.clone()), Config::default()).unwrap();
    let mut out = vec![0u8; src.len()];
    let m = dec.decompress(&wire[..n], &mut out).unwrap();
    assert_eq!((m, out), (src.len(), src.clone()));

    let mut enc2 = Context::new(Some(loaded), Config::default()).unwrap();
    let mut wire2 = vec![0u8; max_compressed_size(src.len())];
    let n2 = enc2.compress(&src, &mut wire2).unwrap();
    assert_eq!(wire[..n], wire2[..n2], "loaded dictionary must behave identically");
}

#[test]
fn single_bit_flip_rejected() {
    let c = corpus(3);
    let refs: Vec<&[u8]> = c.iter().map(|p| p.as_slice()).collect();
    let blob = Dictionary::train(&refs, 55).unwrap().to_bytes();

    let mut rng = StdRng::seed_from_u64(0xB17);
    for _ in 0..200 {
        let pos = rng.gen_range(0..blob.len());
        let bit = rng.gen_range(0..8);
        let mut bad = blob.clone();
        bad[pos] ^= 1 << bit;
        assert!(
            Dictionary::from_bytes(&bad).is_err(),
            "bit {} of byte {} must invalidate the blob",
            bit,
            pos
        );
    }
}

#[test]
fn truncated_and_empty_blobs_rejected() {
    let c = corpus(4);
    let refs: Vec<&[u8]> = c.iter().map(|p| p.as_slice()).collect();
    let blob = Dictionary::train(&refs, 66).unwrap().to_bytes();
    assert_eq!(Dictionary::from_bytes(&[]).unwrap_err(), NetcError::DictInvalid);
    for cut in [1usize, 6, 517, blob.len() / 2, blob.len() - 1] {
        assert!(Dictionary::from_bytes(&blob[..cut]).is_err());
    }
}

#[test]
fn model_id_bounds() {
    let c = corpus(5);
    let refs: Vec<&[u8]> = c.iter().map(|p| p.as_slice()).collect();
    assert_eq!(Dictionary::train(&refs, 0).unwrap_err(), NetcError::InvalidArg);
    assert_eq!(Dictionary::train(&refs, 255).unwrap_err(), NetcError::InvalidArg);
    assert!(Dictionary::train(&refs, 1).is_ok());
    assert!(Dictionary::train(&refs, 254).is_ok());
}

#[test]
fn context_config_validation() {
    let c = corpus(6);
    let refs: Vec<&[u8]> = c.iter().map(|p| p.as_slice()).collect();
    let dict = Arc::new(Dictionary::train(&refs, 77).unwrap());

    let mut cfg = Config::default();
    cfg.stateless = true; // both modes set
    assert!(Context::new(Some(dict.clone()), cfg).is_err());

    let mut cfg = Config::default();
    cfg.compression_level = 11;
    assert!(Context::new(Some(dict.clone()), cfg).is_err());

    let mut cfg = Config::default();
    cfg.arena_size = 1; // below the computed minimum
    assert!(Context::new(Some(dict), cfg).is_err());
}
