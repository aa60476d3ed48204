//! Field-class inter-packet delta prediction.
//!
//! The residual operation depends on the byte offset: XOR for offsets 0–15
//! and 64–255 (preserves mantissa-delta patterns on packed IEEE-754
//! floats), wrapping subtraction for 16–63 and 256 up (tighter residuals on
//! monotone counters). The boundaries are wire-observable and fixed.
//!
//! Order-1 predicts the previous packet byte-for-byte; order-2 linearly
//! extrapolates from the two previous packets. Positions past a previous
//! packet's length predict 0.

/// True at offsets whose field class uses XOR.
#[inline]
pub fn is_xor_offset(i: usize) -> bool {
    i < 16 || (64..256).contains(&i)
}

#[inline]
fn pred1(prev: &[u8], i: usize) -> u8 {
    prev.get(i).copied().unwrap_or(0)
}

#[inline]
fn pred2(prev: &[u8], prev2: &[u8], i: usize) -> u8 {
    // predicted = 2*prev - prev2 (mod 256)
    pred1(prev, i)
        .wrapping_mul(2)
        .wrapping_sub(pred1(prev2, i))
}

/// Order-1 residual: `dst[i] = curr[i] op prev[i]`.
pub fn residual_order1(curr: &[u8], prev: &[u8], dst: &mut [u8]) {
    debug_assert_eq!(curr.len(), dst.len());
    for (i, &c) in curr.iter().enumerate() {
        let p = pred1(prev, i);
        dst[i] = if is_xor_offset(i) { c ^ p } else { c.wrapping_sub(p) };
    }
}

/// Order-2 residual against the linear extrapolation of prev/prev2.
pub fn residual_order2(curr: &[u8], prev: &[u8], prev2: &[u8], dst: &mut [u8]) {
    debug_assert_eq!(curr.len(), dst.len());
    for (i, &c) in curr.iter().enumerate() {
        let p = pred2(prev, prev2, i);
        dst[i] = if is_xor_offset(i) { c ^ p } else { c.wrapping_sub(p) };
    }
}

/// Invert [`residual_order1`] in place.
pub fn reconstruct_order1(buf: &mut [u8], prev: &[u8]) {
    for i in 0..buf.len() {
        let p = pred1(prev, i);
        buf[i] = if is_xor_offset(i) { buf[i] ^ p } else { buf[i].wrapping_add(p) };
    }
}

/// Invert [`residual_order2`] in place.
pub fn reconstruct_order2(buf: &mut [u8], prev: &[u8], prev2: &[u8]) {
    for i in 0..buf.len() {
        let p = pred2(prev, prev2, i);
        buf[i] = if is_xor_offset(i) { buf[i] ^ p } else { buf[i].wrapping_add(p) };
    }
}
