//! Small integer hashes used to derive per-instance and per-element ids.

#[inline]
fn rot(x: u32, k: u32) -> u32 {
    x.rotate_left(k)
}

/// Hash two integers into one (Bob Jenkins' lookup3 final mix).
///
/// Stable across platforms and runs, which is what makes derived ids deterministic.
pub fn hash2(kx: u32, ky: u32) -> u32 {
    let init = 0xdeadbeef_u32.wrapping_add(2 << 2).wrapping_add(13);
    let mut a = init.wrapping_add(kx);
    let mut b = init.wrapping_add(ky);
    let mut c = init;

    c ^= b;
    c = c.wrapping_sub(rot(b, 14));
    a ^= c;
    a = a.wrapping_sub(rot(c, 11));
    b ^= a;
    b = b.wrapping_sub(rot(a, 25));
    c ^= b;
    c = c.wrapping_sub(rot(b, 16));
    a ^= c;
    a = a.wrapping_sub(rot(c, 4));
    b ^= a;
    b = b.wrapping_sub(rot(a, 14));
    c ^= b;
    c = c.wrapping_sub(rot(b, 24));
    c
}

/// Same as [`hash2`], for ids stored as signed attribute values.
pub fn hash_ids(a: i32, b: i32) -> i32 {
    hash2(a as u32, b as u32) as i32
}
