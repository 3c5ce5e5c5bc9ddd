//! Bounds for bitwise operators on unsigned ranges.
//!
//! These are the classic algorithms from *Hacker's Delight* (Warren, section 4-3):
//! given `x ∈ [a, b]` and `y ∈ [c, d]` (unsigned, non-wrapping), they compute the
//! tightest bounds for `x | y`, `x & y` and `x ^ y` by walking the bits from the
//! most significant one down.
//!
//! All values are raw `u64` patterns of the given `width`.

use crate::word::low_bits;

/// Signature shared by all bound functions: `(a, b, c, d, width)`.
pub type Bound = fn(u64, u64, u64, u64, u32) -> u64;

fn top_bit(width: u32) -> u64 {
    1u64 << (width - 1)
}

pub fn min_or(mut a: u64, b: u64, mut c: u64, d: u64, width: u32) -> u64 {
    let mask = low_bits(width);
    let mut m = top_bit(width);
    while m != 0 {
        if !a & c & m != 0 {
            let temp = (a | m) & m.wrapping_neg() & mask;
            if temp <= b {
                a = temp;
                break;
            }
        } else if a & !c & m != 0 {
            let temp = (c | m) & m.wrapping_neg() & mask;
            if temp <= d {
                c = temp;
                break;
            }
        }
        m >>= 1;
    }
    a | c
}

pub fn max_or(a: u64, mut b: u64, c: u64, mut d: u64, width: u32) -> u64 {
    let mut m = top_bit(width);
    while m != 0 {
        if b & d & m != 0 {
            let temp = (b - m) | (m - 1);
            if temp >= a {
                b = temp;
                break;
            }
            let temp = (d - m) | (m - 1);
            if temp >= c {
                d = temp;
                break;
            }
        }
        m >>= 1;
    }
    b | d
}

/// `x & y == !(!x | !y)`, and `!` reverses the order of a range.
pub fn min_and(a: u64, b: u64, c: u64, d: u64, width: u32) -> u64 {
    let mask = low_bits(width);
    !max_or(!b & mask, !a & mask, !d & mask, !c & mask, width) & mask
}

pub fn max_and(a: u64, b: u64, c: u64, d: u64, width: u32) -> u64 {
    let mask = low_bits(width);
    !min_or(!b & mask, !a & mask, !d & mask, !c & mask, width) & mask
}

pub fn min_xor(mut a: u64, b: u64, mut c: u64, d: u64, width: u32) -> u64 {
    let mask = low_bits(width);
    let mut m = top_bit(width);
    while m != 0 {
        if !a & c & m != 0 {
            let temp = (a | m) & m.wrapping_neg() & mask;
            if temp <= b {
                a = temp;
            }
        } else if a & !c & m != 0 {
            let temp = (c | m) & m.wrapping_neg() & mask;
            if temp <= d {
                c = temp;
            }
        }
        m >>= 1;
    }
    a ^ c
}

pub fn max_xor(a: u64, mut b: u64, c: u64, mut d: u64, width: u32) -> u64 {
    let mut m = top_bit(width);
    while m != 0 {
        if b & d & m != 0 {
            let temp = (b - m) | (m - 1);
            if temp >= a {
                b = temp;
            } else {
                let temp = (d - m) | (m - 1);
                if temp >= c {
                    d = temp;
                }
            }
        }
        m >>= 1;
    }
    b ^ d
}
