//! Fixed-width machine words.
//!
//! A [`Word`] is an unsigned bit pattern of exactly `width` bits (`1..=64`).
//! All arithmetic wraps modulo `2^width`; the signed operations interpret the
//! same pattern in two's complement. Nothing in this module assumes a
//! signedness for the value itself.

use std::fmt;
use std::ops::{Add, BitAnd, BitOr, BitXor, Mul, Neg, Not, Sub};

use num_bigint::BigUint;
use num_integer::Integer;

/// Largest supported bit width.
pub const MAX_WIDTH: u32 = 64;

/// Mask with the lowest `n` bits set (`0 <= n <= 64`).
pub fn low_bits(n: u32) -> u64 {
    if n >= 64 {
        u64::MAX
    } else {
        (1u64 << n) - 1
    }
}

/// Check that `width` is a supported bit width.
///
/// # Panics
///
/// Panics if `width` is not in `1..=64`.
pub fn check_width(width: u32) {
    assert!(
        (1..=MAX_WIDTH).contains(&width),
        "Bit width should be in the range 1..=64, got {}",
        width
    );
}

/// An unsigned bit pattern of exactly `width` bits.
///
/// # Invariants
///
/// - `1 <= width <= 64`
/// - `bits == bits & low_bits(width)`, i.e. bits above `width` are always clear.
///
/// The derived `Ord` is the unsigned order of the bit patterns and is only
/// meaningful between words of the same width.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Word {
    bits: u64,
    width: u32,
}

impl Word {
    /// Create a word from the low `width` bits of `value`.
    pub fn new(value: u64, width: u32) -> Self {
        check_width(width);
        Self {
            bits: value & low_bits(width),
            width,
        }
    }

    /// Create a word from the two's complement representation of `value`.
    pub fn from_i64(value: i64, width: u32) -> Self {
        Self::new(value as u64, width)
    }

    /// Create a word from the low `width` bits of a (possibly negative) host integer.
    pub fn from_i128(value: i128, width: u32) -> Self {
        Self::new(value as u64, width)
    }

    /// Create a word from the low `width` bits of an arbitrary precision integer.
    pub fn from_biguint(value: &BigUint, width: u32) -> Self {
        Self::new(value.iter_u64_digits().next().unwrap_or(0), width)
    }

    pub fn zero(width: u32) -> Self {
        Self::new(0, width)
    }

    pub fn one(width: u32) -> Self {
        Self::new(1, width)
    }

    /// The all-ones pattern `2^w - 1`.
    pub fn max_unsigned(width: u32) -> Self {
        Self::new(u64::MAX, width)
    }

    /// The largest signed value `2^(w-1) - 1` (the start of the north pole).
    pub fn max_signed(width: u32) -> Self {
        Self::new(low_bits(width) >> 1, width)
    }

    /// The smallest signed value `2^(w-1)` (the end of the north pole).
    pub fn min_signed(width: u32) -> Self {
        Self::new(1u64 << (width - 1), width)
    }

    pub fn width(self) -> u32 {
        self.width
    }

    /// The zero-extended value.
    pub fn value(self) -> u64 {
        self.bits
    }

    /// The sign-extended value.
    pub fn to_i64(self) -> i64 {
        let shift = 64 - self.width;
        ((self.bits << shift) as i64) >> shift
    }

    pub fn to_u128(self) -> u128 {
        self.bits as u128
    }

    pub fn to_i128(self) -> i128 {
        self.to_i64() as i128
    }

    pub fn to_biguint(self) -> BigUint {
        BigUint::from(self.bits)
    }

    /// The number of distinct values of this width, `2^w`.
    pub fn modulus(self) -> u128 {
        1u128 << self.width
    }

    pub fn is_zero(self) -> bool {
        self.bits == 0
    }

    /// Test the most significant bit.
    pub fn msb(self) -> bool {
        self.bit(self.width - 1)
    }

    /// Test bit `n` (`0` is the least significant bit).
    pub fn bit(self, n: u32) -> bool {
        n < self.width && (self.bits >> n) & 1 == 1
    }

    fn check(self, other: Word) {
        assert_eq!(
            self.width, other.width,
            "Bit widths differ: {} vs {}",
            self, other
        );
    }

    fn with(self, bits: u64) -> Self {
        Self::new(bits, self.width)
    }

    pub fn inc(self) -> Self {
        self.with(self.bits.wrapping_add(1))
    }

    pub fn dec(self) -> Self {
        self.with(self.bits.wrapping_sub(1))
    }

    /// Unsigned division.
    ///
    /// # Panics
    ///
    /// Panics if `other` is zero.
    pub fn udiv(self, other: Word) -> Self {
        self.check(other);
        assert!(!other.is_zero(), "Division of {} by zero", self);
        self.with(self.bits / other.bits)
    }

    /// Unsigned remainder.
    ///
    /// # Panics
    ///
    /// Panics if `other` is zero.
    pub fn urem(self, other: Word) -> Self {
        self.check(other);
        assert!(!other.is_zero(), "Remainder of {} by zero", self);
        self.with(self.bits % other.bits)
    }

    /// Signed division, truncating toward zero. `MIN / -1` wraps to `MIN`.
    ///
    /// # Panics
    ///
    /// Panics if `other` is zero.
    pub fn sdiv(self, other: Word) -> Self {
        self.check(other);
        assert!(!other.is_zero(), "Division of {} by zero", self);
        Self::from_i128(self.to_i128() / other.to_i128(), self.width)
    }

    /// Signed remainder, carrying the sign of the dividend. `MIN % -1` is zero.
    ///
    /// # Panics
    ///
    /// Panics if `other` is zero.
    pub fn srem(self, other: Word) -> Self {
        self.check(other);
        assert!(!other.is_zero(), "Remainder of {} by zero", self);
        Self::from_i128(self.to_i128() % other.to_i128(), self.width)
    }

    /// Logical shift left. Shifting by `width` or more yields zero.
    pub fn shl(self, amount: u32) -> Self {
        if amount >= self.width {
            self.with(0)
        } else {
            self.with(self.bits << amount)
        }
    }

    /// Logical shift right. Shifting by `width` or more yields zero.
    pub fn shr(self, amount: u32) -> Self {
        if amount >= self.width {
            self.with(0)
        } else {
            self.with(self.bits >> amount)
        }
    }

    /// Arithmetic shift right. Shifting by `width` or more fills every bit with the sign.
    pub fn sar(self, amount: u32) -> Self {
        let amount = amount.min(self.width - 1);
        Self::from_i64(self.to_i64() >> amount, self.width)
    }

    /// Rotate left by `amount mod width`.
    pub fn rol(self, amount: u32) -> Self {
        let k = amount % self.width;
        if k == 0 {
            self
        } else {
            self.with((self.bits << k) | (self.bits >> (self.width - k)))
        }
    }

    /// Rotate right by `amount mod width`.
    pub fn ror(self, amount: u32) -> Self {
        let k = amount % self.width;
        self.rol(self.width - k)
    }

    /// Keep the low `width` bits.
    pub fn truncate(self, width: u32) -> Self {
        assert!(
            width <= self.width,
            "Cannot truncate {} to {} bits",
            self,
            width
        );
        Self::new(self.bits, width)
    }

    pub fn zero_extend(self, width: u32) -> Self {
        assert!(
            width >= self.width,
            "Cannot zero-extend {} to {} bits",
            self,
            width
        );
        Self::new(self.bits, width)
    }

    pub fn sign_extend(self, width: u32) -> Self {
        assert!(
            width >= self.width,
            "Cannot sign-extend {} to {} bits",
            self,
            width
        );
        Self::from_i64(self.to_i64(), width)
    }

    /// Zero-extend or truncate to `width`.
    pub fn cast(self, width: u32) -> Self {
        if width >= self.width {
            self.zero_extend(width)
        } else {
            self.truncate(width)
        }
    }

    pub fn ult(self, other: Word) -> bool {
        self.check(other);
        self.bits < other.bits
    }

    pub fn ule(self, other: Word) -> bool {
        self.check(other);
        self.bits <= other.bits
    }

    pub fn ugt(self, other: Word) -> bool {
        other.ult(self)
    }

    pub fn uge(self, other: Word) -> bool {
        other.ule(self)
    }

    pub fn slt(self, other: Word) -> bool {
        self.check(other);
        self.to_i64() < other.to_i64()
    }

    pub fn sle(self, other: Word) -> bool {
        self.check(other);
        self.to_i64() <= other.to_i64()
    }

    pub fn sgt(self, other: Word) -> bool {
        other.slt(self)
    }

    pub fn sge(self, other: Word) -> bool {
        other.sle(self)
    }

    pub fn umin(self, other: Word) -> Self {
        if self.ule(other) {
            self
        } else {
            other
        }
    }

    pub fn umax(self, other: Word) -> Self {
        if self.ule(other) {
            other
        } else {
            self
        }
    }

    pub fn smin(self, other: Word) -> Self {
        if self.sle(other) {
            self
        } else {
            other
        }
    }

    pub fn smax(self, other: Word) -> Self {
        if self.sle(other) {
            other
        } else {
            self
        }
    }

    /// Check whether `b` comes no later than `c` when walking the ring upwards from `self`.
    ///
    /// This is the primitive behind membership in a wrap-around interval:
    /// `x` lies in `[min, max]` iff `min.relative_le(x, max)`.
    pub fn relative_le(self, b: Word, c: Word) -> bool {
        (b - self).ule(c - self)
    }

    /// Does the unsigned product overflow `width` bits?
    pub fn umul_overflow(self, other: Word) -> bool {
        self.check(other);
        self.to_u128() * other.to_u128() > low_bits(self.width) as u128
    }

    /// Does the signed product leave the signed range of `width` bits?
    pub fn smul_overflow(self, other: Word) -> bool {
        self.check(other);
        let product = self.to_i128() * other.to_i128();
        product < Self::min_signed(self.width).to_i128()
            || product > Self::max_signed(self.width).to_i128()
    }

    /// Unsigned greatest common divisor. `gcd(0, x) == x`.
    pub fn gcd(self, other: Word) -> Self {
        self.check(other);
        self.with(self.bits.gcd(&other.bits))
    }

    /// Unsigned least common multiple, or `None` if it does not fit in `width` bits.
    pub fn checked_lcm(self, other: Word) -> Option<Self> {
        self.check(other);
        if self.is_zero() || other.is_zero() {
            return Some(self.with(0));
        }
        let lcm = (self.bits as u128).lcm(&(other.bits as u128));
        if lcm > low_bits(self.width) as u128 {
            None
        } else {
            Some(self.with(lcm as u64))
        }
    }

    /// Number of leading zero bits within `width`.
    pub fn leading_zeros(self) -> u32 {
        self.bits.leading_zeros() - (64 - self.width)
    }

    /// Number of trailing zero bits; `width` for zero.
    pub fn trailing_zeros(self) -> u32 {
        if self.is_zero() {
            self.width
        } else {
            self.bits.trailing_zeros()
        }
    }

    pub fn is_power_of_two(self) -> bool {
        self.bits.is_power_of_two()
    }

    /// `Some(k)` if the word is `2^k`.
    pub fn log2(self) -> Option<u32> {
        if self.is_power_of_two() {
            Some(self.bits.trailing_zeros())
        } else {
            None
        }
    }
}

impl Add for Word {
    type Output = Word;

    fn add(self, rhs: Word) -> Word {
        self.check(rhs);
        self.with(self.bits.wrapping_add(rhs.bits))
    }
}

impl Sub for Word {
    type Output = Word;

    fn sub(self, rhs: Word) -> Word {
        self.check(rhs);
        self.with(self.bits.wrapping_sub(rhs.bits))
    }
}

impl Mul for Word {
    type Output = Word;

    fn mul(self, rhs: Word) -> Word {
        self.check(rhs);
        self.with(self.bits.wrapping_mul(rhs.bits))
    }
}

impl Neg for Word {
    type Output = Word;

    fn neg(self) -> Word {
        self.with(self.bits.wrapping_neg())
    }
}

impl Not for Word {
    type Output = Word;

    fn not(self) -> Word {
        self.with(!self.bits)
    }
}

impl BitAnd for Word {
    type Output = Word;

    fn bitand(self, rhs: Word) -> Word {
        self.check(rhs);
        self.with(self.bits & rhs.bits)
    }
}

impl BitOr for Word {
    type Output = Word;

    fn bitor(self, rhs: Word) -> Word {
        self.check(rhs);
        self.with(self.bits | rhs.bits)
    }
}

impl BitXor for Word {
    type Output = Word;

    fn bitxor(self, rhs: Word) -> Word {
        self.check(rhs);
        self.with(self.bits ^ rhs.bits)
    }
}

impl fmt::Display for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.width == 1 {
            write!(f, "{}", if self.bits == 1 { "TRUE" } else { "FALSE" })
        } else {
            write!(f, "0x{:x}_{}", self.bits, self.width)
        }
    }
}

impl fmt::Debug for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::LowerHex for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.bits, f)
    }
}
