//! Wrapped intervals.
//!
//! An [`Interval`] over-approximates a set of `w`-bit patterns by a cyclic range
//! `[min, max]` on the ring of `2^w` values. A range with `min > max` (unsigned)
//! simply wraps through the "south pole" `2^w - 1 → 0`; nothing in the domain
//! assumes whether the patterns are read as signed or unsigned numbers.
//!
//! Operators that need an order (multiplication, division, comparisons, ...)
//! first cut their operands at the *south pole* (`umax → 0`) and/or the
//! *north pole* (`smax → smin`) so that every piece is contiguous in the order
//! they need, compute per piece, and recombine the results with [`Interval::joins`].
//!
//! The lattice operations follow Navas et al. ("Signedness-Agnostic Program
//! Analysis", ISSTA 2012) and Gange et al. ("Interval Analysis and Machine
//! Arithmetic", TOPLAS 2015).

pub mod bits;

use std::fmt;

use log::{debug, warn};
use num_bigint::BigUint;

use crate::word::{check_width, low_bits, Word};

/// A wrap-around interval of `w`-bit patterns.
///
/// # Invariants
///
/// - Both endpoints of a `Range` have the same width.
/// - A `Range` never covers the whole ring; such a range is always `Top`.
///
/// The derived order (`Top < Range < Bot`, ranges by `min` then `max`) is only
/// used to sort intervals before computing a least upper bound.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub enum Interval {
    Top(u32),
    Range(Word, Word),
    Bot(u32),
}

impl Interval {
    pub fn top(width: u32) -> Self {
        check_width(width);
        Self::Top(width)
    }

    pub fn bot(width: u32) -> Self {
        check_width(width);
        Self::Bot(width)
    }

    /// The cyclic range `min, min+1, ..., max`.
    ///
    /// A range covering the whole ring is promoted to `Top`.
    pub fn new(min: Word, max: Word) -> Self {
        assert_eq!(
            min.width(),
            max.width(),
            "Interval bounds should have the same width"
        );
        if max.inc() == min {
            Self::Top(min.width())
        } else {
            Self::Range(min, max)
        }
    }

    pub fn number(value: Word) -> Self {
        Self::Range(value, value)
    }

    /// A 1-bit interval holding `TRUE` or `FALSE`.
    pub fn boolean(value: bool) -> Self {
        Self::number(Word::new(value as u64, 1))
    }

    fn from_flags(may_be_true: bool, may_be_false: bool) -> Self {
        match (may_be_true, may_be_false) {
            (true, true) => Self::Top(1),
            (true, false) => Self::boolean(true),
            (false, true) => Self::boolean(false),
            (false, false) => Self::Bot(1),
        }
    }

    /// The interval holding the unsigned integers `lo..=hi`, reduced modulo `2^w`.
    pub fn from_unsigned_range(lo: u128, hi: u128, width: u32) -> Self {
        check_width(width);
        assert!(lo <= hi, "Empty integer range {}..={}", lo, hi);
        if hi - lo >= low_bits(width) as u128 {
            Self::Top(width)
        } else {
            Self::new(Word::new(lo as u64, width), Word::new(hi as u64, width))
        }
    }

    /// The interval holding the signed integers `lo..=hi`, reduced modulo `2^w`.
    pub fn from_signed_range(lo: i128, hi: i128, width: u32) -> Self {
        check_width(width);
        assert!(lo <= hi, "Empty integer range {}..={}", lo, hi);
        if hi - lo >= low_bits(width) as i128 {
            Self::Top(width)
        } else {
            Self::new(Word::from_i128(lo, width), Word::from_i128(hi, width))
        }
    }

    pub fn width(&self) -> u32 {
        match *self {
            Self::Top(w) | Self::Bot(w) => w,
            Self::Range(min, _) => min.width(),
        }
    }

    fn check(&self, other: &Self) {
        assert_eq!(
            self.width(),
            other.width(),
            "Interval widths differ: {} vs {}",
            self,
            other
        );
    }

    pub fn is_top(&self) -> bool {
        matches!(self, Self::Top(_))
    }

    pub fn is_bot(&self) -> bool {
        matches!(self, Self::Bot(_))
    }

    /// The endpoints of a `Range`.
    pub fn bounds(&self) -> Option<(Word, Word)> {
        match *self {
            Self::Range(min, max) => Some((min, max)),
            _ => None,
        }
    }

    /// The single element, if there is exactly one.
    pub fn unique(&self) -> Option<Word> {
        match *self {
            Self::Range(min, max) if min == max => Some(min),
            _ => None,
        }
    }

    pub fn has(&self, value: Word) -> bool {
        assert_eq!(self.width(), value.width(), "Widths differ: {} vs {}", self, value);
        match *self {
            Self::Top(_) => true,
            Self::Bot(_) => false,
            Self::Range(min, max) => min.relative_le(value, max),
        }
    }

    /// Number of elements.
    pub fn size(&self) -> u128 {
        match *self {
            Self::Top(w) => 1u128 << w,
            Self::Bot(_) => 0,
            Self::Range(min, max) => (max - min).to_u128() + 1,
        }
    }

    /// Number of elements as an arbitrary precision integer.
    pub fn cardinality(&self) -> BigUint {
        BigUint::from(self.size())
    }

    pub fn min_unsigned(&self) -> Option<Word> {
        match *self {
            Self::Top(w) => Some(Word::zero(w)),
            Self::Bot(_) => None,
            Self::Range(min, max) if min.ule(max) => Some(min),
            Self::Range(min, _) => Some(Word::zero(min.width())),
        }
    }

    pub fn max_unsigned(&self) -> Option<Word> {
        match *self {
            Self::Top(w) => Some(Word::max_unsigned(w)),
            Self::Bot(_) => None,
            Self::Range(min, max) if min.ule(max) => Some(max),
            Self::Range(min, _) => Some(Word::max_unsigned(min.width())),
        }
    }

    pub fn min_signed(&self) -> Option<Word> {
        match *self {
            Self::Top(w) => Some(Word::min_signed(w)),
            Self::Bot(_) => None,
            Self::Range(min, max) if min.sle(max) => Some(min),
            Self::Range(min, _) => Some(Word::min_signed(min.width())),
        }
    }

    pub fn max_signed(&self) -> Option<Word> {
        match *self {
            Self::Top(w) => Some(Word::max_signed(w)),
            Self::Bot(_) => None,
            Self::Range(min, max) if min.sle(max) => Some(max),
            Self::Range(min, _) => Some(Word::max_signed(min.width())),
        }
    }

    /// Lattice order: set inclusion.
    pub fn le(&self, other: &Self) -> bool {
        self.check(other);
        match (*self, *other) {
            (Self::Bot(_), _) | (_, Self::Top(_)) => true,
            (Self::Top(_), _) | (_, Self::Bot(_)) => false,
            (Self::Range(a, b), Self::Range(c, d)) => {
                other.has(a) && other.has(b) && ((a == c && b == d) || !self.has(c) || !self.has(d))
            }
        }
    }

    /// The least wrap-around interval containing both operands.
    pub fn join(&self, other: &Self) -> Self {
        self.check(other);
        if self.le(other) {
            return *other;
        }
        if other.le(self) {
            return *self;
        }
        let (a, b, c, d) = match (*self, *other) {
            (Self::Range(a, b), Self::Range(c, d)) => (a, b, c, d),
            _ => return Self::Top(self.width()),
        };
        let result = if other.has(a) && other.has(b) && self.has(c) && self.has(d) {
            Self::Top(self.width())
        } else if other.has(b) && self.has(c) {
            Self::new(a, d)
        } else if self.has(d) && other.has(a) {
            Self::new(c, b)
        } else {
            // Disjoint: bridge the smaller of the two gaps.
            let forward = (c - b).value();
            let backward = (a - d).value();
            if forward < backward || (forward == backward && a.ult(c)) {
                Self::new(a, d)
            } else {
                Self::new(c, b)
            }
        };
        debug!("{} `join` {} = {}", self, other, result);
        result
    }

    /// The cyclic complement. `Top` and `Bot` swap.
    pub fn invert(&self) -> Self {
        match *self {
            Self::Top(w) => Self::Bot(w),
            Self::Bot(w) => Self::Top(w),
            Self::Range(min, max) => Self::new(max.inc(), min.dec()),
        }
    }

    /// The exact intersection as zero, one or two disjoint ranges.
    pub fn intersection(&self, other: &Self) -> Vec<Self> {
        self.check(other);
        match (*self, *other) {
            (Self::Bot(_), _) | (_, Self::Bot(_)) => vec![],
            (Self::Top(_), x) | (x, Self::Top(_)) => vec![x],
            (Self::Range(a, b), Self::Range(c, d)) => {
                if a == c && b == d {
                    return vec![*self];
                }
                let (a_in, b_in) = (other.has(a), other.has(b));
                let (c_in, d_in) = (self.has(c), self.has(d));
                if a_in && b_in && c_in && d_in {
                    vec![Self::new(a, d), Self::new(c, b)]
                } else if a_in && b_in {
                    vec![*self]
                } else if c_in && d_in {
                    vec![*other]
                } else if a_in && d_in {
                    vec![Self::new(a, d)]
                } else if b_in && c_in {
                    vec![Self::new(c, b)]
                } else {
                    vec![]
                }
            }
        }
    }

    /// The smallest interval covering the intersection.
    ///
    /// When the operands overlap at both ends the intersection has two pieces and
    /// the result is the smaller of the operands, which is not below both of them.
    pub fn meet(&self, other: &Self) -> Self {
        Self::joins(self.width(), self.intersection(other))
    }

    /// The values strictly between the end of `self` and the start of `other`.
    pub fn gap(&self, other: &Self) -> Self {
        self.check(other);
        match (*self, *other) {
            (Self::Range(_, b), Self::Range(c, _)) if !other.has(b) && !self.has(c) => {
                Self::new(c, b).invert()
            }
            _ => Self::Bot(self.width()),
        }
    }

    fn bigger(s: Self, t: Self) -> Self {
        if t.size() > s.size() {
            t
        } else {
            s
        }
    }

    fn crosses_south_pole(&self) -> bool {
        match *self {
            Self::Top(_) => true,
            Self::Bot(_) => false,
            Self::Range(min, max) => max.ult(min),
        }
    }

    /// The least upper bound of a set of intervals.
    ///
    /// Sorts the elements by their lower bound and returns the complement of the
    /// biggest gap left uncovered between them.
    pub fn joins<I>(width: u32, items: I) -> Self
    where
        I: IntoIterator<Item = Self>,
    {
        let mut items: Vec<Self> = items.into_iter().collect();
        for item in &items {
            assert_eq!(item.width(), width, "Interval widths differ in joins");
        }
        items.sort();
        let mut f = Self::bot(width);
        for item in items.iter().filter(|i| i.crosses_south_pole()) {
            f = f.join(item);
        }
        let mut g = Self::bot(width);
        for item in &items {
            g = Self::bigger(g, f.gap(item));
            f = f.join(item);
        }
        let result = Self::bigger(f.invert(), g).invert();
        debug_assert!(
            items.iter().all(|i| i.le(&result)),
            "joins of {:?} = {} is not an upper bound",
            items,
            result
        );
        result
    }

    /// Number of elements that lie in `[0, modulus-1]`.
    pub fn size_mod(&self, modulus: Word) -> u128 {
        let residues = Self::new(Word::zero(modulus.width()), modulus.dec());
        self.intersection(&residues).iter().map(|i| i.size()).sum()
    }

    fn bigger_mod(s: Self, t: Self, modulus: Word) -> Self {
        if s.size_mod(modulus) > t.size_mod(modulus) {
            s
        } else {
            t
        }
    }

    /// Join two intervals, only counting elements in `[0, modulus-1]` when choosing
    /// between the two ways around the ring.
    pub fn join_mod(&self, other: &Self, modulus: Word) -> Self {
        let x = self.join(other);
        let y = x.invert().join(self).join(other);
        if x.size_mod(modulus) <= y.size_mod(modulus) {
            x
        } else {
            y
        }
    }

    /// Like [`Interval::joins`], but sizes only count elements in `[0, modulus-1]`.
    ///
    /// Used to cover sets of remainders: elements outside `[0, modulus-1]` are
    /// never remainders, so an interval may freely wrap through them.
    pub fn joins_mod<I>(modulus: Word, items: I) -> Self
    where
        I: IntoIterator<Item = Self>,
    {
        assert!(!modulus.is_zero(), "Modulus should not be zero");
        let width = modulus.width();
        let mut items: Vec<Self> = items.into_iter().collect();
        for item in &items {
            assert_eq!(item.width(), width, "Interval widths differ in joins_mod");
        }
        items.sort();
        let mut f = Self::bot(width);
        for item in items.iter().filter(|i| i.crosses_south_pole()) {
            f = f.join_mod(item, modulus);
        }
        let mut g = Self::bot(width);
        for item in &items {
            g = Self::bigger_mod(g, f.gap(item), modulus);
            f = f.join_mod(item, modulus);
        }
        let result = Self::bigger_mod(f.invert(), g, modulus).invert();
        if items.iter().all(|i| i.le(&result)) {
            result
        } else {
            warn!(
                "joins_mod {} of {:?} = {} is not an upper bound, using joins",
                modulus, items, result
            );
            Self::joins(width, items)
        }
    }

    /// Extrapolate from `self` (an earlier iterate) towards `other` (a later one).
    ///
    /// Unchanged values stay, intervals of at least half the ring go to `Top`, and
    /// otherwise the interval is doubled in the direction it grew.
    pub fn widen(&self, other: &Self) -> Self {
        self.check(other);
        let result = match (*self, *other) {
            (Self::Bot(_), _) => *other,
            (_, Self::Bot(_)) | (Self::Top(_), _) => *self,
            (_, Self::Top(_)) => *other,
            _ if other.le(self) => *self,
            (Self::Range(a, b), Self::Range(c, d)) => {
                let w = self.width();
                if self.size() >= 1u128 << (w - 1) {
                    Self::Top(w)
                } else {
                    let two = Word::new(2, w);
                    let joined = self.join(other);
                    if joined == Self::new(a, d) {
                        Self::new(a, d).join(&Self::new(a, (b * two - a).inc()))
                    } else if joined == Self::new(c, b) {
                        Self::new(c, b).join(&Self::new((a * two - b).dec(), b))
                    } else if other.has(a) && other.has(b) {
                        other
                            .join(&Self::new(c, (c + b * two - a * two).inc()))
                            .join(self)
                    } else {
                        Self::Top(w)
                    }
                }
            }
        };
        debug!("{} `widen` {} = {}", self, other, result);
        debug_assert!(self.le(&result) && other.le(&result));
        result
    }

    /// Split at the north pole (`smax → smin`): every piece is contiguous in the signed order.
    pub fn split_north(&self) -> Vec<Self> {
        let w = self.width();
        let (smax, smin) = (Word::max_signed(w), Word::min_signed(w));
        match *self {
            Self::Bot(_) => vec![],
            Self::Top(_) => vec![Self::new(Word::zero(w), smax), Self::new(smin, Word::max_unsigned(w))],
            Self::Range(a, b) => {
                if Self::new(smax, smin).le(self) {
                    vec![Self::new(a, smax), Self::new(smin, b)]
                } else {
                    vec![*self]
                }
            }
        }
    }

    /// Split at the south pole (`umax → 0`): every piece is contiguous in the unsigned order.
    pub fn split_south(&self) -> Vec<Self> {
        let w = self.width();
        let (zero, umax) = (Word::zero(w), Word::max_unsigned(w));
        match *self {
            Self::Bot(_) => vec![],
            Self::Top(_) => vec![Self::new(zero, Word::max_signed(w)), Self::new(Word::min_signed(w), umax)],
            Self::Range(a, b) => {
                if Self::new(umax, zero).le(self) {
                    vec![Self::new(a, umax), Self::new(zero, b)]
                } else {
                    vec![*self]
                }
            }
        }
    }

    /// Split at both poles: every piece is contiguous in both orders and has a uniform sign.
    pub fn cut(&self) -> Vec<Self> {
        self.split_north().iter().flat_map(|i| i.split_south()).collect()
    }

    /// Bounds of a piece produced by `split_*` or `cut`; `Top` spans the whole ring.
    pub(crate) fn endpoints(&self) -> (Word, Word) {
        match *self {
            Self::Range(min, max) => (min, max),
            Self::Top(w) => (Word::zero(w), Word::max_unsigned(w)),
            Self::Bot(w) => (Word::zero(w), Word::zero(w)),
        }
    }

    pub fn add(&self, other: &Self) -> Self {
        self.check(other);
        let w = self.width();
        match (*self, *other) {
            (Self::Bot(_), _) | (_, Self::Bot(_)) => Self::Bot(w),
            (Self::Range(a, b), Self::Range(c, d)) if self.size() + other.size() <= 1u128 << w => {
                Self::new(a + c, b + d)
            }
            _ => Self::Top(w),
        }
    }

    pub fn sub(&self, other: &Self) -> Self {
        self.check(other);
        let w = self.width();
        match (*self, *other) {
            (Self::Bot(_), _) | (_, Self::Bot(_)) => Self::Bot(w),
            (Self::Range(a, b), Self::Range(c, d)) if self.size() + other.size() <= 1u128 << w => {
                Self::new(a - d, b - c)
            }
            _ => Self::Top(w),
        }
    }

    /// Two's complement negation.
    pub fn neg(&self) -> Self {
        match *self {
            Self::Range(a, b) => Self::new(-b, -a),
            other => other,
        }
    }

    /// Bitwise complement.
    pub fn not(&self) -> Self {
        match *self {
            Self::Range(a, b) => Self::new(!b, !a),
            other => other,
        }
    }

    pub fn mul(&self, other: &Self) -> Self {
        self.check(other);
        let w = self.width();
        let mut pieces = Vec::new();
        for p in self.cut() {
            for q in other.cut() {
                let (a, b) = p.endpoints();
                let (c, d) = q.endpoints();
                let unsigned = Self::from_unsigned_range(a.to_u128() * c.to_u128(), b.to_u128() * d.to_u128(), w);
                let corners = [
                    a.to_i128() * c.to_i128(),
                    a.to_i128() * d.to_i128(),
                    b.to_i128() * c.to_i128(),
                    b.to_i128() * d.to_i128(),
                ];
                let lo = corners.iter().copied().min().unwrap_or(0);
                let hi = corners.iter().copied().max().unwrap_or(0);
                let signed = Self::from_signed_range(lo, hi, w);
                pieces.push(unsigned.meet(&signed));
            }
        }
        Self::joins(w, pieces)
    }

    /// Pieces of `divisor` with zero removed.
    fn nonzero(divisor: &[Self]) -> Vec<(Word, Word)> {
        divisor
            .iter()
            .filter_map(|p| {
                let (c, d) = p.endpoints();
                if c.is_zero() {
                    if d.is_zero() {
                        None
                    } else {
                        Some((c.inc(), d))
                    }
                } else {
                    Some((c, d))
                }
            })
            .collect()
    }

    pub fn udiv(&self, other: &Self) -> Self {
        self.check(other);
        let w = self.width();
        let divisors = Self::nonzero(&other.split_south());
        let mut pieces = Vec::new();
        for p in self.split_south() {
            let (a, b) = p.endpoints();
            for &(c, d) in &divisors {
                pieces.push(Self::new(a.udiv(d), b.udiv(c)));
            }
        }
        Self::joins(w, pieces)
    }

    pub fn sdiv(&self, other: &Self) -> Self {
        self.check(other);
        let w = self.width();
        let divisors = Self::nonzero(&other.cut());
        let mut pieces = Vec::new();
        for p in self.cut() {
            let (a, b) = p.endpoints();
            for &(c, d) in &divisors {
                let corners = [
                    a.to_i128() / c.to_i128(),
                    a.to_i128() / d.to_i128(),
                    b.to_i128() / c.to_i128(),
                    b.to_i128() / d.to_i128(),
                ];
                let lo = corners.iter().copied().min().unwrap_or(0);
                let hi = corners.iter().copied().max().unwrap_or(0);
                pieces.push(Self::from_signed_range(lo, hi, w));
            }
        }
        Self::joins(w, pieces)
    }

    /// Ranges covering `x % y` for `x ∈ [a, b]`, `y ∈ [c, d]`, `c >= 1`.
    fn rem_ranges(a: u128, b: u128, c: u128, d: u128) -> Vec<(u128, u128)> {
        if b < c {
            return vec![(a, b)];
        }
        if c == d {
            if b - a + 1 >= c {
                return vec![(0, c - 1)];
            }
            let (lo, hi) = (a % c, b % c);
            return if lo <= hi {
                vec![(lo, hi)]
            } else {
                vec![(lo, c - 1), (0, hi)]
            };
        }
        let q = a / d;
        if q == b / c {
            vec![(a - q * d, b - q * c)]
        } else {
            vec![(0, b.min(d - 1))]
        }
    }

    pub fn urem(&self, other: &Self) -> Self {
        self.check(other);
        let w = self.width();
        let divisors = Self::nonzero(&other.split_south());
        let mut pieces = Vec::new();
        for p in self.split_south() {
            let (a, b) = p.endpoints();
            for &(c, d) in &divisors {
                for (lo, hi) in Self::rem_ranges(a.to_u128(), b.to_u128(), c.to_u128(), d.to_u128()) {
                    pieces.push(Self::from_unsigned_range(lo, hi, w));
                }
            }
        }
        Self::joins(w, pieces)
    }

    pub fn srem(&self, other: &Self) -> Self {
        self.check(other);
        let w = self.width();
        let magnitude = |a: Word, b: Word| -> (u128, u128) {
            if a.msb() {
                ((-b.to_i128()) as u128, (-a.to_i128()) as u128)
            } else {
                (a.to_u128(), b.to_u128())
            }
        };
        let divisors = Self::nonzero(&other.cut());
        let mut pieces = Vec::new();
        for p in self.cut() {
            let (a, b) = p.endpoints();
            let (x_lo, x_hi) = magnitude(a, b);
            for &(c, d) in &divisors {
                let (y_lo, y_hi) = magnitude(c, d);
                for (lo, hi) in Self::rem_ranges(x_lo, x_hi, y_lo, y_hi) {
                    pieces.push(if a.msb() {
                        Self::from_signed_range(-(hi as i128), -(lo as i128), w)
                    } else {
                        Self::from_unsigned_range(lo, hi, w)
                    });
                }
            }
        }
        Self::joins(w, pieces)
    }

    fn bitwise(&self, other: &Self, lo: bits::Bound, hi: bits::Bound) -> Self {
        self.check(other);
        let w = self.width();
        let mut pieces = Vec::new();
        for p in self.split_south() {
            for q in other.split_south() {
                let (a, b) = p.endpoints();
                let (c, d) = q.endpoints();
                let (a, b, c, d) = (a.value(), b.value(), c.value(), d.value());
                pieces.push(Self::new(Word::new(lo(a, b, c, d, w), w), Word::new(hi(a, b, c, d, w), w)));
            }
        }
        Self::joins(w, pieces)
    }

    pub fn and(&self, other: &Self) -> Self {
        self.bitwise(other, bits::min_and, bits::max_and)
    }

    pub fn or(&self, other: &Self) -> Self {
        self.bitwise(other, bits::min_or, bits::max_or)
    }

    pub fn xor(&self, other: &Self) -> Self {
        self.bitwise(other, bits::min_xor, bits::max_xor)
    }

    /// In-range shift amounts this interval holds, and whether it may hold an
    /// amount of `width` or more.
    pub fn shift_amounts(&self) -> (Vec<u32>, bool) {
        let w = self.width();
        let legal = (0..w).filter(|&k| self.has(Word::new(k as u64, w))).collect();
        let illegal = !self
            .intersection(&Self::new(Word::new(w as u64, w), Word::max_unsigned(w)))
            .is_empty();
        (legal, illegal)
    }

    fn shift(&self, amount: &Self, per_amount: impl Fn(&Self, u32) -> Vec<Self>, overflow: Vec<Self>) -> Self {
        self.check(amount);
        let w = self.width();
        if self.is_bot() || amount.is_bot() {
            return Self::Bot(w);
        }
        let (legal, illegal) = amount.shift_amounts();
        let mut pieces: Vec<Self> = legal.into_iter().flat_map(|k| per_amount(self, k)).collect();
        if illegal {
            pieces.extend(overflow);
        }
        Self::joins(w, pieces)
    }

    pub fn shl(&self, amount: &Self) -> Self {
        let w = self.width();
        self.shift(
            amount,
            |x, k| {
                x.split_south()
                    .iter()
                    .map(|p| {
                        let (a, b) = p.endpoints();
                        match Self::from_unsigned_range(a.to_u128() << k, b.to_u128() << k, w) {
                            Self::Top(_) => Self::new(Word::zero(w), Word::max_unsigned(w).shl(k)),
                            r => r,
                        }
                    })
                    .collect()
            },
            vec![Self::number(Word::zero(w))],
        )
    }

    pub fn shr(&self, amount: &Self) -> Self {
        let w = self.width();
        self.shift(
            amount,
            |x, k| {
                x.split_south()
                    .iter()
                    .map(|p| {
                        let (a, b) = p.endpoints();
                        Self::new(a.shr(k), b.shr(k))
                    })
                    .collect()
            },
            vec![Self::number(Word::zero(w))],
        )
    }

    pub fn sar(&self, amount: &Self) -> Self {
        let w = self.width();
        let mut overflow = Vec::new();
        if !self.intersection(&Self::new(Word::zero(w), Word::max_signed(w))).is_empty() {
            overflow.push(Self::number(Word::zero(w)));
        }
        if !self.intersection(&Self::new(Word::min_signed(w), Word::max_unsigned(w))).is_empty() {
            overflow.push(Self::number(Word::max_unsigned(w)));
        }
        self.shift(
            amount,
            |x, k| {
                x.split_north()
                    .iter()
                    .map(|p| {
                        let (a, b) = p.endpoints();
                        Self::new(a.sar(k), b.sar(k))
                    })
                    .collect()
            },
            overflow,
        )
    }

    /// Equality test as a 1-bit interval.
    pub fn equal(&self, other: &Self) -> Self {
        self.check(other);
        if self.is_bot() || other.is_bot() {
            return Self::Bot(1);
        }
        match (self.unique(), other.unique()) {
            (Some(x), Some(y)) => Self::boolean(x == y),
            _ if self.intersection(other).is_empty() => Self::boolean(false),
            _ => Self::Top(1),
        }
    }

    fn compare(
        &self,
        other: &Self,
        split: impl Fn(&Self) -> Vec<Self>,
        holds: impl Fn(Word, Word) -> bool,
    ) -> Self {
        self.check(other);
        let (mut may_be_true, mut may_be_false) = (false, false);
        for p in split(self) {
            for q in split(other) {
                let (a, b) = p.endpoints();
                let (c, d) = q.endpoints();
                // `holds` is monotone: smallest left vs. largest right decides "may be true".
                may_be_true |= holds(a, d);
                may_be_false |= !holds(b, c);
            }
        }
        Self::from_flags(may_be_true, may_be_false)
    }

    pub fn ult(&self, other: &Self) -> Self {
        self.compare(other, Self::split_south, Word::ult)
    }

    pub fn ule(&self, other: &Self) -> Self {
        self.compare(other, Self::split_south, Word::ule)
    }

    pub fn slt(&self, other: &Self) -> Self {
        self.compare(other, Self::split_north, Word::slt)
    }

    pub fn sle(&self, other: &Self) -> Self {
        self.compare(other, Self::split_north, Word::sle)
    }

    /// Narrow `(self, other)` to the pairs satisfying `self <=u other`.
    pub fn assume_ule(&self, other: &Self) -> (Self, Self) {
        self.check(other);
        let w = self.width();
        match (self.min_unsigned(), other.max_unsigned()) {
            (Some(lo), Some(hi)) => {
                let left = self.meet(&Self::new(Word::zero(w), hi));
                let right = other.meet(&Self::new(lo, Word::max_unsigned(w)));
                if left.is_bot() || right.is_bot() {
                    (Self::Bot(w), Self::Bot(w))
                } else {
                    (left, right)
                }
            }
            _ => (Self::Bot(w), Self::Bot(w)),
        }
    }

    /// Narrow `(self, other)` to the pairs satisfying `self <=s other`.
    pub fn assume_sle(&self, other: &Self) -> (Self, Self) {
        self.check(other);
        let w = self.width();
        match (self.min_signed(), other.max_signed()) {
            (Some(lo), Some(hi)) => {
                let left = self.meet(&Self::new(Word::min_signed(w), hi));
                let right = other.meet(&Self::new(lo, Word::max_signed(w)));
                if left.is_bot() || right.is_bot() {
                    (Self::Bot(w), Self::Bot(w))
                } else {
                    (left, right)
                }
            }
            _ => (Self::Bot(w), Self::Bot(w)),
        }
    }

    /// Remove `value` if it is an endpoint; used for `x != value`.
    pub fn exclude(&self, value: Word) -> Self {
        match *self {
            Self::Top(_) => Self::number(value).invert(),
            Self::Bot(w) => Self::Bot(w),
            Self::Range(a, b) if a == value && b == value => Self::Bot(a.width()),
            Self::Range(a, b) if a == value => Self::new(a.inc(), b),
            Self::Range(a, b) if b == value => Self::new(a, b.dec()),
            Self::Range(..) => *self,
        }
    }

    pub fn sign_extend(&self, width: u32) -> Self {
        assert!(width >= self.width(), "Cannot sign-extend {} to {} bits", self, width);
        if self.is_bot() {
            return Self::Bot(width);
        }
        let pieces = self.split_north().into_iter().map(|p| {
            let (a, b) = p.endpoints();
            Self::new(a.sign_extend(width), b.sign_extend(width))
        });
        Self::joins(width, pieces)
    }

    pub fn zero_extend(&self, width: u32) -> Self {
        assert!(width >= self.width(), "Cannot zero-extend {} to {} bits", self, width);
        if self.is_bot() {
            return Self::Bot(width);
        }
        let pieces = self.split_south().into_iter().map(|p| {
            let (a, b) = p.endpoints();
            Self::new(a.zero_extend(width), b.zero_extend(width))
        });
        Self::joins(width, pieces)
    }

    /// Keep the low `width` bits of every element.
    pub fn truncate(&self, width: u32) -> Self {
        assert!(width <= self.width(), "Cannot truncate {} to {} bits", self, width);
        match *self {
            Self::Bot(_) => Self::Bot(width),
            Self::Top(_) => Self::Top(width),
            Self::Range(..) if self.size() >= 1u128 << width => Self::Top(width),
            Self::Range(a, b) => Self::new(a.truncate(width), b.truncate(width)),
        }
    }

    /// Zero-extend or truncate to `width`.
    pub fn cast(&self, width: u32) -> Self {
        if width >= self.width() {
            self.zero_extend(width)
        } else {
            self.truncate(width)
        }
    }

    /// The same arc read in a wider ring, without splitting at the south pole.
    ///
    /// Sound for sets of small non-negative numbers such as remainders.
    pub(crate) fn widen_ring(&self, width: u32) -> Self {
        let w = self.width();
        match *self {
            Self::Bot(_) => Self::Bot(width),
            Self::Top(_) => Self::new(Word::zero(width), Word::max_unsigned(w).zero_extend(width)),
            Self::Range(a, b) => Self::new(a.zero_extend(width), b.zero_extend(width)),
        }
    }

    fn bit_mask(first: u32, last: u32, width: u32) -> Word {
        Word::new(low_bits(last + 1) & !low_bits(first), width)
    }

    /// Result width of a bit-range extension over bits `first..=last`.
    pub fn extension_width(&self, last: u32) -> u32 {
        self.width().max(last + 1)
    }

    /// Set bits `first..=last` of the result to copies of the sign bit.
    ///
    /// With `first == width` this is a plain sign extension to `last + 1` bits.
    /// With `first < width` the operand's own bits from `first` up are overwritten.
    pub fn sign_extend_bits(&self, first: u32, last: u32) -> Self {
        assert!(first <= last, "Empty bit range {}..={}", first, last);
        let target = self.extension_width(last);
        if first >= self.width() {
            return self.sign_extend(target);
        }
        let mask = Self::number(Self::bit_mask(first, last, target));
        let keep = Self::number(!Self::bit_mask(first, last, target));
        let pieces = self.cut().into_iter().map(|p| {
            let extended = p.sign_extend(target);
            let (a, _) = p.endpoints();
            if a.msb() {
                extended.or(&mask)
            } else {
                extended.and(&keep)
            }
        });
        Self::joins(target, pieces)
    }

    /// Clear bits `first..=last` of the zero-extended result.
    pub fn zero_extend_bits(&self, first: u32, last: u32) -> Self {
        assert!(first <= last, "Empty bit range {}..={}", first, last);
        let target = self.extension_width(last);
        let extended = self.zero_extend(target);
        if first >= self.width() {
            return extended;
        }
        extended.and(&Self::number(!Self::bit_mask(first, last, target)))
    }

    /// Intervals covering `{x % modulus : x ∈ self}`, each within `[0, modulus-1]`.
    pub fn residues(&self, modulus: Word) -> Vec<Self> {
        assert!(!modulus.is_zero(), "Modulus should not be zero");
        assert_eq!(self.width(), modulus.width(), "Modulus width differs from {}", self);
        let w = self.width();
        let m = modulus.value();
        let mut result = Vec::new();
        for p in self.split_south() {
            let (a, b) = p.endpoints();
            let (a, b) = (a.value(), b.value());
            if b - a >= m {
                result.push(Self::new(Word::zero(w), modulus.dec()));
            } else {
                let (lo, hi) = (a % m, b % m);
                if a < b - hi {
                    result.push(Self::new(Word::new(lo, w), modulus.dec()));
                    result.push(Self::new(Word::zero(w), Word::new(hi, w)));
                } else {
                    result.push(Self::new(Word::new(lo, w), Word::new(hi, w)));
                }
            }
        }
        result
    }

    /// Iterate over all elements, starting at `min`.
    pub fn elements(&self) -> Elements {
        match *self {
            Self::Top(w) => Elements {
                next: Some(Word::zero(w)),
                last: Word::max_unsigned(w),
            },
            Self::Bot(w) => Elements {
                next: None,
                last: Word::zero(w),
            },
            Self::Range(min, max) => Elements {
                next: Some(min),
                last: max,
            },
        }
    }

    /// All elements, or `None` if there are more than `threshold`.
    pub fn concretize(&self, threshold: usize) -> Option<Vec<Word>> {
        if self.size() > threshold as u128 {
            None
        } else {
            Some(self.elements().collect())
        }
    }
}

/// Iterator over the elements of an [`Interval`].
#[derive(Clone, Debug)]
pub struct Elements {
    next: Option<Word>,
    last: Word,
}

impl Iterator for Elements {
    type Item = Word;

    fn next(&mut self) -> Option<Word> {
        let current = self.next?;
        self.next = if current == self.last { None } else { Some(current.inc()) };
        Some(current)
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Top(w) => write!(f, "TOP_{}", w),
            Self::Bot(w) => write!(f, "BOT_{}", w),
            Self::Range(min, max) if min == max => write!(f, "{}", min),
            Self::Range(min, max) => write!(f, "[{:#x}, {:#x}]_{}", min, max, min.width()),
        }
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    fn w8(x: u64) -> Word {
        Word::new(x, 8)
    }

    fn iv(a: u64, b: u64) -> Interval {
        Interval::new(w8(a), w8(b))
    }

    fn num(x: u64) -> Interval {
        Interval::number(w8(x))
    }

    #[test]
    fn test_new_promotes_full_range_to_top() {
        assert_eq!(iv(5, 4), Interval::top(8));
        assert_eq!(iv(0, 255), Interval::top(8));
        assert!(matches!(iv(200, 50), Interval::Range(..)));
    }

    #[test]
    fn test_membership_wraps() {
        let i = iv(200, 50);
        assert!(i.has(w8(255)));
        assert!(i.has(w8(0)));
        assert!(!i.has(w8(100)));
        assert_eq!(i.size(), 107);
        assert_eq!(i.cardinality(), BigUint::from(107u32));
    }

    #[test]
    fn test_invert() {
        assert_eq!(Interval::top(8).invert(), Interval::bot(8));
        assert_eq!(Interval::bot(8).invert(), Interval::top(8));
        assert_eq!(iv(10, 20).invert(), iv(21, 9));
    }

    #[test]
    fn test_le() {
        assert!(iv(10, 20).le(&iv(0, 30)));
        assert!(iv(250, 5).le(&iv(200, 50)));
        assert!(!iv(0, 30).le(&iv(10, 20)));
        // Same endpoints set but the other way around the ring.
        assert!(!iv(200, 50).le(&iv(50, 200)));
        assert!(Interval::bot(8).le(&iv(1, 1)));
        assert!(iv(1, 1).le(&Interval::top(8)));
    }

    #[test]
    fn test_join_picks_smaller_gap() {
        assert_eq!(num(4).join(&num(10)), iv(4, 10));
        assert_eq!(num(250).join(&num(3)), iv(250, 3));
        assert_eq!(iv(0, 10).join(&iv(5, 20)), iv(0, 20));
        assert_eq!(iv(0, 200).join(&iv(150, 10)), Interval::top(8));
    }

    #[test]
    fn test_join_is_commutative_on_ties() {
        let (a, b) = (iv(0, 9), iv(128, 137));
        assert_eq!(a.join(&b), b.join(&a));
        assert_eq!(a.join(&b), iv(0, 137));
    }

    #[test]
    fn test_joins_finds_biggest_gap() {
        let result = Interval::joins(8, vec![num(0), num(100), num(250)]);
        assert_eq!(result, iv(250, 100));
        assert_eq!(Interval::joins(8, vec![]), Interval::bot(8));
        assert_eq!(Interval::joins(8, vec![iv(1, 2), Interval::top(8)]), Interval::top(8));
    }

    #[test]
    fn test_intersection_two_pieces() {
        let pieces = iv(0, 200).intersection(&iv(190, 10));
        assert_eq!(pieces, vec![iv(0, 10), iv(190, 200)]);
        assert_eq!(iv(0, 10).intersection(&iv(20, 30)), vec![]);
        assert_eq!(iv(0, 10).meet(&iv(5, 30)), iv(5, 10));
    }

    #[test]
    fn test_gap() {
        assert_eq!(iv(0, 10).gap(&iv(20, 30)), iv(11, 19));
        assert_eq!(iv(0, 10).gap(&iv(11, 30)), Interval::bot(8));
        assert_eq!(iv(0, 10).gap(&iv(5, 30)), Interval::bot(8));
    }

    #[test]
    fn test_widen_doubles() {
        let widened = iv(0, 3).widen(&iv(0, 4));
        assert!(iv(0, 4).le(&widened));
        assert!(widened.size() >= 8);
        assert_eq!(iv(0, 200).widen(&iv(0, 201)), Interval::top(8));
        assert_eq!(iv(0, 4).widen(&iv(1, 2)), iv(0, 4));
    }

    #[test]
    fn test_widen_chain_terminates() {
        let mut current = num(0);
        let mut steps = 0;
        while !current.is_top() {
            let next = current.add(&num(1)).join(&current);
            current = current.widen(&next);
            steps += 1;
            assert!(steps <= 16, "widening did not stabilise: {}", current);
        }
    }

    #[test]
    fn test_splits() {
        assert_eq!(iv(100, 200).split_north(), vec![iv(100, 127), iv(128, 200)]);
        assert_eq!(iv(200, 50).split_south(), vec![iv(200, 255), iv(0, 50)]);
        assert_eq!(iv(100, 50).cut(), vec![iv(100, 127), iv(128, 255), iv(0, 50)]);
        assert_eq!(iv(1, 2).cut(), vec![iv(1, 2)]);
    }

    #[test]
    fn test_add_sub() {
        assert_eq!(iv(10, 20).add(&num(5)), iv(15, 25));
        assert_eq!(iv(0, 200).add(&iv(0, 200)), Interval::top(8));
        assert_eq!(iv(250, 255).add(&num(10)), iv(4, 9));
        assert_eq!(iv(10, 20).sub(&iv(0, 5)), iv(5, 20));
    }

    #[test]
    fn test_mul_uses_signed_bounds() {
        let minus_one = num(255);
        assert_eq!(iv(1, 3).mul(&minus_one), iv(253, 255));
        assert_eq!(iv(2, 3).mul(&iv(4, 5)), iv(8, 15));
    }

    #[test]
    fn test_div_rem() {
        assert_eq!(iv(10, 20).udiv(&num(2)), iv(5, 10));
        assert_eq!(iv(10, 20).udiv(&iv(0, 1)), iv(10, 20));
        assert_eq!(num(10).udiv(&num(0)), Interval::bot(8));
        assert_eq!(Interval::number(Word::from_i64(-7, 8)).sdiv(&num(2)), Interval::number(Word::from_i64(-3, 8)));
        assert_eq!(iv(10, 12).urem(&num(5)), iv(0, 2));
        assert_eq!(iv(13, 17).urem(&num(5)), iv(0, 4));
        assert_eq!(iv(13, 16).urem(&num(5)), iv(0, 4));
        assert_eq!(iv(10, 12).urem(&iv(20, 30)), iv(10, 12));
        assert_eq!(iv(0, 100).urem(&iv(3, 7)), iv(0, 6));
    }

    #[test]
    fn test_bitwise() {
        assert_eq!(iv(0, 15).and(&num(3)), iv(0, 3));
        assert_eq!(num(0xf0).or(&num(0x0f)), num(0xff));
        assert_eq!(num(5).xor(&num(3)), num(6));
        assert_eq!(iv(1, 5).not(), iv(250, 254));
        assert_eq!(iv(1, 5).neg(), iv(251, 255));
    }

    #[test]
    fn test_shifts() {
        assert_eq!(iv(1, 3).shl(&num(2)), iv(4, 12));
        assert_eq!(iv(4, 12).shr(&num(2)), iv(1, 3));
        assert_eq!(num(0x80).sar(&num(1)), num(0xc0));
        assert_eq!(num(0x40).shl(&num(9)), num(0));
        assert_eq!(num(0x80).sar(&num(200)), num(0xff));
        assert!(num(1).shl(&iv(0, 2)).has(w8(4)));
    }

    #[test]
    fn test_relational() {
        let t = Interval::top(1);
        assert_eq!(iv(0, 5).ult(&iv(10, 20)), Interval::boolean(true));
        assert_eq!(iv(0, 5).ult(&iv(3, 20)), t);
        assert_eq!(iv(30, 40).ule(&iv(10, 20)), Interval::boolean(false));
        // 0xff is -1: signed-smaller than 0 but unsigned-larger.
        assert_eq!(num(255).slt(&num(0)), Interval::boolean(true));
        assert_eq!(num(255).ult(&num(0)), Interval::boolean(false));
        assert_eq!(num(7).equal(&num(7)), Interval::boolean(true));
        assert_eq!(iv(0, 5).equal(&iv(6, 9)), Interval::boolean(false));
        assert_eq!(iv(0, 5).equal(&iv(5, 9)), t);
    }

    #[test]
    fn test_assume() {
        let (s, t) = Interval::top(8).assume_ule(&iv(0, 9));
        assert_eq!(s, iv(0, 9));
        assert_eq!(t, iv(0, 9));
        let (s, t) = iv(20, 30).assume_ule(&iv(0, 9));
        assert!(s.is_bot() && t.is_bot());
        let (s, _) = Interval::top(8).assume_sle(&num(0));
        assert_eq!(s, iv(128, 0));
    }

    #[test]
    fn test_exclude() {
        assert_eq!(iv(0, 10).exclude(w8(0)), iv(1, 10));
        assert_eq!(iv(0, 10).exclude(w8(10)), iv(0, 9));
        assert_eq!(iv(0, 10).exclude(w8(5)), iv(0, 10));
        assert_eq!(num(3).exclude(w8(3)), Interval::bot(8));
        assert_eq!(Interval::top(8).exclude(w8(3)), iv(4, 2));
    }

    #[test]
    fn test_width_changes() {
        let ext = iv(0xfe, 0x01).sign_extend(16);
        assert_eq!(ext, Interval::new(Word::new(0xfffe, 16), Word::new(1, 16)));
        let ext = iv(0xfe, 0x01).zero_extend(16);
        assert_eq!(ext, Interval::new(Word::new(0, 16), Word::new(0xff, 16)));
        let wide = Interval::new(Word::new(0x1fe, 16), Word::new(0x201, 16));
        assert_eq!(wide.truncate(8), iv(0xfe, 0x01));
        let wide = Interval::new(Word::new(0, 16), Word::new(0x100, 16));
        assert_eq!(wide.truncate(8), Interval::top(8));
    }

    #[test]
    fn test_bit_range_extensions() {
        let x = num(0x80);
        assert_eq!(x.sign_extend_bits(8, 15), Interval::number(Word::new(0xff80, 16)));
        assert_eq!(num(0x7f).sign_extend_bits(4, 7), num(0x0f));
        assert_eq!(num(0x8f).sign_extend_bits(4, 7), num(0xff));
        assert_eq!(num(0xff).zero_extend_bits(4, 7), num(0x0f));
        assert_eq!(num(0xff).zero_extend_bits(8, 15), Interval::number(Word::new(0xff, 16)));
    }

    #[test]
    fn test_residues() {
        assert_eq!(iv(4, 10).residues(w8(6)), vec![iv(0, 5)]);
        assert_eq!(iv(4, 8).residues(w8(6)), vec![iv(4, 5), iv(0, 2)]);
        assert_eq!(iv(7, 8).residues(w8(6)), vec![iv(1, 2)]);
    }

    #[test]
    fn test_concretize() {
        assert_eq!(iv(254, 1).concretize(10), Some(vec![w8(254), w8(255), w8(0), w8(1)]));
        assert_eq!(iv(0, 100).concretize(10), None);
        assert_eq!(Interval::bot(8).concretize(10), Some(vec![]));
        assert_eq!(Interval::top(2).elements().count(), 4);
    }

    #[test]
    fn test_display() {
        assert_eq!(iv(10, 20).to_string(), "[0xa, 0x14]_8");
        assert_eq!(num(10).to_string(), "0xa_8");
        assert_eq!(Interval::top(32).to_string(), "TOP_32");
    }
}
