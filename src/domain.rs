//! Common interface of the value domains.
//!
//! The valuation state and the analysis are generic over [`ValueDomain`], so the
//! same driver runs with plain [`Interval`]s or with [`CcInterval`]s.
//!
//! # Lattice Properties
//!
//! For all same-width `a`, `b`:
//! - `bot ⊑ a ⊑ top`
//! - `a ⊑ a ⊔ b`, and `⊔` is commutative
//! - `a ∇ b` is above both arguments, and widening chains are finite
//!
//! `meet` is a sound over-approximation of the intersection and is below at least
//! one operand. Wrapped intervals are not closed under intersection, so when the
//! ranges overlap twice (or two congruences have no common form) it may not be
//! below both.

use std::fmt;
use std::hash::Hash;

use crate::congruence::CcInterval;
use crate::interval::Interval;
use crate::word::Word;

/// An abstract domain of fixed-width machine values.
pub trait ValueDomain: Copy + Eq + Hash + fmt::Debug + fmt::Display {
    /// A short name for logging.
    const NAME: &'static str;

    fn top(width: u32) -> Self;
    fn bot(width: u32) -> Self;
    fn number(value: Word) -> Self;
    fn from_interval(range: Interval) -> Self;
    /// The plain interval over-approximating `self`.
    fn to_interval(&self) -> Interval;

    fn width(&self) -> u32;
    fn is_top(&self) -> bool;
    fn is_bot(&self) -> bool;
    fn unique(&self) -> Option<Word>;
    fn has(&self, value: Word) -> bool;

    fn le(&self, other: &Self) -> bool;
    fn join(&self, other: &Self) -> Self;
    fn meet(&self, other: &Self) -> Self;
    /// Extrapolate from `self` (the earlier value) towards `other`.
    fn widen(&self, other: &Self) -> Self;

    /// Join of all `items`; `bot` if there are none.
    fn joins<I>(width: u32, items: I) -> Self
    where
        I: IntoIterator<Item = Self>,
    {
        items.into_iter().fold(Self::bot(width), |acc, x| acc.join(&x))
    }

    fn add(&self, other: &Self) -> Self;
    fn sub(&self, other: &Self) -> Self;
    fn mul(&self, other: &Self) -> Self;
    fn udiv(&self, other: &Self) -> Self;
    fn sdiv(&self, other: &Self) -> Self;
    fn urem(&self, other: &Self) -> Self;
    fn srem(&self, other: &Self) -> Self;
    fn neg(&self) -> Self;

    fn and(&self, other: &Self) -> Self;
    fn or(&self, other: &Self) -> Self;
    fn xor(&self, other: &Self) -> Self;
    fn not(&self) -> Self;
    fn shl(&self, amount: &Self) -> Self;
    fn shr(&self, amount: &Self) -> Self;
    fn sar(&self, amount: &Self) -> Self;

    /// One-bit result: `TRUE`, `FALSE`, or `TOP` when both are possible.
    fn equal(&self, other: &Self) -> Self;
    fn ult(&self, other: &Self) -> Self;
    fn ule(&self, other: &Self) -> Self;
    fn slt(&self, other: &Self) -> Self;
    fn sle(&self, other: &Self) -> Self;

    /// Refine both sides under the assumption `self <=u other`.
    fn assume_ule(&self, other: &Self) -> (Self, Self);
    /// Refine both sides under the assumption `self <=s other`.
    fn assume_sle(&self, other: &Self) -> (Self, Self);
    /// Refine under the assumption `self != value`.
    fn exclude(&self, value: Word) -> Self;

    fn sign_extend(&self, width: u32) -> Self;
    fn zero_extend(&self, width: u32) -> Self;
    fn truncate(&self, width: u32) -> Self;
    fn cast(&self, width: u32) -> Self;
    fn sign_extend_bits(&self, first: u32, last: u32) -> Self;
    fn zero_extend_bits(&self, first: u32, last: u32) -> Self;

    /// All members, or `None` if there are more than `threshold`.
    fn concretize(&self, threshold: usize) -> Option<Vec<Word>>;

    fn boolean(value: bool) -> Self {
        Self::number(Word::new(value as u64, 1))
    }
}

/// Forward trait methods to the inherent methods of the same name.
macro_rules! delegate {
    ($($name:ident(&self $(, $arg:ident: $ty:ty)*) -> $ret:ty;)*) => {
        $(
            fn $name(&self $(, $arg: $ty)*) -> $ret {
                Self::$name(self $(, $arg)*)
            }
        )*
    };
}

macro_rules! delegate_operators {
    () => {
        delegate! {
            width(&self) -> u32;
            is_top(&self) -> bool;
            is_bot(&self) -> bool;
            unique(&self) -> Option<Word>;
            has(&self, value: Word) -> bool;
            le(&self, other: &Self) -> bool;
            join(&self, other: &Self) -> Self;
            meet(&self, other: &Self) -> Self;
            widen(&self, other: &Self) -> Self;
            add(&self, other: &Self) -> Self;
            sub(&self, other: &Self) -> Self;
            mul(&self, other: &Self) -> Self;
            udiv(&self, other: &Self) -> Self;
            sdiv(&self, other: &Self) -> Self;
            urem(&self, other: &Self) -> Self;
            srem(&self, other: &Self) -> Self;
            neg(&self) -> Self;
            and(&self, other: &Self) -> Self;
            or(&self, other: &Self) -> Self;
            xor(&self, other: &Self) -> Self;
            not(&self) -> Self;
            shl(&self, amount: &Self) -> Self;
            shr(&self, amount: &Self) -> Self;
            sar(&self, amount: &Self) -> Self;
            equal(&self, other: &Self) -> Self;
            ult(&self, other: &Self) -> Self;
            ule(&self, other: &Self) -> Self;
            slt(&self, other: &Self) -> Self;
            sle(&self, other: &Self) -> Self;
            assume_ule(&self, other: &Self) -> (Self, Self);
            assume_sle(&self, other: &Self) -> (Self, Self);
            exclude(&self, value: Word) -> Self;
            sign_extend(&self, width: u32) -> Self;
            zero_extend(&self, width: u32) -> Self;
            truncate(&self, width: u32) -> Self;
            cast(&self, width: u32) -> Self;
            sign_extend_bits(&self, first: u32, last: u32) -> Self;
            zero_extend_bits(&self, first: u32, last: u32) -> Self;
            concretize(&self, threshold: usize) -> Option<Vec<Word>>;
        }
    };
}

impl ValueDomain for Interval {
    const NAME: &'static str = "interval";

    fn top(width: u32) -> Self {
        Interval::top(width)
    }

    fn bot(width: u32) -> Self {
        Interval::bot(width)
    }

    fn number(value: Word) -> Self {
        Interval::number(value)
    }

    fn from_interval(range: Interval) -> Self {
        range
    }

    fn to_interval(&self) -> Interval {
        *self
    }

    fn joins<I>(width: u32, items: I) -> Self
    where
        I: IntoIterator<Item = Self>,
    {
        Interval::joins(width, items)
    }

    delegate_operators!();
}

impl ValueDomain for CcInterval {
    const NAME: &'static str = "cc-interval";

    fn top(width: u32) -> Self {
        CcInterval::top(width)
    }

    fn bot(width: u32) -> Self {
        CcInterval::bot(width)
    }

    fn number(value: Word) -> Self {
        CcInterval::number(value)
    }

    fn from_interval(range: Interval) -> Self {
        CcInterval::from_interval(range)
    }

    fn to_interval(&self) -> Interval {
        self.range()
    }

    delegate_operators!();
}

#[cfg(test)]
pub mod tests {
    use test_log::test;

    use super::*;

    /// Every value of the domain at `width`, obtained from all intervals (and more).
    pub fn samples<D: ValueDomain>(width: u32, extra: &[D]) -> Vec<D> {
        let n = 1u64 << width;
        let mut result = vec![D::top(width), D::bot(width)];
        for a in 0..n {
            for b in 0..n {
                let range = Interval::new(Word::new(a, width), Word::new(b, width));
                result.push(D::from_interval(range));
            }
        }
        result.extend_from_slice(extra);
        result
    }

    /// Concrete members of a value, by brute force.
    pub fn gamma<D: ValueDomain>(x: &D) -> Vec<u64> {
        let w = x.width();
        (0..1u64 << w).filter(|&v| x.has(Word::new(v, w))).collect()
    }

    /// Validate the lattice laws on all pairs of `samples`.
    pub fn check_lattice_laws<D: ValueDomain>(samples: &[D]) {
        for a in samples {
            let w = a.width();
            assert!(D::bot(w).le(a), "bot is not below {}", a);
            assert!(a.le(&D::top(w)), "{} is not below top", a);
            assert!(a.le(a), "Reflexivity failed for {}", a);
            assert_eq!(a.join(&D::bot(w)), *a, "Join with bot failed for {}", a);
        }
        for a in samples {
            for b in samples {
                let joined = a.join(b);
                assert!(a.le(&joined) && b.le(&joined), "{} ⊔ {} = {} is not an upper bound", a, b, joined);
                assert_eq!(gamma(&joined), gamma(&b.join(a)), "Join of {} and {} is not commutative", a, b);

                let met = a.meet(b);
                let common: Vec<u64> = gamma(a).into_iter().filter(|&v| b.has(Word::new(v, b.width()))).collect();
                for v in common {
                    assert!(met.has(Word::new(v, met.width())), "{} ⊓ {} = {} misses {}", a, b, met, v);
                }
                assert!(met.le(a) || met.le(b), "{} ⊓ {} = {} is below neither", a, b, met);

                let widened = a.widen(b);
                assert!(a.le(&widened) && b.le(&widened), "{} ∇ {} = {} is not an upper bound", a, b, widened);
            }
        }
    }

    /// Xorshift generator of 8-bit values.
    pub struct Rng(pub u64);

    impl Rng {
        pub fn next(&mut self) -> u64 {
            self.0 ^= self.0 << 13;
            self.0 ^= self.0 >> 7;
            self.0 ^= self.0 << 17;
            self.0
        }

        fn word(&mut self) -> Word {
            Word::new(self.next(), 8)
        }

        pub fn interval(&mut self) -> Interval {
            let a = self.word();
            match self.next() % 6 {
                0 => Interval::top(8),
                1 => Interval::number(a),
                2 | 3 => Interval::new(a, a + Word::new(self.next() % 64, 8)),
                _ => Interval::new(a, self.word()),
            }
        }

        pub fn cc_interval(&mut self) -> CcInterval {
            if self.next() % 4 == 0 {
                return CcInterval::from_interval(self.interval());
            }
            let m = match self.next() % 6 {
                0 => 2,
                1 => 3,
                2 => 4,
                3 => 6,
                4 => 8,
                _ => 2 + self.next() % 254,
            };
            let residues = Interval::new(Word::new(self.next() % m, 8), Word::new(self.next() % m, 8));
            CcInterval::new(self.interval(), residues, Word::new(m, 8))
        }
    }

    /// Apply the binary operator called `name`.
    pub fn apply<D: ValueDomain>(name: &str, a: &D, b: &D) -> D {
        match name {
            "add" => a.add(b),
            "sub" => a.sub(b),
            "mul" => a.mul(b),
            "udiv" => a.udiv(b),
            "sdiv" => a.sdiv(b),
            "urem" => a.urem(b),
            "srem" => a.srem(b),
            "and" => a.and(b),
            "or" => a.or(b),
            "xor" => a.xor(b),
            "shl" => a.shl(b),
            "shr" => a.shr(b),
            "sar" => a.sar(b),
            "equal" => a.equal(b),
            "ult" => a.ult(b),
            "ule" => a.ule(b),
            "slt" => a.slt(b),
            "sle" => a.sle(b),
            _ => unreachable!("unknown operator {}", name),
        }
    }

    pub const OPERATORS: [&str; 18] = [
        "add", "sub", "mul", "udiv", "sdiv", "urem", "srem", "and", "or", "xor", "shl", "shr", "sar", "equal", "ult",
        "ule", "slt", "sle",
    ];

    #[test]
    fn test_interval_lattice_laws() {
        check_lattice_laws(&samples::<Interval>(3, &[]));
    }

    #[test]
    fn test_cc_interval_lattice_laws() {
        let w = |x| Word::new(x, 3);
        let extra = [
            CcInterval::new(Interval::new(w(0), w(6)), Interval::number(w(0)), w(2)),
            CcInterval::new(Interval::new(w(1), w(7)), Interval::number(w(1)), w(3)),
            CcInterval::new(Interval::new(w(6), w(3)), Interval::new(w(0), w(1)), w(4)),
            CcInterval::number(w(5)).join(&CcInterval::number(w(2))),
        ];
        check_lattice_laws(&samples::<CcInterval>(3, &extra));
    }

    #[test]
    fn test_random_interval_lattice_laws() {
        let mut rng = Rng(0x9e37_79b9_7f4a_7c15);
        let values: Vec<Interval> = (0..80).map(|_| rng.interval()).collect();
        check_lattice_laws(&values);
    }

    #[test]
    fn test_random_cc_interval_lattice_laws() {
        let mut rng = Rng(0x2545_f491_4f6c_dd1d);
        let values: Vec<CcInterval> = (0..80).map(|_| rng.cc_interval()).collect();
        check_lattice_laws(&values);
    }

    #[test]
    fn test_meet_is_below_both_operands() {
        let mut rng = Rng(0x0bad_cafe_f00d_1234);
        for _ in 0..2000 {
            let (a, b) = (rng.interval(), rng.interval());
            let m = a.meet(&b);
            if a.intersection(&b).len() < 2 {
                assert!(m.le(&a) && m.le(&b), "{} ⊓ {} = {}", a, b, m);
            }

            // A congruence on one side only is always expressible.
            let (c, d) = (rng.cc_interval(), CcInterval::from_interval(b));
            let m = c.meet(&d);
            if c.range().intersection(&b).len() < 2 {
                assert!(m.le(&c) && m.le(&d), "{} ⊓ {} = {}", c, d, m);
            }
        }
    }

    #[test]
    fn test_congruence_refines_interval() {
        let mut rng = Rng(0x1357_9bdf_2468_ace0);
        for _ in 0..1500 {
            let (a, b) = (rng.cc_interval(), rng.cc_interval());
            if a.is_bot() || b.is_bot() {
                continue;
            }
            for name in OPERATORS {
                let refined = apply(name, &a, &b);
                let plain = apply(name, &a.range(), &b.range());
                assert!(
                    refined.range().le(&plain),
                    "{}: {} and {} give {}, plain intervals give {}",
                    name,
                    a,
                    b,
                    refined,
                    plain
                );
            }
            for (refined, plain) in [
                (a.neg(), a.range().neg()),
                (a.not(), a.range().not()),
                (a.sign_extend(12), a.range().sign_extend(12)),
                (a.zero_extend(12), a.range().zero_extend(12)),
                (a.truncate(5), a.range().truncate(5)),
            ] {
                assert!(refined.range().le(&plain), "{}: {} is not below {}", a, refined, plain);
            }
        }
    }

    #[test]
    fn test_meet_is_below_both_without_double_overlap() {
        let w = |x| Word::new(x, 8);
        let a = Interval::new(w(0), w(100));
        let b = Interval::new(w(50), w(150));
        let m = ValueDomain::meet(&a, &b);
        assert!(m.le(&a) && m.le(&b));

        // Two overlaps: the meet covers both pieces and is only below one side.
        let c = Interval::new(w(90), w(10));
        let m = ValueDomain::meet(&a, &c);
        assert!(m.has(w(5)) && m.has(w(95)));
        assert!(m.le(&a));
    }

    #[test]
    fn test_boolean() {
        assert_eq!(<Interval as ValueDomain>::boolean(true), Interval::boolean(true));
        assert_eq!(<CcInterval as ValueDomain>::boolean(false), CcInterval::number(Word::new(0, 1)));
    }

    #[test]
    fn test_default_joins() {
        let w = |x| Word::new(x, 8);
        let xs = [0, 4, 8].map(|x| CcInterval::number(w(x)));
        let j = <CcInterval as ValueDomain>::joins(8, xs);
        assert!(j.has(w(4)) && !j.has(w(5)));
        assert!(<CcInterval as ValueDomain>::joins(8, []).is_bot());
    }
}
