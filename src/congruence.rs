//! Congruence intervals.
//!
//! A [`CcInterval`] refines a wrapped [`Interval`] with a congruence: the value lies
//! in `range` *and* its unsigned remainder modulo `modulus` lies in `residues`.
//! This captures strides (`x ≡ 4 (mod 8)`) as well as unions of two ranges
//! (`[0, 9] ∪ [128, 137]` is the range `[0, 137]` with residues `[128, 9]`
//! modulo `255`).
//!
//! All constructors go through [`CcInterval::new`], which keeps the value in a
//! normal form: the range is tightened to its first and last members, the residues
//! to the remainders that are actually reachable, and a congruence that excludes
//! nothing is dropped.

use std::fmt;

use log::debug;
use num_integer::Integer;

use crate::interval::Interval;
use crate::word::{check_width, low_bits, Word};

/// Largest ratio between moduli for which remainders are lifted class by class.
const LIFT_LIMIT: u64 = 64;

/// A wrapped interval refined by a congruence.
///
/// # Invariants
///
/// - `Mod::range` is never `Bot` and never a single point.
/// - `Mod::modulus` is at least 2, and the congruence excludes some member of the range.
/// - `Zero` never holds `Top` or `Bot`.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum CcInterval {
    Top(u32),
    Bot(u32),
    /// No congruence information: just the range.
    Zero(Interval),
    /// Values `x ∈ range` with `x % modulus ∈ residues`.
    Mod {
        range: Interval,
        residues: Interval,
        modulus: Word,
    },
}

/// Pieces of `residues` that are actual remainders, i.e. lie in `[0, modulus-1]`.
fn residue_pieces(residues: &Interval, modulus: Word) -> Vec<Interval> {
    residues.intersection(&Interval::new(Word::zero(modulus.width()), modulus.dec()))
}

fn intersect_pieces(xs: &[Interval], ys: &[Interval]) -> Vec<Interval> {
    xs.iter()
        .flat_map(|x| ys.iter().flat_map(move |y| x.intersection(y)))
        .collect()
}

/// Push the remainders modulo `modulus` of the plain numbers `lo..=hi`.
fn reduce(lo: u128, hi: u128, modulus: Word, out: &mut Vec<Interval>) {
    let w = modulus.width();
    let m = modulus.to_u128();
    if hi - lo + 1 >= m {
        out.push(Interval::new(Word::zero(w), modulus.dec()));
        return;
    }
    let (a, b) = ((lo % m) as u64, (hi % m) as u64);
    if a <= b {
        out.push(Interval::new(Word::new(a, w), Word::new(b, w)));
    } else {
        out.push(Interval::new(Word::new(a, w), modulus.dec()));
        out.push(Interval::new(Word::zero(w), Word::new(b, w)));
    }
}

/// Canonical remainder arc for `residues`, together with its pieces.
///
/// Two pieces (one ending at `modulus-1`, one starting at `0`) become a single arc
/// wrapping through the values above `modulus`, which are never remainders.
fn canonical(residues: &Interval, modulus: Word) -> Option<(Interval, Vec<Interval>)> {
    let w = modulus.width();
    let pieces = residue_pieces(residues, modulus);
    let cover = match pieces.as_slice() {
        [] => return None,
        [p] => *p,
        [p, q] => {
            let (low, high) = if p.has(Word::zero(w)) { (p, q) } else { (q, p) };
            Interval::new(high.endpoints().0, low.endpoints().1)
        }
        _ => Interval::joins_mod(modulus, pieces.iter().copied()),
    };
    Some((cover, pieces))
}

/// Smallest `x ∈ [lo, hi]` whose remainder lies in one of the `pieces`.
fn first_member(lo: u64, hi: u64, pieces: &[(u64, u64)], m: u64) -> Option<u64> {
    let (lo, hi, m) = (lo as u128, hi as u128, m as u128);
    let base = lo - lo % m;
    let r = lo % m;
    pieces
        .iter()
        .map(|&(a, b)| {
            let (a, b) = (a as u128, b as u128);
            if r <= b {
                base + r.max(a)
            } else {
                base + m + a
            }
        })
        .filter(|&x| x <= hi)
        .min()
        .map(|x| x as u64)
}

/// Largest `x ∈ [lo, hi]` whose remainder lies in one of the `pieces`.
fn last_member(lo: u64, hi: u64, pieces: &[(u64, u64)], m: u64) -> Option<u64> {
    let r = hi % m;
    let base = hi - r;
    pieces
        .iter()
        .filter_map(|&(a, b)| {
            if r >= a {
                Some(base + r.min(b))
            } else {
                base.checked_sub(m).map(|x| x + b)
            }
        })
        .filter(|&x| x >= lo)
        .max()
}

/// Shrink `range` to its first and last values with a remainder in `pieces`.
fn tighten(range: Interval, pieces: &[(u64, u64)], m: u64) -> Interval {
    let w = range.width();
    let span = |lo: u64, hi: u64| Some((first_member(lo, hi, pieces, m)?, last_member(lo, hi, pieces, m)?));
    let found = match range {
        Interval::Bot(_) => None,
        Interval::Top(_) => span(0, low_bits(w)),
        Interval::Range(a, b) if a.ule(b) => span(a.value(), b.value()),
        Interval::Range(a, b) => match (span(a.value(), low_bits(w)), span(0, b.value())) {
            (Some((first, _)), Some((_, last))) => Some((first, last)),
            (Some(x), None) | (None, Some(x)) => Some(x),
            (None, None) => None,
        },
    };
    match found {
        Some((first, last)) => Interval::new(Word::new(first, w), Word::new(last, w)),
        None => Interval::Bot(w),
    }
}

fn pieces_bounds(pieces: &[Interval]) -> Vec<(u64, u64)> {
    pieces
        .iter()
        .map(|p| {
            let (a, b) = p.endpoints();
            (a.value(), b.value())
        })
        .collect()
}

impl CcInterval {
    pub fn top(width: u32) -> Self {
        check_width(width);
        Self::Top(width)
    }

    pub fn bot(width: u32) -> Self {
        check_width(width);
        Self::Bot(width)
    }

    pub fn number(value: Word) -> Self {
        Self::Zero(Interval::number(value))
    }

    pub fn from_interval(range: Interval) -> Self {
        match range {
            Interval::Top(w) => Self::Top(w),
            Interval::Bot(w) => Self::Bot(w),
            range => Self::Zero(range),
        }
    }

    /// The values of `range` whose remainder modulo `modulus` lies in `residues`.
    ///
    /// The result is normalized; the set it describes is exactly that conjunction.
    /// A zero modulus means "no congruence".
    pub fn new(range: Interval, residues: Interval, modulus: Word) -> Self {
        let w = range.width();
        assert_eq!(residues.width(), w, "Residue width differs from {}", range);
        assert_eq!(modulus.width(), w, "Modulus width differs from {}", range);
        if range.is_bot() || residues.is_bot() {
            return Self::Bot(w);
        }
        if modulus.is_zero() {
            return Self::from_interval(range);
        }
        if modulus == Word::one(w) {
            return if residues.has(Word::zero(w)) {
                Self::from_interval(range)
            } else {
                Self::Bot(w)
            };
        }
        let Some((mut residues, mut pieces)) = canonical(&residues, modulus) else {
            return Self::Bot(w);
        };
        if pieces.iter().map(|p| p.size()).sum::<u128>() == modulus.to_u128() {
            return Self::from_interval(range);
        }
        let mut range = range;
        loop {
            range = tighten(range, &pieces_bounds(&pieces), modulus.value());
            if range.is_bot() {
                return Self::Bot(w);
            }
            if range.unique().is_some() {
                return Self::Zero(range);
            }
            let reachable = intersect_pieces(&range.residues(modulus), &pieces);
            match canonical(&Interval::joins_mod(modulus, reachable), modulus) {
                Some((cover, narrowed)) if cover != residues && cover.le(&residues) => {
                    residues = cover;
                    pieces = narrowed;
                }
                _ => break,
            }
        }
        if range.residues(modulus).iter().all(|p| p.le(&residues)) {
            return Self::from_interval(range);
        }
        Self::Mod {
            range,
            residues,
            modulus,
        }
    }

    pub fn width(&self) -> u32 {
        match *self {
            Self::Top(w) | Self::Bot(w) => w,
            Self::Zero(range) | Self::Mod { range, .. } => range.width(),
        }
    }

    fn check(&self, other: &Self) {
        assert_eq!(
            self.width(),
            other.width(),
            "Congruence interval widths differ: {} and {}",
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

    /// The plain interval part, forgetting the congruence.
    pub fn range(&self) -> Interval {
        match *self {
            Self::Top(w) => Interval::Top(w),
            Self::Bot(w) => Interval::Bot(w),
            Self::Zero(range) | Self::Mod { range, .. } => range,
        }
    }

    pub fn modulus(&self) -> Option<Word> {
        match *self {
            Self::Mod { modulus, .. } => Some(modulus),
            _ => None,
        }
    }

    pub fn unique(&self) -> Option<Word> {
        match *self {
            Self::Zero(range) => range.unique(),
            _ => None,
        }
    }

    pub fn has(&self, value: Word) -> bool {
        assert_eq!(value.width(), self.width(), "Word width differs from {}", self);
        match *self {
            Self::Top(_) => true,
            Self::Bot(_) => false,
            Self::Zero(range) => range.has(value),
            Self::Mod {
                range,
                residues,
                modulus,
            } => range.has(value) && residues.has(value.urem(modulus)),
        }
    }

    /// Intervals covering the remainders modulo `modulus` of all members.
    pub fn residues(&self, modulus: Word) -> Vec<Interval> {
        match *self {
            Self::Bot(_) => Vec::new(),
            Self::Top(w) => Interval::Top(w).residues(modulus),
            Self::Zero(range) => range.residues(modulus),
            Self::Mod {
                range,
                residues,
                modulus: m,
            } => {
                let by_range = range.residues(modulus);
                let known = residue_pieces(&residues, m);
                let by_congruence: Vec<Interval> = if m.urem(modulus).is_zero() {
                    known.iter().flat_map(|p| p.residues(modulus)).collect()
                } else if modulus.urem(m).is_zero() {
                    // A remainder r modulo m is one of r, r+m, ... modulo a multiple of m.
                    let steps = modulus.udiv(m).value();
                    if steps <= LIFT_LIMIT {
                        (0..steps)
                            .flat_map(|j| {
                                let offset = m * Word::new(j, m.width());
                                known.iter().map(move |p| {
                                    let (a, b) = p.endpoints();
                                    Interval::new(a + offset, b + offset)
                                })
                            })
                            .collect()
                    } else {
                        known
                            .iter()
                            .map(|p| {
                                let (a, b) = p.endpoints();
                                Interval::new(a, b + (modulus - m))
                            })
                            .collect()
                    }
                } else {
                    return by_range;
                };
                let both = intersect_pieces(&by_range, &by_congruence);
                if both.is_empty() {
                    by_range
                } else {
                    both
                }
            }
        }
    }

    pub fn le(&self, other: &Self) -> bool {
        self.check(other);
        self.le_structural(other) || self.le_members(other)
    }

    /// Small values are compared member by member. This is exact where the
    /// remainders of `self` modulo an unrelated modulus are approximated.
    fn le_members(&self, other: &Self) -> bool {
        match self.concretize(LIFT_LIMIT as usize) {
            Some(members) => members.iter().all(|x| other.has(*x)),
            None => false,
        }
    }

    fn le_structural(&self, other: &Self) -> bool {
        match (*self, *other) {
            (Self::Bot(_), _) | (_, Self::Top(_)) => true,
            (Self::Top(_), _) | (_, Self::Bot(_)) => false,
            (_, Self::Zero(range)) => self.restrict(&range).is_some(),
            (
                _,
                Self::Mod {
                    range,
                    residues,
                    modulus,
                },
            ) => match self.restrict(&range) {
                Some(parts) => parts
                    .iter()
                    .all(|part| part.residues(modulus).iter().all(|p| p.le(&residues))),
                None => false,
            },
        }
    }

    /// The parts of `self` inside `range`, or `None` if some member lies outside it.
    fn restrict(&self, range: &Interval) -> Option<Vec<Self>> {
        let own = self.range();
        let outside = own.intersection(&range.invert());
        let inside = own.intersection(range);
        match *self {
            Self::Mod {
                residues, modulus, ..
            } => {
                let known = residue_pieces(&residues, modulus);
                outside
                    .iter()
                    .all(|o| intersect_pieces(&o.residues(modulus), &known).is_empty())
                    .then(|| inside.into_iter().map(|p| Self::new(p, residues, modulus)).collect())
            }
            _ => outside
                .is_empty()
                .then(|| inside.into_iter().map(Self::from_interval).collect()),
        }
    }

    /// Shrink the range into `plain`, the result of the same operator on plain intervals.
    fn clamp(self, plain: Interval) -> Self {
        let range = self.range();
        if range.le(&plain) {
            return self;
        }
        let narrowed = range.meet(&plain);
        let narrowed = if narrowed.le(&plain) { narrowed } else { plain };
        match self {
            Self::Mod {
                residues, modulus, ..
            } => Self::new(narrowed, residues, modulus),
            _ => Self::from_interval(narrowed),
        }
    }

    /// Union of two ranges, remembering the hole between them as a congruence
    /// modulo `umax`: below `umax` every value is its own remainder.
    fn join_ranges(r1: Interval, r2: Interval) -> Self {
        let w = r1.width();
        let joined = r1.join(&r2);
        if joined.is_top() {
            return Self::Top(w);
        }
        let umax = Word::max_unsigned(w);
        let mut holes = vec![r1, r2, joined.invert()];
        if r1.has(umax) || r2.has(umax) {
            holes.push(Interval::number(Word::zero(w)));
        }
        Self::new(joined, Interval::joins(w, holes), umax)
    }

    /// Recover precision lost by a join that dropped its congruence.
    fn maybe_drop(r1: Interval, r2: Interval, joined: Self) -> Self {
        match joined {
            Self::Top(_) => Self::join_ranges(r1, r2),
            Self::Zero(range) => match Self::join_ranges(r1, r2) {
                Self::Zero(other) => {
                    let narrowed = range.meet(&other);
                    Self::from_interval(if narrowed.le(&range) { narrowed } else { range })
                }
                Self::Mod {
                    range: other,
                    residues,
                    modulus,
                } => {
                    let narrowed = range.meet(&other);
                    Self::new(
                        if narrowed.le(&range) { narrowed } else { range },
                        residues,
                        modulus,
                    )
                }
                _ => joined,
            },
            _ => joined,
        }
    }

    pub fn join(&self, other: &Self) -> Self {
        self.check(other);
        if self.le(other) {
            return *other;
        }
        if other.le(self) {
            return *self;
        }
        let w = self.width();
        let result = match (*self, *other) {
            (Self::Zero(r1), Self::Zero(r2)) => match (r1.unique(), r2.unique()) {
                (Some(a), Some(b)) => {
                    let (lo, hi) = (a.umin(b), a.umax(b));
                    let modulus = hi - lo;
                    Self::new(r1.join(&r2), Interval::number(lo.urem(modulus)), modulus)
                }
                _ => Self::join_ranges(r1, r2),
            },
            (Self::Zero(r1), Self::Mod { range, modulus, .. })
            | (Self::Mod { range, modulus, .. }, Self::Zero(r1)) => {
                let mut pieces = self.residues(modulus);
                pieces.extend(other.residues(modulus));
                let joined = Self::new(
                    range.join(&r1),
                    Interval::joins_mod(modulus, pieces),
                    modulus,
                );
                Self::maybe_drop(range, r1, joined)
            }
            (
                Self::Mod {
                    range: r1,
                    modulus: m1,
                    ..
                },
                Self::Mod {
                    range: r2,
                    modulus: m2,
                    ..
                },
            ) => {
                let g = m1.gcd(m2);
                let mut pieces = self.residues(g);
                pieces.extend(other.residues(g));
                let joined = Self::new(r1.join(&r2), Interval::joins_mod(g, pieces), g);
                Self::maybe_drop(r1, r2, joined)
            }
            _ => Self::Top(w),
        };
        debug!("{} `join` {} = {}", self, other, result);
        result
    }

    /// A sound over-approximation of the intersection.
    pub fn meet(&self, other: &Self) -> Self {
        self.check(other);
        let w = self.width();
        match (*self, *other) {
            (Self::Bot(_), _) | (_, Self::Bot(_)) => Self::Bot(w),
            (Self::Top(_), x) | (x, Self::Top(_)) => x,
            (Self::Zero(r1), Self::Zero(r2)) => Self::from_interval(r1.meet(&r2)),
            (
                Self::Zero(r1),
                Self::Mod {
                    range,
                    residues,
                    modulus,
                },
            )
            | (
                Self::Mod {
                    range,
                    residues,
                    modulus,
                },
                Self::Zero(r1),
            ) => Self::new(r1.meet(&range), residues, modulus),
            (
                Self::Mod {
                    range: r1,
                    residues: mr1,
                    modulus: m1,
                },
                Self::Mod {
                    range: r2,
                    residues: mr2,
                    modulus: m2,
                },
            ) => {
                let range = r1.meet(&r2);
                let left = Self::new(range, mr1, m1);
                let right = Self::new(range, mr2, m2);
                if left.is_bot() || right.is_bot() {
                    return Self::Bot(w);
                }
                let modulus = m1.checked_lcm(m2).unwrap_or_else(|| m1.umax(m2));
                let allowed = intersect_pieces(&left.residues(modulus), &right.residues(modulus));
                if allowed.is_empty() {
                    return Self::Bot(w);
                }
                let joined = Self::new(
                    left.range().meet(&right.range()),
                    Interval::joins_mod(modulus, allowed),
                    modulus,
                );
                if joined.is_bot() {
                    return joined;
                }
                // One modulus cannot always express both congruences: prefer a
                // candidate below both operands, then one below either.
                let candidates = [
                    joined,
                    Self::new(joined.range(), mr1, m1),
                    Self::new(joined.range(), mr2, m2),
                ];
                candidates
                    .iter()
                    .find(|c| c.le(self) && c.le(other))
                    .or_else(|| candidates.iter().find(|c| c.le(self) || c.le(other)))
                    .copied()
                    .unwrap_or(joined)
            }
        }
    }

    /// Extrapolate from `self` (an earlier iterate) towards `other`.
    pub fn widen(&self, other: &Self) -> Self {
        self.check(other);
        let result = match (*self, *other) {
            (Self::Bot(_), _) => *other,
            (_, Self::Bot(_)) | (Self::Top(_), _) => *self,
            (_, Self::Top(_)) => *other,
            _ if other.le(self) => *self,
            (Self::Zero(r1), Self::Zero(r2)) => Self::from_interval(r1.widen(&r2)),
            (
                Self::Mod {
                    range: r1,
                    residues: mr1,
                    modulus: m1,
                },
                Self::Mod {
                    range: r2,
                    residues: mr2,
                    modulus: m2,
                },
            ) => {
                let g = m1.gcd(m2);
                let residues = if mr1.unique().is_some() && mr2.unique().is_some() {
                    mr1.join(&mr2)
                } else {
                    mr1.widen(&mr2)
                };
                Self::new(r1.widen(&r2), Interval::joins_mod(g, residues.residues(g)), g)
            }
            (
                Self::Mod {
                    range: r1,
                    residues,
                    modulus,
                },
                Self::Zero(r2),
            ) => Self::new(
                r1.widen(&r2),
                residues.widen(&Interval::joins_mod(modulus, r2.residues(modulus))),
                modulus,
            ),
            (
                Self::Zero(r1),
                Self::Mod {
                    range: r2,
                    residues,
                    modulus,
                },
            ) => Self::new(
                r1.widen(&r2),
                Interval::joins_mod(modulus, r1.residues(modulus)).widen(&residues),
                modulus,
            ),
        };
        debug!("{} `widen` {} = {}", self, other, result);
        result
    }

    pub fn add(&self, other: &Self) -> Self {
        self.check(other);
        let w = self.width();
        if self.is_bot() || other.is_bot() {
            return Self::Bot(w);
        }
        let range = self.range().add(&other.range());
        let modulus = match (self.modulus(), other.modulus()) {
            (Some(m1), Some(m2)) => m1.gcd(m2),
            (Some(m), None) | (None, Some(m)) => m,
            (None, None) => return Self::from_interval(range),
        };
        // If the sum may wrap, remainders also shift by -(2^w mod m).
        let overflow = match (self.range().max_unsigned(), other.range().max_unsigned()) {
            (Some(x), Some(y)) => x.to_u128() + y.to_u128() > low_bits(w) as u128,
            _ => true,
        };
        let m = modulus.to_u128();
        let shift = (m - (1u128 << w) % m) % m;
        let mut pieces = Vec::new();
        for x in self.residues(modulus) {
            for y in other.residues(modulus) {
                let ((a, b), (c, d)) = (x.endpoints(), y.endpoints());
                let (lo, hi) = (a.to_u128() + c.to_u128(), b.to_u128() + d.to_u128());
                reduce(lo, hi, modulus, &mut pieces);
                if overflow {
                    reduce(lo + shift, hi + shift, modulus, &mut pieces);
                }
            }
        }
        Self::new(range, Interval::joins_mod(modulus, pieces), modulus)
    }

    pub fn neg(&self) -> Self {
        match *self {
            Self::Mod {
                range,
                residues,
                modulus,
            } => {
                let w = self.width();
                let wrap = ((1u128 << w) % modulus.to_u128()) as u64;
                let known = residue_pieces(&residues, modulus);
                let mut pieces: Vec<Interval> = known.iter().flat_map(|p| p.neg().residues(modulus)).collect();
                if known.iter().any(|p| p.has(Word::zero(w))) {
                    pieces.push(Interval::number(Word::new(wrap, w)));
                }
                Self::new(range.neg(), Interval::joins_mod(modulus, pieces), modulus)
            }
            _ => Self::from_interval(self.range().neg()),
        }
    }

    pub fn sub(&self, other: &Self) -> Self {
        self.add(&other.neg())
    }

    /// `!x == -(x + 1)`.
    pub fn not(&self) -> Self {
        self.add(&Self::number(Word::one(self.width()))).neg()
    }

    /// Multiply by the constant `u`.
    fn mul_const(&self, u: Word, range: Interval) -> Self {
        let w = self.width();
        if u.is_zero() {
            return Self::number(u);
        }
        if u == Word::one(w) {
            return *self;
        }
        let zero = Interval::number(Word::zero(w));
        let limit = low_bits(w) as u128;
        let fits = |r: Interval| r.max_unsigned().map_or(false, |x| x.to_u128() * u.to_u128() <= limit);
        let stride = Word::one(w).shl(u.trailing_zeros());
        match *self {
            Self::Bot(_) => Self::Bot(w),
            Self::Top(_) => Self::new(range, zero, stride),
            Self::Zero(r) => Self::new(range, zero, if fits(r) { u } else { stride }),
            Self::Mod {
                range: r,
                residues,
                modulus,
            } => {
                let known = residue_pieces(&residues, modulus);
                if fits(r) {
                    let product = u.to_u128() * modulus.to_u128();
                    if product > limit {
                        return Self::new(range, zero, u);
                    }
                    let m = Word::new(product as u64, w);
                    let pieces = known.iter().map(|p| {
                        let (a, b) = p.endpoints();
                        Interval::new(a * u, b * u)
                    });
                    Self::new(range, Interval::joins_mod(m, pieces), m)
                } else {
                    let scaled: Vec<Interval> = known.iter().map(|p| p.mul(&Interval::number(u))).collect();
                    let t = (u.trailing_zeros() + modulus.trailing_zeros()).min(w);
                    if t == w {
                        let narrowed = range.meet(&Interval::joins(w, scaled));
                        return Self::from_interval(if narrowed.le(&range) { narrowed } else { range });
                    }
                    let m = Word::one(w).shl(t);
                    let pieces = scaled.iter().flat_map(|p| p.residues(m));
                    Self::new(range, Interval::joins_mod(m, pieces), m)
                }
            }
        }
    }

    pub fn mul(&self, other: &Self) -> Self {
        self.check(other);
        let w = self.width();
        if self.is_bot() || other.is_bot() {
            return Self::Bot(w);
        }
        let range = self.range().mul(&other.range());
        if let Some(u) = other.unique() {
            return self.mul_const(u, range);
        }
        if let Some(u) = self.unique() {
            return other.mul_const(u, range);
        }
        if let (
            Self::Mod {
                range: r1,
                residues: mr1,
                modulus: m1,
            },
            Self::Mod {
                range: r2,
                residues: mr2,
                modulus: m2,
            },
        ) = (*self, *other)
        {
            // (c1 + k1·m1)(c2 + k2·m2) ≡ c1·c2 modulo gcd(c1·m2, c2·m1, m1·m2), without wrapping.
            if let (Some(c1), Some(c2), Some(x), Some(y)) =
                (mr1.unique(), mr2.unique(), r1.max_unsigned(), r2.max_unsigned())
            {
                let limit = low_bits(w) as u128;
                if x.to_u128() * y.to_u128() <= limit {
                    let (c1, c2, m1, m2) = (c1.to_u128(), c2.to_u128(), m1.to_u128(), m2.to_u128());
                    let g = (c1 * m2).gcd(&(c2 * m1)).gcd(&(m1 * m2));
                    if g >= 2 && g <= limit {
                        let residue = Word::new(((c1 * c2) % g) as u64, w);
                        return Self::new(range, Interval::number(residue), Word::new(g as u64, w));
                    }
                }
            }
        }
        Self::from_interval(range)
    }

    pub fn udiv(&self, other: &Self) -> Self {
        self.check(other);
        Self::from_interval(self.range().udiv(&other.range()))
    }

    pub fn sdiv(&self, other: &Self) -> Self {
        self.check(other);
        Self::from_interval(self.range().sdiv(&other.range()))
    }

    pub fn urem(&self, other: &Self) -> Self {
        self.check(other);
        let w = self.width();
        if self.is_bot() || other.is_bot() {
            return Self::Bot(w);
        }
        match other.unique() {
            Some(u) if u.is_zero() => Self::Bot(w),
            Some(u) => {
                let pieces = self.residues(u);
                Self::new(
                    Interval::joins(w, pieces.iter().copied()),
                    Interval::joins_mod(u, pieces),
                    u,
                )
                .clamp(self.range().urem(&other.range()))
            }
            None => Self::from_interval(self.range().urem(&other.range())),
        }
    }

    pub fn srem(&self, other: &Self) -> Self {
        self.check(other);
        Self::from_interval(self.range().srem(&other.range()))
    }

    /// `x & mask` for a mask of the form `2^k - 1` is `x % 2^k`.
    fn and_mask(&self, mask: Word) -> Option<Self> {
        let w = self.width();
        if mask == Word::max_unsigned(w) {
            return Some(*self);
        }
        let bound = mask.inc();
        if bound.is_power_of_two() {
            Some(self.urem(&Self::number(bound)))
        } else {
            None
        }
    }

    /// Apply an interval bitwise operator to the ranges and, modulo the largest
    /// power-of-two modulus around, to the remainders.
    fn bitwise(&self, other: &Self, op: fn(&Interval, &Interval) -> Interval) -> Self {
        self.check(other);
        let w = self.width();
        if self.is_bot() || other.is_bot() {
            return Self::Bot(w);
        }
        let range = op(&self.range(), &other.range());
        let modulus = [self.modulus(), other.modulus()]
            .into_iter()
            .flatten()
            .filter(|m| m.is_power_of_two())
            .max();
        let Some(modulus) = modulus else {
            return Self::from_interval(range);
        };
        let mut pieces = Vec::new();
        for x in self.residues(modulus) {
            for y in other.residues(modulus) {
                pieces.push(op(&x, &y));
            }
        }
        Self::new(range, Interval::joins_mod(modulus, pieces), modulus)
    }

    pub fn and(&self, other: &Self) -> Self {
        self.check(other);
        let masked = other
            .unique()
            .and_then(|mask| self.and_mask(mask))
            .or_else(|| self.unique().and_then(|mask| other.and_mask(mask)));
        if let Some(result) = masked {
            return result.clamp(self.range().and(&other.range()));
        }
        self.bitwise(other, Interval::and)
    }

    pub fn or(&self, other: &Self) -> Self {
        self.bitwise(other, Interval::or)
    }

    pub fn xor(&self, other: &Self) -> Self {
        self.bitwise(other, Interval::xor)
    }

    /// Shift amounts that are members, and whether some member is `>= width`.
    pub fn shift_amounts(&self) -> (Vec<u32>, bool) {
        let w = self.width();
        let (legal, illegal) = self.range().shift_amounts();
        let legal = legal
            .into_iter()
            .filter(|&k| self.has(Word::new(k as u64, w)))
            .collect();
        (legal, illegal)
    }

    pub fn shl(&self, amount: &Self) -> Self {
        self.check(amount);
        let w = self.width();
        if self.is_bot() || amount.is_bot() {
            return Self::Bot(w);
        }
        let (legal, illegal) = amount.shift_amounts();
        let mut result = Self::Bot(w);
        for k in legal {
            result = result.join(&self.mul(&Self::number(Word::one(w).shl(k))));
        }
        if illegal {
            result = result.join(&Self::number(Word::zero(w)));
        }
        result.clamp(self.range().shl(&amount.range()))
    }

    fn shift_right(&self, amount: &Self, op: fn(&Interval, &Interval) -> Interval) -> Self {
        self.check(amount);
        let w = self.width();
        if self.is_bot() || amount.is_bot() {
            return Self::Bot(w);
        }
        let (legal, illegal) = amount.shift_amounts();
        let mut pieces: Vec<Interval> = legal
            .into_iter()
            .map(|k| op(&self.range(), &Interval::number(Word::new(k as u64, w))))
            .collect();
        if illegal {
            pieces.push(op(&self.range(), &Interval::number(Word::new(w as u64, w))));
        }
        Self::from_interval(Interval::joins(w, pieces)).clamp(op(&self.range(), &amount.range()))
    }

    pub fn shr(&self, amount: &Self) -> Self {
        self.shift_right(amount, Interval::shr)
    }

    pub fn sar(&self, amount: &Self) -> Self {
        self.shift_right(amount, Interval::sar)
    }

    /// Whether the two values certainly share no member.
    fn disjoint(&self, other: &Self) -> bool {
        if self.range().intersection(&other.range()).is_empty() {
            return true;
        }
        let g = match (self.modulus(), other.modulus()) {
            (Some(m1), Some(m2)) => m1.gcd(m2),
            (Some(m), None) | (None, Some(m)) => m,
            (None, None) => return false,
        };
        g != Word::one(self.width()) && intersect_pieces(&self.residues(g), &other.residues(g)).is_empty()
    }

    pub fn equal(&self, other: &Self) -> Self {
        self.check(other);
        if self.is_bot() || other.is_bot() {
            return Self::Bot(1);
        }
        match (self.unique(), other.unique()) {
            (Some(a), Some(b)) => Self::from_interval(Interval::boolean(a == b)),
            _ if self.disjoint(other) => Self::from_interval(Interval::boolean(false)),
            _ => Self::Top(1),
        }
    }

    pub fn ult(&self, other: &Self) -> Self {
        Self::from_interval(self.range().ult(&other.range()))
    }

    pub fn ule(&self, other: &Self) -> Self {
        Self::from_interval(self.range().ule(&other.range()))
    }

    pub fn slt(&self, other: &Self) -> Self {
        Self::from_interval(self.range().slt(&other.range()))
    }

    pub fn sle(&self, other: &Self) -> Self {
        Self::from_interval(self.range().sle(&other.range()))
    }

    /// Refine both sides under the assumption `self <=u other`.
    pub fn assume_ule(&self, other: &Self) -> (Self, Self) {
        let (a, b) = self.range().assume_ule(&other.range());
        (self.meet(&Self::from_interval(a)), other.meet(&Self::from_interval(b)))
    }

    /// Refine both sides under the assumption `self <=s other`.
    pub fn assume_sle(&self, other: &Self) -> (Self, Self) {
        let (a, b) = self.range().assume_sle(&other.range());
        (self.meet(&Self::from_interval(a)), other.meet(&Self::from_interval(b)))
    }

    pub fn exclude(&self, value: Word) -> Self {
        match *self {
            Self::Bot(_) => *self,
            _ => self.meet(&Self::from_interval(self.range().exclude(value))),
        }
    }

    pub fn sign_extend(&self, width: u32) -> Self {
        let w = self.width();
        assert!(width >= w, "Cannot sign-extend {} to {} bits", self, width);
        if width == w {
            return *self;
        }
        match *self {
            Self::Bot(_) => Self::Bot(width),
            Self::Top(_) | Self::Zero(_) => {
                let range = self.range();
                Self::new(
                    range.sign_extend(width),
                    range.widen_ring(width),
                    Word::one(width).shl(w),
                )
            }
            Self::Mod {
                range,
                residues,
                modulus,
            } => {
                let m = modulus.zero_extend(width);
                // Negative values gain 2^width - 2^w.
                let shift = ((1u128 << width) - (1u128 << w)) % m.to_u128();
                let known = residue_pieces(&residues, modulus);
                let mut result = Self::Bot(width);
                for piece in range.cut() {
                    let pieces = if piece.endpoints().0.msb() {
                        let mut out = Vec::new();
                        for p in &known {
                            let (a, b) = p.endpoints();
                            reduce(a.to_u128() + shift, b.to_u128() + shift, m, &mut out);
                        }
                        out
                    } else {
                        known.iter().map(|p| p.widen_ring(width)).collect()
                    };
                    let extended = Self::new(piece.sign_extend(width), Interval::joins_mod(m, pieces), m);
                    result = result.join(&extended);
                }
                result
            }
        }
    }

    pub fn zero_extend(&self, width: u32) -> Self {
        let w = self.width();
        assert!(width >= w, "Cannot zero-extend {} to {} bits", self, width);
        if width == w {
            return *self;
        }
        match *self {
            Self::Bot(_) => Self::Bot(width),
            Self::Top(_) => Self::from_interval(self.range().zero_extend(width)),
            Self::Zero(range) => Self::new(
                range.zero_extend(width),
                range.widen_ring(width),
                Word::one(width).shl(w),
            ),
            Self::Mod {
                range,
                residues,
                modulus,
            } => Self::new(
                range.zero_extend(width),
                residues.widen_ring(width),
                modulus.zero_extend(width),
            ),
        }
    }

    pub fn truncate(&self, width: u32) -> Self {
        let w = self.width();
        assert!(width <= w, "Cannot truncate {} to {} bits", self, width);
        if width == w {
            return *self;
        }
        match *self {
            Self::Bot(_) => Self::Bot(width),
            Self::Top(_) => Self::Top(width),
            Self::Zero(range) => Self::from_interval(range.truncate(width)),
            Self::Mod {
                range,
                residues,
                modulus,
            } => {
                let range = range.truncate(width);
                if !modulus.is_power_of_two() {
                    return Self::from_interval(range);
                }
                let known = residue_pieces(&residues, modulus);
                let truncated = if modulus.to_u128() < 1u128 << width {
                    let m = modulus.truncate(width);
                    let pieces = known.iter().map(|p| {
                        let (a, b) = p.endpoints();
                        Interval::new(a.truncate(width), b.truncate(width))
                    });
                    Self::new(range, Interval::joins_mod(m, pieces), m)
                } else {
                    let pieces = known.iter().map(|p| p.truncate(width));
                    Self::from_interval(range.meet(&Interval::joins(width, pieces)))
                };
                truncated.clamp(range)
            }
        }
    }

    pub fn cast(&self, width: u32) -> Self {
        if width >= self.width() {
            self.zero_extend(width)
        } else {
            self.truncate(width)
        }
    }

    pub fn sign_extend_bits(&self, first: u32, last: u32) -> Self {
        if first >= self.width() {
            self.sign_extend(self.range().extension_width(last))
        } else {
            Self::from_interval(self.range().sign_extend_bits(first, last))
        }
    }

    pub fn zero_extend_bits(&self, first: u32, last: u32) -> Self {
        if first >= self.width() {
            self.zero_extend(self.range().extension_width(last))
        } else {
            Self::from_interval(self.range().zero_extend_bits(first, last))
        }
    }

    /// All members in order from the range's minimum, or `None` if there are more than `threshold`.
    pub fn concretize(&self, threshold: usize) -> Option<Vec<Word>> {
        let Self::Mod {
            range,
            residues,
            modulus,
        } = *self
        else {
            return self.range().concretize(threshold);
        };
        let w = self.width();
        let pieces = pieces_bounds(&residue_pieces(&residues, modulus));
        let m = modulus.value();
        let mut members = Vec::new();
        for part in range.split_south() {
            let (lo, hi) = part.endpoints();
            let hi = hi.value();
            let mut next = first_member(lo.value(), hi, &pieces, m);
            while let Some(x) = next {
                if members.len() == threshold {
                    return None;
                }
                members.push(Word::new(x, w));
                next = if x == hi { None } else { first_member(x + 1, hi, &pieces, m) };
            }
        }
        Some(members)
    }
}

impl From<Interval> for CcInterval {
    fn from(range: Interval) -> Self {
        Self::from_interval(range)
    }
}

impl fmt::Display for CcInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Top(w) => write!(f, "TOP_{}", w),
            Self::Bot(w) => write!(f, "BOT_{}", w),
            Self::Zero(range) => write!(f, "{}", range),
            Self::Mod {
                range,
                residues,
                modulus,
            } => write!(f, "{} (mod {:#x}: {})", range, modulus, residues),
        }
    }
}
