//! Tests for the congruence-interval domain.
//!
//! Values are generated through the smart constructor from every range, every
//! remainder range and every modulus of a small width, so the generated set
//! covers every canonical form the constructor can produce.

use wrapint_rs::congruence::CcInterval;
use wrapint_rs::interval::Interval;
use wrapint_rs::word::Word;

fn all_intervals(width: u32) -> Vec<Interval> {
    let n = 1u64 << width;
    let mut result = vec![Interval::bot(width), Interval::top(width)];
    for a in 0..n {
        for b in 0..n {
            let iv = Interval::new(Word::new(a, width), Word::new(b, width));
            if !iv.is_top() {
                result.push(iv);
            }
        }
    }
    result
}

fn members(v: &CcInterval) -> Vec<Word> {
    match v.concretize(1 << v.width()) {
        Some(xs) => xs,
        None => panic!("{} has more members than its ring", v),
    }
}

fn all_values(width: u32) -> Vec<CcInterval> {
    let intervals = all_intervals(width);
    let mut result: Vec<CcInterval> = Vec::new();
    for range in &intervals {
        for residues in &intervals {
            for m in 0..(1u64 << width) {
                let v = CcInterval::new(*range, *residues, Word::new(m, width));
                if !result.contains(&v) {
                    result.push(v);
                }
            }
        }
    }
    result
}

const BINARY: [&str; 16] = [
    "add", "sub", "mul", "udiv", "sdiv", "urem", "srem", "and", "or", "xor", "shl", "shr", "sar", "ult", "sle", "eq",
];

fn abstract_op(name: &str, a: &CcInterval, b: &CcInterval) -> CcInterval {
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
        "ult" => a.ult(b),
        "sle" => a.sle(b),
        "eq" => a.equal(b),
        _ => unreachable!("unknown operator {}", name),
    }
}

fn plain_op(name: &str, a: &Interval, b: &Interval) -> Interval {
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
        "ult" => a.ult(b),
        "sle" => a.sle(b),
        "eq" => a.equal(b),
        _ => unreachable!("unknown operator {}", name),
    }
}

fn concrete_op(name: &str, x: Word, y: Word) -> Option<Word> {
    let amount = y.value() as u32;
    let flag = |b: bool| Word::new(b as u64, 1);
    let result = match name {
        "add" => x + y,
        "sub" => x - y,
        "mul" => x * y,
        "udiv" | "sdiv" | "urem" | "srem" if y.is_zero() => return None,
        "udiv" => x.udiv(y),
        "sdiv" => x.sdiv(y),
        "urem" => x.urem(y),
        "srem" => x.srem(y),
        "and" => x & y,
        "or" => x | y,
        "xor" => x ^ y,
        "shl" => x.shl(amount),
        "shr" => x.shr(amount),
        "sar" => x.sar(amount),
        "ult" => flag(x.ult(y)),
        "sle" => flag(x.sle(y)),
        "eq" => flag(x == y),
        _ => unreachable!("unknown operator {}", name),
    };
    Some(result)
}

// ─── Smart constructor ─────────────────────────────────────────────────────────

#[test]
fn constructor_is_exact() {
    let w = 3;
    let intervals = all_intervals(w);
    for range in &intervals {
        for residues in &intervals {
            for m in 0..8 {
                let modulus = Word::new(m, w);
                let v = CcInterval::new(*range, *residues, modulus);
                let expected: Vec<Word> = range
                    .elements()
                    .filter(|x| !residues.is_bot() && (m == 0 || residues.has(x.urem(modulus))))
                    .collect();
                let mut actual = members(&v);
                actual.sort();
                let mut expected = expected;
                expected.sort();
                assert_eq!(actual, expected, "new({}, {}, {}) = {}", range, residues, modulus, v);
                assert!(v.range().le(range), "new({}, {}, {}) = {} grew", range, residues, modulus, v);
            }
        }
    }
}

#[test]
fn constructor_is_idempotent() {
    for v in all_values(3) {
        if let CcInterval::Mod {
            range,
            residues,
            modulus,
        } = v
        {
            assert_eq!(CcInterval::new(range, residues, modulus), v);
            assert_eq!(v.modulus(), Some(modulus));
        }
    }
}

#[test]
fn constructor_width_4_moduli() {
    let w = 4;
    let intervals = all_intervals(w);
    for range in intervals.iter().step_by(7) {
        for residues in intervals.iter().step_by(5) {
            for m in [2, 3, 4, 6, 8, 12] {
                let modulus = Word::new(m, w);
                let v = CcInterval::new(*range, *residues, modulus);
                for x in range.elements() {
                    assert_eq!(
                        v.has(x),
                        residues.has(x.urem(modulus)),
                        "new({}, {}, {}) = {} at {}",
                        range,
                        residues,
                        modulus,
                        v,
                        x
                    );
                }
            }
        }
    }
}

// ─── Soundness ─────────────────────────────────────────────────────────────────

#[test]
fn binary_operators_width_3() {
    let values = all_values(3);
    for (i, a) in values.iter().enumerate() {
        let xs = members(a);
        for b in values.iter().skip(i % 4).step_by(4) {
            let ys = members(b);
            for name in BINARY {
                let result = abstract_op(name, a, b);
                for &x in &xs {
                    for &y in &ys {
                        if let Some(z) = concrete_op(name, x, y) {
                            assert!(result.has(z), "{}: {} {} {} = {} misses {}", name, a, x, y, result, z);
                        }
                    }
                }
            }
        }
    }
}

#[test]
fn lattice_width_3() {
    let values = all_values(3);
    for (i, a) in values.iter().enumerate() {
        let xs = members(a);
        assert!(CcInterval::bot(3).le(a) && a.le(&CcInterval::top(3)));
        for b in values.iter().skip(i % 3).step_by(3) {
            let join = a.join(b);
            assert!(a.le(&join) && b.le(&join), "{} join {} = {}", a, b, join);
            let (mut ab, mut ba) = (members(&join), members(&b.join(a)));
            ab.sort();
            ba.sort();
            assert_eq!(ab, ba, "join of {} and {} is not symmetric", a, b);

            let meet = a.meet(b);
            for x in xs.iter().filter(|x| b.has(**x)) {
                assert!(meet.has(*x), "{} meet {} = {} misses {}", a, b, meet, x);
            }

            let widened = a.widen(b);
            assert!(a.le(&widened) && b.le(&widened), "{} widen {} = {}", a, b, widened);

            if a.le(b) {
                assert!(xs.iter().all(|x| b.has(*x)), "{} <= {} but not a subset", a, b);
            }
        }
    }
}

#[test]
fn unary_operators_width_3() {
    for a in all_values(3) {
        let neg = a.neg();
        let not = a.not();
        let sext = a.sign_extend(6);
        let zext = a.zero_extend(6);
        let trunc = a.truncate(2);
        for x in members(&a) {
            assert!(neg.has(-x), "neg {}", a);
            assert!(not.has(!x), "not {}", a);
            assert!(sext.has(x.sign_extend(6)), "sext {} = {} misses {}", a, sext, x.sign_extend(6));
            assert!(zext.has(x.zero_extend(6)), "zext {} = {}", a, zext);
            assert!(trunc.has(x.truncate(2)), "trunc {} = {}", a, trunc);
            assert!(a.range().has(x));
        }
    }
}

#[test]
fn results_refine_plain_intervals() {
    let values = all_values(3);
    for (i, a) in values.iter().enumerate() {
        for b in values.iter().skip(i % 7).step_by(7) {
            for name in BINARY {
                let refined = abstract_op(name, a, b);
                let plain = plain_op(name, &a.range(), &b.range());
                assert!(
                    refined.range().le(&plain),
                    "{}: {} {} = {}, plain intervals give {}",
                    name,
                    a,
                    b,
                    refined,
                    plain
                );
            }
        }
    }
}

// ─── Random 8-bit values ───────────────────────────────────────────────────────

/// A deterministic stream of pseudo-random numbers (xorshift64).
struct Rng(u64);

impl Rng {
    fn next(&mut self) -> u64 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 7;
        self.0 ^= self.0 << 17;
        self.0
    }

    fn interval(&mut self) -> Interval {
        let a = w8(self.next());
        match self.next() % 4 {
            0 => Interval::number(a),
            1 => Interval::new(a, a + w8(self.next() % 64)),
            _ => Interval::new(a, w8(self.next())),
        }
    }

    fn value(&mut self) -> CcInterval {
        let m = match self.next() % 4 {
            0 => return CcInterval::from_interval(self.interval()),
            1 => 2 + self.next() % 8,
            _ => 2 + self.next() % 254,
        };
        let residues = Interval::new(w8(self.next() % m), w8(self.next() % m));
        CcInterval::new(self.interval(), residues, w8(m))
    }
}

#[test]
fn join_is_an_upper_bound() {
    let mut rng = Rng(0xdead_beef_1234_5678);
    for _ in 0..3000 {
        let (a, b) = (rng.value(), rng.value());
        let j = a.join(&b);
        assert!(a.le(&j) && b.le(&j), "{} join {} = {}", a, b, j);
        assert!(members(&a).iter().chain(&members(&b)).all(|x| j.has(*x)));

        let widened = a.widen(&b);
        assert!(a.le(&widened) && b.le(&widened), "{} widen {} = {}", a, b, widened);
    }
}

#[test]
fn le_is_sound() {
    let mut rng = Rng(0x0123_4567_89ab_cdef);
    for _ in 0..3000 {
        let (a, b) = (rng.value(), rng.value());
        if a.le(&b) {
            assert!(members(&a).iter().all(|x| b.has(*x)), "{} <= {} but not a subset", a, b);
        }
        let m = a.meet(&b);
        assert!(m.le(&a) || m.le(&b), "{} meet {} = {}", a, b, m);
    }
}

// ─── Concrete scenarios ────────────────────────────────────────────────────────

fn w8(x: u64) -> Word {
    Word::new(x, 8)
}

fn iv(a: u64, b: u64) -> Interval {
    Interval::new(w8(a), w8(b))
}

#[test]
fn scenario_join_of_points() {
    let v = CcInterval::number(w8(4)).join(&CcInterval::number(w8(10)));
    assert_eq!(
        v,
        CcInterval::Mod {
            range: iv(4, 10),
            residues: Interval::number(w8(4)),
            modulus: w8(6),
        }
    );
    assert_eq!(v.concretize(10), Some(vec![w8(4), w8(10)]));
}

#[test]
fn scenario_mask_of_congruence() {
    let v = CcInterval::new(iv(1, 253), Interval::number(w8(1)), w8(4));
    assert!(v.modulus().is_some());
    assert_eq!(v.and(&CcInterval::number(w8(3))), CcInterval::number(w8(1)));
}

#[test]
fn scenario_stride_survives_addition() {
    let evens = CcInterval::new(iv(0, 100), Interval::number(w8(0)), w8(2));
    let shifted = evens.add(&CcInterval::number(w8(2)));
    assert!(shifted.has(w8(102)));
    assert!(!shifted.has(w8(51)));
    assert_eq!(shifted.modulus(), Some(w8(2)));

    let products = evens.mul(&CcInterval::number(w8(3)));
    assert!(products.has(w8(6)));
    assert!(!products.has(w8(7)));
}
