//! Soundness tests for the wrapped interval domain.
//!
//! Every abstract operator is compared against the concrete operator applied to
//! all members of its operands: exhaustively at small widths, by sampling at 8 bits.

use num_bigint::BigUint;
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

fn members(iv: &Interval) -> Vec<Word> {
    iv.elements().collect()
}

/// A deterministic stream of pseudo-random numbers (xorshift64).
struct Rng(u64);

impl Rng {
    fn next(&mut self) -> u64 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 7;
        self.0 ^= self.0 << 17;
        self.0
    }

    fn word(&mut self, width: u32) -> Word {
        Word::new(self.next(), width)
    }

    fn interval(&mut self, width: u32) -> Interval {
        match self.next() % 16 {
            0 => Interval::top(width),
            1..=4 => Interval::number(self.word(width)),
            5..=10 => {
                let a = self.word(width);
                let len = self.next() % 24;
                Interval::new(a, a + Word::new(len, width))
            }
            _ => Interval::new(self.word(width), self.word(width)),
        }
    }

    fn sample(&mut self, iv: &Interval) -> Vec<Word> {
        match iv.bounds() {
            None if iv.is_bot() => vec![],
            _ if iv.size() <= 32 => members(iv),
            _ => {
                let (lo, hi) = match iv.bounds() {
                    Some(b) => b,
                    None => (Word::zero(iv.width()), Word::max_unsigned(iv.width())),
                };
                let mut result = vec![lo, hi];
                while result.len() < 32 {
                    let w = self.word(iv.width());
                    if iv.has(w) {
                        result.push(w);
                    }
                }
                result
            }
        }
    }
}

const BINARY: [&str; 18] = [
    "add", "sub", "mul", "udiv", "sdiv", "urem", "srem", "and", "or", "xor", "shl", "shr", "sar", "ult", "ule",
    "slt", "sle", "eq",
];

fn abstract_op(name: &str, a: &Interval, b: &Interval) -> Interval {
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
        "ule" => a.ule(b),
        "slt" => a.slt(b),
        "sle" => a.sle(b),
        "eq" => a.equal(b),
        _ => unreachable!("unknown operator {}", name),
    }
}

/// The concrete result, or `None` where the operator is undefined.
fn concrete_op(name: &str, x: Word, y: Word) -> Option<Word> {
    let amount = y.value().min(64) as u32;
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
        "ule" => flag(x.ule(y)),
        "slt" => flag(x.slt(y)),
        "sle" => flag(x.sle(y)),
        "eq" => flag(x == y),
        _ => unreachable!("unknown operator {}", name),
    };
    Some(result)
}

fn check_binary(a: &Interval, b: &Interval, xs: &[Word], ys: &[Word]) {
    for name in BINARY {
        let result = abstract_op(name, a, b);
        for &x in xs {
            for &y in ys {
                if let Some(z) = concrete_op(name, x, y) {
                    assert!(result.has(z), "{}: {} {} {} = {} misses {}", name, a, x, y, result, z);
                }
            }
        }
    }
}

// ─── Exhaustive small widths ───────────────────────────────────────────────────

#[test]
fn binary_operators_width_3() {
    let values = all_intervals(3);
    for a in &values {
        let xs = members(a);
        for b in &values {
            check_binary(a, b, &xs, &members(b));
        }
    }
}

#[test]
fn unary_operators_width_4() {
    for a in all_intervals(4) {
        let xs = members(&a);
        let neg = a.neg();
        let not = a.not();
        let sext = a.sign_extend(7);
        let zext = a.zero_extend(7);
        let trunc = a.truncate(2);
        for &x in &xs {
            assert!(neg.has(-x), "neg {} misses {}", a, -x);
            assert!(not.has(!x), "not {} misses {}", a, !x);
            assert!(sext.has(x.sign_extend(7)), "sext {}", a);
            assert!(zext.has(x.zero_extend(7)), "zext {}", a);
            assert!(trunc.has(x.truncate(2)), "trunc {}", a);
        }
        if xs.len() == 1 {
            assert_eq!(a.unique(), Some(xs[0]));
        }
        assert_eq!(a.cardinality(), BigUint::from(xs.len()));
        assert_eq!(a.size(), xs.len() as u128);
    }
}

#[test]
fn lattice_width_4() {
    let values = all_intervals(4);
    for a in &values {
        let xs = members(a);
        assert_eq!(a.invert().size() + a.size(), 16);
        for b in values.iter().step_by(3) {
            let ys = members(b);
            let join = a.join(b);
            assert!(a.le(&join) && b.le(&join), "{} join {} = {}", a, b, join);
            assert_eq!(join.size(), b.join(a).size(), "join of {} and {} is not symmetric", a, b);

            let meet = a.meet(b);
            for x in xs.iter().filter(|x| b.has(**x)) {
                assert!(meet.has(*x), "{} meet {} = {} misses {}", a, b, meet, x);
            }
            let inter: u128 = a.intersection(b).iter().map(|i| i.size()).sum();
            assert_eq!(inter as usize, xs.iter().filter(|x| b.has(**x)).count());

            let widened = a.widen(b);
            assert!(a.le(&widened) && b.le(&widened), "{} widen {} = {}", a, b, widened);

            let le = a.le(b);
            if le {
                assert!(xs.iter().all(|x| b.has(*x)), "{} <= {} but not a subset", a, b);
            }
            let (a2, b2) = a.assume_ule(b);
            for &x in &xs {
                for &y in &ys {
                    if x.ule(y) {
                        assert!(a2.has(x) && b2.has(y), "assume {} <=u {}", a, b);
                    }
                }
            }
        }
    }
}

#[test]
fn joins_is_an_upper_bound() {
    let values = all_intervals(4);
    for chunk in values.chunks(5) {
        let joined = Interval::joins(4, chunk.iter().copied());
        for v in chunk {
            assert!(v.le(&joined), "{} not below {}", v, joined);
        }
    }
}

#[test]
fn widening_chains_terminate() {
    let w = 8;
    let mut x = Interval::number(Word::zero(w));
    let mut steps = 0;
    loop {
        let next = x.join(&x.add(&Interval::number(Word::one(w))));
        let widened = x.widen(&next);
        if widened == x {
            break;
        }
        x = widened;
        steps += 1;
        assert!(steps <= 2 * w, "widening did not stabilize: {}", x);
    }
    assert!(x.is_top());
}

// ─── Sampling at 8 bits ────────────────────────────────────────────────────────

#[test]
fn binary_operators_width_8_sampled() {
    let mut rng = Rng(0x9e37_79b9_7f4a_7c15);
    for _ in 0..2000 {
        let a = rng.interval(8);
        let b = rng.interval(8);
        let xs = rng.sample(&a);
        let ys = rng.sample(&b);
        check_binary(&a, &b, &xs, &ys);
    }
}

#[test]
fn extensions_width_8_sampled() {
    let mut rng = Rng(0x2545_f491_4f6c_dd1d);
    for _ in 0..2000 {
        let a = rng.interval(8);
        let xs = rng.sample(&a);
        let sext = a.sign_extend(16);
        let zext = a.zero_extend(32);
        let trunc = a.truncate(5);
        let bits = a.sign_extend_bits(8, 15);
        for &x in &xs {
            assert!(sext.has(x.sign_extend(16)));
            assert!(zext.has(x.zero_extend(32)));
            assert!(trunc.has(x.truncate(5)));
            assert!(bits.has(x.sign_extend(16)));
        }
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
fn scenario_add() {
    assert_eq!(iv(10, 20).add(&iv(5, 5)), iv(15, 25));
    assert!(iv(0, 200).add(&iv(0, 200)).is_top());
}

#[test]
fn scenario_invert() {
    assert!(Interval::top(8).invert().is_bot());
    assert!(Interval::bot(8).invert().is_top());
    assert_eq!(iv(200, 50).invert(), iv(51, 199));
}

#[test]
fn scenario_north_pole() {
    let x = iv(200, 50);
    assert!(x.has(w8(255)));
    assert!(x.has(w8(0)));
    assert!(!x.has(w8(100)));
    assert_eq!(x.split_north(), vec![x]);
    assert_eq!(x.split_south(), vec![iv(200, 255), iv(0, 50)]);
}

#[test]
fn scenario_signed_reading() {
    let x = Interval::from_signed_range(-6, 5, 8);
    assert_eq!(x, iv(250, 5));
    assert_eq!(x.min_signed(), Some(Word::from_i64(-6, 8)));
    assert_eq!(x.max_unsigned(), Some(w8(255)));
    assert_eq!(x.slt(&iv(6, 6)), Interval::boolean(true));
    assert!(x.ult(&iv(6, 6)).is_top());
}
