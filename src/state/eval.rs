use std::cell::RefCell;

use log::{debug, warn};

use super::ValuationState;
use crate::cache::{OpCache, OpKey};
use crate::config::Options;
use crate::domain::ValueDomain;
use crate::error::{AnalysisError, Result};
use crate::expr::{Expr, Op};
use crate::interval::Interval;
use crate::memory::MemoryRegion;
use crate::word::{low_bits, Word};

/// Evaluates expressions and applies memory writes against valuation states.
pub struct Evaluator<'a, D> {
    pub(super) options: &'a Options,
    cache: Option<&'a RefCell<OpCache<OpKey<D>, D>>>,
}

impl<'a, D: ValueDomain> Evaluator<'a, D> {
    pub fn new(options: &'a Options) -> Self {
        Self { options, cache: None }
    }

    /// Memoise operator applications in `cache`.
    pub fn with_cache(mut self, cache: &'a RefCell<OpCache<OpKey<D>, D>>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn options(&self) -> &Options {
        self.options
    }

    fn cached(&self, key: OpKey<D>, f: impl FnOnce() -> D) -> D {
        match self.cache {
            Some(cache) if cache.borrow().is_enabled() => {
                if let Some(v) = cache.borrow().get(&key) {
                    return v;
                }
                let v = f();
                cache.borrow_mut().insert(key, v);
                v
            }
            _ => f(),
        }
    }

    fn unary(&self, op: Op, x: D, f: impl FnOnce(&D) -> D) -> D {
        self.cached(OpKey::Unary(op, x), || f(&x))
    }

    fn binary(&self, op: Op, x: D, y: D, f: impl FnOnce(&D, &D) -> D) -> D {
        self.cached(OpKey::Binary(op, x, y), || f(&x, &y))
    }

    /// Evaluate `expr` in `state`.
    pub fn eval(&self, state: &ValuationState<D>, expr: &Expr) -> Result<D> {
        let result = match expr {
            Expr::Var(v) => state.var(v),
            Expr::Num(n) => D::number(*n),
            Expr::Mem { address, width } => self.read(state, address, *width)?,
            Expr::BitRange { operand, first, last } => {
                let value = self.eval(state, operand)?;
                let w = value.width();
                let mask = D::number(Word::new(low_bits(last + 1) & !low_bits(*first), w));
                let amount = D::number(Word::new(*first as u64, w));
                value.and(&mask).shr(&amount).truncate(last - first + 1)
            }
            Expr::Cond { cond, then, otherwise } => {
                let c = self.eval(state, cond)?;
                assert_eq!(c.width(), 1, "Condition {} is not a boolean", cond);
                match c.unique() {
                    Some(b) if b.is_zero() => self.eval(state, otherwise)?,
                    Some(_) => self.eval(state, then)?,
                    None => self.eval(state, then)?.join(&self.eval(state, otherwise)?),
                }
            }
            Expr::Nondet(w) => D::top(*w),
            Expr::Special(w) => {
                if self.options.fail_fast {
                    return Err(AnalysisError::SpecialExpression(expr.to_string()));
                }
                warn!("Evaluating special expression {} to TOP", expr);
                D::top(*w)
            }
            Expr::Op { op, args, width } => self.eval_op(state, expr, *op, args, *width)?,
        };
        debug!("eval {} = {}", expr, result);
        Ok(result)
    }

    fn eval_op(&self, state: &ValuationState<D>, expr: &Expr, op: Op, args: &[Expr], width: u32) -> Result<D> {
        let mut values = Vec::with_capacity(args.len());
        for (i, arg) in args.iter().enumerate() {
            let mut v = self.eval(state, arg)?;
            let is_amount = i == 1 && matches!(op, Op::Shl | Op::Shr | Op::Sar | Op::Rol | Op::Ror);
            if op.casts_operands() && !is_amount && v.width() != width {
                warn!("Casting {} to {} bits in {}", v, width, expr);
                v = v.cast(width);
            }
            values.push(v);
        }
        let arity = |n: usize| assert_eq!(values.len(), n, "{:?} expects {} operands in {}", op, n, expr);

        let result = match op {
            Op::Unknown => {
                if self.options.fail_fast {
                    return Err(AnalysisError::UnsupportedOperator {
                        op,
                        expr: expr.to_string(),
                    });
                }
                warn!("Evaluating unknown operator in {} to TOP", expr);
                D::top(width)
            }
            Op::Cast => {
                arity(2);
                match constant(&values[1]) {
                    Some(n) => values[0].cast(n),
                    None => return self.non_constant_width(expr, width),
                }
            }
            Op::SignExtend | Op::ZeroFill => {
                arity(3);
                match (constant(&values[0]), constant(&values[1])) {
                    (Some(first), Some(last)) => {
                        let value = &values[2];
                        if first < value.width() {
                            if self.options.fail_fast {
                                return Err(AnalysisError::StrangeExtension {
                                    first,
                                    last,
                                    width: value.width(),
                                });
                            }
                            debug!("Bit-range extension {}..={} inside the operand of {}", first, last, expr);
                        }
                        if op == Op::SignExtend {
                            value.sign_extend_bits(first, last)
                        } else {
                            value.zero_extend_bits(first, last)
                        }
                    }
                    _ => return self.non_constant_width(expr, width),
                }
            }
            Op::Equal | Op::Less | Op::LessOrEqual | Op::UnsignedLess | Op::UnsignedLessOrEqual => {
                arity(2);
                let (x, y) = (values[0], values[1]);
                self.binary(op, x, y, |x, y| match op {
                    Op::Equal => x.equal(y),
                    Op::Less => x.slt(y),
                    Op::LessOrEqual => x.sle(y),
                    Op::UnsignedLess => x.ult(y),
                    _ => x.ule(y),
                })
            }
            Op::Not => {
                arity(1);
                self.unary(op, values[0], |x| x.not())
            }
            Op::Neg => {
                arity(1);
                self.unary(op, values[0], |x| x.neg())
            }
            Op::And | Op::Or | Op::Xor | Op::Plus | Op::Mul => {
                assert!(values.len() >= 2, "{:?} expects at least two operands in {}", op, expr);
                let mut acc = values[0];
                for &y in &values[1..] {
                    acc = self.binary(op, acc, y, |x, y| match op {
                        Op::And => x.and(y),
                        Op::Or => x.or(y),
                        Op::Xor => x.xor(y),
                        Op::Plus => x.add(y),
                        _ => x.mul(y),
                    });
                }
                acc
            }
            Op::UDiv | Op::SDiv | Op::UMod | Op::SMod => {
                arity(2);
                self.binary(op, values[0], values[1], |x, y| match op {
                    Op::UDiv => x.udiv(y),
                    Op::SDiv => x.sdiv(y),
                    Op::UMod => x.urem(y),
                    _ => x.srem(y),
                })
            }
            Op::Shl | Op::Shr | Op::Sar => {
                arity(2);
                let amount = shift_amount(&values[1], width);
                self.binary(op, values[0], amount, |x, k| match op {
                    Op::Shl => x.shl(k),
                    Op::Shr => x.shr(k),
                    _ => x.sar(k),
                })
            }
            Op::Rol | Op::Ror => {
                arity(2);
                let x = values[0];
                let w = D::number(Word::new(width as u64, width));
                let k = shift_amount(&values[1], width).urem(&w);
                let back = w.sub(&k);
                if op == Op::Rol {
                    x.shl(&k).or(&x.shr(&back))
                } else {
                    x.shr(&k).or(&x.shl(&back))
                }
            }
        };
        Ok(result)
    }

    fn non_constant_width(&self, expr: &Expr, width: u32) -> Result<D> {
        if self.options.fail_fast {
            return Err(AnalysisError::NonConstantWidth(expr.to_string()));
        }
        warn!("Width argument of {} is not a constant", expr);
        Ok(D::top(width))
    }

    /// The region `expr` points into: the join of the regions of its variables.
    pub fn region_of(&self, state: &ValuationState<D>, expr: &Expr) -> MemoryRegion {
        let mut region: Option<MemoryRegion> = None;
        for var in expr.used_vars() {
            let r = state.region(var);
            region = Some(match region {
                None => r,
                Some(acc) => acc.join(&r),
            });
        }
        let result = region.unwrap_or(MemoryRegion::Global);
        debug!("region of {} is {}", expr, result);
        result
    }

    fn read(&self, state: &ValuationState<D>, address: &Expr, width: u32) -> Result<D> {
        let addr = self.eval(state, address)?;
        let region = self.region_of(state, address);
        Ok(self.read_at(state, &addr, &region, width))
    }

    /// The join of the `width`-bit cells at all offsets `address` may hold.
    pub fn read_at(&self, state: &ValuationState<D>, address: &D, region: &MemoryRegion, width: u32) -> D {
        if region.is_top() || address.is_top() {
            return D::top(width);
        }
        if address.is_bot() {
            return D::bot(width);
        }
        match address.concretize(self.options.max_memory_cells) {
            Some(offsets) => D::joins(
                width,
                offsets
                    .into_iter()
                    .map(|offset| state.store().get(region, offset.value(), width)),
            ),
            None => D::top(width),
        }
    }

    /// Write `value` to the cell `address` denotes.
    pub fn write(&self, state: &mut ValuationState<D>, address: &Expr, value: D) -> Result<()> {
        let addr = self.eval(state, address)?;
        let region = self.region_of(state, address);
        debug!("writing {} to {} in region {}", value, addr, region);
        if region.is_top() {
            state.store_mut().set_top();
            Ok(())
        } else {
            self.write_at(state, &addr, &region, value)
        }
    }

    /// Write `value` at the offsets `address` may hold: a strong update for a single
    /// offset, weak updates for a few.
    pub fn write_at(&self, state: &mut ValuationState<D>, address: &D, region: &MemoryRegion, value: D) -> Result<()> {
        if let Some(offset) = address.unique() {
            state.store_mut().set(region, offset.value(), value);
        } else if address.is_top() {
            if self.options.fail_fast && !state.store().is_top() {
                return Err(AnalysisError::WildStore(format!("{} := {}", address, value)));
            }
            warn!("Writing {} to an unknown address, all memory may hold it", value);
            state.store_mut().smear(value);
        } else {
            match address.concretize(self.options.max_memory_cells) {
                Some(offsets) => {
                    for offset in offsets {
                        state.store_mut().weak_update(region, offset.value(), value);
                    }
                }
                None => {
                    debug!("too many targets {} for a weak update, forgetting {}", address, region);
                    state.store_mut().set_top_region(region);
                }
            }
        }
        Ok(())
    }

    /// All tuples of concrete values the expressions may take together, or `None`
    /// if there are more than the concretisation threshold.
    pub fn projection(&self, state: &ValuationState<D>, exprs: &[Expr]) -> Result<Option<Vec<Vec<Word>>>> {
        let threshold = self.options.concretization_threshold;
        let mut tuples: Vec<Vec<Word>> = vec![Vec::new()];
        for expr in exprs {
            let Some(values) = self.eval(state, expr)?.concretize(threshold) else {
                return Ok(None);
            };
            if tuples.len() * values.len() > threshold {
                return Ok(None);
            }
            tuples = tuples
                .iter()
                .flat_map(|t| {
                    values.iter().map(move |&v| {
                        let mut t = t.clone();
                        t.push(v);
                        t
                    })
                })
                .collect();
        }
        Ok(Some(tuples))
    }
}

/// The value of a constant argument such as a width or a bit index.
fn constant<D: ValueDomain>(value: &D) -> Option<u32> {
    value.unique().and_then(|w| u32::try_from(w.value()).ok())
}

/// A shift amount of any width, brought to `width` bits.
///
/// Amounts of `width` or more all shift everything out, so they collapse to `width`.
fn shift_amount<D: ValueDomain>(amount: &D, width: u32) -> D {
    let w = amount.width();
    if w <= width {
        return amount.zero_extend(width);
    }
    let iv = amount.to_interval();
    let limit = Word::new(width as u64, w);
    let small = iv.meet(&Interval::new(Word::zero(w), limit.dec()));
    let large = iv.meet(&Interval::new(limit, Word::max_unsigned(w)));
    let mut result = Interval::bot(width);
    if !small.is_bot() {
        result = result.join(&small.truncate(width));
    }
    if !large.is_bot() {
        result = result.join(&Interval::number(Word::new(width as u64, width)));
    }
    D::from_interval(result)
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::congruence::CcInterval;
    use crate::expr::Var;

    fn w8(x: u64) -> Word {
        Word::new(x, 8)
    }

    fn range(a: u64, b: u64) -> Interval {
        Interval::new(w8(a), w8(b))
    }

    fn state_with(var: &Var, value: Interval) -> ValuationState<Interval> {
        let mut s = ValuationState::new();
        s.set_var(var, value, MemoryRegion::Global);
        s
    }

    #[test]
    fn test_eval_arithmetic() {
        let options = Options::default();
        let ev = Evaluator::new(&options);
        let x = Var::new("x", 8);
        let s = state_with(&x, range(10, 20));

        let e = Expr::var(&x).add(Expr::num(5, 8));
        assert_eq!(ev.eval(&s, &e).unwrap(), range(15, 25));

        let e = Expr::var(&x).sub(Expr::num(10, 8));
        assert_eq!(ev.eval(&s, &e).unwrap(), range(0, 10));

        let e = Expr::var(&x).ult(Expr::num(21, 8));
        assert_eq!(ev.eval(&s, &e).unwrap(), Interval::boolean(true));

        let e = Expr::var(&x).eq(Expr::num(15, 8));
        assert!(ev.eval(&s, &e).unwrap().is_top());
    }

    #[test]
    fn test_eval_nary_fold() {
        let options = Options::default();
        let ev = Evaluator::<Interval>::new(&options);
        let s = ValuationState::new();
        let e = Expr::op(Op::And, vec![Expr::num(0xf0, 8), Expr::num(0x3c, 8), Expr::num(0xff, 8)], 8);
        assert_eq!(ev.eval(&s, &e).unwrap(), Interval::number(w8(0x30)));
        let e = Expr::op(Op::Plus, vec![Expr::num(1, 8), Expr::num(2, 8), Expr::num(3, 8)], 8);
        assert_eq!(ev.eval(&s, &e).unwrap(), Interval::number(w8(6)));
    }

    #[test]
    fn test_eval_bit_range_and_cond() {
        let options = Options::default();
        let ev = Evaluator::<Interval>::new(&options);
        let s = ValuationState::new();
        let e = Expr::num(0b1011_0110, 8).bit_range(2, 5);
        assert_eq!(ev.eval(&s, &e).unwrap(), Interval::number(Word::new(0b1101, 4)));

        let e = Expr::cond(Expr::num(1, 1), Expr::num(7, 8), Expr::num(9, 8));
        assert_eq!(ev.eval(&s, &e).unwrap(), Interval::number(w8(7)));
        let e = Expr::cond(Expr::Nondet(1), Expr::num(7, 8), Expr::num(9, 8));
        assert_eq!(ev.eval(&s, &e).unwrap(), range(7, 9));
    }

    #[test]
    fn test_eval_rotate() {
        let options = Options::default();
        let ev = Evaluator::<Interval>::new(&options);
        let s = ValuationState::new();
        let e = Expr::num(0x81, 8).rol(Expr::num(1, 8));
        assert_eq!(ev.eval(&s, &e).unwrap(), Interval::number(w8(0x03)));
        let e = Expr::num(0x81, 8).ror(Expr::num(4, 8));
        assert_eq!(ev.eval(&s, &e).unwrap(), Interval::number(w8(0x18)));
        let e = Expr::num(0x81, 8).rol(Expr::num(8, 8));
        assert_eq!(ev.eval(&s, &e).unwrap(), Interval::number(w8(0x81)));
    }

    #[test]
    fn test_eval_wide_shift_amount() {
        let options = Options::default();
        let ev = Evaluator::<Interval>::new(&options);
        let s = ValuationState::new();
        let e = Expr::num(1, 8).shl(Expr::num(256 + 1, 16));
        assert_eq!(ev.eval(&s, &e).unwrap(), Interval::number(w8(0)));
        let e = Expr::num(1, 8).shl(Expr::num(3, 16));
        assert_eq!(ev.eval(&s, &e).unwrap(), Interval::number(w8(8)));
    }

    #[test]
    fn test_eval_extensions() {
        let options = Options::default();
        let ev = Evaluator::<Interval>::new(&options);
        let s = ValuationState::new();
        let e = Expr::num(0x80, 8).sign_extend(8, 15);
        assert_eq!(ev.eval(&s, &e).unwrap(), Interval::number(Word::new(0xff80, 16)));
        let e = Expr::num(0x1234, 16).cast(8);
        assert_eq!(ev.eval(&s, &e).unwrap(), Interval::number(w8(0x34)));

        let strict = Options::default().with_fail_fast(true);
        let ev = Evaluator::<Interval>::new(&strict);
        let e = Expr::num(0x80, 8).sign_extend(4, 15);
        assert!(matches!(ev.eval(&s, &e), Err(AnalysisError::StrangeExtension { .. })));
    }

    #[test]
    fn test_eval_unsupported() {
        let options = Options::default();
        let ev = Evaluator::<Interval>::new(&options);
        let s = ValuationState::new();
        let e = Expr::op(Op::Unknown, vec![Expr::num(1, 8)], 8);
        assert!(ev.eval(&s, &e).unwrap().is_top());
        assert!(ev.eval(&s, &Expr::Special(8)).unwrap().is_top());

        let strict = Options::default().with_fail_fast(true);
        let ev = Evaluator::<Interval>::new(&strict);
        assert!(matches!(ev.eval(&s, &e), Err(AnalysisError::UnsupportedOperator { .. })));
        assert!(matches!(ev.eval(&s, &Expr::Special(8)), Err(AnalysisError::SpecialExpression(_))));
    }

    #[test]
    fn test_memory_roundtrip() {
        let options = Options::default();
        let ev = Evaluator::<Interval>::new(&options);
        let p = Var::new("p", 32);
        let mut s = ValuationState::new();
        s.set_var(&p, Interval::number(Word::new(16, 32)), MemoryRegion::Stack);

        let address = Expr::var(&p).add(Expr::num(4, 32));
        ev.write(&mut s, &address, range(1, 2)).unwrap();
        assert_eq!(ev.eval(&s, &Expr::mem(address.clone(), 8)).unwrap(), range(1, 2));
        assert_eq!(s.store().get(&MemoryRegion::Stack, 20, 8), range(1, 2));

        // Two possible targets: weak updates.
        s.set_var(&p, Interval::new(Word::new(20, 32), Word::new(21, 32)), MemoryRegion::Stack);
        ev.write(&mut s, &Expr::var(&p), range(5, 5)).unwrap();
        assert_eq!(s.store().get(&MemoryRegion::Stack, 20, 8), range(1, 5));
        assert!(s.store().get(&MemoryRegion::Stack, 21, 8).is_top());
        assert!(ev.eval(&s, &Expr::mem(Expr::var(&p), 8)).unwrap().is_top());
    }

    #[test]
    fn test_write_to_unknown_region() {
        let options = Options::default();
        let ev = Evaluator::<Interval>::new(&options);
        let p = Var::new("p", 32);
        let mut s = ValuationState::new();
        s.store_mut().set(&MemoryRegion::Global, 0, range(1, 1));
        ev.write(&mut s, &Expr::var(&p), range(3, 3)).unwrap();
        assert!(s.store().is_top());
    }

    #[test]
    fn test_projection() {
        let options = Options::default().with_concretization_threshold(6);
        let ev = Evaluator::<CcInterval>::new(&options);
        let x = Var::new("x", 8);
        let y = Var::new("y", 8);
        let mut s = ValuationState::new();
        s.set_var(&x, CcInterval::number(w8(0)).join(&CcInterval::number(w8(4))), MemoryRegion::Global);
        s.set_var(&y, CcInterval::from_interval(range(1, 3)), MemoryRegion::Global);

        let tuples = ev.projection(&s, &[Expr::var(&x), Expr::var(&y)]).unwrap().unwrap();
        assert_eq!(tuples.len(), 6);
        assert!(tuples.contains(&vec![w8(4), w8(2)]));

        let z = Var::new("z", 8);
        assert!(ev.projection(&s, &[Expr::var(&x), Expr::var(&z)]).unwrap().is_none());
    }

    #[test]
    fn test_cache_is_used() {
        let options = Options::default();
        let cache = RefCell::new(OpCache::new(64));
        let ev = Evaluator::<Interval>::new(&options).with_cache(&cache);
        let x = Var::new("x", 8);
        let s = state_with(&x, range(10, 20));
        let e = Expr::var(&x).mul(Expr::num(3, 8));
        let first = ev.eval(&s, &e).unwrap();
        let second = ev.eval(&s, &e).unwrap();
        assert_eq!(first, second);
        assert_eq!(cache.borrow().hits(), 1);
    }
}
