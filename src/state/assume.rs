//! Refining states under assumptions.
//!
//! `assume(state, e, holds)` returns the part of `state` in which the 1-bit
//! expression `e` evaluates to `holds`, or `None` if there is no such part.
//! Comparisons narrow their operands with `assume_ule`/`assume_sle` and push the
//! narrowed values back into variables through negation, complement and sums.

use log::{debug, warn};

use super::{Evaluator, ValuationState};
use crate::domain::ValueDomain;
use crate::error::{AnalysisError, Result};
use crate::expr::{Expr, Op};

type Refined<D> = Result<Option<ValuationState<D>>>;

impl<'a, D: ValueDomain> Evaluator<'a, D> {
    fn infeasible(&self, what: &dyn std::fmt::Display) -> Refined<D> {
        if self.options.fail_fast {
            return Err(AnalysisError::Unsatisfiable(what.to_string()));
        }
        debug!("{} cannot hold, state is unreachable", what);
        Ok(None)
    }

    fn unsupported(&self, state: ValuationState<D>, expr: &Expr) -> Refined<D> {
        if self.options.fail_fast {
            return Err(AnalysisError::UnsupportedAssumption(expr.to_string()));
        }
        warn!("Ignoring assumption {}", expr);
        Ok(Some(state))
    }

    /// Restrict `state` to the valuations where `expr` is `holds`.
    pub fn assume(&self, state: ValuationState<D>, expr: &Expr, holds: bool) -> Refined<D> {
        let value = self.eval(&state, expr)?;
        debug!("assuming {} is {} (currently {})", expr, holds, value);
        if value.is_bot() {
            return self.infeasible(expr);
        }
        if let Some(b) = value.unique() {
            return if b.is_zero() != holds {
                Ok(Some(state))
            } else {
                self.infeasible(expr)
            };
        }

        match expr {
            Expr::Op { op, args, .. } => self.assume_op(state, expr, *op, args, holds),
            Expr::Cond { cond, then, otherwise } => {
                let c = (**cond).clone();
                let rewritten = c
                    .clone()
                    .and((**then).clone())
                    .or(c.not().and((**otherwise).clone()));
                self.assume(state, &rewritten, holds)
            }
            Expr::Var(v) => {
                let mut state = state;
                let region = state.region(v);
                state.set_var(v, D::boolean(holds), region);
                Ok(Some(state))
            }
            Expr::Mem { address, .. } => {
                let mut state = state;
                self.write(&mut state, address, D::boolean(holds))?;
                Ok(Some(state))
            }
            Expr::Nondet(_) | Expr::Num(_) => Ok(Some(state)),
            Expr::Special(_) => {
                if self.options.fail_fast {
                    return Err(AnalysisError::SpecialExpression(expr.to_string()));
                }
                Ok(Some(state))
            }
            Expr::BitRange { .. } => self.unsupported(state, expr),
        }
    }

    fn assume_op(&self, state: ValuationState<D>, expr: &Expr, op: Op, args: &[Expr], holds: bool) -> Refined<D> {
        match (op, holds) {
            (Op::Unknown, _) => self.unsupported(state, expr),
            (Op::Not, _) => self.assume(state, &args[0], !holds),

            // Every conjunct holds (every disjunct fails): refine in sequence.
            (Op::And, true) | (Op::Or, false) => {
                let mut state = state;
                for arg in args {
                    match self.assume(state, arg, holds)? {
                        Some(s) => state = s,
                        None => return Ok(None),
                    }
                }
                Ok(Some(state))
            }
            // Some conjunct fails (some disjunct holds): join the alternatives.
            (Op::And, false) | (Op::Or, true) => {
                let mut result: Option<ValuationState<D>> = None;
                for arg in args {
                    if let Some(s) = self.assume(state.clone(), arg, holds)? {
                        result = Some(match result {
                            None => s,
                            Some(r) => r.join(&s),
                        });
                    }
                }
                Ok(result)
            }

            (Op::Equal, true) => {
                let x = self.eval(&state, &args[0])?;
                let y = self.eval(&state, &args[1])?;
                let Some(state) = self.assume_eq(state, &args[0], y)? else {
                    return Ok(None);
                };
                self.assume_eq(state, &args[1], x)
            }
            (Op::Equal, false) => {
                let x = self.eval(&state, &args[0])?;
                let y = self.eval(&state, &args[1])?;
                let Some(state) = self.assume_neq(state, &args[0], y)? else {
                    return Ok(None);
                };
                self.assume_neq(state, &args[1], x)
            }

            // x < y  <=>  x <= y && x != y
            (Op::Less, true) | (Op::UnsignedLess, true) => {
                let le = if op == Op::Less {
                    Op::LessOrEqual
                } else {
                    Op::UnsignedLessOrEqual
                };
                let (x, y) = (args[0].clone(), args[1].clone());
                let strict = Expr::op(le, vec![x.clone(), y.clone()], 1).and(x.ne(y));
                self.assume(state, &strict, true)
            }
            (Op::LessOrEqual, true) | (Op::UnsignedLessOrEqual, true) => {
                let x = self.eval(&state, &args[0])?;
                let y = self.eval(&state, &args[1])?;
                let (x, y) = if op == Op::LessOrEqual {
                    x.assume_sle(&y)
                } else {
                    x.assume_ule(&y)
                };
                if x.is_bot() || y.is_bot() {
                    return self.infeasible(expr);
                }
                let Some(state) = self.assume_eq(state, &args[0], x)? else {
                    return Ok(None);
                };
                self.assume_eq(state, &args[1], y)
            }
            // !(x < y)  <=>  y <= x, and vice versa
            (Op::Less | Op::LessOrEqual | Op::UnsignedLess | Op::UnsignedLessOrEqual, false) => {
                let swapped = match op {
                    Op::Less => Op::LessOrEqual,
                    Op::LessOrEqual => Op::Less,
                    Op::UnsignedLess => Op::UnsignedLessOrEqual,
                    _ => Op::UnsignedLess,
                };
                let flipped = Expr::op(swapped, vec![args[1].clone(), args[0].clone()], 1);
                self.assume(state, &flipped, true)
            }

            _ => {
                warn!("Ignoring assumption {} with operator {:?}", expr, op);
                Ok(Some(state))
            }
        }
    }

    /// Restrict `state` so that `expr` evaluates into `value`.
    fn assume_eq(&self, state: ValuationState<D>, expr: &Expr, value: D) -> Refined<D> {
        if expr.width() != value.width() {
            debug!("Ignoring {} == {} of a different width", expr, value);
            return Ok(Some(state));
        }
        match expr {
            Expr::Var(v) => {
                let old = state.var(v);
                let new = old.meet(&value);
                if new.is_bot() {
                    return self.infeasible(&format_args!("{} == {}", v, value));
                }
                let mut state = state;
                let region = state.region(v);
                state.set_var(v, new, region);
                Ok(Some(state))
            }
            Expr::Op { op: Op::Neg, args, .. } => self.assume_eq(state, &args[0], value.neg()),
            Expr::Op { op: Op::Not, args, .. } => self.assume_eq(state, &args[0], value.not()),
            Expr::Op { op: Op::Plus, args, .. } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(&state, arg)?);
                }
                let mut state = state;
                for (i, arg) in args.iter().enumerate() {
                    let rest = values
                        .iter()
                        .enumerate()
                        .filter(|&(j, _)| j != i)
                        .fold(value, |acc, (_, v)| acc.sub(v));
                    match self.assume_eq(state, arg, rest)? {
                        Some(s) => state = s,
                        None => return Ok(None),
                    }
                }
                Ok(Some(state))
            }
            Expr::Num(n) => {
                if value.has(*n) {
                    Ok(Some(state))
                } else {
                    self.infeasible(&format_args!("{} == {}", n, value))
                }
            }
            _ => {
                debug!("Ignoring equality {} == {}", expr, value);
                Ok(Some(state))
            }
        }
    }

    /// Restrict `state` so that `expr` does not evaluate to the single value of `value`.
    fn assume_neq(&self, state: ValuationState<D>, expr: &Expr, value: D) -> Refined<D> {
        let Some(c) = value.unique() else {
            return Ok(Some(state));
        };
        if expr.width() != c.width() {
            return Ok(Some(state));
        }
        match expr {
            Expr::Var(v) => {
                let new = state.var(v).exclude(c);
                if new.is_bot() {
                    return self.infeasible(&format_args!("{} != {}", v, c));
                }
                let mut state = state;
                let region = state.region(v);
                state.set_var(v, new, region);
                Ok(Some(state))
            }
            Expr::Op { op: Op::Neg, args, .. } => self.assume_neq(state, &args[0], D::number(-c)),
            Expr::Op { op: Op::Not, args, .. } => self.assume_neq(state, &args[0], D::number(!c)),
            Expr::Num(n) if *n == c => self.infeasible(&format_args!("{} != {}", n, c)),
            _ => {
                debug!("Ignoring disequality {} != {}", expr, value);
                Ok(Some(state))
            }
        }
    }
}
