//! # wrapint-rs: Signedness-Agnostic Numeric Domains
//!
//! **`wrapint-rs`** provides abstract numeric domains for the analysis of machine code,
//! where the same bit pattern may be read as a signed or as an unsigned integer
//! and all arithmetic wraps around modulo `2^w`.
//!
//! ## What is a wrapped interval?
//!
//! A wrapped interval `[a, b]` over `w`-bit words is the set of values reached by
//! counting upwards from `a` to `b`, wrapping from `2^w - 1` to `0` if needed.
//! Because the interval lives on a circle rather than a line, it does not commit
//! to a signedness: `[250, 5]` is a small unsigned interval across the wrap-around
//! point (the *north pole*) and, read as signed, the range `[-6, 5]`.
//!
//! ## Key Features
//!
//! - **Fixed-width words**: [`Word`][crate::word::Word] carries its width and wraps every operation.
//! - **Wrapped intervals**: [`Interval`][crate::interval::Interval] is the lattice of wrapped intervals with sound transfer functions for all arithmetic, bitwise, shift, extension and comparison operators.
//! - **Congruences**: [`CcInterval`][crate::congruence::CcInterval] refines an interval with a modulus and a range of remainders, so strides survive loops.
//! - **Valuation states**: [`ValuationState`][crate::state::ValuationState] maps variables and partitioned memory to values of any [`ValueDomain`][crate::domain::ValueDomain].
//! - **CPA glue**: [`Analysis`][crate::analysis::Analysis] exposes `post`, `merge`, `prec` and `stop`, plus a small worklist driver.
//!
//! ## Basic Usage
//!
//! ```rust
//! use wrapint_rs::congruence::CcInterval;
//! use wrapint_rs::interval::Interval;
//! use wrapint_rs::word::Word;
//!
//! let w8 = |x| Word::new(x, 8);
//!
//! // [10, 20] + 5 = [15, 25]
//! let a = Interval::new(w8(10), w8(20));
//! let b = Interval::number(w8(5));
//! assert_eq!(a.add(&b), Interval::new(w8(15), w8(25)));
//!
//! // Wrapped intervals cross the north pole.
//! let c = Interval::new(w8(200), w8(50));
//! assert!(c.has(w8(255)));
//! assert!(!c.has(w8(100)));
//!
//! // Joining two points remembers their distance as a modulus.
//! let d = CcInterval::number(w8(4)).join(&CcInterval::number(w8(10)));
//! assert_eq!(d.modulus(), Some(w8(6)));
//! assert!(d.has(w8(4)) && d.has(w8(10)));
//! assert!(!d.has(w8(7)));
//! ```
//!
//! ## Core Components
//!
//! - **[`word`]**: modular arithmetic on fixed-width words.
//! - **[`interval`]**: the wrapped interval domain.
//! - **[`congruence`]**: the congruence-interval domain.
//! - **[`domain`]**: the [`ValueDomain`][crate::domain::ValueDomain] trait both domains implement.
//! - **[`expr`]**: expressions, statements and control-flow edges.
//! - **[`state`]**: valuation states, expression evaluation and assumptions.
//! - **[`analysis`]**: the CPA operators over valuation states.
//!
//! Operator applications can be memoised in an [`OpCache`][crate::cache::OpCache],
//! owned by the analysis; see [`config::Options::cache_capacity`].

pub mod analysis;
pub mod cache;
pub mod config;
pub mod congruence;
pub mod domain;
pub mod error;
pub mod expr;
pub mod interval;
pub mod memory;
pub mod state;
pub mod word;
