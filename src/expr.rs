//! Register-transfer expressions and statements.
//!
//! This is the small language the valuation state evaluates: bit-vector
//! expressions over named variables and memory, and the statements labelling the
//! edges of a control-flow automaton.

use std::fmt;

use crate::word::Word;

/// A named register or temporary of a fixed width.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Var {
    name: String,
    width: u32,
}

impl Var {
    pub fn new(name: impl Into<String>, width: u32) -> Self {
        Self {
            name: name.into(),
            width,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn width(&self) -> u32 {
        self.width
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Operators of [`Expr::Op`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Op {
    Not,
    Neg,
    And,
    Or,
    Xor,
    Plus,
    Mul,
    UDiv,
    SDiv,
    UMod,
    SMod,
    Shl,
    Shr,
    Sar,
    Rol,
    Ror,
    Equal,
    /// Signed `<`.
    Less,
    /// Signed `<=`.
    LessOrEqual,
    UnsignedLess,
    UnsignedLessOrEqual,
    /// `(value, width)`: truncate to a constant width.
    Cast,
    /// `(first, last, value)`: fill bits `first..=last` with the sign bit.
    SignExtend,
    /// `(first, last, value)`: clear bits `first..=last`.
    ZeroFill,
    /// An operator this crate has no semantics for, e.g. floating point.
    Unknown,
}

impl Op {
    /// Comparisons produce a 1-bit result.
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            Op::Equal | Op::Less | Op::LessOrEqual | Op::UnsignedLess | Op::UnsignedLessOrEqual
        )
    }

    /// Operators whose operands are cast to the result width first.
    pub fn casts_operands(self) -> bool {
        matches!(
            self,
            Op::Not
                | Op::Neg
                | Op::And
                | Op::Or
                | Op::Xor
                | Op::Plus
                | Op::Mul
                | Op::UDiv
                | Op::SDiv
                | Op::UMod
                | Op::SMod
                | Op::Shl
                | Op::Shr
                | Op::Sar
                | Op::Rol
                | Op::Ror
        )
    }

    fn symbol(self) -> &'static str {
        match self {
            Op::Not => "~",
            Op::Neg => "-",
            Op::And => "&",
            Op::Or => "|",
            Op::Xor => "^",
            Op::Plus => "+",
            Op::Mul => "*",
            Op::UDiv => "/u",
            Op::SDiv => "/s",
            Op::UMod => "%u",
            Op::SMod => "%s",
            Op::Shl => "<<",
            Op::Shr => ">>",
            Op::Sar => ">>>",
            Op::Rol => "rol",
            Op::Ror => "ror",
            Op::Equal => "==",
            Op::Less => "<s",
            Op::LessOrEqual => "<=s",
            Op::UnsignedLess => "<u",
            Op::UnsignedLessOrEqual => "<=u",
            Op::Cast => "cast",
            Op::SignExtend => "sign_extend",
            Op::ZeroFill => "zero_fill",
            Op::Unknown => "unknown",
        }
    }
}

/// A bit-vector expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Expr {
    Var(Var),
    Num(Word),
    /// A `width`-bit memory cell at `address`.
    Mem { address: Box<Expr>, width: u32 },
    /// Bits `first..=last` of the operand.
    BitRange { operand: Box<Expr>, first: u32, last: u32 },
    Op { op: Op, args: Vec<Expr>, width: u32 },
    Cond {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    /// An arbitrary value.
    Nondet(u32),
    /// A value with architecture-specific meaning, e.g. a flag register read.
    Special(u32),
}

impl Expr {
    pub fn var(var: &Var) -> Self {
        Expr::Var(var.clone())
    }

    pub fn num(value: u64, width: u32) -> Self {
        Expr::Num(Word::new(value, width))
    }

    pub fn mem(address: Expr, width: u32) -> Self {
        Expr::Mem {
            address: Box::new(address),
            width,
        }
    }

    pub fn bit_range(self, first: u32, last: u32) -> Self {
        assert!(
            first <= last && last < self.width(),
            "Bit range {}..={} out of {} bits",
            first,
            last,
            self.width()
        );
        Expr::BitRange {
            operand: Box::new(self),
            first,
            last,
        }
    }

    pub fn op(op: Op, args: Vec<Expr>, width: u32) -> Self {
        Expr::Op { op, args, width }
    }

    fn binary(self, op: Op, other: Self) -> Self {
        let width = if op.is_comparison() { 1 } else { self.width() };
        Expr::op(op, vec![self, other], width)
    }

    pub fn cond(cond: Expr, then: Expr, otherwise: Expr) -> Self {
        Expr::Cond {
            cond: Box::new(cond),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        }
    }

    pub fn not(self) -> Self {
        let width = self.width();
        Expr::op(Op::Not, vec![self], width)
    }

    pub fn neg(self) -> Self {
        let width = self.width();
        Expr::op(Op::Neg, vec![self], width)
    }

    pub fn add(self, other: Self) -> Self {
        self.binary(Op::Plus, other)
    }

    /// `self + (-other)`; there is no subtraction operator.
    pub fn sub(self, other: Self) -> Self {
        self.add(other.neg())
    }

    pub fn mul(self, other: Self) -> Self {
        self.binary(Op::Mul, other)
    }

    pub fn udiv(self, other: Self) -> Self {
        self.binary(Op::UDiv, other)
    }

    pub fn sdiv(self, other: Self) -> Self {
        self.binary(Op::SDiv, other)
    }

    pub fn urem(self, other: Self) -> Self {
        self.binary(Op::UMod, other)
    }

    pub fn srem(self, other: Self) -> Self {
        self.binary(Op::SMod, other)
    }

    pub fn and(self, other: Self) -> Self {
        self.binary(Op::And, other)
    }

    pub fn or(self, other: Self) -> Self {
        self.binary(Op::Or, other)
    }

    pub fn xor(self, other: Self) -> Self {
        self.binary(Op::Xor, other)
    }

    pub fn shl(self, other: Self) -> Self {
        self.binary(Op::Shl, other)
    }

    pub fn shr(self, other: Self) -> Self {
        self.binary(Op::Shr, other)
    }

    pub fn sar(self, other: Self) -> Self {
        self.binary(Op::Sar, other)
    }

    pub fn rol(self, other: Self) -> Self {
        self.binary(Op::Rol, other)
    }

    pub fn ror(self, other: Self) -> Self {
        self.binary(Op::Ror, other)
    }

    pub fn eq(self, other: Self) -> Self {
        self.binary(Op::Equal, other)
    }

    pub fn ne(self, other: Self) -> Self {
        self.eq(other).not()
    }

    pub fn slt(self, other: Self) -> Self {
        self.binary(Op::Less, other)
    }

    pub fn sle(self, other: Self) -> Self {
        self.binary(Op::LessOrEqual, other)
    }

    pub fn ult(self, other: Self) -> Self {
        self.binary(Op::UnsignedLess, other)
    }

    pub fn ule(self, other: Self) -> Self {
        self.binary(Op::UnsignedLessOrEqual, other)
    }

    /// Keep the low `width` bits.
    pub fn cast(self, width: u32) -> Self {
        Expr::op(Op::Cast, vec![self, Expr::num(width as u64, 8)], width)
    }

    pub fn sign_extend(self, first: u32, last: u32) -> Self {
        let width = self.width().max(last + 1);
        Expr::op(
            Op::SignExtend,
            vec![Expr::num(first as u64, 8), Expr::num(last as u64, 8), self],
            width,
        )
    }

    pub fn zero_fill(self, first: u32, last: u32) -> Self {
        let width = self.width().max(last + 1);
        Expr::op(
            Op::ZeroFill,
            vec![Expr::num(first as u64, 8), Expr::num(last as u64, 8), self],
            width,
        )
    }

    pub fn width(&self) -> u32 {
        match self {
            Expr::Var(v) => v.width(),
            Expr::Num(n) => n.width(),
            Expr::Mem { width, .. } => *width,
            Expr::BitRange { first, last, .. } => last - first + 1,
            Expr::Op { width, .. } => *width,
            Expr::Cond { then, .. } => then.width(),
            Expr::Nondet(w) | Expr::Special(w) => *w,
        }
    }

    /// Variables occurring anywhere in the expression, in order of appearance.
    pub fn used_vars(&self) -> Vec<&Var> {
        let mut result = Vec::new();
        self.collect_vars(&mut result);
        result
    }

    fn collect_vars<'a>(&'a self, out: &mut Vec<&'a Var>) {
        match self {
            Expr::Var(v) => {
                if !out.contains(&v) {
                    out.push(v);
                }
            }
            Expr::Num(_) | Expr::Nondet(_) | Expr::Special(_) => {}
            Expr::Mem { address, .. } => address.collect_vars(out),
            Expr::BitRange { operand, .. } => operand.collect_vars(out),
            Expr::Op { args, .. } => args.iter().for_each(|a| a.collect_vars(out)),
            Expr::Cond { cond, then, otherwise } => {
                cond.collect_vars(out);
                then.collect_vars(out);
                otherwise.collect_vars(out);
            }
        }
    }
}

impl From<&Var> for Expr {
    fn from(var: &Var) -> Self {
        Expr::var(var)
    }
}

impl From<Word> for Expr {
    fn from(value: Word) -> Self {
        Expr::Num(value)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Var(v) => write!(f, "{}", v),
            Expr::Num(n) => write!(f, "{}", n),
            Expr::Mem { address, width } => write!(f, "mem{}[{}]", width, address),
            Expr::BitRange { operand, first, last } => write!(f, "{}@[{}:{}]", operand, first, last),
            Expr::Op { op, args, .. } => match args.as_slice() {
                [x] => write!(f, "{}{}", op.symbol(), x),
                [x, y] if *op != Op::Cast => write!(f, "({} {} {})", x, op.symbol(), y),
                _ => {
                    write!(f, "{}(", op.symbol())?;
                    for (i, a) in args.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{}", a)?;
                    }
                    write!(f, ")")
                }
            },
            Expr::Cond { cond, then, otherwise } => write!(f, "({} ? {} : {})", cond, then, otherwise),
            Expr::Nondet(w) => write!(f, "nondet{}", w),
            Expr::Special(w) => write!(f, "special{}", w),
        }
    }
}

/// A statement labelling a control-flow edge.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Stmt {
    Assign(Var, Expr),
    /// Write `value` to the `value.width()`-bit cell at `address`.
    Store { address: Expr, value: Expr },
    /// Continue only with the states where the 1-bit condition holds.
    Assume(Expr),
    /// Point `pointer` at the start of a fresh region (or the named one).
    Alloc { pointer: Var, name: Option<String> },
    Dealloc(Expr),
    /// A call to an unknown procedure that clobbers `defined` and all memory.
    UnknownCall { defined: Vec<Var> },
    /// `var` gets an arbitrary value `<=u max`.
    Havoc { var: Var, max: Expr },
    /// Fill `count` bytes at `dest` with the byte `value`.
    Memset { dest: Expr, value: Expr, count: Expr },
    /// Copy `count` bytes from `source` to `dest`.
    Memcpy { source: Expr, dest: Expr, count: Expr },
    /// A statement with no abstract semantics, e.g. a platform intrinsic.
    Opaque(String),
    Skip,
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stmt::Assign(v, e) => write!(f, "{} := {}", v, e),
            Stmt::Store { address, value } => {
                write!(f, "mem{}[{}] := {}", value.width(), address, value)
            }
            Stmt::Assume(e) => write!(f, "assume {}", e),
            Stmt::Alloc { pointer, name: Some(n) } => write!(f, "{} := alloc {}", pointer, n),
            Stmt::Alloc { pointer, name: None } => write!(f, "{} := alloc", pointer),
            Stmt::Dealloc(e) => write!(f, "dealloc {}", e),
            Stmt::UnknownCall { defined } => {
                write!(f, "call ?(")?;
                for (i, v) in defined.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, ")")
            }
            Stmt::Havoc { var, max } => write!(f, "havoc {} <= {}", var, max),
            Stmt::Memset { dest, value, count } => write!(f, "memset({}, {}, {})", dest, value, count),
            Stmt::Memcpy { source, dest, count } => write!(f, "memcpy({}, {}, {})", dest, source, count),
            Stmt::Opaque(s) => write!(f, "opaque {}", s),
            Stmt::Skip => write!(f, "skip"),
        }
    }
}

/// A program point.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Location(pub usize);

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// A control-flow edge `from --stmt--> to`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Edge {
    pub from: Location,
    pub to: Location,
    pub stmt: Stmt,
}

impl Edge {
    pub fn new(from: usize, stmt: Stmt, to: usize) -> Self {
        Self {
            from: Location(from),
            to: Location(to),
            stmt,
        }
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} --[{}]--> {}", self.from, self.stmt, self.to)
    }
}
