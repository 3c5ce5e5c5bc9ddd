//! Errors of the analysis layer.
//!
//! The value domains never fail: misuse (mixed widths, malformed constructors)
//! panics, and precision loss degrades to TOP. Only the valuation state and the
//! analysis report errors, and most of them only with `fail_fast` set.

use std::fmt;

use crate::expr::Op;
use crate::memory::MemoryRegion;

/// Error type for the transfer functions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    /// An operator without abstract semantics was evaluated or assumed.
    UnsupportedOperator { op: Op, expr: String },
    /// A statement without abstract semantics was executed.
    UnsupportedStatement(String),
    /// A bit-range extension overwriting bits of its own operand.
    StrangeExtension { first: u32, last: u32, width: u32 },
    /// A width argument (of a cast or an extension) is not a constant.
    NonConstantWidth(String),
    /// A special expression was evaluated or assumed.
    SpecialExpression(String),
    /// An assumption that no value satisfies.
    Unsatisfiable(String),
    /// An assumption on an expression without a refinement rule.
    UnsupportedAssumption(String),
    /// A write through a completely unknown address.
    WildStore(String),
    /// `memset`/`memcpy` with a non-constant byte count.
    UnknownCount(String),
    /// Deallocation of a region that is never heap-allocated.
    InvalidDealloc(MemoryRegion),
    /// The worklist was still busy after this many iterations.
    NotConverged(usize),
}

impl fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisError::UnsupportedOperator { op, expr } => {
                write!(f, "Unsupported operator {:?} in {}", op, expr)
            }
            AnalysisError::UnsupportedStatement(s) => write!(f, "Unsupported statement: {}", s),
            AnalysisError::StrangeExtension { first, last, width } => write!(
                f,
                "Bit-range extension {}..={} overwrites bits of a {}-bit operand",
                first, last, width
            ),
            AnalysisError::NonConstantWidth(e) => write!(f, "Width argument is not a constant in {}", e),
            AnalysisError::SpecialExpression(e) => write!(f, "Special expression: {}", e),
            AnalysisError::Unsatisfiable(e) => write!(f, "Assumption {} cannot hold", e),
            AnalysisError::UnsupportedAssumption(e) => write!(f, "Cannot assume {}", e),
            AnalysisError::WildStore(s) => write!(f, "Store to an unknown address overwrites all memory: {}", s),
            AnalysisError::UnknownCount(s) => write!(f, "Byte count is not a constant: {}", s),
            AnalysisError::InvalidDealloc(r) => write!(f, "Cannot deallocate {}", r),
            AnalysisError::NotConverged(n) => write!(f, "No fixpoint after {} iterations", n),
        }
    }
}

impl std::error::Error for AnalysisError {}

pub type Result<T> = std::result::Result<T, AnalysisError>;
