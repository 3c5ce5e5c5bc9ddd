//! Analysis options.

/// Tuning knobs of the valuation state and the analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    /// Number of precision increments after which `merge` and `prec` widen.
    pub widen_threshold: usize,
    /// Largest set an abstract value is enumerated into.
    pub concretization_threshold: usize,
    /// Turn suspicious situations into errors instead of degrading to TOP.
    pub fail_fast: bool,
    /// Capacity of the operator cache; 0 disables it.
    pub cache_capacity: usize,
    /// Largest number of cells a read or a weak update may touch.
    pub max_memory_cells: usize,
    /// Visits of one location after which it is reported as a potential loop.
    pub loop_warning_threshold: usize,
    /// Safety bound on the worklist iterations of [`Analysis::run`](crate::analysis::Analysis::run).
    /// Exceeding it is an error with `fail_fast`, otherwise the partial result is marked unconverged.
    pub max_iterations: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            widen_threshold: 5,
            concretization_threshold: 20,
            fail_fast: false,
            cache_capacity: 1 << 12,
            max_memory_cells: 100,
            loop_warning_threshold: 10,
            max_iterations: 10_000,
        }
    }
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_widen_threshold(mut self, threshold: usize) -> Self {
        self.widen_threshold = threshold;
        self
    }

    pub fn with_concretization_threshold(mut self, threshold: usize) -> Self {
        self.concretization_threshold = threshold;
        self
    }

    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    pub fn with_max_memory_cells(mut self, cells: usize) -> Self {
        self.max_memory_cells = cells;
        self
    }

    pub fn with_loop_warning_threshold(mut self, visits: usize) -> Self {
        self.loop_warning_threshold = visits;
        self
    }

    pub fn with_max_iterations(mut self, iterations: usize) -> Self {
        self.max_iterations = iterations;
        self
    }
}
