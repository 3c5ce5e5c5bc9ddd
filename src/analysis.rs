//! Configurable program analysis over valuation states.
//!
//! [`Analysis`] packages the transfer relation (`post`) and the operators a CPA
//! algorithm needs to combine states: `merge` joins (or, once the precision has
//! been incremented often enough, widens) a successor into a reached state,
//! `prec` decides when to start widening, and `stop` checks coverage by the join
//! of the reached states. [`Analysis::run`] is a small worklist driver over a
//! list of edges.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use log::{debug, info, warn};

use crate::cache::{OpCache, OpKey};
use crate::config::Options;
use crate::domain::ValueDomain;
use crate::error::{AnalysisError, Result};
use crate::expr::{Edge, Expr, Location, Stmt, Var};
use crate::memory::MemoryRegion;
use crate::state::{Evaluator, ValuationState};
use crate::word::Word;

/// Block operations with more bytes than this are treated like unknown counts.
const MAX_BLOCK_BYTES: u64 = 1 << 12;

/// Number of times a state has been refined along its path.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Precision {
    count: usize,
}

impl Precision {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn inc(&self) -> Self {
        Self { count: self.count + 1 }
    }
}

/// The analysis object: options, the operator cache and the visit counters.
pub struct Analysis<D: ValueDomain> {
    options: Options,
    cache: RefCell<OpCache<OpKey<D>, D>>,
    visits: RefCell<HashMap<Location, usize>>,
    loop_head: Cell<Option<Location>>,
}

impl<D: ValueDomain> Default for Analysis<D> {
    fn default() -> Self {
        Self::new(Options::default())
    }
}

impl<D: ValueDomain> Analysis<D> {
    pub fn new(options: Options) -> Self {
        let cache = OpCache::new(options.cache_capacity);
        Self {
            options,
            cache: RefCell::new(cache),
            visits: RefCell::new(HashMap::new()),
            loop_head: Cell::new(None),
        }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn cache(&self) -> &RefCell<OpCache<OpKey<D>, D>> {
        &self.cache
    }

    /// An evaluator sharing the options and the cache of this analysis.
    pub fn evaluator(&self) -> Evaluator<'_, D> {
        Evaluator::new(&self.options).with_cache(&self.cache)
    }

    /// The location reported as a potential loop head, if any.
    pub fn loop_head(&self) -> Option<Location> {
        self.loop_head.get()
    }

    pub fn init_start_state(&self, location: Location) -> ValuationState<D> {
        debug!("initial state at {}", location);
        ValuationState::new()
    }

    pub fn init_precision(&self) -> Precision {
        Precision::new()
    }

    fn count_post(&self, location: Location) {
        let mut visits = self.visits.borrow_mut();
        let count = visits.entry(location).or_insert(0);
        *count += 1;
        if *count > self.options.loop_warning_threshold && self.loop_head.get().is_none() {
            warn!("Potential loop at {} after {} visits", location, count);
            self.loop_head.set(Some(location));
        }
    }

    /// Successors of `state` along `edge`. Unreachable successors are dropped.
    pub fn post(&self, state: &ValuationState<D>, edge: &Edge, precision: &Precision) -> Result<Vec<ValuationState<D>>> {
        self.count_post(edge.from);
        debug!("post {} with {:?}", edge, precision);
        let ev = self.evaluator();
        let mut next = state.clone();

        match &edge.stmt {
            Stmt::Assign(var, expr) => {
                let value = ev.eval(state, expr)?;
                let value = if value.width() == var.width() {
                    value
                } else {
                    warn!("Assigning a {}-bit value to {}", value.width(), var);
                    value.cast(var.width())
                };
                if value.is_bot() {
                    debug!("{} has no value, {} is unreachable", expr, edge.to);
                    return Ok(Vec::new());
                }
                let region = ev.region_of(state, expr);
                next.set_var(var, value, region);
            }
            Stmt::Store { address, value } => {
                let value = ev.eval(state, value)?;
                if value.is_bot() {
                    return Ok(Vec::new());
                }
                ev.write(&mut next, address, value)?;
            }
            Stmt::Assume(cond) => {
                return Ok(ev.assume(next, cond, true)?.into_iter().collect());
            }
            Stmt::Alloc { pointer, name } => {
                let region = match name {
                    Some(name) => MemoryRegion::named(name),
                    None => {
                        let count = next.count_allocation(edge.from);
                        MemoryRegion::Named(format!("alloc{}#{}", edge.from, count))
                    }
                };
                info!("Allocating {} for {}", region, pointer);
                next.set_var(pointer, D::number(Word::zero(pointer.width())), region);
            }
            Stmt::Dealloc(pointer) => {
                let address = ev.eval(state, pointer)?;
                let region = ev.region_of(state, pointer);
                if address.is_top() || region.is_top() {
                    warn!("Deallocating an unknown pointer {}, forgetting all memory", pointer);
                    next.store_mut().set_top();
                } else if matches!(region, MemoryRegion::Global | MemoryRegion::Stack) {
                    return Err(AnalysisError::InvalidDealloc(region));
                } else {
                    next.store_mut().set_top_region(&region);
                }
            }
            Stmt::UnknownCall { defined } => {
                for var in defined {
                    let region = state.region(var);
                    next.set_var(var, D::top(var.width()), region);
                }
                next.store_mut().set_top();
            }
            Stmt::Havoc { var, max } => {
                next.set_var(var, D::top(var.width()), state.region(var));
                let bound = Expr::var(var).ule(max.clone());
                return Ok(ev.assume(next, &bound, true)?.into_iter().collect());
            }
            Stmt::Memset { dest, value, count } => {
                let byte = ev.eval(state, value)?;
                let byte = if byte.width() == 8 { byte } else { byte.cast(8) };
                let Some(n) = self.block_count(&ev, state, count)? else {
                    return Ok(vec![ValuationState::new()]);
                };
                for i in 0..n {
                    let address = dest.clone().add(Expr::num(i, dest.width()));
                    ev.write(&mut next, &address, byte)?;
                }
            }
            Stmt::Memcpy { source, dest, count } => {
                let Some(n) = self.block_count(&ev, state, count)? else {
                    return Ok(vec![ValuationState::new()]);
                };
                for i in 0..n {
                    let from = Expr::mem(source.clone().add(Expr::num(i, source.width())), 8);
                    let byte = ev.eval(&next, &from)?;
                    let to = dest.clone().add(Expr::num(i, dest.width()));
                    ev.write(&mut next, &to, byte)?;
                }
            }
            Stmt::Opaque(what) => {
                if self.options.fail_fast {
                    return Err(AnalysisError::UnsupportedStatement(what.clone()));
                }
                warn!("Unsupported statement {}, forgetting everything", what);
                return Ok(vec![ValuationState::new()]);
            }
            Stmt::Skip => {}
        }

        Ok(vec![next])
    }

    /// The byte count of a block operation, or `None` if it has to be given up.
    fn block_count(&self, ev: &Evaluator<'_, D>, state: &ValuationState<D>, count: &Expr) -> Result<Option<u64>> {
        let value = ev.eval(state, count)?;
        match value.unique() {
            Some(n) if n.value() <= MAX_BLOCK_BYTES => Ok(Some(n.value())),
            _ => {
                if self.options.fail_fast {
                    return Err(AnalysisError::UnknownCount(count.to_string()));
                }
                warn!("Byte count {} = {} is not a small constant, forgetting everything", count, value);
                Ok(None)
            }
        }
    }

    /// Combine the successor `new` with the reached state `old`.
    pub fn merge(&self, new: &ValuationState<D>, old: &ValuationState<D>, precision: &Precision) -> ValuationState<D> {
        if new.le(old) {
            return old.clone();
        }
        if precision.count() >= self.options.widen_threshold {
            debug!("widening after {} refinements", precision.count());
            let mut result = old.widen(new);
            result.activate_widen();
            result
        } else {
            old.join(new)
        }
    }

    /// Adjust `state` and its precision against the states reached at the same location.
    pub fn prec(
        &self,
        state: &ValuationState<D>,
        precision: &Precision,
        reached: &[ValuationState<D>],
    ) -> (ValuationState<D>, Precision) {
        let covers = reached.iter().any(|r| r.le(state));
        if covers && precision.count() >= self.options.widen_threshold {
            let widened = reached.iter().fold(state.clone(), |acc, r| r.widen(&acc));
            debug!("widened successor against {} reached states", reached.len());
            (widened, *precision)
        } else {
            (state.clone(), precision.inc())
        }
    }

    /// Whether `state` is covered by the join of the `reached` states.
    pub fn stop(&self, state: &ValuationState<D>, reached: &[ValuationState<D>], _precision: &Precision) -> bool {
        let Some((first, rest)) = reached.split_first() else {
            return false;
        };
        let joined = rest.iter().fold(first.clone(), |acc, r| acc.join(r));
        let covered = state.le(&joined);
        if !covered {
            if let Some(location) = self.loop_head.get() {
                debug!("still growing while {} is looping", location);
            }
        }
        covered
    }

    /// Compute the reachable states of the program given by `edges`, starting at `entry`.
    pub fn run(&self, edges: &[Edge], entry: Location) -> Result<Reached<D>> {
        let mut outgoing: HashMap<Location, Vec<&Edge>> = HashMap::new();
        for edge in edges {
            outgoing.entry(edge.from).or_default().push(edge);
        }

        let mut reached = Reached::new();
        reached.insert(entry, self.init_start_state(entry), self.init_precision());
        let mut worklist = VecDeque::from([entry]);
        let mut queued = HashSet::from([entry]);

        while let Some(location) = worklist.pop_front() {
            queued.remove(&location);
            reached.iterations += 1;
            if reached.iterations > self.options.max_iterations {
                if self.options.fail_fast {
                    return Err(AnalysisError::NotConverged(self.options.max_iterations));
                }
                warn!("Analysis did not converge after {} iterations", self.options.max_iterations);
                reached.converged = false;
                return Ok(reached);
            }
            let Some((state, precision)) = reached.entry(location) else {
                continue;
            };
            let (state, precision) = (state.clone(), *precision);

            for edge in outgoing.get(&location).into_iter().flatten() {
                for succ in self.post(&state, edge, &precision)? {
                    let target = edge.to;
                    let updated = match reached.entry(target) {
                        None => Some((succ, precision.inc())),
                        Some((old, _)) => {
                            let (succ, p) = self.prec(&succ, &precision, std::slice::from_ref(old));
                            let merged = self.merge(&succ, old, &p);
                            if self.stop(&merged, std::slice::from_ref(old), &p) {
                                None
                            } else {
                                Some((merged, p))
                            }
                        }
                    };
                    if let Some((s, p)) = updated {
                        reached.insert(target, s, p);
                        if queued.insert(target) {
                            worklist.push_back(target);
                        }
                    }
                }
            }
        }

        info!(
            "Analysis converged after {} iterations, {} locations reached",
            reached.iterations,
            reached.len()
        );
        Ok(reached)
    }
}

/// States reached by [`Analysis::run`], one per location.
#[derive(Debug, Clone)]
pub struct Reached<D> {
    states: BTreeMap<Location, (ValuationState<D>, Precision)>,
    iterations: usize,
    converged: bool,
}

impl<D: ValueDomain> Reached<D> {
    fn new() -> Self {
        Self {
            states: BTreeMap::new(),
            iterations: 0,
            converged: true,
        }
    }

    fn insert(&mut self, location: Location, state: ValuationState<D>, precision: Precision) {
        self.states.insert(location, (state, precision));
    }

    fn entry(&self, location: Location) -> Option<&(ValuationState<D>, Precision)> {
        self.states.get(&location)
    }

    pub fn get(&self, location: Location) -> Option<&ValuationState<D>> {
        self.states.get(&location).map(|(s, _)| s)
    }

    /// The value of `var` at `location`, or `None` if the location is unreachable.
    pub fn value(&self, location: Location, var: &Var) -> Option<D> {
        self.get(location).map(|s| s.var(var))
    }

    pub fn is_reached(&self, location: Location) -> bool {
        self.states.contains_key(&location)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Location, &ValuationState<D>)> {
        self.states.iter().map(|(l, (s, _))| (*l, s))
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Whether the worklist ran empty, as opposed to stopping at `max_iterations`.
    pub fn converged(&self) -> bool {
        self.converged
    }
}
