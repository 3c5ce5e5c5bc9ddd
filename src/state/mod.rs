//! Valuation states.
//!
//! A [`ValuationState`] maps variables and memory cells to abstract values of a
//! [`ValueDomain`]. Missing entries are TOP, so the empty state is the top
//! element and every lattice operation works pointwise on the entries present.
//!
//! Expressions are evaluated by an [`Evaluator`], which also carries the options
//! and the operator cache; assumptions refine a state through
//! [`Evaluator::assume`].

mod assume;
mod eval;

pub use eval::Evaluator;

use std::collections::BTreeMap;
use std::fmt;

use log::debug;

use crate::domain::ValueDomain;
use crate::expr::{Location, Var};
use crate::memory::{MemoryRegion, RegionMap, Store};

/// Abstract values of all variables and memory cells at a program point.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ValuationState<D> {
    vars: BTreeMap<Var, D>,
    regions: RegionMap,
    store: Store<D>,
    allocations: BTreeMap<Location, usize>,
    widened: bool,
}

impl<D: ValueDomain> Default for ValuationState<D> {
    fn default() -> Self {
        Self {
            vars: BTreeMap::new(),
            regions: RegionMap::new(),
            store: Store::new(),
            allocations: BTreeMap::new(),
            widened: false,
        }
    }
}

impl<D: ValueDomain> ValuationState<D> {
    /// The state knowing nothing.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn var(&self, var: &Var) -> D {
        self.vars.get(var).copied().unwrap_or_else(|| D::top(var.width()))
    }

    pub fn region(&self, var: &Var) -> MemoryRegion {
        self.regions.get(var)
    }

    pub fn set_var(&mut self, var: &Var, value: D, region: MemoryRegion) {
        assert_eq!(
            var.width(),
            value.width(),
            "Cannot assign a {}-bit value to {}",
            value.width(),
            var
        );
        debug!("setting {} to {} / {}", var, value, region);
        if value.is_top() {
            self.vars.remove(var);
        } else {
            self.vars.insert(var.clone(), value);
        }
        self.regions.set(var, region);
    }

    pub fn vars(&self) -> impl Iterator<Item = (&Var, &D)> {
        self.vars.iter()
    }

    pub fn regions(&self) -> &RegionMap {
        &self.regions
    }

    pub fn store(&self) -> &Store<D> {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut Store<D> {
        &mut self.store
    }

    /// Number of earlier allocations at `location`; counts this one.
    pub fn count_allocation(&mut self, location: Location) -> usize {
        let count = self.allocations.entry(location).or_insert(0);
        let result = *count;
        *count += 1;
        result
    }

    /// Whether some variable or cell is known to hold no value.
    pub fn is_bot(&self) -> bool {
        self.vars.values().any(|v| v.is_bot()) || self.store.iter().any(|(_, _, v)| v.is_bot())
    }

    pub fn is_top(&self) -> bool {
        self.vars.is_empty() && self.store.is_top() && self.regions.is_top()
    }

    /// Whether this state was produced by widening.
    pub fn is_widened(&self) -> bool {
        self.widened
    }

    pub fn activate_widen(&mut self) {
        self.widened = true;
    }

    /// Allocation counts after a merge: larger than both sides, so the next
    /// allocation at any site still gets a fresh region name.
    fn join_allocations(&self, other: &Self) -> BTreeMap<Location, usize> {
        let mut result = BTreeMap::new();
        for location in self.allocations.keys().chain(other.allocations.keys()) {
            let a = self.allocations.get(location).copied().unwrap_or(0);
            let b = other.allocations.get(location).copied().unwrap_or(0);
            result.insert(*location, a + b + 1);
        }
        result
    }

    /// Combine the variables present in both states with `f`.
    fn combine_vars(&self, other: &Self, f: impl Fn(&D, &D) -> D) -> BTreeMap<Var, D> {
        self.vars
            .iter()
            .map(|(var, v)| (var.clone(), f(v, &other.var(var))))
            .filter(|(_, v)| !v.is_top())
            .collect()
    }

    pub fn join(&self, other: &Self) -> Self {
        Self {
            vars: self.combine_vars(other, |v, u| v.join(u)),
            regions: self.regions.join(&other.regions),
            store: self.store.join(&other.store),
            allocations: self.join_allocations(other),
            widened: self.widened || other.widened,
        }
    }

    /// Extrapolate from `self` (the earlier state) towards `other`.
    pub fn widen(&self, other: &Self) -> Self {
        let result = Self {
            vars: self.combine_vars(other, |v, u| v.widen(u)),
            regions: self.regions.join(&other.regions),
            store: self.store.widen(&other.store),
            allocations: self.join_allocations(other),
            widened: true,
        };
        debug_assert!(self.le(&result) && other.le(&result));
        result
    }

    pub fn le(&self, other: &Self) -> bool {
        other.vars.iter().all(|(var, v)| self.var(var).le(v))
            && self.regions.le(&other.regions)
            && self.store.le(&other.store)
    }
}

impl<D: ValueDomain> fmt::Display for ValuationState<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Variables:")?;
        for (var, v) in &self.vars {
            writeln!(f, "\t{}: {}", var, v)?;
        }
        writeln!(f, "Memory:")?;
        write!(f, "{}", self.store)?;
        writeln!(f, "Regions:")?;
        for (var, region) in self.regions.iter() {
            writeln!(f, "\t{}: {}", var, region)?;
        }
        Ok(())
    }
}
