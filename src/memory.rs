//! Memory regions and the partitioned store.
//!
//! Addresses are pairs of a [`MemoryRegion`] and a byte offset. The [`Store`]
//! keeps one abstract value per cell `(region, offset, width)`; anything not
//! stored is TOP. Variables remember the region their value points into in a
//! [`RegionMap`].

use std::collections::BTreeMap;
use std::fmt;

use log::debug;

use crate::domain::ValueDomain;
use crate::expr::Var;
use crate::word::Word;

/// The region an address points into.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MemoryRegion {
    Global,
    Stack,
    /// A heap allocation or a named segment.
    Named(String),
    /// Any region.
    Top,
}

impl MemoryRegion {
    /// The region called `name`; `"global"` and `"stack"` are the predefined ones.
    pub fn named(name: &str) -> Self {
        match name {
            "global" => MemoryRegion::Global,
            "stack" => MemoryRegion::Stack,
            _ => MemoryRegion::Named(name.to_string()),
        }
    }

    pub fn is_top(&self) -> bool {
        matches!(self, MemoryRegion::Top)
    }

    /// Distinct regions join to `Top`, except that `Global` (the region of plain
    /// numbers) is absorbed: a global offset added to a pointer stays in its region.
    pub fn join(&self, other: &Self) -> Self {
        match (self, other) {
            (a, b) if a == b => a.clone(),
            (MemoryRegion::Global, r) | (r, MemoryRegion::Global) => r.clone(),
            _ => MemoryRegion::Top,
        }
    }

    pub fn le(&self, other: &Self) -> bool {
        self == other || other.is_top() || *self == MemoryRegion::Global
    }
}

impl fmt::Display for MemoryRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryRegion::Global => write!(f, "GLOBAL"),
            MemoryRegion::Stack => write!(f, "STACK"),
            MemoryRegion::Named(name) => write!(f, "{}", name),
            MemoryRegion::Top => write!(f, "TOP"),
        }
    }
}

/// Region of every variable; a missing variable may point anywhere.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct RegionMap {
    regions: BTreeMap<Var, MemoryRegion>,
}

impl RegionMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, var: &Var) -> MemoryRegion {
        self.regions.get(var).cloned().unwrap_or(MemoryRegion::Top)
    }

    pub fn set(&mut self, var: &Var, region: MemoryRegion) {
        if region.is_top() {
            self.regions.remove(var);
        } else {
            self.regions.insert(var.clone(), region);
        }
    }

    pub fn is_top(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn join(&self, other: &Self) -> Self {
        let mut result = Self::new();
        for (var, region) in &self.regions {
            result.set(var, region.join(&other.get(var)));
        }
        result
    }

    pub fn le(&self, other: &Self) -> bool {
        other.regions.iter().all(|(var, region)| self.get(var).le(region))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Var, &MemoryRegion)> {
        self.regions.iter()
    }
}

/// Size in bytes of a `width`-bit cell.
fn cell_bytes(width: u32) -> u64 {
    ((width + 7) / 8) as u64
}

/// A partitioned memory: per region, a map from byte offsets to values.
///
/// Values are laid out little-endian, cells never overlap, and a read of a cell
/// that was never written (or was overwritten partially) is TOP.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Store<D> {
    regions: BTreeMap<MemoryRegion, BTreeMap<u64, D>>,
}

impl<D> Default for Store<D> {
    fn default() -> Self {
        Self {
            regions: BTreeMap::new(),
        }
    }
}

impl<D: ValueDomain> Store<D> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_top(&self) -> bool {
        self.regions.values().all(|cells| cells.is_empty())
    }

    /// Number of stored cells.
    pub fn len(&self) -> usize {
        self.regions.values().map(|cells| cells.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The `width`-bit value at `offset`.
    ///
    /// A read inside a wider cell extracts the corresponding bytes.
    pub fn get(&self, region: &MemoryRegion, offset: u64, width: u32) -> D {
        let Some(cells) = self.regions.get(region) else {
            return D::top(width);
        };
        let lo = offset.saturating_sub(7);
        for (&start, value) in cells.range(lo..=offset) {
            let end = start + cell_bytes(value.width());
            if end < offset.saturating_add(cell_bytes(width)) {
                continue;
            }
            if start == offset && value.width() == width {
                return *value;
            }
            let shift = (offset - start) * 8;
            if value.width() >= width && shift + width as u64 <= value.width() as u64 {
                let amount = D::number(Word::new(shift, value.width()));
                return value.shr(&amount).truncate(width);
            }
        }
        D::top(width)
    }

    /// Strong update: the cell holds exactly `value` afterwards.
    pub fn set(&mut self, region: &MemoryRegion, offset: u64, value: D) {
        assert!(!region.is_top(), "Cannot write to the TOP region");
        let cells = self.regions.entry(region.clone()).or_default();
        let end = offset.saturating_add(cell_bytes(value.width()));
        let overlapping: Vec<u64> = cells
            .range(offset.saturating_sub(7)..end)
            .filter(|(&start, v)| start + cell_bytes(v.width()) > offset)
            .map(|(&start, _)| start)
            .collect();
        for start in overlapping {
            debug!("dropping cell {}+{:#x} overlapped by a write at {:#x}", region, start, offset);
            cells.remove(&start);
        }
        if !value.is_top() {
            cells.insert(offset, value);
        }
    }

    /// Weak update: the cell may hold its old value or `value`.
    pub fn weak_update(&mut self, region: &MemoryRegion, offset: u64, value: D) {
        let old = self.get(region, offset, value.width());
        self.set(region, offset, old.join(&value));
    }

    /// Forget the whole content of `region`; `Top` forgets everything.
    pub fn set_top_region(&mut self, region: &MemoryRegion) {
        if region.is_top() {
            self.set_top();
        } else {
            self.regions.remove(region);
        }
    }

    pub fn set_top(&mut self) {
        self.regions.clear();
    }

    /// A write of `value` to an unknown address: every cell may now hold it.
    ///
    /// Cells at least as wide as `value` keep their low bits joined with it; narrower
    /// ones are forgotten.
    pub fn smear(&mut self, value: D) {
        let w = value.width();
        for cells in self.regions.values_mut() {
            let updated: BTreeMap<u64, D> = cells
                .iter()
                .filter(|(_, v)| v.width() >= w)
                .map(|(&offset, v)| (offset, v.truncate(w).join(&value)))
                .filter(|(_, v)| !v.is_top())
                .collect();
            *cells = updated;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&MemoryRegion, u64, &D)> {
        self.regions
            .iter()
            .flat_map(|(region, cells)| cells.iter().map(move |(&offset, v)| (region, offset, v)))
    }

    /// Cells present in both stores, combined with `f`; all others become TOP.
    fn combine(&self, other: &Self, f: impl Fn(&D, &D) -> D) -> Self {
        let mut result = Self::new();
        for (region, offset, v) in self.iter() {
            let u = other.get(region, offset, v.width());
            let r = f(v, &u);
            if !r.is_top() {
                result.regions.entry(region.clone()).or_default().insert(offset, r);
            }
        }
        result
    }

    pub fn join(&self, other: &Self) -> Self {
        self.combine(other, |v, u| v.join(u))
    }

    pub fn widen(&self, other: &Self) -> Self {
        self.combine(other, |v, u| v.widen(u))
    }

    pub fn le(&self, other: &Self) -> bool {
        other
            .iter()
            .all(|(region, offset, v)| self.get(region, offset, v.width()).le(v))
    }
}

impl<D: ValueDomain> fmt::Display for Store<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (region, offset, v) in self.iter() {
            writeln!(f, "\t{:#x} ({}) @ {}: {}", offset, region, v.width(), v)?;
        }
        Ok(())
    }
}
