//! Dependency graph.
//!
//! Tracks, for every content unit, the exact set of keys its last successful
//! render consumed. The inverse mapping (key → units) is derived on demand
//! from the current records so it can never drift from them.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::RwLock;

use crate::domain::types::UnitId;

use super::keys::DependencyKey;
use super::lock::{rw_read, rw_write};

const SOURCE: &str = "build::graph";

/// Maps units to the dependency set of their latest successful render.
pub struct DependencyGraph {
    records: RwLock<HashMap<UnitId, HashSet<DependencyKey>>>,
}

impl DependencyGraph {
    /// Create a new empty graph.
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Replace the unit's dependency set wholesale.
    ///
    /// Keys from a previous render that are absent from `keys` are dropped;
    /// recording the same set twice is a no-op.
    pub fn record(&self, unit: UnitId, keys: HashSet<DependencyKey>) {
        rw_write(&self.records, SOURCE, "record").insert(unit, keys);
    }

    /// Units whose current record contains at least one of `changed`.
    ///
    /// Computed from the records at call time. An empty result is a valid
    /// outcome (nobody references the changed keys). Units that were never
    /// recorded are never returned.
    pub fn affected_by<'a, I>(&self, changed: I) -> BTreeSet<UnitId>
    where
        I: IntoIterator<Item = &'a DependencyKey>,
    {
        let records = rw_read(&self.records, SOURCE, "affected_by");
        let inverted = invert(&records);

        let mut affected = BTreeSet::new();
        for key in changed {
            if let Some(units) = inverted.get(key) {
                affected.extend(units.iter().copied());
            }
        }
        affected
    }

    /// Build the key → units index from the current records.
    pub fn inverted_index(&self) -> HashMap<DependencyKey, BTreeSet<UnitId>> {
        let records = rw_read(&self.records, SOURCE, "inverted_index");
        invert(&records)
            .into_iter()
            .map(|(key, units)| (key.clone(), units))
            .collect()
    }

    /// Current dependency set of a unit, if it has been recorded.
    pub fn dependencies_of(&self, unit: UnitId) -> Option<HashSet<DependencyKey>> {
        rw_read(&self.records, SOURCE, "dependencies_of")
            .get(&unit)
            .cloned()
    }

    /// Snapshot of every record.
    pub fn snapshot(&self) -> HashMap<UnitId, HashSet<DependencyKey>> {
        rw_read(&self.records, SOURCE, "snapshot").clone()
    }

    /// Number of units with a record.
    pub fn unit_count(&self) -> usize {
        rw_read(&self.records, SOURCE, "unit_count").len()
    }

    /// Number of distinct keys across all records.
    pub fn key_count(&self) -> usize {
        let records = rw_read(&self.records, SOURCE, "key_count");
        records
            .values()
            .flat_map(|keys| keys.iter())
            .collect::<HashSet<_>>()
            .len()
    }
}

impl Default for DependencyGraph {
    fn default() -> Self {
        Self::new()
    }
}

fn invert(
    records: &HashMap<UnitId, HashSet<DependencyKey>>,
) -> HashMap<&DependencyKey, BTreeSet<UnitId>> {
    let mut inverted: HashMap<&DependencyKey, BTreeSet<UnitId>> = HashMap::new();
    for (unit, keys) in records {
        for key in keys {
            inverted.entry(key).or_default().insert(*unit);
        }
    }
    inverted
}
