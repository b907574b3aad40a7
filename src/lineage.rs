//! Provenance of values and rows.
//!
//! Every row produced by a transformation carries a [`Lineage`] recording
//! the transformation that produced it and the lineage(s) it was derived
//! from. Aggregates record a [`LineageGroup`] instead: for each distinct
//! contributing lineage, how many source rows fed the aggregate.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, RwLock, Weak};

use serde_json::{Value as Json, json};
use tracing::debug;

use crate::config::{self, LineageCachePolicy};

// ------------- Lineage -------------
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Lineage(Arc<LineageKind>);

#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum LineageKind {
    /// Rows read from a named source, or a literal.
    Known(Arc<str>),
    /// Produced by `transformation` from the `sources` lineages.
    Node {
        transformation: Arc<str>,
        sources: Vec<Lineage>,
    },
    Group(LineageGroup),
    Unknown,
}

impl Lineage {
    pub fn known(name: impl AsRef<str>) -> Self {
        Self(Arc::new(LineageKind::Known(Arc::from(name.as_ref()))))
    }
    pub fn node(transformation: impl Into<Arc<str>>, sources: Vec<Lineage>) -> Self {
        Self(Arc::new(LineageKind::Node {
            transformation: transformation.into(),
            sources,
        }))
    }
    pub fn group(group: LineageGroup) -> Self {
        Self(Arc::new(LineageKind::Group(group)))
    }
    pub fn unknown() -> Self {
        Self(Arc::new(LineageKind::Unknown))
    }
    pub fn kind(&self) -> &LineageKind {
        &self.0
    }
    /// True when both handles share the same allocation.
    pub fn same_as(&self, other: &Lineage) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
    pub fn to_json(&self) -> Json {
        match self.kind() {
            LineageKind::Known(name) => json!({ "known": name.as_ref() }),
            LineageKind::Node { transformation, sources } => json!({
                "transformation": transformation.as_ref(),
                "sources": sources.iter().map(Lineage::to_json).collect::<Vec<_>>(),
            }),
            LineageKind::Group(group) => json!({
                "group": group
                    .iter()
                    .map(|(source, count)| json!({ "source": source.to_json(), "count": count }))
                    .collect::<Vec<_>>(),
            }),
            LineageKind::Unknown => Json::Null,
        }
    }
}

impl fmt::Display for Lineage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.kind() {
            LineageKind::Known(name) => write!(f, "{}", name),
            LineageKind::Node { transformation, sources } => {
                let sources: Vec<String> = sources.iter().map(|s| s.to_string()).collect();
                write!(f, "{}({})", transformation, sources.join(", "))
            }
            LineageKind::Group(group) => write!(f, "{}", group),
            LineageKind::Unknown => write!(f, "?"),
        }
    }
}

// ------------- LineageGroup -------------
/// Contribution counts of the source lineages of an aggregate.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default, Clone)]
pub struct LineageGroup {
    sources: BTreeMap<Lineage, u64>,
}

impl LineageGroup {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn add(&mut self, lineage: &Lineage) {
        *self.sources.entry(lineage.clone()).or_insert(0) += 1;
    }
    /// Merges the counts of `other` into this group.
    pub fn merge(mut self, other: LineageGroup) -> Self {
        for (lineage, count) in other.sources {
            *self.sources.entry(lineage).or_insert(0) += count;
        }
        self
    }
    pub fn count(&self, lineage: &Lineage) -> u64 {
        self.sources.get(lineage).copied().unwrap_or(0)
    }
    pub fn total(&self) -> u64 {
        self.sources.values().sum()
    }
    pub fn len(&self) -> usize {
        self.sources.len()
    }
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
    pub fn iter(&self) -> impl Iterator<Item = (&Lineage, u64)> {
        self.sources.iter().map(|(l, c)| (l, *c))
    }
}

impl fmt::Display for LineageGroup {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let entries: Vec<String> = self.iter().map(|(l, c)| format!("{}={}", l, c)).collect();
        write!(f, "{{{}}}", entries.join(", "))
    }
}

// ------------- LineageCache -------------
enum Slot {
    Empty,
    Strong(Lineage),
    Weak(Weak<LineageKind>),
}

/// Holds the lineage computed for a transformation.
///
/// The entry may be dropped at any time, either explicitly through
/// [`LineageCache::evict`] or, under the weak policy, when the last value
/// holding the lineage goes away. The next request then recomputes it.
/// The cache takes no part in equality or hashing of its owner.
pub struct LineageCache {
    slot: RwLock<Slot>,
}

impl LineageCache {
    pub fn new() -> Self {
        Self {
            slot: RwLock::new(Slot::Empty),
        }
    }
    pub fn cached(&self) -> Option<Lineage> {
        let slot = self.slot.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        match &*slot {
            Slot::Empty => None,
            Slot::Strong(lineage) => Some(lineage.clone()),
            Slot::Weak(weak) => weak.upgrade().map(Lineage),
        }
    }
    /// Returns the cached lineage, computing and storing it when absent.
    pub fn get_or_compute(&self, label: &dyn fmt::Display, compute: impl FnOnce() -> Lineage) -> Lineage {
        if let Some(lineage) = self.cached() {
            return lineage;
        }
        debug!("Starting computing lineage for {}...", label);
        let lineage = compute();
        let mut slot = self.slot.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = match config::settings().lineage_cache {
            LineageCachePolicy::Strong => Slot::Strong(lineage.clone()),
            LineageCachePolicy::Weak => Slot::Weak(Arc::downgrade(&lineage.0)),
        };
        debug!("Finished computing lineage for {}.", label);
        lineage
    }
    pub fn evict(&self) {
        let mut slot = self.slot.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = Slot::Empty;
    }
}

impl Default for LineageCache {
    fn default() -> Self {
        Self::new()
    }
}
// a copied node starts with an empty cache
impl Clone for LineageCache {
    fn clone(&self) -> Self {
        Self::new()
    }
}
impl PartialEq for LineageCache {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}
impl Eq for LineageCache {}
impl Hash for LineageCache {
    fn hash<H: Hasher>(&self, _state: &mut H) {}
}
impl fmt::Debug for LineageCache {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "LineageCache {{ cached: {} }}", self.cached().is_some())
    }
}
