//! Rows and lazily produced datasets.
//!
//! A [`DataSet`] couples a schema with a row source. Materialized datasets
//! hold their rows; derived datasets own the closure turning their shared
//! upstream dataset into rows and run it only once the first row is pulled.

use std::collections::HashMap;
use std::fmt;
use std::hash::BuildHasherDefault;
use std::sync::Arc;

use indexmap::IndexMap;
use rayon::prelude::*;
use seahash::SeaHasher;
use tracing::debug;

use crate::config;
use crate::error::{Result, VtlError};
use crate::lineage::Lineage;
use crate::structure::{DataSetMetadata, DataStructureComponent, Role};
use crate::value::ScalarValue;

pub type DataPointStream = Box<dyn Iterator<Item = Result<DataPoint>> + Send>;

pub type PartitionHasher = BuildHasherDefault<SeaHasher>;
type PartitionMap = HashMap<Vec<ScalarValue>, Vec<(usize, DataPoint)>, PartitionHasher>;

// ------------- DataPoint -------------
/// A row: one value per component of its structure, in structure order.
#[derive(Clone, Debug, PartialEq)]
pub struct DataPoint {
    structure: Arc<DataSetMetadata>,
    values: Vec<ScalarValue>,
    lineage: Lineage,
}

impl DataPoint {
    pub fn structure(&self) -> &Arc<DataSetMetadata> {
        &self.structure
    }
    pub fn lineage(&self) -> &Lineage {
        &self.lineage
    }
    pub fn get(&self, component: &DataStructureComponent) -> Option<&ScalarValue> {
        self.structure
            .position_of_name(component.name())
            .map(|i| &self.values[i])
    }
    pub fn get_at(&self, position: usize) -> &ScalarValue {
        &self.values[position]
    }
    /// Looks a value up applying the quoting rule to `name`.
    pub fn get_by_name(&self, name: &str) -> Option<&ScalarValue> {
        self.structure
            .component(name)
            .and_then(|c| self.structure.position_of_name(c.name()))
            .map(|i| &self.values[i])
    }
    /// Components paired with their values, in structure order.
    pub fn entries(&self) -> impl Iterator<Item = (&DataStructureComponent, &ScalarValue)> {
        self.structure.components().zip(self.values.iter())
    }
    pub fn values_with(&self, role: Role) -> Vec<(&DataStructureComponent, &ScalarValue)> {
        self.entries().filter(|(c, _)| c.is(role)).collect()
    }
    pub fn key_at(&self, positions: &[usize]) -> Vec<ScalarValue> {
        positions.iter().map(|&i| self.values[i].clone()).collect()
    }
}

impl fmt::Display for DataPoint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut s = String::new();
        for (c, v) in self.entries() {
            s += &format!("{}={}, ", c.name(), v);
        }
        write!(f, "{{{}}}", s.trim_end_matches(", "))
    }
}

// ------------- DataPointBuilder -------------
#[derive(Default, Debug)]
pub struct DataPointBuilder {
    values: IndexMap<String, ScalarValue>,
}

impl DataPointBuilder {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn add(mut self, component: &DataStructureComponent, value: ScalarValue) -> Self {
        self.values.insert(component.name().to_string(), value);
        self
    }
    pub fn add_all<'a>(
        mut self,
        values: impl IntoIterator<Item = (&'a DataStructureComponent, &'a ScalarValue)>,
    ) -> Self {
        for (component, value) in values {
            self.values.insert(component.name().to_string(), value.clone());
        }
        self
    }
    /// Builds a row of `structure`, casting each value to its component's domain.
    pub fn build(mut self, lineage: Lineage, structure: &Arc<DataSetMetadata>) -> Result<DataPoint> {
        let mut values = Vec::with_capacity(structure.len());
        for component in structure.components() {
            let value = self
                .values
                .swap_remove(component.name())
                .ok_or_else(|| VtlError::MissingComponent {
                    name: component.name().to_string(),
                    structure: structure.to_string(),
                })?;
            values.push(cast_for(component, value)?);
        }
        Ok(DataPoint {
            structure: Arc::clone(structure),
            values,
            lineage,
        })
    }
}

fn cast_for(component: &DataStructureComponent, value: ScalarValue) -> Result<ScalarValue> {
    if value.domain() == component.domain() {
        return Ok(value);
    }
    if !component.domain().is_assignable_from(value.domain()) {
        return Err(VtlError::IncompatibleDomain {
            context: format!("value of {}", component.name()),
            expected: component.domain(),
            found: value.domain(),
        });
    }
    value.cast(component.domain())
}

// ------------- DataSet -------------
trait RowSource: Send + Sync {
    fn rows(&self) -> DataPointStream;
}

struct Materialized(Arc<Vec<DataPoint>>);

impl RowSource for Materialized {
    fn rows(&self) -> DataPointStream {
        let rows = Arc::clone(&self.0);
        Box::new((0..rows.len()).map(move |i| Ok(rows[i].clone())))
    }
}

type Derivation = dyn Fn(&DataSet) -> Result<DataPointStream> + Send + Sync;

struct Derived {
    upstream: DataSet,
    derive: Arc<Derivation>,
}

impl RowSource for Derived {
    fn rows(&self) -> DataPointStream {
        let derive = Arc::clone(&self.derive);
        let upstream = self.upstream.clone();
        until_error(deferred(move || derive(&upstream)))
    }
}

/// Runs `start` when the first row is requested.
pub fn deferred(start: impl FnOnce() -> Result<DataPointStream> + Send + 'static) -> DataPointStream {
    let mut pending = Some(start);
    let mut inner: Option<DataPointStream> = None;
    Box::new(std::iter::from_fn(move || {
        if let Some(start) = pending.take() {
            match start() {
                Ok(stream) => inner = Some(stream),
                Err(e) => return Some(Err(e)),
            }
        }
        inner.as_mut()?.next()
    }))
}

/// Ends the stream right after the first error it yields.
pub fn until_error(stream: DataPointStream) -> DataPointStream {
    let mut stream = Some(stream);
    Box::new(std::iter::from_fn(move || {
        let next = stream.as_mut()?.next();
        if matches!(next, Some(Err(_)) | None) {
            stream = None;
        }
        next
    }))
}

/// Rows sharing the same values for a set of key components.
#[derive(Debug, Clone)]
pub struct Group {
    pub key: Vec<ScalarValue>,
    pub rows: Vec<DataPoint>,
}

#[derive(Clone)]
pub struct DataSet {
    structure: Arc<DataSetMetadata>,
    alias: Option<Arc<str>>,
    source: Arc<dyn RowSource>,
}

impl DataSet {
    /// A named dataset holding `rows`, each given as values in structure order.
    pub fn named(
        alias: &str,
        structure: DataSetMetadata,
        rows: Vec<Vec<ScalarValue>>,
    ) -> Result<DataSet> {
        let structure = Arc::new(structure);
        let lineage = Lineage::known(alias);
        let mut points = Vec::with_capacity(rows.len());
        for row in rows {
            if row.len() != structure.len() {
                return Err(VtlError::RowLength {
                    alias: alias.to_string(),
                    expected: structure.len(),
                    found: row.len(),
                });
            }
            let mut builder = DataPointBuilder::new();
            for (component, value) in structure.components().zip(row) {
                builder = builder.add(component, value);
            }
            points.push(builder.build(lineage.clone(), &structure)?);
        }
        Ok(Self {
            structure,
            alias: Some(Arc::from(alias)),
            source: Arc::new(Materialized(Arc::new(points))),
        })
    }
    pub fn from_points(structure: Arc<DataSetMetadata>, points: Vec<DataPoint>) -> DataSet {
        Self {
            structure,
            alias: None,
            source: Arc::new(Materialized(Arc::new(points))),
        }
    }
    /// A dataset whose rows `derive` computes from `upstream` on demand.
    pub fn derived<F>(structure: Arc<DataSetMetadata>, upstream: &DataSet, derive: F) -> DataSet
    where
        F: Fn(&DataSet) -> Result<DataPointStream> + Send + Sync + 'static,
    {
        Self {
            structure,
            alias: None,
            source: Arc::new(Derived {
                upstream: upstream.clone(),
                derive: Arc::new(derive),
            }),
        }
    }
    pub fn structure(&self) -> &Arc<DataSetMetadata> {
        &self.structure
    }
    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }
    pub fn display_name(&self) -> &str {
        self.alias().unwrap_or("Unnamed data set")
    }
    pub fn stream(&self) -> DataPointStream {
        self.source.rows()
    }
    pub fn collect_rows(&self) -> Result<Vec<DataPoint>> {
        self.stream().collect()
    }
    /// Narrows to the identifiers and the component `name`.
    pub fn membership(&self, name: &str, label: Arc<str>) -> Result<DataSet> {
        let structure = Arc::new(self.structure.membership(name)?);
        let member = self.structure.require(name)?.clone();
        let target = Arc::clone(&structure);
        Ok(DataSet::derived(Arc::clone(&structure), self, move |upstream| {
            let member = member.clone();
            let target = Arc::clone(&target);
            let label = Arc::clone(&label);
            let stream: DataPointStream = Box::new(upstream.stream().map(move |dp| {
                let dp = dp?;
                let value = dp.get(&member).cloned().unwrap_or(ScalarValue::Null(member.domain()));
                DataPointBuilder::new()
                    .add_all(dp.values_with(Role::Identifier))
                    .add(&member, value)
                    .build(Lineage::node(Arc::clone(&label), vec![dp.lineage().clone()]), &target)
            }));
            Ok(stream)
        }))
    }
    /// Rows for which `predicate` holds, unchanged.
    pub fn filter<P>(&self, predicate: P) -> DataSet
    where
        P: Fn(&DataPoint) -> Result<bool> + Send + Sync + 'static,
    {
        let predicate = Arc::new(predicate);
        DataSet::derived(Arc::clone(&self.structure), self, move |upstream| {
            let predicate = Arc::clone(&predicate);
            let stream: DataPointStream = Box::new(upstream.stream().filter_map(move |dp| match dp {
                Ok(dp) => match predicate(&dp) {
                    Ok(true) => Some(Ok(dp)),
                    Ok(false) => None,
                    Err(e) => Some(Err(e)),
                },
                Err(e) => Some(Err(e)),
            }));
            Ok(stream)
        })
    }
    /// Maps every row to a row of `structure`.
    pub fn map_rows<M>(&self, structure: Arc<DataSetMetadata>, mapper: M) -> DataSet
    where
        M: Fn(DataPoint, &Arc<DataSetMetadata>) -> Result<DataPoint> + Send + Sync + 'static,
    {
        let mapper = Arc::new(mapper);
        let target = Arc::clone(&structure);
        DataSet::derived(structure, self, move |upstream| {
            let mapper = Arc::clone(&mapper);
            let target = Arc::clone(&target);
            let stream: DataPointStream = Box::new(upstream.stream().map(move |dp| mapper(dp?, &target)));
            Ok(stream)
        })
    }
    /// Materializes the rows and groups them by the values of `keys`.
    ///
    /// Groups come back sorted by key; rows keep their input order within
    /// a group. Large inputs are grouped on the rayon pool.
    pub fn stream_by_keys(&self, keys: &[DataStructureComponent]) -> Result<Vec<Group>> {
        let positions = keys
            .iter()
            .map(|k| {
                self.structure.position_of_name(k.name()).ok_or_else(|| VtlError::MissingComponent {
                    name: k.name().to_string(),
                    structure: self.structure.to_string(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let rows = self.collect_rows()?;
        debug!("Grouping {} rows of {} by {} keys", rows.len(), self.display_name(), keys.len());
        let grouped: PartitionMap = if rows.len() >= config::settings().parallel_threshold {
            rows.into_par_iter()
                .enumerate()
                .fold(PartitionMap::default, |mut map, (i, dp)| {
                    map.entry(dp.key_at(&positions)).or_default().push((i, dp));
                    map
                })
                .reduce(PartitionMap::default, |mut left, right| {
                    for (key, mut rows) in right {
                        left.entry(key).or_default().append(&mut rows);
                    }
                    left
                })
        } else {
            let mut map = PartitionMap::default();
            for (i, dp) in rows.into_iter().enumerate() {
                map.entry(dp.key_at(&positions)).or_default().push((i, dp));
            }
            map
        };
        let mut groups: Vec<Group> = grouped
            .into_iter()
            .map(|(key, mut rows)| {
                rows.sort_by_key(|(i, _)| *i);
                Group {
                    key,
                    rows: rows.into_iter().map(|(_, dp)| dp).collect(),
                }
            })
            .collect();
        groups.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(groups)
    }
}

impl fmt::Debug for DataSet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("DataSet")
            .field("alias", &self.alias)
            .field("structure", &self.structure)
            .finish()
    }
}
