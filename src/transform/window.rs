//! Partitioning and ordering shared by the windowed operators.

use std::cmp::Ordering;
use std::fmt;

use rayon::prelude::*;
use tracing::debug;

use crate::config;
use crate::dataset::{DataPoint, DataSet, Group};
use crate::error::{Result, VtlError};
use crate::structure::{DataSetMetadata, DataStructureComponent, Role};
use crate::value::ScalarValue;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct OrderByItem {
    name: String,
    direction: SortDirection,
}

impl OrderByItem {
    pub fn new(name: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            name: name.into(),
            direction,
        }
    }
    pub fn asc(name: impl Into<String>) -> Self {
        Self::new(name, SortDirection::Asc)
    }
    pub fn desc(name: impl Into<String>) -> Self {
        Self::new(name, SortDirection::Desc)
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn direction(&self) -> SortDirection {
        self.direction
    }
}

impl fmt::Display for OrderByItem {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.direction {
            SortDirection::Asc => write!(f, "{} asc", self.name),
            SortDirection::Desc => write!(f, "{} desc", self.name),
        }
    }
}

/// What a window uses when partition by or order by is left out.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum WindowDefaults {
    /// Order by every identifier ascending, partition by the identifiers left.
    Identifiers,
    /// One partition in input order.
    Whole,
}

/// A resolved window: partition keys and sort keys.
#[derive(Debug)]
pub(crate) struct Window {
    partition: Vec<DataStructureComponent>,
    ordering: Vec<(usize, SortDirection)>,
}

impl Window {
    /// Checks partition by and order by against `structure` and fills in the defaults.
    pub(crate) fn resolve(
        structure: &DataSetMetadata,
        partition_by: &[String],
        order_by: &[OrderByItem],
        defaults: WindowDefaults,
    ) -> Result<Window> {
        let mut ordering = Vec::with_capacity(order_by.len());
        for item in order_by {
            ordering.push((structure.require(item.name())?.clone(), item.direction()));
        }
        let mut partition = Vec::with_capacity(partition_by.len());
        for name in partition_by {
            let component = structure.require(name)?;
            if !component.is(Role::Identifier) {
                return Err(VtlError::IncompatibleRole {
                    context: "partition by",
                    component: component.name().to_string(),
                    expected: Role::Identifier,
                });
            }
            if ordering.iter().any(|(c, _)| c == component) {
                return Err(VtlError::PartitionOrderConflict {
                    component: component.name().to_string(),
                });
            }
            partition.push(component.clone());
        }
        if defaults == WindowDefaults::Identifiers {
            if ordering.is_empty() {
                ordering = structure
                    .identifiers()
                    .into_iter()
                    .map(|c| (c, SortDirection::Asc))
                    .collect();
            }
            if partition.is_empty() {
                partition = structure
                    .identifiers()
                    .into_iter()
                    .filter(|c| !ordering.iter().any(|(o, _)| o == c))
                    .collect();
            }
        }
        let ordering = ordering
            .into_iter()
            .filter_map(|(c, direction)| structure.position(&c).map(|p| (p, direction)))
            .collect();
        Ok(Window { partition, ordering })
    }
    pub(crate) fn is_ordered(&self) -> bool {
        !self.ordering.is_empty()
    }
    pub(crate) fn compare(&self, a: &DataPoint, b: &DataPoint) -> Ordering {
        for &(position, direction) in &self.ordering {
            let order = a.get_at(position).cmp(b.get_at(position));
            if order != Ordering::Equal {
                return match direction {
                    SortDirection::Asc => order,
                    SortDirection::Desc => order.reverse(),
                };
            }
        }
        Ordering::Equal
    }
    /// Groups the rows of `dataset` into partitions sorted by the window's order.
    ///
    /// Sorting is stable, so rows with equal sort keys keep their input order.
    pub(crate) fn partitions(&self, dataset: &DataSet) -> Result<Vec<Group>> {
        let mut groups = dataset.stream_by_keys(&self.partition)?;
        if !self.is_ordered() {
            return Ok(groups);
        }
        let rows: usize = groups.iter().map(|g| g.rows.len()).sum();
        debug!("Started sorting {}", dataset.display_name());
        if rows >= config::settings().parallel_threshold {
            groups
                .par_iter_mut()
                .for_each(|g| g.rows.sort_by(|a, b| self.compare(a, b)));
        } else {
            for g in groups.iter_mut() {
                g.rows.sort_by(|a, b| self.compare(a, b));
            }
        }
        debug!("Finished sorting {}", dataset.display_name());
        Ok(groups)
    }
}

/// Renders ` over (partition by ... order by ...)`.
pub(crate) fn over_clause(partition_by: &[String], order_by: &[OrderByItem]) -> String {
    let mut clause = Vec::new();
    if !partition_by.is_empty() {
        clause.push(format!("partition by {}", partition_by.join(", ")));
    }
    if !order_by.is_empty() {
        let items: Vec<String> = order_by.iter().map(|o| o.to_string()).collect();
        clause.push(format!("order by {}", items.join(", ")));
    }
    format!(" over ({})", clause.join(" "))
}

/// Processes every partition, on the rayon pool for large inputs, keeping partition order.
pub(crate) fn per_partition<F>(groups: &[Group], process: F) -> Result<Vec<DataPoint>>
where
    F: Fn(&Group) -> Result<Vec<DataPoint>> + Send + Sync,
{
    let rows: usize = groups.iter().map(|g| g.rows.len()).sum();
    let processed: Vec<Vec<DataPoint>> = if rows >= config::settings().parallel_threshold {
        groups.par_iter().map(&process).collect::<Result<_>>()?
    } else {
        groups.iter().map(&process).collect::<Result<_>>()?
    };
    Ok(processed.into_iter().flatten().collect())
}

pub(crate) fn render_key(key: &[ScalarValue]) -> String {
    key.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(", ")
}
