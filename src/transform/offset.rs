//! LAG and LEAD.
//!
//! Each row takes the measures of the row `offset` positions before (LAG)
//! or after (LEAD) it in its sorted partition. Rows with no such neighbour
//! get the default value cast to each measure, or nulls. Identifiers and
//! attributes always come from the row itself.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, trace};

use super::Transformation;
use super::window::{OrderByItem, Window, WindowDefaults, over_clause, per_partition, render_key};
use crate::dataset::{DataPoint, DataPointBuilder, DataPointStream, DataSet, Group};
use crate::error::{Result, VtlError};
use crate::lineage::Lineage;
use crate::scope::TransformationScheme;
use crate::structure::{DataSetMetadata, Role, ValueMetadata};
use crate::value::{ScalarValue, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OffsetDirection {
    Lag,
    Lead,
}

impl fmt::Display for OffsetDirection {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            OffsetDirection::Lag => write!(f, "lag"),
            OffsetDirection::Lead => write!(f, "lead"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct OffsetTransformation {
    direction: OffsetDirection,
    operand: Box<Transformation>,
    offset: usize,
    default: Option<ScalarValue>,
    partition_by: Vec<String>,
    order_by: Vec<OrderByItem>,
}

impl OffsetTransformation {
    pub fn new(direction: OffsetDirection, operand: Transformation, offset: usize) -> Self {
        Self {
            direction,
            operand: Box::new(operand),
            offset,
            default: None,
            partition_by: Vec::new(),
            order_by: Vec::new(),
        }
    }
    pub fn lag(operand: Transformation, offset: usize) -> Self {
        Self::new(OffsetDirection::Lag, operand, offset)
    }
    pub fn lead(operand: Transformation, offset: usize) -> Self {
        Self::new(OffsetDirection::Lead, operand, offset)
    }
    pub fn with_default(mut self, default: impl Into<ScalarValue>) -> Self {
        self.default = Some(default.into());
        self
    }
    pub fn partition_by<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.partition_by = names.into_iter().map(Into::into).collect();
        self
    }
    pub fn order_by(mut self, items: impl IntoIterator<Item = OrderByItem>) -> Self {
        self.order_by = items.into_iter().collect();
        self
    }
    pub fn direction(&self) -> OffsetDirection {
        self.direction
    }
    pub fn operand(&self) -> &Transformation {
        &self.operand
    }
    pub fn offset(&self) -> usize {
        self.offset
    }
    pub fn default_value(&self) -> Option<&ScalarValue> {
        self.default.as_ref()
    }

    pub(crate) fn metadata(&self, scope: &dyn TransformationScheme) -> Result<ValueMetadata> {
        let structure = match self.operand.metadata(scope)? {
            ValueMetadata::DataSet(structure) => structure,
            ValueMetadata::Unknown => return Ok(ValueMetadata::Unknown),
            scalar => return Err(VtlError::dataset_expected(self.direction, scalar)),
        };
        Window::resolve(&structure, &self.partition_by, &self.order_by, WindowDefaults::Identifiers)?;
        if let Some(default) = &self.default {
            for measure in structure.components_with(Role::Measure) {
                if !measure.domain().is_assignable_from(default.domain()) {
                    return Err(VtlError::IncompatibleDomain {
                        context: format!("default value of {} for {}", self.direction, measure.name()),
                        expected: measure.domain(),
                        found: default.domain(),
                    });
                }
            }
        }
        Ok(ValueMetadata::DataSet(structure))
    }

    pub(crate) fn eval(&self, scope: &dyn TransformationScheme, label: Arc<str>) -> Result<Value> {
        let dataset = match self.operand.eval(scope)? {
            Value::DataSet(dataset) => dataset,
            Value::Scalar(_) => {
                return Err(VtlError::Unsupported {
                    operator: self.direction.to_string(),
                    shape: "scalar",
                });
            }
        };
        let window = Window::resolve(
            dataset.structure(),
            &self.partition_by,
            &self.order_by,
            WindowDefaults::Identifiers,
        )?;
        let shift = Shift {
            direction: self.direction,
            offset: self.offset,
            default: self.default.clone(),
            label,
        };
        let structure = Arc::clone(dataset.structure());
        Ok(Value::DataSet(DataSet::derived(
            Arc::clone(&structure),
            &dataset,
            move |upstream| {
                let alias = upstream.display_name();
                debug!("Started computing {} on {}", shift.direction, alias);
                let partitions = window.partitions(upstream)?;
                let rows = per_partition(&partitions, |group| shift.partition(group, &structure))?;
                debug!("Finished computing {} on {}", shift.direction, alias);
                let stream: DataPointStream = Box::new(rows.into_iter().map(Ok));
                Ok(stream)
            },
        )))
    }
}

// what a lazily evaluated LAG/LEAD needs once the node is out of reach
struct Shift {
    direction: OffsetDirection,
    offset: usize,
    default: Option<ScalarValue>,
    label: Arc<str>,
}

impl Shift {
    fn partition(&self, group: &Group, structure: &Arc<DataSetMetadata>) -> Result<Vec<DataPoint>> {
        trace!("Analytic invocation on partition {}", render_key(&group.key));
        let rows = &group.rows;
        let mut shifted = Vec::with_capacity(rows.len());
        for (i, dp) in rows.iter().enumerate() {
            let target = match self.direction {
                OffsetDirection::Lead => i.checked_add(self.offset).filter(|&j| j < rows.len()),
                OffsetDirection::Lag => i.checked_sub(self.offset),
            };
            let mut builder = DataPointBuilder::new()
                .add_all(dp.values_with(Role::Identifier))
                .add_all(dp.values_with(Role::Attribute));
            match target {
                Some(j) => builder = builder.add_all(rows[j].values_with(Role::Measure)),
                None => {
                    for measure in structure.components_with(Role::Measure) {
                        let value = match &self.default {
                            Some(default) => default.cast(measure.domain())?,
                            None => ScalarValue::Null(measure.domain()),
                        };
                        builder = builder.add(measure, value);
                    }
                }
            }
            let lineage = Lineage::node(Arc::clone(&self.label), vec![dp.lineage().clone()]);
            shifted.push(builder.build(lineage, structure)?);
        }
        Ok(shifted)
    }
}

impl fmt::Display for OffsetTransformation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}({}, {}", self.direction, self.operand, self.offset)?;
        if let Some(default) = &self.default {
            write!(f, ", {}", default)?;
        }
        write!(f, "{})", over_clause(&self.partition_by, &self.order_by))
    }
}
