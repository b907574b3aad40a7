//! Aggregation of a dataset, optionally grouped by some of its identifiers.

use std::fmt;
use std::sync::Arc;

use rayon::prelude::*;
use tracing::debug;

use super::Transformation;
use crate::config;
use crate::dataset::{DataPoint, DataPointBuilder, DataPointStream, DataSet, Group};
use crate::error::{Result, VtlError};
use crate::lineage::{Lineage, LineageGroup};
use crate::operators::AggregateOperator;
use crate::scope::TransformationScheme;
use crate::structure::{DataSetMetadata, DataStructureComponent, Role, ValueMetadata};
use crate::value::Value;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct AggregateTransformation {
    operator: AggregateOperator,
    operand: Box<Transformation>,
    group_by: Vec<String>,
}

impl AggregateTransformation {
    pub fn new(operator: AggregateOperator, operand: Transformation) -> Self {
        Self {
            operator,
            operand: Box::new(operand),
            group_by: Vec::new(),
        }
    }
    pub fn group_by<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.group_by = names.into_iter().map(Into::into).collect();
        self
    }
    pub fn operator(&self) -> AggregateOperator {
        self.operator
    }
    pub fn operand(&self) -> &Transformation {
        &self.operand
    }

    fn keys(&self, operand: &DataSetMetadata) -> Result<Vec<DataStructureComponent>> {
        let mut keys = Vec::with_capacity(self.group_by.len());
        for name in &self.group_by {
            let component = operand.require(name)?;
            if !component.is(Role::Identifier) {
                return Err(VtlError::IncompatibleRole {
                    context: "group by",
                    component: component.name().to_string(),
                    expected: Role::Identifier,
                });
            }
            keys.push(component.clone());
        }
        Ok(keys)
    }

    // group keys in structure order, then every measure reduced
    fn structure_for(&self, operand: &DataSetMetadata) -> Result<DataSetMetadata> {
        let keys = self.keys(operand)?;
        let mut components = Vec::new();
        for component in operand.components() {
            if keys.contains(component) {
                components.push(component.clone());
            } else if component.is(Role::Measure) {
                components.push(component.with_domain(self.operator.output_domain(component.domain())?));
            }
        }
        DataSetMetadata::new(components)
    }

    pub(crate) fn metadata(&self, scope: &dyn TransformationScheme) -> Result<ValueMetadata> {
        match self.operand.metadata(scope)? {
            ValueMetadata::DataSet(structure) => Ok(ValueMetadata::DataSet(Arc::new(self.structure_for(&structure)?))),
            ValueMetadata::Unknown => Ok(ValueMetadata::Unknown),
            scalar => Err(VtlError::dataset_expected(self.operator, scalar)),
        }
    }

    pub(crate) fn eval(&self, scope: &dyn TransformationScheme) -> Result<Value> {
        let dataset = match self.operand.eval(scope)? {
            Value::DataSet(dataset) => dataset,
            Value::Scalar(_) => {
                return Err(VtlError::Unsupported {
                    operator: self.operator.to_string(),
                    shape: "scalar",
                });
            }
        };
        let structure = Arc::new(self.structure_for(dataset.structure())?);
        let keys = self.keys(dataset.structure())?;
        let operator = self.operator;
        let measures = dataset.structure().measures();
        Ok(Value::DataSet(DataSet::derived(
            Arc::clone(&structure),
            &dataset,
            move |upstream| {
                debug!("Started aggregating {} with {}", upstream.display_name(), operator);
                let groups = if keys.is_empty() {
                    // without group by the whole dataset is one group, even when empty
                    vec![Group {
                        key: Vec::new(),
                        rows: upstream.collect_rows()?,
                    }]
                } else {
                    upstream.stream_by_keys(&keys)?
                };
                let rows: usize = groups.iter().map(|g| g.rows.len()).sum();
                let reduce = |group: &Group| reduce_group(operator, group, &keys, &measures, &structure);
                let aggregated: Vec<DataPoint> = if rows >= config::settings().parallel_threshold {
                    groups.par_iter().map(reduce).collect::<Result<_>>()?
                } else {
                    groups.iter().map(reduce).collect::<Result<_>>()?
                };
                debug!("Finished aggregating {} into {} rows", upstream.display_name(), aggregated.len());
                let stream: DataPointStream = Box::new(aggregated.into_iter().map(Ok));
                Ok(stream)
            },
        )))
    }
}

fn reduce_group(
    operator: AggregateOperator,
    group: &Group,
    keys: &[DataStructureComponent],
    measures: &[DataStructureComponent],
    structure: &Arc<DataSetMetadata>,
) -> Result<DataPoint> {
    let mut builder = DataPointBuilder::new().add_all(keys.iter().zip(group.key.iter()));
    let mut lineage: Option<LineageGroup> = None;
    for measure in measures {
        let (contributions, value) = operator.reduce_rows(&group.rows, measure);
        lineage.get_or_insert(contributions);
        builder = builder.add(measure, value);
    }
    let lineage = lineage.unwrap_or_else(|| {
        group.rows.iter().fold(LineageGroup::new(), |mut lineage, dp| {
            lineage.add(dp.lineage());
            lineage
        })
    });
    builder.build(Lineage::group(lineage), structure)
}

impl fmt::Display for AggregateTransformation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.group_by.is_empty() {
            write!(f, "{}({})", self.operator, self.operand)
        } else {
            write!(f, "{}({} group by {})", self.operator, self.operand, self.group_by.join(", "))
        }
    }
}
