//! Reducers evaluated over a window of rows.
//!
//! Without an order by, every row of a partition sees the whole partition.
//! With one, a row sees the rows from the start of its partition up to
//! itself, in sort order.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, trace};

use super::Transformation;
use super::window::{OrderByItem, Window, WindowDefaults, over_clause, per_partition, render_key};
use crate::dataset::{DataPoint, DataPointBuilder, DataPointStream, DataSet, Group};
use crate::domain::Domain;
use crate::error::{Result, VtlError};
use crate::lineage::Lineage;
use crate::operators::AnalyticOperator;
use crate::scope::TransformationScheme;
use crate::structure::{DataSetMetadata, DataStructureComponent, Role, ValueMetadata};
use crate::value::{ScalarValue, Value};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct AnalyticTransformation {
    operator: AnalyticOperator,
    operand: Box<Transformation>,
    partition_by: Vec<String>,
    order_by: Vec<OrderByItem>,
}

impl AnalyticTransformation {
    pub fn new(operator: AnalyticOperator, operand: Transformation) -> Self {
        Self {
            operator,
            operand: Box::new(operand),
            partition_by: Vec::new(),
            order_by: Vec::new(),
        }
    }
    pub fn partition_by<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.partition_by = names.into_iter().map(Into::into).collect();
        self
    }
    pub fn order_by(mut self, items: impl IntoIterator<Item = OrderByItem>) -> Self {
        self.order_by = items.into_iter().collect();
        self
    }
    pub fn operator(&self) -> AnalyticOperator {
        self.operator
    }
    pub fn operand(&self) -> &Transformation {
        &self.operand
    }

    fn structure_for(&self, operand: &DataSetMetadata) -> Result<DataSetMetadata> {
        Window::resolve(operand, &self.partition_by, &self.order_by, WindowDefaults::Whole)?;
        let mut components = Vec::with_capacity(operand.len());
        for component in operand.components() {
            if component.is(Role::Measure) {
                components.push(component.with_domain(self.operator.output_domain(component.domain())?));
            } else {
                components.push(component.clone());
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

    pub(crate) fn eval(&self, scope: &dyn TransformationScheme, label: Arc<str>) -> Result<Value> {
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
        let window = Window::resolve(
            dataset.structure(),
            &self.partition_by,
            &self.order_by,
            WindowDefaults::Whole,
        )?;
        let frame = Frame {
            operator: self.operator,
            measures: dataset.structure().measures(),
            label,
        };
        Ok(Value::DataSet(DataSet::derived(
            Arc::clone(&structure),
            &dataset,
            move |upstream| {
                debug!("Started computing {} on {}", frame.operator, upstream.display_name());
                let partitions = window.partitions(upstream)?;
                let running = window.is_ordered();
                let rows = per_partition(&partitions, |group| frame.partition(group, running, &structure))?;
                debug!("Finished computing {} on {}", frame.operator, upstream.display_name());
                let stream: DataPointStream = Box::new(rows.into_iter().map(Ok));
                Ok(stream)
            },
        )))
    }
}

struct Frame {
    operator: AnalyticOperator,
    measures: Vec<DataStructureComponent>,
    label: Arc<str>,
}

impl Frame {
    fn partition(&self, group: &Group, running: bool, structure: &Arc<DataSetMetadata>) -> Result<Vec<DataPoint>> {
        trace!("Analytic invocation on partition {}", render_key(&group.key));
        let rows = &group.rows;
        let mut values: Vec<Vec<ScalarValue>> = Vec::with_capacity(self.measures.len());
        for measure in &self.measures {
            if running {
                let mut acc = self.operator.accumulator();
                let mut column = Vec::with_capacity(rows.len());
                for dp in rows {
                    acc.accumulate(self.operator.extract(dp, measure).as_ref());
                    column.push(self.operator.finish(acc.clone()));
                }
                values.push(column);
            } else {
                values.push(vec![self.operator.reduce_rows(rows, measure); rows.len()]);
            }
        }
        let mut result = Vec::with_capacity(rows.len());
        for (i, dp) in rows.iter().enumerate() {
            let mut builder = DataPointBuilder::new()
                .add_all(dp.values_with(Role::Identifier))
                .add_all(dp.values_with(Role::Attribute));
            for (measure, column) in self.measures.iter().zip(values.iter()) {
                let target = structure.require(measure.name())?;
                builder = builder.add(measure, fit(&column[i], target.domain())?);
            }
            let lineage = Lineage::node(Arc::clone(&self.label), vec![dp.lineage().clone()]);
            result.push(builder.build(lineage, structure)?);
        }
        Ok(result)
    }
}

// the NaN of an empty MIN or MAX window has no place in a non-numeric column
fn fit(value: &ScalarValue, domain: Domain) -> Result<ScalarValue> {
    match value {
        ScalarValue::Number(n) if n.is_nan() && !domain.is_assignable_from(Domain::Number) => {
            Ok(ScalarValue::Null(domain))
        }
        value => value.cast(domain),
    }
}

impl fmt::Display for AnalyticTransformation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}({}{})",
            self.operator,
            self.operand,
            over_clause(&self.partition_by, &self.order_by)
        )
    }
}
