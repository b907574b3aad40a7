//! Membership (`ds#comp`) and bracket clauses (`ds[...]`).

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use super::Transformation;
use crate::dataset::{DataPointBuilder, DataSet};
use crate::domain::Domain;
use crate::error::{Result, VtlError};
use crate::lineage::Lineage;
use crate::scope::{DatapointScope, THIS, ThisScope, TransformationScheme};
use crate::structure::{DataSetMetadata, ValueMetadata};
use crate::value::{ScalarValue, Value};

/// A clause applied to the operand of a bracket expression.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum DatasetClause {
    /// Rows for which the condition holds; a null condition drops the row.
    Filter(Arc<Transformation>),
    Keep(Vec<String>),
    Drop(Vec<String>),
    /// Adds or replaces a measure computed row by row.
    Calc(String, Arc<Transformation>),
    /// Any expression over `this` and the unqualified component names.
    Expression(Arc<Transformation>),
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum BracketSelector {
    Membership(String),
    Clause(DatasetClause),
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BracketTransformation {
    operand: Box<Transformation>,
    selector: BracketSelector,
}

impl BracketTransformation {
    pub fn membership(operand: Transformation, component: impl Into<String>) -> Self {
        Self {
            operand: Box::new(operand),
            selector: BracketSelector::Membership(component.into()),
        }
    }
    pub fn clause(operand: Transformation, clause: DatasetClause) -> Self {
        Self {
            operand: Box::new(operand),
            selector: BracketSelector::Clause(clause),
        }
    }
    pub fn operand(&self) -> &Transformation {
        &self.operand
    }
    pub fn selector(&self) -> &BracketSelector {
        &self.selector
    }
    pub(crate) fn clause_expression(&self) -> Option<&Transformation> {
        match &self.selector {
            BracketSelector::Clause(
                DatasetClause::Filter(e) | DatasetClause::Calc(_, e) | DatasetClause::Expression(e),
            ) => Some(e.as_ref()),
            _ => None,
        }
    }

    pub(crate) fn metadata(&self, scope: &dyn TransformationScheme) -> Result<ValueMetadata> {
        let structure = match self.operand.metadata(scope)? {
            ValueMetadata::DataSet(structure) => structure,
            ValueMetadata::Unknown => return Ok(ValueMetadata::Unknown),
            scalar => return Err(VtlError::dataset_expected(self, scalar)),
        };
        match &self.selector {
            BracketSelector::Membership(name) => Ok(ValueMetadata::DataSet(Arc::new(structure.membership(name)?))),
            BracketSelector::Clause(clause) => clause.metadata(&ThisScope::metadata_only(structure, scope)),
        }
    }

    pub(crate) fn eval(&self, scope: &dyn TransformationScheme, label: Arc<str>) -> Result<Value> {
        let dataset = match self.operand.eval(scope)? {
            Value::DataSet(dataset) => dataset,
            Value::Scalar(scalar) => return Err(VtlError::dataset_expected(self, scalar.domain())),
        };
        match &self.selector {
            BracketSelector::Membership(name) => Ok(Value::DataSet(dataset.membership(name, label)?)),
            BracketSelector::Clause(clause) => clause.eval(&ThisScope::of(dataset, scope), label),
        }
    }
}

impl DatasetClause {
    fn metadata(&self, this: &ThisScope) -> Result<ValueMetadata> {
        let structure = this.structure();
        let row = DatapointScope::metadata_only(structure, this);
        match self {
            DatasetClause::Filter(condition) => match condition.metadata(&row)? {
                ValueMetadata::Scalar(domain) if Domain::Boolean.is_assignable_from(domain) => {
                    Ok(ValueMetadata::DataSet(Arc::clone(structure)))
                }
                ValueMetadata::Scalar(domain) => Err(VtlError::IncompatibleDomain {
                    context: format!("filter condition {}", condition),
                    expected: Domain::Boolean,
                    found: domain,
                }),
                ValueMetadata::Unknown => Ok(ValueMetadata::DataSet(Arc::clone(structure))),
                dataset => Err(VtlError::scalar_expected("filter", dataset)),
            },
            DatasetClause::Keep(names) => Ok(ValueMetadata::DataSet(Arc::new(structure.keep(names)?))),
            DatasetClause::Drop(names) => Ok(ValueMetadata::DataSet(Arc::new(structure.drop_components(names)?))),
            DatasetClause::Calc(name, expression) => Ok(ValueMetadata::DataSet(Arc::new(calc_structure(
                structure,
                name,
                expression.metadata(&row)?,
            )?))),
            DatasetClause::Expression(expression) => expression.metadata(this),
        }
    }

    fn eval(&self, this: &ThisScope, label: Arc<str>) -> Result<Value> {
        let dataset = match this.resolve(THIS)? {
            Value::DataSet(dataset) => dataset,
            Value::Scalar(scalar) => return Err(VtlError::dataset_expected(THIS, scalar.domain())),
        };
        debug!("Applying {} to {}", self, dataset.display_name());
        let rules = this.rule_scope();
        match self {
            DatasetClause::Filter(condition) => {
                let condition = Arc::clone(condition);
                Ok(Value::DataSet(dataset.filter(move |dp| {
                    match condition.eval(&DatapointScope::of(dp, rules.as_ref()))? {
                        Value::Scalar(ScalarValue::Boolean(holds)) => Ok(holds),
                        Value::Scalar(ScalarValue::Null(_)) => Ok(false),
                        Value::Scalar(other) => Err(VtlError::IncompatibleDomain {
                            context: format!("filter condition {}", condition),
                            expected: Domain::Boolean,
                            found: other.domain(),
                        }),
                        Value::DataSet(_) => Err(VtlError::scalar_expected("filter", "dataset")),
                    }
                })))
            }
            DatasetClause::Keep(names) => Ok(Value::DataSet(project(&dataset, dataset.structure().keep(names)?, label))),
            DatasetClause::Drop(names) => Ok(Value::DataSet(project(
                &dataset,
                dataset.structure().drop_components(names)?,
                label,
            ))),
            DatasetClause::Calc(name, expression) => {
                let row = DatapointScope::metadata_only(dataset.structure(), this);
                let structure = calc_structure(dataset.structure(), name, expression.metadata(&row)?)?;
                let computed = structure.require(name)?.clone();
                let expression = Arc::clone(expression);
                Ok(Value::DataSet(dataset.map_rows(Arc::new(structure), move |dp, target| {
                    let value = match expression.eval(&DatapointScope::of(&dp, rules.as_ref()))? {
                        Value::Scalar(value) => value,
                        Value::DataSet(_) => return Err(VtlError::scalar_expected("calc", "dataset")),
                    };
                    DataPointBuilder::new()
                        .add_all(dp.entries())
                        .add(&computed, value)
                        .build(Lineage::node(Arc::clone(&label), vec![dp.lineage().clone()]), target)
                })))
            }
            DatasetClause::Expression(expression) => expression.eval(this),
        }
    }
}

fn calc_structure(structure: &DataSetMetadata, name: &str, computed: ValueMetadata) -> Result<DataSetMetadata> {
    let domain = match computed {
        ValueMetadata::Scalar(domain) => domain,
        ValueMetadata::Unknown => Domain::Unknown,
        dataset => return Err(VtlError::scalar_expected("calc", dataset)),
    };
    structure.with_measure(name, domain)
}

// rows narrowed to the components of `structure`
fn project(dataset: &DataSet, structure: DataSetMetadata, label: Arc<str>) -> DataSet {
    dataset.map_rows(Arc::new(structure), move |dp, target| {
        let mut builder = DataPointBuilder::new();
        for component in target.components() {
            if let Some(value) = dp.get(component) {
                builder = builder.add(component, value.clone());
            }
        }
        builder.build(Lineage::node(Arc::clone(&label), vec![dp.lineage().clone()]), target)
    })
}

impl fmt::Display for DatasetClause {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DatasetClause::Filter(condition) => write!(f, "filter {}", condition),
            DatasetClause::Keep(names) => write!(f, "keep {}", names.join(", ")),
            DatasetClause::Drop(names) => write!(f, "drop {}", names.join(", ")),
            DatasetClause::Calc(name, expression) => write!(f, "calc {} := {}", name, expression),
            DatasetClause::Expression(expression) => write!(f, "{}", expression),
        }
    }
}

impl fmt::Display for BracketTransformation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.selector {
            BracketSelector::Membership(name) => write!(f, "{}#{}", self.operand, name),
            BracketSelector::Clause(clause) => write!(f, "{}[{}]", self.operand, clause),
        }
    }
}
