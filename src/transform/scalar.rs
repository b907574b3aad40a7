//! Unary and binary operators.
//!
//! Operators apply to scalars directly and to datasets measure by measure,
//! with a scalar on either side of a binary operator. Any null operand
//! gives a null of the result domain, except in `isnull` and where
//! three-valued logic decides `and` and `or` regardless.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use crate::dataset::{DataPointBuilder, DataSet};
use crate::domain::Domain;
use crate::error::{Result, VtlError};
use crate::lineage::Lineage;
use crate::structure::{DataSetMetadata, DataStructureComponent, Role, ValueMetadata};
use crate::value::{ScalarValue, Value};

// ------------- UnaryOperator -------------
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UnaryOperator {
    Neg,
    Not,
    IsNull,
}

impl UnaryOperator {
    pub fn name(&self) -> &'static str {
        match self {
            UnaryOperator::Neg => "-",
            UnaryOperator::Not => "not",
            UnaryOperator::IsNull => "isnull",
        }
    }
    pub fn result_domain(&self, operand: Domain) -> Result<Domain> {
        match self {
            UnaryOperator::Neg => {
                require(self.name(), Domain::Number, operand)?;
                Ok(if operand == Domain::Integer { Domain::Integer } else { numeric_or_unknown(operand) })
            }
            UnaryOperator::Not => require(self.name(), Domain::Boolean, operand).map(|_| Domain::Boolean),
            UnaryOperator::IsNull => Ok(Domain::Boolean),
        }
    }
    pub fn apply(&self, value: &ScalarValue) -> Result<ScalarValue> {
        let domain = self.result_domain(value.domain())?;
        match (self, value) {
            (UnaryOperator::IsNull, v) => Ok(ScalarValue::Boolean(v.is_null())),
            (_, ScalarValue::Null(_)) => Ok(ScalarValue::Null(domain)),
            (UnaryOperator::Neg, ScalarValue::Integer(i)) => {
                i.checked_neg().map(ScalarValue::Integer).ok_or_else(|| VtlError::IntegerOverflow {
                    operator: self.name(),
                    operands: i.to_string(),
                })
            }
            (UnaryOperator::Neg, ScalarValue::Number(n)) => Ok(ScalarValue::Number(-n)),
            (UnaryOperator::Not, ScalarValue::Boolean(b)) => Ok(ScalarValue::Boolean(!b)),
            (op, v) => Err(VtlError::IncompatibleDomain {
                context: format!("operand of {}", op.name()),
                expected: domain,
                found: v.domain(),
            }),
        }
    }
}

// ------------- BinaryOperator -------------
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOperator {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Sub => "-",
            BinaryOperator::Mul => "*",
            BinaryOperator::Div => "/",
            BinaryOperator::Eq => "=",
            BinaryOperator::Ne => "<>",
            BinaryOperator::Lt => "<",
            BinaryOperator::Le => "<=",
            BinaryOperator::Gt => ">",
            BinaryOperator::Ge => ">=",
            BinaryOperator::And => "and",
            BinaryOperator::Or => "or",
        }
    }
    fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOperator::Eq
                | BinaryOperator::Ne
                | BinaryOperator::Lt
                | BinaryOperator::Le
                | BinaryOperator::Gt
                | BinaryOperator::Ge
        )
    }
    pub fn result_domain(&self, left: Domain, right: Domain) -> Result<Domain> {
        let name = self.symbol();
        match self {
            BinaryOperator::And | BinaryOperator::Or => {
                require(name, Domain::Boolean, left)?;
                require(name, Domain::Boolean, right)?;
                Ok(Domain::Boolean)
            }
            op if op.is_comparison() => match left.common(right) {
                Some(_) => Ok(Domain::Boolean),
                None => Err(VtlError::IncompatibleDomain {
                    context: format!("right operand of {}", name),
                    expected: left,
                    found: right,
                }),
            },
            BinaryOperator::Div => {
                require(name, Domain::Number, left)?;
                require(name, Domain::Number, right)?;
                Ok(Domain::Number)
            }
            _ => {
                require(name, Domain::Number, left)?;
                require(name, Domain::Number, right)?;
                if left == Domain::Unknown || right == Domain::Unknown {
                    Ok(Domain::Unknown)
                } else if Domain::Integer.is_assignable_from(left) && Domain::Integer.is_assignable_from(right) {
                    Ok(Domain::Integer)
                } else {
                    Ok(Domain::Number)
                }
            }
        }
    }
    pub fn apply(&self, left: &ScalarValue, right: &ScalarValue) -> Result<ScalarValue> {
        let domain = self.result_domain(left.domain(), right.domain())?;
        match self {
            BinaryOperator::And => Ok(match (left.as_bool(), right.as_bool()) {
                (Some(false), _) | (_, Some(false)) => ScalarValue::Boolean(false),
                (Some(true), Some(true)) => ScalarValue::Boolean(true),
                _ => ScalarValue::Null(Domain::Boolean),
            }),
            BinaryOperator::Or => Ok(match (left.as_bool(), right.as_bool()) {
                (Some(true), _) | (_, Some(true)) => ScalarValue::Boolean(true),
                (Some(false), Some(false)) => ScalarValue::Boolean(false),
                _ => ScalarValue::Null(Domain::Boolean),
            }),
            _ if left.is_null() || right.is_null() => Ok(ScalarValue::Null(domain)),
            op if op.is_comparison() => Ok(ScalarValue::Boolean(op.compare(left, right))),
            op => op.arithmetic(left, right),
        }
    }
    fn compare(&self, left: &ScalarValue, right: &ScalarValue) -> bool {
        let ordering = match (left.as_f64(), right.as_f64()) {
            (Some(l), Some(r)) => l.partial_cmp(&r),
            _ => Some(left.cmp(right)),
        };
        match (self, ordering) {
            (BinaryOperator::Ne, None) => true,
            (_, None) => false,
            (BinaryOperator::Eq, Some(o)) => o == Ordering::Equal,
            (BinaryOperator::Ne, Some(o)) => o != Ordering::Equal,
            (BinaryOperator::Lt, Some(o)) => o == Ordering::Less,
            (BinaryOperator::Le, Some(o)) => o != Ordering::Greater,
            (BinaryOperator::Gt, Some(o)) => o == Ordering::Greater,
            (_, Some(o)) => o != Ordering::Less,
        }
    }
    // integer operands stay integers, so an overflow is an error rather than a widening
    fn arithmetic(&self, left: &ScalarValue, right: &ScalarValue) -> Result<ScalarValue> {
        if let (Some(l), Some(r), false) = (left.as_i64(), right.as_i64(), *self == BinaryOperator::Div) {
            let exact = match self {
                BinaryOperator::Add => l.checked_add(r),
                BinaryOperator::Sub => l.checked_sub(r),
                _ => l.checked_mul(r),
            };
            return exact.map(ScalarValue::Integer).ok_or_else(|| VtlError::IntegerOverflow {
                operator: self.symbol(),
                operands: format!("{}, {}", l, r),
            });
        }
        let l = left.as_f64().unwrap_or(f64::NAN);
        let r = right.as_f64().unwrap_or(f64::NAN);
        Ok(ScalarValue::Number(match self {
            BinaryOperator::Add => l + r,
            BinaryOperator::Sub => l - r,
            BinaryOperator::Mul => l * r,
            _ => l / r,
        }))
    }
}

fn require(operator: &str, expected: Domain, found: Domain) -> Result<()> {
    if expected.is_assignable_from(found) {
        Ok(())
    } else {
        Err(VtlError::IncompatibleDomain {
            context: format!("operand of {}", operator),
            expected,
            found,
        })
    }
}

fn numeric_or_unknown(domain: Domain) -> Domain {
    if domain == Domain::Unknown { Domain::Unknown } else { Domain::Number }
}

impl fmt::Display for UnaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

// ------------- Dataset forms -------------
/// Rebuilds `structure` with every measure's domain given by `domain_of`.
fn map_measures(
    structure: &DataSetMetadata,
    domain_of: impl Fn(&DataStructureComponent) -> Result<Domain>,
) -> Result<DataSetMetadata> {
    let mut components = Vec::with_capacity(structure.len());
    for component in structure.components() {
        if component.is(Role::Measure) {
            components.push(component.with_domain(domain_of(component)?));
        } else {
            components.push(component.clone());
        }
    }
    DataSetMetadata::new(components)
}

pub(crate) fn unary_metadata(op: UnaryOperator, operand: ValueMetadata) -> Result<ValueMetadata> {
    match operand {
        ValueMetadata::Unknown => Ok(ValueMetadata::Unknown),
        ValueMetadata::Scalar(domain) => Ok(ValueMetadata::Scalar(op.result_domain(domain)?)),
        ValueMetadata::DataSet(structure) => Ok(ValueMetadata::DataSet(Arc::new(map_measures(&structure, |m| {
            op.result_domain(m.domain())
        })?))),
    }
}

pub(crate) fn binary_metadata(op: BinaryOperator, left: ValueMetadata, right: ValueMetadata) -> Result<ValueMetadata> {
    match (left, right) {
        (ValueMetadata::Unknown, _) | (_, ValueMetadata::Unknown) => Ok(ValueMetadata::Unknown),
        (ValueMetadata::Scalar(l), ValueMetadata::Scalar(r)) => Ok(ValueMetadata::Scalar(op.result_domain(l, r)?)),
        (ValueMetadata::DataSet(structure), ValueMetadata::Scalar(r)) => Ok(ValueMetadata::DataSet(Arc::new(
            map_measures(&structure, |m| op.result_domain(m.domain(), r))?,
        ))),
        (ValueMetadata::Scalar(l), ValueMetadata::DataSet(structure)) => Ok(ValueMetadata::DataSet(Arc::new(
            map_measures(&structure, |m| op.result_domain(l, m.domain()))?,
        ))),
        (ValueMetadata::DataSet(_), ValueMetadata::DataSet(_)) => Err(VtlError::Unsupported {
            operator: op.symbol().to_string(),
            shape: "dataset-dataset",
        }),
    }
}

/// Applies `apply` to the measures of every row of `dataset`.
fn map_measure_values<F>(dataset: &DataSet, structure: DataSetMetadata, label: Arc<str>, apply: F) -> DataSet
where
    F: Fn(&ScalarValue) -> Result<ScalarValue> + Send + Sync + 'static,
{
    dataset.map_rows(Arc::new(structure), move |dp, target| {
        let mut builder = DataPointBuilder::new();
        for (position, component) in dp.structure().components().enumerate() {
            let value = dp.get_at(position);
            let value = if component.is(Role::Measure) { apply(value)? } else { value.clone() };
            builder = builder.add(component, value);
        }
        builder.build(Lineage::node(Arc::clone(&label), vec![dp.lineage().clone()]), target)
    })
}

pub(crate) fn unary_eval(op: UnaryOperator, operand: Value, label: impl FnOnce() -> Arc<str>) -> Result<Value> {
    match operand {
        Value::Scalar(value) => Ok(Value::Scalar(op.apply(&value)?)),
        Value::DataSet(dataset) => {
            let structure = map_measures(dataset.structure(), |m| op.result_domain(m.domain()))?;
            Ok(Value::DataSet(map_measure_values(&dataset, structure, label(), move |v| op.apply(v))))
        }
    }
}

pub(crate) fn binary_eval(
    op: BinaryOperator,
    left: Value,
    right: Value,
    label: impl FnOnce() -> Arc<str>,
) -> Result<Value> {
    match (left, right) {
        (Value::Scalar(l), Value::Scalar(r)) => Ok(Value::Scalar(op.apply(&l, &r)?)),
        (Value::DataSet(dataset), Value::Scalar(r)) => {
            let structure = map_measures(dataset.structure(), |m| op.result_domain(m.domain(), r.domain()))?;
            Ok(Value::DataSet(map_measure_values(&dataset, structure, label(), move |v| op.apply(v, &r))))
        }
        (Value::Scalar(l), Value::DataSet(dataset)) => {
            let structure = map_measures(dataset.structure(), |m| op.result_domain(l.domain(), m.domain()))?;
            Ok(Value::DataSet(map_measure_values(&dataset, structure, label(), move |v| op.apply(&l, v))))
        }
        (Value::DataSet(_), Value::DataSet(_)) => Err(VtlError::Unsupported {
            operator: op.symbol().to_string(),
            shape: "dataset-dataset",
        }),
    }
}
