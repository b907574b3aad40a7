// custom made ordering for scalar values
use std::cmp::Ordering;
// used to print out readable forms of a value
use std::fmt;
// used to indicate that values need to be hashable
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::{Serialize, Serializer};

use crate::dataset::DataSet;
use crate::domain::Domain;
use crate::error::{Result, VtlError};

// ------------- ScalarValue -------------
/// An immutable value of a single domain.
///
/// Nulls are tagged with the domain they stand in for, so a null integer
/// and a null string are different values. Equality is domain based:
/// `Integer(1)` and `Number(1.0)` are distinct, although they sort next
/// to each other.
#[derive(Clone, Debug)]
pub enum ScalarValue {
    Integer(i64),
    Number(f64),
    String(Arc<str>),
    Boolean(bool),
    Null(Domain),
}

impl ScalarValue {
    pub fn string(s: impl AsRef<str>) -> Self {
        Self::String(Arc::from(s.as_ref()))
    }
    pub fn null_of(domain: Domain) -> Self {
        Self::Null(domain)
    }
    pub fn domain(&self) -> Domain {
        match self {
            ScalarValue::Integer(_) => Domain::Integer,
            ScalarValue::Number(_) => Domain::Number,
            ScalarValue::String(_) => Domain::String,
            ScalarValue::Boolean(_) => Domain::Boolean,
            ScalarValue::Null(domain) => *domain,
        }
    }
    pub fn is_null(&self) -> bool {
        matches!(self, ScalarValue::Null(_))
    }
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ScalarValue::Integer(i) => Some(*i as f64),
            ScalarValue::Number(n) => Some(*n),
            _ => None,
        }
    }
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ScalarValue::Integer(i) => Some(*i),
            _ => None,
        }
    }
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ScalarValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ScalarValue::String(s) => Some(s),
            _ => None,
        }
    }
    /// Converts this value to `domain`, following the assignability lattice.
    ///
    /// Integers widen to numbers; a number narrows to an integer only when it
    /// has no fractional part. Any null becomes a null of the target domain.
    pub fn cast(&self, domain: Domain) -> Result<ScalarValue> {
        match (self, domain) {
            (ScalarValue::Null(_), Domain::Unknown) => Ok(self.clone()),
            (ScalarValue::Null(_), target) => Ok(ScalarValue::Null(target)),
            (_, Domain::Unknown) => Ok(self.clone()),
            (value, target) if value.domain() == target => Ok(self.clone()),
            (ScalarValue::Integer(i), Domain::Number) => Ok(ScalarValue::Number(*i as f64)),
            (ScalarValue::Number(n), Domain::Integer) if n.is_finite() && n.fract() == 0.0 => {
                Ok(ScalarValue::Integer(*n as i64))
            }
            (value, target) => Err(VtlError::IncompatibleDomain {
                context: format!("cast of {}", value),
                expected: target,
                found: value.domain(),
            }),
        }
    }
    // position of a domain when values of unrelated domains are compared
    fn rank(&self) -> u8 {
        match self {
            ScalarValue::Null(_) => 0,
            ScalarValue::Boolean(_) => 1,
            ScalarValue::Integer(_) | ScalarValue::Number(_) => 2,
            ScalarValue::String(_) => 3,
        }
    }
}

// NaN sorts after every other number and equals itself
fn compare_f64(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

impl Ord for ScalarValue {
    fn cmp(&self, other: &Self) -> Ordering {
        use ScalarValue::*;
        match (self, other) {
            (Null(a), Null(b)) => a.cmp(b),
            (Integer(a), Integer(b)) => a.cmp(b),
            (Number(a), Number(b)) => compare_f64(*a, *b),
            (Integer(a), Number(b)) => compare_f64(*a as f64, *b).then(Ordering::Less),
            (Number(a), Integer(b)) => compare_f64(*a, *b as f64).then(Ordering::Greater),
            (String(a), String(b)) => a.cmp(b),
            (Boolean(a), Boolean(b)) => a.cmp(b),
            (a, b) => a.rank().cmp(&b.rank()),
        }
    }
}
impl PartialOrd for ScalarValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl PartialEq for ScalarValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for ScalarValue {}
impl Hash for ScalarValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            ScalarValue::Integer(i) => i.hash(state),
            ScalarValue::Number(n) => {
                // -0.0 == 0.0 and all NaNs are equal, so both must hash alike
                let canonical = if n.is_nan() {
                    f64::NAN
                } else if *n == 0.0 {
                    0.0
                } else {
                    *n
                };
                canonical.to_bits().hash(state)
            }
            ScalarValue::String(s) => s.hash(state),
            ScalarValue::Boolean(b) => b.hash(state),
            ScalarValue::Null(domain) => domain.hash(state),
        }
    }
}
impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ScalarValue::Integer(i) => write!(f, "{}", i),
            ScalarValue::Number(n) => write!(f, "{}", n),
            ScalarValue::String(s) => write!(f, "\"{}\"", s),
            ScalarValue::Boolean(b) => write!(f, "{}", b),
            ScalarValue::Null(Domain::Null) => write!(f, "null"),
            ScalarValue::Null(domain) => write!(f, "null<{}>", domain),
        }
    }
}
impl Serialize for ScalarValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            ScalarValue::Integer(i) => serializer.serialize_i64(*i),
            ScalarValue::Number(n) => serializer.serialize_f64(*n),
            ScalarValue::String(s) => serializer.serialize_str(s),
            ScalarValue::Boolean(b) => serializer.serialize_bool(*b),
            ScalarValue::Null(_) => serializer.serialize_unit(),
        }
    }
}
impl From<i64> for ScalarValue {
    fn from(i: i64) -> Self {
        ScalarValue::Integer(i)
    }
}
impl From<f64> for ScalarValue {
    fn from(n: f64) -> Self {
        ScalarValue::Number(n)
    }
}
impl From<bool> for ScalarValue {
    fn from(b: bool) -> Self {
        ScalarValue::Boolean(b)
    }
}
impl From<&str> for ScalarValue {
    fn from(s: &str) -> Self {
        ScalarValue::string(s)
    }
}

// ------------- Value -------------
/// The result of evaluating a transformation: either a scalar or a dataset.
#[derive(Clone, Debug)]
pub enum Value {
    Scalar(ScalarValue),
    DataSet(DataSet),
}

impl Value {
    pub fn into_scalar(self) -> Option<ScalarValue> {
        match self {
            Value::Scalar(scalar) => Some(scalar),
            Value::DataSet(_) => None,
        }
    }
    pub fn into_dataset(self) -> Option<DataSet> {
        match self {
            Value::DataSet(dataset) => Some(dataset),
            Value::Scalar(_) => None,
        }
    }
}
impl From<ScalarValue> for Value {
    fn from(scalar: ScalarValue) -> Self {
        Value::Scalar(scalar)
    }
}
impl From<DataSet> for Value {
    fn from(dataset: DataSet) -> Self {
        Value::DataSet(dataset)
    }
}
