use thiserror::Error;

use crate::domain::Domain;
use crate::structure::Role;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum VtlError {
    #[error("{operator}: expected a {expected} operand but found {found}")]
    InvalidShape {
        operator: String,
        expected: &'static str,
        found: String,
    },
    #[error("Component {name} not found in {structure}")]
    MissingComponent { name: String, structure: String },
    #[error("Component {component} used in {context} must be {expected:?}")]
    IncompatibleRole {
        context: &'static str,
        component: String,
        expected: Role,
    },
    #[error("Cannot order by {component} because the component is used in partition by")]
    PartitionOrderConflict { component: String },
    #[error("{context}: expected domain {expected} but found {found}")]
    IncompatibleDomain {
        context: String,
        expected: Domain,
        found: Domain,
    },
    #[error("Row of {alias} has {found} values but the structure has {expected} components")]
    RowLength {
        alias: String,
        expected: usize,
        found: usize,
    },
    #[error("Duplicate component {name} in structure")]
    DuplicateComponent { name: String },
    #[error("Unbound name: {name}")]
    UnboundName { name: String },
    #[error("Can't resolve the value of {name} during compilation")]
    MetadataOnly { name: String },
    #[error("Operator {operator} is not supported on {shape} operands")]
    Unsupported {
        operator: String,
        shape: &'static str,
    },
    #[error("Integer overflow in {operator} ({operands})")]
    IntegerOverflow {
        operator: &'static str,
        operands: String,
    },
    #[error("Config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, VtlError>;

impl VtlError {
    pub fn dataset_expected(operator: impl ToString, found: impl ToString) -> Self {
        Self::InvalidShape {
            operator: operator.to_string(),
            expected: "dataset",
            found: found.to_string(),
        }
    }
    pub fn scalar_expected(operator: impl ToString, found: impl ToString) -> Self {
        Self::InvalidShape {
            operator: operator.to_string(),
            expected: "scalar",
            found: found.to_string(),
        }
    }
}

// Helper conversions
impl From<::config::ConfigError> for VtlError {
    fn from(e: ::config::ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}
