// used to print out readable forms of a domain
use std::fmt;

use serde::{Deserialize, Serialize};

/// The kind of value a scalar or a component holds.
///
/// Domains form a small compatibility lattice: `Null` is assignable to
/// every domain, `Integer` is assignable to `Number`, and the remaining
/// domains are disjoint. `Unknown` only appears while type inference of
/// an expression is still incomplete.
#[derive(Eq, PartialEq, PartialOrd, Ord, Hash, Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Null,
    Boolean,
    Integer,
    Number,
    String,
    Unknown,
}

impl Domain {
    pub fn name(&self) -> &'static str {
        match self {
            Domain::Null => "null",
            Domain::Boolean => "boolean",
            Domain::Integer => "integer",
            Domain::Number => "number",
            Domain::String => "string",
            Domain::Unknown => "unknown",
        }
    }
    /// True when a value of domain `other` can be used where `self` is expected.
    pub fn is_assignable_from(&self, other: Domain) -> bool {
        match (*self, other) {
            (_, Domain::Null) => true,
            (Domain::Unknown, _) | (_, Domain::Unknown) => true,
            (Domain::Number, Domain::Integer) => true,
            (expected, found) => expected == found,
        }
    }
    pub fn is_numeric(&self) -> bool {
        matches!(self, Domain::Integer | Domain::Number)
    }
    /// The narrowest domain both `self` and `other` are assignable to, if any.
    pub fn common(&self, other: Domain) -> Option<Domain> {
        if self.is_assignable_from(other) && *self != Domain::Unknown {
            Some(*self)
        } else if other.is_assignable_from(*self) {
            Some(other)
        } else {
            None
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
