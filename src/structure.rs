//! Components, structures and the metadata computed for expressions.
//!
//! A [`DataSetMetadata`] is the schema of a dataset: an ordered set of
//! [`DataStructureComponent`]s, each a named and role-tagged column of a
//! given [`Domain`]. Component names are matched case-insensitively unless
//! the name is wrapped in single quotes, in which case the quotes are
//! stripped and the match is exact.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::Domain;
use crate::error::{Result, VtlError};

lazy_static! {
    static ref QUOTED: Regex = Regex::new(r"^'(.*)'$").unwrap();
}

/// How a name refers to components: exactly (quoted) or ignoring case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameMatcher<'a> {
    Exact(&'a str),
    CaseInsensitive(&'a str),
}

impl<'a> NameMatcher<'a> {
    pub fn new(name: &'a str) -> Self {
        match QUOTED.captures(name).and_then(|c| c.get(1)) {
            Some(inner) => NameMatcher::Exact(inner.as_str()),
            None => NameMatcher::CaseInsensitive(name),
        }
    }
    pub fn matches(&self, component_name: &str) -> bool {
        match self {
            NameMatcher::Exact(name) => *name == component_name,
            NameMatcher::CaseInsensitive(name) => name.eq_ignore_ascii_case(component_name),
        }
    }
}

/// Normalizes a name the way a projection stores it: quoted names keep
/// their exact case, unquoted ones are lowercased.
pub fn normalize_name(name: &str) -> String {
    match NameMatcher::new(name) {
        NameMatcher::Exact(inner) => inner.to_string(),
        NameMatcher::CaseInsensitive(name) => name.to_lowercase(),
    }
}

// ------------- Role -------------
#[derive(Eq, PartialEq, PartialOrd, Ord, Hash, Clone, Copy, Debug, Serialize, Deserialize)]
pub enum Role {
    Identifier,
    Measure,
    Attribute,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Role::Identifier => write!(f, "identifier"),
            Role::Measure => write!(f, "measure"),
            Role::Attribute => write!(f, "attribute"),
        }
    }
}

// ------------- DataStructureComponent -------------
#[derive(Eq, PartialEq, Hash, Clone, Debug)]
pub struct DataStructureComponent {
    name: Arc<str>,
    role: Role,
    domain: Domain,
}

impl DataStructureComponent {
    pub fn new(name: impl AsRef<str>, role: Role, domain: Domain) -> Self {
        Self {
            name: Arc::from(name.as_ref()),
            role,
            domain,
        }
    }
    pub fn identifier(name: impl AsRef<str>, domain: Domain) -> Self {
        Self::new(name, Role::Identifier, domain)
    }
    pub fn measure(name: impl AsRef<str>, domain: Domain) -> Self {
        Self::new(name, Role::Measure, domain)
    }
    pub fn attribute(name: impl AsRef<str>, domain: Domain) -> Self {
        Self::new(name, Role::Attribute, domain)
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn role(&self) -> Role {
        self.role
    }
    pub fn domain(&self) -> Domain {
        self.domain
    }
    pub fn is(&self, role: Role) -> bool {
        self.role == role
    }
    pub fn with_role(&self, role: Role) -> Self {
        Self {
            name: Arc::clone(&self.name),
            role,
            domain: self.domain,
        }
    }
    pub fn with_domain(&self, domain: Domain) -> Self {
        Self {
            name: Arc::clone(&self.name),
            role: self.role,
            domain,
        }
    }
}

impl fmt::Display for DataStructureComponent {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}[{}, {}]", self.name, self.role, self.domain)
    }
}

// ------------- DataSetMetadata -------------
/// The immutable, ordered schema of a dataset.
#[derive(Eq, PartialEq, Clone, Debug)]
pub struct DataSetMetadata {
    components: IndexMap<Arc<str>, DataStructureComponent>,
}

impl DataSetMetadata {
    pub fn new(components: impl IntoIterator<Item = DataStructureComponent>) -> Result<Self> {
        let mut kept = IndexMap::new();
        for component in components {
            if kept.contains_key(component.name()) {
                return Err(VtlError::DuplicateComponent {
                    name: component.name().to_string(),
                });
            }
            kept.insert(Arc::clone(&component.name), component);
        }
        Ok(Self { components: kept })
    }
    pub fn len(&self) -> usize {
        self.components.len()
    }
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
    pub fn components(&self) -> impl Iterator<Item = &DataStructureComponent> {
        self.components.values()
    }
    pub fn components_with(&self, role: Role) -> impl Iterator<Item = &DataStructureComponent> {
        self.components.values().filter(move |c| c.is(role))
    }
    pub fn identifiers(&self) -> Vec<DataStructureComponent> {
        self.components_with(Role::Identifier).cloned().collect()
    }
    pub fn measures(&self) -> Vec<DataStructureComponent> {
        self.components_with(Role::Measure).cloned().collect()
    }
    /// Position of the component with exactly this name.
    pub fn position(&self, component: &DataStructureComponent) -> Option<usize> {
        self.components
            .get_index_of(component.name())
            .filter(|&i| self.components[i] == *component)
    }
    pub fn position_of_name(&self, name: &str) -> Option<usize> {
        self.components.get_index_of(name)
    }
    /// Finds a component applying the quoting rule to `name`.
    pub fn component(&self, name: &str) -> Option<&DataStructureComponent> {
        let matcher = NameMatcher::new(name);
        // an exact hit wins over a case-insensitive one
        if let NameMatcher::CaseInsensitive(plain) = matcher {
            if let Some(component) = self.components.get(plain) {
                return Some(component);
            }
        }
        self.components.values().find(|c| matcher.matches(c.name()))
    }
    pub fn require(&self, name: &str) -> Result<&DataStructureComponent> {
        self.component(name).ok_or_else(|| VtlError::MissingComponent {
            name: name.to_string(),
            structure: self.to_string(),
        })
    }
    pub fn contains(&self, component: &DataStructureComponent) -> bool {
        self.position(component).is_some()
    }
    /// The structure of `ds#name`: all identifiers plus the named component as a measure.
    pub fn membership(&self, name: &str) -> Result<DataSetMetadata> {
        let member = self.require(name)?;
        if member.is(Role::Identifier) {
            return Err(VtlError::IncompatibleRole {
                context: "membership",
                component: member.name().to_string(),
                expected: Role::Measure,
            });
        }
        let mut components = self.identifiers();
        components.push(member.with_role(Role::Measure));
        DataSetMetadata::new(components)
    }
    /// Keeps identifiers and the named components.
    pub fn keep(&self, names: &[String]) -> Result<DataSetMetadata> {
        let mut kept = Vec::new();
        for name in names {
            let component = self.require(name)?;
            if component.is(Role::Identifier) {
                return Err(VtlError::IncompatibleRole {
                    context: "keep",
                    component: component.name().to_string(),
                    expected: Role::Measure,
                });
            }
            kept.push(component.name().to_string());
        }
        DataSetMetadata::new(
            self.components()
                .filter(|c| c.is(Role::Identifier) || kept.iter().any(|k| k == c.name()))
                .cloned(),
        )
    }
    /// Drops the named non-identifier components.
    pub fn drop_components(&self, names: &[String]) -> Result<DataSetMetadata> {
        let mut dropped = Vec::new();
        for name in names {
            let component = self.require(name)?;
            if component.is(Role::Identifier) {
                return Err(VtlError::IncompatibleRole {
                    context: "drop",
                    component: component.name().to_string(),
                    expected: Role::Measure,
                });
            }
            dropped.push(component.name().to_string());
        }
        DataSetMetadata::new(
            self.components()
                .filter(|c| !dropped.iter().any(|d| d == c.name()))
                .cloned(),
        )
    }
    /// Adds a measure called `name`, replacing the non-identifier that
    /// `name` already refers to under the quoting rule.
    pub fn with_measure(&self, name: &str, domain: Domain) -> Result<DataSetMetadata> {
        let mut components = self.components.clone();
        match self.component(name) {
            Some(existing) if existing.is(Role::Identifier) => {
                return Err(VtlError::IncompatibleRole {
                    context: "calc",
                    component: existing.name().to_string(),
                    expected: Role::Measure,
                });
            }
            // keeps the stored name and position
            Some(existing) => {
                let replaced = DataStructureComponent::measure(existing.name(), domain);
                components.insert(Arc::clone(&replaced.name), replaced);
            }
            None => {
                let added = DataStructureComponent::measure(normalize_name(name), domain);
                components.insert(Arc::clone(&added.name), added);
            }
        }
        Ok(Self { components })
    }
}

impl fmt::Display for DataSetMetadata {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut s = String::new();
        for c in self.components() {
            s += &(c.to_string() + ", ");
        }
        write!(f, "{{{}}}", s.trim_end_matches(", "))
    }
}

// ------------- ValueMetadata -------------
/// What an expression produces, known before any data is touched.
#[derive(Clone, Debug, PartialEq)]
pub enum ValueMetadata {
    Scalar(Domain),
    DataSet(Arc<DataSetMetadata>),
    /// The operand could not be typed yet.
    Unknown,
}

impl ValueMetadata {
    pub fn as_dataset(&self) -> Option<&Arc<DataSetMetadata>> {
        match self {
            ValueMetadata::DataSet(structure) => Some(structure),
            _ => None,
        }
    }
    pub fn domain(&self) -> Option<Domain> {
        match self {
            ValueMetadata::Scalar(domain) => Some(*domain),
            _ => None,
        }
    }
}

impl fmt::Display for ValueMetadata {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ValueMetadata::Scalar(domain) => write!(f, "scalar {}", domain),
            ValueMetadata::DataSet(structure) => write!(f, "dataset {}", structure),
            ValueMetadata::Unknown => write!(f, "unknown"),
        }
    }
}
