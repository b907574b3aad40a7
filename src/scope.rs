//! Name resolution.
//!
//! A [`TransformationScheme`] answers two kinds of questions about a name:
//! what it would produce ([`TransformationScheme::metadata`]) and what it
//! does produce ([`TransformationScheme::resolve`]). Compile-time scopes can
//! only answer the first. Scopes nest: a row scope keeps its component names
//! to itself but hands rule lookups to its parent.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::dataset::{DataPoint, DataSet};
use crate::error::{Result, VtlError};
use crate::structure::{DataSetMetadata, NameMatcher, ValueMetadata};
use crate::value::Value;
use crate::workspace::{Statement, Workspace};

/// Reserved name of the structure enclosing a row or a bracket clause.
pub const THIS: &str = "this";

pub trait TransformationScheme: Send + Sync {
    fn contains(&self, name: &str) -> bool;
    fn metadata(&self, name: &str) -> Result<ValueMetadata>;
    fn resolve(&self, name: &str) -> Result<Value>;
    fn rule(&self, name: &str) -> Result<Arc<Statement>>;
    /// An owned handle on the scope that resolves rules, for use by lazily
    /// evaluated rows that outlive the borrowed scope chain.
    fn rule_scope(&self) -> Arc<dyn TransformationScheme>;
}

fn is_this(name: &str) -> bool {
    name.eq_ignore_ascii_case(THIS)
}

fn find<'a, T>(bindings: &'a IndexMap<String, T>, name: &str) -> Option<&'a T> {
    let matcher = NameMatcher::new(name);
    bindings.get(name).or_else(|| {
        bindings
            .iter()
            .find(|(bound, _)| matcher.matches(bound))
            .map(|(_, value)| value)
    })
}

fn workspace_rule(workspace: &dyn Workspace, name: &str) -> Result<Arc<Statement>> {
    workspace.rule(name).ok_or_else(|| VtlError::UnboundName {
        name: name.to_string(),
    })
}

// ------------- EngineScope -------------
struct Bindings {
    values: IndexMap<String, Value>,
    workspace: Arc<dyn Workspace>,
}

/// The root scope of an evaluation: named values plus the workspace rules.
///
/// Names not bound directly are looked up as rules and evaluated in this
/// scope. Cloning is cheap and shares the bindings.
#[derive(Clone)]
pub struct EngineScope {
    inner: Arc<Bindings>,
}

impl EngineScope {
    pub fn new(workspace: Arc<dyn Workspace>) -> Self {
        Self {
            inner: Arc::new(Bindings {
                values: IndexMap::new(),
                workspace,
            }),
        }
    }
    /// A copy of this scope with `name` bound to `value`.
    pub fn with_value(&self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut values = self.inner.values.clone();
        values.insert(name.into(), value.into());
        Self {
            inner: Arc::new(Bindings {
                values,
                workspace: Arc::clone(&self.inner.workspace),
            }),
        }
    }
    pub fn workspace(&self) -> &Arc<dyn Workspace> {
        &self.inner.workspace
    }
}

impl TransformationScheme for EngineScope {
    fn contains(&self, name: &str) -> bool {
        find(&self.inner.values, name).is_some() || self.inner.workspace.rule(name).is_some()
    }
    fn metadata(&self, name: &str) -> Result<ValueMetadata> {
        match find(&self.inner.values, name) {
            Some(Value::Scalar(scalar)) => Ok(ValueMetadata::Scalar(scalar.domain())),
            Some(Value::DataSet(dataset)) => Ok(ValueMetadata::DataSet(Arc::clone(dataset.structure()))),
            None => self.rule(name)?.expression().metadata(self),
        }
    }
    fn resolve(&self, name: &str) -> Result<Value> {
        match find(&self.inner.values, name) {
            Some(value) => Ok(value.clone()),
            None => self.rule(name)?.expression().eval(self),
        }
    }
    fn rule(&self, name: &str) -> Result<Arc<Statement>> {
        workspace_rule(self.inner.workspace.as_ref(), name)
    }
    fn rule_scope(&self) -> Arc<dyn TransformationScheme> {
        Arc::new(self.clone())
    }
}

// ------------- CompileScope -------------
struct Declarations {
    metadata: IndexMap<String, ValueMetadata>,
    workspace: Arc<dyn Workspace>,
}

/// A metadata-only root scope, used to type-check before any data exists.
#[derive(Clone)]
pub struct CompileScope {
    inner: Arc<Declarations>,
}

impl CompileScope {
    pub fn new(workspace: Arc<dyn Workspace>) -> Self {
        Self {
            inner: Arc::new(Declarations {
                metadata: IndexMap::new(),
                workspace,
            }),
        }
    }
    pub fn with_metadata(&self, name: impl Into<String>, metadata: ValueMetadata) -> Self {
        let mut declared = self.inner.metadata.clone();
        declared.insert(name.into(), metadata);
        Self {
            inner: Arc::new(Declarations {
                metadata: declared,
                workspace: Arc::clone(&self.inner.workspace),
            }),
        }
    }
}

impl TransformationScheme for CompileScope {
    fn contains(&self, name: &str) -> bool {
        find(&self.inner.metadata, name).is_some() || self.inner.workspace.rule(name).is_some()
    }
    fn metadata(&self, name: &str) -> Result<ValueMetadata> {
        match find(&self.inner.metadata, name) {
            Some(metadata) => Ok(metadata.clone()),
            None => self.rule(name)?.expression().metadata(self),
        }
    }
    fn resolve(&self, name: &str) -> Result<Value> {
        Err(VtlError::MetadataOnly {
            name: name.to_string(),
        })
    }
    fn rule(&self, name: &str) -> Result<Arc<Statement>> {
        workspace_rule(self.inner.workspace.as_ref(), name)
    }
    fn rule_scope(&self) -> Arc<dyn TransformationScheme> {
        Arc::new(self.clone())
    }
}

// ------------- DatapointScope -------------
/// Resolves the components of a single row.
///
/// Without a bound row only metadata questions can be answered. Component
/// names never reach the parent; rule names always do.
pub struct DatapointScope<'a> {
    datapoint: Option<&'a DataPoint>,
    structure: &'a Arc<DataSetMetadata>,
    parent: &'a dyn TransformationScheme,
}

impl<'a> DatapointScope<'a> {
    pub fn of(datapoint: &'a DataPoint, parent: &'a dyn TransformationScheme) -> Self {
        Self {
            datapoint: Some(datapoint),
            structure: datapoint.structure(),
            parent,
        }
    }
    pub fn metadata_only(structure: &'a Arc<DataSetMetadata>, parent: &'a dyn TransformationScheme) -> Self {
        Self {
            datapoint: None,
            structure,
            parent,
        }
    }
    pub fn structure(&self) -> &Arc<DataSetMetadata> {
        self.structure
    }
}

impl TransformationScheme for DatapointScope<'_> {
    fn contains(&self, name: &str) -> bool {
        is_this(name) || self.structure.component(name).is_some()
    }
    fn metadata(&self, name: &str) -> Result<ValueMetadata> {
        if is_this(name) {
            return Ok(ValueMetadata::DataSet(Arc::clone(self.structure)));
        }
        match self.structure.component(name) {
            Some(component) => Ok(ValueMetadata::Scalar(component.domain())),
            None => Err(VtlError::UnboundName {
                name: name.to_string(),
            }),
        }
    }
    fn resolve(&self, name: &str) -> Result<Value> {
        let datapoint = self.datapoint.ok_or_else(|| VtlError::MetadataOnly {
            name: name.to_string(),
        })?;
        if is_this(name) {
            let row = DataSet::from_points(Arc::clone(self.structure), vec![datapoint.clone()]);
            return Ok(Value::DataSet(row));
        }
        match datapoint.get_by_name(name) {
            Some(value) => Ok(Value::Scalar(value.clone())),
            None => Err(VtlError::UnboundName {
                name: name.to_string(),
            }),
        }
    }
    fn rule(&self, name: &str) -> Result<Arc<Statement>> {
        self.parent.rule(name)
    }
    fn rule_scope(&self) -> Arc<dyn TransformationScheme> {
        self.parent.rule_scope()
    }
}

// ------------- ThisScope -------------
/// Exposes a dataset to the clauses of a bracket expression.
///
/// `this` is the dataset itself and each of its components is reachable
/// by its unqualified name as a membership view. Other names go to the
/// parent scope.
pub struct ThisScope<'a> {
    dataset: Option<DataSet>,
    structure: Arc<DataSetMetadata>,
    parent: &'a dyn TransformationScheme,
}

impl<'a> ThisScope<'a> {
    pub fn of(dataset: DataSet, parent: &'a dyn TransformationScheme) -> Self {
        Self {
            structure: Arc::clone(dataset.structure()),
            dataset: Some(dataset),
            parent,
        }
    }
    pub fn metadata_only(structure: Arc<DataSetMetadata>, parent: &'a dyn TransformationScheme) -> Self {
        Self {
            dataset: None,
            structure,
            parent,
        }
    }
    pub fn structure(&self) -> &Arc<DataSetMetadata> {
        &self.structure
    }
}

impl TransformationScheme for ThisScope<'_> {
    fn contains(&self, name: &str) -> bool {
        is_this(name) || self.structure.component(name).is_some() || self.parent.contains(name)
    }
    fn metadata(&self, name: &str) -> Result<ValueMetadata> {
        if is_this(name) {
            return Ok(ValueMetadata::DataSet(Arc::clone(&self.structure)));
        }
        if self.structure.component(name).is_some() {
            return Ok(ValueMetadata::DataSet(Arc::new(self.structure.membership(name)?)));
        }
        self.parent.metadata(name)
    }
    fn resolve(&self, name: &str) -> Result<Value> {
        if !is_this(name) && self.structure.component(name).is_none() {
            return self.parent.resolve(name);
        }
        let dataset = self.dataset.as_ref().ok_or_else(|| VtlError::MetadataOnly {
            name: name.to_string(),
        })?;
        if is_this(name) {
            return Ok(Value::DataSet(dataset.clone()));
        }
        let label: Arc<str> = Arc::from(format!("{}#{}", dataset.display_name(), name));
        Ok(Value::DataSet(dataset.membership(name, label)?))
    }
    fn rule(&self, name: &str) -> Result<Arc<Statement>> {
        self.parent.rule(name)
    }
    fn rule_scope(&self) -> Arc<dyn TransformationScheme> {
        self.parent.rule_scope()
    }
}
