//! Named statements the engine can look up by name.
//!
//! The engine only ever reads from a [`Workspace`]; populating it is up to
//! whoever compiles the statements.

use std::fmt;
use std::sync::{Arc, RwLock};

use indexmap::IndexMap;

use crate::structure::normalize_name;
use crate::transform::Transformation;

// ------------- Statement -------------
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct Statement {
    name: String,
    expression: Arc<Transformation>,
}

impl Statement {
    pub fn new(name: impl Into<String>, expression: Transformation) -> Self {
        Self {
            name: name.into(),
            expression: Arc::new(expression),
        }
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn expression(&self) -> &Arc<Transformation> {
        &self.expression
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} := {}", self.name, self.expression)
    }
}

// ------------- Workspace -------------
pub trait Workspace: Send + Sync {
    fn rule(&self, name: &str) -> Option<Arc<Statement>>;
    fn rules(&self) -> Vec<Arc<Statement>>;
}

#[derive(Debug, Default)]
pub struct MemoryWorkspace {
    rules: RwLock<IndexMap<String, Arc<Statement>>>,
}

impl MemoryWorkspace {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn add_rule(&self, statement: Statement) -> Arc<Statement> {
        let statement = Arc::new(statement);
        let mut rules = self.rules.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        rules.insert(normalize_name(statement.name()), Arc::clone(&statement));
        statement
    }
    pub fn len(&self) -> usize {
        self.rules.read().map(|r| r.len()).unwrap_or(0)
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Workspace for MemoryWorkspace {
    fn rule(&self, name: &str) -> Option<Arc<Statement>> {
        let rules = self.rules.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        rules.get(&normalize_name(name)).cloned()
    }
    fn rules(&self) -> Vec<Arc<Statement>> {
        let rules = self.rules.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        rules.values().cloned().collect()
    }
}
