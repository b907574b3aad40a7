//! The expression tree and its evaluation.
//!
//! A [`Transformation`] is evaluated in two phases. [`Transformation::metadata`]
//! works out the shape of the result (scalar domain or dataset structure)
//! from the scope's metadata alone; [`Transformation::eval`] produces the
//! value. Datasets come back lazily: no row of a derived dataset is
//! computed before the consumer pulls it.
//!
//! Nodes compare and hash structurally, so equal sub-expressions can be
//! shared. The lineage of a node is computed on first request and kept in
//! a [`LineageCache`] that takes no part in equality.

use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::lineage::{Lineage, LineageCache};
use crate::scope::TransformationScheme;
use crate::structure::ValueMetadata;
use crate::value::{ScalarValue, Value};

mod aggregate;
mod analytic;
mod bracket;
mod offset;
mod scalar;
mod window;

pub use aggregate::AggregateTransformation;
pub use analytic::AnalyticTransformation;
pub use bracket::{BracketSelector, BracketTransformation, DatasetClause};
pub use offset::{OffsetDirection, OffsetTransformation};
pub use scalar::{BinaryOperator, UnaryOperator};
pub use window::{OrderByItem, SortDirection};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TransformationKind {
    Constant(ScalarValue),
    VarId(String),
    Unary(UnaryOperator, Box<Transformation>),
    Binary(BinaryOperator, Box<Transformation>, Box<Transformation>),
    Bracket(BracketTransformation),
    Offset(OffsetTransformation),
    Aggregate(AggregateTransformation),
    Analytic(AnalyticTransformation),
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Transformation {
    kind: TransformationKind,
    lineage: LineageCache,
}

impl Transformation {
    pub fn new(kind: TransformationKind) -> Self {
        Self {
            kind,
            lineage: LineageCache::new(),
        }
    }
    pub fn constant(value: impl Into<ScalarValue>) -> Self {
        Self::new(TransformationKind::Constant(value.into()))
    }
    pub fn var(name: impl Into<String>) -> Self {
        Self::new(TransformationKind::VarId(name.into()))
    }
    pub fn unary(operator: UnaryOperator, operand: Transformation) -> Self {
        Self::new(TransformationKind::Unary(operator, Box::new(operand)))
    }
    pub fn binary(operator: BinaryOperator, left: Transformation, right: Transformation) -> Self {
        Self::new(TransformationKind::Binary(operator, Box::new(left), Box::new(right)))
    }
    pub fn membership(operand: Transformation, component: impl Into<String>) -> Self {
        BracketTransformation::membership(operand, component).into()
    }
    pub fn clause(operand: Transformation, clause: DatasetClause) -> Self {
        BracketTransformation::clause(operand, clause).into()
    }
    pub fn kind(&self) -> &TransformationKind {
        &self.kind
    }
    pub fn is_terminal(&self) -> bool {
        matches!(self.kind, TransformationKind::Constant(_) | TransformationKind::VarId(_))
    }
    /// The direct sub-expressions of this node.
    pub fn operands(&self) -> Vec<&Transformation> {
        match &self.kind {
            TransformationKind::Constant(_) | TransformationKind::VarId(_) => Vec::new(),
            TransformationKind::Unary(_, operand) => vec![operand.as_ref()],
            TransformationKind::Binary(_, left, right) => vec![left.as_ref(), right.as_ref()],
            TransformationKind::Bracket(bracket) => {
                let mut operands = vec![bracket.operand()];
                operands.extend(bracket.clause_expression());
                operands
            }
            TransformationKind::Offset(offset) => vec![offset.operand()],
            TransformationKind::Aggregate(aggregate) => vec![aggregate.operand()],
            TransformationKind::Analytic(analytic) => vec![analytic.operand()],
        }
    }

    /// The shape of the result, worked out without touching any data.
    pub fn metadata(&self, scope: &dyn TransformationScheme) -> Result<ValueMetadata> {
        match &self.kind {
            TransformationKind::Constant(value) => Ok(ValueMetadata::Scalar(value.domain())),
            TransformationKind::VarId(name) => {
                if scope.contains(name) {
                    scope.metadata(name)
                } else {
                    let rule = scope.rule(name)?;
                    rule.expression().metadata(scope.rule_scope().as_ref())
                }
            }
            TransformationKind::Unary(op, operand) => scalar::unary_metadata(*op, operand.metadata(scope)?),
            TransformationKind::Binary(op, left, right) => {
                scalar::binary_metadata(*op, left.metadata(scope)?, right.metadata(scope)?)
            }
            TransformationKind::Bracket(bracket) => bracket.metadata(scope),
            TransformationKind::Offset(offset) => offset.metadata(scope),
            TransformationKind::Aggregate(aggregate) => aggregate.metadata(scope),
            TransformationKind::Analytic(analytic) => analytic.metadata(scope),
        }
    }

    pub fn eval(&self, scope: &dyn TransformationScheme) -> Result<Value> {
        match &self.kind {
            TransformationKind::Constant(value) => Ok(Value::Scalar(value.clone())),
            TransformationKind::VarId(name) => {
                if scope.contains(name) {
                    scope.resolve(name)
                } else {
                    let rule = scope.rule(name)?;
                    rule.expression().eval(scope.rule_scope().as_ref())
                }
            }
            TransformationKind::Unary(op, operand) => scalar::unary_eval(*op, operand.eval(scope)?, || self.label()),
            TransformationKind::Binary(op, left, right) => {
                scalar::binary_eval(*op, left.eval(scope)?, right.eval(scope)?, || self.label())
            }
            TransformationKind::Bracket(bracket) => bracket.eval(scope, self.label()),
            TransformationKind::Offset(offset) => offset.eval(scope, self.label()),
            TransformationKind::Aggregate(aggregate) => aggregate.eval(scope),
            TransformationKind::Analytic(analytic) => analytic.eval(scope, self.label()),
        }
    }

    /// Provenance of this node, computed once and then served from the cache.
    pub fn lineage(&self) -> Lineage {
        self.lineage.get_or_compute(self, || match &self.kind {
            TransformationKind::Constant(value) => Lineage::known(value.to_string()),
            TransformationKind::VarId(name) => Lineage::known(name),
            _ => Lineage::node(
                self.label(),
                self.operands().into_iter().map(Transformation::lineage).collect(),
            ),
        })
    }
    /// The lineage currently held by the cache, without computing it.
    pub fn cached_lineage(&self) -> Option<Lineage> {
        self.lineage.cached()
    }
    pub fn evict_lineage(&self) {
        self.lineage.evict();
    }

    // how rows produced by this node name it in their lineage
    fn label(&self) -> Arc<str> {
        Arc::from(self.to_string())
    }
}

impl From<BracketTransformation> for Transformation {
    fn from(bracket: BracketTransformation) -> Self {
        Self::new(TransformationKind::Bracket(bracket))
    }
}
impl From<OffsetTransformation> for Transformation {
    fn from(offset: OffsetTransformation) -> Self {
        Self::new(TransformationKind::Offset(offset))
    }
}
impl From<AggregateTransformation> for Transformation {
    fn from(aggregate: AggregateTransformation) -> Self {
        Self::new(TransformationKind::Aggregate(aggregate))
    }
}
impl From<AnalyticTransformation> for Transformation {
    fn from(analytic: AnalyticTransformation) -> Self {
        Self::new(TransformationKind::Analytic(analytic))
    }
}

impl fmt::Display for Transformation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.kind {
            TransformationKind::Constant(value) => write!(f, "{}", value),
            TransformationKind::VarId(name) => write!(f, "{}", name),
            TransformationKind::Unary(UnaryOperator::Neg, operand) => write!(f, "-{}", operand),
            TransformationKind::Unary(UnaryOperator::Not, operand) => write!(f, "not {}", operand),
            TransformationKind::Unary(op, operand) => write!(f, "{}({})", op, operand),
            TransformationKind::Binary(op, left, right) => write!(f, "({} {} {})", left, op, right),
            TransformationKind::Bracket(bracket) => write!(f, "{}", bracket),
            TransformationKind::Offset(offset) => write!(f, "{}", offset),
            TransformationKind::Aggregate(aggregate) => write!(f, "{}", aggregate),
            TransformationKind::Analytic(analytic) => write!(f, "{}", analytic),
        }
    }
}
