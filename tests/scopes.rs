use std::sync::Arc;

use vtlcore::transform::TransformationKind;
use vtlcore::{
    BinaryOperator, CompileScope, DataSet, DataSetMetadata, DataStructureComponent, DatapointScope, Domain,
    EngineScope, MemoryWorkspace, Role, ScalarValue, Statement, Transformation, TransformationScheme, Value,
    ValueMetadata, VtlError, Workspace,
};

fn structure() -> DataSetMetadata {
    DataSetMetadata::new([
        DataStructureComponent::identifier("id", Domain::Integer),
        DataStructureComponent::measure("Amount", Domain::Integer),
        DataStructureComponent::measure("amount", Domain::Integer),
    ])
    .expect("structure")
}

fn setup() -> (EngineScope, DataSet) {
    let workspace = Arc::new(MemoryWorkspace::new());
    workspace.add_rule(Statement::new(
        "double",
        Transformation::binary(BinaryOperator::Mul, Transformation::var("x"), Transformation::constant(2i64)),
    ));
    let ds = DataSet::named(
        "ds",
        structure(),
        vec![vec![ScalarValue::from(1i64), ScalarValue::from(10i64), ScalarValue::from(20i64)]],
    )
    .expect("dataset");
    let scope = EngineScope::new(workspace).with_value("x", ScalarValue::from(21i64)).with_value("ds", ds.clone());
    (scope, ds)
}

fn scalar(value: Value) -> ScalarValue {
    value.into_scalar().expect("a scalar")
}

#[test]
fn quoting_controls_case_sensitivity() {
    let structure = structure();
    assert_eq!(structure.component("AMOUNT").map(|c| c.name()), Some("Amount"), "first case-insensitive match");
    assert_eq!(structure.component("amount").map(|c| c.name()), Some("amount"), "exact hit wins");
    assert_eq!(structure.component("'amount'").map(|c| c.name()), Some("amount"));
    assert_eq!(structure.component("'Amount'").map(|c| c.name()), Some("Amount"));
    assert!(structure.component("'AMOUNT'").is_none(), "quoted names match exactly");
}

#[test]
fn row_scope_resolves_components() {
    let (scope, ds) = setup();
    let rows = ds.collect_rows().expect("rows");
    let row = DatapointScope::of(&rows[0], &scope);
    assert_eq!(scalar(row.resolve("AMOUNT").expect("amount")), ScalarValue::Integer(10));
    assert_eq!(scalar(row.resolve("'amount'").expect("quoted amount")), ScalarValue::Integer(20));
    assert!(matches!(row.resolve("'AMOUNT'"), Err(VtlError::UnboundName { .. })));
    assert_eq!(row.metadata("id").expect("id"), ValueMetadata::Scalar(Domain::Integer));
}

#[test]
fn row_scope_exposes_this() {
    let (scope, ds) = setup();
    let rows = ds.collect_rows().expect("rows");
    let row = DatapointScope::of(&rows[0], &scope);
    assert!(row.contains("THIS"), "this is matched ignoring case");
    assert_eq!(row.metadata("this").expect("this"), ValueMetadata::DataSet(Arc::clone(ds.structure())));
    let this = row.resolve("this").expect("this").into_dataset().expect("a dataset");
    assert_eq!(this.collect_rows().expect("rows"), rows, "this is the row as a one-row dataset");
}

#[test]
fn row_scope_hands_rules_to_its_parent() {
    let (scope, ds) = setup();
    let rows = ds.collect_rows().expect("rows");
    let row = DatapointScope::of(&rows[0], &scope);
    assert!(!row.contains("x"), "engine values are not visible from a row");
    assert!(matches!(row.resolve("x"), Err(VtlError::UnboundName { .. })));
    let rule = row.rule("DOUBLE").expect("rule found through the parent");
    assert_eq!(rule.to_string(), "double := (x * 2)");
    // a rule referenced from a row is evaluated in the scope owning the rules
    let value = Transformation::var("double").eval(&row).expect("rule ok");
    assert_eq!(scalar(value), ScalarValue::Integer(42));
    assert!(matches!(row.rule("missing"), Err(VtlError::UnboundName { .. })));
}

#[test]
fn engine_scope_evaluates_rules() {
    let (scope, _) = setup();
    assert!(scope.contains("double"));
    assert_eq!(scalar(scope.resolve("double").expect("rule")), ScalarValue::Integer(42));
    assert_eq!(scope.metadata("double").expect("rule metadata"), ValueMetadata::Scalar(Domain::Integer));
    let err = Transformation::var("nowhere").eval(&scope).unwrap_err();
    assert_eq!(err, VtlError::UnboundName { name: "nowhere".to_string() });
    assert_eq!(scope.workspace().rules().len(), 1);
}

#[test]
fn compile_scope_only_answers_metadata() {
    let workspace = Arc::new(MemoryWorkspace::new());
    let compile = CompileScope::new(workspace).with_metadata("ds", ValueMetadata::DataSet(Arc::new(structure())));
    let member = Transformation::membership(Transformation::var("ds"), "'Amount'");
    let metadata = member.metadata(&compile).expect("metadata");
    let members = metadata.as_dataset().expect("a dataset structure");
    let names: Vec<&str> = members.components().map(|c| c.name()).collect();
    assert_eq!(names, vec!["id", "Amount"]);
    assert_eq!(members.require("Amount").expect("member").role(), Role::Measure);
    assert_eq!(member.eval(&compile).unwrap_err(), VtlError::MetadataOnly { name: "ds".to_string() });
}

#[test]
fn unbound_metadata_is_propagated_as_unknown() {
    let workspace = Arc::new(MemoryWorkspace::new());
    let compile = CompileScope::new(workspace).with_metadata("later", ValueMetadata::Unknown);
    let member = Transformation::membership(Transformation::var("later"), "m");
    assert_eq!(member.metadata(&compile).expect("metadata"), ValueMetadata::Unknown);
    let sum = Transformation::binary(BinaryOperator::Add, Transformation::var("later"), Transformation::constant(1i64));
    assert_eq!(sum.metadata(&compile).expect("metadata"), ValueMetadata::Unknown);
}

#[test]
fn row_scope_without_a_row() {
    let (scope, ds) = setup();
    let row = DatapointScope::metadata_only(ds.structure(), &scope);
    assert_eq!(row.metadata("Amount").expect("metadata"), ValueMetadata::Scalar(Domain::Integer));
    assert_eq!(row.resolve("Amount").unwrap_err(), VtlError::MetadataOnly { name: "Amount".to_string() });
}

#[test]
fn variables_are_terminal_nodes() {
    let var = Transformation::var("ds");
    assert!(var.is_terminal());
    assert!(matches!(var.kind(), TransformationKind::VarId(name) if name == "ds"));
    let member = Transformation::membership(var.clone(), "amount");
    assert!(!member.is_terminal());
    assert_eq!(member.operands(), vec![&var]);
}
