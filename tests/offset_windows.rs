use std::sync::Arc;

use vtlcore::{
    DataPoint, DataSet, DataSetMetadata, DataStructureComponent, Domain, EngineScope, Lineage, MemoryWorkspace,
    OffsetTransformation, OrderByItem, ScalarValue, Transformation, VtlError,
};

fn setup() -> EngineScope {
    // two partitions, k and j, ordered by t
    let structure = DataSetMetadata::new([
        DataStructureComponent::identifier("k", Domain::String),
        DataStructureComponent::identifier("t", Domain::Integer),
        DataStructureComponent::measure("m", Domain::Integer),
        DataStructureComponent::attribute("a", Domain::String),
    ])
    .expect("structure");
    let row = |k: &str, t: i64, m: i64, a: &str| {
        vec![ScalarValue::from(k), ScalarValue::from(t), ScalarValue::from(m), ScalarValue::from(a)]
    };
    let ds = DataSet::named(
        "ds",
        structure,
        vec![
            row("k", 2, 20, "y"),
            row("j", 1, 100, "p"),
            row("k", 1, 10, "x"),
            row("k", 3, 30, "z"),
            row("j", 2, 200, "q"),
        ],
    )
    .expect("dataset");
    EngineScope::new(Arc::new(MemoryWorkspace::new())).with_value("ds", ds)
}

fn evaluate(scope: &EngineScope, offset: OffsetTransformation) -> vtlcore::Result<Vec<DataPoint>> {
    let transformation: Transformation = offset.into();
    let value = transformation.eval(scope)?;
    value.into_dataset().expect("a dataset").collect_rows()
}

fn find<'a>(rows: &'a [DataPoint], k: &str, t: i64) -> &'a DataPoint {
    rows.iter()
        .find(|dp| {
            dp.get_by_name("k") == Some(&ScalarValue::from(k)) && dp.get_by_name("t") == Some(&ScalarValue::from(t))
        })
        .unwrap_or_else(|| panic!("no row for ({k}, {t})"))
}

fn lead_by_t(offset: usize) -> OffsetTransformation {
    OffsetTransformation::lead(Transformation::var("ds"), offset)
        .partition_by(["k"])
        .order_by([OrderByItem::asc("t")])
}

#[test]
fn lead_takes_the_next_row_in_partition() {
    let scope = setup();
    let rows = evaluate(&scope, lead_by_t(1)).expect("lead ok");
    assert_eq!(rows.len(), 5, "one output row per input row");
    assert_eq!(find(&rows, "k", 1).get_by_name("m"), Some(&ScalarValue::Integer(20)));
    assert_eq!(find(&rows, "k", 2).get_by_name("m"), Some(&ScalarValue::Integer(30)));
    assert_eq!(
        find(&rows, "k", 3).get_by_name("m"),
        Some(&ScalarValue::Null(Domain::Integer)),
        "last row of a partition has no successor"
    );
    assert_eq!(find(&rows, "j", 1).get_by_name("m"), Some(&ScalarValue::Integer(200)));
    // partitions come out sorted by key, rows by t
    let order: Vec<String> = rows.iter().map(|dp| format!("{}", dp.get_by_name("t").expect("t"))).collect();
    assert_eq!(order, vec!["1", "2", "1", "2", "3"]);
}

#[test]
fn identifiers_and_attributes_come_from_the_row_itself() {
    let scope = setup();
    let rows = evaluate(&scope, lead_by_t(1)).expect("lead ok");
    assert_eq!(find(&rows, "k", 1).get_by_name("a"), Some(&ScalarValue::from("x")));
    assert_eq!(find(&rows, "k", 3).get_by_name("a"), Some(&ScalarValue::from("z")));
}

#[test]
fn boundary_rows_take_the_default() {
    let scope = setup();
    let rows = evaluate(&scope, lead_by_t(1).with_default(0i64)).expect("lead ok");
    assert_eq!(find(&rows, "k", 3).get_by_name("m"), Some(&ScalarValue::Integer(0)));
    assert_eq!(find(&rows, "j", 2).get_by_name("m"), Some(&ScalarValue::Integer(0)));

    let lag = OffsetTransformation::lag(Transformation::var("ds"), 2)
        .with_default(-1i64)
        .partition_by(["k"])
        .order_by([OrderByItem::asc("t")]);
    let rows = evaluate(&scope, lag).expect("lag ok");
    assert_eq!(find(&rows, "k", 1).get_by_name("m"), Some(&ScalarValue::Integer(-1)));
    assert_eq!(find(&rows, "k", 2).get_by_name("m"), Some(&ScalarValue::Integer(-1)));
    assert_eq!(find(&rows, "k", 3).get_by_name("m"), Some(&ScalarValue::Integer(10)));
}

#[test]
fn lag_takes_the_previous_row() {
    let scope = setup();
    let lag = OffsetTransformation::lag(Transformation::var("ds"), 1)
        .partition_by(["k"])
        .order_by([OrderByItem::asc("t")]);
    let rows = evaluate(&scope, lag).expect("lag ok");
    assert_eq!(find(&rows, "k", 1).get_by_name("m"), Some(&ScalarValue::Null(Domain::Integer)));
    assert_eq!(find(&rows, "k", 2).get_by_name("m"), Some(&ScalarValue::Integer(10)));
    assert_eq!(find(&rows, "j", 2).get_by_name("m"), Some(&ScalarValue::Integer(100)));
}

#[test]
fn descending_order_reverses_neighbours() {
    let scope = setup();
    let lead = OffsetTransformation::lead(Transformation::var("ds"), 1)
        .partition_by(["k"])
        .order_by([OrderByItem::desc("t")]);
    let rows = evaluate(&scope, lead).expect("lead ok");
    assert_eq!(find(&rows, "k", 3).get_by_name("m"), Some(&ScalarValue::Integer(20)));
    assert_eq!(find(&rows, "k", 1).get_by_name("m"), Some(&ScalarValue::Null(Domain::Integer)));
}

#[test]
fn defaults_order_by_every_identifier() {
    let scope = setup();
    // no partition left once every identifier orders the rows
    let rows = evaluate(&scope, OffsetTransformation::lead(Transformation::var("ds"), 1)).expect("lead ok");
    assert_eq!(find(&rows, "j", 2).get_by_name("m"), Some(&ScalarValue::Integer(10)), "j < k, so (j, 2) precedes (k, 1)");
    assert_eq!(find(&rows, "k", 3).get_by_name("m"), Some(&ScalarValue::Null(Domain::Integer)));
}

#[test]
fn default_is_cast_to_number_measures() {
    let structure = DataSetMetadata::new([
        DataStructureComponent::identifier("t", Domain::Integer),
        DataStructureComponent::measure("x", Domain::Number),
    ])
    .expect("structure");
    let ds = DataSet::named(
        "series",
        structure,
        vec![vec![ScalarValue::from(1i64), ScalarValue::from(0.5)], vec![ScalarValue::from(2i64), ScalarValue::from(1.5)]],
    )
    .expect("dataset");
    let scope = EngineScope::new(Arc::new(MemoryWorkspace::new())).with_value("series", ds);
    let lag: Transformation = OffsetTransformation::lag(Transformation::var("series"), 1).with_default(7i64).into();
    let rows = lag.eval(&scope).expect("lag ok").into_dataset().expect("dataset").collect_rows().expect("rows");
    assert_eq!(rows[0].get_by_name("x"), Some(&ScalarValue::Number(7.0)));
    assert_eq!(rows[1].get_by_name("x"), Some(&ScalarValue::Number(0.5)));
}

#[test]
fn partition_and_order_must_not_overlap() {
    let scope = setup();
    let conflicting = OffsetTransformation::lead(Transformation::var("ds"), 1)
        .partition_by(["t"])
        .order_by([OrderByItem::asc("t")]);
    let transformation: Transformation = conflicting.into();
    let err = transformation.metadata(&scope).unwrap_err();
    assert_eq!(err, VtlError::PartitionOrderConflict { component: "t".to_string() });
    assert_eq!(err.to_string(), "Cannot order by t because the component is used in partition by");
    assert!(transformation.eval(&scope).is_err(), "eval checks the window too");
}

#[test]
fn partition_by_requires_identifiers() {
    let scope = setup();
    let by_measure = OffsetTransformation::lag(Transformation::var("ds"), 1).partition_by(["m"]);
    let err = evaluate(&scope, by_measure).unwrap_err();
    assert!(
        matches!(&err, VtlError::IncompatibleRole { context: "partition by", component, .. } if component == "m"),
        "unexpected error {err}"
    );
    let missing = OffsetTransformation::lag(Transformation::var("ds"), 1).order_by([OrderByItem::asc("zz")]);
    let err = evaluate(&scope, missing).unwrap_err();
    assert!(matches!(err, VtlError::MissingComponent { .. }), "unexpected error {err}");
}

#[test]
fn incompatible_default_is_rejected() {
    let scope = setup();
    let lead: Transformation = lead_by_t(1).with_default("none").into();
    let err = lead.metadata(&scope).unwrap_err();
    assert!(matches!(err, VtlError::IncompatibleDomain { expected: Domain::Integer, .. }), "unexpected error {err}");
}

#[test]
fn scalar_operands_are_rejected() {
    let scope = setup();
    let lag: Transformation = OffsetTransformation::lag(Transformation::constant(1i64), 1).into();
    assert!(matches!(lag.metadata(&scope), Err(VtlError::InvalidShape { .. })));
    assert!(matches!(lag.eval(&scope), Err(VtlError::Unsupported { shape: "scalar", .. })));
}

#[test]
fn ties_keep_input_order_across_runs() {
    let structure = DataSetMetadata::new([
        DataStructureComponent::identifier("id", Domain::Integer),
        DataStructureComponent::identifier("g", Domain::String),
        DataStructureComponent::measure("rank", Domain::Integer),
        DataStructureComponent::measure("v", Domain::Integer),
    ])
    .expect("structure");
    let row = |id: i64, rank: i64, v: i64| {
        vec![ScalarValue::from(id), ScalarValue::from("a"), ScalarValue::from(rank), ScalarValue::from(v)]
    };
    let ds = DataSet::named("ties", structure, vec![row(1, 5, 100), row(2, 5, 200), row(3, 1, 300)])
        .expect("dataset");
    let scope = EngineScope::new(Arc::new(MemoryWorkspace::new())).with_value("ties", ds);
    let lead: Transformation = OffsetTransformation::lead(Transformation::var("ties"), 1)
        .partition_by(["g"])
        .order_by([OrderByItem::asc("rank")])
        .into();
    let run = || -> Vec<(ScalarValue, ScalarValue)> {
        lead.eval(&scope)
            .expect("lead ok")
            .into_dataset()
            .expect("dataset")
            .collect_rows()
            .expect("rows")
            .iter()
            .map(|dp| (dp.get_by_name("id").cloned().expect("id"), dp.get_by_name("v").cloned().expect("v")))
            .collect()
    };
    let first = run();
    assert_eq!(
        first,
        vec![
            (ScalarValue::Integer(3), ScalarValue::Integer(100)),
            (ScalarValue::Integer(1), ScalarValue::Integer(200)),
            (ScalarValue::Integer(2), ScalarValue::Null(Domain::Integer)),
        ],
        "equal ranks keep their input order"
    );
    assert_eq!(run(), first, "evaluation is deterministic");
}

#[test]
fn rows_record_the_offset_in_their_lineage() {
    let scope = setup();
    let lead = lead_by_t(1).with_default(0i64);
    assert_eq!(lead.to_string(), "lead(ds, 1, 0 over (partition by k order by t asc))");
    let rows = evaluate(&scope, lead.clone()).expect("lead ok");
    let expected = Lineage::node(lead.to_string(), vec![Lineage::known("ds")]);
    assert!(rows.iter().all(|dp| *dp.lineage() == expected), "every row derives from ds");
}
