use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use vtlcore::{
    DataPointBuilder, DataSet, DataSetMetadata, DataStructureComponent, Domain, Lineage, Role, ScalarValue, VtlError,
};

fn setup() -> DataSet {
    let structure = DataSetMetadata::new([
        DataStructureComponent::identifier("g", Domain::String),
        DataStructureComponent::identifier("n", Domain::Integer),
        DataStructureComponent::measure("x", Domain::Number),
    ])
    .expect("structure");
    let rows = [("b", 1, 1.0), ("a", 2, 2.0), ("b", 3, 3.0), ("a", 4, 4.0)]
        .into_iter()
        .map(|(g, n, x)| vec![ScalarValue::from(g), ScalarValue::from(n as i64), ScalarValue::from(x)])
        .collect();
    DataSet::named("points", structure, rows).expect("dataset")
}

#[test]
fn structures_reject_duplicate_names() {
    let err = DataSetMetadata::new([
        DataStructureComponent::identifier("a", Domain::Integer),
        DataStructureComponent::measure("a", Domain::Number),
    ])
    .unwrap_err();
    assert_eq!(err, VtlError::DuplicateComponent { name: "a".to_string() });
}

#[test]
fn rows_are_cast_to_their_component_domain() {
    let structure = DataSetMetadata::new([DataStructureComponent::measure("x", Domain::Number)]).expect("structure");
    let ds = DataSet::named("widened", structure, vec![vec![ScalarValue::from(3i64)]]).expect("integers widen");
    let rows = ds.collect_rows().expect("rows");
    assert_eq!(rows[0].get_by_name("x"), Some(&ScalarValue::Number(3.0)));

    let structure = DataSetMetadata::new([DataStructureComponent::measure("x", Domain::Integer)]).expect("structure");
    let err = DataSet::named("bad", structure, vec![vec![ScalarValue::from("three")]]).unwrap_err();
    assert!(matches!(err, VtlError::IncompatibleDomain { .. }), "unexpected error {err}");
}

#[test]
fn rows_must_match_the_structure_length() {
    let structure = || {
        DataSetMetadata::new([
            DataStructureComponent::identifier("id", Domain::Integer),
            DataStructureComponent::measure("x", Domain::Number),
        ])
        .expect("structure")
    };
    let long = vec![ScalarValue::from(1i64), ScalarValue::from(2.0), ScalarValue::from(3.0)];
    let err = DataSet::named("long", structure(), vec![long]).unwrap_err();
    assert_eq!(
        err,
        VtlError::RowLength {
            alias: "long".to_string(),
            expected: 2,
            found: 3
        }
    );
    assert_eq!(err.to_string(), "Row of long has 3 values but the structure has 2 components");
    let short = vec![ScalarValue::from(1i64)];
    assert!(matches!(
        DataSet::named("short", structure(), vec![short]),
        Err(VtlError::RowLength { found: 1, .. })
    ));
}

#[test]
fn builder_requires_every_component() {
    let ds = setup();
    let g = ds.structure().require("g").expect("g").clone();
    let err = DataPointBuilder::new()
        .add(&g, ScalarValue::from("a"))
        .build(Lineage::unknown(), ds.structure())
        .unwrap_err();
    assert!(matches!(err, VtlError::MissingComponent { ref name, .. } if name == "n"), "unexpected error {err}");
}

#[test]
fn derived_rows_are_computed_on_demand() {
    let ds = setup();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let filtered = ds.filter(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    });
    assert_eq!(calls.load(Ordering::SeqCst), 0, "nothing runs before a row is pulled");
    let first = filtered.stream().next().expect("a row").expect("row ok");
    assert_eq!(first.get_by_name("n"), Some(&ScalarValue::Integer(1)));
    assert_eq!(calls.load(Ordering::SeqCst), 1, "only the pulled row was tested");
    assert_eq!(filtered.collect_rows().expect("rows").len(), 4, "streams can be restarted");
}

#[test]
fn grouping_sorts_keys_and_keeps_row_order() {
    let ds = setup();
    let g = ds.structure().require("g").expect("g").clone();
    let groups = ds.stream_by_keys(&[g]).expect("groups");
    let keys: Vec<ScalarValue> = groups.iter().map(|group| group.key[0].clone()).collect();
    assert_eq!(keys, vec![ScalarValue::from("a"), ScalarValue::from("b")]);
    let ns: Vec<ScalarValue> =
        groups[1].rows.iter().map(|dp| dp.get_by_name("n").cloned().expect("n")).collect();
    assert_eq!(ns, vec![ScalarValue::Integer(1), ScalarValue::Integer(3)]);
}

#[test]
fn rows_expose_values_by_role() {
    let ds = setup();
    let rows = ds.collect_rows().expect("rows");
    let identifiers: Vec<String> =
        rows[0].values_with(Role::Identifier).iter().map(|(c, v)| format!("{}={}", c.name(), v)).collect();
    assert_eq!(identifiers, vec!["g=\"b\"", "n=1"]);
    assert_eq!(rows[0].lineage(), &Lineage::known("points"));
    assert_eq!(ds.display_name(), "points");
    assert_eq!(DataSet::from_points(Arc::clone(ds.structure()), rows).display_name(), "Unnamed data set");
}
