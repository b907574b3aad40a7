use std::cmp::Ordering;
use std::collections::HashSet;

use vtlcore::{BinaryOperator, Domain, ScalarValue, UnaryOperator, VtlError};

#[test]
fn null_is_assignable_to_every_domain() {
    for domain in [Domain::Boolean, Domain::Integer, Domain::Number, Domain::String] {
        assert!(domain.is_assignable_from(Domain::Null), "null should be assignable to {domain}");
    }
    assert!(Domain::Number.is_assignable_from(Domain::Integer), "integers widen to numbers");
    assert!(!Domain::Integer.is_assignable_from(Domain::Number), "numbers do not narrow implicitly");
    assert!(!Domain::String.is_assignable_from(Domain::Boolean));
    assert_eq!(Domain::Integer.common(Domain::Number), Some(Domain::Number));
    assert_eq!(Domain::String.common(Domain::Integer), None);
}

#[test]
fn nulls_carry_their_domain() {
    let null_integer = ScalarValue::Null(Domain::Integer);
    let null_string = ScalarValue::Null(Domain::String);
    assert_ne!(null_integer, null_string, "nulls of different domains are distinct");
    assert_eq!(null_integer, ScalarValue::null_of(Domain::Integer));
    assert_eq!(null_integer.domain(), Domain::Integer);
    assert!(null_integer.is_null());
    assert_eq!(null_integer.to_string(), "null<integer>");
    assert_eq!(ScalarValue::Null(Domain::Null).to_string(), "null");
}

#[test]
fn integer_and_number_are_distinct_values() {
    let one = ScalarValue::Integer(1);
    let one_point_zero = ScalarValue::Number(1.0);
    assert_ne!(one, one_point_zero);
    // adjacent in the order though
    assert_eq!(one.cmp(&one_point_zero), Ordering::Less);
    assert_eq!(ScalarValue::Integer(2).cmp(&ScalarValue::Number(1.5)), Ordering::Greater);
}

#[test]
fn casts_follow_the_lattice() {
    assert_eq!(
        ScalarValue::Integer(3).cast(Domain::Number).expect("widening"),
        ScalarValue::Number(3.0)
    );
    assert_eq!(
        ScalarValue::Number(4.0).cast(Domain::Integer).expect("integral number"),
        ScalarValue::Integer(4)
    );
    let err = ScalarValue::Number(4.5).cast(Domain::Integer).unwrap_err();
    assert!(
        matches!(err, VtlError::IncompatibleDomain { expected: Domain::Integer, found: Domain::Number, .. }),
        "unexpected error {err}"
    );
    assert_eq!(
        ScalarValue::Null(Domain::Integer).cast(Domain::Number).expect("null cast"),
        ScalarValue::Null(Domain::Number)
    );
    assert!(ScalarValue::from("x").cast(Domain::Integer).is_err());
}

#[test]
fn values_sort_totally() {
    let mut values = vec![
        ScalarValue::from("b"),
        ScalarValue::Number(2.5),
        ScalarValue::Null(Domain::String),
        ScalarValue::Integer(2),
        ScalarValue::Integer(3),
        ScalarValue::Boolean(true),
        ScalarValue::Null(Domain::Integer),
        ScalarValue::Number(f64::NAN),
        ScalarValue::from("a"),
    ];
    values.sort();
    let rendered: Vec<String> = values.iter().map(|v| v.to_string()).collect();
    assert_eq!(
        rendered,
        vec!["null<integer>", "null<string>", "true", "2", "2.5", "3", "NaN", "\"a\"", "\"b\""],
        "nulls first, then booleans, numbers and strings"
    );
}

#[test]
fn equal_numbers_hash_alike() {
    let mut seen = HashSet::new();
    seen.insert(ScalarValue::Number(0.0));
    seen.insert(ScalarValue::Number(-0.0));
    seen.insert(ScalarValue::Number(f64::NAN));
    seen.insert(ScalarValue::Number(f64::NAN));
    assert_eq!(seen.len(), 2, "signed zeros and NaNs collapse");
}

#[test]
fn integer_overflow_is_reported() {
    let err = BinaryOperator::Add.apply(&ScalarValue::Integer(i64::MAX), &ScalarValue::Integer(1)).unwrap_err();
    assert_eq!(
        err,
        VtlError::IntegerOverflow {
            operator: "+",
            operands: format!("{}, 1", i64::MAX)
        }
    );
    assert!(matches!(
        BinaryOperator::Mul.apply(&ScalarValue::Integer(i64::MIN), &ScalarValue::Integer(-1)),
        Err(VtlError::IntegerOverflow { operator: "*", .. })
    ));
    assert!(matches!(
        UnaryOperator::Neg.apply(&ScalarValue::Integer(i64::MIN)),
        Err(VtlError::IntegerOverflow { operator: "-", .. })
    ));
    assert_eq!(
        BinaryOperator::Add.apply(&ScalarValue::Number(i64::MAX as f64), &ScalarValue::Integer(1)),
        Ok(ScalarValue::Number(i64::MAX as f64 + 1.0)),
        "numbers are not checked"
    );
}
