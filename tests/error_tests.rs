//! Integration tests for script errors and their reporting

mod common;
use common::run_js;
use spreadcall::{messages, Error, ErrorKind};

#[test]
fn test_assert_eq_failure_reports_both_operands() {
    let err = run_js("function check() { assertEq(1 + 1, 3, 'math'); } check();").unwrap_err();
    assert!(err.is_assertion_failure());
    match &err {
        Error::AssertionError {
            actual,
            expected,
            message,
            stack_trace,
        } => {
            assert_eq!(actual, "2");
            assert_eq!(expected, "3");
            assert_eq!(message.as_deref(), Some("math"));
            assert!(!stack_trace.is_empty());
        }
        other => panic!("unexpected error: {:?}", other),
    }
    let text = err.to_string();
    assert!(text.starts_with("AssertionError: got 2, expected 3: math"));
    assert!(text.contains("at check"));
}

#[test]
fn test_assert_eq_uses_same_value() {
    assert!(run_js("assertEq(NaN, NaN);").is_ok());
    assert!(run_js("assertEq(0, -0);").unwrap_err().is_assertion_failure());
    assert!(run_js("assertEq('1', 1);").unwrap_err().is_assertion_failure());
}

#[test]
fn test_spread_of_non_iterable() {
    let err = run_js("function f() {} var n = 5; f(...n);").unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::TypeError));
    assert!(err.to_string().contains(&messages::not_iterable("n")));
}

#[test]
fn test_iterator_method_returning_primitive() {
    let err = run_js(
        r#"
        var o = {};
        o[Symbol.iterator] = function() { return 1; };
        [...o];
        "#,
    )
    .unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::TypeError));
    assert!(err.to_string().contains(messages::ITERATOR_NOT_OBJECT));
}

#[test]
fn test_undefined_variable() {
    let err = run_js("function f() { return missing + 1; } f();").unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::ReferenceError));
    let text = err.to_string();
    assert!(text.contains("missing is not defined"));
    assert!(text.contains("at f"));
}

#[test]
fn test_runaway_recursion() {
    let err = run_js("function down(n) { return down(n + 1); } down(0);").unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::RangeError));
    assert!(err.to_string().contains(messages::MAXIMUM_CALL_STACK));
}

#[test]
fn test_syntax_error_carries_source_context() {
    let err = run_js("var a = 1;\nvar b = ;\n").unwrap_err();
    match &err {
        Error::ParseError {
            location,
            source_context,
            ..
        } => {
            assert_eq!(location.line, 2);
            assert!(source_context.contains("var b = ;"));
            assert!(source_context.contains('^'));
        }
        other => panic!("expected a parse error, got {:?}", other),
    }
    assert!(err.to_string().starts_with("SyntaxError:"));
}

#[test]
fn test_calling_a_non_function() {
    let err = run_js("var x = 1; x();").unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::TypeError));
    assert!(err.to_string().contains(messages::NOT_A_FUNCTION));

    let err = run_js("var o = {}; o.nope(1, 2);").unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::TypeError));
}

#[test]
fn test_property_read_on_nullish() {
    let err = run_js("var n = null; n.x;").unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::TypeError));
    assert!(err.to_string().contains("Cannot read property 'x' of null"));

    let err = run_js("undefined.y = 1;").unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::TypeError));
}

#[test]
fn test_runtime_survives_script_error() {
    let mut runtime = spreadcall::Runtime::new();
    runtime.eval("var kept = 3;").unwrap();
    assert!(runtime.eval("kept.call.boom;").is_err());
    let value = runtime.eval("kept * 2;").unwrap();
    assert_eq!(value, spreadcall::Value::Number(6.0));
}
