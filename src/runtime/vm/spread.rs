//! Baseline spread materialization
//!
//! Runs the full iteration protocol on every call. Every path that expands an
//! iterable (`f(...x)`, `f(a, ...x)`, `[...x]`) ends up here unless an
//! optimized call site has proven it can read the array directly.

use super::VM;
use crate::error::{messages, Error, Result};
use crate::runtime::value::{PropertyKey, Symbol, Value, MAX_DENSE_LENGTH};

impl VM {
    /// Collect every value `iterable` yields
    ///
    /// `description` is the source text of the spread operand, used in
    /// "is not iterable" errors.
    pub fn iterate_to_list(&mut self, iterable: &Value, description: &str) -> Result<Vec<Value>> {
        if iterable.is_nullish() {
            return Err(Error::type_error(messages::not_iterable(description)));
        }

        let method =
            self.get_member(iterable, &PropertyKey::Symbol(Symbol::iterator()))?;
        if !method.is_callable() {
            return Err(Error::type_error(messages::not_iterable(description)));
        }

        let iterator = self.call_function(&method, iterable.clone(), &[])?;
        if !matches!(iterator, Value::Object(_)) {
            return Err(Error::type_error(messages::ITERATOR_NOT_OBJECT));
        }

        // `next` is read once, before the first step
        let next = self.get_member(&iterator, &PropertyKey::from("next"))?;
        let done_key = PropertyKey::from("done");
        let value_key = PropertyKey::from("value");

        let mut values = Vec::new();
        loop {
            if !next.is_callable() {
                return Err(Error::type_error(messages::not_a_function(&format!(
                    "{}.next",
                    description
                ))));
            }
            let step = self.call_function(&next, iterator.clone(), &[])?;
            if !matches!(step, Value::Object(_)) {
                return Err(Error::type_error(messages::ITERATOR_RESULT_NOT_OBJECT));
            }
            if self.get_member(&step, &done_key)?.to_boolean() {
                break;
            }
            if values.len() >= MAX_DENSE_LENGTH {
                return Err(Error::range_error(messages::INVALID_ARRAY_LENGTH));
            }
            values.push(self.get_member(&step, &value_key)?);
        }

        tracing::trace!(target: "spreadcall::vm", description, count = values.len(), "materialized spread");
        Ok(values)
    }
}

/// Length of an array literal after a spread appends `extra` elements to
/// its `current` ones
pub(super) fn extended_length(current: usize, extra: usize) -> Result<usize> {
    current
        .checked_add(extra)
        .filter(|&len| len <= MAX_DENSE_LENGTH)
        .ok_or_else(|| Error::range_error(messages::INVALID_ARRAY_LENGTH))
}

#[cfg(test)]
mod tests {
    use super::extended_length;
    use crate::error::ErrorKind;
    use crate::runtime::value::MAX_DENSE_LENGTH;
    use crate::runtime::{Runtime, Value};

    fn eval(source: &str) -> crate::error::Result<Value> {
        Runtime::new().eval(source)
    }

    #[test]
    fn test_user_defined_iterator() {
        let result = eval(
            r#"
            var it = {};
            it[Symbol.iterator] = function() {
                var n = 0;
                return { next: function() { n++; return { value: n * 10, done: n > 3 }; } };
            };
            function sum(a, b, c) { return a + b + c; }
            sum(...it);
            "#,
        )
        .unwrap();
        assert_eq!(result, Value::Number(60.0));
    }

    #[test]
    fn test_holes_read_through_prototype() {
        let result = eval(
            r#"
            Array.prototype[1] = "proto";
            function second(a, b) { return b; }
            second(...[1, , 3]);
            "#,
        )
        .unwrap();
        assert_eq!(result, Value::string("proto"));
    }

    #[test]
    fn test_not_iterable() {
        let err = eval("function f() {} var x = 5; f(...x);").unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::TypeError));
        assert!(err.to_string().contains("x is not iterable"));

        let err = eval("function f() {} f(...undefined);").unwrap_err();
        assert!(err.to_string().contains("undefined is not iterable"));
    }

    #[test]
    fn test_iterator_result_must_be_object() {
        let err = eval(
            r#"
            var it = {};
            it[Symbol.iterator] = function() { return { next: function() { return 1; } }; };
            [...it];
            "#,
        )
        .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::TypeError));
        assert!(err.to_string().contains("iterator result is not an object"));
    }

    #[test]
    fn test_iterator_method_must_return_object() {
        let err = eval(
            r#"
            var it = {};
            it[Symbol.iterator] = function() { return 3; };
            [...it];
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("Symbol.iterator method is not an object"));
    }

    #[test]
    fn test_spread_of_string() {
        let result = eval("function f(a, b) { return b + a; } f(...'xy');").unwrap();
        assert_eq!(result, Value::string("yx"));
    }

    #[test]
    fn test_spread_of_string_with_astral_characters() {
        let result = eval(
            r#"
            var parts = [..."a\u{1F600}\u00e9b"];
            parts.length + ":" + parts[1] + ":" + parts[3] + ":" + "a\u{1F600}b".length;
            "#,
        )
        .unwrap();
        assert_eq!(result, Value::string("4:\u{1F600}:b:4"));
    }

    #[test]
    fn test_array_literal_length_cap() {
        assert_eq!(extended_length(3, 4).unwrap(), 7);
        assert_eq!(extended_length(MAX_DENSE_LENGTH - 1, 1).unwrap(), MAX_DENSE_LENGTH);

        let err = extended_length(MAX_DENSE_LENGTH, 1).unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::RangeError));
        assert!(err.to_string().contains("Invalid array length"));
        assert!(extended_length(usize::MAX, 1).is_err());
    }
}
