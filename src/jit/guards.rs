//! Fast-path guards for sole-spread call sites
//!
//! An optimized site reads its argument array directly by index instead of
//! running the iteration protocol. That is only equivalent when every guard
//! below holds for the argument at hand.

use crate::runtime::value::{ObjectKind, ObjectRef, PropertyKey, Symbol, Value};
use serde::Serialize;
use std::fmt;
use std::rc::Rc;

/// A single assumption of the spread fast path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Guard {
    /// The argument is an array object
    IsArray,
    /// The array has no holes
    Dense,
    /// The array has no own `@@iterator`
    NoOwnIterator,
    /// The array's prototype is the intrinsic `Array.prototype`
    IntrinsicPrototype,
    /// `Array.prototype[@@iterator]` and `%ArrayIteratorPrototype%.next` are
    /// unchanged since the guards were recorded
    ProtocolUnmodified,
}

impl Guard {
    pub fn as_str(&self) -> &'static str {
        match self {
            Guard::IsArray => "is-array",
            Guard::Dense => "dense",
            Guard::NoOwnIterator => "no-own-iterator",
            Guard::IntrinsicPrototype => "intrinsic-prototype",
            Guard::ProtocolUnmodified => "protocol-unmodified",
        }
    }

    /// Whether a failure of this guard makes the whole site stale
    ///
    /// Shape guards only concern the current argument; the protocol guard
    /// concerns every future call.
    pub fn invalidates_site(&self) -> bool {
        matches!(self, Guard::ProtocolUnmodified)
    }
}

impl fmt::Display for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What an optimized site was compiled against
#[derive(Debug, Clone)]
pub struct GuardSet {
    /// Monitor epoch at optimization time
    pub epoch: u64,
    /// The intrinsic `Array.prototype`
    pub array_prototype: ObjectRef,
    /// The intrinsic `%ArrayIteratorPrototype%`
    pub array_iterator_prototype: ObjectRef,
}

impl GuardSet {
    pub fn new(
        epoch: u64,
        array_prototype: ObjectRef,
        array_iterator_prototype: ObjectRef,
    ) -> Self {
        Self {
            epoch,
            array_prototype,
            array_iterator_prototype,
        }
    }
}

/// Check the argument-shape guards (array, dense, no own iterator, intrinsic prototype)
pub fn check_shape(arg: &Value, array_prototype: &ObjectRef) -> Result<(), Guard> {
    with_dense_elements(arg, array_prototype, |_| ())
}

/// Check every guard and read the elements directly on success
///
/// The epoch is compared first: once the protocol has changed, the site must
/// learn about it no matter what argument it sees.
pub fn check_guards(guards: &GuardSet, current_epoch: u64, arg: &Value) -> Result<Vec<Value>, Guard> {
    if guards.epoch != current_epoch {
        return Err(Guard::ProtocolUnmodified);
    }
    with_dense_elements(arg, &guards.array_prototype, |elements| {
        elements.iter().flatten().cloned().collect()
    })
}

/// Elements of `arg` when the fast path may be taken
pub fn try_fast_path(guards: &GuardSet, current_epoch: u64, arg: &Value) -> Option<Vec<Value>> {
    check_guards(guards, current_epoch, arg).ok()
}

fn with_dense_elements<T>(
    arg: &Value,
    array_prototype: &ObjectRef,
    read: impl FnOnce(&[Option<Value>]) -> T,
) -> Result<T, Guard> {
    let Value::Object(object) = arg else {
        return Err(Guard::IsArray);
    };
    let object = object.borrow();
    let ObjectKind::Array(elements) = &object.kind else {
        return Err(Guard::IsArray);
    };
    if elements.iter().any(Option::is_none) {
        return Err(Guard::Dense);
    }
    if object.has_own(&PropertyKey::Symbol(Symbol::iterator())) {
        return Err(Guard::NoOwnIterator);
    }
    match &object.prototype {
        Some(proto) if Rc::ptr_eq(proto, array_prototype) => Ok(read(elements)),
        _ => Err(Guard::IntrinsicPrototype),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::value::Object;

    struct Fixture {
        array_prototype: ObjectRef,
        guards: GuardSet,
    }

    fn fixture() -> Fixture {
        let array_prototype = Object::ordinary(None).into_ref();
        let iterator_prototype = Object::ordinary(None).into_ref();
        let guards = GuardSet::new(3, array_prototype.clone(), iterator_prototype);
        Fixture {
            array_prototype,
            guards,
        }
    }

    fn array(elements: Vec<Option<Value>>, proto: &ObjectRef) -> Value {
        Value::Object(Object::new(ObjectKind::Array(elements), Some(proto.clone())).into_ref())
    }

    #[test]
    fn test_dense_intrinsic_array_passes() {
        let f = fixture();
        let arg = array(
            vec![Some(Value::Number(1.0)), Some(Value::Number(2.0))],
            &f.array_prototype,
        );
        assert_eq!(
            try_fast_path(&f.guards, 3, &arg),
            Some(vec![Value::Number(1.0), Value::Number(2.0)])
        );
    }

    #[test]
    fn test_each_shape_guard_fails_alone() {
        let f = fixture();

        assert_eq!(
            check_guards(&f.guards, 3, &Value::string("ab")),
            Err(Guard::IsArray)
        );

        let holey = array(vec![Some(Value::Number(1.0)), None], &f.array_prototype);
        assert_eq!(check_guards(&f.guards, 3, &holey), Err(Guard::Dense));

        let own_iterator = array(vec![Some(Value::Null)], &f.array_prototype);
        own_iterator
            .as_object()
            .unwrap()
            .borrow_mut()
            .set_own(PropertyKey::Symbol(Symbol::iterator()), Value::Null)
            .unwrap();
        assert_eq!(
            check_guards(&f.guards, 3, &own_iterator),
            Err(Guard::NoOwnIterator)
        );

        let foreign = Object::ordinary(None).into_ref();
        let foreign_array = array(vec![Some(Value::Null)], &foreign);
        assert_eq!(
            check_guards(&f.guards, 3, &foreign_array),
            Err(Guard::IntrinsicPrototype)
        );
    }

    #[test]
    fn test_epoch_mismatch_checked_first() {
        let f = fixture();
        let arg = array(vec![None], &f.array_prototype);
        let failure = check_guards(&f.guards, 4, &arg).unwrap_err();
        assert_eq!(failure, Guard::ProtocolUnmodified);
        assert!(failure.invalidates_site());
        assert!(!Guard::Dense.invalidates_site());
    }

    #[test]
    fn test_check_shape_ignores_epoch() {
        let f = fixture();
        let arg = array(vec![Some(Value::Undefined)], &f.array_prototype);
        assert_eq!(check_shape(&arg, &f.array_prototype), Ok(()));
        assert_eq!(
            check_shape(&Value::Number(1.0), &f.array_prototype),
            Err(Guard::IsArray)
        );
    }
}
