//! Built-in functions and objects
//!
//! This module builds the realm: the intrinsic prototypes, the global object
//! and the handful of script-visible globals (`print`, `assertEq`, `Array`,
//! `Object`, `Symbol`, `Function`).

use super::value::{
    array_length_from, NativeFn, Object, ObjectKind, ObjectRef, PropertyKey, Symbol, Value,
};
use super::vm::VM;
use crate::error::{messages, Error, Result};
use std::rc::Rc;

/// Intrinsic objects shared by everything running in one VM
pub struct Realm {
    pub global: ObjectRef,
    pub object_prototype: ObjectRef,
    pub function_prototype: ObjectRef,
    pub array_prototype: ObjectRef,
    pub string_prototype: ObjectRef,
    /// %IteratorPrototype%
    pub iterator_prototype: ObjectRef,
    /// %ArrayIteratorPrototype%
    pub array_iterator_prototype: ObjectRef,
}

impl Realm {
    /// Create a native function object inheriting from `Function.prototype`
    pub fn native_function(&self, name: &str, func: NativeFn) -> Value {
        native(&self.function_prototype, name, func)
    }
}

fn native(function_prototype: &ObjectRef, name: &str, func: NativeFn) -> Value {
    Value::Object(
        Object::new(
            ObjectKind::NativeFunction {
                name: name.to_string(),
                func,
            },
            Some(function_prototype.clone()),
        )
        .into_ref(),
    )
}

/// Install properties on a fresh intrinsic; keys are never array indices here
fn define(object: &ObjectRef, key: impl Into<PropertyKey>, value: Value) -> Result<()> {
    object.borrow_mut().set_own(key.into(), value)
}

fn define_method<F>(
    object: &ObjectRef,
    function_prototype: &ObjectRef,
    name: &str,
    func: F,
) -> Result<()>
where
    F: Fn(&mut VM, Value, &[Value]) -> Result<Value> + 'static,
{
    define(object, name, native(function_prototype, name, Rc::new(func)))
}

fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or(Value::Undefined)
}

/// Build the realm and its global object
pub fn create_realm() -> Realm {
    let object_prototype = Object::ordinary(None).into_ref();
    let function_prototype = Object::ordinary(Some(object_prototype.clone())).into_ref();
    let array_prototype = Object::new(
        ObjectKind::Array(Vec::new()),
        Some(object_prototype.clone()),
    )
    .into_ref();
    let string_prototype = Object::ordinary(Some(object_prototype.clone())).into_ref();
    let iterator_prototype = Object::ordinary(Some(object_prototype.clone())).into_ref();
    let array_iterator_prototype =
        Object::ordinary(Some(iterator_prototype.clone())).into_ref();
    let global = Object::ordinary(Some(object_prototype.clone())).into_ref();

    let realm = Realm {
        global,
        object_prototype,
        function_prototype,
        array_prototype,
        string_prototype,
        iterator_prototype,
        array_iterator_prototype,
    };

    // Every key below is a plain name or a symbol, so installation cannot fail
    let installed = register_globals(&realm)
        .and_then(|_| register_array(&realm))
        .and_then(|_| register_iterators(&realm))
        .and_then(|_| register_object(&realm))
        .and_then(|_| register_function(&realm))
        .and_then(|_| register_symbol(&realm));
    if let Err(e) = installed {
        tracing::error!(target: "spreadcall::vm", error = %e, "failed to install builtins");
    }

    realm
}

/// `print`, `assertEq` and the value globals
fn register_globals(realm: &Realm) -> Result<()> {
    let global = &realm.global;
    let fp = &realm.function_prototype;

    define_method(global, fp, "print", |vm, _this, args| {
        let parts: Vec<String> = args.iter().map(Value::to_js_string).collect();
        vm.write_line(parts.join(" "));
        Ok(Value::Undefined)
    })?;

    define_method(global, fp, "assertEq", |_vm, _this, args| {
        let actual = arg(args, 0);
        let expected = arg(args, 1);
        if actual.same_value(&expected) {
            return Ok(Value::Undefined);
        }
        let message = args
            .get(2)
            .filter(|m| !m.is_undefined())
            .map(Value::to_js_string);
        Err(Error::assertion_failed(
            actual.inspect(),
            expected.inspect(),
            message,
        ))
    })?;

    define(global, "undefined", Value::Undefined)?;
    define(global, "NaN", Value::Number(f64::NAN))?;
    define(global, "Infinity", Value::Number(f64::INFINITY))?;
    define(global, "globalThis", Value::Object(global.clone()))
}

fn register_array(realm: &Realm) -> Result<()> {
    let fp = &realm.function_prototype;
    let proto = &realm.array_prototype;

    let array_proto = proto.clone();
    let array_ctor = native(
        fp,
        "Array",
        Rc::new(move |_vm, _this, args| {
            let elements = match args {
                [Value::Number(_)] => vec![None; array_length_from(&args[0])?],
                _ => args.iter().cloned().map(Some).collect(),
            };
            Ok(Value::Object(
                Object::new(ObjectKind::Array(elements), Some(array_proto.clone())).into_ref(),
            ))
        }),
    );
    if let Value::Object(ctor) = &array_ctor {
        define(ctor, "prototype", Value::Object(proto.clone()))?;
        define_method(ctor, fp, "isArray", |_vm, _this, args| {
            Ok(Value::Boolean(arg(args, 0).is_array()))
        })?;
    }
    define(proto, "constructor", array_ctor.clone())?;
    define(&realm.global, "Array", array_ctor)?;

    // Generic over array-likes: writes go through [[Set]]
    define_method(proto, fp, "push", |vm, this, args| {
        let length = vm
            .get_member(&this, &PropertyKey::from("length"))?
            .to_number()?;
        let mut length = if length.is_finite() && length > 0.0 {
            length as usize
        } else {
            0
        };
        for value in args {
            vm.put_member(&this, PropertyKey::from(length), value.clone())?;
            length += 1;
        }
        let length = Value::Number(length as f64);
        vm.put_member(&this, PropertyKey::from("length"), length.clone())?;
        Ok(length)
    })?;

    // `values` and @@iterator are the same function object
    let values = native(
        fp,
        "values",
        Rc::new(|vm, this, _args| {
            if this.is_nullish() {
                return Err(Error::type_error(
                    "Array.prototype.values called on null or undefined",
                ));
            }
            Ok(create_array_iterator(vm, this))
        }),
    );
    define(proto, "values", values.clone())?;
    define(proto, PropertyKey::Symbol(Symbol::iterator()), values)
}

/// Create an iterator over `iterated` backed by %ArrayIteratorPrototype%
fn create_array_iterator(vm: &VM, iterated: Value) -> Value {
    Value::Object(
        Object::new(
            ObjectKind::ArrayIterator {
                iterated,
                next_index: 0,
                done: false,
            },
            Some(vm.realm().array_iterator_prototype.clone()),
        )
        .into_ref(),
    )
}

fn register_iterators(realm: &Realm) -> Result<()> {
    let fp = &realm.function_prototype;

    define(
        &realm.iterator_prototype,
        PropertyKey::Symbol(Symbol::iterator()),
        native(fp, "[Symbol.iterator]", Rc::new(|_vm, this, _args| Ok(this))),
    )?;

    define_method(&realm.array_iterator_prototype, fp, "next", array_iterator_next)?;

    define(
        &realm.string_prototype,
        PropertyKey::Symbol(Symbol::iterator()),
        native(
            fp,
            "[Symbol.iterator]",
            Rc::new(|vm, this, _args| match this {
                Value::String(_) => Ok(create_array_iterator(vm, this)),
                other => Err(Error::type_error(format!(
                    "String.prototype[Symbol.iterator] called on {}",
                    other.inspect()
                ))),
            }),
        ),
    )
}

/// %ArrayIteratorPrototype%.next
///
/// Elements are read with [[Get]], so holes fall through to the prototype
/// chain. Strings are iterated by character.
fn array_iterator_next(vm: &mut VM, this: Value, _args: &[Value]) -> Result<Value> {
    let not_iterator = || {
        Error::type_error(format!(
            "next method called on incompatible receiver {}",
            this.inspect()
        ))
    };
    let Value::Object(object) = &this else {
        return Err(not_iterator());
    };

    let (iterated, index) = match &object.borrow().kind {
        ObjectKind::ArrayIterator {
            iterated,
            next_index,
            done,
        } => (
            if *done { None } else { Some(iterated.clone()) },
            *next_index,
        ),
        _ => return Err(not_iterator()),
    };
    let Some(iterated) = iterated else {
        return vm.iter_result(Value::Undefined, true);
    };

    let mut step = 1;
    let element = match &iterated {
        // `next_index` is a byte offset into the string
        Value::String(s) => s.get(index..).and_then(|rest| rest.chars().next()).map(|c| {
            step = c.len_utf8();
            Value::string(c.to_string())
        }),
        _ => {
            let length = vm
                .get_member(&iterated, &PropertyKey::from("length"))?
                .to_number()?;
            if (index as f64) < length {
                Some(vm.get_member(&iterated, &PropertyKey::from(index))?)
            } else {
                None
            }
        }
    };

    if let ObjectKind::ArrayIterator {
        next_index, done, ..
    } = &mut object.borrow_mut().kind
    {
        match element {
            Some(_) => *next_index = index + step,
            None => *done = true,
        }
    }

    match element {
        Some(value) => vm.iter_result(value, false),
        None => vm.iter_result(Value::Undefined, true),
    }
}

fn register_object(realm: &Realm) -> Result<()> {
    let fp = &realm.function_prototype;
    let proto = &realm.object_prototype;

    let object_proto = proto.clone();
    let object_ctor = native(
        fp,
        "Object",
        Rc::new(move |_vm, _this, args| match arg(args, 0) {
            Value::Object(object) => Ok(Value::Object(object)),
            _ => Ok(Value::Object(
                Object::ordinary(Some(object_proto.clone())).into_ref(),
            )),
        }),
    );
    let Value::Object(ctor) = &object_ctor else {
        return Err(Error::internal("Object constructor is not an object"));
    };

    define(ctor, "prototype", Value::Object(proto.clone()))?;
    define(proto, "constructor", object_ctor.clone())?;

    define_method(ctor, fp, "getPrototypeOf", |vm, _this, args| {
        match arg(args, 0) {
            Value::Object(object) => Ok(object
                .borrow()
                .prototype
                .clone()
                .map(Value::Object)
                .unwrap_or(Value::Null)),
            Value::String(_) => Ok(Value::Object(vm.realm().string_prototype.clone())),
            other => Err(Error::type_error(format!(
                "Object.getPrototypeOf called on {}",
                other.inspect()
            ))),
        }
    })?;

    define_method(ctor, fp, "setPrototypeOf", |_vm, _this, args| {
        let target = arg(args, 0);
        let prototype = match arg(args, 1) {
            Value::Object(p) => Some(p),
            Value::Null => None,
            other => {
                return Err(Error::type_error(format!(
                    "Object prototype may only be an Object or null: {}",
                    other.inspect()
                )))
            }
        };
        let Value::Object(object) = &target else {
            if target.is_nullish() {
                return Err(Error::type_error(
                    "Object.setPrototypeOf called on null or undefined",
                ));
            }
            return Ok(target);
        };

        let mut cursor = prototype.clone();
        while let Some(p) = cursor {
            if Rc::ptr_eq(&p, object) {
                return Err(Error::type_error("Cyclic __proto__ value"));
            }
            cursor = p.borrow().prototype.clone();
        }

        object.borrow_mut().prototype = prototype;
        Ok(target)
    })?;

    define_method(ctor, fp, "keys", |vm, _this, args| match arg(args, 0) {
        Value::Object(object) => {
            let keys = object.borrow().own_string_keys();
            Ok(vm.new_array(keys.into_iter().map(|k| Some(Value::String(k))).collect()))
        }
        Value::Undefined | Value::Null => Err(Error::type_error(
            "Cannot convert undefined or null to object",
        )),
        _ => Ok(vm.new_array(Vec::new())),
    })?;

    define(&realm.global, "Object", object_ctor)
}

fn register_function(realm: &Realm) -> Result<()> {
    let fp = &realm.function_prototype;

    let function_ctor = native(
        fp,
        "Function",
        Rc::new(|_vm, _this, _args| {
            Err(Error::type_error(
                "Function constructor is not supported",
            ))
        }),
    );
    if let Value::Object(ctor) = &function_ctor {
        define(ctor, "prototype", Value::Object(fp.clone()))?;
    }
    define(fp, "constructor", function_ctor.clone())?;
    define(&realm.global, "Function", function_ctor)?;

    define_method(fp, fp, "call", |vm, this, args| {
        let this_arg = arg(args, 0);
        let rest = args.get(1..).unwrap_or(&[]);
        vm.call_function(&this, this_arg, rest)
    })?;

    define_method(fp, fp, "apply", |vm, this, args| {
        let this_arg = arg(args, 0);
        let list = match arg(args, 1) {
            Value::Undefined | Value::Null => Vec::new(),
            array_like @ Value::Object(_) => list_from_array_like(vm, &array_like)?,
            other => {
                return Err(Error::type_error(format!(
                    "CreateListFromArrayLike called on non-object {}",
                    other.inspect()
                )))
            }
        };
        vm.call_function(&this, this_arg, &list)
    })
}

/// Read `length` then every index through [[Get]]
fn list_from_array_like(vm: &mut VM, array_like: &Value) -> Result<Vec<Value>> {
    let length = vm
        .get_member(array_like, &PropertyKey::from("length"))?
        .to_number()?;
    let length = if length.is_finite() && length > 0.0 {
        length as usize
    } else {
        0
    };
    if length > super::value::MAX_DENSE_LENGTH {
        return Err(Error::range_error(messages::INVALID_ARRAY_LENGTH));
    }
    (0..length)
        .map(|i| vm.get_member(array_like, &PropertyKey::from(i)))
        .collect()
}

fn register_symbol(realm: &Realm) -> Result<()> {
    let symbol_ctor = native(
        &realm.function_prototype,
        "Symbol",
        Rc::new(|_vm, _this, args| {
            let description = match arg(args, 0) {
                Value::Undefined => None,
                other => Some(other.to_string_value()?),
            };
            Ok(Value::Symbol(Symbol::new(description.as_deref())))
        }),
    );
    if let Value::Object(ctor) = &symbol_ctor {
        define(ctor, "iterator", Value::Symbol(Symbol::iterator()))?;
    }
    define(&realm.global, "Symbol", symbol_ctor)
}
