//! JavaScript value types
//!
//! This module defines the runtime representation of JavaScript values,
//! property keys and heap objects.

use super::scope::ScopeRef;
use super::vm::VM;
use crate::bytecode::FunctionTemplate;
use crate::error::{messages, Error, Result};
use bitflags::bitflags;
use rustc_hash::FxHashMap as HashMap;
use std::cell::RefCell;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Type alias for native function implementations
///
/// Natives receive the VM, the `this` value and the argument list.
pub type NativeFn = Rc<dyn Fn(&mut VM, Value, &[Value]) -> Result<Value>>;

/// Shared, mutable handle to a heap object
pub type ObjectRef = Rc<RefCell<Object>>;

/// Arrays longer than this are rejected instead of allocated
pub const MAX_DENSE_LENGTH: usize = 1 << 24;

/// Symbol id reserved for the well-known `Symbol.iterator`
const ITERATOR_SYMBOL_ID: u64 = 0;

static NEXT_SYMBOL_ID: AtomicU64 = AtomicU64::new(ITERATOR_SYMBOL_ID + 1);

/// A JavaScript symbol, compared by identity
#[derive(Clone)]
pub struct Symbol {
    id: u64,
    description: Option<Rc<str>>,
}

impl Symbol {
    /// Create a fresh, unique symbol
    pub fn new(description: Option<&str>) -> Self {
        Self {
            id: NEXT_SYMBOL_ID.fetch_add(1, Ordering::Relaxed),
            description: description.map(Rc::from),
        }
    }

    /// The well-known `Symbol.iterator`
    pub fn iterator() -> Self {
        Self {
            id: ITERATOR_SYMBOL_ID,
            description: Some(Rc::from("Symbol.iterator")),
        }
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Symbol {}

impl Hash for Symbol {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({})", self.description().unwrap_or(""))
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// A property key: a string or a symbol
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PropertyKey {
    String(String),
    Symbol(Symbol),
}

impl PropertyKey {
    /// The key as a canonical array index, if it is one
    pub fn array_index(&self) -> Option<usize> {
        let PropertyKey::String(s) = self else {
            return None;
        };
        if s.is_empty() || (s.len() > 1 && s.starts_with('0')) {
            return None;
        }
        if !s.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        s.parse::<u32>()
            .ok()
            .filter(|&n| n != u32::MAX)
            .map(|n| n as usize)
    }

    pub fn is_length(&self) -> bool {
        matches!(self, PropertyKey::String(s) if s == "length")
    }

    /// The key as a string, for error messages
    pub fn describe(&self) -> String {
        match self {
            PropertyKey::String(s) => s.clone(),
            PropertyKey::Symbol(sym) => sym.to_string(),
        }
    }
}

impl From<&str> for PropertyKey {
    fn from(s: &str) -> Self {
        PropertyKey::String(s.to_string())
    }
}

impl From<String> for PropertyKey {
    fn from(s: String) -> Self {
        PropertyKey::String(s)
    }
}

impl From<usize> for PropertyKey {
    fn from(index: usize) -> Self {
        PropertyKey::String(index.to_string())
    }
}

impl From<Symbol> for PropertyKey {
    fn from(sym: Symbol) -> Self {
        PropertyKey::Symbol(sym)
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyKey::String(s) => write!(f, "{}", s),
            PropertyKey::Symbol(sym) => write!(f, "[{}]", sym),
        }
    }
}

/// A JavaScript value
#[derive(Clone)]
pub enum Value {
    /// undefined
    Undefined,
    /// null
    Null,
    /// Boolean value
    Boolean(bool),
    /// Number (IEEE 754 double)
    Number(f64),
    /// String
    String(String),
    /// Symbol
    Symbol(Symbol),
    /// Object (includes arrays, functions, iterators)
    Object(ObjectRef),
}

impl Value {
    /// Create a string value
    pub fn string(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }

    /// Check if value is undefined
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// Check if value is nullish (null or undefined)
    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    /// The object handle, if this is an object
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Check if value can be called
    pub fn is_callable(&self) -> bool {
        self.as_object()
            .map(|obj| obj.borrow().is_callable())
            .unwrap_or(false)
    }

    /// Check if value is an array object
    pub fn is_array(&self) -> bool {
        self.as_object()
            .map(|obj| matches!(obj.borrow().kind, ObjectKind::Array(_)))
            .unwrap_or(false)
    }

    /// Convert to boolean (truthiness)
    pub fn to_boolean(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Boolean(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::Symbol(_) | Value::Object(_) => true,
        }
    }

    /// Convert to number
    pub fn to_number(&self) -> Result<f64> {
        Ok(match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Boolean(true) => 1.0,
            Value::Boolean(false) => 0.0,
            Value::Number(n) => *n,
            Value::String(s) => string_to_number(s),
            Value::Symbol(_) => {
                return Err(Error::type_error("Cannot convert a Symbol value to a number"))
            }
            Value::Object(_) => string_to_number(&self.to_primitive_string()),
        })
    }

    /// Convert to a property key
    pub fn to_property_key(&self) -> PropertyKey {
        match self {
            Value::Symbol(sym) => PropertyKey::Symbol(sym.clone()),
            Value::String(s) => PropertyKey::String(s.clone()),
            other => PropertyKey::String(other.to_js_string()),
        }
    }

    /// ToString for operators; symbols refuse implicit conversion
    pub fn to_string_value(&self) -> Result<String> {
        match self {
            Value::Symbol(_) => Err(Error::type_error(
                "Cannot convert a Symbol value to a string",
            )),
            other => Ok(other.to_js_string()),
        }
    }

    /// Convert to JavaScript string representation
    pub fn to_js_string(&self) -> String {
        match self {
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Boolean(b) => b.to_string(),
            Value::Number(n) => number_to_string(*n),
            Value::String(s) => s.clone(),
            Value::Symbol(sym) => sym.to_string(),
            Value::Object(_) => self.to_primitive_string(),
        }
    }

    /// The string an object converts to when used as a primitive
    fn to_primitive_string(&self) -> String {
        let Value::Object(obj) = self else {
            return self.to_js_string();
        };
        let obj = obj.borrow();
        match &obj.kind {
            ObjectKind::Array(elements) => elements
                .iter()
                .map(|slot| match slot {
                    Some(v) if !v.is_nullish() => v.to_js_string(),
                    _ => String::new(),
                })
                .collect::<Vec<_>>()
                .join(","),
            ObjectKind::Closure(closure) => {
                format!("function {}() {{ [code] }}", closure.template.name)
            }
            ObjectKind::NativeFunction { name, .. } => {
                format!("function {}() {{ [native code] }}", name)
            }
            ObjectKind::ArrayIterator { .. } => "[object Array Iterator]".to_string(),
            ObjectKind::Ordinary => "[object Object]".to_string(),
        }
    }

    /// Get the typeof string
    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "object",
            Value::Boolean(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Symbol(_) => "symbol",
            Value::Object(obj) => {
                if obj.borrow().is_callable() {
                    "function"
                } else {
                    "object"
                }
            }
        }
    }

    /// Strict equality (===)
    pub fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) => true,
            (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// SameValue: like `===` except NaN equals NaN and +0 differs from -0
    pub fn same_value(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => {
                if a.is_nan() && b.is_nan() {
                    true
                } else {
                    a == b && a.is_sign_negative() == b.is_sign_negative()
                }
            }
            _ => self.strict_equals(other),
        }
    }

    /// Loose equality (==)
    pub fn loose_equals(&self, other: &Value) -> Result<bool> {
        Ok(match (self, other) {
            (Value::Undefined | Value::Null, Value::Undefined | Value::Null) => true,
            (Value::Undefined | Value::Null, _) | (_, Value::Undefined | Value::Null) => false,
            (Value::Number(_), Value::String(_)) | (Value::String(_), Value::Number(_)) => {
                self.to_number()? == other.to_number()?
            }
            (Value::Boolean(_), _) => Value::Number(self.to_number()?).loose_equals(other)?,
            (_, Value::Boolean(_)) => self.loose_equals(&Value::Number(other.to_number()?))?,
            (Value::Object(_), Value::Number(_) | Value::String(_)) => {
                Value::String(self.to_primitive_string()).loose_equals(other)?
            }
            (Value::Number(_) | Value::String(_), Value::Object(_)) => {
                self.loose_equals(&Value::String(other.to_primitive_string()))?
            }
            _ => self.strict_equals(other),
        })
    }

    /// Developer-facing rendering used by `assertEq` failures and the REPL
    pub fn inspect(&self) -> String {
        match self {
            Value::String(s) => format!("{:?}", s),
            Value::Number(n) if *n == 0.0 && n.is_sign_negative() => "-0".to_string(),
            Value::Object(obj) => {
                let obj = obj.borrow();
                match &obj.kind {
                    ObjectKind::Array(elements) => {
                        let items: Vec<String> = elements
                            .iter()
                            .map(|slot| match slot {
                                Some(v) => v.inspect(),
                                None => "<hole>".to_string(),
                            })
                            .collect();
                        format!("[{}]", items.join(", "))
                    }
                    ObjectKind::Closure(closure) => {
                        format!("[Function: {}]", closure.template.display_name())
                    }
                    ObjectKind::NativeFunction { name, .. } => format!("[Function: {}]", name),
                    ObjectKind::ArrayIterator { .. } => "[Array Iterator]".to_string(),
                    ObjectKind::Ordinary => {
                        let items: Vec<String> = obj
                            .keys
                            .iter()
                            .filter_map(|k| obj.properties.get(k).map(|v| (k, v)))
                            .map(|(k, v)| match v {
                                Value::Object(_) => format!("{}: {{...}}", k),
                                other => format!("{}: {}", k, other.inspect()),
                            })
                            .collect();
                        if items.is_empty() {
                            "{}".to_string()
                        } else {
                            format!("{{ {} }}", items.join(", "))
                        }
                    }
                }
            }
            other => other.to_js_string(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.strict_equals(other)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inspect())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_js_string())
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<ObjectRef> for Value {
    fn from(obj: ObjectRef) -> Self {
        Value::Object(obj)
    }
}

/// Format a number the way JavaScript's Number::toString does
pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }

    let abs = n.abs();
    if (1e-6..1e21).contains(&abs) {
        return format!("{}", n);
    }

    // Exponent form: Rust renders "1e21", JavaScript wants "1e+21"
    let formatted = format!("{:e}", n);
    match formatted.split_once('e') {
        Some((mantissa, exp)) if !exp.starts_with('-') => format!("{}e+{}", mantissa, exp),
        _ => formatted,
    }
}

/// The character at UTF-16 offset `index`. The trailing half of a surrogate
/// pair cannot stand alone in a Rust string, so it reads as U+FFFD.
pub fn string_unit_at(s: &str, index: usize) -> Option<String> {
    let mut offset = 0;
    for c in s.chars() {
        let width = c.len_utf16();
        if offset == index {
            return Some(c.to_string());
        }
        if index < offset + width {
            return Some(char::REPLACEMENT_CHARACTER.to_string());
        }
        offset += width;
    }
    None
}

/// Digits of a `0x`/`0b`/`0o` literal, prefix already stripped. Values past
/// `u64::MAX` keep growing in `f64` instead of failing.
pub fn parse_radix_digits(digits: &str, radix: u32) -> Option<f64> {
    if digits.is_empty() {
        return None;
    }
    digits.chars().try_fold(0.0f64, |acc, c| {
        c.to_digit(radix).map(|d| acc * radix as f64 + d as f64)
    })
}

/// StringToNumber for the decimal, hex, binary and octal forms plus Infinity
pub fn string_to_number(s: &str) -> f64 {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return 0.0;
    }

    let radix = match trimmed.get(..2) {
        Some("0x" | "0X") => Some(16),
        Some("0b" | "0B") => Some(2),
        Some("0o" | "0O") => Some(8),
        _ => None,
    };
    if let Some(radix) = radix {
        return parse_radix_digits(&trimmed[2..], radix).unwrap_or(f64::NAN);
    }

    let (sign, body) = match trimmed.strip_prefix('-') {
        Some(rest) => (-1.0, rest),
        None => (1.0, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    if body == "Infinity" {
        return sign * f64::INFINITY;
    }
    let numeric = body
        .bytes()
        .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'e' | b'E' | b'+' | b'-'));
    if !numeric || !body.bytes().any(|b| b.is_ascii_digit()) {
        return f64::NAN;
    }
    lexical_core::parse::<f64>(body.as_bytes())
        .map(|n| sign * n)
        .unwrap_or(f64::NAN)
}

bitflags! {
    /// Per-object flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ObjectFlags: u8 {
        /// Stores to some of this object's properties must be reported to the
        /// invalidation monitor
        const WATCHED = 0x01;
    }
}

/// A compiled function closed over the scope it was created in
#[derive(Clone)]
pub struct Closure {
    /// Compiled code and parameter layout
    pub template: Rc<FunctionTemplate>,
    /// Scope captured at creation
    pub scope: ScopeRef,
}

/// Object kind
#[derive(Clone)]
pub enum ObjectKind {
    /// Ordinary object
    Ordinary,
    /// Array object; `None` slots are holes
    Array(Vec<Option<Value>>),
    /// Function compiled from script source
    Closure(Closure),
    /// Native function
    NativeFunction { name: String, func: NativeFn },
    /// Iterator produced by `Array.prototype.values`
    ArrayIterator {
        iterated: Value,
        next_index: usize,
        done: bool,
    },
}

/// JavaScript object
#[derive(Clone)]
pub struct Object {
    /// Object kind
    pub kind: ObjectKind,
    /// Own properties
    properties: HashMap<PropertyKey, Value>,
    /// Insertion order of `properties`
    keys: Vec<PropertyKey>,
    /// Prototype
    pub prototype: Option<ObjectRef>,
    /// Flags
    pub flags: ObjectFlags,
}

impl Object {
    /// Create a new object of the given kind
    pub fn new(kind: ObjectKind, prototype: Option<ObjectRef>) -> Self {
        Self {
            kind,
            properties: HashMap::default(),
            keys: Vec::new(),
            prototype,
            flags: ObjectFlags::empty(),
        }
    }

    /// Create a new ordinary object
    pub fn ordinary(prototype: Option<ObjectRef>) -> Self {
        Self::new(ObjectKind::Ordinary, prototype)
    }

    /// Wrap into a shared handle
    pub fn into_ref(self) -> ObjectRef {
        Rc::new(RefCell::new(self))
    }

    pub fn is_callable(&self) -> bool {
        matches!(
            self.kind,
            ObjectKind::Closure(_) | ObjectKind::NativeFunction { .. }
        )
    }

    pub fn is_watched(&self) -> bool {
        self.flags.contains(ObjectFlags::WATCHED)
    }

    /// Get an own property
    pub fn get_own(&self, key: &PropertyKey) -> Option<Value> {
        if let ObjectKind::Array(elements) = &self.kind {
            if key.is_length() {
                return Some(Value::Number(elements.len() as f64));
            }
            if let Some(index) = key.array_index() {
                return elements.get(index).cloned().flatten();
            }
        }
        self.properties.get(key).cloned()
    }

    /// Check for an own property
    pub fn has_own(&self, key: &PropertyKey) -> bool {
        if let ObjectKind::Array(elements) = &self.kind {
            if key.is_length() {
                return true;
            }
            if let Some(index) = key.array_index() {
                return matches!(elements.get(index), Some(Some(_)));
            }
        }
        self.properties.contains_key(key)
    }

    /// Create or overwrite an own property
    pub fn set_own(&mut self, key: PropertyKey, value: Value) -> Result<()> {
        if let ObjectKind::Array(elements) = &mut self.kind {
            if key.is_length() {
                let length = array_length_from(&value)?;
                elements.resize(length, None);
                return Ok(());
            }
            if let Some(index) = key.array_index() {
                if index >= MAX_DENSE_LENGTH {
                    return Err(Error::range_error(messages::INVALID_ARRAY_LENGTH));
                }
                if index >= elements.len() {
                    elements.resize(index + 1, None);
                }
                elements[index] = Some(value);
                return Ok(());
            }
        }
        if !self.properties.contains_key(&key) {
            self.keys.push(key.clone());
        }
        self.properties.insert(key, value);
        Ok(())
    }

    /// Delete an own property; false when the property cannot be deleted
    pub fn delete_own(&mut self, key: &PropertyKey) -> bool {
        if let ObjectKind::Array(elements) = &mut self.kind {
            if key.is_length() {
                return false;
            }
            if let Some(index) = key.array_index() {
                if let Some(slot) = elements.get_mut(index) {
                    *slot = None;
                }
                return true;
            }
        }
        if self.properties.remove(key).is_some() {
            self.keys.retain(|k| k != key);
        }
        true
    }

    /// Own string keys in enumeration order (indices first)
    pub fn own_string_keys(&self) -> Vec<String> {
        let mut result = Vec::new();
        if let ObjectKind::Array(elements) = &self.kind {
            result.extend(
                elements
                    .iter()
                    .enumerate()
                    .filter(|(_, slot)| slot.is_some())
                    .map(|(i, _)| i.to_string()),
            );
        }
        result.extend(self.keys.iter().filter_map(|k| match k {
            PropertyKey::String(s) => Some(s.clone()),
            PropertyKey::Symbol(_) => None,
        }));
        result
    }

    /// Display name for functions
    pub fn function_name(&self) -> Option<String> {
        match &self.kind {
            ObjectKind::Closure(closure) => Some(closure.template.display_name().to_string()),
            ObjectKind::NativeFunction { name, .. } => Some(name.clone()),
            _ => None,
        }
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("keys", &self.keys)
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}

/// Validate a value assigned to an array's `length`
pub fn array_length_from(value: &Value) -> Result<usize> {
    let n = value.to_number()?;
    if n < 0.0 || n.fract() != 0.0 || n >= MAX_DENSE_LENGTH as f64 {
        return Err(Error::range_error(messages::INVALID_ARRAY_LENGTH));
    }
    Ok(n as usize)
}

/// [[Get]] along the prototype chain
pub fn get_property(object: &ObjectRef, key: &PropertyKey) -> Option<Value> {
    let mut current = object.clone();
    loop {
        let next = {
            let obj = current.borrow();
            if let Some(value) = obj.get_own(key) {
                return Some(value);
            }
            obj.prototype.clone()?
        };
        current = next;
    }
}

/// [[HasProperty]] along the prototype chain
pub fn has_property(object: &ObjectRef, key: &PropertyKey) -> bool {
    let mut current = object.clone();
    loop {
        let next = {
            let obj = current.borrow();
            if obj.has_own(key) {
                return true;
            }
            match obj.prototype.clone() {
                Some(proto) => proto,
                None => return false,
            }
        };
        current = next;
    }
}
