//! Environment records
//!
//! Scopes form a parent-linked chain. Function bodies get a declarative
//! scope; `with` statements and the global scope are backed by an object,
//! so name lookups there go through the object's prototype chain.

use super::value::{has_property, ObjectRef, PropertyKey, Value};
use rustc_hash::FxHashMap as HashMap;
use std::cell::RefCell;
use std::rc::Rc;

/// Shared handle to a scope
pub type ScopeRef = Rc<RefCell<Scope>>;

/// What a scope stores its bindings in
#[derive(Debug)]
pub enum ScopeKind {
    /// Name to value map (function scopes)
    Declarative(HashMap<String, Value>),
    /// Bindings are the properties of an object
    Object {
        object: ObjectRef,
        /// Introduced by `with`; calls resolved here use the object as `this`
        with: bool,
    },
}

/// An environment record linked to its parent
#[derive(Debug)]
pub struct Scope {
    pub kind: ScopeKind,
    pub parent: Option<ScopeRef>,
}

/// Where a name resolved to
#[derive(Debug, Clone)]
pub enum Binding {
    /// A declarative scope holding the name
    Declarative(ScopeRef),
    /// An object holding the name as a property
    Object { object: ObjectRef, with: bool },
}

impl Scope {
    /// The object-backed global scope
    pub fn global(global_object: ObjectRef) -> ScopeRef {
        Rc::new(RefCell::new(Scope {
            kind: ScopeKind::Object {
                object: global_object,
                with: false,
            },
            parent: None,
        }))
    }

    /// A fresh declarative scope
    pub fn declarative(parent: ScopeRef) -> ScopeRef {
        Rc::new(RefCell::new(Scope {
            kind: ScopeKind::Declarative(HashMap::default()),
            parent: Some(parent),
        }))
    }

    /// A `with` scope over `object`
    pub fn with_object(object: ObjectRef, parent: ScopeRef) -> ScopeRef {
        Rc::new(RefCell::new(Scope {
            kind: ScopeKind::Object { object, with: true },
            parent: Some(parent),
        }))
    }

    /// Bind `name` in a declarative scope, overwriting any existing value
    pub fn bind(&mut self, name: &str, value: Value) {
        if let ScopeKind::Declarative(map) = &mut self.kind {
            map.insert(name.to_string(), value);
        }
    }

    /// Declare `name` as undefined unless already bound
    pub fn declare(&mut self, name: &str) {
        if let ScopeKind::Declarative(map) = &mut self.kind {
            map.entry(name.to_string()).or_insert(Value::Undefined);
        }
    }

    /// Read a binding from a declarative scope
    pub fn get(&self, name: &str) -> Option<Value> {
        match &self.kind {
            ScopeKind::Declarative(map) => map.get(name).cloned(),
            ScopeKind::Object { .. } => None,
        }
    }

    /// Overwrite a binding in a declarative scope
    pub fn set(&mut self, name: &str, value: Value) -> bool {
        match &mut self.kind {
            ScopeKind::Declarative(map) => match map.get_mut(name) {
                Some(slot) => {
                    *slot = value;
                    true
                }
                None => false,
            },
            ScopeKind::Object { .. } => false,
        }
    }

    /// Remove a declarative binding (used by `delete name`)
    pub fn remove(&mut self, name: &str) -> bool {
        match &mut self.kind {
            ScopeKind::Declarative(map) => map.remove(name).is_some(),
            ScopeKind::Object { .. } => false,
        }
    }
}

/// Walk the chain from `scope` looking for `name`
pub fn resolve(scope: &ScopeRef, name: &str) -> Option<Binding> {
    let key = PropertyKey::from(name);
    let mut current = scope.clone();
    loop {
        let next = {
            let s = current.borrow();
            match &s.kind {
                ScopeKind::Declarative(map) => {
                    if map.contains_key(name) {
                        return Some(Binding::Declarative(current.clone()));
                    }
                }
                ScopeKind::Object { object, with } => {
                    if has_property(object, &key) {
                        return Some(Binding::Object {
                            object: object.clone(),
                            with: *with,
                        });
                    }
                }
            }
            s.parent.clone()?
        };
        current = next;
    }
}
