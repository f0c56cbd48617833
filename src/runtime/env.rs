//! Lexical environments: a chain of scopes shared by reference.
//!
//! Closures capture an `Env` handle, so a scope lives as long as any closure
//! that saw it. Closures stored into the scope that defines them form
//! reference cycles; those are expected.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use super::Value;
use crate::error::{ErrorKind, EvalError};
use crate::pattern::Bindings;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnvError {
    #[error("Name '{0}' is already bound in this scope")]
    AlreadyBound(String),
    #[error("Cannot mutate '{0}': name is not bound in any enclosing scope")]
    Unbound(String),
    #[error("Undefined name '{0}'")]
    Undefined(String),
}

impl From<EnvError> for EvalError {
    fn from(e: EnvError) -> Self {
        let kind = match &e {
            EnvError::AlreadyBound(_) => ErrorKind::AlreadyBound,
            EnvError::Unbound(_) => ErrorKind::Unbound,
            EnvError::Undefined(_) => ErrorKind::Undefined,
        };
        EvalError::new(kind, e.to_string())
    }
}

struct Scope {
    vars: FxHashMap<String, Value>,
    parent: Option<Env>,
}

/// Handle to one scope in the chain.
#[derive(Clone)]
pub struct Env(Rc<RefCell<Scope>>);

impl Env {
    /// A scope with no parent.
    pub fn root() -> Env {
        Env(Rc::new(RefCell::new(Scope { vars: FxHashMap::default(), parent: None })))
    }

    pub fn child(parent: &Env) -> Env {
        Env(Rc::new(RefCell::new(Scope { vars: FxHashMap::default(), parent: Some(parent.clone()) })))
    }

    pub fn parent(&self) -> Option<Env> {
        self.0.borrow().parent.clone()
    }

    /// Binds a new name in this scope; rebinding within the same scope is refused.
    pub fn define(&self, name: &str, value: Value) -> Result<(), EnvError> {
        let mut scope = self.0.borrow_mut();
        if scope.vars.contains_key(name) {
            return Err(EnvError::AlreadyBound(name.to_string()));
        }
        scope.vars.insert(name.to_string(), value);
        Ok(())
    }

    pub fn define_all(&self, bindings: Bindings) -> Result<(), EnvError> {
        for (name, value) in bindings {
            self.define(&name, value)?;
        }
        Ok(())
    }

    /// Overwrites the nearest enclosing binding of `name`.
    pub fn mutate(&self, name: &str, value: Value) -> Result<(), EnvError> {
        let mut current = self.clone();
        loop {
            let parent = {
                let mut scope = current.0.borrow_mut();
                if let Some(slot) = scope.vars.get_mut(name) {
                    *slot = value;
                    return Ok(());
                }
                scope.parent.clone()
            };
            match parent {
                Some(p) => current = p,
                None => return Err(EnvError::Unbound(name.to_string())),
            }
        }
    }

    pub fn lookup(&self, name: &str) -> Result<Value, EnvError> {
        let mut current = self.clone();
        loop {
            let parent = {
                let scope = current.0.borrow();
                if let Some(v) = scope.vars.get(name) {
                    return Ok(v.clone());
                }
                scope.parent.clone()
            };
            match parent {
                Some(p) => current = p,
                None => return Err(EnvError::Undefined(name.to_string())),
            }
        }
    }

    /// This scope only; used for module exports.
    pub fn lookup_local(&self, name: &str) -> Option<Value> {
        self.0.borrow().vars.get(name).cloned()
    }

    pub fn local_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.0.borrow().vars.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn ptr_eq(&self, other: &Env) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Env {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // values may hold closures capturing this scope; names only
        f.debug_struct("Env")
            .field("names", &self.local_names())
            .field("has_parent", &self.0.borrow().parent.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn define_then_lookup() {
        let env = Env::root();
        env.define("x", Value::int(1)).unwrap();
        assert_eq!(env.lookup("x").unwrap(), Value::int(1));
    }

    #[test]
    fn define_twice_in_one_scope_fails() {
        let env = Env::root();
        env.define("x", Value::int(1)).unwrap();
        assert_eq!(env.define("x", Value::int(2)), Err(EnvError::AlreadyBound("x".into())));
    }

    #[test]
    fn shadowing_across_scopes_is_allowed() {
        let outer = Env::root();
        outer.define("x", Value::int(1)).unwrap();
        let inner = Env::child(&outer);
        inner.define("x", Value::int(2)).unwrap();
        assert_eq!(inner.lookup("x").unwrap(), Value::int(2));
        assert_eq!(outer.lookup("x").unwrap(), Value::int(1));
    }

    #[test]
    fn mutate_hits_nearest_owner() {
        let outer = Env::root();
        outer.define("x", Value::int(1)).unwrap();
        let inner = Env::child(&outer);
        inner.mutate("x", Value::int(5)).unwrap();
        assert_eq!(outer.lookup("x").unwrap(), Value::int(5));
        assert_eq!(inner.lookup_local("x"), None);
    }

    #[test]
    fn mutate_unbound_fails() {
        let env = Env::child(&Env::root());
        let err = env.mutate("nope", Value::Unit).unwrap_err();
        assert_eq!(err.to_string(), "Cannot mutate 'nope': name is not bound in any enclosing scope");
    }

    #[test]
    fn lookup_undefined_maps_to_name_error() {
        let env = Env::root();
        let err: EvalError = env.lookup("ghost").unwrap_err().into();
        assert_eq!(err.kind, ErrorKind::Undefined);
        assert_eq!(err.message, "Undefined name 'ghost'");
        assert_eq!(err.code(), "E-NAME");
    }

    #[test]
    fn lookup_local_ignores_parent() {
        let outer = Env::root();
        outer.define("x", Value::int(1)).unwrap();
        let inner = Env::child(&outer);
        assert!(inner.lookup_local("x").is_none());
        assert!(inner.lookup("x").is_ok());
    }
}
