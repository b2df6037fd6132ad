//! Variables, procedures, and the scope tree.
//!
//! One global scope sits at the root.  Procedure calls push call scopes
//! whose parent is the caller's current scope (dynamic scoping), and
//! `namespace eval` creates persistent named children of the active scope.
//! Scopes live in a [`ScopePool`] slab and are addressed by [`ScopeId`];
//! variables are `Rc`-shared so `global` can alias one binding into a call
//! scope.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::value::Value;

// ── Variable ──────────────────────────────────────────────────────────────────

/// Change observer, called synchronously after each successful write.
pub type ObserverFn = Rc<dyn Fn(&Variable)>;

static NEXT_OBSERVER_ID: AtomicU64 = AtomicU64::new(1);

/// A named binding: a held [`Value`] plus registered write observers.
///
/// `env`-backed variables hold no value of their own; the interpreter
/// answers their element reads from the process environment.
pub struct Variable {
    value: Value,
    env_backed: bool,
    observers: Vec<(u64, ObserverFn)>,
}

/// Shared handle to a variable; `global` aliases one into a second scope.
pub type VarRef = Rc<std::cell::RefCell<Variable>>;

impl fmt::Debug for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Variable")
            .field("value", &self.value)
            .field("env_backed", &self.env_backed)
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl Variable {
    pub fn new(value: Value) -> Self {
        Self {
            value,
            env_backed: false,
            observers: Vec::new(),
        }
    }

    /// The `env` pseudo-variable: element reads go to the process
    /// environment, the whole-variable value stays empty.
    pub fn env() -> Self {
        Self {
            value: Value::None,
            env_backed: true,
            observers: Vec::new(),
        }
    }

    pub fn is_env(&self) -> bool {
        self.env_backed
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn set_value(&mut self, value: Value) {
        self.value = value;
        self.notify();
    }

    /// Read one array slot.  `None` when the variable does not hold an
    /// array or the slot is missing.
    pub fn array_value(&self, index: &str) -> Option<Value> {
        match &self.value {
            Value::Array(map) => map.get(index).cloned(),
            _ => None,
        }
    }

    /// Write one array slot.  Non-array values are left unchanged;
    /// observers fire either way.
    pub fn set_array_value(&mut self, index: &str, value: Value) {
        if let Value::Array(map) = &mut self.value {
            map.insert(index.to_owned(), value);
        }
        self.notify();
    }

    /// Append: strings concatenate, lists push, anything else is replaced.
    pub fn append_value(&mut self, value: Value) {
        match &mut self.value {
            Value::Str(s) => s.push_str(&value.to_string()),
            Value::List(items) => items.push(value),
            _ => self.set_value(value),
        }
    }

    pub fn add_observer(&mut self, observer: ObserverFn) -> u64 {
        let id = NEXT_OBSERVER_ID.fetch_add(1, Ordering::Relaxed);
        self.observers.push((id, observer));
        id
    }

    fn notify(&self) {
        for (_, observer) in &self.observers {
            observer(self);
        }
    }
}

// ── Proc ──────────────────────────────────────────────────────────────────────

/// A user-defined procedure.  The body is kept as written and re-parsed
/// on every call.
#[derive(Debug, Clone)]
pub struct Proc {
    name: String,
    args: Vec<String>,
    body: Value,
}

impl Proc {
    pub fn new(name: &str, args: Vec<String>, body: Value) -> Self {
        Self {
            name: name.to_owned(),
            args,
            body,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn body(&self) -> &Value {
        &self.body
    }
}

// ── Scope ─────────────────────────────────────────────────────────────────────

/// Index of a scope inside the [`ScopePool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(usize);

/// The global scope's id; slot 0 is allocated at pool construction.
pub const GLOBAL_SCOPE: ScopeId = ScopeId(0);

/// One scope: local variables, local procedures, and named child scopes.
#[derive(Debug, Default)]
pub struct Scope {
    parent: Option<ScopeId>,
    named: bool,
    vars: BTreeMap<String, VarRef>,
    procs: BTreeMap<String, Rc<Proc>>,
    children: BTreeMap<String, ScopeId>,
}

impl Scope {
    pub fn parent(&self) -> Option<ScopeId> {
        self.parent
    }

    pub fn var(&self, name: &str) -> Option<VarRef> {
        self.vars.get(name).cloned()
    }

    pub fn has_var(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    /// Bind `var` under `name`, replacing any previous binding.
    pub fn add_var(&mut self, name: &str, var: VarRef) -> VarRef {
        self.vars.insert(name.to_owned(), Rc::clone(&var));
        var
    }

    /// Bind a fresh variable holding `value`.
    pub fn add_value(&mut self, name: &str, value: Value) -> VarRef {
        self.add_var(name, Rc::new(std::cell::RefCell::new(Variable::new(value))))
    }

    pub fn remove_var(&mut self, name: &str) {
        self.vars.remove(name);
    }

    pub fn var_names(&self) -> Vec<String> {
        self.vars.keys().cloned().collect()
    }

    pub fn proc(&self, name: &str) -> Option<Rc<Proc>> {
        self.procs.get(name).cloned()
    }

    /// Define (or redefine) a procedure in this scope.
    pub fn define_proc(&mut self, name: &str, args: Vec<String>, body: Value) -> Rc<Proc> {
        let proc = Rc::new(Proc::new(name, args, body));
        self.procs.insert(name.to_owned(), Rc::clone(&proc));
        proc
    }

    pub fn remove_proc(&mut self, name: &str) {
        self.procs.remove(name);
    }

    pub fn proc_names(&self) -> Vec<String> {
        self.procs.keys().cloned().collect()
    }

    pub fn named_child(&self, name: &str) -> Option<ScopeId> {
        self.children.get(name).copied()
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }
}

// ── ScopePool ─────────────────────────────────────────────────────────────────

/// Slab of scopes.  Call scopes are reclaimed when popped; named scopes
/// (and any call scope that acquired named children) stay allocated for
/// the life of the interpreter.
#[derive(Debug)]
pub struct ScopePool {
    slots: Vec<Option<Scope>>,
    free: Vec<usize>,
}

impl Default for ScopePool {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopePool {
    pub fn new() -> Self {
        Self {
            slots: vec![Some(Scope::default())],
            free: Vec::new(),
        }
    }

    pub fn get(&self, id: ScopeId) -> &Scope {
        match self.slots[id.0].as_ref() {
            Some(scope) => scope,
            None => unreachable!("stale scope id {:?}", id),
        }
    }

    pub fn get_mut(&mut self, id: ScopeId) -> &mut Scope {
        match self.slots[id.0].as_mut() {
            Some(scope) => scope,
            None => unreachable!("stale scope id {:?}", id),
        }
    }

    /// Allocate a call scope with the given parent.
    pub fn alloc(&mut self, parent: ScopeId) -> ScopeId {
        let scope = Scope {
            parent: Some(parent),
            ..Scope::default()
        };
        match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = Some(scope);
                ScopeId(slot)
            }
            None => {
                self.slots.push(Some(scope));
                ScopeId(self.slots.len() - 1)
            }
        }
    }

    /// Reclaim a popped call scope.  The global scope, named scopes, and
    /// scopes with named children are kept (a namespace must outlive the
    /// stack frame it was entered from).
    pub fn release(&mut self, id: ScopeId) {
        if id == GLOBAL_SCOPE {
            return;
        }
        let scope = self.get(id);
        if scope.named || scope.has_children() {
            return;
        }
        self.slots[id.0] = None;
        self.free.push(id.0);
    }

    /// Find or create the named child scope of `parent`.
    pub fn ensure_named_child(&mut self, parent: ScopeId, name: &str) -> ScopeId {
        if let Some(child) = self.get(parent).named_child(name) {
            return child;
        }
        let child = self.alloc(parent);
        self.get_mut(child).named = true;
        self.get_mut(parent)
            .children
            .insert(name.to_owned(), child);
        child
    }

    /// Chain lookup: `from` and then its parents.
    pub fn lookup_var(&self, from: ScopeId, name: &str) -> Option<VarRef> {
        let mut current = Some(from);
        while let Some(id) = current {
            let scope = self.get(id);
            if let Some(var) = scope.var(name) {
                return Some(var);
            }
            current = scope.parent();
        }
        None
    }

    /// Chain lookup for procedures.
    pub fn lookup_proc(&self, from: ScopeId, name: &str) -> Option<Rc<Proc>> {
        let mut current = Some(from);
        while let Some(id) = current {
            let scope = self.get(id);
            if let Some(proc) = scope.proc(name) {
                return Some(proc);
            }
            current = scope.parent();
        }
        None
    }
}
