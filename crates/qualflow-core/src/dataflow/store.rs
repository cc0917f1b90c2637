//! Abstract state: refined qualifiers of flow-sensitive expressions
//!
//! A key that is absent from a reachable [`Store`] carries no refinement and
//! behaves as the hierarchy's top. Equality is semantic: an explicit top entry
//! equals a missing one.

use crate::qualifiers::{Qualifier, QualifierHierarchy};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// An expression whose qualifier can be tracked across program points
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FlowKey {
    Local(String),
    This,
    Field {
        receiver: Box<FlowKey>,
        field: String,
    },
    /// Result of a side-effect free call on trackable operands
    PureCall {
        receiver: Option<Box<FlowKey>>,
        method: String,
        args: Vec<FlowKey>,
    },
    /// Only appears as an argument of a [`FlowKey::PureCall`]
    Literal(String),
}

impl FlowKey {
    pub fn local(name: impl Into<String>) -> Self {
        FlowKey::Local(name.into())
    }

    pub fn field(receiver: FlowKey, field: impl Into<String>) -> Self {
        FlowKey::Field {
            receiver: Box::new(receiver),
            field: field.into(),
        }
    }

    /// Whether a store may hold an entry for this key.
    pub fn is_refinable(&self) -> bool {
        !matches!(self, FlowKey::Literal(_))
    }

    pub fn mentions_local(&self, name: &str) -> bool {
        match self {
            FlowKey::Local(local) => local == name,
            FlowKey::This | FlowKey::Literal(_) => false,
            FlowKey::Field { receiver, .. } => receiver.mentions_local(name),
            FlowKey::PureCall { receiver, args, .. } => {
                receiver.as_ref().is_some_and(|r| r.mentions_local(name)) || args.iter().any(|a| a.mentions_local(name))
            }
        }
    }

    pub fn mentions_field(&self, name: &str) -> bool {
        match self {
            FlowKey::Local(_) | FlowKey::This | FlowKey::Literal(_) => false,
            FlowKey::Field { receiver, field } => field == name || receiver.mentions_field(name),
            FlowKey::PureCall { receiver, args, .. } => {
                receiver.as_ref().is_some_and(|r| r.mentions_field(name)) || args.iter().any(|a| a.mentions_field(name))
            }
        }
    }

    /// Whether the key's value can change through a write to the heap.
    pub fn is_heap_dependent(&self) -> bool {
        matches!(self, FlowKey::Field { .. } | FlowKey::PureCall { .. })
    }
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowKey::Local(name) => write!(f, "{name}"),
            FlowKey::This => write!(f, "this"),
            FlowKey::Field { receiver, field } => write!(f, "{receiver}.{field}"),
            FlowKey::PureCall { receiver, method, args } => {
                if let Some(r) = receiver {
                    write!(f, "{r}.")?;
                }
                let args: Vec<String> = args.iter().map(ToString::to_string).collect();
                write!(f, "{method}({})", args.join(", "))
            }
            FlowKey::Literal(text) => write!(f, "{text:?}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Store {
    values: BTreeMap<FlowKey, Qualifier>,
    top: Qualifier,
    reachable: bool,
}

impl Store {
    /// An empty reachable store: every key is top.
    pub fn new(hierarchy: &QualifierHierarchy) -> Self {
        Self {
            values: BTreeMap::new(),
            top: hierarchy.top(),
            reachable: true,
        }
    }

    /// The store of a program point no execution reaches; identity of join.
    pub fn unreachable(hierarchy: &QualifierHierarchy) -> Self {
        Self {
            values: BTreeMap::new(),
            top: hierarchy.top(),
            reachable: false,
        }
    }

    pub fn is_reachable(&self) -> bool {
        self.reachable
    }

    pub fn get(&self, key: &FlowKey) -> Option<Qualifier> {
        self.values.get(key).copied()
    }

    pub fn value_or_top(&self, key: &FlowKey) -> Qualifier {
        self.get(key).unwrap_or(self.top)
    }

    pub fn insert(&mut self, key: FlowKey, qualifier: Qualifier) {
        if key.is_refinable() {
            self.values.insert(key, qualifier);
        }
    }

    pub fn remove(&mut self, key: &FlowKey) -> Option<Qualifier> {
        self.values.remove(key)
    }

    /// Narrow `key` to the meet of its current value and `qualifier`.
    pub fn refine(&mut self, key: FlowKey, qualifier: Qualifier, hierarchy: &QualifierHierarchy) {
        let current = self.value_or_top(&key);
        self.insert(key, hierarchy.meet(current, qualifier));
    }

    pub fn invalidate_local(&mut self, name: &str) {
        self.values.retain(|key, _| !key.mentions_local(name));
    }

    /// Forget what a write to field `name` may change: every key reading that
    /// field and every pure-call result.
    pub fn invalidate_field(&mut self, name: &str) {
        self.values
            .retain(|key, _| !key.mentions_field(name) && !matches!(key, FlowKey::PureCall { .. }));
    }

    /// Forget everything an arbitrary call may change.
    pub fn invalidate_heap(&mut self) {
        self.values.retain(|key, _| !key.is_heap_dependent());
    }

    pub fn keys(&self) -> impl Iterator<Item = &FlowKey> {
        self.values.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FlowKey, Qualifier)> {
        self.values.iter().map(|(k, q)| (k, *q))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Key-wise least upper bound. A key present on one side only is mapped
    /// to top explicitly.
    pub fn join(&self, other: &Store, hierarchy: &QualifierHierarchy) -> Store {
        if !self.reachable {
            return other.clone();
        }
        if !other.reachable {
            return self.clone();
        }
        let keys: BTreeSet<&FlowKey> = self.values.keys().chain(other.values.keys()).collect();
        let values = keys
            .into_iter()
            .map(|key| {
                let joined = match (self.get(key), other.get(key)) {
                    (Some(a), Some(b)) => hierarchy.join(a, b),
                    _ => hierarchy.top(),
                };
                (key.clone(), joined)
            })
            .collect();
        Store {
            values,
            top: self.top,
            reachable: true,
        }
    }

    /// Whether every key of `self` is at or below its value in `other`.
    pub fn is_subsumed_by(&self, other: &Store, hierarchy: &QualifierHierarchy) -> bool {
        if !self.reachable {
            return true;
        }
        if !other.reachable {
            return false;
        }
        other
            .values
            .keys()
            .chain(self.values.keys())
            .all(|key| hierarchy.is_subtype(self.value_or_top(key), other.value_or_top(key)))
    }

    /// Render with qualifier names, e.g. `{s: Untainted, this.f: Top}`.
    pub fn render(&self, hierarchy: &QualifierHierarchy) -> String {
        if !self.reachable {
            return "unreachable".to_string();
        }
        let entries: Vec<String> = self
            .values
            .iter()
            .map(|(key, q)| format!("{key}: {}", hierarchy.name(*q)))
            .collect();
        format!("{{{}}}", entries.join(", "))
    }
}

impl PartialEq for Store {
    fn eq(&self, other: &Self) -> bool {
        if self.reachable != other.reachable {
            return false;
        }
        self.values
            .keys()
            .chain(other.values.keys())
            .all(|key| self.value_or_top(key) == other.value_or_top(key))
    }
}

/// Output of a node or block: one store, or a pair split on a boolean test
#[derive(Debug, Clone, PartialEq)]
pub enum TransferResult {
    Regular(Store),
    Conditional { then_store: Store, else_store: Store },
}

impl TransferResult {
    pub fn then_store(&self) -> &Store {
        match self {
            TransferResult::Regular(store) => store,
            TransferResult::Conditional { then_store, .. } => then_store,
        }
    }

    pub fn else_store(&self) -> &Store {
        match self {
            TransferResult::Regular(store) => store,
            TransferResult::Conditional { else_store, .. } => else_store,
        }
    }

    /// Collapse to a single store.
    pub fn into_regular(self, hierarchy: &QualifierHierarchy) -> Store {
        match self {
            TransferResult::Regular(store) => store,
            TransferResult::Conditional { then_store, else_store } => then_store.join(&else_store, hierarchy),
        }
    }

    pub fn regular(&self, hierarchy: &QualifierHierarchy) -> Store {
        self.clone().into_regular(hierarchy)
    }

    /// Exchange the two arms (`!` applied to a test).
    pub fn swap(self) -> Self {
        match self {
            TransferResult::Conditional { then_store, else_store } => TransferResult::Conditional {
                then_store: else_store,
                else_store: then_store,
            },
            regular => regular,
        }
    }

    pub fn is_reachable(&self) -> bool {
        self.then_store().is_reachable() || self.else_store().is_reachable()
    }

    /// Pairwise join when both sides are conditional; otherwise both are
    /// collapsed first.
    pub fn join(&self, other: &TransferResult, hierarchy: &QualifierHierarchy) -> TransferResult {
        match (self, other) {
            (
                TransferResult::Conditional {
                    then_store: t1,
                    else_store: e1,
                },
                TransferResult::Conditional {
                    then_store: t2,
                    else_store: e2,
                },
            ) => TransferResult::Conditional {
                then_store: t1.join(t2, hierarchy),
                else_store: e1.join(e2, hierarchy),
            },
            _ => TransferResult::Regular(self.regular(hierarchy).join(&other.regular(hierarchy), hierarchy)),
        }
    }

    pub fn is_subsumed_by(&self, other: &TransferResult, hierarchy: &QualifierHierarchy) -> bool {
        match (self, other) {
            (TransferResult::Regular(a), TransferResult::Regular(b)) => a.is_subsumed_by(b, hierarchy),
            _ => {
                self.then_store().is_subsumed_by(other.then_store(), hierarchy)
                    && self.else_store().is_subsumed_by(other.else_store(), hierarchy)
            }
        }
    }

    pub fn render(&self, hierarchy: &QualifierHierarchy) -> String {
        match self {
            TransferResult::Regular(store) => store.render(hierarchy),
            TransferResult::Conditional { then_store, else_store } => format!(
                "then {} else {}",
                then_store.render(hierarchy),
                else_store.render(hierarchy)
            ),
        }
    }
}
