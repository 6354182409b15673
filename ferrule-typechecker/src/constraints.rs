//! Constraint model
//!
//! Every expression value, variable version and call result is a [`TypeVariable`] owned by the
//! [`ConstraintStore`] and registered in exactly one [`ConstraintCollection`]: the one of the
//! enclosing function, or the global collection for namespace-level code.

use crate::ast::Position;
use crate::symbols::SymbolId;
use crate::types::TypeVariableReference;
use indexmap::{IndexMap, IndexSet};
use std::fmt;

/// Handle of a type variable, unique within one compilation run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeVariableId(u32);

impl TypeVariableId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TypeVariableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0)
    }
}

/// Operator or function application
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntersectionConstraint {
    pub operator: SymbolId,
    pub arguments: Vec<TypeVariableId>,
    /// Index of the call within its collection, recorded in the dependency graph
    pub call_site: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constraint {
    /// Value is the join of the sources (assignment, branch merge, loop head)
    Ref(Vec<TypeVariableId>),
    /// Value equals a prior ref variable (read without an operator)
    Transfer(TypeVariableId),
    Intersection(IntersectionConstraint),
}

/// Link from a ref variable to the variable it versions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefOrigin {
    pub variable: SymbolId,
    /// Preceding ref variable; kept for diagnostics only, never traversed by the solver
    pub previous: Option<TypeVariableId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeVariable {
    pub id: TypeVariableId,
    pub name: String,
    pub position: Position,
    pub collection: CollectionKey,
    pub constraint: Constraint,
    /// Known type of literals, constants and declared parameters
    pub fixed_type: Option<SymbolId>,
    pub ref_of: Option<RefOrigin>,
    /// Set on the type variable standing for a function parameter
    pub parameter_index: Option<usize>,
}

impl TypeVariable {
    pub fn is_parameter(&self) -> bool {
        self.parameter_index.is_some()
    }

    pub fn intersection(&self) -> Option<&IntersectionConstraint> {
        match &self.constraint {
            Constraint::Intersection(intersection) => Some(intersection),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CollectionKey {
    /// Namespace-level code of every namespace
    Global,
    Method(SymbolId),
}

impl CollectionKey {
    pub fn method(self) -> Option<SymbolId> {
        match self {
            Self::Global => None,
            Self::Method(method) => Some(method),
        }
    }
}

impl fmt::Display for CollectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => write!(f, "global"),
            Self::Method(method) => write!(f, "method {method}"),
        }
    }
}

/// Type variables of one function or of the global code
#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintCollection {
    pub key: CollectionKey,
    /// Registration order, which is also the solver's evaluation order
    pub type_variables: Vec<TypeVariableId>,
    pub parameters: Vec<TypeVariableId>,
    pub return_variable: Option<TypeVariableId>,
    /// Intersection type variables indexed by call site
    pub call_sites: Vec<TypeVariableId>,
}

impl ConstraintCollection {
    pub fn new(key: CollectionKey) -> Self {
        Self {
            key,
            type_variables: Vec::new(),
            parameters: Vec::new(),
            return_variable: None,
            call_sites: Vec::new(),
        }
    }
}

/// Current ref variable of each variable at one program point
pub type RefHeads = IndexMap<SymbolId, TypeVariableId>;

/// Owner of all type variables and collections of a run
#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintStore {
    variables: Vec<TypeVariable>,
    collections: IndexMap<CollectionKey, ConstraintCollection>,
    heads: IndexMap<CollectionKey, RefHeads>,
}

impl Default for ConstraintStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstraintStore {
    pub fn new() -> Self {
        let mut collections = IndexMap::new();
        collections.insert(
            CollectionKey::Global,
            ConstraintCollection::new(CollectionKey::Global),
        );
        Self {
            variables: Vec::new(),
            collections,
            heads: IndexMap::new(),
        }
    }

    pub fn variable(&self, id: TypeVariableId) -> Option<&TypeVariable> {
        self.variables.get(id.index())
    }

    pub fn variable_mut(&mut self, id: TypeVariableId) -> Option<&mut TypeVariable> {
        self.variables.get_mut(id.index())
    }

    pub fn variables(&self) -> &[TypeVariable] {
        &self.variables
    }

    pub fn collection(&self, key: CollectionKey) -> Option<&ConstraintCollection> {
        self.collections.get(&key)
    }

    pub fn collection_mut(&mut self, key: CollectionKey) -> &mut ConstraintCollection {
        self.collections
            .entry(key)
            .or_insert_with(|| ConstraintCollection::new(key))
    }

    /// Collections in registration order; the global collection comes first
    pub fn collections(&self) -> impl Iterator<Item = &ConstraintCollection> + '_ {
        self.collections.values()
    }

    /// Allocate a type variable and register it in its collection
    pub fn add_variable(
        &mut self,
        name: impl Into<String>,
        position: Position,
        collection: CollectionKey,
        constraint: Constraint,
    ) -> TypeVariableId {
        let id = TypeVariableId(self.variables.len() as u32);
        let is_call = matches!(constraint, Constraint::Intersection(_));
        self.variables.push(TypeVariable {
            id,
            name: name.into(),
            position,
            collection,
            constraint,
            fixed_type: None,
            ref_of: None,
            parameter_index: None,
        });
        let entry = self.collection_mut(collection);
        entry.type_variables.push(id);
        if is_call {
            entry.call_sites.push(id);
        }
        id
    }

    pub fn next_call_site(&self, collection: CollectionKey) -> usize {
        self.collection(collection)
            .map(|entry| entry.call_sites.len())
            .unwrap_or(0)
    }

    pub fn head(&self, collection: CollectionKey, variable: SymbolId) -> Option<TypeVariableId> {
        self.heads
            .get(&collection)
            .and_then(|heads| heads.get(&variable))
            .copied()
    }

    /// Make `head` the current version of `variable` in the collection owning `head`
    pub fn set_head(&mut self, variable: SymbolId, head: TypeVariableId) {
        let Some(collection) = self.variable(head).map(|entry| entry.collection) else {
            return;
        };
        self.heads.entry(collection).or_default().insert(variable, head);
    }

    /// Heads of all variables versioned in `collection`
    pub fn heads_in(&self, collection: CollectionKey) -> RefHeads {
        self.heads.get(&collection).cloned().unwrap_or_default()
    }

    /// Reset the heads of `collection` to a snapshot taken by [`Self::heads_in`]
    ///
    /// Variables first written after the snapshot lose their head.
    pub fn restore_heads(&mut self, collection: CollectionKey, heads: &RefHeads) {
        self.heads.insert(collection, heads.clone());
    }
}

/// Bounds of every type variable of one collection under one choice of parameter types
///
/// Collections with untyped parameters fork into several binding collections, one per
/// synthesized overload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingCollection {
    pub key: CollectionKey,
    pub bindings: IndexMap<TypeVariableId, TypeVariableReference>,
    /// Call sites resolved through an implicit conversion
    pub convertible_calls: IndexSet<TypeVariableId>,
    /// Parameter indices bound to a convertible parameter type
    pub convertible_parameters: IndexSet<usize>,
}

impl BindingCollection {
    pub fn new(key: CollectionKey) -> Self {
        Self {
            key,
            bindings: IndexMap::new(),
            convertible_calls: IndexSet::new(),
            convertible_parameters: IndexSet::new(),
        }
    }

    pub fn get(&self, variable: TypeVariableId) -> Option<&TypeVariableReference> {
        self.bindings.get(&variable)
    }

    /// Record whether the overload chosen at `call` needs an implicit conversion
    ///
    /// A call may switch overloads between passes, so an exact choice withdraws an earlier
    /// converting one.
    pub fn record_call(&mut self, call: TypeVariableId, converting: bool) {
        if converting {
            self.convertible_calls.insert(call);
        } else {
            self.convertible_calls.shift_remove(&call);
        }
    }

    /// Number of implicit conversions this binding has committed to
    pub fn convertible_applications(&self) -> usize {
        self.convertible_calls.len() + self.convertible_parameters.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scopes::SymbolTable;

    #[test]
    fn test_variables_register_in_their_collection() {
        let table = SymbolTable::new(0);
        let method = CollectionKey::Method(table.erroneous_type());
        let mut store = ConstraintStore::new();

        let literal = store.add_variable("1", Position::new(1, 1), CollectionKey::Global, Constraint::Ref(vec![]));
        let call = store.add_variable(
            "f()",
            Position::new(2, 1),
            method,
            Constraint::Intersection(IntersectionConstraint {
                operator: table.erroneous_type(),
                arguments: vec![literal],
                call_site: 0,
            }),
        );

        let global = store.collection(CollectionKey::Global).expect("global collection");
        assert_eq!(global.type_variables, vec![literal]);
        let method_collection = store.collection(method).expect("method collection");
        assert_eq!(method_collection.call_sites, vec![call]);
        assert_eq!(store.next_call_site(method), 1);
        assert_eq!(call.to_string(), "T1");
    }

    #[test]
    fn test_heads_are_kept_per_collection() {
        let table = SymbolTable::new(0);
        let variable = table.erroneous_type();
        let method = CollectionKey::Method(variable);
        let mut store = ConstraintStore::new();

        let outer = store.add_variable("$g", Position::new(1, 1), CollectionKey::Global, Constraint::Ref(vec![]));
        store.set_head(variable, outer);
        let inner = store.add_variable("$g", Position::new(2, 1), method, Constraint::Ref(vec![]));
        store.set_head(variable, inner);

        assert_eq!(store.head(CollectionKey::Global, variable), Some(outer));
        assert_eq!(store.head(method, variable), Some(inner));

        store.restore_heads(method, &RefHeads::new());
        assert_eq!(store.head(method, variable), None);
        assert_eq!(store.head(CollectionKey::Global, variable), Some(outer));
    }

    #[test]
    fn test_exact_choice_withdraws_a_conversion() {
        let mut binding = BindingCollection::new(CollectionKey::Global);
        let call = TypeVariableId(3);

        binding.record_call(call, true);
        assert_eq!(binding.convertible_applications(), 1);
        binding.record_call(call, false);
        assert_eq!(binding.convertible_applications(), 0);
    }
}
