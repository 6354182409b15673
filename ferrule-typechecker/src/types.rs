//! Type values manipulated by the solver

use crate::symbols::SymbolId;
use indexmap::IndexMap;
use std::fmt;

/// A set of types keyed by absolute type name
///
/// Membership matters, order does not: two unions are equal when they hold the same names.
/// Iteration follows insertion order so output stays deterministic.
#[derive(Debug, Clone, Default)]
pub struct UnionType {
    members: IndexMap<String, SymbolId>,
}

impl UnionType {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(name: impl Into<String>, symbol: SymbolId) -> Self {
        let mut union = Self::new();
        union.insert(name, symbol);
        union
    }

    pub fn insert(&mut self, name: impl Into<String>, symbol: SymbolId) -> bool {
        self.members.insert(name.into(), symbol).is_none()
    }

    pub fn remove(&mut self, name: &str) -> Option<SymbolId> {
        self.members.shift_remove(name)
    }

    /// Add every member of `other`; returns whether anything was added
    pub fn extend(&mut self, other: &UnionType) -> bool {
        let mut added = false;
        for (name, symbol) in &other.members {
            added |= self.insert(name.clone(), *symbol);
        }
        added
    }

    pub fn contains(&self, name: &str) -> bool {
        self.members.contains_key(name)
    }

    pub fn contains_symbol(&self, symbol: SymbolId) -> bool {
        self.members.values().any(|member| *member == symbol)
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.members.keys().map(String::as_str)
    }

    pub fn symbols(&self) -> impl Iterator<Item = SymbolId> + '_ {
        self.members.values().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, SymbolId)> + '_ {
        self.members.iter().map(|(name, symbol)| (name.as_str(), *symbol))
    }

    /// Member names sorted alphabetically, for order-independent comparisons
    pub fn sorted_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.names().collect();
        names.sort_unstable();
        names
    }
}

impl PartialEq for UnionType {
    fn eq(&self, other: &Self) -> bool {
        self.members.len() == other.members.len()
            && self.members.keys().all(|name| other.members.contains_key(name))
    }
}

impl Eq for UnionType {}

impl fmt::Display for UnionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (index, name) in self.members.keys().enumerate() {
            if index > 0 {
                write!(f, " | ")?;
            }
            write!(f, "{name}")?;
        }
        write!(f, "}}")
    }
}

/// Current bounds of one type variable within a binding collection
///
/// An empty upper bound means unconstrained. Fixed references (literals, declared or bound
/// parameters) are never recomputed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeVariableReference {
    pub lower_type_bound: UnionType,
    pub upper_type_bound: UnionType,
    pub is_fixed: bool,
}

impl TypeVariableReference {
    pub fn fixed(bound: UnionType) -> Self {
        Self {
            lower_type_bound: bound.clone(),
            upper_type_bound: bound,
            is_fixed: true,
        }
    }

    /// Result of a solved expression: both bounds are the computed type
    pub fn resolved(bound: UnionType) -> Self {
        Self::bounded(bound.clone(), bound)
    }

    pub fn bounded(lower: UnionType, upper: UnionType) -> Self {
        Self {
            lower_type_bound: lower,
            upper_type_bound: upper,
            is_fixed: false,
        }
    }
}

/// Declared type of one overload parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterType {
    pub bound: UnionType,
    /// Whether arguments may reach the parameter through an implicit conversion
    pub is_convertible: bool,
}

impl ParameterType {
    pub fn new(bound: UnionType) -> Self {
        Self {
            bound,
            is_convertible: false,
        }
    }

    pub fn convertible(bound: UnionType) -> Self {
        Self {
            bound,
            is_convertible: true,
        }
    }
}

impl fmt::Display for ParameterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_convertible {
            write!(f, "as {}", self.bound)
        } else {
            write!(f, "{}", self.bound)
        }
    }
}

/// One concrete signature of a function or operator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Overload {
    pub method: SymbolId,
    pub parameters: Vec<ParameterType>,
    pub return_type: UnionType,
}

impl Overload {
    pub fn arity(&self) -> usize {
        self.parameters.len()
    }

    pub fn has_convertible_parameters(&self) -> bool {
        self.parameters.iter().any(|parameter| parameter.is_convertible)
    }
}

impl fmt::Display for Overload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parameters = self
            .parameters
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "({parameters}) -> {}", self.return_type)
    }
}
