//! Ferrule Typechecker
//!
//! Constraint-based type inference and identifier resolution for dynamically typed scripting
//! languages without mandatory annotations.

// Allow clippy lints for development
#![allow(clippy::too_many_arguments)]
#![allow(clippy::uninlined_format_args)]
//!
//! ## Architecture
//!
//! The engine is driven by an external traversal of the syntax tree in three passes, followed by
//! a single solve:
//!
//! - **Definition pass**: builds namespace, method and conditional scopes and defines symbols
//! - **Reference pass**: binds identifiers through an ordered resolver chain (user symbols,
//!   super-globals, built-ins) and reports definition problems
//! - **Inference pass**: turns every expression into a type variable with a ref, transfer or
//!   intersection constraint
//! - **Solver**: computes lower bounds per binding collection, synthesizes overloads for
//!   untyped parameters and picks the most specific overload at every call, solving functions
//!   in parallel rounds and re-queuing callers when a callee's signature changes
//!
//! ## Diagnostics
//!
//! Language-level problems are reported as structured [`Issue`]s (message key, severity,
//! positions, named parameters). Driver contract violations are [`EngineError`]s.

pub mod ast;
pub mod builtins;
pub mod config;
pub mod constraints;
pub mod controllers;
pub mod dependency_graph;
pub mod engine;
pub mod error;
pub mod hierarchy;
pub mod issues;
pub mod overload;
pub mod resolution;
pub mod scopes;
pub mod solver;
pub mod symbols;
pub mod types;

// Re-export public API
pub use ast::{Ast, LiteralKind, Node, NodeId, NodeKind, Position};
pub use builtins::{BuiltinProvider, CoreRegistrar, StandardLibrary};
pub use config::{EngineConfig, SolverConfig};
pub use constraints::{BindingCollection, CollectionKey, Constraint, ConstraintStore, TypeVariableId};
pub use controllers::{DefinitionController, InferenceController, ReferenceController};
pub use engine::{InferenceEngine, InferenceEngineBuilder};
pub use error::{EngineError, EngineResult};
pub use hierarchy::TypeHierarchy;
pub use issues::{Issue, IssueCollector, IssueKind, IssueReporter, Severity};
pub use overload::OverloadDecider;
pub use resolution::{Identifier, IdentifierKind, ResolverChain, SymbolResolver};
pub use scopes::{ScopeId, SymbolTable};
pub use solver::{ConstraintSolver, SolverState};
pub use symbols::{Symbol, SymbolId, SymbolKind};
pub use types::{Overload, ParameterType, TypeVariableReference, UnionType};

#[cfg(test)]
mod tests;
