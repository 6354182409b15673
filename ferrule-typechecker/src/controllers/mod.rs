//! Phase controllers
//!
//! The external traversal driver walks the syntax tree three times and calls into one
//! controller per pass: [`DefinitionController`] builds scopes and declarations,
//! [`ReferenceController`] binds identifiers and checks definitions, and
//! [`InferenceController`] turns expressions into constraints for the solver.

pub mod definition;
pub mod inference;
pub mod reference;

pub use definition::DefinitionController;
pub use inference::InferenceController;
pub use reference::ReferenceController;

use crate::ast::{Ast, Node, NodeId, NodeKind};
use crate::constraints::TypeVariableId;
use crate::error::{EngineError, EngineResult};
use crate::scopes::ScopeId;
use crate::symbols::SymbolId;

pub(crate) fn node(ast: &Ast, id: NodeId) -> EngineResult<&Node> {
    ast.get(id).ok_or(EngineError::UnknownNode { node: id })
}

pub(crate) fn node_mut(ast: &mut Ast, id: NodeId) -> EngineResult<&mut Node> {
    ast.get_mut(id).ok_or(EngineError::UnknownNode { node: id })
}

/// Fail unless `id` is a node of the given kind
pub(crate) fn expect_kind(ast: &Ast, id: NodeId, kind: NodeKind) -> EngineResult<&Node> {
    let found = node(ast, id)?;
    if found.kind != kind {
        return Err(EngineError::unexpected_node(id, format!("{kind:?}"), format!("{:?}", found.kind)));
    }
    Ok(found)
}

pub(crate) fn scope_of(ast: &Ast, id: NodeId) -> EngineResult<ScopeId> {
    node(ast, id)?
        .scope
        .ok_or(EngineError::NodeWithoutScope { node: id })
}

pub(crate) fn symbol_of(ast: &Ast, id: NodeId) -> EngineResult<SymbolId> {
    node(ast, id)?
        .symbol
        .ok_or(EngineError::NodeWithoutSymbol { node: id })
}

pub(crate) fn type_variable_of(ast: &Ast, id: NodeId) -> EngineResult<TypeVariableId> {
    node(ast, id)?
        .type_variable
        .ok_or(EngineError::NodeWithoutTypeVariable { node: id })
}
