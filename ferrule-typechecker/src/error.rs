//! Error types for the inference engine
//!
//! Language-level problems (undefined names, bad calls, ...) are never errors here; they are
//! reported as [`crate::issues::Issue`]s. `EngineError` covers contract violations by the
//! traversal driver and misconfigured collaborators.

use crate::ast::{NodeId, Position};
use crate::scopes::ScopeId;
use crate::symbols::SymbolId;
use miette::{Diagnostic, SourceSpan};
use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Error, Diagnostic, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Node {node} does not exist in the syntax tree")]
    #[diagnostic(
        code(ferrule::engine::unknown_node),
        help("Node ids must come from the same Ast that is being analysed")
    )]
    UnknownNode { node: NodeId },

    #[error("Node {node} has no scope assigned")]
    #[diagnostic(
        code(ferrule::engine::node_without_scope),
        help("Run the definition pass over the node before referencing or inferring it")
    )]
    NodeWithoutScope { node: NodeId },

    #[error("Node {node} has no symbol assigned")]
    #[diagnostic(
        code(ferrule::engine::node_without_symbol),
        help("Definitions and references must be processed before the inference pass")
    )]
    NodeWithoutSymbol { node: NodeId },

    #[error("Node {node} has no type variable assigned")]
    #[diagnostic(
        code(ferrule::engine::node_without_type_variable),
        help("Operands must be inferred before the expression that consumes them")
    )]
    NodeWithoutTypeVariable { node: NodeId },

    #[error("Scope handle {scope} belongs to a previous run or does not exist")]
    #[diagnostic(
        code(ferrule::engine::stale_scope),
        help("Handles are invalidated by reset(); look them up again")
    )]
    StaleScope { scope: ScopeId },

    #[error("Symbol handle {symbol} belongs to a previous run or does not exist")]
    #[diagnostic(
        code(ferrule::engine::stale_symbol),
        help("Handles are invalidated by reset(); look them up again")
    )]
    StaleSymbol { symbol: SymbolId },

    #[error("Symbol '{symbol}' has no definition scope")]
    #[diagnostic(code(ferrule::engine::missing_definition_scope))]
    MissingDefinitionScope { symbol: String },

    #[error("Expected {expected} at {node}, found {found}")]
    #[diagnostic(code(ferrule::engine::unexpected_node))]
    UnexpectedNode {
        node: NodeId,
        expected: String,
        found: String,
    },

    #[error("Expected a {expected} scope, found {found}")]
    #[diagnostic(code(ferrule::engine::unexpected_scope))]
    UnexpectedScope { expected: String, found: String },

    #[error("Symbol '{symbol}' is not a {expected}")]
    #[diagnostic(code(ferrule::engine::unexpected_symbol))]
    UnexpectedSymbol { symbol: String, expected: String },

    #[error("Unknown operator '{operator}'")]
    #[diagnostic(
        code(ferrule::engine::unknown_operator),
        help("Operators must be registered by a built-in provider")
    )]
    UnknownOperator { operator: String },

    #[error("Type variable {variable} does not exist")]
    #[diagnostic(code(ferrule::engine::unknown_type_variable))]
    UnknownTypeVariable { variable: String },

    #[error("Type variable {variable} cannot take a reference constraint")]
    #[diagnostic(code(ferrule::engine::invalid_constraint))]
    InvalidConstraint { variable: String },

    #[error("Cannot {operation} while the solver is {state}")]
    #[diagnostic(
        code(ferrule::engine::invalid_solver_state),
        help("Call reset() before analysing a new compilation unit")
    )]
    InvalidSolverState {
        operation: &'static str,
        state: String,
    },

    #[error("Failed to build the solver worker pool: {message}")]
    #[diagnostic(code(ferrule::engine::worker_pool))]
    WorkerPool { message: String },

    #[error("Invalid built-in signature '{signature}': {reason}")]
    #[diagnostic(code(ferrule::builtins::invalid_signature))]
    InvalidSignature { signature: String, reason: String },

    #[error("Built-in type '{name}' is not registered")]
    #[diagnostic(
        code(ferrule::builtins::unknown_type),
        help("Register parent and parameter types before the declarations that use them")
    )]
    UnknownBuiltinType { name: String },
}

impl EngineError {
    pub fn unexpected_node(node: NodeId, expected: impl Into<String>, found: impl ToString) -> Self {
        Self::UnexpectedNode {
            node,
            expected: expected.into(),
            found: found.to_string(),
        }
    }
}

/// Map a line/column position onto a byte span of `source`
///
/// Lines and columns are 1-based. Returns `None` if the position is outside the source.
pub fn to_source_span(source: &str, position: Position, len: usize) -> Option<SourceSpan> {
    if position.line == 0 || position.column == 0 {
        return None;
    }

    let mut offset = 0;
    for (index, line) in source.split_inclusive('\n').enumerate() {
        if index + 1 == position.line as usize {
            let column = position.column as usize - 1;
            if column > line.len() {
                return None;
            }
            return Some(SourceSpan::new((offset + column).into(), len));
        }
        offset += line.len();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_span_from_line_and_column() {
        let source = "$a = 1;\necho $a;\n";
        let span = to_source_span(source, Position::new(2, 6), 2).expect("in range");

        assert_eq!(span.offset(), 13);
        assert_eq!(span.len(), 2);
        assert_eq!(&source[span.offset()..span.offset() + span.len()], "$a");
    }

    #[test]
    fn test_source_span_outside_source() {
        assert!(to_source_span("echo 1;", Position::new(3, 1), 1).is_none());
        assert!(to_source_span("echo 1;", Position::new(0, 1), 1).is_none());
    }
}
