//! Syntax tree interface shared with the traversal driver
//!
//! Parsing is not done here. The driver builds an [`Ast`] in whatever way suits its
//! grammar and hands node ids to the phase controllers, which read kinds, texts and
//! positions and write back into the `scope`, `symbol` and `type_variable` slots.
//!
//! Shape conventions the controllers rely on:
//! - `Namespace`: text is the namespace path (`\` for the default namespace), children are statements
//! - `Use`: children are `[TypeName target, optional Identifier alias]`
//! - `Constant`: text is the name, the single child is the `Literal` initialiser
//! - `Class`: text is the name
//! - `Function`: text is the name, children are optional modifier `Identifier`s (`nullable`,
//!   `falseable`), then `Parameter`s, then one `Block`
//! - `Parameter`: text is the variable name, an optional `TypeName` child declares its type
//! - `If`: children are `[condition, Block, optional Block]`; `While`: `[condition, Block]`
//! - `Assign`: children are `[Variable, expression]`
//! - `Return`, `Echo`, `ExpressionStatement`: one optional expression child
//! - `Call`: text is the function name, children are arguments
//! - `Variable`, `Identifier` (constant read), `TypeName`: text is the name as written
//! - `Operator`: text is the operator name (`+`, `.`, `unary-`, ...), children are operands

use crate::constraints::TypeVariableId;
use crate::scopes::ScopeId;
use crate::symbols::SymbolId;
use std::fmt;

/// Source position of a node, used for earlier/later comparisons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

impl Position {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Index of a node inside its [`Ast`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Literal categories known to the built-in type provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LiteralKind {
    Int,
    Float,
    String,
    Bool,
    Null,
    Array,
}

/// Token/kind tag of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Root,
    Namespace,
    Use,
    Constant,
    Class,
    Function,
    Parameter,
    Block,
    If,
    While,
    Return,
    Echo,
    ExpressionStatement,
    Assign,
    Variable,
    Identifier,
    TypeName,
    Call,
    Operator,
    Literal(LiteralKind),
}

impl NodeKind {
    /// Whether the node is a statement-level construct
    pub fn is_statement(self) -> bool {
        matches!(
            self,
            Self::Namespace
                | Self::Use
                | Self::Constant
                | Self::Class
                | Self::Function
                | Self::If
                | Self::While
                | Self::Return
                | Self::Echo
                | Self::ExpressionStatement
                | Self::Assign
        )
    }
}

/// A single syntax node together with the slots the core writes into
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub text: String,
    pub position: Position,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    /// Scope the node was encountered in (written during the definition pass)
    pub scope: Option<ScopeId>,
    /// Symbol the node defines or refers to
    pub symbol: Option<SymbolId>,
    /// Type variable standing for the node's value (written during the inference pass)
    pub type_variable: Option<TypeVariableId>,
}

/// Arena-backed syntax tree
#[derive(Debug, Clone, PartialEq)]
pub struct Ast {
    nodes: Vec<Node>,
}

impl Ast {
    /// Create a tree holding only the root node
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                kind: NodeKind::Root,
                text: String::new(),
                position: Position::default(),
                parent: None,
                children: Vec::new(),
                scope: None,
                symbol: None,
                type_variable: None,
            }],
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Append a node as the last child of `parent`
    pub fn add(
        &mut self,
        parent: NodeId,
        kind: NodeKind,
        text: impl Into<String>,
        position: Position,
    ) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            kind,
            text: text.into(),
            position,
            parent: Some(parent),
            children: Vec::new(),
            scope: None,
            symbol: None,
            type_variable: None,
        });
        if let Some(parent_node) = self.nodes.get_mut(parent.index()) {
            parent_node.children.push(id);
        }
        id
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.index())
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.get(id).map(|node| node.children.as_slice()).unwrap_or(&[])
    }

    pub fn child(&self, id: NodeId, index: usize) -> Option<NodeId> {
        self.children(id).get(index).copied()
    }

    /// First child of the given kind
    pub fn child_of_kind(&self, id: NodeId, kind: NodeKind) -> Option<NodeId> {
        self.children(id)
            .iter()
            .copied()
            .find(|child| self.get(*child).is_some_and(|node| node.kind == kind))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }
}

impl Default for Ast {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_children_are_linked_in_insertion_order() {
        let mut ast = Ast::new();
        let namespace = ast.add(ast.root(), NodeKind::Namespace, "\\", Position::new(1, 1));
        let first = ast.add(namespace, NodeKind::Echo, "echo", Position::new(2, 1));
        let second = ast.add(namespace, NodeKind::Echo, "echo", Position::new(3, 1));

        assert_eq!(ast.children(namespace), &[first, second]);
        assert_eq!(ast.get(second).and_then(|node| node.parent), Some(namespace));
        assert_eq!(ast.child_of_kind(namespace, NodeKind::Echo), Some(first));
    }

    #[test]
    fn test_positions_order_by_line_then_column() {
        assert!(Position::new(1, 9) < Position::new(2, 1));
        assert!(Position::new(2, 1) < Position::new(2, 3));
        assert_eq!(Position::new(4, 2).to_string(), "4:2");
    }
}
