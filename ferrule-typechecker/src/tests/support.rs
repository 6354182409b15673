//! Shared helpers: a small script builder and a driver running the three passes

use crate::ast::{Ast, LiteralKind, NodeId, NodeKind, Position};
use crate::controllers::{node, scope_of, DefinitionController, InferenceController, ReferenceController};
use crate::engine::InferenceEngine;
use crate::error::EngineResult;
use crate::issues::{Issue, IssueKind};
use crate::scopes::ScopeId;
use crate::symbols::SymbolId;
use crate::types::UnionType;

/// Expression tree handed to the [`Script`] builder
#[derive(Debug, Clone)]
pub enum Expr {
    Literal(LiteralKind, &'static str),
    Variable(&'static str),
    Constant(&'static str),
    Call(&'static str, Vec<Expr>),
    Operator(&'static str, Vec<Expr>),
}

pub fn int(text: &'static str) -> Expr {
    Expr::Literal(LiteralKind::Int, text)
}

pub fn float(text: &'static str) -> Expr {
    Expr::Literal(LiteralKind::Float, text)
}

pub fn string(text: &'static str) -> Expr {
    Expr::Literal(LiteralKind::String, text)
}

pub fn boolean(text: &'static str) -> Expr {
    Expr::Literal(LiteralKind::Bool, text)
}

pub fn array() -> Expr {
    Expr::Literal(LiteralKind::Array, "[]")
}

pub fn var(name: &'static str) -> Expr {
    Expr::Variable(name)
}

pub fn constant(name: &'static str) -> Expr {
    Expr::Constant(name)
}

pub fn call(name: &'static str, arguments: Vec<Expr>) -> Expr {
    Expr::Call(name, arguments)
}

pub fn op(operator: &'static str, operands: Vec<Expr>) -> Expr {
    Expr::Operator(operator, operands)
}

/// Nodes of a function declaration
#[derive(Debug, Clone)]
pub struct FunctionNodes {
    pub node: NodeId,
    pub parameters: Vec<NodeId>,
    pub body: NodeId,
}

/// Nodes of an `if` statement
#[derive(Debug, Clone, Copy)]
pub struct IfNodes {
    pub then_block: NodeId,
    pub else_block: Option<NodeId>,
}

/// Builds syntax trees the way a parser would, one statement per line
#[derive(Debug, Default)]
pub struct Script {
    pub ast: Ast,
    line: u32,
    column: u32,
}

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    /// A script whose statements all live in the default namespace
    pub fn global() -> (Self, NodeId) {
        let mut script = Self::new();
        let namespace = script.namespace("\\");
        (script, namespace)
    }

    fn statement_position(&mut self) -> Position {
        self.line += 1;
        self.column = 1;
        Position::new(self.line, self.column)
    }

    fn expression_position(&mut self) -> Position {
        self.column += 2;
        Position::new(self.line, self.column)
    }

    pub fn namespace(&mut self, path: &str) -> NodeId {
        let position = self.statement_position();
        let root = self.ast.root();
        self.ast.add(root, NodeKind::Namespace, path, position)
    }

    pub fn use_alias(&mut self, namespace: NodeId, target: &str, alias: Option<&str>) -> NodeId {
        let position = self.statement_position();
        let statement = self.ast.add(namespace, NodeKind::Use, "use", position);
        let position = self.expression_position();
        self.ast.add(statement, NodeKind::TypeName, target, position);
        if let Some(alias) = alias {
            let position = self.expression_position();
            self.ast.add(statement, NodeKind::Identifier, alias, position);
        }
        statement
    }

    pub fn constant(&mut self, parent: NodeId, name: &str, value: Expr) -> NodeId {
        let position = self.statement_position();
        let declaration = self.ast.add(parent, NodeKind::Constant, name, position);
        self.expression(declaration, value);
        declaration
    }

    pub fn class(&mut self, parent: NodeId, name: &str) -> NodeId {
        let position = self.statement_position();
        self.ast.add(parent, NodeKind::Class, name, position)
    }

    /// `function name($a, Type $b) {}`; parameters are `(name, type hint)`
    pub fn function(&mut self, parent: NodeId, name: &str, parameters: &[(&str, Option<&str>)]) -> FunctionNodes {
        self.function_with_modifiers(parent, &[], name, parameters)
    }

    pub fn function_with_modifiers(
        &mut self,
        parent: NodeId,
        modifiers: &[&str],
        name: &str,
        parameters: &[(&str, Option<&str>)],
    ) -> FunctionNodes {
        let position = self.statement_position();
        let function = self.ast.add(parent, NodeKind::Function, name, position);
        for modifier in modifiers {
            let position = self.expression_position();
            self.ast.add(function, NodeKind::Identifier, *modifier, position);
        }
        let parameters = parameters
            .iter()
            .map(|(name, hint)| {
                let position = self.expression_position();
                let parameter = self.ast.add(function, NodeKind::Parameter, *name, position);
                if let Some(hint) = hint {
                    let position = self.expression_position();
                    self.ast.add(parameter, NodeKind::TypeName, *hint, position);
                }
                parameter
            })
            .collect();
        let position = self.expression_position();
        let body = self.ast.add(function, NodeKind::Block, "{}", position);
        FunctionNodes {
            node: function,
            parameters,
            body,
        }
    }

    /// `$variable = value;`, returning the assignment node
    pub fn assign(&mut self, parent: NodeId, variable: &str, value: Expr) -> NodeId {
        let position = self.statement_position();
        let assignment = self.ast.add(parent, NodeKind::Assign, "=", position);
        let position = self.expression_position();
        self.ast.add(assignment, NodeKind::Variable, variable, position);
        self.expression(assignment, value);
        assignment
    }

    pub fn echo(&mut self, parent: NodeId, value: Expr) -> NodeId {
        let position = self.statement_position();
        let statement = self.ast.add(parent, NodeKind::Echo, "echo", position);
        self.expression(statement, value);
        statement
    }

    pub fn ret(&mut self, parent: NodeId, value: Option<Expr>) -> NodeId {
        let position = self.statement_position();
        let statement = self.ast.add(parent, NodeKind::Return, "return", position);
        if let Some(value) = value {
            self.expression(statement, value);
        }
        statement
    }

    /// Expression statement, returning the expression node
    pub fn statement(&mut self, parent: NodeId, value: Expr) -> NodeId {
        let position = self.statement_position();
        let statement = self.ast.add(parent, NodeKind::ExpressionStatement, ";", position);
        self.expression(statement, value)
    }

    pub fn if_else(&mut self, parent: NodeId, condition: Expr, with_else: bool) -> IfNodes {
        let position = self.statement_position();
        let statement = self.ast.add(parent, NodeKind::If, "if", position);
        self.expression(statement, condition);
        let position = self.expression_position();
        let then_block = self.ast.add(statement, NodeKind::Block, "{}", position);
        let else_block = with_else.then(|| {
            let position = self.expression_position();
            self.ast.add(statement, NodeKind::Block, "{}", position)
        });
        IfNodes {
            then_block,
            else_block,
        }
    }

    /// `while (condition) {}`, returning the body
    pub fn while_loop(&mut self, parent: NodeId, condition: Expr) -> NodeId {
        let position = self.statement_position();
        let statement = self.ast.add(parent, NodeKind::While, "while", position);
        self.expression(statement, condition);
        let position = self.expression_position();
        self.ast.add(statement, NodeKind::Block, "{}", position)
    }

    fn expression(&mut self, parent: NodeId, expr: Expr) -> NodeId {
        let position = self.expression_position();
        match expr {
            Expr::Literal(kind, text) => self.ast.add(parent, NodeKind::Literal(kind), text, position),
            Expr::Variable(name) => self.ast.add(parent, NodeKind::Variable, name, position),
            Expr::Constant(name) => self.ast.add(parent, NodeKind::Identifier, name, position),
            Expr::Call(name, arguments) => {
                let call = self.ast.add(parent, NodeKind::Call, name, position);
                for argument in arguments {
                    self.expression(call, argument);
                }
                call
            }
            Expr::Operator(operator, operands) => {
                let node = self.ast.add(parent, NodeKind::Operator, operator, position);
                for operand in operands {
                    self.expression(node, operand);
                }
                node
            }
        }
    }
}

/// Run all three passes over `ast` and solve
pub fn analyse(engine: &mut InferenceEngine, ast: &mut Ast) -> EngineResult<()> {
    let root = ast.root();
    let default_namespace = engine.table().default_namespace();
    {
        let mut definition = engine.definition()?;
        define_statements(&mut definition, ast, root, default_namespace)?;
    }
    {
        let mut reference = engine.reference()?;
        reference_statements(&mut reference, ast, root)?;
    }
    {
        let mut inference = engine.inference()?;
        infer_statements(&mut inference, ast, root)?;
    }
    engine.solve_all()
}

/// Build a fresh engine and analyse the script with it
pub fn analyse_script(script: &mut Script) -> InferenceEngine {
    let mut engine = InferenceEngine::new().expect("engine builds");
    analyse(&mut engine, &mut script.ast).expect("analysis succeeds");
    engine
}

fn kind_of(ast: &Ast, id: NodeId) -> EngineResult<NodeKind> {
    Ok(node(ast, id)?.kind)
}

fn define_statements(
    definition: &mut DefinitionController<'_>,
    ast: &mut Ast,
    parent: NodeId,
    scope: ScopeId,
) -> EngineResult<()> {
    for statement in ast.children(parent).to_vec() {
        let children = ast.children(statement).to_vec();
        match kind_of(ast, statement)? {
            NodeKind::Namespace => {
                let namespace = definition.define_namespace(ast, statement)?;
                define_statements(definition, ast, statement, namespace)?;
            }
            NodeKind::Use => {
                definition.define_use(ast, statement, scope)?;
                for child in children {
                    definition.set_scope(ast, child, scope)?;
                }
            }
            NodeKind::Constant => {
                definition.define_constant(ast, statement, scope)?;
                for child in children {
                    define_expression(definition, ast, child, scope)?;
                }
            }
            NodeKind::Class => {
                definition.define_class(ast, statement, scope)?;
            }
            NodeKind::Function => {
                let method_scope = definition.define_function(ast, statement, scope)?;
                for child in children {
                    match kind_of(ast, child)? {
                        NodeKind::Parameter => {
                            definition.define_parameter(ast, child, method_scope)?;
                            for hint in ast.children(child).to_vec() {
                                define_expression(definition, ast, hint, method_scope)?;
                            }
                        }
                        NodeKind::Block => {
                            definition.set_scope(ast, child, method_scope)?;
                            define_statements(definition, ast, child, method_scope)?;
                        }
                        _ => definition.set_scope(ast, child, method_scope)?,
                    }
                }
            }
            NodeKind::If | NodeKind::While => {
                definition.set_scope(ast, statement, scope)?;
                for child in children {
                    if kind_of(ast, child)? == NodeKind::Block {
                        let branch = definition.define_conditional_scope(ast, child, scope)?;
                        define_statements(definition, ast, child, branch)?;
                    } else {
                        define_expression(definition, ast, child, scope)?;
                    }
                }
            }
            NodeKind::Assign => {
                definition.set_scope(ast, statement, scope)?;
                let [target, value] = children[..] else {
                    continue;
                };
                define_expression(definition, ast, value, scope)?;
                definition.set_scope(ast, target, scope)?;
                definition.define_variable(ast, target)?;
            }
            _ => {
                definition.set_scope(ast, statement, scope)?;
                for child in children {
                    define_expression(definition, ast, child, scope)?;
                }
            }
        }
    }
    Ok(())
}

fn define_expression(
    definition: &mut DefinitionController<'_>,
    ast: &mut Ast,
    id: NodeId,
    scope: ScopeId,
) -> EngineResult<()> {
    definition.set_scope(ast, id, scope)?;
    for child in ast.children(id).to_vec() {
        define_expression(definition, ast, child, scope)?;
    }
    Ok(())
}

fn reference_statements(reference: &mut ReferenceController<'_>, ast: &mut Ast, parent: NodeId) -> EngineResult<()> {
    for statement in ast.children(parent).to_vec() {
        let children = ast.children(statement).to_vec();
        match kind_of(ast, statement)? {
            NodeKind::Namespace => reference_statements(reference, ast, statement)?,
            NodeKind::Use => {
                reference.resolve_use_target(ast, statement)?;
                reference.check_use_is_not_double_definition(ast, statement)?;
            }
            NodeKind::Class => reference.check_is_not_double_definition(ast, statement)?,
            NodeKind::Constant => {
                reference.check_is_not_double_definition(ast, statement)?;
                for child in children {
                    reference_expression(reference, ast, child)?;
                }
            }
            NodeKind::Function => {
                reference.check_is_not_double_definition(ast, statement)?;
                for child in children {
                    match kind_of(ast, child)? {
                        NodeKind::Parameter => {
                            reference.check_is_not_double_definition(ast, child)?;
                            reference.resolve_parameter_type(ast, child)?;
                        }
                        NodeKind::Block => reference_statements(reference, ast, child)?,
                        _ => {}
                    }
                }
                reference.add_implicit_return(ast, statement)?;
            }
            kind @ (NodeKind::If | NodeKind::While) => {
                let mut branches = Vec::new();
                for child in children {
                    if kind_of(ast, child)? == NodeKind::Block {
                        reference_statements(reference, ast, child)?;
                        branches.push(scope_of(ast, child)?);
                    } else {
                        reference_expression(reference, ast, child)?;
                    }
                }
                let exhaustive = kind == NodeKind::If && branches.len() == 2;
                reference.merge_branch_initialisations(scope_of(ast, statement)?, &branches, exhaustive)?;
            }
            NodeKind::Assign => {
                let [target, value] = children[..] else {
                    continue;
                };
                reference_expression(reference, ast, value)?;
                reference.mark_initialised(ast, target)?;
            }
            _ => {
                for child in children {
                    reference_expression(reference, ast, child)?;
                }
            }
        }
    }
    Ok(())
}

fn reference_expression(reference: &mut ReferenceController<'_>, ast: &mut Ast, id: NodeId) -> EngineResult<()> {
    match kind_of(ast, id)? {
        NodeKind::Variable => {
            reference.resolve_variable(ast, id)?;
            reference.check_is_initialised(ast, id)?;
        }
        NodeKind::Identifier => {
            reference.resolve_constant(ast, id)?;
            reference.check_is_not_forward_reference(ast, id)?;
        }
        NodeKind::TypeName => {
            reference.resolve_type(ast, id)?;
        }
        NodeKind::Call => {
            reference.resolve_function(ast, id)?;
        }
        _ => {}
    }
    for child in ast.children(id).to_vec() {
        reference_expression(reference, ast, child)?;
    }
    Ok(())
}

fn infer_statements(inference: &mut InferenceController<'_>, ast: &mut Ast, parent: NodeId) -> EngineResult<()> {
    for statement in ast.children(parent).to_vec() {
        let children = ast.children(statement).to_vec();
        match kind_of(ast, statement)? {
            NodeKind::Namespace => infer_statements(inference, ast, statement)?,
            NodeKind::Function => {
                inference.enter_function(ast, statement)?;
                if let Some(body) = ast.child_of_kind(statement, NodeKind::Block) {
                    infer_statements(inference, ast, body)?;
                }
            }
            NodeKind::If => {
                let collection = inference.collection_of(scope_of(ast, statement)?)?;
                let position = node(ast, statement)?.position;
                let before = inference.current_ref_heads(collection);
                let mut branches = Vec::new();
                for child in children {
                    if kind_of(ast, child)? == NodeKind::Block {
                        infer_statements(inference, ast, child)?;
                        branches.push(inference.current_ref_heads(collection));
                        inference.restore_ref_heads(collection, &before);
                    } else {
                        infer_expression(inference, ast, child)?;
                    }
                }
                let exhaustive = branches.len() == 2;
                inference.create_branch_merge(&before, &branches, exhaustive, collection, position)?;
            }
            NodeKind::While => {
                let collection = inference.collection_of(scope_of(ast, statement)?)?;
                let position = node(ast, statement)?.position;
                let heads = inference.create_loop_head(collection, position)?;
                for child in children {
                    if kind_of(ast, child)? == NodeKind::Block {
                        infer_statements(inference, ast, child)?;
                    } else {
                        infer_expression(inference, ast, child)?;
                    }
                }
                inference.close_loop(&heads, collection)?;
            }
            NodeKind::Assign => {
                if let Some(value) = ast.child(statement, 1) {
                    infer_expression(inference, ast, value)?;
                }
                inference.create_assignment(ast, statement)?;
            }
            NodeKind::Return => {
                for child in children {
                    infer_expression(inference, ast, child)?;
                }
                inference.create_return(ast, statement)?;
            }
            NodeKind::Echo => {
                for child in children {
                    infer_expression(inference, ast, child)?;
                }
                inference.create_echo(ast, statement)?;
            }
            NodeKind::ExpressionStatement => {
                for child in children {
                    infer_expression(inference, ast, child)?;
                }
            }
            _ => {}
        }
    }
    Ok(())
}

fn infer_expression(inference: &mut InferenceController<'_>, ast: &mut Ast, id: NodeId) -> EngineResult<()> {
    for child in ast.children(id).to_vec() {
        infer_expression(inference, ast, child)?;
    }
    match kind_of(ast, id)? {
        NodeKind::Literal(_) => {
            inference.create_type_constraint(ast, id)?;
        }
        NodeKind::Variable => {
            inference.create_variable_read(ast, id)?;
        }
        NodeKind::Identifier => {
            inference.create_constant_reference(ast, id)?;
        }
        NodeKind::Call => {
            inference.create_function_call(ast, id)?;
        }
        NodeKind::Operator => {
            inference.create_operator(ast, id)?;
        }
        _ => {}
    }
    Ok(())
}

/// Issues of one kind, in reporting order
pub fn issues_of(engine: &InferenceEngine, kind: IssueKind) -> Vec<&Issue> {
    engine.issues().iter().filter(|issue| issue.kind == kind).collect()
}

/// Symbol bound to a node by the passes
pub fn symbol_at(ast: &Ast, id: NodeId) -> SymbolId {
    ast.get(id).and_then(|node| node.symbol).expect("node has a symbol")
}

/// Variable written by an assignment node
pub fn assigned_variable(ast: &Ast, assignment: NodeId) -> SymbolId {
    symbol_at(ast, ast.child(assignment, 0).expect("assignment has a target"))
}

pub fn type_names(union: &UnionType) -> Vec<&str> {
    union.sorted_names()
}
