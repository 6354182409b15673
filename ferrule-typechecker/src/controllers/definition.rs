//! Definition pass: scopes and declarations
//!
//! Every declaration is appended to its scope, duplicates included; collisions are only
//! reported later by the reference pass, once the whole unit has been seen.

use super::{expect_kind, node, node_mut, scope_of};
use crate::ast::{Ast, NodeId, NodeKind};
use crate::builtins::literal_type_name;
use crate::error::{EngineError, EngineResult};
use crate::scopes::{LookupCase, ScopeId, ScopeKind, SymbolTable, CONDITIONAL_SCOPE_NAME, NAMESPACE_SEPARATOR};
use crate::symbols::{
    AliasData, ConstantData, MethodData, Modifier, Symbol, SymbolId, SymbolKind, TypeData, TypeKind,
    VariableData,
};
use indexmap::{IndexMap, IndexSet};
use tracing::trace;

pub struct DefinitionController<'a> {
    table: &'a mut SymbolTable,
}

impl<'a> DefinitionController<'a> {
    pub fn new(table: &'a mut SymbolTable) -> Self {
        Self { table }
    }

    /// Record the scope a node is encountered in
    pub fn set_scope(&mut self, ast: &mut Ast, id: NodeId, scope: ScopeId) -> EngineResult<()> {
        self.table.scope(scope)?;
        node_mut(ast, id)?.scope = Some(scope);
        Ok(())
    }

    /// Open a namespace statement
    ///
    /// Statements naming the same path share one global namespace for their declarations but
    /// each keeps its own `use` table and initialisation map.
    pub fn define_namespace(&mut self, ast: &mut Ast, id: NodeId) -> EngineResult<ScopeId> {
        let path = SymbolTable::normalize_namespace(&expect_kind(ast, id, NodeKind::Namespace)?.text);
        let global = self.table.global_namespace(&path);
        let scope = self.table.add_scope(
            path.clone(),
            global,
            ScopeKind::Namespace {
                global,
                uses: IndexMap::new(),
            },
        )?;
        trace!(namespace = %path, scope = %scope, "namespace opened");
        node_mut(ast, id)?.scope = Some(scope);
        Ok(scope)
    }

    /// `use a\B as C;`; the alias defaults to the last segment of the target
    pub fn define_use(&mut self, ast: &mut Ast, id: NodeId, namespace: ScopeId) -> EngineResult<SymbolId> {
        let statement = expect_kind(ast, id, NodeKind::Use)?;
        let position = statement.position;
        let target = statement
            .children
            .first()
            .copied()
            .ok_or_else(|| EngineError::unexpected_node(id, "use target", "no children"))?;
        let target = node(ast, target)?.text.clone();
        let alias = match ast.child_of_kind(id, NodeKind::Identifier) {
            Some(alias) => node(ast, alias)?.text.clone(),
            None => target
                .rsplit(NAMESPACE_SEPARATOR)
                .next()
                .unwrap_or(target.as_str())
                .to_string(),
        };
        let absolute = if target.starts_with(NAMESPACE_SEPARATOR) {
            target
        } else {
            format!("{NAMESPACE_SEPARATOR}{target}")
        };

        let symbol = self.table.define_use(
            namespace,
            Symbol::new(
                alias,
                position,
                SymbolKind::Alias(AliasData {
                    target: absolute,
                    resolved: None,
                }),
            ),
        )?;
        let statement = node_mut(ast, id)?;
        statement.scope = Some(namespace);
        statement.symbol = Some(symbol);
        Ok(symbol)
    }

    pub fn define_constant(&mut self, ast: &mut Ast, id: NodeId, scope: ScopeId) -> EngineResult<SymbolId> {
        let declaration = expect_kind(ast, id, NodeKind::Constant)?;
        let value_type = declaration
            .children
            .first()
            .and_then(|child| ast.get(*child))
            .and_then(|child| match child.kind {
                NodeKind::Literal(kind) => self.table.core_type(literal_type_name(kind)),
                _ => None,
            });
        let symbol = Symbol::new(
            declaration.text.clone(),
            declaration.position,
            SymbolKind::Constant(ConstantData { value_type }),
        );
        self.define_for_node(ast, id, scope, symbol)
    }

    pub fn define_class(&mut self, ast: &mut Ast, id: NodeId, scope: ScopeId) -> EngineResult<SymbolId> {
        let declaration = expect_kind(ast, id, NodeKind::Class)?;
        let absolute_name = self.table.absolute_name(scope, &declaration.text)?;
        let symbol = Symbol::new(
            declaration.text.clone(),
            declaration.position,
            SymbolKind::Type(TypeData {
                kind: TypeKind::Class,
                absolute_name,
                parents: Vec::new(),
                conversions: Vec::new(),
            }),
        );
        self.define_for_node(ast, id, scope, symbol)
    }

    /// Define a function and open the scope holding its parameters and locals
    ///
    /// Leading `Identifier` children carry return modifiers (`nullable`, `falseable`).
    pub fn define_function(&mut self, ast: &mut Ast, id: NodeId, scope: ScopeId) -> EngineResult<ScopeId> {
        let declaration = expect_kind(ast, id, NodeKind::Function)?;
        let name = declaration.text.clone();
        let position = declaration.position;
        let modifiers: IndexSet<Modifier> = declaration
            .children
            .iter()
            .filter_map(|child| ast.get(*child))
            .take_while(|child| child.kind == NodeKind::Identifier)
            .filter_map(|child| Modifier::from_keyword(&child.text))
            .collect();

        let method = self.table.define(
            scope,
            Symbol::new(
                name.clone(),
                position,
                SymbolKind::Method(MethodData::user_function(modifiers)),
            ),
        )?;
        let method_scope = self
            .table
            .add_scope(format!("{name}()"), scope, ScopeKind::Method { method })?;
        if let Some(data) = self.table.symbol_mut(method)?.as_method_mut() {
            data.scope = Some(method_scope);
        }
        trace!(function = %name, scope = %method_scope, "function defined");

        let declaration = node_mut(ast, id)?;
        declaration.scope = Some(scope);
        declaration.symbol = Some(method);
        Ok(method_scope)
    }

    pub fn define_parameter(&mut self, ast: &mut Ast, id: NodeId, method_scope: ScopeId) -> EngineResult<SymbolId> {
        let method = match self.table.scope(method_scope)?.kind {
            ScopeKind::Method { method } => method,
            ref other => {
                return Err(EngineError::UnexpectedScope {
                    expected: "method".to_string(),
                    found: other.label().to_string(),
                })
            }
        };
        let declaration = expect_kind(ast, id, NodeKind::Parameter)?;
        let symbol = Symbol::new(
            declaration.text.clone(),
            declaration.position,
            SymbolKind::Variable(VariableData {
                is_parameter: true,
                ..VariableData::default()
            }),
        );
        let parameter = self.define_for_node(ast, id, method_scope, symbol)?;
        if let Some(data) = self.table.symbol_mut(method)?.as_method_mut() {
            data.parameters.push(parameter);
        }
        Ok(parameter)
    }

    /// Open the scope of a branch or loop body
    pub fn define_conditional_scope(&mut self, ast: &mut Ast, id: NodeId, enclosing: ScopeId) -> EngineResult<ScopeId> {
        let scope = self
            .table
            .add_scope(CONDITIONAL_SCOPE_NAME, enclosing, ScopeKind::Conditional)?;
        node_mut(ast, id)?.scope = Some(scope);
        Ok(scope)
    }

    /// Define the variable assigned by `id` unless its variable scope already holds it
    pub fn define_variable(&mut self, ast: &mut Ast, id: NodeId) -> EngineResult<SymbolId> {
        let scope = scope_of(ast, id)?;
        let declaration = expect_kind(ast, id, NodeKind::Variable)?;
        let variable_scope = self.table.variable_scope(scope)?;
        let existing = self.table.resolve_where(
            variable_scope,
            &declaration.text,
            LookupCase::Sensitive,
            |symbol| symbol.as_variable().is_some(),
        )?;
        let symbol = match existing {
            Some(symbol) => symbol,
            None => self.table.define(
                variable_scope,
                Symbol::new(
                    declaration.text.clone(),
                    declaration.position,
                    SymbolKind::Variable(VariableData::default()),
                ),
            )?,
        };
        node_mut(ast, id)?.symbol = Some(symbol);
        Ok(symbol)
    }

    fn define_for_node(&mut self, ast: &mut Ast, id: NodeId, scope: ScopeId, symbol: Symbol) -> EngineResult<SymbolId> {
        let symbol = self.table.define(scope, symbol)?;
        let declaration = node_mut(ast, id)?;
        declaration.scope = Some(scope);
        declaration.symbol = Some(symbol);
        Ok(symbol)
    }
}
