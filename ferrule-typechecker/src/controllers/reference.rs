//! Reference pass: identifier binding and definition checks
//!
//! Failed resolutions never abort the pass. The identifier is bound to an erroneous
//! placeholder symbol carrying the reported issue, and later passes treat that placeholder as
//! compatible with everything.

use super::{expect_kind, node, node_mut, scope_of, symbol_of};
use crate::ast::{Ast, LiteralKind, NodeId, NodeKind};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::issues::{Issue, IssueCollector, IssueKind};
use crate::resolution::{Identifier, IdentifierKind, ResolverChain};
use crate::scopes::{ScopeId, SymbolTable};
use crate::symbols::{SymbolId, SymbolKind};
use tracing::trace;

pub struct ReferenceController<'a> {
    table: &'a mut SymbolTable,
    resolvers: &'a ResolverChain,
    issues: &'a mut IssueCollector,
    config: &'a EngineConfig,
}

impl<'a> ReferenceController<'a> {
    pub fn new(
        table: &'a mut SymbolTable,
        resolvers: &'a ResolverChain,
        issues: &'a mut IssueCollector,
        config: &'a EngineConfig,
    ) -> Self {
        Self {
            table,
            resolvers,
            issues,
            config,
        }
    }

    /// Bind the target of a `use` statement
    pub fn resolve_use_target(&mut self, ast: &Ast, id: NodeId) -> EngineResult<Option<SymbolId>> {
        let statement = expect_kind(ast, id, NodeKind::Use)?;
        let alias = symbol_of(ast, id)?;
        let namespace = scope_of(ast, id)?;
        let Some(target) = self.table.symbol(alias)?.as_alias().map(|data| data.target.clone()) else {
            return Err(EngineError::UnexpectedSymbol {
                symbol: self.table.symbol(alias)?.name.clone(),
                expected: "alias".to_string(),
            });
        };

        let identifier = Identifier::new(
            target.clone(),
            IdentifierKind::Type,
            namespace,
            statement.position,
            self.config.case_insensitive_types,
        );
        let outcome = self.resolvers.resolve(self.table, &identifier)?;
        match outcome.symbol {
            Some(resolved) => {
                if let SymbolKind::Alias(data) = &mut self.table.symbol_mut(alias)?.kind {
                    data.resolved = Some(resolved);
                }
                Ok(Some(resolved))
            }
            None => {
                self.issues.report(
                    Issue::new(IssueKind::AliasTargetNotDefined, statement.position).with_parameter("name", target),
                );
                Ok(None)
            }
        }
    }

    /// Report a `use` alias bound twice in the same namespace statement
    pub fn check_use_is_not_double_definition(&mut self, ast: &Ast, id: NodeId) -> EngineResult<()> {
        let alias = symbol_of(ast, id)?;
        let namespace = scope_of(ast, id)?;
        let name = self.table.symbol(alias)?.name.clone();
        let first = self.table.use_definition(namespace, &name)?;
        self.report_if_redefined(alias, first)
    }

    /// Report a declaration whose name was already taken in its scope by a declaration of the
    /// same category
    pub fn check_is_not_double_definition(&mut self, ast: &Ast, id: NodeId) -> EngineResult<()> {
        let declared = symbol_of(ast, id)?;
        let symbol = self.table.symbol(declared)?;
        let scope = symbol
            .definition_scope
            .ok_or_else(|| EngineError::MissingDefinitionScope {
                symbol: symbol.name.clone(),
            })?;
        let label = symbol.kind_label();
        let case_insensitive = symbol.is_case_insensitive();
        let name = symbol.name.clone();

        let mut first = None;
        for candidate in self.table.symbols_named(scope, &name)? {
            let other = self.table.symbol(candidate)?;
            let same_name = case_insensitive || other.name == name;
            if same_name && other.kind_label() == label {
                first = Some(candidate);
                break;
            }
        }
        self.report_if_redefined(declared, first)
    }

    fn report_if_redefined(&mut self, declared: SymbolId, first: Option<SymbolId>) -> EngineResult<()> {
        let Some(first) = first.filter(|first| *first != declared) else {
            return Ok(());
        };
        let symbol = self.table.symbol(declared)?;
        let original = self.table.symbol(first)?;
        self.issues.report(
            Issue::new(IssueKind::AlreadyDefined, symbol.position)
                .with_related(original.position)
                .with_parameter("kind", symbol.kind_label())
                .with_parameter("name", symbol.name.clone()),
        );
        Ok(())
    }

    pub fn resolve_variable(&mut self, ast: &mut Ast, id: NodeId) -> EngineResult<SymbolId> {
        self.resolve_node(ast, id, IdentifierKind::Variable, IssueKind::NotDefined)
    }

    pub fn resolve_constant(&mut self, ast: &mut Ast, id: NodeId) -> EngineResult<SymbolId> {
        self.resolve_node(ast, id, IdentifierKind::Constant, IssueKind::NotDefined)
    }

    pub fn resolve_function(&mut self, ast: &mut Ast, id: NodeId) -> EngineResult<SymbolId> {
        self.resolve_node(ast, id, IdentifierKind::Function, IssueKind::NotDefined)
    }

    pub fn resolve_type(&mut self, ast: &mut Ast, id: NodeId) -> EngineResult<SymbolId> {
        self.resolve_node(ast, id, IdentifierKind::Type, IssueKind::UnknownType)
    }

    /// Resolve the type hint of a parameter into its declared type
    ///
    /// Unknown hints declare the erroneous type so the parameter accepts anything.
    pub fn resolve_parameter_type(&mut self, ast: &mut Ast, id: NodeId) -> EngineResult<Option<SymbolId>> {
        let parameter = symbol_of(ast, id)?;
        let Some(hint) = ast.child_of_kind(id, NodeKind::TypeName) else {
            return Ok(None);
        };
        let resolved = self.resolve_type(ast, hint)?;
        let declared = if self.table.symbol(resolved)?.as_type().is_some() {
            resolved
        } else {
            self.table.erroneous_type()
        };
        if let Some(data) = self.table.symbol_mut(parameter)?.as_variable_mut() {
            data.declared_type = Some(declared);
        }
        Ok(Some(declared))
    }

    fn resolve_node(
        &mut self,
        ast: &mut Ast,
        id: NodeId,
        kind: IdentifierKind,
        failure: IssueKind,
    ) -> EngineResult<SymbolId> {
        let reference = node(ast, id)?;
        let name = reference.text.clone();
        let position = reference.position;
        let scope = scope_of(ast, id)?;

        let identifier = Identifier::new(name.clone(), kind, scope, position, self.config.case_insensitive_types);
        let outcome = self.resolvers.resolve(self.table, &identifier)?;
        if outcome.alias_forward_reference {
            if let Some(alias) = outcome.alias {
                let alias = self.table.symbol(alias)?;
                self.issues.report(
                    Issue::new(IssueKind::AliasForwardReference, position)
                        .with_related(alias.position)
                        .with_parameter("name", alias.name.clone()),
                );
            }
        }

        let symbol = match outcome.symbol {
            Some(symbol) => symbol,
            None => {
                let issue = Issue::new(failure, position)
                    .with_parameter("kind", kind.label())
                    .with_parameter("name", name.clone());
                trace!(identifier = %name, kind = %kind, "identifier not defined");
                let placeholder = self.table.add_erroneous(name, position, issue.clone());
                self.issues.report(issue);
                placeholder
            }
        };
        node_mut(ast, id)?.symbol = Some(symbol);
        Ok(symbol)
    }

    /// Report a user constant read before its declaration
    pub fn check_is_not_forward_reference(&mut self, ast: &Ast, id: NodeId) -> EngineResult<()> {
        let reference = node(ast, id)?;
        let referenced = symbol_of(ast, id)?;
        if self.table.is_builtin(referenced)? {
            return Ok(());
        }
        let symbol = self.table.symbol(referenced)?;
        if matches!(symbol.kind, SymbolKind::Constant(_)) && symbol.position > reference.position {
            self.issues.report(
                Issue::new(IssueKind::ForwardReference, reference.position)
                    .with_related(symbol.position)
                    .with_parameter("name", symbol.name.clone()),
            );
        }
        Ok(())
    }

    /// Record that the variable written by `id` is initialised in the node's scope
    pub fn mark_initialised(&mut self, ast: &Ast, id: NodeId) -> EngineResult<()> {
        let symbol = symbol_of(ast, id)?;
        let scope = scope_of(ast, id)?;
        self.table.mark_initialised(scope, symbol)
    }

    /// Report reads of variables not initialised on every path
    pub fn check_is_initialised(&mut self, ast: &Ast, id: NodeId) -> EngineResult<()> {
        let reference = node(ast, id)?;
        let symbol_id = symbol_of(ast, id)?;
        let scope = scope_of(ast, id)?;
        let symbol = self.table.symbol(symbol_id)?;
        let Some(variable) = symbol.as_variable() else {
            return Ok(());
        };
        if variable.is_parameter || variable.is_super_global {
            return Ok(());
        }
        // Namespace variables read from a function body are initialised by code outside it
        let owner = symbol
            .definition_scope
            .ok_or_else(|| EngineError::MissingDefinitionScope {
                symbol: symbol.name.clone(),
            })?;
        let reader = self.table.variable_scope(scope)?;
        if self.table.storage_scope(owner)? != self.table.storage_scope(reader)? {
            return Ok(());
        }
        if self.table.is_fully_initialised(scope, symbol_id)? {
            return Ok(());
        }
        let kind = if self.table.is_partially_initialised(scope, symbol_id)? {
            IssueKind::VariablePartiallyInitialised
        } else {
            IssueKind::VariableNotInitialised
        };
        let issue = Issue::new(kind, reference.position).with_parameter("name", symbol.name.clone());
        self.issues.report(issue);
        Ok(())
    }

    /// Fold branch initialisations back into the scope enclosing an `if` or a loop
    pub fn merge_branch_initialisations(
        &mut self,
        target: ScopeId,
        branches: &[ScopeId],
        exhaustive: bool,
    ) -> EngineResult<()> {
        self.table.merge_branch_initialisations(target, branches, exhaustive)
    }

    /// Append `return null;` to a function body that can finish without returning
    pub fn add_implicit_return(&mut self, ast: &mut Ast, function: NodeId) -> EngineResult<Option<NodeId>> {
        expect_kind(ast, function, NodeKind::Function)?;
        let body = ast
            .child_of_kind(function, NodeKind::Block)
            .ok_or_else(|| EngineError::unexpected_node(function, "function body", "no block"))?;
        if always_returns(ast, body) {
            return Ok(None);
        }

        let scope = scope_of(ast, body)?;
        let position = node(ast, body)?.position;
        let statement = ast.add(body, NodeKind::Return, "return", position);
        let value = ast.add(statement, NodeKind::Literal(LiteralKind::Null), "null", position);
        for added in [statement, value] {
            node_mut(ast, added)?.scope = Some(scope);
        }
        Ok(Some(statement))
    }
}

/// Whether every path through `block` ends in a `return`
fn always_returns(ast: &Ast, block: NodeId) -> bool {
    let Some(last) = ast.children(block).last().and_then(|last| ast.get(*last)) else {
        return false;
    };
    match last.kind {
        NodeKind::Return => true,
        NodeKind::If => {
            let branches: Vec<NodeId> = last
                .children
                .iter()
                .copied()
                .filter(|child| ast.get(*child).is_some_and(|child| child.kind == NodeKind::Block))
                .collect();
            branches.len() == 2 && branches.iter().all(|branch| always_returns(ast, *branch))
        }
        _ => false,
    }
}
