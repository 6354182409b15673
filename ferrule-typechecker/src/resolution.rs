//! Identifier resolution
//!
//! Resolvers are consulted in a fixed order injected at construction time: the user-defined
//! symbols first, then super-globals, then the built-ins, then any extra resolvers supplied by
//! the embedding tool. The first resolver producing a symbol wins.

use crate::ast::Position;
use crate::error::EngineResult;
use crate::scopes::{LookupCase, ScopeId, SymbolTable, NAMESPACE_SEPARATOR};
use crate::symbols::{Symbol, SymbolId, SymbolKind};
use std::fmt;

/// Syntactic form of an identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierForm {
    /// Leading separator: `\a\B`
    Absolute,
    /// Separator not at position 0: `a\B`
    Relative,
    /// No separator: `B`
    Local,
}

impl IdentifierForm {
    pub fn classify(name: &str) -> Self {
        match name.find(NAMESPACE_SEPARATOR) {
            Some(0) => Self::Absolute,
            Some(_) => Self::Relative,
            None => Self::Local,
        }
    }
}

/// What an identifier is expected to name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentifierKind {
    Variable,
    Constant,
    Function,
    Type,
}

impl IdentifierKind {
    pub fn accepts(self, symbol: &Symbol) -> bool {
        matches!(
            (self, &symbol.kind),
            (Self::Variable, SymbolKind::Variable(_))
                | (Self::Constant, SymbolKind::Constant(_))
                | (Self::Function, SymbolKind::Method(_))
                | (Self::Type, SymbolKind::Type(_))
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Variable => "variable",
            Self::Constant => "constant",
            Self::Function => "function",
            Self::Type => "type",
        }
    }
}

impl fmt::Display for IdentifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identifier {
    pub name: String,
    pub kind: IdentifierKind,
    /// Scope the identifier occurs in
    pub scope: ScopeId,
    pub position: Position,
    pub case: LookupCase,
}

impl Identifier {
    /// Variables and constants are case-sensitive, functions are not, types follow the
    /// engine configuration
    pub fn new(
        name: impl Into<String>,
        kind: IdentifierKind,
        scope: ScopeId,
        position: Position,
        case_insensitive_types: bool,
    ) -> Self {
        let case = match kind {
            IdentifierKind::Variable | IdentifierKind::Constant => LookupCase::Sensitive,
            IdentifierKind::Function => LookupCase::Insensitive,
            IdentifierKind::Type if case_insensitive_types => LookupCase::Insensitive,
            IdentifierKind::Type => LookupCase::Sensitive,
        };
        Self {
            name: name.into(),
            kind,
            scope,
            position,
            case,
        }
    }

    pub fn form(&self) -> IdentifierForm {
        IdentifierForm::classify(&self.name)
    }

    /// The same identifier with another spelling
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }
}

/// Result of one resolution attempt
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolutionOutcome {
    pub symbol: Option<SymbolId>,
    /// The `use` alias the identifier went through, if any
    pub alias: Option<SymbolId>,
    /// The alias is defined after the identifier
    pub alias_forward_reference: bool,
}

impl ResolutionOutcome {
    pub fn found(symbol: SymbolId) -> Self {
        Self {
            symbol: Some(symbol),
            ..Self::default()
        }
    }

    pub fn from_option(symbol: Option<SymbolId>) -> Self {
        Self {
            symbol,
            ..Self::default()
        }
    }

    pub fn is_found(&self) -> bool {
        self.symbol.is_some()
    }
}

/// One lookup strategy of the chain
pub trait SymbolResolver: Send + Sync {
    fn name(&self) -> &'static str;

    fn resolve(&self, table: &SymbolTable, identifier: &Identifier) -> EngineResult<ResolutionOutcome> {
        match identifier.form() {
            IdentifierForm::Absolute => self.resolve_absolute_identifier(table, identifier),
            IdentifierForm::Relative => self.resolve_relative_identifier(table, identifier),
            IdentifierForm::Local => {
                let outcome = self.resolve_identifier_from_its_scope(table, identifier)?;
                if outcome.is_found() {
                    return Ok(outcome);
                }
                self.resolve_identifier_from_fallback(table, identifier)
            }
        }
    }

    fn resolve_identifier_from_its_scope(
        &self,
        table: &SymbolTable,
        identifier: &Identifier,
    ) -> EngineResult<ResolutionOutcome>;

    fn resolve_identifier_from_fallback(
        &self,
        _table: &SymbolTable,
        _identifier: &Identifier,
    ) -> EngineResult<ResolutionOutcome> {
        Ok(ResolutionOutcome::default())
    }

    fn resolve_absolute_identifier(
        &self,
        _table: &SymbolTable,
        _identifier: &Identifier,
    ) -> EngineResult<ResolutionOutcome> {
        Ok(ResolutionOutcome::default())
    }

    fn resolve_relative_identifier(
        &self,
        _table: &SymbolTable,
        _identifier: &Identifier,
    ) -> EngineResult<ResolutionOutcome> {
        Ok(ResolutionOutcome::default())
    }
}

fn lookup(
    table: &SymbolTable,
    scope: ScopeId,
    name: &str,
    identifier: &Identifier,
) -> EngineResult<Option<SymbolId>> {
    table.resolve_where(scope, name, identifier.case, |symbol| identifier.kind.accepts(symbol))
}

/// Resolves against user declarations, honouring namespaces and `use` aliases
#[derive(Debug, Clone, Copy, Default)]
pub struct UserSymbolResolver;

impl UserSymbolResolver {
    /// Follow `alias` to its target, appending `rest` (the segments after the alias)
    fn resolve_through_alias(
        &self,
        table: &SymbolTable,
        identifier: &Identifier,
        alias: SymbolId,
        rest: Option<&str>,
    ) -> EngineResult<ResolutionOutcome> {
        let alias_symbol = table.symbol(alias)?;
        let Some(data) = alias_symbol.as_alias() else {
            return Ok(ResolutionOutcome::default());
        };
        let target = match rest {
            Some(rest) => format!("{}{}{}", data.target, NAMESPACE_SEPARATOR, rest),
            None => data.target.clone(),
        };
        let outcome = self.resolve_absolute_identifier(table, &identifier.renamed(target))?;
        Ok(ResolutionOutcome {
            symbol: outcome.symbol,
            alias: Some(alias),
            alias_forward_reference: alias_symbol.position > identifier.position,
        })
    }

    /// An alias shadows a same-named declaration only if it precedes it and the two come from
    /// different namespace statements
    fn alias_takes_precedence(
        &self,
        table: &SymbolTable,
        alias: SymbolId,
        declaration: SymbolId,
    ) -> EngineResult<bool> {
        let alias = table.symbol(alias)?;
        let declaration = table.symbol(declaration)?;
        Ok(alias.position < declaration.position
            && alias.definition_scope != declaration.definition_scope)
    }
}

impl SymbolResolver for UserSymbolResolver {
    fn name(&self) -> &'static str {
        "user"
    }

    fn resolve_identifier_from_its_scope(
        &self,
        table: &SymbolTable,
        identifier: &Identifier,
    ) -> EngineResult<ResolutionOutcome> {
        if identifier.kind == IdentifierKind::Variable {
            let scope = table.variable_scope(identifier.scope)?;
            return Ok(ResolutionOutcome::from_option(lookup(
                table,
                scope,
                &identifier.name,
                identifier,
            )?));
        }

        let namespace = table.enclosing_namespace(identifier.scope)?;
        let declaration = lookup(table, namespace, &identifier.name, identifier)?;
        if identifier.kind != IdentifierKind::Type {
            return Ok(ResolutionOutcome::from_option(declaration));
        }

        match (table.use_definition(namespace, &identifier.name)?, declaration) {
            (Some(alias), Some(declaration)) => {
                if self.alias_takes_precedence(table, alias, declaration)? {
                    self.resolve_through_alias(table, identifier, alias, None)
                } else {
                    Ok(ResolutionOutcome::found(declaration))
                }
            }
            (Some(alias), None) => self.resolve_through_alias(table, identifier, alias, None),
            (None, declaration) => Ok(ResolutionOutcome::from_option(declaration)),
        }
    }

    /// Variables, constants and functions fall back to the default namespace; the super-global
    /// resolver comes after this one
    fn resolve_identifier_from_fallback(
        &self,
        table: &SymbolTable,
        identifier: &Identifier,
    ) -> EngineResult<ResolutionOutcome> {
        let fallback = table.default_namespace();
        if identifier.kind == IdentifierKind::Type || table.storage_scope(identifier.scope)? == fallback {
            return Ok(ResolutionOutcome::default());
        }
        Ok(ResolutionOutcome::from_option(lookup(
            table,
            fallback,
            &identifier.name,
            identifier,
        )?))
    }

    fn resolve_absolute_identifier(
        &self,
        table: &SymbolTable,
        identifier: &Identifier,
    ) -> EngineResult<ResolutionOutcome> {
        let Some((path, name)) = identifier.name.rsplit_once(NAMESPACE_SEPARATOR) else {
            return Ok(ResolutionOutcome::default());
        };
        let Some(namespace) = table.find_global_namespace(path) else {
            return Ok(ResolutionOutcome::default());
        };
        Ok(ResolutionOutcome::from_option(lookup(
            table, namespace, name, identifier,
        )?))
    }

    /// Substitute a `use` alias for the leading segment, otherwise prefix the current
    /// namespace path
    fn resolve_relative_identifier(
        &self,
        table: &SymbolTable,
        identifier: &Identifier,
    ) -> EngineResult<ResolutionOutcome> {
        let namespace = table.enclosing_namespace(identifier.scope)?;
        if let Some((head, rest)) = identifier.name.split_once(NAMESPACE_SEPARATOR) {
            if let Some(alias) = table.use_definition(namespace, head)? {
                return self.resolve_through_alias(table, identifier, alias, Some(rest));
            }
        }
        let absolute = table.absolute_name(namespace, &identifier.name)?;
        self.resolve_absolute_identifier(table, &identifier.renamed(absolute))
    }
}

/// Resolves variables such as `$_GET` that are visible everywhere
#[derive(Debug, Clone, Copy, Default)]
pub struct SuperGlobalSymbolResolver;

impl SymbolResolver for SuperGlobalSymbolResolver {
    fn name(&self) -> &'static str {
        "super-global"
    }

    fn resolve_identifier_from_its_scope(
        &self,
        table: &SymbolTable,
        identifier: &Identifier,
    ) -> EngineResult<ResolutionOutcome> {
        if identifier.kind != IdentifierKind::Variable {
            return Ok(ResolutionOutcome::default());
        }
        Ok(ResolutionOutcome::from_option(lookup(
            table,
            table.super_global_scope(),
            &identifier.name,
            identifier,
        )?))
    }
}

/// Resolves built-in constants, functions and types
#[derive(Debug, Clone, Copy, Default)]
pub struct CoreSymbolResolver;

impl SymbolResolver for CoreSymbolResolver {
    fn name(&self) -> &'static str {
        "core"
    }

    fn resolve_identifier_from_its_scope(
        &self,
        table: &SymbolTable,
        identifier: &Identifier,
    ) -> EngineResult<ResolutionOutcome> {
        if identifier.kind == IdentifierKind::Variable {
            return Ok(ResolutionOutcome::default());
        }
        Ok(ResolutionOutcome::from_option(lookup(
            table,
            table.core_scope(),
            &identifier.name,
            identifier,
        )?))
    }

    /// `\strlen` names the built-in `strlen`
    fn resolve_absolute_identifier(
        &self,
        table: &SymbolTable,
        identifier: &Identifier,
    ) -> EngineResult<ResolutionOutcome> {
        match identifier.name.strip_prefix(NAMESPACE_SEPARATOR) {
            Some(name) if IdentifierForm::classify(name) == IdentifierForm::Local => {
                self.resolve_identifier_from_its_scope(table, &identifier.renamed(name))
            }
            _ => Ok(ResolutionOutcome::default()),
        }
    }
}

/// Ordered list of resolvers; the first hit wins
pub struct ResolverChain {
    resolvers: Vec<Box<dyn SymbolResolver>>,
}

impl ResolverChain {
    pub fn builder() -> ResolverChainBuilder {
        ResolverChainBuilder::default()
    }

    /// User, super-global and core resolvers, in that order
    pub fn standard() -> Self {
        Self::builder().with_standard_resolvers().build()
    }

    pub fn resolve(&self, table: &SymbolTable, identifier: &Identifier) -> EngineResult<ResolutionOutcome> {
        let mut last = ResolutionOutcome::default();
        for resolver in &self.resolvers {
            let outcome = resolver.resolve(table, identifier)?;
            if outcome.is_found() {
                tracing::trace!(
                    identifier = %identifier.name,
                    resolver = resolver.name(),
                    "identifier resolved"
                );
                return Ok(outcome);
            }
            if outcome.alias.is_some() {
                last = outcome;
            }
        }
        Ok(last)
    }

    pub fn resolver_names(&self) -> Vec<&'static str> {
        self.resolvers.iter().map(|resolver| resolver.name()).collect()
    }
}

impl fmt::Debug for ResolverChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolverChain")
            .field("resolvers", &self.resolver_names())
            .finish()
    }
}

#[derive(Default)]
pub struct ResolverChainBuilder {
    resolvers: Vec<Box<dyn SymbolResolver>>,
}

impl ResolverChainBuilder {
    pub fn with_standard_resolvers(self) -> Self {
        self.with_resolver(Box::new(UserSymbolResolver))
            .with_resolver(Box::new(SuperGlobalSymbolResolver))
            .with_resolver(Box::new(CoreSymbolResolver))
    }

    /// Append a resolver consulted after every resolver added before it
    pub fn with_resolver(mut self, resolver: Box<dyn SymbolResolver>) -> Self {
        self.resolvers.push(resolver);
        self
    }

    pub fn build(self) -> ResolverChain {
        ResolverChain {
            resolvers: self.resolvers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_forms() {
        assert_eq!(IdentifierForm::classify("\\a\\B"), IdentifierForm::Absolute);
        assert_eq!(IdentifierForm::classify("a\\B"), IdentifierForm::Relative);
        assert_eq!(IdentifierForm::classify("B"), IdentifierForm::Local);
    }

    #[test]
    fn test_lookup_case_depends_on_kind() {
        let table = SymbolTable::new(0);
        let scope = table.default_namespace();
        let position = Position::new(1, 1);

        assert_eq!(
            Identifier::new("$a", IdentifierKind::Variable, scope, position, true).case,
            LookupCase::Sensitive
        );
        assert_eq!(
            Identifier::new("Foo", IdentifierKind::Function, scope, position, false).case,
            LookupCase::Insensitive
        );
        assert_eq!(
            Identifier::new("Foo", IdentifierKind::Type, scope, position, false).case,
            LookupCase::Sensitive
        );
    }

    #[test]
    fn test_chain_order_is_fixed_at_construction() {
        struct Extra;
        impl SymbolResolver for Extra {
            fn name(&self) -> &'static str {
                "extra"
            }
            fn resolve_identifier_from_its_scope(
                &self,
                _table: &SymbolTable,
                _identifier: &Identifier,
            ) -> EngineResult<ResolutionOutcome> {
                Ok(ResolutionOutcome::default())
            }
        }

        let chain = ResolverChain::builder()
            .with_standard_resolvers()
            .with_resolver(Box::new(Extra))
            .build();
        assert_eq!(chain.resolver_names(), vec!["user", "super-global", "core", "extra"]);
    }
}
