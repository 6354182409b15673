//! Scopes and the symbol table arena
//!
//! Scopes and symbols are stored in two vectors owned by [`SymbolTable`] and referenced by
//! generational handles. Each scope kind differs only in where it stores definitions and how it
//! answers initialisation queries:
//!
//! - `GlobalNamespace`: one per distinct namespace path, stores its own symbols
//! - `Namespace`: one per namespace statement; stores into its global namespace but owns its
//!   `use` table and initialisation map
//! - `Conditional`: a branch or loop body; delegates storage to its enclosing scope, owns an
//!   initialisation map consulted before the enclosing one
//! - `Method`: the body of a function, holding parameters and locals

use crate::ast::Position;
use crate::error::{EngineError, EngineResult};
use crate::issues::Issue;
use crate::symbols::{Symbol, SymbolId, SymbolKind, TypeData, TypeKind};
use indexmap::IndexMap;
use std::fmt;

pub const NAMESPACE_SEPARATOR: char = '\\';
pub const DEFAULT_NAMESPACE: &str = "\\";
pub const CONDITIONAL_SCOPE_NAME: &str = "cScope";
pub const ERRONEOUS_TYPE_NAME: &str = "@error";

/// Generational handle of a scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId {
    generation: u32,
    index: u32,
}

impl ScopeId {
    fn new(generation: u32, index: usize) -> Self {
        Self {
            generation,
            index: index as u32,
        }
    }

    pub fn index(self) -> usize {
        self.index as usize
    }

    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scope#{}@{}", self.index, self.generation)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Initialisation {
    Partial,
    Full,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LookupCase {
    Sensitive,
    Insensitive,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScopeKind {
    GlobalNamespace {
        /// Normalized path, e.g. `\` or `\a\b\`
        path: String,
    },
    Namespace {
        global: ScopeId,
        /// `use` aliases keyed by lowercase alias name
        uses: IndexMap<String, Vec<SymbolId>>,
    },
    Conditional,
    Method {
        method: SymbolId,
    },
}

impl ScopeKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::GlobalNamespace { .. } => "global namespace",
            Self::Namespace { .. } => "namespace",
            Self::Conditional => "conditional",
            Self::Method { .. } => "method",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Scope {
    pub name: String,
    pub enclosing: Option<ScopeId>,
    pub kind: ScopeKind,
    /// Symbols keyed by lowercase name; the exact name is checked on case-sensitive lookups
    symbols: IndexMap<String, Vec<SymbolId>>,
    initialised: IndexMap<SymbolId, Initialisation>,
}

impl Scope {
    fn new(name: impl Into<String>, enclosing: Option<ScopeId>, kind: ScopeKind) -> Self {
        Self {
            name: name.into(),
            enclosing,
            kind,
            symbols: IndexMap::new(),
            initialised: IndexMap::new(),
        }
    }

    pub fn is_conditional(&self) -> bool {
        matches!(self.kind, ScopeKind::Conditional)
    }

    /// Symbols stored directly in this scope, in definition order
    pub fn symbols(&self) -> impl Iterator<Item = SymbolId> + '_ {
        self.symbols.values().flatten().copied()
    }

    pub fn initialisations(&self) -> &IndexMap<SymbolId, Initialisation> {
        &self.initialised
    }
}

/// Arena of all scopes and symbols of one compilation run
#[derive(Debug, Clone)]
pub struct SymbolTable {
    generation: u32,
    scopes: Vec<Scope>,
    symbols: Vec<Symbol>,
    /// Lowercase normalized path -> global namespace scope
    namespaces: IndexMap<String, ScopeId>,
    default_namespace: ScopeId,
    core: ScopeId,
    super_globals: ScopeId,
    erroneous_type: SymbolId,
}

impl SymbolTable {
    pub fn new(generation: u32) -> Self {
        let mut table = Self {
            generation,
            scopes: Vec::new(),
            symbols: Vec::new(),
            namespaces: IndexMap::new(),
            default_namespace: ScopeId::new(generation, 0),
            core: ScopeId::new(generation, 1),
            super_globals: ScopeId::new(generation, 2),
            erroneous_type: SymbolId::new(generation, 0),
        };

        table.default_namespace = table.push_scope(Scope::new(
            DEFAULT_NAMESPACE,
            None,
            ScopeKind::GlobalNamespace {
                path: DEFAULT_NAMESPACE.to_string(),
            },
        ));
        table
            .namespaces
            .insert(DEFAULT_NAMESPACE.to_string(), table.default_namespace);

        // Built-in scopes sit outside the user scope tree and have no enclosing scope
        table.core = table.push_scope(Scope::new(
            "core",
            None,
            ScopeKind::GlobalNamespace {
                path: "core".to_string(),
            },
        ));
        table.super_globals = table.push_scope(Scope::new(
            "superglobals",
            None,
            ScopeKind::GlobalNamespace {
                path: "superglobals".to_string(),
            },
        ));

        let mut erroneous = Symbol::new(
            ERRONEOUS_TYPE_NAME,
            Position::default(),
            SymbolKind::Type(TypeData {
                kind: TypeKind::Erroneous,
                absolute_name: ERRONEOUS_TYPE_NAME.to_string(),
                parents: Vec::new(),
                conversions: Vec::new(),
            }),
        );
        erroneous.definition_scope = Some(table.core);
        table.erroneous_type = table.push_symbol(erroneous);
        table
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn default_namespace(&self) -> ScopeId {
        self.default_namespace
    }

    pub fn core_scope(&self) -> ScopeId {
        self.core
    }

    pub fn super_global_scope(&self) -> ScopeId {
        self.super_globals
    }

    pub fn erroneous_type(&self) -> SymbolId {
        self.erroneous_type
    }

    fn push_scope(&mut self, scope: Scope) -> ScopeId {
        let id = ScopeId::new(self.generation, self.scopes.len());
        self.scopes.push(scope);
        id
    }

    fn push_symbol(&mut self, symbol: Symbol) -> SymbolId {
        let id = SymbolId::new(self.generation, self.symbols.len());
        self.symbols.push(symbol);
        id
    }

    pub fn scope(&self, id: ScopeId) -> EngineResult<&Scope> {
        if id.generation != self.generation {
            return Err(EngineError::StaleScope { scope: id });
        }
        self.scopes
            .get(id.index())
            .ok_or(EngineError::StaleScope { scope: id })
    }

    fn scope_mut(&mut self, id: ScopeId) -> EngineResult<&mut Scope> {
        if id.generation != self.generation {
            return Err(EngineError::StaleScope { scope: id });
        }
        self.scopes
            .get_mut(id.index())
            .ok_or(EngineError::StaleScope { scope: id })
    }

    pub fn symbol(&self, id: SymbolId) -> EngineResult<&Symbol> {
        if id.generation() != self.generation {
            return Err(EngineError::StaleSymbol { symbol: id });
        }
        self.symbols
            .get(id.index())
            .ok_or(EngineError::StaleSymbol { symbol: id })
    }

    pub fn symbol_mut(&mut self, id: SymbolId) -> EngineResult<&mut Symbol> {
        if id.generation() != self.generation {
            return Err(EngineError::StaleSymbol { symbol: id });
        }
        self.symbols
            .get_mut(id.index())
            .ok_or(EngineError::StaleSymbol { symbol: id })
    }

    /// All symbols of the run, in creation order
    pub fn symbols(&self) -> impl Iterator<Item = (SymbolId, &Symbol)> + '_ {
        let generation = self.generation;
        self.symbols
            .iter()
            .enumerate()
            .map(move |(index, symbol)| (SymbolId::new(generation, index), symbol))
    }

    pub fn add_scope(
        &mut self,
        name: impl Into<String>,
        enclosing: ScopeId,
        kind: ScopeKind,
    ) -> EngineResult<ScopeId> {
        self.scope(enclosing)?;
        Ok(self.push_scope(Scope::new(name, Some(enclosing), kind)))
    }

    /// Register a symbol that is not stored under any scope (placeholders)
    pub fn add_detached(&mut self, symbol: Symbol) -> SymbolId {
        self.push_symbol(symbol)
    }

    /// Placeholder for a failed resolution carrying the triggering issue
    pub fn add_erroneous(&mut self, name: impl Into<String>, position: Position, issue: Issue) -> SymbolId {
        self.push_symbol(Symbol::new(name, position, SymbolKind::Erroneous(Box::new(issue))))
    }

    /// The scope whose table receives definitions made in `scope`
    pub fn storage_scope(&self, scope: ScopeId) -> EngineResult<ScopeId> {
        let mut current = scope;
        loop {
            let entry = self.scope(current)?;
            match &entry.kind {
                ScopeKind::Namespace { global, .. } => return Ok(*global),
                ScopeKind::Conditional => {
                    current = entry.enclosing.ok_or_else(|| EngineError::UnexpectedScope {
                        expected: "enclosed conditional".to_string(),
                        found: entry.name.clone(),
                    })?
                }
                ScopeKind::GlobalNamespace { .. } | ScopeKind::Method { .. } => return Ok(current),
            }
        }
    }

    /// The scope recorded as definition scope for symbols defined in `scope`
    fn definition_scope_for(&self, scope: ScopeId) -> EngineResult<ScopeId> {
        let mut current = scope;
        while let Scope {
            kind: ScopeKind::Conditional,
            enclosing: Some(enclosing),
            ..
        } = self.scope(current)?
        {
            current = *enclosing;
        }
        Ok(current)
    }

    /// Append `symbol` under its name and record its definition scope
    pub fn define(&mut self, scope: ScopeId, mut symbol: Symbol) -> EngineResult<SymbolId> {
        let definition_scope = self.definition_scope_for(scope)?;
        let storage = self.storage_scope(scope)?;
        symbol.definition_scope = Some(definition_scope);
        let key = symbol.name.to_lowercase();
        let id = self.push_symbol(symbol);
        self.scope_mut(storage)?.symbols.entry(key).or_default().push(id);
        Ok(id)
    }

    /// Register a `use` alias in the use table of a namespace statement
    pub fn define_use(&mut self, namespace: ScopeId, mut alias: Symbol) -> EngineResult<SymbolId> {
        alias.definition_scope = Some(namespace);
        let key = alias.name.to_lowercase();
        let id = self.push_symbol(alias);
        match &mut self.scope_mut(namespace)?.kind {
            ScopeKind::Namespace { uses, .. } => {
                uses.entry(key).or_default().push(id);
                Ok(id)
            }
            other => Err(EngineError::UnexpectedScope {
                expected: "namespace".to_string(),
                found: other.label().to_string(),
            }),
        }
    }

    /// All aliases named `alias` in the use table of `namespace`, in definition order
    pub fn uses_named(&self, namespace: ScopeId, alias: &str) -> EngineResult<Vec<SymbolId>> {
        match &self.scope(namespace)?.kind {
            ScopeKind::Namespace { uses, .. } => Ok(uses
                .get(&alias.to_lowercase())
                .cloned()
                .unwrap_or_default()),
            _ => Ok(Vec::new()),
        }
    }

    /// First alias named `alias` visible from `namespace`
    pub fn use_definition(&self, namespace: ScopeId, alias: &str) -> EngineResult<Option<SymbolId>> {
        Ok(self.uses_named(namespace, alias)?.first().copied())
    }

    /// First-match lookup in the storage of `scope` only; enclosing scopes are not consulted
    pub fn resolve(&self, scope: ScopeId, name: &str, case: LookupCase) -> EngineResult<Option<SymbolId>> {
        self.resolve_where(scope, name, case, |_| true)
    }

    pub fn resolve_where(
        &self,
        scope: ScopeId,
        name: &str,
        case: LookupCase,
        accept: impl Fn(&Symbol) -> bool,
    ) -> EngineResult<Option<SymbolId>> {
        for id in self.symbols_named(scope, name)? {
            let symbol = self.symbol(id)?;
            let matches_case = case == LookupCase::Insensitive || symbol.name == name;
            if matches_case && accept(symbol) {
                return Ok(Some(id));
            }
        }
        Ok(None)
    }

    /// Every symbol whose name matches `name` case-insensitively, in definition order
    pub fn symbols_named(&self, scope: ScopeId, name: &str) -> EngineResult<Vec<SymbolId>> {
        let storage = self.storage_scope(scope)?;
        Ok(self
            .scope(storage)?
            .symbols
            .get(&name.to_lowercase())
            .cloned()
            .unwrap_or_default())
    }

    pub fn mark_initialised(&mut self, scope: ScopeId, symbol: SymbolId) -> EngineResult<()> {
        self.scope_mut(scope)?
            .initialised
            .insert(symbol, Initialisation::Full);
        Ok(())
    }

    pub fn is_fully_initialised(&self, scope: ScopeId, symbol: SymbolId) -> EngineResult<bool> {
        let entry = self.scope(scope)?;
        if entry.initialised.get(&symbol) == Some(&Initialisation::Full) {
            return Ok(true);
        }
        match (&entry.kind, entry.enclosing) {
            (ScopeKind::Conditional, Some(enclosing)) => self.is_fully_initialised(enclosing, symbol),
            _ => Ok(false),
        }
    }

    /// Whether `symbol` is initialised on at least one path reaching `scope`
    pub fn is_partially_initialised(&self, scope: ScopeId, symbol: SymbolId) -> EngineResult<bool> {
        let entry = self.scope(scope)?;
        if entry.initialised.contains_key(&symbol) {
            return Ok(true);
        }
        match (&entry.kind, entry.enclosing) {
            (ScopeKind::Conditional, Some(enclosing)) => {
                self.is_partially_initialised(enclosing, symbol)
            }
            _ => Ok(false),
        }
    }

    /// Fold the initialisation maps of branch scopes into `target`
    ///
    /// A symbol fully initialised in every branch of an exhaustive construct becomes fully
    /// initialised; one initialised in only some branches (or in any branch of a
    /// non-exhaustive construct such as a loop) becomes partially initialised.
    pub fn merge_branch_initialisations(
        &mut self,
        target: ScopeId,
        branches: &[ScopeId],
        exhaustive: bool,
    ) -> EngineResult<()> {
        let mut merged: IndexMap<SymbolId, Initialisation> = IndexMap::new();
        for branch in branches {
            for symbol in self.scope(*branch)?.initialised.keys() {
                if merged.contains_key(symbol) {
                    continue;
                }
                let mut full = exhaustive;
                for other in branches {
                    full = full && self.is_fully_initialised(*other, *symbol)?;
                }
                let state = if full {
                    Initialisation::Full
                } else {
                    Initialisation::Partial
                };
                merged.insert(*symbol, state);
            }
        }

        let target_scope = self.scope_mut(target)?;
        for (symbol, state) in merged {
            let current = target_scope.initialised.get(&symbol).copied();
            if current != Some(Initialisation::Full) {
                target_scope.initialised.insert(symbol, state);
            }
        }
        Ok(())
    }

    /// Nearest namespace statement (or global namespace) enclosing `scope`
    pub fn enclosing_namespace(&self, scope: ScopeId) -> EngineResult<ScopeId> {
        let mut current = scope;
        loop {
            let entry = self.scope(current)?;
            match (&entry.kind, entry.enclosing) {
                (ScopeKind::Namespace { .. } | ScopeKind::GlobalNamespace { .. }, _) => {
                    return Ok(current)
                }
                (_, Some(enclosing)) => current = enclosing,
                (_, None) => {
                    return Err(EngineError::UnexpectedScope {
                        expected: "scope enclosed by a namespace".to_string(),
                        found: entry.name.clone(),
                    })
                }
            }
        }
    }

    /// Method whose body contains `scope`, if any
    pub fn enclosing_method(&self, scope: ScopeId) -> EngineResult<Option<SymbolId>> {
        let mut current = Some(scope);
        while let Some(id) = current {
            let entry = self.scope(id)?;
            match entry.kind {
                ScopeKind::Method { method } => return Ok(Some(method)),
                ScopeKind::Namespace { .. } | ScopeKind::GlobalNamespace { .. } => return Ok(None),
                ScopeKind::Conditional => current = entry.enclosing,
            }
        }
        Ok(None)
    }

    /// Scope variables are defined in: the nearest method or namespace scope
    pub fn variable_scope(&self, scope: ScopeId) -> EngineResult<ScopeId> {
        let mut current = scope;
        loop {
            let entry = self.scope(current)?;
            match (&entry.kind, entry.enclosing) {
                (ScopeKind::Conditional, Some(enclosing)) => current = enclosing,
                _ => return Ok(current),
            }
        }
    }

    /// Path of the global namespace behind `scope`
    pub fn namespace_path(&self, scope: ScopeId) -> EngineResult<String> {
        let namespace = self.enclosing_namespace(scope)?;
        let storage = self.storage_scope(namespace)?;
        match &self.scope(storage)?.kind {
            ScopeKind::GlobalNamespace { path } => Ok(path.clone()),
            other => Err(EngineError::UnexpectedScope {
                expected: "global namespace".to_string(),
                found: other.label().to_string(),
            }),
        }
    }

    /// Enclosing scope names from the first global namespace down to `scope`, each followed
    /// by `.`, e.g. `\.\.foo().cScope.`
    pub fn scope_path(&self, scope: ScopeId) -> EngineResult<String> {
        let mut names = Vec::new();
        let mut current = Some(scope);
        while let Some(id) = current {
            let entry = self.scope(id)?;
            names.push(entry.name.as_str());
            if matches!(entry.kind, ScopeKind::GlobalNamespace { .. }) {
                break;
            }
            current = entry.enclosing;
        }
        Ok(names.iter().rev().map(|name| format!("{name}.")).collect())
    }

    /// Normalize a namespace path to `\segment\...\` form
    pub fn normalize_namespace(path: &str) -> String {
        let segments: Vec<&str> = path
            .split(NAMESPACE_SEPARATOR)
            .filter(|segment| !segment.is_empty())
            .collect();
        if segments.is_empty() {
            DEFAULT_NAMESPACE.to_string()
        } else {
            format!("\\{}\\", segments.join("\\"))
        }
    }

    /// Global namespace scope for `path`, created on first use
    pub fn global_namespace(&mut self, path: &str) -> ScopeId {
        let normalized = Self::normalize_namespace(path);
        let key = normalized.to_lowercase();
        if let Some(existing) = self.namespaces.get(&key) {
            return *existing;
        }
        let scope = self.push_scope(Scope::new(
            normalized.clone(),
            Some(self.default_namespace),
            ScopeKind::GlobalNamespace { path: normalized },
        ));
        self.namespaces.insert(key, scope);
        scope
    }

    /// Case-insensitive lookup of an existing global namespace
    pub fn find_global_namespace(&self, path: &str) -> Option<ScopeId> {
        self.namespaces
            .get(&Self::normalize_namespace(path).to_lowercase())
            .copied()
    }

    /// Fully qualified name of `name` declared in the namespace enclosing `scope`
    pub fn absolute_name(&self, scope: ScopeId, name: &str) -> EngineResult<String> {
        Ok(format!("{}{}", self.namespace_path(scope)?, name))
    }

    pub fn core_type(&self, name: &str) -> Option<SymbolId> {
        self.resolve_where(self.core, name, LookupCase::Insensitive, |symbol| {
            symbol.as_type().is_some()
        })
        .ok()
        .flatten()
    }

    pub fn core_method(&self, name: &str) -> Option<SymbolId> {
        self.resolve_where(self.core, name, LookupCase::Insensitive, |symbol| {
            symbol.as_method().is_some()
        })
        .ok()
        .flatten()
    }

    /// Absolute name of a type symbol; erroneous placeholders map to the erroneous type
    pub fn type_name(&self, symbol: SymbolId) -> EngineResult<String> {
        match &self.symbol(symbol)?.kind {
            SymbolKind::Type(data) => Ok(data.absolute_name.clone()),
            SymbolKind::Erroneous(_) => Ok(ERRONEOUS_TYPE_NAME.to_string()),
            _ => Err(EngineError::UnexpectedSymbol {
                symbol: self.symbol(symbol)?.name.clone(),
                expected: "type".to_string(),
            }),
        }
    }

    /// Whether `symbol` was defined by a built-in provider
    pub fn is_builtin(&self, symbol: SymbolId) -> EngineResult<bool> {
        let definition = self.symbol(symbol)?.definition_scope;
        Ok(definition == Some(self.core) || definition == Some(self.super_globals))
    }
}
