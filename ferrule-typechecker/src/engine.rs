//! Inference engine facade
//!
//! Owns everything belonging to one compilation run: the symbol table, the constraint store,
//! the solver and the collected issues. The traversal driver asks it for the controller of
//! the current pass, calls [`InferenceEngine::solve_all`] once the inference pass is done and
//! then queries the results. [`InferenceEngine::reset`] starts a new run on the same instance.

use crate::ast::{Ast, NodeId};
use crate::builtins::{BuiltinProvider, CoreRegistrar, StandardLibrary};
use crate::config::EngineConfig;
use crate::constraints::{BindingCollection, CollectionKey, ConstraintStore};
use crate::controllers::{type_variable_of, DefinitionController, InferenceController, ReferenceController};
use crate::error::{EngineError, EngineResult};
use crate::issues::{Issue, IssueCollector, IssueReporter, Severity};
use crate::resolution::{ResolverChain, SymbolResolver};
use crate::scopes::{ScopeId, SymbolTable};
use crate::solver::{ConstraintSolver, SolverState};
use crate::symbols::SymbolId;
use crate::types::{Overload, UnionType};
use tracing::debug;

pub struct InferenceEngine {
    config: EngineConfig,
    generation: u32,
    table: SymbolTable,
    store: ConstraintStore,
    resolvers: ResolverChain,
    solver: ConstraintSolver,
    issues: IssueCollector,
    providers: Vec<Box<dyn BuiltinProvider>>,
}

impl InferenceEngine {
    /// Engine with the default configuration and the standard library
    pub fn new() -> EngineResult<Self> {
        Self::builder().build()
    }

    pub fn with_config(config: EngineConfig) -> EngineResult<Self> {
        Self::builder().with_config(config).build()
    }

    pub fn builder() -> InferenceEngineBuilder {
        InferenceEngineBuilder::default()
    }

    fn fresh_table(generation: u32, providers: &[Box<dyn BuiltinProvider>]) -> EngineResult<SymbolTable> {
        let mut table = SymbolTable::new(generation);
        let mut registrar = CoreRegistrar::new(&mut table);
        for provider in providers {
            provider.register(&mut registrar)?;
        }
        Ok(table)
    }

    fn ensure_idle(&self, operation: &'static str) -> EngineResult<()> {
        match self.solver.state() {
            SolverState::Idle => Ok(()),
            state => Err(EngineError::InvalidSolverState {
                operation,
                state: state.to_string(),
            }),
        }
    }

    /// Controller of the definition pass
    pub fn definition(&mut self) -> EngineResult<DefinitionController<'_>> {
        self.ensure_idle("define symbols")?;
        Ok(DefinitionController::new(&mut self.table))
    }

    /// Controller of the reference pass
    pub fn reference(&mut self) -> EngineResult<ReferenceController<'_>> {
        self.ensure_idle("resolve references")?;
        Ok(ReferenceController::new(
            &mut self.table,
            &self.resolvers,
            &mut self.issues,
            &self.config,
        ))
    }

    /// Controller of the inference pass
    pub fn inference(&mut self) -> EngineResult<InferenceController<'_>> {
        self.ensure_idle("create constraints")?;
        Ok(InferenceController::new(&mut self.table, &mut self.store))
    }

    /// Solve every constraint collection; a no-op once solved
    pub fn solve_all(&mut self) -> EngineResult<()> {
        debug!(
            generation = self.generation,
            variables = self.store.variables().len(),
            "solving constraints"
        );
        self.solver
            .solve_all(&mut self.table, &self.store, &mut self.issues)
    }

    /// Forget the current run and start over with fresh built-ins
    ///
    /// Handles from the previous run become stale and are rejected by the table.
    pub fn reset(&mut self) -> EngineResult<()> {
        self.generation = self.generation.wrapping_add(1);
        debug!(generation = self.generation, "engine reset");
        self.table = Self::fresh_table(self.generation, &self.providers)?;
        self.store = ConstraintStore::new();
        self.solver.reset();
        self.issues.reset();
        Ok(())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn table(&self) -> &SymbolTable {
        &self.table
    }

    pub fn store(&self) -> &ConstraintStore {
        &self.store
    }

    pub fn solver(&self) -> &ConstraintSolver {
        &self.solver
    }

    pub fn solver_state(&self) -> SolverState {
        self.solver.state()
    }

    pub fn issues(&self) -> &[Issue] {
        self.issues.issues()
    }

    pub fn has_found(&self, severity: Severity) -> bool {
        self.issues.has_found(severity)
    }

    pub fn add_issue_reporter(&mut self, reporter: Box<dyn IssueReporter>) {
        self.issues.add_reporter(reporter);
    }

    /// Type of a variable: the join over all of its versions
    ///
    /// Variables never written start from their declared type.
    pub fn variable_binding(&self, variable: SymbolId) -> EngineResult<UnionType> {
        let symbol = self.table.symbol(variable)?;
        let data = symbol.as_variable().ok_or_else(|| EngineError::UnexpectedSymbol {
            symbol: symbol.name.clone(),
            expected: "variable".to_string(),
        })?;
        if data.ref_variables.is_empty() {
            return match data.declared_type {
                Some(declared) => Ok(UnionType::single(self.table.type_name(declared)?, declared)),
                None => Ok(UnionType::new()),
            };
        }
        Ok(self
            .solver
            .join_lower_bounds(&self.store, data.ref_variables.iter().copied()))
    }

    /// Inferred type of an expression node
    pub fn node_type(&self, ast: &Ast, node: NodeId) -> EngineResult<UnionType> {
        let variable = type_variable_of(ast, node)?;
        Ok(self.solver.join_lower_bounds(&self.store, [variable]))
    }

    /// Overloads of a function or operator: fixed for built-ins, inferred for user functions
    pub fn overloads(&self, method: SymbolId) -> EngineResult<&[Overload]> {
        let symbol = self.table.symbol(method)?;
        symbol
            .as_method()
            .map(|data| data.overloads.as_slice())
            .ok_or_else(|| EngineError::UnexpectedSymbol {
                symbol: symbol.name.clone(),
                expected: "function".to_string(),
            })
    }

    pub fn bindings(&self, collection: CollectionKey) -> Option<&[BindingCollection]> {
        self.solver.bindings(collection)
    }

    /// Dotted path of enclosing scope names, e.g. `\.\.foo().cScope.`
    pub fn scope_path(&self, scope: ScopeId) -> EngineResult<String> {
        self.table.scope_path(scope)
    }
}

impl std::fmt::Debug for InferenceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceEngine")
            .field("generation", &self.generation)
            .field("config", &self.config)
            .field("resolvers", &self.resolvers)
            .field("solver", &self.solver.state())
            .field("issues", &self.issues.len())
            .field("providers", &self.providers.len())
            .finish()
    }
}

/// Assembles an [`InferenceEngine`]
///
/// The standard library is registered first unless disabled; extra providers follow in the
/// order they were added. Extra resolvers are consulted after the standard chain.
pub struct InferenceEngineBuilder {
    config: EngineConfig,
    standard_library: bool,
    providers: Vec<Box<dyn BuiltinProvider>>,
    resolvers: Vec<Box<dyn SymbolResolver>>,
}

impl Default for InferenceEngineBuilder {
    fn default() -> Self {
        Self {
            config: EngineConfig::default(),
            standard_library: true,
            providers: Vec::new(),
            resolvers: Vec::new(),
        }
    }
}

impl InferenceEngineBuilder {
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn without_standard_library(mut self) -> Self {
        self.standard_library = false;
        self
    }

    pub fn with_provider(mut self, provider: Box<dyn BuiltinProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn with_resolver(mut self, resolver: Box<dyn SymbolResolver>) -> Self {
        self.resolvers.push(resolver);
        self
    }

    pub fn build(self) -> EngineResult<InferenceEngine> {
        let mut providers: Vec<Box<dyn BuiltinProvider>> = Vec::new();
        if self.standard_library {
            providers.push(Box::new(StandardLibrary));
        }
        providers.extend(self.providers);

        let resolvers = self
            .resolvers
            .into_iter()
            .fold(ResolverChain::builder().with_standard_resolvers(), |chain, resolver| {
                chain.with_resolver(resolver)
            })
            .build();

        let table = InferenceEngine::fresh_table(0, &providers)?;
        debug!(resolvers = ?resolvers.resolver_names(), "inference engine created");
        Ok(InferenceEngine {
            solver: ConstraintSolver::new(self.config.solver.clone()),
            config: self.config,
            generation: 0,
            table,
            store: ConstraintStore::new(),
            resolvers,
            issues: IssueCollector::new(),
            providers,
        })
    }
}
