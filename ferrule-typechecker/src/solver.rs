//! Constraint solver
//!
//! Solving is organised in rounds. In each round every queued function collection is solved
//! from scratch on the worker pool against a read-only snapshot of the inferred overloads of
//! all functions. Between rounds (the barrier) the scheduler publishes changed overloads, marks
//! functions whose solution no longer depends on an unfinished callee as finalized, and
//! re-queues the work registered against whatever changed. When nothing is left to run but some
//! functions are still waiting on each other, they are finalized with their best-effort result.
//! The global collection is solved last, once every function is final.
//!
//! Within one collection the solver iterates passes over the type variables until nothing
//! changes. An intersection consuming an untyped parameter forks the binding collection once
//! per applicable parameter type; every surviving fork becomes one overload of the function.

use crate::config::SolverConfig;
use crate::constraints::{
    BindingCollection, CollectionKey, Constraint, ConstraintCollection, ConstraintStore,
    IntersectionConstraint, TypeVariable, TypeVariableId,
};
use crate::dependency_graph::{DependencyGraph, DependencyReport};
use crate::error::{EngineError, EngineResult};
use crate::hierarchy::TypeHierarchy;
use crate::issues::{Issue, IssueCollector, IssueKind};
use crate::overload::{ArgumentBound, OverloadDecider};
use crate::scopes::SymbolTable;
use crate::symbols::{MethodKind, Modifier, SymbolId};
use crate::types::{Overload, ParameterType, TypeVariableReference, UnionType};
use indexmap::IndexMap;
use rayon::prelude::*;
use std::fmt;
use tracing::{debug, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SolverState {
    Idle,
    Solving,
    Solved,
}

impl fmt::Display for SolverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Solving => write!(f, "solving"),
            Self::Solved => write!(f, "solved"),
        }
    }
}

/// Published knowledge about one user function
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MethodTypes {
    pub overloads: Vec<Overload>,
    /// No further round can change the overloads
    pub finalized: bool,
}

/// Overloads of every user function, read by workers and written between rounds
pub type MethodRegistry = IndexMap<SymbolId, MethodTypes>;

/// Solution of one constraint collection
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionOutcome {
    pub key: CollectionKey,
    /// Surviving binding collections, one per synthesized overload
    pub bindings: Vec<BindingCollection>,
    /// Overloads with a known return type
    pub overloads: Vec<Overload>,
    /// Overloads to use if the function has to be finalized now
    pub final_overloads: Vec<Overload>,
    /// Some binding has no known return type yet
    pub unresolved_return: bool,
    /// Some call still waits for an unfinished callee
    pub pending: bool,
    pub issues: Vec<Issue>,
}

#[derive(Debug)]
pub struct ConstraintSolver {
    config: SolverConfig,
    state: SolverState,
    dependencies: DependencyGraph,
    results: IndexMap<CollectionKey, CollectionOutcome>,
    hierarchy: Option<TypeHierarchy>,
    rounds: usize,
}

impl ConstraintSolver {
    pub fn new(config: SolverConfig) -> Self {
        Self {
            config,
            state: SolverState::Idle,
            dependencies: DependencyGraph::new(),
            results: IndexMap::new(),
            hierarchy: None,
            rounds: 0,
        }
    }

    pub fn state(&self) -> SolverState {
        self.state
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    pub fn dependencies(&self) -> &DependencyGraph {
        &self.dependencies
    }

    /// Scheduler rounds used by the last solve
    pub fn rounds(&self) -> usize {
        self.rounds
    }

    pub fn hierarchy(&self) -> Option<&TypeHierarchy> {
        self.hierarchy.as_ref()
    }

    pub fn outcome(&self, key: CollectionKey) -> Option<&CollectionOutcome> {
        self.results.get(&key)
    }

    pub fn bindings(&self, key: CollectionKey) -> Option<&[BindingCollection]> {
        self.results.get(&key).map(|outcome| outcome.bindings.as_slice())
    }

    /// Join of the lower bounds of `variables` across every binding of their collections
    pub fn join_lower_bounds(
        &self,
        store: &ConstraintStore,
        variables: impl IntoIterator<Item = TypeVariableId>,
    ) -> UnionType {
        let mut joined = UnionType::new();
        for id in variables {
            let Some(variable) = store.variable(id) else {
                continue;
            };
            for binding in self.bindings(variable.collection).unwrap_or_default() {
                if let Some(reference) = binding.get(id) {
                    joined.extend(&reference.lower_type_bound);
                }
            }
        }
        match &self.hierarchy {
            Some(hierarchy) => hierarchy.normalize(&joined),
            None => joined,
        }
    }

    pub fn reset(&mut self) {
        self.state = SolverState::Idle;
        self.dependencies.clear();
        self.results.clear();
        self.hierarchy = None;
        self.rounds = 0;
    }

    /// Solve every collection of `store`; a no-op once solved
    pub fn solve_all(
        &mut self,
        table: &mut SymbolTable,
        store: &ConstraintStore,
        issues: &mut IssueCollector,
    ) -> EngineResult<()> {
        match self.state {
            SolverState::Solved => return Ok(()),
            SolverState::Solving => {
                return Err(EngineError::InvalidSolverState {
                    operation: "solve",
                    state: self.state.to_string(),
                })
            }
            SolverState::Idle => {}
        }
        self.state = SolverState::Solving;
        debug!("constraint solving started");

        let hierarchy = TypeHierarchy::from_table(table)?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.worker_threads.unwrap_or(0))
            .build()
            .map_err(|error| EngineError::WorkerPool {
                message: error.to_string(),
            })?;

        let mut registry = self.initial_registry(table, store, &hierarchy)?;
        let mut outcomes: IndexMap<CollectionKey, CollectionOutcome> = IndexMap::new();
        let mut solver_issues = Vec::new();
        let mut queue: Vec<CollectionKey> = store
            .collections()
            .map(|collection| collection.key)
            .filter(|key| {
                key.method()
                    .is_some_and(|method| registry.get(&method).is_some_and(|types| !types.finalized))
            })
            .collect();
        self.rounds = 0;

        loop {
            if queue.is_empty() {
                let stuck: Vec<SymbolId> = registry
                    .iter()
                    .filter(|(_, types)| !types.finalized)
                    .map(|(method, _)| *method)
                    .collect();
                if stuck.is_empty() {
                    break;
                }
                let report = self.dependencies.resolve();
                debug!(
                    functions = stuck.len(),
                    groups = report.recursive_groups.len(),
                    "finalizing functions waiting on each other"
                );
                for method in &stuck {
                    let issue = self.force_finalize(*method, table, store, &hierarchy, &mut registry, &outcomes, &report)?;
                    solver_issues.extend(issue);
                }
                // Refresh the bindings of the finalized functions and their callers
                queue.extend(stuck.iter().map(|method| CollectionKey::Method(*method)));
                for method in &stuck {
                    queue.extend(self.requeue(*method, &registry));
                }
                queue.retain(|key| store.collection(*key).is_some());
                queue.sort();
                queue.dedup();
                if self.rounds >= self.config.max_rounds {
                    break;
                }
                continue;
            }

            if self.rounds >= self.config.max_rounds {
                warn!(rounds = self.rounds, "solver round limit reached");
                solver_issues.push(
                    Issue::new(IssueKind::IterationCapReached, Default::default())
                        .with_parameter("limit", "rounds")
                        .with_parameter("value", self.config.max_rounds.to_string()),
                );
                let unfinished: Vec<SymbolId> = registry
                    .iter()
                    .filter(|(_, types)| !types.finalized)
                    .map(|(method, _)| *method)
                    .collect();
                let report = self.dependencies.resolve();
                for method in unfinished {
                    let issue = self.force_finalize(method, table, store, &hierarchy, &mut registry, &outcomes, &report)?;
                    solver_issues.extend(issue);
                }
                break;
            }

            self.rounds += 1;
            queue.sort();
            queue.dedup();
            debug!(round = self.rounds, collections = queue.len(), "solver round");
            for key in &queue {
                self.dependencies.clear_direct_dependencies_of(*key);
            }

            let round: Vec<CollectionOutcome> = {
                let context = SolveContext {
                    table,
                    store,
                    registry: &registry,
                    hierarchy: &hierarchy,
                    dependencies: &self.dependencies,
                    config: &self.config,
                };
                pool.install(|| {
                    queue
                        .par_iter()
                        .map(|key| context.solve_collection(*key))
                        .collect::<EngineResult<Vec<_>>>()
                })?
            };
            queue.clear();

            for outcome in round {
                let Some(method) = outcome.key.method() else {
                    continue;
                };
                let Some(types) = registry.get_mut(&method) else {
                    continue;
                };
                let (changed, newly_final) = if types.finalized {
                    // Refresh after a forced finalization; callers are already final
                    if !outcome.final_overloads.is_empty() {
                        types.overloads = outcome.final_overloads.clone();
                    }
                    (false, false)
                } else {
                    let changed = !outcome.overloads.is_empty() && types.overloads != outcome.overloads;
                    if changed {
                        types.overloads = outcome.overloads.clone();
                    }
                    let newly_final = !outcome.pending;
                    if newly_final {
                        types.finalized = true;
                        types.overloads = outcome.final_overloads.clone();
                    }
                    (changed, newly_final)
                };
                trace!(
                    method = %method,
                    changed,
                    finalized = types.finalized,
                    "collection solved"
                );
                outcomes.insert(outcome.key, outcome);
                if changed || newly_final {
                    queue.extend(self.requeue(method, &registry));
                }
            }
        }

        let global = SolveContext {
            table,
            store,
            registry: &registry,
            hierarchy: &hierarchy,
            dependencies: &self.dependencies,
            config: &self.config,
        }
        .solve_collection(CollectionKey::Global)?;
        outcomes.insert(CollectionKey::Global, global);

        for (method, types) in &registry {
            if let Some(data) = table.symbol_mut(*method)?.as_method_mut() {
                data.overloads = types.overloads.clone();
            }
        }

        for collection in store.collections() {
            if let Some(outcome) = outcomes.get(&collection.key) {
                for issue in &outcome.issues {
                    issues.report(issue.clone());
                }
            }
        }
        for issue in solver_issues {
            issues.report(issue);
        }

        debug!(rounds = self.rounds, "constraint solving finished");
        self.results = outcomes;
        self.hierarchy = Some(hierarchy);
        self.state = SolverState::Solved;
        Ok(())
    }

    /// Every user function, with those lacking a constraint collection finalized up front
    fn initial_registry(
        &self,
        table: &SymbolTable,
        store: &ConstraintStore,
        hierarchy: &TypeHierarchy,
    ) -> EngineResult<MethodRegistry> {
        let mut registry = MethodRegistry::new();
        for (id, symbol) in table.symbols() {
            let Some(method) = symbol.as_method() else {
                continue;
            };
            if method.is_builtin {
                continue;
            }
            let mut types = MethodTypes::default();
            if store.collection(CollectionKey::Method(id)).is_none() {
                types.overloads = vec![fallback_overload(id, method.parameters.len(), hierarchy)];
                types.finalized = true;
            }
            registry.insert(id, types);
        }
        Ok(registry)
    }

    /// Work waiting on `method` whose function is not final yet
    fn requeue(&self, method: SymbolId, registry: &MethodRegistry) -> Vec<CollectionKey> {
        self.dependencies
            .take_dependents(method)
            .into_iter()
            .map(|item| item.collection)
            .filter(|key| match key.method() {
                Some(caller) => registry.get(&caller).is_some_and(|types| !types.finalized),
                None => false,
            })
            .collect()
    }

    #[allow(clippy::too_many_arguments)]
    fn force_finalize(
        &self,
        method: SymbolId,
        table: &SymbolTable,
        store: &ConstraintStore,
        hierarchy: &TypeHierarchy,
        registry: &mut MethodRegistry,
        outcomes: &IndexMap<CollectionKey, CollectionOutcome>,
        report: &DependencyReport,
    ) -> EngineResult<Option<Issue>> {
        let symbol = table.symbol(method)?;
        let outcome = outcomes.get(&CollectionKey::Method(method));
        let mut overloads = outcome
            .map(|outcome| outcome.final_overloads.clone())
            .unwrap_or_default();
        if overloads.is_empty() {
            let arity = store
                .collection(CollectionKey::Method(method))
                .map(|collection| collection.parameters.len())
                .unwrap_or(0);
            overloads.push(fallback_overload(method, arity, hierarchy));
        }
        if let Some(types) = registry.get_mut(&method) {
            types.overloads = overloads;
            types.finalized = true;
        }

        let unresolved = outcome.is_none_or(|outcome| outcome.unresolved_return);
        if !unresolved {
            return Ok(None);
        }

        let group = report
            .recursive_groups
            .iter()
            .find(|group| group.contains(&method))
            .map(|group| {
                group
                    .iter()
                    .filter_map(|member| table.symbol(*member).ok().map(|symbol| symbol.name.clone()))
                    .collect::<Vec<_>>()
                    .join(", ")
            })
            .unwrap_or_else(|| symbol.name.clone());
        warn!(function = %symbol.name, group = %group, "return type could not be inferred");
        Ok(Some(
            Issue::new(IssueKind::UnresolvableRecursion, symbol.position)
                .with_parameter("function", symbol.name.clone())
                .with_parameter("group", group),
        ))
    }
}

fn fallback_overload(method: SymbolId, arity: usize, hierarchy: &TypeHierarchy) -> Overload {
    Overload {
        method,
        parameters: (0..arity)
            .map(|_| ParameterType::new(hierarchy.mixed_union()))
            .collect(),
        return_type: hierarchy.mixed_union(),
    }
}

/// Read-only view shared by the workers of one round
struct SolveContext<'s> {
    table: &'s SymbolTable,
    store: &'s ConstraintStore,
    registry: &'s MethodRegistry,
    hierarchy: &'s TypeHierarchy,
    dependencies: &'s DependencyGraph,
    config: &'s SolverConfig,
}

impl SolveContext<'_> {
    fn solve_collection(&self, key: CollectionKey) -> EngineResult<CollectionOutcome> {
        let Some(collection) = self.store.collection(key) else {
            return Ok(CollectionOutcome {
                key,
                bindings: Vec::new(),
                overloads: Vec::new(),
                final_overloads: Vec::new(),
                unresolved_return: false,
                pending: false,
                issues: Vec::new(),
            });
        };
        CollectionSolver {
            context: self,
            collection,
            decider: OverloadDecider::new(self.hierarchy),
        }
        .solve()
    }
}

/// Failed overload selection at one call site
#[derive(Debug, Clone, PartialEq)]
struct CallFailure {
    call: TypeVariableId,
    operator: SymbolId,
    arguments: Vec<UnionType>,
}

/// A binding collection being solved plus per-pass bookkeeping
#[derive(Debug, Clone)]
struct BindingRun {
    binding: BindingCollection,
    pending: bool,
    failures: Vec<CallFailure>,
    capped: bool,
}

impl BindingRun {
    fn set(&mut self, variable: TypeVariableId, reference: TypeVariableReference) -> bool {
        if self.binding.bindings.get(&variable) == Some(&reference) {
            return false;
        }
        self.binding.bindings.insert(variable, reference);
        true
    }

    fn bind_parameter(&mut self, variable: TypeVariableId, index: usize, parameter: ParameterType) {
        if parameter.is_convertible {
            self.binding.convertible_parameters.insert(index);
        }
        self.binding
            .bindings
            .insert(variable, TypeVariableReference::fixed(parameter.bound));
    }

    fn lower(&self, variable: TypeVariableId) -> UnionType {
        self.binding
            .get(variable)
            .map(|reference| reference.lower_type_bound.clone())
            .unwrap_or_default()
    }

    fn upper(&self, variable: TypeVariableId) -> UnionType {
        self.binding
            .get(variable)
            .map(|reference| reference.upper_type_bound.clone())
            .unwrap_or_default()
    }
}

enum Evaluation {
    /// Leave the current binding untouched
    Keep,
    Bound(TypeVariableReference),
    /// Not decidable yet (soft typing)
    Unresolved,
    Failed(CallFailure),
    Fork {
        parameter: TypeVariableId,
        index: usize,
        candidates: Vec<ParameterType>,
    },
}

enum BindingStep {
    Stable(BindingRun),
    Failed(BindingRun),
    Fork {
        run: BindingRun,
        parameter: TypeVariableId,
        index: usize,
        candidates: Vec<ParameterType>,
    },
}

struct CollectionSolver<'c, 's> {
    context: &'c SolveContext<'s>,
    collection: &'s ConstraintCollection,
    decider: OverloadDecider<'s>,
}

impl CollectionSolver<'_, '_> {
    fn solve(&self) -> EngineResult<CollectionOutcome> {
        let key = self.collection.key;
        let initial = self.initial_run()?;

        let (mut done, failed, mut forks_capped) = self.solve_runs(vec![initial], false)?;
        if done.is_empty() {
            // Every binding failed: keep the first one, with failing calls typed as erroneous
            if let Some(first) = failed.into_iter().next() {
                let (tolerant, _, capped) = self.solve_runs(vec![first], true)?;
                done = tolerant;
                forks_capped |= capped;
            }
        }

        let mut issues = Vec::new();
        for run in &done {
            for failure in &run.failures {
                let issue = self.failure_issue(failure)?;
                if !issues.contains(&issue) {
                    issues.push(issue);
                }
            }
        }
        let position = match key.method() {
            Some(method) => self.context.table.symbol(method)?.position,
            None => Default::default(),
        };
        if done.iter().any(|run| run.capped) {
            issues.push(
                Issue::new(IssueKind::IterationCapReached, position)
                    .with_parameter("limit", "passes")
                    .with_parameter("value", self.context.config.max_passes_per_binding.to_string()),
            );
        }
        if forks_capped {
            issues.push(
                Issue::new(IssueKind::IterationCapReached, position)
                    .with_parameter("limit", "bindings")
                    .with_parameter("value", self.context.config.max_bindings_per_function.to_string()),
            );
        }

        let pending = done.iter().any(|run| run.pending);
        let (overloads, final_overloads, unresolved_return) = match key.method() {
            Some(method) => self.build_overloads(method, &done)?,
            None => (Vec::new(), Vec::new(), false),
        };

        Ok(CollectionOutcome {
            key,
            bindings: done.into_iter().map(|run| run.binding).collect(),
            overloads,
            final_overloads,
            unresolved_return,
            pending,
            issues,
        })
    }

    fn initial_run(&self) -> EngineResult<BindingRun> {
        let mut binding = BindingCollection::new(self.collection.key);
        for parameter in &self.collection.parameters {
            let variable = self.variable(*parameter)?;
            if let Some(declared) = variable.fixed_type {
                binding.bindings.insert(
                    *parameter,
                    TypeVariableReference::fixed(self.context.hierarchy.union_of(declared)),
                );
            }
        }
        Ok(BindingRun {
            binding,
            pending: false,
            failures: Vec::new(),
            capped: false,
        })
    }

    /// Depth-first over forks; returns the stable and the failed runs in fork order, and
    /// whether candidates were dropped at the binding limit
    fn solve_runs(
        &self,
        initial: Vec<BindingRun>,
        tolerant: bool,
    ) -> EngineResult<(Vec<BindingRun>, Vec<BindingRun>, bool)> {
        let mut stack: Vec<BindingRun> = initial.into_iter().rev().collect();
        let mut done = Vec::new();
        let mut failed = Vec::new();
        let mut capped = false;

        while let Some(run) = stack.pop() {
            match self.run_binding(run, tolerant)? {
                BindingStep::Stable(run) => done.push(run),
                BindingStep::Failed(run) => failed.push(run),
                BindingStep::Fork {
                    run,
                    parameter,
                    index,
                    mut candidates,
                } => {
                    let capacity = self
                        .context
                        .config
                        .max_bindings_per_function
                        .saturating_sub(done.len() + stack.len())
                        .max(1);
                    if candidates.len() > capacity {
                        warn!(
                            collection = %self.collection.key,
                            candidates = candidates.len(),
                            capacity,
                            "binding fork limit reached"
                        );
                        candidates.truncate(capacity);
                        capped = true;
                    }
                    trace!(
                        collection = %self.collection.key,
                        parameter = index,
                        forks = candidates.len(),
                        "forking binding collection"
                    );
                    for candidate in candidates.into_iter().rev() {
                        let mut fork = run.clone();
                        fork.bind_parameter(parameter, index, candidate);
                        stack.push(fork);
                    }
                }
            }
        }
        Ok((done, failed, capped))
    }

    fn run_binding(&self, mut run: BindingRun, tolerant: bool) -> EngineResult<BindingStep> {
        loop {
            let mut stable = false;
            for _ in 0..self.context.config.max_passes_per_binding {
                run.pending = false;
                run.failures.clear();
                let mut changed = false;

                for id in &self.collection.type_variables {
                    match self.evaluate(&mut run, *id, tolerant)? {
                        Evaluation::Keep => {}
                        Evaluation::Bound(reference) => changed |= run.set(*id, reference),
                        Evaluation::Unresolved => changed |= run.set(*id, TypeVariableReference::default()),
                        Evaluation::Failed(failure) => {
                            run.failures.push(failure);
                            changed |= run.set(*id, TypeVariableReference::default());
                        }
                        Evaluation::Fork {
                            parameter,
                            index,
                            candidates,
                        } => {
                            return Ok(BindingStep::Fork {
                                run,
                                parameter,
                                index,
                                candidates,
                            })
                        }
                    }
                }

                if !changed {
                    stable = true;
                    break;
                }
            }

            if !stable {
                warn!(collection = %self.collection.key, "binding did not stabilise");
                run.capped = true;
            }
            if !self.close_open_parameters(&mut run)? {
                break;
            }
        }

        if !tolerant && !run.failures.is_empty() {
            return Ok(BindingStep::Failed(run));
        }
        Ok(BindingStep::Stable(run))
    }

    /// Bind still-untyped parameters to `mixed`; returns whether any was bound
    fn close_open_parameters(&self, run: &mut BindingRun) -> EngineResult<bool> {
        let mut closed = false;
        for parameter in &self.collection.parameters {
            if run.binding.get(*parameter).is_some_and(|reference| reference.is_fixed) {
                continue;
            }
            let index = self.variable(*parameter)?.parameter_index.unwrap_or(0);
            run.bind_parameter(*parameter, index, ParameterType::new(self.context.hierarchy.mixed_union()));
            closed = true;
        }
        Ok(closed)
    }

    fn variable(&self, id: TypeVariableId) -> EngineResult<&TypeVariable> {
        self.context
            .store
            .variable(id)
            .ok_or_else(|| EngineError::UnknownTypeVariable {
                variable: id.to_string(),
            })
    }

    fn evaluate(&self, run: &mut BindingRun, id: TypeVariableId, tolerant: bool) -> EngineResult<Evaluation> {
        let variable = self.variable(id)?;
        if let Some(fixed) = variable.fixed_type {
            return Ok(Evaluation::Bound(TypeVariableReference::fixed(
                self.context.hierarchy.union_of(fixed),
            )));
        }
        if variable.is_parameter() {
            return Ok(Evaluation::Keep);
        }

        match &variable.constraint {
            Constraint::Ref(sources) => {
                let hierarchy = self.context.hierarchy;
                let mut lower = UnionType::new();
                let mut upper = UnionType::new();
                // An unconstrained source leaves the join unconstrained
                let mut bounded = !sources.is_empty();
                for source in sources {
                    lower.extend(&run.lower(*source));
                    let source_upper = run.upper(*source);
                    bounded &= !source_upper.is_empty();
                    upper.extend(&source_upper);
                }
                let upper = if bounded { hierarchy.normalize(&upper) } else { UnionType::new() };
                Ok(Evaluation::Bound(TypeVariableReference::bounded(
                    hierarchy.normalize(&lower),
                    upper,
                )))
            }
            Constraint::Transfer(source) => Ok(Evaluation::Bound(TypeVariableReference::bounded(
                run.lower(*source),
                run.upper(*source),
            ))),
            Constraint::Intersection(intersection) => self.evaluate_call(run, variable, intersection, tolerant),
        }
    }

    /// Follow copies back to an untyped parameter of this binding
    fn open_parameter(&self, run: &BindingRun, id: TypeVariableId) -> EngineResult<Option<(TypeVariableId, usize)>> {
        let mut current = id;
        for _ in 0..self.collection.type_variables.len().max(1) {
            let variable = self.variable(current)?;
            if let Some(index) = variable.parameter_index {
                let bound = variable.fixed_type.is_some()
                    || run.binding.get(current).is_some_and(|reference| reference.is_fixed);
                return Ok((!bound).then_some((current, index)));
            }
            match &variable.constraint {
                Constraint::Transfer(source) => current = *source,
                Constraint::Ref(sources) if sources.len() == 1 => current = sources[0],
                _ => return Ok(None),
            }
        }
        Ok(None)
    }

    fn evaluate_call(
        &self,
        run: &mut BindingRun,
        variable: &TypeVariable,
        intersection: &IntersectionConstraint,
        tolerant: bool,
    ) -> EngineResult<Evaluation> {
        let hierarchy = self.context.hierarchy;
        let callee = self.context.table.symbol(intersection.operator)?;
        let method = callee.as_method().ok_or_else(|| EngineError::UnexpectedSymbol {
            symbol: callee.name.clone(),
            expected: "function or operator".to_string(),
        })?;

        let (overloads, finalized): (&[Overload], bool) = if method.is_builtin {
            (method.overloads.as_slice(), true)
        } else {
            self.context
                .registry
                .get(&intersection.operator)
                .map(|types| (types.overloads.as_slice(), types.finalized))
                .unwrap_or_default()
        };
        if !finalized {
            self.context.dependencies.register_dependency(
                self.collection.key,
                intersection.operator,
                intersection.call_site,
            );
            run.pending = true;
        }

        let mut open = Vec::new();
        let mut lowers = Vec::with_capacity(intersection.arguments.len());
        for (position, argument) in intersection.arguments.iter().enumerate() {
            match self.open_parameter(run, *argument)? {
                Some(parameter) => {
                    open.push((position, parameter));
                    lowers.push(UnionType::new());
                }
                None => lowers.push(run.lower(*argument)),
            }
        }

        if lowers
            .iter()
            .any(|lower| lower.contains_symbol(hierarchy.erroneous()))
        {
            return Ok(Evaluation::Bound(TypeVariableReference::resolved(hierarchy.erroneous_union())));
        }
        let failure = || CallFailure {
            call: variable.id,
            operator: intersection.operator,
            arguments: lowers.clone(),
        };
        if overloads.is_empty() {
            return Ok(if finalized {
                self.fail(run, failure(), tolerant)
            } else {
                Evaluation::Unresolved
            });
        }
        let has_bottom = lowers
            .iter()
            .enumerate()
            .any(|(position, lower)| lower.is_empty() && !open.iter().any(|(open, _)| *open == position));
        if has_bottom {
            return Ok(Evaluation::Unresolved);
        }

        let arguments: Vec<ArgumentBound<'_>> = lowers
            .iter()
            .enumerate()
            .map(|(position, lower)| {
                if open.iter().any(|(open, _)| *open == position) {
                    ArgumentBound::Open
                } else {
                    ArgumentBound::Bound(lower)
                }
            })
            .collect();
        let candidates = self.decider.applicable_overloads(overloads, &arguments);

        if let Some((position, (parameter, index))) = open.first().copied() {
            if candidates.is_empty() {
                return Ok(if finalized {
                    self.fail(run, failure(), tolerant)
                } else {
                    Evaluation::Unresolved
                });
            }
            let mut types: Vec<ParameterType> = Vec::new();
            for (candidate, _) in &candidates {
                let parameter_type = overloads[*candidate].parameters[position].clone();
                if !types.contains(&parameter_type) {
                    types.push(parameter_type);
                }
            }
            return Ok(Evaluation::Fork {
                parameter,
                index,
                candidates: types,
            });
        }

        if candidates.is_empty() {
            return Ok(if finalized {
                self.fail(run, failure(), tolerant)
            } else {
                Evaluation::Unresolved
            });
        }

        let Some((chosen, fit)) = self.decider.most_specific(&run.binding, &candidates) else {
            return Ok(Evaluation::Unresolved);
        };
        run.binding.record_call(variable.id, fit.converting);
        trace!(
            call = %variable.name,
            overload = %overloads[chosen],
            level = fit.level,
            "overload selected"
        );
        Ok(Evaluation::Bound(TypeVariableReference::resolved(
            hierarchy.normalize(&overloads[chosen].return_type),
        )))
    }

    fn fail(&self, run: &mut BindingRun, failure: CallFailure, tolerant: bool) -> Evaluation {
        if tolerant {
            run.failures.push(failure);
            Evaluation::Bound(TypeVariableReference::resolved(self.context.hierarchy.erroneous_union()))
        } else {
            Evaluation::Failed(failure)
        }
    }

    fn failure_issue(&self, failure: &CallFailure) -> EngineResult<Issue> {
        let callee = self.context.table.symbol(failure.operator)?;
        let kind = match callee.as_method().map(|method| method.kind) {
            Some(MethodKind::Operator) => IssueKind::WrongOperatorUsage,
            _ => IssueKind::WrongFunctionCall,
        };
        let arguments = failure
            .arguments
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        Ok(Issue::new(kind, self.variable(failure.call)?.position)
            .with_parameter("name", callee.name.clone())
            .with_parameter("arguments", arguments))
    }

    /// Overloads of a function from its surviving bindings
    ///
    /// Returns the publishable overloads (known return type), the overloads to use when the
    /// function is finalized now (unknown returns widened to `mixed`) and whether any return
    /// type was unknown.
    fn build_overloads(
        &self,
        method: SymbolId,
        runs: &[BindingRun],
    ) -> EngineResult<(Vec<Overload>, Vec<Overload>, bool)> {
        let hierarchy = self.context.hierarchy;
        let modifiers = self
            .context
            .table
            .symbol(method)?
            .as_method()
            .map(|data| data.return_modifiers.clone())
            .unwrap_or_default();

        let mut published = Vec::new();
        let mut finals = Vec::new();
        let mut unresolved = false;
        for run in runs {
            let mut parameters = Vec::with_capacity(self.collection.parameters.len());
            for (index, parameter) in self.collection.parameters.iter().enumerate() {
                let bound = run.lower(*parameter);
                parameters.push(ParameterType {
                    bound: if bound.is_empty() { hierarchy.mixed_union() } else { bound },
                    is_convertible: run.binding.convertible_parameters.contains(&index),
                });
            }

            let mut return_type = self
                .collection
                .return_variable
                .map(|variable| run.lower(variable))
                .unwrap_or_default();
            let known = !return_type.is_empty();
            if !known {
                unresolved = true;
                return_type = hierarchy.mixed_union();
            }
            for modifier in &modifiers {
                let extra = match modifier {
                    Modifier::Nullable => crate::builtins::type_names::NULL,
                    Modifier::Falseable => crate::builtins::type_names::BOOL,
                };
                if let Some(symbol) = hierarchy.symbol_named(extra) {
                    return_type.insert(extra, symbol);
                }
            }
            let overload = Overload {
                method,
                parameters,
                return_type: hierarchy.normalize(&return_type),
            };

            if known && !published.contains(&overload) {
                published.push(overload.clone());
            }
            if !finals.contains(&overload) {
                finals.push(overload);
            }
        }
        Ok((published, finals, unresolved))
    }
}
