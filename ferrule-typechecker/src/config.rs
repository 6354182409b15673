//! Engine and solver configuration

/// Limits and scheduling of the constraint solver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolverConfig {
    /// Maximum number of scheduler rounds before unresolved methods are finalized
    pub max_rounds: usize,
    /// Maximum fixpoint passes over one binding collection
    pub max_passes_per_binding: usize,
    /// Maximum number of forked binding collections (synthesized overloads) per function
    pub max_bindings_per_function: usize,
    /// Worker pool size; `None` uses rayon's default
    pub worker_threads: Option<usize>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_rounds: 32,
            max_passes_per_binding: 64,
            max_bindings_per_function: 64,
            worker_threads: None,
        }
    }
}

impl SolverConfig {
    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds.max(1);
        self
    }

    pub fn with_max_passes_per_binding(mut self, passes: usize) -> Self {
        self.max_passes_per_binding = passes.max(1);
        self
    }

    pub fn with_max_bindings_per_function(mut self, bindings: usize) -> Self {
        self.max_bindings_per_function = bindings.max(1);
        self
    }

    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = Some(threads.max(1));
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub solver: SolverConfig,
    /// Whether type names compare case-insensitively (functions always do)
    pub case_insensitive_types: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            solver: SolverConfig::default(),
            case_insensitive_types: true,
        }
    }
}

impl EngineConfig {
    pub fn with_solver(mut self, solver: SolverConfig) -> Self {
        self.solver = solver;
        self
    }

    pub fn with_case_insensitive_types(mut self, enabled: bool) -> Self {
        self.case_insensitive_types = enabled;
        self
    }
}
