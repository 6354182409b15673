//! Cross-function dependency tracking for the constraint solver
//!
//! A function's inferred return type can depend on another function's inferred overloads.
//! Solver workers record those edges here while they run, concurrently, and the scheduler
//! uses them between rounds to re-queue only the work affected by a change.

use crate::constraints::CollectionKey;
use crate::symbols::SymbolId;
use dashmap::{DashMap, DashSet};
use indexmap::IndexMap;
use petgraph::{algo, Graph as PetGraph};
use std::collections::HashMap;

/// A unit of solver work: re-solving one constraint collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkItem {
    pub collection: CollectionKey,
}

/// Result of analysing the recorded call edges between functions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyReport {
    /// Functions ordered callees first; empty if the call graph has cycles
    pub solving_order: Vec<SymbolId>,
    /// Groups of mutually recursive functions (including self-recursive ones)
    pub recursive_groups: Vec<Vec<SymbolId>>,
}

#[derive(Debug, Default)]
pub struct DependencyGraph {
    /// Callee -> functions that call it
    methods_with_dependents: DashMap<SymbolId, DashSet<SymbolId>>,
    /// Callee -> work items waiting for its overloads to change or become final
    dependent_methods: DashMap<SymbolId, DashSet<WorkItem>>,
    /// Caller -> callee -> call-site indices inside the caller
    direct_dependencies: DashMap<CollectionKey, IndexMap<SymbolId, Vec<usize>>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `call_site` in `caller` needs the overloads of `callee`
    ///
    /// Safe to call from several workers at once; repeated registrations are idempotent.
    pub fn register_dependency(&self, caller: CollectionKey, callee: SymbolId, call_site: usize) {
        if let Some(method) = caller.method() {
            self.methods_with_dependents
                .entry(callee)
                .or_default()
                .insert(method);
        }
        self.dependent_methods
            .entry(callee)
            .or_default()
            .insert(WorkItem { collection: caller });

        let mut callees = self.direct_dependencies.entry(caller).or_default();
        let sites = callees.entry(callee).or_default();
        if !sites.contains(&call_site) {
            sites.push(call_site);
        }
    }

    /// Forget the outgoing edges of `caller` before it is solved again
    pub fn clear_direct_dependencies_of(&self, caller: CollectionKey) {
        self.direct_dependencies.remove(&caller);
    }

    pub fn direct_dependencies_of(&self, caller: CollectionKey) -> IndexMap<SymbolId, Vec<usize>> {
        self.direct_dependencies
            .get(&caller)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    /// Remove and return the work waiting on `callee`, in a deterministic order
    pub fn take_dependents(&self, callee: SymbolId) -> Vec<WorkItem> {
        let mut items: Vec<WorkItem> = self
            .dependent_methods
            .remove(&callee)
            .map(|(_, items)| items.into_iter().collect())
            .unwrap_or_default();
        items.sort();
        items
    }

    /// Functions that have called `callee` at some point during this run
    pub fn dependents_of(&self, callee: SymbolId) -> Vec<SymbolId> {
        let mut callers: Vec<SymbolId> = self
            .methods_with_dependents
            .get(&callee)
            .map(|entry| entry.iter().map(|caller| *caller).collect())
            .unwrap_or_default();
        callers.sort();
        callers
    }

    /// Order and group functions by their current call edges
    pub fn resolve(&self) -> DependencyReport {
        let mut graph = PetGraph::<SymbolId, ()>::new();
        let mut nodes = HashMap::new();
        let mut edges: Vec<(SymbolId, SymbolId)> = self
            .direct_dependencies
            .iter()
            .filter_map(|entry| entry.key().method().map(|caller| (caller, entry.value().clone())))
            .flat_map(|(caller, callees)| callees.into_keys().map(move |callee| (callee, caller)))
            .collect();
        edges.sort();

        for (callee, caller) in &edges {
            for symbol in [*callee, *caller] {
                nodes
                    .entry(symbol)
                    .or_insert_with(|| graph.add_node(symbol));
            }
            graph.add_edge(nodes[callee], nodes[caller], ());
        }

        let solving_order = algo::toposort(&graph, None)
            .map(|order| order.into_iter().map(|node| graph[node]).collect())
            .unwrap_or_default();

        let mut recursive_groups: Vec<Vec<SymbolId>> = algo::tarjan_scc(&graph)
            .into_iter()
            .filter(|component| {
                component.len() > 1
                    || component
                        .first()
                        .is_some_and(|node| graph.contains_edge(*node, *node))
            })
            .map(|component| {
                let mut group: Vec<SymbolId> = component.into_iter().map(|node| graph[node]).collect();
                group.sort();
                group
            })
            .collect();
        recursive_groups.sort();

        DependencyReport {
            solving_order,
            recursive_groups,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.direct_dependencies.is_empty() && self.dependent_methods.is_empty()
    }

    pub fn clear(&self) {
        self.methods_with_dependents.clear();
        self.dependent_methods.clear();
        self.direct_dependencies.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Position;
    use crate::scopes::SymbolTable;
    use crate::symbols::{Symbol, SymbolKind, VariableData};
    use rayon::prelude::*;

    fn methods(count: usize) -> Vec<SymbolId> {
        let mut table = SymbolTable::new(0);
        (0..count)
            .map(|index| {
                table.add_detached(Symbol::new(
                    format!("f{index}"),
                    Position::new(index as u32 + 1, 1),
                    SymbolKind::Variable(VariableData::default()),
                ))
            })
            .collect()
    }

    #[test]
    fn test_registration_is_idempotent() {
        let ids = methods(2);
        let graph = DependencyGraph::new();
        let caller = CollectionKey::Method(ids[0]);

        graph.register_dependency(caller, ids[1], 0);
        graph.register_dependency(caller, ids[1], 0);
        graph.register_dependency(caller, ids[1], 3);

        assert_eq!(graph.direct_dependencies_of(caller).get(&ids[1]), Some(&vec![0, 3]));
        assert_eq!(graph.dependents_of(ids[1]), vec![ids[0]]);
        assert_eq!(graph.take_dependents(ids[1]), vec![WorkItem { collection: caller }]);
        assert!(graph.take_dependents(ids[1]).is_empty());
    }

    #[test]
    fn test_concurrent_registration() {
        let ids = methods(8);
        let graph = DependencyGraph::new();
        let callee = ids[0];

        ids[1..].par_iter().for_each(|caller| {
            graph.register_dependency(CollectionKey::Method(*caller), callee, 0);
        });
        graph.register_dependency(CollectionKey::Global, callee, 2);

        let dependents = graph.take_dependents(callee);
        assert_eq!(dependents.len(), 8);
        assert_eq!(dependents[0].collection, CollectionKey::Global);
        assert_eq!(graph.dependents_of(callee).len(), 7);
    }

    #[test]
    fn test_recursive_groups_and_order() {
        let ids = methods(4);
        let graph = DependencyGraph::new();
        // f0 <-> f1 call each other, f2 calls itself, f3 calls f0
        graph.register_dependency(CollectionKey::Method(ids[0]), ids[1], 0);
        graph.register_dependency(CollectionKey::Method(ids[1]), ids[0], 0);
        graph.register_dependency(CollectionKey::Method(ids[2]), ids[2], 0);
        graph.register_dependency(CollectionKey::Method(ids[3]), ids[0], 0);

        let report = graph.resolve();
        assert_eq!(report.recursive_groups, vec![vec![ids[0], ids[1]], vec![ids[2]]]);
        assert!(report.solving_order.is_empty());

        graph.clear();
        graph.register_dependency(CollectionKey::Method(ids[3]), ids[0], 0);
        let report = graph.resolve();
        assert_eq!(report.solving_order, vec![ids[0], ids[3]]);
        assert!(report.recursive_groups.is_empty());
    }
}
