//! Supertype lattice
//!
//! Every type symbol becomes a node; an edge points from a type to each of its immediate
//! parents. A type may have several parents (a class implementing two interfaces), so the
//! promotion level is a shortest path rather than a depth difference.

use crate::error::EngineResult;
use crate::scopes::SymbolTable;
use crate::symbols::{SymbolId, TypeKind};
use crate::types::UnionType;
use indexmap::IndexMap;
use petgraph::algo::dijkstra;
use petgraph::graph::{DiGraph, NodeIndex};

#[derive(Debug, Clone)]
pub struct TypeHierarchy {
    graph: DiGraph<SymbolId, ()>,
    nodes: IndexMap<SymbolId, NodeIndex>,
    names: IndexMap<SymbolId, String>,
    conversions: IndexMap<SymbolId, Vec<SymbolId>>,
    erroneous: SymbolId,
    mixed: Option<SymbolId>,
}

impl TypeHierarchy {
    /// Build the lattice from every type symbol currently in `table`
    ///
    /// Classes declared without parents are attached to `mixed`.
    pub fn from_table(table: &SymbolTable) -> EngineResult<Self> {
        let mut hierarchy = Self {
            graph: DiGraph::new(),
            nodes: IndexMap::new(),
            names: IndexMap::new(),
            conversions: IndexMap::new(),
            erroneous: table.erroneous_type(),
            mixed: table.core_type(crate::builtins::type_names::MIXED),
        };

        let types: Vec<_> = table
            .symbols()
            .filter_map(|(id, symbol)| symbol.as_type().map(|data| (id, data.clone())))
            .collect();

        for (id, data) in &types {
            let node = hierarchy.graph.add_node(*id);
            hierarchy.nodes.insert(*id, node);
            hierarchy.names.insert(*id, data.absolute_name.clone());
            if !data.conversions.is_empty() {
                hierarchy.conversions.insert(*id, data.conversions.clone());
            }
        }

        for (id, data) in &types {
            let child = hierarchy.nodes[id];
            let mut parents = data.parents.clone();
            if parents.is_empty() && data.kind == TypeKind::Class {
                parents.extend(hierarchy.mixed.filter(|mixed| mixed != id));
            }
            for parent in parents {
                if let Some(parent) = hierarchy.nodes.get(&parent) {
                    hierarchy.graph.add_edge(child, *parent, ());
                }
            }
        }

        Ok(hierarchy)
    }

    pub fn erroneous(&self) -> SymbolId {
        self.erroneous
    }

    pub fn is_erroneous(&self, symbol: SymbolId) -> bool {
        symbol == self.erroneous
    }

    pub fn mixed(&self) -> Option<SymbolId> {
        self.mixed
    }

    pub fn name_of(&self, symbol: SymbolId) -> Option<&str> {
        self.names.get(&symbol).map(String::as_str)
    }

    pub fn symbol_named(&self, name: &str) -> Option<SymbolId> {
        self.names
            .iter()
            .find(|(_, candidate)| candidate.eq_ignore_ascii_case(name))
            .map(|(symbol, _)| *symbol)
    }

    /// Single-member union holding `symbol`
    pub fn union_of(&self, symbol: SymbolId) -> UnionType {
        match self.name_of(symbol) {
            Some(name) => UnionType::single(name, symbol),
            None => UnionType::new(),
        }
    }

    pub fn erroneous_union(&self) -> UnionType {
        self.union_of(self.erroneous)
    }

    pub fn mixed_union(&self) -> UnionType {
        self.mixed
            .map(|mixed| self.union_of(mixed))
            .unwrap_or_else(|| self.erroneous_union())
    }

    /// Shortest number of parent edges from `from` to `to`; 0 if identical, -1 if unreachable
    pub fn promotion_level(&self, from: SymbolId, to: SymbolId) -> i32 {
        if from == to {
            return 0;
        }
        let (Some(start), Some(goal)) = (self.nodes.get(&from), self.nodes.get(&to)) else {
            return -1;
        };
        let distances = dijkstra(&self.graph, *start, Some(*goal), |_| 1);
        distances.get(goal).map(|level| *level as i32).unwrap_or(-1)
    }

    /// Cost of reaching `to` from `from` through one implicit conversion
    ///
    /// The conversion step counts as one level; further promotion of the converted type adds to
    /// it. Returns -1 if no registered conversion leads to `to`.
    pub fn conversion_level(&self, from: SymbolId, to: SymbolId) -> i32 {
        let Some(targets) = self.conversions.get(&from) else {
            return -1;
        };
        targets
            .iter()
            .map(|target| self.promotion_level(*target, to))
            .filter(|level| *level >= 0)
            .min()
            .map(|level| level + 1)
            .unwrap_or(-1)
    }

    /// Drop every member that promotes to another member (`{int | num}` becomes `{num}`)
    pub fn normalize(&self, union: &UnionType) -> UnionType {
        let members: Vec<(&str, SymbolId)> = union.iter().collect();
        let mut normalized = UnionType::new();
        for (name, symbol) in &members {
            let subsumed = members.iter().any(|(_, other)| {
                other != symbol && self.promotion_level(*symbol, *other) > 0
            });
            if !subsumed {
                normalized.insert(*name, *symbol);
            }
        }
        normalized
    }

    /// Normalized union of both operands
    pub fn join(&self, left: &UnionType, right: &UnionType) -> UnionType {
        let mut joined = left.clone();
        joined.extend(right);
        self.normalize(&joined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::{BuiltinProvider, CoreRegistrar, StandardLibrary};

    fn standard_table() -> SymbolTable {
        let mut table = SymbolTable::new(0);
        let mut registrar = CoreRegistrar::new(&mut table);
        StandardLibrary
            .register(&mut registrar)
            .expect("standard library registers");
        table
    }

    #[test]
    fn test_normalize_keeps_only_maximal_members() {
        let table = standard_table();
        let hierarchy = TypeHierarchy::from_table(&table).expect("hierarchy");
        let int = table.core_type("int").expect("int");
        let num = table.core_type("num").expect("num");
        let string = table.core_type("string").expect("string");

        let mut union = hierarchy.union_of(int);
        union.extend(&hierarchy.union_of(num));
        union.extend(&hierarchy.union_of(string));

        assert_eq!(hierarchy.normalize(&union).sorted_names(), vec!["num", "string"]);
    }

    #[test]
    fn test_conversion_level_counts_the_cast() {
        let table = standard_table();
        let hierarchy = TypeHierarchy::from_table(&table).expect("hierarchy");
        let int = table.core_type("int").expect("int");
        let string = table.core_type("string").expect("string");
        let scalar = table.core_type("scalar").expect("scalar");
        let array = table.core_type("array").expect("array");

        assert_eq!(hierarchy.conversion_level(int, string), 1);
        assert_eq!(hierarchy.conversion_level(string, int), -1);
        assert_eq!(hierarchy.conversion_level(int, scalar), 2);
        assert_eq!(hierarchy.conversion_level(array, string), -1);
    }
}
