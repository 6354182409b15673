//! Overload applicability and ranking

use crate::constraints::BindingCollection;
use crate::hierarchy::TypeHierarchy;
use crate::types::{Overload, ParameterType, UnionType};

/// Current knowledge about one call argument
#[derive(Debug, Clone, Copy)]
pub enum ArgumentBound<'a> {
    /// An untyped parameter of the caller; matches any parameter type
    Open,
    Bound(&'a UnionType),
}

/// How well an overload fits the arguments of a call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Applicability {
    /// Sum of per-argument promotion (or conversion) levels
    pub level: i32,
    /// At least one argument reaches its parameter only through an implicit conversion
    pub converting: bool,
}

pub struct OverloadDecider<'a> {
    hierarchy: &'a TypeHierarchy,
}

impl<'a> OverloadDecider<'a> {
    pub fn new(hierarchy: &'a TypeHierarchy) -> Self {
        Self { hierarchy }
    }

    /// Level of an argument against one parameter: the maximum over union members
    ///
    /// Returns `None` if some member neither promotes nor (for convertible parameters)
    /// converts to the parameter type.
    pub fn argument_level(&self, argument: &UnionType, parameter: &ParameterType) -> Option<Applicability> {
        let mut result = Applicability {
            level: 0,
            converting: false,
        };
        for member in argument.symbols() {
            if self.hierarchy.is_erroneous(member) {
                continue;
            }
            let member_level = parameter
                .bound
                .symbols()
                .filter_map(|target| {
                    if self.hierarchy.is_erroneous(target) {
                        return Some((0, false));
                    }
                    let promotion = self.hierarchy.promotion_level(member, target);
                    if promotion >= 0 {
                        return Some((promotion, false));
                    }
                    if parameter.is_convertible {
                        let conversion = self.hierarchy.conversion_level(member, target);
                        if conversion >= 0 {
                            return Some((conversion, true));
                        }
                    }
                    None
                })
                .min()?;
            result.level = result.level.max(member_level.0);
            result.converting |= member_level.1;
        }
        Some(result)
    }

    /// Whether every argument fits the corresponding parameter of `overload`
    pub fn applicable(&self, overload: &Overload, arguments: &[ArgumentBound<'_>]) -> Option<Applicability> {
        if overload.arity() != arguments.len() {
            return None;
        }
        let mut total = Applicability {
            level: 0,
            converting: false,
        };
        for (argument, parameter) in arguments.iter().zip(&overload.parameters) {
            if let ArgumentBound::Bound(argument) = argument {
                let fit = self.argument_level(argument, parameter)?;
                total.level += fit.level;
                total.converting |= fit.converting;
            }
        }
        Some(total)
    }

    /// Indices of the overloads applicable to `arguments`, with their fit, in registration order
    pub fn applicable_overloads(
        &self,
        overloads: &[Overload],
        arguments: &[ArgumentBound<'_>],
    ) -> Vec<(usize, Applicability)> {
        overloads
            .iter()
            .enumerate()
            .filter_map(|(index, overload)| {
                self.applicable(overload, arguments)
                    .map(|applicability| (index, applicability))
            })
            .collect()
    }

    /// Pick the most specific candidate
    ///
    /// Non-converting candidates win over converting ones unless the binding already committed
    /// to implicit conversions; then the lowest level sum wins; remaining ties go to the
    /// first registered overload.
    pub fn most_specific(
        &self,
        binding: &BindingCollection,
        candidates: &[(usize, Applicability)],
    ) -> Option<(usize, Applicability)> {
        let has_exact = candidates.iter().any(|(_, fit)| !fit.converting);
        let prefer_exact = has_exact && binding.convertible_applications() == 0;

        let mut best: Option<(usize, Applicability)> = None;
        for (index, fit) in candidates {
            if prefer_exact && fit.converting {
                continue;
            }
            match best {
                Some((_, current)) if current.level <= fit.level => {}
                _ => best = Some((*index, *fit)),
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::{BuiltinProvider, CoreRegistrar, StandardLibrary};
    use crate::constraints::CollectionKey;
    use crate::scopes::SymbolTable;

    fn setup() -> (SymbolTable, TypeHierarchy) {
        let mut table = SymbolTable::new(0);
        StandardLibrary
            .register(&mut CoreRegistrar::new(&mut table))
            .expect("standard library registers");
        let hierarchy = TypeHierarchy::from_table(&table).expect("hierarchy");
        (table, hierarchy)
    }

    fn overloads_of(table: &SymbolTable, name: &str) -> Vec<Overload> {
        let method = table.core_method(name).expect("method exists");
        table
            .symbol(method)
            .expect("symbol")
            .as_method()
            .expect("method data")
            .overloads
            .clone()
    }

    fn union(table: &SymbolTable, name: &str) -> UnionType {
        UnionType::single(name, table.core_type(name).expect("type exists"))
    }

    #[test]
    fn test_most_specific_prefers_lowest_promotion_sum() {
        let (table, hierarchy) = setup();
        let decider = OverloadDecider::new(&hierarchy);
        let overloads = overloads_of(&table, "+");
        let int = union(&table, "int");
        let arguments = [ArgumentBound::Bound(&int), ArgumentBound::Bound(&int)];

        let candidates = decider.applicable_overloads(&overloads, &arguments);
        assert_eq!(candidates.iter().map(|(index, _)| *index).collect::<Vec<_>>(), vec![0, 2]);

        let binding = BindingCollection::new(CollectionKey::Global);
        let (chosen, fit) = decider.most_specific(&binding, &candidates).expect("a candidate");
        assert_eq!(chosen, 0);
        assert_eq!(fit.level, 0);
    }

    #[test]
    fn test_union_arguments_take_the_maximum_level() {
        let (table, hierarchy) = setup();
        let decider = OverloadDecider::new(&hierarchy);
        let mut mixed_numbers = union(&table, "int");
        mixed_numbers.extend(&union(&table, "float"));
        let parameter = ParameterType::new(union(&table, "num"));

        let fit = decider.argument_level(&mixed_numbers, &parameter).expect("applicable");
        assert_eq!(fit.level, 1);

        let parameter = ParameterType::new(union(&table, "int"));
        assert!(decider.argument_level(&mixed_numbers, &parameter).is_none());
    }

    #[test]
    fn test_exact_overloads_win_until_conversions_are_committed() {
        let (table, hierarchy) = setup();
        let decider = OverloadDecider::new(&hierarchy);
        let int = union(&table, "int");
        let string = union(&table, "string");
        let method = table.core_method("strlen").expect("strlen");
        let overloads = vec![
            Overload {
                method,
                parameters: vec![ParameterType::convertible(string.clone())],
                return_type: string.clone(),
            },
            Overload {
                method,
                parameters: vec![ParameterType::new(union(&table, "scalar"))],
                return_type: int.clone(),
            },
        ];
        let arguments = [ArgumentBound::Bound(&int)];
        let candidates = decider.applicable_overloads(&overloads, &arguments);
        assert_eq!(candidates.len(), 2);

        let mut binding = BindingCollection::new(CollectionKey::Global);
        assert_eq!(decider.most_specific(&binding, &candidates).map(|(index, _)| index), Some(1));

        binding.convertible_parameters.insert(0);
        assert_eq!(decider.most_specific(&binding, &candidates).map(|(index, _)| index), Some(0));
    }

    #[test]
    fn test_open_arguments_match_any_parameter() {
        let (table, hierarchy) = setup();
        let decider = OverloadDecider::new(&hierarchy);
        let overloads = overloads_of(&table, "<");
        let int = union(&table, "int");
        let arguments = [ArgumentBound::Open, ArgumentBound::Bound(&int)];

        let candidates = decider.applicable_overloads(&overloads, &arguments);
        assert_eq!(candidates.iter().map(|(index, _)| *index).collect::<Vec<_>>(), vec![0]);
    }
}
