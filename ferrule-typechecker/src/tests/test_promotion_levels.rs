use crate::builtins::{BuiltinProvider, CoreRegistrar, StandardLibrary};
use crate::error::EngineResult;
use crate::hierarchy::TypeHierarchy;
use crate::scopes::SymbolTable;
use pretty_assertions::assert_eq;

/// Two unrelated interfaces and a class implementing both
struct Interfaces;

impl BuiltinProvider for Interfaces {
    fn register(&self, registrar: &mut CoreRegistrar<'_>) -> EngineResult<()> {
        registrar.define_type("interface1", &["mixed"])?;
        registrar.define_type("interface2", &["mixed"])?;
        registrar.define_type("foo", &["interface1", "interface2"])?;
        Ok(())
    }
}

fn hierarchy() -> TypeHierarchy {
    let mut table = SymbolTable::new(0);
    let mut registrar = CoreRegistrar::new(&mut table);
    StandardLibrary.register(&mut registrar).expect("standard library");
    Interfaces.register(&mut registrar).expect("interfaces");
    TypeHierarchy::from_table(&table).expect("hierarchy builds")
}

fn level(hierarchy: &TypeHierarchy, from: &str, to: &str) -> i32 {
    let from = hierarchy.symbol_named(from).expect("from type");
    let to = hierarchy.symbol_named(to).expect("to type");
    hierarchy.promotion_level(from, to)
}

#[test]
fn test_promotion_along_the_shortest_path() {
    let hierarchy = hierarchy();

    assert_eq!(level(&hierarchy, "foo", "interface1"), 1);
    assert_eq!(level(&hierarchy, "foo", "interface2"), 1);
    assert_eq!(level(&hierarchy, "foo", "mixed"), 2);
    assert_eq!(level(&hierarchy, "int", "num"), 1);
    assert_eq!(level(&hierarchy, "int", "scalar"), 2);
    assert_eq!(level(&hierarchy, "int", "mixed"), 3);
}

#[test]
fn test_identity_and_unrelated_types() {
    let hierarchy = hierarchy();

    assert_eq!(level(&hierarchy, "foo", "foo"), 0);
    assert_eq!(level(&hierarchy, "int", "int"), 0);
    assert_eq!(level(&hierarchy, "interface1", "foo"), -1);
    assert_eq!(level(&hierarchy, "interface1", "interface2"), -1);
    assert_eq!(level(&hierarchy, "int", "float"), -1);
    assert_eq!(level(&hierarchy, "int", "string"), -1);
    assert_eq!(level(&hierarchy, "mixed", "int"), -1);
}

#[test]
fn test_conversions_are_not_promotions() {
    let hierarchy = hierarchy();
    let int = hierarchy.symbol_named("int").expect("int");
    let string = hierarchy.symbol_named("string").expect("string");

    assert_eq!(hierarchy.promotion_level(int, string), -1);
    assert_eq!(hierarchy.conversion_level(int, string), 1);
    assert_eq!(hierarchy.conversion_level(string, int), -1);
}
