//! Built-in symbols
//!
//! Providers register primitive types, constants, operators, functions and super-globals into
//! the core and super-global scopes through a [`CoreRegistrar`]. The engine never mutates what
//! they register.

use crate::ast::{LiteralKind, Position};
use crate::error::{EngineError, EngineResult};
use crate::scopes::SymbolTable;
use crate::symbols::{
    ConstantData, MethodData, MethodKind, Symbol, SymbolId, SymbolKind, TypeData, TypeKind,
    VariableData,
};
use crate::types::{Overload, ParameterType, UnionType};
use lazy_static::lazy_static;

/// Names of the standard primitive types
pub mod type_names {
    pub const MIXED: &str = "mixed";
    pub const SCALAR: &str = "scalar";
    pub const NUM: &str = "num";
    pub const INT: &str = "int";
    pub const FLOAT: &str = "float";
    pub const STRING: &str = "string";
    pub const BOOL: &str = "bool";
    pub const NULL: &str = "null";
    pub const ARRAY: &str = "array";
}

/// Operator names used by the inference controller
pub mod operator_names {
    pub const ECHO: &str = "echo";
    pub const UNARY_MINUS: &str = "unary-";
}

/// Type of a literal of the given kind
pub fn literal_type_name(kind: LiteralKind) -> &'static str {
    match kind {
        LiteralKind::Int => type_names::INT,
        LiteralKind::Float => type_names::FLOAT,
        LiteralKind::String => type_names::STRING,
        LiteralKind::Bool => type_names::BOOL,
        LiteralKind::Null => type_names::NULL,
        LiteralKind::Array => type_names::ARRAY,
    }
}

/// Source of pre-defined symbols, consulted last during resolution
pub trait BuiltinProvider: Send + Sync {
    fn register(&self, registrar: &mut CoreRegistrar<'_>) -> EngineResult<()>;
}

/// Parsed form of a signature such as `{as string}, int -> string`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub parameters: Vec<(String, bool)>,
    pub return_types: Vec<String>,
}

impl Signature {
    pub fn parse(signature: &str) -> EngineResult<Self> {
        let invalid = |reason: &str| EngineError::InvalidSignature {
            signature: signature.to_string(),
            reason: reason.to_string(),
        };

        let (parameters, return_types) = signature
            .split_once("->")
            .ok_or_else(|| invalid("missing '->'"))?;

        let parameters = parameters
            .split(',')
            .map(str::trim)
            .filter(|parameter| !parameter.is_empty())
            .map(|parameter| match parameter.strip_prefix('{') {
                Some(rest) => rest
                    .strip_suffix('}')
                    .and_then(|inner| inner.trim().strip_prefix("as "))
                    .map(|name| (name.trim().to_string(), true))
                    .ok_or_else(|| invalid("convertible parameters are written '{as type}'")),
                None => Ok((parameter.to_string(), false)),
            })
            .collect::<EngineResult<Vec<_>>>()?;

        let return_types: Vec<String> = return_types
            .split('|')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect();
        if return_types.is_empty() {
            return Err(invalid("missing return type"));
        }

        Ok(Self {
            parameters,
            return_types,
        })
    }
}

/// Write access to the built-in scopes
pub struct CoreRegistrar<'a> {
    table: &'a mut SymbolTable,
}

impl<'a> CoreRegistrar<'a> {
    pub fn new(table: &'a mut SymbolTable) -> Self {
        Self { table }
    }

    fn lookup_type(&self, name: &str) -> EngineResult<SymbolId> {
        self.table
            .core_type(name)
            .ok_or_else(|| EngineError::UnknownBuiltinType {
                name: name.to_string(),
            })
    }

    fn union(&self, names: &[String]) -> EngineResult<UnionType> {
        let mut union = UnionType::new();
        for name in names {
            union.insert(name.clone(), self.lookup_type(name)?);
        }
        Ok(union)
    }

    pub fn define_type(&mut self, name: &str, parents: &[&str]) -> EngineResult<SymbolId> {
        let parents = parents
            .iter()
            .map(|parent| self.lookup_type(parent))
            .collect::<EngineResult<Vec<_>>>()?;
        let symbol = Symbol::new(
            name,
            Position::default(),
            SymbolKind::Type(TypeData {
                kind: TypeKind::Primitive,
                absolute_name: name.to_string(),
                parents,
                conversions: Vec::new(),
            }),
        );
        let core = self.table.core_scope();
        self.table.define(core, symbol)
    }

    pub fn add_conversion(&mut self, from: &str, to: &str) -> EngineResult<()> {
        let from = self.lookup_type(from)?;
        let to = self.lookup_type(to)?;
        match &mut self.table.symbol_mut(from)?.kind {
            SymbolKind::Type(data) if !data.conversions.contains(&to) => data.conversions.push(to),
            _ => {}
        }
        Ok(())
    }

    pub fn define_constant(&mut self, name: &str, type_name: &str) -> EngineResult<SymbolId> {
        let value_type = Some(self.lookup_type(type_name)?);
        let symbol = Symbol::new(
            name,
            Position::default(),
            SymbolKind::Constant(ConstantData { value_type }),
        );
        let core = self.table.core_scope();
        self.table.define(core, symbol)
    }

    fn define_method(
        &mut self,
        name: &str,
        kind: MethodKind,
        signatures: &[Signature],
    ) -> EngineResult<SymbolId> {
        let core = self.table.core_scope();
        let method = self.table.define(
            core,
            Symbol::new(
                name,
                Position::default(),
                SymbolKind::Method(MethodData::builtin(kind, Vec::new())),
            ),
        )?;

        let mut overloads = Vec::with_capacity(signatures.len());
        for signature in signatures {
            let mut parameters = Vec::with_capacity(signature.parameters.len());
            for (type_name, convertible) in &signature.parameters {
                let bound = self.union(std::slice::from_ref(type_name))?;
                parameters.push(ParameterType {
                    bound,
                    is_convertible: *convertible,
                });
            }
            overloads.push(Overload {
                method,
                parameters,
                return_type: self.union(&signature.return_types)?,
            });
        }

        if let Some(data) = self.table.symbol_mut(method)?.as_method_mut() {
            data.overloads = overloads;
        }
        Ok(method)
    }

    pub fn define_function(&mut self, name: &str, signatures: &[&str]) -> EngineResult<SymbolId> {
        let parsed = parse_signatures(signatures)?;
        self.define_method(name, MethodKind::Function, &parsed)
    }

    pub fn define_operator(&mut self, name: &str, signatures: &[&str]) -> EngineResult<SymbolId> {
        let parsed = parse_signatures(signatures)?;
        self.define_method(name, MethodKind::Operator, &parsed)
    }

    pub fn define_super_global(&mut self, name: &str, type_name: &str) -> EngineResult<SymbolId> {
        let declared_type = Some(self.lookup_type(type_name)?);
        let symbol = Symbol::new(
            name,
            Position::default(),
            SymbolKind::Variable(VariableData {
                declared_type,
                is_super_global: true,
                ..VariableData::default()
            }),
        );
        let scope = self.table.super_global_scope();
        self.table.define(scope, symbol)
    }
}

fn parse_signatures(signatures: &[&str]) -> EngineResult<Vec<Signature>> {
    signatures.iter().map(|signature| Signature::parse(signature)).collect()
}

struct MethodDeclaration {
    name: &'static str,
    kind: MethodKind,
    signatures: Vec<Signature>,
}

const TYPES: &[(&str, &[&str])] = &[
    (type_names::MIXED, &[]),
    (type_names::SCALAR, &[type_names::MIXED]),
    (type_names::NUM, &[type_names::SCALAR]),
    (type_names::INT, &[type_names::NUM]),
    (type_names::FLOAT, &[type_names::NUM]),
    (type_names::STRING, &[type_names::SCALAR]),
    (type_names::BOOL, &[type_names::SCALAR]),
    (type_names::NULL, &[type_names::MIXED]),
    (type_names::ARRAY, &[type_names::MIXED]),
];

const CONVERSIONS: &[(&str, &str)] = &[
    (type_names::INT, type_names::STRING),
    (type_names::FLOAT, type_names::STRING),
    (type_names::BOOL, type_names::INT),
    (type_names::BOOL, type_names::STRING),
    (type_names::NULL, type_names::BOOL),
    (type_names::STRING, type_names::NUM),
    (type_names::INT, type_names::BOOL),
];

const CONSTANTS: &[(&str, &str)] = &[
    ("true", type_names::BOOL),
    ("false", type_names::BOOL),
    ("null", type_names::NULL),
    ("PHP_INT_MAX", type_names::INT),
    ("M_PI", type_names::FLOAT),
];

const SUPER_GLOBALS: &[&str] = &["$_GET", "$_POST", "$_SERVER"];

const ARITHMETIC: &[&str] = &["int, int -> int", "float, float -> float", "num, num -> num"];
const COMPARISON: &[&str] = &["num, num -> bool", "string, string -> bool"];
const EQUALITY: &[&str] = &["mixed, mixed -> bool"];
const LOGICAL: &[&str] = &["{as bool}, {as bool} -> bool"];

const OPERATORS: &[(&str, &[&str])] = &[
    (
        "+",
        &[
            "int, int -> int",
            "float, float -> float",
            "num, num -> num",
            "array, array -> array",
        ],
    ),
    ("-", ARITHMETIC),
    ("*", ARITHMETIC),
    ("/", &["num, num -> num"]),
    ("%", &["int, int -> int"]),
    (".", &["{as string}, {as string} -> string"]),
    ("==", EQUALITY),
    ("!=", EQUALITY),
    ("===", EQUALITY),
    ("!==", EQUALITY),
    ("<", COMPARISON),
    ("<=", COMPARISON),
    (">", COMPARISON),
    (">=", COMPARISON),
    ("&&", LOGICAL),
    ("||", LOGICAL),
    ("!", &["{as bool} -> bool"]),
    (operator_names::UNARY_MINUS, &["int -> int", "float -> float", "num -> num"]),
    (operator_names::ECHO, &["{as string} -> null"]),
];

const FUNCTIONS: &[(&str, &[&str])] = &[
    ("strlen", &["string -> int"]),
    ("str_repeat", &["string, int -> string"]),
    ("abs", &["int -> int", "float -> float"]),
    ("count", &["array -> int"]),
    ("is_int", &["mixed -> bool"]),
    ("intval", &["{as int} -> int"]),
];

fn parse_declarations() -> EngineResult<Vec<MethodDeclaration>> {
    let operators = OPERATORS
        .iter()
        .map(|(name, signatures)| (*name, MethodKind::Operator, *signatures));
    let functions = FUNCTIONS
        .iter()
        .map(|(name, signatures)| (*name, MethodKind::Function, *signatures));

    operators
        .chain(functions)
        .map(|(name, kind, signatures)| {
            Ok(MethodDeclaration {
                name,
                kind,
                signatures: parse_signatures(signatures)?,
            })
        })
        .collect()
}

lazy_static! {
    static ref STANDARD_METHODS: EngineResult<Vec<MethodDeclaration>> = parse_declarations();
}

/// The default built-in library: a small scalar lattice with arithmetic, string and
/// comparison operators
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardLibrary;

impl BuiltinProvider for StandardLibrary {
    fn register(&self, registrar: &mut CoreRegistrar<'_>) -> EngineResult<()> {
        for (name, parents) in TYPES {
            registrar.define_type(name, parents)?;
        }
        for (from, to) in CONVERSIONS {
            registrar.add_conversion(from, to)?;
        }
        for (name, type_name) in CONSTANTS {
            registrar.define_constant(name, type_name)?;
        }

        let methods = match &*STANDARD_METHODS {
            Ok(methods) => methods,
            Err(error) => return Err(error.clone()),
        };
        for method in methods {
            registrar.define_method(method.name, method.kind, &method.signatures)?;
        }

        for name in SUPER_GLOBALS {
            registrar.define_super_global(name, type_names::ARRAY)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_signature_parsing() {
        let signature = Signature::parse("{as string}, int -> string | null").expect("valid");
        assert_eq!(
            signature,
            Signature {
                parameters: vec![("string".to_string(), true), ("int".to_string(), false)],
                return_types: vec!["string".to_string(), "null".to_string()],
            }
        );

        assert!(Signature::parse("int, int").is_err());
        assert!(Signature::parse("{string} -> int").is_err());
        assert!(Signature::parse("int ->").is_err());
    }

    #[test]
    fn test_standard_library_registration() {
        let mut table = SymbolTable::new(0);
        StandardLibrary
            .register(&mut CoreRegistrar::new(&mut table))
            .expect("registers");

        let plus = table.core_method("+").expect("+ registered");
        let overloads = &table.symbol(plus).expect("symbol").as_method().expect("method").overloads;
        assert_eq!(overloads.len(), 4);
        assert_eq!(overloads[3].to_string(), "({array}, {array}) -> {array}");

        let concat = table.core_method(".").expect(". registered");
        let concat = table.symbol(concat).expect("symbol").as_method().expect("method");
        assert!(concat.overloads[0].has_convertible_parameters());

        assert!(table.core_type("NUM").is_some());
        assert_eq!(literal_type_name(LiteralKind::Float), "float");
    }

    #[test]
    fn test_unknown_parent_type_is_rejected() {
        let mut table = SymbolTable::new(0);
        let mut registrar = CoreRegistrar::new(&mut table);
        let error = registrar.define_type("int", &["num"]).expect_err("num is missing");
        assert_eq!(
            error,
            EngineError::UnknownBuiltinType {
                name: "num".to_string()
            }
        );
    }
}
