//! Symbols: named, positioned declarations
//!
//! Symbols live in the arena owned by [`crate::scopes::SymbolTable`]. The owning scope is
//! referenced by index, so the scope -> symbols and symbol -> scope links never form an
//! ownership cycle.

use crate::ast::Position;
use crate::constraints::TypeVariableId;
use crate::issues::Issue;
use crate::scopes::ScopeId;
use crate::types::Overload;
use indexmap::IndexSet;
use std::fmt;

/// Generational handle of a symbol
///
/// The generation changes on every engine reset, so handles kept from an earlier run
/// never alias symbols of the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolId {
    generation: u32,
    index: u32,
}

impl SymbolId {
    pub(crate) fn new(generation: u32, index: usize) -> Self {
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

impl fmt::Display for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "symbol#{}@{}", self.index, self.generation)
    }
}

/// Declaration and return-type modifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Modifier {
    /// Return type may additionally be `null`
    Nullable,
    /// Return type may additionally be `false` (widened to `bool`)
    Falseable,
}

impl Modifier {
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword.to_ascii_lowercase().as_str() {
            "nullable" => Some(Self::Nullable),
            "falseable" => Some(Self::Falseable),
            _ => None,
        }
    }
}

/// Functions are user or built-in callables, operators are always built-in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MethodKind {
    Function,
    Operator,
}

/// Method (function or operator) specific data
#[derive(Debug, Clone, PartialEq)]
pub struct MethodData {
    pub kind: MethodKind,
    /// The scope holding parameters and locals; `None` for built-ins
    pub scope: Option<ScopeId>,
    pub parameters: Vec<SymbolId>,
    pub return_modifiers: IndexSet<Modifier>,
    /// Fixed for built-ins, written by the solver for user functions
    pub overloads: Vec<Overload>,
    pub is_builtin: bool,
}

impl MethodData {
    /// A user function; its scope is attached once the method scope exists
    pub fn user_function(return_modifiers: IndexSet<Modifier>) -> Self {
        Self {
            kind: MethodKind::Function,
            scope: None,
            parameters: Vec::new(),
            return_modifiers,
            overloads: Vec::new(),
            is_builtin: false,
        }
    }

    pub fn builtin(kind: MethodKind, overloads: Vec<Overload>) -> Self {
        Self {
            kind,
            scope: None,
            parameters: Vec::new(),
            return_modifiers: IndexSet::new(),
            overloads,
            is_builtin: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Primitive,
    Class,
    /// Placeholder type of failed expressions; compatible with everything
    Erroneous,
}

/// A node of the supertype lattice
#[derive(Debug, Clone, PartialEq)]
pub struct TypeData {
    pub kind: TypeKind,
    /// Fully qualified name used as the key inside union types (`int`, `\a\Foo`)
    pub absolute_name: String,
    /// Immediate parent types (several for multi-parent lattices)
    pub parents: Vec<SymbolId>,
    /// Types this type may be implicitly cast to
    pub conversions: Vec<SymbolId>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct VariableData {
    /// Type named by a parameter's type hint, resolved during the reference pass
    pub declared_type: Option<SymbolId>,
    /// Append-only chain of ref variables, one per syntactic point the value may change
    pub ref_variables: Vec<TypeVariableId>,
    pub is_parameter: bool,
    pub is_super_global: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConstantData {
    /// Type of the initialiser literal
    pub value_type: Option<SymbolId>,
}

/// A namespace `use` binding
#[derive(Debug, Clone, PartialEq)]
pub struct AliasData {
    /// Absolute name of the aliased declaration, e.g. `\a\B`
    pub target: String,
    /// Resolved target, filled in by the reference pass
    pub resolved: Option<SymbolId>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SymbolKind {
    Variable(VariableData),
    Constant(ConstantData),
    Method(MethodData),
    Type(TypeData),
    Alias(AliasData),
    /// Placeholder for a failed resolution carrying the triggering issue
    Erroneous(Box<Issue>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Symbol {
    pub name: String,
    pub position: Position,
    pub definition_scope: Option<ScopeId>,
    pub kind: SymbolKind,
}

impl Symbol {
    pub fn new(name: impl Into<String>, position: Position, kind: SymbolKind) -> Self {
        Self {
            name: name.into(),
            position,
            definition_scope: None,
            kind,
        }
    }

    pub fn is_erroneous(&self) -> bool {
        matches!(self.kind, SymbolKind::Erroneous(_))
    }

    pub fn as_method(&self) -> Option<&MethodData> {
        match &self.kind {
            SymbolKind::Method(method) => Some(method),
            _ => None,
        }
    }

    pub fn as_method_mut(&mut self) -> Option<&mut MethodData> {
        match &mut self.kind {
            SymbolKind::Method(method) => Some(method),
            _ => None,
        }
    }

    pub fn as_variable(&self) -> Option<&VariableData> {
        match &self.kind {
            SymbolKind::Variable(variable) => Some(variable),
            _ => None,
        }
    }

    pub fn as_variable_mut(&mut self) -> Option<&mut VariableData> {
        match &mut self.kind {
            SymbolKind::Variable(variable) => Some(variable),
            _ => None,
        }
    }

    pub fn as_type(&self) -> Option<&TypeData> {
        match &self.kind {
            SymbolKind::Type(data) => Some(data),
            _ => None,
        }
    }

    pub fn as_alias(&self) -> Option<&AliasData> {
        match &self.kind {
            SymbolKind::Alias(alias) => Some(alias),
            _ => None,
        }
    }

    /// Whether names of this symbol compare case-insensitively (types and callables)
    pub fn is_case_insensitive(&self) -> bool {
        matches!(
            self.kind,
            SymbolKind::Method(_) | SymbolKind::Type(_) | SymbolKind::Alias(_)
        )
    }

    /// Short label of the symbol kind used in issue parameters
    pub fn kind_label(&self) -> &'static str {
        match &self.kind {
            SymbolKind::Variable(data) if data.is_parameter => "parameter",
            SymbolKind::Variable(_) => "variable",
            SymbolKind::Constant(_) => "constant",
            SymbolKind::Method(method) if method.kind == MethodKind::Operator => "operator",
            SymbolKind::Method(_) => "function",
            SymbolKind::Type(_) => "type",
            SymbolKind::Alias(_) => "alias",
            SymbolKind::Erroneous(_) => "erroneous",
        }
    }
}
