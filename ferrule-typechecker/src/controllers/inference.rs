//! Inference pass: constraint generation
//!
//! Nothing is resolved here. Each expression node gets a type variable whose constraint
//! describes how its value is produced, and every variable version gets a ref variable so
//! assignments and control-flow merges can be modelled without SSA.

use super::{node, node_mut, scope_of, symbol_of, type_variable_of};
use crate::ast::{Ast, NodeId, NodeKind, Position};
use crate::builtins::{literal_type_name, operator_names};
use crate::constraints::{
    CollectionKey, Constraint, ConstraintStore, IntersectionConstraint, RefHeads, RefOrigin, TypeVariableId,
};
use crate::error::{EngineError, EngineResult};
use crate::scopes::{ScopeId, SymbolTable};
use crate::symbols::{SymbolId, SymbolKind};
use tracing::trace;

/// Name of the type variable collecting a function's returned values
const RETURN_VARIABLE_NAME: &str = "@return";

pub struct InferenceController<'a> {
    table: &'a mut SymbolTable,
    store: &'a mut ConstraintStore,
}

impl<'a> InferenceController<'a> {
    pub fn new(table: &'a mut SymbolTable, store: &'a mut ConstraintStore) -> Self {
        Self { table, store }
    }

    /// Collection receiving the constraints of code in `scope`
    pub fn collection_of(&self, scope: ScopeId) -> EngineResult<CollectionKey> {
        Ok(match self.table.enclosing_method(scope)? {
            Some(method) => CollectionKey::Method(method),
            None => CollectionKey::Global,
        })
    }

    fn node_collection(&self, ast: &Ast, id: NodeId) -> EngineResult<CollectionKey> {
        self.collection_of(scope_of(ast, id)?)
    }

    /// Create the parameter and return variables of a function
    pub fn enter_function(&mut self, ast: &Ast, function: NodeId) -> EngineResult<CollectionKey> {
        let method = symbol_of(ast, function)?;
        let key = CollectionKey::Method(method);
        let position = node(ast, function)?.position;
        let parameters = self
            .table
            .symbol(method)?
            .as_method()
            .map(|data| data.parameters.clone())
            .unwrap_or_default();

        self.store.collection_mut(key);
        for (index, parameter) in parameters.into_iter().enumerate() {
            let symbol = self.table.symbol(parameter)?;
            let declared = symbol.as_variable().and_then(|data| data.declared_type);
            let variable = self
                .store
                .add_variable(symbol.name.clone(), symbol.position, key, Constraint::Ref(Vec::new()));
            if let Some(entry) = self.store.variable_mut(variable) {
                entry.parameter_index = Some(index);
                entry.fixed_type = declared;
                entry.ref_of = Some(RefOrigin {
                    variable: parameter,
                    previous: None,
                });
            }
            self.store.collection_mut(key).parameters.push(variable);
            self.push_ref_variable(parameter, variable)?;
        }

        let return_variable = self
            .store
            .add_variable(RETURN_VARIABLE_NAME, position, key, Constraint::Ref(Vec::new()));
        self.store.collection_mut(key).return_variable = Some(return_variable);
        trace!(collection = %key, "function constraints opened");
        Ok(key)
    }

    /// Type variable fixed to the type of a literal
    pub fn create_type_constraint(&mut self, ast: &mut Ast, id: NodeId) -> EngineResult<TypeVariableId> {
        let literal = node(ast, id)?;
        let NodeKind::Literal(kind) = literal.kind else {
            return Err(EngineError::unexpected_node(id, "literal", format!("{:?}", literal.kind)));
        };
        let (text, position) = (literal.text.clone(), literal.position);
        let fixed = self
            .table
            .core_type(literal_type_name(kind))
            .unwrap_or_else(|| self.table.erroneous_type());
        let collection = self.node_collection(ast, id)?;
        let variable = self.fixed_variable(text, position, collection, fixed);
        node_mut(ast, id)?.type_variable = Some(variable);
        Ok(variable)
    }

    /// Type variable of a constant read: the constant's value type
    pub fn create_constant_reference(&mut self, ast: &mut Ast, id: NodeId) -> EngineResult<TypeVariableId> {
        let constant = symbol_of(ast, id)?;
        let reference = node(ast, id)?;
        let (text, position) = (reference.text.clone(), reference.position);
        let fixed = match &self.table.symbol(constant)?.kind {
            SymbolKind::Constant(data) => data.value_type,
            _ => None,
        }
        .unwrap_or_else(|| self.table.erroneous_type());
        let collection = self.node_collection(ast, id)?;
        let variable = self.fixed_variable(text, position, collection, fixed);
        node_mut(ast, id)?.type_variable = Some(variable);
        Ok(variable)
    }

    fn fixed_variable(
        &mut self,
        name: String,
        position: Position,
        collection: CollectionKey,
        fixed: SymbolId,
    ) -> TypeVariableId {
        let variable = self
            .store
            .add_variable(name, position, collection, Constraint::Ref(Vec::new()));
        if let Some(entry) = self.store.variable_mut(variable) {
            entry.fixed_type = Some(fixed);
        }
        variable
    }

    /// Append a new version of `variable`, a copy of its current version
    ///
    /// Versions are tracked per collection. Variables without a prior version in `collection`
    /// (erroneous placeholders, super-globals, reads before any write, namespace variables read
    /// from a function) start from their declared type, or from nothing.
    pub fn create_ref_variable(
        &mut self,
        variable: SymbolId,
        position: Position,
        collection: CollectionKey,
    ) -> EngineResult<TypeVariableId> {
        let symbol = self.table.symbol(variable)?;
        let name = symbol.name.clone();
        let previous = self.store.head(collection, variable);
        let fixed = match &symbol.kind {
            SymbolKind::Erroneous(_) => Some(self.table.erroneous_type()),
            SymbolKind::Variable(data) if previous.is_none() => data.declared_type,
            _ => None,
        };
        let constraint = match previous {
            Some(previous) => Constraint::Transfer(previous),
            None => Constraint::Ref(Vec::new()),
        };

        let id = self.store.add_variable(name, position, collection, constraint);
        if let Some(entry) = self.store.variable_mut(id) {
            entry.fixed_type = fixed;
            entry.ref_of = Some(RefOrigin { variable, previous });
        }
        self.push_ref_variable(variable, id)?;
        Ok(id)
    }

    fn push_ref_variable(&mut self, variable: SymbolId, id: TypeVariableId) -> EngineResult<()> {
        if let Some(data) = self.table.symbol_mut(variable)?.as_variable_mut() {
            data.ref_variables.push(id);
        }
        self.store.set_head(variable, id);
        Ok(())
    }

    /// Make `variable` take (also) the value of `source`
    ///
    /// A `Transfer` becomes a `Ref` holding only `source`; a `Ref` gains `source` as one more
    /// joined source.
    pub fn create_ref_constraint(&mut self, variable: TypeVariableId, source: TypeVariableId) -> EngineResult<()> {
        let entry = self
            .store
            .variable_mut(variable)
            .ok_or_else(|| EngineError::UnknownTypeVariable {
                variable: variable.to_string(),
            })?;
        match &mut entry.constraint {
            Constraint::Transfer(_) => {}
            Constraint::Ref(sources) => {
                if !sources.contains(&source) {
                    sources.push(source);
                }
                return Ok(());
            }
            Constraint::Intersection(_) => {
                return Err(EngineError::InvalidConstraint {
                    variable: variable.to_string(),
                })
            }
        }
        entry.constraint = Constraint::Ref(vec![source]);
        Ok(())
    }

    /// Type variable holding the result of applying `operator` to `arguments`
    pub fn create_intersection_constraint(
        &mut self,
        name: impl Into<String>,
        position: Position,
        collection: CollectionKey,
        operator: SymbolId,
        arguments: Vec<TypeVariableId>,
    ) -> TypeVariableId {
        let call_site = self.store.next_call_site(collection);
        self.store.add_variable(
            name,
            position,
            collection,
            Constraint::Intersection(IntersectionConstraint {
                operator,
                arguments,
                call_site,
            }),
        )
    }

    /// A variable read
    pub fn create_variable_read(&mut self, ast: &mut Ast, id: NodeId) -> EngineResult<TypeVariableId> {
        let variable = symbol_of(ast, id)?;
        let position = node(ast, id)?.position;
        let collection = self.node_collection(ast, id)?;
        let created = self.create_ref_variable(variable, position, collection)?;
        node_mut(ast, id)?.type_variable = Some(created);
        Ok(created)
    }

    /// `$x = expression`: a new version of `$x` holding the expression's value
    pub fn create_assignment(&mut self, ast: &mut Ast, id: NodeId) -> EngineResult<TypeVariableId> {
        let (target, value) = match ast.children(id) {
            [target, value] => (*target, *value),
            _ => return Err(EngineError::unexpected_node(id, "assignment target and value", "other children")),
        };
        let variable = symbol_of(ast, target)?;
        let source = type_variable_of(ast, value)?;
        let position = node(ast, target)?.position;
        let collection = self.node_collection(ast, id)?;

        let created = self.create_ref_variable(variable, position, collection)?;
        if let Some(entry) = self.store.variable_mut(created) {
            // An assignment replaces any declared starting type
            entry.fixed_type = None;
            entry.constraint = Constraint::Ref(Vec::new());
        }
        self.create_ref_constraint(created, source)?;
        for slot in [target, id] {
            node_mut(ast, slot)?.type_variable = Some(created);
        }
        Ok(created)
    }

    /// Operator application; the operator must be a built-in
    pub fn create_operator(&mut self, ast: &mut Ast, id: NodeId) -> EngineResult<TypeVariableId> {
        let expression = node(ast, id)?;
        let name = expression.text.clone();
        let position = expression.position;
        let operator = self
            .table
            .core_method(&name)
            .ok_or_else(|| EngineError::UnknownOperator { operator: name.clone() })?;
        self.create_application(ast, id, name, position, operator)
    }

    /// Function call; callees that failed to resolve yield the erroneous type
    pub fn create_function_call(&mut self, ast: &mut Ast, id: NodeId) -> EngineResult<TypeVariableId> {
        let callee = symbol_of(ast, id)?;
        let call = node(ast, id)?;
        let name = format!("{}()", call.text);
        let position = call.position;
        if self.table.symbol(callee)?.as_method().is_none() {
            let collection = self.node_collection(ast, id)?;
            let erroneous = self.table.erroneous_type();
            let variable = self.fixed_variable(name, position, collection, erroneous);
            node_mut(ast, id)?.type_variable = Some(variable);
            return Ok(variable);
        }
        self.create_application(ast, id, name, position, callee)
    }

    /// `echo expression`, typed as a call of the built-in `echo` operator
    pub fn create_echo(&mut self, ast: &mut Ast, id: NodeId) -> EngineResult<TypeVariableId> {
        let position = node(ast, id)?.position;
        let operator = self
            .table
            .core_method(operator_names::ECHO)
            .ok_or_else(|| EngineError::UnknownOperator {
                operator: operator_names::ECHO.to_string(),
            })?;
        self.create_application(ast, id, operator_names::ECHO.to_string(), position, operator)
    }

    fn create_application(
        &mut self,
        ast: &mut Ast,
        id: NodeId,
        name: String,
        position: Position,
        operator: SymbolId,
    ) -> EngineResult<TypeVariableId> {
        let arguments = ast
            .children(id)
            .iter()
            .map(|argument| type_variable_of(ast, *argument))
            .collect::<EngineResult<Vec<_>>>()?;
        let collection = self.node_collection(ast, id)?;
        let variable = self.create_intersection_constraint(name, position, collection, operator, arguments);
        node_mut(ast, id)?.type_variable = Some(variable);
        Ok(variable)
    }

    /// Feed the returned value into the function's return variable
    ///
    /// Returns at namespace level do not contribute to any signature and are ignored.
    pub fn create_return(&mut self, ast: &mut Ast, id: NodeId) -> EngineResult<Option<TypeVariableId>> {
        let collection = self.node_collection(ast, id)?;
        let Some(return_variable) = self.store.collection(collection).and_then(|entry| entry.return_variable) else {
            return Ok(None);
        };
        let Some(value) = ast.child(id, 0) else {
            return Ok(None);
        };
        let value = type_variable_of(ast, value)?;
        self.create_ref_constraint(return_variable, value)?;
        node_mut(ast, id)?.type_variable = Some(value);
        Ok(Some(value))
    }

    /// Current version of every variable of `collection`
    pub fn current_ref_heads(&self, collection: CollectionKey) -> RefHeads {
        self.store.heads_in(collection)
    }

    pub fn restore_ref_heads(&mut self, collection: CollectionKey, heads: &RefHeads) {
        self.store.restore_heads(collection, heads);
    }

    /// Versions of every variable of `collection` at the top of a loop body
    ///
    /// Each starts as a copy of the version before the loop; [`Self::close_loop`] adds the
    /// version reaching the end of the body as a second source.
    pub fn create_loop_head(&mut self, collection: CollectionKey, position: Position) -> EngineResult<RefHeads> {
        let before = self.store.heads_in(collection);
        let mut heads = RefHeads::new();
        for (variable, previous) in before {
            let head = self.create_merge_variable(variable, position, collection, vec![previous], Some(previous))?;
            heads.insert(variable, head);
        }
        Ok(heads)
    }

    /// Close the back edge of a loop; the loop may run zero times
    pub fn close_loop(&mut self, heads: &RefHeads, collection: CollectionKey) -> EngineResult<()> {
        let after = self.store.heads_in(collection);
        for (variable, head) in heads {
            if let Some(last) = after.get(variable) {
                if last != head {
                    self.create_ref_constraint(*head, *last)?;
                }
            }
            self.store.set_head(*variable, *head);
        }
        Ok(())
    }

    /// Join the versions reaching the end of each branch
    ///
    /// A non-exhaustive construct (an `if` without `else`) also joins the version from before
    /// the branches.
    pub fn create_branch_merge(
        &mut self,
        before: &RefHeads,
        branches: &[RefHeads],
        exhaustive: bool,
        collection: CollectionKey,
        position: Position,
    ) -> EngineResult<RefHeads> {
        let mut changed: Vec<SymbolId> = Vec::new();
        for branch in branches {
            for (variable, head) in branch {
                if before.get(variable) != Some(head) && !changed.contains(variable) {
                    changed.push(*variable);
                }
            }
        }

        let mut merged = RefHeads::new();
        for variable in changed {
            let mut sources: Vec<TypeVariableId> = Vec::new();
            let mut incoming = branches
                .iter()
                .map(|branch| branch.get(&variable).or(before.get(&variable)))
                .collect::<Vec<_>>();
            if !exhaustive {
                incoming.push(before.get(&variable));
            }
            for source in incoming.into_iter().flatten() {
                if !sources.contains(source) {
                    sources.push(*source);
                }
            }

            let head = match sources.as_slice() {
                [single] => *single,
                _ => {
                    let previous = before.get(&variable).copied();
                    self.create_merge_variable(variable, position, collection, sources, previous)?
                }
            };
            self.store.set_head(variable, head);
            merged.insert(variable, head);
        }
        Ok(merged)
    }

    fn create_merge_variable(
        &mut self,
        variable: SymbolId,
        position: Position,
        collection: CollectionKey,
        sources: Vec<TypeVariableId>,
        previous: Option<TypeVariableId>,
    ) -> EngineResult<TypeVariableId> {
        let name = self.table.symbol(variable)?.name.clone();
        let id = self.store.add_variable(name, position, collection, Constraint::Ref(sources));
        if let Some(entry) = self.store.variable_mut(id) {
            entry.ref_of = Some(RefOrigin { variable, previous });
        }
        self.push_ref_variable(variable, id)?;
        Ok(id)
    }
}
