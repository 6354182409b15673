use super::support::{analyse, analyse_script, assigned_variable, call, int, issues_of, type_names, var, Script};
use crate::builtins::{BuiltinProvider, CoreRegistrar};
use crate::controllers::scope_of;
use crate::engine::InferenceEngine;
use crate::error::{EngineError, EngineResult};
use crate::issues::{Issue, IssueKind, IssueReporter, Severity};
use crate::solver::SolverState;
use pretty_assertions::assert_eq;
use std::sync::{Arc, Mutex};

#[test]
fn test_single_assignment() {
    let (mut script, namespace) = Script::global();
    let assignment = script.assign(namespace, "$a", int("1"));

    let engine = analyse_script(&mut script);

    assert!(engine.issues().is_empty(), "{:?}", engine.issues());
    let binding = engine
        .variable_binding(assigned_variable(&script.ast, assignment))
        .expect("binding");
    assert_eq!(type_names(&binding), vec!["int"]);
}

#[test]
fn test_echo_of_undefined_variable() {
    let (mut script, namespace) = Script::global();
    script.echo(namespace, var("$a"));

    let engine = analyse_script(&mut script);

    assert_eq!(engine.issues().len(), 1);
    let issue = &engine.issues()[0];
    assert_eq!(issue.kind, IssueKind::NotDefined);
    assert_eq!(issue.severity, Severity::FatalError);
    assert_eq!(issue.message_key(), "notDefined");
    assert_eq!(issue.parameter("name"), Some("$a"));
    assert!(engine.has_found(Severity::FatalError));
}

#[test]
fn test_reset_invalidates_previous_handles() {
    let (mut first, namespace) = Script::global();
    first.assign(namespace, "$a", int("1"));
    let mut engine = InferenceEngine::new().expect("engine");
    analyse(&mut engine, &mut first.ast).expect("first run");
    let old_scope = scope_of(&first.ast, namespace).expect("scope");

    engine.reset().expect("reset");
    assert_eq!(engine.solver_state(), SolverState::Idle);
    assert!(engine.issues().is_empty());

    let (mut second, namespace) = Script::global();
    let assignment = second.assign(namespace, "$a", int("1"));
    analyse(&mut engine, &mut second.ast).expect("second run");
    let new_scope = scope_of(&second.ast, namespace).expect("scope");

    assert_ne!(old_scope, new_scope);
    assert!(matches!(
        engine.scope_path(old_scope),
        Err(EngineError::StaleScope { .. })
    ));
    assert_eq!(engine.scope_path(new_scope).expect("path"), "\\.\\.");
    let binding = engine
        .variable_binding(assigned_variable(&second.ast, assignment))
        .expect("binding");
    assert_eq!(type_names(&binding), vec!["int"]);
}

#[test]
fn test_passes_are_rejected_after_solving() {
    let (mut script, namespace) = Script::global();
    script.echo(namespace, int("1"));
    let mut engine = analyse_script(&mut script);

    assert!(matches!(
        engine.definition(),
        Err(EngineError::InvalidSolverState { .. })
    ));
    assert!(engine.inference().is_err());

    let reported = engine.issues().len();
    engine.solve_all().expect("solving twice is a no-op");
    assert_eq!(engine.issues().len(), reported);
}

#[derive(Clone, Default)]
struct Recorder {
    keys: Arc<Mutex<Vec<&'static str>>>,
}

impl IssueReporter for Recorder {
    fn report(&self, issue: &Issue) {
        if let Ok(mut keys) = self.keys.lock() {
            keys.push(issue.message_key());
        }
    }
}

#[test]
fn test_reporters_see_every_issue() {
    let (mut script, namespace) = Script::global();
    script.echo(namespace, var("$missing"));
    script.echo(namespace, var("$also_missing"));

    let recorder = Recorder::default();
    let mut engine = InferenceEngine::new().expect("engine");
    engine.add_issue_reporter(Box::new(recorder.clone()));
    analyse(&mut engine, &mut script.ast).expect("analysis");

    let keys = recorder.keys.lock().expect("lock").clone();
    assert_eq!(keys, vec!["notDefined", "notDefined"]);
}

/// Adds a `clamp` function to the built-ins
struct MathExtensions;

impl BuiltinProvider for MathExtensions {
    fn register(&self, registrar: &mut CoreRegistrar<'_>) -> EngineResult<()> {
        registrar.define_function("clamp", &["int, int, int -> int"])?;
        Ok(())
    }
}

#[test]
fn test_extra_builtin_provider() {
    let (mut script, namespace) = Script::global();
    let assignment = script.assign(
        namespace,
        "$c",
        call("clamp", vec![int("5"), int("0"), int("3")]),
    );

    let mut engine = InferenceEngine::builder()
        .with_provider(Box::new(MathExtensions))
        .build()
        .expect("engine");
    analyse(&mut engine, &mut script.ast).expect("analysis");

    assert!(engine.issues().is_empty(), "{:?}", engine.issues());
    let binding = engine
        .variable_binding(assigned_variable(&script.ast, assignment))
        .expect("binding");
    assert_eq!(type_names(&binding), vec!["int"]);
    assert!(issues_of(&engine, IssueKind::NotDefined).is_empty());
}
