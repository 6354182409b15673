use super::support::{analyse_script, boolean, call, int, issues_of, var, Script};
use crate::issues::{IssueKind, Severity};
use pretty_assertions::assert_eq;

#[test]
fn test_assignment_in_one_branch_only() {
    let (mut script, namespace) = Script::global();
    let branch = script.if_else(namespace, boolean("true"), false);
    script.assign(branch.then_block, "$b", int("1"));
    script.echo(namespace, var("$b"));

    let engine = analyse_script(&mut script);

    let partial = issues_of(&engine, IssueKind::VariablePartiallyInitialised);
    assert_eq!(partial.len(), 1);
    assert_eq!(partial[0].severity, Severity::Warning);
    assert_eq!(partial[0].parameter("name"), Some("$b"));
    assert!(!engine.has_found(Severity::Error));
}

#[test]
fn test_assignment_in_both_branches() {
    let (mut script, namespace) = Script::global();
    let branch = script.if_else(namespace, boolean("true"), true);
    script.assign(branch.then_block, "$b", int("1"));
    script.assign(branch.else_block.expect("else"), "$b", int("2"));
    script.echo(namespace, var("$b"));

    let engine = analyse_script(&mut script);

    assert!(engine.issues().is_empty(), "{:?}", engine.issues());
}

#[test]
fn test_read_before_any_assignment_in_function() {
    let (mut script, namespace) = Script::global();
    let function = script.function(namespace, "f", &[("$x", None)]);
    script.echo(function.body, var("$y"));
    script.assign(function.body, "$y", var("$x"));

    let engine = analyse_script(&mut script);

    let uninitialised = issues_of(&engine, IssueKind::VariableNotInitialised);
    assert_eq!(uninitialised.len(), 1);
    assert_eq!(uninitialised[0].parameter("name"), Some("$y"));
    assert!(issues_of(&engine, IssueKind::VariablePartiallyInitialised).is_empty());
}

#[test]
fn test_loop_body_never_initialises_fully() {
    let (mut script, namespace) = Script::global();
    let body = script.while_loop(namespace, boolean("false"));
    script.assign(body, "$seen", boolean("true"));
    script.echo(namespace, var("$seen"));

    let engine = analyse_script(&mut script);

    assert_eq!(issues_of(&engine, IssueKind::VariablePartiallyInitialised).len(), 1);
}

#[test]
fn test_parameters_and_super_globals_are_initialised() {
    let (mut script, namespace) = Script::global();
    let function = script.function(namespace, "f", &[("$x", None)]);
    script.echo(function.body, var("$x"));
    script.statement(namespace, call("count", vec![var("$_GET")]));

    let engine = analyse_script(&mut script);

    assert!(issues_of(&engine, IssueKind::VariableNotInitialised).is_empty());
    assert!(issues_of(&engine, IssueKind::NotDefined).is_empty());
    assert!(engine.issues().is_empty(), "{:?}", engine.issues());
}
