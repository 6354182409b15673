use super::support::{analyse_script, boolean, Script};
use crate::controllers::scope_of;
use pretty_assertions::assert_eq;

#[test]
fn test_conditional_scope_inside_function() {
    let (mut script, namespace) = Script::global();
    let foo = script.function(namespace, "foo", &[]);
    let branch = script.if_else(foo.body, boolean("true"), false);

    let engine = analyse_script(&mut script);

    let scope = scope_of(&script.ast, branch.then_block).expect("branch scope");
    assert_eq!(engine.scope_path(scope).expect("path"), "\\.\\.foo().cScope.");
}

#[test]
fn test_namespace_and_function_paths() {
    let mut script = Script::new();
    let namespace = script.namespace("app\\models");
    let bar = script.function(namespace, "bar", &[("$x", None)]);

    let engine = analyse_script(&mut script);

    let namespace_scope = scope_of(&script.ast, namespace).expect("namespace scope");
    let function_scope = scope_of(&script.ast, bar.body).expect("body scope");
    assert_eq!(
        engine.scope_path(namespace_scope).expect("path"),
        "\\app\\models\\.\\app\\models\\."
    );
    assert_eq!(
        engine.scope_path(function_scope).expect("path"),
        "\\app\\models\\.\\app\\models\\.bar()."
    );
}

#[test]
fn test_nested_branches_each_open_a_scope() {
    let (mut script, namespace) = Script::global();
    let outer = script.if_else(namespace, boolean("true"), true);
    let inner = script.while_loop(outer.else_block.expect("else block"), boolean("false"));

    let engine = analyse_script(&mut script);

    let scope = scope_of(&script.ast, inner).expect("loop scope");
    assert_eq!(engine.scope_path(scope).expect("path"), "\\.\\.cScope.cScope.");
}
