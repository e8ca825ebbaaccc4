//! Integration tests for the front-end: compilation, diagnostics and syntax trees.

use luaubox::{
    frontend::{
        compile, compile_bytes, parse_to_tree, render_diagnostics, CommentKind, CompileResult,
        DeclarationKind, MAX_NESTING_DEPTH,
    },
    prelude::*,
};

#[test]
fn test_valid_source_compiles() {
    let result = compile("local x = 1\nreturn x + 1");
    assert!(result.is_success());
    assert!(result.diagnostics().is_empty());
    assert!(!result.bytecode().unwrap().is_empty());
    assert!(result.error_text().is_none());
}

#[test]
fn test_incomplete_assignment_reports_one_diagnostic() {
    let result = compile("x = ");
    assert!(!result.is_success());
    assert!(result.bytecode().is_none());

    let diagnostics = result.diagnostics();
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].line, 1);
    assert_eq!((diagnostics[0].line, diagnostics[0].column), (1, 5));
    assert!(!diagnostics[0].message.is_empty());

    let text = render_diagnostics(diagnostics);
    assert!(text.starts_with("(1,"));
    assert!(text.ends_with('\n'));
}

#[test]
fn test_diagnostics_are_one_based() {
    let result = compile("local a = 1\nlocal b = = 2\n");
    for diagnostic in result.diagnostics() {
        assert!(diagnostic.line >= 1);
        assert!(diagnostic.column >= 1);
    }
    assert!(result.diagnostics().iter().any(|d| d.line == 2));
}

#[test]
fn test_compile_is_deterministic() {
    let source = "local function fib(n) if n < 2 then return n end return fib(n - 1) + fib(n - 2) end\nreturn fib(10)";
    let first = compile(source).into_result().unwrap();
    let second = compile(source).into_result().unwrap();
    assert_eq!(first.as_bytes(), second.as_bytes());
}

#[test]
fn test_compiled_bytecode_always_loads() {
    let host = HostEnvironment::create().unwrap();
    for source in ["return 1", "local t = {1, 2, 3} return #t", "return function() end"] {
        let bytecode = compile(source).into_result().unwrap();
        let quota = std::rc::Rc::new(QuotaState::new(QuotaConfig::default()));
        let mut context = host.spawn_context(quota).unwrap();
        assert!(context.load(&bytecode, "=roundtrip").is_ok());
    }
}

#[test]
fn test_compile_bytes_stops_at_nul() {
    let result = compile_bytes(b"return 1\0this is not lua");
    assert!(result.is_success());
}

#[test]
fn test_compile_bytes_rejects_invalid_utf8() {
    let result = compile_bytes(b"return \"\xff\"");
    assert!(matches!(result, CompileResult::ParseErrors(_)));
    assert_eq!(result.diagnostics()[0].line, 1);
}

#[test]
fn test_deep_nesting_is_a_diagnostic() {
    let source = format!("return {}1{}", "(".repeat(MAX_NESTING_DEPTH + 1), ")".repeat(MAX_NESTING_DEPTH + 1));
    let result = compile(&source);
    assert_eq!(result.diagnostics().len(), 1);
}

#[test]
fn test_into_result_maps_parse_errors() {
    match compile("x = ").into_result() {
        Err(Error::Parse(diagnostics)) => assert_eq!(diagnostics.len(), 1),
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn test_tree_has_root_and_comments() {
    let source = "-- header\nlocal x = 1 --[[ inline ]]\nreturn x\n";
    let result = parse_to_tree(source).unwrap();
    let tree = result.tree().unwrap();

    let value: serde_json::Value = serde_json::from_str(tree.json()).unwrap();
    assert!(value["root"].is_object());

    let comments = value["commentLocations"].as_array().unwrap();
    assert_eq!(comments.len(), 2);
    assert_eq!(tree.comments()[0].kind, CommentKind::Line);
    assert_eq!(tree.comments()[0].start.line, 1);
    assert_eq!(tree.comments()[1].kind, CommentKind::Block);
    assert_eq!(tree.comments()[1].start.line, 2);
}

#[test]
fn test_tree_parse_errors_share_format() {
    let result = parse_to_tree("x = ").unwrap();
    assert!(result.tree().is_none());
    assert_eq!(result.diagnostics(), compile("x = ").diagnostics());
}

#[test]
fn test_tree_accepts_type_annotations() {
    let source = "type Point = { x: number, y: number }\nlocal function len(p: Point): number return p.x end";
    let result = parse_to_tree(source).unwrap();
    assert!(result.tree().is_some());
}

#[test]
fn test_bracket_runs_in_strings_and_comments_compile() {
    let run = "(".repeat(MAX_NESTING_DEPTH * 3);
    let source = format!("-- {run}\nlocal s = '{run}' --[[ {run} ]]\nreturn #s");
    assert!(compile(&source).is_success());
    assert!(parse_to_tree(&source).unwrap().tree().is_some());
}

#[test]
fn test_luau_only_rejections_are_located() {
    for (source, needle) in [
        ("local n = 0\nbreak", "break"),
        ("local function f()\n  return ...\nend", "..."),
    ] {
        let result = compile(source);
        let diagnostics = result.diagnostics();
        assert_eq!(diagnostics.len(), 1, "{source}");
        assert_eq!(diagnostics[0].line as usize, source.lines().count(), "{source}");
        assert!(diagnostics[0].message.contains(needle), "{source}");
        assert!(result.error_text().unwrap().starts_with('('));
    }
}

#[test]
fn test_function_attributes_compile() {
    assert!(compile("@native\nlocal function f(n) return n * 2 end\nreturn f(2)").is_success());
}

#[test]
fn test_tree_tolerates_declarations() {
    let source = "declare function warn(message: string): ()\n\
                  declare class Vector\n  x: number\nend\n\
                  declare version: string\n\
                  local v = 1 -- tail\n";
    let result = parse_to_tree(source).unwrap();
    let tree = result.tree().unwrap();

    let kinds: Vec<_> = tree.declarations().iter().map(|d| d.kind).collect();
    assert_eq!(
        kinds,
        vec![DeclarationKind::Function, DeclarationKind::Class, DeclarationKind::Global]
    );
    assert_eq!(tree.comments()[0].start.line, 6);

    let value: serde_json::Value = serde_json::from_str(tree.json()).unwrap();
    assert_eq!(value["declarations"][1]["name"], "Vector");
}
