//! Fragment sequences evaluated end to end against the embedded backend.

use jolt_core::{LoadError, Value};
use jolt_engine::{DefinitionKind, Engine, EvalError, Outcome, ResetKind, Routine};
use jolt_vm::{SharedBuffer, VmService};

// =============================================================================
// Helpers
// =============================================================================

fn engine() -> (Engine<VmService>, SharedBuffer) {
    let out = SharedBuffer::new();
    let svc = VmService::in_memory().with_output(Box::new(out.clone()));
    (Engine::new(svc), out)
}

/// Evaluate every fragment, panicking on the first failure.
fn run_all(engine: &mut Engine<VmService>, fragments: &[&str]) {
    for fragment in fragments {
        if let Outcome::Failed(report) = engine.evaluate(fragment) {
            panic!("{:?} failed: {}", fragment, report);
        }
    }
}

fn value_of(engine: &Engine<VmService>, name: &str) -> Value {
    engine
        .session()
        .binding(name)
        .map(|b| b.value.clone())
        .unwrap_or_else(|| panic!("no binding named {}", name))
}

fn rendered(outcome: Outcome) -> String {
    match outcome {
        Outcome::Value { rendered, .. }
        | Outcome::Declared { rendered, .. }
        | Outcome::Assigned { rendered, .. } => rendered,
        other => panic!("expected a value, got {:?}", other),
    }
}

fn failure(outcome: Outcome) -> EvalError {
    match outcome {
        Outcome::Failed(report) => report.error,
        other => panic!("expected a failure, got {:?}", other),
    }
}

// =============================================================================
// Bindings
// =============================================================================

#[test]
fn declaration_then_assignment_is_visible() {
    let (mut engine, _) = engine();
    assert_eq!(rendered(engine.evaluate("int x = 5;")), "5");
    assert_eq!(rendered(engine.evaluate("x = x + 1;")), "6");
    assert_eq!(rendered(engine.evaluate("x")), "6");
    assert_eq!(rendered(engine.evaluate("x * 2;")), "12");
}

#[test]
fn statements_apply_in_submission_order() {
    let (mut engine, _) = engine();
    run_all(&mut engine, &["int a = 1;", "a = a + 1;", "a = a * 10;"]);
    assert!(matches!(value_of(&engine, "a"), Value::Int(20)));
}

#[test]
fn repeating_a_declaration_is_idempotent() {
    let (mut engine, _) = engine();
    run_all(&mut engine, &["int x = 5;", "int x = 5;"]);
    assert!(matches!(value_of(&engine, "x"), Value::Int(5)));
    assert_eq!(engine.session().bindings().count(), 1);
}

#[test]
fn redeclaring_with_a_new_type_replaces_the_binding() {
    let (mut engine, _) = engine();
    run_all(&mut engine, &["int x = 5;", "x = x + 1;", "String x = \"s\";"]);
    let binding = engine.session().binding("x").unwrap();
    assert_eq!(binding.declared_type, "String");
    assert_eq!(binding.value, Value::string("s"));
    match engine.session().routine() {
        Routine::Running(routine) => assert!(routine.body.is_empty()),
        Routine::Empty => panic!("routine should be running"),
    }
}

#[test]
fn assignment_to_undeclared_name_fails_without_change() {
    let (mut engine, _) = engine();
    run_all(&mut engine, &["int x = 1;"]);
    let before = engine.session().render();
    assert_eq!(
        failure(engine.evaluate("y = 3;")),
        EvalError::UndeclaredVariable("y".into())
    );
    assert_eq!(engine.session().render(), before);
    assert!(engine.session().binding("y").is_none());
}

#[test]
fn shift_assignment_is_rejected_as_unsupported() {
    let (mut engine, _) = engine();
    run_all(&mut engine, &["int f = 1;"]);
    match failure(engine.evaluate("f <<= 1;")) {
        EvalError::FragmentShape { expected, fragment } => {
            assert_eq!(expected, "supported assignment operator");
            assert_eq!(fragment, "f <<= 1;");
        }
        other => panic!("expected a shape error, got {:?}", other),
    }
    assert!(matches!(value_of(&engine, "f"), Value::Int(1)));
}

#[test]
fn compound_assignment_narrows_to_the_declared_type() {
    let (mut engine, _) = engine();
    run_all(&mut engine, &["int c = 1;", "c += 2.7;"]);
    assert!(matches!(value_of(&engine, "c"), Value::Int(3)));
}

#[test]
fn increment_statements_update_the_binding() {
    let (mut engine, _) = engine();
    run_all(&mut engine, &["int i = 0;", "i++;", "++i;"]);
    assert!(matches!(value_of(&engine, "i"), Value::Int(2)));
}

#[test]
fn var_takes_the_type_of_its_value() {
    let (mut engine, _) = engine();
    run_all(&mut engine, &["var s = \"ab\";"]);
    assert_eq!(engine.session().binding("s").unwrap().field_type(), "String");
    assert_eq!(rendered(engine.evaluate("s + \"c\"")), "abc");
}

#[test]
fn static_declaration_becomes_a_binding() {
    let (mut engine, _) = engine();
    assert!(matches!(
        engine.evaluate("public static int counter = 7;"),
        Outcome::Declared { ref name, .. } if name == "counter"
    ));
    assert!(matches!(value_of(&engine, "counter"), Value::Int(7)));
}

#[test]
fn incompatible_initializer_is_rejected() {
    let (mut engine, _) = engine();
    assert!(matches!(
        failure(engine.evaluate("int n = \"text\";")),
        EvalError::TypeMismatch { .. }
    ));
    assert!(engine.session().binding("n").is_none());
}

// =============================================================================
// Arrays and objects
// =============================================================================

#[test]
fn array_initializer_and_element_write() {
    let (mut engine, _) = engine();
    run_all(&mut engine, &["int[] arr = {1, 2, 3};", "arr[1] = 20;"]);
    assert_eq!(rendered(engine.evaluate("arr[1]")), "20");
    assert_eq!(rendered(engine.evaluate("arr.length")), "3");
}

#[test]
fn class_definition_construction_and_field_write() {
    let (mut engine, _) = engine();
    let defined = engine.evaluate(
        "class Point { int x; int y; \
         Point(int x, int y) { this.x = x; this.y = y; } \
         int sum() { return x + y; } }",
    );
    assert_eq!(
        defined,
        Outcome::Defined {
            kind: DefinitionKind::Class,
            names: vec!["Point".into()]
        }
    );
    run_all(&mut engine, &["Point p = new Point(1, 2);"]);
    assert_eq!(rendered(engine.evaluate("p.sum()")), "3");
    run_all(&mut engine, &["p.x = 10;"]);
    assert_eq!(rendered(engine.evaluate("p.sum()")), "12");
}

#[test]
fn sibling_classes_dispatch_virtually() {
    let (mut engine, _) = engine();
    let defined = engine.evaluate(
        "class A { String name() { return \"A\"; } } \
         class B extends A { String name() { return \"B\"; } }",
    );
    assert_eq!(
        defined,
        Outcome::Defined {
            kind: DefinitionKind::Class,
            names: vec!["A".into(), "B".into()]
        }
    );
    run_all(&mut engine, &["A a = new B();"]);
    assert_eq!(rendered(engine.evaluate("a.name()")), "B");
}

#[test]
fn element_write_survives_later_folds() {
    let (mut engine, _) = engine();
    run_all(
        &mut engine,
        &["int[] xs = {1, 2};", "xs = new int[]{5, 6};", "xs[0] = 9;"],
    );
    assert_eq!(rendered(engine.evaluate("xs[0]")), "9");
    run_all(&mut engine, &["int k = 0;", "k = 1;"]);
    assert_eq!(rendered(engine.evaluate("xs[0]")), "9");
    assert_eq!(rendered(engine.evaluate("xs[1]")), "6");
}

#[test]
fn replayed_mutations_do_not_stack() {
    let (mut engine, _) = engine();
    run_all(
        &mut engine,
        &[
            "class Box { int n; }",
            "int[] c = {0};",
            "Box b = new Box();",
            "for (int i = 0; i < 1; i++) { c[0]++; b.n += 2; }",
        ],
    );
    assert_eq!(rendered(engine.evaluate("c[0]")), "1");
    run_all(&mut engine, &["int u = 0;", "u = 1;", "u = 2;"]);
    assert_eq!(rendered(engine.evaluate("c[0]")), "1");
    assert_eq!(rendered(engine.evaluate("b.n")), "2");
}

#[test]
fn aliased_arrays_stay_aliased_across_folds() {
    let (mut engine, _) = engine();
    run_all(
        &mut engine,
        &["int[] a = {1};", "int n = 0;", "int[] b = a;", "b[0] = 5;"],
    );
    run_all(&mut engine, &["n = 1;"]);
    assert_eq!(rendered(engine.evaluate("a[0]")), "5");
    assert_eq!(rendered(engine.evaluate("a == b")), "true");
}

#[test]
fn session_unit_names_are_reserved() {
    let (mut engine, _) = engine();
    assert!(matches!(
        failure(engine.evaluate("class Eval { }")),
        EvalError::FragmentShape { .. }
    ));
}

// =============================================================================
// Methods
// =============================================================================

#[test]
fn methods_are_callable_and_redefinable() {
    let (mut engine, _) = engine();
    assert_eq!(
        engine.evaluate("int sq(int n) { return n * n; }"),
        Outcome::Defined {
            kind: DefinitionKind::Method,
            names: vec!["sq".into()]
        }
    );
    assert_eq!(rendered(engine.evaluate("sq(4)")), "16");
    run_all(&mut engine, &["int sq(int n) { return n * n * n; }"]);
    assert_eq!(rendered(engine.evaluate("sq(2)")), "8");
    assert_eq!(engine.session().methods().len(), 1);
}

#[test]
fn methods_see_the_current_binding_values() {
    let (mut engine, _) = engine();
    run_all(
        &mut engine,
        &["int base = 3;", "int addBase(int n) { return n + base; }"],
    );
    assert_eq!(rendered(engine.evaluate("addBase(1)")), "4");
    run_all(&mut engine, &["base = 10;"]);
    assert_eq!(rendered(engine.evaluate("addBase(1)")), "11");
}

#[test]
fn methods_are_usable_inside_statements() {
    let (mut engine, _) = engine();
    run_all(
        &mut engine,
        &["int twice(int n) { return n * 2; }", "int t = 1;", "t = twice(t) + 1;"],
    );
    assert!(matches!(value_of(&engine, "t"), Value::Int(3)));
}

#[test]
fn void_method_call_executes() {
    let (mut engine, out) = engine();
    run_all(
        &mut engine,
        &["public void greet(String who) { System.out.println(\"hi \" + who); }"],
    );
    assert_eq!(engine.evaluate("greet(\"bob\");"), Outcome::Executed);
    assert_eq!(out.take(), "hi bob\n");
}

#[test]
fn broken_method_leaves_the_session_usable() {
    let (mut engine, _) = engine();
    assert!(matches!(
        failure(engine.evaluate("int bad() { return 1 +; }")),
        EvalError::BuildFailure(_)
    ));
    assert!(engine.session().methods().is_empty());
    run_all(&mut engine, &["int ok() { return 1; }"]);
    assert_eq!(rendered(engine.evaluate("ok()")), "1");
}

// =============================================================================
// Output and replay
// =============================================================================

#[test]
fn library_calls_fall_back_to_a_compiled_statement() {
    let (mut engine, out) = engine();
    assert_eq!(
        engine.evaluate("System.out.println(\"hello\");"),
        Outcome::Executed
    );
    assert_eq!(out.take(), "hello\n");
}

#[test]
fn control_statements_replay_on_every_fold() {
    let (mut engine, out) = engine();
    run_all(&mut engine, &["int n = 0;", "if (n == 0) System.out.println(\"zero\");"]);
    assert_eq!(out.take(), "zero\n");
    run_all(&mut engine, &["n = 1;"]);
    assert_eq!(out.take(), "zero\n");
    assert!(matches!(value_of(&engine, "n"), Value::Int(1)));
}

#[test]
fn loops_accumulate_into_bindings() {
    let (mut engine, _) = engine();
    run_all(
        &mut engine,
        &["int total = 0;", "for (int k = 1; k <= 4; k++) { total += k; }"],
    );
    assert!(matches!(value_of(&engine, "total"), Value::Int(10)));
}

// =============================================================================
// Failures and recovery
// =============================================================================

#[test]
fn runtime_exception_rolls_back_the_statement() {
    let (mut engine, _) = engine();
    run_all(&mut engine, &["int x = 5;"]);
    match failure(engine.evaluate("x = x / 0;")) {
        EvalError::InvocationFailure { exception, .. } => {
            assert_eq!(exception, "java.lang.ArithmeticException")
        }
        other => panic!("expected an invocation failure, got {:?}", other),
    }
    assert!(matches!(value_of(&engine, "x"), Value::Int(5)));
    run_all(&mut engine, &["x = x + 1;"]);
    assert!(matches!(value_of(&engine, "x"), Value::Int(6)));
}

#[test]
fn thrown_exception_is_reported() {
    let (mut engine, _) = engine();
    assert_eq!(
        failure(engine.evaluate("throw new IllegalStateException(\"boom\");")),
        EvalError::InvocationFailure {
            exception: "IllegalStateException".into(),
            message: "boom".into()
        }
    );
    assert!(!engine.session().routine().is_running());
    run_all(&mut engine, &["int after = 1;"]);
}

#[test]
fn failure_report_carries_the_session_dump() {
    let (mut engine, _) = engine();
    run_all(&mut engine, &["int kept = 42;"]);
    match engine.evaluate("missing = 1;") {
        Outcome::Failed(report) => {
            assert!(report.state.contains("bindings:"));
            assert!(report.state.contains("int kept = 42"));
            assert!(report.to_string().starts_with("Variable missing not declared."));
        }
        other => panic!("expected a failure, got {:?}", other),
    }
}

// =============================================================================
// Imports
// =============================================================================

#[test]
fn library_imports_are_recorded_once() {
    let (mut engine, _) = engine();
    let outcome = engine.evaluate("import java.util.List;");
    assert_eq!(
        outcome,
        Outcome::Imported {
            symbol: "java.util.List".into(),
            local: false
        }
    );
    run_all(&mut engine, &["import java.util.List;"]);
    assert_eq!(engine.session().imports().len(), 1);
}

#[test]
fn local_import_requires_a_defined_class() {
    let (mut engine, _) = engine();
    assert_eq!(
        failure(engine.evaluate("import Nope;")),
        EvalError::LoadFailure(LoadError::NotCompiled("Nope".into()))
    );
    run_all(
        &mut engine,
        &["class Util { static int twice(int n) { return n * 2; } }"],
    );
    assert_eq!(
        engine.evaluate("import Util;"),
        Outcome::Imported {
            symbol: "Util".into(),
            local: true
        }
    );
    assert_eq!(rendered(engine.evaluate("Util.twice(21)")), "42");
}

// =============================================================================
// Resets
// =============================================================================

#[test]
fn soft_reset_keeps_bindings() {
    let (mut engine, _) = engine();
    run_all(&mut engine, &["int x = 5;", "x = 6;"]);
    assert_eq!(engine.evaluate(":reset"), Outcome::Reset(ResetKind::Soft));
    assert!(!engine.session().routine().is_running());
    assert_eq!(rendered(engine.evaluate("x")), "6");
    run_all(&mut engine, &["x = x + 1;"]);
    assert!(matches!(value_of(&engine, "x"), Value::Int(7)));
}

#[test]
fn hard_reset_forgets_everything() {
    let (mut engine, _) = engine();
    run_all(
        &mut engine,
        &["int x = 5;", "int f() { return 1; }", "import java.util.List;"],
    );
    assert_eq!(engine.evaluate(":reset-all"), Outcome::Reset(ResetKind::Hard));
    assert!(engine.session().binding("x").is_none());
    assert!(engine.session().methods().is_empty());
    assert!(engine.session().imports().is_empty());
    assert!(matches!(
        failure(engine.evaluate("x;")),
        EvalError::Unresolved(_)
    ));
    assert_eq!(
        failure(engine.evaluate("x = 1;")),
        EvalError::UndeclaredVariable("x".into())
    );
}

#[test]
fn hard_reset_removes_staged_units() {
    let root = std::env::temp_dir().join("jolt_engine_staging_test");
    let svc = VmService::with_staging(&root);
    let mut engine = Engine::new(svc);
    run_all(&mut engine, &["int x = 1;"]);
    let dir = engine.service().staging_dir().unwrap().to_path_buf();
    assert!(dir.join("Eval.java").exists());

    run_all(&mut engine, &[":reset-all"]);
    assert!(!dir.exists());
    let _ = std::fs::remove_dir_all(&root);
}

#[test]
fn blank_input_does_nothing() {
    let (mut engine, _) = engine();
    assert_eq!(engine.evaluate("   \n"), Outcome::Nothing);
}
