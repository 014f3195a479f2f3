//! Shell-level behavior: file evaluation, fragment splitting, config lookup.

use std::path::PathBuf;

use jolt_cli::colors::Palette;
use jolt_cli::config::{find_config, JoltConfig, CONFIG_FILE};
use jolt_cli::repl::{format_outcome, split_fragments, Shell};
use jolt_engine::{Engine, Outcome};
use jolt_vm::VmService;

// =============================================================================
// Helpers
// =============================================================================

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("jolt_cli_{}_{}", name, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn shell() -> Shell {
    Shell::new(Engine::new(VmService::in_memory()), Palette::plain())
}

// =============================================================================
// Fragment splitting
// =============================================================================

#[test]
fn splits_multi_line_definitions() {
    let source = "\
// setup
int x = 5;

class Point {
    int x;
    String label = \"}\";
}
int sq(int n) {
    return n * n;
}
sq(x)
";
    let fragments = split_fragments(source);
    assert_eq!(fragments.len(), 4);
    assert_eq!(fragments[0], "int x = 5;");
    assert!(fragments[1].starts_with("class Point {") && fragments[1].ends_with('}'));
    assert!(fragments[2].contains("return n * n;"));
    assert_eq!(fragments[3], "sq(x)");
}

#[test]
fn unbalanced_tail_is_still_a_fragment() {
    assert_eq!(split_fragments("int f() {\n return 1;"), vec!["int f() {\n return 1;"]);
}

// =============================================================================
// File evaluation
// =============================================================================

#[test]
fn eval_file_runs_every_fragment() {
    let dir = scratch_dir("eval");
    let file = dir.join("session.jsh");
    std::fs::write(
        &file,
        "int total = 0;\nfor (int i = 1; i <= 3; i++) {\n    total += i;\n}\n",
    )
    .unwrap();

    let mut shell = shell();
    assert_eq!(shell.eval_file(&file, false).unwrap(), 0);
    let total = shell.engine().session().binding("total").unwrap();
    assert_eq!(total.value.to_string(), "6");
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn eval_file_stops_at_first_failure_unless_asked() {
    let dir = scratch_dir("failures");
    let file = dir.join("broken.jsh");
    std::fs::write(&file, "y = 1;\nz = 2;\nint ok = 3;\n").unwrap();

    assert_eq!(shell().eval_file(&file, false).unwrap(), 1);

    let mut shell = shell();
    assert_eq!(shell.eval_file(&file, true).unwrap(), 2);
    assert!(shell.engine().session().binding("ok").is_some());
    assert!(shell.session_names().contains(&"ok".to_string()));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn missing_file_is_an_io_error() {
    assert!(shell()
        .eval_file(&std::env::temp_dir().join("jolt_no_such_file.jsh"), true)
        .is_err());
}

// =============================================================================
// Output formatting
// =============================================================================

#[test]
fn outcomes_render_plainly() {
    let mut shell = shell();
    let palette = Palette::plain();
    let declared = shell.eval_fragment("int x = 4;");
    assert_eq!(format_outcome(&declared, &palette).as_deref(), Some("x ==> 4"));
    let defined = shell.eval_fragment("int sq(int n) { return n * n; }");
    assert_eq!(
        format_outcome(&defined, &palette).as_deref(),
        Some("(defined method sq)")
    );
    let value = shell.eval_fragment("sq(x)");
    assert_eq!(format_outcome(&value, &palette).as_deref(), Some("16"));
    assert_eq!(format_outcome(&Outcome::Executed, &palette), None);

    let failed = shell.eval_fragment("nope = 1;");
    let text = format_outcome(&failed, &palette).unwrap();
    assert!(text.starts_with("Error: Variable nope not declared."));
    assert!(text.contains("int x = 4"));
}

// =============================================================================
// Configuration lookup
// =============================================================================

#[test]
fn config_is_found_in_an_ancestor() {
    let root = scratch_dir("config");
    let nested = root.join("a").join("b");
    std::fs::create_dir_all(&nested).unwrap();
    std::fs::write(root.join(CONFIG_FILE), "color = false\n[log]\nlevel = \"info\"\n").unwrap();

    let found = find_config(&nested, None).unwrap();
    assert_eq!(found, root.join(CONFIG_FILE));
    let cfg = JoltConfig::load_from(&found).unwrap();
    assert!(!cfg.color);
    assert_eq!(cfg.log.level.as_deref(), Some("info"));
    let _ = std::fs::remove_dir_all(&root);
}

#[test]
fn global_config_is_the_fallback() {
    let root = scratch_dir("global");
    let project = root.join("project");
    std::fs::create_dir_all(&project).unwrap();
    let global = root.join("global.toml");
    std::fs::write(&global, "staging_root = \"/tmp/elsewhere\"\n").unwrap();

    assert_eq!(find_config(&project, Some(global.as_path())), Some(global.clone()));
    let cfg = JoltConfig::load_from(&global).unwrap();
    assert_eq!(cfg.staging_root(), PathBuf::from("/tmp/elsewhere"));
    assert_eq!(find_config(&project, Some(root.join("absent.toml").as_path())), None);
    let _ = std::fs::remove_dir_all(&root);
}

#[test]
fn malformed_config_is_reported() {
    let root = scratch_dir("malformed");
    let path = root.join(CONFIG_FILE);
    std::fs::write(&path, "color = \"sometimes\"\n").unwrap();
    let err = JoltConfig::load_from(&path).unwrap_err();
    assert!(err.to_string().starts_with("invalid toml in"));
    let _ = std::fs::remove_dir_all(&root);
}
