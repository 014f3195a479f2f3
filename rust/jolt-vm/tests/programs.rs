//! End-to-end programs run through the embedded backend.

use jolt_core::{BuildService, ClassHandle, InvokeError, Value};
use jolt_vm::{SharedBuffer, VmService};

// =============================================================================
// Helpers
// =============================================================================

/// Compile `source` as unit `Main`, run `static void main()`, and return
/// what it printed.
fn run(source: &str) -> Result<String, InvokeError> {
    let out = SharedBuffer::new();
    let mut svc = VmService::in_memory().with_output(Box::new(out.clone()));
    svc.compile("Main", source).expect("compile");
    let handle = svc.load("Main").expect("load");
    let main = handle.find_member("main", &[]).expect("main");
    handle.invoke(&main, None, &[])?;
    Ok(out.contents())
}

fn run_body(body: &str) -> Result<String, InvokeError> {
    run(&format!(
        "public class Main {{ public static void main() {{ {} }} }}",
        body
    ))
}

fn exception_of(result: Result<String, InvokeError>) -> String {
    match result {
        Err(InvokeError::Exception { exception, .. }) => exception,
        other => panic!("expected an exception, got {:?}", other),
    }
}

// =============================================================================
// Expressions
// =============================================================================

#[test]
fn arithmetic_and_concatenation() {
    let out = run_body(
        "int a = 7; int b = 2; \
         System.out.println(a / b + \" \" + a % b + \" \" + (double) a / b);",
    )
    .unwrap();
    assert_eq!(out, "3 1 3.5\n");
}

#[test]
fn concatenation_is_left_to_right() {
    let out = run_body("System.out.println(1 + 2 + \"x\" + 1 + 2);").unwrap();
    assert_eq!(out, "3x12\n");
}

#[test]
fn casts_and_compound_assignment_narrow() {
    let out = run_body(
        "int x = 1; x += 1.5; char c = (char) 66; long big = 2147483647; big++; \
         System.out.println(x + \",\" + c + \",\" + (int) 3.9 + \",\" + big);",
    )
    .unwrap();
    assert_eq!(out, "2,B,3,2147483648\n");
}

#[test]
fn int_overflow_wraps() {
    let out = run_body("int m = Integer.MAX_VALUE; m = m + 1; System.out.println(m);").unwrap();
    assert_eq!(out, "-2147483648\n");
}

#[test]
fn ternary_and_logic() {
    let out = run_body(
        "int n = 5; boolean even = n % 2 == 0; \
         System.out.println(even ? \"even\" : \"odd\"); \
         System.out.println(!even && n > 3);",
    )
    .unwrap();
    assert_eq!(out, "odd\ntrue\n");
}

#[test]
fn library_calls() {
    let out = run_body(
        "System.out.println(Math.max(3, 7)); \
         System.out.println(Math.sqrt(16.0)); \
         System.out.println(\"hello\".toUpperCase().substring(1, 3)); \
         System.out.println(Integer.parseInt(\"42\") + 1);",
    )
    .unwrap();
    assert_eq!(out, "7\n4.0\nEL\n43\n");
}

// =============================================================================
// Statements
// =============================================================================

#[test]
fn loops_sum_the_same() {
    let out = run_body(
        "int a = 0; for (int i = 1; i <= 10; i++) { a += i; } \
         int b = 0; int j = 0; while (j < 10) { j++; if (j % 2 == 0) continue; b += j; } \
         int c = 0; do { c++; } while (c < 3); \
         int d = 0; for (int v : new int[]{4, 5, 6}) { d += v; } \
         System.out.println(a + \" \" + b + \" \" + c + \" \" + d);",
    )
    .unwrap();
    assert_eq!(out, "55 25 3 15\n");
}

#[test]
fn break_leaves_innermost_loop() {
    let out = run_body(
        "int hits = 0; \
         for (int i = 0; i < 3; i++) { for (int j = 0; j < 10; j++) { if (j == 2) break; hits++; } } \
         System.out.println(hits);",
    )
    .unwrap();
    assert_eq!(out, "6\n");
}

#[test]
fn arrays_default_and_index() {
    let out = run_body(
        "int[][] grid = new int[2][3]; grid[1][2] = 9; String[] names = new String[2]; \
         int[] xs = {3, 1, 2}; \
         System.out.println(grid[1][2] + \" \" + grid[0].length + \" \" + names[0] + \" \" + xs.length);",
    )
    .unwrap();
    assert_eq!(out, "9 3 null 3\n");
}

// =============================================================================
// Classes
// =============================================================================

#[test]
fn recursion() {
    let out = run(
        "public class Main { \
           static int fib(int n) { return n < 2 ? n : fib(n - 1) + fib(n - 2); } \
           public static void main() { System.out.println(fib(15)); } }",
    )
    .unwrap();
    assert_eq!(out, "610\n");
}

#[test]
fn static_initializers_run_in_order() {
    let out = run(
        "public class Main { \
           static int a = 2; static int b = a * 10; static String s = \"b=\" + b; \
           public static void main() { System.out.println(s); } }",
    )
    .unwrap();
    assert_eq!(out, "b=20\n");
}

#[test]
fn inheritance_overrides_and_super_calls() {
    let out = run(
        "class Animal { \
           protected String name; \
           Animal(String name) { this.name = name; } \
           String speak() { return name + \" makes a sound\"; } } \
         class Dog extends Animal { \
           Dog(String name) { super(name); } \
           String speak() { return super.speak() + \", woof\"; } } \
         public class Main { public static void main() { \
           Animal a = new Dog(\"Rex\"); \
           System.out.println(a.speak()); \
           System.out.println(a instanceof Dog); } }",
    )
    .unwrap();
    assert_eq!(out, "Rex makes a sound, woof\ntrue\n");
}

#[test]
fn constructor_chaining_and_field_initializers() {
    let out = run(
        "class Point { \
           int x; int y; int z = 7; \
           Point() { this(1, 2); } \
           Point(int x, int y) { this.x = x; this.y = y; } \
           public String toString() { return \"(\" + x + \", \" + y + \", \" + z + \")\"; } } \
         public class Main { public static void main() { \
           System.out.println(new Point()); } }",
    )
    .unwrap();
    assert_eq!(out, "(1, 2, 7)\n");
}

#[test]
fn overloads_prefer_exact_shapes() {
    let out = run(
        "public class Main { \
           static String f(long x) { return \"long\"; } \
           static String f(int x) { return \"int\"; } \
           static String f(double x) { return \"double\"; } \
           public static void main() { System.out.println(f(1) + f(1L) + f(1.0)); } }",
    )
    .unwrap();
    assert_eq!(out, "intlongdouble\n");
}

// =============================================================================
// Exceptions
// =============================================================================

#[test]
fn thrown_exceptions_surface_with_message() {
    let err = run_body("throw new IllegalArgumentException(\"bad input\");").unwrap_err();
    assert_eq!(
        err,
        InvokeError::Exception {
            exception: "IllegalArgumentException".into(),
            message: "bad input".into(),
        }
    );
}

#[test]
fn user_exceptions_carry_messages() {
    let err = run(
        "class Boom extends RuntimeException { Boom(String m) { super(m); } } \
         public class Main { public static void main() { throw new Boom(\"pow\"); } }",
    )
    .unwrap_err();
    assert_eq!(
        err,
        InvokeError::Exception {
            exception: "Boom".into(),
            message: "pow".into(),
        }
    );
}

#[test]
fn runtime_faults_raise_standard_exceptions() {
    assert_eq!(
        exception_of(run_body("int z = 0; System.out.println(1 / z);")),
        "java.lang.ArithmeticException"
    );
    assert_eq!(
        exception_of(run_body("String s = null; s.length();")),
        "java.lang.NullPointerException"
    );
    assert_eq!(
        exception_of(run_body("int[] a = new int[2]; a[2] = 1;")),
        "java.lang.ArrayIndexOutOfBoundsException"
    );
    assert_eq!(
        exception_of(run_body("Object o = \"s\"; Integer i = (Integer) o;")),
        "java.lang.ClassCastException"
    );
}

#[test]
fn runaway_recursion_is_bounded() {
    // Deep interpreter recursion needs more than the default test stack.
    let result = std::thread::Builder::new()
        .stack_size(64 * 1024 * 1024)
        .spawn(|| {
            exception_of(run(
                "public class Main { \
                   static int down(int n) { return down(n + 1); } \
                   public static void main() { down(0); } }",
            ))
        })
        .unwrap()
        .join()
        .unwrap();
    assert_eq!(result, "java.lang.StackOverflowError");
}

#[test]
fn unknown_names_are_unresolved() {
    let err = run_body("System.out.println(nope);").unwrap_err();
    assert_eq!(err, InvokeError::Unresolved { name: "nope".into() });
}

// =============================================================================
// Handles
// =============================================================================

#[test]
fn instance_methods_via_handle() {
    let mut svc = VmService::in_memory();
    svc.compile(
        "Counter",
        "public class Counter { int n; public void bump(int by) { n += by; } public int get() { return n; } }",
    )
    .unwrap();
    let handle = svc.load("Counter").unwrap();
    let obj = handle.construct(&[]).unwrap();

    let bump = handle.find_member("bump", &["int".into()]).unwrap();
    handle.invoke(&bump, Some(&obj), &[Value::Int(4)]).unwrap();
    handle.invoke(&bump, Some(&obj), &[Value::Int(3)]).unwrap();

    let get = handle.find_member("get", &[]).unwrap();
    assert_eq!(handle.invoke(&get, Some(&obj), &[]).unwrap(), Value::Int(7));
}

#[test]
fn members_list_constructors_and_methods() {
    let mut svc = VmService::in_memory();
    svc.compile(
        "Shape",
        "public class Shape { private int secret() { return 1; } public static double area(double r) { return r * r; } }",
    )
    .unwrap();
    let handle = svc.load("Shape").unwrap();
    let names: Vec<String> = handle.members().into_iter().map(|m| m.name).collect();
    assert_eq!(names, vec!["<init>".to_string(), "area".to_string()]);
}

#[test]
fn static_imports_reach_other_units() {
    let out = SharedBuffer::new();
    let mut svc = VmService::in_memory().with_output(Box::new(out.clone()));
    svc.compile(
        "Methods",
        "public class Methods { public static int sq(int n) { return n * n; } }",
    )
    .unwrap();
    svc.load("Methods").unwrap();
    svc.compile(
        "Main",
        "import static Methods.*; public class Main { public static void main() { System.out.println(sq(9)); } }",
    )
    .unwrap();
    let handle = svc.load("Main").unwrap();
    let main = handle.find_member("main", &[]).unwrap();
    handle.invoke(&main, None, &[]).unwrap();
    assert_eq!(out.contents(), "81\n");
}

#[test]
fn staging_writes_and_cleans_up() {
    let root = std::env::temp_dir()
        .join("jolt_test_staging")
        .join(format!("programs-{}", std::process::id()));
    let mut svc = VmService::with_staging(&root);
    svc.compile("Eval", "public class Eval { static int x = 1; }")
        .unwrap();
    svc.load("Eval").unwrap();

    let dir = svc.staging_dir().unwrap().to_path_buf();
    assert!(dir.join("Eval.java").exists());
    assert!(dir.join("index.json").exists());

    svc.discard_all().unwrap();
    assert!(!dir.exists());
    let _ = std::fs::remove_dir_all(&root);
}
