//! Benchmarks for fragment handling.
//!
//! Classification and unit synthesis run on every keystroke-sized input, so
//! they are measured on their own. The session benchmarks measure whole
//! folds against the embedded backend, where replay cost grows with the
//! routine.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use jolt_core::Value;
use jolt_engine::synth::{expression_unit, holder_unit, split_classes};
use jolt_engine::{classify, statement_shape, Binding, Engine, MethodDef};
use jolt_vm::VmService;

// ---------------------------------------------------------------------------
// Fragments
// ---------------------------------------------------------------------------

const FRAGMENTS: &[&str] = &[
    "import java.util.List;",
    "class Point { int x; int y; Point(int x, int y) { this.x = x; this.y = y; } }",
    "public int sq(int n) { return n * n; }",
    "public static int counter = 0;",
    "x + 1",
    "int x = 5;",
    "x += compute(1, \"a;b\");",
    "p.x = 10;",
    "for (int i = 0; i < 3; i++) { total += i; }",
    "System.out.println(\"hi\");",
];

const CLASSES: &str = "class A { String s = \"}\"; int f() { return 1; } } \
                       class B extends A { int f() { return 2; } } \
                       class C { static int g(int[] xs) { return xs.length; } }";

fn bindings(n: usize) -> Vec<Binding> {
    (0..n)
        .map(|i| Binding::new(format!("v{}", i), "int", Value::Int(i as i32)))
        .collect()
}

// ---------------------------------------------------------------------------
// Benchmarks
// ---------------------------------------------------------------------------

fn bench_classify(c: &mut Criterion) {
    c.bench_function("classify_fragments", |b| {
        b.iter(|| {
            for fragment in FRAGMENTS {
                black_box(classify(black_box(fragment)));
            }
        })
    });
}

fn bench_statement_shape(c: &mut Criterion) {
    c.bench_function("statement_shapes", |b| {
        b.iter(|| {
            for fragment in FRAGMENTS {
                black_box(statement_shape(black_box(fragment)));
            }
        })
    });
}

fn bench_split_classes(c: &mut Criterion) {
    c.bench_function("split_classes", |b| {
        b.iter(|| split_classes(black_box(CLASSES)))
    });
}

fn bench_synthesize_units(c: &mut Criterion) {
    let bindings = bindings(50);
    let methods: Vec<MethodDef> = (0..20)
        .map(|i| MethodDef {
            name: format!("m{}", i),
            params: vec!["int".into()],
            text: format!("static int m{}(int n) {{ return n + {}; }}", i, i),
        })
        .collect();

    c.bench_function("synthesize_expression_unit", |b| {
        b.iter(|| expression_unit("", black_box(&bindings), "v1 + v2"))
    });
    c.bench_function("synthesize_holder_unit", |b| {
        b.iter(|| holder_unit("", black_box(&bindings), black_box(&methods)))
    });
}

fn bench_session_fold(c: &mut Criterion) {
    c.bench_function("fold_ten_statements", |b| {
        b.iter(|| {
            let mut engine = Engine::new(VmService::in_memory());
            engine.evaluate("int acc = 0;");
            for i in 0..10 {
                engine.evaluate(black_box(&format!("acc = acc + {};", i)));
            }
            engine
        })
    });
}

fn bench_expression(c: &mut Criterion) {
    let mut engine = Engine::new(VmService::in_memory());
    engine.evaluate("int x = 21;");
    engine.evaluate("int twice(int n) { return n * 2; }");

    c.bench_function("dispatch_method_call", |b| {
        b.iter(|| engine.evaluate(black_box("twice(x)")))
    });
    c.bench_function("compile_expression", |b| {
        b.iter(|| engine.evaluate(black_box("x * 2 + 1")))
    });
}

criterion_group!(
    benches,
    bench_classify,
    bench_statement_shape,
    bench_split_classes,
    bench_synthesize_units,
    bench_session_fold,
    bench_expression,
);
criterion_main!(benches);
