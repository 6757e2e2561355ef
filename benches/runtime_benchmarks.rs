//! Performance benchmarks for the spreadcall runtime
//!
//! Run with: cargo bench
//!
//! These benchmarks compare spread calls on the optimized path against the
//! baseline iterator protocol, plus a few general interpreter workloads.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use spreadcall::jit::OptimizerConfig;
use spreadcall::{Runtime, RuntimeConfig};

const SPREAD_SETUP: &str = r#"
    function add(a, b, c) { return a + b + c; }
    function call(arr) { return add(...arr); }
    var xs = [1, 2, 3];
    function loop(n) {
        var sum = 0;
        for (var i = 0; i < n; i++) { sum += call(xs); }
        return sum;
    }
"#;

fn runtime_with(optimizer: OptimizerConfig) -> Runtime {
    let mut runtime = Runtime::with_config(RuntimeConfig {
        optimizer,
        ..RuntimeConfig::default()
    });
    runtime.eval(SPREAD_SETUP).unwrap();
    runtime
}

/// Benchmark: runtime initialization, including realm setup
fn bench_cold_start(c: &mut Criterion) {
    c.bench_function("cold_start", |b| {
        b.iter(|| {
            let runtime = Runtime::new();
            black_box(runtime)
        })
    });
}

/// Benchmark: the same spread-call loop with and without the optimizer
fn bench_spread_calls(c: &mut Criterion) {
    let mut group = c.benchmark_group("spread_calls");
    let iterations = 1000u64;
    group.throughput(Throughput::Elements(iterations));

    let configs = [
        ("optimized", OptimizerConfig::default().with_warmup_threshold(1)),
        ("baseline", OptimizerConfig::default().with_enabled(false)),
    ];
    for (name, config) in configs {
        group.bench_with_input(BenchmarkId::new(name, iterations), &iterations, |b, &n| {
            let mut runtime = runtime_with(config.clone());
            let code = format!("loop({});", n);
            b.iter(|| runtime.eval(black_box(&code)).unwrap())
        });
    }

    group.finish();
}

/// Benchmark: spread into array literals of growing size
fn bench_array_spread(c: &mut Criterion) {
    let mut group = c.benchmark_group("array_spread");

    for size in [10, 100, 1000] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let mut runtime = Runtime::new();
            runtime
                .eval(&format!(
                    "var src = []; for (var i = 0; i < {}; i++) {{ src.push(i); }}",
                    size
                ))
                .unwrap();
            b.iter(|| runtime.eval(black_box("[...src, ...src].length;")).unwrap())
        });
    }

    group.finish();
}

/// Benchmark: compilation without execution
fn bench_compile(c: &mut Criterion) {
    c.bench_function("compile_spread_setup", |b| {
        b.iter(|| spreadcall::bytecode::compile(black_box(SPREAD_SETUP)).unwrap())
    });
}

/// Benchmark: plain calls and arithmetic
fn bench_interpreter(c: &mut Criterion) {
    let mut group = c.benchmark_group("interpreter");

    group.bench_function("fibonacci_15", |b| {
        let mut runtime = Runtime::new();
        runtime
            .eval("function fib(n) { return n < 2 ? n : fib(n - 1) + fib(n - 2); }")
            .unwrap();
        b.iter(|| runtime.eval(black_box("fib(15);")).unwrap())
    });

    group.bench_function("property_loop", |b| {
        let mut runtime = Runtime::new();
        b.iter(|| {
            runtime
                .eval(black_box(
                    "var o = { n: 0 }; for (var i = 0; i < 1000; i++) { o.n += i; } o.n;",
                ))
                .unwrap()
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_cold_start,
    bench_spread_calls,
    bench_array_spread,
    bench_compile,
    bench_interpreter,
);

criterion_main!(benches);
