//! Compile and execution benchmarks for the bytecode core.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use xray::lexer::Scanner;
use xray::object::Strings;
use xray::parser::Parser;
use xray::vm::{compile, Vm};

fn parse(source: &str) -> xray::ast::Program {
    let tokens = Scanner::new(source).scan_tokens().expect("lexer error");
    Parser::new(tokens).parse().expect("parser error")
}

fn run_vm(source: &str) {
    let program = parse(source);
    let mut strings = Strings::new();
    let proto = compile(&program, &mut strings).expect("compile error");
    let mut vm = Vm::new();
    vm.execute(proto).expect("vm runtime error");
}

fn fib_source(n: i64) -> String {
    format!(
        r#"
function fib(n) {{
    if (n <= 1) {{
        return n;
    }}
    return fib(n - 1) + fib(n - 2);
}}
fib({n});
"#
    )
}

fn loop_sum_source() -> &'static str {
    r#"
let sum = 0;
for (let i = 0; i < 100000; i = i + 1) {
    sum = sum + i;
}
sum;
"#
}

fn fib_recursive(c: &mut Criterion) {
    let source = fib_source(20);
    c.bench_function("fib_recursive", |b| b.iter(|| run_vm(black_box(&source))));
}

fn loop_sum(c: &mut Criterion) {
    let source = loop_sum_source();
    c.bench_function("loop_sum", |b| b.iter(|| run_vm(black_box(source))));
}

fn fib_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("fib_scaling");
    for n in [10, 15, 20].iter() {
        let source = fib_source(*n);
        group.bench_with_input(BenchmarkId::new("vm", n), &source, |b, src| {
            b.iter(|| run_vm(black_box(src)))
        });
    }
    group.finish();
}

fn compilation_overhead(c: &mut Criterion) {
    let mut group = c.benchmark_group("compilation_overhead");

    let source = fib_source(20);
    let program = parse(&source);
    group.bench_function("compile_fib", |b| {
        b.iter(|| {
            let mut strings = Strings::new();
            compile(black_box(&program), &mut strings).unwrap()
        })
    });

    let source = loop_sum_source();
    let program = parse(source);
    group.bench_function("compile_loop", |b| {
        b.iter(|| {
            let mut strings = Strings::new();
            compile(black_box(&program), &mut strings).unwrap()
        })
    });

    group.finish();
}

criterion_group!(benches, fib_recursive, loop_sum, fib_scaling, compilation_overhead);
criterion_main!(benches);
