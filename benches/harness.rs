//! Benchmarks for the compile and run pipeline.
//!
//! - Compilation of a small script (parse check plus lowering)
//! - Syntax tree rendering of the same script
//! - A complete harness run, with and without the post-run collection

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use luaubox::{
    frontend::{compile, parse_to_tree},
    runner::{Harness, HarnessConfig},
};
use std::hint::black_box;

const SCRIPT: &str = r#"
-- build and fold a small table
local values = {}
for i = 1, 200 do
    values[i] = i * i
end

local total = 0
for _, v in ipairs(values) do
    total += v
end

return total
"#;

fn bench_frontend(c: &mut Criterion) {
    let mut group = c.benchmark_group("frontend");
    group.throughput(Throughput::Bytes(SCRIPT.len() as u64));
    group.bench_function("compile", |b| {
        b.iter(|| black_box(compile(black_box(SCRIPT))));
    });
    group.bench_function("parse_to_tree", |b| {
        b.iter(|| black_box(parse_to_tree(black_box(SCRIPT)).unwrap()));
    });
    group.finish();
}

fn bench_run(c: &mut Criterion) {
    let bytecode = compile(SCRIPT).into_result().unwrap();

    let mut group = c.benchmark_group("run");
    let harness = Harness::new(HarnessConfig::relaxed()).unwrap();
    group.bench_function("collect", |b| {
        b.iter(|| black_box(harness.run_bytecode(black_box(&bytecode)).unwrap()));
    });

    let harness =
        Harness::new(HarnessConfig::relaxed().with_collect_after_run(false)).unwrap();
    group.bench_function("no_collect", |b| {
        b.iter(|| black_box(harness.run_bytecode(black_box(&bytecode)).unwrap()));
    });
    group.finish();
}

criterion_group!(benches, bench_frontend, bench_run);
criterion_main!(benches);
