//! Vectorizer Benchmarks
//!
//! Measures the cost of the pass itself and the interpreted speedup of the
//! code it produces.
//!
//! # Benchmark Categories
//!
//! 1. **Pass**: analysis and rewriting of a stencil loop per target
//! 2. **Execution**: scalar vs vectorized kernels in the reference interpreter

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use prism_vectorize::interp::{Interpreter, MachineConfig, Value};
use prism_vectorize::ir::{Function, FunctionBuilder, ScalarType, Type};
use prism_vectorize::{OptimizationPass, Vectorize, VectorizeConfig};

// =============================================================================
// Benchmark Helpers
// =============================================================================

/// `for i in 1..n-1: a[i] = b[i-1] + b[i] + b[i+1]`
fn stencil() -> Function {
    let mut b = FunctionBuilder::new("stencil", Type::Void);
    let a = b.param(Type::Ref(ScalarType::I32));
    let src = b.param(Type::Ref(ScalarType::I32));
    let n = b.param(Type::I32);
    let one = b.iconst(ScalarType::I32, 1);
    let limit = b.sub(n, one);
    let lp = b.counted_loop(ScalarType::I32, one, limit);
    let minus = b.iconst(ScalarType::I32, -1);
    let ilo = b.add(lp.index, minus);
    let left = b.array_get(src, ilo);
    let mid = b.array_get(src, lp.index);
    let ihi = b.add(lp.index, one);
    let right = b.array_get(src, ihi);
    let s = b.add(left, mid);
    let s = b.add(s, right);
    b.array_set(a, lp.index, s);
    b.close_loop(&lp, &[]);
    b.ret(None);
    b.finish()
}

fn configs() -> [(&'static str, VectorizeConfig); 4] {
    [
        ("sse42", VectorizeConfig::sse42()),
        ("avx2", VectorizeConfig::avx2()),
        ("avx512", VectorizeConfig::avx512()),
        ("sve512", VectorizeConfig::sve(512)),
    ]
}

// =============================================================================
// Pass Benchmarks
// =============================================================================

fn bench_pass(c: &mut Criterion) {
    let mut group = c.benchmark_group("pass");
    let f = stencil();

    for (name, config) in configs() {
        group.bench_with_input(BenchmarkId::new("stencil", name), &config, |b, config| {
            b.iter(|| {
                let mut g = f.clone();
                let mut pass = Vectorize::new(config.clone());
                black_box(pass.run(&mut g));
                g
            })
        });
    }

    group.finish();
}

// =============================================================================
// Execution Benchmarks
// =============================================================================

fn bench_execution(c: &mut Criterion) {
    let mut group = c.benchmark_group("execution");
    let scalar = stencil();
    let n = 4096usize;
    let input: Vec<i64> = (0..n as i64).collect();
    group.throughput(Throughput::Elements(n as u64));

    let mut kernels = vec![("scalar", scalar.clone())];
    for (name, config) in configs() {
        let mut g = scalar.clone();
        Vectorize::new(config).run(&mut g);
        kernels.push((name, g));
    }

    for (name, func) in &kernels {
        group.bench_with_input(BenchmarkId::new("stencil", name), func, |b, func| {
            b.iter(|| {
                let mut interp = Interpreter::new(MachineConfig::with_scalable_bits(512));
                let a = interp.alloc_ints(ScalarType::I32, &vec![0; n]);
                let src = interp.alloc_ints(ScalarType::I32, &input);
                black_box(interp.run(func, &[a, src, Value::int(n as i64)]))
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_pass, bench_execution);
criterion_main!(benches);
