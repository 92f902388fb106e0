//! Benchmarks for method translation.
//!
//! Covers the pipeline stages on synthetic method bodies:
//! - Decoding of a long straight-line body
//! - Full translation of a loop with stack merges
//! - `finally` inlining with many exits
//! - Batch translation, sequential and parallel

extern crate ciltac;

use ciltac::prelude::*;
use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;

/// `arg0 + arg1` folded a thousand times into local 0.
fn straight_line() -> MethodDescriptor {
    let mut encoder = InstructionEncoder::new();
    for _ in 0..1000 {
        encoder.emit_ldarg(0).unwrap();
        encoder.emit_ldarg(1).unwrap();
        encoder.emit_instruction("add", None).unwrap();
        encoder.emit_ldloc(0).unwrap();
        encoder.emit_instruction("mul", None).unwrap();
        encoder.emit_stloc(0).unwrap();
    }
    encoder.emit_ldloc(0).unwrap();
    encoder.emit_instruction("ret", None).unwrap();
    let (code, _) = encoder.finalize().unwrap();

    MethodDescriptor::new("Straight", Token::new(0x0600_0001))
        .with_params(vec![TacType::I32, TacType::I32])
        .with_locals(vec![TacType::I32])
        .with_return(TacType::I32)
        .with_code(code)
}

/// Counting loop carrying a value on the stack across its back edge.
/// Signature: int Loop(int n)
fn stack_loop() -> MethodDescriptor {
    let mut encoder = InstructionEncoder::new();
    encoder.emit_ldc_i4(0).unwrap();
    encoder.define_label("head").unwrap();
    encoder.emit_ldc_i4(1).unwrap();
    encoder.emit_instruction("add", None).unwrap();
    encoder.emit_instruction("dup", None).unwrap();
    encoder.emit_ldarg(0).unwrap();
    encoder.emit_branch("blt", "head").unwrap();
    encoder.emit_instruction("ret", None).unwrap();
    let (code, _) = encoder.finalize().unwrap();

    MethodDescriptor::new("Loop", Token::new(0x0600_0002))
        .with_params(vec![TacType::I32])
        .with_return(TacType::I32)
        .with_code(code)
}

/// A `switch` with 64 cases, each leaving a `try` guarded by a `finally`.
fn many_exits() -> MethodDescriptor {
    let cases: Vec<String> = (0..64).map(|case| format!("case{case}")).collect();
    let labels: Vec<&str> = cases.iter().map(String::as_str).collect();

    let mut encoder = InstructionEncoder::new();
    encoder.emit_ldarg(0).unwrap();
    encoder.emit_switch(&labels).unwrap();
    encoder.emit_branch("leave", "end").unwrap();
    for case in &labels {
        encoder.define_label(case).unwrap();
        encoder.emit_branch("leave", "end").unwrap();
    }
    encoder.define_label("finally").unwrap();
    encoder.emit_ldarg(0).unwrap();
    encoder.emit_instruction("pop", None).unwrap();
    encoder.emit_instruction("endfinally", None).unwrap();
    encoder.define_label("end").unwrap();
    encoder.emit_instruction("ret", None).unwrap();
    let (code, offsets) = encoder.finalize().unwrap();

    let finally = offsets["finally"];
    MethodDescriptor::new("Exits", Token::new(0x0600_0003))
        .with_params(vec![TacType::I32])
        .with_code(code)
        .with_handlers(vec![ExceptionHandler::finally(
            0,
            finally,
            finally,
            offsets["end"] - finally,
        )])
}

fn bench_decode_straight_line(c: &mut Criterion) {
    let method = straight_line();
    let resolver = MemoryResolver::new();

    c.bench_function("decode_straight_line", |b| {
        b.iter(|| {
            let list = ciltac::assembly::decode_method(
                black_box(&method.code),
                method.token,
                &resolver,
            )
            .unwrap();
            black_box(list)
        });
    });
}

fn bench_translate_straight_line(c: &mut Criterion) {
    let method = straight_line();
    let resolver = MemoryResolver::new();
    let join = TypeHierarchy::new();
    let config = TranslationConfig::minimal();

    c.bench_function("translate_straight_line", |b| {
        b.iter(|| {
            let tac = translate_method(black_box(&method), &resolver, &join, &config).unwrap();
            black_box(tac)
        });
    });
}

fn bench_translate_loop(c: &mut Criterion) {
    let method = stack_loop();
    let resolver = MemoryResolver::new();
    let join = TypeHierarchy::new();
    let config = TranslationConfig::default();

    c.bench_function("translate_loop_merges", |b| {
        b.iter(|| {
            let tac = translate_method(black_box(&method), &resolver, &join, &config).unwrap();
            black_box(tac)
        });
    });
}

fn bench_inline_finally(c: &mut Criterion) {
    let method = many_exits();
    let resolver = MemoryResolver::new();
    let join = TypeHierarchy::new();
    let config = TranslationConfig::default();

    c.bench_function("inline_finally_64_exits", |b| {
        b.iter(|| {
            let tac = translate_method(black_box(&method), &resolver, &join, &config).unwrap();
            black_box(tac)
        });
    });
}

fn bench_batch(c: &mut Criterion) {
    let methods: Vec<MethodDescriptor> = (0..64)
        .map(|index| match index % 3 {
            0 => straight_line(),
            1 => stack_loop(),
            _ => many_exits(),
        })
        .collect();
    let resolver = MemoryResolver::new();
    let join = TypeHierarchy::new();

    let mut group = c.benchmark_group("batch");
    group.bench_function("sequential", |b| {
        let config = TranslationConfig::minimal();
        b.iter(|| black_box(translate_methods(black_box(&methods), &resolver, &join, &config)));
    });
    group.bench_function("parallel", |b| {
        let config = TranslationConfig::default();
        b.iter(|| black_box(translate_methods(black_box(&methods), &resolver, &join, &config)));
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_decode_straight_line,
    bench_translate_straight_line,
    bench_translate_loop,
    bench_inline_finally,
    bench_batch
);
criterion_main!(benches);
