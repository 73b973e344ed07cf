//! Benchmarks for method summarization and the whole-program fixpoint.
//!
//! Measures the three hot paths:
//! - the plain bytecode scan over a straight-line body
//! - the types-flow analysis over a branchy body with a virtual call
//! - the full analysis over a synthetic hierarchy of dispatching classes

extern crate cilgc;

use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;

use cilgc::metadata::layout;
use cilgc::prelude::*;

fn body(operations: Vec<Operation>) -> MethodBody {
    let (operations, _) = layout(operations);
    MethodBody {
        operations,
        max_stack: 8,
        ..MethodBody::default()
    }
}

/// A program with `classes` subclasses of one base, each overriding `Work`,
/// each constructed and dispatched against from the entry point.
fn dispatch_world(classes: u32) -> (WholeProgram, MethodId) {
    let mut b = ProgramBuilder::new();
    let app = b.add_assembly("Bench", true);

    let base = b.add_type(app, "Bench", "Base", None, TypeFlags::ABSTRACT);
    let work = b.add_method(
        base,
        "Work",
        MethodFlags::VIRTUAL | MethodFlags::ABSTRACT,
        Visibility::Public,
        Vec::new(),
    );

    let mut main_ops = Vec::new();
    let work_ref = b.method_ref(work);
    for i in 0..classes {
        let sub = b.add_type(app, "Bench", &format!("Worker{i}"), Some(base), TypeFlags::empty());
        let ctor = b.add_method(sub, ".ctor", MethodFlags::CONSTRUCTOR, Visibility::Public, Vec::new());
        b.add_method(sub, "Work", MethodFlags::VIRTUAL, Visibility::Public, Vec::new());
        let ctor_ref = b.method_ref(ctor);
        main_ops.push(Operation::new(OpCode::Newobj, Operand::Method(ctor_ref)));
        main_ops.push(Operation::new(OpCode::Callvirt, Operand::Method(work_ref)));
    }
    main_ops.push(Operation::new(OpCode::Ret, Operand::None));

    let program_type = b.add_class(app, "Bench", "Program");
    let main = b.add_method(
        program_type,
        "Main",
        MethodFlags::STATIC,
        Visibility::Public,
        Vec::new(),
    );
    b.set_body(main, body(main_ops));
    (b.finish(), main)
}

/// A single method with a loop, locals traffic, and one virtual call.
fn branchy_world() -> (WholeProgram, MethodId) {
    let mut b = ProgramBuilder::new();
    let app = b.add_assembly("Bench", true);

    let widget = b.add_class(app, "Bench", "Widget");
    let ctor = b.add_method(widget, ".ctor", MethodFlags::CONSTRUCTOR, Visibility::Public, Vec::new());
    let draw = b.add_method(widget, "Draw", MethodFlags::VIRTUAL, Visibility::Public, Vec::new());

    let program_type = b.add_class(app, "Bench", "Program");
    let subject = b.add_method(
        program_type,
        "Subject",
        MethodFlags::STATIC,
        Visibility::Public,
        Vec::new(),
    );
    let ctor_ref = b.method_ref(ctor);
    let draw_ref = b.method_ref(draw);
    let (operations, _) = layout(vec![
        Operation::new(OpCode::Newobj, Operand::Method(ctor_ref)),
        Operation::new(OpCode::Stloc, Operand::Local(0)),
        Operation::new(OpCode::LdcI4, Operand::I32(100)),
        Operation::new(OpCode::Stloc, Operand::Local(1)),
        // loop head
        Operation::new(OpCode::Ldloc, Operand::Local(1)),
        Operation::new(OpCode::Brfalse, Operand::Target(13)),
        Operation::new(OpCode::Ldloc, Operand::Local(0)),
        Operation::new(OpCode::Callvirt, Operand::Method(draw_ref)),
        Operation::new(OpCode::Ldloc, Operand::Local(1)),
        Operation::new(OpCode::LdcI4, Operand::I32(1)),
        Operation::new(OpCode::Sub, Operand::None),
        Operation::new(OpCode::Stloc, Operand::Local(1)),
        Operation::new(OpCode::Br, Operand::Target(4)),
        Operation::new(OpCode::Ret, Operand::None),
    ]);
    let object = b.system_object();
    b.set_body(
        subject,
        MethodBody {
            operations,
            max_stack: 4,
            locals: vec![widget, object],
            zero_init: true,
            ..MethodBody::default()
        },
    );
    (b.finish(), subject)
}

fn bench_bytecode_scan(c: &mut Criterion) {
    let (program, subject) = branchy_world();
    let summarizer = BytecodeSummarizer::new();

    c.bench_function("summarize_bytecode_scan", |b| {
        b.iter(|| {
            let summary = summarizer.summarize(black_box(&program), subject).unwrap();
            black_box(summary)
        });
    });
}

fn bench_types_flow(c: &mut Criterion) {
    let (program, subject) = branchy_world();
    let summarizer = TypesFlowSummarizer::new();

    c.bench_function("summarize_types_flow", |b| {
        b.iter(|| {
            let summary = summarizer.summarize(black_box(&program), subject).unwrap();
            black_box(summary)
        });
    });
}

fn bench_whole_program(c: &mut Criterion) {
    let (program, main) = dispatch_world(100);

    c.bench_function("rta_100_dispatching_classes", |b| {
        b.iter(|| {
            let analysis =
                RapidTypeAnalysis::new(black_box(&program), AnalysisOptions::default());
            let results = analysis.run(&[main]).unwrap();
            black_box(results)
        });
    });
}

criterion_group!(
    benches,
    bench_bytecode_scan,
    bench_types_flow,
    bench_whole_program
);
criterion_main!(benches);
