//! Criterion benchmarks for the step-loop hot paths: compiled expression
//! evaluation and full engine steps.

use criterion::{criterion_group, criterion_main, Criterion};
use pendlab_core::{
    BackendKind, DynamicsEngine, ExprContext, ModelSpec, SegmentParams, State,
};

fn double_rod() -> ModelSpec {
    ModelSpec::build(vec![
        SegmentParams::uniform_rod(1.0, 1.0),
        SegmentParams::uniform_rod(1.0, 1.0),
    ])
    .expect("valid model")
}

fn bench_expression_eval(c: &mut Criterion) {
    let ctx = ExprContext::new(["t", "theta1", "theta2", "omega1", "omega2"]);
    let compiled = ctx
        .compile("0.5 * sin(2 * t) + clamp(omega1, -1, 1) * 0.1")
        .expect("benchmark expression compiles");
    let values = [0.37, 1.1, -0.4, 0.9, -2.3];
    let mut stack = Vec::with_capacity(16);

    c.bench_function("compiled_expression_eval", |b| {
        b.iter(|| {
            compiled
                .eval_with(std::hint::black_box(&values), &mut stack)
                .expect("evaluates")
        })
    });
}

fn bench_engine_step(c: &mut Criterion) {
    for (name, kind) in [
        ("step_closed_form", BackendKind::ClosedForm),
        ("step_rigid_body", BackendKind::RigidBody),
    ] {
        c.bench_function(name, |b| {
            let mut engine = DynamicsEngine::new(
                double_rod(),
                kind,
                State::new(vec![1.0, 0.5], vec![0.0, 0.0]),
            )
            .expect("engine builds");
            engine
                .set_forcing(0, "0.2 * sin(3 * t)")
                .expect("forcing compiles");
            b.iter(|| engine.step(1e-3).expect("steps"));
        });
    }
}

criterion_group!(benches, bench_expression_eval, bench_engine_step);
criterion_main!(benches);
