//! Benchmarks for pipeline execution.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use genflow::core::{PipelineState, RunId};
use genflow::stages::{standard_descriptors, StageRegistry};
use genflow::testing::{ScriptedGenerationService, TestHarness, SAMPLE_INPUT};

fn pipeline_benchmark(c: &mut Criterion) {
    let Ok(runtime) = tokio::runtime::Runtime::new() else {
        return;
    };
    let Ok(harness) = TestHarness::four_stage(ScriptedGenerationService::new()) else {
        return;
    };

    c.bench_function("fresh_run", |b| {
        b.iter(|| {
            runtime.block_on(async {
                let report = harness
                    .engine
                    .start(RunId::generate(), PipelineState::new(SAMPLE_INPUT))
                    .await;
                black_box(report.is_ok())
            })
        });
    });

    let resumed = RunId::generate();
    let _ = runtime.block_on(
        harness
            .engine
            .start(resumed.clone(), PipelineState::new(SAMPLE_INPUT)),
    );
    c.bench_function("fully_checkpointed_run", |b| {
        b.iter(|| {
            runtime.block_on(async {
                let report = harness.engine.start(resumed.clone(), PipelineState::default()).await;
                black_box(report.is_ok())
            })
        });
    });

    c.bench_function("registry_validation", |b| {
        b.iter(|| {
            black_box(StageRegistry::new(standard_descriptors()).is_ok())
        });
    });
}

criterion_group!(benches, pipeline_benchmark);
criterion_main!(benches);
