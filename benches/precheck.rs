//! Pre-check Latency Benchmark (Criterion)
//!
//! Measures the synchronous pre-check path: detection, rule evaluation and
//! context creation.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use llm_governance_gateway::core::Evaluator;
use llm_governance_gateway::{Config, Detector, GovernanceEngine, PreCheckRequest, RuleSet};

const QUERIES: &[(&str, &str)] = &[
    ("clean", "What is the capital of France?"),
    ("ssn", "Process refund for customer with SSN 123-45-6789"),
    (
        "mixed",
        "Email jane.doe@example.com or call +1 415 555 0134 about card 4111 1111 1111 1111",
    ),
    ("sqli", "name' OR '1'='1'; DROP TABLE users; --"),
];

fn benchmark_detect(c: &mut Criterion) {
    let detector = Detector::new().expect("detector");
    let mut group = c.benchmark_group("detect");

    for (name, query) in QUERIES {
        group.throughput(Throughput::Bytes(query.len() as u64));
        group.bench_with_input(BenchmarkId::new("query", name), query, |b, query| {
            b.iter(|| std::hint::black_box(detector.detect(query)));
        });
    }

    let long = "lorem ipsum dolor sit amet ".repeat(400);
    group.throughput(Throughput::Bytes(long.len() as u64));
    group.bench_function("long_clean", |b| {
        b.iter(|| std::hint::black_box(detector.detect(&long)));
    });

    group.finish();
}

fn benchmark_evaluate(c: &mut Criterion) {
    let detector = Detector::new().expect("detector");
    let findings = detector.detect(QUERIES[2].1);
    let policy = RuleSet::default().resolve("default");
    let evaluator = Evaluator::new();

    c.bench_function("evaluate_mixed", |b| {
        b.iter(|| std::hint::black_box(evaluator.evaluate(&findings, &policy)));
    });
}

fn benchmark_pre_check(c: &mut Criterion) {
    let mut config = Config::default();
    config.context.max_entries = 50_000_000;
    config.telemetry.enabled = false;

    let runtime = tokio::runtime::Runtime::new().expect("runtime");
    let engine = runtime
        .block_on(GovernanceEngine::builder().with_config(config).build())
        .expect("engine");

    let mut group = c.benchmark_group("pre_check");
    for (name, query) in QUERIES {
        let request = PreCheckRequest::new("bench-user", *query);
        group.bench_with_input(BenchmarkId::new("query", name), &request, |b, request| {
            b.iter(|| std::hint::black_box(engine.pre_check(request)));
        });
    }
    group.finish();
}

criterion_group!(benches, benchmark_detect, benchmark_evaluate, benchmark_pre_check);
criterion_main!(benches);
