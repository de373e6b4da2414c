use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use flowgrid::config::{EngineConfig, LayoutConfig};
use flowgrid::layout::plan_relayout;
use flowgrid::model::{EdgeInput, FlowDocument, NodeInput, NodeKind};
use flowgrid::sync::GraphStateSync;
use flowgrid::InMemoryHost;
use std::hint::black_box;

/// Chain flow: start -> sms -> sms -> ... with a fan of `width` children
/// hanging off every tenth node.
fn generated_flow(length: usize, width: usize) -> FlowDocument {
    let mut document = FlowDocument::default();
    document
        .nodes
        .push(NodeInput::of_kind(NodeKind::Start).with_id("n0"));
    for index in 1..length {
        document.nodes.push(
            NodeInput::of_kind(NodeKind::Sms)
                .with_id(&format!("n{index}"))
                .at(400.0, 100.0 + index as f64 * 150.0),
        );
        document.edges.push(EdgeInput::between(
            &format!("n{}", index - 1),
            &format!("n{index}"),
        ));
        if index % 10 == 0 {
            for leaf in 0..width {
                let id = format!("n{index}-leaf{leaf}");
                document.nodes.push(
                    NodeInput::of_kind(NodeKind::Email)
                        .with_id(&id)
                        .at(600.0 + leaf as f64 * 200.0, 100.0 + index as f64 * 150.0),
                );
                document
                    .edges
                    .push(EdgeInput::between(&format!("n{index}"), &id));
            }
        }
    }
    document
}

fn loaded_engine(document: &FlowDocument) -> GraphStateSync<InMemoryHost> {
    let config = EngineConfig::default();
    let host = InMemoryHost::new(config.canvas.min_size.width, config.canvas.min_size.height);
    let mut sync = GraphStateSync::new(host, config);
    let summary = sync.load_flow(document);
    assert_eq!(summary.skipped, 0, "generated flow must load cleanly");
    sync
}

fn bench_plan(c: &mut Criterion) {
    let mut group = c.benchmark_group("plan_relayout");
    let config = LayoutConfig::default();
    for (length, width) in [(50usize, 4usize), (200, 8), (500, 12)] {
        let name = format!("chain_{length}_fan_{width}");
        let sync = loaded_engine(&generated_flow(length, width));
        let nodes = sync.nodes().to_vec();
        let edges = sync.edges().to_vec();
        group.bench_with_input(
            BenchmarkId::from_parameter(name),
            &(nodes, edges),
            |b, (nodes, edges)| {
                b.iter(|| {
                    let plan = plan_relayout(&config, black_box(nodes), black_box(edges));
                    black_box(plan.placed());
                });
            },
        );
    }
    group.finish();
}

fn bench_load(c: &mut Criterion) {
    let mut group = c.benchmark_group("load_flow");
    for (length, width) in [(50usize, 4usize), (200, 8)] {
        let name = format!("chain_{length}_fan_{width}");
        let document = generated_flow(length, width);
        group.bench_with_input(
            BenchmarkId::from_parameter(name),
            &document,
            |b, document| {
                b.iter(|| {
                    let sync = loaded_engine(black_box(document));
                    black_box(sync.nodes().len());
                });
            },
        );
    }
    group.finish();
}

fn bench_full_relayout(c: &mut Criterion) {
    let mut group = c.benchmark_group("relayout_apply");
    for (length, width) in [(50usize, 4usize), (200, 8)] {
        let name = format!("chain_{length}_fan_{width}");
        let document = generated_flow(length, width);
        group.bench_with_input(
            BenchmarkId::from_parameter(name),
            &document,
            |b, document| {
                b.iter(|| {
                    let mut sync = loaded_engine(document);
                    let summary = sync.relayout().expect("relayout failed");
                    black_box(summary.placed);
                });
            },
        );
    }
    group.finish();
}

criterion_group!(
    name = benches;
    config = Criterion::default();
    targets = bench_plan, bench_load, bench_full_relayout
);
criterion_main!(benches);
