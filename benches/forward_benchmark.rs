use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use dialograph::config::{GraphEmbeddingConfig, RaterConfig};
use dialograph::embed::PrecomputedEncoder;
use dialograph::graph::{DialogEdge, DialogGraph, GraphBatch, Utterance};
use dialograph::model::{DialogModel, DialogRater, GraphEmbedding};
use dialograph::ComputeDevice;

const EMBED: usize = 384;

fn dialog(turns: usize, seed: usize) -> DialogGraph {
    let utterances = (0..turns)
        .map(|t| Utterance::Embedding((0..EMBED).map(|k| (((seed + t) * 31 + k) % 17) as f32 / 17.0).collect()))
        .collect();
    let mut edges = Vec::new();
    for t in 1..turns {
        edges.push(DialogEdge::new(t - 1, t, (t % 9) as u16));
        if t >= 2 {
            edges.push(DialogEdge::new(t - 2, t, 8u16));
        }
    }
    DialogGraph::new(utterances, edges, 9).unwrap()
}

/// Benchmark graph embedding forward pass over growing batches
fn bench_graph_embedding(c: &mut Criterion) {
    let mut group = c.benchmark_group("graph_embedding_forward");
    let encoder = PrecomputedEncoder::new(EMBED);

    for device in [ComputeDevice::Cpu, ComputeDevice::Cuda(0)] {
        let model = GraphEmbedding::new(GraphEmbeddingConfig {
            n_layers: 2,
            device,
            ..GraphEmbeddingConfig::default()
        })
        .unwrap();

        for batch_size in [1usize, 8, 32].iter() {
            let dialogs: Vec<DialogGraph> = (0..*batch_size).map(|i| dialog(10, i)).collect();
            let batch = GraphBatch::from_graphs(&dialogs);
            let id = BenchmarkId::new(format!("{device:?}"), batch_size);
            group.bench_with_input(id, &batch, |b, batch| {
                b.iter(|| model.forward(&encoder, batch).unwrap());
            });
        }
    }
    group.finish();
}

/// Benchmark a rater forward pass with backpropagation to every parameter
fn bench_rater_step(c: &mut Criterion) {
    let encoder = PrecomputedEncoder::new(EMBED);
    let rater = DialogRater::new(RaterConfig {
        graph: GraphEmbeddingConfig {
            n_layers: 2,
            ..GraphEmbeddingConfig::default()
        },
        ..RaterConfig::default()
    })
    .unwrap();
    let dialogs: Vec<DialogGraph> = (0..16).map(|i| dialog(10, i)).collect();
    let batch = GraphBatch::from_graphs(&dialogs);

    c.bench_function("rater_forward_backward", |b| {
        b.iter(|| {
            let scores = rater.forward(&encoder, &batch).unwrap();
            scores.sum_all().unwrap().backward().unwrap()
        });
    });
}

criterion_group!(benches, bench_graph_embedding, bench_rater_step);
criterion_main!(benches);
