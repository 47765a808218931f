//! Throughput benchmark for structural chunking, the single largest
//! component in the analysis pipeline: every document passes through it
//! before any LLM call is made.

use contract_review_engine::chunking::{Chunker, ChunkerConfig, StructuralChunker};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

/// Builds a synthetic bilingual contract of roughly `articles` numbered
/// sections, each with a Chinese header and a few sentences of body text.
fn generate_contract(articles: usize) -> String {
    let mut text = String::new();
    for i in 1..=articles {
        text.push_str(&format!(
            "第{i}条 条款标题{i}\n\
             本条款约定双方在本合同项下的权利义务，包括但不限于履行期限、\
             付款方式及违约责任。任何一方未按约定履行的，应承担相应的违约责任，\
             并赔偿由此给对方造成的实际损失。\n\n"
        ));
    }
    text
}

fn bench_chunk_throughput(c: &mut Criterion) {
    let chunker = StructuralChunker::default();
    let mut group = c.benchmark_group("structural_chunk");

    for articles in [10, 100, 1_000] {
        let text = generate_contract(articles);
        group.throughput(Throughput::Bytes(text.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(articles), &text, |b, text| {
            b.iter(|| {
                let chunks = chunker.chunk(black_box(text)).expect("chunk failed");
                black_box(chunks);
            });
        });
    }

    group.finish();
}

fn bench_chunk_config_variants(c: &mut Criterion) {
    let text = generate_contract(200);
    let mut group = c.benchmark_group("structural_chunk_config");

    let configs = [
        ("default", ChunkerConfig::default()),
        ("small_chunks", ChunkerConfig::new(1_000, 100, 200)),
        ("large_chunks", ChunkerConfig::new(20_000, 500, 2_000)),
    ];

    for (label, config) in configs {
        let chunker = StructuralChunker::new(config);
        group.bench_function(label, |b| {
            b.iter(|| {
                let chunks = chunker.chunk(black_box(&text)).expect("chunk failed");
                black_box(chunks);
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_chunk_throughput, bench_chunk_config_variants);
criterion_main!(benches);
