//! Benchmark: construct message trees from synthetic access logs (one context per field,
//! fields of 1..16 bytes, periodic re-reads), then insert random candidates into a built tree.
//! Also measures text-trace parsing of the same log.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use protoinfer::trace;
use protoinfer::{AccessEvent, AccessLog, MsgTree, Span, StackHashComparator};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const MESSAGE_SIZE: usize = 4096;

fn synthetic_log(size: usize, seed: u64) -> AccessLog {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut events = Vec::new();
    let mut fields = Vec::new();
    let mut pos = 0usize;
    let mut ctx = 0u32;
    while pos < size {
        let len = rng.gen_range(1..=16usize).min(size - pos);
        fields.push((pos, len, ctx));
        pos += len;
        ctx += 1;
    }
    for pass in 0..3 {
        for (i, &(start, len, ctx)) in fields.iter().enumerate() {
            if pass > 0 && i % (pass + 1) != 0 {
                continue;
            }
            for o in start..start + len {
                events.push(AccessEvent::new(o, ctx));
            }
        }
    }
    events.into_iter().collect()
}

fn bench_construct(c: &mut Criterion) {
    let log = synthetic_log(MESSAGE_SIZE, 42);
    let tree = MsgTree::construct(MESSAGE_SIZE, &log, &StackHashComparator).expect("construct");
    eprintln!(
        "construct: {} events, {} nodes, {} diagnostics (one warm-up pass)",
        log.len(),
        tree.node_count(),
        tree.diagnostics().len()
    );

    c.bench_function("construct_4k_message", |b| {
        b.iter(|| {
            let tree = MsgTree::construct(MESSAGE_SIZE, black_box(&log), &StackHashComparator)
                .expect("construct");
            black_box(tree.node_count())
        });
    });

    let mut rng = StdRng::seed_from_u64(7);
    let candidates: Vec<Span> = (0..256)
        .map(|_| {
            let l = rng.gen_range(0..MESSAGE_SIZE);
            let len = rng.gen_range(1..=32usize);
            Span::new(l, (l + len - 1).min(MESSAGE_SIZE - 1))
        })
        .collect();
    c.bench_function("insert_256_candidates", |b| {
        b.iter(|| {
            let mut t = tree.clone();
            for &s in &candidates {
                t.insert(black_box(s)).expect("insert");
            }
            black_box(t.node_count())
        });
    });

    let text = trace::format_text(&log);
    c.bench_function("parse_text_trace", |b| {
        b.iter(|| {
            let log = trace::parse_text(black_box(&text), None).expect("parse");
            black_box(log.len())
        });
    });
}

criterion_group!(benches, bench_construct);
criterion_main!(benches);
