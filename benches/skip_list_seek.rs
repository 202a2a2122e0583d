//! Seek performance over a large posting list: does `advance_to` actually
//! use the skip list rather than degrading to a linear scan.
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use vaultweave::posting_dumper::{PostingBag, PostingListDumper};
use vaultweave::posting_iterator::PostingList;

const NUM_DOCS: u32 = 10_000;

fn build_large_posting_list() -> Vec<u8> {
    let mut dumper = PostingListDumper::new();
    for doc_id in 0..NUM_DOCS {
        dumper.add_bag(&PostingBag {
            doc_id,
            positions: vec![doc_id % 37],
            offsets: vec![],
        });
    }
    let mut out = Vec::new();
    dumper.encode(&mut out).unwrap();
    out
}

fn bench_seek_to_end(c: &mut Criterion) {
    let bytes = build_large_posting_list();
    let (list, _) = PostingList::decode(&bytes).unwrap();

    c.bench_function("advance_to last doc in 10k posting list", |b| {
        b.iter(|| {
            let mut it = list.iter();
            it.advance_to(black_box(NUM_DOCS - 1)).unwrap();
            black_box(it.doc_id().unwrap())
        });
    });
}

fn bench_seek_midpoint(c: &mut Criterion) {
    let bytes = build_large_posting_list();
    let (list, _) = PostingList::decode(&bytes).unwrap();

    c.bench_function("advance_to midpoint in 10k posting list", |b| {
        b.iter(|| {
            let mut it = list.iter();
            it.advance_to(black_box(NUM_DOCS / 2)).unwrap();
            black_box(it.doc_id().unwrap())
        });
    });
}

criterion_group!(benches, bench_seek_to_end, bench_seek_midpoint);
criterion_main!(benches);
