//! Codec benchmarks for chatrelay-protocol.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use chatrelay_protocol::{codec, Envelope};

fn bench_encode_chat(c: &mut Criterion) {
    let envelope = Envelope::chat("alice", "public", "x".repeat(64));

    let mut group = c.benchmark_group("encode");
    group.throughput(Throughput::Bytes(64));
    group.bench_function("chat_64B", |b| {
        b.iter(|| codec::encode(black_box(&envelope)))
    });
    group.finish();
}

fn bench_decode_chat(c: &mut Criterion) {
    let envelope = Envelope::chat("alice", "public", "x".repeat(64));
    let encoded = codec::encode(&envelope).unwrap();

    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Bytes(encoded.len() as u64));
    group.bench_function("chat_64B", |b| b.iter(|| codec::decode(black_box(&encoded))));
    group.finish();
}

fn bench_roundtrip(c: &mut Criterion) {
    let envelope = Envelope::chat("alice", "some:longer:channel", "x".repeat(256));

    c.bench_function("roundtrip_256B", |b| {
        b.iter(|| {
            let encoded = codec::encode(black_box(&envelope)).unwrap();
            codec::decode(black_box(&encoded)).unwrap()
        })
    });
}

criterion_group!(benches, bench_encode_chat, bench_decode_chat, bench_roundtrip);
criterion_main!(benches);
