use std::hint::black_box;

use bytes::{Bytes, BytesMut};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use zumbus::{
    transport::{encode_frames, MultipartDecoder},
    Envelope, EnvelopeLayout,
};

fn envelope_frames(payload_len: usize) -> Vec<Bytes> {
    Envelope::new(Some("chat:lobby"), "chat-message", vec![7u8; payload_len])
        .to_frames(EnvelopeLayout::ThreePart)
        .unwrap()
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("frames/encode");
    for size in [64usize, 4096, 1024 * 1024] {
        let frames = envelope_frames(size);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &frames, |b, frames| {
            b.iter(|| encode_frames(black_box(frames)).unwrap())
        });
    }
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("frames/decode");
    for size in [64usize, 4096, 1024 * 1024] {
        let raw = encode_frames(&envelope_frames(size)).unwrap();
        group.throughput(Throughput::Bytes(raw.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &raw, |b, raw| {
            b.iter(|| {
                let mut buf = BytesMut::from(&raw[..]);
                MultipartDecoder::new().decode(&mut buf).unwrap().unwrap()
            })
        });
    }
    group.finish();
}

fn bench_envelope(c: &mut Criterion) {
    let frames = envelope_frames(256);
    c.bench_function("envelope/from_frames three_part", |b| {
        b.iter(|| Envelope::from_frames(black_box(&frames), EnvelopeLayout::ThreePart).unwrap())
    });
}

criterion_group!(benches, bench_encode, bench_decode, bench_envelope);
criterion_main!(benches);
