use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::{rngs::SmallRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use zumbus::{BinaryCodec, Codec, JsonCodec, MsgPackCodec};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    from: String,
    room: String,
    text: String,
    sent_at: u64,
}

fn message(text_len: usize) -> ChatMessage {
    let mut rng = SmallRng::seed_from_u64(42);
    let text = (0..text_len)
        .map(|_| rng.gen_range(b'a'..=b'z') as char)
        .collect();
    ChatMessage {
        from: "alice".to_string(),
        room: "chat:lobby".to_string(),
        text,
        sent_at: 1_700_000_000,
    }
}

fn bench_codec<C: Codec>(
    c: &mut Criterion,
    codec: C,
) {
    let mut group = c.benchmark_group(format!("codec/{}", codec.name()));
    for size in [16usize, 1024, 64 * 1024] {
        let msg = message(size);
        let encoded = codec.encode(&msg).unwrap();
        group.throughput(Throughput::Bytes(encoded.len() as u64));

        group.bench_with_input(BenchmarkId::new("encode", size), &msg, |b, msg| {
            b.iter(|| codec.encode(black_box(msg)).unwrap())
        });
        group.bench_with_input(BenchmarkId::new("decode", size), &encoded, |b, bytes| {
            b.iter(|| codec.decode::<ChatMessage>(black_box(bytes)).unwrap())
        });
    }
    group.finish();
}

fn bench_codecs(c: &mut Criterion) {
    bench_codec(c, BinaryCodec);
    bench_codec(c, JsonCodec);
    bench_codec(c, MsgPackCodec);
}

criterion_group!(benches, bench_codecs);
criterion_main!(benches);
