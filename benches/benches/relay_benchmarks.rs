use std::time::Duration;

use bytes::Bytes;
use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use tokio::runtime::Runtime;
use zumbus::{
    transport::{PushSocket, SubSocket, WireMessage, DEFAULT_CONNECT_TIMEOUT},
    Hub, HubConfig,
};

const BATCH: u64 = 1000;

/// Задержка и пропускная способность пути издатель -> хаб -> подписчик.
fn bench_relay(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let hub = Hub::new(HubConfig {
        ingress: "127.0.0.1:0".to_string(),
        egress: "127.0.0.1:0".to_string(),
        poll_interval: Duration::from_millis(100),
        ingress_capacity: 4096,
        egress_capacity: 4096,
        ..Default::default()
    });

    let (mut push, mut sub) = rt.block_on(async {
        hub.start().await.unwrap();
        let ingress = hub.ingress_addr().await.unwrap().to_string();
        let egress = hub.egress_addr().await.unwrap().to_string();

        let mut sub = SubSocket::connect(&egress, DEFAULT_CONNECT_TIMEOUT).await.unwrap();
        sub.subscribe(b"bench");
        while hub.subscriber_count().await == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let push = PushSocket::connect(&ingress, DEFAULT_CONNECT_TIMEOUT, Duration::from_secs(5))
            .await
            .unwrap();
        (push, sub)
    });

    let msg = WireMessage::from_frames(vec![
        Bytes::from_static(b"bench"),
        Bytes::from_static(b"bench-record"),
        Bytes::from(vec![1u8; 256]),
    ])
    .unwrap();

    let mut group = c.benchmark_group("relay");
    group.throughput(Throughput::Elements(BATCH));
    group.bench_function("push -> hub -> sub, 256 B x 1000", |b| {
        b.iter(|| {
            rt.block_on(async {
                for _ in 0..BATCH {
                    push.send(&msg).await.unwrap();
                }
                for _ in 0..BATCH {
                    sub.recv(Duration::from_secs(5)).await.unwrap().unwrap();
                }
            })
        })
    });
    group.finish();

    rt.block_on(hub.stop()).unwrap();
}

criterion_group!(benches, bench_relay);
criterion_main!(benches);
