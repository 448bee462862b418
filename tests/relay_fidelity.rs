//! Хаб пересылает байты сообщений без изменений.

use bytes::Bytes;
use tokio::time::timeout;
use zumbus::{
    transport::{PushSocket, SubSocket, WireMessage, DEFAULT_CONNECT_TIMEOUT},
    Envelope, EnvelopeLayout,
};

mod common;
use common::*;

fn sample_messages() -> Vec<WireMessage> {
    let envelope = Envelope::new(Some("chat:lobby"), "chat-message", vec![0u8, 1, 2, 255]);
    vec![
        WireMessage::from_frames(envelope.to_frames(EnvelopeLayout::ThreePart).unwrap()).unwrap(),
        WireMessage::from_frames(
            Envelope::new(None, "numbered", Bytes::new())
                .to_frames(EnvelopeLayout::TwoPart)
                .unwrap(),
        )
        .unwrap(),
        // хаб не разбирает конверт, даже если это не конверт
        WireMessage::from_frames(vec![Bytes::from_static(b"raw")]).unwrap(),
        WireMessage::from_frames(vec![Bytes::from(vec![7u8; 256 * 1024]), Bytes::new()]).unwrap(),
    ]
}

#[tokio::test]
async fn test_relay_preserves_bytes_and_order() {
    let hub = start_hub().await;
    let (ingress, egress) = addrs(&hub).await;

    let mut first = SubSocket::connect(&egress, DEFAULT_CONNECT_TIMEOUT).await.unwrap();
    let mut second = SubSocket::connect(&egress, DEFAULT_CONNECT_TIMEOUT).await.unwrap();
    // пустой префикс пропускает всё
    first.subscribe(b"");
    second.subscribe(b"");
    wait_for_subscribers(&hub, 2).await;

    let mut push = PushSocket::connect(&ingress, DEFAULT_CONNECT_TIMEOUT, WAIT)
        .await
        .unwrap();
    let sent = sample_messages();
    for msg in &sent {
        push.send(msg).await.unwrap();
    }

    for sub in [&mut first, &mut second] {
        for expected in &sent {
            let got = timeout(WAIT, sub.recv(WAIT))
                .await
                .unwrap()
                .unwrap()
                .expect("message relayed");
            assert_eq!(got.raw(), expected.raw());
            assert_eq!(got.frames(), expected.frames());
        }
    }
    assert_eq!(hub.relayed_count(), sent.len() as u64);

    hub.stop().await.unwrap();
}

/// Сообщения одного издателя приходят в порядке отправки.
#[tokio::test]
async fn test_relay_fifo_per_publisher() {
    let hub = start_hub().await;
    let (ingress, egress) = addrs(&hub).await;

    let mut sub = SubSocket::connect(&egress, DEFAULT_CONNECT_TIMEOUT).await.unwrap();
    sub.subscribe(b"");
    wait_for_subscribers(&hub, 1).await;
    let mut push = PushSocket::connect(&ingress, DEFAULT_CONNECT_TIMEOUT, WAIT)
        .await
        .unwrap();
    wait_for_publishers(&hub, 1).await;

    for i in 0..200u32 {
        push.send_frames(vec![Bytes::from(i.to_be_bytes().to_vec())])
            .await
            .unwrap();
    }
    for i in 0..200u32 {
        let got = sub.recv(WAIT).await.unwrap().unwrap();
        assert_eq!(&got.frames()[0][..], &i.to_be_bytes());
    }

    hub.stop().await.unwrap();
}
