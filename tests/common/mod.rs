//! Общие помощники интеграционных тестов.

#![allow(dead_code)]

use std::{sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use zumbus::{
    BusClient, ClientConfig, Hub, HubConfig, JsonCodec, MessageType, SubscriberConfig,
    TypeRegistry,
};

pub const WAIT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub from: String,
    pub text: String,
}

impl MessageType for ChatMessage {
    const WIRE_NAME: &'static str = "chat-message";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Numbered {
    pub value: u64,
}

impl MessageType for Numbered {
    const WIRE_NAME: &'static str = "numbered";
}

/// Хаб на свободных портах с коротким интервалом ожидания.
pub async fn start_hub() -> Hub {
    let hub = Hub::new(HubConfig {
        ingress: "127.0.0.1:0".to_string(),
        egress: "tcp://127.0.0.1:0".to_string(),
        poll_interval: Duration::from_millis(100),
        ..Default::default()
    });
    hub.start().await.unwrap();
    hub
}

pub async fn addrs(hub: &Hub) -> (String, String) {
    (
        hub.ingress_addr().await.unwrap().to_string(),
        hub.egress_addr().await.unwrap().to_string(),
    )
}

pub fn fast_subscriber() -> SubscriberConfig {
    SubscriberConfig {
        poll_interval: Duration::from_millis(100),
        ..Default::default()
    }
}

pub async fn client(hub: &Hub) -> BusClient<JsonCodec> {
    let (ingress, egress) = addrs(hub).await;
    BusClient::connect(
        &ingress,
        &egress,
        Arc::new(TypeRegistry::new()),
        JsonCodec,
        ClientConfig {
            subscriber: fast_subscriber(),
            ..Default::default()
        },
    )
    .await
    .unwrap()
}

pub async fn wait_for_subscribers(
    hub: &Hub,
    n: usize,
) {
    timeout(WAIT, async {
        while hub.subscriber_count().await < n {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("subscribers did not connect in time");
}

pub async fn wait_for_publishers(
    hub: &Hub,
    n: usize,
) {
    timeout(WAIT, async {
        while hub.publisher_count().await < n {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("publishers did not connect in time");
}
