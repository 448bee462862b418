//! Клиент шины: издатель и подписчик за одним объектом.

use std::sync::Arc;

use tracing::debug;
use zumbus_error::ZumbusResult;

use crate::{
    codec::Codec,
    envelope::EnvelopeLayout,
    publisher::{Publisher, PublisherConfig},
    registry::{MessageType, TypeRegistry},
    subscriber::{Subscriber, SubscriberConfig, SubscriberState, TypedStream},
};

/// Конфигурация клиента.
///
/// Раскладка конверта задаётся один раз и применяется к обеим сторонам.
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub layout: EnvelopeLayout,
    pub publisher: PublisherConfig,
    pub subscriber: SubscriberConfig,
}

/// Клиент, подключённый к входному и выходному адресам одного хаба.
pub struct BusClient<C: Codec + Clone> {
    publisher: Publisher<C>,
    subscriber: Subscriber<C>,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl<C: Codec + Clone> BusClient<C> {
    /// Подключает издателя к `pub_addr` и создаёт подписчика для
    /// `sub_addr`. Оба используют один реестр.
    pub async fn connect(
        pub_addr: &str,
        sub_addr: &str,
        registry: Arc<TypeRegistry>,
        codec: C,
        config: ClientConfig,
    ) -> ZumbusResult<Self> {
        let ClientConfig {
            layout,
            mut publisher,
            mut subscriber,
        } = config;
        publisher.layout = layout;
        subscriber.layout = layout;

        let publisher =
            Publisher::connect(pub_addr, Arc::clone(&registry), codec.clone(), publisher).await?;
        let subscriber = match Subscriber::open(sub_addr, registry, codec, subscriber).await {
            Ok(subscriber) => subscriber,
            Err(e) => {
                publisher.dispose().await?;
                return Err(e);
            }
        };
        debug!(pub_addr, sub_addr, %layout, "Bus client connected");

        Ok(Self {
            publisher,
            subscriber,
        })
    }

    pub async fn send<T: MessageType>(
        &self,
        msg: &T,
    ) -> ZumbusResult<()> {
        self.publisher.send(msg).await
    }

    pub async fn send_to<T: MessageType>(
        &self,
        msg: &T,
        topic: &str,
    ) -> ZumbusResult<()> {
        self.publisher.send_to(msg, topic).await
    }

    pub async fn receive<T: MessageType>(&self) -> ZumbusResult<TypedStream<T>> {
        self.subscriber.stream().await
    }

    pub async fn receive_where<T, F>(
        &self,
        predicate: F,
    ) -> ZumbusResult<TypedStream<T>>
    where
        T: MessageType,
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.subscriber.stream_where(predicate).await
    }

    pub async fn receive_topic<T, F>(
        &self,
        topic: &str,
        predicate: F,
    ) -> ZumbusResult<TypedStream<T>>
    where
        T: MessageType,
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.subscriber.stream_topic(topic, predicate).await
    }

    pub fn publisher(&self) -> &Publisher<C> {
        &self.publisher
    }

    pub fn subscriber(&self) -> &Subscriber<C> {
        &self.subscriber
    }

    pub fn state(&self) -> SubscriberState {
        self.subscriber.state()
    }

    /// Освобождает подписчика, затем издателя. Повторный вызов ничего не
    /// делает.
    pub async fn dispose(&self) -> ZumbusResult<()> {
        self.subscriber.dispose().await?;
        self.publisher.dispose().await
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde::{Deserialize, Serialize};
    use tokio::time::timeout;
    use zumbus_error::StatusCode;

    use super::*;
    use crate::{
        codec::MsgPackCodec,
        hub::{Hub, HubConfig},
    };

    const T: Duration = Duration::from_secs(2);

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Ping {
        seq: u32,
    }

    impl MessageType for Ping {
        const WIRE_NAME: &'static str = "ping";
    }

    async fn hub() -> Hub {
        let hub = Hub::new(HubConfig {
            ingress: "127.0.0.1:0".to_string(),
            egress: "127.0.0.1:0".to_string(),
            poll_interval: Duration::from_millis(50),
            ..Default::default()
        });
        hub.start().await.unwrap();
        hub
    }

    async fn client(
        hub: &Hub,
        config: ClientConfig,
    ) -> BusClient<MsgPackCodec> {
        BusClient::connect(
            &hub.ingress_addr().await.unwrap().to_string(),
            &hub.egress_addr().await.unwrap().to_string(),
            Arc::new(TypeRegistry::new()),
            MsgPackCodec,
            config,
        )
        .await
        .unwrap()
    }

    async fn wait_for_subscribers(
        hub: &Hub,
        n: usize,
    ) {
        timeout(T, async {
            while hub.subscriber_count().await != n {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_send_and_receive_through_hub() {
        let hub = hub().await;
        let client = client(&hub, ClientConfig::default()).await;

        let mut pings = client.receive::<Ping>().await.unwrap();
        wait_for_subscribers(&hub, 1).await;

        client.send(&Ping { seq: 1 }).await.unwrap();
        let got = timeout(T, pings.recv()).await.unwrap().unwrap();
        assert_eq!(*got, Ping { seq: 1 });

        client.dispose().await.unwrap();
        client.dispose().await.unwrap();
        assert_eq!(client.state(), SubscriberState::Closed);
        assert!(client.publisher().is_closed());
        hub.stop().await.unwrap();
    }

    /// Тест проверяет, что раскладка клиента применяется к обеим сторонам.
    #[tokio::test]
    async fn test_layout_applies_to_both_sides() {
        let hub = hub().await;
        let config = ClientConfig {
            layout: EnvelopeLayout::TwoPart,
            ..Default::default()
        };
        let client = client(&hub, config).await;
        assert_eq!(client.publisher().layout(), EnvelopeLayout::TwoPart);

        let mut pings = client.receive::<Ping>().await.unwrap();
        wait_for_subscribers(&hub, 1).await;

        let err = client.send_to(&Ping { seq: 1 }, "elsewhere").await.unwrap_err();
        assert!(err.is(StatusCode::InvalidConfig));

        client.send(&Ping { seq: 2 }).await.unwrap();
        assert_eq!(timeout(T, pings.recv()).await.unwrap().unwrap().seq, 2);
        hub.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_receive_topic_with_predicate() {
        let hub = hub().await;
        let client = client(&hub, ClientConfig::default()).await;

        let mut odd = client
            .receive_topic::<Ping, _>("pings:odd", |p| p.seq % 2 == 1)
            .await
            .unwrap();
        wait_for_subscribers(&hub, 1).await;

        for seq in 1..=4 {
            client.send_to(&Ping { seq }, "pings:odd").await.unwrap();
        }
        assert_eq!(timeout(T, odd.recv()).await.unwrap().unwrap().seq, 1);
        assert_eq!(timeout(T, odd.recv()).await.unwrap().unwrap().seq, 3);
        hub.stop().await.unwrap();
    }
}
