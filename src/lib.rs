/// Codecs for message payloads (bincode, JSON, MessagePack).
pub mod codec;
/// Hub process configuration loading.
pub mod config;
/// Message envelope and its frame layouts.
pub mod envelope;
/// Flexible logging (formatting, filters, sinks).
pub mod logging;
/// Publisher: typed records to the hub ingress.
pub mod publisher;
/// Type registry: Rust types to stable wire names.
pub mod registry;
/// Subscriber: typed streams from the hub egress.
pub mod subscriber;
/// Multipart TCP transport: push/pull and pub/sub sockets.
pub mod transport;

/// Client facade over a publisher and a subscriber.
pub mod client;
/// Forwarding hub between publishers and subscribers.
pub mod hub;

// -----------------------------------------------------------------------------
//  Frequently used public types
// -----------------------------------------------------------------------------

/// Client facade.
pub use client::{BusClient, ClientConfig};
/// Codecs.
pub use codec::{BinaryCodec, Codec, JsonCodec, MsgPackCodec};
/// config
pub use config::{HubSettings, Settings};
/// Envelope.
pub use envelope::{Envelope, EnvelopeLayout};
/// Hub.
pub use hub::{Hub, HubConfig};
/// Logging.
pub use logging::{init_logging, LogFormat, LoggingConfig, LoggingError, LoggingHandle};
/// Publisher.
pub use publisher::{Publisher, PublisherConfig};
/// Type registry.
pub use registry::{MessageType, RegisteredType, TypeRegistry};
/// Subscriber.
pub use subscriber::{Subscriber, SubscriberConfig, SubscriberState, TypedStream};
/// Operation errors and result types.
pub use zumbus_error::{
    CodecError, EnvelopeError, ErrorExt, LifecycleError, RegistryError, StackError, StatusCode,
    TransportError, ZumbusResult,
};
