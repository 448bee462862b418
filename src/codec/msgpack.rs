use serde::{de::DeserializeOwned, Serialize};
use zumbus_error::CodecError;

use super::{decode_error, encode_error, Codec};

/// Компактный самоописываемый кодек MessagePack (`rmp-serde`).
///
/// Структуры кодируются как map с именами полей, поэтому запись переживает
/// перестановку полей между версиями.
#[derive(Debug, Clone, Copy, Default)]
pub struct MsgPackCodec;

impl Codec for MsgPackCodec {
    fn name(&self) -> &'static str {
        "msgpack"
    }

    fn content_type(&self) -> &'static str {
        "application/msgpack"
    }

    fn encode<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, CodecError> {
        rmp_serde::to_vec_named(value).map_err(|e| encode_error::<T>(self.name(), e))
    }

    fn decode<T: DeserializeOwned>(
        &self,
        bytes: &[u8],
    ) -> Result<T, CodecError> {
        rmp_serde::from_slice(bytes).map_err(|e| decode_error::<T>(self.name(), e))
    }
}
