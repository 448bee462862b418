use serde::{de::DeserializeOwned, Serialize};
use zumbus_error::CodecError;

use super::{decode_error, encode_error, Codec};

/// Компактный бинарный кодек на базе `bincode`.
///
/// Формат не самоописываемый: обе стороны должны иметь одинаковую форму
/// записи.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryCodec;

impl Codec for BinaryCodec {
    fn name(&self) -> &'static str {
        "bincode"
    }

    fn content_type(&self) -> &'static str {
        "application/x-bincode"
    }

    fn encode<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, CodecError> {
        bincode::serialize(value).map_err(|e| encode_error::<T>(self.name(), e))
    }

    fn decode<T: DeserializeOwned>(
        &self,
        bytes: &[u8],
    ) -> Result<T, CodecError> {
        bincode::deserialize(bytes).map_err(|e| decode_error::<T>(self.name(), e))
    }
}
