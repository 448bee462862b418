use serde::{de::DeserializeOwned, Serialize};
use zumbus_error::CodecError;

use super::{decode_error, encode_error, Codec};

/// Текстовый кодек на базе `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn name(&self) -> &'static str {
        "json"
    }

    fn content_type(&self) -> &'static str {
        "application/json"
    }

    fn encode<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(value).map_err(|e| encode_error::<T>(self.name(), e))
    }

    fn decode<T: DeserializeOwned>(
        &self,
        bytes: &[u8],
    ) -> Result<T, CodecError> {
        serde_json::from_slice(bytes).map_err(|e| decode_error::<T>(self.name(), e))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    #[test]
    fn test_payload_is_human_readable() {
        let mut map = BTreeMap::new();
        map.insert("room", "general");
        let bytes = JsonCodec.encode(&map).unwrap();
        assert_eq!(bytes, br#"{"room":"general"}"#);
    }

    /// Тест проверяет, что JSON другой формы не декодируется в запись.
    #[test]
    fn test_shape_mismatch() {
        let err = JsonCodec.decode::<Vec<u32>>(br#"{"a":1}"#).unwrap_err();
        assert!(matches!(err, CodecError::Decode { .. }));
    }
}
