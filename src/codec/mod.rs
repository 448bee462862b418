//! Кодеки полезной нагрузки.
//!
//! Кодек превращает запись в байты и обратно. Набор кодеков закрыт для
//! протокола (обе стороны должны использовать одинаковый), но открыт для
//! расширения через трейт [`Codec`].

pub mod binary;
pub mod json;
pub mod msgpack;

pub use binary::BinaryCodec;
pub use json::JsonCodec;
pub use msgpack::MsgPackCodec;
use serde::{de::DeserializeOwned, Serialize};
use zumbus_error::CodecError;

/// Сериализация записей шины.
///
/// Ошибка декодирования никогда не приводит к панике: повреждённые байты или
/// байты другого типа возвращают [`CodecError::Decode`].
pub trait Codec: Send + Sync + 'static {
    /// Короткое имя кодека для логов.
    fn name(&self) -> &'static str;

    /// MIME-тип полезной нагрузки.
    fn content_type(&self) -> &'static str;

    fn encode<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, CodecError>;

    fn decode<T: DeserializeOwned>(
        &self,
        bytes: &[u8],
    ) -> Result<T, CodecError>;
}

pub(crate) fn encode_error<T>(
    codec: &'static str,
    reason: impl ToString,
) -> CodecError {
    CodecError::Encode {
        codec,
        type_name: std::any::type_name::<T>().to_string(),
        reason: reason.to_string(),
    }
}

pub(crate) fn decode_error<T>(
    codec: &'static str,
    reason: impl ToString,
) -> CodecError {
    CodecError::Decode {
        codec,
        type_name: std::any::type_name::<T>().to_string(),
        reason: reason.to_string(),
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
