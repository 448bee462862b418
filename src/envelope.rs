//! Конверт сообщения: `(topic, type_name, payload)`.
//!
//! Конверт существует только в пути между издателем и подписчиком. Строковые
//! части кодируются в UTF-8, полезная нагрузка передаётся без изменений.

use std::{fmt, str::FromStr};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use zumbus_error::EnvelopeError;

/// Раскладка конверта по фреймам multipart-сообщения.
///
/// Выбирается конфигурацией и никогда не определяется автоматически.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeLayout {
    /// `[topic, type_name, payload]`
    #[default]
    ThreePart,
    /// `[type_name, payload]`, topic совпадает с именем типа.
    TwoPart,
}

/// Неизменяемый конверт сообщения.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    topic: String,
    type_name: String,
    payload: Bytes,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl EnvelopeLayout {
    /// Количество фреймов в сообщении данной раскладки.
    pub const fn frame_count(self) -> usize {
        match self {
            Self::ThreePart => 3,
            Self::TwoPart => 2,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ThreePart => "three_part",
            Self::TwoPart => "two_part",
        }
    }
}

impl Envelope {
    /// Создаёт конверт. Если `topic` равен `None`, используется имя типа.
    pub fn new(
        topic: Option<&str>,
        type_name: impl Into<String>,
        payload: impl Into<Bytes>,
    ) -> Self {
        let type_name = type_name.into();
        Self {
            topic: topic.map_or_else(|| type_name.clone(), str::to_string),
            type_name,
            payload: payload.into(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Разбирает конверт на части.
    pub fn into_parts(self) -> (String, String, Bytes) {
        (self.topic, self.type_name, self.payload)
    }

    /// Раскладывает конверт во фреймы.
    ///
    /// Двухчастная раскладка не умеет переносить topic, отличный от имени
    /// типа: такой конверт отклоняется с [`EnvelopeError::LayoutMismatch`].
    pub fn to_frames(
        &self,
        layout: EnvelopeLayout,
    ) -> Result<Vec<Bytes>, EnvelopeError> {
        match layout {
            EnvelopeLayout::ThreePart => Ok(vec![
                Bytes::copy_from_slice(self.topic.as_bytes()),
                Bytes::copy_from_slice(self.type_name.as_bytes()),
                self.payload.clone(),
            ]),
            EnvelopeLayout::TwoPart => {
                if self.topic != self.type_name {
                    return Err(EnvelopeError::LayoutMismatch {
                        topic: self.topic.clone(),
                        type_name: self.type_name.clone(),
                    });
                }
                Ok(vec![
                    Bytes::copy_from_slice(self.type_name.as_bytes()),
                    self.payload.clone(),
                ])
            }
        }
    }

    /// Собирает конверт из фреймов. Полезная нагрузка не копируется.
    pub fn from_frames(
        frames: &[Bytes],
        layout: EnvelopeLayout,
    ) -> Result<Self, EnvelopeError> {
        let expected = layout.frame_count();
        if frames.len() != expected {
            return Err(EnvelopeError::FrameCount {
                expected,
                got: frames.len(),
            });
        }

        match layout {
            EnvelopeLayout::ThreePart => Ok(Self {
                topic: utf8_part(&frames[0], "topic")?,
                type_name: utf8_part(&frames[1], "type name")?,
                payload: frames[2].clone(),
            }),
            EnvelopeLayout::TwoPart => {
                let type_name = utf8_part(&frames[0], "type name")?;
                Ok(Self {
                    topic: type_name.clone(),
                    type_name,
                    payload: frames[1].clone(),
                })
            }
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов
////////////////////////////////////////////////////////////////////////////////

impl fmt::Display for EnvelopeLayout {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EnvelopeLayout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "three_part" | "3" => Ok(Self::ThreePart),
            "two_part" | "2" => Ok(Self::TwoPart),
            other => Err(format!("unknown envelope layout '{other}'")),
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Внутренние методы и функции
////////////////////////////////////////////////////////////////////////////////

fn utf8_part(
    frame: &Bytes,
    part: &'static str,
) -> Result<String, EnvelopeError> {
    std::str::from_utf8(frame)
        .map(str::to_string)
        .map_err(|_| EnvelopeError::InvalidUtf8 { part })
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
