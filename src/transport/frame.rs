//! Кодирование multipart-сообщений.
//!
//! Сообщение кодируется как ZSP-массив бинарных строк:
//!
//! ```text
//! *<n>\r\n
//! $<len>\r\n<bytes>\r\n   (n раз)
//! ```
//!
//! Декодер инкрементальный: читает из общего `BytesMut` и возвращает
//! `Ok(None)`, пока сообщение не пришло целиком. Фреймы готового сообщения
//! являются срезами исходных байт без копирования.

use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt, BufWriter},
    net::tcp::{OwnedReadHalf, OwnedWriteHalf},
    time::timeout,
};
use tracing::trace;
use zumbus_error::TransportError;

/// Максимальное количество фреймов в одном сообщении.
pub const MAX_FRAMES: usize = 16;
/// Максимальный размер одного фрейма (64mb).
pub const MAX_FRAME_LENGTH: usize = 64 * 1024 * 1024;
/// Максимальная длина строки заголовка (`*<n>` / `$<len>`).
pub const MAX_HEADER_LENGTH: usize = 32;

const READ_CHUNK: usize = 8 * 1024;

/// Декодированное multipart-сообщение.
///
/// Хранит исходные байты целиком, чтобы их можно было переслать дальше без
/// повторного кодирования.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireMessage {
    raw: Bytes,
    frames: Vec<Bytes>,
}

/// Инкрементальный декодер multipart-сообщений.
#[derive(Debug, Default)]
pub struct MultipartDecoder {
    /// Минимальный размер буфера, при котором имеет смысл повторять разбор.
    min_len: usize,
}

/// Читающая половина соединения с буфером и декодером.
pub struct FramedReader {
    inner: OwnedReadHalf,
    buf: BytesMut,
    decoder: MultipartDecoder,
}

/// Пишущая половина соединения с таймаутом записи.
pub struct FramedWriter {
    inner: BufWriter<OwnedWriteHalf>,
    write_timeout: Duration,
}

enum Step<T> {
    Done(T),
    /// Данных не хватает; известен минимальный размер буфера.
    Incomplete(usize),
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl WireMessage {
    /// Кодирует фреймы в новое сообщение.
    pub fn from_frames(frames: Vec<Bytes>) -> Result<Self, TransportError> {
        let raw = encode_frames(&frames)?;
        Ok(Self { raw, frames })
    }

    /// Исходные закодированные байты.
    pub fn raw(&self) -> &Bytes {
        &self.raw
    }

    pub fn frames(&self) -> &[Bytes] {
        &self.frames
    }

    pub fn into_frames(self) -> Vec<Bytes> {
        self.frames
    }

    /// Первый фрейм (topic в канонической раскладке).
    pub fn first_frame(&self) -> Option<&Bytes> {
        self.frames.first()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl MultipartDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Пытается извлечь одно сообщение из начала буфера.
    ///
    /// При успехе байты сообщения удаляются из `buf`. При нехватке данных
    /// буфер не изменяется.
    pub fn decode(
        &mut self,
        buf: &mut BytesMut,
    ) -> Result<Option<WireMessage>, TransportError> {
        if buf.len() < self.min_len.max(1) {
            return Ok(None);
        }

        match scan_message(buf)? {
            Step::Incomplete(needed) => {
                self.min_len = needed;
                Ok(None)
            }
            Step::Done((total, spans)) => {
                self.min_len = 0;
                let raw = buf.split_to(total).freeze();
                let frames = spans
                    .into_iter()
                    .map(|(start, end)| raw.slice(start..end))
                    .collect();
                Ok(Some(WireMessage { raw, frames }))
            }
        }
    }
}

impl FramedReader {
    pub fn new(inner: OwnedReadHalf) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(READ_CHUNK),
            decoder: MultipartDecoder::new(),
        }
    }

    /// Читает следующее сообщение.
    ///
    /// `Ok(None)` означает, что удалённая сторона закрыла соединение на
    /// границе сообщения. Обрыв посреди сообщения является ошибкой.
    ///
    /// Безопасен для отмены: частично прочитанные байты остаются в буфере.
    pub async fn next(&mut self) -> Result<Option<WireMessage>, TransportError> {
        loop {
            if let Some(msg) = self.decoder.decode(&mut self.buf)? {
                trace!(frames = msg.len(), bytes = msg.raw().len(), "Decoded message");
                return Ok(Some(msg));
            }

            self.buf.reserve(READ_CHUNK);
            let n = self.inner.read_buf(&mut self.buf).await?;
            if n == 0 {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                return Err(TransportError::Io {
                    kind: std::io::ErrorKind::UnexpectedEof,
                    message: format!("connection closed with {} pending bytes", self.buf.len()),
                });
            }
        }
    }
}

impl FramedWriter {
    pub fn new(
        inner: OwnedWriteHalf,
        write_timeout: Duration,
    ) -> Self {
        Self {
            inner: BufWriter::new(inner),
            write_timeout,
        }
    }

    /// Записывает уже закодированное сообщение целиком и сбрасывает буфер.
    pub async fn write_raw(
        &mut self,
        raw: &[u8],
    ) -> Result<(), TransportError> {
        let write_timeout = self.write_timeout;
        timeout(write_timeout, async {
            self.inner.write_all(raw).await?;
            self.inner.flush().await
        })
        .await
        .map_err(|_| TransportError::Io {
            kind: std::io::ErrorKind::TimedOut,
            message: format!("write timed out after {write_timeout:?}"),
        })??;
        Ok(())
    }

    pub async fn send(
        &mut self,
        msg: &WireMessage,
    ) -> Result<(), TransportError> {
        self.write_raw(msg.raw()).await
    }

    /// Закрывает пишущую сторону соединения.
    pub async fn shutdown(&mut self) -> Result<(), TransportError> {
        self.inner.flush().await?;
        self.inner.shutdown().await?;
        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////////////
// Внутренние методы и функции
////////////////////////////////////////////////////////////////////////////////

/// Кодирует список фреймов в multipart-сообщение.
pub fn encode_frames(frames: &[Bytes]) -> Result<Bytes, TransportError> {
    if frames.is_empty() {
        return Err(TransportError::frame("message must contain at least one frame"));
    }
    if frames.len() > MAX_FRAMES {
        return Err(TransportError::SizeLimit {
            what: "frames per message",
            current: frames.len(),
            max: MAX_FRAMES,
        });
    }

    let mut capacity = MAX_HEADER_LENGTH;
    for f in frames {
        if f.len() > MAX_FRAME_LENGTH {
            return Err(TransportError::SizeLimit {
                what: "frame",
                current: f.len(),
                max: MAX_FRAME_LENGTH,
            });
        }
        capacity += f.len() + MAX_HEADER_LENGTH;
    }

    let mut out = BytesMut::with_capacity(capacity);
    out.put_slice(format!("*{}\r\n", frames.len()).as_bytes());
    for f in frames {
        out.put_slice(format!("${}\r\n", f.len()).as_bytes());
        out.put_slice(f);
        out.put_slice(b"\r\n");
    }
    Ok(out.freeze())
}

/// Разбирает сообщение без изменения буфера. Возвращает длину сообщения и
/// границы фреймов.
#[allow(clippy::type_complexity)]
fn scan_message(buf: &[u8]) -> Result<Step<(usize, Vec<(usize, usize)>)>, TransportError> {
    let (count, mut pos) = match read_header(buf, 0, b'*')? {
        Step::Done(v) => v,
        Step::Incomplete(n) => return Ok(Step::Incomplete(n)),
    };

    if count == 0 {
        return Err(TransportError::frame("empty multipart message"));
    }
    if count > MAX_FRAMES {
        return Err(TransportError::SizeLimit {
            what: "frames per message",
            current: count,
            max: MAX_FRAMES,
        });
    }

    let mut spans = Vec::with_capacity(count);
    for _ in 0..count {
        let (len, start) = match read_header(buf, pos, b'$')? {
            Step::Done(v) => v,
            Step::Incomplete(n) => return Ok(Step::Incomplete(n)),
        };
        if len > MAX_FRAME_LENGTH {
            return Err(TransportError::SizeLimit {
                what: "frame",
                current: len,
                max: MAX_FRAME_LENGTH,
            });
        }

        let end = start + len;
        if buf.len() < end + 2 {
            return Ok(Step::Incomplete(end + 2));
        }
        if &buf[end..end + 2] != b"\r\n" {
            return Err(TransportError::frame(format!(
                "missing CRLF after frame at byte {end}"
            )));
        }
        spans.push((start, end));
        pos = end + 2;
    }

    Ok(Step::Done((pos, spans)))
}

/// Читает заголовок вида `<marker><число>\r\n` начиная с `pos`.
fn read_header(
    buf: &[u8],
    pos: usize,
    marker: u8,
) -> Result<Step<(usize, usize)>, TransportError> {
    if buf.len() <= pos {
        return Ok(Step::Incomplete(pos + 1));
    }
    if buf[pos] != marker {
        return Err(TransportError::frame(format!(
            "expected '{}' at byte {pos}, got 0x{:02x}",
            marker as char, buf[pos]
        )));
    }

    let window_end = buf.len().min(pos + MAX_HEADER_LENGTH);
    let line = &buf[pos + 1..window_end];
    let Some(cr) = line.windows(2).position(|w| w == b"\r\n") else {
        if window_end - pos >= MAX_HEADER_LENGTH {
            return Err(TransportError::frame(format!(
                "header at byte {pos} is too long"
            )));
        }
        return Ok(Step::Incomplete(window_end + 1));
    };

    let digits = &line[..cr];
    let value = std::str::from_utf8(digits)
        .ok()
        .filter(|s| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|s| s.parse::<usize>().ok())
        .ok_or_else(|| TransportError::frame(format!("invalid length at byte {pos}")))?;

    Ok(Step::Done((value, pos + 1 + cr + 2)))
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
