// rust_tcp_utils/src/codec.rs

//! JSON 流编解码器。
//!
//! 入站方向接受两种分帧方式：每行一个 JSON 对象，或多个 JSON 对象首尾相接
//! （部分控制台每次 `send` 一个对象且不加换行）。对象之间的空白会被跳过。
//!
//! 无法解析的数据不会让连接失败：解码器丢弃坏数据直到下一个换行
//! （没有换行时丢弃整个缓冲区），并产出一个 [`JsonFrame::Malformed`]，
//! 由上层决定如何回报给对端。
//!
//! 出站方向固定为每行一个 JSON 对象。

use bytes::{Buf, BufMut, BytesMut};
use log::debug;
use serde_json::Value;
use tokio_util::codec::{Decoder, Encoder};

use crate::error::TcpError;
use crate::message::JsonMessage;

/// 单个入站帧允许的默认最大字节数。
pub const DEFAULT_MAX_FRAME_LENGTH: usize = 64 * 1024;

/// 解码得到的一个入站帧。
#[derive(Debug, Clone, PartialEq)]
pub enum JsonFrame {
    /// 一个完整且语法正确的 JSON 值（不一定是对象）。
    Value(Value),
    /// 一段无法解析的数据；内容为面向对端的错误描述。
    Malformed(String),
}

/// 按 JSON 值边界分帧的编解码器。
#[derive(Debug, Clone)]
pub struct JsonStreamCodec {
    max_frame_length: usize,
}

impl JsonStreamCodec {
    pub fn new() -> Self {
        Self { max_frame_length: DEFAULT_MAX_FRAME_LENGTH }
    }

    /// 指定单帧最大字节数。不完整的帧一旦超过此长度即被丢弃。
    pub fn with_max_length(max_frame_length: usize) -> Self {
        Self { max_frame_length: max_frame_length.max(1) }
    }
}

impl Default for JsonStreamCodec {
    fn default() -> Self {
        Self::new()
    }
}

/// 尝试从缓冲区头部解析一个 JSON 值时的结果。
enum Attempt {
    Complete(Value, usize),
    Incomplete,
    Invalid(String),
}

fn attempt_parse(buf: &[u8]) -> Attempt {
    let mut stream = serde_json::Deserializer::from_slice(buf).into_iter::<Value>();
    match stream.next() {
        Some(Ok(value)) => Attempt::Complete(value, stream.byte_offset()),
        Some(Err(e)) if e.is_eof() => Attempt::Incomplete,
        Some(Err(e)) => Attempt::Invalid(e.to_string()),
        None => Attempt::Incomplete,
    }
}

impl Decoder for JsonStreamCodec {
    type Item = JsonFrame;
    type Error = TcpError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<JsonFrame>, TcpError> {
        // 跳过对象之间的空白与换行
        let leading = buf.iter().take_while(|b| b.is_ascii_whitespace()).count();
        buf.advance(leading);
        if buf.is_empty() {
            return Ok(None);
        }

        match attempt_parse(buf) {
            Attempt::Complete(value, consumed) => {
                buf.advance(consumed);
                Ok(Some(JsonFrame::Value(value)))
            }
            Attempt::Incomplete if buf.len() > self.max_frame_length => {
                let discarded = buf.len();
                buf.clear();
                debug!("[JSON编解码] 不完整的帧超过上限 {} 字节，已丢弃 {} 字节。", self.max_frame_length, discarded);
                Ok(Some(JsonFrame::Malformed(format!(
                    "message exceeds maximum length of {} bytes",
                    self.max_frame_length
                ))))
            }
            Attempt::Incomplete => Ok(None),
            Attempt::Invalid(reason) => {
                // 重新同步：丢弃到下一个换行（含换行本身）为止
                let cut = buf
                    .iter()
                    .position(|b| *b == b'\n')
                    .map(|pos| pos + 1)
                    .unwrap_or(buf.len());
                buf.advance(cut);
                debug!("[JSON编解码] 丢弃 {} 字节无法解析的数据: {}", cut, reason);
                Ok(Some(JsonFrame::Malformed(reason)))
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<JsonFrame>, TcpError> {
        if let Some(frame) = self.decode(buf)? {
            return Ok(Some(frame));
        }
        if buf.is_empty() {
            return Ok(None);
        }
        let discarded = buf.len();
        buf.clear();
        debug!("[JSON编解码] 流结束时仍有 {} 字节不完整数据，已丢弃。", discarded);
        Ok(Some(JsonFrame::Malformed("unexpected end of stream".to_string())))
    }
}

impl Encoder<JsonMessage> for JsonStreamCodec {
    type Error = TcpError;

    fn encode(&mut self, message: JsonMessage, dst: &mut BytesMut) -> Result<(), TcpError> {
        let payload = message.payload().as_bytes();
        dst.reserve(payload.len() + 1);
        dst.put_slice(payload);
        dst.put_u8(b'\n');
        Ok(())
    }
}
