// rust_tcp_utils/src/client/transport.rs

//! 客户端 TCP 传输层核心逻辑。
//!
//! 读半部使用 [`JsonStreamCodec`] 分帧，写半部直接写出单行 JSON。
//! 两个半部分开持有，调用方可以在同一任务中交替发送与接收。

use std::net::SocketAddr;

use futures_util::StreamExt;
use log::{debug, error, info};
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio_util::codec::FramedRead;

use crate::codec::{JsonFrame, JsonStreamCodec};
use crate::error::TcpError;
use crate::message::JsonMessage;

/// 一个活动的客户端 TCP 连接。
pub struct ClientConnection {
    /// 已分帧的接收端。
    pub reader: FramedRead<OwnedReadHalf, JsonStreamCodec>,
    /// 原始发送端。
    pub writer: OwnedWriteHalf,
    /// 服务端地址。
    pub peer_addr: SocketAddr,
}

impl ClientConnection {
    /// 发送一条 `JsonMessage`，末尾追加换行。
    pub async fn send_message(&mut self, message: &JsonMessage) -> Result<(), TcpError> {
        debug!("客户端：准备发送消息 (类型: {}, ID: {})", message.message_type, message.message_id);
        let mut line = Vec::with_capacity(message.payload().len() + 1);
        line.extend_from_slice(message.payload().as_bytes());
        line.push(b'\n');
        self.writer.write_all(&line).await?;
        Ok(())
    }

    /// 将任意 JSON 值序列化为一行并发送。
    pub async fn send_json(&mut self, value: &Value) -> Result<(), TcpError> {
        let message = JsonMessage::new("raw_json", value)?;
        self.send_message(&message).await
    }

    /// 原样发送字节，不做任何分帧处理。用于模拟不加换行或发送坏数据的对端。
    pub async fn send_raw(&mut self, bytes: &[u8]) -> Result<(), TcpError> {
        self.writer.write_all(bytes).await?;
        Ok(())
    }

    /// 接收下一条 JSON 值。
    ///
    /// 连接关闭时返回 `None`；收到无法解析的数据时返回 `Some(Err(TcpError::DeserializationError))`，
    /// 连接仍可继续使用。
    pub async fn receive_message(&mut self) -> Option<Result<Value, TcpError>> {
        match self.reader.next().await? {
            Ok(JsonFrame::Value(value)) => Some(Ok(value)),
            Ok(JsonFrame::Malformed(reason)) => Some(Err(TcpError::DeserializationError(reason))),
            Err(e) => Some(Err(e)),
        }
    }

    /// 关闭写方向，通知服务端本端不再发送数据。
    pub async fn shutdown(&mut self) -> Result<(), TcpError> {
        self.writer.shutdown().await?;
        Ok(())
    }
}

/// 连接到指定的服务端地址。
pub async fn connect_client(addr: SocketAddr) -> Result<ClientConnection, TcpError> {
    info!("客户端：开始尝试连接到 TCP 服务器 {}", addr);
    let stream = TcpStream::connect(addr).await.map_err(|e| {
        error!("客户端：连接到 {} 失败，错误: {}", addr, e);
        TcpError::IoError(e)
    })?;
    if let Err(e) = stream.set_nodelay(true) {
        debug!("客户端：无法设置 TCP_NODELAY: {}", e);
    }
    let peer_addr = stream.peer_addr()?;
    let (read_half, write_half) = stream.into_split();
    info!("客户端：已成功连接到 {}", peer_addr);
    Ok(ClientConnection {
        reader: FramedRead::new(read_half, JsonStreamCodec::new()),
        writer: write_half,
        peer_addr,
    })
}

/// 按字符串地址连接，例如 `"127.0.0.1:5000"`。
pub async fn connect_client_str(addr: &str) -> Result<ClientConnection, TcpError> {
    let parsed: SocketAddr = addr
        .parse()
        .map_err(|e| TcpError::InvalidAddress(format!("'{}': {}", addr, e)))?;
    connect_client(parsed).await
}
