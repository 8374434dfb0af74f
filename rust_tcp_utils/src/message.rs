// rust_tcp_utils/src/message.rs

//! 定义出站消息结构。
//!
//! `JsonMessage` 是写入 TCP 连接的最小单元：一个已经序列化为单行文本的 JSON 对象。
//! 序列化只做一次，之后的克隆只复制引用计数，因此同一条广播可以廉价地投递给所有会话。
//! `message_id` 与 `message_type` 只用于日志追踪，不会出现在线协议上。

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::error::TcpError;

/// 一条待发送的 JSON 消息。
#[derive(Clone)]
pub struct JsonMessage {
    /// 为此消息实例生成的唯一标识符，仅用于日志。
    pub message_id: Uuid,
    /// 消息的业务类型（例如 `command_response`、`sensor_data`），仅用于日志。
    pub message_type: String,
    /// 序列化后的单行 JSON 文本，不含行尾换行符。
    payload: Arc<str>,
}

impl JsonMessage {
    /// 将 `payload_data` 序列化为紧凑 JSON 并创建消息。
    ///
    /// 紧凑格式保证文本中不含裸换行（字符串里的换行会被转义），
    /// 因此可以安全地按行分帧发送。
    pub fn new<T: Serialize>(message_type: impl Into<String>, payload_data: &T) -> Result<Self, TcpError> {
        let payload = serde_json::to_string(payload_data)
            .map_err(|e| TcpError::SerializationError(format!("创建 JsonMessage 时序列化载荷失败: {}", e)))?;
        Ok(Self {
            message_id: Uuid::new_v4(),
            message_type: message_type.into(),
            payload: Arc::from(payload),
        })
    }

    /// 序列化后的 JSON 文本。
    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// 将载荷反序列化为目标类型 `T`。
    pub fn deserialize_payload<T: DeserializeOwned>(&self) -> Result<T, TcpError> {
        serde_json::from_str(&self.payload).map_err(|e| {
            TcpError::DeserializationError(format!(
                "JsonMessage 载荷反序列化为目标类型失败: {}, 原始载荷: '{}'",
                e, self.payload
            ))
        })
    }
}

impl fmt::Debug for JsonMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonMessage")
            .field("message_id", &self.message_id)
            .field("message_type", &self.message_type)
            .field("payload_len", &self.payload.len())
            .finish()
    }
}
