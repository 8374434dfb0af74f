// rust_tcp_utils/src/error.rs

//! 定义 TCP 工具库相关的错误类型。

use thiserror::Error; // 引入 thiserror 来简化错误类型的定义

/// TCP 工具库的统一错误类型。
#[derive(Error, Debug)]
pub enum TcpError {
    /// 当 serde 序列化失败时返回。
    #[error("序列化错误: {0}")]
    SerializationError(String),

    /// 当收到的数据无法解析为 JSON 时返回。
    #[error("反序列化错误: {0}")]
    DeserializationError(String),

    /// TCP 监听器无法绑定到指定地址。对服务端而言这是致命错误。
    #[error("TCP 监听器绑定失败 ({addr}): {source}")]
    BindError {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// 底层 I/O 错误。
    #[error("I/O错误: {0}")]
    IoError(#[from] std::io::Error),

    /// 当尝试发送消息到一个已关闭的通道时发生。
    #[error("发送错误: 通道已关闭")]
    SendErrorClosed,

    /// 在限定时间内未能完成发送或连接。
    #[error("连接超时")]
    ConnectionTimeout,

    /// 无效的地址格式。
    #[error("无效的地址: {0}")]
    InvalidAddress(String),
}

impl TcpError {
    /// 该错误是否表示对端已经断开（而不是协议或本地问题）。
    pub fn is_disconnect(&self) -> bool {
        match self {
            TcpError::IoError(e) => matches!(
                e.kind(),
                std::io::ErrorKind::UnexpectedEof
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
            ),
            TcpError::SendErrorClosed => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disconnect_classification() {
        let reset = TcpError::from(std::io::Error::from(std::io::ErrorKind::ConnectionReset));
        assert!(reset.is_disconnect());
        assert!(TcpError::SendErrorClosed.is_disconnect());
        assert!(!TcpError::ConnectionTimeout.is_disconnect());
        assert!(!TcpError::DeserializationError("x".into()).is_disconnect());
    }
}
