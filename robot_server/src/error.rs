//! `robot_server` 的应用级错误类型。
//!
//! 协议错误（坏 JSON、未知指令）与执行器错误都在会话内部处理并回报给对端，
//! 不会出现在这里；这里只收集会让服务本身无法继续运行的错误。

use rust_tcp_utils::error::TcpError;
use thiserror::Error;

/// 应用的主要错误类型
#[derive(Error, Debug)]
pub enum AppError {
    /// 监听地址无法解析。
    #[error("无效的监听地址: {0}")]
    InvalidAddress(String),

    /// 传输层错误，例如监听端口绑定失败。
    #[error("TCP 服务错误: {0}")]
    Transport(#[from] TcpError),
}
