//! `rust_tcp_utils` 是一个提供 TCP + JSON 流通信实用功能的 Rust Crate。
//! 它封装了机器人服务端与操作员控制台之间的传输细节：JSON 流分帧、
//! 出站消息的序列化、带关闭信号的监听循环以及一个轻量的客户端连接。
//!
//! 主要模块包括：
//! - `codec`: `JsonStreamCodec`，支持按换行分隔或首尾相接的 JSON 对象流，并能在坏数据后重新同步。
//! - `message`: 定义出站消息结构 `JsonMessage`。
//! - `error`: 定义库中使用的错误类型 `TcpError`。
//! - `server`: 提供服务器端传输层（监听、接受连接、派生连接任务）。
//! - `client`: 提供客户端传输层（连接、发送、接收）。

pub mod client;
pub mod codec;
pub mod error;
pub mod message;
pub mod server;
