// rust_tcp_utils/src/client/mod.rs

//! 客户端 TCP 传输层模块。
//!
//! 提供连接到服务端、发送 JSON 消息以及逐条接收 JSON 值的能力。
//! 操作员控制台的测试替身和集成测试都基于此模块。

pub mod transport;
