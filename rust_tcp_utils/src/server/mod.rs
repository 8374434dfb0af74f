// rust_tcp_utils/src/server/mod.rs

//! TCP 服务端模块。
//!
//! 负责在指定地址上监听、接受新的 TCP 连接，并为每个连接派生独立的 Tokio 任务，
//! 通过回调把连接交给上层应用。监听循环响应关闭信号，不会在单次接受失败后退出。

pub mod transport;
