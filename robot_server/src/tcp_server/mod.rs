// robot_server/src/tcp_server/mod.rs

//! TCP 服务端逻辑模块。

pub mod autonomous_navigator;
pub mod client_session;
pub mod command_dispatcher;
pub mod connection_manager;
pub mod message_router;
pub mod service;
pub mod telemetry_broadcaster;
