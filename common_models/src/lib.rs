//! `common_models` 公共模型库 crate。
//!
//! 本 crate 集中定义了机器人指令与遥测服务 (`robot_server`) 与其通信对端（操作员控制台、
//! 集成测试中的模拟客户端等）之间共享的线协议数据结构和枚举类型。
//!
//! 主要包含以下类型的模型：
//! - **通用枚举 (`enums`)**: 运动方向、运动原语、响应状态、传感器状态。
//! - **遥测模型 (`telemetry_models`)**: 遥测快照 `TelemetrySnapshot` 与导航目标点 `NavigationTarget`。
//! - **指令模型 (`command_models`)**: 从入站消息解析出的 `Command` 及其解析错误。
//! - **消息负载 (`payloads`)**: 入站消息信封与所有出站消息（指令响应、测试响应、错误、
//!   周期遥测推送、自主导航进度推送）。
//!
//! 设计原则：
//! - **共享性**: 所有模型都可以被服务端和任意 Rust 编写的对端直接复用。
//! - **序列化/反序列化**: 线上可见的模型都派生 `serde::Serialize` 和 `serde::Deserialize`，
//!   字段名与线协议完全一致（蛇形命名）。
//! - **可调试性与克隆**: 所有模型也派生 `Debug` 和 `Clone`。

pub mod command_models; // 入站指令及其解析
pub mod enums; // 通用枚举类型定义
pub mod payloads; // 入站信封与出站消息负载
pub mod telemetry_models; // 遥测快照与导航目标

pub use command_models::{Command, CommandParseError};
pub use enums::{Direction, MotionPrimitive, ResponseStatus, SensorStatus};
pub use payloads::{InboundMessage, ServerMessage};
pub use telemetry_models::{NavigationTarget, TelemetrySnapshot};
