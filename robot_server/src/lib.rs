//! `robot_server` 服务端核心库。
//!
//! 本 Crate 实现 EduBot 机器人的指令与遥测 TCP 服务：操作员控制台通过 TCP 发送 JSON 指令，
//! 服务端驱动运动执行器并回复结果，同时周期性地向所有连接推送遥测数据，
//! 并可以运行一个自主避障导航循环。
//!
//! 主要模块包括：
//! - `config`: 管理应用的配置信息加载与访问。
//! - `error`: 定义应用特定的错误类型。
//! - `hardware`: 运动控制器与测距传感器的能力抽象、运动执行器、遥测源以及模拟平台。
//! - `tcp_server`: TCP 服务端，负责连接注册、消息路由、指令分发、遥测广播与自主导航。

pub mod config;
pub mod error;
pub mod hardware;
pub mod tcp_server;
