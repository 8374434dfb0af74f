//! 硬件能力抽象。
//!
//! 真实的电机驱动和超声波测距模块都在服务端之外，这里只定义服务端依赖的能力接口：
//! - `motion_controller`: `MotionController` 接口，以及把它包装成串行化执行器的 `MotionActuator`。
//! - `range_sensor`: `RangeSensor` 测距接口与温度、电量等辅助读数接口。
//! - `telemetry_source`: 把测距与辅助读数组合成遥测快照，带超时与降级。
//! - `simulated`: 模拟场地平台与测试替身。

pub mod motion_controller;
pub mod range_sensor;
pub mod simulated;
pub mod telemetry_source;

use common_models::MotionPrimitive;
use thiserror::Error;

/// 硬件访问错误。
///
/// 这些错误在调用点被捕获并记录，指令以 `status: "error"` 回复，不会让会话或后台循环退出。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HardwareError {
    /// 电机驱动拒绝或未能执行某个运动原语。
    #[error("motor driver failed to apply {primitive}: {reason}")]
    Actuation { primitive: MotionPrimitive, reason: String },

    /// 测距读数失败。
    #[error("range sensor read failed: {0}")]
    SensorRead(String),

    /// 设备句柄不可用（例如上一次访问时线程崩溃导致锁中毒）。
    #[error("device unavailable: {0}")]
    Unavailable(String),
}
