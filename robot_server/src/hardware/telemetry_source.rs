//! 遥测源：把测距读数与辅助读数组合成 `TelemetrySnapshot`。
//!
//! 测距在阻塞线程池中执行，并受 `sensor_timeout` 约束：
//! - 超时：距离按 0 处理，状态仍为 `active`；
//! - 传感器报错或阻塞任务失败：返回降级快照（距离 0，状态 `error`）。
//!
//! 对外的 `snapshot()` 永远不会失败。

use std::sync::{Arc, Mutex};
use std::time::Duration;

use common_models::{SensorStatus, TelemetrySnapshot};
use log::{debug, warn};

use super::range_sensor::{AuxiliarySensors, RangeSensor};
use super::HardwareError;

/// 一次测距的结果。
#[derive(Debug, Clone, PartialEq)]
pub enum DistanceReading {
    Measured(f64),
    TimedOut,
    Failed(String),
}

impl DistanceReading {
    /// 用于控制决策的距离值：非正常读数一律按 0 处理。
    pub fn distance(&self) -> f64 {
        match self {
            DistanceReading::Measured(d) if d.is_finite() && *d > 0.0 => *d,
            _ => 0.0,
        }
    }
}

/// 可克隆的遥测源句柄，所有克隆共享同一个传感器。
#[derive(Clone)]
pub struct TelemetrySource {
    sensor: Arc<Mutex<Box<dyn RangeSensor>>>,
    auxiliary: Arc<dyn AuxiliarySensors>,
    sensor_timeout: Duration,
}

impl TelemetrySource {
    pub fn new(sensor: Box<dyn RangeSensor>, auxiliary: Arc<dyn AuxiliarySensors>, sensor_timeout: Duration) -> Self {
        Self { sensor: Arc::new(Mutex::new(sensor)), auxiliary, sensor_timeout }
    }

    pub fn sensor_timeout(&self) -> Duration {
        self.sensor_timeout
    }

    /// 读取一次前向距离。
    pub async fn read_distance(&self) -> DistanceReading {
        let sensor = Arc::clone(&self.sensor);
        let task = tokio::task::spawn_blocking(move || {
            let mut guard = sensor
                .lock()
                .map_err(|_| HardwareError::Unavailable("range sensor lock poisoned".to_string()))?;
            guard.measure_distance()
        });

        match tokio::time::timeout(self.sensor_timeout, task).await {
            Ok(Ok(Ok(distance))) => DistanceReading::Measured(distance),
            Ok(Ok(Err(e))) => {
                warn!("[遥测源] 测距失败: {}", e);
                DistanceReading::Failed(e.to_string())
            }
            Ok(Err(join_error)) => {
                warn!("[遥测源] 测距任务异常结束: {}", join_error);
                DistanceReading::Failed(join_error.to_string())
            }
            Err(_) => {
                debug!("[遥测源] 测距在 {:?} 内未完成，按 0 处理。", self.sensor_timeout);
                DistanceReading::TimedOut
            }
        }
    }

    /// 读取一次用于控制决策的距离，失败或超时为 0。
    pub async fn distance(&self) -> f64 {
        self.read_distance().await.distance()
    }

    /// 生成一个遥测快照。
    pub async fn snapshot(&self) -> TelemetrySnapshot {
        let temperature = self.auxiliary.temperature();
        let battery = self.auxiliary.battery_level();
        match self.read_distance().await {
            DistanceReading::Measured(distance) => TelemetrySnapshot::new(distance, temperature, battery, SensorStatus::Active),
            DistanceReading::TimedOut => TelemetrySnapshot::new(0.0, temperature, battery, SensorStatus::Active),
            DistanceReading::Failed(_) => TelemetrySnapshot::degraded(temperature, battery),
        }
    }
}
