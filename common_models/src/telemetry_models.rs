//! 遥测相关的数据模型。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::SensorStatus;

/// 某一时刻的遥测快照：距离、温度、电量与传感器健康状态。
///
/// 快照一经生成即不可变；每次请求或广播周期都会重新计算一个新的快照。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TelemetrySnapshot {
    /// 前方障碍物距离（厘米），恒为非负，保留两位小数。
    pub distance: f64,
    /// 温度（摄氏度）。
    pub temperature: f64,
    /// 电池电量百分比，取值范围 0..=100。
    pub battery: u8,
    /// 快照生成时间 (UTC)。
    pub timestamp: DateTime<Utc>,
    /// 本次读数是否正常。
    pub status: SensorStatus,
}

impl TelemetrySnapshot {
    /// 创建一个快照，并对输入做规整：距离钳制为非负并四舍五入到两位小数，
    /// 非有限值（NaN / 无穷）视为 0；电量钳制到 100 以内。
    pub fn new(distance: f64, temperature: f64, battery: u8, status: SensorStatus) -> Self {
        Self {
            distance: normalize_distance(distance),
            temperature,
            battery: battery.min(100),
            timestamp: Utc::now(),
            status,
        }
    }

    /// 传感器读取失败时使用的降级快照：距离为 0，状态为 `error`。
    pub fn degraded(temperature: f64, battery: u8) -> Self {
        Self::new(0.0, temperature, battery, SensorStatus::Error)
    }

    pub fn is_degraded(&self) -> bool {
        self.status == SensorStatus::Error
    }
}

fn normalize_distance(distance: f64) -> f64 {
    if !distance.is_finite() || distance <= 0.0 {
        return 0.0;
    }
    (distance * 100.0).round() / 100.0
}

/// 自主导航的目标点。两个坐标都允许缺省。
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct NavigationTarget {
    pub target_x: Option<f64>,
    pub target_y: Option<f64>,
}

impl NavigationTarget {
    pub fn new(target_x: Option<f64>, target_y: Option<f64>) -> Self {
        Self { target_x, target_y }
    }
}
