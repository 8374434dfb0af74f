//! 测距传感器与辅助读数接口。

use super::HardwareError;

/// 前向测距能力（例如超声波模块）。
///
/// 读数是同步且可能阻塞的；调用方负责把它放到阻塞线程池并加超时。
pub trait RangeSensor: Send {
    /// 测量前方障碍物的距离（厘米）。
    fn measure_distance(&mut self) -> Result<f64, HardwareError>;
}

/// 温度、电量等辅助读数。这些读数不会失败。
pub trait AuxiliarySensors: Send + Sync {
    /// 温度（摄氏度）
    fn temperature(&self) -> f64;
    /// 电池电量百分比
    fn battery_level(&self) -> u8;
}

/// 返回固定值的辅助读数，平台没有对应传感器时使用。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedAuxiliarySensors {
    pub temperature: f64,
    pub battery: u8,
}

impl FixedAuxiliarySensors {
    pub fn new(temperature: f64, battery: u8) -> Self {
        Self { temperature, battery }
    }
}

impl AuxiliarySensors for FixedAuxiliarySensors {
    fn temperature(&self) -> f64 {
        self.temperature
    }

    fn battery_level(&self) -> u8 {
        self.battery
    }
}
