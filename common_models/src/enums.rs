//! 通用枚举模块。
//!
//! 本模块定义了服务端与对端之间共享的通用枚举类型。它们在线协议上都以小写字符串表示，
//! 例如 `"forward"`、`"success"`、`"active"`。

use serde::{Deserialize, Serialize};
use std::fmt;

/// 平台当前（或最后一次下发的）运动方向。
///
/// "没有方向" 不是一个独立的成员，而是用 `Option<Direction>::None` 表示，
/// 在线协议上序列化为 `null`。
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// 前进
    Forward,
    /// 后退
    Backward,
    /// 原地左转
    Left,
    /// 原地右转
    Right,
}

impl Direction {
    /// 与该方向对应的运动原语。
    pub fn primitive(self) -> MotionPrimitive {
        match self {
            Direction::Forward => MotionPrimitive::Forward,
            Direction::Backward => MotionPrimitive::Backward,
            Direction::Left => MotionPrimitive::TurnLeft,
            Direction::Right => MotionPrimitive::TurnRight,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Forward => "forward",
            Direction::Backward => "backward",
            Direction::Left => "left",
            Direction::Right => "right",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 运动原语：执行器能接受的最小动作单元。
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MotionPrimitive {
    Forward,
    Backward,
    TurnLeft,
    TurnRight,
    Stop,
}

impl MotionPrimitive {
    /// 按 `move` 指令中 `data.direction` 的取值解析运动原语（不区分大小写）。
    ///
    /// 可识别的取值为 `forward`、`backward`、`left`、`right`、`stop`，其余返回 `None`。
    pub fn from_direction_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "forward" => Some(MotionPrimitive::Forward),
            "backward" => Some(MotionPrimitive::Backward),
            "left" => Some(MotionPrimitive::TurnLeft),
            "right" => Some(MotionPrimitive::TurnRight),
            "stop" => Some(MotionPrimitive::Stop),
            _ => None,
        }
    }

    /// 执行该原语后平台所处的运动方向；`Stop` 没有方向。
    pub fn direction(self) -> Option<Direction> {
        match self {
            MotionPrimitive::Forward => Some(Direction::Forward),
            MotionPrimitive::Backward => Some(Direction::Backward),
            MotionPrimitive::TurnLeft => Some(Direction::Left),
            MotionPrimitive::TurnRight => Some(Direction::Right),
            MotionPrimitive::Stop => None,
        }
    }

    /// 是否为原地转向原语。
    pub fn is_turn(self) -> bool {
        matches!(self, MotionPrimitive::TurnLeft | MotionPrimitive::TurnRight)
    }
}

impl fmt::Display for MotionPrimitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MotionPrimitive::Forward => "forward",
            MotionPrimitive::Backward => "backward",
            MotionPrimitive::TurnLeft => "turn_left",
            MotionPrimitive::TurnRight => "turn_right",
            MotionPrimitive::Stop => "stop",
        };
        f.write_str(name)
    }
}

/// 指令响应的结果状态。
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Error,
}

/// 遥测快照的健康状态。`Error` 表示本次快照是降级数据。
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SensorStatus {
    Active,
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    /// 测试方向名称解析：大小写不敏感，`stop` 合法，其他取值被拒绝。
    fn test_primitive_from_direction_name() {
        assert_eq!(MotionPrimitive::from_direction_name("forward"), Some(MotionPrimitive::Forward));
        assert_eq!(MotionPrimitive::from_direction_name("Backward"), Some(MotionPrimitive::Backward));
        assert_eq!(MotionPrimitive::from_direction_name("LEFT"), Some(MotionPrimitive::TurnLeft));
        assert_eq!(MotionPrimitive::from_direction_name("right"), Some(MotionPrimitive::TurnRight));
        assert_eq!(MotionPrimitive::from_direction_name("stop"), Some(MotionPrimitive::Stop));
        assert_eq!(MotionPrimitive::from_direction_name("sideways"), None);
        assert_eq!(MotionPrimitive::from_direction_name(""), None);
    }

    #[test]
    /// 测试原语与方向之间的对应关系是双向一致的。
    fn test_primitive_direction_mapping() {
        for direction in [Direction::Forward, Direction::Backward, Direction::Left, Direction::Right] {
            assert_eq!(direction.primitive().direction(), Some(direction));
        }
        assert_eq!(MotionPrimitive::Stop.direction(), None);
        assert!(MotionPrimitive::TurnLeft.is_turn());
        assert!(!MotionPrimitive::Forward.is_turn());
    }

    #[test]
    /// 测试枚举在线协议上的字符串形式。
    fn test_wire_representation() {
        assert_eq!(serde_json::to_string(&Direction::Left).unwrap(), "\"left\"");
        assert_eq!(serde_json::to_string(&ResponseStatus::Success).unwrap(), "\"success\"");
        assert_eq!(serde_json::to_string(&SensorStatus::Error).unwrap(), "\"error\"");
        let none: Option<Direction> = None;
        assert_eq!(serde_json::to_string(&none).unwrap(), "null");
    }
}
