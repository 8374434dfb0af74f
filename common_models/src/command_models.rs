//! 指令模型：从 `{"type":"command","command":<name>,"data":{...}}` 入站消息中解析出的指令。

use serde_json::Value;
use thiserror::Error;

use crate::enums::MotionPrimitive;
use crate::telemetry_models::NavigationTarget;

/// `move` 指令名
pub const MOVE_COMMAND: &str = "move";
/// `emergency_stop` 指令名
pub const EMERGENCY_STOP_COMMAND: &str = "emergency_stop";
/// `smart_stop` 指令名
pub const SMART_STOP_COMMAND: &str = "smart_stop";
/// `start_autonomous` 指令名
pub const START_AUTONOMOUS_COMMAND: &str = "start_autonomous";
/// `stop_autonomous` 指令名
pub const STOP_AUTONOMOUS_COMMAND: &str = "stop_autonomous";
/// `get_status` 指令名
pub const GET_STATUS_COMMAND: &str = "get_status";
/// `get_sensors` 指令名
pub const GET_SENSORS_COMMAND: &str = "get_sensors";
/// `stop` 指令名
pub const STOP_COMMAND: &str = "stop";
/// 连接测试（来自 `{"type":"test"}`，不是 `command` 消息）
pub const TEST_COMMAND: &str = "test";

/// 所有可识别的 `command` 指令名。
pub const KNOWN_COMMANDS: [&str; 8] = [
    MOVE_COMMAND,
    EMERGENCY_STOP_COMMAND,
    SMART_STOP_COMMAND,
    START_AUTONOMOUS_COMMAND,
    STOP_AUTONOMOUS_COMMAND,
    GET_STATUS_COMMAND,
    GET_SENSORS_COMMAND,
    STOP_COMMAND,
];

/// 服务端可执行的指令。
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// 执行一次运动原语（`data.direction` 为 `stop` 时即停车）。
    Move { primitive: MotionPrimitive },
    /// 急停：立即停车并退出自主模式。
    EmergencyStop,
    /// 平滑停车：按当前方向做几次逐渐变短的减速脉冲后停车。
    SmartStop,
    /// 启动自主导航，目标点可选。
    StartAutonomous { target: Option<NavigationTarget> },
    /// 停止自主导航。
    StopAutonomous,
    /// 查询运动状态、自主状态与遥测快照。
    GetStatus,
    /// 仅查询遥测快照。
    GetSensors,
    /// 普通停车，不影响自主模式。
    Stop,
    /// 连接测试。
    Test,
}

/// 指令解析错误。属于协议错误，只会回报给发出该消息的对端。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CommandParseError {
    /// 指令名无法识别（缺失时为 `null`）。
    #[error("Unknown command: {0}")]
    UnknownCommand(String),
    /// `move` 指令的方向无法识别。
    #[error("Unknown direction: {0}")]
    UnknownDirection(String),
    /// 字段存在但类型不对。
    #[error("Invalid field '{field}': {reason}")]
    InvalidField { field: &'static str, reason: String },
}

impl Command {
    /// 由指令名和 `data` 字段解析指令。
    ///
    /// `data` 缺省时调用方应传入 `Value::Null`，各指令会按"空参数"处理。
    pub fn parse(name: &str, data: &Value) -> Result<Command, CommandParseError> {
        match name {
            MOVE_COMMAND => {
                let direction = match data.get("direction") {
                    None | Some(Value::Null) => String::new(),
                    Some(Value::String(s)) => s.clone(),
                    Some(other) => other.to_string(),
                };
                MotionPrimitive::from_direction_name(&direction)
                    .map(|primitive| Command::Move { primitive })
                    .ok_or_else(|| CommandParseError::UnknownDirection(direction.to_ascii_lowercase()))
            }
            EMERGENCY_STOP_COMMAND => Ok(Command::EmergencyStop),
            SMART_STOP_COMMAND => Ok(Command::SmartStop),
            START_AUTONOMOUS_COMMAND => {
                let target_x = parse_coordinate(data, "target_x")?;
                let target_y = parse_coordinate(data, "target_y")?;
                let target = (target_x.is_some() || target_y.is_some())
                    .then(|| NavigationTarget::new(target_x, target_y));
                Ok(Command::StartAutonomous { target })
            }
            STOP_AUTONOMOUS_COMMAND => Ok(Command::StopAutonomous),
            GET_STATUS_COMMAND => Ok(Command::GetStatus),
            GET_SENSORS_COMMAND => Ok(Command::GetSensors),
            STOP_COMMAND => Ok(Command::Stop),
            other => Err(CommandParseError::UnknownCommand(other.to_string())),
        }
    }

    /// 在响应中回显的指令名。
    pub fn name(&self) -> &'static str {
        match self {
            Command::Move { .. } => MOVE_COMMAND,
            Command::EmergencyStop => EMERGENCY_STOP_COMMAND,
            Command::SmartStop => SMART_STOP_COMMAND,
            Command::StartAutonomous { .. } => START_AUTONOMOUS_COMMAND,
            Command::StopAutonomous => STOP_AUTONOMOUS_COMMAND,
            Command::GetStatus => GET_STATUS_COMMAND,
            Command::GetSensors => GET_SENSORS_COMMAND,
            Command::Stop => STOP_COMMAND,
            Command::Test => TEST_COMMAND,
        }
    }

    /// 该指令是否会驱动执行器。
    pub fn actuates(&self) -> bool {
        matches!(
            self,
            Command::Move { .. }
                | Command::EmergencyStop
                | Command::SmartStop
                | Command::StopAutonomous
                | Command::Stop
        )
    }
}

fn parse_coordinate(data: &Value, field: &'static str) -> Result<Option<f64>, CommandParseError> {
    match data.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Ok(n.as_f64()),
        Some(Value::String(s)) => s.trim().parse::<f64>().map(Some).map_err(|e| {
            CommandParseError::InvalidField { field, reason: e.to_string() }
        }),
        Some(other) => Err(CommandParseError::InvalidField {
            field,
            reason: format!("expected a number, got {}", other),
        }),
    }
}
