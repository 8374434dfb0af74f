//! 线协议消息负载定义。
//!
//! 入站方向只有两种消息：`{"type":"command",...}` 与 `{"type":"test"}`；
//! 出站方向由 [`ServerMessage`] 统一描述，`type` 字段作为枚举标签。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::enums::{Direction, ResponseStatus};
use crate::telemetry_models::{NavigationTarget, TelemetrySnapshot};

/// 入站指令消息类型
pub const COMMAND_MESSAGE_TYPE: &str = "command";
/// 入站连接测试消息类型
pub const TEST_MESSAGE_TYPE: &str = "test";
/// 连接测试的固定应答文本
pub const TEST_RESPONSE_MESSAGE: &str = "Connection test successful";
/// 自主导航模式名称
pub const AUTONOMOUS_MODE: &str = "autonomous";

/// 解析后的入站消息信封。
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// 指令消息；`command` 缺失或不是字符串时保存其 JSON 文本（例如 `null`）。
    Command { command: String, data: Value },
    /// 连接测试。
    Test,
    /// 无法识别的 `type`（缺失时为 `null`）。
    Unknown(String),
}

/// 入站信封错误：合法 JSON 但不是对象。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EnvelopeError {
    #[error("expected a JSON object")]
    NotAnObject,
}

impl InboundMessage {
    /// 从已经成功解析的 JSON 值中读取信封。
    pub fn from_value(value: Value) -> Result<Self, EnvelopeError> {
        let Value::Object(mut object) = value else {
            return Err(EnvelopeError::NotAnObject);
        };
        let message_type = string_or_json(object.get("type"));
        match message_type.as_str() {
            COMMAND_MESSAGE_TYPE => {
                let command = string_or_json(object.get("command"));
                let data = object.remove("data").unwrap_or(Value::Null);
                Ok(InboundMessage::Command { command, data })
            }
            TEST_MESSAGE_TYPE => Ok(InboundMessage::Test),
            _ => Ok(InboundMessage::Unknown(message_type)),
        }
    }
}

fn string_or_json(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => "null".to_string(),
    }
}

/// 服务端发往对端的所有消息。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// 指令响应
    CommandResponse(CommandResponse),
    /// 连接测试响应
    TestResponse(TestResponse),
    /// 协议错误
    Error(ErrorResponse),
    /// 周期遥测推送
    SensorData(SensorDataPush),
    /// 自主导航进度推送
    AutonomousUpdate(AutonomousUpdatePush),
}

impl ServerMessage {
    /// 线协议上的 `type` 字段值，主要用于日志。
    pub fn message_type(&self) -> &'static str {
        match self {
            ServerMessage::CommandResponse(_) => "command_response",
            ServerMessage::TestResponse(_) => "test_response",
            ServerMessage::Error(_) => "error",
            ServerMessage::SensorData(_) => "sensor_data",
            ServerMessage::AutonomousUpdate(_) => "autonomous_update",
        }
    }

    /// 构造一个 `error` 消息。
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error(ErrorResponse { message: message.into() })
    }

    /// 构造连接测试的固定应答。
    pub fn test_response() -> Self {
        ServerMessage::TestResponse(TestResponse {
            message: TEST_RESPONSE_MESSAGE.to_string(),
            timestamp: Utc::now(),
        })
    }

    /// 构造周期遥测推送。
    pub fn sensor_data(data: TelemetrySnapshot) -> Self {
        ServerMessage::SensorData(SensorDataPush { data, timestamp: Utc::now() })
    }

    /// 构造自主导航进度推送。
    pub fn autonomous_update(sensor_data: TelemetrySnapshot, obstacle_detected: bool) -> Self {
        ServerMessage::AutonomousUpdate(AutonomousUpdatePush {
            data: AutonomousUpdate {
                sensor_data,
                obstacle_detected,
                mode: AUTONOMOUS_MODE.to_string(),
                timestamp: Utc::now(),
            },
        })
    }
}

/// `command_response` 消息体。除公共字段外，各指令按需附带可选字段。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CommandResponse {
    /// 回显的指令名
    pub command: String,
    pub status: ResponseStatus,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    /// `start_autonomous` 附带的模式与目标点
    #[serde(flatten)]
    pub autonomous: Option<AutonomousInfo>,
    /// `start_autonomous` / `get_sensors` 附带的遥测快照
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensor_data: Option<TelemetrySnapshot>,
    /// `stop_autonomous` 附带的最终遥测快照
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_sensor_data: Option<TelemetrySnapshot>,
    /// `get_status` 附带的状态数据
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_data: Option<StatusData>,
}

impl CommandResponse {
    fn new(command: &str, status: ResponseStatus, message: impl Into<String>) -> Self {
        Self {
            command: command.to_string(),
            status,
            message: message.into(),
            timestamp: Utc::now(),
            autonomous: None,
            sensor_data: None,
            final_sensor_data: None,
            status_data: None,
        }
    }

    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self::new(command, ResponseStatus::Success, message)
    }

    pub fn error(command: &str, message: impl Into<String>) -> Self {
        Self::new(command, ResponseStatus::Error, message)
    }

    pub fn with_autonomous(mut self, target: Option<NavigationTarget>) -> Self {
        self.autonomous = Some(AutonomousInfo { mode: AUTONOMOUS_MODE.to_string(), target });
        self
    }

    pub fn with_sensor_data(mut self, snapshot: TelemetrySnapshot) -> Self {
        self.sensor_data = Some(snapshot);
        self
    }

    pub fn with_final_sensor_data(mut self, snapshot: TelemetrySnapshot) -> Self {
        self.final_sensor_data = Some(snapshot);
        self
    }

    pub fn with_status_data(mut self, status_data: StatusData) -> Self {
        self.status_data = Some(status_data);
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success
    }
}

impl From<CommandResponse> for ServerMessage {
    fn from(response: CommandResponse) -> Self {
        ServerMessage::CommandResponse(response)
    }
}

/// 自主模式信息，平铺进 `command_response`。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AutonomousInfo {
    pub mode: String,
    pub target: Option<NavigationTarget>,
}

/// `get_status` 的状态数据。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StatusData {
    pub is_moving: bool,
    pub current_direction: Option<Direction>,
    /// 自主模式是否被启用
    pub auto_mode: bool,
    /// 自主导航循环体是否正在执行
    pub autonomous_running: bool,
    pub target: Option<NavigationTarget>,
    pub sensor_data: TelemetrySnapshot,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TestResponse {
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ErrorResponse {
    pub message: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SensorDataPush {
    pub data: TelemetrySnapshot,
    pub timestamp: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AutonomousUpdatePush {
    pub data: AutonomousUpdate,
}

/// 每一轮自主导航迭代后广播的进度数据。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AutonomousUpdate {
    pub sensor_data: TelemetrySnapshot,
    pub obstacle_detected: bool,
    pub mode: String,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enums::SensorStatus;
    use serde_json::json;

    #[test]
    /// 测试入站信封的解析：指令、测试、未知类型、缺失类型与非对象。
    fn test_inbound_envelope() {
        let command = InboundMessage::from_value(json!({
            "type": "command", "command": "move", "data": {"direction": "forward"}
        }));
        assert_eq!(
            command,
            Ok(InboundMessage::Command {
                command: "move".to_string(),
                data: json!({"direction": "forward"}),
            })
        );

        assert_eq!(InboundMessage::from_value(json!({"type": "test"})), Ok(InboundMessage::Test));
        assert_eq!(
            InboundMessage::from_value(json!({"type": "dance"})),
            Ok(InboundMessage::Unknown("dance".to_string()))
        );
        assert_eq!(
            InboundMessage::from_value(json!({"hello": 1})),
            Ok(InboundMessage::Unknown("null".to_string()))
        );
        assert_eq!(InboundMessage::from_value(json!([1, 2])), Err(EnvelopeError::NotAnObject));
    }

    #[test]
    /// 测试缺失 `command` 与 `data` 字段时的默认值。
    fn test_inbound_command_defaults() {
        let parsed = InboundMessage::from_value(json!({"type": "command"})).unwrap();
        assert_eq!(
            parsed,
            InboundMessage::Command { command: "null".to_string(), data: Value::Null }
        );
    }

    #[test]
    /// 测试连接测试应答的线协议形态。
    fn test_test_response_shape() {
        let value = serde_json::to_value(ServerMessage::test_response()).unwrap();
        assert_eq!(value["type"], "test_response");
        assert_eq!(value["message"], "Connection test successful");
    }

    #[test]
    /// 测试 `error` 消息只包含 `type` 与 `message`。
    fn test_error_shape() {
        let value = serde_json::to_value(ServerMessage::error("Invalid JSON: oops")).unwrap();
        assert_eq!(value, json!({"type": "error", "message": "Invalid JSON: oops"}));
    }

    #[test]
    /// 测试指令响应：可选字段缺省时不出现，启动自主导航时平铺 `mode` 与 `target`。
    fn test_command_response_shape() {
        let plain: ServerMessage = CommandResponse::success("move", "Moving forward").into();
        let value = serde_json::to_value(&plain).unwrap();
        assert_eq!(value["type"], "command_response");
        assert_eq!(value["command"], "move");
        assert_eq!(value["status"], "success");
        assert_eq!(value["message"], "Moving forward");
        assert!(value.get("sensor_data").is_none());
        assert!(value.get("mode").is_none());

        let snapshot = TelemetrySnapshot::new(30.0, 25.0, 85, SensorStatus::Active);
        let started: ServerMessage = CommandResponse::success("start_autonomous", "Autonomous navigation started")
            .with_autonomous(None)
            .with_sensor_data(snapshot)
            .into();
        let value = serde_json::to_value(&started).unwrap();
        assert_eq!(value["mode"], "autonomous");
        assert!(value["target"].is_null());
        assert_eq!(value["sensor_data"]["distance"], 30.0);

        let back: ServerMessage = serde_json::from_value(value).expect("指令响应应能被对端反序列化");
        assert_eq!(back, started);
    }

    #[test]
    /// 测试自主导航进度推送的嵌套结构。
    fn test_autonomous_update_shape() {
        let snapshot = TelemetrySnapshot::new(10.0, 25.0, 85, SensorStatus::Active);
        let value = serde_json::to_value(ServerMessage::autonomous_update(snapshot, true)).unwrap();
        assert_eq!(value["type"], "autonomous_update");
        assert_eq!(value["data"]["obstacle_detected"], true);
        assert_eq!(value["data"]["mode"], "autonomous");
        assert_eq!(value["data"]["sensor_data"]["distance"], 10.0);
    }
}
