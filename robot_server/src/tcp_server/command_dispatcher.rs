//! 指令分发器。
//!
//! 把解析后的 `Command` 映射为执行器动作、自主导航启停以及一条 `CommandResponse`。
//! 分发器从不 panic，也不向外返回错误：解析失败和执行器错误都变成 `status: "error"` 的响应。

use std::sync::Arc;
use std::time::Duration;

use common_models::command_models::TEST_COMMAND;
use common_models::payloads::{CommandResponse, StatusData, TEST_RESPONSE_MESSAGE};
use common_models::{Command, MotionPrimitive, NavigationTarget, ServerMessage};
use log::{debug, error, info, warn};
use serde_json::Value;

use crate::config::MotionConfig;
use crate::hardware::motion_controller::{MotionActuator, SmartStopProfile};
use crate::hardware::telemetry_source::TelemetrySource;
use crate::hardware::HardwareError;
use crate::tcp_server::autonomous_navigator::{AutonomousNavigator, StartOutcome};

/// 指令分发器，所有会话共享同一个实例。
pub struct CommandDispatcher {
    actuator: MotionActuator,
    telemetry: TelemetrySource,
    navigator: Arc<AutonomousNavigator>,
    motion: MotionConfig,
}

impl CommandDispatcher {
    pub fn new(
        actuator: MotionActuator,
        telemetry: TelemetrySource,
        navigator: Arc<AutonomousNavigator>,
        motion: MotionConfig,
    ) -> Self {
        Self { actuator, telemetry, navigator, motion }
    }

    pub fn navigator(&self) -> &Arc<AutonomousNavigator> {
        &self.navigator
    }

    pub fn actuator(&self) -> &MotionActuator {
        &self.actuator
    }

    /// 解析指令名与 `data` 字段并执行。无法识别的指令名或方向以错误响应返回，不做任何动作。
    pub async fn dispatch_raw(&self, name: &str, data: &Value) -> CommandResponse {
        match Command::parse(name, data) {
            Ok(command) => self.dispatch(command).await,
            Err(e) => {
                warn!("[指令分发] 无法解析指令 '{}': {}", name, e);
                CommandResponse::error(name, e.to_string())
            }
        }
    }

    /// 执行一条指令并生成要写回的消息。连接测试回复 `test_response`，其余指令回复 `command_response`。
    pub async fn respond(&self, command: Command) -> ServerMessage {
        match command {
            Command::Test => ServerMessage::test_response(),
            other => ServerMessage::from(self.dispatch(other).await),
        }
    }

    /// 执行一条指令并生成响应。
    pub async fn dispatch(&self, command: Command) -> CommandResponse {
        let name = command.name();
        if command.actuates() {
            info!("[指令分发] 执行运动类指令: {:?}", command);
        } else {
            debug!("[指令分发] 执行查询类指令: {:?}", command);
        }
        match command {
            Command::Move { primitive } => self.handle_move(name, primitive).await,
            Command::EmergencyStop => {
                info!("[指令分发] 急停！");
                self.navigator.stop().await;
                match self.actuator.emergency_stop().await {
                    Ok(()) => CommandResponse::success(name, "Emergency stop executed"),
                    Err(e) => actuation_failed(name, e),
                }
            }
            Command::SmartStop => match self.actuator.smart_stop(self.smart_stop_profile()).await {
                Ok(decelerated) => {
                    info!("[指令分发] 平滑停车完成 (是否减速: {})。", decelerated);
                    CommandResponse::success(name, "Smart stop completed")
                }
                Err(e) => actuation_failed(name, e),
            },
            Command::StartAutonomous { target } => self.handle_start_autonomous(name, target).await,
            Command::StopAutonomous => {
                self.navigator.stop().await;
                if let Err(e) = self.actuator.stop().await {
                    return actuation_failed(name, e);
                }
                let snapshot = self.telemetry.snapshot().await;
                CommandResponse::success(name, "Autonomous navigation stopped").with_final_sensor_data(snapshot)
            }
            Command::GetStatus => {
                let motion = self.actuator.state();
                let autonomous = self.navigator.state();
                let status_data = StatusData {
                    is_moving: motion.moving,
                    current_direction: motion.direction,
                    auto_mode: autonomous.enabled,
                    autonomous_running: autonomous.running,
                    target: autonomous.target,
                    sensor_data: self.telemetry.snapshot().await,
                };
                CommandResponse::success(name, "Status retrieved").with_status_data(status_data)
            }
            Command::GetSensors => {
                let snapshot = self.telemetry.snapshot().await;
                CommandResponse::success(name, "Sensor data retrieved").with_sensor_data(snapshot)
            }
            Command::Stop => match self.actuator.stop().await {
                Ok(()) => CommandResponse::success(name, "Emergency stop executed"),
                Err(e) => actuation_failed(name, e),
            },
            Command::Test => CommandResponse::success(TEST_COMMAND, TEST_RESPONSE_MESSAGE),
        }
    }

    async fn handle_move(&self, name: &str, primitive: MotionPrimitive) -> CommandResponse {
        if primitive == MotionPrimitive::Stop {
            return match self.actuator.stop().await {
                Ok(()) => CommandResponse::success(name, "Stopping motors"),
                Err(e) => actuation_failed(name, e),
            };
        }
        match self.actuator.actuate(primitive, self.pulse_duration(primitive)).await {
            Ok(_) => CommandResponse::success(name, move_message(primitive)),
            Err(e) => actuation_failed(name, e),
        }
    }

    async fn handle_start_autonomous(&self, name: &str, target: Option<NavigationTarget>) -> CommandResponse {
        if self.navigator.start(target).await == StartOutcome::AlreadyRunning {
            debug!("[指令分发] 自主导航已在运行，本次启动为空操作。");
        }
        // 重复启动时回报正在生效的目标点
        let active_target = self.navigator.state().target;
        let snapshot = self.telemetry.snapshot().await;
        CommandResponse::success(name, "Autonomous navigation started")
            .with_autonomous(active_target)
            .with_sensor_data(snapshot)
    }

    fn pulse_duration(&self, primitive: MotionPrimitive) -> Duration {
        if primitive.is_turn() {
            self.motion.turn_duration()
        } else {
            self.motion.move_duration()
        }
    }

    fn smart_stop_profile(&self) -> SmartStopProfile {
        SmartStopProfile {
            repeats: self.motion.smart_stop_repeats,
            straight_step: Duration::from_millis(self.motion.smart_stop_straight_step_ms),
            turn_step: Duration::from_millis(self.motion.smart_stop_turn_step_ms),
            gap: Duration::from_millis(self.motion.smart_stop_gap_ms),
        }
    }
}

fn move_message(primitive: MotionPrimitive) -> &'static str {
    match primitive {
        MotionPrimitive::Forward => "Moving forward",
        MotionPrimitive::Backward => "Moving backward",
        MotionPrimitive::TurnLeft => "Turning left",
        MotionPrimitive::TurnRight => "Turning right",
        MotionPrimitive::Stop => "Stopping motors",
    }
}

fn actuation_failed(name: &str, e: HardwareError) -> CommandResponse {
    error!("[指令分发] 指令 '{}' 执行失败: {}", name, e);
    CommandResponse::error(name, format!("Actuation failed: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AutonomousConfig, MotionConfig};
    use crate::hardware::range_sensor::FixedAuxiliarySensors;
    use crate::hardware::simulated::{ActuationLog, RangeScript, RecordingMotionController, ScriptedRangeSensor};
    use crate::tcp_server::connection_manager::ConnectionManager;
    use common_models::{Direction, ResponseStatus, SensorStatus};
    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    struct Fixture {
        dispatcher: CommandDispatcher,
        log: ActuationLog,
        script: RangeScript,
    }

    fn fast_motion() -> MotionConfig {
        MotionConfig {
            move_duration_ms: 10,
            turn_duration_ms: 5,
            smart_stop_repeats: 3,
            smart_stop_straight_step_ms: 2,
            smart_stop_turn_step_ms: 1,
            smart_stop_gap_ms: 2,
        }
    }

    fn fast_autonomous() -> AutonomousConfig {
        AutonomousConfig {
            avoid_pause_ms: 5,
            right_probe_ms: 5,
            left_probe_ms: 10,
            forward_pulse_ms: 10,
            iteration_interval_ms: 10,
            ..AutonomousConfig::default()
        }
    }

    fn fixture_with(controller: RecordingMotionController, log: ActuationLog) -> Fixture {
        let (sensor, script) = ScriptedRangeSensor::new(120.0);
        let actuator = MotionActuator::new(Box::new(controller));
        let telemetry = TelemetrySource::new(
            Box::new(sensor),
            Arc::new(FixedAuxiliarySensors::new(25.0, 85)),
            Duration::from_millis(200),
        );
        let navigator = Arc::new(AutonomousNavigator::new(
            actuator.clone(),
            telemetry.clone(),
            Arc::new(ConnectionManager::new()),
            fast_autonomous(),
            Duration::from_millis(50),
            CancellationToken::new(),
        ));
        Fixture { dispatcher: CommandDispatcher::new(actuator, telemetry, navigator, fast_motion()), log, script }
    }

    fn fixture() -> Fixture {
        let (controller, log) = RecordingMotionController::new();
        fixture_with(controller, log)
    }

    #[tokio::test]
    async fn test_move_forward() {
        let f = fixture();
        let response = f.dispatcher.dispatch_raw("move", &json!({"direction": "forward"})).await;
        assert!(response.is_success());
        assert_eq!(response.command, "move");
        assert_eq!(response.message, "Moving forward");

        assert!(f.dispatcher.actuator().state().is_stopped(), "脉冲结束后电机已释放");
        assert_eq!(f.log.primitives(), vec![MotionPrimitive::Forward, MotionPrimitive::Stop]);
    }

    #[tokio::test]
    async fn test_move_messages_per_direction() {
        let f = fixture();
        for (direction, expected) in [
            ("backward", "Moving backward"),
            ("left", "Turning left"),
            ("RIGHT", "Turning right"),
            ("stop", "Stopping motors"),
        ] {
            let response = f.dispatcher.dispatch_raw("move", &json!({ "direction": direction })).await;
            assert!(response.is_success(), "方向 {} 应成功", direction);
            assert_eq!(response.message, expected);
        }
        assert!(f.dispatcher.actuator().state().is_stopped());
    }

    #[tokio::test]
    /// 测试未知方向：错误响应点名该值，且不驱动执行器、不改变运动状态。
    async fn test_unknown_direction_is_rejected() {
        let f = fixture();
        f.dispatcher.dispatch_raw("move", &json!({"direction": "left"})).await;
        let before = f.dispatcher.actuator().state();
        let actuations = f.log.len();

        let response = f.dispatcher.dispatch_raw("move", &json!({"direction": "sideways"})).await;
        assert_eq!(response.status, ResponseStatus::Error);
        assert!(response.message.contains("sideways"));
        assert_eq!(f.dispatcher.actuator().state(), before);
        assert_eq!(f.log.len(), actuations);
    }

    #[tokio::test]
    async fn test_unknown_command_is_rejected() {
        let f = fixture();
        let response = f.dispatcher.dispatch_raw("fly", &Value::Null).await;
        assert_eq!(response.status, ResponseStatus::Error);
        assert_eq!(response.message, "Unknown command: fly");
        assert_eq!(response.command, "fly");
        assert!(f.log.is_empty());
    }

    #[tokio::test]
    /// 测试所有已知指令都返回 success 或 error，且不会 panic。
    async fn test_every_known_command_responds() {
        let f = fixture();
        for name in common_models::command_models::KNOWN_COMMANDS {
            let response = f.dispatcher.dispatch_raw(name, &json!({"direction": "forward"})).await;
            assert!(matches!(response.status, ResponseStatus::Success | ResponseStatus::Error));
            assert_eq!(response.command, name);
        }
        f.dispatcher.navigator().stop().await;
        assert!(f.dispatcher.navigator().wait_stopped(Duration::from_secs(2)).await);
    }

    #[tokio::test]
    /// 测试执行器报错时以 "Actuation failed" 错误响应返回。
    async fn test_actuation_failure_is_reported() {
        let (controller, log) = RecordingMotionController::failing_on(MotionPrimitive::Forward);
        let f = fixture_with(controller, log);
        let response = f.dispatcher.dispatch_raw("move", &json!({"direction": "forward"})).await;
        assert_eq!(response.status, ResponseStatus::Error);
        assert!(response.message.starts_with("Actuation failed: "));
    }

    #[tokio::test]
    async fn test_get_sensors_and_status() {
        let f = fixture();
        f.script.push_reading(33.333);
        let response = f.dispatcher.dispatch(Command::GetSensors).await;
        assert_eq!(response.message, "Sensor data retrieved");
        let sensor_data = response.sensor_data.expect("应附带遥测快照");
        assert_eq!(sensor_data.distance, 33.33);
        assert_eq!(sensor_data.status, SensorStatus::Active);

        f.dispatcher.dispatch_raw("move", &json!({"direction": "backward"})).await;
        let response = f.dispatcher.dispatch(Command::GetStatus).await;
        let status = response.status_data.expect("应附带状态数据");
        assert!(!status.is_moving);
        assert_eq!(status.current_direction, None);
        assert!(!status.auto_mode);
        assert!(!status.autonomous_running);
        assert!(status.sensor_data.distance >= 0.0);
    }

    #[tokio::test]
    async fn test_smart_stop_and_stop() {
        let f = fixture();
        f.dispatcher.dispatch_raw("move", &json!({"direction": "forward"})).await;
        f.log.clear();
        let response = f.dispatcher.dispatch(Command::SmartStop).await;
        assert_eq!(response.message, "Smart stop completed");
        assert_eq!(f.log.count(MotionPrimitive::Forward), 3);
        assert!(f.dispatcher.actuator().state().is_stopped());

        let response = f.dispatcher.dispatch(Command::Stop).await;
        assert_eq!(response.message, "Emergency stop executed");
        assert!(response.is_success());
    }

    #[tokio::test]
    /// 测试运动进行中查询状态会报告该方向。
    async fn test_status_during_move_reports_direction() {
        let f = fixture();
        let motion = MotionConfig { move_duration_ms: 300, ..fast_motion() };
        let dispatcher = Arc::new(CommandDispatcher::new(
            f.dispatcher.actuator().clone(),
            f.dispatcher.telemetry.clone(),
            Arc::clone(f.dispatcher.navigator()),
            motion,
        ));
        let moving = Arc::clone(&dispatcher);
        let pulse = tokio::spawn(async move { moving.dispatch_raw("move", &json!({"direction": "backward"})).await });
        while f.log.is_empty() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        let status = dispatcher.dispatch(Command::GetStatus).await.status_data.expect("应附带状态数据");
        assert!(status.is_moving);
        assert_eq!(status.current_direction, Some(Direction::Backward));
        assert!(pulse.await.unwrap().is_success());
    }

    #[tokio::test]
    async fn test_connection_test_reply() {
        let f = fixture();
        match f.dispatcher.respond(Command::Test).await {
            ServerMessage::TestResponse(reply) => assert_eq!(reply.message, TEST_RESPONSE_MESSAGE),
            other => panic!("应回复 test_response，实际为 {:?}", other),
        }
        assert!(matches!(f.dispatcher.respond(Command::GetSensors).await, ServerMessage::CommandResponse(_)));
        assert!(f.log.is_empty());
    }

    #[tokio::test]
    /// 测试自主导航启动、重复启动与停止。
    async fn test_start_and_stop_autonomous() {
        let f = fixture();
        let target = NavigationTarget::new(Some(1.5), Some(2.0));
        let response = f.dispatcher.dispatch(Command::StartAutonomous { target: Some(target) }).await;
        assert!(response.is_success());
        assert_eq!(response.message, "Autonomous navigation started");
        let info = response.autonomous.expect("应附带自主模式信息");
        assert_eq!(info.mode, "autonomous");
        assert_eq!(info.target, Some(target));
        assert!(response.sensor_data.is_some());
        assert!(f.dispatcher.navigator().state().enabled);

        let again = f.dispatcher.dispatch(Command::StartAutonomous { target: None }).await;
        assert!(again.is_success());
        assert_eq!(again.autonomous.and_then(|info| info.target), Some(target));
        assert_eq!(f.dispatcher.navigator().state().target, Some(target), "重复启动不应改变目标");

        let stopped = f.dispatcher.dispatch(Command::StopAutonomous).await;
        assert_eq!(stopped.message, "Autonomous navigation stopped");
        assert!(stopped.final_sensor_data.is_some());
        assert!(!f.dispatcher.navigator().state().enabled);
        assert!(f.dispatcher.navigator().wait_stopped(Duration::from_secs(2)).await);
        assert!(!f.dispatcher.navigator().state().running);
    }

    #[tokio::test]
    /// 测试急停：运动状态清空，自主模式关闭。
    async fn test_emergency_stop_clears_everything() {
        let f = fixture();
        f.dispatcher.dispatch(Command::StartAutonomous { target: None }).await;
        f.dispatcher.dispatch_raw("move", &json!({"direction": "left"})).await;

        let response = f.dispatcher.dispatch(Command::EmergencyStop).await;
        assert_eq!(response.message, "Emergency stop executed");
        assert!(f.dispatcher.actuator().state().is_stopped());
        assert!(!f.dispatcher.navigator().state().enabled);
        assert!(f.dispatcher.navigator().wait_stopped(Duration::from_secs(2)).await);
        assert!(f.dispatcher.actuator().state().is_stopped());
        assert!(!f.dispatcher.navigator().state().running);
    }
}
