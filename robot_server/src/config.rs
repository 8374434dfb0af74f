//! 应用配置模块。
//!
//! 配置以 JSON 形式保存在 `robot_settings.json` 中。文件缺失或内容损坏时使用默认配置，
//! 并尝试把默认配置写回磁盘，方便现场人员直接修改。每个配置段都允许只写一部分字段，
//! 缺省字段取默认值。

use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use crate::error::AppError;

/// 配置文件名
pub const CONFIG_FILE_NAME: &str = "robot_settings.json";
/// 用于覆盖配置文件路径的环境变量
pub const CONFIG_PATH_ENV: &str = "ROBOT_SERVER_CONFIG";

/// 服务端默认监听地址
pub const DEFAULT_HOST: &str = "0.0.0.0";
/// 服务端默认监听端口
pub const DEFAULT_PORT: u16 = 5000;

/// TCP 服务相关配置
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// 绑定的主机地址
    pub host: String,
    /// 监听端口
    pub port: u16,
    /// 单次等待新连接的最长时间（毫秒），决定关闭信号被察觉的延迟
    pub accept_timeout_ms: u64,
    /// 向单个会话投递广播的最长等待时间（毫秒）
    pub send_timeout_ms: u64,
    /// 每个会话出站队列的容量
    pub outbound_queue_capacity: usize,
    /// 单个入站 JSON 帧允许的最大字节数
    pub max_frame_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            accept_timeout_ms: 1000,
            send_timeout_ms: 500,
            outbound_queue_capacity: 32,
            max_frame_bytes: 64 * 1024,
        }
    }
}

impl ServerConfig {
    /// 将 `host:port` 解析为套接字地址。
    pub fn socket_addr(&self) -> Result<SocketAddr, AppError> {
        let raw = format!("{}:{}", self.host, self.port);
        raw.to_socket_addrs()
            .map_err(|e| AppError::InvalidAddress(format!("{}: {}", raw, e)))?
            .next()
            .ok_or_else(|| AppError::InvalidAddress(format!("{}: 未解析出任何地址", raw)))
    }

    pub fn accept_timeout(&self) -> Duration {
        Duration::from_millis(self.accept_timeout_ms.max(1))
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms.max(1))
    }
}

/// 遥测相关配置
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct TelemetryConfig {
    /// 周期遥测广播的间隔（毫秒）
    pub broadcast_interval_ms: u64,
    /// 单次测距的超时时间（毫秒），超时后距离按 0 处理
    pub sensor_timeout_ms: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self { broadcast_interval_ms: 2000, sensor_timeout_ms: 100 }
    }
}

impl TelemetryConfig {
    pub fn broadcast_interval(&self) -> Duration {
        Duration::from_millis(self.broadcast_interval_ms.max(1))
    }

    pub fn sensor_timeout(&self) -> Duration {
        Duration::from_millis(self.sensor_timeout_ms.max(1))
    }
}

/// 手动运动指令相关配置
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct MotionConfig {
    /// 前进 / 后退脉冲时长（毫秒）
    pub move_duration_ms: u64,
    /// 左转 / 右转脉冲时长（毫秒）
    pub turn_duration_ms: u64,
    /// 平滑停车时减速脉冲的次数
    pub smart_stop_repeats: u32,
    /// 平滑停车时直行减速脉冲时长（毫秒）
    pub smart_stop_straight_step_ms: u64,
    /// 平滑停车时转向减速脉冲时长（毫秒）
    pub smart_stop_turn_step_ms: u64,
    /// 平滑停车时两次减速脉冲之间的间隔（毫秒）
    pub smart_stop_gap_ms: u64,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            move_duration_ms: 500,
            turn_duration_ms: 300,
            smart_stop_repeats: 3,
            smart_stop_straight_step_ms: 100,
            smart_stop_turn_step_ms: 50,
            smart_stop_gap_ms: 100,
        }
    }
}

impl MotionConfig {
    pub fn move_duration(&self) -> Duration {
        Duration::from_millis(self.move_duration_ms)
    }

    pub fn turn_duration(&self) -> Duration {
        Duration::from_millis(self.turn_duration_ms)
    }
}

/// 自主导航相关配置
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct AutonomousConfig {
    /// 小于此距离（厘米）即视为前方有障碍
    pub obstacle_threshold: f64,
    /// 选择右侧绕行所需的最小净空（厘米）
    pub min_clearance: f64,
    /// 发现障碍后停车等待的时长（毫秒）
    pub avoid_pause_ms: u64,
    /// 向右探测的转向时长（毫秒）
    pub right_probe_ms: u64,
    /// 向左探测的转向时长（毫秒），需要先抵消右探测的转角
    pub left_probe_ms: u64,
    /// 无障碍时前进脉冲时长（毫秒）
    pub forward_pulse_ms: u64,
    /// 两轮迭代之间的间隔（毫秒）
    pub iteration_interval_ms: u64,
}

impl Default for AutonomousConfig {
    fn default() -> Self {
        Self {
            obstacle_threshold: 15.0,
            min_clearance: 20.0,
            avoid_pause_ms: 500,
            right_probe_ms: 300,
            left_probe_ms: 600,
            forward_pulse_ms: 800,
            iteration_interval_ms: 500,
        }
    }
}

/// 模拟平台配置。没有真实硬件时，服务端驱动这个模拟的场地模型。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SimulationConfig {
    pub arena_width_cm: f64,
    pub arena_height_cm: f64,
    pub start_x_cm: f64,
    pub start_y_cm: f64,
    /// 初始朝向，0 度为 +x 方向，逆时针为正
    pub start_heading_deg: f64,
    pub speed_cm_per_s: f64,
    pub turn_rate_deg_per_s: f64,
    pub temperature_c: f64,
    pub battery_percent: u8,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            arena_width_cm: 300.0,
            arena_height_cm: 200.0,
            start_x_cm: 150.0,
            start_y_cm: 100.0,
            start_heading_deg: 0.0,
            speed_cm_per_s: 40.0,
            turn_rate_deg_per_s: 180.0,
            temperature_c: 25.0,
            battery_percent: 85,
        }
    }
}

/// 应用的主配置结构体
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub motion: MotionConfig,
    pub autonomous: AutonomousConfig,
    pub simulation: SimulationConfig,
}

// 全局静态应用配置实例
static APP_CONFIG: OnceLock<AppConfig> = OnceLock::new();

/// 从指定路径加载配置；文件不存在或损坏时使用默认配置并尝试写回。
pub fn load_or_create_config(config_file_path: &Path) -> AppConfig {
    match fs::read_to_string(config_file_path) {
        Ok(content) => match serde_json::from_str::<AppConfig>(&content) {
            Ok(config) => {
                info!("[配置模块] 已成功从配置文件 {:?} 加载应用配置。", config_file_path);
                config
            }
            Err(e) => {
                warn!(
                    "[配置模块] 警告：从 {:?} 反序列化配置失败: {}. 文件可能已损坏。将使用默认配置并尝试覆盖。",
                    config_file_path, e
                );
                let default_config = AppConfig::default();
                save_config(&default_config, config_file_path);
                default_config
            }
        },
        Err(e) => {
            info!(
                "[配置模块] 未在 {:?} 找到配置文件或读取时发生错误 (错误: {}). 将使用默认配置并尝试创建新文件。",
                config_file_path, e
            );
            let default_config = AppConfig::default();
            save_config(&default_config, config_file_path);
            default_config
        }
    }
}

/// 获取配置文件路径
///
/// 优先级：环境变量 `ROBOT_SERVER_CONFIG` > 当前目录（已存在或目录可写）> `$HOME/.config/robot_server/`。
pub fn config_file_path() -> PathBuf {
    if let Ok(explicit) = env::var(CONFIG_PATH_ENV) {
        if !explicit.trim().is_empty() {
            return PathBuf::from(explicit);
        }
    }

    let current_dir = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let local_path = current_dir.join(CONFIG_FILE_NAME);
    let dir_writable = fs::metadata(&current_dir).map(|m| !m.permissions().readonly()).unwrap_or(false);
    if local_path.exists() || dir_writable {
        return local_path;
    }

    // 当前目录不可写时退回到用户目录
    if let Ok(home) = env::var("HOME") {
        return PathBuf::from(home).join(".config").join("robot_server").join(CONFIG_FILE_NAME);
    }
    local_path
}

/// 保存配置到文件
pub fn save_config(config: &AppConfig, path: &Path) {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            if let Err(e) = fs::create_dir_all(parent) {
                warn!("[配置模块] 错误：创建配置目录 {:?} 失败: {}", parent, e);
                return;
            }
        }
    }

    match serde_json::to_string_pretty(config) {
        Ok(content) => {
            if let Err(e) = fs::write(path, content) {
                warn!("[配置模块] 错误：将配置写入文件 {:?} 时失败: {}", path, e);
            } else {
                info!("[配置模块] 已成功将当前配置保存到 {:?}.", path);
            }
        }
        Err(e) => {
            warn!("[配置模块] 错误：序列化配置信息以便保存时失败: {}", e);
        }
    }
}

/// 初始化全局应用配置。重复调用返回第一次加载的结果。
pub fn init_config() -> &'static AppConfig {
    let config = APP_CONFIG.get_or_init(|| load_or_create_config(&config_file_path()));
    info!("[配置模块] 应用配置已初始化完毕，监听地址 {}:{}。", config.server.host, config.server.port);
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn temp_config_path() -> PathBuf {
        env::temp_dir().join(format!("robot_server_config_test_{}", Uuid::new_v4())).join(CONFIG_FILE_NAME)
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.server.socket_addr().unwrap().port(), 5000);
        assert_eq!(config.telemetry.broadcast_interval(), Duration::from_secs(2));
        assert_eq!(config.motion.move_duration(), Duration::from_millis(500));
        assert_eq!(config.motion.turn_duration(), Duration::from_millis(300));
        assert_eq!(config.autonomous.obstacle_threshold, 15.0);
        assert_eq!(config.autonomous.min_clearance, 20.0);
        assert_eq!(config.simulation.battery_percent, 85);
    }

    #[test]
    /// 测试缺失文件时写出默认配置，再次加载得到相同内容。
    fn test_missing_file_is_created_with_defaults() {
        let path = temp_config_path();
        let first = load_or_create_config(&path);
        assert_eq!(first, AppConfig::default());
        assert!(path.exists(), "默认配置应被写回磁盘");

        let second = load_or_create_config(&path);
        assert_eq!(second, first);
        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    /// 测试部分字段的配置文件：缺省字段取默认值。
    fn test_partial_file_uses_field_defaults() {
        let path = temp_config_path();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, r#"{"server": {"port": 6001}, "autonomous": {"obstacle_threshold": 30.0}}"#).unwrap();

        let config = load_or_create_config(&path);
        assert_eq!(config.server.port, 6001);
        assert_eq!(config.server.host, DEFAULT_HOST);
        assert_eq!(config.autonomous.obstacle_threshold, 30.0);
        assert_eq!(config.autonomous.forward_pulse_ms, 800);
        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    /// 测试损坏的配置文件被默认配置覆盖。
    fn test_corrupt_file_is_replaced() {
        let path = temp_config_path();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "{ this is not json").unwrap();

        let config = load_or_create_config(&path);
        assert_eq!(config, AppConfig::default());
        let rewritten = fs::read_to_string(&path).unwrap();
        assert!(serde_json::from_str::<AppConfig>(&rewritten).is_ok());
        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_loopback_socket_addr() {
        let config = ServerConfig { host: "127.0.0.1".to_string(), port: 0, ..ServerConfig::default() };
        let addr = config.socket_addr().unwrap();
        assert!(addr.ip().is_loopback());
        assert_eq!(addr.port(), 0);
    }
}
