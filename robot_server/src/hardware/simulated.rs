//! 模拟平台与测试替身。
//!
//! `SimulatedPlatform` 是一个矩形场地模型：机器人有位置和朝向，前进 / 后退脉冲按固定速度
//! 移动，转向按固定角速度旋转，测距读数是沿朝向到最近墙面的射线距离（厘米）。
//! 没有真实硬件时，服务端二进制就驱动这个模型。
//!
//! `RecordingMotionController` 与 `ScriptedRangeSensor` 是供测试使用的可编排替身。

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use common_models::MotionPrimitive;
use log::debug;

use super::motion_controller::MotionController;
use super::range_sensor::{FixedAuxiliarySensors, RangeSensor};
use super::HardwareError;
use crate::config::SimulationConfig;

fn lock_recovering<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// 一条执行记录。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActuationRecord {
    pub primitive: MotionPrimitive,
    pub at: Instant,
}

/// 模拟平台只保留最近的这么多条执行记录
pub const SIMULATION_LOG_CAPACITY: usize = 256;

/// 共享的执行记录，测试通过它观察下发过的运动原语。
#[derive(Debug, Clone, Default)]
pub struct ActuationLog {
    records: Arc<Mutex<VecDeque<ActuationRecord>>>,
    /// 设置后超出容量时丢弃最早的记录
    capacity: Option<usize>,
}

impl ActuationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// 只保留最近 `capacity` 条记录的执行记录。
    pub fn bounded(capacity: usize) -> Self {
        Self { records: Arc::default(), capacity: Some(capacity.max(1)) }
    }

    fn push(&self, primitive: MotionPrimitive) {
        let mut records = lock_recovering(&self.records);
        if let Some(capacity) = self.capacity {
            while records.len() >= capacity {
                records.pop_front();
            }
        }
        records.push_back(ActuationRecord { primitive, at: Instant::now() });
    }

    pub fn records(&self) -> Vec<ActuationRecord> {
        lock_recovering(&self.records).iter().copied().collect()
    }

    pub fn primitives(&self) -> Vec<MotionPrimitive> {
        lock_recovering(&self.records).iter().map(|r| r.primitive).collect()
    }

    /// 某个原语被下发的次数
    pub fn count(&self, primitive: MotionPrimitive) -> usize {
        lock_recovering(&self.records).iter().filter(|r| r.primitive == primitive).count()
    }

    pub fn len(&self) -> usize {
        lock_recovering(&self.records).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        lock_recovering(&self.records).clear();
    }
}

/// 机器人在场地中的位姿。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    /// 朝向，0 度为 +x 方向，逆时针为正，取值范围 [0, 360)
    pub heading_deg: f64,
}

#[derive(Debug)]
struct ArenaState {
    width: f64,
    height: f64,
    pose: Pose,
    speed: f64,
    turn_rate: f64,
    /// 正在执行的原语及其上一次积分时刻
    active: Option<(MotionPrimitive, Instant)>,
}

impl ArenaState {
    fn from_config(config: &SimulationConfig) -> Self {
        let width = config.arena_width_cm.max(1.0);
        let height = config.arena_height_cm.max(1.0);
        Self {
            width,
            height,
            pose: Pose {
                x: config.start_x_cm.clamp(0.0, width),
                y: config.start_y_cm.clamp(0.0, height),
                heading_deg: normalize_heading(config.start_heading_deg),
            },
            speed: config.speed_cm_per_s.max(0.0),
            turn_rate: config.turn_rate_deg_per_s.max(0.0),
            active: None,
        }
    }

    /// 把正在执行的原语积分到 `now`。
    fn advance(&mut self, now: Instant) {
        if let Some((primitive, since)) = self.active {
            let elapsed = now.saturating_duration_since(since);
            self.apply(primitive, elapsed);
            self.active = Some((primitive, now));
        }
    }

    fn apply(&mut self, primitive: MotionPrimitive, elapsed: Duration) {
        let dt = elapsed.as_secs_f64();
        let heading = self.pose.heading_deg.to_radians();
        match primitive {
            MotionPrimitive::Forward | MotionPrimitive::Backward => {
                let sign = if primitive == MotionPrimitive::Forward { 1.0 } else { -1.0 };
                let step = sign * self.speed * dt;
                self.pose.x = (self.pose.x + step * heading.cos()).clamp(0.0, self.width);
                self.pose.y = (self.pose.y + step * heading.sin()).clamp(0.0, self.height);
            }
            MotionPrimitive::TurnLeft => {
                self.pose.heading_deg = normalize_heading(self.pose.heading_deg + self.turn_rate * dt);
            }
            MotionPrimitive::TurnRight => {
                self.pose.heading_deg = normalize_heading(self.pose.heading_deg - self.turn_rate * dt);
            }
            MotionPrimitive::Stop => {}
        }
    }

    fn engage(&mut self, primitive: MotionPrimitive) {
        let now = Instant::now();
        self.advance(now);
        self.active = (primitive != MotionPrimitive::Stop).then_some((primitive, now));
    }

    fn ray_distance(&self) -> f64 {
        ray_distance_to_walls(self.width, self.height, self.pose)
    }
}

fn normalize_heading(heading_deg: f64) -> f64 {
    if !heading_deg.is_finite() {
        return 0.0;
    }
    heading_deg.rem_euclid(360.0)
}

/// 从 `pose` 沿朝向到矩形场地 `[0, width] x [0, height]` 墙面的距离。
pub fn ray_distance_to_walls(width: f64, height: f64, pose: Pose) -> f64 {
    const EPS: f64 = 1e-9;
    let heading = pose.heading_deg.to_radians();
    let (dx, dy) = (heading.cos(), heading.sin());
    let mut best = f64::INFINITY;
    if dx > EPS {
        best = best.min((width - pose.x) / dx);
    } else if dx < -EPS {
        best = best.min(-pose.x / dx);
    }
    if dy > EPS {
        best = best.min((height - pose.y) / dy);
    } else if dy < -EPS {
        best = best.min(-pose.y / dy);
    }
    if best.is_finite() { best.max(0.0) } else { 0.0 }
}

/// 模拟场地平台。克隆得到的句柄共享同一个场地。
#[derive(Clone)]
pub struct SimulatedPlatform {
    arena: Arc<Mutex<ArenaState>>,
    log: ActuationLog,
    auxiliary: FixedAuxiliarySensors,
}

impl SimulatedPlatform {
    pub fn new(config: &SimulationConfig) -> Self {
        Self {
            arena: Arc::new(Mutex::new(ArenaState::from_config(config))),
            log: ActuationLog::bounded(SIMULATION_LOG_CAPACITY),
            auxiliary: FixedAuxiliarySensors::new(config.temperature_c, config.battery_percent),
        }
    }

    pub fn motion_controller(&self) -> SimulatedMotors {
        SimulatedMotors { arena: Arc::clone(&self.arena), log: self.log.clone() }
    }

    pub fn range_sensor(&self) -> SimulatedRangeSensor {
        SimulatedRangeSensor { arena: Arc::clone(&self.arena) }
    }

    pub fn auxiliary_sensors(&self) -> FixedAuxiliarySensors {
        self.auxiliary
    }

    /// 当前位姿（包含正在执行原语的积分）。
    pub fn pose(&self) -> Pose {
        let mut arena = lock_recovering(&self.arena);
        arena.advance(Instant::now());
        arena.pose
    }

    pub fn actuation_log(&self) -> ActuationLog {
        self.log.clone()
    }
}

/// 模拟电机。
pub struct SimulatedMotors {
    arena: Arc<Mutex<ArenaState>>,
    log: ActuationLog,
}

impl MotionController for SimulatedMotors {
    fn engage(&mut self, primitive: MotionPrimitive) -> Result<(), HardwareError> {
        let mut arena = self
            .arena
            .lock()
            .map_err(|_| HardwareError::Unavailable("simulated arena lock poisoned".to_string()))?;
        arena.engage(primitive);
        debug!("[模拟平台] 原语 {}，当前位姿 {:?}", primitive, arena.pose);
        self.log.push(primitive);
        Ok(())
    }
}

/// 模拟测距：到最近墙面的射线距离。
pub struct SimulatedRangeSensor {
    arena: Arc<Mutex<ArenaState>>,
}

impl RangeSensor for SimulatedRangeSensor {
    fn measure_distance(&mut self) -> Result<f64, HardwareError> {
        let mut arena = self
            .arena
            .lock()
            .map_err(|_| HardwareError::Unavailable("simulated arena lock poisoned".to_string()))?;
        arena.advance(Instant::now());
        Ok(arena.ray_distance())
    }
}

/// 只记录、不驱动任何设备的电机替身，可配置在某个原语上报错。
pub struct RecordingMotionController {
    log: ActuationLog,
    fail_on: Option<MotionPrimitive>,
}

impl RecordingMotionController {
    pub fn new() -> (Self, ActuationLog) {
        let log = ActuationLog::new();
        (Self { log: log.clone(), fail_on: None }, log)
    }

    /// 每次下发 `primitive` 都返回执行错误。
    pub fn failing_on(primitive: MotionPrimitive) -> (Self, ActuationLog) {
        let log = ActuationLog::new();
        (Self { log: log.clone(), fail_on: Some(primitive) }, log)
    }
}

impl MotionController for RecordingMotionController {
    fn engage(&mut self, primitive: MotionPrimitive) -> Result<(), HardwareError> {
        if self.fail_on == Some(primitive) {
            return Err(HardwareError::Actuation { primitive, reason: "injected failure".to_string() });
        }
        self.log.push(primitive);
        Ok(())
    }
}

#[derive(Debug)]
struct ScriptState {
    queue: VecDeque<Result<f64, HardwareError>>,
    fallback: f64,
    reads: usize,
}

/// `ScriptedRangeSensor` 的编排句柄。
#[derive(Debug, Clone)]
pub struct RangeScript {
    state: Arc<Mutex<ScriptState>>,
}

impl RangeScript {
    /// 追加一个读数
    pub fn push_reading(&self, distance: f64) {
        lock_recovering(&self.state).queue.push_back(Ok(distance));
    }

    /// 追加一次读取失败
    pub fn push_failure(&self, reason: &str) {
        lock_recovering(&self.state).queue.push_back(Err(HardwareError::SensorRead(reason.to_string())));
    }

    /// 脚本耗尽后返回的读数
    pub fn set_fallback(&self, distance: f64) {
        lock_recovering(&self.state).fallback = distance;
    }

    /// 已完成的读取次数
    pub fn reads(&self) -> usize {
        lock_recovering(&self.state).reads
    }
}

/// 按脚本返回读数的测距替身。
pub struct ScriptedRangeSensor {
    script: RangeScript,
    delay: Option<Duration>,
}

impl ScriptedRangeSensor {
    pub fn new(fallback: f64) -> (Self, RangeScript) {
        let script = RangeScript {
            state: Arc::new(Mutex::new(ScriptState { queue: VecDeque::new(), fallback, reads: 0 })),
        };
        (Self { script: script.clone(), delay: None }, script)
    }

    /// 每次读数前阻塞等待 `delay`，用于模拟超时。
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

impl RangeSensor for ScriptedRangeSensor {
    fn measure_distance(&mut self) -> Result<f64, HardwareError> {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        let mut state = lock_recovering(&self.script.state);
        state.reads += 1;
        let fallback = state.fallback;
        state.queue.pop_front().unwrap_or(Ok(fallback))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pose(x: f64, y: f64, heading_deg: f64) -> Pose {
        Pose { x, y, heading_deg }
    }

    #[test]
    fn test_ray_distance_axis_aligned() {
        assert!((ray_distance_to_walls(300.0, 200.0, pose(150.0, 100.0, 0.0)) - 150.0).abs() < 1e-6);
        assert!((ray_distance_to_walls(300.0, 200.0, pose(150.0, 100.0, 90.0)) - 100.0).abs() < 1e-6);
        assert!((ray_distance_to_walls(300.0, 200.0, pose(150.0, 100.0, 180.0)) - 150.0).abs() < 1e-6);
        assert!((ray_distance_to_walls(300.0, 200.0, pose(150.0, 40.0, 270.0)) - 40.0).abs() < 1e-6);
    }

    #[test]
    /// 测试斜向射线取先碰到的那面墙。
    fn test_ray_distance_diagonal() {
        let d = ray_distance_to_walls(300.0, 200.0, pose(290.0, 100.0, 45.0));
        assert!((d - 10.0 * 2f64.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn test_ray_distance_at_wall_is_zero() {
        assert_eq!(ray_distance_to_walls(300.0, 200.0, pose(300.0, 100.0, 0.0)), 0.0);
    }

    #[test]
    /// 测试积分：前进移动位置，转向改变朝向，位置被限制在场地内。
    fn test_arena_kinematics() {
        let mut arena = ArenaState::from_config(&SimulationConfig::default());
        arena.apply(MotionPrimitive::Forward, Duration::from_millis(500));
        assert!((arena.pose.x - 170.0).abs() < 1e-6);

        arena.apply(MotionPrimitive::TurnLeft, Duration::from_millis(500));
        assert!((arena.pose.heading_deg - 90.0).abs() < 1e-6);

        arena.apply(MotionPrimitive::TurnRight, Duration::from_secs(1));
        assert!((arena.pose.heading_deg - 270.0).abs() < 1e-6);

        arena.apply(MotionPrimitive::Forward, Duration::from_secs(60));
        assert_eq!(arena.pose.y, 0.0);
        assert_eq!(arena.ray_distance(), 0.0);
    }

    #[test]
    fn test_platform_records_and_measures() {
        let platform = SimulatedPlatform::new(&SimulationConfig::default());
        let mut motors = platform.motion_controller();
        let mut sensor = platform.range_sensor();

        let before = sensor.measure_distance().unwrap();
        assert!((before - 150.0).abs() < 1.0);

        motors.engage(MotionPrimitive::Forward).unwrap();
        std::thread::sleep(Duration::from_millis(50));
        motors.engage(MotionPrimitive::Stop).unwrap();

        let after = sensor.measure_distance().unwrap();
        assert!(after < before, "前进后到墙面的距离应变小");
        assert_eq!(platform.actuation_log().primitives(), vec![MotionPrimitive::Forward, MotionPrimitive::Stop]);
        assert!(platform.pose().x > 150.0);
    }

    #[test]
    /// 测试模拟平台的执行记录有上限，只保留最近的记录。
    fn test_platform_log_is_bounded() {
        let platform = SimulatedPlatform::new(&SimulationConfig::default());
        let mut motors = platform.motion_controller();
        for _ in 0..SIMULATION_LOG_CAPACITY {
            motors.engage(MotionPrimitive::TurnLeft).unwrap();
        }
        motors.engage(MotionPrimitive::Stop).unwrap();

        let log = platform.actuation_log();
        assert_eq!(log.len(), SIMULATION_LOG_CAPACITY);
        assert_eq!(log.primitives().last(), Some(&MotionPrimitive::Stop));
        assert_eq!(log.count(MotionPrimitive::TurnLeft), SIMULATION_LOG_CAPACITY - 1);
    }

    #[test]
    fn test_scripted_sensor_sequence() {
        let (mut sensor, script) = ScriptedRangeSensor::new(99.0);
        script.push_reading(10.0);
        script.push_failure("no echo");
        assert_eq!(sensor.measure_distance().unwrap(), 10.0);
        assert!(matches!(sensor.measure_distance(), Err(HardwareError::SensorRead(_))));
        assert_eq!(sensor.measure_distance().unwrap(), 99.0);
        assert_eq!(script.reads(), 3);
    }
}
