//! 自主导航模块。
//!
//! 自主导航是一个后台控制循环，每轮迭代：
//! 1. **探测**：读取前方距离。
//! 2. 距离小于障碍阈值时**避障**：停车、短暂等待、向右转探测右侧距离、再向左转
//!    （先抵消右转，再多转同样角度）探测左侧距离；右侧更开阔且超过最小净空时再右转回去，
//!    否则保持左转后的朝向。
//! 3. 否则**前进**一个脉冲。
//! 4. 向所有会话广播一次 `autonomous_update`，然后等待固定间隔。
//!
//! 任意时刻至多有一个循环体在执行。循环的退出是协作式的：每轮开始、每次执行器动作前后
//! 以及每次等待期间都会检查取消令牌。退出时总会停车并清除 `running` 标志；
//! 因服务关闭等原因自行退出时也会清除启用标志。

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use common_models::{MotionPrimitive, NavigationTarget, ServerMessage};
use log::{debug, error, info, warn};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::AutonomousConfig;
use crate::hardware::motion_controller::MotionActuator;
use crate::hardware::telemetry_source::TelemetrySource;
use crate::tcp_server::connection_manager::ConnectionManager;

/// 自主模式状态的只读副本。
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AutonomousState {
    /// 是否被启动指令启用
    pub enabled: bool,
    /// 循环体是否正在执行
    pub running: bool,
    pub target: Option<NavigationTarget>,
}

/// 启动请求的结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
}

/// 避障时选择的绕行方向。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvoidanceSide {
    Left,
    Right,
}

/// 只有右侧比左侧更开阔、并且右侧距离超过最小净空时才选择右侧；相等时选择左侧。
pub fn choose_side(right_distance: f64, left_distance: f64, min_clearance: f64) -> AvoidanceSide {
    if right_distance > left_distance && right_distance > min_clearance {
        AvoidanceSide::Right
    } else {
        AvoidanceSide::Left
    }
}

/// 一次执行器动作或等待的结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Done,
    Cancelled,
    Failed,
}

#[derive(Default)]
struct LoopControl {
    token: Option<CancellationToken>,
    handle: Option<JoinHandle<()>>,
}

/// 自主导航的启停控制与共享状态。
pub struct AutonomousNavigator {
    actuator: MotionActuator,
    telemetry: TelemetrySource,
    connection_manager: Arc<ConnectionManager>,
    settings: AutonomousConfig,
    send_timeout: Duration,
    /// 服务端关闭令牌；每个循环实例使用它的子令牌
    shutdown: CancellationToken,
    control: Mutex<LoopControl>,
    /// 启用该模式的那次启动的序号，0 表示未启用
    enabled_generation: Arc<AtomicU64>,
    next_generation: AtomicU64,
    running: Arc<AtomicBool>,
    target: StdMutex<Option<NavigationTarget>>,
}

impl AutonomousNavigator {
    pub fn new(
        actuator: MotionActuator,
        telemetry: TelemetrySource,
        connection_manager: Arc<ConnectionManager>,
        settings: AutonomousConfig,
        send_timeout: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            actuator,
            telemetry,
            connection_manager,
            settings,
            send_timeout,
            shutdown,
            control: Mutex::new(LoopControl::default()),
            enabled_generation: Arc::new(AtomicU64::new(0)),
            next_generation: AtomicU64::new(1),
            running: Arc::new(AtomicBool::new(false)),
            target: StdMutex::new(None),
        }
    }

    pub fn state(&self) -> AutonomousState {
        AutonomousState {
            enabled: self.enabled_generation.load(Ordering::SeqCst) != 0,
            running: self.running.load(Ordering::SeqCst),
            target: self.target(),
        }
    }

    fn target(&self) -> Option<NavigationTarget> {
        *self.target.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_target(&self, target: Option<NavigationTarget>) {
        *self.target.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = target;
    }

    /// 启动自主导航。已有活动循环时不做任何事。
    ///
    /// 新循环会先等待上一个循环实例完全退出再开始执行，因此不会出现两个循环体同时驱动执行器。
    pub async fn start(&self, target: Option<NavigationTarget>) -> StartOutcome {
        let mut control = self.control.lock().await;
        let active = control.token.as_ref().is_some_and(|token| !token.is_cancelled())
            && control.handle.as_ref().is_some_and(|handle| !handle.is_finished());
        if active {
            info!("[自主导航] 自主导航已在运行，忽略重复的启动请求。");
            return StartOutcome::AlreadyRunning;
        }

        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        self.enabled_generation.store(generation, Ordering::SeqCst);
        self.set_target(target);

        let token = self.shutdown.child_token();
        let previous = control.handle.take();
        let navigation_loop = NavigationLoop {
            actuator: self.actuator.clone(),
            telemetry: self.telemetry.clone(),
            connection_manager: Arc::clone(&self.connection_manager),
            settings: self.settings.clone(),
            send_timeout: self.send_timeout,
            running: Arc::clone(&self.running),
            target,
        };
        let loop_token = token.clone();
        let enabled_generation = Arc::clone(&self.enabled_generation);
        let handle = tokio::spawn(async move {
            if let Some(previous) = previous {
                if let Err(e) = previous.await {
                    warn!("[自主导航] 上一个导航循环异常结束: {}", e);
                }
            }
            navigation_loop.run(loop_token).await;
            // 之后的启动已经换了序号时不动启用标志
            if enabled_generation.compare_exchange(generation, 0, Ordering::SeqCst, Ordering::SeqCst).is_ok() {
                info!("[自主导航] 导航循环自行退出，自主模式已关闭。");
            }
        });

        control.token = Some(token);
        control.handle = Some(handle);
        info!("[自主导航] 自主导航已启动，目标: {:?}", target);
        StartOutcome::Started
    }

    /// 请求停止自主导航：清除启用标志并取消当前循环。循环在下一个检查点退出。
    pub async fn stop(&self) {
        let control = self.control.lock().await;
        self.enabled_generation.store(0, Ordering::SeqCst);
        if let Some(token) = &control.token {
            token.cancel();
        }
        info!("[自主导航] 已请求停止自主导航。");
    }

    /// 等待当前循环实例退出，最多等待 `timeout`。返回是否已退出。
    pub async fn wait_stopped(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let finished = {
                let control = self.control.lock().await;
                control.handle.as_ref().map_or(true, |handle| handle.is_finished())
            };
            if finished {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                warn!("[自主导航] 等待导航循环退出超时 ({:?})。", timeout);
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

/// 一个导航循环实例所需的全部句柄。
struct NavigationLoop {
    actuator: MotionActuator,
    telemetry: TelemetrySource,
    connection_manager: Arc<ConnectionManager>,
    settings: AutonomousConfig,
    send_timeout: Duration,
    running: Arc<AtomicBool>,
    target: Option<NavigationTarget>,
}

impl NavigationLoop {
    async fn run(self, token: CancellationToken) {
        if token.is_cancelled() {
            debug!("[自主导航] 循环在开始前已被取消。");
            return;
        }
        self.running.store(true, Ordering::SeqCst);
        match self.target {
            Some(target) => info!(
                "[自主导航] 导航循环开始运行，目标坐标: ({:?}, {:?})",
                target.target_x, target.target_y
            ),
            None => info!("[自主导航] 导航循环开始运行，无目标坐标。"),
        }

        loop {
            if token.is_cancelled() {
                break;
            }

            let distance = self.telemetry.distance().await;
            let obstacle_detected = distance < self.settings.obstacle_threshold;
            let outcome = if obstacle_detected {
                info!("[自主导航] 前方 {:.2} cm 处发现障碍，开始避障。", distance);
                self.avoid_obstacle(&token).await
            } else {
                self.step(&token, MotionPrimitive::Forward, Duration::from_millis(self.settings.forward_pulse_ms)).await
            };
            if outcome == Step::Cancelled || token.is_cancelled() {
                break;
            }

            let snapshot = self.telemetry.snapshot().await;
            let update = ServerMessage::autonomous_update(snapshot, obstacle_detected);
            if let Err(e) = self.connection_manager.broadcast_message(&update, self.send_timeout).await {
                error!("[自主导航] 序列化进度消息失败: {}", e);
            }

            if self.pause(&token, Duration::from_millis(self.settings.iteration_interval_ms)).await == Step::Cancelled {
                break;
            }
        }

        if let Err(e) = self.actuator.stop().await {
            error!("[自主导航] 退出时停车失败: {}", e);
        }
        self.running.store(false, Ordering::SeqCst);
        info!("[自主导航] 导航循环已退出。");
    }

    /// 避障动作序列。
    async fn avoid_obstacle(&self, token: &CancellationToken) -> Step {
        let settings = &self.settings;
        let right_probe = Duration::from_millis(settings.right_probe_ms);

        let stopped = self.step(token, MotionPrimitive::Stop, Duration::ZERO).await;
        if stopped != Step::Done {
            return stopped;
        }
        if self.pause(token, Duration::from_millis(settings.avoid_pause_ms)).await == Step::Cancelled {
            return Step::Cancelled;
        }

        let turned_right = self.step(token, MotionPrimitive::TurnRight, right_probe).await;
        if turned_right != Step::Done {
            return turned_right;
        }
        let right_distance = self.telemetry.distance().await;

        let turned_left = self.step(token, MotionPrimitive::TurnLeft, Duration::from_millis(settings.left_probe_ms)).await;
        if turned_left != Step::Done {
            return turned_left;
        }
        let left_distance = self.telemetry.distance().await;

        match choose_side(right_distance, left_distance, settings.min_clearance) {
            AvoidanceSide::Right => {
                info!(
                    "[自主导航] 右侧更开阔 (右 {:.2} / 左 {:.2})，向右绕行。",
                    right_distance, left_distance
                );
                self.step(token, MotionPrimitive::TurnRight, right_probe).await
            }
            AvoidanceSide::Left => {
                info!(
                    "[自主导航] 选择向左绕行 (右 {:.2} / 左 {:.2})。",
                    right_distance, left_distance
                );
                Step::Done
            }
        }
    }

    /// 在检查点之间执行一个执行器动作。
    async fn step(&self, token: &CancellationToken, primitive: MotionPrimitive, duration: Duration) -> Step {
        if token.is_cancelled() {
            return Step::Cancelled;
        }
        match self.actuator.actuate_unless_cancelled(primitive, duration, token).await {
            Ok(true) if !token.is_cancelled() => Step::Done,
            Ok(_) => Step::Cancelled,
            Err(e) => {
                warn!("[自主导航] 执行 {} 失败: {}，本轮迭代提前结束。", primitive, e);
                Step::Failed
            }
        }
    }

    async fn pause(&self, token: &CancellationToken, duration: Duration) -> Step {
        tokio::select! {
            _ = token.cancelled() => Step::Cancelled,
            _ = tokio::time::sleep(duration) => Step::Done,
        }
    }
}
