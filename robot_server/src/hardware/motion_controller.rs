//! 运动控制器接口与串行化执行器。
//!
//! `MotionController` 只负责"立即把电机置于某个原语对应的状态"，不做任何等待。
//! 带时长的脉冲、运动状态维护以及并发串行化都由 `MotionActuator` 完成：
//! 它在一把异步互斥锁内完成"下发原语 / 等待脉冲 / 释放电机"，
//! 因此来自指令分发器的停车与自主导航的前进脉冲不会在一次执行中途交错。
//! 运动状态另外发布在一把同步锁里，查询时不必等待正在进行的脉冲。

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use common_models::{Direction, MotionPrimitive};
use log::{debug, info, warn};
use tokio::sync::{Mutex, Notify};
use tokio_util::sync::CancellationToken;

use super::HardwareError;

/// 底层电机驱动能力。
pub trait MotionController: Send {
    /// 立即让电机进入 `primitive` 对应的状态。`MotionPrimitive::Stop` 表示所有电机断电。
    fn engage(&mut self, primitive: MotionPrimitive) -> Result<(), HardwareError>;
}

/// 最近一次实际下发的运动原语所对应的运动状态。
///
/// 只在脉冲期间为运动中；脉冲结束释放电机后回到停止状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MotionState {
    pub moving: bool,
    pub direction: Option<Direction>,
}

impl MotionState {
    /// 执行 `primitive` 之后的状态。
    pub fn after(primitive: MotionPrimitive) -> Self {
        match primitive.direction() {
            Some(direction) => Self { moving: true, direction: Some(direction) },
            None => Self::default(),
        }
    }

    pub fn is_stopped(&self) -> bool {
        !self.moving && self.direction.is_none()
    }
}

/// 平滑停车参数。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmartStopProfile {
    /// 减速脉冲次数
    pub repeats: u32,
    /// 直行方向第一次减速脉冲的时长，之后逐次缩短
    pub straight_step: Duration,
    /// 转向方向第一次减速脉冲的时长
    pub turn_step: Duration,
    /// 两次减速脉冲之间的间隔
    pub gap: Duration,
}

struct ActuatorInner {
    controller: Box<dyn MotionController>,
    /// 上一个脉冲的方向，停车后清除。平滑停车按它减速
    last_direction: Option<Direction>,
}

/// 共享的运动执行器句柄。克隆得到的是同一个执行器。
#[derive(Clone)]
pub struct MotionActuator {
    inner: Arc<Mutex<ActuatorInner>>,
    /// 只在持有 `inner` 时写入
    state: Arc<StdMutex<MotionState>>,
    /// 急停时用于提前结束正在等待中的脉冲
    interrupt: Arc<Notify>,
}

impl MotionActuator {
    pub fn new(controller: Box<dyn MotionController>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ActuatorInner { controller, last_direction: None })),
            state: Arc::new(StdMutex::new(MotionState::default())),
            interrupt: Arc::new(Notify::new()),
        }
    }

    /// 当前运动状态。脉冲进行中时返回该脉冲的方向。
    pub fn state(&self) -> MotionState {
        *self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn publish(&self, state: MotionState) {
        *self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = state;
    }

    /// 执行一个持续 `duration` 的运动原语脉冲，结束后释放电机。
    ///
    /// 对 `MotionPrimitive::Stop` 等价于 [`MotionActuator::stop`]，不等待。
    /// 脉冲期间若发生急停，等待会被提前结束。
    pub async fn actuate(&self, primitive: MotionPrimitive, duration: Duration) -> Result<(), HardwareError> {
        let mut inner = self.inner.lock().await;
        self.actuate_locked(&mut inner, primitive, duration).await
    }

    /// 与 [`MotionActuator::actuate`] 相同，但在拿到执行器锁之后先检查 `token`：
    /// 已取消时不下发任何原语并返回 `Ok(false)`。
    ///
    /// 急停总是先取消令牌再争抢执行器锁，因此排在急停之后的后台动作不会再驱动电机。
    pub async fn actuate_unless_cancelled(
        &self,
        primitive: MotionPrimitive,
        duration: Duration,
        token: &CancellationToken,
    ) -> Result<bool, HardwareError> {
        let mut inner = self.inner.lock().await;
        if token.is_cancelled() {
            return Ok(false);
        }
        self.actuate_locked(&mut inner, primitive, duration).await.map(|()| true)
    }

    async fn actuate_locked(
        &self,
        inner: &mut ActuatorInner,
        primitive: MotionPrimitive,
        duration: Duration,
    ) -> Result<(), HardwareError> {
        if primitive == MotionPrimitive::Stop {
            return self.halt(inner);
        }

        let interrupted = self.interrupt.notified();
        tokio::pin!(interrupted);
        interrupted.as_mut().enable();

        inner.controller.engage(primitive)?;
        self.publish(MotionState::after(primitive));
        inner.last_direction = primitive.direction();
        debug!("[运动执行器] 下发运动原语 {}，持续 {:?}", primitive, duration);

        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = &mut interrupted => {
                info!("[运动执行器] 运动原语 {} 的脉冲被急停打断。", primitive);
            }
        }

        inner.controller.engage(MotionPrimitive::Stop)?;
        self.publish(MotionState::default());
        Ok(())
    }

    /// 立即停车并清空运动状态。
    pub async fn stop(&self) -> Result<(), HardwareError> {
        let mut inner = self.inner.lock().await;
        self.halt(&mut inner)
    }

    /// 急停：打断正在等待的脉冲或平滑停车，然后停车。即使驱动报错，运动状态也会被清空。
    pub async fn emergency_stop(&self) -> Result<(), HardwareError> {
        self.interrupt.notify_waiters();
        let mut inner = self.inner.lock().await;
        self.halt(&mut inner)
    }

    /// 平滑停车：若上一个脉冲之后还没有停车，按它的方向做若干次短脉冲模拟减速，然后停车。
    ///
    /// 返回是否执行了减速脉冲。减速过程中的急停会立即结束整个序列。
    pub async fn smart_stop(&self, profile: SmartStopProfile) -> Result<bool, HardwareError> {
        let mut inner = self.inner.lock().await;
        let Some(direction) = inner.last_direction else {
            self.halt(&mut inner)?;
            return Ok(false);
        };

        let interrupted = self.interrupt.notified();
        tokio::pin!(interrupted);
        interrupted.as_mut().enable();

        let primitive = direction.primitive();
        let step = if primitive.is_turn() { profile.turn_step } else { profile.straight_step };
        // 脉冲时长按剩余次数线性递减
        for remaining in (1..=profile.repeats).rev() {
            let duration = step * remaining / profile.repeats;
            debug!("[运动执行器] 平滑停车减速脉冲 {} {:?}，剩余 {} 次", primitive, duration, remaining);
            if let Err(e) = inner.controller.engage(primitive) {
                warn!("[运动执行器] 平滑停车减速脉冲失败: {}，直接停车。", e);
                self.halt(&mut inner)?;
                return Err(e);
            }
            self.publish(MotionState::after(primitive));

            let pulsed = tokio::select! {
                _ = tokio::time::sleep(duration) => true,
                _ = &mut interrupted => false,
            };
            inner.controller.engage(MotionPrimitive::Stop)?;
            self.publish(MotionState::default());
            let paused = pulsed
                && tokio::select! {
                    _ = tokio::time::sleep(profile.gap) => true,
                    _ = &mut interrupted => false,
                };
            if !paused {
                info!("[运动执行器] 平滑停车被急停打断。");
                break;
            }
        }
        self.halt(&mut inner)?;
        Ok(true)
    }

    fn halt(&self, inner: &mut ActuatorInner) -> Result<(), HardwareError> {
        inner.last_direction = None;
        self.publish(MotionState::default());
        inner.controller.engage(MotionPrimitive::Stop)
    }
}
