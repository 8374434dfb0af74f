//! 周期遥测广播模块。
//!
//! 后台循环按固定周期唤醒；只要注册表中还有会话，就生成一个遥测快照并以 `sensor_data`
//! 消息投递给每个会话。投递失败的会话由注册表移除，其余会话不受影响。

use std::sync::Arc;
use std::time::Duration;

use common_models::ServerMessage;
use log::{debug, error, info};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::hardware::telemetry_source::TelemetrySource;
use crate::tcp_server::connection_manager::ConnectionManager;

pub struct TelemetryBroadcaster {
    connection_manager: Arc<ConnectionManager>,
    telemetry: TelemetrySource,
    /// 两次广播之间的间隔
    broadcast_interval: Duration,
    /// 向单个会话投递的最长等待时间
    send_timeout: Duration,
    shutdown: CancellationToken,
}

impl TelemetryBroadcaster {
    pub fn new(
        connection_manager: Arc<ConnectionManager>,
        telemetry: TelemetrySource,
        broadcast_interval: Duration,
        send_timeout: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        info!("[遥测广播] 创建遥测广播器，广播周期: {:?}，单会话投递超时: {:?}", broadcast_interval, send_timeout);
        Self { connection_manager, telemetry, broadcast_interval, send_timeout, shutdown }
    }

    /// 运行广播循环，直到关闭令牌被取消。
    pub async fn run(self) {
        info!("[遥测广播] 后台广播循环已启动。");
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = sleep(self.broadcast_interval) => {}
            }
            self.broadcast_once().await;
        }
        info!("[遥测广播] 收到关闭信号，广播循环已退出。");
    }

    /// 执行一次广播，返回成功投递的会话数。没有会话时不读取传感器。
    pub async fn broadcast_once(&self) -> usize {
        if self.connection_manager.is_empty() {
            debug!("[遥测广播] 当前没有会话，跳过本轮广播。");
            return 0;
        }
        let snapshot = self.telemetry.snapshot().await;
        match self
            .connection_manager
            .broadcast_message(&ServerMessage::sensor_data(snapshot), self.send_timeout)
            .await
        {
            Ok(delivered) => delivered,
            Err(e) => {
                error!("[遥测广播] 序列化遥测消息失败: {}", e);
                0
            }
        }
    }
}
