//! TCP 服务端核心服务：组装各组件、接受连接并为每个连接运行读写循环。

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use rust_tcp_utils::codec::JsonStreamCodec;
use rust_tcp_utils::message::JsonMessage;
use rust_tcp_utils::server::transport::ServerTransport;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::{AppConfig, ServerConfig};
use crate::error::AppError;
use crate::hardware::motion_controller::{MotionActuator, MotionController};
use crate::hardware::range_sensor::{AuxiliarySensors, RangeSensor};
use crate::hardware::simulated::SimulatedPlatform;
use crate::hardware::telemetry_source::TelemetrySource;
use crate::tcp_server::autonomous_navigator::AutonomousNavigator;
use crate::tcp_server::command_dispatcher::CommandDispatcher;
use crate::tcp_server::connection_manager::ConnectionManager;
use crate::tcp_server::message_router;
use crate::tcp_server::telemetry_broadcaster::TelemetryBroadcaster;

/// 服务关闭时等待自主导航循环退出的最长时间
const NAVIGATOR_SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// 服务端使用的一组硬件句柄。
pub struct RobotHardware {
    pub motion: Box<dyn MotionController>,
    pub range: Box<dyn RangeSensor>,
    pub auxiliary: Arc<dyn AuxiliarySensors>,
}

impl RobotHardware {
    /// 使用模拟平台上的电机、测距与辅助读数。
    pub fn simulated(platform: &SimulatedPlatform) -> Self {
        Self {
            motion: Box::new(platform.motion_controller()),
            range: Box::new(platform.range_sensor()),
            auxiliary: Arc::new(platform.auxiliary_sensors()),
        }
    }
}

/// 机器人 TCP 服务。持有注册表、执行器、遥测源、自主导航与指令分发器。
pub struct RobotService {
    config: AppConfig,
    connection_manager: Arc<ConnectionManager>,
    actuator: MotionActuator,
    telemetry: TelemetrySource,
    navigator: Arc<AutonomousNavigator>,
    dispatcher: Arc<CommandDispatcher>,
    shutdown: CancellationToken,
}

impl RobotService {
    pub fn new(config: &AppConfig, hardware: RobotHardware, shutdown: CancellationToken) -> Self {
        let connection_manager = Arc::new(ConnectionManager::new());
        let actuator = MotionActuator::new(hardware.motion);
        let telemetry = TelemetrySource::new(hardware.range, hardware.auxiliary, config.telemetry.sensor_timeout());
        let navigator = Arc::new(AutonomousNavigator::new(
            actuator.clone(),
            telemetry.clone(),
            Arc::clone(&connection_manager),
            config.autonomous.clone(),
            config.server.send_timeout(),
            shutdown.clone(),
        ));
        let dispatcher = Arc::new(CommandDispatcher::new(
            actuator.clone(),
            telemetry.clone(),
            Arc::clone(&navigator),
            config.motion.clone(),
        ));
        info!("[RobotService] 服务实例已创建。");
        Self {
            config: config.clone(),
            connection_manager,
            actuator,
            telemetry,
            navigator,
            dispatcher,
            shutdown,
        }
    }

    pub fn connection_manager(&self) -> &Arc<ConnectionManager> {
        &self.connection_manager
    }

    pub fn navigator(&self) -> &Arc<AutonomousNavigator> {
        &self.navigator
    }

    pub fn actuator(&self) -> &MotionActuator {
        &self.actuator
    }

    /// 按配置绑定监听端口。
    pub async fn bind(&self) -> Result<TcpListener> {
        let addr = self.config.server.socket_addr()?;
        let listener = ServerTransport::bind(addr)
            .await
            .map_err(AppError::from)
            .with_context(|| format!("无法在 {} 上启动机器人 TCP 服务", addr))?;
        Ok(listener)
    }

    /// 在已绑定的监听器上运行服务，直到关闭令牌被取消。
    ///
    /// 返回前会停止自主导航、停车并关闭所有会话。
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let broadcaster = TelemetryBroadcaster::new(
            Arc::clone(&self.connection_manager),
            self.telemetry.clone(),
            self.config.telemetry.broadcast_interval(),
            self.config.server.send_timeout(),
            self.shutdown.clone(),
        );
        let broadcaster_handle = tokio::spawn(broadcaster.run());

        let on_connect = {
            let connection_manager = Arc::clone(&self.connection_manager);
            let dispatcher = Arc::clone(&self.dispatcher);
            let server_config = self.config.server.clone();
            let shutdown = self.shutdown.clone();
            move |stream: TcpStream, peer_addr: SocketAddr| {
                handle_connection(
                    stream,
                    peer_addr,
                    Arc::clone(&connection_manager),
                    Arc::clone(&dispatcher),
                    server_config.clone(),
                    shutdown.child_token(),
                )
            }
        };

        let served = ServerTransport::serve(listener, self.config.server.accept_timeout(), self.shutdown.clone(), on_connect).await;

        info!("[RobotService] 接受循环已结束，开始清理。");
        self.shutdown.cancel();
        self.navigator.stop().await;
        self.navigator.wait_stopped(NAVIGATOR_SHUTDOWN_GRACE).await;
        if let Err(e) = self.actuator.stop().await {
            error!("[RobotService] 关闭时停车失败: {}", e);
        }
        self.connection_manager.close_all();
        if let Err(e) = broadcaster_handle.await {
            warn!("[RobotService] 遥测广播任务异常结束: {}", e);
        }
        info!("[RobotService] 服务已停止。");

        served.context("机器人 TCP 服务的接受循环异常退出")
    }

    /// 绑定并运行服务。
    pub async fn start(&self) -> Result<()> {
        info!(
            "[RobotService] 正在启动机器人 TCP 服务: host={}, port={}",
            self.config.server.host, self.config.server.port
        );
        let listener = self.bind().await?;
        self.serve(listener).await
    }
}

/// 单个连接的完整生命周期：注册会话、启动写任务、运行读循环、注销会话。
async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    connection_manager: Arc<ConnectionManager>,
    dispatcher: Arc<CommandDispatcher>,
    server_config: ServerConfig,
    liveness: CancellationToken,
) {
    let (read_half, write_half) = stream.into_split();
    let (tx, rx) = mpsc::channel::<JsonMessage>(server_config.outbound_queue_capacity.max(1));
    let client_session = connection_manager.add_client(peer_addr, tx, liveness.clone());
    let session_id = client_session.session_id;
    info!("[RobotService] 新会话: id={}, addr={}", session_id, peer_addr);

    let mut writer_handle = tokio::spawn(run_writer(
        FramedWrite::new(write_half, JsonStreamCodec::new()),
        rx,
        liveness.clone(),
        session_id,
    ));

    let mut reader = FramedRead::new(read_half, JsonStreamCodec::with_max_length(server_config.max_frame_bytes));
    loop {
        let next = tokio::select! {
            _ = liveness.cancelled() => {
                debug!("[RobotService] 会话 {} 已被关闭，读循环退出。", session_id);
                break;
            }
            next = reader.next() => next,
        };
        match next {
            Some(Ok(frame)) => {
                if let Err(e) = message_router::handle_frame(&client_session, frame, &dispatcher).await {
                    warn!("[RobotService] 会话 {} 无法写回响应: {}，结束会话。", session_id, e);
                    client_session.close();
                    break;
                }
            }
            Some(Err(e)) => {
                if e.is_disconnect() {
                    info!("[RobotService] 会话 {} 的连接已断开: {}", session_id, e);
                } else {
                    warn!("[RobotService] 会话 {} 读取失败: {}", session_id, e);
                }
                client_session.close();
                break;
            }
            None => {
                info!("[RobotService] 会话 {} 的对端关闭了连接。", session_id);
                break;
            }
        }
    }

    connection_manager.unregister(&session_id);
    drop(client_session);

    // 对端正常关闭时让写任务把队列里剩余的响应写完
    if tokio::time::timeout(server_config.send_timeout(), &mut writer_handle).await.is_err() {
        debug!("[RobotService] 会话 {} 的写任务未能及时结束，强制关闭。", session_id);
        liveness.cancel();
        if let Err(e) = writer_handle.await {
            warn!("[RobotService] 会话 {} 的写任务异常结束: {}", session_id, e);
        }
    }
    liveness.cancel();
    info!("[RobotService] 会话 {} ({}) 已结束。", session_id, peer_addr);
}

/// 写任务：把出站队列中的消息依次写入连接。
async fn run_writer(
    mut writer: FramedWrite<OwnedWriteHalf, JsonStreamCodec>,
    mut rx: mpsc::Receiver<JsonMessage>,
    liveness: CancellationToken,
    session_id: Uuid,
) {
    loop {
        let message = tokio::select! {
            _ = liveness.cancelled() => break,
            message = rx.recv() => match message {
                Some(message) => message,
                None => {
                    debug!("[SenderTask {}] 出站队列已关闭。", session_id);
                    break;
                }
            },
        };
        debug!("[SenderTask {}] 发送消息: type={}", session_id, message.message_type);
        let sent = tokio::select! {
            _ = liveness.cancelled() => break,
            sent = writer.send(message) => sent,
        };
        if let Err(e) = sent {
            error!("[SenderTask {}] 写入连接失败: {}，关闭会话。", session_id, e);
            liveness.cancel();
            break;
        }
    }
    if !liveness.is_cancelled() {
        if let Err(e) = writer.close().await {
            debug!("[SenderTask {}] 关闭写端失败: {}", session_id, e);
        }
    }
    debug!("[SenderTask {}] 写任务已结束。", session_id);
}
