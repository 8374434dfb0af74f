use std::net::SocketAddr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use common_models::ServerMessage;
use rust_tcp_utils::error::TcpError;
use rust_tcp_utils::message::JsonMessage;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// 代表一个已连接的操作员会话
#[derive(Debug)]
pub struct ClientSession {
    /// 由服务端生成的唯一会话标识
    pub session_id: Uuid,
    /// 注册序号，单调递增，用于给注册表快照排序
    pub seq: u64,
    /// 用于向此会话异步发送 JsonMessage 的通道发送端，另一端由写任务消费
    pub sender: mpsc::Sender<JsonMessage>,
    /// 对端的 IP 地址和端口
    pub addr: SocketAddr,
    /// 会话创建的时间戳
    pub creation_time: DateTime<Utc>,
    /// 存活标志；取消后读循环与写任务都会退出
    liveness: CancellationToken,
}

impl ClientSession {
    pub fn new(seq: u64, addr: SocketAddr, sender: mpsc::Sender<JsonMessage>, liveness: CancellationToken) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            seq,
            sender,
            addr,
            creation_time: Utc::now(),
            liveness,
        }
    }

    /// 把一条服务端消息放入出站队列。队列满时等待，只阻塞当前会话。
    pub async fn send(&self, message: &ServerMessage) -> Result<(), TcpError> {
        let frame = JsonMessage::new(message.message_type(), message)?;
        self.sender.send(frame).await.map_err(|_| TcpError::SendErrorClosed)
    }

    /// 在 `timeout` 内把一条已序列化的消息放入出站队列。
    pub async fn send_frame_timeout(&self, frame: JsonMessage, timeout: Duration) -> Result<(), TcpError> {
        self.sender.send_timeout(frame, timeout).await.map_err(|e| match e {
            SendTimeoutError::Timeout(_) => TcpError::ConnectionTimeout,
            SendTimeoutError::Closed(_) => TcpError::SendErrorClosed,
        })
    }

    /// 标记会话关闭。幂等。
    pub fn close(&self) {
        self.liveness.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.liveness.is_cancelled()
    }

    /// 存活标志的克隆，供读写任务等待
    pub fn liveness(&self) -> CancellationToken {
        self.liveness.clone()
    }
}
