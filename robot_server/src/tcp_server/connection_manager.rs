//! 会话注册表。
//!
//! `ConnectionManager` 是"谁会收到广播"的唯一依据。注册、注销都通过 `DashMap` 完成，
//! 广播基于按注册序号排序的快照进行，因此遍历期间其他任务仍可增删会话，
//! 不会观察到一半被移除的条目。

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use common_models::ServerMessage;
use dashmap::DashMap;
use log::{debug, info, warn};
use rust_tcp_utils::error::TcpError;
use rust_tcp_utils::message::JsonMessage;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::tcp_server::client_session::ClientSession;

/// 管理所有活动的操作员会话
#[derive(Debug, Default)]
pub struct ConnectionManager {
    /// Key: session_id，Value: 会话
    clients: DashMap<Uuid, Arc<ClientSession>>,
    next_seq: AtomicU64,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// 为新连接创建会话并注册。
    pub fn add_client(
        &self,
        addr: SocketAddr,
        sender: mpsc::Sender<JsonMessage>,
        liveness: CancellationToken,
    ) -> Arc<ClientSession> {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let session = Arc::new(ClientSession::new(seq, addr, sender, liveness));
        self.register(Arc::clone(&session));
        session
    }

    /// 注册一个会话。同一会话重复注册不会产生第二个条目，返回是否为新注册。
    pub fn register(&self, session: Arc<ClientSession>) -> bool {
        let session_id = session.session_id;
        let addr = session.addr;
        let inserted = self.clients.insert(session_id, session).is_none();
        if inserted {
            info!("[会话注册表] 新会话已注册: id={}, addr={}，当前会话数: {}", session_id, addr, self.clients.len());
        }
        inserted
    }

    /// 注销一个会话。幂等：会话不存在时返回 `None`。
    pub fn unregister(&self, session_id: &Uuid) -> Option<Arc<ClientSession>> {
        let removed = self.clients.remove(session_id).map(|(_, session)| session);
        match &removed {
            Some(session) => info!(
                "[会话注册表] 会话已注销: id={}, addr={}，剩余会话数: {}",
                session.session_id,
                session.addr,
                self.clients.len()
            ),
            None => debug!("[会话注册表] 会话 {} 已不在注册表中，忽略本次注销。", session_id),
        }
        removed
    }

    pub fn get(&self, session_id: &Uuid) -> Option<Arc<ClientSession>> {
        self.clients.get(session_id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// 按注册顺序返回当前所有会话的稳定副本。
    pub fn snapshot(&self) -> Vec<Arc<ClientSession>> {
        let mut sessions: Vec<Arc<ClientSession>> = self.clients.iter().map(|entry| Arc::clone(entry.value())).collect();
        sessions.sort_by_key(|session| session.seq);
        sessions
    }

    /// 把同一条消息投递给快照中的每个会话，返回成功投递的数量。
    ///
    /// 每个会话的投递最多等待 `send_timeout`；投递失败的会话被注销并关闭，其余会话不受影响。
    pub async fn broadcast(&self, message: &JsonMessage, send_timeout: Duration) -> usize {
        let sessions = self.snapshot();
        let mut delivered = 0;
        for session in sessions {
            match session.send_frame_timeout(message.clone(), send_timeout).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!(
                        "[会话注册表] 向会话 {} ({}) 投递 {} 失败: {}。该会话将被移除。",
                        session.session_id, session.addr, message.message_type, e
                    );
                    self.unregister(&session.session_id);
                    session.close();
                }
            }
        }
        debug!("[会话注册表] 广播 {} 已投递给 {} 个会话。", message.message_type, delivered);
        delivered
    }

    /// 序列化一条服务端消息后广播。
    pub async fn broadcast_message(&self, message: &ServerMessage, send_timeout: Duration) -> Result<usize, TcpError> {
        let frame = JsonMessage::new(message.message_type(), message)?;
        Ok(self.broadcast(&frame, send_timeout).await)
    }

    /// 关闭并注销所有会话，服务停止时调用。
    pub fn close_all(&self) {
        for session in self.snapshot() {
            self.unregister(&session.session_id);
            session.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common_models::TelemetrySnapshot;
    use common_models::SensorStatus;
    use serde_json::Value;

    fn test_addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    fn add(manager: &ConnectionManager, port: u16, capacity: usize) -> (Arc<ClientSession>, mpsc::Receiver<JsonMessage>) {
        let (tx, rx) = mpsc::channel(capacity);
        (manager.add_client(test_addr(port), tx, CancellationToken::new()), rx)
    }

    #[test]
    /// 测试注册、重复注册与幂等注销。
    fn test_register_and_idempotent_unregister() {
        let manager = ConnectionManager::new();
        let (session, _rx) = add(&manager, 1000, 4);
        assert_eq!(manager.len(), 1);
        assert!(!manager.register(Arc::clone(&session)), "同一会话不应被注册两次");
        assert_eq!(manager.len(), 1);

        assert!(manager.unregister(&session.session_id).is_some());
        assert!(manager.unregister(&session.session_id).is_none());
        assert!(manager.is_empty());
    }

    #[test]
    fn test_snapshot_is_ordered_by_registration() {
        let manager = ConnectionManager::new();
        let mut receivers = Vec::new();
        let mut ids = Vec::new();
        for port in 0..5 {
            let (session, rx) = add(&manager, 2000 + port, 1);
            ids.push(session.session_id);
            receivers.push(rx);
        }
        manager.unregister(&ids[2]);
        let snapshot_ids: Vec<Uuid> = manager.snapshot().iter().map(|s| s.session_id).collect();
        assert_eq!(snapshot_ids, vec![ids[0], ids[1], ids[3], ids[4]]);
    }

    #[tokio::test]
    /// 测试广播：N 个会话都收到同一条消息。
    async fn test_broadcast_reaches_every_session() {
        let manager = ConnectionManager::new();
        let mut receivers = Vec::new();
        for port in 0..3 {
            receivers.push(add(&manager, 3000 + port, 4).1);
        }
        let message = ServerMessage::sensor_data(TelemetrySnapshot::new(12.0, 25.0, 85, SensorStatus::Active));
        let delivered = manager.broadcast_message(&message, Duration::from_millis(100)).await.unwrap();
        assert_eq!(delivered, 3);

        let mut payloads = Vec::new();
        for rx in receivers.iter_mut() {
            let frame = rx.recv().await.expect("每个会话都应收到广播");
            payloads.push(frame.payload().to_string());
        }
        assert!(payloads.windows(2).all(|w| w[0] == w[1]));
        let value: Value = serde_json::from_str(&payloads[0]).unwrap();
        assert_eq!(value["type"], "sensor_data");
    }

    #[tokio::test]
    /// 测试投递失败（接收端已关闭、队列已满）的会话被移出注册表并关闭，其余会话不受影响。
    async fn test_failed_sessions_are_pruned() {
        let manager = ConnectionManager::new();
        let (healthy, mut healthy_rx) = add(&manager, 4000, 4);
        let (closed, closed_rx) = add(&manager, 4001, 4);
        drop(closed_rx);
        let (stalled, _stalled_rx) = add(&manager, 4002, 1);
        stalled.sender.try_send(JsonMessage::new("filler", &"x").unwrap()).unwrap();

        let message = JsonMessage::new("sensor_data", &serde_json::json!({"type": "sensor_data"})).unwrap();
        let delivered = manager.broadcast(&message, Duration::from_millis(50)).await;

        assert_eq!(delivered, 1);
        assert_eq!(manager.len(), 1);
        assert!(manager.get(&healthy.session_id).is_some());
        assert!(closed.is_closed());
        assert!(stalled.is_closed());
        assert!(healthy_rx.recv().await.is_some());
    }

    #[test]
    fn test_close_all() {
        let manager = ConnectionManager::new();
        let (a, _rx_a) = add(&manager, 5000, 1);
        let (b, _rx_b) = add(&manager, 5001, 1);
        manager.close_all();
        assert!(manager.is_empty());
        assert!(a.is_closed() && b.is_closed());
    }
}
