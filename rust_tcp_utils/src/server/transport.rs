// rust_tcp_utils/src/server/transport.rs

//! 包含服务端 TCP 监听与接受连接的逻辑。

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use crate::error::TcpError;

/// 接受连接失败后，再次尝试之前的等待时间。
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// `ServerTransport` 负责 TCP 服务端的监听和连接接受。
pub struct ServerTransport;

impl ServerTransport {
    /// 绑定 TCP 监听器。
    ///
    /// 绑定失败（端口被占用、权限不足等）会以 [`TcpError::BindError`] 返回，
    /// 对服务端而言这是致命错误。
    pub async fn bind(addr: SocketAddr) -> Result<TcpListener, TcpError> {
        let listener = TcpListener::bind(addr).await.map_err(|source| TcpError::BindError {
            addr: addr.to_string(),
            source,
        })?;
        match listener.local_addr() {
            Ok(local) => info!("[TCP服务端] 正在监听地址: {}", local),
            Err(_) => info!("[TCP服务端] 正在监听地址: {}", addr),
        }
        Ok(listener)
    }

    /// 在已绑定的监听器上运行接受循环，直到 `shutdown` 被取消。
    ///
    /// 每次等待新连接最长 `accept_timeout`，超时后重新检查关闭信号。
    /// 对每个新连接都会在新的 Tokio 任务中调用 `on_connect`；
    /// 单次接受失败只记录日志，循环继续运行。
    pub async fn serve<F, Fut>(
        listener: TcpListener,
        accept_timeout: Duration,
        shutdown: CancellationToken,
        on_connect: F,
    ) -> Result<(), TcpError>
    where
        F: Fn(TcpStream, SocketAddr) -> Fut + Send + Sync + Clone + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        loop {
            let accepted = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("[TCP服务端] 收到关闭信号，停止接受新连接。");
                    break;
                }
                result = tokio::time::timeout(accept_timeout, listener.accept()) => result,
            };

            match accepted {
                // 超时只是让循环有机会检查关闭信号
                Err(_elapsed) => continue,
                Ok(Ok((stream, peer_addr))) => {
                    info!("[TCP服务端] 接受了来自 {} 的新连接。", peer_addr);
                    if let Err(e) = stream.set_nodelay(true) {
                        debug!("[TCP服务端] 无法为 {} 设置 TCP_NODELAY: {}", peer_addr, e);
                    }
                    let callback = on_connect.clone();
                    tokio::spawn(async move {
                        callback(stream, peer_addr).await;
                    });
                }
                Ok(Err(e)) => {
                    if shutdown.is_cancelled() {
                        break;
                    }
                    error!("[TCP服务端] 接受连接失败: {}。服务器将继续运行。", e);
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                }
            }
        }
        warn!("[TCP服务端] 接受循环已退出。");
        Ok(())
    }
}
