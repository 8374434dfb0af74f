//! 入站消息路由。
//!
//! 每个入站帧按 `type` 字段分发：`command` 与 `test` 交给指令分发器，
//! 其他类型回复 `error`。坏 JSON 也只回复 `error`，连接保持可用。

use std::sync::Arc;

use common_models::payloads::InboundMessage;
use common_models::{Command, ServerMessage};
use log::{debug, error, warn};
use rust_tcp_utils::codec::JsonFrame;
use rust_tcp_utils::error::TcpError;
use serde_json::Value;

use crate::tcp_server::client_session::ClientSession;
use crate::tcp_server::command_dispatcher::CommandDispatcher;

/// 处理一个已分帧的入站数据。
///
/// 只有向本会话写回响应失败（出站队列已关闭）时才返回错误，调用方据此结束会话。
pub async fn handle_frame(
    client_session: &Arc<ClientSession>,
    frame: JsonFrame,
    dispatcher: &CommandDispatcher,
) -> Result<(), TcpError> {
    match frame {
        JsonFrame::Value(value) => handle_message(client_session, value, dispatcher).await,
        JsonFrame::Malformed(reason) => {
            warn!("[消息路由] 会话 {}: 收到无法解析的数据: {}", client_session.session_id, reason);
            send_error_response(client_session, format!("Invalid JSON: {}", reason)).await
        }
    }
}

/// 处理一个语法正确的 JSON 值。
pub async fn handle_message(
    client_session: &Arc<ClientSession>,
    value: Value,
    dispatcher: &CommandDispatcher,
) -> Result<(), TcpError> {
    let inbound = match InboundMessage::from_value(value) {
        Ok(inbound) => inbound,
        Err(e) => {
            warn!("[消息路由] 会话 {}: 入站消息不是 JSON 对象。", client_session.session_id);
            return send_error_response(client_session, format!("Invalid JSON: {}", e)).await;
        }
    };

    match inbound {
        InboundMessage::Command { command, data } => {
            let response = dispatcher.dispatch_raw(&command, &data).await;
            client_session.send(&ServerMessage::from(response)).await
        }
        InboundMessage::Test => {
            debug!("[消息路由] 会话 {}: 收到连接测试。", client_session.session_id);
            client_session.send(&dispatcher.respond(Command::Test).await).await
        }
        InboundMessage::Unknown(message_type) => {
            warn!("[消息路由] 会话 {}: 未知的消息类型 '{}'", client_session.session_id, message_type);
            send_error_response(client_session, format!("Unknown message type: {}", message_type)).await
        }
    }
}

async fn send_error_response(client_session: &Arc<ClientSession>, error_message: String) -> Result<(), TcpError> {
    let result = client_session.send(&ServerMessage::error(error_message.clone())).await;
    match &result {
        Ok(()) => debug!("[消息路由] 会话 {}: 错误响应已发送: {}", client_session.session_id, error_message),
        Err(e) => error!(
            "[消息路由] 会话 {}: 发送错误响应失败: {}。原始错误信息: '{}'",
            client_session.session_id, e, error_message
        ),
    }
    result
}
