use std::future::Future;
use std::ops::ControlFlow;

use application::{ConnectionSink, Origin};
use axum::extract::ws::{Message as WsMessage, WebSocket};
use domain::{ClientEvent, ConnectionId, ServerEvent, Username};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, Stream, StreamExt};
use tokio::sync::{mpsc, oneshot};

use crate::state::AppState;

/// WebSocket 连接管理器
///
/// 封装单个 WebSocket 连接的所有状态和逻辑，包括：
/// - 入站事件解析与调度
/// - 出站事件写回
/// - 心跳
/// - 断开后的在线状态清理
pub struct WebSocketConnection {
    socket: Option<WebSocket>,
    state: AppState,
    origin: Origin,
}

impl WebSocketConnection {
    pub fn new(socket: WebSocket, state: AppState, username: Username) -> Self {
        let origin = Origin::new(username, ConnectionId::new());
        tracing::info!(
            username = %origin.username,
            connection_id = %origin.connection_id,
            "WebSocket 连接已建立"
        );

        Self {
            socket: Some(socket),
            state,
            origin,
        }
    }

    /// 运行 WebSocket 连接的主循环
    ///
    /// 无论连接以何种方式结束（客户端关闭、登出、发送失败），都会走到同一条清理路径。
    pub async fn run(mut self) {
        let Some(socket) = self.socket.take() else {
            return;
        };
        let (mut sender, incoming) = socket.split();
        let connection_id = self.origin.connection_id;

        // 出站事件队列必须先于在线登记就绪，欢迎信息才不会丢失
        let (event_tx, mut event_rx) = mpsc::unbounded_channel::<ServerEvent>();
        self.state
            .router
            .register_sender(connection_id, event_tx)
            .await;
        self.state.chat_service.connect(&self.origin).await;

        // 创建 mpsc channel 来解耦对 sender 的访问
        let (cmd_tx, mut cmd_rx) = mpsc::channel::<WsCommand>(32);
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        // 发送任务：统一处理所有对 WebSocket sender 的写操作
        let mut send_task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    cmd = cmd_rx.recv() => {
                        let Some(cmd) = cmd else {
                            // 接收任务已结束：写完已排队的事件后退出
                            while let Ok(event) = event_rx.try_recv() {
                                if write_event(&mut sender, &event).await.is_err() {
                                    break;
                                }
                            }
                            break;
                        };
                        let message = match cmd {
                            WsCommand::SendPong(data) => WsMessage::Pong(data.into()),
                            WsCommand::Close => {
                                let _ = sender.send(WsMessage::Close(None)).await;
                                break;
                            }
                        };
                        if sender.send(message).await.is_err() {
                            tracing::warn!("Failed to send pong message");
                            break;
                        }
                    }
                    Some(event) = event_rx.recv() => {
                        if write_event(&mut sender, &event).await.is_err() {
                            tracing::warn!("Failed to send text message");
                            break;
                        }
                    }
                }
            }
            tracing::debug!("WebSocket发送任务结束");
        });

        // 接收任务：同一连接上的入站事件按到达顺序逐个处理
        let mut recv_task = {
            let state = self.state.clone();
            let origin = self.origin.clone();
            tokio::spawn(read_frames(incoming, stop_rx, move |message| {
                let state = state.clone();
                let origin = origin.clone();
                let cmd_tx = cmd_tx.clone();
                async move { Self::handle_incoming(&state, &origin, message, &cmd_tx).await }
            }))
        };

        // 等待任意一个任务完成（连接断开）
        tokio::select! {
            _ = &mut send_task => {
                // 写端已失效：停止读取新帧，正在处理的事件照常执行完
                let _ = stop_tx.send(());
                let _ = (&mut recv_task).await;
            }
            _ = &mut recv_task => {
                if tokio::time::timeout(std::time::Duration::from_secs(1), &mut send_task)
                    .await
                    .is_err()
                {
                    send_task.abort();
                }
            }
        }

        // 连接断开时清理在线状态
        self.state.chat_service.disconnect(&self.origin).await;
        self.state.router.unregister_sender(connection_id).await;

        tracing::info!(
            username = %self.origin.username,
            connection_id = %connection_id,
            "WebSocket连接已断开，在线状态已清理"
        );
    }

    /// 处理来自客户端的帧，返回 `Break` 表示应结束连接
    async fn handle_incoming(
        state: &AppState,
        origin: &Origin,
        message: WsMessage,
        cmd_tx: &mpsc::Sender<WsCommand>,
    ) -> ControlFlow<()> {
        match message {
            WsMessage::Text(text) => {
                let event = match serde_json::from_str::<ClientEvent>(text.as_str()) {
                    Ok(event) => event,
                    Err(err) => {
                        tracing::debug!(connection_id = %origin.connection_id, error = %err, "无法解析客户端事件");
                        let report = ServerEvent::error("VALIDATION_ERROR", format!("malformed event: {err}"));
                        let _ = state.router.deliver(origin.connection_id, report).await;
                        return ControlFlow::Continue(());
                    }
                };

                if matches!(event, ClientEvent::Logout) {
                    tracing::info!(username = %origin.username, "用户登出");
                    let _ = cmd_tx.send(WsCommand::Close).await;
                    return ControlFlow::Break(());
                }

                tracing::debug!(connection_id = %origin.connection_id, event = event.kind(), "收到客户端事件");
                state.chat_service.dispatch(origin, event).await;
            }
            WsMessage::Binary(_) => {
                let report = ServerEvent::error("VALIDATION_ERROR", "binary frames are not supported");
                let _ = state.router.deliver(origin.connection_id, report).await;
            }
            WsMessage::Ping(data) => {
                tracing::debug!("收到ping消息，发送pong回应");
                if cmd_tx.send(WsCommand::SendPong(data.to_vec())).await.is_err() {
                    tracing::warn!("Failed to send pong command");
                    return ControlFlow::Break(());
                }
            }
            WsMessage::Pong(_) => {
                tracing::debug!("收到pong消息");
            }
            WsMessage::Close(_) => {
                tracing::info!("WebSocket收到关闭消息");
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }
}

/// 逐帧读取并交给 `on_frame` 处理，直到连接结束、处理结果为 `Break` 或收到停止信号。
///
/// 停止信号只在两帧之间检查，已经开始处理的帧总会完整执行。
async fn read_frames<S, E, F, Fut>(mut incoming: S, mut stop: oneshot::Receiver<()>, mut on_frame: F)
where
    S: Stream<Item = Result<WsMessage, E>> + Unpin,
    F: FnMut(WsMessage) -> Fut,
    Fut: Future<Output = ControlFlow<()>>,
{
    loop {
        let frame = tokio::select! {
            biased;
            _ = &mut stop => break,
            frame = incoming.next() => frame,
        };
        let Some(Ok(message)) = frame else {
            break;
        };
        if on_frame(message).await.is_break() {
            break;
        }
    }
    tracing::debug!("WebSocket接收任务结束");
}

async fn write_event(
    sender: &mut SplitSink<WebSocket, WsMessage>,
    event: &ServerEvent,
) -> Result<(), axum::Error> {
    let payload = match serde_json::to_string(event) {
        Ok(json) => json,
        Err(err) => {
            tracing::warn!(error = %err, "failed to serialize websocket payload");
            return Ok(());
        }
    };
    sender.send(WsMessage::Text(payload.into())).await
}

/// WebSocket 写操作命令
#[derive(Debug)]
enum WsCommand {
    SendPong(Vec<u8>),
    Close,
}

impl Drop for WebSocketConnection {
    fn drop(&mut self) {
        tracing::debug!(
            username = %self.origin.username,
            connection_id = %self.origin.connection_id,
            "WebSocketConnection 被销毁"
        );
    }
}
