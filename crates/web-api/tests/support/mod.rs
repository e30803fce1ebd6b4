#![allow(dead_code)]

use std::{net::SocketAddr, sync::Arc, time::Duration};

use application::{ChatService, ChatServiceDependencies, ChatSettings, PresenceRegistry, SystemClock};
use domain::Username;
use futures_util::{SinkExt, StreamExt};
use infrastructure::{
    FsBlobStore, InMemoryConnectionRouter, InMemoryMessageRepository, InMemoryUserRepository,
};
use serde_json::Value;
use tempfile::TempDir;
use tokio::{net::TcpListener, net::TcpStream, sync::oneshot, time::timeout};
use tokio_tungstenite::{
    connect_async, tungstenite::Message as TungsteniteMessage, MaybeTlsStream, WebSocketStream,
};
use web_api::{router, AppState, JwtConfig, JwtService};

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// 启动在随机端口上的测试服务，用户 alice / bob / carol 已注册
pub struct TestServer {
    pub addr: SocketAddr,
    pub state: AppState,
    _uploads: TempDir,
    shutdown: Option<oneshot::Sender<()>>,
}

impl TestServer {
    pub async fn start() -> Self {
        let uploads = tempfile::tempdir().expect("tempdir");
        let users = ["alice", "bob", "carol"]
            .into_iter()
            .map(|name| Username::parse(name).expect("username"));

        let connection_router = Arc::new(InMemoryConnectionRouter::new());
        let chat_service = ChatService::new(ChatServiceDependencies {
            user_repository: Arc::new(InMemoryUserRepository::with_users(users)),
            message_repository: Arc::new(InMemoryMessageRepository::new()),
            blob_store: Arc::new(FsBlobStore::new(uploads.path())),
            presence: Arc::new(PresenceRegistry::new()),
            sink: connection_router.clone(),
            clock: Arc::new(SystemClock),
            settings: ChatSettings::default(),
        });
        let jwt_service = JwtService::new(JwtConfig {
            secret: "integration-test-secret-with-enough-length".to_string(),
            expiration_hours: 1,
        });
        let state = AppState::new(
            Arc::new(chat_service),
            connection_router,
            Arc::new(jwt_service),
        );

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let app = router(state.clone());

        tokio::spawn(async move {
            axum::serve(listener, app.into_make_service())
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        Self {
            addr,
            state,
            _uploads: uploads,
            shutdown: Some(shutdown_tx),
        }
    }

    pub fn http_url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn token_for(&self, username: &str) -> String {
        let username = Username::parse(username).expect("username");
        self.state
            .jwt_service
            .generate_token(&username)
            .expect("token")
    }

    /// 以指定用户身份建立 WebSocket 连接，并消费掉欢迎信息
    pub async fn connect(&self, username: &str) -> WsClient {
        let url = format!(
            "ws://{}/api/v1/ws?token={}",
            self.addr,
            self.token_for(username)
        );
        let (mut socket, _) = connect_async(url).await.expect("websocket connect");
        let welcome = next_event(&mut socket).await;
        assert_eq!(welcome["type"], "welcome");
        assert_eq!(welcome["username"], username);
        socket
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

pub async fn send_event(socket: &mut WsClient, event: Value) {
    socket
        .send(TungsteniteMessage::Text(event.to_string().into()))
        .await
        .expect("send event");
}

/// 读取下一个 JSON 事件，跳过控制帧
pub async fn next_event(socket: &mut WsClient) -> Value {
    loop {
        let frame = timeout(Duration::from_secs(2), socket.next())
            .await
            .expect("timed out waiting for event")
            .expect("stream ended")
            .expect("websocket error");
        if let TungsteniteMessage::Text(text) = frame {
            return serde_json::from_str(text.as_str()).expect("json event");
        }
    }
}

/// 断言在短时间内没有新事件到达
pub async fn expect_silence(socket: &mut WsClient) {
    let result = timeout(Duration::from_millis(200), socket.next()).await;
    assert!(result.is_err(), "unexpected frame: {result:?}");
}
