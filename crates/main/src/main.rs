//! 主应用程序入口
//!
//! 加载配置、装配存储与调度引擎，启动 Axum Web API 服务。

use std::sync::Arc;

use anyhow::Context;
use application::{ChatService, ChatServiceDependencies, ChatSettings, PresenceRegistry, SystemClock};
use config::AppConfig;
use domain::Username;
use infrastructure::{InMemoryConnectionRouter, Infrastructure};
use tracing_subscriber::EnvFilter;
use web_api::{router, AppState, JwtService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::load().context("加载配置失败")?;
    tracing::info!(config = %config.sanitize(), "配置已加载");

    let seed_users = config
        .chat
        .seed_users
        .iter()
        .map(|name| Username::parse(name.as_str()))
        .collect::<Result<Vec<_>, _>>()
        .context("seed_users 中包含无效用户名")?;

    let infrastructure = Infrastructure::connect(&config.storage, &seed_users).await?;

    // 出站事件路由与在线状态都只存在于本进程内存中
    let connection_router = Arc::new(InMemoryConnectionRouter::new());
    let chat_service = ChatService::new(ChatServiceDependencies {
        user_repository: infrastructure.user_repository,
        message_repository: infrastructure.message_repository,
        blob_store: infrastructure.blob_store,
        presence: Arc::new(PresenceRegistry::new()),
        sink: connection_router.clone(),
        clock: Arc::new(SystemClock),
        settings: ChatSettings {
            max_message_length: config.chat.max_message_length,
            mention_excerpt_chars: config.chat.mention_excerpt_chars,
            max_upload_bytes: config.chat.max_upload_bytes,
        },
    });
    let jwt_service = JwtService::new(config.jwt.clone());

    let state = AppState::new(
        Arc::new(chat_service),
        connection_router,
        Arc::new(jwt_service),
    );

    // 启动 Web 服务器
    let app = router(state);
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("无法监听 {addr}"))?;

    tracing::info!("聊天室服务器启动在 http://{}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("服务器已停止");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "无法监听 Ctrl+C 信号");
        return;
    }
    tracing::info!("收到关闭信号，开始优雅停机");
}
