use async_trait::async_trait;
use domain::{ConnectionId, ServerEvent};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("connection {0} is closed")]
    ConnectionClosed(ConnectionId),
}

/// 连接网关提供给核心的出站端口。
///
/// 同一连接上的投递顺序与调用顺序一致。
#[async_trait]
pub trait ConnectionSink: Send + Sync {
    /// 投递到单个连接
    async fn deliver(&self, connection: ConnectionId, event: ServerEvent)
        -> Result<(), DeliveryError>;

    /// 投递到一组连接，单个连接失败只记录日志，返回成功投递的数量
    async fn broadcast(&self, connections: &[ConnectionId], event: ServerEvent) -> usize;
}
