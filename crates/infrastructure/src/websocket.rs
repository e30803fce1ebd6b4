//! WebSocket 连接出口实现
//!
//! 每条连接在网关侧持有一个无界队列的接收端，核心通过路由器把事件写入对应的发送端。
//! 单个队列先进先出，因此同一连接上的投递顺序与调用顺序一致。

use std::collections::HashMap;
use std::sync::Arc;

use application::{ConnectionSink, DeliveryError};
use async_trait::async_trait;
use domain::{ConnectionId, ServerEvent};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};

/// 路由统计信息
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouterStats {
    pub total_messages: u64,
    pub successful_routes: u64,
    pub failed_routes: u64,
}

/// 内存中的连接路由器
#[derive(Default)]
pub struct InMemoryConnectionRouter {
    /// 连接发送器映射
    connection_senders: Arc<RwLock<HashMap<ConnectionId, mpsc::UnboundedSender<ServerEvent>>>>,
    stats: Arc<RwLock<RouterStats>>,
}

impl InMemoryConnectionRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册连接发送器
    pub async fn register_sender(
        &self,
        connection_id: ConnectionId,
        sender: mpsc::UnboundedSender<ServerEvent>,
    ) {
        let mut senders = self.connection_senders.write().await;
        senders.insert(connection_id, sender);
    }

    /// 注销连接发送器
    pub async fn unregister_sender(&self, connection_id: ConnectionId) {
        let mut senders = self.connection_senders.write().await;
        senders.remove(&connection_id);
    }

    pub async fn connection_count(&self) -> usize {
        self.connection_senders.read().await.len()
    }

    pub async fn get_stats(&self) -> RouterStats {
        self.stats.read().await.clone()
    }

    async fn update_stats(&self, f: impl FnOnce(&mut RouterStats)) {
        let mut stats = self.stats.write().await;
        f(&mut stats);
    }
}

#[async_trait]
impl ConnectionSink for InMemoryConnectionRouter {
    async fn deliver(
        &self,
        connection: ConnectionId,
        event: ServerEvent,
    ) -> Result<(), DeliveryError> {
        let sent = {
            let senders = self.connection_senders.read().await;
            senders
                .get(&connection)
                .is_some_and(|sender| sender.send(event).is_ok())
        };

        self.update_stats(|stats| {
            stats.total_messages += 1;
            if sent {
                stats.successful_routes += 1;
            } else {
                stats.failed_routes += 1;
            }
        })
        .await;

        if sent {
            Ok(())
        } else {
            debug!(connection_id = %connection, "connection already closed, dropping event");
            Err(DeliveryError::ConnectionClosed(connection))
        }
    }

    async fn broadcast(&self, connections: &[ConnectionId], event: ServerEvent) -> usize {
        let delivered = {
            let senders = self.connection_senders.read().await;
            connections
                .iter()
                .filter(|connection| {
                    senders
                        .get(connection)
                        .is_some_and(|sender| sender.send(event.clone()).is_ok())
                })
                .count()
        };

        let failed = connections.len() - delivered;
        if failed > 0 {
            warn!(
                event = event.kind(),
                failed, "some connections closed before broadcast completed"
            );
        }
        self.update_stats(|stats| {
            stats.total_messages += connections.len() as u64;
            stats.successful_routes += delivered as u64;
            stats.failed_routes += failed as u64;
        })
        .await;

        delivered
    }
}
