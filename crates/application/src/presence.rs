use std::collections::{BTreeSet, HashMap, HashSet};

use domain::{ConnectionId, ServerEvent, Username};
use tokio::sync::RwLock;

/// 身份上线或下线的通知，由调用方广播。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceChange {
    pub username: Username,
    pub online: bool,
    pub online_count: usize,
}

impl PresenceChange {
    pub fn to_event(&self) -> ServerEvent {
        ServerEvent::PresenceChanged {
            username: self.username.clone(),
            online: self.online,
            online_count: self.online_count,
        }
    }
}

/// 在线状态注册表
///
/// 在线状态由每个身份持有的连接集合派生：集合非空即在线。
/// 所有读写都经过同一把锁，快照不会观察到修改到一半的集合。
#[derive(Debug, Default)]
pub struct PresenceRegistry {
    entries: RwLock<HashMap<Username, HashSet<ConnectionId>>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记连接。身份的第一条连接会产生上线通知；重复登记同一连接不产生任何变化。
    pub async fn register(
        &self,
        username: &Username,
        connection: ConnectionId,
    ) -> Option<PresenceChange> {
        let mut entries = self.entries.write().await;
        let connections = entries.entry(username.clone()).or_default();
        let first = connections.is_empty();
        connections.insert(connection);

        if !first {
            return None;
        }
        tracing::info!(username = %username, connection_id = %connection, "用户上线");
        Some(PresenceChange {
            username: username.clone(),
            online: true,
            online_count: entries.len(),
        })
    }

    /// 注销连接。最后一条连接离开时移除条目并产生下线通知。
    ///
    /// 身份或连接不存在时什么也不做，可以在任意清理路径上重复调用。
    pub async fn deregister(
        &self,
        username: &Username,
        connection: ConnectionId,
    ) -> Option<PresenceChange> {
        let mut entries = self.entries.write().await;
        let connections = entries.get_mut(username)?;
        if !connections.remove(&connection) {
            return None;
        }
        if !connections.is_empty() {
            return None;
        }
        entries.remove(username);

        tracing::info!(username = %username, connection_id = %connection, "用户下线");
        Some(PresenceChange {
            username: username.clone(),
            online: false,
            online_count: entries.len(),
        })
    }

    /// 某身份当前所有连接的快照，离线时为空
    pub async fn connections_for(&self, username: &Username) -> HashSet<ConnectionId> {
        let entries = self.entries.read().await;
        entries.get(username).cloned().unwrap_or_default()
    }

    /// 当前在线身份的快照
    pub async fn online_identities(&self) -> BTreeSet<Username> {
        let entries = self.entries.read().await;
        entries.keys().cloned().collect()
    }

    /// 所有在线连接的快照
    pub async fn all_connections(&self) -> Vec<ConnectionId> {
        let entries = self.entries.read().await;
        entries.values().flatten().copied().collect()
    }

    /// 除指定身份外所有在线连接的快照
    pub async fn connections_except(&self, username: &Username) -> Vec<ConnectionId> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .filter(|(owner, _)| *owner != username)
            .flat_map(|(_, connections)| connections.iter().copied())
            .collect()
    }

    pub async fn is_online(&self, username: &Username) -> bool {
        let entries = self.entries.read().await;
        entries.contains_key(username)
    }

    /// 连接是否以该身份登记
    pub async fn is_registered(&self, username: &Username, connection: ConnectionId) -> bool {
        let entries = self.entries.read().await;
        entries
            .get(username)
            .is_some_and(|connections| connections.contains(&connection))
    }

    pub async fn online_count(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn user(name: &str) -> Username {
        Username::parse(name).unwrap()
    }

    #[tokio::test]
    async fn first_connection_announces_online() {
        let registry = PresenceRegistry::new();
        let alice = user("alice");

        let change = registry.register(&alice, ConnectionId::new()).await;
        assert_eq!(
            change,
            Some(PresenceChange {
                username: alice.clone(),
                online: true,
                online_count: 1,
            })
        );
        assert!(registry.is_online(&alice).await);
    }

    #[tokio::test]
    async fn second_device_keeps_user_online() {
        let registry = PresenceRegistry::new();
        let alice = user("alice");
        let (conn1, conn2) = (ConnectionId::new(), ConnectionId::new());

        assert!(registry.register(&alice, conn1).await.is_some());
        assert!(registry.register(&alice, conn2).await.is_none());

        assert!(registry.deregister(&alice, conn1).await.is_none());
        assert!(registry.is_online(&alice).await);
        assert_eq!(registry.connections_for(&alice).await, HashSet::from([conn2]));

        let change = registry.deregister(&alice, conn2).await.unwrap();
        assert!(!change.online);
        assert_eq!(change.online_count, 0);
        assert!(!registry.is_online(&alice).await);
        assert!(registry.connections_for(&alice).await.is_empty());
    }

    #[tokio::test]
    async fn registering_the_same_connection_twice_is_idempotent() {
        let registry = PresenceRegistry::new();
        let alice = user("alice");
        let conn = ConnectionId::new();

        registry.register(&alice, conn).await;
        assert!(registry.register(&alice, conn).await.is_none());
        assert_eq!(registry.connections_for(&alice).await.len(), 1);

        // 一次注销即下线，不会因为重复登记而多计数
        assert!(registry.deregister(&alice, conn).await.is_some());
        assert!(!registry.is_online(&alice).await);
    }

    #[tokio::test]
    async fn deregistering_unknown_entries_is_a_noop() {
        let registry = PresenceRegistry::new();
        let alice = user("alice");
        let conn = ConnectionId::new();

        assert!(registry.deregister(&alice, conn).await.is_none());

        registry.register(&alice, conn).await;
        assert!(registry.deregister(&alice, ConnectionId::new()).await.is_none());
        assert!(registry.deregister(&alice, conn).await.is_some());
        assert!(registry.deregister(&alice, conn).await.is_none());
    }

    #[tokio::test]
    async fn snapshots_cover_every_identity() {
        let registry = PresenceRegistry::new();
        let (alice, bob) = (user("alice"), user("bob"));
        let (a1, a2, b1) = (ConnectionId::new(), ConnectionId::new(), ConnectionId::new());
        registry.register(&alice, a1).await;
        registry.register(&alice, a2).await;
        registry.register(&bob, b1).await;

        assert_eq!(
            registry.online_identities().await,
            BTreeSet::from([alice.clone(), bob.clone()])
        );
        assert_eq!(registry.all_connections().await.len(), 3);
        assert_eq!(registry.connections_except(&alice).await, vec![b1]);
        assert!(registry.is_registered(&alice, a2).await);
        assert!(!registry.is_registered(&bob, a2).await);
        assert_eq!(registry.online_count().await, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_churn_leaves_consistent_state() {
        let registry = Arc::new(PresenceRegistry::new());
        let alice = user("alice");

        let mut handles = Vec::new();
        for _ in 0..64 {
            let registry = registry.clone();
            let alice = alice.clone();
            handles.push(tokio::spawn(async move {
                let conn = ConnectionId::new();
                registry.register(&alice, conn).await;
                tokio::task::yield_now().await;
                registry.deregister(&alice, conn).await
            }));
        }

        let mut offline_announcements = 0;
        for handle in handles {
            if let Some(change) = handle.await.unwrap() {
                assert!(!change.online);
                offline_announcements += 1;
            }
        }

        assert!(offline_announcements >= 1);
        assert!(!registry.is_online(&alice).await);
        assert!(registry.online_identities().await.is_empty());
    }
}
