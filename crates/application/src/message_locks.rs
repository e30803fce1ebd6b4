use std::collections::HashMap;
use std::sync::Arc;

use domain::MessageId;
use tokio::sync::{Mutex, OwnedMutexGuard};

const PRUNE_THRESHOLD: usize = 1024;

/// 按消息 ID 划分的锁表
///
/// 同一条消息上的读-改-写串行执行，不同消息之间互不阻塞。
#[derive(Debug, Default)]
pub struct MessageLocks {
    locks: Mutex<HashMap<MessageId, Arc<Mutex<()>>>>,
}

impl MessageLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, id: MessageId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            if locks.len() >= PRUNE_THRESHOLD {
                // 只有锁表自己持有引用的条目才能安全丢弃
                locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            }
            locks.entry(id).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// 消息删除后丢弃对应的锁
    pub async fn forget(&self, id: MessageId) {
        self.locks.lock().await.remove(&id);
    }

    pub async fn len(&self) -> usize {
        self.locks.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_message_is_serialized() {
        let locks = Arc::new(MessageLocks::new());
        let guard = locks.lock(MessageId::new(1)).await;

        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.lock(MessageId::new(1)).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn different_messages_do_not_block() {
        let locks = MessageLocks::new();
        let _first = locks.lock(MessageId::new(1)).await;

        let second = tokio::time::timeout(Duration::from_millis(100), locks.lock(MessageId::new(2)))
            .await;
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn forget_drops_the_entry() {
        let locks = MessageLocks::new();
        drop(locks.lock(MessageId::new(7)).await);
        assert_eq!(locks.len().await, 1);

        locks.forget(MessageId::new(7)).await;
        assert_eq!(locks.len().await, 0);
    }
}
