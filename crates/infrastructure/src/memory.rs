//! 内存存储实现
//!
//! 进程重启后数据丢失，用于本地开发与测试。

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use domain::{
    Message, MessageId, MessageRepository, NewMessage, RepositoryError, RepositoryResult,
    StatusText, User, UserRepository, Username,
};
use tokio::sync::RwLock;

#[derive(Default)]
pub struct InMemoryUserRepository {
    users: RwLock<HashMap<Username, User>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预先注册一批用户
    pub fn with_users(usernames: impl IntoIterator<Item = Username>) -> Self {
        let now = Utc::now();
        let users = usernames
            .into_iter()
            .map(|username| (username.clone(), User::register(username, now)))
            .collect();
        Self {
            users: RwLock::new(users),
        }
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn find_by_username(&self, username: &Username) -> RepositoryResult<Option<User>> {
        Ok(self.users.read().await.get(username).cloned())
    }

    async fn create(&self, user: User) -> RepositoryResult<User> {
        let mut users = self.users.write().await;
        if users.contains_key(&user.username) {
            return Err(RepositoryError::Conflict);
        }
        users.insert(user.username.clone(), user.clone());
        Ok(user)
    }

    async fn update_status(
        &self,
        username: &Username,
        status: &StatusText,
    ) -> RepositoryResult<()> {
        let mut users = self.users.write().await;
        let user = users.get_mut(username).ok_or(RepositoryError::NotFound)?;
        user.set_status(status.clone(), Utc::now());
        Ok(())
    }
}

pub struct InMemoryMessageRepository {
    next_id: AtomicI64,
    messages: RwLock<HashMap<MessageId, Message>>,
}

impl InMemoryMessageRepository {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1),
            messages: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryMessageRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageRepository for InMemoryMessageRepository {
    async fn create(&self, message: NewMessage) -> RepositoryResult<Message> {
        let id = MessageId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let message = Message::from_new(id, message);
        self.messages.write().await.insert(id, message.clone());
        Ok(message)
    }

    async fn find_by_id(&self, id: MessageId) -> RepositoryResult<Option<Message>> {
        Ok(self.messages.read().await.get(&id).cloned())
    }

    async fn update(&self, message: &Message) -> RepositoryResult<()> {
        let mut messages = self.messages.write().await;
        let stored = messages
            .get_mut(&message.id)
            .ok_or(RepositoryError::NotFound)?;
        *stored = message.clone();
        Ok(())
    }

    async fn delete(&self, id: MessageId) -> RepositoryResult<()> {
        self.messages
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or(RepositoryError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    use domain::MessageContent;

    fn user(name: &str) -> Username {
        Username::parse(name).unwrap()
    }

    #[tokio::test]
    async fn seeded_users_resolve() {
        let repo = InMemoryUserRepository::with_users([user("test_user")]);

        let found = repo.find_by_username(&user("test_user")).await.unwrap();
        assert_eq!(found.unwrap().status, StatusText::default());
        assert!(repo.find_by_username(&user("ghost")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_user_conflicts() {
        let repo = InMemoryUserRepository::new();
        repo.create(User::register(user("alice"), Utc::now()))
            .await
            .unwrap();

        let again = repo.create(User::register(user("alice"), Utc::now())).await;
        assert_eq!(again, Err(RepositoryError::Conflict));
    }

    #[tokio::test]
    async fn status_update_requires_existing_user() {
        let repo = InMemoryUserRepository::with_users([user("alice")]);
        let away = StatusText::parse("away").unwrap();

        repo.update_status(&user("alice"), &away).await.unwrap();
        assert_eq!(
            repo.find_by_username(&user("alice")).await.unwrap().unwrap().status,
            away
        );
        assert_eq!(
            repo.update_status(&user("ghost"), &away).await,
            Err(RepositoryError::NotFound)
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_creates_get_unique_ids() {
        let repo = Arc::new(InMemoryMessageRepository::new());

        let mut handles = Vec::new();
        for n in 0..50 {
            let repo = repo.clone();
            handles.push(tokio::spawn(async move {
                let content = MessageContent::new(format!("message {n}")).unwrap();
                repo.create(NewMessage::group(user("alice"), content, Utc::now()))
                    .await
                    .unwrap()
                    .id
            }));
        }

        let mut ids = HashSet::new();
        for handle in handles {
            assert!(ids.insert(handle.await.unwrap()));
        }
        assert_eq!(ids.len(), 50);
    }

    #[tokio::test]
    async fn update_and_delete_missing_message() {
        let repo = InMemoryMessageRepository::new();
        let content = MessageContent::new("hi").unwrap();
        let mut message = repo
            .create(NewMessage::group(user("alice"), content, Utc::now()))
            .await
            .unwrap();
        assert_eq!(message.id, MessageId::new(1));

        message.reactions.add("👍", &user("bob"));
        repo.update(&message).await.unwrap();
        let stored = repo.find_by_id(message.id).await.unwrap().unwrap();
        assert_eq!(stored.reactions.count("👍"), 1);

        repo.delete(message.id).await.unwrap();
        assert_eq!(repo.delete(message.id).await, Err(RepositoryError::NotFound));
        assert_eq!(repo.update(&message).await, Err(RepositoryError::NotFound));
    }
}
