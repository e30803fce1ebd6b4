use std::collections::HashSet;
use std::sync::Arc;

use data_encoding::BASE64;
use domain::{
    BlobStore, ClientEvent, ConnectionId, FileNameRules, MentionRules, Message, MessageContent,
    MessageId, MessageRepository, NewMessage, ReactionRules, ServerEvent, StatusText,
    UserRepository, Username,
};
use tokio::sync::Mutex;

use crate::{
    broadcaster::ConnectionSink, clock::Clock, error::ApplicationError,
    message_locks::MessageLocks, presence::PresenceRegistry,
};

/// 调度引擎的业务参数
#[derive(Debug, Clone)]
pub struct ChatSettings {
    pub max_message_length: usize,
    pub mention_excerpt_chars: usize,
    pub max_upload_bytes: usize,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            max_message_length: 4000,
            mention_excerpt_chars: 80,
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }
}

pub struct ChatServiceDependencies {
    pub user_repository: Arc<dyn UserRepository>,
    pub message_repository: Arc<dyn MessageRepository>,
    pub blob_store: Arc<dyn BlobStore>,
    pub presence: Arc<PresenceRegistry>,
    pub sink: Arc<dyn ConnectionSink>,
    pub clock: Arc<dyn Clock>,
    pub settings: ChatSettings,
}

/// 入站事件的来源：发起事件的身份与连接
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    pub username: Username,
    pub connection_id: ConnectionId,
}

impl Origin {
    pub fn new(username: Username, connection_id: ConnectionId) -> Self {
        Self {
            username,
            connection_id,
        }
    }
}

/// 事件调度引擎
///
/// 每个入站事件按 认证 → 校验 → 持久化 → 解析目标 → 投递 的顺序完整执行，
/// 任一步失败都不会留下部分状态，也不会产生广播。
pub struct ChatService {
    deps: ChatServiceDependencies,
    locks: MessageLocks,
    // 上下线通知按登记顺序发出
    announcements: Mutex<()>,
}

impl ChatService {
    pub fn new(deps: ChatServiceDependencies) -> Self {
        Self {
            deps,
            locks: MessageLocks::new(),
            announcements: Mutex::new(()),
        }
    }

    pub fn presence(&self) -> &Arc<PresenceRegistry> {
        &self.deps.presence
    }

    /// 把网关给出的用户名解析为身份存储中已知的身份
    pub async fn resolve_identity(&self, raw: &str) -> Result<Username, ApplicationError> {
        let username = Username::parse(raw).map_err(|_| ApplicationError::Unauthenticated)?;
        self.deps
            .user_repository
            .find_by_username(&username)
            .await?
            .ok_or(ApplicationError::Unauthenticated)?;
        Ok(username)
    }

    /// 连接建立：登记在线状态，向新连接发送欢迎信息，首条连接时广播上线
    pub async fn connect(&self, origin: &Origin) {
        let _announcing = self.announcements.lock().await;
        let change = self
            .deps
            .presence
            .register(&origin.username, origin.connection_id)
            .await;

        let online = self.deps.presence.online_identities().await;
        let welcome = ServerEvent::Welcome {
            username: origin.username.clone(),
            online: online.into_iter().collect(),
        };
        if let Err(err) = self.deps.sink.deliver(origin.connection_id, welcome).await {
            tracing::warn!(connection_id = %origin.connection_id, error = %err, "欢迎信息投递失败");
        }

        if let Some(change) = change {
            let targets = self.deps.presence.all_connections().await;
            self.deps.sink.broadcast(&targets, change.to_event()).await;
        }
    }

    /// 连接断开：可重复调用，最后一条连接离开时广播下线
    pub async fn disconnect(&self, origin: &Origin) {
        let _announcing = self.announcements.lock().await;
        let change = self
            .deps
            .presence
            .deregister(&origin.username, origin.connection_id)
            .await;

        if let Some(change) = change {
            let targets = self.deps.presence.all_connections().await;
            self.deps.sink.broadcast(&targets, change.to_event()).await;
        }
    }

    /// 处理一个入站事件，失败只回报给发起事件的连接
    pub async fn dispatch(&self, origin: &Origin, event: ClientEvent) {
        let kind = event.kind();
        let Err(err) = self.handle(origin, event).await else {
            return;
        };

        if err == ApplicationError::Unauthenticated {
            tracing::debug!(connection_id = %origin.connection_id, event = kind, "丢弃未认证连接的事件");
            return;
        }

        if err.retryable() {
            tracing::error!(username = %origin.username, event = kind, error = %err, "存储不可用，事件处理失败");
        } else {
            tracing::warn!(username = %origin.username, event = kind, error = %err, "事件被拒绝");
        }

        let report = ServerEvent::error(err.code(), err.to_string());
        if let Err(delivery) = self.deps.sink.deliver(origin.connection_id, report).await {
            tracing::debug!(connection_id = %origin.connection_id, error = %delivery, "错误回报投递失败");
        }
    }

    pub async fn handle(&self, origin: &Origin, event: ClientEvent) -> Result<(), ApplicationError> {
        if !self
            .deps
            .presence
            .is_registered(&origin.username, origin.connection_id)
            .await
        {
            return Err(ApplicationError::Unauthenticated);
        }

        match event {
            ClientEvent::GroupMessage { content } => {
                self.send_group_message(origin, content).await.map(drop)
            }
            ClientEvent::DirectMessage { to, content } => {
                self.send_direct_message(origin, &to, content).await.map(drop)
            }
            ClientEvent::Typing { is_typing } => self.set_typing(origin, is_typing).await,
            ClientEvent::AddReaction { message_id, emoji } => {
                self.add_reaction(origin, MessageId::new(message_id), &emoji)
                    .await
            }
            ClientEvent::RemoveReaction { message_id, emoji } => {
                self.remove_reaction(origin, MessageId::new(message_id), &emoji)
                    .await
            }
            ClientEvent::UpdateStatus { status } => self.update_status(origin, status).await,
            ClientEvent::ShareFile { filename, data } => {
                self.share_file(origin, &filename, &data).await.map(drop)
            }
            ClientEvent::EditMessage {
                message_id,
                content,
            } => {
                self.edit_message(origin, MessageId::new(message_id), content)
                    .await
            }
            ClientEvent::DeleteMessage { message_id } => {
                self.delete_message(origin, MessageId::new(message_id)).await
            }
            // 连接由网关关闭，下线走正常的断开路径
            ClientEvent::Logout => Ok(()),
        }
    }

    pub async fn send_group_message(
        &self,
        origin: &Origin,
        content: String,
    ) -> Result<Message, ApplicationError> {
        let content = MessageContent::with_limit(content, self.deps.settings.max_message_length)?;
        let now = self.deps.clock.now();

        let message = self
            .deps
            .message_repository
            .create(NewMessage::group(origin.username.clone(), content, now))
            .await?;

        let targets = self.deps.presence.all_connections().await;
        let delivered = self
            .deps
            .sink
            .broadcast(&targets, ServerEvent::group_message(&message))
            .await;
        tracing::debug!(message_id = %message.id, delivered, "群聊消息已广播");

        self.notify_mentions(&message).await;
        Ok(message)
    }

    async fn notify_mentions(&self, message: &Message) {
        let excerpt = MentionRules::excerpt(&message.content, self.deps.settings.mention_excerpt_chars);

        for candidate in MentionRules::extract(&message.content) {
            // 不合法的用户名不可能在线
            let Ok(mentioned) = Username::parse(candidate) else {
                continue;
            };
            let targets: Vec<_> = self
                .deps
                .presence
                .connections_for(&mentioned)
                .await
                .into_iter()
                .collect();
            if targets.is_empty() {
                continue;
            }

            let event = ServerEvent::Mention {
                from: message.sender.clone(),
                message_id: message.id,
                excerpt: excerpt.clone(),
            };
            self.deps.sink.broadcast(&targets, event).await;
        }
    }

    pub async fn send_direct_message(
        &self,
        origin: &Origin,
        to: &str,
        content: String,
    ) -> Result<Message, ApplicationError> {
        let receiver = Username::parse(to)?;
        self.ensure_known_user(&origin.username).await?;
        self.ensure_known_user(&receiver).await?;
        let content = MessageContent::with_limit(content, self.deps.settings.max_message_length)?;
        let now = self.deps.clock.now();

        let message = self
            .deps
            .message_repository
            .create(NewMessage::direct(
                origin.username.clone(),
                receiver.clone(),
                content,
                now,
            ))
            .await?;

        let targets = self
            .connections_of(&[receiver.clone(), origin.username.clone()])
            .await;
        self.deps
            .sink
            .broadcast(&targets, ServerEvent::direct_message(&message, receiver))
            .await;
        Ok(message)
    }

    pub async fn set_typing(&self, origin: &Origin, is_typing: bool) -> Result<(), ApplicationError> {
        let targets = self.deps.presence.connections_except(&origin.username).await;
        let event = ServerEvent::Typing {
            username: origin.username.clone(),
            is_typing,
        };
        self.deps.sink.broadcast(&targets, event).await;
        Ok(())
    }

    /// 幂等地加入表情回应；重复回应不持久化也不广播
    pub async fn add_reaction(
        &self,
        origin: &Origin,
        message_id: MessageId,
        emoji: &str,
    ) -> Result<(), ApplicationError> {
        let emoji = ReactionRules::parse_emoji(emoji)?;
        let message = {
            let _guard = self.locks.lock(message_id).await;
            let mut message = self.load_message(message_id).await?;
            if !message.reactions.add(&emoji, &origin.username) {
                return Ok(());
            }
            self.deps.message_repository.update(&message).await?;
            message
        };

        self.broadcast_reactions(message).await;
        Ok(())
    }

    pub async fn remove_reaction(
        &self,
        origin: &Origin,
        message_id: MessageId,
        emoji: &str,
    ) -> Result<(), ApplicationError> {
        let emoji = ReactionRules::parse_emoji(emoji)?;
        let message = {
            let _guard = self.locks.lock(message_id).await;
            let mut message = self.load_message(message_id).await?;
            if !message.reactions.remove(&emoji, &origin.username) {
                return Ok(());
            }
            self.deps.message_repository.update(&message).await?;
            message
        };

        self.broadcast_reactions(message).await;
        Ok(())
    }

    async fn broadcast_reactions(&self, message: Message) {
        let targets = self.deps.presence.all_connections().await;
        let event = ServerEvent::ReactionUpdated {
            message_id: message.id,
            reactions: message.reactions,
        };
        self.deps.sink.broadcast(&targets, event).await;
    }

    pub async fn update_status(&self, origin: &Origin, status: String) -> Result<(), ApplicationError> {
        let status = StatusText::parse(status)?;
        self.deps
            .user_repository
            .update_status(&origin.username, &status)
            .await?;

        let targets = self.deps.presence.all_connections().await;
        let event = ServerEvent::StatusChanged {
            username: origin.username.clone(),
            status,
        };
        self.deps.sink.broadcast(&targets, event).await;
        Ok(())
    }

    /// 解码并写入文件后再创建文件消息；消息创建失败时尽力删除已写入的文件
    pub async fn share_file(
        &self,
        origin: &Origin,
        filename: &str,
        data: &str,
    ) -> Result<Message, ApplicationError> {
        let filename = FileNameRules::sanitize(filename)
            .ok_or_else(|| ApplicationError::validation("filename: no usable characters"))?;
        let bytes = self.decode_upload(data)?;

        let storage_name = format!("{:032x}_{}", rand::random::<u128>(), filename);
        let reference = self
            .deps
            .blob_store
            .store_blob(bytes, &storage_name)
            .await?;

        let now = self.deps.clock.now();
        let created = self
            .deps
            .message_repository
            .create(NewMessage::file(
                origin.username.clone(),
                reference.as_str(),
                now,
            ))
            .await;
        let message = match created {
            Ok(message) => message,
            Err(err) => {
                if let Err(cleanup) = self.deps.blob_store.delete_blob(&reference).await {
                    tracing::error!(reference = %reference, error = %cleanup, "文件消息创建失败后无法删除已写入的文件");
                }
                return Err(err.into());
            }
        };

        let targets = self.deps.presence.all_connections().await;
        let event = ServerEvent::FileMessage {
            id: message.id,
            sender: message.sender.clone(),
            reference,
            filename,
            timestamp: message.created_at,
        };
        self.deps.sink.broadcast(&targets, event).await;
        Ok(message)
    }

    fn decode_upload(&self, data: &str) -> Result<Vec<u8>, ApplicationError> {
        // 兼容浏览器 FileReader 产生的 data URL
        let encoded = match data.split_once(";base64,") {
            Some((prefix, payload)) if prefix.starts_with("data:") => payload,
            _ => data,
        };
        let encoded = encoded.trim();

        let max = self.deps.settings.max_upload_bytes;
        // 解码前按编码长度估算，避免为超限内容分配内存
        if encoded.len() / 4 * 3 > max.saturating_add(3) {
            return Err(ApplicationError::validation(format!(
                "data: file exceeds {max} bytes"
            )));
        }
        let bytes = BASE64
            .decode(encoded.as_bytes())
            .map_err(|err| ApplicationError::validation(format!("data: {err}")))?;
        if bytes.is_empty() {
            return Err(ApplicationError::validation("data: file is empty"));
        }
        if bytes.len() > max {
            return Err(ApplicationError::validation(format!(
                "data: file exceeds {max} bytes"
            )));
        }
        Ok(bytes)
    }

    /// 只有发送者可以编辑；私聊消息的编辑只通知双方
    pub async fn edit_message(
        &self,
        origin: &Origin,
        message_id: MessageId,
        content: String,
    ) -> Result<(), ApplicationError> {
        let content = MessageContent::with_limit(content, self.deps.settings.max_message_length)?;
        let message = {
            let _guard = self.locks.lock(message_id).await;
            let mut message = self.load_message(message_id).await?;
            message.ensure_owned_by(&origin.username, "edit")?;
            message.edit(content, self.deps.clock.now())?;
            self.deps.message_repository.update(&message).await?;
            message
        };

        let targets = self.audience_of(&message).await;
        let event = ServerEvent::MessageEdited {
            message_id,
            content: message.content,
            edited_at: message.edited_at.unwrap_or(message.created_at),
        };
        self.deps.sink.broadcast(&targets, event).await;
        Ok(())
    }

    pub async fn delete_message(
        &self,
        origin: &Origin,
        message_id: MessageId,
    ) -> Result<(), ApplicationError> {
        {
            let _guard = self.locks.lock(message_id).await;
            let message = self.load_message(message_id).await?;
            message.ensure_owned_by(&origin.username, "delete")?;
            self.deps.message_repository.delete(message_id).await?;
        }
        self.locks.forget(message_id).await;
        tracing::info!(message_id = %message_id, username = %origin.username, "消息已删除");

        let targets = self.deps.presence.all_connections().await;
        self.deps
            .sink
            .broadcast(&targets, ServerEvent::MessageDeleted { message_id })
            .await;
        Ok(())
    }

    async fn load_message(&self, message_id: MessageId) -> Result<Message, ApplicationError> {
        self.deps
            .message_repository
            .find_by_id(message_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found(format!("message {message_id}")))
    }

    async fn ensure_known_user(&self, username: &Username) -> Result<(), ApplicationError> {
        self.deps
            .user_repository
            .find_by_username(username)
            .await?
            .ok_or_else(|| ApplicationError::not_found(format!("user {username}")))?;
        Ok(())
    }

    /// 私聊消息的编辑只通知双方，其余消息通知所有在线连接
    async fn audience_of(&self, message: &Message) -> Vec<ConnectionId> {
        if message.is_direct() {
            self.connections_of(&message.participants()).await
        } else {
            self.deps.presence.all_connections().await
        }
    }

    async fn connections_of(&self, usernames: &[Username]) -> Vec<ConnectionId> {
        let mut targets = HashSet::new();
        for username in usernames {
            targets.extend(self.deps.presence.connections_for(username).await);
        }
        targets.into_iter().collect()
    }
}
