//! 消息存储接口定义

use async_trait::async_trait;

use crate::entities::{Message, NewMessage};
use crate::errors::RepositoryResult;
use crate::value_objects::MessageId;

/// 消息存储：按 ID 增删改查
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// 持久化新消息并分配唯一 ID，并发创建时 ID 不重复
    async fn create(&self, message: NewMessage) -> RepositoryResult<Message>;

    /// 根据ID查找消息
    async fn find_by_id(&self, id: MessageId) -> RepositoryResult<Option<Message>>;

    /// 覆盖已有消息的可变字段（正文、编辑时间、表情回应）
    async fn update(&self, message: &Message) -> RepositoryResult<()>;

    /// 删除消息，不存在时返回 `NotFound`
    async fn delete(&self, id: MessageId) -> RepositoryResult<()>;
}
