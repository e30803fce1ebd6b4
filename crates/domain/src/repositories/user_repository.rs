//! 身份存储接口定义

use async_trait::async_trait;

use crate::entities::User;
use crate::errors::RepositoryResult;
use crate::value_objects::{StatusText, Username};

/// 身份存储：按用户名解析持久化的用户记录
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// 根据用户名查找用户
    async fn find_by_username(&self, username: &Username) -> RepositoryResult<Option<User>>;

    /// 创建新用户，用户名已存在时返回 `Conflict`
    async fn create(&self, user: User) -> RepositoryResult<User>;

    /// 更新用户状态，用户不存在时返回 `NotFound`
    async fn update_status(&self, username: &Username, status: &StatusText)
        -> RepositoryResult<()>;
}
