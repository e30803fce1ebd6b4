//! 文件存储接口定义

use async_trait::async_trait;

use crate::errors::RepositoryResult;
use crate::value_objects::BlobRef;

/// 文件存储：保存不透明的二进制内容并返回引用
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// 以给定的存储名写入内容，同名内容已存在时返回 `Conflict`
    async fn store_blob(&self, bytes: Vec<u8>, storage_name: &str) -> RepositoryResult<BlobRef>;

    /// 删除已写入的内容，用于消息持久化失败后的回滚
    async fn delete_blob(&self, reference: &BlobRef) -> RepositoryResult<()>;
}
