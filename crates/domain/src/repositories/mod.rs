//! Repository接口定义
//!
//! 定义核心依赖的外部存储端口：身份存储、消息存储与文件存储。
//! 内层定义接口，外层（infrastructure）实现接口。

pub mod blob_store;
pub mod message_repository;
pub mod user_repository;

// 重新导出所有端口特征
pub use blob_store::BlobStore;
pub use message_repository::MessageRepository;
pub use user_repository::UserRepository;

#[cfg(feature = "testing")]
pub use blob_store::MockBlobStore;
#[cfg(feature = "testing")]
pub use message_repository::MockMessageRepository;
#[cfg(feature = "testing")]
pub use user_repository::MockUserRepository;
