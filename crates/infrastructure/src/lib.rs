//! 基础设施层实现。
//!
//! 提供内存与 PostgreSQL 存储、本地文件存储以及 WebSocket 连接路由，
//! 实现应用/领域层定义的端口。

pub mod blob_store;
pub mod builder;
pub mod memory;
pub mod migrations;
pub mod repository;
pub mod websocket;

pub use blob_store::FsBlobStore;
pub use builder::{Infrastructure, InfrastructureError};
pub use memory::{InMemoryMessageRepository, InMemoryUserRepository};
pub use migrations::MIGRATOR;
pub use repository::{create_pg_pool, PgMessageRepository, PgStorage, PgUserRepository};
pub use websocket::{InMemoryConnectionRouter, RouterStats};
