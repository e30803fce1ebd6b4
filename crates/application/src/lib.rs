//! 应用层实现。
//!
//! 在线状态注册表与事件调度引擎：解析入站事件的身份、校验、持久化，
//! 再通过连接出口把出站事件投递给在线连接。

pub mod broadcaster;
pub mod clock;
pub mod error;
pub mod message_locks;
pub mod presence;
pub mod services;

pub use broadcaster::{ConnectionSink, DeliveryError};
pub use clock::{Clock, SystemClock};
pub use error::ApplicationError;
pub use message_locks::MessageLocks;
pub use presence::{PresenceChange, PresenceRegistry};
pub use services::{ChatService, ChatServiceDependencies, ChatSettings, Origin};
