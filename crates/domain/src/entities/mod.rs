//! 领域实体定义
//!
//! 包含系统的核心实体：用户、消息及其表情回应。

pub mod message;
pub mod reaction;
pub mod user;

// 重新导出核心实体
pub use message::{Message, MessageType, NewMessage};
pub use reaction::ReactionMap;
pub use user::User;
