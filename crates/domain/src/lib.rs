//! 实时聊天系统核心领域模型
//!
//! 包含身份、连接、消息与表情回应等核心实体，事件协议，
//! 以及存储端口（用户、消息、文件）的抽象接口。

pub mod business_rules;
pub mod entities;
pub mod errors;
pub mod events;
pub mod repositories;
pub mod value_objects;

// 重新导出常用类型
pub use business_rules::*;
pub use entities::*;
pub use errors::*;
pub use events::*;
pub use repositories::*;
pub use value_objects::*;
