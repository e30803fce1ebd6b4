//! 实时事件协议
//!
//! 客户端入站事件与服务端出站事件，均为带 `type` 标签的结构化记录。

pub mod chat_event;

// 重新导出事件类型
pub use chat_event::*;
