use serde::{Deserialize, Serialize};

use crate::entities::{Message, ReactionMap};
use crate::value_objects::{BlobRef, MessageId, StatusText, Timestamp, Username};

/// 客户端发往服务端的事件。
///
/// 字段保持原始形态，由调度引擎统一校验，以便校验失败时返回一致的错误码。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// 群聊消息
    GroupMessage { content: String },
    /// 私聊消息
    DirectMessage { to: String, content: String },
    /// 正在输入
    Typing { is_typing: bool },
    /// 添加表情回应
    AddReaction { message_id: i64, emoji: String },
    /// 撤回表情回应
    RemoveReaction { message_id: i64, emoji: String },
    /// 更新个人状态
    UpdateStatus { status: String },
    /// 分享文件，`data` 为 base64 编码内容
    ShareFile { filename: String, data: String },
    /// 编辑消息
    EditMessage { message_id: i64, content: String },
    /// 删除消息
    DeleteMessage { message_id: i64 },
    /// 主动登出，网关会关闭连接
    Logout,
}

impl ClientEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            ClientEvent::GroupMessage { .. } => "group_message",
            ClientEvent::DirectMessage { .. } => "direct_message",
            ClientEvent::Typing { .. } => "typing",
            ClientEvent::AddReaction { .. } => "add_reaction",
            ClientEvent::RemoveReaction { .. } => "remove_reaction",
            ClientEvent::UpdateStatus { .. } => "update_status",
            ClientEvent::ShareFile { .. } => "share_file",
            ClientEvent::EditMessage { .. } => "edit_message",
            ClientEvent::DeleteMessage { .. } => "delete_message",
            ClientEvent::Logout => "logout",
        }
    }
}

/// 服务端推送给连接的事件。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// 连接建立后发给该连接的欢迎信息与在线名单
    Welcome {
        username: Username,
        online: Vec<Username>,
    },
    /// 某身份上线或下线
    PresenceChanged {
        username: Username,
        online: bool,
        online_count: usize,
    },
    /// 新的群聊消息
    Message {
        id: MessageId,
        sender: Username,
        content: String,
        timestamp: Timestamp,
        reactions: ReactionMap,
    },
    /// 新的私聊消息
    DirectMessage {
        id: MessageId,
        sender: Username,
        receiver: Username,
        content: String,
        timestamp: Timestamp,
    },
    /// 有人在群聊中提及了你
    Mention {
        from: Username,
        message_id: MessageId,
        excerpt: String,
    },
    Typing {
        username: Username,
        is_typing: bool,
    },
    ReactionUpdated {
        message_id: MessageId,
        reactions: ReactionMap,
    },
    StatusChanged {
        username: Username,
        status: StatusText,
    },
    /// 新的文件消息
    FileMessage {
        id: MessageId,
        sender: Username,
        reference: BlobRef,
        filename: String,
        timestamp: Timestamp,
    },
    MessageEdited {
        message_id: MessageId,
        content: String,
        edited_at: Timestamp,
    },
    MessageDeleted { message_id: MessageId },
    /// 操作被拒绝，只发给发起请求的连接
    Error { code: String, message: String },
}

impl ServerEvent {
    pub fn group_message(message: &Message) -> Self {
        ServerEvent::Message {
            id: message.id,
            sender: message.sender.clone(),
            content: message.content.clone(),
            timestamp: message.created_at,
            reactions: message.reactions.clone(),
        }
    }

    pub fn direct_message(message: &Message, receiver: Username) -> Self {
        ServerEvent::DirectMessage {
            id: message.id,
            sender: message.sender.clone(),
            receiver,
            content: message.content.clone(),
            timestamp: message.created_at,
        }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        ServerEvent::Error {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ServerEvent::Welcome { .. } => "welcome",
            ServerEvent::PresenceChanged { .. } => "presence_changed",
            ServerEvent::Message { .. } => "message",
            ServerEvent::DirectMessage { .. } => "direct_message",
            ServerEvent::Mention { .. } => "mention",
            ServerEvent::Typing { .. } => "typing",
            ServerEvent::ReactionUpdated { .. } => "reaction_updated",
            ServerEvent::StatusChanged { .. } => "status_changed",
            ServerEvent::FileMessage { .. } => "file_message",
            ServerEvent::MessageEdited { .. } => "message_edited",
            ServerEvent::MessageDeleted { .. } => "message_deleted",
            ServerEvent::Error { .. } => "error",
        }
    }
}
