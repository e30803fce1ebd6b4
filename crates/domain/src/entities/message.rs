//! 消息实体定义
//!
//! 群聊消息没有接收者；私聊消息带接收者。文件消息的正文是文件存储引用。

use serde::{Deserialize, Serialize};

use crate::entities::reaction::ReactionMap;
use crate::errors::DomainError;
use crate::value_objects::{MessageContent, MessageId, Timestamp, Username};

/// 消息类型
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    #[default]
    Text,
    File,
}

impl MessageType {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageType::Text => "text",
            MessageType::File => "file",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "text" => Some(MessageType::Text),
            "file" => Some(MessageType::File),
            _ => None,
        }
    }
}

/// 尚未持久化的消息，ID 由消息存储分配。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub sender: Username,
    pub receiver: Option<Username>,
    pub content: String,
    pub message_type: MessageType,
    pub created_at: Timestamp,
}

impl NewMessage {
    pub fn group(sender: Username, content: MessageContent, at: Timestamp) -> Self {
        Self {
            sender,
            receiver: None,
            content: content.into_inner(),
            message_type: MessageType::Text,
            created_at: at,
        }
    }

    pub fn direct(
        sender: Username,
        receiver: Username,
        content: MessageContent,
        at: Timestamp,
    ) -> Self {
        Self {
            sender,
            receiver: Some(receiver),
            content: content.into_inner(),
            message_type: MessageType::Text,
            created_at: at,
        }
    }

    pub fn file(sender: Username, reference: impl Into<String>, at: Timestamp) -> Self {
        Self {
            sender,
            receiver: None,
            content: reference.into(),
            message_type: MessageType::File,
            created_at: at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub sender: Username,
    pub receiver: Option<Username>,
    pub content: String,
    pub message_type: MessageType,
    pub created_at: Timestamp,
    pub edited_at: Option<Timestamp>,
    pub reactions: ReactionMap,
}

impl Message {
    pub fn from_new(id: MessageId, new: NewMessage) -> Self {
        Self {
            id,
            sender: new.sender,
            receiver: new.receiver,
            content: new.content,
            message_type: new.message_type,
            created_at: new.created_at,
            edited_at: None,
            reactions: ReactionMap::new(),
        }
    }

    pub fn is_file(&self) -> bool {
        self.message_type == MessageType::File
    }

    pub fn is_direct(&self) -> bool {
        self.receiver.is_some()
    }

    pub fn is_owned_by(&self, username: &Username) -> bool {
        &self.sender == username
    }

    /// 只有发送者可以修改或删除消息。
    pub fn ensure_owned_by(&self, username: &Username, action: &str) -> Result<(), DomainError> {
        if self.is_owned_by(username) {
            Ok(())
        } else {
            Err(DomainError::operation_not_allowed(format!(
                "{action} message {} owned by another user",
                self.id
            )))
        }
    }

    pub fn edit(&mut self, content: MessageContent, at: Timestamp) -> Result<(), DomainError> {
        if self.is_file() {
            return Err(DomainError::invalid_argument(
                "message_id",
                "file messages cannot be edited",
            ));
        }
        self.content = content.into_inner();
        self.edited_at = Some(at);
        Ok(())
    }

    /// 私聊消息的参与者；群聊消息返回空。
    pub fn participants(&self) -> Vec<Username> {
        match &self.receiver {
            Some(receiver) if receiver != &self.sender => {
                vec![self.sender.clone(), receiver.clone()]
            }
            Some(_) => vec![self.sender.clone()],
            None => Vec::new(),
        }
    }
}
