use serde::{Deserialize, Serialize};

use crate::value_objects::{StatusText, Timestamp, Username};

/// 身份存储中的用户记录。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub username: Username,
    pub status: StatusText,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl User {
    pub fn register(username: Username, now: Timestamp) -> Self {
        Self {
            username,
            status: StatusText::default(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn set_status(&mut self, status: StatusText, now: Timestamp) {
        self.status = status;
        self.updated_at = now;
    }
}
