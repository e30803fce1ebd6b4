//! 表情回应集合
//!
//! 每个表情对应一个身份集合，合并操作是按表情键的幂等集合并。

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::value_objects::Username;

/// 表情标签到回应者集合的映射。
///
/// 集合为空的表情键会被移除，序列化后只包含至少有一位回应者的表情。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReactionMap(BTreeMap<String, BTreeSet<Username>>);

impl ReactionMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// 加入回应者，返回映射是否发生变化。
    pub fn add(&mut self, emoji: &str, username: &Username) -> bool {
        self.0
            .entry(emoji.to_owned())
            .or_default()
            .insert(username.clone())
    }

    /// 移除回应者，返回映射是否发生变化。
    pub fn remove(&mut self, emoji: &str, username: &Username) -> bool {
        let Some(users) = self.0.get_mut(emoji) else {
            return false;
        };
        let removed = users.remove(username);
        if users.is_empty() {
            self.0.remove(emoji);
        }
        removed
    }

    pub fn users(&self, emoji: &str) -> Option<&BTreeSet<Username>> {
        self.0.get(emoji).filter(|users| !users.is_empty())
    }

    pub fn count(&self, emoji: &str) -> usize {
        self.users(emoji).map_or(0, BTreeSet::len)
    }

    pub fn contains(&self, emoji: &str, username: &Username) -> bool {
        self.users(emoji)
            .is_some_and(|users| users.contains(username))
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(BTreeSet::is_empty)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &BTreeSet<Username>)> {
        self.0.iter().filter(|(_, users)| !users.is_empty())
    }
}
