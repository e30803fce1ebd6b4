//! 业务规则验证
//!
//! 提及解析、上传文件名净化、表情标签校验等与存储无关的纯规则。

use crate::errors::{DomainError, DomainResult};

const MAX_EMOJI_LEN: usize = 32;
const MAX_FILENAME_LEN: usize = 128;

/// 提及规则
pub struct MentionRules;

impl MentionRules {
    /// 按空白切分正文，以 `@` 开头的词去掉首字符后作为候选身份。
    ///
    /// 结果按首次出现的顺序去重；候选是否存在、是否在线由调用方决定。
    pub fn extract(text: &str) -> Vec<String> {
        let mut mentions: Vec<String> = Vec::new();
        for token in text.split_whitespace() {
            let Some(name) = token.strip_prefix('@') else {
                continue;
            };
            if name.is_empty() || mentions.iter().any(|seen| seen == name) {
                continue;
            }
            mentions.push(name.to_owned());
        }
        mentions
    }

    /// 提及通知里携带的正文摘要，超出部分以省略号结尾。
    pub fn excerpt(text: &str, max_chars: usize) -> String {
        if text.chars().count() <= max_chars {
            return text.to_owned();
        }
        let mut excerpt: String = text.chars().take(max_chars).collect();
        excerpt.push('…');
        excerpt
    }
}

/// 上传文件名规则
pub struct FileNameRules;

impl FileNameRules {
    /// 净化客户端声明的原始文件名。
    ///
    /// 路径分隔符与空白折叠为 `_`，只保留 ASCII 字母数字与 `.`、`-`、`_`，
    /// 去掉首尾的 `.` 与 `_`。结果为空时返回 `None`。
    pub fn sanitize(name: &str) -> Option<String> {
        let spaced: String = name
            .chars()
            .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
            .collect();
        let joined = spaced.split_whitespace().collect::<Vec<_>>().join("_");
        let kept: String = joined
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
            .collect();
        let trimmed = kept.trim_matches(|c| c == '.' || c == '_');
        if trimmed.is_empty() {
            return None;
        }
        let bounded: String = trimmed.chars().rev().take(MAX_FILENAME_LEN).collect();
        Some(bounded.chars().rev().collect())
    }
}

/// 表情回应规则
pub struct ReactionRules;

impl ReactionRules {
    pub fn parse_emoji(label: &str) -> DomainResult<String> {
        let label = label.trim();
        if label.is_empty() {
            return Err(DomainError::invalid_argument("emoji", "cannot be empty"));
        }
        if label.chars().count() > MAX_EMOJI_LEN {
            return Err(DomainError::invalid_argument("emoji", "too long"));
        }
        if label.chars().any(char::is_whitespace) {
            return Err(DomainError::invalid_argument(
                "emoji",
                "cannot contain whitespace",
            ));
        }
        Ok(label.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mentions_are_extracted_in_order() {
        assert_eq!(
            MentionRules::extract("hello @alice and @bob"),
            vec!["alice".to_string(), "bob".to_string()]
        );
        assert!(MentionRules::extract("no mentions here").is_empty());
    }

    #[test]
    fn repeated_and_bare_mentions_are_ignored() {
        assert_eq!(
            MentionRules::extract("@alice @alice @ mail@example.com"),
            vec!["alice".to_string()]
        );
    }

    #[test]
    fn excerpt_truncates_on_char_boundary() {
        assert_eq!(MentionRules::excerpt("short", 10), "short");
        assert_eq!(MentionRules::excerpt("héllo wörld", 5), "héllo…");
    }

    #[test]
    fn filenames_are_sanitized() {
        assert_eq!(
            FileNameRules::sanitize("My cool movie.mov").as_deref(),
            Some("My_cool_movie.mov")
        );
        assert_eq!(
            FileNameRules::sanitize("../../../etc/passwd").as_deref(),
            Some("etc_passwd")
        );
        assert_eq!(
            FileNameRules::sanitize("rapport été.pdf").as_deref(),
            Some("rapport_t.pdf")
        );
        assert_eq!(FileNameRules::sanitize("..."), None);
        assert_eq!(FileNameRules::sanitize("   "), None);
    }

    #[test]
    fn long_filenames_keep_their_extension() {
        let name = format!("{}.png", "a".repeat(300));
        let sanitized = FileNameRules::sanitize(&name).unwrap();
        assert_eq!(sanitized.len(), 128);
        assert!(sanitized.ends_with(".png"));
    }

    #[test]
    fn emoji_labels_are_validated() {
        assert_eq!(ReactionRules::parse_emoji(" 👍 ").unwrap(), "👍");
        assert!(ReactionRules::parse_emoji("").is_err());
        assert!(ReactionRules::parse_emoji("thumbs up").is_err());
    }
}
