//! 统一配置中心
//!
//! 提供应用的全局配置管理，包括：
//! - 服务监听地址
//! - JWT认证
//! - 存储后端
//! - 聊天业务参数
//!
//! 加载顺序：默认值 → `APP_CONFIG_FILE` 指向的文件 → `APP_` 前缀的环境变量（嵌套键用 `__` 分隔）。

use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// 全局应用配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AppConfig {
    #[validate(nested)]
    pub server: ServerConfig,
    #[validate(nested)]
    pub jwt: JwtConfig,
    #[validate(nested)]
    pub storage: StorageConfig,
    #[serde(default)]
    #[validate(nested)]
    pub chat: ChatConfig,
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ServerConfig {
    #[validate(length(min = 1))]
    pub host: String,
    #[validate(range(min = 1))]
    pub port: u16,
}

/// JWT配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct JwtConfig {
    /// 至少 256 位
    #[validate(length(min = 32))]
    pub secret: String,
    #[validate(range(min = 1))]
    pub expiration_hours: i64,
}

/// 存储后端
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Postgres,
}

/// 存储配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_storage"))]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    #[serde(default)]
    pub database_url: Option<String>,
    #[validate(range(min = 1))]
    pub max_connections: u32,
    /// 上传文件的存放目录
    #[validate(length(min = 1))]
    pub upload_dir: String,
}

fn validate_storage(storage: &StorageConfig) -> Result<(), ValidationError> {
    if storage.backend == StorageBackend::Postgres
        && storage.database_url.as_deref().map_or(true, str::is_empty)
    {
        return Err(ValidationError::new("database_url_required"));
    }
    Ok(())
}

/// 聊天业务参数
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ChatConfig {
    #[validate(range(min = 1))]
    pub max_message_length: usize,
    #[validate(range(min = 1))]
    pub mention_excerpt_chars: usize,
    #[validate(range(min = 1))]
    pub max_upload_bytes: usize,
    /// 内存后端启动时预先注册的用户
    #[serde(default)]
    pub seed_users: Vec<String>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_message_length: 4000,
            mention_excerpt_chars: 80,
            max_upload_bytes: 10 * 1024 * 1024,
            seed_users: vec!["test_user".into()],
        }
    }
}

impl Default for AppConfig {
    /// 开发环境默认值；JWT 密钥必须通过文件或环境变量覆盖
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".into(),
                port: 8080,
            },
            jwt: JwtConfig {
                secret: String::new(),
                expiration_hours: 24,
            },
            storage: StorageConfig {
                backend: StorageBackend::Memory,
                database_url: None,
                max_connections: 5,
                upload_dir: "uploads".into(),
            },
            chat: ChatConfig::default(),
        }
    }
}

impl AppConfig {
    /// 按 默认值 → 可选文件 → 环境变量 的顺序加载并校验
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::new().merge(Serialized::defaults(AppConfig::default()));
        if let Ok(path) = std::env::var("APP_CONFIG_FILE") {
            figment = if path.ends_with(".yml") || path.ends_with(".yaml") {
                figment.merge(Yaml::file(path))
            } else if path.ends_with(".json") {
                figment.merge(Json::file(path))
            } else {
                figment.merge(Toml::file(path))
            };
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        Self::from_figment(figment)
    }

    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: AppConfig = figment.extract().map_err(Box::new)?;
        config.check()?;
        Ok(config)
    }

    /// 验证配置有效性
    pub fn check(&self) -> Result<(), ConfigError> {
        self.validate()?;

        // 拒绝明显的开发密钥
        if self.jwt.secret.contains("dev-secret")
            || self.jwt.secret.contains("not-for-production")
            || self.jwt.secret.contains("please-change")
        {
            return Err(ConfigError::InvalidJwtSecret(
                "Cannot use development JWT secret in production".to_string(),
            ));
        }
        Ok(())
    }

    /// 脱敏后的配置描述，用于日志
    pub fn sanitize(&self) -> String {
        let database = match &self.storage.database_url {
            Some(url) => match url.split_once('@') {
                Some((_, host)) => format!("postgres://[REDACTED]@{host}"),
                None => "[REDACTED]".to_string(),
            },
            None => "-".to_string(),
        };
        format!(
            "server={}:{} storage={:?} database={} upload_dir={} seed_users={}",
            self.server.host,
            self.server.port,
            self.storage.backend,
            database,
            self.storage.upload_dir,
            self.chat.seed_users.len()
        )
    }
}

/// 配置错误类型
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),
    #[error("invalid configuration: {0}")]
    Invalid(#[from] validator::ValidationErrors),
    #[error("Invalid JWT secret: {0}")]
    InvalidJwtSecret(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    const SECRET: &str = "production-grade-secret-key-with-sufficient-length";

    #[test]
    fn test_defaults_with_secret_from_env() {
        Jail::expect_with(|jail| {
            jail.set_env("APP_JWT__SECRET", SECRET);

            let config = AppConfig::load().expect("config");
            assert_eq!(config.server.port, 8080);
            assert_eq!(config.storage.backend, StorageBackend::Memory);
            assert_eq!(config.chat.max_message_length, 4000);
            assert_eq!(config.chat.seed_users, vec!["test_user".to_string()]);
            Ok(())
        });
    }

    #[test]
    fn test_missing_secret_fails_validation() {
        Jail::expect_with(|_jail| {
            let result = AppConfig::load();
            assert!(matches!(result, Err(ConfigError::Invalid(_))));
            Ok(())
        });
    }

    #[test]
    fn test_development_secret_is_rejected() {
        Jail::expect_with(|jail| {
            jail.set_env(
                "APP_JWT__SECRET",
                "dev-secret-key-not-for-production-use-minimum-32-chars",
            );

            let result = AppConfig::load();
            assert!(result
                .unwrap_err()
                .to_string()
                .contains("development JWT secret"));
            Ok(())
        });
    }

    #[test]
    fn test_file_then_env_precedence() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "app.toml",
                &format!(
                    r#"
                    [server]
                    host = "0.0.0.0"
                    port = 9000

                    [jwt]
                    secret = "{SECRET}"
                    expiration_hours = 2

                    [chat]
                    max_message_length = 500
                    mention_excerpt_chars = 40
                    max_upload_bytes = 1024
                    seed_users = ["alice", "bob"]
                    "#
                ),
            )?;
            jail.set_env("APP_CONFIG_FILE", "app.toml");
            jail.set_env("APP_SERVER__PORT", "9100");

            let config = AppConfig::load().expect("config");
            assert_eq!(config.server.host, "0.0.0.0");
            assert_eq!(config.server.port, 9100);
            assert_eq!(config.jwt.expiration_hours, 2);
            assert_eq!(config.chat.max_upload_bytes, 1024);
            assert_eq!(config.chat.seed_users.len(), 2);
            Ok(())
        });
    }

    #[test]
    fn test_postgres_backend_requires_database_url() {
        Jail::expect_with(|jail| {
            jail.set_env("APP_JWT__SECRET", SECRET);
            jail.set_env("APP_STORAGE__BACKEND", "postgres");
            assert!(matches!(AppConfig::load(), Err(ConfigError::Invalid(_))));

            jail.set_env(
                "APP_STORAGE__DATABASE_URL",
                "postgres://chat:secret@db:5432/chatroom",
            );
            let config = AppConfig::load().expect("config");
            assert_eq!(config.storage.backend, StorageBackend::Postgres);
            assert!(!config.sanitize().contains("secret"));
            Ok(())
        });
    }
}
