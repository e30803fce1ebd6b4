use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{
    Message, MessageId, MessageRepository, MessageType, NewMessage, ReactionMap, RepositoryError,
    RepositoryResult, StatusText, User, UserRepository, Username,
};
use sqlx::{postgres::PgPoolOptions, types::Json, FromRow, PgPool};

fn map_sqlx_err(err: sqlx::Error) -> RepositoryError {
    RepositoryError::storage(err.to_string())
}

fn invalid_data(message: impl Into<String>) -> RepositoryError {
    RepositoryError::storage(message)
}

#[derive(Debug, FromRow)]
struct UserRecord {
    username: String,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRecord> for User {
    type Error = RepositoryError;

    fn try_from(value: UserRecord) -> Result<Self, Self::Error> {
        let username = Username::parse(value.username).map_err(|err| invalid_data(err.to_string()))?;
        let status = StatusText::parse(value.status).map_err(|err| invalid_data(err.to_string()))?;

        Ok(User {
            username,
            status,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct MessageRecord {
    id: i64,
    sender: String,
    receiver: Option<String>,
    content: String,
    message_type: String,
    created_at: DateTime<Utc>,
    edited_at: Option<DateTime<Utc>>,
    reactions: Json<ReactionMap>,
}

impl TryFrom<MessageRecord> for Message {
    type Error = RepositoryError;

    fn try_from(value: MessageRecord) -> Result<Self, Self::Error> {
        let sender = Username::parse(value.sender).map_err(|err| invalid_data(err.to_string()))?;
        let receiver = value
            .receiver
            .map(Username::parse)
            .transpose()
            .map_err(|err| invalid_data(err.to_string()))?;
        let message_type = MessageType::parse(&value.message_type).ok_or_else(|| {
            invalid_data(format!("unknown message type: {}", value.message_type))
        })?;

        Ok(Message {
            id: MessageId::new(value.id),
            sender,
            receiver,
            content: value.content,
            message_type,
            created_at: value.created_at,
            edited_at: value.edited_at,
            reactions: value.reactions.0,
        })
    }
}

const MESSAGE_COLUMNS: &str =
    "id, sender, receiver, content, message_type, created_at, edited_at, reactions";

#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn find_by_username(&self, username: &Username) -> RepositoryResult<Option<User>> {
        let record = sqlx::query_as::<_, UserRecord>(
            r#"
            SELECT username, status, created_at, updated_at
            FROM users
            WHERE username = $1
            "#,
        )
        .bind(username.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        record.map(User::try_from).transpose()
    }

    async fn create(&self, user: User) -> RepositoryResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(
            r#"
            INSERT INTO users (username, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (username) DO NOTHING
            RETURNING username, status, created_at, updated_at
            "#,
        )
        .bind(user.username.as_str())
        .bind(user.status.as_str())
        .bind(user.created_at)
        .bind(user.updated_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?
        .ok_or(RepositoryError::Conflict)?;

        User::try_from(record)
    }

    async fn update_status(
        &self,
        username: &Username,
        status: &StatusText,
    ) -> RepositoryResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET status = $2, updated_at = NOW()
            WHERE username = $1
            "#,
        )
        .bind(username.as_str())
        .bind(status.as_str())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct PgMessageRepository {
    pool: PgPool,
}

impl PgMessageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageRepository for PgMessageRepository {
    async fn create(&self, message: NewMessage) -> RepositoryResult<Message> {
        // id 由 BIGSERIAL 分配，并发插入互不重复
        let query = format!(
            r#"
            INSERT INTO messages (sender, receiver, content, message_type, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {MESSAGE_COLUMNS}
            "#
        );
        let record = sqlx::query_as::<_, MessageRecord>(&query)
            .bind(message.sender.as_str())
            .bind(message.receiver.as_ref().map(Username::as_str))
            .bind(&message.content)
            .bind(message.message_type.as_str())
            .bind(message.created_at)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        Message::try_from(record)
    }

    async fn find_by_id(&self, id: MessageId) -> RepositoryResult<Option<Message>> {
        let query = format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1");
        let record = sqlx::query_as::<_, MessageRecord>(&query)
            .bind(id.value())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        record.map(Message::try_from).transpose()
    }

    async fn update(&self, message: &Message) -> RepositoryResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE messages
            SET content = $2, edited_at = $3, reactions = $4
            WHERE id = $1
            "#,
        )
        .bind(message.id.value())
        .bind(&message.content)
        .bind(message.edited_at)
        .bind(Json(&message.reactions))
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn delete(&self, id: MessageId) -> RepositoryResult<()> {
        let result = sqlx::query("DELETE FROM messages WHERE id = $1")
            .bind(id.value())
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

pub struct PgStorage {
    pub pool: PgPool,
    pub user_repository: Arc<PgUserRepository>,
    pub message_repository: Arc<PgMessageRepository>,
}

impl PgStorage {
    pub fn new(pool: PgPool) -> Self {
        Self {
            user_repository: Arc::new(PgUserRepository::new(pool.clone())),
            message_repository: Arc::new(PgMessageRepository::new(pool.clone())),
            pool,
        }
    }
}

pub async fn create_pg_pool(
    database_url: &str,
    max_connections: u32,
) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}
