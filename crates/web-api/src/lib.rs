//! Web API 层。
//!
//! 连接网关：HTTP 与 WebSocket 入口，认证身份后把入站事件交给调度引擎，
//! 并把出站事件写回各自的连接。

mod auth;
mod error;
mod routes;
mod state;
mod ws_connection;

pub use auth::{bearer_token, Claims, JwtService};
pub use config::JwtConfig;
pub use error::{ApiError, ErrorBody};
pub use routes::{router, OnlineUsersResponse};
pub use state::AppState;
