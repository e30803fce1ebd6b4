use domain::{DomainError, RepositoryError};
use thiserror::Error;

/// 单个入站事件处理失败的原因。
///
/// 错误只影响当前事件，不会波及在线状态或其他连接。
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error("connection is not authenticated")]
    Unauthenticated,
    #[error("not found: {0}")]
    NotFound(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
}

impl ApplicationError {
    pub fn not_found(what: impl Into<String>) -> Self {
        ApplicationError::NotFound(what.into())
    }

    pub fn validation(reason: impl Into<String>) -> Self {
        ApplicationError::Validation(reason.into())
    }

    /// 回报给客户端的稳定错误码
    pub fn code(&self) -> &'static str {
        match self {
            ApplicationError::Unauthenticated => "UNAUTHENTICATED",
            ApplicationError::NotFound(_) => "NOT_FOUND",
            ApplicationError::Forbidden(_) => "FORBIDDEN",
            ApplicationError::Validation(_) => "VALIDATION_ERROR",
            ApplicationError::StoreUnavailable(_) => "STORE_UNAVAILABLE",
        }
    }

    /// 只有存储故障值得客户端重试，引擎自身不做隐式重试
    pub fn retryable(&self) -> bool {
        matches!(self, ApplicationError::StoreUnavailable(_))
    }
}

impl From<DomainError> for ApplicationError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::InvalidArgument { field, reason } => {
                ApplicationError::Validation(format!("{field}: {reason}"))
            }
            DomainError::OperationNotAllowed { action } => ApplicationError::Forbidden(action),
        }
    }
}

impl From<RepositoryError> for ApplicationError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::NotFound => ApplicationError::NotFound("record".to_owned()),
            RepositoryError::Conflict => {
                ApplicationError::Validation("record already exists".to_owned())
            }
            RepositoryError::Storage { message } => ApplicationError::StoreUnavailable(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_failures_are_retryable() {
        let err = ApplicationError::from(RepositoryError::storage("connection reset"));
        assert_eq!(err.code(), "STORE_UNAVAILABLE");
        assert!(err.retryable());
    }

    #[test]
    fn domain_errors_map_to_client_codes() {
        let forbidden = ApplicationError::from(DomainError::operation_not_allowed("edit"));
        assert_eq!(forbidden.code(), "FORBIDDEN");
        assert!(!forbidden.retryable());

        let invalid = ApplicationError::from(DomainError::invalid_argument("emoji", "empty"));
        assert_eq!(invalid, ApplicationError::Validation("emoji: empty".into()));
    }
}
