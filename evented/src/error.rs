//! 运行时统一错误定义
//!
//! 覆盖配置、校验、命令分发、序列化与后端持久化等最小必要集合。
//! 后端错误对仓储而言是不透明的：原样向调用方传播，不做解释、重试或吞掉。
//!
use thiserror::Error;

/// 统一错误类型
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum DomainError {
    // --- 配置 ---
    #[error("configuration error: {reason}")]
    Configuration { reason: String },

    // --- 校验 ---
    #[error("entity has no identity")]
    MissingIdentity,
    #[error("validation error: {reason}")]
    Validation { reason: String },

    // --- 命令/序列化 ---
    #[error("unknown command: aggregate={aggregate_type}, command={command}")]
    UnknownCommand {
        aggregate_type: String,
        command: String,
    },
    #[error("serialization error: {source}")]
    Serde {
        #[from]
        source: serde_json::Error,
    },

    // --- 后端/持久化 ---
    #[error("event log error: {reason}")]
    EventLog { reason: String },
    #[error("snapshot store error: {reason}")]
    SnapshotStore { reason: String },
    #[error("database error: {reason}")]
    Database { reason: String },
    #[error("partial commit: events of {ids:?} are durable but snapshot insert failed: {reason}")]
    PartialCommit { ids: Vec<String>, reason: String },

    // --- 提交队列/通知 ---
    #[error("commit queue full: id={id}, limit={limit}")]
    CommitQueueFull { id: String, limit: usize },
    #[error("notice stream error: {reason}")]
    NoticeStream { reason: String },
}

impl DomainError {
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }

    pub fn event_log(reason: impl Into<String>) -> Self {
        Self::EventLog {
            reason: reason.into(),
        }
    }

    pub fn snapshot_store(reason: impl Into<String>) -> Self {
        Self::SnapshotStore {
            reason: reason.into(),
        }
    }

    /// 是否为后端（事件日志/快照存储/数据库）错误
    pub fn is_backend(&self) -> bool {
        matches!(
            self,
            Self::EventLog { .. }
                | Self::SnapshotStore { .. }
                | Self::Database { .. }
                | Self::PartialCommit { .. }
        )
    }
}

/// 统一 Result 类型别名
pub type DomainResult<T> = Result<T, DomainError>;

#[cfg(feature = "infra-sqlx")]
impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        DomainError::Database {
            reason: err.to_string(),
        }
    }
}
