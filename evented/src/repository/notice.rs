//! 仓储通知
//!
//! 基于 `tokio::sync::broadcast` 的轻量广播：加载、提交与后端错误。
//! 无订阅者时发送会被忽略；订阅流对落后的订阅者返回 `NoticeStream` 错误。
//!
use crate::error::{DomainError, DomainResult as Result};
use futures_core::stream::BoxStream;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

/// 仓储发出的通知
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RepositoryNotice {
    /// 从后端重建了一个实体（缓存命中不发出）
    Loaded { id: String, revision: usize },
    /// 一个实体提交成功
    Committed {
        id: String,
        revision: usize,
        snapshotted: bool,
    },
    /// 后端失败（含索引创建失败）
    BackendError { reason: String },
}

/// 通知发送端，可廉价克隆并在仓储与后端适配器之间共享
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: broadcast::Sender<RepositoryNotice>,
}

impl Notifier {
    /// `capacity` 为广播缓冲区容量（至少为 1）
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, notice: RepositoryNotice) {
        // 无订阅者时 send 返回错误，视为非致命
        let _ = self.tx.send(notice);
    }

    pub fn backend_error(&self, reason: impl Into<String>) {
        self.publish(RepositoryNotice::BackendError {
            reason: reason.into(),
        });
    }

    pub fn subscribe(&self) -> BoxStream<'static, Result<RepositoryNotice>> {
        let rx = self.tx.subscribe();
        let stream = BroadcastStream::new(rx).map(|r| {
            r.map_err(|e| DomainError::NoticeStream {
                reason: e.to_string(),
            })
        });
        Box::pin(stream)
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_published_notices() {
        let notifier = Notifier::new(8);
        notifier.publish(RepositoryNotice::BackendError {
            reason: "nobody listens".into(),
        });

        let mut stream = notifier.subscribe();
        assert_eq!(notifier.subscriber_count(), 1);
        notifier.publish(RepositoryNotice::Loaded {
            id: "x".into(),
            revision: 1,
        });
        notifier.backend_error("index failed");

        assert_eq!(
            stream.next().await.unwrap().unwrap(),
            RepositoryNotice::Loaded {
                id: "x".into(),
                revision: 1
            }
        );
        assert_eq!(
            stream.next().await.unwrap().unwrap(),
            RepositoryNotice::BackendError {
                reason: "index failed".into()
            }
        );
    }

    #[tokio::test]
    async fn lagging_subscriber_sees_stream_error() {
        let notifier = Notifier::new(1);
        let mut stream = notifier.subscribe();
        notifier.backend_error("a");
        notifier.backend_error("b");

        assert!(matches!(
            stream.next().await.unwrap(),
            Err(DomainError::NoticeStream { .. })
        ));
        assert_eq!(
            stream.next().await.unwrap().unwrap(),
            RepositoryNotice::BackendError { reason: "b".into() }
        );
    }
}
