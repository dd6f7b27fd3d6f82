//! 快照存储协议
//!
use crate::error::DomainResult as Result;
use crate::snapshot::Snapshot;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// 修订号最高的快照；`at_or_below` 给定时只考虑不超过该修订号的快照
    async fn latest(&self, id: &str, at_or_below: Option<usize>) -> Result<Option<Snapshot>>;

    /// 每个标识的最新快照；没有快照的标识不出现在结果中
    async fn latest_multi(&self, ids: &[String]) -> Result<HashMap<String, Snapshot>>;

    /// 批量写入（空批次立即成功）
    async fn insert(&self, snapshots: &[Snapshot]) -> Result<()>;
}

#[async_trait]
impl<T> SnapshotStore for Arc<T>
where
    T: SnapshotStore + ?Sized,
{
    async fn latest(&self, id: &str, at_or_below: Option<usize>) -> Result<Option<Snapshot>> {
        (**self).latest(id, at_or_below).await
    }

    async fn latest_multi(&self, ids: &[String]) -> Result<HashMap<String, Snapshot>> {
        (**self).latest_multi(ids).await
    }

    async fn insert(&self, snapshots: &[Snapshot]) -> Result<()> {
        (**self).insert(snapshots).await
    }
}
