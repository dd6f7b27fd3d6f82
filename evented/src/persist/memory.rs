//! 内存参考实现
//!
//! 以 `tokio::sync::RwLock` 保护的内存结构实现 `EventLog` 与 `SnapshotStore`，
//! 写锁保证并发 `find` 不会观察到部分追加。典型用途：测试、示例与本地开发。
//!
use crate::error::DomainResult as Result;
use crate::event::Event;
use crate::persist::{EventFilter, EventLog, SnapshotStore};
use crate::snapshot::Snapshot;
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use tokio::sync::RwLock;

/// 内存事件日志
#[derive(Debug, Default)]
pub struct MemoryEventLog {
    events: RwLock<Vec<Event>>,
}

impl MemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// 已追加的全部事件（按追加顺序）
    pub async fn events(&self) -> Vec<Event> {
        self.events.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.events.read().await.is_empty()
    }
}

#[async_trait]
impl EventLog for MemoryEventLog {
    async fn append(&self, events: &[Event]) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }
        self.events.write().await.extend_from_slice(events);
        Ok(())
    }

    async fn find(&self, filter: &EventFilter) -> Result<Vec<Event>> {
        let mut found: Vec<Event> = self
            .events
            .read()
            .await
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        found.sort_by_key(Event::revision);
        Ok(found)
    }

    async fn distinct_ids(&self) -> Result<Vec<String>> {
        let ids: BTreeSet<String> = self
            .events
            .read()
            .await
            .iter()
            .map(|e| e.aggregate_id().to_string())
            .collect();
        Ok(ids.into_iter().collect())
    }
}

/// 内存快照存储：每个标识的快照按修订号升序保存
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    snapshots: RwLock<HashMap<String, Vec<Snapshot>>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 某标识的全部快照（修订号升序）
    pub async fn snapshots_of(&self, id: &str) -> Vec<Snapshot> {
        self.snapshots
            .read()
            .await
            .get(id)
            .cloned()
            .unwrap_or_default()
    }

    /// 全部快照数量
    pub async fn len(&self) -> usize {
        self.snapshots.read().await.values().map(Vec::len).sum()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn latest(&self, id: &str, at_or_below: Option<usize>) -> Result<Option<Snapshot>> {
        let guard = self.snapshots.read().await;
        let latest = guard.get(id).and_then(|snaps| {
            snaps
                .iter()
                .rev()
                .find(|s| at_or_below.is_none_or(|max| s.revision() <= max))
                .cloned()
        });
        Ok(latest)
    }

    async fn latest_multi(&self, ids: &[String]) -> Result<HashMap<String, Snapshot>> {
        let guard = self.snapshots.read().await;
        let latest = ids
            .iter()
            .filter_map(|id| {
                guard
                    .get(id)
                    .and_then(|snaps| snaps.last())
                    .map(|s| (id.clone(), s.clone()))
            })
            .collect();
        Ok(latest)
    }

    async fn insert(&self, snapshots: &[Snapshot]) -> Result<()> {
        if snapshots.is_empty() {
            return Ok(());
        }

        let mut guard = self.snapshots.write().await;
        for snapshot in snapshots {
            let snaps = guard.entry(snapshot.id().to_string()).or_default();
            let at = snaps.partition_point(|s| s.revision() <= snapshot.revision());
            snaps.insert(at, snapshot.clone());
        }
        Ok(())
    }
}
