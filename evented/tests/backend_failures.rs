use anyhow::Result as AnyResult;
use async_trait::async_trait;
use evented::aggregate::Effects;
use evented::config::{CommitOptions, GetOptions, RepositoryConfig};
use evented::emitter::Emission;
use evented::error::{DomainError, DomainResult};
use evented::event::Event;
use evented::persist::memory::{MemoryEventLog, MemorySnapshotStore};
use evented::persist::{EventFilter, EventLog, SnapshotStore};
use evented::repository::{Repository, RepositoryNotice};
use evented::snapshot::Snapshot;
use evented_macros::aggregate;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Auction {
    bids: Vec<u64>,
    closed: bool,
}

#[aggregate(name = "auction")]
impl Auction {
    #[command]
    fn bid(&mut self, amount: u64, _fx: &mut Effects<'_>) {
        self.bids.push(amount);
    }

    #[command]
    fn close(&mut self, _: (), fx: &mut Effects<'_>) {
        self.closed = true;
        fx.enqueue("closed", self.bids.iter().max().copied());
    }
}

/// 可切换为失败的事件日志
#[derive(Default)]
struct FlakyEventLog {
    inner: MemoryEventLog,
    fail_append: AtomicBool,
    fail_find: AtomicBool,
}

#[async_trait]
impl EventLog for FlakyEventLog {
    async fn append(&self, events: &[Event]) -> DomainResult<()> {
        if self.fail_append.load(Ordering::SeqCst) {
            return Err(DomainError::event_log("connection reset"));
        }
        self.inner.append(events).await
    }

    async fn find(&self, filter: &EventFilter) -> DomainResult<Vec<Event>> {
        if self.fail_find.load(Ordering::SeqCst) {
            return Err(DomainError::event_log("query timed out"));
        }
        self.inner.find(filter).await
    }

    async fn distinct_ids(&self) -> DomainResult<Vec<String>> {
        self.inner.distinct_ids().await
    }
}

/// 可切换为失败的快照存储，并统计写入次数
#[derive(Default)]
struct FlakySnapshotStore {
    inner: MemorySnapshotStore,
    fail_insert: AtomicBool,
    inserts: AtomicUsize,
}

#[async_trait]
impl SnapshotStore for FlakySnapshotStore {
    async fn latest(&self, id: &str, at_or_below: Option<usize>) -> DomainResult<Option<Snapshot>> {
        self.inner.latest(id, at_or_below).await
    }

    async fn latest_multi(&self, ids: &[String]) -> DomainResult<HashMap<String, Snapshot>> {
        self.inner.latest_multi(ids).await
    }

    async fn insert(&self, snapshots: &[Snapshot]) -> DomainResult<()> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        if self.fail_insert.load(Ordering::SeqCst) {
            return Err(DomainError::snapshot_store("disk full"));
        }
        self.inner.insert(snapshots).await
    }
}

struct Fixture {
    repo: Repository<Auction>,
    log: Arc<FlakyEventLog>,
    snapshots: Arc<FlakySnapshotStore>,
}

fn fixture() -> AnyResult<Fixture> {
    let log = Arc::new(FlakyEventLog::default());
    let snapshots = Arc::new(FlakySnapshotStore::default());
    let repo = Repository::new(
        log.clone(),
        snapshots.clone(),
        RepositoryConfig::builder().cache_enabled(false).build(),
    )?;
    Ok(Fixture {
        repo,
        log,
        snapshots,
    })
}

#[tokio::test]
async fn failed_append_aborts_before_compaction() -> AnyResult<()> {
    let f = fixture()?;
    let mut notices = f.repo.subscribe();
    let fired = Arc::new(AtomicUsize::new(0));
    let counter = fired.clone();

    let mut auction = f.repo.create("lot-1");
    auction.on("closed", move |_: &Emission| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    auction.record("bid", 10)?.record("close", ())?;

    f.log.fail_append.store(true, Ordering::SeqCst);
    let err = f
        .repo
        .commit(&mut auction, CommitOptions::force_snapshot())
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::EventLog { .. }));

    assert_eq!(auction.pending_events().len(), 2);
    assert_eq!(auction.version(), 0);
    assert!(!auction.is_committing());
    assert_eq!(auction.deferred_emissions().len(), 1);
    assert_eq!(fired.load(Ordering::SeqCst), 0);
    assert_eq!(f.snapshots.inserts.load(Ordering::SeqCst), 0);
    assert!(matches!(
        notices.next().await.unwrap()?,
        RepositoryNotice::BackendError { .. }
    ));

    // 后端恢复后重试，事件与延迟通知都不会丢失
    f.log.fail_append.store(false, Ordering::SeqCst);
    let receipt = f
        .repo
        .commit(&mut auction, CommitOptions::force_snapshot())
        .await?;
    assert_eq!(receipt.appended, 2);
    assert!(receipt.snapshotted);
    assert_eq!(auction.version(), 2);
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn failed_snapshot_insert_after_append_is_a_partial_commit() -> AnyResult<()> {
    let f = fixture()?;
    let mut auction = f.repo.create("lot-1");
    auction.record("bid", 10)?.record("bid", 20)?;

    f.snapshots.fail_insert.store(true, Ordering::SeqCst);
    let err = f
        .repo
        .commit(&mut auction, CommitOptions::force_snapshot())
        .await
        .unwrap_err();
    match err {
        DomainError::PartialCommit { ids, reason } => {
            assert_eq!(ids, vec!["lot-1".to_string()]);
            assert!(reason.contains("disk full"));
        }
        other => panic!("unexpected {other:?}"),
    }

    // 事件已持久，快照基线回退
    assert_eq!(f.log.inner.len().await, 2);
    assert!(auction.pending_events().is_empty());
    assert_eq!(auction.version(), 0);
    assert_eq!(auction.revision(), 2);

    let loaded = f.repo.get("lot-1").await?.expect("lot-1 exists");
    assert_eq!(loaded.state().bids, vec![10, 20]);
    assert_eq!(loaded.version(), 0);
    Ok(())
}

#[tokio::test]
async fn failed_snapshot_insert_without_events_is_reported_as_is() -> AnyResult<()> {
    let f = fixture()?;
    let mut auction = f.repo.create("lot-1");
    auction.record("bid", 10)?;
    f.repo.commit(&mut auction, CommitOptions::default()).await?;

    f.snapshots.fail_insert.store(true, Ordering::SeqCst);
    let err = f
        .repo
        .commit(&mut auction, CommitOptions::force_snapshot())
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::SnapshotStore { .. }));
    assert_eq!(auction.version(), 0);
    Ok(())
}

#[tokio::test]
async fn failed_batch_append_writes_nothing() -> AnyResult<()> {
    let f = fixture()?;
    let mut batch = vec![f.repo.create("lot-1"), f.repo.create("lot-2")];
    batch[0].record("bid", 5)?;
    batch[1].record("bid", 7)?;

    f.log.fail_append.store(true, Ordering::SeqCst);
    let err = f
        .repo
        .commit_many(&mut batch, CommitOptions::default())
        .await
        .unwrap_err();
    assert!(err.is_backend());
    assert!(batch.iter().all(|e| e.pending_events().len() == 1));
    assert!(f.log.inner.is_empty().await);
    Ok(())
}

#[tokio::test]
async fn load_errors_propagate_unchanged() -> AnyResult<()> {
    let f = fixture()?;
    let mut auction = f.repo.create("lot-1");
    auction.record("bid", 10)?;
    f.repo.commit(&mut auction, CommitOptions::default()).await?;

    f.log.fail_find.store(true, Ordering::SeqCst);
    let err = f
        .repo
        .get_with("lot-1", GetOptions::bypass_cache())
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "event log error: query timed out");

    let err = f.repo.get_many(&["lot-1"]).await.unwrap_err();
    assert!(matches!(err, DomainError::EventLog { .. }));
    Ok(())
}
