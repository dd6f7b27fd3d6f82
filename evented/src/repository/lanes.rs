//! 按标识串行化的提交通道
//!
//! 每个标识一把 `tokio::sync::Mutex`，`lock_owned` 按 FIFO 公平排队，
//! 因此同一标识的提交严格按请求顺序逐个写入后端；不同标识互不阻塞。
//! 排队数（含进行中的提交）超过上限时立即拒绝。
//!
use crate::error::{DomainError, DomainResult as Result};
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Default)]
struct Lane {
    gate: Arc<Mutex<()>>,
    waiting: AtomicUsize,
}

type Lanes = Arc<DashMap<String, Arc<Lane>>>;

#[derive(Clone)]
pub(crate) struct CommitLanes {
    lanes: Lanes,
    limit: usize,
}

impl CommitLanes {
    pub(crate) fn new(limit: usize) -> Self {
        Self {
            lanes: Arc::new(DashMap::new()),
            limit: limit.max(1),
        }
    }

    /// 进入某标识的通道，返回时已独占该标识
    pub(crate) async fn acquire(&self, id: &str) -> Result<LaneGuard> {
        let (lane, waiting) = {
            let entry = self
                .lanes
                .entry(id.to_string())
                .or_insert_with(|| Arc::new(Lane::default()));
            let waiting = entry.waiting.fetch_add(1, Ordering::SeqCst) + 1;
            (Arc::clone(entry.value()), waiting)
        };

        let ticket = Ticket {
            id: id.to_string(),
            lanes: Arc::clone(&self.lanes),
            lane,
        };
        if waiting > self.limit {
            return Err(DomainError::CommitQueueFull {
                id: id.to_string(),
                limit: self.limit,
            });
        }

        let permit = Arc::clone(&ticket.lane.gate).lock_owned().await;
        Ok(LaneGuard {
            _permit: permit,
            _ticket: ticket,
        })
    }

    /// 依排序后的去重标识依次进入各通道
    pub(crate) async fn acquire_all<'a, I>(&self, ids: I) -> Result<Vec<LaneGuard>>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut ids: Vec<&str> = ids.into_iter().collect();
        ids.sort_unstable();
        ids.dedup();

        let mut guards = Vec::with_capacity(ids.len());
        for id in ids {
            guards.push(self.acquire(id).await?);
        }
        Ok(guards)
    }

    /// 当前有提交进行或排队的标识数
    pub(crate) fn active(&self) -> usize {
        self.lanes.len()
    }
}

/// 排队凭证：释放时递减计数，计数归零则回收通道
struct Ticket {
    id: String,
    lanes: Lanes,
    lane: Arc<Lane>,
}

impl Drop for Ticket {
    fn drop(&mut self) {
        if self.lane.waiting.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.lanes
                .remove_if(&self.id, |_, lane| lane.waiting.load(Ordering::SeqCst) == 0);
        }
    }
}

/// 独占某标识的通道；先释放锁再归还凭证
pub(crate) struct LaneGuard {
    _permit: OwnedMutexGuard<()>,
    _ticket: Ticket,
}
