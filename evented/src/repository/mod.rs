//! 仓储（Repository）
//!
//! 编排实体的加载与提交：
//! - 加载：最新快照 + 其后的事件 → `restore` + `replay` → 当前状态；
//!   批量加载对快照与事件各只发起一次后端查询；
//! - 提交：待提交事件追加到事件日志 → 按节奏（或强制）写入快照 →
//!   清空待提交事件 → 提交成功后按顺序发出延迟通知；
//! - 同一标识的提交经由提交通道严格串行，不同标识互不阻塞；
//! - 可选的读穿缓存，成功加载与成功提交都会刷新。
//!
//! 后端错误原样返回给调用方（同时广播 `RepositoryNotice::BackendError`），
//! 仓储不做解释与重试。
//!
mod cache;
mod lanes;
mod notice;

pub use notice::{Notifier, RepositoryNotice};

use crate::aggregate::{Aggregate, CommandTable};
use crate::config::{CommitOptions, GetOptions, RepositoryConfig};
use crate::entity::Entity;
use crate::error::{DomainError, DomainResult as Result};
use crate::event::Event;
use crate::persist::{EventFilter, EventLog, SnapshotPolicy, SnapshotStore};
use crate::snapshot::{Snapshot, state_fields};
use cache::EntityCache;
use futures_core::stream::BoxStream;
use lanes::CommitLanes;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// 单次加载的结果
#[derive(Debug)]
pub struct Loaded<A: Aggregate> {
    pub entity: Entity<A>,
    /// 是否来自缓存
    pub cached: bool,
}

/// 单个实体的提交回执
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitReceipt {
    pub id: String,
    /// 提交后的修订号
    pub revision: usize,
    /// 本次追加的事件数
    pub appended: usize,
    /// 本次是否写入了快照
    pub snapshotted: bool,
}

pub struct Repository<A: Aggregate> {
    events: Arc<dyn EventLog>,
    snapshots: Arc<dyn SnapshotStore>,
    config: RepositoryConfig,
    policy: SnapshotPolicy,
    commands: Arc<CommandTable<A>>,
    cache: EntityCache<A>,
    lanes: CommitLanes,
    notifier: Notifier,
}

impl<A: Aggregate> fmt::Debug for Repository<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("type", &A::TYPE)
            .field("config", &self.config)
            .field("commands", &self.commands)
            .finish_non_exhaustive()
    }
}

impl<A: Aggregate> Repository<A> {
    /// 构造仓储；聚合类型名为空、命令表为空或状态无法作为快照保存时为配置错误
    pub fn new(
        events: Arc<dyn EventLog>,
        snapshots: Arc<dyn SnapshotStore>,
        config: RepositoryConfig,
    ) -> Result<Self> {
        let notifier = Notifier::new(config.notice_capacity());
        Self::with_notifier(events, snapshots, config, notifier)
    }

    /// 与后端适配器共享同一个通知发送端
    pub fn with_notifier(
        events: Arc<dyn EventLog>,
        snapshots: Arc<dyn SnapshotStore>,
        config: RepositoryConfig,
        notifier: Notifier,
    ) -> Result<Self> {
        if A::TYPE.trim().is_empty() {
            return Err(DomainError::configuration("aggregate type name is empty"));
        }

        let commands = A::commands();
        if commands.is_empty() {
            return Err(DomainError::configuration(format!(
                "aggregate `{}` registers no commands",
                A::TYPE
            )));
        }

        state_fields(&A::default()).map_err(|e| {
            DomainError::configuration(format!("aggregate `{}` cannot be snapshotted: {e}", A::TYPE))
        })?;

        Ok(Self {
            events,
            snapshots,
            policy: config.snapshot_policy(),
            lanes: CommitLanes::new(config.commit_queue_limit()),
            config,
            commands: Arc::new(commands),
            cache: EntityCache::new(),
            notifier,
        })
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    /// 订阅仓储通知
    pub fn subscribe(&self) -> BoxStream<'static, Result<RepositoryNotice>> {
        self.notifier.subscribe()
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// 创建一个新实体（不访问后端）
    pub fn create(&self, id: impl Into<String>) -> Entity<A> {
        Entity::with_commands(Some(id.into()), Arc::clone(&self.commands))
    }

    pub async fn get(&self, id: &str) -> Result<Option<Entity<A>>> {
        Ok(self
            .load(id, GetOptions::default())
            .await?
            .map(|(entity, _)| entity))
    }

    /// 加载单个实体；既无快照也无事件时返回 `None`
    pub async fn get_with(&self, id: &str, options: GetOptions) -> Result<Option<Loaded<A>>> {
        Ok(self
            .load(id, options)
            .await?
            .map(|(entity, cached)| Loaded { entity, cached }))
    }

    /// 加载；不存在时返回以该标识新建的实体
    pub async fn set(&self, id: &str) -> Result<Entity<A>> {
        if let Some(entity) = self.get(id).await? {
            return Ok(entity);
        }

        let entity = self.create(id);
        if self.config.cache_enabled() {
            self.cache.put(&entity);
        }
        Ok(entity)
    }

    /// 加载；不存在时新建实体并记录初始化命令。
    ///
    /// 已存在的实体原样返回，不会再次初始化。新实体直到首次提交才进入缓存。
    pub async fn set_with<P: Serialize>(
        &self,
        id: &str,
        command: &str,
        payload: P,
    ) -> Result<Entity<A>> {
        if let Some(entity) = self.get(id).await? {
            return Ok(entity);
        }

        let mut entity = self.create(id);
        entity.record(command, payload)?;
        Ok(entity)
    }

    pub async fn get_many<S>(&self, ids: &[S]) -> Result<Vec<Entity<A>>>
    where
        S: AsRef<str> + Sync,
    {
        self.get_many_with(ids, GetOptions::default()).await
    }

    /// 批量加载：结果按输入顺序排列，不存在的标识被省略，重复标识各得一份
    #[tracing::instrument(skip(self, ids), fields(aggregate = A::TYPE, ids = ids.len()))]
    pub async fn get_many_with<S>(&self, ids: &[S], options: GetOptions) -> Result<Vec<Entity<A>>>
    where
        S: AsRef<str> + Sync,
    {
        let use_cache = self.config.cache_enabled() && options.cached();

        let mut hits: HashMap<&str, Entity<A>> = HashMap::new();
        let mut misses: Vec<String> = Vec::new();
        for id in ids.iter().map(AsRef::as_ref) {
            if hits.contains_key(id) || misses.iter().any(|m| m == id) {
                continue;
            }
            match use_cache.then(|| self.cache.get(id)).flatten() {
                Some(entity) => {
                    hits.insert(id, entity);
                }
                None => misses.push(id.to_string()),
            }
        }

        let loaded = self.load_many(&misses).await?;
        for entity in loaded.values() {
            self.remember(entity);
        }

        let entities = ids
            .iter()
            .map(AsRef::as_ref)
            .filter_map(|id| {
                hits.get(id)
                    .or_else(|| loaded.get(id))
                    .map(Entity::cache_copy)
            })
            .collect();
        Ok(entities)
    }

    /// 加载事件日志中已知的全部实体
    pub async fn get_all(&self) -> Result<Vec<Entity<A>>> {
        let ids = self.backend(self.events.distinct_ids().await)?;
        self.get_many(ids.as_slice()).await
    }

    /// 提交单个实体
    #[tracing::instrument(skip(self, entity, options), fields(aggregate = A::TYPE, id = entity.id()))]
    pub async fn commit(&self, entity: &mut Entity<A>, options: CommitOptions) -> Result<CommitReceipt> {
        let Some(id) = identity(entity).map(str::to_string) else {
            return Err(DomainError::MissingIdentity);
        };

        let lane = self.lanes.acquire(&id).await?;
        let mut receipts = self.persist(std::slice::from_mut(entity), options).await?;
        drop(lane);

        entity.fire_deferred();
        receipts.pop().ok_or_else(|| DomainError::event_log("commit produced no receipt"))
    }

    /// 批量提交：事件一次追加、快照一次写入；任一实体缺少标识则整体拒绝
    #[tracing::instrument(skip(self, entities, options), fields(aggregate = A::TYPE, entities = entities.len()))]
    pub async fn commit_many(
        &self,
        entities: &mut [Entity<A>],
        options: CommitOptions,
    ) -> Result<Vec<CommitReceipt>> {
        let Some(ids) = entities
            .iter()
            .map(|e| identity(e).map(str::to_string))
            .collect::<Option<Vec<String>>>()
        else {
            return Err(DomainError::MissingIdentity);
        };
        let guards = self
            .lanes
            .acquire_all(ids.iter().map(String::as_str))
            .await?;
        let receipts = self.persist(entities, options).await?;
        drop(guards);

        for entity in entities.iter_mut() {
            entity.fire_deferred();
        }
        Ok(receipts)
    }

    pub fn is_cached(&self, id: &str) -> bool {
        self.cache.contains(id)
    }

    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }

    /// 移除缓存条目，返回是否存在
    pub fn evict(&self, id: &str) -> bool {
        self.cache.remove(id)
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// 当前有提交进行或排队的标识数
    pub fn committing_ids(&self) -> usize {
        self.lanes.active()
    }

    async fn load(&self, id: &str, options: GetOptions) -> Result<Option<(Entity<A>, bool)>> {
        if self.config.cache_enabled() && options.cached() {
            if let Some(entity) = self.cache.get(id) {
                tracing::debug!(aggregate = A::TYPE, id, "cache hit");
                return Ok(Some((entity, true)));
            }
        }

        let snapshot = self.backend(self.snapshots.latest(id, None).await)?;
        let after = snapshot.as_ref().map_or(0, Snapshot::revision);
        let events = self.backend(
            self.events
                .find(&EventFilter::new().after(id, after))
                .await,
        )?;

        let Some(entity) = self.rebuild(id, snapshot.as_ref(), &events)? else {
            tracing::debug!(aggregate = A::TYPE, id, "not found");
            return Ok(None);
        };

        self.remember(&entity);
        Ok(Some((entity, false)))
    }

    async fn load_many(&self, ids: &[String]) -> Result<HashMap<String, Entity<A>>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let snapshots = self.backend(self.snapshots.latest_multi(ids).await)?;
        let filter = ids.iter().fold(EventFilter::new(), |filter, id| {
            let after = snapshots.get(id).map_or(0, Snapshot::revision);
            filter.after(id.as_str(), after)
        });
        let events = self.backend(self.events.find(&filter).await)?;

        let mut grouped: HashMap<String, Vec<Event>> = HashMap::new();
        for event in events {
            grouped
                .entry(event.aggregate_id().to_string())
                .or_default()
                .push(event);
        }

        let mut loaded = HashMap::with_capacity(ids.len());
        for id in ids {
            let history = grouped.remove(id.as_str()).unwrap_or_default();
            if let Some(entity) = self.rebuild(id, snapshots.get(id), &history)? {
                loaded.insert(id.clone(), entity);
            }
        }
        Ok(loaded)
    }

    fn rebuild(
        &self,
        id: &str,
        snapshot: Option<&Snapshot>,
        events: &[Event],
    ) -> Result<Option<Entity<A>>> {
        if snapshot.is_none() && events.is_empty() {
            return Ok(None);
        }

        let mut entity = self.create(id);
        entity.restore(snapshot)?.replay(events)?;
        tracing::debug!(
            aggregate = A::TYPE,
            id,
            version = entity.version(),
            revision = entity.revision(),
            replayed = events.len(),
            "rebuilt"
        );
        Ok(Some(entity))
    }

    /// 刷新缓存并广播加载通知
    fn remember(&self, entity: &Entity<A>) {
        if self.config.cache_enabled() {
            self.cache.put(entity);
        }
        self.notifier.publish(RepositoryNotice::Loaded {
            id: entity.id().unwrap_or_default().to_string(),
            revision: entity.revision(),
        });
    }

    /// 写入后端；调用方须已持有所有相关标识的提交通道
    async fn persist(
        &self,
        entities: &mut [Entity<A>],
        options: CommitOptions,
    ) -> Result<Vec<CommitReceipt>> {
        let receipts = {
            let mut flight = InFlight::raise(entities);
            let outcome = self.write(&mut *flight.entities, options).await;
            flight.settled = true;
            outcome?
        };

        for (entity, receipt) in entities.iter().zip(&receipts) {
            if self.config.cache_enabled() {
                self.cache.put(entity);
            }
            self.notifier.publish(RepositoryNotice::Committed {
                id: receipt.id.clone(),
                revision: receipt.revision,
                snapshotted: receipt.snapshotted,
            });
        }
        Ok(receipts)
    }

    async fn write(
        &self,
        entities: &mut [Entity<A>],
        options: CommitOptions,
    ) -> Result<Vec<CommitReceipt>> {
        let prior: Vec<usize> = entities.iter().map(Entity::version).collect();

        // 快照捕获不改变状态，先于追加捕获与追加后捕获结果一致
        let captured: Result<Vec<Option<Snapshot>>> = entities
            .iter_mut()
            .map(|entity| {
                if options.snap() || self.policy.should_snapshot(entity.revision(), entity.version())
                {
                    entity.snap().map(Some)
                } else {
                    Ok(None)
                }
            })
            .collect();
        let captured = match captured {
            Ok(captured) => captured,
            Err(e) => {
                rollback(entities, &prior);
                return Err(e);
            }
        };

        let events: Vec<Event> = entities
            .iter()
            .flat_map(|e| e.pending_events().iter().cloned())
            .collect();
        if !events.is_empty() {
            if let Err(e) = self.backend(self.events.append(&events).await) {
                rollback(entities, &prior);
                return Err(e);
            }
        }

        let appended: Vec<usize> = entities.iter().map(|e| e.pending_events().len()).collect();
        for entity in entities.iter_mut() {
            entity.clear_pending();
        }

        let snapshots: Vec<Snapshot> = captured.iter().flatten().cloned().collect();
        let inserted = if snapshots.is_empty() {
            Ok(())
        } else {
            self.backend(self.snapshots.insert(&snapshots).await)
        };
        if let Err(e) = inserted {
            rollback(entities, &prior);
            if events.is_empty() {
                return Err(e);
            }
            return Err(DomainError::PartialCommit {
                ids: entities
                    .iter()
                    .zip(&appended)
                    .filter(|(_, n)| **n > 0)
                    .filter_map(|(e, _)| e.id().map(str::to_string))
                    .collect(),
                reason: e.to_string(),
            });
        }

        let receipts = entities
            .iter()
            .zip(appended)
            .zip(&captured)
            .map(|((entity, appended), snap)| CommitReceipt {
                id: entity.id().unwrap_or_default().to_string(),
                revision: entity.revision(),
                appended,
                snapshotted: snap.is_some(),
            })
            .collect::<Vec<_>>();

        tracing::debug!(
            aggregate = A::TYPE,
            events = events.len(),
            snapshots = snapshots.len(),
            "committed"
        );
        Ok(receipts)
    }

    /// 后端错误：记录日志并广播后原样返回
    fn backend<T>(&self, result: Result<T>) -> Result<T> {
        result.inspect_err(|e| {
            tracing::error!(aggregate = A::TYPE, error = %e, "backend failure");
            self.notifier.backend_error(e.to_string());
        })
    }
}

/// 可提交的标识：缺失或空白都视为没有标识
fn identity<A: Aggregate>(entity: &Entity<A>) -> Option<&str> {
    entity.id().filter(|id| !id.trim().is_empty())
}

/// 提交进行中的标记；提交 future 被中途丢弃时清除标记并回退版本基线
struct InFlight<'a, A: Aggregate> {
    entities: &'a mut [Entity<A>],
    prior: Vec<usize>,
    settled: bool,
}

impl<'a, A: Aggregate> InFlight<'a, A> {
    fn raise(entities: &'a mut [Entity<A>]) -> Self {
        let prior = entities.iter().map(Entity::version).collect();
        for entity in entities.iter_mut() {
            entity.set_committing(true);
        }
        Self {
            entities,
            prior,
            settled: false,
        }
    }
}

impl<A: Aggregate> Drop for InFlight<'_, A> {
    fn drop(&mut self) {
        if !self.settled {
            rollback(&mut *self.entities, &self.prior);
        }
        for entity in self.entities.iter_mut() {
            entity.set_committing(false);
        }
    }
}

fn rollback<A: Aggregate>(entities: &mut [Entity<A>], prior: &[usize]) {
    for (entity, version) in entities.iter_mut().zip(prior) {
        entity.rollback_version(*version);
    }
}
