//! 实体（Entity）：聚合的内存投影
//!
//! 持有标识、版本/修订号计数、待提交事件、延迟通知队列以及
//! 记录/重放/恢复/快照等操作。状态只能经由命令表中的命令改变：
//! - `record`：实时路径，生成事件并同步执行命令（副作用即时发生）；
//! - `replay`：历史路径，按事件执行命令，不追加事件、不触发任何通知。
//!
use crate::aggregate::{Aggregate, CommandTable, Effects};
use crate::emitter::{Emission, Emitter};
use crate::error::{DomainError, DomainResult};
use crate::event::{Event, now};
use crate::snapshot::{STORAGE_ID, Snapshot, state_fields};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// 聚合实体
#[derive(Clone)]
pub struct Entity<A: Aggregate> {
    id: Option<String>,
    version: usize,
    revision: usize,
    timestamp: DateTime<Utc>,
    state: A,
    pending: Vec<Event>,
    deferred: Vec<Emission>,
    committing: bool,
    replaying: bool,
    emitter: Emitter,
    commands: Arc<CommandTable<A>>,
}

impl<A: Aggregate> Entity<A> {
    /// 以给定标识创建新实体
    pub fn new(id: impl Into<String>) -> Self {
        Self::with_commands(Some(id.into()), Arc::new(A::commands()))
    }

    /// 创建没有标识的实体（无法提交）
    pub fn detached() -> Self {
        Self::with_commands(None, Arc::new(A::commands()))
    }

    pub(crate) fn with_commands(id: Option<String>, commands: Arc<CommandTable<A>>) -> Self {
        Self {
            id,
            version: 0,
            revision: 0,
            timestamp: now(),
            state: A::default(),
            pending: Vec::new(),
            deferred: Vec::new(),
            committing: false,
            replaying: false,
            emitter: Emitter::new(),
            commands,
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// 最近一次快照的修订号（无快照为 0）
    pub fn version(&self) -> usize {
        self.version
    }

    pub fn revision(&self) -> usize {
        self.revision
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn state(&self) -> &A {
        &self.state
    }

    /// 自上次成功提交以来记录的事件
    pub fn pending_events(&self) -> &[Event] {
        &self.pending
    }

    /// 等待提交成功后发出的通知
    pub fn deferred_emissions(&self) -> &[Emission] {
        &self.deferred
    }

    pub fn is_committing(&self) -> bool {
        self.committing
    }

    pub fn is_replaying(&self) -> bool {
        self.replaying
    }

    /// 注册观察者
    pub fn on<F>(&mut self, name: impl Into<String>, listener: F) -> &mut Self
    where
        F: Fn(&Emission) + Send + Sync + 'static,
    {
        self.emitter.on(name, listener);
        self
    }

    /// 实时通知；重放期间被完全抑制
    pub fn emit(&mut self, name: &str, args: impl Into<Value>) -> &mut Self {
        if !self.replaying {
            self.emitter.emit(&Emission::new(name, args));
        }
        self
    }

    /// 延迟通知；重放期间为空操作
    pub fn enqueue(&mut self, name: &str, args: impl Into<Value>) -> &mut Self {
        if !self.replaying {
            self.deferred.push(Emission::new(name, args));
        }
        self
    }

    /// 记录一条命令：推进修订号、生成不可变事件、执行命令。
    ///
    /// 重放期间为空操作；命令未注册时返回 `UnknownCommand` 且不产生任何变化。
    pub fn record<P: Serialize>(&mut self, command: &str, payload: P) -> DomainResult<&mut Self> {
        if self.replaying {
            return Ok(self);
        }

        if !self.commands.contains(command) {
            return Err(DomainError::UnknownCommand {
                aggregate_type: A::TYPE.to_string(),
                command: command.to_string(),
            });
        }

        let payload = serde_json::to_value(payload)?;
        let revision = self.revision + 1;
        let timestamp = now();
        let event = Event::recorded(
            self.id.clone().unwrap_or_default(),
            command,
            payload,
            self.version,
            revision,
            timestamp,
        );

        let commands = Arc::clone(&self.commands);
        let mut effects = Effects::new(
            self.id.as_deref(),
            revision,
            false,
            &self.emitter,
            &mut self.deferred,
        );
        if let Some(outcome) =
            commands.dispatch(&mut self.state, command, event.payload(), &mut effects)
        {
            outcome?;
        }

        self.revision = revision;
        self.timestamp = timestamp;
        self.pending.push(event);
        Ok(self)
    }

    /// 按给定顺序重放一组事件（调用方保证修订号升序）
    pub fn replay(&mut self, events: &[Event]) -> DomainResult<&mut Self> {
        for event in events {
            self.replay_event(event)?;
        }
        Ok(self)
    }

    /// 重放单个事件：不追加待提交事件，不触发任何通知。
    ///
    /// 命令未注册时记录完整性告警并跳过该事件，不中断重放。
    pub fn replay_event(&mut self, event: &Event) -> DomainResult<&mut Self> {
        self.revision = event.revision();
        self.timestamp = event.timestamp();
        self.replaying = true;

        let commands = Arc::clone(&self.commands);
        let mut effects = Effects::new(
            self.id.as_deref(),
            event.revision(),
            true,
            &self.emitter,
            &mut self.deferred,
        );
        let outcome = commands.dispatch(
            &mut self.state,
            event.command(),
            event.payload(),
            &mut effects,
        );
        self.replaying = false;

        match outcome {
            Some(result) => result?,
            None => tracing::warn!(
                aggregate = A::TYPE,
                id = event.aggregate_id(),
                command = event.command(),
                revision = event.revision(),
                "replayed event has no matching command; skipped"
            ),
        }
        Ok(self)
    }

    /// 以快照为基线合并状态；`None` 时为空操作
    pub fn restore(&mut self, snapshot: Option<&Snapshot>) -> DomainResult<&mut Self> {
        let Some(snapshot) = snapshot else {
            return Ok(self);
        };

        let mut merged = serde_json::to_value(&self.state)?;
        let mut incoming = Value::Object(snapshot.state().clone());
        if let Some(fields) = incoming.as_object_mut() {
            fields.remove(STORAGE_ID);
        }
        merge(&mut merged, incoming);

        self.state = serde_json::from_value(merged)?;
        self.version = snapshot.version();
        self.revision = snapshot.revision();
        self.timestamp = snapshot.timestamp();
        if self.id.is_none() {
            self.id = Some(snapshot.id().to_string());
        }
        Ok(self)
    }

    /// 捕获快照：令 `version = revision` 并返回当前状态的深拷贝。
    ///
    /// 不清空待提交事件。
    pub fn snap(&mut self) -> DomainResult<Snapshot> {
        let state = state_fields(&self.state)?;
        self.version = self.revision;
        Ok(Snapshot::capture(
            self.id.clone().unwrap_or_default(),
            self.revision,
            self.timestamp,
            state,
        ))
    }

    pub(crate) fn set_committing(&mut self, committing: bool) {
        self.committing = committing;
    }

    pub(crate) fn clear_pending(&mut self) {
        self.pending.clear();
    }

    /// 快照写入失败时回退版本基线
    pub(crate) fn rollback_version(&mut self, version: usize) {
        self.version = version;
    }

    /// 按顺序取出并发出全部延迟通知
    pub(crate) fn fire_deferred(&mut self) {
        for emission in std::mem::take(&mut self.deferred) {
            self.emitter.emit(&emission);
        }
    }

    /// 供缓存保存的副本：不带观察者、待提交事件与延迟通知
    pub(crate) fn cache_copy(&self) -> Self {
        Self {
            id: self.id.clone(),
            version: self.version,
            revision: self.revision,
            timestamp: self.timestamp,
            state: self.state.clone(),
            pending: Vec::new(),
            deferred: Vec::new(),
            committing: false,
            replaying: false,
            emitter: Emitter::new(),
            commands: Arc::clone(&self.commands),
        }
    }
}

impl<A: Aggregate> Default for Entity<A> {
    fn default() -> Self {
        Self::detached()
    }
}

impl<A> fmt::Debug for Entity<A>
where
    A: Aggregate + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("type", &A::TYPE)
            .field("id", &self.id)
            .field("version", &self.version)
            .field("revision", &self.revision)
            .field("timestamp", &self.timestamp)
            .field("state", &self.state)
            .field("pending", &self.pending.len())
            .field("deferred", &self.deferred.len())
            .field("committing", &self.committing)
            .finish()
    }
}

/// 深度合并：对象逐键合并，其余类型以 `incoming` 覆盖
fn merge(target: &mut Value, incoming: Value) {
    match (target, incoming) {
        (Value::Object(target), Value::Object(incoming)) => {
            for (key, value) in incoming {
                match target.get_mut(&key) {
                    Some(slot) => merge(slot, value),
                    None => {
                        target.insert(key, value);
                    }
                }
            }
        }
        (target, incoming) => *target = incoming,
    }
}
