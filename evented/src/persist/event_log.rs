//! 事件日志协议
//!
//! 追加只写；查询按 `(id, revision)` 过滤并按修订号升序返回。
//! 实现必须保证成功的 `append` 是持久的，且并发 `find` 不会观察到部分追加。
//!
use crate::error::DomainResult as Result;
use crate::event::Event;
use async_trait::async_trait;
use std::sync::Arc;

/// 组合过滤条件：每个标识一个修订号下界（`revision > after`）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilter {
    bounds: Vec<(String, usize)>,
}

impl EventFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一个标识的下界；同一标识重复出现时保留较小的下界
    pub fn after(mut self, id: impl Into<String>, revision: usize) -> Self {
        let id = id.into();
        match self.bounds.iter_mut().find(|(known, _)| *known == id) {
            Some((_, after)) => *after = (*after).min(revision),
            None => self.bounds.push((id, revision)),
        }
        self
    }

    pub fn matches(&self, event: &Event) -> bool {
        self.bounds
            .iter()
            .any(|(id, after)| id == event.aggregate_id() && event.revision() > *after)
    }

    pub fn bounds(&self) -> &[(String, usize)] {
        &self.bounds
    }

    pub fn is_empty(&self) -> bool {
        self.bounds.is_empty()
    }
}

#[async_trait]
pub trait EventLog: Send + Sync {
    /// 追加一批事件（空批次立即成功）
    async fn append(&self, events: &[Event]) -> Result<()>;

    /// 按过滤条件查询，修订号升序
    async fn find(&self, filter: &EventFilter) -> Result<Vec<Event>>;

    /// 已知的全部聚合标识（去重）
    async fn distinct_ids(&self) -> Result<Vec<String>>;
}

#[async_trait]
impl<T> EventLog for Arc<T>
where
    T: EventLog + ?Sized,
{
    async fn append(&self, events: &[Event]) -> Result<()> {
        (**self).append(events).await
    }

    async fn find(&self, filter: &EventFilter) -> Result<Vec<Event>> {
        (**self).find(filter).await
    }

    async fn distinct_ids(&self) -> Result<Vec<String>> {
        (**self).distinct_ids().await
    }
}
