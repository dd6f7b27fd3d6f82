//! 持久化后端协议（persist）
//!
//! 仓储只依赖两个窄接口，由具体存储实现并以构造参数注入：
//! - 事件日志（`EventLog`）：追加、按标识与修订号下界查询、列出已知标识；
//! - 快照存储（`SnapshotStore`）：查询最新快照（单个/批量）、批量写入。
//!
//! 另提供快照节奏策略（`SnapshotPolicy`）、内存参考实现（`memory`）以及
//! 基于 PostgreSQL 的适配器（`postgres`，需启用 `infra-sqlx` 特性）。
//!
mod event_log;
pub mod memory;
mod policy;
#[cfg(feature = "infra-sqlx")]
pub mod postgres;
mod snapshot_store;

pub use event_log::{EventFilter, EventLog};
pub use policy::SnapshotPolicy;
pub use snapshot_store::SnapshotStore;

/// 事件集合名：`<type>.events`
pub fn events_collection(aggregate_type: &str) -> String {
    format!("{aggregate_type}.events")
}

/// 快照集合名：`<type>.snapshots`
pub fn snapshots_collection(aggregate_type: &str) -> String {
    format!("{aggregate_type}.snapshots")
}
