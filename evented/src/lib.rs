//! 事件溯源运行时（evented）
//!
//! 聚合的状态只能经由已记录的命令改变；事件流与周期性快照持久化到
//! 存储后端，需要时通过重放历史重建当前状态：
//! - 聚合（`aggregate`）：命令表与副作用句柄；
//! - 实体（`entity`）：记录、重放、恢复、快照、延迟通知；
//! - 事件（`event`）与快照（`snapshot`）：不可变值及其线上形态；
//! - 持久化（`persist`）：事件日志与快照存储协议、节奏策略、内存与 Postgres 实现；
//! - 仓储（`repository`）：加载/提交编排、批量操作、按标识串行提交、读穿缓存。
//!
//! 典型用法：
//! 1. 用 `#[aggregate]` 标注聚合的 `impl` 块，以 `#[command]` 注册命令；
//! 2. 以事件日志与快照存储构造 `Repository`；
//! 3. `get`/`set` 取得实体，调用 `record` 记录命令，再 `commit` 持久化。
//!
pub mod aggregate;
pub mod config;
pub mod emitter;
pub mod entity;
pub mod error;
pub mod event;
pub mod persist;
pub mod repository;
pub mod snapshot;

pub use aggregate::{Aggregate, CommandTable, Effects};
pub use entity::Entity;
pub use repository::{CommitReceipt, Loaded, Repository, RepositoryNotice};

// 允许在本 crate 内部通过 ::evented 进行自引用，
// 以便过程宏在本 crate 的单元测试中也能解析到 ::evented 路径。
extern crate self as evented;
