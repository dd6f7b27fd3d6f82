//! 运行时配置
//!
//! 仓储级配置（快照节奏、缓存、提交队列、通知缓冲）以及单次调用的选项。
//! PostgreSQL 适配器的连接配置见 `persist::postgres::BackendConfig`。
//!
use crate::persist::SnapshotPolicy;
use bon::Builder;

#[cfg(feature = "infra-sqlx")]
pub use crate::persist::postgres::BackendConfig;

/// 默认快照节奏：每 10 个未压缩修订生成一次快照
pub const DEFAULT_CADENCE: usize = 10;

/// 仓储配置
#[derive(Debug, Clone, Builder)]
pub struct RepositoryConfig {
    /// 触发快照的未压缩修订数；0 表示从不自动快照
    #[builder(default = DEFAULT_CADENCE)]
    cadence: usize,
    /// 是否启用读穿缓存
    #[builder(default = true)]
    cache_enabled: bool,
    /// 单个标识上排队（含进行中）的提交请求上限
    #[builder(default = 64)]
    commit_queue_limit: usize,
    /// 仓储通知广播缓冲容量
    #[builder(default = 256)]
    notice_capacity: usize,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl RepositoryConfig {
    pub fn cadence(&self) -> usize {
        self.cadence
    }

    pub fn cache_enabled(&self) -> bool {
        self.cache_enabled
    }

    pub fn commit_queue_limit(&self) -> usize {
        self.commit_queue_limit
    }

    pub fn notice_capacity(&self) -> usize {
        self.notice_capacity
    }

    pub fn snapshot_policy(&self) -> SnapshotPolicy {
        SnapshotPolicy::from_cadence(self.cadence)
    }
}

/// 加载选项
#[derive(Debug, Clone, Copy, Builder)]
pub struct GetOptions {
    /// false 时本次调用绕过缓存
    #[builder(default = true)]
    cached: bool,
}

impl Default for GetOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl GetOptions {
    pub fn cached(&self) -> bool {
        self.cached
    }

    pub fn bypass_cache() -> Self {
        Self::builder().cached(false).build()
    }
}

/// 提交选项
#[derive(Debug, Clone, Copy, Default, Builder)]
pub struct CommitOptions {
    /// 强制压缩快照
    #[builder(default)]
    snap: bool,
}

impl CommitOptions {
    pub fn snap(&self) -> bool {
        self.snap
    }

    pub fn force_snapshot() -> Self {
        Self::builder().snap(true).build()
    }
}
