//! 快照节奏策略
//!
//! 快照只是历史的压缩：事件日志始终是唯一的事实来源，
//! 快照仅让后续加载跳过已压缩的事件。
//!
/// 按未压缩修订数决定是否生成快照
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotPolicy {
    Never,
    Every(usize),
}

impl Default for SnapshotPolicy {
    fn default() -> Self {
        SnapshotPolicy::Every(crate::config::DEFAULT_CADENCE)
    }
}

impl SnapshotPolicy {
    /// `cadence == 0` 视为从不自动快照
    pub fn from_cadence(cadence: usize) -> Self {
        match cadence {
            0 => SnapshotPolicy::Never,
            n => SnapshotPolicy::Every(n),
        }
    }

    /// `revision - version >= cadence` 时应生成快照
    pub fn should_snapshot(&self, revision: usize, version: usize) -> bool {
        match self {
            SnapshotPolicy::Never => false,
            SnapshotPolicy::Every(cadence) => revision.saturating_sub(version) >= (*cadence).max(1),
        }
    }
}
