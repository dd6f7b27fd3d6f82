//! 快照（Snapshot）
//!
//! 聚合在某一修订号上的完整压缩状态。线上形态为聚合的全部字段再加
//! `{ id, version, revision, ts }`；存储层附带的内部标识（`_id`）在用作
//! 重放输入前会被剥离。
//!
use crate::error::{DomainError, DomainResult};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 存储层内部标识字段
pub const STORAGE_ID: &str = "_id";

/// 快照元字段，聚合状态不得使用
pub const RESERVED_FIELDS: [&str; 5] = ["id", "version", "revision", "ts", STORAGE_ID];

/// 不可变快照：捕获时 `version == revision`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    id: String,
    version: usize,
    revision: usize,
    #[serde(rename = "ts", with = "chrono::serde::ts_milliseconds")]
    timestamp: DateTime<Utc>,
    #[serde(flatten)]
    state: Map<String, Value>,
}

impl Snapshot {
    pub(crate) fn capture(
        id: String,
        revision: usize,
        timestamp: DateTime<Utc>,
        state: Map<String, Value>,
    ) -> Self {
        Self {
            id,
            version: revision,
            revision,
            timestamp,
            state,
        }
    }

    /// 由存储层读出的各列重新组装快照
    #[cfg_attr(not(feature = "infra-sqlx"), allow(dead_code))]
    pub(crate) fn from_parts(
        id: String,
        version: usize,
        revision: usize,
        timestamp: DateTime<Utc>,
        mut state: Map<String, Value>,
    ) -> Self {
        state.remove(STORAGE_ID);
        Self {
            id,
            version,
            revision,
            timestamp,
            state,
        }
    }

    /// 由线上文档解析快照，剥离存储层内部标识
    pub fn from_document(mut document: Value) -> DomainResult<Self> {
        if let Some(fields) = document.as_object_mut() {
            fields.remove(STORAGE_ID);
        }
        Ok(serde_json::from_value(document)?)
    }

    /// 转为线上文档
    pub fn to_document(&self) -> DomainResult<Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn version(&self) -> usize {
        self.version
    }

    pub fn revision(&self) -> usize {
        self.revision
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// 聚合状态字段（不含元字段）
    pub fn state(&self) -> &Map<String, Value> {
        &self.state
    }

    /// 将状态反序列化为聚合类型
    pub fn state_as<T: DeserializeOwned>(&self) -> DomainResult<T> {
        Ok(serde_json::from_value(Value::Object(self.state.clone()))?)
    }
}

/// 将聚合状态转为快照可用的字段表
pub(crate) fn state_fields<T: Serialize>(state: &T) -> DomainResult<Map<String, Value>> {
    let fields = match serde_json::to_value(state)? {
        Value::Object(fields) => fields,
        other => {
            return Err(DomainError::validation(format!(
                "aggregate state must serialize to an object, got {other}"
            )));
        }
    };

    if let Some(field) = RESERVED_FIELDS.iter().find(|f| fields.contains_key(**f)) {
        return Err(DomainError::validation(format!(
            "aggregate state uses reserved snapshot field `{field}`"
        )));
    }

    Ok(fields)
}
