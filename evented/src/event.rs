//! 事件（Event）
//!
//! 一次已应用命令的不可变记录。持久化与重放共用同一线上形态：
//! `{ id, cmd, data, version, revision, ts }`，其中 `ts` 为毫秒时间戳。
//!
use crate::error::DomainResult;
use bon::Builder;
use chrono::{DateTime, SubsecRound, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 当前时间，截断到毫秒（与线上 `ts` 精度一致）
pub(crate) fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// 不可变事件：构造后不提供任何修改方法
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
pub struct Event {
    /// 所属聚合标识
    #[builder(into)]
    #[serde(rename = "id")]
    aggregate_id: String,
    /// 命令名称（重放时据此查找命令表）
    #[builder(into)]
    #[serde(rename = "cmd")]
    command: String,
    /// 命令载荷
    #[builder(default)]
    #[serde(rename = "data", default)]
    payload: Value,
    /// 记录时的快照基线
    #[builder(default)]
    #[serde(default)]
    version: usize,
    /// 聚合内单调递增序号
    revision: usize,
    /// 记录时间
    #[builder(default = now())]
    #[serde(rename = "ts", with = "chrono::serde::ts_milliseconds")]
    timestamp: DateTime<Utc>,
}

impl Event {
    pub(crate) fn recorded(
        aggregate_id: String,
        command: &str,
        payload: Value,
        version: usize,
        revision: usize,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            aggregate_id,
            command: command.to_string(),
            payload,
            version,
            revision,
            timestamp,
        }
    }

    pub fn aggregate_id(&self) -> &str {
        &self.aggregate_id
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// 将载荷反序列化为具体类型
    pub fn payload_as<T: DeserializeOwned>(&self) -> DomainResult<T> {
        Ok(T::deserialize(&self.payload)?)
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wire_shape_uses_short_keys() {
        let event = Event::builder()
            .aggregate_id("t1")
            .command("start")
            .payload(json!({ "agent": "tomas" }))
            .revision(1)
            .timestamp(DateTime::from_timestamp_millis(1_442_799_956_314).unwrap())
            .build();

        let wire = serde_json::to_value(&event).unwrap();
        assert_eq!(
            wire,
            json!({
                "id": "t1",
                "cmd": "start",
                "data": { "agent": "tomas" },
                "version": 0,
                "revision": 1,
                "ts": 1_442_799_956_314_i64
            })
        );
    }

    #[test]
    fn parses_legacy_document_without_version() {
        let event: Event = serde_json::from_value(json!({
            "cmd": "end",
            "data": { "agent": "mery" },
            "id": "t1",
            "revision": 2,
            "ts": 1_442_799_956_315_i64
        }))
        .unwrap();

        assert_eq!(event.command(), "end");
        assert_eq!(event.version(), 0);
        assert_eq!(event.revision(), 2);
        assert_eq!(event.timestamp().timestamp_millis(), 1_442_799_956_315);

        #[derive(Deserialize)]
        struct Agent {
            agent: String,
        }
        let agent: Agent = event.payload_as().unwrap();
        assert_eq!(agent.agent, "mery");
    }

    #[test]
    fn now_is_millisecond_precision() {
        let ts = now();
        assert_eq!(ts.timestamp_subsec_nanos() % 1_000_000, 0);
    }
}
