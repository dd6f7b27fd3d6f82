//! 通知（Emission）与观察者注册表（Emitter）
//!
//! 实时通知同步投递给已注册的观察者；延迟通知先进入实体队列，
//! 在提交成功后按顺序以实时通知的形式发出。
//!
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// 一次通知请求：名称 + 参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Emission {
    name: String,
    args: Value,
}

impl Emission {
    pub fn new(name: impl Into<String>, args: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            args: args.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn args(&self) -> &Value {
        &self.args
    }
}

/// 观察者回调
pub type Listener = Arc<dyn Fn(&Emission) + Send + Sync>;

/// 按通知名称分组的观察者注册表
#[derive(Clone, Default)]
pub struct Emitter {
    listeners: HashMap<String, Vec<Listener>>,
}

impl Emitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册观察者
    pub fn on<F>(&mut self, name: impl Into<String>, listener: F) -> &mut Self
    where
        F: Fn(&Emission) + Send + Sync + 'static,
    {
        self.listeners
            .entry(name.into())
            .or_default()
            .push(Arc::new(listener));
        self
    }

    /// 同步投递，返回被调用的观察者数量
    pub fn emit(&self, emission: &Emission) -> usize {
        let Some(listeners) = self.listeners.get(emission.name()) else {
            return 0;
        };

        for listener in listeners {
            listener(emission);
        }
        listeners.len()
    }

    pub fn listener_count(&self, name: &str) -> usize {
        self.listeners.get(name).map_or(0, Vec::len)
    }

    /// 移除全部观察者
    pub fn clear(&mut self) {
        self.listeners.clear();
    }
}

impl fmt::Debug for Emitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.listeners.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("Emitter").field("events", &names).finish()
    }
}
