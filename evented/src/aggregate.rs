//! 聚合（Aggregate）抽象与命令表
//!
//! 每个具体聚合类型注册一张「命令名 → 纯状态迁移函数」的命令表：
//! - 实时路径（`Entity::record`）与历史路径（`Entity::replay`）都经由同一张表分发；
//! - 命令函数只修改聚合状态，副作用一律通过 `Effects` 发出，
//!   重放期间 `Effects` 会抑制全部副作用。
//!
use crate::emitter::{Emission, Emitter};
use crate::error::DomainResult;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// 聚合接口
pub trait Aggregate: Default + Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// 聚合类型名，用于命名事件/快照集合
    const TYPE: &'static str;

    /// 该聚合的命令表
    fn commands() -> CommandTable<Self>;
}

type Handler<A> = Arc<dyn Fn(&mut A, &Value, &mut Effects<'_>) -> DomainResult<()> + Send + Sync>;

/// 命令表：命令名到状态迁移函数的映射
pub struct CommandTable<A> {
    handlers: HashMap<&'static str, Handler<A>>,
}

impl<A> Default for CommandTable<A> {
    fn default() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }
}

impl<A: 'static> CommandTable<A> {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册命令；载荷在调用前反序列化为 `P`。同名命令后注册者覆盖先注册者。
    pub fn on<P, F>(mut self, name: &'static str, command: F) -> Self
    where
        P: DeserializeOwned + 'static,
        F: Fn(&mut A, P, &mut Effects<'_>) + Send + Sync + 'static,
    {
        let handler: Handler<A> = Arc::new(
            move |state: &mut A, payload: &Value, effects: &mut Effects<'_>| -> DomainResult<()> {
                let payload = P::deserialize(payload)?;
                command(state, payload, effects);
                Ok(())
            },
        );
        self.handlers.insert(name, handler);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// 已注册的命令名（无序）
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.handlers.keys().copied()
    }

    /// 分发命令；未注册的命令返回 `None`
    pub(crate) fn dispatch(
        &self,
        state: &mut A,
        command: &str,
        payload: &Value,
        effects: &mut Effects<'_>,
    ) -> Option<DomainResult<()>> {
        self.handlers
            .get(command)
            .map(|handler| handler(state, payload, effects))
    }
}

impl<A> fmt::Debug for CommandTable<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.handlers.keys().copied().collect();
        names.sort_unstable();
        f.debug_struct("CommandTable")
            .field("commands", &names)
            .finish()
    }
}

/// 命令函数可见的副作用句柄
///
/// 重放期间（`is_replaying() == true`）`emit` 与 `enqueue` 均为空操作。
pub struct Effects<'a> {
    id: Option<&'a str>,
    revision: usize,
    replaying: bool,
    emitter: &'a Emitter,
    deferred: &'a mut Vec<Emission>,
}

impl<'a> Effects<'a> {
    pub(crate) fn new(
        id: Option<&'a str>,
        revision: usize,
        replaying: bool,
        emitter: &'a Emitter,
        deferred: &'a mut Vec<Emission>,
    ) -> Self {
        Self {
            id,
            revision,
            replaying,
            emitter,
            deferred,
        }
    }

    /// 所属实体标识
    pub fn id(&self) -> Option<&str> {
        self.id
    }

    /// 本次命令对应的修订号
    pub fn revision(&self) -> usize {
        self.revision
    }

    pub fn is_replaying(&self) -> bool {
        self.replaying
    }

    /// 实时通知：同步投递给观察者
    pub fn emit(&mut self, name: &str, args: impl Into<Value>) -> &mut Self {
        if !self.replaying {
            self.emitter.emit(&Emission::new(name, args));
        }
        self
    }

    /// 延迟通知：提交成功后才会发出
    pub fn enqueue(&mut self, name: &str, args: impl Into<Value>) -> &mut Self {
        if !self.replaying {
            self.deferred.push(Emission::new(name, args));
        }
        self
    }
}
