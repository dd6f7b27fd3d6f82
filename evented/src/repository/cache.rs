//! 读穿缓存
//!
//! 以标识为键保存实体副本（不含观察者、待提交事件与延迟通知）。
//! 成功加载与成功提交都会刷新条目；跨进程的失效不在此处理。
//!
use crate::aggregate::Aggregate;
use crate::entity::Entity;
use dashmap::DashMap;

pub(crate) struct EntityCache<A: Aggregate> {
    entries: DashMap<String, Entity<A>>,
}

impl<A: Aggregate> EntityCache<A> {
    pub(crate) fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    pub(crate) fn get(&self, id: &str) -> Option<Entity<A>> {
        self.entries.get(id).map(|entry| entry.value().cache_copy())
    }

    pub(crate) fn put(&self, entity: &Entity<A>) {
        if let Some(id) = entity.id() {
            self.entries.insert(id.to_string(), entity.cache_copy());
        }
    }

    pub(crate) fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub(crate) fn remove(&self, id: &str) -> bool {
        self.entries.remove(id).is_some()
    }

    pub(crate) fn clear(&self) {
        self.entries.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{CommandTable, Effects};
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct Note {
        text: String,
    }

    impl Note {
        fn write(&mut self, text: String, fx: &mut Effects<'_>) {
            self.text = text;
            fx.enqueue("written", ());
        }
    }

    impl Aggregate for Note {
        const TYPE: &'static str = "note";

        fn commands() -> CommandTable<Self> {
            CommandTable::new().on("write", Self::write)
        }
    }

    #[test]
    fn stores_clean_copies() {
        let cache = EntityCache::<Note>::new();
        let mut note = Entity::<Note>::new("n-1");
        note.record("write", "hello").unwrap();
        cache.put(&note);

        let copy = cache.get("n-1").unwrap();
        assert_eq!(copy.state(), note.state());
        assert_eq!(copy.revision(), 1);
        assert!(copy.pending_events().is_empty());
        assert!(copy.deferred_emissions().is_empty());

        assert!(cache.contains("n-1"));
        assert_eq!(cache.len(), 1);
        assert!(cache.remove("n-1"));
        assert!(cache.get("n-1").is_none());
    }

    #[test]
    fn entities_without_identity_are_not_cached() {
        let cache = EntityCache::<Note>::new();
        cache.put(&Entity::<Note>::detached());
        assert_eq!(cache.len(), 0);
        cache.clear();
    }
}
