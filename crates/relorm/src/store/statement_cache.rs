use super::PreparedStatement;
use crate::config::StatementCacheConfig;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

/// LRU cache of prepared statements keyed by derived statement name.
#[derive(Debug)]
pub(crate) struct StatementCache {
    enabled: bool,
    inner: Mutex<StatementCacheInner>,
}

#[derive(Debug)]
struct StatementCacheInner {
    capacity: usize,
    map: HashMap<String, PreparedStatement>,
    order: VecDeque<String>,
}

impl StatementCache {
    pub(crate) fn new(config: &StatementCacheConfig) -> Self {
        Self {
            enabled: config.enabled && config.capacity > 0,
            inner: Mutex::new(StatementCacheInner {
                capacity: config.capacity,
                map: HashMap::new(),
                order: VecDeque::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StatementCacheInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn get(&self, name: &str) -> Option<PreparedStatement> {
        if !self.enabled {
            return None;
        }
        let mut inner = self.lock();
        let stmt = inner.map.get(name).cloned()?;
        inner.touch(name);
        Some(stmt)
    }

    pub(crate) fn insert(&self, stmt: PreparedStatement) {
        if !self.enabled {
            return;
        }
        let mut inner = self.lock();
        let name = stmt.name.clone();
        if inner.map.insert(name.clone(), stmt).is_some() {
            inner.touch(&name);
        } else {
            inner.order.push_back(name);
            inner.evict_if_needed();
        }
    }

    pub(crate) fn remove(&self, name: &str) -> Option<PreparedStatement> {
        let mut inner = self.lock();
        let removed = inner.map.remove(name);
        if removed.is_some() {
            inner.remove_from_order(name);
        }
        removed
    }

    pub(crate) fn clear(&self) {
        let mut inner = self.lock();
        inner.map.clear();
        inner.order.clear();
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.lock().map.len()
    }
}

impl StatementCacheInner {
    fn touch(&mut self, key: &str) {
        if let Some(pos) = self.order.iter().position(|k| k.as_str() == key) {
            if let Some(k) = self.order.remove(pos) {
                self.order.push_back(k);
            }
        }
    }

    fn remove_from_order(&mut self, key: &str) {
        if let Some(pos) = self.order.iter().position(|k| k.as_str() == key) {
            let _ = self.order.remove(pos);
        }
    }

    fn evict_if_needed(&mut self) {
        while self.map.len() > self.capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            let _ = self.map.remove(&oldest);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stmt(name: &str) -> PreparedStatement {
        PreparedStatement {
            name: name.to_string(),
            sql: format!("SELECT '{name}'"),
        }
    }

    fn cache(capacity: usize) -> StatementCache {
        StatementCache::new(&StatementCacheConfig {
            enabled: true,
            capacity,
        })
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let cache = cache(2);
        cache.insert(stmt("a_select1"));
        cache.insert(stmt("b_select1"));
        assert!(cache.get("a_select1").is_some());
        cache.insert(stmt("c_select1"));

        assert_eq!(cache.len(), 2);
        assert!(cache.get("a_select1").is_some());
        assert!(cache.get("b_select1").is_none());
        assert!(cache.get("c_select1").is_some());
    }

    #[test]
    fn test_reinsert_replaces_statement() {
        let cache = cache(4);
        cache.insert(stmt("users_update"));
        cache.insert(PreparedStatement {
            name: "users_update".into(),
            sql: "UPDATE users SET a=$1".into(),
        });
        assert_eq!(cache.len(), 1);
        assert_eq!(
            cache.get("users_update").map(|s| s.sql),
            Some("UPDATE users SET a=$1".to_string())
        );
    }

    #[test]
    fn test_disabled_cache_never_hits() {
        let cache = StatementCache::new(&StatementCacheConfig {
            enabled: false,
            capacity: 8,
        });
        cache.insert(stmt("x_insert"));
        assert!(cache.get("x_insert").is_none());
    }

    #[test]
    fn test_remove_and_clear() {
        let cache = cache(4);
        cache.insert(stmt("a"));
        cache.insert(stmt("b"));
        assert!(cache.remove("a").is_some());
        assert_eq!(cache.len(), 1);
        cache.clear();
        assert_eq!(cache.len(), 0);
    }
}
