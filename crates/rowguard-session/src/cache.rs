//! Decision cache
//!
//! Partial decisions are cached per actor, action, resource, engine and
//! policy revision, so a policy reload makes every earlier entry unreachable.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use moka::sync::Cache;

use rowguard_policy::{Actor, Constraint, PolicyEngine};

use crate::config::{AuthorizationConfig, DEFAULT_CACHE_MAX_CAPACITY, DEFAULT_CACHE_TTL_SECONDS};

#[derive(Clone, Debug)]
pub struct DecisionCache {
    cache: Cache<u64, Constraint>,
}

impl Default for DecisionCache {
    fn default() -> Self {
        Self::new(
            DEFAULT_CACHE_MAX_CAPACITY,
            Duration::from_secs(DEFAULT_CACHE_TTL_SECONDS),
        )
    }
}

impl DecisionCache {
    pub fn new(max_capacity: u64, ttl: Duration) -> Self {
        Self {
            cache: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    pub fn from_config(config: &AuthorizationConfig) -> Self {
        Self::new(config.cache_max_capacity(), config.cache_ttl())
    }

    pub fn key(actor: &Actor, action: &str, resource: &str, engine: &dyn PolicyEngine) -> u64 {
        let mut hasher = DefaultHasher::new();
        actor.cache_key().hash(&mut hasher);
        action.hash(&mut hasher);
        resource.hash(&mut hasher);
        engine.instance_id().hash(&mut hasher);
        engine.revision().hash(&mut hasher);
        hasher.finish()
    }

    pub fn get(&self, key: u64) -> Option<Constraint> {
        self.cache.get(&key)
    }

    pub fn insert(&self, key: u64, constraint: Constraint) {
        self.cache.insert(key, constraint);
    }

    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }
}
