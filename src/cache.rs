//! Read-through primary-key cache with delayed invalidation.
//!
//! The cache fronts single-key lookups only. Each entity gets its own shard
//! keyed by primary key; capacity eviction is least-recently-used. A
//! mutating operation whose name matches the configured filter schedules
//! invalidation of that entity's whole shard after a configurable delay (to
//! tolerate eventually-consistent replicas) rather than immediately. The
//! delay is served by a worker thread fed over a crossbeam channel.
//!
//! This layer is a best-effort convenience, not a correctness mechanism:
//! stale reads are possible inside the delay window.

use crate::error::GantryError;
use crate::value::ValueTuple;
use crossbeam_channel::{unbounded, Sender};
use regex::Regex;
use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Cache tuning, usually taken from
/// [`EngineConfig`](crate::config::EngineConfig).
#[derive(Debug, Clone)]
pub struct CacheSettings {
    /// Entries per entity shard before LRU eviction kicks in.
    pub capacity: usize,
    /// How long after a mutating operation the shard is dropped.
    pub invalidation_delay: Duration,
    /// Operation-name patterns that trigger invalidation.
    pub invalidate_on: Vec<String>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            capacity: 1024,
            invalidation_delay: Duration::ZERO,
            invalidate_on: default_invalidation_patterns(),
        }
    }
}

/// The default mutating-operation filter.
pub fn default_invalidation_patterns() -> Vec<String> {
    ["^save", "^insert", "^update", "^delete", "^upsert", "^execute"]
        .iter()
        .map(ToString::to_string)
        .collect()
}

#[derive(Default)]
struct Shard {
    entries: HashMap<ValueTuple, Arc<dyn Any + Send + Sync>>,
    /// Recency order, least recent first.
    order: VecDeque<ValueTuple>,
}

impl Shard {
    fn touch(&mut self, key: &ValueTuple) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            self.order.remove(pos);
        }
        self.order.push_back(key.clone());
    }

    fn evict_to(&mut self, capacity: usize) {
        while self.entries.len() > capacity {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.entries.remove(&oldest);
                }
                None => break,
            }
        }
    }
}

type Shards = Arc<Mutex<HashMap<String, Shard>>>;

enum InvalidationOrder {
    Entity { entity: String, at: Instant },
    All { at: Instant },
}

/// Per-engine entity cache.
pub struct EntityCache {
    shards: Shards,
    capacity: usize,
    delay: Duration,
    filter: Vec<Regex>,
    worker: Sender<InvalidationOrder>,
}

impl EntityCache {
    /// Build the cache and start its invalidation worker. Fails when a
    /// filter pattern does not compile.
    pub fn new(settings: CacheSettings) -> Result<Self, GantryError> {
        let mut filter = Vec::with_capacity(settings.invalidate_on.len());
        for pattern in &settings.invalidate_on {
            let regex = Regex::new(pattern).map_err(|err| {
                GantryError::Configuration(format!(
                    "cache invalidation pattern `{pattern}` does not compile: {err}"
                ))
            })?;
            filter.push(regex);
        }

        let shards: Shards = Arc::new(Mutex::new(HashMap::new()));
        let (tx, rx) = unbounded::<InvalidationOrder>();
        let worker_shards = Arc::clone(&shards);
        thread::Builder::new()
            .name("gantry-cache-invalidator".to_string())
            .spawn(move || {
                while let Ok(order) = rx.recv() {
                    let (entity, at) = match order {
                        InvalidationOrder::Entity { entity, at } => (Some(entity), at),
                        InvalidationOrder::All { at } => (None, at),
                    };
                    let now = Instant::now();
                    if at > now {
                        thread::sleep(at - now);
                    }
                    let mut shards = worker_shards.lock().expect("cache lock");
                    match entity {
                        Some(entity) => {
                            shards.remove(&entity);
                        }
                        None => shards.clear(),
                    }
                }
            })
            .map_err(|err| {
                GantryError::Configuration(format!("cache worker failed to start: {err}"))
            })?;

        Ok(Self {
            shards,
            capacity: settings.capacity.max(1),
            delay: settings.invalidation_delay,
            filter,
            worker: tx,
        })
    }

    /// Look up a cached entity snapshot by primary key.
    pub fn get<R: Clone + Send + Sync + 'static>(
        &self,
        entity: &str,
        key: &ValueTuple,
    ) -> Option<R> {
        let mut shards = self.shards.lock().expect("cache lock");
        let shard = shards.get_mut(entity)?;
        let entry = shard.entries.get(key)?.clone();
        let record = entry.downcast_ref::<R>()?.clone();
        shard.touch(key);
        Some(record)
    }

    /// Store an entity snapshot, evicting least-recently-used entries past
    /// capacity.
    pub fn put<R: Clone + Send + Sync + 'static>(&self, entity: &str, key: ValueTuple, record: R) {
        let mut shards = self.shards.lock().expect("cache lock");
        let shard = shards.entry(entity.to_string()).or_default();
        shard.entries.insert(key.clone(), Arc::new(record));
        shard.touch(&key);
        shard.evict_to(self.capacity);
    }

    /// Report a mutating operation on one entity. Schedules shard
    /// invalidation when the operation name matches the filter.
    pub fn note_mutation(&self, entity: &str, operation: &str) {
        if !self.matches(operation) {
            return;
        }
        if self.delay.is_zero() {
            self.shards.lock().expect("cache lock").remove(entity);
            return;
        }
        log::debug!(
            "scheduling cache invalidation of `{entity}` in {:?} after `{operation}`",
            self.delay
        );
        let _ = self.worker.send(InvalidationOrder::Entity {
            entity: entity.to_string(),
            at: Instant::now() + self.delay,
        });
    }

    /// Report a mutating operation with no entity scope (SQL templates).
    /// Matching operations drop every shard.
    pub fn note_global_mutation(&self, operation: &str) {
        if !self.matches(operation) {
            return;
        }
        if self.delay.is_zero() {
            self.shards.lock().expect("cache lock").clear();
            return;
        }
        let _ = self.worker.send(InvalidationOrder::All {
            at: Instant::now() + self.delay,
        });
    }

    /// Drop one entity's shard immediately.
    pub fn invalidate_now(&self, entity: &str) {
        self.shards.lock().expect("cache lock").remove(entity);
    }

    /// Number of cached entries for an entity.
    pub fn len(&self, entity: &str) -> usize {
        self.shards
            .lock()
            .expect("cache lock")
            .get(entity)
            .map_or(0, |shard| shard.entries.len())
    }

    /// True when no entries are cached for an entity.
    pub fn is_empty(&self, entity: &str) -> bool {
        self.len(entity) == 0
    }

    fn matches(&self, operation: &str) -> bool {
        self.filter.iter().any(|regex| regex.is_match(operation))
    }
}
