#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::plan::Plan;
use crate::transform::TransformSpec;

/// Admission mode controlling what enters the plan cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheAdmissionPolicy {
    Disabled,
    /// Only composite plans, whose compilation walks the selector more than
    /// once, are kept; least recently used entries are evicted first.
    #[default]
    CostWeightedLru,
    AlwaysInsert,
}

/// Control-plane configuration for plan caching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanCacheConfig {
    pub capacity: usize,
    /// Plans needing more scratch than this are never cached.
    pub max_working_set_bytes: usize,
    pub admission_policy: CacheAdmissionPolicy,
}

impl Default for PlanCacheConfig {
    fn default() -> Self {
        Self {
            capacity: 128,
            max_working_set_bytes: 64 * 1024 * 1024,
            admission_policy: CacheAdmissionPolicy::CostWeightedLru,
        }
    }
}

impl PlanCacheConfig {
    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    #[must_use]
    pub fn with_max_working_set_bytes(mut self, bytes: usize) -> Self {
        self.max_working_set_bytes = bytes;
        self
    }

    #[must_use]
    pub fn with_admission_policy(mut self, policy: CacheAdmissionPolicy) -> Self {
        self.admission_policy = policy;
        self
    }

    /// Whether `plan` may enter a cache with this configuration.
    #[must_use]
    pub fn admits(&self, plan: &Plan) -> bool {
        if self.capacity == 0 || plan.scratch_bytes() > self.max_working_set_bytes {
            return false;
        }
        match self.admission_policy {
            CacheAdmissionPolicy::Disabled => false,
            CacheAdmissionPolicy::CostWeightedLru => !plan.root().is_leaf(),
            CacheAdmissionPolicy::AlwaysInsert => true,
        }
    }
}

/// Storage interface to decouple plan creation from cache implementation details.
pub trait PlanCacheBackend: Send {
    fn lookup(&mut self, spec: &TransformSpec) -> Option<Arc<Plan>>;
    /// Returns true when the plan was admitted.
    fn store(&mut self, plan: Arc<Plan>) -> bool;
    /// Drop the entry holding the plan with `plan_id`, if any.
    fn evict(&mut self, plan_id: &str) -> bool;
    fn config(&self) -> &PlanCacheConfig;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    fn clear(&mut self);
}

#[derive(Debug)]
struct Entry {
    plan: Arc<Plan>,
    last_used: u64,
}

/// Bounded least-recently-used cache keyed by the full transform description.
#[derive(Debug, Default)]
pub struct LruPlanCache {
    config: PlanCacheConfig,
    entries: HashMap<TransformSpec, Entry>,
    tick: u64,
}

impl LruPlanCache {
    #[must_use]
    pub fn new(config: PlanCacheConfig) -> Self {
        Self {
            config,
            entries: HashMap::new(),
            tick: 0,
        }
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_used)
            .map(|(spec, _)| spec.clone());
        if let Some(spec) = oldest {
            self.entries.remove(&spec);
        }
    }
}

impl PlanCacheBackend for LruPlanCache {
    fn lookup(&mut self, spec: &TransformSpec) -> Option<Arc<Plan>> {
        let tick = self.next_tick();
        let entry = self.entries.get_mut(spec)?;
        entry.last_used = tick;
        Some(Arc::clone(&entry.plan))
    }

    fn store(&mut self, plan: Arc<Plan>) -> bool {
        if !self.config.admits(&plan) {
            return false;
        }
        let spec = plan.spec().clone();
        if !self.entries.contains_key(&spec) {
            while self.entries.len() >= self.config.capacity {
                self.evict_oldest();
            }
        }
        let last_used = self.next_tick();
        self.entries.insert(spec, Entry { plan, last_used });
        true
    }

    fn evict(&mut self, plan_id: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.plan.id() != plan_id);
        self.entries.len() != before
    }

    fn config(&self) -> &PlanCacheConfig {
        &self.config
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn clear(&mut self) {
        self.entries.clear();
    }
}
