//! Plan cache
//!
//! Maps record type identity to its shared [`Plan`]. Uses DashMap for
//! lock-free reads on the hot path.
//!
//! Builds run outside any map lock. Two threads missing at once both build;
//! the first insert wins and both callers get that same `Arc`. Failed builds
//! are never stored, so a broken type is re-analysed (and fails again) on
//! every call.

use std::any::TypeId;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::trace;

use crate::plan::Plan;

#[derive(Debug, Default)]
pub struct PlanCache {
    plans: DashMap<TypeId, Arc<Plan>>,
}

impl PlanCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: TypeId) -> Option<Arc<Plan>> {
        self.plans.get(&id).map(|plan| Arc::clone(&plan))
    }

    /// Cached plan for `id`, or the result of `build` stored on success.
    pub fn get_or_try_insert_with<E>(
        &self,
        id: TypeId,
        build: impl FnOnce() -> Result<Plan, E>,
    ) -> Result<Arc<Plan>, E> {
        if let Some(plan) = self.get(id) {
            trace!(record = plan.type_name(), "plan cache hit");
            return Ok(plan);
        }

        let built = Arc::new(build()?);
        // Atomic insert: a racing builder may have stored first.
        let stored = self.plans.entry(id).or_insert(built);
        Ok(Arc::clone(stored.value()))
    }

    pub fn len(&self) -> usize {
        self.plans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }
}
