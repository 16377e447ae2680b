//! The Worker Pool (§4.D): a fixed set of tiered slots handed out to dispatched tasks.
//!
//! Grounded on the teacher's `Arc<Mutex<HashMap<..>>>` slot-tracking idiom shared by
//! `services/circuit_breaker.rs` and `infrastructure/substrates/registry.rs`.

use std::sync::Mutex;

use crate::domain::models::TaskId;

/// A single worker slot, bound to one model tier.
#[derive(Debug, Clone)]
pub struct WorkerSlot {
    /// Slot index, stable for the lifetime of the pool.
    pub index: usize,
    /// Model tier this slot is configured for (e.g. `"small"`, `"large"`).
    pub tier: String,
}

struct SlotState {
    slot: WorkerSlot,
    held_by: Option<TaskId>,
}

/// A fixed-size set of tiered slots (§4.D).
pub struct WorkerPool {
    slots: Mutex<Vec<SlotState>>,
}

impl WorkerPool {
    /// Construct a pool from `(tier, count)` pairs, e.g. `[("small", 3), ("large", 1)]`.
    #[must_use]
    pub fn new(tiers: impl IntoIterator<Item = (String, usize)>) -> Self {
        let mut slots = Vec::new();
        let mut index = 0;
        for (tier, count) in tiers {
            for _ in 0..count {
                slots.push(SlotState { slot: WorkerSlot { index, tier: tier.clone() }, held_by: None });
                index += 1;
            }
        }
        Self { slots: Mutex::new(slots) }
    }

    /// Acquire an idle slot, preferring one matching `required_tier` if given;
    /// falls back to any idle slot if no exact-tier slot is free. Non-blocking:
    /// returns `None` immediately if no slot is available (§4.D).
    #[tracing::instrument(skip(self))]
    pub fn acquire(&self, task_id: TaskId, required_tier: Option<&str>) -> Option<WorkerSlot> {
        let mut slots = self.slots.lock().unwrap_or_else(std::sync::PoisonError::into_inner);

        if let Some(tier) = required_tier {
            if let Some(entry) = slots.iter_mut().find(|s| s.held_by.is_none() && s.slot.tier == tier) {
                entry.held_by = Some(task_id);
                return Some(entry.slot.clone());
            }
        }
        let entry = slots.iter_mut().find(|s| s.held_by.is_none())?;
        entry.held_by = Some(task_id);
        Some(entry.slot.clone())
    }

    /// Release a slot, making it available again. A no-op if the slot was already idle.
    pub fn release(&self, slot_index: usize) {
        let mut slots = self.slots.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(entry) = slots.get_mut(slot_index) {
            entry.held_by = None;
        }
    }

    /// Task ids currently held by a slot, fed to the queue's stale-dispatch
    /// reconciler as `activeTaskIds` (§4.C.10, §4.D).
    #[must_use]
    pub fn active_task_ids(&self) -> std::collections::HashSet<TaskId> {
        let slots = self.slots.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        slots.iter().filter_map(|s| s.held_by.clone()).collect()
    }

    /// Total number of slots.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.lock().unwrap_or_else(std::sync::PoisonError::into_inner).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_prefers_matching_tier() {
        let pool = WorkerPool::new([("small".to_string(), 1), ("large".to_string(), 1)]);
        let slot = pool.acquire(TaskId::normalize("1"), Some("large")).unwrap();
        assert_eq!(slot.tier, "large");
    }

    #[test]
    fn acquire_returns_none_when_saturated() {
        let pool = WorkerPool::new([("small".to_string(), 1)]);
        pool.acquire(TaskId::normalize("1"), None).unwrap();
        assert!(pool.acquire(TaskId::normalize("2"), None).is_none());
    }

    #[test]
    fn release_frees_the_slot_for_reuse() {
        let pool = WorkerPool::new([("small".to_string(), 1)]);
        let slot = pool.acquire(TaskId::normalize("1"), None).unwrap();
        pool.release(slot.index);
        assert!(pool.acquire(TaskId::normalize("2"), None).is_some());
    }

    #[test]
    fn active_task_ids_reflects_held_slots() {
        let pool = WorkerPool::new([("small".to_string(), 2)]);
        pool.acquire(TaskId::normalize("1"), None).unwrap();
        let active = pool.active_task_ids();
        assert_eq!(active.len(), 1);
        assert!(active.contains(&TaskId::normalize("1")));
    }
}
