use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::future::{BoxFuture, Shared};
use scriptup_backend::ScriptId;

use crate::worker::CheckOutcome;

/// A pending check that any number of callers can await.
pub type SharedCheck = Shared<BoxFuture<'static, CheckOutcome>>;

/// Pending checks by script id, at most one per script.
#[derive(Clone, Default)]
pub struct InFlightRegistry {
    jobs: Arc<Mutex<HashMap<ScriptId, SharedCheck>>>,
}

impl InFlightRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ScriptId, SharedCheck>> {
        self.jobs
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Return the pending check for `id`, or register the one built by
    /// `launch`. The flag tells whether `launch` was called.
    pub fn get_or_launch<F>(&self, id: ScriptId, launch: F) -> (SharedCheck, bool)
    where
        F: FnOnce() -> SharedCheck,
    {
        let mut jobs = self.lock();
        if let Some(existing) = jobs.get(&id) {
            return (existing.clone(), false);
        }
        let job = launch();
        jobs.insert(id, job.clone());
        (job, true)
    }

    #[must_use]
    pub fn contains(&self, id: ScriptId) -> bool {
        self.lock().contains_key(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Slot that removes `id` from the registry when dropped.
    #[must_use]
    pub fn release_on_drop(&self, id: ScriptId) -> InFlightSlot {
        InFlightSlot {
            registry: self.clone(),
            id,
        }
    }
}

pub struct InFlightSlot {
    registry: InFlightRegistry,
    id: ScriptId,
}

impl Drop for InFlightSlot {
    fn drop(&mut self) {
        self.registry.lock().remove(&self.id);
    }
}
