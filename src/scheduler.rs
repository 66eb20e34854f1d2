//! Deferred drain scheduling.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::component::RegistryId;

/// Posts "drain registry R" callbacks to the owning thread.
pub trait Scheduler: Send + Sync {
    fn post(&self, registry: RegistryId);

    fn cancel(&self, registry: RegistryId);
}

/// In-process run queue. Posting an already queued registry is a no-op.
#[derive(Debug, Default)]
pub struct Looper {
    queue: Mutex<VecDeque<RegistryId>>,
}

impl Looper {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Take the oldest queued callback.
    pub fn next(&self) -> Option<RegistryId> {
        self.queue.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    pub fn is_scheduled(&self, registry: RegistryId) -> bool {
        self.queue.lock().contains(&registry)
    }
}

impl Scheduler for Looper {
    fn post(&self, registry: RegistryId) {
        let mut queue = self.queue.lock();
        if !queue.contains(&registry) {
            queue.push_back(registry);
        }
    }

    fn cancel(&self, registry: RegistryId) {
        self.queue.lock().retain(|r| *r != registry);
    }
}
