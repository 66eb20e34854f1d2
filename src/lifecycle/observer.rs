//! Lifecycle observers with recursive fan-out to ancestor registries.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::component::ComponentId;

/// Lifecycle notifications delivered to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    PreAttached,
    Attached,
    PreCreated,
    Created,
    ViewCreated,
    ViewReady,
    Started,
    Resumed,
    Paused,
    Stopped,
    SaveState,
    ViewDestroyed,
    Destroyed,
    Detached,
}

/// Receives lifecycle events for components of a registry.
pub trait LifecycleCallbacks: Send + Sync {
    fn on_event(&self, component: ComponentId, kind: &str, event: LifecycleEvent);
}

struct Registration {
    callbacks: Arc<dyn LifecycleCallbacks>,
    recursive: bool,
}

/// Observers registered on one registry.
///
/// A child registry links to its parent's list so that recursive
/// observers higher up see events from nested components.
#[derive(Default)]
pub(crate) struct LifecycleObservers {
    parent: Option<Arc<LifecycleObservers>>,
    entries: Mutex<Vec<Registration>>,
}

impl LifecycleObservers {
    pub(crate) fn child_of(parent: &Arc<LifecycleObservers>) -> Self {
        Self {
            parent: Some(Arc::clone(parent)),
            entries: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn register(&self, callbacks: Arc<dyn LifecycleCallbacks>, recursive: bool) {
        self.entries.lock().push(Registration {
            callbacks,
            recursive,
        });
    }

    /// Drop the first registration of `callbacks`. Returns whether one was found.
    pub(crate) fn unregister(&self, callbacks: &Arc<dyn LifecycleCallbacks>) -> bool {
        let mut entries = self.entries.lock();
        match entries
            .iter()
            .position(|r| Arc::ptr_eq(&r.callbacks, callbacks))
        {
            Some(pos) => {
                entries.remove(pos);
                true
            }
            None => false,
        }
    }

    pub(crate) fn dispatch(
        &self,
        component: ComponentId,
        kind: &str,
        event: LifecycleEvent,
        only_recursive: bool,
    ) {
        if let Some(parent) = &self.parent {
            parent.dispatch(component, kind, event, true);
        }
        // Snapshot so callbacks may register or unregister observers.
        let targets: Vec<Arc<dyn LifecycleCallbacks>> = self
            .entries
            .lock()
            .iter()
            .filter(|r| !only_recursive || r.recursive)
            .map(|r| Arc::clone(&r.callbacks))
            .collect();
        for callbacks in targets {
            callbacks.on_event(component, kind, event);
        }
    }
}
