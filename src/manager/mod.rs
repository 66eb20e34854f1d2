//! The component registry.
//!
//! A [`ComponentManager`] owns its components, the committed transaction
//! records, the back stack and the pending queue. Nested registries hang off
//! the component that owns them and are reached by walking down the tree.

mod executor;
mod membership;
mod modal;
mod postpone;
mod saved_state;

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::back_stack::{BackStack, BackStackEntry, BackStackId};
use crate::component::{
    Component, ComponentCore, ComponentHooks, ComponentId, ComponentVariant, ContainerId,
    LifecycleState, ModalPresenter, RegistryId, Slot, SlotStatus,
};
use crate::config::ManagerConfig;
use crate::error::{ManagerError, Result};
use crate::host::SharedHost;
use crate::lifecycle::{LifecycleCallbacks, LifecycleObservers};
use crate::requests::PendingRequests;
use crate::scheduler::{Looper, Scheduler};
use crate::transaction::{Record, RecordId, Transaction};

pub(crate) use executor::PendingAction;
pub(crate) use postpone::PostponedTransaction;
pub use saved_state::{
    ComponentFactory, FactoryRegistry, SavedBackStackEntry, SavedComponent, SavedRegistryState,
};

/// Handle returned by [`ComponentManager::add_back_stack_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type BackStackListener = Box<dyn FnMut(usize)>;

pub struct ComponentManager {
    pub(crate) id: RegistryId,
    pub(crate) config: ManagerConfig,
    pub(crate) host: SharedHost,
    pub(crate) scheduler: Arc<dyn Scheduler>,
    pub(crate) observers: Arc<LifecycleObservers>,

    pub(crate) components: IndexMap<ComponentId, Slot>,
    pub(crate) added: Vec<ComponentId>,
    pub(crate) primary: Option<ComponentId>,

    pub(crate) records: HashMap<RecordId, Record>,
    pub(crate) next_record_id: u64,
    pub(crate) back_stack: BackStack,
    pub(crate) pending: Vec<PendingAction>,
    pub(crate) postponed: Vec<PostponedTransaction>,

    pub(crate) cur_state: LifecycleState,
    pub(crate) executing: bool,
    pub(crate) state_saved: bool,
    pub(crate) stopped: bool,
    pub(crate) destroyed: bool,
    pub(crate) torn_down: bool,
    pub(crate) have_pending_deferred_start: bool,

    back_stack_listeners: Vec<(ListenerId, BackStackListener)>,
    next_listener_id: u64,
    requests: PendingRequests,
}

impl ComponentManager {
    pub fn new(config: ManagerConfig, host: SharedHost, scheduler: Arc<dyn Scheduler>) -> Self {
        Self::with_observers(config, host, scheduler, Arc::new(LifecycleObservers::default()))
    }

    fn with_observers(
        config: ManagerConfig,
        host: SharedHost,
        scheduler: Arc<dyn Scheduler>,
        observers: Arc<LifecycleObservers>,
    ) -> Self {
        let requests = PendingRequests::new(config.max_pending_requests);
        Self {
            id: RegistryId::next(),
            config,
            host,
            scheduler,
            observers,
            components: IndexMap::new(),
            added: Vec::new(),
            primary: None,
            records: HashMap::new(),
            next_record_id: 1,
            back_stack: BackStack::default(),
            pending: Vec::new(),
            postponed: Vec::new(),
            cur_state: LifecycleState::Initializing,
            executing: false,
            state_saved: false,
            stopped: false,
            destroyed: false,
            torn_down: false,
            have_pending_deferred_start: false,
            back_stack_listeners: Vec::new(),
            next_listener_id: 1,
            requests,
        }
    }

    /// A registry nested under one of this registry's components.
    pub(crate) fn new_child(&self) -> Self {
        Self::with_observers(
            self.config.clone(),
            Arc::clone(&self.host),
            Arc::clone(&self.scheduler),
            Arc::new(LifecycleObservers::child_of(&self.observers)),
        )
    }

    pub fn id(&self) -> RegistryId {
        self.id
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Stage every member is settled towards.
    pub fn state(&self) -> LifecycleState {
        self.cur_state
    }

    /// Saved or stopped: commits without state loss are rejected.
    pub fn is_state_saved(&self) -> bool {
        self.state_saved || self.stopped
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    pub fn is_executing(&self) -> bool {
        self.executing
    }

    // --- component lookup ---------------------------------------------------

    pub(crate) fn core(&self, id: ComponentId) -> Option<&ComponentCore> {
        self.components.get(&id).map(|slot| &slot.component.core)
    }

    pub(crate) fn core_mut(&mut self, id: ComponentId) -> Option<&mut ComponentCore> {
        self.components
            .get_mut(&id)
            .map(|slot| &mut slot.component.core)
    }

    /// Core of a component in the active set.
    pub(crate) fn active_core(&self, id: ComponentId) -> Option<&ComponentCore> {
        self.components
            .get(&id)
            .filter(|slot| slot.status == SlotStatus::Active)
            .map(|slot| &slot.component.core)
    }

    pub(crate) fn active_ids(&self) -> impl Iterator<Item = ComponentId> + '_ {
        self.components
            .iter()
            .filter(|(_, slot)| slot.status == SlotStatus::Active)
            .map(|(id, _)| *id)
    }

    pub(crate) fn container_of(&self, id: ComponentId) -> Option<ContainerId> {
        self.core(id).and_then(|c| c.container)
    }

    /// Register a new component. It joins the active set once a committed
    /// operation first touches it.
    pub fn create(&mut self, kind: &str, hooks: impl ComponentHooks + 'static) -> ComponentId {
        self.insert_component(kind, ComponentVariant::Plain, Box::new(hooks))
    }

    /// Register a component that presents a modal surface while started.
    pub fn create_modal(
        &mut self,
        kind: &str,
        hooks: impl ComponentHooks + 'static,
        cancelable: bool,
    ) -> ComponentId {
        let variant = ComponentVariant::Modal(ModalPresenter::new(cancelable));
        self.insert_component(kind, variant, Box::new(hooks))
    }

    fn insert_component(
        &mut self,
        kind: &str,
        variant: ComponentVariant,
        behavior: Box<dyn ComponentHooks>,
    ) -> ComponentId {
        let id = ComponentId::generate();
        let component = Component::new(id, kind.to_string(), variant, behavior);
        self.components.insert(
            id,
            Slot {
                component,
                status: SlotStatus::Fresh,
            },
        );
        if self.config.debug_logging {
            debug!(registry = %self.id, component = ?id, kind, "component created");
        }
        id
    }

    /// Any component this registry still knows about.
    pub fn component(&self, id: ComponentId) -> Option<&Component> {
        self.components.get(&id).map(|slot| &slot.component)
    }

    /// Components in the active set, in activation order.
    pub fn active_components(&self) -> impl Iterator<Item = &Component> + '_ {
        self.components
            .values()
            .filter(|slot| slot.status == SlotStatus::Active)
            .map(|slot| &slot.component)
    }

    /// Mounted components in mount order.
    pub fn added(&self) -> &[ComponentId] {
        &self.added
    }

    /// Topmost component mounted in `container`, falling back to any active one.
    pub fn find_by_id(&self, container: ContainerId) -> Option<ComponentId> {
        self.find(|core| core.container == Some(container))
    }

    pub fn find_by_tag(&self, tag: &str) -> Option<ComponentId> {
        self.find(|core| core.tag.as_deref() == Some(tag))
    }

    fn find(&self, predicate: impl Fn(&ComponentCore) -> bool) -> Option<ComponentId> {
        self.added
            .iter()
            .rev()
            .copied()
            .find(|id| self.core(*id).is_some_and(&predicate))
            .or_else(|| {
                self.active_ids()
                    .find(|id| self.core(*id).is_some_and(&predicate))
            })
    }

    pub fn primary(&self) -> Option<ComponentId> {
        self.primary.filter(|id| self.active_core(*id).is_some())
    }

    // --- transactions and back stack --------------------------------------

    pub fn begin_transaction(&mut self) -> Transaction {
        Transaction::new(self.id, self.alloc_record_id())
    }

    pub(crate) fn alloc_record_id(&mut self) -> RecordId {
        let id = RecordId(self.next_record_id);
        self.next_record_id += 1;
        id
    }

    pub fn back_stack_entry_count(&self) -> usize {
        self.back_stack.len()
    }

    pub fn back_stack_entry_at(&self, position: usize) -> Option<BackStackEntry> {
        let record = self.records.get(&self.back_stack.get(position)?)?;
        Some(BackStackEntry {
            id: record.index.map(BackStackId::from_index),
            name: record.name.clone(),
        })
    }

    pub fn add_back_stack_listener(&mut self, listener: impl FnMut(usize) + 'static) -> ListenerId {
        let id = ListenerId(self.next_listener_id);
        self.next_listener_id += 1;
        self.back_stack_listeners.push((id, Box::new(listener)));
        id
    }

    pub fn remove_back_stack_listener(&mut self, id: ListenerId) -> bool {
        let before = self.back_stack_listeners.len();
        self.back_stack_listeners.retain(|(l, _)| *l != id);
        before != self.back_stack_listeners.len()
    }

    pub(crate) fn report_back_stack_changed(&mut self) {
        let count = self.back_stack.len();
        for (_, listener) in self.back_stack_listeners.iter_mut() {
            listener(count);
        }
    }

    // --- observers ----------------------------------------------------------

    /// Observe lifecycle events. With `recursive`, events from nested
    /// registries are delivered too.
    pub fn register_lifecycle_callbacks(&self, callbacks: Arc<dyn LifecycleCallbacks>, recursive: bool) {
        self.observers.register(callbacks, recursive);
    }

    pub fn unregister_lifecycle_callbacks(&self, callbacks: &Arc<dyn LifecycleCallbacks>) -> bool {
        self.observers.unregister(callbacks)
    }

    // --- per-component settings --------------------------------------------

    fn owned_core_mut(&mut self, id: ComponentId) -> Result<&mut ComponentCore> {
        self.core_mut(id)
            .ok_or(ManagerError::ComponentNotOwned { component: id })
    }

    /// Link `component` to `target` for result delivery.
    ///
    /// Both must belong to this registry, and the link may not close a cycle.
    pub fn set_target(
        &mut self,
        component: ComponentId,
        target: Option<ComponentId>,
        request_code: i32,
    ) -> Result<()> {
        if !self.components.contains_key(&component) {
            return Err(ManagerError::ComponentNotOwned { component });
        }
        if let Some(target) = target {
            if !self.components.contains_key(&target) {
                return Err(ManagerError::TargetNotInRegistry { component, target });
            }
            let mut check = Some(target);
            let mut steps = 0;
            while let Some(current) = check {
                if current == component {
                    return Err(ManagerError::TargetCycle { component, target });
                }
                steps += 1;
                if steps > self.components.len() {
                    break;
                }
                check = self.core(current).and_then(|c| c.target);
            }
        }
        let core = self.owned_core_mut(component)?;
        core.target = target;
        core.target_request_code = request_code;
        Ok(())
    }

    /// Resolve a component's target. Stale links resolve to `None`.
    pub fn target_of(&self, component: ComponentId) -> Option<ComponentId> {
        self.core(component)?
            .target
            .filter(|target| self.components.contains_key(target))
    }

    /// Mark whether the component is visible to the user. Hidden components
    /// are held at VIEW_READY until the hint turns true.
    pub fn set_user_visible_hint(&mut self, id: ComponentId, visible: bool) -> Result<()> {
        let active = self.active_core(id).is_some();
        let core = self.owned_core_mut(id)?;
        let release = !core.user_visible_hint
            && visible
            && core.state < LifecycleState::Started
            && active
            && core.added
            && core.is_created;
        if release {
            self.perform_pending_deferred_start(id)?;
        }
        let core = self.owned_core_mut(id)?;
        core.user_visible_hint = visible;
        core.defer_start = core.state < LifecycleState::Started && !visible;
        Ok(())
    }

    pub fn set_retain_instance(&mut self, id: ComponentId, retain: bool) -> Result<()> {
        self.owned_core_mut(id)?.retain_instance = retain;
        Ok(())
    }

    /// Report that a postponed component is ready to run its enter
    /// transition.
    pub fn start_postponed_enter(&mut self, id: ComponentId) -> Result<()> {
        let core = self.owned_core_mut(id)?;
        core.postponed = false;
        if let Some(record) = core.postpone_listener.take() {
            self.on_start_enter_transition(record);
        }
        Ok(())
    }

    // --- nested registries ---------------------------------------------------

    /// The registry nested under `id`, created on first use.
    ///
    /// A new nested registry catches up to the owning component's stage.
    pub fn child_registry_mut(&mut self, id: ComponentId) -> Result<&mut ComponentManager> {
        let needs_child = self
            .components
            .get(&id)
            .ok_or(ManagerError::ComponentNotOwned { component: id })?
            .component
            .children
            .is_none();
        if needs_child {
            let mut child = self.new_child();
            let state = self.core(id).map_or(LifecycleState::Initializing, |c| c.state);
            match state {
                LifecycleState::Resumed => child.dispatch_resume()?,
                LifecycleState::Started => child.dispatch_start()?,
                LifecycleState::ViewReady => child.dispatch_view_ready()?,
                LifecycleState::Created => child.dispatch_create()?,
                LifecycleState::Initializing => {}
            }
            if let Some(slot) = self.components.get_mut(&id) {
                slot.component.children = Some(Box::new(child));
            }
        }
        self.components
            .get_mut(&id)
            .and_then(|slot| slot.component.children.as_deref_mut())
            .ok_or(ManagerError::ComponentNotOwned { component: id })
    }

    /// Find the registry with `registry` as its id in this subtree.
    pub fn registry_mut(&mut self, registry: RegistryId) -> Option<&mut ComponentManager> {
        if self.id == registry {
            return Some(self);
        }
        self.components
            .values_mut()
            .filter_map(|slot| slot.component.children.as_deref_mut())
            .find_map(|child| child.registry_mut(registry))
    }

    // --- scheduling -------------------------------------------------------------

    /// Run a drain callback posted for `registry`.
    ///
    /// Returns `false` when no registry in this tree has that id anymore.
    pub fn handle_scheduled(&mut self, registry: RegistryId) -> Result<bool> {
        match self.registry_mut(registry) {
            Some(target) if target.torn_down => Ok(false),
            Some(target) => {
                target.exec_pending_actions()?;
                Ok(true)
            }
            None => {
                warn!(%registry, "dropping drain for unknown registry");
                Ok(false)
            }
        }
    }

    /// Run queued drains until the looper is empty. Returns how many ran.
    pub fn pump(&mut self, looper: &Looper) -> Result<usize> {
        let mut ran = 0;
        while let Some(registry) = looper.next() {
            if self.handle_scheduled(registry)? {
                ran += 1;
            }
        }
        Ok(ran)
    }

    // --- registry lifecycle ---------------------------------------------------

    pub fn dispatch_create(&mut self) -> Result<()> {
        self.state_saved = false;
        self.stopped = false;
        self.dispatch_state_change(LifecycleState::Created)
    }

    pub fn dispatch_view_ready(&mut self) -> Result<()> {
        self.state_saved = false;
        self.stopped = false;
        self.dispatch_state_change(LifecycleState::ViewReady)
    }

    pub fn dispatch_start(&mut self) -> Result<()> {
        self.state_saved = false;
        self.stopped = false;
        self.dispatch_state_change(LifecycleState::Started)
    }

    pub fn dispatch_resume(&mut self) -> Result<()> {
        self.state_saved = false;
        self.stopped = false;
        self.dispatch_state_change(LifecycleState::Resumed)
    }

    pub fn dispatch_pause(&mut self) -> Result<()> {
        self.dispatch_state_change(LifecycleState::Started)
    }

    pub fn dispatch_stop(&mut self) -> Result<()> {
        self.stopped = true;
        self.dispatch_state_change(LifecycleState::ViewReady)
    }

    pub fn dispatch_destroy_view(&mut self) -> Result<()> {
        self.dispatch_state_change(LifecycleState::Created)
    }

    /// Tear the registry down. Afterwards commits are rejected, or dropped
    /// when they allow state loss.
    pub fn dispatch_destroy(&mut self) -> Result<()> {
        self.destroyed = true;
        self.exec_pending_actions()?;
        self.dispatch_state_change(LifecycleState::Initializing)?;
        self.torn_down = true;
        self.scheduler.cancel(self.id);
        Ok(())
    }

    fn dispatch_state_change(&mut self, next: LifecycleState) -> Result<()> {
        if self.config.debug_logging {
            debug!(registry = %self.id, state = next.as_str(), "dispatch state change");
        }
        self.executing = true;
        let result = self.move_to_state_all(next, false);
        self.executing = false;
        result?;
        self.exec_pending_actions()?;
        Ok(())
    }

    /// Clear the saved/stopped marks, here and in every mounted child registry.
    pub fn note_state_not_saved(&mut self) {
        self.state_saved = false;
        self.stopped = false;
        for id in self.added.clone() {
            if let Some(children) = self
                .components
                .get_mut(&id)
                .and_then(|slot| slot.component.children.as_deref_mut())
            {
                children.note_state_not_saved();
            }
        }
    }

    // --- correlated requests ---------------------------------------------------

    /// Reserve a request slot for `component` and return the packed code.
    pub fn start_request(&mut self, component: ComponentId, code: u32) -> Result<u32> {
        if !self.components.contains_key(&component) {
            return Err(ManagerError::ComponentNotOwned { component });
        }
        self.requests.register(component, code)
    }

    /// Resolve a packed result code to the component that asked and its
    /// original code. Each packed code resolves once.
    pub fn dispatch_result(&mut self, packed: u32) -> Option<(ComponentId, u16)> {
        let (component, code) = self.requests.resolve(packed)?;
        if !self.components.contains_key(&component) {
            warn!(component = ?component, code, "result for a component that is gone");
            return None;
        }
        Some((component, code))
    }

    pub fn pending_request_count(&self) -> usize {
        self.requests.len()
    }
}

impl std::fmt::Debug for ComponentManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentManager")
            .field("id", &self.id)
            .field("state", &self.cur_state)
            .field("components", &self.components.len())
            .field("added", &self.added)
            .field("back_stack", &self.back_stack.len())
            .field("pending", &self.pending.len())
            .field("postponed", &self.postponed.len())
            .finish()
    }
}
