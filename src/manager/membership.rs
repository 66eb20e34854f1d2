//! Membership mutations applied by executed operations, plus the commit-time
//! checks the transaction builder runs against the registry.

use tracing::debug;

use crate::component::{ComponentId, LifecycleState, RegistryId, SlotStatus};
use crate::error::{ManagerError, Result};
use crate::manager::ComponentManager;
use crate::transaction::{Binding, Record};

impl ComponentManager {
    pub(crate) fn make_active(&mut self, id: ComponentId) {
        if let Some(slot) = self.components.get_mut(&id) {
            if slot.status != SlotStatus::Active {
                slot.status = SlotStatus::Active;
                if self.config.debug_logging {
                    debug!(registry = %self.id, component = ?id, "component active");
                }
            }
        }
    }

    /// Drop `id` from the active set. The slot is swept by [`Self::burp_active`].
    pub(crate) fn make_inactive(&mut self, id: ComponentId) {
        let Some(slot) = self.components.get_mut(&id) else {
            return;
        };
        if slot.status != SlotStatus::Active {
            return;
        }
        slot.status = SlotStatus::Tombstoned;
        slot.component.core.reset_membership();
        if self.config.debug_logging {
            debug!(registry = %self.id, component = ?id, "component inactive");
        }
    }

    /// Sweep tombstoned components that no record references anymore out of
    /// the active set. They stay known to the registry and can be added again.
    pub(crate) fn burp_active(&mut self) {
        let records = &self.records;
        let mut swept = 0;
        for (id, slot) in self.components.iter_mut() {
            if slot.status == SlotStatus::Tombstoned
                && !records.values().any(|record| record.references(*id))
            {
                slot.status = SlotStatus::Fresh;
                swept += 1;
            }
        }
        if swept > 0 && self.config.debug_logging {
            debug!(registry = %self.id, swept, "swept inactive components");
        }
    }

    /// Forget an inactive component for good. Returns `false` while it is
    /// active or some record still references it.
    pub fn discard(&mut self, id: ComponentId) -> bool {
        let releasable = self.components.get(&id).is_some_and(|slot| {
            slot.status == SlotStatus::Fresh
                && !self.records.values().any(|record| record.references(id))
        });
        if releasable {
            self.components.shift_remove(&id);
        }
        releasable
    }

    pub(crate) fn add_component(&mut self, id: ComponentId) -> Result<()> {
        self.make_active(id);
        let Some(core) = self.core(id) else {
            return Err(ManagerError::ComponentNotOwned { component: id });
        };
        if core.detached {
            return Ok(());
        }
        if self.added.contains(&id) {
            return Err(ManagerError::AlreadyAdded(id));
        }
        self.added.push(id);
        if let Some(core) = self.core_mut(id) {
            core.added = true;
            core.removing = false;
            if !core.has_view {
                core.hidden_changed = false;
            }
        }
        Ok(())
    }

    pub(crate) fn remove_component(&mut self, id: ComponentId) {
        let Some(core) = self.core(id) else {
            return;
        };
        let inactive = !core.is_in_back_stack();
        if !core.detached || inactive {
            self.added.retain(|a| *a != id);
            if let Some(core) = self.core_mut(id) {
                core.added = false;
                core.removing = true;
            }
        }
    }

    pub(crate) fn hide_component(&mut self, id: ComponentId) {
        if let Some(core) = self.core_mut(id) {
            if !core.hidden {
                core.hidden = true;
                // Two toggles in one batch cancel out.
                core.hidden_changed = !core.hidden_changed;
            }
        }
    }

    pub(crate) fn show_component(&mut self, id: ComponentId) {
        if let Some(core) = self.core_mut(id) {
            if core.hidden {
                core.hidden = false;
                core.hidden_changed = !core.hidden_changed;
            }
        }
    }

    pub(crate) fn detach_component(&mut self, id: ComponentId) {
        let Some(core) = self.core_mut(id) else {
            return;
        };
        if core.detached {
            return;
        }
        core.detached = true;
        if core.added {
            core.added = false;
            self.added.retain(|a| *a != id);
        }
    }

    pub(crate) fn attach_component(&mut self, id: ComponentId) -> Result<()> {
        let Some(core) = self.core_mut(id) else {
            return Ok(());
        };
        if !core.detached {
            return Ok(());
        }
        core.detached = false;
        if core.added {
            return Ok(());
        }
        if self.added.contains(&id) {
            return Err(ManagerError::AlreadyAdded(id));
        }
        self.added.push(id);
        if let Some(core) = self.core_mut(id) {
            core.added = true;
        }
        Ok(())
    }

    pub(crate) fn set_max_state(&mut self, id: ComponentId, state: LifecycleState) {
        if let Some(core) = self.core_mut(id) {
            core.max_state = state;
        }
    }

    // --- commit-time checks --------------------------------------------------

    /// Every component a record touches must belong to this registry.
    pub(crate) fn check_owned(&self, registry: RegistryId, record: &Record) -> Result<()> {
        for component in record.components() {
            if registry != self.id || !self.components.contains_key(&component) {
                return Err(ManagerError::ComponentNotOwned { component });
            }
        }
        Ok(())
    }

    /// Tags and containers are write-once per component.
    pub(crate) fn check_bindings(&self, bindings: &[Binding]) -> Result<()> {
        for (i, binding) in bindings.iter().enumerate() {
            let earlier = bindings[..i]
                .iter()
                .filter(|b| b.component == binding.component);
            let core = self.core(binding.component);

            let existing_tag = earlier
                .clone()
                .filter_map(|b| b.tag.clone())
                .last()
                .or_else(|| core.and_then(|c| c.tag.clone()));
            if let (Some(existing), Some(requested)) = (existing_tag, &binding.tag) {
                if existing != *requested {
                    return Err(ManagerError::TagConflict {
                        component: binding.component,
                        existing,
                        requested: requested.clone(),
                    });
                }
            }

            let existing_container = earlier
                .filter_map(|b| b.container)
                .last()
                .or_else(|| core.and_then(|c| c.container));
            if let (Some(existing), Some(requested)) = (existing_container, binding.container) {
                if existing != requested {
                    return Err(ManagerError::ContainerConflict {
                        component: binding.component,
                        existing,
                        requested,
                    });
                }
            }
        }
        Ok(())
    }

    pub(crate) fn apply_bindings(&mut self, bindings: &[Binding]) {
        for binding in bindings {
            if let Some(core) = self.core_mut(binding.component) {
                if binding.tag.is_some() {
                    core.tag = binding.tag.clone();
                }
                if binding.container.is_some() {
                    core.container = binding.container;
                }
            }
        }
    }

    /// Remember the ceiling each lifecycle cap replaces so a pop can restore it.
    pub(crate) fn capture_max_states(&self, record: &mut Record) {
        for op in record.ops.iter_mut() {
            if op.cur_max_state.is_none() {
                continue;
            }
            if let Some(core) = op.component.and_then(|id| self.core(id)) {
                op.old_max_state = Some(core.max_state);
            }
        }
    }
}
