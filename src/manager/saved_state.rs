//! Saving and restoring a registry.
//!
//! The saved layout is plain serde data. Behaviour objects are not saved;
//! restore asks a [`ComponentFactory`] to rebuild them from each
//! component's kind.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::back_stack::BackStack;
use crate::component::{
    Component, ComponentHooks, ComponentId, ComponentVariant, ContainerId, LifecycleState, Slot,
    SlotStatus,
};
use crate::error::{ManagerError, Result};
use crate::lifecycle::LifecycleEvent;
use crate::manager::ComponentManager;
use crate::transaction::{Op, Record, Transit};

/// Rebuilds component behaviour from a kind key.
pub trait ComponentFactory {
    fn instantiate(&self, kind: &str) -> Option<Box<dyn ComponentHooks>>;
}

type Maker = Box<dyn Fn() -> Box<dyn ComponentHooks>>;

/// A [`ComponentFactory`] backed by one closure per kind.
#[derive(Default)]
pub struct FactoryRegistry {
    makers: HashMap<String, Maker>,
}

impl FactoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H, F>(&mut self, kind: &str, make: F) -> &mut Self
    where
        H: ComponentHooks + 'static,
        F: Fn() -> H + 'static,
    {
        self.makers
            .insert(kind.to_string(), Box::new(move || Box::new(make())));
        self
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.makers.contains_key(kind)
    }
}

impl ComponentFactory for FactoryRegistry {
    fn instantiate(&self, kind: &str) -> Option<Box<dyn ComponentHooks>> {
        self.makers.get(kind).map(|make| make())
    }
}

impl std::fmt::Debug for FactoryRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FactoryRegistry")
            .field("kinds", &self.makers.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedComponent {
    pub id: ComponentId,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<ContainerId>,
    #[serde(default)]
    pub removing: bool,
    #[serde(default)]
    pub detached: bool,
    #[serde(default)]
    pub hidden: bool,
    pub max_state: LifecycleState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<ComponentId>,
    #[serde(default)]
    pub target_request_code: i32,
    #[serde(default)]
    pub retain_instance: bool,
    pub user_visible_hint: bool,
    #[serde(default)]
    pub variant: ComponentVariant,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Box<SavedRegistryState>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedBackStackEntry {
    pub index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub reordering_allowed: bool,
    #[serde(default)]
    pub transit: Transit,
    pub ops: Vec<Op>,
}

/// Everything needed to rebuild a registry and its nested registries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedRegistryState {
    pub components: Vec<SavedComponent>,
    /// Mounted components in mount order.
    pub added: Vec<ComponentId>,
    pub back_stack: Vec<SavedBackStackEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary: Option<ComponentId>,
    pub next_record_id: u64,
}

impl SavedRegistryState {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl ComponentManager {
    /// Snapshot the registry.
    ///
    /// Postponed transactions are forced, running exit animations end and the
    /// queue is drained first. Afterwards the registry counts as saved and
    /// rejects commits that do not allow state loss.
    pub fn save_state(&mut self) -> Result<SavedRegistryState> {
        self.force_postponed_transactions()?;
        self.end_animating_away()?;
        self.exec_pending_actions()?;
        self.state_saved = true;

        let referenced: Vec<ComponentId> = self
            .back_stack
            .entries()
            .iter()
            .filter_map(|id| self.records.get(id))
            .flat_map(|record| record.components())
            .collect();
        let ids: Vec<ComponentId> = self
            .components
            .iter()
            .filter(|(id, slot)| slot.status == SlotStatus::Active || referenced.contains(*id))
            .map(|(id, _)| *id)
            .collect();

        let mut components = Vec::with_capacity(ids.len());
        for id in ids {
            let target = self.target_of(id);
            let Some(slot) = self.components.get_mut(&id) else {
                continue;
            };
            let created = slot.component.core.state > LifecycleState::Initializing;
            let saved = if created {
                slot.component.save_state()
            } else {
                slot.component.core.saved_state.clone()
            };
            let children = match slot.component.children.as_deref_mut() {
                Some(child) => Some(Box::new(child.save_state()?)),
                None => None,
            };
            let core = &slot.component.core;
            components.push(SavedComponent {
                id,
                kind: core.kind.clone(),
                tag: core.tag.clone(),
                container: core.container,
                removing: core.removing,
                detached: core.detached,
                hidden: core.hidden,
                max_state: core.max_state,
                target,
                target_request_code: core.target_request_code,
                retain_instance: core.retain_instance,
                user_visible_hint: core.user_visible_hint,
                variant: slot.component.variant.clone(),
                saved,
                children,
            });
            if created {
                self.notify(id, LifecycleEvent::SaveState);
            }
        }

        let back_stack = self
            .back_stack
            .entries()
            .iter()
            .filter_map(|id| self.records.get(id))
            .map(|record| SavedBackStackEntry {
                index: record.index,
                name: record.name.clone(),
                reordering_allowed: record.reordering_allowed,
                transit: record.transit,
                ops: record.ops.clone(),
            })
            .collect();

        if self.config.debug_logging {
            debug!(registry = %self.id, components = components.len(), "saved state");
        }
        Ok(SavedRegistryState {
            components,
            added: self.added.clone(),
            back_stack,
            primary: self.primary(),
            next_record_id: self.next_record_id,
        })
    }

    /// Rebuild the registry from `saved`, replacing whatever it held.
    ///
    /// Components come back at INITIALIZING; the next registry dispatch
    /// drives them to the registry's stage.
    pub fn restore_state(
        &mut self,
        saved: &SavedRegistryState,
        factory: &dyn ComponentFactory,
    ) -> Result<()> {
        self.components.clear();
        self.added.clear();
        self.records.clear();
        self.back_stack = BackStack::default();
        self.pending.clear();
        self.postponed.clear();
        self.next_record_id = saved.next_record_id.max(1);

        for sc in &saved.components {
            let behavior = factory
                .instantiate(&sc.kind)
                .ok_or_else(|| ManagerError::UnknownKind(sc.kind.clone()))?;
            let mut component = Component::new(sc.id, sc.kind.clone(), sc.variant.clone(), behavior);
            let core = &mut component.core;
            core.tag = sc.tag.clone();
            core.container = sc.container;
            core.removing = sc.removing;
            core.detached = sc.detached;
            core.hidden = sc.hidden;
            core.max_state = sc.max_state;
            core.target = sc.target;
            core.target_request_code = sc.target_request_code;
            core.retain_instance = sc.retain_instance;
            core.user_visible_hint = sc.user_visible_hint;
            core.saved_state = sc.saved.clone();

            if let Some(child_state) = &sc.children {
                let mut child = self.new_child();
                child.restore_state(child_state, factory)?;
                component.children = Some(Box::new(child));
            }
            self.components.insert(
                sc.id,
                Slot {
                    component,
                    status: SlotStatus::Active,
                },
            );
        }

        for sc in &saved.components {
            if let Some(target) = sc.target {
                if !self.components.contains_key(&target) {
                    return Err(ManagerError::CorruptState(target));
                }
            }
        }

        for id in &saved.added {
            if self.added.contains(id) {
                return Err(ManagerError::AlreadyAdded(*id));
            }
            let core = self
                .core_mut(*id)
                .ok_or(ManagerError::CorruptState(*id))?;
            core.added = true;
            self.added.push(*id);
        }

        for entry in &saved.back_stack {
            if let Some(missing) = entry
                .ops
                .iter()
                .filter_map(|op| op.component)
                .find(|id| !self.components.contains_key(id))
            {
                return Err(ManagerError::CorruptState(missing));
            }
            let id = self.alloc_record_id();
            let record = Record {
                ops: entry.ops.clone(),
                reordering_allowed: entry.reordering_allowed,
                add_to_back_stack: true,
                name: entry.name.clone(),
                index: entry.index,
                transit: entry.transit,
                ..Record::new(id)
            };
            for component in record.components() {
                if let Some(core) = self.core_mut(component) {
                    core.back_stack_nesting += 1;
                }
            }
            if let Some(index) = entry.index {
                self.back_stack.set_index(index, id);
            }
            self.back_stack.push(id);
            self.records.insert(id, record);
        }

        if let Some(primary) = saved.primary {
            if !self.components.contains_key(&primary) {
                return Err(ManagerError::CorruptState(primary));
            }
        }
        self.primary = saved.primary;

        info!(
            registry = %self.id,
            components = self.components.len(),
            back_stack = self.back_stack.len(),
            "restored state"
        );
        Ok(())
    }
}
