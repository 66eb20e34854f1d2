//! Components: one node in the managed tree.
//!
//! A [`Component`] pairs a plain data record (membership flags, lifecycle
//! stage, driver bookkeeping) with boxed behaviour and, optionally, a nested
//! child registry it owns.

mod core;
mod hooks;
mod id;
mod modal;
mod state;

pub(crate) use self::core::ComponentCore;
pub use hooks::{ComponentHooks, Hook, HookCx, NoopHooks};
pub use id::{ComponentId, ContainerId, RegistryId};
pub use modal::{ComponentVariant, ModalPresenter};
pub use state::LifecycleState;

use serde_json::Value;

use crate::error::{ManagerError, Result};
use crate::manager::ComponentManager;

/// A managed component.
pub struct Component {
    pub(crate) core: ComponentCore,
    pub(crate) variant: ComponentVariant,
    pub(crate) behavior: Box<dyn ComponentHooks>,
    pub(crate) children: Option<Box<ComponentManager>>,
}

impl Component {
    pub(crate) fn new(
        id: ComponentId,
        kind: String,
        variant: ComponentVariant,
        behavior: Box<dyn ComponentHooks>,
    ) -> Self {
        Self {
            core: ComponentCore::new(id, kind),
            variant,
            behavior,
            children: None,
        }
    }

    pub fn id(&self) -> ComponentId {
        self.core.id
    }

    pub fn kind(&self) -> &str {
        &self.core.kind
    }

    pub fn tag(&self) -> Option<&str> {
        self.core.tag.as_deref()
    }

    pub fn container(&self) -> Option<ContainerId> {
        self.core.container
    }

    pub fn state(&self) -> LifecycleState {
        self.core.state
    }

    pub fn max_state(&self) -> LifecycleState {
        self.core.max_state
    }

    pub fn is_added(&self) -> bool {
        self.core.added
    }

    pub fn is_removing(&self) -> bool {
        self.core.removing
    }

    pub fn is_detached(&self) -> bool {
        self.core.detached
    }

    pub fn is_hidden(&self) -> bool {
        self.core.hidden
    }

    pub fn back_stack_nesting(&self) -> u32 {
        self.core.back_stack_nesting
    }

    pub fn is_in_back_stack(&self) -> bool {
        self.core.is_in_back_stack()
    }

    /// Raw target link; resolve it through the registry.
    pub fn target(&self) -> Option<ComponentId> {
        self.core.target
    }

    pub fn target_request_code(&self) -> i32 {
        self.core.target_request_code
    }

    pub fn retains_instance(&self) -> bool {
        self.core.retain_instance
    }

    pub fn user_visible_hint(&self) -> bool {
        self.core.user_visible_hint
    }

    pub fn is_start_deferred(&self) -> bool {
        self.core.defer_start
    }

    pub fn is_postponed(&self) -> bool {
        self.core.postponed
    }

    pub fn has_view(&self) -> bool {
        self.core.has_view
    }

    pub fn is_animating_away(&self) -> bool {
        self.core.animating_away
    }

    pub fn variant(&self) -> &ComponentVariant {
        &self.variant
    }

    pub fn modal(&self) -> Option<&ModalPresenter> {
        self.variant.modal()
    }

    /// Nested registry, if one was ever requested.
    pub fn child_registry(&self) -> Option<&ComponentManager> {
        self.children.as_deref()
    }

    /// Run a contract hook and check its acknowledgement.
    pub(crate) fn invoke(&mut self, hook: Hook) -> Result<()> {
        let id = self.core.id;
        let behavior = &mut self.behavior;
        let mut cx = HookCx::new(&mut self.core, Some(hook));
        match hook {
            Hook::Attach => behavior.on_attach(&mut cx),
            Hook::Create => behavior.on_create(&mut cx),
            Hook::ViewReady => behavior.on_view_ready(&mut cx),
            Hook::Start => behavior.on_start(&mut cx),
            Hook::Resume => behavior.on_resume(&mut cx),
            Hook::Pause => behavior.on_pause(&mut cx),
            Hook::Stop => behavior.on_stop(&mut cx),
            Hook::DestroyView => behavior.on_destroy_view(&mut cx),
            Hook::Destroy => behavior.on_destroy(&mut cx),
            Hook::Detach => behavior.on_detach(&mut cx),
        }
        if !cx.acknowledged() {
            return Err(ManagerError::HookNotAcknowledged {
                component: id,
                hook,
            });
        }
        Ok(())
    }

    pub(crate) fn create_view(&mut self) -> bool {
        let behavior = &mut self.behavior;
        let mut cx = HookCx::new(&mut self.core, None);
        behavior.on_create_view(&mut cx)
    }

    pub(crate) fn view_created(&mut self) {
        let behavior = &mut self.behavior;
        let mut cx = HookCx::new(&mut self.core, None);
        behavior.on_view_created(&mut cx);
    }

    pub(crate) fn hidden_changed(&mut self, hidden: bool) {
        self.behavior.on_hidden_changed(hidden);
    }

    pub(crate) fn save_state(&mut self) -> Option<Value> {
        self.behavior.save_state()
    }
}

impl std::fmt::Debug for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Component")
            .field("id", &self.core.id)
            .field("kind", &self.core.kind)
            .field("tag", &self.core.tag)
            .field("container", &self.core.container)
            .field("state", &self.core.state)
            .field("added", &self.core.added)
            .field("removing", &self.core.removing)
            .field("detached", &self.core.detached)
            .field("hidden", &self.core.hidden)
            .finish()
    }
}

/// Registry residency of a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SlotStatus {
    /// Outside the active set: never executed by an operation, or swept
    /// after leaving it.
    Fresh,
    /// In the active set.
    Active,
    /// Left the active set; swept once nothing references it.
    Tombstoned,
}

pub(crate) struct Slot {
    pub(crate) component: Component,
    pub(crate) status: SlotStatus,
}
