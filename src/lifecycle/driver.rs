//! Moves components between lifecycle stages one step at a time.

use tracing::{debug, trace};

use crate::component::{ComponentCore, ComponentId, Hook, LifecycleState};
use crate::error::{ManagerError, Result};
use crate::host::AnimationRequest;
use crate::lifecycle::LifecycleEvent;
use crate::manager::ComponentManager;
use crate::transaction::Transit;

/// Clamp a requested stage by membership, removal, deferred start and the
/// component's ceiling.
fn clamp_target(core: &ComponentCore, requested: LifecycleState) -> LifecycleState {
    let mut target = requested;
    if (!core.added || core.detached) && target > LifecycleState::Created {
        target = LifecycleState::Created;
    }
    if core.removing && target > core.state {
        target = if core.state == LifecycleState::Initializing && core.is_in_back_stack() {
            // Created so that it can be saved with the back stack.
            LifecycleState::Created
        } else {
            core.state
        };
    }
    if core.defer_start && core.state < LifecycleState::Started && target > LifecycleState::ViewReady
    {
        target = LifecycleState::ViewReady;
    }
    target.min(core.max_state)
}

impl ComponentManager {
    /// Walk `id` towards `new_state`, clamped by its flags.
    ///
    /// With `keep_active` the component stays in the active set even when
    /// it drops to INITIALIZING.
    pub(crate) fn move_to_state(
        &mut self,
        id: ComponentId,
        new_state: LifecycleState,
        keep_active: bool,
    ) -> Result<()> {
        let Some(core) = self.core(id) else {
            return Ok(());
        };
        let target = clamp_target(core, new_state);

        if core.state <= target {
            if core.animating_away {
                // Moving back up: give up on the exit animation and settle
                // where it would have left the component first.
                let after = core.state_after_animating;
                self.cancel_exit_animation(id);
                self.move_to_state(id, after, true)?;
            }
            self.move_up(id, target)
        } else {
            self.move_down(id, target, keep_active)
        }
    }

    fn move_up(&mut self, id: ComponentId, target: LifecycleState) -> Result<()> {
        while let Some(state) = self.core(id).map(|c| c.state) {
            if state >= target {
                break;
            }
            match state {
                LifecycleState::Initializing => self.enter_created(id)?,
                LifecycleState::Created => self.enter_view_ready(id)?,
                LifecycleState::ViewReady => self.enter_started(id)?,
                LifecycleState::Started => self.enter_resumed(id)?,
                LifecycleState::Resumed => break,
            }
        }
        Ok(())
    }

    fn move_down(&mut self, id: ComponentId, target: LifecycleState, keep_active: bool) -> Result<()> {
        while let Some(state) = self.core(id).map(|c| c.state) {
            if state <= target {
                break;
            }
            match state {
                LifecycleState::Resumed => self.exit_resumed(id)?,
                LifecycleState::Started => self.exit_started(id)?,
                LifecycleState::ViewReady => self.exit_view_ready(id, target)?,
                LifecycleState::Created => {
                    self.exit_created(id, target, keep_active)?;
                    break;
                }
                LifecycleState::Initializing => break,
            }
        }
        Ok(())
    }

    fn run_hook(&mut self, id: ComponentId, hook: Hook) -> Result<()> {
        match self.components.get_mut(&id) {
            Some(slot) => slot.component.invoke(hook),
            None => Ok(()),
        }
    }

    pub(crate) fn notify(&self, id: ComponentId, event: LifecycleEvent) {
        if let Some(slot) = self.components.get(&id) {
            self.observers
                .dispatch(id, &slot.component.core.kind, event, false);
        }
    }

    /// Forward a registry-level call to the component's nested registry.
    fn with_children(
        &mut self,
        id: ComponentId,
        f: impl FnOnce(&mut ComponentManager) -> Result<()>,
    ) -> Result<()> {
        match self
            .components
            .get_mut(&id)
            .and_then(|slot| slot.component.children.as_deref_mut())
        {
            Some(children) => f(children),
            None => Ok(()),
        }
    }

    fn set_state(&mut self, id: ComponentId, state: LifecycleState) {
        if let Some(core) = self.core_mut(id) {
            core.state = state;
        }
    }

    fn trace_step(&self, id: ComponentId, step: &'static str) {
        if self.config.debug_logging {
            debug!(registry = %self.id, component = ?id, step, "lifecycle step");
        }
    }

    fn enter_created(&mut self, id: ComponentId) -> Result<()> {
        self.trace_step(id, "moveto created");
        let Some(core) = self.core(id) else {
            return Ok(());
        };
        let target = core.target;
        let is_created = core.is_created;

        // The target must be initialized before this component relies on it.
        if let Some(target) = target {
            let target_state = self
                .active_core(target)
                .map(|c| c.state)
                .ok_or(ManagerError::TargetNotInRegistry {
                    component: id,
                    target,
                })?;
            if target_state < LifecycleState::Created {
                self.move_to_state(target, LifecycleState::Created, true)?;
            }
        }

        self.notify(id, LifecycleEvent::PreAttached);
        self.run_hook(id, Hook::Attach)?;
        self.notify(id, LifecycleEvent::Attached);

        if !is_created {
            self.notify(id, LifecycleEvent::PreCreated);
            self.run_hook(id, Hook::Create)?;
            if let Some(core) = self.core_mut(id) {
                core.is_created = true;
            }
            self.with_children(id, |children| children.dispatch_create())?;
            self.notify(id, LifecycleEvent::Created);
        }
        self.set_state(id, LifecycleState::Created);
        Ok(())
    }

    fn enter_view_ready(&mut self, id: ComponentId) -> Result<()> {
        self.trace_step(id, "moveto view_ready");
        let Some(core) = self.core(id) else {
            return Ok(());
        };
        let container = core.container;
        let hidden = core.hidden;

        if let Some(container) = container {
            if !self.host.lock().has_container(container) {
                return Err(ManagerError::ContainerNotFound {
                    component: id,
                    container,
                });
            }
        }

        let has_view = match self.components.get_mut(&id) {
            Some(slot) => slot.component.create_view(),
            None => return Ok(()),
        };
        if has_view {
            {
                let mut host = self.host.lock();
                host.attach_view(id, container);
                if hidden {
                    host.set_view_visible(id, false);
                }
            }
            if let Some(slot) = self.components.get_mut(&id) {
                slot.component.core.has_view = true;
                slot.component.view_created();
            }
            self.notify(id, LifecycleEvent::ViewCreated);
            if let Some(core) = self.core_mut(id) {
                // Only a visible, mounted view runs an enter animation.
                core.newly_added = container.is_some() && !core.hidden;
            }
        }

        self.run_hook(id, Hook::ViewReady)?;
        self.with_children(id, |children| children.dispatch_view_ready())?;
        self.notify(id, LifecycleEvent::ViewReady);
        self.set_state(id, LifecycleState::ViewReady);
        Ok(())
    }

    fn enter_started(&mut self, id: ComponentId) -> Result<()> {
        self.trace_step(id, "moveto started");
        self.run_hook(id, Hook::Start)?;
        self.set_modal_surface(id, true);
        self.with_children(id, |children| children.dispatch_start())?;
        self.notify(id, LifecycleEvent::Started);
        self.set_state(id, LifecycleState::Started);
        Ok(())
    }

    fn enter_resumed(&mut self, id: ComponentId) -> Result<()> {
        self.trace_step(id, "moveto resumed");
        self.run_hook(id, Hook::Resume)?;
        self.with_children(id, |children| children.dispatch_resume())?;
        self.notify(id, LifecycleEvent::Resumed);
        if let Some(core) = self.core_mut(id) {
            core.state = LifecycleState::Resumed;
            core.saved_state = None;
        }
        Ok(())
    }

    fn exit_resumed(&mut self, id: ComponentId) -> Result<()> {
        self.trace_step(id, "movefrom resumed");
        self.with_children(id, |children| children.dispatch_pause())?;
        self.run_hook(id, Hook::Pause)?;
        self.notify(id, LifecycleEvent::Paused);
        self.set_state(id, LifecycleState::Started);
        Ok(())
    }

    fn exit_started(&mut self, id: ComponentId) -> Result<()> {
        self.trace_step(id, "movefrom started");
        self.with_children(id, |children| children.dispatch_stop())?;
        self.run_hook(id, Hook::Stop)?;
        self.set_modal_surface(id, false);
        self.notify(id, LifecycleEvent::Stopped);
        self.set_state(id, LifecycleState::ViewReady);
        Ok(())
    }

    fn exit_view_ready(&mut self, id: ComponentId, target: LifecycleState) -> Result<()> {
        self.trace_step(id, "movefrom view_ready");
        self.with_children(id, |children| children.dispatch_destroy_view())?;
        self.run_hook(id, Hook::DestroyView)?;
        self.notify(id, LifecycleEvent::ViewDestroyed);
        self.set_modal_surface(id, false);

        let animate_allowed = self.cur_state > LifecycleState::Initializing && !self.destroyed;
        let host = self.host.clone();
        let Some(core) = self.core_mut(id) else {
            return Ok(());
        };
        if core.has_view {
            if core.container.is_some()
                && animate_allowed
                && !core.hidden
                && !core.skip_exit_animation
                && (core.next_anim.is_some() || core.next_transit != Transit::None)
            {
                let request = AnimationRequest {
                    component: id,
                    container: core.container,
                    anim: core.next_anim.clone(),
                    transit: core.next_transit,
                    enter: false,
                };
                if host.lock().start_animation(&request) {
                    core.animating_away = true;
                    core.state_after_animating = target;
                }
            }
            host.lock().detach_view(id, core.container);
        }
        core.has_view = false;
        core.held_invisible = false;
        core.skip_exit_animation = false;
        core.state = LifecycleState::Created;
        Ok(())
    }

    fn exit_created(
        &mut self,
        id: ComponentId,
        target: LifecycleState,
        keep_active: bool,
    ) -> Result<()> {
        if self.destroyed && self.core(id).is_some_and(|c| c.animating_away) {
            // Nothing will report the animation finished once the registry is gone.
            self.cancel_exit_animation(id);
        }
        let state_saved = self.state_saved;
        let Some(core) = self.core_mut(id) else {
            return Ok(());
        };
        if core.animating_away {
            trace!(component = ?id, target = target.as_str(), "holding at created until animation ends");
            core.state_after_animating = target;
            return Ok(());
        }

        self.trace_step(id, "movefrom created");
        let Some(core) = self.core(id) else {
            return Ok(());
        };
        let being_removed = core.removing && !core.is_in_back_stack();
        let should_destroy = !core.retain_instance || !state_saved;
        let destroy = being_removed || should_destroy;

        if destroy {
            self.with_children(id, |children| children.dispatch_destroy())?;
            self.run_hook(id, Hook::Destroy)?;
            if let Some(core) = self.core_mut(id) {
                core.is_created = false;
            }
            self.notify(id, LifecycleEvent::Destroyed);
        }
        self.set_state(id, LifecycleState::Initializing);

        self.run_hook(id, Hook::Detach)?;
        self.notify(id, LifecycleEvent::Detached);
        if let Some(slot) = self.components.get_mut(&id) {
            if let Some(mut children) = slot.component.children.take() {
                if !children.destroyed {
                    children.dispatch_destroy()?;
                }
            }
        }

        if !keep_active && destroy {
            self.make_inactive(id);
        }
        Ok(())
    }

    pub(crate) fn set_modal_surface(&mut self, id: ComponentId, visible: bool) {
        let host = self.host.clone();
        let Some(slot) = self.components.get_mut(&id) else {
            return;
        };
        if let Some(modal) = slot.component.variant.modal_mut() {
            if modal.surface_visible != visible {
                modal.surface_visible = visible;
                host.lock().set_modal_visible(id, visible);
            }
        }
    }

    fn cancel_exit_animation(&mut self, id: ComponentId) {
        let host = self.host.clone();
        if let Some(core) = self.core_mut(id) {
            if core.animating_away {
                core.animating_away = false;
                host.lock().cancel_animation(id);
            }
        }
    }

    /// Settle one component at the registry's stage, or lower if it is
    /// being removed.
    pub(crate) fn move_to_expected_state(&mut self, id: ComponentId) -> Result<()> {
        if self.active_core(id).is_none() {
            return Ok(());
        }
        let mut next = self.cur_state;
        if let Some(core) = self.core(id) {
            if core.removing {
                let floor = if core.is_in_back_stack() {
                    LifecycleState::Created
                } else {
                    LifecycleState::Initializing
                };
                next = next.min(floor);
            }
        }
        self.move_to_state(id, next, false)?;

        let host = self.host.clone();
        let Some(core) = self.core_mut(id) else {
            return Ok(());
        };
        if core.state == LifecycleState::Initializing
            && core.removing
            && !core.is_in_back_stack()
            && !core.animating_away
        {
            // Added and removed before it was ever created.
            self.make_inactive(id);
            return Ok(());
        }
        if core.has_view && core.newly_added && core.container.is_some() {
            if core.held_invisible {
                core.held_invisible = false;
                host.lock().set_view_visible(id, true);
            }
            core.newly_added = false;
            if core.next_anim.is_some() || core.next_transit != Transit::None {
                let request = AnimationRequest {
                    component: id,
                    container: core.container,
                    anim: core.next_anim.clone(),
                    transit: core.next_transit,
                    enter: true,
                };
                host.lock().start_animation(&request);
            }
        }
        if core.hidden_changed {
            self.complete_show_hide(id);
        }
        Ok(())
    }

    /// Apply a pending hide/show to the host and tell the component.
    pub(crate) fn complete_show_hide(&mut self, id: ComponentId) {
        let host = self.host.clone();
        let Some(slot) = self.components.get_mut(&id) else {
            return;
        };
        let core = &mut slot.component.core;
        if core.has_view {
            if core.next_anim.is_some() || core.next_transit != Transit::None {
                let request = AnimationRequest {
                    component: id,
                    container: core.container,
                    anim: core.next_anim.clone(),
                    transit: core.next_transit,
                    enter: !core.hidden,
                };
                host.lock().start_animation(&request);
            }
            host.lock().set_view_visible(id, !core.hidden);
        }
        core.hidden_changed = false;
        let hidden = core.hidden;
        slot.component.hidden_changed(hidden);
    }

    /// Move the registry to `new_state` and settle every member.
    pub(crate) fn move_to_state_all(&mut self, new_state: LifecycleState, always: bool) -> Result<()> {
        if !always && new_state == self.cur_state {
            return Ok(());
        }
        self.cur_state = new_state;

        for id in self.added.clone() {
            self.move_to_expected_state(id)?;
        }

        // Removed and detached members are not in the mounted list.
        let stragglers: Vec<ComponentId> = self
            .active_ids()
            .filter(|id| {
                self.core(*id)
                    .is_some_and(|c| (c.removing || c.detached) && !c.newly_added)
            })
            .collect();
        for id in stragglers {
            self.move_to_expected_state(id)?;
        }
        Ok(())
    }

    /// Release a deferred start and settle the component, or mark it for
    /// the end of the current drain.
    pub(crate) fn perform_pending_deferred_start(&mut self, id: ComponentId) -> Result<()> {
        let Some(core) = self.core_mut(id) else {
            return Ok(());
        };
        if !core.defer_start {
            return Ok(());
        }
        core.defer_start = false;
        if self.executing {
            self.have_pending_deferred_start = true;
            return Ok(());
        }
        let state = self.cur_state;
        self.move_to_state(id, state, false)
    }

    /// Settle components whose deferred start was released mid-drain.
    pub(crate) fn do_pending_deferred_start(&mut self) -> Result<()> {
        if !self.have_pending_deferred_start {
            return Ok(());
        }
        self.have_pending_deferred_start = false;
        let state = self.cur_state;
        let released: Vec<ComponentId> = self
            .added
            .iter()
            .copied()
            .filter(|id| self.core(*id).is_some_and(|c| !c.defer_start && c.state < state))
            .collect();
        for id in released {
            self.move_to_state(id, state, false)?;
        }
        Ok(())
    }

    /// Report that the exit animation of `id` ended.
    ///
    /// The component continues to the stage it was heading for when the
    /// animation started.
    pub fn finish_animation(&mut self, id: ComponentId) -> Result<()> {
        let Some(core) = self.core_mut(id) else {
            return Err(ManagerError::ComponentNotOwned { component: id });
        };
        if !core.animating_away {
            return Ok(());
        }
        core.animating_away = false;
        let after = core.state_after_animating;
        self.move_to_state(id, after, false)?;
        if !self.executing {
            self.burp_active();
        }
        Ok(())
    }

    /// End every running exit animation immediately.
    pub(crate) fn end_animating_away(&mut self) -> Result<()> {
        let animating: Vec<ComponentId> = self
            .active_ids()
            .filter(|id| self.core(*id).is_some_and(|c| c.animating_away))
            .collect();
        for id in animating {
            let after = self.core(id).map(|c| c.state_after_animating);
            self.cancel_exit_animation(id);
            if let Some(after) = after {
                self.move_to_state(id, after, false)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn core() -> ComponentCore {
        ComponentCore::new(ComponentId::generate(), "test".into())
    }

    #[test]
    fn test_unmounted_component_clamped_to_created() {
        let c = core();
        assert_eq!(clamp_target(&c, LifecycleState::Resumed), LifecycleState::Created);
    }

    #[test]
    fn test_removing_component_cannot_move_up() {
        let mut c = core();
        c.added = true;
        c.removing = true;
        c.state = LifecycleState::Created;
        assert_eq!(clamp_target(&c, LifecycleState::Resumed), LifecycleState::Created);

        c.state = LifecycleState::Initializing;
        c.back_stack_nesting = 1;
        assert_eq!(clamp_target(&c, LifecycleState::Resumed), LifecycleState::Created);
    }

    #[test]
    fn test_deferred_start_holds_at_view_ready() {
        let mut c = core();
        c.added = true;
        c.defer_start = true;
        assert_eq!(clamp_target(&c, LifecycleState::Resumed), LifecycleState::ViewReady);

        c.state = LifecycleState::Started;
        assert_eq!(clamp_target(&c, LifecycleState::Resumed), LifecycleState::Resumed);
    }

    #[test]
    fn test_ceiling_clamps_target() {
        let mut c = core();
        c.added = true;
        c.max_state = LifecycleState::Created;
        assert_eq!(clamp_target(&c, LifecycleState::Resumed), LifecycleState::Created);
        assert_eq!(clamp_target(&c, LifecycleState::Initializing), LifecycleState::Initializing);

        c.max_state = LifecycleState::Started;
        assert_eq!(clamp_target(&c, LifecycleState::Resumed), LifecycleState::Started);
        assert_eq!(clamp_target(&c, LifecycleState::ViewReady), LifecycleState::ViewReady);
    }
}
