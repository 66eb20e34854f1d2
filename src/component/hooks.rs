//! Behaviour attached to a component and the context handed to each hook.

use serde_json::Value;

use crate::component::core::ComponentCore;
use crate::component::{ComponentId, ContainerId, LifecycleState};

/// Lifecycle hooks subject to the call-through contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hook {
    Attach,
    Create,
    ViewReady,
    Start,
    Resume,
    Pause,
    Stop,
    DestroyView,
    Destroy,
    Detach,
}

/// Context passed to every hook.
///
/// Hooks that carry the call-through contract must call
/// [`HookCx::call_through`] before returning; the default trait
/// implementations do exactly that.
pub struct HookCx<'a> {
    core: &'a mut ComponentCore,
    hook: Option<Hook>,
    acknowledged: bool,
}

impl<'a> HookCx<'a> {
    pub(crate) fn new(core: &'a mut ComponentCore, hook: Option<Hook>) -> Self {
        Self {
            core,
            hook,
            acknowledged: false,
        }
    }

    pub(crate) fn acknowledged(&self) -> bool {
        self.acknowledged
    }

    /// Acknowledge that the hook ran.
    pub fn call_through(&mut self) {
        self.acknowledged = true;
    }

    /// The hook currently running, if it is a contract hook.
    pub fn hook(&self) -> Option<Hook> {
        self.hook
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

    /// Stage the component is leaving.
    pub fn state(&self) -> LifecycleState {
        self.core.state
    }

    pub fn is_hidden(&self) -> bool {
        self.core.hidden
    }

    /// State blob captured by the last save, available until the component resumes.
    pub fn saved_state(&self) -> Option<&Value> {
        self.core.saved_state.as_ref()
    }

    /// Delay the enter transition until the registry is told the component is ready.
    pub fn postpone_enter(&mut self) {
        self.core.postponed = true;
    }

    /// Keep the instance alive across a registry teardown that saved state.
    pub fn set_retain_instance(&mut self, retain: bool) {
        self.core.retain_instance = retain;
    }
}

/// Component behaviour.
///
/// Every method has a default that satisfies the call-through contract,
/// so implementors override only what they need, and must keep calling
/// `cx.call_through()` in what they override.
pub trait ComponentHooks {
    fn on_attach(&mut self, cx: &mut HookCx<'_>) {
        cx.call_through();
    }

    fn on_create(&mut self, cx: &mut HookCx<'_>) {
        cx.call_through();
    }

    /// Returns whether the component produces a view.
    fn on_create_view(&mut self, cx: &mut HookCx<'_>) -> bool {
        cx.container().is_some()
    }

    fn on_view_created(&mut self, _cx: &mut HookCx<'_>) {}

    fn on_view_ready(&mut self, cx: &mut HookCx<'_>) {
        cx.call_through();
    }

    fn on_start(&mut self, cx: &mut HookCx<'_>) {
        cx.call_through();
    }

    fn on_resume(&mut self, cx: &mut HookCx<'_>) {
        cx.call_through();
    }

    fn on_pause(&mut self, cx: &mut HookCx<'_>) {
        cx.call_through();
    }

    fn on_stop(&mut self, cx: &mut HookCx<'_>) {
        cx.call_through();
    }

    fn on_destroy_view(&mut self, cx: &mut HookCx<'_>) {
        cx.call_through();
    }

    fn on_destroy(&mut self, cx: &mut HookCx<'_>) {
        cx.call_through();
    }

    fn on_detach(&mut self, cx: &mut HookCx<'_>) {
        cx.call_through();
    }

    fn on_hidden_changed(&mut self, _hidden: bool) {}

    /// Opaque state captured when the registry saves.
    fn save_state(&mut self) -> Option<Value> {
        None
    }
}

/// Behaviour with nothing but the default hooks.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

impl ComponentHooks for NoopHooks {}
