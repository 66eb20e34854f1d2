use serde_json::Value;

use crate::component::{ComponentId, ContainerId, LifecycleState};
use crate::transaction::{RecordId, Transit};

/// Plain data half of a component: identity, membership flags and driver
/// bookkeeping. Hooks see it through [`crate::component::HookCx`].
#[derive(Debug, Clone)]
pub(crate) struct ComponentCore {
    pub(crate) id: ComponentId,
    pub(crate) kind: String,
    pub(crate) tag: Option<String>,
    pub(crate) container: Option<ContainerId>,

    pub(crate) state: LifecycleState,
    pub(crate) max_state: LifecycleState,

    pub(crate) added: bool,
    pub(crate) removing: bool,
    pub(crate) detached: bool,
    pub(crate) hidden: bool,
    pub(crate) hidden_changed: bool,
    pub(crate) back_stack_nesting: u32,

    pub(crate) target: Option<ComponentId>,
    pub(crate) target_request_code: i32,
    pub(crate) retain_instance: bool,

    pub(crate) user_visible_hint: bool,
    pub(crate) defer_start: bool,

    pub(crate) postponed: bool,
    pub(crate) postpone_listener: Option<RecordId>,

    pub(crate) has_view: bool,
    pub(crate) newly_added: bool,
    pub(crate) held_invisible: bool,
    pub(crate) skip_exit_animation: bool,

    pub(crate) animating_away: bool,
    pub(crate) state_after_animating: LifecycleState,
    pub(crate) next_anim: Option<String>,
    pub(crate) next_transit: Transit,

    pub(crate) is_created: bool,
    pub(crate) saved_state: Option<Value>,
}

impl ComponentCore {
    pub(crate) fn new(id: ComponentId, kind: String) -> Self {
        Self {
            id,
            kind,
            tag: None,
            container: None,
            state: LifecycleState::Initializing,
            max_state: LifecycleState::Resumed,
            added: false,
            removing: false,
            detached: false,
            hidden: false,
            hidden_changed: false,
            back_stack_nesting: 0,
            target: None,
            target_request_code: 0,
            retain_instance: false,
            user_visible_hint: true,
            defer_start: false,
            postponed: false,
            postpone_listener: None,
            has_view: false,
            newly_added: false,
            held_invisible: false,
            skip_exit_animation: false,
            animating_away: false,
            state_after_animating: LifecycleState::Initializing,
            next_anim: None,
            next_transit: Transit::None,
            is_created: false,
            saved_state: None,
        }
    }

    pub(crate) fn is_in_back_stack(&self) -> bool {
        self.back_stack_nesting > 0
    }

    /// Visible, mounted and asked to delay its enter transition.
    pub(crate) fn is_postponed_entry(&self) -> bool {
        self.added && self.has_view && !self.detached && !self.hidden && self.postponed
    }

    /// Reset membership after the component leaves the active set.
    ///
    /// Identity, kind, target and retention survive; the component can be
    /// mounted again by a later transaction.
    pub(crate) fn reset_membership(&mut self) {
        self.added = false;
        self.removing = false;
        self.detached = false;
        self.hidden = false;
        self.hidden_changed = false;
        self.back_stack_nesting = 0;
        self.container = None;
        self.tag = None;
        self.newly_added = false;
        self.held_invisible = false;
        self.skip_exit_animation = false;
    }
}
