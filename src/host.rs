//! The view-side collaborator the registry drives.
//!
//! Everything visual is delegated here: mount points, view attachment,
//! visibility and animation playback. The registry only tracks the flags.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::component::{ComponentId, ContainerId};
use crate::transaction::Transit;

/// An animation the registry asks the host to play on a component's view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnimationRequest {
    pub component: ComponentId,
    pub container: Option<ContainerId>,
    pub anim: Option<String>,
    pub transit: Transit,
    /// `true` for enter animations, `false` for exit.
    pub enter: bool,
}

/// View host. Every method has a do-nothing default.
pub trait Host: Send {
    /// Whether a mount point with this id exists.
    fn has_container(&self, _container: ContainerId) -> bool {
        true
    }

    fn attach_view(&mut self, _component: ComponentId, _container: Option<ContainerId>) {}

    fn detach_view(&mut self, _component: ComponentId, _container: Option<ContainerId>) {}

    fn set_view_visible(&mut self, _component: ComponentId, _visible: bool) {}

    /// Start an animation. Returning `true` for an exit animation holds the
    /// component at CREATED until `finish_animation` is reported.
    fn start_animation(&mut self, _request: &AnimationRequest) -> bool {
        false
    }

    fn cancel_animation(&mut self, _component: ComponentId) {}

    fn set_modal_visible(&mut self, _component: ComponentId, _visible: bool) {}
}

/// Host shared by a registry and every child registry below it.
pub type SharedHost = Arc<Mutex<dyn Host>>;

/// A host that accepts every container and plays no animations.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullHost;

impl Host for NullHost {}

impl NullHost {
    pub fn shared() -> SharedHost {
        Arc::new(Mutex::new(NullHost))
    }
}
