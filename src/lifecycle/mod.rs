//! Lifecycle state machine and observer fan-out.

mod driver;
mod observer;

pub use observer::{LifecycleCallbacks, LifecycleEvent};
pub(crate) use observer::LifecycleObservers;
