//! A registry of hierarchically composed components driven by transactions.
//!
//! Callers build a [`Transaction`] from a [`ComponentManager`], commit it,
//! and the registry drains committed work on a later scheduled callback:
//! operations are expanded, merged where reordering is allowed, applied to
//! component membership, and every affected component is settled to the
//! registry's lifecycle stage. Back-stacked transactions can be popped to
//! replay them in reverse.

pub mod back_stack;
pub mod component;
pub mod config;
pub mod error;
pub mod host;
pub mod lifecycle;
pub mod logging;
pub mod manager;
mod requests;
pub mod scheduler;
pub mod script;
pub mod transaction;

pub use back_stack::{BackStackEntry, BackStackId, PopTarget};
pub use component::{
    Component, ComponentHooks, ComponentId, ComponentVariant, ContainerId, Hook, HookCx,
    LifecycleState, ModalPresenter, NoopHooks, RegistryId,
};
pub use error::{ManagerError, Result};
pub use host::{AnimationRequest, Host, NullHost, SharedHost};
pub use lifecycle::{LifecycleCallbacks, LifecycleEvent};
pub use manager::{
    ComponentFactory, ComponentManager, FactoryRegistry, ListenerId, SavedBackStackEntry,
    SavedComponent, SavedRegistryState,
};
pub use scheduler::{Looper, Scheduler};
pub use transaction::{Command, Op, OpAnimations, Transaction, Transit};
