//! Error types for the component manager.
//!
//! Every variant is surfaced synchronously from the call that broke the
//! contract. Nothing here is retried by the manager itself.

use thiserror::Error;

use crate::component::{ComponentId, ContainerId, Hook, LifecycleState};
use crate::config::ConfigError;

/// Errors raised by the registry, the transaction builder and the executor.
#[derive(Debug, Error)]
pub enum ManagerError {
    /// `commit` was called on a transaction that was already committed.
    #[error("commit already called")]
    AlreadyCommitted,

    /// A builder method was called after commit.
    #[error("transaction was modified after commit")]
    TransactionCommitted,

    /// A drain was requested while one is already running.
    #[error("component manager is already executing transactions")]
    Reentrant,

    /// The component is not owned by this registry.
    #[error("component {component} is not owned by this registry")]
    ComponentNotOwned { component: ComponentId },

    /// Linking the target would create a cycle.
    #[error("setting {target} as the target of {component} would create a target cycle")]
    TargetCycle {
        component: ComponentId,
        target: ComponentId,
    },

    /// The component's target does not belong to this registry.
    #[error("component {component} declared target {target} that does not belong to this registry")]
    TargetNotInRegistry {
        component: ComponentId,
        target: ComponentId,
    },

    /// Back stack ids are never negative.
    #[error("bad back stack id {0}")]
    InvalidBackStackId(i64),

    /// A request code used bits outside the reserved 16-bit space.
    #[error("request code {0:#x} uses bits outside the lower 16")]
    RequestCodeOutOfRange(u32),

    /// Every correlated request slot is in use.
    #[error("too many pending requests (limit {limit})")]
    TooManyPendingRequests { limit: u32 },

    /// A lifecycle hook returned without acknowledging the call-through contract.
    #[error("component {component} did not call through to {hook:?}")]
    HookNotAcknowledged { component: ComponentId, hook: Hook },

    /// The host has no mount point with this id.
    #[error("no container found for id {container} (component {component})")]
    ContainerNotFound {
        component: ComponentId,
        container: ContainerId,
    },

    /// The component is already in the mounted set.
    #[error("component already added: {0}")]
    AlreadyAdded(ComponentId),

    /// The tag cannot change once assigned.
    #[error("can't change tag of component {component}: was {existing}, now {requested}")]
    TagConflict {
        component: ComponentId,
        existing: String,
        requested: String,
    },

    /// The container cannot change once assigned.
    #[error("can't change container of component {component}: was {existing}, now {requested}")]
    ContainerConflict {
        component: ComponentId,
        existing: ContainerId,
        requested: ContainerId,
    },

    /// Lifecycle ceilings below CREATED are rejected.
    #[error("cannot set maximum lifecycle below CREATED (got {0:?})")]
    InvalidMaxLifecycle(LifecycleState),

    /// `add_to_back_stack` conflicts with synchronous commits.
    #[error("this transaction is not allowed to be added to the back stack")]
    BackStackNotAllowed,

    /// The transaction was committed after the registry saved its state.
    #[error("can not perform this action after state has been saved")]
    StateLoss,

    /// The registry was destroyed.
    #[error("component manager has been destroyed")]
    Destroyed,

    /// A modal operation targeted a component without the modal capability.
    #[error("component {0} is not a modal")]
    NotModal(ComponentId),

    /// A component claimed a postponement listener while another was active.
    #[error("component {0} is already postponed by another transaction")]
    PostponeConflict(ComponentId),

    /// Restore could not rebuild a component of this kind.
    #[error("no factory registered for component kind '{0}'")]
    UnknownKind(String),

    /// Restored state referenced a component that was not part of it.
    #[error("saved state references unknown component {0}")]
    CorruptState(ComponentId),

    /// Saved state could not be encoded or decoded.
    #[error("saved state serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Convenience alias used across the crate.
pub type Result<T, E = ManagerError> = std::result::Result<T, E>;
