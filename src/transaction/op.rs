use serde::{Deserialize, Serialize};

use crate::component::{ComponentId, LifecycleState};

/// Primitive mutation carried by an [`Op`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    Add,
    /// Composite; rewritten into removes and an add before first execution.
    Replace,
    Remove,
    Hide,
    Show,
    Detach,
    Attach,
    SetPrimary,
    UnsetPrimary,
    SetMaxLifecycle,
}

impl Command {
    /// The command that undoes this one when replayed in reverse.
    ///
    /// `SetMaxLifecycle` is its own inverse; the reverse run restores the
    /// ceiling recorded in the op.
    pub fn inverse(self) -> Self {
        match self {
            Command::Add => Command::Remove,
            Command::Remove => Command::Add,
            Command::Hide => Command::Show,
            Command::Show => Command::Hide,
            Command::Detach => Command::Attach,
            Command::Attach => Command::Detach,
            Command::SetPrimary => Command::UnsetPrimary,
            Command::UnsetPrimary => Command::SetPrimary,
            Command::Replace => Command::Replace,
            Command::SetMaxLifecycle => Command::SetMaxLifecycle,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Command::Add => "add",
            Command::Replace => "replace",
            Command::Remove => "remove",
            Command::Hide => "hide",
            Command::Show => "show",
            Command::Detach => "detach",
            Command::Attach => "attach",
            Command::SetPrimary => "set_primary",
            Command::UnsetPrimary => "unset_primary",
            Command::SetMaxLifecycle => "set_max_lifecycle",
        }
    }
}

/// Transition style applied to every component a transaction touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transit {
    #[default]
    None,
    Open,
    Close,
    Fade,
}

impl Transit {
    /// The style used when the transaction is popped.
    pub fn reverse(self) -> Self {
        match self {
            Transit::Open => Transit::Close,
            Transit::Close => Transit::Open,
            Transit::Fade => Transit::Fade,
            Transit::None => Transit::None,
        }
    }
}

/// Animation keys for the four directions an op can run in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpAnimations {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pop_enter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pop_exit: Option<String>,
}

/// One primitive mutation bound to a component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Op {
    pub command: Command,
    /// Absent only for an unset that restores "no primary".
    pub component: Option<ComponentId>,
    #[serde(default)]
    pub anims: OpAnimations,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_max_state: Option<LifecycleState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cur_max_state: Option<LifecycleState>,
}

impl Op {
    pub(crate) fn new(command: Command, component: Option<ComponentId>) -> Self {
        Self {
            command,
            component,
            anims: OpAnimations::default(),
            old_max_state: None,
            cur_max_state: None,
        }
    }

    pub(crate) fn max_lifecycle(component: ComponentId, state: LifecycleState) -> Self {
        Self {
            cur_max_state: Some(state),
            ..Self::new(Command::SetMaxLifecycle, Some(component))
        }
    }
}
