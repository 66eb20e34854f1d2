//! Optional capabilities layered onto the base component record.

use serde::{Deserialize, Serialize};

use crate::back_stack::BackStackId;

/// Which capability, if any, a component carries.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "variant", rename_all = "snake_case")]
pub enum ComponentVariant {
    #[default]
    Plain,
    Modal(ModalPresenter),
}

impl ComponentVariant {
    pub fn modal(&self) -> Option<&ModalPresenter> {
        match self {
            ComponentVariant::Modal(modal) => Some(modal),
            ComponentVariant::Plain => None,
        }
    }

    pub(crate) fn modal_mut(&mut self) -> Option<&mut ModalPresenter> {
        match self {
            ComponentVariant::Modal(modal) => Some(modal),
            ComponentVariant::Plain => None,
        }
    }
}

/// Presents a modal surface while the component is started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModalPresenter {
    /// Whether the host may dismiss the surface on outside touch/back.
    pub cancelable: bool,
    pub(crate) shown_by_me: bool,
    pub(crate) dismissed: bool,
    pub(crate) back_stack_id: Option<BackStackId>,
    #[serde(skip)]
    pub(crate) surface_visible: bool,
}

impl ModalPresenter {
    pub fn new(cancelable: bool) -> Self {
        Self {
            cancelable,
            shown_by_me: false,
            dismissed: true,
            back_stack_id: None,
            surface_visible: false,
        }
    }

    /// Shown through `show_modal*` and not yet dismissed.
    pub fn is_showing(&self) -> bool {
        self.shown_by_me && !self.dismissed
    }

    pub fn is_dismissed(&self) -> bool {
        self.dismissed
    }

    /// Back stack entry created by `show_modal_in`, popped on dismiss.
    pub fn back_stack_id(&self) -> Option<BackStackId> {
        self.back_stack_id
    }

    pub fn is_surface_visible(&self) -> bool {
        self.surface_visible
    }
}
