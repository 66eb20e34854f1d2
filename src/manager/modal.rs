//! Showing and dismissing components with the modal capability.

use crate::back_stack::{BackStackId, PopTarget};
use crate::component::{ComponentId, ModalPresenter};
use crate::error::{ManagerError, Result};
use crate::manager::ComponentManager;
use crate::transaction::Transaction;

impl ComponentManager {
    fn modal_mut(&mut self, id: ComponentId) -> Result<&mut ModalPresenter> {
        let slot = self
            .components
            .get_mut(&id)
            .ok_or(ManagerError::ComponentNotOwned { component: id })?;
        slot.component
            .variant
            .modal_mut()
            .ok_or(ManagerError::NotModal(id))
    }

    fn mark_shown(&mut self, id: ComponentId) -> Result<()> {
        let modal = self.modal_mut(id)?;
        modal.dismissed = false;
        modal.shown_by_me = true;
        Ok(())
    }

    /// Add the modal component in its own transaction and commit it.
    pub fn show_modal(&mut self, id: ComponentId, tag: Option<&str>) -> Result<()> {
        self.mark_shown(id)?;
        let mut tx = self.begin_transaction();
        tx.add(id, tag)?;
        tx.commit(self)?;
        Ok(())
    }

    /// Like [`Self::show_modal`], executed synchronously.
    pub fn show_modal_now(&mut self, id: ComponentId, tag: Option<&str>) -> Result<()> {
        self.mark_shown(id)?;
        let mut tx = self.begin_transaction();
        tx.add(id, tag)?;
        tx.commit_now(self)
    }

    /// Add the modal component to a caller-built transaction and commit it.
    ///
    /// When the transaction goes on the back stack, dismissing the modal pops
    /// that entry instead of removing the component.
    pub fn show_modal_in(
        &mut self,
        id: ComponentId,
        tx: &mut Transaction,
        tag: Option<&str>,
    ) -> Result<Option<BackStackId>> {
        self.mark_shown(id)?;
        tx.add(id, tag)?;
        let back_stack_id = tx.commit(self)?;
        self.modal_mut(id)?.back_stack_id = back_stack_id;
        Ok(back_stack_id)
    }

    /// Hide the modal surface and take the component out again. Dismissing
    /// twice is a no-op. A rejected commit leaves the modal showing.
    pub fn dismiss_modal(&mut self, id: ComponentId, allow_state_loss: bool) -> Result<()> {
        let modal = self.modal_mut(id)?;
        if modal.dismissed {
            return Ok(());
        }
        let back_stack_id = modal.back_stack_id;

        match back_stack_id {
            Some(entry) => self.pop_back_stack(PopTarget::Id(entry), true)?,
            None => {
                let mut tx = self.begin_transaction();
                tx.remove(id)?;
                if allow_state_loss {
                    tx.commit_allowing_state_loss(self)?;
                } else {
                    tx.commit(self)?;
                }
            }
        }

        let modal = self.modal_mut(id)?;
        modal.dismissed = true;
        modal.shown_by_me = false;
        modal.back_stack_id = None;
        self.set_modal_surface(id, false);
        Ok(())
    }
}
