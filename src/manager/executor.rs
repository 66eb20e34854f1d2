//! Pending queue and batch executor.
//!
//! A drain collects every queued action into a batch of records, each with
//! a push/pop flag, splits the batch into sub-runs and executes each sub-run
//! together. Reorderable sub-runs share mount-set tracking so that work a
//! later record undoes never reaches the higher lifecycle stages.

use tracing::{debug, trace};

use crate::back_stack::{BackStackId, PopTarget};
use crate::component::{ComponentId, LifecycleState};
use crate::error::{ManagerError, Result};
use crate::manager::ComponentManager;
use crate::transaction::{Command, Record, RecordId};

/// Work waiting for the next drain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PendingAction {
    Commit(RecordId),
    Pop { target: PopTarget, inclusive: bool },
}

/// One record in a batch and the direction it runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BatchEntry {
    pub(crate) record: RecordId,
    pub(crate) is_pop: bool,
}

impl ComponentManager {
    // --- admission ---------------------------------------------------------------

    pub(crate) fn check_state_loss(&self) -> Result<()> {
        if self.is_state_saved() {
            return Err(ManagerError::StateLoss);
        }
        Ok(())
    }

    /// Gate for queued commits. `Ok(false)` means drop the commit silently.
    pub(crate) fn admit_commit(&self, allow_state_loss: bool) -> Result<bool> {
        if !allow_state_loss {
            self.check_state_loss()?;
        }
        if self.destroyed {
            if allow_state_loss {
                return Ok(false);
            }
            return Err(ManagerError::Destroyed);
        }
        Ok(true)
    }

    /// Gate for synchronous commits. `Ok(false)` means drop the commit silently.
    pub(crate) fn admit_commit_now(&mut self, allow_state_loss: bool) -> Result<bool> {
        if allow_state_loss && (self.destroyed || self.torn_down) {
            return Ok(false);
        }
        self.ensure_exec_ready(allow_state_loss)?;
        Ok(true)
    }

    fn ensure_exec_ready(&mut self, allow_state_loss: bool) -> Result<()> {
        if self.executing {
            return Err(ManagerError::Reentrant);
        }
        if self.torn_down {
            return Err(ManagerError::Destroyed);
        }
        if !allow_state_loss {
            self.check_state_loss()?;
        }
        self.executing = true;
        let result = self.execute_postponed_transaction(None);
        self.executing = false;
        result
    }

    // --- queueing -----------------------------------------------------------------

    pub(crate) fn enqueue_record(&mut self, mut record: Record) -> Result<Option<BackStackId>> {
        let id = record.id;
        let back_stack_id = if record.add_to_back_stack {
            let index = self.back_stack.alloc_index(id);
            record.index = Some(index);
            Some(BackStackId::from_index(index))
        } else {
            None
        };
        if self.config.debug_logging {
            debug!(
                registry = %self.id,
                record = %id,
                ops = record.ops.len(),
                name = record.name.as_deref().unwrap_or(""),
                "commit"
            );
        }
        self.records.insert(id, record);
        self.pending.push(PendingAction::Commit(id));
        self.schedule_commit();
        Ok(back_stack_id)
    }

    /// Queue a pop of the back stack for the next drain.
    pub fn pop_back_stack(&mut self, target: PopTarget, inclusive: bool) -> Result<()> {
        if !self.admit_commit(false)? {
            return Ok(());
        }
        self.pending.push(PendingAction::Pop { target, inclusive });
        self.schedule_commit();
        Ok(())
    }

    /// Post a drain if one is not already due.
    pub(crate) fn schedule_commit(&self) {
        let postpone_ready = !self.postponed.is_empty();
        let pending_ready = self.pending.len() == 1;
        if postpone_ready || pending_ready {
            self.scheduler.cancel(self.id);
            self.scheduler.post(self.id);
        }
    }

    // --- draining -----------------------------------------------------------------

    /// Drain the queue now, then force every postponed transaction to
    /// complete. Returns whether anything was executed.
    pub fn execute_pending_transactions(&mut self) -> Result<bool> {
        let updates = self.exec_pending_actions()?;
        self.force_postponed_transactions()?;
        Ok(updates)
    }

    pub(crate) fn exec_pending_actions(&mut self) -> Result<bool> {
        self.ensure_exec_ready(true)?;

        let mut did_something = false;
        loop {
            let mut batch = Vec::new();
            if !self.generate_ops_for_pending_actions(&mut batch)? {
                break;
            }
            self.executing = true;
            let result = self.remove_redundant_operations_and_execute(&mut batch);
            self.executing = false;
            result?;
            did_something = true;
        }

        self.do_pending_deferred_start()?;
        self.burp_active();
        Ok(did_something)
    }

    pub(crate) fn exec_single_action(&mut self, record: Record) -> Result<()> {
        let id = record.id;
        self.records.insert(id, record);
        let mut batch = Vec::new();
        self.generate_ops(&PendingAction::Commit(id), &mut batch)?;

        self.executing = true;
        let result = self.remove_redundant_operations_and_execute(&mut batch);
        self.executing = false;
        result?;

        self.do_pending_deferred_start()?;
        self.burp_active();
        Ok(())
    }

    /// Pop synchronously. Returns whether anything was popped, here or in
    /// the primary component's nested registry.
    pub fn pop_back_stack_immediate(&mut self, target: PopTarget, inclusive: bool) -> Result<bool> {
        self.check_state_loss()?;
        self.exec_pending_actions()?;
        self.ensure_exec_ready(true)?;

        if target == PopTarget::Top && self.pop_primary_child()? {
            return Ok(true);
        }

        let mut batch = Vec::new();
        let popped = self.pop_back_stack_state(&mut batch, &target, inclusive);
        if popped {
            self.executing = true;
            let result = self.remove_redundant_operations_and_execute(&mut batch);
            self.executing = false;
            result?;
        }
        self.do_pending_deferred_start()?;
        self.burp_active();
        Ok(popped)
    }

    /// Give the primary component's nested registry the first chance at a
    /// plain pop.
    fn pop_primary_child(&mut self) -> Result<bool> {
        let Some(primary) = self.primary() else {
            return Ok(false);
        };
        match self
            .components
            .get_mut(&primary)
            .and_then(|slot| slot.component.children.as_deref_mut())
        {
            Some(child) => child.pop_back_stack_immediate(PopTarget::Top, false),
            None => Ok(false),
        }
    }

    fn generate_ops_for_pending_actions(&mut self, batch: &mut Vec<BatchEntry>) -> Result<bool> {
        if self.pending.is_empty() {
            return Ok(false);
        }
        let actions = std::mem::take(&mut self.pending);
        let mut did_something = false;
        for action in &actions {
            did_something |= self.generate_ops(action, batch)?;
        }
        self.scheduler.cancel(self.id);
        Ok(did_something)
    }

    fn generate_ops(&mut self, action: &PendingAction, batch: &mut Vec<BatchEntry>) -> Result<bool> {
        match action {
            PendingAction::Commit(record) => {
                batch.push(BatchEntry {
                    record: *record,
                    is_pop: false,
                });
                if self.records.get(record).is_some_and(|r| r.add_to_back_stack) {
                    self.back_stack.push(*record);
                }
                Ok(true)
            }
            PendingAction::Pop { target, inclusive } => {
                if *target == PopTarget::Top && self.pop_primary_child()? {
                    return Ok(false);
                }
                Ok(self.pop_back_stack_state(batch, target, *inclusive))
            }
        }
    }

    fn pop_back_stack_state(
        &mut self,
        batch: &mut Vec<BatchEntry>,
        target: &PopTarget,
        inclusive: bool,
    ) -> bool {
        let records = &self.records;
        let popped = self.back_stack.pop_to(target, inclusive, |candidate| {
            records.get(&candidate).is_some_and(|record| match target {
                PopTarget::Top => false,
                PopTarget::Name(name) => record.name.as_deref() == Some(name.as_str()),
                PopTarget::Id(id) => record.index == Some(id.index()),
            })
        });
        if popped.is_empty() {
            return false;
        }
        if self.config.debug_logging {
            debug!(registry = %self.id, count = popped.len(), ?target, inclusive, "pop back stack");
        }
        batch.extend(popped.into_iter().map(|record| BatchEntry {
            record,
            is_pop: true,
        }));
        true
    }

    fn allows_reordering(&self, record: RecordId) -> bool {
        self.records
            .get(&record)
            .is_some_and(|r| r.reordering_allowed)
    }

    /// Split the batch into sub-runs and execute each one.
    ///
    /// A non-reorderable record runs alone, except that consecutive
    /// non-reorderable pops run together. Everything between them runs as
    /// one reorderable span.
    fn remove_redundant_operations_and_execute(&mut self, batch: &mut Vec<BatchEntry>) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let result = self.execute_batch(batch);
        // Released on failure too, or the records outlive the batch.
        for entry in batch.iter() {
            self.release_record(entry.record);
        }
        result
    }

    fn execute_batch(&mut self, batch: &mut Vec<BatchEntry>) -> Result<()> {
        self.execute_postponed_transaction(Some(&batch[..]))?;

        let len = batch.len();
        let mut start = 0;
        let mut i = 0;
        while i < len {
            if !self.allows_reordering(batch[i].record) {
                if start != i {
                    self.execute_ops_together(batch, start, i)?;
                }
                let mut end = i + 1;
                if batch[i].is_pop {
                    while end < len
                        && batch[end].is_pop
                        && !self.allows_reordering(batch[end].record)
                    {
                        end += 1;
                    }
                }
                self.execute_ops_together(batch, i, end)?;
                start = end;
                i = end;
            } else {
                i += 1;
            }
        }
        if start != len {
            self.execute_ops_together(batch, start, len)?;
        }
        Ok(())
    }

    fn execute_ops_together(
        &mut self,
        batch: &mut Vec<BatchEntry>,
        start: usize,
        end: usize,
    ) -> Result<()> {
        let allow_reordering = self.allows_reordering(batch[start].record);
        let mut tracked = self.added.clone();
        let mut old_primary = self.primary;
        let mut add_to_back_stack = false;
        for entry in &batch[start..end] {
            let components = &self.components;
            let container_of =
                |id: ComponentId| components.get(&id).and_then(|slot| slot.component.core.container);
            let Some(record) = self.records.get_mut(&entry.record) else {
                continue;
            };
            old_primary = if entry.is_pop {
                record.track_added_in_pop(&mut tracked, old_primary)
            } else {
                record.expand_ops(&mut tracked, old_primary, container_of)
            };
            add_to_back_stack |= record.add_to_back_stack;
        }
        trace!(registry = %self.id, start, end, allow_reordering, "execute sub-run");

        self.execute_batch_ops(batch, start, end)?;

        let mut postpone_index = end;
        if allow_reordering {
            let mut newly_added = Vec::new();
            self.add_added_components(&mut newly_added)?;
            postpone_index =
                self.postpone_postponable_transactions(batch, start, end, &mut newly_added)?;
            self.make_removed_invisible(&newly_added);
        }
        if postpone_index != start && allow_reordering {
            let state = self.cur_state;
            self.move_to_state_all(state, true)?;
        }

        for entry in batch[start..end].to_vec() {
            self.finish_record(entry)?;
        }
        if add_to_back_stack {
            self.report_back_stack_changed();
        }
        Ok(())
    }

    fn execute_batch_ops(&mut self, batch: &[BatchEntry], start: usize, end: usize) -> Result<()> {
        for (i, entry) in batch.iter().enumerate().take(end).skip(start) {
            self.bump_back_stack_nesting(entry.record, !entry.is_pop);
            if entry.is_pop {
                // Only the last pop settles the registry.
                self.execute_record_ops(entry.record, true, i == end - 1)?;
            } else {
                self.execute_record_ops(entry.record, false, true)?;
            }
        }
        Ok(())
    }

    fn bump_back_stack_nesting(&mut self, record: RecordId, up: bool) {
        let Some(record) = self.records.get(&record) else {
            return;
        };
        if !record.add_to_back_stack {
            return;
        }
        for id in record.components() {
            if let Some(slot) = self.components.get_mut(&id) {
                let core = &mut slot.component.core;
                core.back_stack_nesting = if up {
                    core.back_stack_nesting + 1
                } else {
                    core.back_stack_nesting.saturating_sub(1)
                };
            }
        }
    }

    /// Apply a record's ops forward, or inverted in reverse order for a pop.
    ///
    /// Non-reorderable records settle each touched component as they go;
    /// `move_to_state` additionally settles the whole registry afterwards.
    pub(crate) fn execute_record_ops(
        &mut self,
        record: RecordId,
        is_pop: bool,
        move_to_state: bool,
    ) -> Result<()> {
        let Some(rec) = self.records.get(&record) else {
            return Ok(());
        };
        let reordering = rec.reordering_allowed;
        let transit = if is_pop {
            rec.transit.reverse()
        } else {
            rec.transit
        };
        let mut ops = rec.ops.clone();
        if is_pop {
            ops.reverse();
        }

        for op in &ops {
            let command = if is_pop {
                op.command.inverse()
            } else {
                op.command
            };
            if let Some(id) = op.component {
                let entering = matches!(
                    command,
                    Command::Add | Command::Show | Command::Attach | Command::Replace
                );
                let leaving = matches!(command, Command::Remove | Command::Hide | Command::Detach);
                let anim = match (is_pop, entering) {
                    (false, true) => op.anims.enter.clone(),
                    (false, false) => op.anims.exit.clone(),
                    (true, true) => op.anims.pop_enter.clone(),
                    (true, false) => op.anims.pop_exit.clone(),
                };
                if let Some(core) = self.core_mut(id) {
                    core.next_transit = transit;
                    if entering || leaving {
                        core.next_anim = anim;
                    }
                }
            }

            let max_state = if is_pop {
                op.old_max_state
            } else {
                op.cur_max_state
            };
            self.apply_command(command, op.component, max_state)?;

            if !reordering && !matches!(command, Command::Add | Command::Replace) {
                if let Some(id) = op.component {
                    self.move_to_expected_state(id)?;
                }
            }
        }

        if !reordering && move_to_state {
            let state = self.cur_state;
            self.move_to_state_all(state, true)?;
        }
        Ok(())
    }

    fn apply_command(
        &mut self,
        command: Command,
        component: Option<ComponentId>,
        max_state: Option<LifecycleState>,
    ) -> Result<()> {
        if self.config.debug_logging {
            debug!(registry = %self.id, op = command.as_str(), component = ?component, "run op");
        }
        match (command, component) {
            (Command::SetPrimary, component) => self.primary = component,
            (Command::UnsetPrimary, _) => self.primary = None,
            (_, None) => {}
            (Command::Add | Command::Replace, Some(id)) => self.add_component(id)?,
            (Command::Remove, Some(id)) => self.remove_component(id),
            (Command::Hide, Some(id)) => self.hide_component(id),
            (Command::Show, Some(id)) => self.show_component(id),
            (Command::Detach, Some(id)) => self.detach_component(id),
            (Command::Attach, Some(id)) => self.attach_component(id)?,
            (Command::SetMaxLifecycle, Some(id)) => {
                if let Some(state) = max_state {
                    self.set_max_state(id, state);
                }
            }
        }
        Ok(())
    }

    /// Bring mounted components up to at most STARTED so that views exist
    /// before postponement is decided. Collects the ones that gained a
    /// visible view in this batch.
    pub(crate) fn add_added_components(&mut self, newly_added: &mut Vec<ComponentId>) -> Result<()> {
        if self.cur_state < LifecycleState::Created {
            return Ok(());
        }
        let state = self.cur_state.min(LifecycleState::Started);
        for id in self.added.clone() {
            if !self.core(id).is_some_and(|c| c.state < state) {
                continue;
            }
            self.move_to_state(id, state, false)?;
            let visible = self
                .core(id)
                .is_some_and(|c| c.has_view && !c.hidden && c.newly_added);
            if visible && !newly_added.contains(&id) {
                newly_added.push(id);
            }
        }
        Ok(())
    }

    /// Hide views whose component a postponed rollback unmounted again.
    fn make_removed_invisible(&mut self, newly_added: &[ComponentId]) {
        let host = self.host.clone();
        for id in newly_added {
            if let Some(core) = self.core_mut(*id) {
                if !core.added && core.has_view {
                    core.held_invisible = true;
                    host.lock().set_view_visible(*id, false);
                }
            }
        }
    }

    fn finish_record(&mut self, entry: BatchEntry) -> Result<()> {
        let Some(record) = self.records.get_mut(&entry.record) else {
            return Ok(());
        };
        if entry.is_pop {
            if let Some(index) = record.index.take() {
                self.back_stack.free_index(index);
            }
        }
        let callbacks = std::mem::take(&mut record.commit_callbacks);
        for callback in callbacks {
            callback(self)?;
        }
        Ok(())
    }

    /// Forget a record once nothing can replay it.
    pub(crate) fn release_record(&mut self, record: RecordId) {
        let referenced = self.back_stack.contains(record)
            || self.postponed.iter().any(|p| p.record == record)
            || self
                .pending
                .iter()
                .any(|action| *action == PendingAction::Commit(record));
        if !referenced {
            self.records.remove(&record);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;
    use crate::component::{ContainerId, NoopHooks};
    use crate::config::ManagerConfig;
    use crate::host::Host;
    use crate::scheduler::Looper;

    /// Knows no mount points, so every container lookup fails.
    struct NoContainers;

    impl Host for NoContainers {
        fn has_container(&self, _container: ContainerId) -> bool {
            false
        }
    }

    fn manager() -> (ComponentManager, Arc<Looper>) {
        let looper = Looper::new();
        let mut manager = ComponentManager::new(
            ManagerConfig::default(),
            Arc::new(Mutex::new(NoContainers)),
            looper.clone(),
        );
        manager.dispatch_resume().unwrap();
        (manager, looper)
    }

    #[test]
    fn test_failed_drain_releases_its_records() {
        let (mut manager, looper) = manager();
        let x = manager.create("x", NoopHooks);
        let mut tx = manager.begin_transaction();
        tx.add_to(ContainerId(1), x, None).unwrap();
        tx.commit(&mut manager).unwrap();
        assert_eq!(manager.records.len(), 1);

        assert!(matches!(
            manager.pump(&looper),
            Err(ManagerError::ContainerNotFound { .. })
        ));
        assert!(manager.records.is_empty());
        assert!(!manager.is_executing());
    }

    #[test]
    fn test_failed_commit_now_releases_its_record() {
        let (mut manager, _looper) = manager();
        let x = manager.create("x", NoopHooks);
        let mut tx = manager.begin_transaction();
        tx.add_to(ContainerId(1), x, None).unwrap();
        assert!(tx.commit_now(&mut manager).is_err());
        assert!(manager.records.is_empty());
    }
}
