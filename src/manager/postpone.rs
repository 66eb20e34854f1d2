//! Postponed transactions.
//!
//! A transaction whose newly mounted, visible component asked to delay its
//! enter transition is rolled back at the end of its sub-run and parked
//! here. It completes once every such component reported ready, or early
//! when a later batch touches the same container. A later batch that pops
//! it cancels it instead.

use tracing::debug;

use crate::component::ComponentId;
use crate::error::{ManagerError, Result};
use crate::manager::executor::BatchEntry;
use crate::manager::ComponentManager;
use crate::transaction::{Record, RecordId};

/// A rolled-back transaction waiting for its components.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PostponedTransaction {
    pub(crate) record: RecordId,
    pub(crate) is_pop: bool,
    /// Components that have not reported ready yet.
    pub(crate) outstanding: u32,
}

impl ComponentManager {
    /// Number of transactions currently waiting on postponed components.
    pub fn postponed_count(&self) -> usize {
        self.postponed.len()
    }

    /// Walk the sub-run backwards and park every postponed record that no
    /// later record interacts with. Parked records are rolled back and moved
    /// to the end of the sub-run. Returns the index of the first parked one.
    pub(crate) fn postpone_postponable_transactions(
        &mut self,
        batch: &mut Vec<BatchEntry>,
        start: usize,
        end: usize,
        newly_added: &mut Vec<ComponentId>,
    ) -> Result<usize> {
        let mut postpone_index = end;
        let mut i = end;
        while i > start {
            i -= 1;
            let entry = batch[i];
            if !self.is_postponable(&batch[i + 1..end], entry.record) {
                continue;
            }

            self.register_postponed(entry)?;
            // Roll back so nothing of it survives the settle.
            if entry.is_pop {
                self.execute_record_ops(entry.record, false, true)?;
            } else {
                self.execute_record_ops(entry.record, true, false)?;
            }

            postpone_index -= 1;
            if i != postpone_index {
                let moved = batch.remove(i);
                batch.insert(postpone_index, moved);
            }
            self.add_added_components(newly_added)?;
        }
        Ok(postpone_index)
    }

    fn is_postponable(&self, later: &[BatchEntry], record: RecordId) -> bool {
        let Some(rec) = self.records.get(&record) else {
            return false;
        };
        let postponed = rec.is_postponed(|id| self.core(id).is_some_and(|c| c.is_postponed_entry()));
        if !postponed {
            return false;
        }
        let later: Vec<&Record> = later
            .iter()
            .filter_map(|entry| self.records.get(&entry.record))
            .collect();
        !rec.interacts_with(&later, |id| self.container_of(id))
    }

    fn register_postponed(&mut self, entry: BatchEntry) -> Result<()> {
        let components: Vec<ComponentId> = self
            .records
            .get(&entry.record)
            .map(|r| r.components().collect())
            .unwrap_or_default();

        let mut outstanding = 0;
        for id in components {
            let Some(core) = self.core_mut(id) else {
                continue;
            };
            if !core.is_postponed_entry() {
                continue;
            }
            match core.postpone_listener {
                Some(existing) if existing == entry.record => {}
                Some(_) => return Err(ManagerError::PostponeConflict(id)),
                None => {
                    core.postpone_listener = Some(entry.record);
                    outstanding += 1;
                }
            }
        }

        if self.config.debug_logging {
            debug!(registry = %self.id, record = %entry.record, outstanding, "postponed transaction");
        }
        self.postponed.push(PostponedTransaction {
            record: entry.record,
            is_pop: entry.is_pop,
            outstanding,
        });
        Ok(())
    }

    /// One component of `record` is ready. The last one schedules a drain.
    pub(crate) fn on_start_enter_transition(&mut self, record: RecordId) {
        let Some(postponed) = self.postponed.iter_mut().find(|p| p.record == record) else {
            return;
        };
        postponed.outstanding = postponed.outstanding.saturating_sub(1);
        if postponed.outstanding == 0 {
            self.schedule_commit();
        }
    }

    /// Resolve postponed transactions against an incoming batch.
    ///
    /// Without a batch only the ready ones complete.
    pub(crate) fn execute_postponed_transaction(&mut self, batch: Option<&[BatchEntry]>) -> Result<()> {
        let mut i = 0;
        while i < self.postponed.len() {
            let postponed = self.postponed[i];

            let popped_by_batch = !postponed.is_pop
                && batch.is_some_and(|b| {
                    b.iter()
                        .any(|entry| entry.record == postponed.record && entry.is_pop)
                });
            if popped_by_batch {
                self.postponed.remove(i);
                self.cancel_transaction(postponed)?;
                continue;
            }

            let interacts = batch.is_some_and(|b| {
                let incoming: Vec<&Record> = b
                    .iter()
                    .filter_map(|entry| self.records.get(&entry.record))
                    .collect();
                self.records
                    .get(&postponed.record)
                    .is_some_and(|r| r.interacts_with(&incoming, |id| self.container_of(id)))
            });
            if postponed.outstanding == 0 || interacts {
                self.postponed.remove(i);
                self.complete_transaction(postponed)?;
                continue;
            }
            i += 1;
        }
        Ok(())
    }

    /// Replay a postponed transaction for real. If some of its components
    /// never reported ready, it completes without running their enter
    /// transitions.
    fn complete_transaction(&mut self, postponed: PostponedTransaction) -> Result<()> {
        let canceled = postponed.outstanding > 0;
        self.clear_postpone_listeners(postponed.record, canceled);
        if self.config.debug_logging {
            debug!(registry = %self.id, record = %postponed.record, canceled, "complete postponed");
        }
        self.complete_execute(postponed.record, postponed.is_pop, true)?;
        self.release_record(postponed.record);
        Ok(())
    }

    /// Put the forward effects back so that the pop in the incoming batch
    /// can reverse them.
    fn cancel_transaction(&mut self, postponed: PostponedTransaction) -> Result<()> {
        if self.config.debug_logging {
            debug!(registry = %self.id, record = %postponed.record, "cancel postponed");
        }
        self.clear_postpone_listeners(postponed.record, false);
        self.complete_execute(postponed.record, postponed.is_pop, false)
    }

    /// Detach components from a record that stopped waiting for them.
    fn clear_postpone_listeners(&mut self, record: RecordId, give_up: bool) {
        for slot in self.components.values_mut() {
            let core = &mut slot.component.core;
            if core.postpone_listener == Some(record) {
                core.postpone_listener = None;
                if give_up {
                    core.postponed = false;
                }
            }
        }
    }

    fn complete_execute(&mut self, record: RecordId, is_pop: bool, move_to_state: bool) -> Result<()> {
        if is_pop {
            self.execute_record_ops(record, true, move_to_state)?;
        } else {
            self.execute_record_ops(record, false, true)?;
        }
        if move_to_state {
            let state = self.cur_state;
            self.move_to_state_all(state, true)?;
        }

        let Some(rec) = self.records.get(&record) else {
            return Ok(());
        };
        let revealed: Vec<ComponentId> = self
            .active_ids()
            .filter(|id| {
                self.core(*id).is_some_and(|c| {
                    c.has_view
                        && c.newly_added
                        && c.container.is_some_and(|container| {
                            rec.interacts_with_container(container, |x| self.container_of(x))
                        })
                })
            })
            .collect();

        let host = self.host.clone();
        for id in revealed {
            if let Some(core) = self.core_mut(id) {
                if core.held_invisible {
                    core.held_invisible = false;
                    host.lock().set_view_visible(id, true);
                }
                if !move_to_state {
                    core.skip_exit_animation = true;
                    core.newly_added = false;
                }
            }
        }
        Ok(())
    }

    /// Complete every postponed transaction now.
    pub(crate) fn force_postponed_transactions(&mut self) -> Result<()> {
        while !self.postponed.is_empty() {
            let postponed = self.postponed.remove(0);
            self.complete_transaction(postponed)?;
        }
        Ok(())
    }
}
