use crate::back_stack::BackStackId;
use crate::component::{ComponentId, ContainerId, LifecycleState, RegistryId};
use crate::error::{ManagerError, Result};
use crate::manager::ComponentManager;
use crate::transaction::op::{Command, Op, OpAnimations};
use crate::transaction::record::{Record, RecordId};
use crate::transaction::Transit;

/// Tag and container requested for a component by an add or replace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Binding {
    pub(crate) component: ComponentId,
    pub(crate) tag: Option<String>,
    pub(crate) container: Option<ContainerId>,
}

/// A batch of operations under construction.
///
/// Obtained from [`ComponentManager::begin_transaction`]. Every builder
/// method fails with [`ManagerError::TransactionCommitted`] once the
/// transaction has been committed.
pub struct Transaction {
    registry: RegistryId,
    record: Record,
    bindings: Vec<Binding>,
    anims: OpAnimations,
    committed: bool,
    allow_add_to_back_stack: bool,
}

impl Transaction {
    pub(crate) fn new(registry: RegistryId, id: RecordId) -> Self {
        Self {
            registry,
            record: Record::new(id),
            bindings: Vec::new(),
            anims: OpAnimations::default(),
            committed: false,
            allow_add_to_back_stack: true,
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.committed {
            return Err(ManagerError::TransactionCommitted);
        }
        Ok(())
    }

    fn push_op(&mut self, mut op: Op) {
        op.anims = self.anims.clone();
        self.record.ops.push(op);
    }

    fn do_add_op(
        &mut self,
        container: Option<ContainerId>,
        component: ComponentId,
        tag: Option<&str>,
        command: Command,
    ) -> Result<&mut Self> {
        self.ensure_open()?;
        self.bindings.push(Binding {
            component,
            tag: tag.map(str::to_owned),
            container,
        });
        self.push_op(Op::new(command, Some(component)));
        Ok(self)
    }

    /// Add a component without a container.
    pub fn add(&mut self, component: ComponentId, tag: Option<&str>) -> Result<&mut Self> {
        self.do_add_op(None, component, tag, Command::Add)
    }

    /// Add a component mounted in `container`.
    pub fn add_to(
        &mut self,
        container: ContainerId,
        component: ComponentId,
        tag: Option<&str>,
    ) -> Result<&mut Self> {
        self.do_add_op(Some(container), component, tag, Command::Add)
    }

    /// Remove everything mounted in `container` and add `component` there.
    pub fn replace(
        &mut self,
        container: ContainerId,
        component: ComponentId,
        tag: Option<&str>,
    ) -> Result<&mut Self> {
        self.do_add_op(Some(container), component, tag, Command::Replace)
    }

    pub fn remove(&mut self, component: ComponentId) -> Result<&mut Self> {
        self.ensure_open()?;
        self.push_op(Op::new(Command::Remove, Some(component)));
        Ok(self)
    }

    pub fn hide(&mut self, component: ComponentId) -> Result<&mut Self> {
        self.ensure_open()?;
        self.push_op(Op::new(Command::Hide, Some(component)));
        Ok(self)
    }

    pub fn show(&mut self, component: ComponentId) -> Result<&mut Self> {
        self.ensure_open()?;
        self.push_op(Op::new(Command::Show, Some(component)));
        Ok(self)
    }

    pub fn detach(&mut self, component: ComponentId) -> Result<&mut Self> {
        self.ensure_open()?;
        self.push_op(Op::new(Command::Detach, Some(component)));
        Ok(self)
    }

    pub fn attach(&mut self, component: ComponentId) -> Result<&mut Self> {
        self.ensure_open()?;
        self.push_op(Op::new(Command::Attach, Some(component)));
        Ok(self)
    }

    /// Make `component` the primary, or clear the primary with `None`.
    pub fn set_primary(&mut self, component: Option<ComponentId>) -> Result<&mut Self> {
        self.ensure_open()?;
        self.push_op(Op::new(Command::SetPrimary, component));
        Ok(self)
    }

    /// Cap how far the lifecycle driver may move `component`.
    pub fn set_max_lifecycle(
        &mut self,
        component: ComponentId,
        state: LifecycleState,
    ) -> Result<&mut Self> {
        self.ensure_open()?;
        if state < LifecycleState::Created {
            return Err(ManagerError::InvalidMaxLifecycle(state));
        }
        self.push_op(Op::max_lifecycle(component, state));
        Ok(self)
    }

    /// Animation keys applied to every op added after this call.
    pub fn set_custom_animations(
        &mut self,
        enter: Option<&str>,
        exit: Option<&str>,
        pop_enter: Option<&str>,
        pop_exit: Option<&str>,
    ) -> Result<&mut Self> {
        self.ensure_open()?;
        self.anims = OpAnimations {
            enter: enter.map(str::to_owned),
            exit: exit.map(str::to_owned),
            pop_enter: pop_enter.map(str::to_owned),
            pop_exit: pop_exit.map(str::to_owned),
        };
        Ok(self)
    }

    pub fn set_transition(&mut self, transit: Transit) -> Result<&mut Self> {
        self.ensure_open()?;
        self.record.transit = transit;
        Ok(self)
    }

    /// Allow this transaction to be merged and reordered with its
    /// reorderable neighbours.
    pub fn set_reordering_allowed(&mut self, allowed: bool) -> Result<&mut Self> {
        self.ensure_open()?;
        self.record.reordering_allowed = allowed;
        Ok(self)
    }

    pub fn add_to_back_stack(&mut self, name: Option<&str>) -> Result<&mut Self> {
        self.ensure_open()?;
        if !self.allow_add_to_back_stack {
            return Err(ManagerError::BackStackNotAllowed);
        }
        self.record.add_to_back_stack = true;
        self.record.name = name.map(str::to_owned);
        Ok(self)
    }

    pub fn disallow_add_to_back_stack(&mut self) -> Result<&mut Self> {
        self.ensure_open()?;
        if self.record.add_to_back_stack {
            return Err(ManagerError::BackStackNotAllowed);
        }
        self.allow_add_to_back_stack = false;
        Ok(self)
    }

    /// Run `callback` after this transaction's operations have executed.
    ///
    /// The callback runs while the registry is draining, so it may enqueue
    /// further commits but not execute them synchronously.
    pub fn run_on_commit(
        &mut self,
        callback: impl FnOnce(&mut ComponentManager) -> Result<()> + 'static,
    ) -> Result<&mut Self> {
        self.disallow_add_to_back_stack()?;
        self.record.commit_callbacks.push(Box::new(callback));
        Ok(self)
    }

    pub fn is_empty(&self) -> bool {
        self.record.ops.is_empty()
    }

    pub fn is_committed(&self) -> bool {
        self.committed
    }

    pub fn name(&self) -> Option<&str> {
        self.record.name.as_deref()
    }

    /// Schedule the transaction. Returns the back stack id when it was
    /// added to the back stack.
    pub fn commit(&mut self, manager: &mut ComponentManager) -> Result<Option<BackStackId>> {
        self.commit_internal(manager, false)
    }

    pub fn commit_allowing_state_loss(
        &mut self,
        manager: &mut ComponentManager,
    ) -> Result<Option<BackStackId>> {
        self.commit_internal(manager, true)
    }

    /// Execute synchronously. Rejected while the registry is draining.
    pub fn commit_now(&mut self, manager: &mut ComponentManager) -> Result<()> {
        self.commit_now_internal(manager, false)
    }

    pub fn commit_now_allowing_state_loss(&mut self, manager: &mut ComponentManager) -> Result<()> {
        self.commit_now_internal(manager, true)
    }

    fn seal(&mut self, manager: &mut ComponentManager) -> Result<Record> {
        if self.committed {
            return Err(ManagerError::AlreadyCommitted);
        }
        manager.check_owned(self.registry, &self.record)?;
        manager.check_bindings(&self.bindings)?;
        self.committed = true;
        manager.apply_bindings(&self.bindings);
        let mut record = std::mem::take(&mut self.record);
        manager.capture_max_states(&mut record);
        Ok(record)
    }

    fn commit_internal(
        &mut self,
        manager: &mut ComponentManager,
        allow_state_loss: bool,
    ) -> Result<Option<BackStackId>> {
        if !self.committed && !manager.admit_commit(allow_state_loss)? {
            self.committed = true;
            return Ok(None);
        }
        let record = self.seal(manager)?;
        manager.enqueue_record(record)
    }

    fn commit_now_internal(
        &mut self,
        manager: &mut ComponentManager,
        allow_state_loss: bool,
    ) -> Result<()> {
        if self.committed {
            return Err(ManagerError::AlreadyCommitted);
        }
        self.disallow_add_to_back_stack()?;
        if !manager.admit_commit_now(allow_state_loss)? {
            self.committed = true;
            return Ok(());
        }
        let record = self.seal(manager)?;
        manager.exec_single_action(record)
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("registry", &self.registry)
            .field("record", &self.record)
            .field("committed", &self.committed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transaction() -> Transaction {
        Transaction::new(RegistryId::next(), RecordId(7))
    }

    #[test]
    fn test_custom_animations_apply_to_later_ops() {
        let id = ComponentId::generate();
        let mut tx = transaction();
        tx.add(id, None).unwrap();
        tx.set_custom_animations(Some("slide_in"), Some("slide_out"), None, None)
            .unwrap()
            .hide(id)
            .unwrap();

        assert_eq!(tx.record.ops[0].anims.enter, None);
        assert_eq!(tx.record.ops[1].anims.enter.as_deref(), Some("slide_in"));
        assert_eq!(tx.record.ops[1].anims.exit.as_deref(), Some("slide_out"));
    }

    #[test]
    fn test_max_lifecycle_below_created_rejected() {
        let mut tx = transaction();
        let err = tx
            .set_max_lifecycle(ComponentId::generate(), LifecycleState::Initializing)
            .unwrap_err();
        assert!(matches!(err, ManagerError::InvalidMaxLifecycle(LifecycleState::Initializing)));
    }

    #[test]
    fn test_back_stack_and_disallow_conflict() {
        let mut tx = transaction();
        tx.add_to_back_stack(Some("first")).unwrap();
        assert!(matches!(
            tx.disallow_add_to_back_stack(),
            Err(ManagerError::BackStackNotAllowed)
        ));

        let mut tx = transaction();
        tx.run_on_commit(|_| Ok(())).unwrap();
        assert!(matches!(
            tx.add_to_back_stack(None),
            Err(ManagerError::BackStackNotAllowed)
        ));
    }

    #[test]
    fn test_replace_records_binding() {
        let id = ComponentId::generate();
        let mut tx = transaction();
        tx.replace(ContainerId(3), id, Some("detail")).unwrap();
        assert_eq!(
            tx.bindings,
            vec![Binding {
                component: id,
                tag: Some("detail".into()),
                container: Some(ContainerId(3)),
            }]
        );
        assert_eq!(tx.record.ops[0].command, Command::Replace);
    }
}
