//! Committed transaction data and the pure passes the executor runs over it.

use serde::{Deserialize, Serialize};

use crate::component::{ComponentId, ContainerId};
use crate::error::Result;
use crate::manager::ComponentManager;
use crate::transaction::op::{Command, Op};
use crate::transaction::Transit;

/// Key of a record in the registry's record arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub(crate) u64);

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "record#{}", self.0)
    }
}

/// Runs once the record's operations have been executed.
pub(crate) type CommitCallback = Box<dyn FnOnce(&mut ComponentManager) -> Result<()>>;

#[derive(Default)]
pub(crate) struct Record {
    pub(crate) id: RecordId,
    pub(crate) ops: Vec<Op>,
    pub(crate) reordering_allowed: bool,
    pub(crate) add_to_back_stack: bool,
    pub(crate) name: Option<String>,
    pub(crate) index: Option<usize>,
    pub(crate) transit: Transit,
    pub(crate) commit_callbacks: Vec<CommitCallback>,
}

impl std::fmt::Debug for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Record")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("index", &self.index)
            .field("ops", &self.ops.len())
            .field("reordering_allowed", &self.reordering_allowed)
            .field("add_to_back_stack", &self.add_to_back_stack)
            .finish()
    }
}

fn forget(added: &mut Vec<ComponentId>, id: ComponentId) {
    if let Some(pos) = added.iter().position(|a| *a == id) {
        added.remove(pos);
    }
}

impl Record {
    pub(crate) fn new(id: RecordId) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    pub(crate) fn components(&self) -> impl Iterator<Item = ComponentId> + '_ {
        self.ops.iter().filter_map(|op| op.component)
    }

    pub(crate) fn references(&self, id: ComponentId) -> bool {
        self.components().any(|c| c == id)
    }

    /// Rewrite composite ops into primitives, tracking the mounted set.
    ///
    /// `added` starts as the mounted set before this record runs and ends as
    /// the set after it. Returns the primary after this record's ops.
    pub(crate) fn expand_ops(
        &mut self,
        added: &mut Vec<ComponentId>,
        mut old_primary: Option<ComponentId>,
        container_of: impl Fn(ComponentId) -> Option<ContainerId>,
    ) -> Option<ComponentId> {
        let mut i = 0;
        while i < self.ops.len() {
            let command = self.ops[i].command;
            let component = self.ops[i].component;
            match (command, component) {
                (Command::Add | Command::Attach, Some(id)) => added.push(id),
                (Command::Remove | Command::Detach, Some(id)) => {
                    forget(added, id);
                    if old_primary == Some(id) {
                        self.ops.insert(i, Op::new(Command::UnsetPrimary, Some(id)));
                        i += 1;
                        old_primary = None;
                    }
                }
                (Command::Replace, Some(id)) => {
                    let container = container_of(id);
                    let anims = self.ops[i].anims.clone();
                    let mut already_added = false;
                    for old in added.clone().into_iter().rev() {
                        if container_of(old) != container {
                            continue;
                        }
                        if old == id {
                            already_added = true;
                            continue;
                        }
                        if old_primary == Some(old) {
                            self.ops.insert(i, Op::new(Command::UnsetPrimary, Some(old)));
                            i += 1;
                            old_primary = None;
                        }
                        let mut remove = Op::new(Command::Remove, Some(old));
                        remove.anims = anims.clone();
                        self.ops.insert(i, remove);
                        forget(added, old);
                        i += 1;
                    }
                    if already_added {
                        self.ops.remove(i);
                        continue;
                    }
                    self.ops[i].command = Command::Add;
                    added.push(id);
                }
                (Command::SetPrimary, _) => {
                    self.ops.insert(i, Op::new(Command::UnsetPrimary, old_primary));
                    i += 1;
                    old_primary = component;
                }
                _ => {}
            }
            i += 1;
        }
        old_primary
    }

    /// Mirror of [`Record::expand_ops`] for a record being popped.
    pub(crate) fn track_added_in_pop(
        &self,
        added: &mut Vec<ComponentId>,
        mut old_primary: Option<ComponentId>,
    ) -> Option<ComponentId> {
        for op in self.ops.iter().rev() {
            match (op.command, op.component) {
                (Command::Add | Command::Attach, Some(id)) => forget(added, id),
                (Command::Remove | Command::Detach, Some(id)) => added.push(id),
                (Command::UnsetPrimary, component) => old_primary = component,
                (Command::SetPrimary, _) => old_primary = None,
                _ => {}
            }
        }
        old_primary
    }

    pub(crate) fn containers(
        &self,
        container_of: &impl Fn(ComponentId) -> Option<ContainerId>,
    ) -> Vec<ContainerId> {
        let mut containers = Vec::new();
        for container in self.components().filter_map(container_of) {
            if !containers.contains(&container) {
                containers.push(container);
            }
        }
        containers
    }

    pub(crate) fn interacts_with_container(
        &self,
        container: ContainerId,
        container_of: impl Fn(ComponentId) -> Option<ContainerId>,
    ) -> bool {
        self.components()
            .any(|id| container_of(id) == Some(container))
    }

    /// Whether any later record touches a container this record touches.
    pub(crate) fn interacts_with(
        &self,
        later: &[&Record],
        container_of: impl Fn(ComponentId) -> Option<ContainerId>,
    ) -> bool {
        if later.is_empty() {
            return false;
        }
        let mine = self.containers(&container_of);
        if mine.is_empty() {
            return false;
        }
        later.iter().any(|record| {
            record
                .components()
                .filter_map(&container_of)
                .any(|container| mine.contains(&container))
        })
    }

    /// Whether some op targets a component that asked to delay its enter
    /// transition.
    pub(crate) fn is_postponed(&self, is_postponed_entry: impl Fn(ComponentId) -> bool) -> bool {
        self.components().any(is_postponed_entry)
    }
}
