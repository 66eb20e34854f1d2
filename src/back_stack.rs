//! Back stack log and the reusable index allocator behind back stack ids.

use serde::{Deserialize, Serialize};

use crate::error::{ManagerError, Result};
use crate::transaction::RecordId;

/// Stable id of a back stack entry, reused after the entry is popped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BackStackId(usize);

impl BackStackId {
    /// Validate a raw id. Negative ids are rejected.
    pub fn new(raw: i64) -> Result<Self> {
        usize::try_from(raw)
            .map(Self)
            .map_err(|_| ManagerError::InvalidBackStackId(raw))
    }

    pub(crate) fn from_index(index: usize) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

impl std::fmt::Display for BackStackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Public view of one back stack entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackStackEntry {
    pub id: Option<BackStackId>,
    pub name: Option<String>,
}

/// Where a pop stops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PopTarget {
    /// The topmost entry, or every entry when inclusive.
    Top,
    /// The topmost entry with this name.
    Name(String),
    /// The entry holding this id.
    Id(BackStackId),
}

#[derive(Debug, Default)]
pub(crate) struct BackStack {
    entries: Vec<RecordId>,
    indices: Vec<Option<RecordId>>,
    available: Vec<usize>,
}

impl BackStack {
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn get(&self, position: usize) -> Option<RecordId> {
        self.entries.get(position).copied()
    }

    pub(crate) fn entries(&self) -> &[RecordId] {
        &self.entries
    }

    pub(crate) fn contains(&self, record: RecordId) -> bool {
        self.entries.contains(&record)
    }

    pub(crate) fn push(&mut self, record: RecordId) {
        self.entries.push(record);
    }

    /// Next free index, reusing the most recently freed one first.
    pub(crate) fn alloc_index(&mut self, record: RecordId) -> usize {
        match self.available.pop() {
            Some(index) => {
                self.indices[index] = Some(record);
                index
            }
            None => {
                self.indices.push(Some(record));
                self.indices.len() - 1
            }
        }
    }

    /// Seat `record` at exactly `index`, marking skipped slots as free.
    pub(crate) fn set_index(&mut self, index: usize, record: RecordId) {
        if index < self.indices.len() {
            self.available.retain(|i| *i != index);
            self.indices[index] = Some(record);
            return;
        }
        while self.indices.len() < index {
            self.available.push(self.indices.len());
            self.indices.push(None);
        }
        self.indices.push(Some(record));
    }

    pub(crate) fn free_index(&mut self, index: usize) {
        if let Some(slot) = self.indices.get_mut(index) {
            *slot = None;
            self.available.push(index);
        }
    }

    /// Remove the entries a pop consumes, topmost first.
    ///
    /// `matches` decides whether an entry satisfies a name or id target.
    /// Returns an empty list when nothing is popped.
    pub(crate) fn pop_to(
        &mut self,
        target: &PopTarget,
        inclusive: bool,
        matches: impl Fn(RecordId) -> bool,
    ) -> Vec<RecordId> {
        if matches!(target, PopTarget::Top) && !inclusive {
            return self.entries.pop().into_iter().collect();
        }

        // Index of the highest entry that survives the pop, if any.
        let keep = if matches!(target, PopTarget::Top) {
            None
        } else {
            let Some(pos) = self.entries.iter().rposition(|r| matches(*r)) else {
                return Vec::new();
            };
            if inclusive {
                // Consume every consecutive match below the topmost one.
                let mut keep = pos.checked_sub(1);
                while let Some(k) = keep {
                    if !matches(self.entries[k]) {
                        break;
                    }
                    keep = k.checked_sub(1);
                }
                keep
            } else {
                Some(pos)
            }
        };

        let from = keep.map_or(0, |k| k + 1);
        if from >= self.entries.len() {
            return Vec::new();
        }
        let mut popped = self.entries.split_off(from);
        popped.reverse();
        popped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stack(n: u64) -> BackStack {
        let mut stack = BackStack::default();
        for i in 0..n {
            let record = RecordId(i);
            stack.alloc_index(record);
            stack.push(record);
        }
        stack
    }

    #[test]
    fn test_negative_id_rejected() {
        assert!(matches!(
            BackStackId::new(-1),
            Err(ManagerError::InvalidBackStackId(-1))
        ));
        assert_eq!(BackStackId::new(4).unwrap().index(), 4);
    }

    #[test]
    fn test_index_reuse_after_free() {
        let mut stack = BackStack::default();
        let a = stack.alloc_index(RecordId(1));
        let b = stack.alloc_index(RecordId(2));
        stack.free_index(b);
        let c = stack.alloc_index(RecordId(3));
        assert_eq!((a, b, c), (0, 1, 1));
    }

    #[test]
    fn test_set_index_fills_gaps_into_free_list() {
        let mut stack = BackStack::default();
        stack.set_index(3, RecordId(9));
        assert_eq!(stack.alloc_index(RecordId(10)), 2);
        assert_eq!(stack.alloc_index(RecordId(11)), 1);
        assert_eq!(stack.alloc_index(RecordId(12)), 0);
        assert_eq!(stack.alloc_index(RecordId(13)), 4);
    }

    #[test]
    fn test_pop_top_only_one() {
        let mut stack = stack(3);
        assert_eq!(stack.pop_to(&PopTarget::Top, false, |_| false), vec![RecordId(2)]);
        assert_eq!(stack.len(), 2);
    }

    #[test]
    fn test_pop_top_inclusive_pops_everything() {
        let mut stack = stack(3);
        let popped = stack.pop_to(&PopTarget::Top, true, |_| false);
        assert_eq!(popped, vec![RecordId(2), RecordId(1), RecordId(0)]);
        assert_eq!(stack.len(), 0);
    }

    #[test]
    fn test_pop_to_name_exclusive_and_inclusive() {
        // Entries 0..5 where 1 and 2 carry the matching name.
        let named = |r: RecordId| r == RecordId(1) || r == RecordId(2);
        let target = PopTarget::Name("settings".into());

        let mut exclusive = stack(5);
        assert_eq!(
            exclusive.pop_to(&target, false, named),
            vec![RecordId(4), RecordId(3)]
        );

        let mut inclusive = stack(5);
        assert_eq!(
            inclusive.pop_to(&target, true, named),
            vec![RecordId(4), RecordId(3), RecordId(2), RecordId(1)]
        );
        assert_eq!(inclusive.entries(), &[RecordId(0)]);
    }

    #[test]
    fn test_pop_missing_or_top_match_is_noop() {
        let mut stack = stack(2);
        let target = PopTarget::Name("nope".into());
        assert!(stack.pop_to(&target, true, |_| false).is_empty());
        assert!(stack.pop_to(&target, false, |r| r == RecordId(1)).is_empty());
        assert_eq!(stack.len(), 2);
    }

    #[test]
    fn test_pop_empty_stack() {
        let mut stack = BackStack::default();
        assert!(stack.pop_to(&PopTarget::Top, false, |_| true).is_empty());
        assert!(stack.pop_to(&PopTarget::Top, true, |_| true).is_empty());
    }
}
