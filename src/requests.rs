//! Correlation of outbound requests with the component that made them.
//!
//! A request code is 16 bits. The registry packs a slot number into the
//! upper half so the result can be routed back: `((slot + 1) << 16) | code`.

use std::collections::HashMap;

use crate::component::ComponentId;
use crate::config::MAX_REQUEST_SLOTS;
use crate::error::{ManagerError, Result};

#[derive(Debug)]
pub(crate) struct PendingRequests {
    limit: u32,
    next_candidate: u32,
    pending: HashMap<u32, ComponentId>,
}

impl PendingRequests {
    pub(crate) fn new(limit: u32) -> Self {
        Self {
            limit: limit.min(MAX_REQUEST_SLOTS),
            next_candidate: 0,
            pending: HashMap::new(),
        }
    }

    /// Reserve a slot and return the packed code.
    pub(crate) fn register(&mut self, component: ComponentId, code: u32) -> Result<u32> {
        if code & 0xffff_0000 != 0 {
            return Err(ManagerError::RequestCodeOutOfRange(code));
        }
        if self.pending.len() as u32 >= self.limit {
            return Err(ManagerError::TooManyPendingRequests { limit: self.limit });
        }
        let mut slot = self.next_candidate;
        while self.pending.contains_key(&slot) {
            slot = (slot + 1) % self.limit;
        }
        self.pending.insert(slot, component);
        self.next_candidate = (slot + 1) % self.limit;
        Ok(((slot + 1) << 16) | code)
    }

    /// Release the slot behind `packed`. Unknown or already resolved codes
    /// yield `None`.
    pub(crate) fn resolve(&mut self, packed: u32) -> Option<(ComponentId, u16)> {
        let slot = (packed >> 16).checked_sub(1)?;
        let code = (packed & 0xffff) as u16;
        self.pending.remove(&slot).map(|component| (component, code))
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }
}
