//! Transactions: ordered batches of component operations.

mod builder;
mod op;
mod record;

pub use builder::Transaction;
pub use op::{Command, Op, OpAnimations, Transit};
pub use record::RecordId;

pub(crate) use builder::Binding;
pub(crate) use record::Record;
