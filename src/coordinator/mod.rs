//! Worker coordination.
//!
//! Evaluations run in external worker processes. The coordinator reaches
//! them only through a [`Mailbox`]: workers announce themselves, receive
//! one job at a time in an inbox and answer through an outbox. A job is
//! done once the outbox exists and the inbox has been consumed.
//!
//! The coordinator itself is single-threaded. [`DistributedSearch`] polls
//! the [`WorkerPool`] on a fixed interval; [`SurrogatedSearch`] wraps the
//! same pool with a surrogate-model outer loop.

mod mailbox;
mod memory;
mod pool;
mod run;
mod surrogated;

pub use mailbox::{FileMailbox, Mailbox, MailboxError};
pub use memory::MemoryMailbox;
pub use pool::WorkerPool;
pub use run::DistributedSearch;
pub use surrogated::{SurrogateModel, SurrogatedSearch};

/// Worker identifier, chosen by the worker when it announces itself.
pub type WorkerId = u32;
