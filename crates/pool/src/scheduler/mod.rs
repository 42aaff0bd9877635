//! The pool/scheduler: admission control, dispatch, completion
//! bookkeeping, and task finalization.
//!
//! All control state — the unit table, running set, pending queue, and
//! active tasks — is owned by a single actor task and mutated only by its
//! own event handlers. Parallelism happens inside execution units; the
//! scheduler only sends and receives asynchronous messages. Callers
//! suspend on a per-task completion future until every partition has
//! reported.

mod completion;
mod core;
mod dispatch;
mod handle;

pub use handle::Pool;
