//! Downstream dispatch for decoded market events.
//!
//! The read loop hands events to a bounded queue without ever blocking;
//! a single worker drains it in arrival order and posts each event to the
//! sink for its kind. Delivery is best-effort: failures are logged,
//! counted and dropped.

pub mod dispatcher;
pub mod error;
pub mod sink;

pub use dispatcher::{dispatch_channel, DispatchConfig, DispatchHandle, DispatchWorker};
pub use error::{DispatchError, DispatchResult};
pub use sink::{EventSink, HttpSink};
