//! Listener lifecycle: one live subscription per store, reconnected with
//! exponential backoff on transient failures.

mod manager;
mod retry_policy;
mod state;

pub use manager::{ListenerAction, ListenerManager, ListenerSignal};
pub use retry_policy::RetryPolicy;
pub use state::ListenerState;
