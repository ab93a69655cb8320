//! Core domain types for the load agent
//!
//! This crate holds the vocabulary shared by the execution engine and its
//! callers: action requests with their argument templates, queue and worker
//! states, and the [`ActionInvoker`] capability through which every action
//! call is made. It has minimal dependencies and knows nothing about how
//! queues are scheduled.

pub mod action;
pub mod error;
pub mod invoker;
pub mod state;

// Re-export commonly used types at the crate root
pub use action::{ActionRequest, ArgumentTemplate};
pub use error::{InvokeError, InvokeResult};
pub use invoker::{ActionHandler, ActionInvoker, ComponentRepository};
pub use state::{QueueId, QueueState, WorkerState};
