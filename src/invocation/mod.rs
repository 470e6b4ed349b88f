//! End-to-end orchestration of one agent invocation.

pub mod coordinator;
pub mod error;
pub mod request;

pub use coordinator::{InvocationCoordinator, InvocationState};
pub use error::{InvocationError, InvocationResult};
pub use request::{InvocationOutcome, InvokeRequest, ValidatedRequest};
