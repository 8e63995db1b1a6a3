//! MPE Service
//!
//! Async orchestration of the progression engine over a persistence
//! collaborator:
//! - [`ProgressionStore`]: the data access contract, with compare-and-set
//!   saves and idempotent reward increments
//! - [`InMemoryStore`]: a concurrent in-process implementation
//! - [`ProgressionService`]: view, start, submit, moderate, reconcile and
//!   test-mode sessions

pub mod memory;
pub mod service;
pub mod store;

pub use memory::InMemoryStore;
pub use service::{Actor, ProgressionService, ProgressionView, ServiceError, SubmissionReceipt};
pub use store::{ProgressionStore, StoreError};
