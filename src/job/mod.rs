//! Job records, typed job kinds, and the job store.

pub mod kind;
pub mod record;
pub mod sled_store;
pub mod store;

pub use kind::{JobKind, JobSpec};
pub use record::{JobFilter, JobRecord, JobStatus, NewJob};
pub use sled_store::SledJobStore;
pub use store::{InMemoryJobStore, JobStore};
