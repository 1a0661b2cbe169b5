// ABOUTME: Collaborator traits the lifecycle subsystem is written against.
// ABOUTME: Defines ServiceOps, RelationalStore, KvStore and the sealed ExecOps.

mod exec;
pub(crate) mod sealed;
mod service;
mod store;

pub use exec::{ExecConfig, ExecError, ExecOps, ExecResult};
pub use service::{ComponentHealth, ServiceError, ServiceOps};
pub use store::{KvStore, RelationalStore, StoreError};
