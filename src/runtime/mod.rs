// ABOUTME: Container runtime collaborators for the lifecycle subsystem.
// ABOUTME: Traits, local runtime detection, and the bollard-backed implementation.

mod bollard;
mod detection;
mod error;
mod stores;
mod traits;
mod types;

pub use self::bollard::BollardRuntime;
pub use detection::{DetectionError, detect_local};
pub use error::{RuntimeError, RuntimeErrorKind};
pub use stores::{ExecPostgres, ExecRedis};
pub use traits::{
    ComponentHealth, ExecConfig, ExecError, ExecOps, ExecResult, KvStore, RelationalStore,
    ServiceError, ServiceOps, StoreError,
};
pub use types::{RuntimeConfig, RuntimeInfo, RuntimeType};
