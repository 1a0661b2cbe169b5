// ABOUTME: Type-safe identifiers and validated domain types.
// ABOUTME: Uses phantom types to prevent ID confusion at compile time.

mod bundle_id;
mod component_name;
mod id;

pub use bundle_id::{BundleId, ParseBundleIdError};
pub use component_name::{ComponentName, NameError};
pub use id::{ContainerId, ImageId, RunId};
