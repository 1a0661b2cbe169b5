// ABOUTME: Point-in-time bundles of every configured data source.
// ABOUTME: Capture writes bundles, the catalog lists, validates and prunes them.

mod archive;
mod artifact;
mod bundle;
mod capture;
mod catalog;
mod error;

pub use artifact::{
    ArtifactError, ArtifactSource, CaptureContext, Captured, DataSource, RestoreContext,
    StoreFactory,
};
pub use bundle::{
    ArtifactKind, ArtifactRecord, Bundle, BundleMetadata, BundleStatus, METADATA_FILE,
};
pub use capture::{CaptureReport, CaptureSettings, SnapshotCapture};
pub use catalog::{PruneReport, SnapshotCatalog, Validation};
pub use error::{SnapshotError, SnapshotErrorKind};
