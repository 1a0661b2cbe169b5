// ABOUTME: Command module aggregator for the bulwark CLI.
// ABOUTME: Re-exports one handler per subcommand.

mod apply;
mod capture;
mod catalog;
mod check;
mod restore;
mod runtime_connection;
mod status;

pub use apply::apply;
pub use capture::capture;
pub use catalog::{list, prune};
pub use check::check;
pub use restore::restore;
pub use status::status;

use bulwark::error::{Error, Result};
use bulwark::types::ComponentName;

/// Parse a user-supplied name the same way config names are parsed.
fn parse_name(value: &str) -> Result<ComponentName> {
    ComponentName::new(value).map_err(|e| Error::InvalidConfig(format!("{}: {}", value, e)))
}
