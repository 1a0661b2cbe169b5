// ABOUTME: Library root for bulwark - backup, restore and update safety for container deployments.
// ABOUTME: The CLI binary is in main.rs; everything it drives lives here.

pub mod config;
pub mod context;
pub mod diagnostics;
pub mod error;
pub mod health;
pub mod lock;
pub mod notify;
pub mod output;
pub mod poll;
pub mod restore;
pub mod runtime;
pub mod snapshot;
pub mod types;
pub mod update;
