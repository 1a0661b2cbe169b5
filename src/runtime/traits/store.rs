// ABOUTME: Data store collaborators consumed by capture and restore.
// ABOUTME: A relational store that dumps and loads, and a KV store with async snapshots.

use async_trait::async_trait;
use bytes::Bytes;

/// A relational database reachable for logical dumps.
#[async_trait]
pub trait RelationalStore: Send + Sync {
    /// Check that the database accepts connections.
    async fn ping(&self) -> Result<(), StoreError>;

    /// Produce a logical dump that recreates every object it contains when
    /// replayed, dropping existing objects first and carrying no ownership
    /// or privilege statements.
    async fn dump(&self) -> Result<Bytes, StoreError>;

    /// Replay a dump produced by [`RelationalStore::dump`].
    async fn load(&self, dump: Bytes) -> Result<(), StoreError>;
}

/// An in-memory key-value store that persists snapshots in the background.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Check that the store answers requests.
    async fn ping(&self) -> Result<(), StoreError>;

    /// Ask the store to write a snapshot asynchronously.
    async fn trigger_async_save(&self) -> Result<(), StoreError>;

    /// Marker of the last completed snapshot; changes once a save finishes.
    async fn last_save_marker(&self) -> Result<i64, StoreError>;
}

/// Errors from data store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unreachable: {0}")]
    Unreachable(String),

    #[error("`{command}` exited with code {code}: {stderr}")]
    CommandFailed {
        command: String,
        code: i64,
        stderr: String,
    },

    #[error("unexpected store response: {0}")]
    Protocol(String),

    #[error("runtime error: {0}")]
    Runtime(String),
}
