// ABOUTME: Data store collaborators backed by commands run inside containers.
// ABOUTME: ExecPostgres drives pg_dump/psql and ExecRedis drives redis-cli.

use crate::runtime::traits::{ExecConfig, ExecError, ExecOps, ExecResult, KvStore, RelationalStore, StoreError};
use crate::types::ContainerId;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

impl From<ExecError> for StoreError {
    fn from(e: ExecError) -> Self {
        match e {
            ExecError::ContainerNotFound(msg) | ExecError::ContainerNotRunning(msg) => {
                StoreError::Unreachable(msg)
            }
            other => StoreError::Runtime(other.to_string()),
        }
    }
}

fn check(config: &ExecConfig, result: ExecResult) -> Result<ExecResult, StoreError> {
    if result.success() {
        Ok(result)
    } else {
        Err(StoreError::CommandFailed {
            command: config.cmd.first().cloned().unwrap_or_default(),
            code: result.exit_code,
            stderr: result.stderr_lossy(),
        })
    }
}

// =============================================================================
// PostgreSQL
// =============================================================================

/// PostgreSQL reached through `pg_dump` and `psql` in its own container.
pub struct ExecPostgres<E: ExecOps> {
    exec: Arc<E>,
    container: ContainerId,
    user: String,
    database: String,
    password: Option<String>,
}

impl<E: ExecOps> ExecPostgres<E> {
    pub fn new(
        exec: Arc<E>,
        container: ContainerId,
        user: impl Into<String>,
        database: impl Into<String>,
        password: Option<String>,
    ) -> Self {
        Self {
            exec,
            container,
            user: user.into(),
            database: database.into(),
            password,
        }
    }

    fn command(&self, program: &str, args: &[&str]) -> ExecConfig {
        let mut cmd = vec![
            program.to_string(),
            "-U".to_string(),
            self.user.clone(),
            "-d".to_string(),
            self.database.clone(),
        ];
        cmd.extend(args.iter().map(|a| a.to_string()));

        let config = ExecConfig::new(cmd);
        match &self.password {
            Some(password) => config.env("PGPASSWORD", password),
            None => config,
        }
    }

    fn ping_command(&self) -> ExecConfig {
        self.command("pg_isready", &[])
    }

    fn dump_command(&self) -> ExecConfig {
        self.command(
            "pg_dump",
            &["--clean", "--if-exists", "--no-owner", "--no-privileges"],
        )
    }

    fn load_command(&self) -> ExecConfig {
        self.command("psql", &["--quiet", "-v", "ON_ERROR_STOP=1"])
    }
}

#[async_trait]
impl<E: ExecOps> RelationalStore for ExecPostgres<E> {
    async fn ping(&self) -> Result<(), StoreError> {
        let config = self.ping_command();
        let result = self.exec.exec(&self.container, &config, None).await?;
        check(&config, result).map(|_| ())
    }

    async fn dump(&self) -> Result<Bytes, StoreError> {
        let config = self.dump_command();
        let result = self.exec.exec(&self.container, &config, None).await?;
        let result = check(&config, result)?;
        Ok(Bytes::from(result.stdout))
    }

    async fn load(&self, dump: Bytes) -> Result<(), StoreError> {
        let config = self.load_command();
        let result = self.exec.exec(&self.container, &config, Some(dump)).await?;
        check(&config, result).map(|_| ())
    }
}

// =============================================================================
// Redis
// =============================================================================

/// Redis reached through `redis-cli` in its own container.
pub struct ExecRedis<E: ExecOps> {
    exec: Arc<E>,
    container: ContainerId,
    password: Option<String>,
}

impl<E: ExecOps> ExecRedis<E> {
    pub fn new(exec: Arc<E>, container: ContainerId, password: Option<String>) -> Self {
        Self {
            exec,
            container,
            password,
        }
    }

    fn command(&self, verb: &str) -> ExecConfig {
        let config = ExecConfig::new(["redis-cli", verb]);
        match &self.password {
            Some(password) => config.env("REDISCLI_AUTH", password),
            None => config,
        }
    }

    async fn run(&self, verb: &str) -> Result<String, StoreError> {
        let config = self.command(verb);
        let result = self.exec.exec(&self.container, &config, None).await?;
        let result = check(&config, result)?;
        let reply = result.stdout_lossy();

        // redis-cli exits 0 on server errors and prints them instead
        if reply.starts_with("ERR") || reply.starts_with("NOAUTH") || reply.starts_with("WRONGPASS") {
            return Err(StoreError::Protocol(reply));
        }
        Ok(reply)
    }
}

fn parse_bgsave_reply(reply: &str) -> Result<(), StoreError> {
    // "Background saving started", or "scheduled" when a rewrite is in progress
    if reply.starts_with("Background saving") {
        Ok(())
    } else {
        Err(StoreError::Protocol(format!("BGSAVE: {}", reply)))
    }
}

fn parse_lastsave_reply(reply: &str) -> Result<i64, StoreError> {
    reply
        .trim()
        .trim_start_matches("(integer) ")
        .parse::<i64>()
        .map_err(|_| StoreError::Protocol(format!("LASTSAVE: {}", reply)))
}

#[async_trait]
impl<E: ExecOps> KvStore for ExecRedis<E> {
    async fn ping(&self) -> Result<(), StoreError> {
        let reply = self.run("PING").await?;
        if reply == "PONG" {
            Ok(())
        } else {
            Err(StoreError::Protocol(format!("PING: {}", reply)))
        }
    }

    async fn trigger_async_save(&self) -> Result<(), StoreError> {
        let reply = self.run("BGSAVE").await?;
        parse_bgsave_reply(&reply)
    }

    async fn last_save_marker(&self) -> Result<i64, StoreError> {
        let reply = self.run("LASTSAVE").await?;
        parse_lastsave_reply(&reply)
    }
}
