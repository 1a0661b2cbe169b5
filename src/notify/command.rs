// ABOUTME: Notification channel that runs an executable per event.
// ABOUTME: The event is passed through BULWARK_SUBJECT, BULWARK_BODY and BULWARK_SEVERITY.

use super::{Channel, Event, NotifyError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;

/// Runs an executable with the event in its environment.
#[derive(Debug, Clone)]
pub struct CommandChannel {
    path: PathBuf,
}

impl CommandChannel {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn env(event: &Event) -> HashMap<&'static str, String> {
        let mut env = HashMap::new();
        env.insert("BULWARK_SUBJECT", event.subject.clone());
        env.insert("BULWARK_BODY", event.body.clone());
        env.insert("BULWARK_SEVERITY", event.severity.to_string());
        env
    }
}

#[async_trait]
impl Channel for CommandChannel {
    fn label(&self) -> String {
        format!("command:{}", self.path.display())
    }

    async fn deliver(&self, event: &Event) -> Result<(), NotifyError> {
        let output = Command::new(&self.path)
            .envs(Self::env(event))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await?;

        if output.status.success() {
            Ok(())
        } else {
            Err(NotifyError::Command {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}
