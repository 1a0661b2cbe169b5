// ABOUTME: Diagnostics accumulator for non-fatal warnings during an operation.
// ABOUTME: Collects warnings that shouldn't fail a command but should be shown to users.

use crate::notify::NotifyReport;

/// Collects non-fatal warnings during capture, restore and update commands.
#[derive(Default)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    /// Record a warning, auto-logging it via tracing.
    pub fn warn(&mut self, warning: Warning) {
        tracing::warn!(kind = ?warning.kind, "{}", warning.message);
        self.warnings.push(warning);
    }

    /// Record one warning per channel that failed to deliver.
    pub fn notifications(&mut self, report: &NotifyReport) {
        for (channel, error) in &report.failed {
            self.warn(Warning::notification_failed(format!(
                "notification via {} failed: {}",
                channel, error
            )));
        }
    }

    /// Get all collected warnings.
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }
}

/// A non-fatal warning collected during an operation.
#[derive(Debug, Clone)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

impl Warning {
    pub fn notification_failed(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::NotificationFailed,
            message: message.into(),
        }
    }

    pub fn partial_bundle(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::PartialBundle,
            message: message.into(),
        }
    }
}

/// Categories of warnings that can occur during an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    /// A notification channel did not accept an event.
    NotificationFailed,
    /// A bundle was captured with at least one failed artifact.
    PartialBundle,
}
