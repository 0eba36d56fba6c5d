//! Desktop notifications for new HIGH priority content, delegated to an
//! external command (terminal-notifier by default).

use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use prismis_core::{ContentRecord, Priority};

const NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);

pub struct Notifier {
    high_priority_only: bool,
    command: String,
}

impl Notifier {
    pub fn new(high_priority_only: bool, command: impl Into<String>) -> Self {
        Self {
            high_priority_only,
            command: command.into(),
        }
    }

    /// Notify about a tick's new items. Failures are logged, never
    /// raised; notification is best-effort.
    pub async fn notify_new_content(&self, items: &[ContentRecord]) {
        if items.is_empty() {
            return;
        }

        let relevant: Vec<&ContentRecord> = if self.high_priority_only {
            items
                .iter()
                .filter(|item| item.priority == Some(Priority::High))
                .collect()
        } else {
            items.iter().collect()
        };
        if relevant.is_empty() {
            debug!("no high priority items to notify about");
            return;
        }

        let (subtitle, message) = if relevant.len() == 1 {
            let title: String = relevant[0].title.chars().take(50).collect();
            (title, "1 new high priority item".to_string())
        } else {
            (
                "Prismis".to_string(),
                format!("{} new high priority items", relevant.len()),
            )
        };

        let run = Command::new(&self.command)
            .args(["-title", "Prismis"])
            .args(["-subtitle", &subtitle])
            .args(["-message", &message])
            .args(["-sound", "default"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        match timeout(NOTIFY_TIMEOUT, run).await {
            Ok(Ok(status)) if status.success() => {
                info!(%message, "notification sent");
            }
            Ok(Ok(status)) => warn!(%status, "notification command failed"),
            Ok(Err(e)) => warn!(error = %e, command = %self.command, "notification command not runnable"),
            Err(_) => warn!(command = %self.command, "notification command timed out"),
        }
    }
}
