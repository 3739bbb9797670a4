//! Best-effort wipe of the sandbox filesystem before a new session is mounted.
//!
//! The root is listed once. Dot-prefixed entries survive, the critical
//! project directories are removed recursively, and every other entry gets a
//! plain removal. A failed listing aborts the reset without touching
//! anything; a failed removal is logged and the next entry is tried.

use crate::runtime::{RmOptions, SandboxFs};

/// Root directories removed recursively on reset.
pub const CRITICAL_DIRS: &[&str] = &["src", "public", "node_modules"];

/// What a reset did to each root entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResetReport {
    pub removed: Vec<String>,
    pub failed: Vec<String>,
    pub skipped: Vec<String>,
    /// The root listing itself failed; nothing was removed.
    pub listing_failed: bool,
}

/// Clear mutable state from the sandbox root. A `None` handle is a no-op.
pub async fn reset(fs: Option<&dyn SandboxFs>) -> ResetReport {
    let mut report = ResetReport::default();
    let Some(fs) = fs else {
        return report;
    };

    let entries = match fs.read_dir("/").await {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!("Error during filesystem reset: {e:#}");
            report.listing_failed = true;
            return report;
        }
    };
    tracing::debug!("Current root entries: {entries:?}");

    for name in entries {
        if name.starts_with('.') {
            report.skipped.push(name);
            continue;
        }

        let options = if CRITICAL_DIRS.contains(&name.as_str()) {
            RmOptions::recursive_forced()
        } else {
            RmOptions::default()
        };

        match fs.rm(&format!("/{name}"), options).await {
            Ok(()) => {
                tracing::debug!("Removed {name}");
                report.removed.push(name);
            }
            Err(e) => {
                tracing::warn!("Error removing {name}: {e:#}");
                report.failed.push(name);
            }
        }
    }

    tracing::info!(
        removed = report.removed.len(),
        failed = report.failed.len(),
        "Filesystem reset complete"
    );
    report
}
