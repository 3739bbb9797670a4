//! Observable state of the preview session.

use crate::scaffold::FrameSandbox;
use crate::tree::FileTree;
use std::fmt;
use std::sync::Arc;

/// Pipeline stage of the current activation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SessionStatus {
    #[default]
    Idle,
    Resetting,
    Mounting,
    ConfiguringScaffold,
    InstallingDependencies,
    Starting,
    Running,
    /// Terminal failure; holds the display message (`"Error: ..."`).
    Error(String),
}

impl SessionStatus {
    /// Human readable label for display.
    pub fn label(&self) -> &str {
        match self {
            SessionStatus::Idle => "Initialising...",
            SessionStatus::Resetting => "Resetting environment...",
            SessionStatus::Mounting => "Mounting files...",
            SessionStatus::ConfiguringScaffold => "Configuring project...",
            SessionStatus::InstallingDependencies => "Installing dependencies...",
            SessionStatus::Starting => "Starting development server...",
            SessionStatus::Running => "Server running",
            SessionStatus::Error(message) => message,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, SessionStatus::Error(_))
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Point-in-time copy of the session.
#[derive(Debug, Clone, Default)]
pub struct SessionSnapshot {
    pub status: SessionStatus,
    /// Dev server URL once the runtime reported it ready.
    pub url: Option<String>,
    pub error_message: Option<String>,
    /// Tree mounted by the last activation that got past mounting.
    pub tree: Option<Arc<FileTree>>,
    /// Sandbox token set of the attached preview frame.
    pub frame: Option<FrameSandbox>,
    /// Packages the dev server reported as unresolvable.
    pub missing_dependencies: Vec<String>,
}

impl SessionSnapshot {
    pub fn is_running(&self) -> bool {
        self.status == SessionStatus::Running
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_label_is_the_message() {
        let status = SessionStatus::Error("Error: boom".into());
        assert_eq!(status.to_string(), "Error: boom");
        assert!(status.is_error());
        assert_eq!(SessionStatus::Running.label(), "Server running");
        assert_eq!(SessionStatus::default(), SessionStatus::Idle);
    }
}
