//! Sandbox token list of the frame that hosts the preview.

use std::fmt;

/// Tokens the preview needs to run scripts, submit forms and open dialogs.
pub const SANDBOX_TOKENS: &[&str] = &[
    "allow-scripts",
    "allow-same-origin",
    "allow-forms",
    "allow-modals",
];

/// Ordered, duplicate-free set of frame sandbox tokens.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameSandbox {
    tokens: Vec<String>,
}

impl FrameSandbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a whitespace-separated attribute value.
    pub fn parse(attribute: &str) -> Self {
        let mut sandbox = Self::new();
        for token in attribute.split_whitespace() {
            sandbox.add(token);
        }
        sandbox
    }

    /// Add `token`; returns `false` if it was already present.
    pub fn add(&mut self, token: &str) -> bool {
        if self.contains(token) {
            return false;
        }
        self.tokens.push(token.to_string());
        true
    }

    pub fn contains(&self, token: &str) -> bool {
        self.tokens.iter().any(|t| t == token)
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }
}

impl fmt::Display for FrameSandbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.tokens.join(" "))
    }
}

/// Grant the preview frame its required sandbox tokens.
pub fn configure_sandbox_security(frame: Option<&mut FrameSandbox>) {
    let Some(frame) = frame else {
        tracing::debug!("No preview frame attached; skipping sandbox configuration");
        return;
    };
    let added = SANDBOX_TOKENS.iter().filter(|token| frame.add(token)).count();
    tracing::debug!("Frame sandbox: \"{frame}\" ({added} added)");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adds_required_tokens_once() {
        let mut frame = FrameSandbox::parse("allow-popups allow-scripts");

        configure_sandbox_security(Some(&mut frame));
        configure_sandbox_security(Some(&mut frame));

        assert_eq!(
            frame.to_string(),
            "allow-popups allow-scripts allow-same-origin allow-forms allow-modals"
        );
        assert!(SANDBOX_TOKENS.iter().all(|t| frame.contains(t)));
    }

    #[test]
    fn missing_frame_is_noop() {
        configure_sandbox_security(None);
    }

    #[test]
    fn parse_drops_duplicates() {
        let frame = FrameSandbox::parse("  allow-forms\tallow-forms ");
        assert_eq!(frame.tokens(), ["allow-forms".to_string()]);
    }
}
