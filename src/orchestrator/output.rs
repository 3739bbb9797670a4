//! Process output fan-out and missing-dependency detection.

use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

/// Which pipeline process produced a chunk of output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessRole {
    Install,
    Server,
}

impl ProcessRole {
    pub fn as_str(self) -> &'static str {
        match self {
            ProcessRole::Install => "install",
            ProcessRole::Server => "server",
        }
    }
}

impl fmt::Display for ProcessRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputChunk {
    pub role: ProcessRole,
    pub text: String,
}

static MISSING_MODULE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r#"(?i)Cannot find module '([^']+)'"#,
        r#"(?i)Can't resolve '([^']+)'"#,
        r#"(?i)Cannot resolve module '([^']+)'"#,
        r#"(?i)Failed to resolve import "([^"]+)""#,
    ]
    .into_iter()
    .filter_map(|pattern| Regex::new(pattern).ok())
    .collect()
});

/// Package name behind the first unresolved-module error in `output`.
/// Relative, absolute and `node:` specifiers are not packages.
pub fn detect_missing_dependency(output: &str) -> Option<String> {
    MISSING_MODULE_PATTERNS
        .iter()
        .filter_map(|pattern| pattern.captures(output)?.get(1))
        .find_map(|specifier| package_name(specifier.as_str()))
}

fn package_name(specifier: &str) -> Option<String> {
    if specifier.starts_with('.') || specifier.starts_with('/') || specifier.starts_with("node:") {
        return None;
    }

    let mut segments = specifier.split('/');
    let first = segments.next().filter(|s| !s.is_empty())?;
    if first.starts_with('@') {
        let name = segments.next().filter(|s| !s.is_empty())?;
        Some(format!("{first}/{name}"))
    } else {
        Some(first.to_string())
    }
}

/// Accumulates server output across chunks so split error lines still match.
#[derive(Debug)]
pub struct MissingDependencyScanner {
    buffer: String,
    capacity: usize,
}

impl Default for MissingDependencyScanner {
    fn default() -> Self {
        Self::with_capacity(16 * 1024)
    }
}

impl MissingDependencyScanner {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: String::new(),
            capacity,
        }
    }

    /// Feed a chunk. Returns a package once per detection; the buffer is
    /// cleared after a hit.
    pub fn push(&mut self, chunk: &str) -> Option<String> {
        self.buffer.push_str(chunk);
        if self.buffer.len() > self.capacity {
            let mut cut = self.buffer.len() - self.capacity;
            while !self.buffer.is_char_boundary(cut) {
                cut += 1;
            }
            self.buffer.drain(..cut);
        }

        let found = detect_missing_dependency(&self.buffer);
        if found.is_some() {
            self.buffer.clear();
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_bare_and_scoped_packages() {
        assert_eq!(
            detect_missing_dependency("Error: Cannot find module 'lodash/fp'"),
            Some("lodash".into())
        );
        assert_eq!(
            detect_missing_dependency("Module not found: Error: Can't resolve '@mui/material/Button'"),
            Some("@mui/material".into())
        );
        assert_eq!(
            detect_missing_dependency(
                r#"[vite] Internal server error: Failed to resolve import "react-router-dom" from "src/App.jsx""#
            ),
            Some("react-router-dom".into())
        );
    }

    #[test]
    fn ignores_local_specifiers() {
        assert_eq!(detect_missing_dependency("Cannot find module './App'"), None);
        assert_eq!(detect_missing_dependency("Cannot find module '../util'"), None);
        assert_eq!(detect_missing_dependency("Cannot find module '/abs/path'"), None);
        assert_eq!(detect_missing_dependency("Cannot find module 'node:fs'"), None);
        assert_eq!(detect_missing_dependency("Cannot find module '@scope'"), None);
        assert_eq!(detect_missing_dependency("VITE v5.0.0 ready in 300 ms"), None);
    }

    #[test]
    fn scanner_joins_split_chunks() {
        let mut scanner = MissingDependencyScanner::default();
        assert_eq!(scanner.push("Error: Cannot find mod"), None);
        assert_eq!(scanner.push("ule 'axios'\n"), Some("axios".into()));
        assert_eq!(scanner.push("listening\n"), None);
    }

    #[test]
    fn scanner_keeps_a_bounded_tail() {
        let mut scanner = MissingDependencyScanner::with_capacity(8);
        scanner.push("ééééééééé");
        assert!(scanner.buffer.len() <= 9);
        assert!(scanner.buffer.is_char_boundary(0));
    }
}
