//! Live preview runtime for generated web projects.
//!
//! Takes a loosely shaped set of generated files, turns it into a canonical
//! mount tree, and drives a browser-hosted sandbox runtime through reset,
//! mount, scaffolding, dependency install and dev-server start.
//!
//! The sandbox itself sits behind [`runtime::SandboxRuntime`]; embedders
//! supply an adapter and hand it to an [`orchestrator::Orchestrator`] through
//! a [`runtime::RuntimeContext`].

pub mod config;
pub mod logging;
pub mod orchestrator;
pub mod reconcile;
pub mod runtime;
pub mod scaffold;
pub mod tree;

pub use config::PreviewConfig;
pub use orchestrator::{Orchestrator, SessionSnapshot, SessionStatus};
pub use runtime::{RuntimeContext, SandboxFs, SandboxRuntime};
pub use tree::{normalize, FileNode, FileTree};
