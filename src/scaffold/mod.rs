//! Project scaffolding: make an arbitrary mounted file set runnable by Vite.
//!
//! Every step here is best-effort. Read failures fall back to safe defaults
//! and write failures are logged; nothing propagates to the caller.

pub mod entry;
pub mod html;
pub mod security;
pub mod templates;
pub mod vite;

use crate::config::WalkConfig;
use crate::runtime::SandboxFs;

pub use html::{ensure_index_html, IndexSource};
pub use security::{configure_sandbox_security, FrameSandbox};
pub use vite::{
    choose_vite_start_script, ensure_vite_config, ensure_vite_dependencies, toolchain_for,
    Toolchain,
};

/// Filesystem handle and walk bounds shared by the scaffold steps.
#[derive(Clone, Copy)]
pub struct ScaffoldContext<'a> {
    pub fs: &'a dyn SandboxFs,
    pub walk: &'a WalkConfig,
}

impl<'a> ScaffoldContext<'a> {
    pub fn new(fs: &'a dyn SandboxFs, walk: &'a WalkConfig) -> Self {
        Self { fs, walk }
    }
}
