//! Sandbox runtime abstraction for the preview pipeline.
//!
//! Defines the [`SandboxRuntime`] and [`SandboxFs`] traits that a
//! browser-hosted runtime adapter must implement, plus the process and
//! listener handles they hand back. Two pieces live alongside the traits:
//!
//! - [`context::RuntimeContext`]: lazily boots the single runtime handle and
//!   shares it between activations
//! - [`memory::MemoryRuntime`]: in-process runtime with a scripted process
//!   table, used by the test suite and for dry runs

pub mod context;
pub mod memory;

pub use context::{RuntimeBooter, RuntimeContext};

use crate::tree::FileTree;
use async_trait::async_trait;
use futures_util::future::BoxFuture;
use futures_util::stream::BoxStream;

/// Kind of a filesystem entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// A directory listing entry with type information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub kind: EntryKind,
}

/// Options for [`SandboxFs::rm`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RmOptions {
    pub recursive: bool,
    pub force: bool,
}

impl RmOptions {
    pub const fn recursive_forced() -> Self {
        Self {
            recursive: true,
            force: true,
        }
    }
}

/// A value the runtime rejected an operation with.
///
/// Browser runtimes do not always reject with proper errors; adapters wrap
/// whatever they received so callers can still recover a message.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Rejection {
    /// An error object carrying a message.
    #[error("{message}")]
    Error { message: String },
    /// A bare string.
    #[error("{0}")]
    Text(String),
    /// Any other value.
    #[error("{0}")]
    Value(serde_json::Value),
}

impl Rejection {
    pub fn error(message: impl Into<String>) -> Self {
        Rejection::Error {
            message: message.into(),
        }
    }
}

/// Path-addressed filesystem of the sandbox. All paths lead with `/`.
#[async_trait]
pub trait SandboxFs: Send + Sync {
    /// Return the kind of the entry at `path`, failing if it does not exist.
    async fn stat(&self, path: &str) -> anyhow::Result<EntryKind>;

    /// Read a UTF-8 file.
    async fn read_file(&self, path: &str) -> anyhow::Result<String>;

    /// Create or overwrite a file. The parent directory must exist.
    async fn write_file(&self, path: &str, contents: &str) -> anyhow::Result<()>;

    /// List the names of a directory's children.
    async fn read_dir(&self, path: &str) -> anyhow::Result<Vec<String>>;

    /// List a directory's children with their kinds.
    async fn read_dir_typed(&self, path: &str) -> anyhow::Result<Vec<DirEntry>>;

    /// Remove a file or directory.
    async fn rm(&self, path: &str, options: RmOptions) -> anyhow::Result<()>;

    /// `true` if `path` exists and is a regular file. Errors count as absent.
    async fn is_file(&self, path: &str) -> bool {
        matches!(self.stat(path).await, Ok(EntryKind::File))
    }
}

/// Resolves with the process exit code.
pub type ExitFuture = BoxFuture<'static, anyhow::Result<i32>>;

/// Output chunks as the process writes them.
pub type OutputStream = BoxStream<'static, String>;

/// Terminates a running process.
pub type KillFn = Box<dyn FnOnce() -> anyhow::Result<()> + Send>;

/// Handle to a process spawned inside the sandbox.
pub struct SpawnedProcess {
    pub exit: ExitFuture,
    pub output: OutputStream,
    pub kill: Option<KillFn>,
}

/// Callback fired with `(port, url)` once a server listens inside the sandbox.
pub type ServerReadyListener = Box<dyn Fn(u16, String) + Send + Sync>;

/// Registration of a [`ServerReadyListener`].
///
/// Dropping the handle keeps the listener registered; call
/// [`ListenerHandle::unregister`] to remove it.
pub struct ListenerHandle {
    unregister: Option<Box<dyn FnOnce() + Send>>,
}

impl ListenerHandle {
    pub fn new(unregister: impl FnOnce() + Send + 'static) -> Self {
        Self {
            unregister: Some(Box::new(unregister)),
        }
    }

    pub fn unregister(mut self) {
        if let Some(unregister) = self.unregister.take() {
            unregister();
        }
    }
}

impl std::fmt::Debug for ListenerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerHandle")
            .field("removable", &self.unregister.is_some())
            .finish()
    }
}

/// Provider-agnostic interface to a booted sandbox runtime.
#[async_trait]
pub trait SandboxRuntime: Send + Sync {
    /// Write a whole tree into the sandbox filesystem, merging with what is there.
    async fn mount(&self, tree: &FileTree) -> anyhow::Result<()>;

    /// Start `command args...` inside the sandbox.
    async fn spawn(&self, command: &str, args: &[String]) -> anyhow::Result<SpawnedProcess>;

    /// The runtime's filesystem.
    fn fs(&self) -> &dyn SandboxFs;

    /// Subscribe to "server-ready" events.
    fn on_server_ready(&self, listener: ServerReadyListener) -> ListenerHandle;
}
