//! In-process sandbox runtime.
//!
//! Keeps the filesystem in memory, answers `spawn` from a table of scripted
//! processes, and records every runtime call so tests can assert ordering.
//! Failures can be injected per path to exercise recovery paths.

use super::{
    DirEntry, EntryKind, ExitFuture, KillFn, ListenerHandle, Rejection, RmOptions, SandboxFs,
    SandboxRuntime, ServerReadyListener, SpawnedProcess,
};
use crate::tree::{FileNode, FileTree};
use async_trait::async_trait;
use futures_util::{stream, FutureExt, StreamExt};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;

/// Exit code reported for processes terminated through their kill handle.
pub const KILLED_EXIT_CODE: i32 = 143;

/// A call observed by [`MemoryRuntime`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeCall {
    Mount(FileTree),
    Spawn { command: String, args: Vec<String> },
    Kill { command: String, args: Vec<String> },
    ReadDir(String),
    WriteFile(String),
    Rm { path: String, options: RmOptions },
}

/// Behaviour of a scripted process.
#[derive(Debug, Clone, Default)]
pub struct ProcessScript {
    /// Chunks yielded on the output stream.
    pub output: Vec<String>,
    /// `None` keeps the process running until killed.
    pub exit_code: Option<i32>,
    /// Fire "server-ready" with `(port, url)` as soon as the process spawns.
    pub ready: Option<(u16, String)>,
    /// Reject the spawn itself with this message.
    pub spawn_error: Option<String>,
}

impl ProcessScript {
    pub fn exits(code: i32) -> Self {
        Self {
            exit_code: Some(code),
            ..Self::default()
        }
    }

    /// A long-running server that announces itself on `port`.
    pub fn server(port: u16, url: impl Into<String>) -> Self {
        Self {
            ready: Some((port, url.into())),
            ..Self::default()
        }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            spawn_error: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn with_output<I, S>(mut self, chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output = chunks.into_iter().map(Into::into).collect();
        self
    }
}

#[derive(Default)]
struct FsState {
    files: BTreeMap<String, String>,
    dirs: BTreeSet<String>,
}

impl FsState {
    fn kind(&self, path: &str) -> Option<EntryKind> {
        if path == "/" || self.dirs.contains(path) {
            Some(EntryKind::Directory)
        } else if self.files.contains_key(path) {
            Some(EntryKind::File)
        } else {
            None
        }
    }

    fn children(&self, dir: &str) -> Vec<DirEntry> {
        let prefix = if dir == "/" { "/".to_string() } else { format!("{dir}/") };
        let direct = |path: &String| {
            path.strip_prefix(&prefix)
                .filter(|rest| !rest.is_empty() && !rest.contains('/'))
                .map(str::to_string)
        };
        let mut entries: Vec<DirEntry> = self
            .dirs
            .iter()
            .filter_map(|p| direct(p).map(|name| DirEntry { name, kind: EntryKind::Directory }))
            .chain(
                self.files
                    .keys()
                    .filter_map(|p| direct(p).map(|name| DirEntry { name, kind: EntryKind::File })),
            )
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        entries
    }

    fn mount(&mut self, tree: &FileTree, base: &str) {
        for (name, node) in tree {
            let path = if base == "/" { format!("/{name}") } else { format!("{base}/{name}") };
            match node {
                FileNode::File { contents } => {
                    self.dirs.remove(&path);
                    self.files.insert(path, contents.clone());
                }
                FileNode::Directory(children) => {
                    self.files.remove(&path);
                    self.dirs.insert(path.clone());
                    self.mount(children, &path);
                }
            }
        }
    }

    fn remove_tree(&mut self, path: &str) {
        let prefix = format!("{path}/");
        self.files.retain(|p, _| !p.starts_with(&prefix));
        self.dirs.retain(|p| p != path && !p.starts_with(&prefix));
    }
}

fn parent_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(idx) => &path[..idx],
    }
}

fn not_found(op: &str, path: &str) -> anyhow::Error {
    Rejection::error(format!("ENOENT: no such file or directory, {op} '{path}'")).into()
}

/// In-memory filesystem half of [`MemoryRuntime`].
pub struct MemoryFs {
    state: Mutex<FsState>,
    calls: Arc<Mutex<Vec<RuntimeCall>>>,
    failing_reads: Mutex<HashSet<String>>,
    failing_removals: Mutex<HashMap<String, Rejection>>,
}

impl MemoryFs {
    fn new(calls: Arc<Mutex<Vec<RuntimeCall>>>) -> Self {
        Self {
            state: Mutex::new(FsState::default()),
            calls,
            failing_reads: Mutex::new(HashSet::new()),
            failing_removals: Mutex::new(HashMap::new()),
        }
    }

    /// Seed a file, creating parent directories.
    pub fn insert_file(&self, path: &str, contents: &str) {
        let mut state = self.state.lock();
        let mut dir = parent_of(path);
        while dir != "/" {
            state.dirs.insert(dir.to_string());
            dir = parent_of(dir);
        }
        state.files.insert(path.to_string(), contents.to_string());
    }

    /// Seed an empty directory, creating parents.
    pub fn insert_dir(&self, path: &str) {
        let mut state = self.state.lock();
        let mut dir = path;
        while dir != "/" {
            state.dirs.insert(dir.to_string());
            dir = parent_of(dir);
        }
    }

    pub fn contents(&self, path: &str) -> Option<String> {
        self.state.lock().files.get(path).cloned()
    }

    pub fn exists(&self, path: &str) -> bool {
        self.state.lock().kind(path).is_some()
    }

    /// Make directory listings and file reads of `path` fail.
    pub fn fail_reads(&self, path: &str) {
        self.failing_reads.lock().insert(path.to_string());
    }

    /// Make removals of `path` reject with `rejection`.
    pub fn fail_removal(&self, path: &str, rejection: Rejection) {
        self.failing_removals.lock().insert(path.to_string(), rejection);
    }

    fn check_read(&self, op: &str, path: &str) -> anyhow::Result<()> {
        if self.failing_reads.lock().contains(path) {
            return Err(Rejection::error(format!("EIO: i/o error, {op} '{path}'")).into());
        }
        Ok(())
    }

    fn record(&self, call: RuntimeCall) {
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl SandboxFs for MemoryFs {
    async fn stat(&self, path: &str) -> anyhow::Result<EntryKind> {
        self.state.lock().kind(path).ok_or_else(|| not_found("stat", path))
    }

    async fn read_file(&self, path: &str) -> anyhow::Result<String> {
        self.check_read("open", path)?;
        let state = self.state.lock();
        match state.kind(path) {
            Some(EntryKind::File) => Ok(state.files[path].clone()),
            Some(EntryKind::Directory) => Err(Rejection::error(format!(
                "EISDIR: illegal operation on a directory, read '{path}'"
            ))
            .into()),
            None => Err(not_found("open", path)),
        }
    }

    async fn write_file(&self, path: &str, contents: &str) -> anyhow::Result<()> {
        self.record(RuntimeCall::WriteFile(path.to_string()));
        let mut state = self.state.lock();
        if state.kind(parent_of(path)) != Some(EntryKind::Directory) {
            return Err(not_found("open", path));
        }
        if state.dirs.contains(path) {
            return Err(Rejection::error(format!(
                "EISDIR: illegal operation on a directory, open '{path}'"
            ))
            .into());
        }
        state.files.insert(path.to_string(), contents.to_string());
        Ok(())
    }

    async fn read_dir(&self, path: &str) -> anyhow::Result<Vec<String>> {
        Ok(self
            .read_dir_typed(path)
            .await?
            .into_iter()
            .map(|entry| entry.name)
            .collect())
    }

    async fn read_dir_typed(&self, path: &str) -> anyhow::Result<Vec<DirEntry>> {
        self.record(RuntimeCall::ReadDir(path.to_string()));
        self.check_read("scandir", path)?;
        let state = self.state.lock();
        match state.kind(path) {
            Some(EntryKind::Directory) => Ok(state.children(path)),
            Some(EntryKind::File) => Err(Rejection::error(format!(
                "ENOTDIR: not a directory, scandir '{path}'"
            ))
            .into()),
            None => Err(not_found("scandir", path)),
        }
    }

    async fn rm(&self, path: &str, options: RmOptions) -> anyhow::Result<()> {
        self.record(RuntimeCall::Rm {
            path: path.to_string(),
            options,
        });
        if let Some(rejection) = self.failing_removals.lock().get(path).cloned() {
            return Err(rejection.into());
        }

        let mut state = self.state.lock();
        match state.kind(path) {
            Some(EntryKind::File) => {
                state.files.remove(path);
                Ok(())
            }
            Some(EntryKind::Directory) if options.recursive => {
                state.remove_tree(path);
                Ok(())
            }
            Some(EntryKind::Directory) => Err(Rejection::error(format!(
                "EISDIR: is a directory, rm '{path}'"
            ))
            .into()),
            None if options.force => Ok(()),
            None => Err(not_found("rm", path)),
        }
    }
}

type SharedListener = Arc<ServerReadyListener>;

/// In-memory [`SandboxRuntime`].
pub struct MemoryRuntime {
    fs: MemoryFs,
    calls: Arc<Mutex<Vec<RuntimeCall>>>,
    scripts: Mutex<HashMap<String, ProcessScript>>,
    listeners: Arc<Mutex<Vec<(u64, SharedListener)>>>,
    next_listener: AtomicU64,
    mount_error: Mutex<Option<Rejection>>,
}

impl Default for MemoryRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRuntime {
    pub fn new() -> Self {
        let calls = Arc::new(Mutex::new(Vec::new()));
        Self {
            fs: MemoryFs::new(Arc::clone(&calls)),
            calls,
            scripts: Mutex::new(HashMap::new()),
            listeners: Arc::new(Mutex::new(Vec::new())),
            next_listener: AtomicU64::new(1),
            mount_error: Mutex::new(None),
        }
    }

    /// The in-memory filesystem, for seeding and inspection.
    pub fn memory_fs(&self) -> &MemoryFs {
        &self.fs
    }

    /// Script the process started by `command_line` (e.g. `"npm run dev"`).
    /// Unscripted processes exit 0 immediately without output.
    pub fn script(&self, command_line: &str, script: ProcessScript) {
        self.scripts.lock().insert(command_line.to_string(), script);
    }

    /// Make the next mounts reject with `rejection`.
    pub fn fail_mount(&self, rejection: Rejection) {
        *self.mount_error.lock() = Some(rejection);
    }

    pub fn calls(&self) -> Vec<RuntimeCall> {
        self.calls.lock().clone()
    }

    /// Spawned command lines, in order.
    pub fn spawned(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                RuntimeCall::Spawn { command, args } => Some(command_line(command, args)),
                _ => None,
            })
            .collect()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    /// Fire "server-ready" to every registered listener.
    pub fn emit_server_ready(&self, port: u16, url: &str) {
        let listeners: Vec<SharedListener> =
            self.listeners.lock().iter().map(|(_, l)| Arc::clone(l)).collect();
        for listener in listeners {
            listener(port, url.to_string());
        }
    }
}

fn command_line(command: &str, args: &[String]) -> String {
    std::iter::once(command)
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}

#[async_trait]
impl SandboxRuntime for MemoryRuntime {
    async fn mount(&self, tree: &FileTree) -> anyhow::Result<()> {
        self.calls.lock().push(RuntimeCall::Mount(tree.clone()));
        if let Some(rejection) = self.mount_error.lock().clone() {
            return Err(rejection.into());
        }
        self.fs.state.lock().mount(tree, "/");
        Ok(())
    }

    async fn spawn(&self, command: &str, args: &[String]) -> anyhow::Result<SpawnedProcess> {
        let args = args.to_vec();
        self.calls.lock().push(RuntimeCall::Spawn {
            command: command.to_string(),
            args: args.clone(),
        });

        let line = command_line(command, &args);
        let script = self.scripts.lock().get(&line).cloned().unwrap_or_else(|| ProcessScript::exits(0));
        if let Some(message) = script.spawn_error {
            return Err(Rejection::error(message).into());
        }

        let (kill_tx, kill_rx) = oneshot::channel::<i32>();
        let exit: ExitFuture = match script.exit_code {
            Some(code) => async move { Ok(code) }.boxed(),
            None => async move {
                match kill_rx.await {
                    Ok(code) => Ok(code),
                    Err(_) => std::future::pending().await,
                }
            }
            .boxed(),
        };

        let calls = Arc::clone(&self.calls);
        let command = command.to_string();
        let kill: KillFn = Box::new(move || -> anyhow::Result<()> {
            calls.lock().push(RuntimeCall::Kill { command, args });
            let _ = kill_tx.send(KILLED_EXIT_CODE);
            Ok(())
        });

        if let Some((port, url)) = script.ready {
            self.emit_server_ready(port, &url);
        }

        Ok(SpawnedProcess {
            exit,
            output: stream::iter(script.output).boxed(),
            kill: Some(kill),
        })
    }

    fn fs(&self) -> &dyn SandboxFs {
        &self.fs
    }

    fn on_server_ready(&self, listener: ServerReadyListener) -> ListenerHandle {
        let id = self.next_listener.fetch_add(1, Ordering::SeqCst);
        self.listeners.lock().push((id, Arc::new(listener)));
        let listeners = Arc::clone(&self.listeners);
        ListenerHandle::new(move || listeners.lock().retain(|(other, _)| *other != id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::FileNode;

    #[tokio::test]
    async fn mount_writes_tree_into_fs() {
        let runtime = MemoryRuntime::new();
        let mut src = FileTree::new();
        src.insert("main.js".into(), FileNode::file("x"));
        let mut tree = FileTree::new();
        tree.insert("src".into(), FileNode::Directory(src));

        runtime.mount(&tree).await.unwrap();

        let fs = runtime.fs();
        assert_eq!(fs.stat("/src").await.unwrap(), EntryKind::Directory);
        assert_eq!(fs.read_file("/src/main.js").await.unwrap(), "x");
        assert_eq!(fs.read_dir("/").await.unwrap(), vec!["src".to_string()]);
    }

    #[tokio::test]
    async fn rm_respects_recursive_and_force() {
        let runtime = MemoryRuntime::new();
        runtime.memory_fs().insert_file("/src/a.js", "a");
        let fs = runtime.fs();

        assert!(fs.rm("/src", RmOptions::default()).await.is_err());
        assert!(fs.rm("/missing", RmOptions::default()).await.is_err());
        assert!(fs.rm("/missing", RmOptions::recursive_forced()).await.is_ok());
        fs.rm("/src", RmOptions::recursive_forced()).await.unwrap();
        assert!(!runtime.memory_fs().exists("/src/a.js"));
        assert!(!runtime.memory_fs().exists("/src"));
    }

    #[tokio::test]
    async fn write_requires_parent_directory() {
        let runtime = MemoryRuntime::new();
        let fs = runtime.fs();

        assert!(fs.write_file("/nested/file.txt", "x").await.is_err());
        fs.write_file("/file.txt", "x").await.unwrap();
        assert!(fs.is_file("/file.txt").await);
    }

    #[tokio::test]
    async fn killed_server_reports_exit_code() {
        let runtime = MemoryRuntime::new();
        runtime.script("npm run dev", ProcessScript::server(5173, "http://localhost:5173"));

        let process = runtime.spawn("npm", &["run".into(), "dev".into()]).await.unwrap();
        (process.kill.unwrap())().unwrap();

        assert_eq!(process.exit.await.unwrap(), KILLED_EXIT_CODE);
        assert!(matches!(runtime.calls().last(), Some(RuntimeCall::Kill { .. })));
    }

    #[tokio::test]
    async fn scripted_output_is_streamed() {
        let runtime = MemoryRuntime::new();
        runtime.script("npm install", ProcessScript::exits(1).with_output(["added 0", "ERR!"]));

        let process = runtime.spawn("npm", &["install".into()]).await.unwrap();
        let output: Vec<String> = process.output.collect().await;

        assert_eq!(output, vec!["added 0", "ERR!"]);
        assert_eq!(process.exit.await.unwrap(), 1);
    }

    #[test]
    fn listeners_can_be_unregistered() {
        let runtime = MemoryRuntime::new();
        let fired = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&fired);
        let handle = runtime.on_server_ready(Box::new(move |port, url| sink.lock().push((port, url))));

        runtime.emit_server_ready(3000, "http://localhost:3000");
        handle.unregister();
        runtime.emit_server_ready(3001, "http://localhost:3001");

        assert_eq!(*fired.lock(), vec![(3000, "http://localhost:3000".to_string())]);
        assert_eq!(runtime.listener_count(), 0);
    }
}
