//! Preview session state machine.
//!
//! An activation runs `Resetting → Mounting → ConfiguringScaffold →
//! (InstallingDependencies) → Starting`, and the runtime's server-ready
//! signal moves the session to `Running`. Any failure ends the activation in
//! `Error` with a display message. Activations are not cancelled; when two
//! overlap, the last write to the session wins.

pub mod error;
pub mod output;
pub mod process;
pub mod session;

pub use error::{error_message, PreviewError};
pub use output::{detect_missing_dependency, OutputChunk, ProcessRole};
pub use session::{SessionSnapshot, SessionStatus};

use crate::config::PreviewConfig;
use crate::reconcile;
use crate::runtime::{
    ListenerHandle, OutputStream, RuntimeContext, SandboxRuntime, SpawnedProcess,
};
use crate::scaffold::{
    choose_vite_start_script, configure_sandbox_security, ensure_index_html,
    ensure_vite_config, ensure_vite_dependencies, vite::manifest_script_names, FrameSandbox,
    ScaffoldContext,
};
use crate::tree::{normalize_with_diagnostics, Normalized, RawFileSet};
use futures_util::StreamExt;
use output::MissingDependencyScanner;
use parking_lot::Mutex;
use process::ProcessTracker;
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

const STATUS_CHANNEL_CAPACITY: usize = 64;
const OUTPUT_CHANNEL_CAPACITY: usize = 256;

/// Drives preview sessions against a lazily booted sandbox runtime.
///
/// Cheap to clone; clones share the session.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    context: Arc<RuntimeContext>,
    config: PreviewConfig,
    session: Mutex<SessionSnapshot>,
    status_tx: broadcast::Sender<SessionStatus>,
    output_tx: broadcast::Sender<OutputChunk>,
    processes: ProcessTracker,
    /// Server-ready subscription, keyed by the runtime it was registered on.
    ready_listener: Mutex<Option<(usize, ListenerHandle)>>,
    last_sync: Mutex<SyncState>,
}

#[derive(Default)]
struct SyncState {
    files: Option<Arc<RawFileSet>>,
    runtime_ready: bool,
}

/// Identity of a runtime handle.
fn runtime_key(runtime: &Arc<dyn SandboxRuntime>) -> usize {
    Arc::as_ptr(runtime) as *const () as usize
}

impl Orchestrator {
    pub fn new(context: Arc<RuntimeContext>, config: PreviewConfig) -> Self {
        let (status_tx, _) = broadcast::channel(STATUS_CHANNEL_CAPACITY);
        let (output_tx, _) = broadcast::channel(OUTPUT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                context,
                config,
                session: Mutex::new(SessionSnapshot::default()),
                status_tx,
                output_tx,
                processes: ProcessTracker::default(),
                ready_listener: Mutex::new(None),
                last_sync: Mutex::new(SyncState::default()),
            }),
        }
    }

    /// Boot the runtime if needed. Concurrent callers share one boot.
    pub async fn boot(&self) -> anyhow::Result<Arc<dyn SandboxRuntime>> {
        self.inner.context.init().await
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.session.lock().clone()
    }

    /// Status transitions from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionStatus> {
        self.inner.status_tx.subscribe()
    }

    /// Install and server output from now on.
    pub fn subscribe_output(&self) -> broadcast::Receiver<OutputChunk> {
        self.inner.output_tx.subscribe()
    }

    /// Attach the frame hosting the preview; its sandbox tokens are widened
    /// whenever a dev server starts.
    pub fn attach_frame(&self, frame: FrameSandbox) {
        self.inner.session.lock().frame = Some(frame);
    }

    pub fn frame(&self) -> Option<FrameSandbox> {
        self.inner.session.lock().frame.clone()
    }

    /// Run one full activation for `files` and return the resulting session.
    /// Boots the runtime first if nothing has yet.
    pub async fn activate(&self, files: Arc<RawFileSet>) -> SessionSnapshot {
        let runtime = match self.boot().await {
            Ok(runtime) => runtime,
            Err(e) => {
                self.inner.fail(&PreviewError::Boot(format!("{e:#}")).into());
                return self.snapshot();
            }
        };

        if let Err(e) = self.run_pipeline(&runtime, &files).await {
            self.inner.fail(&e);
        }
        self.snapshot()
    }

    /// Re-activate in the background when `files` is a different set (by
    /// identity) from the last sync, or when the runtime became ready since.
    ///
    /// `sync` never boots the runtime. Before boot it only records `files`
    /// and returns `None`; the caller drives the not-ready → ready transition
    /// with [`Orchestrator::boot`] and then calls `sync` again, which
    /// activates the recorded set even if it is the same `Arc`.
    pub fn sync(&self, files: Option<Arc<RawFileSet>>) -> Option<JoinHandle<SessionSnapshot>> {
        let files = files?;
        let ready = self.inner.context.is_ready();

        {
            let mut last = self.inner.last_sync.lock();
            let files_changed = !last
                .files
                .as_ref()
                .is_some_and(|previous| Arc::ptr_eq(previous, &files));
            let became_ready = ready && !last.runtime_ready;
            last.files = Some(Arc::clone(&files));
            last.runtime_ready = ready;

            if !ready {
                tracing::debug!("Sandbox runtime not booted; deferring activation");
                return None;
            }
            if !files_changed && !became_ready {
                return None;
            }
        }

        let this = self.clone();
        Some(tokio::spawn(async move { this.activate(files).await }))
    }

    async fn run_pipeline(
        &self,
        runtime: &Arc<dyn SandboxRuntime>,
        files: &RawFileSet,
    ) -> anyhow::Result<()> {
        let inner = &self.inner;

        inner.begin_activation();
        inner.processes.kill_all();
        reconcile::reset(Some(runtime.fs())).await;

        inner.set_status(SessionStatus::Mounting);
        let Normalized { tree, diagnostics } = normalize_with_diagnostics(files);
        for diagnostic in &diagnostics {
            tracing::warn!("File set normalization: {diagnostic}");
        }
        runtime
            .mount(&tree)
            .await
            .inspect_err(|e| tracing::error!("Error mounting files: {e:#}"))?;
        tracing::info!(entries = tree.len(), "Mounted file tree");
        inner.session.lock().tree = Some(Arc::new(tree));

        inner.set_status(SessionStatus::ConfiguringScaffold);
        let ctx = ScaffoldContext::new(runtime.fs(), &inner.config.walk);
        let dependencies_changed = ensure_vite_dependencies(&ctx).await;
        ensure_vite_config(&ctx).await;
        ensure_index_html(&ctx).await;

        if dependencies_changed {
            inner.set_status(SessionStatus::InstallingDependencies);
            self.install(runtime).await?;
        }

        inner.set_status(SessionStatus::Starting);
        self.ensure_ready_listener(runtime);
        let scripts = manifest_script_names(runtime.fs()).await;
        let script = choose_vite_start_script(&scripts);
        let manager = &inner.config.package_manager;
        tracing::info!("Starting dev server with `{manager} run {script}`");
        let process = runtime
            .spawn(manager, &["run".to_string(), script])
            .await
            .inspect_err(|e| tracing::error!("Error starting dev server: {e:#}"))?;
        self.watch_server(process);

        configure_sandbox_security(inner.session.lock().frame.as_mut());
        Ok(())
    }

    async fn install(&self, runtime: &Arc<dyn SandboxRuntime>) -> anyhow::Result<()> {
        let inner = &self.inner;
        let tool = inner.config.package_manager.clone();
        tracing::info!("Installing dependencies with {tool}");

        let SpawnedProcess { exit, output, .. } = runtime
            .spawn(&tool, &inner.config.install_args)
            .await
            .inspect_err(|e| tracing::error!("Error starting {tool} install: {e:#}"))?;

        let forward = forward_output(Arc::downgrade(inner), ProcessRole::Install, output);
        let (code, ()) = tokio::join!(exit, forward);
        let code = code?;

        if code != 0 {
            return Err(PreviewError::InstallFailed { tool, code }.into());
        }
        tracing::info!("Dependencies installed");
        Ok(())
    }

    /// Register the server-ready listener unless this runtime already has it.
    fn ensure_ready_listener(&self, runtime: &Arc<dyn SandboxRuntime>) {
        let key = runtime_key(runtime);
        let mut slot = self.inner.ready_listener.lock();
        if matches!(&*slot, Some((registered, _)) if *registered == key) {
            return;
        }

        let session = Arc::downgrade(&self.inner);
        let handle = runtime.on_server_ready(Box::new(move |port, url| {
            if let Some(inner) = session.upgrade() {
                inner.server_ready(port, url);
            }
        }));
        tracing::debug!("Registered server-ready listener");

        if let Some((_, previous)) = slot.replace((key, handle)) {
            previous.unregister();
        }
    }

    fn watch_server(&self, process: SpawnedProcess) {
        let SpawnedProcess { exit, output, kill } = process;
        if let Some(kill) = kill {
            self.inner.processes.track(ProcessRole::Server, kill);
        }

        tokio::spawn(forward_output(
            Arc::downgrade(&self.inner),
            ProcessRole::Server,
            output,
        ));
        tokio::spawn(async move {
            match exit.await {
                Ok(0) => tracing::info!("Server process exited with code 0"),
                Ok(code) => tracing::warn!("Server process exited with code {code}"),
                Err(e) => tracing::warn!("Error waiting for server process: {e:#}"),
            }
        });
    }
}

/// Log and broadcast every chunk of `output`. Server output is also scanned
/// for unresolved packages.
async fn forward_output(inner: Weak<Inner>, role: ProcessRole, mut output: OutputStream) {
    let mut scanner = MissingDependencyScanner::default();
    while let Some(text) = output.next().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        tracing::debug!("{role} output: {text}");

        if role == ProcessRole::Server {
            if let Some(package) = scanner.push(&text) {
                inner.record_missing_dependency(package);
            }
        }
        let _ = inner.output_tx.send(OutputChunk { role, text });
    }
}

impl Inner {
    fn set_status(&self, status: SessionStatus) {
        tracing::info!("{}", status.label());
        self.session.lock().status = status.clone();
        let _ = self.status_tx.send(status);
    }

    fn begin_activation(&self) {
        {
            let mut session = self.session.lock();
            session.url = None;
            session.error_message = None;
            session.missing_dependencies.clear();
        }
        self.set_status(SessionStatus::Resetting);
    }

    fn fail(&self, err: &anyhow::Error) {
        let message = error_message(err);
        tracing::error!("{message}");
        self.session.lock().error_message = Some(message.clone());
        self.set_status(SessionStatus::Error(message));
    }

    fn server_ready(&self, port: u16, url: String) {
        tracing::info!(port, "Server ready at {url}");
        self.session.lock().url = Some(url);
        self.set_status(SessionStatus::Running);
    }

    fn record_missing_dependency(&self, package: String) {
        tracing::warn!("Detected missing dependency: {package}");
        let mut session = self.session.lock();
        if !session.missing_dependencies.contains(&package) {
            session.missing_dependencies.push(package);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::memory::{MemoryRuntime, ProcessScript, RuntimeCall};
    use serde_json::json;

    const DEV: &str = "npm run dev";
    const URL: &str = "http://localhost:5173";

    fn files(value: serde_json::Value) -> Arc<RawFileSet> {
        Arc::new(value.as_object().cloned().unwrap())
    }

    fn ready_project() -> Arc<RawFileSet> {
        files(json!({
            "package.json": {
                "name": "app",
                "scripts": { "dev": "vite" },
                "dependencies": {},
                "devDependencies": { "vite": "latest", "@vitejs/plugin-react": "latest" }
            },
            "index.html": "<div id=\"app\"></div>",
            "src/main.js": "console.log('hi')"
        }))
    }

    fn setup() -> (Arc<MemoryRuntime>, Orchestrator) {
        let runtime = Arc::new(MemoryRuntime::new());
        runtime.script(DEV, ProcessScript::server(5173, URL));
        let shared: Arc<dyn SandboxRuntime> = runtime.clone();
        let orchestrator = Orchestrator::new(
            Arc::new(RuntimeContext::with_runtime(shared)),
            PreviewConfig::default(),
        );
        (runtime, orchestrator)
    }

    #[tokio::test]
    async fn statuses_follow_pipeline_order() {
        let (_runtime, orchestrator) = setup();
        let mut statuses = orchestrator.subscribe();

        let snapshot = orchestrator.activate(ready_project()).await;

        let mut seen = Vec::new();
        while let Ok(status) = statuses.try_recv() {
            seen.push(status);
        }
        assert_eq!(
            seen,
            vec![
                SessionStatus::Resetting,
                SessionStatus::Mounting,
                SessionStatus::ConfiguringScaffold,
                SessionStatus::Starting,
                SessionStatus::Running,
            ]
        );
        assert_eq!(snapshot.url.as_deref(), Some(URL));
        assert!(snapshot.tree.is_some());
    }

    #[tokio::test]
    async fn second_activation_kills_previous_server() {
        let (runtime, orchestrator) = setup();

        orchestrator.activate(ready_project()).await;
        orchestrator.activate(ready_project()).await;

        let kills: Vec<_> = runtime
            .calls()
            .into_iter()
            .filter(|call| matches!(call, RuntimeCall::Kill { .. }))
            .collect();
        assert_eq!(kills.len(), 1);
        assert_eq!(runtime.listener_count(), 1);
        assert_eq!(runtime.spawned(), vec![DEV, DEV]);
    }

    #[tokio::test]
    async fn frame_gets_sandbox_tokens_on_start() {
        let (_runtime, orchestrator) = setup();
        orchestrator.attach_frame(FrameSandbox::parse("allow-popups"));

        orchestrator.activate(ready_project()).await;

        let frame = orchestrator.frame().unwrap();
        assert!(frame.contains("allow-popups"));
        assert!(frame.contains("allow-scripts"));
        assert!(frame.contains("allow-modals"));
    }

    #[tokio::test]
    async fn boot_failure_is_reported() {
        struct Broken;

        #[async_trait::async_trait]
        impl crate::runtime::RuntimeBooter for Broken {
            async fn boot(&self) -> anyhow::Result<Arc<dyn SandboxRuntime>> {
                anyhow::bail!("SharedArrayBuffer is not available")
            }
        }

        let orchestrator = Orchestrator::new(
            Arc::new(RuntimeContext::new(Broken)),
            PreviewConfig::default(),
        );
        let snapshot = orchestrator.activate(ready_project()).await;

        assert_eq!(
            snapshot.error_message.as_deref(),
            Some("Error: Sandbox runtime failed to boot: SharedArrayBuffer is not available")
        );
        assert!(snapshot.status.is_error());
    }

    #[tokio::test]
    async fn sync_waits_for_boot_and_identity_changes() {
        let runtime = Arc::new(MemoryRuntime::new());
        let shared: Arc<dyn SandboxRuntime> = runtime.clone();
        let context = Arc::new(RuntimeContext::new(Prebooted(shared)));
        let orchestrator = Orchestrator::new(Arc::clone(&context), PreviewConfig::default());
        let set = ready_project();

        assert!(orchestrator.sync(None).is_none());
        assert!(orchestrator.sync(Some(Arc::clone(&set))).is_none());

        orchestrator.boot().await.unwrap();
        let handle = orchestrator.sync(Some(Arc::clone(&set))).unwrap();
        handle.await.unwrap();
        assert!(orchestrator.sync(Some(Arc::clone(&set))).is_none());

        let same_contents = Arc::new((*set).clone());
        let handle = orchestrator.sync(Some(same_contents)).unwrap();
        handle.await.unwrap();
        assert_eq!(runtime.spawned(), vec![DEV, DEV]);
    }

    struct Prebooted(Arc<dyn SandboxRuntime>);

    #[async_trait::async_trait]
    impl crate::runtime::RuntimeBooter for Prebooted {
        async fn boot(&self) -> anyhow::Result<Arc<dyn SandboxRuntime>> {
            Ok(Arc::clone(&self.0))
        }
    }
}
