//! Lazily booted, shared sandbox runtime handle.

use super::SandboxRuntime;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Boots a sandbox runtime. Called at most once per successful boot.
#[async_trait]
pub trait RuntimeBooter: Send + Sync {
    async fn boot(&self) -> anyhow::Result<Arc<dyn SandboxRuntime>>;
}

/// Booter for a runtime that already exists.
struct Prebooted(Arc<dyn SandboxRuntime>);

#[async_trait]
impl RuntimeBooter for Prebooted {
    async fn boot(&self) -> anyhow::Result<Arc<dyn SandboxRuntime>> {
        Ok(Arc::clone(&self.0))
    }
}

/// Owns the single runtime handle for the process lifetime.
///
/// Concurrent [`RuntimeContext::init`] callers join the same boot. A failed
/// boot leaves the context empty so the next call tries again. The handle is
/// never torn down.
pub struct RuntimeContext {
    booter: Box<dyn RuntimeBooter>,
    runtime: OnceCell<Arc<dyn SandboxRuntime>>,
}

impl RuntimeContext {
    pub fn new(booter: impl RuntimeBooter + 'static) -> Self {
        Self {
            booter: Box::new(booter),
            runtime: OnceCell::new(),
        }
    }

    /// Wrap an already booted runtime.
    pub fn with_runtime(runtime: Arc<dyn SandboxRuntime>) -> Self {
        Self {
            booter: Box::new(Prebooted(Arc::clone(&runtime))),
            runtime: OnceCell::new_with(Some(runtime)),
        }
    }

    /// Return the runtime, booting it on first use.
    pub async fn init(&self) -> anyhow::Result<Arc<dyn SandboxRuntime>> {
        let runtime = self
            .runtime
            .get_or_try_init(|| async {
                tracing::info!("Starting sandbox runtime boot");
                match self.booter.boot().await {
                    Ok(runtime) => {
                        tracing::info!("Sandbox runtime booted");
                        Ok(runtime)
                    }
                    Err(e) => {
                        tracing::error!("Sandbox runtime boot failed: {e:#}");
                        Err(e)
                    }
                }
            })
            .await?;
        Ok(Arc::clone(runtime))
    }

    /// The runtime if it has finished booting.
    pub fn get(&self) -> Option<Arc<dyn SandboxRuntime>> {
        self.runtime.get().cloned()
    }

    pub fn is_ready(&self) -> bool {
        self.runtime.initialized()
    }
}
