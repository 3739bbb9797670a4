//! Kill handles of processes started by earlier activations.

use super::output::ProcessRole;
use crate::runtime::KillFn;
use parking_lot::Mutex;

#[derive(Default)]
pub struct ProcessTracker {
    active: Mutex<Vec<(ProcessRole, KillFn)>>,
}

impl ProcessTracker {
    pub fn track(&self, role: ProcessRole, kill: KillFn) {
        self.active.lock().push((role, kill));
    }

    pub fn len(&self) -> usize {
        self.active.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Kill every tracked process. Failures are logged and skipped.
    pub fn kill_all(&self) -> usize {
        let active = std::mem::take(&mut *self.active.lock());
        let count = active.len();
        for (role, kill) in active {
            if let Err(e) = kill() {
                tracing::warn!("Error killing {role} process: {e:#}");
            }
        }
        if count > 0 {
            tracing::debug!("Killed {count} active process(es)");
        }
        count
    }
}
