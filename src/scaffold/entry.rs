//! Locate an existing `index.html` inside the sandbox.
//!
//! Cheap fixed-path probes run first; a bounded breadth-first walk of the
//! filesystem is the last resort. Every filesystem failure counts as "not
//! here" and the search moves on.

use crate::config::WalkConfig;
use crate::runtime::{EntryKind, SandboxFs};
use std::collections::VecDeque;

pub const ROOT_INDEX: &str = "/index.html";
pub const SRC_INDEX: &str = "/src/index.html";

/// Other places generated projects tend to put their page.
pub const ALTERNATE_LOCATIONS: &[&str] = &[
    "/public/index.html",
    "/app/index.html",
    "/client/index.html",
    "/static/index.html",
    "/www/index.html",
];

const INDEX_FILE: &str = "index.html";

/// Path of the first `index.html` found, or `None`.
pub async fn find(fs: &dyn SandboxFs, walk: &WalkConfig) -> Option<String> {
    let fixed = [ROOT_INDEX, SRC_INDEX].into_iter().chain(ALTERNATE_LOCATIONS.iter().copied());
    for path in fixed {
        if fs.is_file(path).await {
            tracing::debug!("Found entry point at {path}");
            return Some(path.to_string());
        }
    }

    let found = walk_for_index(fs, walk).await;
    match &found {
        Some(path) => tracing::debug!("Found entry point at {path} by directory walk"),
        None => tracing::debug!("No index.html found in sandbox"),
    }
    found
}

async fn walk_for_index(fs: &dyn SandboxFs, walk: &WalkConfig) -> Option<String> {
    let mut queue = VecDeque::from([("/".to_string(), 0usize)]);
    let mut examined = 0usize;

    while let Some((dir, depth)) = queue.pop_front() {
        let entries = match fs.read_dir_typed(&dir).await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::debug!("Skipping unreadable directory {dir}: {e:#}");
                continue;
            }
        };

        for entry in entries {
            examined += 1;
            if examined > walk.max_entries {
                tracing::warn!(
                    "Entry point search stopped after {} entries",
                    walk.max_entries
                );
                return None;
            }

            let path = child_path(&dir, &entry.name);
            match entry.kind {
                EntryKind::File if entry.name == INDEX_FILE => return Some(path),
                EntryKind::Directory
                    if depth < walk.max_depth && !walk.skip_dirs.contains(&entry.name) =>
                {
                    queue.push_back((path, depth + 1));
                }
                _ => {}
            }
        }
    }

    None
}

fn child_path(dir: &str, name: &str) -> String {
    if dir == "/" {
        format!("/{name}")
    } else {
        format!("{dir}/{name}")
    }
}
