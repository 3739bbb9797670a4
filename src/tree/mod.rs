//! Canonical file tree mounted into the sandbox runtime.
//!
//! A [`FileTree`] is an insertion-ordered map of names to [`FileNode`]s. It
//! serializes to the mount shape the browser runtime expects:
//! `{"name": {"file": {"contents": "..."}}}` for files and
//! `{"name": {"directory": {...}}}` for directories.

mod normalize;

pub use normalize::{normalize, normalize_with_diagnostics, Diagnostic, Normalized, RawFileInput, RawFileSet};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Mountable root: child name → node, in insertion order.
pub type FileTree = IndexMap<String, FileNode>;

/// A single node of the mount tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileNode {
    File { contents: String },
    Directory(FileTree),
}

impl FileNode {
    pub fn file(contents: impl Into<String>) -> Self {
        FileNode::File {
            contents: contents.into(),
        }
    }

    pub fn empty_file() -> Self {
        FileNode::file(String::new())
    }

    pub fn empty_dir() -> Self {
        FileNode::Directory(FileTree::new())
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, FileNode::Directory(_))
    }

    /// File contents, or `None` for directories.
    pub fn contents(&self) -> Option<&str> {
        match self {
            FileNode::File { contents } => Some(contents),
            FileNode::Directory(_) => None,
        }
    }

    pub fn children(&self) -> Option<&FileTree> {
        match self {
            FileNode::Directory(children) => Some(children),
            FileNode::File { .. } => None,
        }
    }
}

/// Look up a `/`-delimited path (leading slash optional) in a tree.
pub fn get_path<'a>(tree: &'a FileTree, path: &str) -> Option<&'a FileNode> {
    let mut segments = path.split('/').filter(|s| !s.is_empty());
    let mut node = tree.get(segments.next()?)?;
    for segment in segments {
        node = node.children()?.get(segment)?;
    }
    Some(node)
}

/// Flatten a tree into `(absolute path, contents)` pairs, depth first.
pub fn flatten_files(tree: &FileTree) -> Vec<(String, &str)> {
    fn walk<'a>(tree: &'a FileTree, prefix: &str, out: &mut Vec<(String, &'a str)>) {
        for (name, node) in tree {
            let path = format!("{prefix}/{name}");
            match node {
                FileNode::File { contents } => out.push((path, contents)),
                FileNode::Directory(children) => walk(children, &path, out),
            }
        }
    }

    let mut out = Vec::new();
    walk(tree, "", &mut out);
    out
}
