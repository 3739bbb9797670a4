//! Normalization of model-generated file maps into a mountable [`FileTree`].
//!
//! Generated projects arrive as a flat JSON object keyed by path, but the
//! values come in several shapes: raw strings, `{contents}` objects, already
//! canonical `{file}`/`{directory}` nodes, inlined `package.json` objects, or
//! nested objects standing in for directories. Each value is classified once
//! into a [`RawFileInput`] and then placed into the tree. Normalization never
//! fails: shape problems and path conflicts become [`Diagnostic`]s.

use super::{FileNode, FileTree};
use serde_json::{Map, Value};

/// Raw per-path input, as produced by the generation pipeline.
pub type RawFileSet = Map<String, Value>;

/// Own keys that mark an object as an inlined package manifest.
const MANIFEST_KEYS: &[&str] = &["name", "version", "dependencies", "devDependencies", "scripts"];

/// Closed classification of a raw per-path value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RawFileInput<'a> {
    /// `{"directory": {...}}`: already canonical, children normalized in place.
    DirectoryWrapper(&'a Map<String, Value>),
    /// `{"file": {"contents"?: ...}}`; carries the `contents` value if present.
    FileWrapper(Option<&'a Value>),
    /// Plain string contents, kept verbatim.
    Text(&'a str),
    /// `{"contents": "..."}`.
    Contents(&'a str),
    /// Object with manifest keys; serialized back to pretty JSON.
    ManifestLike(&'a Map<String, Value>),
    /// Any other object: its keys are child paths.
    ImplicitDirectory(&'a Map<String, Value>),
    /// Numbers, booleans, null and arrays.
    Unsupported(&'a Value),
}

impl<'a> RawFileInput<'a> {
    pub fn classify(value: &'a Value) -> Self {
        let map = match value {
            Value::String(text) => return RawFileInput::Text(text),
            Value::Object(map) => map,
            other => return RawFileInput::Unsupported(other),
        };

        if let Some(Value::Object(children)) = map.get("directory") {
            return RawFileInput::DirectoryWrapper(children);
        }
        if let Some(file) = map.get("file") {
            return RawFileInput::FileWrapper(file.get("contents"));
        }
        if let Some(Value::String(contents)) = map.get("contents") {
            return RawFileInput::Contents(contents);
        }
        if MANIFEST_KEYS.iter().any(|key| map.contains_key(*key)) {
            return RawFileInput::ManifestLike(map);
        }
        RawFileInput::ImplicitDirectory(map)
    }

    /// Children to recurse into, for the directory-shaped variants.
    fn children(&self) -> Option<&'a Map<String, Value>> {
        match self {
            RawFileInput::DirectoryWrapper(children) | RawFileInput::ImplicitDirectory(children) => {
                Some(children)
            }
            _ => None,
        }
    }

    /// Resolve a leaf variant into a file node.
    fn into_file(self, path: &str) -> Result<FileNode, Diagnostic> {
        match self {
            RawFileInput::Text(text) | RawFileInput::Contents(text) => Ok(FileNode::file(text)),
            RawFileInput::FileWrapper(None | Some(Value::Null)) => Ok(FileNode::empty_file()),
            RawFileInput::FileWrapper(Some(Value::String(contents))) => Ok(FileNode::file(contents.as_str())),
            RawFileInput::FileWrapper(Some(_)) => Err(Diagnostic::NonStringContents {
                path: path.to_string(),
            }),
            RawFileInput::ManifestLike(manifest) => manifest_json(manifest)
                .map(FileNode::file)
                .map_err(|e| Diagnostic::Unsupported {
                    path: path.to_string(),
                    kind: format!("manifest ({e})"),
                }),
            RawFileInput::Unsupported(value) => Err(Diagnostic::Unsupported {
                path: path.to_string(),
                kind: value_kind(value).to_string(),
            }),
            RawFileInput::DirectoryWrapper(_) | RawFileInput::ImplicitDirectory(_) => {
                Err(Diagnostic::Unsupported {
                    path: path.to_string(),
                    kind: "directory".to_string(),
                })
            }
        }
    }
}

/// Pretty manifest JSON with integral floats printed as integers (`1.0` → `1`),
/// the way the generating side prints numbers.
fn manifest_json(manifest: &Map<String, Value>) -> serde_json::Result<String> {
    fn integral_floats(value: &Value) -> Value {
        match value {
            Value::Number(n) => match n.as_f64() {
                Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < 9.007_199_254_740_992e15 => {
                    Value::from(f as i64)
                }
                _ => value.clone(),
            },
            Value::Array(items) => Value::Array(items.iter().map(integral_floats).collect()),
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), integral_floats(v)))
                    .collect(),
            ),
            _ => value.clone(),
        }
    }

    serde_json::to_string_pretty(&integral_floats(&Value::Object(manifest.clone())))
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// A recovered normalization problem. Never surfaced as an error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Diagnostic {
    #[error("expected directory but found file at {path}; replacing it with a directory")]
    FileReplacedByDirectory { path: String },
    #[error("file at {path} replaces an existing directory")]
    DirectoryReplacedByFile { path: String },
    #[error("unsupported {kind} value at {path}; using empty contents")]
    Unsupported { path: String, kind: String },
    #[error("non-string contents at {path}; using empty contents")]
    NonStringContents { path: String },
    #[error("skipping entry with empty path {key:?}")]
    EmptyPath { key: String },
}

impl Diagnostic {
    /// The tree path the diagnostic is about (the raw key for empty paths).
    pub fn path(&self) -> &str {
        match self {
            Diagnostic::FileReplacedByDirectory { path }
            | Diagnostic::DirectoryReplacedByFile { path }
            | Diagnostic::Unsupported { path, .. }
            | Diagnostic::NonStringContents { path } => path,
            Diagnostic::EmptyPath { key } => key,
        }
    }
}

/// Result of [`normalize_with_diagnostics`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Normalized {
    pub tree: FileTree,
    pub diagnostics: Vec<Diagnostic>,
}

/// Normalize a raw file set into a mountable tree.
pub fn normalize(raw: &RawFileSet) -> FileTree {
    normalize_with_diagnostics(raw).tree
}

/// Normalize a raw file set, also returning every recovered problem.
pub fn normalize_with_diagnostics(raw: &RawFileSet) -> Normalized {
    let mut out = Normalized::default();
    for (key, value) in raw {
        insert(&mut out.tree, "", key, value, &mut out.diagnostics);
    }
    tracing::debug!(
        entries = raw.len(),
        diagnostics = out.diagnostics.len(),
        "Normalized file set"
    );
    out
}

fn report(diagnostics: &mut Vec<Diagnostic>, diagnostic: Diagnostic) {
    tracing::warn!("{diagnostic}");
    diagnostics.push(diagnostic);
}

/// Place `value` at `key` (which may contain `/`) below `dir`, whose own path is `base`.
fn insert(dir: &mut FileTree, base: &str, key: &str, value: &Value, diagnostics: &mut Vec<Diagnostic>) {
    let segments: Vec<&str> = key.split('/').filter(|s| !s.is_empty()).collect();
    let Some((last, parents)) = segments.split_last() else {
        report(diagnostics, Diagnostic::EmptyPath { key: key.to_string() });
        return;
    };

    let mut current = dir;
    let mut path = base.to_string();
    for segment in parents {
        path = join(&path, segment);
        current = ensure_dir(current, segment, &path, diagnostics);
    }
    let path = join(&path, last);

    let input = RawFileInput::classify(value);
    if let Some(children) = input.children() {
        let target = ensure_dir(current, last, &path, diagnostics);
        for (child_key, child_value) in children {
            insert(target, &path, child_key, child_value, diagnostics);
        }
        return;
    }

    let node = input.into_file(&path).unwrap_or_else(|diagnostic| {
        report(diagnostics, diagnostic);
        FileNode::empty_file()
    });
    if current.get(*last).is_some_and(FileNode::is_dir) {
        report(diagnostics, Diagnostic::DirectoryReplacedByFile { path: path.clone() });
    }
    tracing::debug!(path = %path, "Added file");
    current.insert((*last).to_string(), node);
}

/// Return the directory named `name` inside `tree`, creating it or replacing a file in the way.
fn ensure_dir<'t>(
    tree: &'t mut FileTree,
    name: &str,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) -> &'t mut FileTree {
    let slot = tree.entry(name.to_string()).or_insert_with(FileNode::empty_dir);
    if !slot.is_dir() {
        report(diagnostics, Diagnostic::FileReplacedByDirectory { path: path.to_string() });
        *slot = FileNode::empty_dir();
    }
    match slot {
        FileNode::Directory(children) => children,
        FileNode::File { .. } => unreachable!("slot was just replaced by a directory"),
    }
}

fn join(base: &str, segment: &str) -> String {
    if base.is_empty() {
        segment.to_string()
    } else {
        format!("{base}/{segment}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{flatten_files, get_path};
    use serde_json::json;

    fn raw(value: Value) -> RawFileSet {
        match value {
            Value::Object(map) => map,
            other => panic!("fixture must be an object, got {other}"),
        }
    }

    fn contents<'a>(tree: &'a FileTree, path: &str) -> Option<&'a str> {
        get_path(tree, path).and_then(FileNode::contents)
    }

    #[test]
    fn classify_follows_precedence() {
        let directory = json!({ "directory": {}, "file": {} });
        assert!(matches!(RawFileInput::classify(&directory), RawFileInput::DirectoryWrapper(_)));

        let file = json!({ "file": { "contents": "x" }, "contents": "y" });
        assert!(matches!(RawFileInput::classify(&file), RawFileInput::FileWrapper(Some(_))));

        let contents = json!({ "contents": "y", "name": "pkg" });
        assert_eq!(RawFileInput::classify(&contents), RawFileInput::Contents("y"));

        let manifest = json!({ "scripts": {} });
        assert!(matches!(RawFileInput::classify(&manifest), RawFileInput::ManifestLike(_)));

        let implicit = json!({ "App.jsx": "x" });
        assert!(matches!(RawFileInput::classify(&implicit), RawFileInput::ImplicitDirectory(_)));

        let number = json!(3);
        assert!(matches!(RawFileInput::classify(&number), RawFileInput::Unsupported(_)));
    }

    #[test]
    fn canonical_tree_is_unchanged() {
        let input = json!({
            "index.html": { "file": { "contents": "<html></html>" } },
            "src": { "directory": {
                "main.jsx": { "file": { "contents": "import './App'" } },
                "components": { "directory": {
                    "Button.jsx": { "file": { "contents": "" } }
                } }
            } }
        });

        let tree = normalize(&raw(input.clone()));
        assert_eq!(serde_json::to_value(&tree).unwrap(), input);
    }

    #[test]
    fn every_leaf_has_string_contents() {
        let input = raw(json!({
            "a.txt": { "file": {} },
            "b.txt": { "file": { "contents": null } },
            "c.txt": { "file": { "contents": 42 } },
            "d.txt": null,
            "e.txt": [1, 2],
            "f.txt": true
        }));

        let normalized = normalize_with_diagnostics(&input);
        let files = flatten_files(&normalized.tree);
        assert_eq!(files.len(), 6);
        assert!(files.iter().all(|(_, contents)| contents.is_empty()));
        assert_eq!(normalized.diagnostics.len(), 4);
    }

    #[test]
    fn file_in_the_way_is_replaced_by_directory() {
        let input = raw(json!({ "src": "text", "src/index.js": "code" }));

        let normalized = normalize_with_diagnostics(&input);
        assert_eq!(
            serde_json::to_value(&normalized.tree).unwrap(),
            json!({ "src": { "directory": { "index.js": { "file": { "contents": "code" } } } } })
        );
        assert_eq!(
            normalized.diagnostics,
            vec![Diagnostic::FileReplacedByDirectory { path: "src".into() }]
        );
        assert_eq!(normalized.diagnostics[0].path(), "src");
    }

    #[test]
    fn later_file_replaces_directory() {
        let input = raw(json!({ "src/index.js": "code", "src": "text" }));

        let normalized = normalize_with_diagnostics(&input);
        assert_eq!(contents(&normalized.tree, "src"), Some("text"));
        assert_eq!(
            normalized.diagnostics,
            vec![Diagnostic::DirectoryReplacedByFile { path: "src".into() }]
        );
    }

    #[test]
    fn manifest_object_is_pretty_printed() {
        let input = raw(json!({ "package.json": { "name": "x", "version": "1.0.0" } }));

        let tree = normalize(&input);
        assert_eq!(
            contents(&tree, "package.json"),
            Some("{\n  \"name\": \"x\",\n  \"version\": \"1.0.0\"\n}")
        );
    }

    #[test]
    fn manifest_integral_floats_print_as_integers() {
        let input = raw(json!({ "package.json": { "name": "x", "version": 1.0, "ratio": 0.5, "n": [2.0, -0.0] } }));

        let tree = normalize(&input);

        assert_eq!(
            tree["package.json"].contents(),
            Some("{\n  \"name\": \"x\",\n  \"version\": 1,\n  \"ratio\": 0.5,\n  \"n\": [\n    2,\n    0\n  ]\n}")
        );
    }

    #[test]
    fn manifest_heuristic_applies_off_path() {
        let input = raw(json!({ "config/settings": { "name": "not-a-manifest" } }));

        let tree = normalize(&input);
        assert_eq!(
            contents(&tree, "config/settings"),
            Some("{\n  \"name\": \"not-a-manifest\"\n}")
        );
    }

    #[test]
    fn strings_are_kept_verbatim() {
        let input = raw(json!({ "package.json": "  {\"a\":1}  " }));

        let tree = normalize(&input);
        assert_eq!(contents(&tree, "package.json"), Some("  {\"a\":1}  "));
    }

    #[test]
    fn contents_objects_become_files() {
        let input = raw(json!({ "src/App.jsx": { "contents": "export default 1" } }));

        let tree = normalize(&input);
        assert_eq!(contents(&tree, "src/App.jsx"), Some("export default 1"));
    }

    #[test]
    fn implicit_directories_nest_paths() {
        let input = raw(json!({
            "src": {
                "App.jsx": "app",
                "components/Card.jsx": { "contents": "card" }
            }
        }));

        let tree = normalize(&input);
        assert_eq!(contents(&tree, "src/App.jsx"), Some("app"));
        assert_eq!(contents(&tree, "src/components/Card.jsx"), Some("card"));
    }

    #[test]
    fn directory_entries_merge_with_existing_paths() {
        let input = raw(json!({
            "src/main.jsx": "main",
            "src": { "directory": { "App.jsx": { "file": { "contents": "app" } } } }
        }));

        let normalized = normalize_with_diagnostics(&input);
        assert_eq!(contents(&normalized.tree, "src/main.jsx"), Some("main"));
        assert_eq!(contents(&normalized.tree, "src/App.jsx"), Some("app"));
        assert!(normalized.diagnostics.is_empty());
    }

    #[test]
    fn empty_segments_are_ignored() {
        let input = raw(json!({ "/src//main.js": "x", "": "lost", "///": "lost" }));

        let normalized = normalize_with_diagnostics(&input);
        assert_eq!(contents(&normalized.tree, "src/main.js"), Some("x"));
        assert_eq!(normalized.tree.len(), 1);
        assert_eq!(normalized.diagnostics.len(), 2);
    }

    #[test]
    fn key_order_is_preserved() {
        let input = raw(json!({ "z.js": "", "a.js": "", "m/n.js": "" }));

        let tree = normalize(&input);
        let names: Vec<&str> = tree.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["z.js", "a.js", "m"]);
    }
}
