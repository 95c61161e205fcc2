//! Template expansion
//!
//! The capture pipeline only needs two things from a template: look a file up
//! by its logical path, and expand it to content. [`TemplateSource`] is that
//! contract. [`DirectoryTemplate`] is the stock implementation: it reads a
//! template directory into memory and interpolates the caller's data into
//! text files.
//!
//! # Placeholders
//!
//! ```text
//! <h1 style="color: {{ color }}">{{ msg }}</h1>
//! <script>const DATA = {{ json }};</script>
//! <script>const SERIES = {{ json chart.series }};</script>
//! ```
//!
//! `{{ path }}` inserts strings verbatim and anything else as JSON. Missing
//! paths expand to nothing. `{{ json path }}` always emits JSON.

pub mod config;

pub use config::{TemplateConfig, CONFIG_FILE_NAME};

use crate::error::TemplateError;
use regex::{Captures, Regex};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, instrument};

/// Handle to a file inside a template tree
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TemplateFile {
    path: String,
}

impl TemplateFile {
    /// Create a handle for a logical path
    pub fn new<S: Into<String>>(path: S) -> Self {
        Self { path: path.into() }
    }

    /// Logical path, `/`-separated and relative to the template root
    pub fn path(&self) -> &str {
        &self.path
    }
}

/// A template tree already bound to its data
///
/// Implementations must be pure: expanding the same file twice yields the
/// same bytes.
pub trait TemplateSource: Send + Sync {
    /// Look up a file by logical path
    fn find(&self, path: &str) -> Option<TemplateFile>;

    /// Expand a file to its final content
    fn expand(&self, file: &TemplateFile) -> Result<Vec<u8>, TemplateError>;
}

/// Extensions whose content is interpolated
const TEXT_EXTENSIONS: &[&str] = &[
    "html", "htm", "js", "mjs", "css", "svg", "json", "txt", "xml", "csv", "md",
];

/// In-memory template tree loaded from a directory
#[derive(Debug, Clone)]
pub struct DirectoryTemplate {
    root: PathBuf,
    files: BTreeMap<String, Vec<u8>>,
    data: Value,
}

impl DirectoryTemplate {
    /// Read every file under `root` (except the template config) into memory
    #[instrument(skip(root, data), fields(root = %root.as_ref().display()))]
    pub async fn load(root: impl AsRef<Path>, data: Value) -> Result<Self, TemplateError> {
        let root = root.as_ref().to_path_buf();
        let is_dir = tokio::fs::metadata(&root)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);
        if !is_dir {
            return Err(TemplateError::NotADirectory(root));
        }

        let mut files = BTreeMap::new();
        let mut pending = vec![root.clone()];
        while let Some(dir) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir)
                .await
                .map_err(|source| TemplateError::Unreadable {
                    path: dir.clone(),
                    source,
                })?;

            while let Some(entry) =
                entries
                    .next_entry()
                    .await
                    .map_err(|source| TemplateError::Unreadable {
                        path: dir.clone(),
                        source,
                    })?
            {
                let path = entry.path();
                let file_type = entry
                    .file_type()
                    .await
                    .map_err(|source| TemplateError::Unreadable {
                        path: path.clone(),
                        source,
                    })?;

                if file_type.is_dir() {
                    pending.push(path);
                    continue;
                }

                let Some(logical) = logical_path(&root, &path) else {
                    continue;
                };
                if logical == CONFIG_FILE_NAME {
                    continue;
                }

                let content = tokio::fs::read(&path)
                    .await
                    .map_err(|source| TemplateError::Unreadable {
                        path: path.clone(),
                        source,
                    })?;
                files.insert(logical, content);
            }
        }

        debug!("Loaded {} template files", files.len());
        Ok(Self::from_files(root, files, data))
    }

    /// Build a template from files already in memory
    pub fn from_files(root: PathBuf, files: BTreeMap<String, Vec<u8>>, data: Value) -> Self {
        Self { root, files, data }
    }

    /// Directory the template was loaded from
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Logical paths of every file in the tree
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    /// The data bound to this template
    pub fn data(&self) -> &Value {
        &self.data
    }
}

impl TemplateSource for DirectoryTemplate {
    fn find(&self, path: &str) -> Option<TemplateFile> {
        self.files
            .contains_key(path)
            .then(|| TemplateFile::new(path))
    }

    fn expand(&self, file: &TemplateFile) -> Result<Vec<u8>, TemplateError> {
        let raw = self
            .files
            .get(file.path())
            .ok_or_else(|| TemplateError::NotFound(file.path().to_string()))?;

        if !is_text_file(file.path()) {
            return Ok(raw.clone());
        }

        match std::str::from_utf8(raw) {
            Ok(text) => Ok(interpolate(text, &self.data).into_bytes()),
            Err(_) => Ok(raw.clone()),
        }
    }
}

fn logical_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<_> = relative
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<_>>()?;
    Some(parts.join("/"))
}

fn is_text_file(path: &str) -> bool {
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| TEXT_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn placeholder() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| {
        Regex::new(r"\{\{\s*(json\b)?\s*([A-Za-z0-9_$.\-]*)\s*\}\}").expect("valid placeholder regex")
    })
}

/// Replace every placeholder in `text` with values from `data`
pub fn interpolate(text: &str, data: &Value) -> String {
    placeholder()
        .replace_all(text, |caps: &Captures<'_>| {
            let as_json = caps.get(1).is_some();
            let value = lookup(data, caps.get(2).map_or("", |m| m.as_str()));
            match (value, as_json) {
                (Some(v), true) => v.to_string(),
                (None, true) => "null".to_string(),
                (Some(Value::String(s)), false) => s.clone(),
                (Some(Value::Null), false) | (None, false) => String::new(),
                (Some(v), false) => v.to_string(),
            }
        })
        .into_owned()
}

/// Resolve a dotted path against `data`; numeric segments index arrays
pub fn lookup<'a>(data: &'a Value, path: &str) -> Option<&'a Value> {
    let path = path.trim_matches('.');
    if path.is_empty() {
        return Some(data);
    }

    path.split('.').try_fold(data, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tree(files: &[(&str, &str)], data: Value) -> DirectoryTemplate {
        let files = files
            .iter()
            .map(|(p, c)| (p.to_string(), c.as_bytes().to_vec()))
            .collect();
        DirectoryTemplate::from_files(PathBuf::from("/tpl"), files, data)
    }

    #[test]
    fn test_interpolate_strings_and_numbers() {
        let data = json!({"msg": "Hello computer", "size": 12});
        assert_eq!(
            interpolate("<p>{{ msg }} / {{size}}</p>", &data),
            "<p>Hello computer / 12</p>"
        );
    }

    #[test]
    fn test_interpolate_json_whole_data() {
        let data = json!({"color": "blue"});
        assert_eq!(
            interpolate("const d = {{ json }};", &data),
            r#"const d = {"color":"blue"};"#
        );
    }

    #[test]
    fn test_interpolate_json_string_is_quoted() {
        let data = json!({"color": "blue"});
        assert_eq!(interpolate("{{ json color }}", &data), r#""blue""#);
    }

    #[test]
    fn test_interpolate_missing_path() {
        let data = json!({});
        assert_eq!(interpolate("[{{ nope.deeper }}]", &data), "[]");
        assert_eq!(interpolate("{{ json nope }}", &data), "null");
    }

    #[test]
    fn test_lookup_array_index() {
        let data = json!({"series": [{"v": 1}, {"v": 2}]});
        assert_eq!(lookup(&data, "series.1.v"), Some(&json!(2)));
        assert_eq!(lookup(&data, "series.9.v"), None);
    }

    #[test]
    fn test_find_and_expand() {
        let t = tree(
            &[("index.html", "<h1>{{ msg }}</h1>"), ("js/app.js", "go()")],
            json!({"msg": "hi"}),
        );
        let file = t.find("index.html").unwrap();
        assert_eq!(t.expand(&file).unwrap(), b"<h1>hi</h1>");
        assert!(t.find("js/app.js").is_some());
        assert!(t.find("missing.css").is_none());
    }

    #[test]
    fn test_binary_files_pass_through() {
        let t = tree(&[("logo.png", "{{ msg }}")], json!({"msg": "x"}));
        let file = t.find("logo.png").unwrap();
        assert_eq!(t.expand(&file).unwrap(), b"{{ msg }}");
    }

    #[test]
    fn test_expand_unknown_handle() {
        let t = tree(&[], json!({}));
        let err = t.expand(&TemplateFile::new("ghost.html")).unwrap_err();
        assert!(matches!(err, TemplateError::NotFound(_)));
    }
}
