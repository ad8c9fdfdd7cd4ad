use crate::model::FileTree;
use anyhow::{Result, bail};
use ignore::WalkBuilder;
use std::ffi::OsStr;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

pub(crate) const PYTHON_EXTENSIONS: &[&str] = &["py", "pyi"];

#[derive(Debug, Clone, Copy, Default)]
pub struct ScanOptions {
    pub no_ignore: bool,
}

impl ScanOptions {
    pub fn new(no_ignore: bool) -> Self {
        Self { no_ignore }
    }
}

/// Reads every Python file under `repo_root` into an in-memory tree.
///
/// Honors `.gitignore`/`.ignore` unless `no_ignore` is set. Tool and cache
/// directories are always skipped. Files that are not valid UTF-8 are skipped
/// with a warning.
pub fn load_file_tree(repo_root: &Path, options: ScanOptions) -> Result<FileTree> {
    if !repo_root.is_dir() {
        bail!("{} is not a directory", repo_root.display());
    }
    let mut builder = WalkBuilder::new(repo_root);
    if options.no_ignore {
        builder
            .ignore(false)
            .git_ignore(false)
            .git_global(false)
            .git_exclude(false)
            .parents(false);
    } else {
        builder
            .ignore(true)
            .git_ignore(true)
            .git_global(true)
            .git_exclude(true)
            .parents(true)
            .require_git(false);
    }
    let walker = builder
        .hidden(false)
        .filter_entry(|entry| !is_ignored_entry(entry))
        .build();

    let mut tree = FileTree::default();
    let mut loaded = 0usize;
    for entry in walker {
        let entry = match entry {
            Ok(value) => value,
            Err(err) => {
                warn!("walk error: {err}");
                continue;
            }
        };
        if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
            continue;
        }
        let path = entry.path();
        if !is_python_path(path) {
            continue;
        }
        let rel_path = crate::util::normalize_rel_path(repo_root, path)?;
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(path = %rel_path, "read failed: {err}");
                continue;
            }
        };
        let text = match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(_) => {
                warn!(path = %rel_path, "skipping non-UTF-8 file");
                continue;
            }
        };
        tree.root.insert_path(&rel_path, text);
        loaded += 1;
    }
    debug!(root = %repo_root.display(), files = loaded, "loaded file tree");
    Ok(tree)
}

pub fn is_python_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| PYTHON_EXTENSIONS.contains(&ext))
        .unwrap_or(false)
}

fn is_ignored_entry(entry: &ignore::DirEntry) -> bool {
    let name = entry.file_name();
    [
        ".git",
        "__pycache__",
        ".venv",
        "venv",
        "node_modules",
        ".tox",
        ".mypy_cache",
    ]
    .iter()
    .any(|ignored| name == OsStr::new(ignored))
}
