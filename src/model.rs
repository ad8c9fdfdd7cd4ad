use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub name: String,
    pub size: u64,
    pub raw_text: String,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, raw_text: impl Into<String>) -> Self {
        let raw_text = raw_text.into();
        SourceFile {
            name: name.into(),
            size: raw_text.len() as u64,
            raw_text,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Folder {
    pub name: String,
    pub files: Vec<SourceFile>,
    pub folders: Vec<Folder>,
}

impl Folder {
    pub fn new(name: impl Into<String>) -> Self {
        Folder {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_file(mut self, file: SourceFile) -> Self {
        self.files.push(file);
        self
    }

    pub fn with_folder(mut self, folder: Folder) -> Self {
        self.folders.push(folder);
        self
    }

    /// Places `text` at the `/`-separated `rel_path`, creating folders on the way.
    pub fn insert_path(&mut self, rel_path: &str, text: impl Into<String>) {
        let mut parts: Vec<&str> = rel_path.split('/').filter(|p| !p.is_empty()).collect();
        let Some(file_name) = parts.pop() else {
            return;
        };
        let mut folder = self;
        for part in parts {
            let idx = match folder.folders.iter().position(|f| f.name == part) {
                Some(idx) => idx,
                None => {
                    folder.folders.push(Folder::new(part));
                    folder.folders.len() - 1
                }
            };
            folder = &mut folder.folders[idx];
        }
        let file = SourceFile::new(file_name, text);
        match folder.files.iter_mut().find(|f| f.name == file_name) {
            Some(existing) => *existing = file,
            None => folder.files.push(file),
        }
    }

    fn collect<'a>(&'a self, prefix: &str, out: &mut Vec<(String, &'a SourceFile)>) {
        for file in &self.files {
            out.push((join(prefix, &file.name), file));
        }
        for folder in &self.folders {
            folder.collect(&join(prefix, &folder.name), out);
        }
    }
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}/{name}")
    }
}

/// An in-memory source tree. The root folder's own name is not part of any
/// relative path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileTree {
    pub root: Folder,
}

impl FileTree {
    pub fn new(root: Folder) -> Self {
        FileTree { root }
    }

    pub fn from_files<I, P, T>(files: I) -> Self
    where
        I: IntoIterator<Item = (P, T)>,
        P: AsRef<str>,
        T: Into<String>,
    {
        let mut root = Folder::new("");
        for (path, text) in files {
            root.insert_path(path.as_ref(), text);
        }
        FileTree { root }
    }

    /// All files with their relative paths, sorted by path.
    pub fn files(&self) -> Vec<(String, &SourceFile)> {
        let mut out = Vec::new();
        self.root.collect("", &mut out);
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildStats {
    pub files_seen: usize,
    pub files_parsed: usize,
    pub files_skipped: usize,
    pub files_ignored: usize,
    pub modules: usize,
    pub nodes: usize,
    pub edges: usize,
    pub edges_by_kind: BTreeMap<String, usize>,
    pub calls_resolved: usize,
    pub calls_unresolved: usize,
    pub orphans: usize,
    pub duration_ms: u64,
}
