//! Source file discovery for the binary.
//!
//! Walks a project root with `.gitignore`/`.ignore` support plus a fixed set
//! of noise excludes, keeping files whose extension maps to a [`Language`].

use crate::indexer::SourceFile;
use crate::language::Language;
use crate::{Error, Result};
use ignore::WalkBuilder;
use ignore::overrides::OverrideBuilder;
use std::path::Path;

const DEFAULT_EXCLUDES: &[&str] = &[
    "target/",
    "node_modules/",
    "venv/",
    ".venv/",
    "vendor/",
    "dist/",
    "build/",
    "out/",
    "coverage/",
    "__pycache__/",
    ".git/",
    ".symgraph/",
    ".idea/",
    ".vscode/",
    "*.min.js",
    "*.pb.go",
    "*_pb2.py",
    "*_pb2_grpc.py",
];

#[derive(Debug, Default)]
pub struct Discovery {
    pub files: Vec<SourceFile>,
    /// Files with a known extension that could not be read as UTF-8
    pub unreadable: Vec<String>,
}

/// Collect every supported source file under `root`, sorted by path.
pub fn discover(root: &Path, extra_excludes: &[String]) -> Result<Discovery> {
    let mut overrides = OverrideBuilder::new(root);
    for pattern in DEFAULT_EXCLUDES.iter().copied().chain(extra_excludes.iter().map(String::as_str)) {
        overrides
            .add(&format!("!{}", pattern))
            .map_err(|e| Error::Config(format!("invalid exclude '{}': {}", pattern, e)))?;
    }
    let overrides = overrides.build().map_err(|e| Error::Config(e.to_string()))?;

    let walker = WalkBuilder::new(root)
        .hidden(false)
        .git_ignore(true)
        .git_exclude(true)
        .require_git(false)
        .add_custom_ignore_filename(".symgraphignore")
        .overrides(overrides)
        .build();

    let mut found = Discovery::default();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!(error = %err, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        let Some(language) = Language::from_path(entry.path()) else {
            continue;
        };
        let relative = relative_path(root, entry.path());
        match std::fs::read(entry.path()).map(String::from_utf8) {
            Ok(Ok(content)) => found.files.push(SourceFile::new(relative, language, content)),
            Ok(Err(_)) => found.unreadable.push(relative),
            Err(err) => {
                tracing::warn!(path = %relative, error = %err, "failed to read file");
                found.unreadable.push(relative);
            }
        }
    }

    found.files.sort_by(|a, b| a.path.cmp(&b.path));
    tracing::debug!(files = found.files.len(), root = %root.display(), "discovered source files");
    Ok(found)
}

/// `/`-separated path relative to `root`.
fn relative_path(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(root: &Path, path: &str, content: &str) {
        let full = root.join(path);
        fs::create_dir_all(full.parent().unwrap()).unwrap();
        fs::write(full, content).unwrap();
    }

    #[test]
    fn test_discovers_supported_files() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "app/main.py", "def main():\n    pass\n");
        write(root, "web/client.js", "fetch('/api')\n");
        write(root, "README.md", "# readme\n");
        write(root, "node_modules/lib/index.js", "module.exports = 1\n");
        write(root, "gen/api_pb2.py", "x = 1\n");

        let found = discover(root, &[]).unwrap();
        let paths: Vec<&str> = found.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["app/main.py", "web/client.js"]);
        assert_eq!(found.files[0].language, Language::Python);
    }

    #[test]
    fn test_respects_gitignore_and_extra_excludes() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, ".gitignore", "scratch/\n");
        write(root, "scratch/tmp.py", "x = 1\n");
        write(root, "legacy/old.go", "package legacy\n");
        write(root, "src/lib.rs", "pub fn f() {}\n");

        let found = discover(root, &["legacy/".to_string()]).unwrap();
        let paths: Vec<&str> = found.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["src/lib.rs"]);
    }

    #[test]
    fn test_non_utf8_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("bad.py"), [0xff, 0xfe, 0x00]).unwrap();
        let found = discover(dir.path(), &[]).unwrap();
        assert!(found.files.is_empty());
        assert_eq!(found.unreadable, vec!["bad.py".to_string()]);
    }
}
