//! `symgraph.toml` configuration.
//!
//! Every section and field has a default, so a missing file or a file that
//! only sets a couple of keys is valid.

use crate::adapter::ParseOptions;
use crate::bridge::BridgeConfidence;
use crate::enrichment::EnrichmentConfig;
use crate::semantic::SemanticConfig;
use crate::storage::PoolConfig;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SymgraphConfig {
    pub database: DatabaseConfig,
    pub pool: PoolConfig,
    pub parsing: ParsingConfig,
    pub enrichment: EnrichmentConfig,
    pub semantic: SemanticConfig,
    pub bridge: BridgeConfidence,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Relative paths resolve against the project root
    pub path: PathBuf,
    /// Project name; defaults to the root directory name
    pub project: Option<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(".symgraph").join("graph.db"),
            project: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParsingConfig {
    pub max_file_size: usize,
    pub parse_timeout_ms: u64,
    /// 0 picks the number of available cores
    pub parse_workers: usize,
    pub detect_bridges: bool,
    pub detect_patterns: bool,
    /// Extra gitignore-style patterns skipped during discovery
    pub exclude: Vec<String>,
}

impl Default for ParsingConfig {
    fn default() -> Self {
        let parse = ParseOptions::default();
        Self {
            max_file_size: parse.max_file_size,
            parse_timeout_ms: parse.parse_timeout.as_millis() as u64,
            parse_workers: 0,
            detect_bridges: parse.detect_bridges,
            detect_patterns: parse.detect_patterns,
            exclude: Vec::new(),
        }
    }
}

impl ParsingConfig {
    pub fn to_parse_options(&self, bridge: BridgeConfidence) -> ParseOptions {
        ParseOptions {
            max_file_size: self.max_file_size,
            parse_timeout: Duration::from_millis(self.parse_timeout_ms),
            detect_bridges: self.detect_bridges,
            detect_patterns: self.detect_patterns,
            bridge_confidence: bridge,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is unset
    pub level: String,
    /// Directory for the rolling JSON log; relative to the project root
    pub directory: PathBuf,
    pub json_file: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: PathBuf::from(".symgraph").join("logs"),
            json_file: true,
        }
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("symgraph.toml")
}

/// Load `path`, falling back to defaults when the file does not exist.
pub fn load_config(path: &Path) -> Result<SymgraphConfig> {
    if !path.exists() {
        return Ok(SymgraphConfig::default());
    }
    let contents = std::fs::read_to_string(path)?;
    toml::from_str(&contents).map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
}

pub fn write_config(path: &Path, config: &SymgraphConfig, force: bool) -> Result<()> {
    if path.exists() && !force {
        return Err(Error::Config(format!(
            "config already exists at {} (use --force to overwrite)",
            path.display()
        )));
    }
    let contents = toml::to_string_pretty(config).map_err(|e| Error::Config(e.to_string()))?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, contents)?;
    Ok(())
}

/// Add `entry` to the project's `.gitignore` unless it is already listed.
pub fn ensure_gitignore(project_root: &Path, entry: &str) -> Result<()> {
    let gitignore_path = project_root.join(".gitignore");
    let mut content = if gitignore_path.exists() {
        std::fs::read_to_string(&gitignore_path)?
    } else {
        String::new()
    };
    if content.lines().any(|line| line.trim() == entry) {
        return Ok(());
    }
    if !content.is_empty() && !content.ends_with('\n') {
        content.push('\n');
    }
    content.push_str(entry);
    content.push('\n');
    std::fs::write(&gitignore_path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&dir.path().join("symgraph.toml")).unwrap();
        assert_eq!(config.pool.max_connections, PoolConfig::default().max_connections);
        assert_eq!(config.enrichment.max_chain_depth, 10);
        assert_eq!(config.database.path, PathBuf::from(".symgraph/graph.db"));
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("symgraph.toml");
        std::fs::write(
            &path,
            "[semantic]\nbatch_size = 2\n\n[bridge]\nspawn = 0.5\n\n[parsing]\nexclude = [\"gen/\"]\n",
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.semantic.batch_size, 2);
        assert_eq!(config.semantic.file_timeout_ms, 5_000);
        assert_eq!(config.semantic.analysis_timeout_ms, 30_000);
        assert_eq!(config.bridge.spawn, 0.5);
        assert_eq!(config.bridge.grpc_client, 0.9);
        assert_eq!(config.parsing.exclude, vec!["gen/".to_string()]);

        let options = config.parsing.to_parse_options(config.bridge);
        assert_eq!(options.bridge_confidence.spawn, 0.5);
        assert_eq!(options.parse_timeout, Duration::from_millis(config.parsing.parse_timeout_ms));
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("symgraph.toml");
        std::fs::write(&path, "[pool]\nmax_connections = \"many\"\n").unwrap();
        assert!(matches!(load_config(&path), Err(Error::Config(_))));
    }

    #[test]
    fn test_write_refuses_overwrite_without_force() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("symgraph.toml");
        let mut config = SymgraphConfig::default();
        write_config(&path, &config, false).unwrap();
        assert!(write_config(&path, &config, false).is_err());

        config.semantic.enabled = false;
        write_config(&path, &config, true).unwrap();
        assert!(!load_config(&path).unwrap().semantic.enabled);
    }

    #[test]
    fn test_ensure_gitignore_appends_once() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".gitignore"), "target/").unwrap();
        ensure_gitignore(dir.path(), ".symgraph/").unwrap();
        ensure_gitignore(dir.path(), ".symgraph/").unwrap();
        let content = std::fs::read_to_string(dir.path().join(".gitignore")).unwrap();
        assert_eq!(content, "target/\n.symgraph/\n");
    }
}
