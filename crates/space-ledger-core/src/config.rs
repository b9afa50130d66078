use crate::error::Error;
use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::Deserialize;
use std::path::Path;

pub const DEFAULT_DB_PATH: &str = "space_ledger.db";
pub const DEFAULT_MAX_SAME_SIZE_FILES: usize = 100;
pub const DEFAULT_MIN_FILE_SIZE_FOR_HASH: u64 = 1;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub scan_roots: Vec<String>,
    #[serde(default)]
    pub ignore_patterns: Vec<String>,
    #[serde(default = "default_db_path")]
    pub db_path: String,
    #[serde(default)]
    pub skip_hidden_files: bool,
    /// Size groups with more members than this are not hashed.
    #[serde(default = "default_max_same_size_files")]
    pub max_same_size_files: usize,
    /// Files smaller than this are never duplicate candidates.
    #[serde(default = "default_min_file_size_for_hash")]
    pub min_file_size_for_hash: u64,
    /// Hashing pool size; 0 lets rayon pick one thread per core.
    #[serde(default)]
    pub hash_threads: usize,
}

fn default_db_path() -> String {
    DEFAULT_DB_PATH.to_string()
}

fn default_max_same_size_files() -> usize {
    DEFAULT_MAX_SAME_SIZE_FILES
}

fn default_min_file_size_for_hash() -> u64 {
    DEFAULT_MIN_FILE_SIZE_FOR_HASH
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            scan_roots: Vec::new(),
            ignore_patterns: Vec::new(),
            db_path: default_db_path(),
            skip_hidden_files: false,
            max_same_size_files: DEFAULT_MAX_SAME_SIZE_FILES,
            min_file_size_for_hash: DEFAULT_MIN_FILE_SIZE_FOR_HASH,
            hash_threads: 0,
        }
    }
}

/// Load `Config.{toml,json,...}` from the working directory if present, then
/// overlay `SPACE_LEDGER__*` environment variables.
pub fn load_configuration() -> Result<AppConfig, ConfigError> {
    let builder = Config::builder()
        .add_source(ConfigFile::with_name("Config").required(false))
        .add_source(
            Environment::with_prefix("SPACE_LEDGER")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("scan_roots")
                .with_list_parse_key("ignore_patterns"),
        )
        .build()?;
    builder.try_deserialize::<AppConfig>()
}

impl AppConfig {
    /// Turn a `--root` selector into a root path. A number picks a configured
    /// root by index, anything else is taken as a path. No selector means the
    /// first configured root.
    pub fn resolve_root(&self, selector: Option<&str>) -> Result<String, Error> {
        match selector {
            None => self
                .scan_roots
                .first()
                .cloned()
                .ok_or_else(|| Error::UnknownRoot("<no scan roots configured>".to_string())),
            Some(sel) => match sel.parse::<usize>() {
                Ok(index) => self
                    .scan_roots
                    .get(index)
                    .cloned()
                    .ok_or_else(|| Error::UnknownRoot(sel.to_string())),
                Err(_) => Ok(sel.to_string()),
            },
        }
    }

    /// Pairs of configured roots where the second lies inside the first. A path
    /// belongs to exactly one root, so overlapping roots fight over records.
    pub fn overlapping_roots(&self) -> Vec<(String, String)> {
        let mut overlaps = Vec::new();

        for (i, outer) in self.scan_roots.iter().enumerate() {
            let outer_path = Path::new(outer);
            for (j, inner) in self.scan_roots.iter().enumerate() {
                if i != j && Path::new(inner).starts_with(outer_path) && inner != outer {
                    overlaps.push((outer.clone(), inner.clone()));
                }
            }
        }

        overlaps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_roots(roots: &[&str]) -> AppConfig {
        AppConfig {
            scan_roots: roots.iter().map(|r| r.to_string()).collect(),
            ..AppConfig::default()
        }
    }

    #[test]
    fn test_resolve_root_defaults_to_first() {
        let config = config_with_roots(&["/data/photos", "/data/docs"]);
        assert_eq!(config.resolve_root(None).unwrap(), "/data/photos");
    }

    #[test]
    fn test_resolve_root_by_index_and_path() {
        let config = config_with_roots(&["/data/photos", "/data/docs"]);
        assert_eq!(config.resolve_root(Some("1")).unwrap(), "/data/docs");
        assert_eq!(config.resolve_root(Some("/tmp/other")).unwrap(), "/tmp/other");
        assert!(matches!(
            config.resolve_root(Some("7")),
            Err(Error::UnknownRoot(_))
        ));
    }

    #[test]
    fn test_resolve_root_without_roots() {
        let config = AppConfig::default();
        assert!(matches!(config.resolve_root(None), Err(Error::UnknownRoot(_))));
    }

    #[test]
    fn test_overlapping_roots() {
        let config = config_with_roots(&["/home/user", "/home/user/docs", "/var/data"]);
        let overlaps = config.overlapping_roots();
        assert_eq!(
            overlaps,
            vec![("/home/user".to_string(), "/home/user/docs".to_string())]
        );
    }

    #[test]
    fn test_no_overlap_for_sibling_prefixes() {
        // "/data/photos2" shares a string prefix but is not inside "/data/photos"
        let config = config_with_roots(&["/data/photos", "/data/photos2"]);
        assert!(config.overlapping_roots().is_empty());
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.max_same_size_files, 100);
        assert_eq!(config.min_file_size_for_hash, 1);
        assert_eq!(config.db_path, "space_ledger.db");
    }
}
