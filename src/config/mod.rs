mod file_config;

pub use file_config::FileConfig;

use crate::library_store::LibraryStoreOptions;
use anyhow::{bail, Result};
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_READ_POOL_SIZE: usize = 4;
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;
const DEFAULT_ADMIN_NAME: &str = "admin";

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub content_dir: Option<PathBuf>,
    pub read_pool_size: Option<usize>,
    pub busy_timeout_ms: Option<u64>,
    pub no_write_tags: bool,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_dir: PathBuf,
    pub content_dir: PathBuf,
    pub read_pool_size: usize,
    pub busy_timeout_ms: u64,
    /// When false, content files are stored as uploaded and never re-tagged.
    pub write_tags: bool,
    pub default_admin_name: String,
    pub default_admin_password: Option<String>,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_dir = file
            .db_dir
            .map(PathBuf::from)
            .or_else(|| cli.db_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_dir must be specified via --db-dir or in config file")
            })?;

        if !db_dir.exists() {
            bail!("Database directory does not exist: {:?}", db_dir);
        }
        if !db_dir.is_dir() {
            bail!("db_dir is not a directory: {:?}", db_dir);
        }

        let content_dir = file
            .content_dir
            .map(PathBuf::from)
            .or_else(|| cli.content_dir.clone())
            .unwrap_or_else(|| db_dir.join("songs"));

        let read_pool_size = file
            .read_pool_size
            .or(cli.read_pool_size)
            .unwrap_or(DEFAULT_READ_POOL_SIZE);
        let busy_timeout_ms = file
            .busy_timeout_ms
            .or(cli.busy_timeout_ms)
            .unwrap_or(DEFAULT_BUSY_TIMEOUT_MS);
        let write_tags = file.write_tags.unwrap_or(!cli.no_write_tags);

        let default_admin_name = file
            .default_admin_name
            .unwrap_or_else(|| DEFAULT_ADMIN_NAME.to_string());
        if default_admin_name.trim().is_empty() {
            bail!("default_admin_name cannot be blank");
        }

        Ok(Self {
            db_dir,
            content_dir,
            read_pool_size,
            busy_timeout_ms,
            write_tags,
            default_admin_name,
            default_admin_password: file.default_admin_password,
        })
    }

    pub fn library_db_path(&self) -> PathBuf {
        self.db_dir.join("library.db")
    }

    pub fn store_options(&self) -> LibraryStoreOptions {
        LibraryStoreOptions {
            read_pool_size: self.read_pool_size,
            busy_timeout: Duration::from_millis(self.busy_timeout_ms),
            default_admin_name: self.default_admin_name.clone(),
            default_admin_password: self.default_admin_password.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn resolves_cli_only_with_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let cli = CliConfig {
            db_dir: Some(temp_dir.path().to_path_buf()),
            ..Default::default()
        };

        let config = AppConfig::resolve(&cli, None).unwrap();

        assert_eq!(config.db_dir, temp_dir.path());
        assert_eq!(config.content_dir, temp_dir.path().join("songs"));
        assert_eq!(config.read_pool_size, 4);
        assert_eq!(config.busy_timeout_ms, 5000);
        assert!(config.write_tags);
        assert_eq!(config.default_admin_name, "admin");
        assert!(config.default_admin_password.is_none());
        assert_eq!(config.library_db_path(), temp_dir.path().join("library.db"));
    }

    #[test]
    fn toml_overrides_cli() {
        let cli_dir = TempDir::new().unwrap();
        let toml_dir = TempDir::new().unwrap();
        let cli = CliConfig {
            db_dir: Some(cli_dir.path().to_path_buf()),
            content_dir: Some(PathBuf::from("/cli/songs")),
            read_pool_size: Some(8),
            busy_timeout_ms: Some(100),
            no_write_tags: false,
        };
        let file = FileConfig {
            db_dir: Some(toml_dir.path().to_string_lossy().to_string()),
            content_dir: Some("/toml/songs".to_string()),
            read_pool_size: Some(2),
            write_tags: Some(false),
            default_admin_password: Some("pw".to_string()),
            ..Default::default()
        };

        let config = AppConfig::resolve(&cli, Some(file)).unwrap();

        assert_eq!(config.db_dir, toml_dir.path());
        assert_eq!(config.content_dir, PathBuf::from("/toml/songs"));
        assert_eq!(config.read_pool_size, 2);
        assert_eq!(config.busy_timeout_ms, 100);
        assert!(!config.write_tags);
        assert_eq!(config.default_admin_password.as_deref(), Some("pw"));

        let options = config.store_options();
        assert_eq!(options.busy_timeout, Duration::from_millis(100));
        assert_eq!(options.read_pool_size, 2);
    }

    #[test]
    fn missing_db_dir_is_an_error() {
        assert!(AppConfig::resolve(&CliConfig::default(), None).is_err());
    }

    #[test]
    fn nonexistent_db_dir_is_an_error() {
        let cli = CliConfig {
            db_dir: Some(PathBuf::from("/nonexistent/tunevault")),
            ..Default::default()
        };
        assert!(AppConfig::resolve(&cli, None).is_err());
    }

    #[test]
    fn blank_admin_name_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let cli = CliConfig {
            db_dir: Some(temp_dir.path().to_path_buf()),
            ..Default::default()
        };
        let file = FileConfig {
            default_admin_name: Some("  ".to_string()),
            ..Default::default()
        };
        assert!(AppConfig::resolve(&cli, Some(file)).is_err());
    }
}
