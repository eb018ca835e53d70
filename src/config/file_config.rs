use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub db_dir: Option<String>,
    pub content_dir: Option<String>,
    pub read_pool_size: Option<usize>,
    pub busy_timeout_ms: Option<u64>,

    // Tags
    pub write_tags: Option<bool>,

    // Bootstrap
    pub default_admin_name: Option<String>,
    pub default_admin_password: Option<String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn loads_partial_config() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
db_dir = "/data"
write_tags = false
busy_timeout_ms = 250
"#
        )
        .unwrap();

        let config = FileConfig::load(file.path()).unwrap();
        assert_eq!(config.db_dir.as_deref(), Some("/data"));
        assert_eq!(config.write_tags, Some(false));
        assert_eq!(config.busy_timeout_ms, Some(250));
        assert!(config.content_dir.is_none());
        assert!(config.default_admin_password.is_none());
    }

    #[test]
    fn rejects_malformed_toml() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "db_dir = ").unwrap();
        assert!(FileConfig::load(file.path()).is_err());
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(FileConfig::load(Path::new("/nonexistent/tunevault.toml")).is_err());
    }
}
