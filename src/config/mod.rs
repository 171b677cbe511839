//! Configuration loading.
//!
//! Resolution order for the file: explicit path, then `VERSOLIVRO_CONFIG`,
//! then `config.toml` in the platform config directory. A missing file means
//! defaults. Selected fields can then be overridden from the environment.

pub mod schema;

pub use schema::{AuthConfig, BooksConfig, Config, GatewayConfig, LogConfig};

use anyhow::{bail, Context, Result};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

pub const CONFIG_ENV: &str = "VERSOLIVRO_CONFIG";
const ENV_HOST: &str = "VERSOLIVRO_HOST";
const ENV_PORT: &str = "VERSOLIVRO_PORT";
const ENV_DATA_DIR: &str = "VERSOLIVRO_DATA_DIR";
const ENV_LOG: &str = "VERSOLIVRO_LOG";

/// Name of the SQLite database file inside `data_dir`.
pub const DATABASE_FILE: &str = "versolivro.db";

/// Default location of the config file, if the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("org", "versolivro", "versolivro")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

impl Config {
    /// Load, apply environment overrides, expand paths and validate.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from))
            .or_else(default_config_path);

        let mut config = match path {
            Some(path) if path.exists() => Self::from_file(&path)?,
            Some(path) if explicit.is_some() => {
                bail!("Config file not found: {}", path.display())
            }
            _ => Self::default(),
        };

        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.expand_paths();
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Self = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        tracing::debug!(path = %path.display(), "Loaded config file");
        Ok(config)
    }

    /// Override fields from environment-style variables supplied by `lookup`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup(ENV_HOST).filter(|v| !v.trim().is_empty()) {
            self.gateway.host = host.trim().to_string();
        }
        if let Some(port) = lookup(ENV_PORT) {
            self.gateway.port = port
                .trim()
                .parse()
                .with_context(|| format!("{ENV_PORT} is not a valid port: {port:?}"))?;
        }
        if let Some(dir) = lookup(ENV_DATA_DIR).filter(|v| !v.trim().is_empty()) {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(filter) = lookup(ENV_LOG).filter(|v| !v.trim().is_empty()) {
            self.log.filter = filter;
        }
        Ok(())
    }

    /// Expand a leading `~` in configured paths.
    pub fn expand_paths(&mut self) {
        self.data_dir = expand(&self.data_dir);
        self.books.covers_dir = expand(&self.books.covers_dir);
    }

    pub fn validate(&self) -> Result<()> {
        if self.gateway.port == 0 {
            bail!("gateway.port must be non-zero");
        }
        if self.gateway.max_body_bytes == 0 {
            bail!("gateway.max_body_bytes must be non-zero");
        }
        if self.auth.hash_iterations == 0 {
            bail!("auth.hash_iterations must be at least 1");
        }
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE)
    }

    pub fn covers_path(&self) -> PathBuf {
        self.data_dir.join(&self.books.covers_dir)
    }
}

fn expand(path: &Path) -> PathBuf {
    match path.to_str() {
        Some(s) => PathBuf::from(shellexpand::tilde(s).into_owned()),
        None => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert_eq!(config.gateway.host, "127.0.0.1");
        assert_eq!(config.gateway.port, 8000);
        assert_eq!(config.gateway.max_body_bytes, 5_242_880);
        assert_eq!(config.auth.hash_iterations, 100_000);
        assert_eq!(config.log.filter, "info");
        config.validate().unwrap();
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
data_dir = "/srv/versolivro"

[gateway]
port = 9000

[books]
covers_dir = "/srv/covers"
"#,
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.gateway.port, 9000);
        assert_eq!(config.gateway.host, "127.0.0.1");
        assert_eq!(config.database_path(), PathBuf::from("/srv/versolivro/versolivro.db"));
        // Absolute covers_dir replaces the data_dir prefix.
        assert_eq!(config.covers_path(), PathBuf::from("/srv/covers"));
    }

    #[test]
    fn unparseable_file_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "[gateway]\nport = \"many\"\n").unwrap();
        assert!(Config::from_file(&path).is_err());
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let err = Config::load(Some(&tmp.path().join("absent.toml"))).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn env_overrides_win() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("VERSOLIVRO_HOST", "0.0.0.0"),
            ("VERSOLIVRO_PORT", "8080"),
            ("VERSOLIVRO_DATA_DIR", "/tmp/verso"),
            ("VERSOLIVRO_LOG", "debug"),
        ]);
        let mut config = Config::default();
        config
            .apply_env_overrides(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.gateway.host, "0.0.0.0");
        assert_eq!(config.gateway.port, 8080);
        assert_eq!(config.data_dir, PathBuf::from("/tmp/verso"));
        assert_eq!(config.log.filter, "debug");
    }

    #[test]
    fn bad_port_override_is_rejected() {
        let mut config = Config::default();
        let result = config.apply_env_overrides(|key| {
            (key == "VERSOLIVRO_PORT").then(|| "http".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn validate_rejects_zero_values() {
        let mut config = Config::default();
        config.gateway.port = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.auth.hash_iterations = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.gateway.max_body_bytes = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn tilde_is_expanded() {
        let mut config = Config::default();
        config.expand_paths();
        assert!(!config.data_dir.to_string_lossy().starts_with('~'));
    }
}
