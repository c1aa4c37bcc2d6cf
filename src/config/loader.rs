//! Configuration Loader
//!
//! Layers sources in increasing precedence: built-in defaults, an optional TOML file, then
//! `CATALOG__SECTION__FIELD` environment variables.

use std::path::{Path, PathBuf};

use config::{Config, Environment, File, FileFormat};
use tracing::{debug, info};

use super::error::ConfigResult;
use super::CatalogConfig;

/// Environment variable naming an explicit configuration file
pub const CONFIG_PATH_ENV: &str = "CATALOG_CONFIG_PATH";

/// Used when `CATALOG_CONFIG_PATH` is unset; missing is fine
pub const DEFAULT_CONFIG_PATH: &str = "config/catalog.toml";

const ENV_PREFIX: &str = "CATALOG";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load with file discovery and environment overrides
    pub fn load() -> ConfigResult<CatalogConfig> {
        let path = std::env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
        Self::load_from_path(&path)
    }

    /// Load from a specific file path plus environment overrides
    pub fn load_from_path(path: &Path) -> ConfigResult<CatalogConfig> {
        let config = Self::build(Some(path), true)?;
        Self::finish(config, path)
    }

    /// Load a file without consulting the process environment
    pub fn load_file_only(path: &Path) -> ConfigResult<CatalogConfig> {
        let config = Self::build(Some(path), false)?;
        Self::finish(config, path)
    }

    fn build(path: Option<&Path>, with_env: bool) -> ConfigResult<CatalogConfig> {
        let defaults = Config::try_from(&CatalogConfig::default())?;
        let mut builder = Config::builder().add_source(defaults);

        if let Some(path) = path {
            debug!(path = %path.display(), exists = path.exists(), "Adding configuration file source");
            builder = builder.add_source(
                File::from(path.to_path_buf())
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        if with_env {
            builder = builder.add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("validation.allowed_genres"),
            );
        }

        Ok(builder.build()?.try_deserialize::<CatalogConfig>()?)
    }

    fn finish(config: CatalogConfig, path: &Path) -> ConfigResult<CatalogConfig> {
        config.validate()?;

        let sanitized = config.sanitized();
        debug!(
            "Configuration loaded: {}",
            serde_json::to_string(&sanitized)
                .unwrap_or_else(|_| "[serialization error]".to_string())
        );
        info!(
            source = %path.display(),
            queue = %config.queue.queue_name,
            workers = config.consumer.worker_count,
            cache_backend = ?config.cache.backend,
            "Configuration loaded successfully"
        );
        Ok(config)
    }
}
