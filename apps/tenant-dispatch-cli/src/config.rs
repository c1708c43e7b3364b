//! Layered application configuration.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use serde::{Deserialize, Serialize};
use tenant_dispatch::DispatchConfig;

/// Prefix for environment overrides, e.g. `TENANT_DISPATCH__DISPATCH__ROOT_DOMAIN`.
pub const ENV_PREFIX: &str = "TENANT_DISPATCH__";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    /// Origin the CLI acts as if it were browsing.
    pub origin: String,

    /// Current path, used for the sign-in redirect decision.
    pub path: String,

    /// Credential file. Defaults to the platform data directory.
    pub credentials_file: Option<PathBuf>,

    pub dispatch: DispatchConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            origin: "http://localhost:3000".to_owned(),
            path: "/".to_owned(),
            credentials_file: None,
            dispatch: DispatchConfig::default(),
        }
    }
}

/// Flag values that override every other layer.
#[derive(Debug, Default)]
pub struct CliOverrides {
    pub origin: Option<String>,
    pub path: Option<String>,
    pub api_origin: Option<String>,
    pub credentials_file: Option<PathBuf>,
}

impl AppConfig {
    /// Load defaults, then the YAML file (if any), then `TENANT_DISPATCH__*`
    /// environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or any layer fails to parse.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new().merge(Serialized::defaults(AppConfig::default()));
        if let Some(path) = path {
            if !path.is_file() {
                anyhow::bail!("config file does not exist: {}", path.display());
            }
            figment = figment.merge(Yaml::file(path));
        }
        figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .context("failed to load configuration")
    }

    pub fn apply_overrides(&mut self, overrides: CliOverrides) {
        if let Some(origin) = overrides.origin {
            self.origin = origin;
        }
        if let Some(path) = overrides.path {
            self.path = path;
        }
        if let Some(api_origin) = overrides.api_origin {
            self.dispatch.api_origin = Some(api_origin);
        }
        if let Some(file) = overrides.credentials_file {
            self.credentials_file = Some(file);
        }
    }

    /// Credential file location.
    ///
    /// # Errors
    ///
    /// Returns an error if no file is configured and the platform has no
    /// data directory.
    pub fn credentials_path(&self) -> Result<PathBuf> {
        if let Some(file) = &self.credentials_file {
            return Ok(file.clone());
        }
        dirs::data_local_dir()
            .map(|dir| dir.join("tenant-dispatch").join("session.json"))
            .context("no local data directory; set credentials_file")
    }
}
