//! Runtime configuration: defaults, an optional YAML file, then env overrides.
//!
//! | env                  | effect                                   |
//! |----------------------|------------------------------------------|
//! | `PENSIONDASH_CONFIG` | YAML file to start from                  |
//! | `PENSIONDASH_DB`     | read plans from this SQLite file         |
//! | `PENSIONDASH_API`    | read plans from this API endpoint        |
//! | `PORT`               | listen port (unparsable → 8080)          |

use crate::fetch;
use crate::source::RowSource;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{env, fs, net::IpAddr, path::Path};
use tracing::warn;

pub const DEFAULT_PORT: u16 = 8080;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub source: RowSource,
    pub host: IpAddr,
    pub port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source: RowSource::default(),
            host: IpAddr::from([0, 0, 0, 0]),
            port: DEFAULT_PORT,
        }
    }
}

impl Config {
    /// Load from the process environment.
    pub fn load() -> Result<Self> {
        let mut cfg = match env::var("PENSIONDASH_CONFIG") {
            Ok(path) => Self::from_yaml_file(path)?,
            Err(_) => Self::default(),
        };
        cfg.apply_env(|k| env::var(k).ok());
        Ok(cfg)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        serde_yaml::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    /// Overlay env-style settings; `lookup` is `env::var` outside tests.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(port) = lookup("PORT") {
            self.port = port.trim().parse().unwrap_or_else(|_| {
                warn!(%port, "unparsable PORT, using {}", DEFAULT_PORT);
                DEFAULT_PORT
            });
        }
        if let Some(endpoint) = lookup("PENSIONDASH_API") {
            let variables = match &self.source {
                RowSource::Api { variables, .. } => variables.clone(),
                RowSource::Database { .. } => fetch::to_owned_list(fetch::DASHBOARD_VARIABLES),
            };
            self.source = RowSource::Api {
                endpoint,
                variables,
            };
        }
        // the database wins when both are set
        if let Some(path) = lookup("PENSIONDASH_DB") {
            self.source = RowSource::Database { path: path.into() };
        }
    }
}
