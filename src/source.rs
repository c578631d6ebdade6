use crate::fetch;
use crate::process::RawTable;
use crate::store::PensionStore;
use anyhow::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

/// Where plan rows come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RowSource {
    Api {
        #[serde(default = "default_endpoint")]
        endpoint: String,
        #[serde(default = "default_variables")]
        variables: Vec<String>,
    },
    Database {
        path: PathBuf,
    },
}

fn default_endpoint() -> String {
    fetch::DEFAULT_ENDPOINT.to_string()
}

fn default_variables() -> Vec<String> {
    fetch::to_owned_list(fetch::DASHBOARD_VARIABLES)
}

impl Default for RowSource {
    fn default() -> Self {
        RowSource::Api {
            endpoint: default_endpoint(),
            variables: default_variables(),
        }
    }
}

impl RowSource {
    /// Pull the whole snapshot once.
    pub async fn load(&self, client: &Client) -> Result<RawTable> {
        match self {
            RowSource::Api {
                endpoint,
                variables,
            } => {
                info!(%endpoint, "loading plan rows from API");
                fetch::fetch_plan_table(client, endpoint, variables).await
            }
            RowSource::Database { path } => {
                info!(path = %path.display(), "loading plan rows from database");
                let path = path.clone();
                tokio::task::spawn_blocking(move || {
                    PensionStore::open_read_only(&path)?.load_raw()
                })
                .await
                .context("database read task panicked")?
            }
        }
    }
}
