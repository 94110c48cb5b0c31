use std::path::PathBuf;

use anyhow::{Context, Result};
use config::{Config, Environment};
use serde::Deserialize;

const DEFAULT_BIND: &str = "127.0.0.1:3000";
const DEFAULT_DB_PATH: &str = "data/dashboard.sqlite";
const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:3000";

/// Runtime settings, read from `DASH_*` environment variables
/// (`DASH_BIND`, `DASH_DB_PATH`, `DASH_SERVER_URL`). CLI flags override.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub bind: String,
    pub db_path: PathBuf,
    pub server_url: String,
}

impl Settings {
    pub fn load() -> Result<Self> {
        Self::from_env(Environment::with_prefix("DASH"))
    }

    fn from_env(env: Environment) -> Result<Self> {
        Config::builder()
            .set_default("bind", DEFAULT_BIND)?
            .set_default("db_path", DEFAULT_DB_PATH)?
            .set_default("server_url", DEFAULT_SERVER_URL)?
            .add_source(env)
            .build()
            .and_then(|c| c.try_deserialize::<Settings>())
            .context("Invalid DASH_* settings")
    }
}
