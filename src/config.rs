use std::env;
use std::str::FromStr;

use anyhow::{Context, anyhow, bail};
use dotenvy::dotenv;
use strum_macros::EnumString;
use tracing::Level;

use crate::workflow::WorkflowSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum StoreBackend {
    Mysql,
    Memory,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server_addr: String,
    /// Required when `store_backend` is MySQL.
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub api_prefix: String,

    // Rate limiting
    pub rate_protected_per_min: u32,

    pub store_backend: StoreBackend,
    pub directory_seed: Option<String>,

    pub workflow: WorkflowSettings,

    pub log_dir: String,
    pub log_level: Level,
}

fn parsed<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("{} has an invalid value {:?}: {}", key, raw, e)),
        None => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let required = |key: &str| lookup(key).with_context(|| format!("{} must be set", key));

        let store_backend = parsed(&lookup, "STORE_BACKEND", StoreBackend::Mysql)?;
        let database_url = lookup("DATABASE_URL");
        if store_backend == StoreBackend::Mysql && database_url.is_none() {
            bail!("DATABASE_URL must be set when STORE_BACKEND=mysql");
        }

        let defaults = WorkflowSettings::default();
        let workflow = WorkflowSettings {
            apply_number_prefix: lookup("APPLY_NUMBER_PREFIX")
                .unwrap_or(defaults.apply_number_prefix),
            numbering: parsed(&lookup, "NUMBERING_STRATEGY", defaults.numbering)?,
            numbering_max_attempts: parsed(
                &lookup,
                "NUMBERING_MAX_ATTEMPTS",
                defaults.numbering_max_attempts,
            )?,
            approval_order: parsed(&lookup, "APPROVAL_ORDER", defaults.approval_order)?,
            max_page_size: parsed(&lookup, "MAX_PAGE_SIZE", defaults.max_page_size)?,
        };
        if workflow.numbering_max_attempts == 0 {
            bail!("NUMBERING_MAX_ATTEMPTS must be at least 1");
        }
        if workflow.max_page_size == 0 {
            bail!("MAX_PAGE_SIZE must be at least 1");
        }

        Ok(Self {
            server_addr: required("SERVER_ADDR")?,
            database_url,
            jwt_secret: required("JWT_SECRET")?,
            api_prefix: lookup("API_PREFIX").unwrap_or_else(|| "/api".to_string()),
            rate_protected_per_min: parsed(&lookup, "RATE_PROTECTED_PER_MIN", 1000)?,
            store_backend,
            directory_seed: lookup("DIRECTORY_SEED"),
            workflow,
            log_dir: lookup("LOG_DIR").unwrap_or_else(|| "logs".to_string()),
            log_level: parsed(&lookup, "LOG_LEVEL", Level::DEBUG)?,
        })
    }
}
