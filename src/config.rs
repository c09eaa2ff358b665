//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (API tokens) are referenced by env-var name in the config and
//! resolved at runtime via `std::env::var`.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub service: ServiceConfig,
    pub sources: SourcesConfig,
    pub model: ModelConfig,
    pub budget: BudgetConfig,
    pub dashboard: DashboardConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    pub name: String,
    pub port: u16,
    /// Bind address, e.g. "0.0.0.0".
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourcesConfig {
    pub google_analytics: GoogleAnalyticsConfig,
    pub mixpanel: MixpanelConfig,
    /// How far back performance data is pulled, in days.
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,
    /// Cache TTL for fetched frames, in minutes.
    #[serde(default = "default_cache_ttl_mins")]
    pub cache_ttl_mins: i64,
}

fn default_lookback_days() -> u32 {
    28
}

fn default_cache_ttl_mins() -> i64 {
    15
}

#[derive(Debug, Deserialize, Clone)]
pub struct GoogleAnalyticsConfig {
    pub enabled: bool,
    /// GA4 property, e.g. "properties/123456789".
    pub property_id: String,
    /// Env var holding the OAuth access token.
    pub access_token_env: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MixpanelConfig {
    pub enabled: bool,
    pub project_id: String,
    /// Env var holding "username:secret" for the service account.
    pub service_account_env: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    /// Fraction of rows held out for evaluation (0.0–0.5).
    pub holdout_fraction: f64,
    /// Number of boosting rounds.
    pub rounds: usize,
    /// Shrinkage applied to each boosting round.
    pub learning_rate: f64,
    /// Minimum rows required before a split is attempted.
    pub min_split_rows: usize,
    /// Fixed RNG seed for the holdout shuffle. None = nondeterministic.
    #[serde(default)]
    pub split_seed: Option<u64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BudgetConfig {
    /// Per-class budget limits in the account currency.
    pub advertising_limit: f64,
    pub organic_limit: f64,
    /// Minimum fraction of its class budget any funded channel receives.
    pub min_share: f64,
    /// Maximum fraction of its class budget any single channel receives.
    pub max_share: f64,
    /// Allocations below this amount are dropped and redistributed.
    pub min_allocation: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DashboardConfig {
    pub enabled: bool,
    /// Optional external webhook the allocation payload is pushed to.
    #[serde(default)]
    pub push_url: Option<String>,
    /// Env var holding the webhook bearer token.
    #[serde(default)]
    pub push_token_env: Option<String>,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        config.validate()?;
        Ok(config)
    }

    /// Sanity-check ranges the type system can't express.
    fn validate(&self) -> Result<()> {
        if !(0.0..=0.5).contains(&self.model.holdout_fraction) {
            anyhow::bail!(
                "model.holdout_fraction must be in [0.0, 0.5], got {}",
                self.model.holdout_fraction
            );
        }
        if self.model.rounds == 0 {
            anyhow::bail!("model.rounds must be at least 1");
        }
        if self.budget.advertising_limit < 0.0 || self.budget.organic_limit < 0.0 {
            anyhow::bail!("budget limits must be non-negative");
        }
        if self.budget.min_share < 0.0 || self.budget.max_share > 1.0 {
            anyhow::bail!("budget shares must lie within [0.0, 1.0]");
        }
        if self.budget.min_share > self.budget.max_share {
            anyhow::bail!(
                "budget.min_share ({}) exceeds budget.max_share ({})",
                self.budget.min_share,
                self.budget.max_share
            );
        }
        Ok(())
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}
