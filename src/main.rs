//! CHANOPT — Marketing Channel Budget Optimizer
//!
//! Entry point. Loads configuration, initialises structured logging,
//! restores state from disk (or creates fresh), wires the collect →
//! train → allocate → publish pipeline, and serves the HTTP API with
//! graceful shutdown.

use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};

use chanopt::allocator::AllocationPlanner;
use chanopt::config::AppConfig;
use chanopt::connectors::google_analytics::GoogleAnalyticsSource;
use chanopt::connectors::mixpanel::MixpanelSource;
use chanopt::connectors::{AnalyticsSource, Collector};
use chanopt::dashboard::push::DashboardPusher;
use chanopt::dashboard::{self, DashboardState};
use chanopt::engine::ChannelOptimizer;
use chanopt::model::{Trainer, TrainerConfig};
use chanopt::storage;
use chanopt::types::OptimizerState;

const BANNER: &str = r#"
   ____ _   _    _    _   _  ___  ____ _____
  / ___| | | |  / \  | \ | |/ _ \|  _ \_   _|
 | |   | |_| | / _ \ |  \| | | | | |_) || |
 | |___|  _  |/ ___ \| |\  | |_| |  __/ | |
  \____|_| |_/_/   \_\_| \_|\___/|_|    |_|

  Channel Optimizer — budget allocation service
  v0.1.0
"#;

const STATE_FILE: &str = "chanopt_state.json";

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    // Load configuration from TOML
    let cfg = AppConfig::load("config.toml")?;

    // Initialise structured logging
    init_logging();

    // Print startup banner
    println!("{BANNER}");
    info!(
        service = %cfg.service.name,
        port = cfg.service.port,
        advertising_limit = cfg.budget.advertising_limit,
        organic_limit = cfg.budget.organic_limit,
        "CHANOPT starting up"
    );

    // -- Restore or create state -----------------------------------------

    let state = match storage::load_state(Some(STATE_FILE))? {
        Some(s) => {
            info!(
                runs = s.runs_completed,
                records = s.records_ingested,
                "Resumed from saved state"
            );
            s
        }
        None => {
            let s = OptimizerState::new();
            info!("Fresh start");
            s
        }
    };

    // -- Initialise components -------------------------------------------

    // Analytics sources
    let mut sources: Vec<Box<dyn AnalyticsSource>> = Vec::new();

    if cfg.sources.google_analytics.enabled {
        let token = cfg
            .sources
            .google_analytics
            .access_token_env
            .as_deref()
            .and_then(|env| std::env::var(env).ok());
        if token.is_none() {
            warn!("Google Analytics enabled without an access token — sample data only");
        }
        sources.push(Box::new(GoogleAnalyticsSource::new(
            &cfg.sources.google_analytics.property_id,
            token,
            cfg.sources.lookback_days,
        )?));
    }

    if cfg.sources.mixpanel.enabled {
        let account = cfg
            .sources
            .mixpanel
            .service_account_env
            .as_deref()
            .and_then(|env| std::env::var(env).ok());
        if account.is_none() {
            warn!("Mixpanel enabled without a service account — sample data only");
        }
        sources.push(Box::new(MixpanelSource::new(
            &cfg.sources.mixpanel.project_id,
            account,
            cfg.sources.lookback_days,
        )?));
    }

    info!(sources = sources.len(), "Analytics sources configured");

    let collector = Collector::new(sources, cfg.sources.cache_ttl_mins);

    // Model trainer
    let trainer = Trainer::new(TrainerConfig::from(&cfg.model));

    // Budget planner
    let planner = AllocationPlanner::from_config(&cfg.budget)?;

    // External dashboard pusher
    let pusher = if cfg.dashboard.enabled && cfg.dashboard.push_url.is_some() {
        let token = cfg
            .dashboard
            .push_token_env
            .as_deref()
            .and_then(|env| AppConfig::resolve_env(env).ok());
        DashboardPusher::new(cfg.dashboard.push_url.clone(), token)?
    } else {
        DashboardPusher::disabled()
    };

    let optimizer = ChannelOptimizer::new(collector, trainer, planner, pusher);

    // -- Serve ------------------------------------------------------------

    let app_state = Arc::new(DashboardState::new(
        optimizer,
        state,
        Some(STATE_FILE.to_string()),
    ));

    dashboard::serve(app_state.clone(), &cfg.service.bind, cfg.service.port).await?;

    // Save final state
    let final_state = app_state.state.read().await;
    storage::save_state(&final_state, Some(STATE_FILE))?;
    info!(
        runs = final_state.runs_completed,
        records = final_state.records_ingested,
        total_allocated = %final_state.total_allocated(),
        "CHANOPT shut down cleanly."
    );

    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("chanopt=info"));

    let json_logging = std::env::var("CHANOPT_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
