pub mod cli;
pub mod core;
pub mod providers;

use crate::core::config::AppConfig;
use crate::core::{FinanceApi, FinanceState, MovementType, RecordId, StaticSession, StaticToken};
use crate::providers::http::HttpFinanceApi;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub enum AppCommand {
    Summary {
        date: Option<NaiveDate>,
    },
    Add {
        value: String,
        description: String,
        kind: MovementType,
    },
    Remove {
        id: RecordId,
        date: Option<NaiveDate>,
    },
    Profile,
}

/// Everything a command needs for one signed-in session.
pub struct AppContext {
    pub session: Arc<StaticSession>,
    pub state: FinanceState,
}

impl AppContext {
    /// Builds the API client and establishes the session from the profile
    /// endpoint.
    pub async fn connect(config: &AppConfig) -> Result<Self> {
        let token = config.resolved_token().with_context(|| {
            format!(
                "No API token configured; set api.token or {}",
                crate::core::config::TOKEN_ENV_VAR
            )
        })?;

        let tokens = Arc::new(StaticToken::new(Some(token)));
        let api: Arc<dyn FinanceApi> = Arc::new(
            HttpFinanceApi::new(&config.api.base_url, tokens)
                .context("Failed to build API client")?,
        );

        let user = api
            .fetch_profile()
            .await
            .context("Failed to establish session")?;
        info!(user = %user.name, "Session established");

        let session = Arc::new(StaticSession::new(Some(user)));
        let state = FinanceState::new(api, session.clone());
        Ok(Self { session, state })
    }
}

fn load_config(config_path: Option<&str>) -> Result<AppConfig> {
    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {:?}", config.api.base_url);
    Ok(config)
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("Finance tracker starting...");

    let config = load_config(config_path)?;
    let ctx = AppContext::connect(&config).await?;

    match command {
        AppCommand::Summary { date } => cli::summary::run(&ctx, date).await,
        AppCommand::Add {
            value,
            description,
            kind,
        } => cli::register::run_add(&ctx, &value, &description, kind).await,
        AppCommand::Remove { id, date } => cli::register::run_remove(&ctx, &id, date).await,
        AppCommand::Profile => cli::profile::run(&ctx),
    }
}
