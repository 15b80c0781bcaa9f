mod backoff;
mod config;
mod discord;
mod error;
mod gateway;
mod handler;
mod health;
mod session;
mod shutdown;
mod source;

use std::{process::ExitCode, sync::Arc};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::{Configuration, DEFAULT_LOG_FILTER};
use discord::Discord;
use error::BotError;
use session::Bootstrapper;
use shutdown::Shutdown;

#[tokio::main]
async fn main() -> ExitCode {
    let config = Configuration::load();
    init_tracing(
        config
            .as_ref()
            .map_or(DEFAULT_LOG_FILTER, |config| config.log_filter()),
    );

    let result = match config {
        Ok(config) => run(config).await,
        Err(err) => Err(BotError::from(err)),
    };

    match result {
        Ok(()) => {
            tracing::info!("Shutdown complete");
            ExitCode::SUCCESS
        }
        Err(err) => {
            tracing::error!("{}", err);
            ExitCode::from(err.exit_code())
        }
    }
}

fn init_tracing(filter: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_new(filter);
    let invalid = env_filter.is_err();

    tracing_subscriber::registry()
        .with(env_filter.unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    if invalid {
        tracing::warn!("Invalid log filter {:?}, using {:?}", filter, DEFAULT_LOG_FILTER);
    }
}

async fn run(config: Configuration) -> Result<(), BotError> {
    tracing::info!(
        health_port = config.health_port(),
        max_retries = config.retry().max_retries,
        "Configuration loaded"
    );

    let shutdown = Arc::new(Shutdown::new());
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move { shutdown.trigger_on_signal().await }
    });

    let bootstrapper = Bootstrapper::new(Discord::new());
    let health = tokio::spawn(health::serve(
        config.health_port(),
        bootstrapper.subscribe(),
        shutdown.subscribe(),
    ));

    let result = session::serve(bootstrapper, &config, &mut shutdown.subscribe()).await;

    // the health server only listens for shutdown, so end it on error paths too
    shutdown.trigger();
    if let Err(err) = health.await {
        tracing::warn!("Health check server task failed: {}", err);
    }

    result
}
