use crate::components::calendar::{CalendarService, SystemClock};
use crate::components::{BrowserReminder, GraphCalendar, TokenManager};
use crate::config::Config;
use crate::error::Error;
use crate::shutdown;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

const DEFAULT_LOG_FILTER: &str = "info,reqwest=warn,hyper=warn";

/// Initialize logging with environment-based configuration
pub fn init_logging(log_file: Option<&Path>) -> miette::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let result = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(Error::from)?;
            let subscriber = FmtSubscriber::builder()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .finish();
            tracing::subscriber::set_global_default(subscriber)
        }
        None => {
            let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
            tracing::subscriber::set_global_default(subscriber)
        }
    };

    result.map_err(|e| Error::Other(format!("Failed to set up logging: {}", e)))?;
    Ok(())
}

/// Load the application config
pub fn load_config() -> miette::Result<Config> {
    Config::load().map_err(Into::into)
}

/// Authorize, wire the components and run the watcher until shutdown
pub async fn run(config: Config) -> miette::Result<()> {
    let interval = config.interval()?;

    // Make sure we can talk to Graph before entering the loop
    let tokens = Arc::new(TokenManager::new(&config));
    if let Err(e) = tokens.ensure_authorized().await {
        error!("Failed to initialize auth: {}", e);
        return Err(e.into());
    }

    let source = GraphCalendar::new(Arc::clone(&tokens), SystemClock);
    let sink = BrowserReminder::from_config(&config);
    let service = CalendarService::new(source, sink, SystemClock, interval);

    // Cancelled by the signal handler
    let shutdown_token = CancellationToken::new();
    tokio::spawn(shutdown::handle_signals(shutdown_token.clone()));

    service.run(shutdown_token).await;

    info!("Program stopped");
    Ok(())
}
