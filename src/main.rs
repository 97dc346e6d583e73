use meeting_reminder::startup;
use tracing::info;

#[tokio::main]
async fn main() -> miette::Result<()> {
    // Load configuration
    let config = startup::load_config()?;

    // Initialize logging
    startup::init_logging(config.log_file.as_deref())?;

    info!("Program started");

    // Start the event watcher
    startup::run(config).await
}
