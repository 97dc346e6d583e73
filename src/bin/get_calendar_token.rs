use meeting_reminder::components::TokenManager;
use meeting_reminder::startup;

#[tokio::main]
async fn main() -> miette::Result<()> {
    // Load configuration
    let config = startup::load_config()?;

    // Log to the terminal so the authorization URL is visible
    startup::init_logging(None)?;

    // Always run the browser flow, replacing any saved token
    let token_manager = TokenManager::new(&config);
    println!("Opening browser for Microsoft 365 authorization...");
    token_manager.authorize().await?;

    println!("Token successfully saved to {}", config.token_path.display());

    Ok(())
}
