use std::sync::Arc;

use aichat::ChatApp;
use aichat::settings::SettingsStore;
use tokio::io::BufReader;
use tracing_subscriber::EnvFilter;

/// Loads settings, wires the Gemini provider and Firebase gateway, then hands the
/// terminal to the route loop. Logs go to stderr so they never interleave with the chat.
#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let settings = Arc::new(SettingsStore::load());
    tracing::info!("settings loaded from {:?}", settings.config_path());

    let input = BufReader::new(tokio::io::stdin());
    let output = tokio::io::stdout();

    let result = match ChatApp::from_settings(settings, input, output) {
        Ok(mut app) => app.run().await,
        Err(error) => Err(error),
    };

    if let Err(error) = result {
        tracing::error!(error = %error, "aichat exited with an error");
        eprintln!("{error}");
        std::process::exit(1);
    }
}
