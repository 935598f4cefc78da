use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use signatories::config::Settings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Init logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    fmt().with_env_filter(filter).init();

    let settings = Settings::from_env();

    // Startup banner at info level so something always prints at default verbosity
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    info!(
        target: "signatories",
        "signatories starting: RUST_LOG='{}', port={}, sandbox={}, db_path='{}', everyone_is_editor={}",
        rust_log, settings.port, settings.sandbox, settings.db_path, settings.everyone_is_editor
    );

    signatories::server::run(settings).await
}
