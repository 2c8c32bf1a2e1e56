use std::sync::Arc;

use rw_core::{config::Config, ports::DirectoryStore};
use rw_postgres::PgDirectory;

#[tokio::main]
async fn main() -> Result<(), rw_core::Error> {
    let cfg = Arc::new(Config::load()?);
    rw_core::logging::init("rw", cfg.log_file.as_deref())?;

    let store: Arc<dyn DirectoryStore> = Arc::new(PgDirectory::connect(&cfg.database).await?);
    tracing::info!(
        max_connections = cfg.database.max_connections,
        "directory store connected"
    );

    rw_telegram::router::run_polling(cfg, store)
        .await
        .map_err(|e| rw_core::Error::External(format!("telegram bot failed: {e}")))?;

    tracing::info!("rosterwatch stopped");
    Ok(())
}
