//! Serves a persisted study catalog over HTTP.
//!
//! Usage: `studycat [settings]`, where `settings` names an optional settings
//! file (default `studycat`, with any extension the config crate understands).
//! Every setting can be overridden through `STUDYCAT__*` environment variables.

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use studycat::error::Result;
use studycat::persist::Persistor;
use studycat::server::{self, AppState};
use studycat::settings::Settings;

#[tokio::main]
async fn main() -> Result<()> {
    let settings_path = std::env::args().nth(1).unwrap_or_else(|| String::from("studycat"));
    let settings = Settings::load(&settings_path)?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.log)))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(database = %settings.database, "restoring catalog");
    let persistor = Persistor::new(&settings.persistence_mode())?;
    let catalog = persistor.restore(settings.catalog_options()?)?;

    let state = Arc::new(AppState {
        catalog,
        qualifier_code: settings.catalog.qualifier_code.clone(),
    });
    server::serve(&settings.listen, state).await
}
