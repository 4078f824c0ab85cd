//! Webhook capture and inspection service.
//!
//! Any request to `/webhook` is recorded (method, headers, query, body) in a
//! SQLite file and can be read back through `/api/requests`. The endpoint can
//! be switched off at runtime through `/api/settings`, either answering with a
//! configured error or pretending the route does not exist at all.
//!
//! ## Issues:
//!
//! Captured requests are kept until someone calls `/api/clear`; nothing ages
//! them out.
//!
//! Settings live in memory only and reset to defaults on restart.

mod capture;
mod config;
mod endpoints;
mod logging;
mod settings;
mod store;

use anyhow::anyhow;
use clap::Parser as _;
use rocket::fs::{FileServer, Options};
use tracing::info;

use crate::{config::Config, settings::SettingsState, store::Store};

#[rocket::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    logging::init(&config.log_level, config.log_format)?;

    let store = Store::open(config.database_path())?;
    info!(path = %store.db_path().display(), "request store ready");

    let rocket = endpoints::rocket_build(store, SettingsState::default(), config.body_limit())
        .configure(config.figment())
        .mount(
            "/",
            FileServer::new(&config.static_dir, Options::Index | Options::Missing),
        );

    info!("Server running at http://localhost:{}", config.port);
    info!(
        "Webhook URL: http://localhost:{}{}",
        config.port,
        endpoints::CAPTURE_PATH
    );

    rocket
        .launch()
        .await
        .map_err(|err| anyhow!("server failed: {err}"))?;
    Ok(())
}
