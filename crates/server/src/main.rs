mod config;
mod watcher;

use std::sync::Arc;

use anyhow::Result;
use throttlegate_rate_limit::{MemoryStore, RateLimit};
use tokio::runtime::Handle;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::ServerSettings;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .json()
        .init();

    // Parse command-line args for config path
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/throttlegate.yaml".to_string());

    info!(config_path = %config_path, "starting throttlegate");

    let settings = ServerSettings::load(&config_path)?;
    let listen = settings.config.server.listen.clone();
    let admin_listen = settings.config.server.admin.listen.clone();

    let store = MemoryStore::new(Handle::current());
    let limiter = RateLimit::new(settings.config.server.rate_limits.clone(), Arc::new(store));

    let _watcher = if settings.config.server.watch_config {
        Some(watcher::spawn(settings, limiter.clone())?)
    } else {
        info!("configuration watching disabled");
        None
    };

    let state = throttlegate_admin::new_shared_state(limiter)?;

    // Public traffic and the admin API listen on separate addresses.
    tokio::try_join!(
        throttlegate_admin::run_server(state.clone(), &listen),
        throttlegate_admin::run_admin_server(state, &admin_listen),
    )?;

    Ok(())
}
