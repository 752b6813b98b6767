//! Hot reload of the rate limit rules when the configuration file changes.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use throttlegate_rate_limit::RateLimit;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::ServerSettings;

/// Bursts of events closer together than this trigger a single reload.
const SETTLE: Duration = Duration::from_millis(200);

/// Watch the configuration file and push every valid change into `limiter`.
///
/// The parent directory is watched so that editors replacing the file by
/// rename are picked up. A file that fails to load is logged and ignored.
pub fn spawn(mut settings: ServerSettings, limiter: RateLimit) -> Result<JoinHandle<()>> {
    let (tx, mut rx) = mpsc::channel::<notify::Result<Event>>(64);

    let mut watcher: RecommendedWatcher = notify::recommended_watcher(move |res| {
        // The receiver only goes away at shutdown.
        let _ = tx.blocking_send(res);
    })?;

    let dir = watch_dir(&settings.config_path);
    watcher
        .watch(&dir, RecursiveMode::NonRecursive)
        .with_context(|| format!("failed to watch {}", dir.display()))?;
    info!(path = %settings.config_path.display(), "watching configuration for changes");

    let file_name = settings.config_path.file_name().map(OsString::from);

    Ok(tokio::spawn(async move {
        // Dropping the watcher stops the notifications.
        let _watcher = watcher;

        while let Some(res) = rx.recv().await {
            match res {
                Ok(event) if touches(&event, file_name.as_deref()) => {}
                Ok(_) => continue,
                Err(e) => {
                    warn!(error = %e, "configuration watch error");
                    continue;
                }
            }

            tokio::time::sleep(SETTLE).await;
            while rx.try_recv().is_ok() {}

            match settings.reload() {
                Ok(config) => limiter.update_config(config.server.rate_limits.clone()),
                Err(e) => error!(error = %format!("{e:#}"), "configuration reload failed, keeping previous rules"),
            }
        }
    }))
}

fn watch_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn touches(event: &Event, file_name: Option<&OsStr>) -> bool {
    if !(event.kind.is_modify() || event.kind.is_create()) {
        return false;
    }
    match file_name {
        Some(name) => event.paths.iter().any(|p| p.file_name() == Some(name)),
        None => true,
    }
}
