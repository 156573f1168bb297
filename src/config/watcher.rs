//! Configuration file watcher for hot reload.
//!
//! Watches the file's parent directory rather than the file itself, so
//! editors that save by writing a new file and renaming it over the old one
//! are still seen.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::EngineConfig;

/// Forwards every new, valid version of the config file.
pub struct ConfigWatcher {
    path: PathBuf,
    current: EngineConfig,
    update_tx: mpsc::UnboundedSender<EngineConfig>,
}

impl ConfigWatcher {
    /// `current` is the config already in use; reloads equal to it are dropped.
    pub fn new(path: &Path, current: EngineConfig) -> (Self, mpsc::UnboundedReceiver<EngineConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        let watcher = Self {
            path: path.to_path_buf(),
            current,
            update_tx,
        };
        (watcher, update_rx)
    }

    /// Start watching in notify's background thread. The returned handle
    /// stops the watch when dropped.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let Self {
            path,
            current,
            update_tx,
        } = self;
        let file_name = path.file_name().map(OsString::from);
        let dir = watch_dir(&path);
        let mut last = current;

        let config_path = path.clone();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if !is_config_event(&event, file_name.as_deref()) {
                        return;
                    }
                    match load_config(&config_path) {
                        Ok(config) if config == last => {
                            tracing::debug!(path = ?config_path, "Config file touched without changes");
                        }
                        Ok(config) => {
                            tracing::info!(path = ?config_path, "Config file changed, reloading");
                            last = config.clone();
                            let _ = update_tx.send(config);
                        }
                        Err(e) => {
                            tracing::error!(
                                path = ?config_path,
                                error = %e,
                                "Failed to reload config. Keeping current configuration."
                            );
                        }
                    }
                }
                Err(e) => tracing::error!(error = ?e, "Config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        tracing::info!(path = ?path, "Config watcher started");
        Ok(watcher)
    }
}

fn watch_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// A create or modify event that touches the config file.
fn is_config_event(event: &Event, file_name: Option<&std::ffi::OsStr>) -> bool {
    if !(event.kind.is_modify() || event.kind.is_create()) {
        return false;
    }
    event
        .paths
        .iter()
        .any(|p| p.file_name().is_some() && p.file_name() == file_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, EventKind, ModifyKind};

    #[test]
    fn test_watch_dir() {
        assert_eq!(watch_dir(Path::new("/etc/reconciler/config.toml")), PathBuf::from("/etc/reconciler"));
        assert_eq!(watch_dir(Path::new("config.toml")), PathBuf::from("."));
    }

    #[test]
    fn test_only_config_file_events_count() {
        let name = OsString::from("config.toml");
        let event = |kind, path: &str| Event::new(kind).add_path(PathBuf::from(path));

        assert!(is_config_event(
            &event(EventKind::Modify(ModifyKind::Any), "/etc/r/config.toml"),
            Some(name.as_os_str())
        ));
        assert!(is_config_event(
            &event(EventKind::Create(CreateKind::File), "/etc/r/config.toml"),
            Some(name.as_os_str())
        ));
        assert!(!is_config_event(
            &event(EventKind::Modify(ModifyKind::Any), "/etc/r/other.toml"),
            Some(name.as_os_str())
        ));
        assert!(!is_config_event(
            &event(EventKind::Remove(notify::event::RemoveKind::File), "/etc/r/config.toml"),
            Some(name.as_os_str())
        ));
    }
}
