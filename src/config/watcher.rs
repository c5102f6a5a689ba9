//! Scene file watcher for hot-reload support

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::error::ConfigError;
use crate::scene::{self, CompiledConfig};

/// Quiet time after the last file event before reloading
const DEBOUNCE: Duration = Duration::from_millis(100);

/// Watches the scene file and delivers freshly compiled configurations.
///
/// Failed reloads are logged and never delivered, so the receiver always
/// holds the last good configuration.
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
    rx: mpsc::Receiver<CompiledConfig>,
}

impl ConfigWatcher {
    /// Start watching `config_path` and compile it once.
    ///
    /// The initial result is returned as-is: a broken file at start-up is not
    /// an error for the watcher, the router simply stays idle until the file
    /// is fixed.
    pub async fn new(
        config_path: String,
    ) -> Result<(Self, Result<CompiledConfig, ConfigError>)> {
        let (tx, rx) = mpsc::channel(10);

        let initial = scene::load(&config_path).await;

        // Watch the directory: editors often replace the file instead of
        // writing it in place, which would orphan a watch on the file itself
        let file = PathBuf::from(&config_path);
        let file_name = file.file_name().map(|n| n.to_os_string());
        let dir = match file.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        // notify callbacks run on their own OS thread, outside the runtime
        let runtime_handle = tokio::runtime::Handle::current();
        let generation = Arc::new(AtomicU64::new(0));

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            match res {
                Ok(event) => {
                    if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                        return;
                    }
                    let ours = event
                        .paths
                        .iter()
                        .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
                    if !ours {
                        return;
                    }
                    debug!("Scene file changed: {:?}", event.paths);

                    let config_path = config_path_for(&file);
                    let tx = tx.clone();
                    let generation = generation.clone();
                    let mine = generation.fetch_add(1, Ordering::SeqCst) + 1;

                    runtime_handle.spawn(async move {
                        tokio::time::sleep(DEBOUNCE).await;
                        if generation.load(Ordering::SeqCst) != mine {
                            return; // a later event will reload
                        }

                        match scene::load(&config_path).await {
                            Ok(config) => {
                                info!("🔄 Scene file reloaded ({} scenes)", config.scenes.len());
                                if let Err(e) = tx.send(config).await {
                                    error!("Failed to deliver reloaded configuration: {}", e);
                                }
                            }
                            Err(e) => {
                                warn!("⚠️  Failed to reload scene file (keeping previous scenes): {}", e);
                            }
                        }
                    });
                }
                Err(e) => {
                    error!("Watch error: {}", e);
                }
            }
        })?;

        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch directory of scene file: {}", config_path))?;

        info!("👀 Watching scene file: {}", config_path);

        Ok((
            Self {
                _watcher: watcher,
                rx,
            },
            initial,
        ))
    }

    /// Wait for the next successfully compiled configuration.
    /// Returns None if the watcher has been closed.
    pub async fn next_config(&mut self) -> Option<CompiledConfig> {
        self.rx.recv().await
    }
}

fn config_path_for(file: &Path) -> String {
    file.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const INITIAL: &str = r#"
endpoints:
  - prefix: qlc
    ip: 127.0.0.1
    port: 7700
map: {}
scenes:
  - key: intro
"#;

    #[tokio::test]
    async fn test_reload_on_write() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config_path = temp_dir.path().join("scenes.yaml");
        fs::write(&config_path, INITIAL)?;

        let (mut watcher, initial) =
            ConfigWatcher::new(config_path.to_string_lossy().to_string()).await?;
        let initial = initial?;
        assert_eq!(initial.scenes.keys().collect::<Vec<_>>(), vec!["intro"]);

        tokio::time::sleep(Duration::from_millis(100)).await;
        fs::write(
            &config_path,
            format!("{}  - key: outro\n", INITIAL),
        )?;

        let reloaded = tokio::time::timeout(Duration::from_secs(2), watcher.next_config())
            .await?
            .expect("watcher channel closed before delivering the reload");
        assert_eq!(reloaded.scenes.keys().collect::<Vec<_>>(), vec!["intro", "outro"]);

        Ok(())
    }

    #[tokio::test]
    async fn test_broken_initial_file_is_reported_not_fatal() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config_path = temp_dir.path().join("scenes.yaml");
        fs::write(&config_path, "map: {}\n")?;

        let (_watcher, initial) =
            ConfigWatcher::new(config_path.to_string_lossy().to_string()).await?;
        assert!(matches!(initial, Err(ConfigError::MissingSection("endpoints"))));
        Ok(())
    }

    #[tokio::test]
    async fn test_broken_reload_is_not_delivered() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config_path = temp_dir.path().join("scenes.yaml");
        fs::write(&config_path, INITIAL)?;

        let (mut watcher, _) =
            ConfigWatcher::new(config_path.to_string_lossy().to_string()).await?;

        tokio::time::sleep(Duration::from_millis(100)).await;
        fs::write(&config_path, "endpoints: [\n")?;

        let delivered =
            tokio::time::timeout(Duration::from_millis(500), watcher.next_config()).await;
        assert!(delivered.is_err(), "a broken file must not be delivered");
        Ok(())
    }
}
