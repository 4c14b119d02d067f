//! Centralized configuration management

use crate::system::storage::KeyValueStore;
use crate::types::{EngineConfig, CONFIG_KEY, CONFIG_VERSION};
use anyhow::Context;
use embassy_sync::{blocking_mutex::raw::NoopRawMutex, mutex::Mutex};
use log::{info, warn};

pub struct ConfigManager {
    config: Mutex<NoopRawMutex, EngineConfig>,
}

impl ConfigManager {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            config: Mutex::new(config),
        }
    }

    /// Loads persisted configuration, falling back to defaults for missing,
    /// unreadable or outdated entries.
    pub async fn load<S: KeyValueStore>(store: &S) -> anyhow::Result<Self> {
        let raw = store
            .get(CONFIG_KEY)
            .await
            .context("reading engine configuration")?;

        let config = match raw {
            None => {
                info!("No stored configuration, using defaults");
                EngineConfig::default()
            }
            Some(text) => match serde_json::from_str::<EngineConfig>(&text) {
                Ok(config) if config.version == CONFIG_VERSION => {
                    info!("📂 Loaded engine configuration");
                    config
                }
                Ok(config) => {
                    warn!(
                        "Configuration version {} != {}, using defaults",
                        config.version, CONFIG_VERSION
                    );
                    EngineConfig::default()
                }
                Err(e) => {
                    warn!("Failed to parse stored configuration: {} - using defaults", e);
                    EngineConfig::default()
                }
            },
        };

        Ok(Self::with_config(config))
    }

    pub async fn save<S: KeyValueStore>(&self, store: &S) -> anyhow::Result<()> {
        let config = self.get_config().await;
        let text = serde_json::to_string(&config).context("serializing engine configuration")?;
        store
            .set(CONFIG_KEY, &text)
            .await
            .context("writing engine configuration")
    }

    pub async fn get_config(&self) -> EngineConfig {
        self.config.lock().await.clone()
    }

    pub async fn update_config<F>(&self, update_fn: F)
    where
        F: FnOnce(&mut EngineConfig),
    {
        let mut config = self.config.lock().await;
        update_fn(&mut config);
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::storage::MemoryStore;
    use embassy_futures::block_on;

    #[test]
    fn test_defaults_when_nothing_stored() {
        let store = MemoryStore::new();
        let manager = block_on(ConfigManager::load(&store)).unwrap();
        assert_eq!(block_on(manager.get_config()), EngineConfig::default());
    }

    #[test]
    fn test_save_and_reload() {
        let store = MemoryStore::new();
        block_on(async {
            let manager = ConfigManager::new();
            manager.update_config(|c| c.pour_time_divisor = 4).await;
            manager.save(&store).await.unwrap();

            let reloaded = ConfigManager::load(&store).await.unwrap();
            assert_eq!(reloaded.get_config().await.pour_time_divisor, 4);
        });
    }

    #[test]
    fn test_garbage_falls_back_to_defaults() {
        let store = MemoryStore::new();
        block_on(async {
            store.set(CONFIG_KEY, "{not json").await.unwrap();
            let manager = ConfigManager::load(&store).await.unwrap();
            assert_eq!(manager.get_config().await, EngineConfig::default());
        });
    }
}
