//! Storage collaborators: key-value persistence and bean inventory.
//! The engine only ever talks to the traits; the in-memory types back the demo and tests.

use crate::types::CoffeeBean;
use embassy_sync::{blocking_mutex::raw::NoopRawMutex, mutex::Mutex};
use log::{debug, info};
use std::collections::HashMap;

/// Opaque string storage. Values are JSON text the engine serializes itself.
#[allow(async_fn_in_trait)]
pub trait KeyValueStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> anyhow::Result<()>;
}

#[allow(async_fn_in_trait)]
pub trait BeanInventory {
    async fn get_all_beans(&self) -> anyhow::Result<Vec<CoffeeBean>>;

    /// Subtracts `delta_g` from the bean's remaining mass, clamped at zero.
    /// Returns `None` when the bean does not exist.
    async fn update_remaining(&self, bean_id: &str, delta_g: f64) -> anyhow::Result<Option<CoffeeBean>>;
}

pub struct MemoryStore {
    entries: Mutex<NoopRawMutex, HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        debug!("💾 Storing {} ({} bytes)", key, value.len());
        self.entries
            .lock()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

pub struct MemoryBeanInventory {
    beans: Mutex<NoopRawMutex, Vec<CoffeeBean>>,
}

impl MemoryBeanInventory {
    pub fn new(beans: Vec<CoffeeBean>) -> Self {
        Self {
            beans: Mutex::new(beans),
        }
    }
}

impl BeanInventory for MemoryBeanInventory {
    async fn get_all_beans(&self) -> anyhow::Result<Vec<CoffeeBean>> {
        Ok(self.beans.lock().await.clone())
    }

    async fn update_remaining(&self, bean_id: &str, delta_g: f64) -> anyhow::Result<Option<CoffeeBean>> {
        let mut beans = self.beans.lock().await;
        let Some(bean) = beans.iter_mut().find(|bean| bean.id == bean_id) else {
            return Ok(None);
        };

        let before = bean.remaining;
        bean.remaining = (bean.remaining - delta_g).max(0.0);
        info!(
            "🫘 Bean '{}': {:.1}g -> {:.1}g",
            bean.name, before, bean.remaining
        );
        Ok(Some(bean.clone()))
    }
}
