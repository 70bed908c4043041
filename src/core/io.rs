use async_trait::async_trait;
use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::sync::Mutex;

#[cfg(target_arch = "wasm32")]
pub trait StorageBounds {}
#[cfg(target_arch = "wasm32")]
impl<T> StorageBounds for T {}

#[cfg(not(target_arch = "wasm32"))]
pub trait StorageBounds: Send + Sync {}
#[cfg(not(target_arch = "wasm32"))]
impl<T: Send + Sync> StorageBounds for T {}

/// Durable key-value storage. `read` fails when the key is absent,
/// `delete` of an absent key is a no-op.
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait Storage: StorageBounds {
    async fn read(&self, key: &str) -> Result<Vec<u8>>;
    async fn write(&self, key: &str, content: &[u8]) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
    async fn exists(&self, key: &str) -> Result<bool>;
}

// --- Memory Implementation ---

#[derive(Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>>> {
        self.entries
            .lock()
            .map_err(|_| anyhow!("MemoryStorage lock poisoned"))
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl Storage for MemoryStorage {
    async fn read(&self, key: &str) -> Result<Vec<u8>> {
        self.entries()?
            .get(key)
            .cloned()
            .ok_or_else(|| anyhow!("Key not found: {}", key))
    }

    async fn write(&self, key: &str, content: &[u8]) -> Result<()> {
        self.entries()?.insert(key.to_string(), content.to_vec());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries()?.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.entries()?.contains_key(key))
    }
}

// --- Native Implementation ---

/// One file per key, `<root>/<key>.json`.
#[cfg(not(target_arch = "wasm32"))]
pub struct NativeStorage {
    root: std::path::PathBuf,
}

#[cfg(not(target_arch = "wasm32"))]
impl NativeStorage {
    pub fn new(root: impl Into<std::path::PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> std::path::PathBuf {
        self.root.join(format!("{}.json", key))
    }
}

#[cfg(not(target_arch = "wasm32"))]
#[async_trait]
impl Storage for NativeStorage {
    async fn read(&self, key: &str) -> Result<Vec<u8>> {
        Ok(tokio::fs::read(self.path_for(key)).await?)
    }

    async fn write(&self, key: &str, content: &[u8]) -> Result<()> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        if tokio::fs::try_exists(&path).await? {
            tokio::fs::remove_file(path).await?;
        }
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.path_for(key)).await?)
    }
}

// --- Web Implementation ---

#[cfg(target_arch = "wasm32")]
use idb::{Factory, ObjectStoreParams, TransactionMode};
#[cfg(target_arch = "wasm32")]
use wasm_bindgen::JsValue;

#[cfg(target_arch = "wasm32")]
const DB_NAME: &str = "learnershood_db";
#[cfg(target_arch = "wasm32")]
const STORE_NAME: &str = "kv";

#[cfg(target_arch = "wasm32")]
pub struct WebStorage {
    db: idb::Database,
}

#[cfg(target_arch = "wasm32")]
impl WebStorage {
    pub async fn new() -> Result<Self> {
        let factory = Factory::new().map_err(|e| anyhow!("Failed to create factory: {:?}", e))?;
        let mut open_request = factory.open(DB_NAME, Some(1)).map_err(|e| anyhow!("Failed to open DB: {:?}", e))?;

        open_request.on_upgrade_needed(|event| {
            if let Ok(db) = event.database() {
                if !db.store_names().iter().any(|n| n.as_str() == STORE_NAME) {
                    if let Err(e) = db.create_object_store(STORE_NAME, ObjectStoreParams::new()) {
                        log::error!("Failed to create object store: {:?}", e);
                    }
                }
            }
        });

        let db = open_request.await.map_err(|e| anyhow!("Failed to await DB open: {:?}", e))?;
        Ok(Self { db })
    }
}

#[cfg(target_arch = "wasm32")]
#[async_trait(?Send)]
impl Storage for WebStorage {
    async fn read(&self, key: &str) -> Result<Vec<u8>> {
        let transaction = self.db.transaction(&[STORE_NAME], TransactionMode::ReadOnly)
            .map_err(|e| anyhow!("Tx error: {:?}", e))?;
        let store = transaction.object_store(STORE_NAME).map_err(|e| anyhow!("Store error: {:?}", e))?;

        let value = store.get(JsValue::from_str(key))
            .map_err(|e| anyhow!("Get error: {:?}", e))?
            .await
            .map_err(|e| anyhow!("Get await error: {:?}", e))?;

        match value {
            Some(v) => Ok(js_sys::Uint8Array::new(&v).to_vec()),
            None => Err(anyhow!("Key not found: {}", key)),
        }
    }

    async fn write(&self, key: &str, content: &[u8]) -> Result<()> {
        let transaction = self.db.transaction(&[STORE_NAME], TransactionMode::ReadWrite)
            .map_err(|e| anyhow!("Tx error: {:?}", e))?;
        let store = transaction.object_store(STORE_NAME).map_err(|e| anyhow!("Store error: {:?}", e))?;

        let array = js_sys::Uint8Array::from(content);

        store.put(&array, Some(&JsValue::from_str(key)))
            .map_err(|e| anyhow!("Put error: {:?}", e))?
            .await
            .map_err(|e| anyhow!("Put await error: {:?}", e))?;

        transaction.commit()
            .map_err(|e| anyhow!("Commit error: {:?}", e))?
            .await
            .map_err(|e| anyhow!("Commit await error: {:?}", e))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let transaction = self.db.transaction(&[STORE_NAME], TransactionMode::ReadWrite)
            .map_err(|e| anyhow!("Tx error: {:?}", e))?;
        let store = transaction.object_store(STORE_NAME).map_err(|e| anyhow!("Store error: {:?}", e))?;

        store.delete(JsValue::from_str(key))
            .map_err(|e| anyhow!("Delete error: {:?}", e))?
            .await
            .map_err(|e| anyhow!("Delete await error: {:?}", e))?;

        transaction.commit()
            .map_err(|e| anyhow!("Commit error: {:?}", e))?
            .await
            .map_err(|e| anyhow!("Commit await error: {:?}", e))?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let transaction = self.db.transaction(&[STORE_NAME], TransactionMode::ReadOnly)
            .map_err(|e| anyhow!("Tx error: {:?}", e))?;
        let store = transaction.object_store(STORE_NAME).map_err(|e| anyhow!("Store error: {:?}", e))?;

        let found = store.get_key(JsValue::from_str(key))
            .map_err(|e| anyhow!("GetKey error: {:?}", e))?
            .await
            .map_err(|e| anyhow!("GetKey await error: {:?}", e))?;

        Ok(found.is_some())
    }
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_native_storage_round_trip_and_delete() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let storage = NativeStorage::new(temp_dir.path().join("nested"));

        assert!(!storage.exists("recent").await?);
        assert!(storage.read("recent").await.is_err());

        storage.write("recent", b"[]").await?;
        assert!(storage.exists("recent").await?);
        assert_eq!(storage.read("recent").await?, b"[]".to_vec());

        storage.delete("recent").await?;
        assert!(!storage.exists("recent").await?);

        // Deleting twice is fine
        storage.delete("recent").await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_memory_storage_overwrites() -> Result<()> {
        let storage = MemoryStorage::new();
        storage.write("k", b"one").await?;
        storage.write("k", b"two").await?;
        assert_eq!(storage.read("k").await?, b"two".to_vec());
        Ok(())
    }
}
