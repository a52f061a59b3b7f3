//! Persisted favorites and recents.
//!
//! Both are JSON blobs behind the storage port. Recents are capped at five
//! entries, deduplicated by canonical audiopath, most recent first.

use std::sync::Arc;

use serde_json::{Value, json};
use tracing::warn;

use mramodel::{NotifierEvent, NotifierPort, QueueItem, StoragePort, ZoneId, normalize_audiopath};

use crate::error::ControlError;

const RECENTS_CAP: usize = 5;

/// Favorites/recents facade bound to the storage and notifier ports.
pub struct ZoneStorage {
    storage: Arc<dyn StoragePort>,
    notifier: Arc<dyn NotifierPort>,
}

impl ZoneStorage {
    pub fn new(storage: Arc<dyn StoragePort>, notifier: Arc<dyn NotifierPort>) -> Self {
        Self { storage, notifier }
    }

    fn recents_key(zone_id: ZoneId) -> String {
        format!("recents:{}", zone_id.0)
    }

    fn favorites_key(zone_id: ZoneId) -> String {
        format!("favorites:{}", zone_id.0)
    }

    async fn load_list(&self, key: &str) -> Vec<Value> {
        match self.storage.load_blob(key).await {
            Ok(Some(Value::Array(entries))) => entries,
            Ok(_) => Vec::new(),
            Err(e) => {
                warn!(key, error = %e, "storage load failed");
                Vec::new()
            }
        }
    }

    /// Records a played item into the zone's recents.
    pub async fn record_recent(&self, zone_id: ZoneId, item: &QueueItem) -> Result<(), ControlError> {
        let canonical = normalize_audiopath(&item.audiopath);
        let key = Self::recents_key(zone_id);

        let mut entries = self.load_list(&key).await;
        entries.retain(|entry| {
            entry
                .get("audiopath")
                .and_then(Value::as_str)
                .map(|path| normalize_audiopath(path) != canonical)
                .unwrap_or(true)
        });

        entries.insert(
            0,
            json!({
                "audiopath": item.audiopath,
                "title": item.title,
                "artist": item.artist,
                "cover": item.cover,
                "station": item.station,
            }),
        );
        entries.truncate(RECENTS_CAP);

        self.storage
            .save_blob(&key, &Value::Array(entries))
            .await
            .map_err(|e| ControlError::Storage(e.to_string()))?;
        self.notifier.notify(NotifierEvent::RecentsChanged { zone_id });
        Ok(())
    }

    pub async fn recents(&self, zone_id: ZoneId) -> Vec<Value> {
        self.load_list(&Self::recents_key(zone_id)).await
    }

    /// Adds a favorite, deduplicating by canonical audiopath.
    pub async fn add_favorite(
        &self,
        zone_id: ZoneId,
        audiopath: &str,
        title: Option<&str>,
    ) -> Result<(), ControlError> {
        let canonical = normalize_audiopath(audiopath);
        let key = Self::favorites_key(zone_id);

        let mut entries = self.load_list(&key).await;
        let already_known = entries.iter().any(|entry| {
            entry
                .get("audiopath")
                .and_then(Value::as_str)
                .map(|path| normalize_audiopath(path) == canonical)
                .unwrap_or(false)
        });
        if !already_known {
            entries.push(json!({ "audiopath": audiopath, "title": title }));
            self.storage
                .save_blob(&key, &Value::Array(entries))
                .await
                .map_err(|e| ControlError::Storage(e.to_string()))?;
            self.notifier.notify(NotifierEvent::FavoritesChanged { zone_id });
        }
        Ok(())
    }

    pub async fn remove_favorite(
        &self,
        zone_id: ZoneId,
        audiopath: &str,
    ) -> Result<(), ControlError> {
        let canonical = normalize_audiopath(audiopath);
        let key = Self::favorites_key(zone_id);

        let mut entries = self.load_list(&key).await;
        let before = entries.len();
        entries.retain(|entry| {
            entry
                .get("audiopath")
                .and_then(Value::as_str)
                .map(|path| normalize_audiopath(path) != canonical)
                .unwrap_or(true)
        });
        if entries.len() != before {
            self.storage
                .save_blob(&key, &Value::Array(entries))
                .await
                .map_err(|e| ControlError::Storage(e.to_string()))?;
            self.notifier.notify(NotifierEvent::FavoritesChanged { zone_id });
        }
        Ok(())
    }

    pub async fn favorites(&self, zone_id: ZoneId) -> Vec<Value> {
        self.load_list(&Self::favorites_key(zone_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use mramodel::PortError;

    #[derive(Default)]
    struct MemoryStorage {
        blobs: Mutex<HashMap<String, Value>>,
    }

    #[async_trait]
    impl StoragePort for MemoryStorage {
        async fn load_blob(&self, key: &str) -> Result<Option<Value>, PortError> {
            Ok(self.blobs.lock().unwrap().get(key).cloned())
        }

        async fn save_blob(&self, key: &str, value: &Value) -> Result<(), PortError> {
            self.blobs
                .lock()
                .unwrap()
                .insert(key.to_string(), value.clone());
            Ok(())
        }
    }

    #[derive(Default)]
    struct SilentNotifier;

    impl NotifierPort for SilentNotifier {
        fn notify(&self, _event: NotifierEvent) {}
    }

    fn storage() -> ZoneStorage {
        ZoneStorage::new(Arc::new(MemoryStorage::default()), Arc::new(SilentNotifier))
    }

    fn item(path: &str) -> QueueItem {
        QueueItem::from_audiopath(path)
    }

    #[tokio::test]
    async fn test_recents_capped_and_deduped() {
        let storage = storage();
        for i in 0..8 {
            storage
                .record_recent(ZoneId(1), &item(&format!("library:track:{i}")))
                .await
                .unwrap();
        }
        let recents = storage.recents(ZoneId(1)).await;
        assert_eq!(recents.len(), RECENTS_CAP);
        assert_eq!(recents[0]["audiopath"], "library:track:7");

        // Re-playing an older track moves it to the front without growing
        // the list.
        storage
            .record_recent(ZoneId(1), &item("library:track:5"))
            .await
            .unwrap();
        let recents = storage.recents(ZoneId(1)).await;
        assert_eq!(recents.len(), RECENTS_CAP);
        assert_eq!(recents[0]["audiopath"], "library:track:5");
    }

    #[tokio::test]
    async fn test_recents_dedupe_by_canonical_path() {
        let storage = storage();
        storage
            .record_recent(ZoneId(1), &item("library:track:one"))
            .await
            .unwrap();
        storage
            .record_recent(ZoneId(1), &item("library%3Atrack%3Aone"))
            .await
            .unwrap();
        assert_eq!(storage.recents(ZoneId(1)).await.len(), 1);
    }

    #[tokio::test]
    async fn test_favorites_add_remove() {
        let storage = storage();
        storage
            .add_favorite(ZoneId(1), "radio:station:rp", Some("Radio Paradise"))
            .await
            .unwrap();
        storage
            .add_favorite(ZoneId(1), "radio:station:rp", Some("Radio Paradise"))
            .await
            .unwrap();
        assert_eq!(storage.favorites(ZoneId(1)).await.len(), 1);

        storage
            .remove_favorite(ZoneId(1), "radio:station:rp")
            .await
            .unwrap();
        assert!(storage.favorites(ZoneId(1)).await.is_empty());
    }
}
