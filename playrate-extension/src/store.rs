//! The persistent settings record, owned by the background coordinator.
//!
//! One JSON object under a fixed key. A missing or malformed record
//! self-heals to defaults; every save re-enforces the current-rate
//! invariant and fans the new settings out to all open watch tabs.

use std::sync::Arc;

use anyhow::{Context, Result};
use playrate_protocol::{Message, Settings, STORAGE_KEY};
use playrate_runtime::Runtime;

#[derive(Clone)]
pub struct SettingsStore {
    runtime: Arc<dyn Runtime>,
    watch_fragment: Arc<str>,
}

impl SettingsStore {
    pub fn new(runtime: Arc<dyn Runtime>, watch_fragment: &str) -> Self {
        SettingsStore {
            runtime,
            watch_fragment: watch_fragment.into(),
        }
    }

    /// Read the record, healing a missing or corrupt one to defaults.
    /// Always returns a complete, invariant-satisfying record.
    pub async fn load(&self) -> Result<Settings> {
        match self.runtime.storage_get(STORAGE_KEY).await? {
            Some(value) => match serde_json::from_value::<Settings>(value) {
                Ok(settings) => return Ok(settings.normalize()),
                Err(err) => {
                    tracing::warn!("stored settings invalid, restoring defaults: {err}");
                }
            },
            None => {}
        }

        let defaults = Settings::default();
        self.persist(&defaults).await?;
        Ok(defaults)
    }

    /// Normalize, persist, then broadcast the new settings to every open
    /// watch tab. The broadcast is fire-and-forget; a tab that misses it is
    /// not a save failure.
    pub async fn save(&self, settings: Settings) -> Result<()> {
        let settings = settings.normalize();
        self.persist(&settings).await?;
        self.broadcast(settings).await;
        Ok(())
    }

    async fn persist(&self, settings: &Settings) -> Result<()> {
        let record = serde_json::to_value(settings).context("settings record serialization")?;
        self.runtime
            .storage_set(STORAGE_KEY, record)
            .await
            .context("settings record write")
    }

    async fn broadcast(&self, settings: Settings) {
        let message = Message::SetLocalSettings { settings }.to_value();
        for tab in self.runtime.query_tabs().await {
            if !tab.url.contains(self.watch_fragment.as_ref()) {
                continue;
            }
            let runtime = self.runtime.clone();
            let message = message.clone();
            let id = tab.id;
            tokio::spawn(async move {
                if let Err(err) = runtime.send_to_tab(id, message).await {
                    tracing::debug!("{id}: settings broadcast not delivered: {err}");
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use playrate_runtime::MemoryBrowser;
    use serde_json::json;
    use std::time::Duration;

    fn store() -> (Arc<MemoryBrowser>, SettingsStore) {
        let (browser, _events) = MemoryBrowser::new(Duration::from_millis(50));
        let store = SettingsStore::new(browser.clone(), "youtube.com/watch");
        (browser, store)
    }

    #[tokio::test]
    async fn load_on_empty_store_persists_defaults() {
        let (browser, store) = store();

        let first = store.load().await.unwrap();
        assert_eq!(first, Settings::default());

        // The defaults were written, and a second load is idempotent.
        let record = browser.storage_get(STORAGE_KEY).await.unwrap().unwrap();
        assert_eq!(record, serde_json::to_value(Settings::default()).unwrap());
        assert_eq!(store.load().await.unwrap(), first);
    }

    #[tokio::test]
    async fn corrupt_record_heals_to_defaults() {
        let (browser, store) = store();
        browser
            .storage_set(STORAGE_KEY, json!({ "decreaseRate": 0.25, "junk": true }))
            .await
            .unwrap();

        assert_eq!(store.load().await.unwrap(), Settings::default());
        let record = browser.storage_get(STORAGE_KEY).await.unwrap().unwrap();
        assert_eq!(record, serde_json::to_value(Settings::default()).unwrap());
    }

    #[tokio::test]
    async fn save_then_load_reapplies_invariant() {
        let (_browser, store) = store();

        let stale = Settings {
            decrease_rate: 0.5,
            increase_rate: 0.75,
            persistent_playback_rate: false,
            current_rate: Some(3.0),
        };
        store.save(stale.clone()).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.decrease_rate, 0.5);
        assert_eq!(loaded.increase_rate, 0.75);
        assert_eq!(loaded.current_rate, None);

        let kept = Settings {
            persistent_playback_rate: true,
            current_rate: Some(2.5),
            ..Settings::default()
        };
        store.save(kept.clone()).await.unwrap();
        assert_eq!(store.load().await.unwrap(), kept);
    }

    #[tokio::test]
    async fn save_broadcasts_to_watch_tabs_only() {
        let (browser, store) = store();
        let watch_tab = browser.open_tab("https://www.youtube.com/watch?v=abc");
        let other_tab = browser.open_tab("https://www.youtube.com/feed/history");
        let mut watch_rx = browser.register_content(watch_tab);
        let mut other_rx = browser.register_content(other_tab);

        store.save(Settings::default()).await.unwrap();

        let envelope = tokio::time::timeout(Duration::from_millis(200), watch_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            Message::parse(&envelope.message),
            Some(Message::SetLocalSettings {
                settings: Settings::default()
            })
        );
        envelope.respond(None);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(other_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn undelivered_broadcast_is_not_a_save_failure() {
        let (browser, store) = store();
        // Watch tab with no content endpoint registered.
        browser.open_tab("https://www.youtube.com/watch?v=abc");
        store.save(Settings::default()).await.unwrap();
    }
}
