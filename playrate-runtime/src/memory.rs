//! In-memory stand-in for the browser: storage, tabs, messaging endpoints,
//! CSS injection, and page/video/control-bar objects.
//!
//! Scenario controls mirror the three navigation shapes the extension sees:
//! opening a tab and same-tab navigation fire a tab event; a refresh rebuilds
//! the page without firing anything, which is exactly why the content agent
//! carries its own self-initiation poll.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::page::{ControlBar, Page, Video};
use crate::platform::{Envelope, Runtime, SendError, TabEvent, TabId, TabInfo};

pub struct MemoryBrowser {
    state: Mutex<BrowserState>,
    events_tx: mpsc::UnboundedSender<TabEvent>,
    response_timeout: Duration,
}

struct BrowserState {
    storage: HashMap<String, Value>,
    tabs: HashMap<TabId, TabState>,
    background: Option<mpsc::UnboundedSender<Envelope>>,
    next_tab: u32,
}

struct TabState {
    url: String,
    content: Option<mpsc::UnboundedSender<Envelope>>,
    injected_css: Vec<String>,
}

impl MemoryBrowser {
    /// Returns the browser and the tab-event stream the coordinator listens
    /// on. `response_timeout` bounds every request/response send.
    pub fn new(response_timeout: Duration) -> (Arc<Self>, mpsc::UnboundedReceiver<TabEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let browser = Arc::new(MemoryBrowser {
            state: Mutex::new(BrowserState {
                storage: HashMap::new(),
                tabs: HashMap::new(),
                background: None,
                next_tab: 1,
            }),
            events_tx,
            response_timeout,
        });
        (browser, events_rx)
    }

    /// Attach the background context's message endpoint.
    pub fn register_background(&self) -> mpsc::UnboundedReceiver<Envelope> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.state.lock().unwrap().background = Some(tx);
        rx
    }

    /// Attach a content context's message endpoint. Replaces any previous
    /// endpoint for the tab (the old script is gone after a reload).
    pub fn register_content(&self, tab: TabId) -> mpsc::UnboundedReceiver<Envelope> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state.lock().unwrap();
        let entry = state.tabs.entry(tab).or_insert_with(|| TabState {
            url: String::new(),
            content: None,
            injected_css: Vec::new(),
        });
        entry.content = Some(tx);
        rx
    }

    /// Open a tab at `url`. Fires a tab-update event.
    pub fn open_tab(&self, url: &str) -> TabId {
        let tab = {
            let mut state = self.state.lock().unwrap();
            let tab = TabId(state.next_tab);
            state.next_tab += 1;
            state.tabs.insert(
                tab,
                TabState {
                    url: url.to_string(),
                    content: None,
                    injected_css: Vec::new(),
                },
            );
            tab
        };
        let _ = self.events_tx.send(TabEvent {
            tab,
            url: url.to_string(),
        });
        tab
    }

    /// Same-tab navigation. Fires a tab-update event; the content context
    /// survives (single-page navigation).
    pub fn navigate(&self, tab: TabId, url: &str) {
        {
            let mut state = self.state.lock().unwrap();
            if let Some(entry) = state.tabs.get_mut(&tab) {
                entry.url = url.to_string();
            }
        }
        let _ = self.events_tx.send(TabEvent {
            tab,
            url: url.to_string(),
        });
    }

    /// Page refresh: the content context dies, no tab event fires.
    pub fn refresh(&self, tab: TabId) {
        let mut state = self.state.lock().unwrap();
        if let Some(entry) = state.tabs.get_mut(&tab) {
            entry.content = None;
            entry.injected_css.clear();
        }
    }

    pub fn injected_css(&self, tab: TabId) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .tabs
            .get(&tab)
            .map(|entry| entry.injected_css.clone())
            .unwrap_or_default()
    }

    async fn request(
        &self,
        sender: Option<mpsc::UnboundedSender<Envelope>>,
        message: Value,
    ) -> Result<Option<Value>, SendError> {
        let sender = sender.ok_or(SendError::NoResponder)?;
        let (reply_tx, reply_rx) = oneshot::channel();
        sender
            .send(Envelope {
                message,
                reply: reply_tx,
            })
            .map_err(|_| SendError::NoResponder)?;
        match tokio::time::timeout(self.response_timeout, reply_rx).await {
            Ok(Ok(response)) => Ok(response),
            // Handler dropped the reply without answering.
            Ok(Err(_)) => Ok(None),
            Err(_) => Err(SendError::Timeout),
        }
    }
}

#[async_trait]
impl Runtime for MemoryBrowser {
    async fn storage_get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.state.lock().unwrap().storage.get(key).cloned())
    }

    async fn storage_set(&self, key: &str, value: Value) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .storage
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn query_tabs(&self) -> Vec<TabInfo> {
        let state = self.state.lock().unwrap();
        let mut tabs: Vec<TabInfo> = state
            .tabs
            .iter()
            .map(|(id, entry)| TabInfo {
                id: *id,
                url: entry.url.clone(),
            })
            .collect();
        tabs.sort_by_key(|info| info.id);
        tabs
    }

    async fn send_to_tab(&self, tab: TabId, message: Value) -> Result<Option<Value>, SendError> {
        let sender = {
            let state = self.state.lock().unwrap();
            state.tabs.get(&tab).and_then(|entry| entry.content.clone())
        };
        self.request(sender, message).await
    }

    async fn send_to_background(&self, message: Value) -> Result<Option<Value>, SendError> {
        let sender = self.state.lock().unwrap().background.clone();
        self.request(sender, message).await
    }

    async fn insert_css(&self, tab: TabId, file: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        match state.tabs.get_mut(&tab) {
            Some(entry) => {
                entry.injected_css.push(file.to_string());
                Ok(())
            }
            None => anyhow::bail!("unknown {tab}"),
        }
    }
}

/// Video element stand-in. Fresh elements start at the platform default
/// rate of 1.
pub struct MemoryVideo {
    rate: Mutex<f64>,
}

impl MemoryVideo {
    pub fn new() -> Arc<Self> {
        Arc::new(MemoryVideo {
            rate: Mutex::new(1.0),
        })
    }
}

impl Video for MemoryVideo {
    fn playback_rate(&self) -> f64 {
        *self.rate.lock().unwrap()
    }

    fn set_playback_rate(&self, rate: f64) {
        *self.rate.lock().unwrap() = rate;
    }
}

/// Control container stand-in: the install marker plus the readout label.
/// Counts raw install calls so tests can prove nothing installs twice.
pub struct MemoryControlBar {
    installs: AtomicU32,
    readout: Mutex<String>,
}

impl MemoryControlBar {
    pub fn new() -> Arc<Self> {
        Arc::new(MemoryControlBar {
            installs: AtomicU32::new(0),
            readout: Mutex::new(String::new()),
        })
    }

    pub fn installed(&self) -> bool {
        self.installs.load(Ordering::SeqCst) > 0
    }

    pub fn install_count(&self) -> u32 {
        self.installs.load(Ordering::SeqCst)
    }
}

impl ControlBar for MemoryControlBar {
    fn install_controls(&self) {
        self.installs.fetch_add(1, Ordering::SeqCst);
    }

    fn set_readout(&self, label: &str) {
        *self.readout.lock().unwrap() = label.to_string();
    }

    fn readout(&self) -> String {
        self.readout.lock().unwrap().clone()
    }
}

/// One page context. Same-tab navigation swaps the video element while the
/// page (and its installed controls) survives.
pub struct MemoryPage {
    inner: Mutex<PageInner>,
}

struct PageInner {
    url: String,
    video: Option<Arc<MemoryVideo>>,
    bar: Option<Arc<MemoryControlBar>>,
}

impl MemoryPage {
    /// A fully loaded watch page: video and control bar present.
    pub fn watch(url: &str) -> Arc<Self> {
        Arc::new(MemoryPage {
            inner: Mutex::new(PageInner {
                url: url.to_string(),
                video: Some(MemoryVideo::new()),
                bar: Some(MemoryControlBar::new()),
            }),
        })
    }

    /// A page still loading (or a non-watch page): nothing present yet.
    pub fn bare(url: &str) -> Arc<Self> {
        Arc::new(MemoryPage {
            inner: Mutex::new(PageInner {
                url: url.to_string(),
                video: None,
                bar: None,
            }),
        })
    }

    /// The video element showed up before the control bar did.
    pub fn attach_video(&self) {
        self.inner.lock().unwrap().video = Some(MemoryVideo::new());
    }

    /// The player finished loading.
    pub fn attach_player(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.video = Some(MemoryVideo::new());
        inner.bar = Some(MemoryControlBar::new());
    }

    /// Same-tab navigation: a fresh video element at rate 1, controls and
    /// marker untouched.
    pub fn replace_video(&self, url: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.url = url.to_string();
        inner.video = Some(MemoryVideo::new());
    }

    /// Concrete video handle for assertions.
    pub fn video(&self) -> Option<Arc<MemoryVideo>> {
        self.inner.lock().unwrap().video.clone()
    }

    pub fn bar(&self) -> Option<Arc<MemoryControlBar>> {
        self.inner.lock().unwrap().bar.clone()
    }
}

impl Page for MemoryPage {
    fn url(&self) -> String {
        self.inner.lock().unwrap().url.clone()
    }

    fn main_video(&self) -> Option<Arc<dyn Video>> {
        self.inner
            .lock()
            .unwrap()
            .video
            .clone()
            .map(|video| video as Arc<dyn Video>)
    }

    fn control_bar(&self) -> Option<Arc<dyn ControlBar>> {
        self.inner
            .lock()
            .unwrap()
            .bar
            .clone()
            .map(|bar| bar as Arc<dyn ControlBar>)
    }

    fn controls_present(&self) -> bool {
        self.inner
            .lock()
            .unwrap()
            .bar
            .as_ref()
            .map(|bar| bar.installed())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn storage_roundtrip() {
        let (browser, _events) = MemoryBrowser::new(Duration::from_millis(50));
        assert!(browser.storage_get("missing").await.unwrap().is_none());

        browser
            .storage_set("key", json!({ "a": 1 }))
            .await
            .unwrap();
        assert_eq!(
            browser.storage_get("key").await.unwrap(),
            Some(json!({ "a": 1 }))
        );
    }

    #[tokio::test]
    async fn send_without_responder_fails_typed() {
        let (browser, _events) = MemoryBrowser::new(Duration::from_millis(50));
        let tab = browser.open_tab("https://example.test/");
        let result = browser.send_to_tab(tab, json!({ "id": "ping" })).await;
        assert!(matches!(result, Err(SendError::NoResponder)));

        let result = browser.send_to_background(json!({ "id": "ping" })).await;
        assert!(matches!(result, Err(SendError::NoResponder)));
    }

    #[tokio::test]
    async fn send_times_out_when_handler_stalls() {
        let (browser, _events) = MemoryBrowser::new(Duration::from_millis(20));
        let tab = browser.open_tab("https://example.test/");
        let mut rx = browser.register_content(tab);
        // Hold the envelope without replying.
        let hold = tokio::spawn(async move {
            let envelope = rx.recv().await.unwrap();
            tokio::time::sleep(Duration::from_millis(200)).await;
            envelope.respond(None);
        });

        let result = browser.send_to_tab(tab, json!({ "id": "ping" })).await;
        assert!(matches!(result, Err(SendError::Timeout)));
        hold.abort();
    }

    #[tokio::test]
    async fn navigation_fires_events_refresh_does_not() {
        let (browser, mut events) = MemoryBrowser::new(Duration::from_millis(50));
        let tab = browser.open_tab("https://example.test/watch?v=1");
        let event = events.recv().await.unwrap();
        assert_eq!(event.tab, tab);

        browser.navigate(tab, "https://example.test/watch?v=2");
        let event = events.recv().await.unwrap();
        assert_eq!(event.url, "https://example.test/watch?v=2");

        browser.refresh(tab);
        assert!(events.try_recv().is_err());
    }
}
