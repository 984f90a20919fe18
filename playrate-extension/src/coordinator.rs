//! Background coordinator: extension-lifetime singleton that owns the
//! settings store, reacts to tab navigation, and brokers every message
//! between the popup and the per-tab content agents.

use std::collections::HashMap;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use playrate_protocol::{Message, Settings};
use playrate_runtime::{
    poll::spawn_bounded, Envelope, PollHandle, Runtime, TabEvent, TabId,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::ConfigFile;
use crate::store::SettingsStore;

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub watch_fragment: String,
    pub stylesheet: String,
    pub poll_interval: Duration,
    pub max_attempts: u32,
}

impl CoordinatorConfig {
    pub fn from_config(config: &ConfigFile) -> Self {
        CoordinatorConfig {
            watch_fragment: config.site.watch_fragment.clone(),
            stylesheet: config.site.stylesheet.clone(),
            poll_interval: config.poll.interval(),
            max_attempts: config.poll.max_attempts,
        }
    }
}

pub struct Coordinator {
    runtime: Arc<dyn Runtime>,
    store: SettingsStore,
    config: CoordinatorConfig,
    /// Injection poll per tab; replaced (and the old one aborted) when the
    /// same tab navigates again.
    polls: HashMap<TabId, PollHandle>,
}

impl Coordinator {
    /// Start the coordinator on its own task. It runs until both the tab
    /// event stream and the message endpoint close.
    pub fn spawn(
        runtime: Arc<dyn Runtime>,
        config: CoordinatorConfig,
        mut events: mpsc::UnboundedReceiver<TabEvent>,
        mut requests: mpsc::UnboundedReceiver<Envelope>,
    ) -> JoinHandle<()> {
        let store = SettingsStore::new(runtime.clone(), &config.watch_fragment);
        let mut coordinator = Coordinator {
            runtime,
            store,
            config,
            polls: HashMap::new(),
        };
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = events.recv() => match event {
                        Some(event) => coordinator.on_tab_updated(event).await,
                        None => break,
                    },
                    request = requests.recv() => match request {
                        Some(envelope) => coordinator.on_message(envelope).await,
                        None => break,
                    },
                }
            }
            tracing::debug!("coordinator endpoints closed, shutting down");
        })
    }

    async fn on_tab_updated(&mut self, event: TabEvent) {
        // Polls that ran to completion (or exhaustion) are dead weight.
        self.polls.retain(|_, handle| !handle.is_finished());

        // A navigation supersedes whatever injection was still running.
        if let Some(previous) = self.polls.remove(&event.tab) {
            previous.abort();
        }

        if !event.url.contains(&self.config.watch_fragment) {
            tracing::debug!("{}: not a watch page, nothing to inject", event.tab);
            return;
        }

        tracing::info!("{}: watch page navigation, starting injection", event.tab);
        if let Err(err) = self
            .runtime
            .insert_css(event.tab, &self.config.stylesheet)
            .await
        {
            tracing::warn!("{}: stylesheet injection failed: {err:#}", event.tab);
        }

        let handle = self.spawn_injection_poll(event.tab);
        self.polls.insert(event.tab, handle);
    }

    /// Bounded handshake with the tab's content agent. The agent and this
    /// loop race independently against page load; every outcome short of an
    /// initiate success is retryable.
    fn spawn_injection_poll(&self, tab: TabId) -> PollHandle {
        let runtime = self.runtime.clone();
        let store = self.store.clone();
        let max_attempts = self.config.max_attempts;
        spawn_bounded(self.config.poll_interval, max_attempts, move |attempt| {
            let runtime = runtime.clone();
            let store = store.clone();
            async move {
                let retry = |reason: String| {
                    if attempt == max_attempts {
                        tracing::warn!(
                            "{tab}: injection abandoned after {max_attempts} attempts ({reason})"
                        );
                    } else {
                        tracing::debug!("{tab}: injection attempt {attempt}: {reason}");
                    }
                    ControlFlow::Continue(())
                };

                let settings = match store.load().await {
                    Ok(settings) => settings,
                    Err(err) => return retry(format!("settings unavailable: {err:#}")),
                };

                let message = Message::InitiateContent { settings }.to_value();
                match runtime.send_to_tab(tab, message).await {
                    Ok(Some(response)) => match Message::parse(&response) {
                        Some(Message::InitiateSuccess { status }) => {
                            tracing::info!(
                                "{tab}: controls ready ({status:?}, attempt {attempt})"
                            );
                            ControlFlow::Break(())
                        }
                        Some(Message::InitiateFailed { status }) => {
                            retry(format!("{status:?}"))
                        }
                        _ => retry("unexpected response".to_string()),
                    },
                    Ok(None) => retry("no answer".to_string()),
                    Err(err) => retry(err.to_string()),
                }
            }
        })
    }

    async fn on_message(&mut self, envelope: Envelope) {
        let Some(message) = Message::parse(&envelope.message) else {
            // Unrecognized kinds are a forward-compatible no-op.
            envelope.respond(None);
            return;
        };

        match message {
            Message::CurrentPlayrate { current_playrate } => {
                envelope.respond(None);
                self.record_current_rate(current_playrate).await;
            }
            Message::SetGlobalSettings { settings: patch } => {
                let response = match self.store.load().await {
                    Ok(existing) => match self.store.save(existing.apply_patch(patch)).await {
                        Ok(()) => Some(Message::SetGlobalSettingsSuccessful.to_value()),
                        Err(err) => {
                            tracing::warn!("saving global settings failed: {err:#}");
                            None
                        }
                    },
                    Err(err) => {
                        tracing::warn!("loading settings failed: {err:#}");
                        None
                    }
                };
                envelope.respond(response);
            }
            Message::GetGlobalSettings => match self.store.load().await {
                Ok(settings) => {
                    envelope.respond(Some(Message::SendGlobalSettings { settings }.to_value()));
                }
                Err(err) => {
                    tracing::warn!("loading settings failed: {err:#}");
                    envelope.respond(None);
                }
            },
            other => {
                tracing::debug!("ignoring message not addressed to the coordinator: {other:?}");
                envelope.respond(None);
            }
        }
    }

    /// A content agent observed a rate change. Recorded only while
    /// persistence is on; otherwise the report is dropped.
    async fn record_current_rate(&self, rate: f64) {
        match self.store.load().await {
            Ok(settings) if settings.persistent_playback_rate => {
                let updated = Settings {
                    current_rate: Some(rate),
                    ..settings
                };
                if let Err(err) = self.store.save(updated).await {
                    tracing::warn!("recording playback rate failed: {err:#}");
                }
            }
            Ok(_) => {}
            Err(err) => tracing::warn!("loading settings failed: {err:#}"),
        }
    }
}
