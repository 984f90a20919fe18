//! Per-page content agent: owns the local settings mirror and the on-page
//! rate controls, drives the video element's playback rate, and reports
//! changes upward while persistence is on.
//!
//! Three ways a page shows up, and who initiates:
//! 1. first open: tab event fires, the coordinator's injection poll drives
//!    `initiateContent`;
//! 2. same-tab video-to-video navigation: tab event fires, the controls
//!    marker survives, only the video element is fresh;
//! 3. page refresh: no tab event at all, so the agent polls on its own and
//!    pulls settings with `getGlobalSettings`.

use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use playrate_protocol::{InitiateFailure, InitiateStatus, Message, Settings};
use playrate_runtime::{
    poll::spawn_bounded, ControlBar, Envelope, Page, PollHandle, Runtime, Video,
};
use tokio::sync::mpsc;

use crate::config::ConfigFile;

/// Playback rate bounds the controls clamp into.
const MIN_RATE: f64 = 0.0;
const MAX_RATE: f64 = 16.0;

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub watch_fragment: String,
    pub poll_interval: Duration,
    pub max_attempts: u32,
}

impl AgentConfig {
    pub fn from_config(config: &ConfigFile) -> Self {
        AgentConfig {
            watch_fragment: config.site.watch_fragment.clone(),
            poll_interval: config.poll.interval(),
            max_attempts: config.poll.max_attempts,
        }
    }
}

#[derive(Clone)]
pub struct ContentAgent {
    inner: Arc<AgentInner>,
}

struct AgentInner {
    runtime: Arc<dyn Runtime>,
    page: Arc<dyn Page>,
    config: AgentConfig,
    /// Local mirror of the shared settings. Never the source of truth;
    /// overwritten wholesale by every sync message.
    settings: Mutex<Settings>,
    /// Serializes the two install paths (injection handshake and
    /// self-initiation) so the marker check and the insert are one step.
    install_gate: Mutex<()>,
    self_initiation: Mutex<Option<PollHandle>>,
}

impl ContentAgent {
    /// Attach to a freshly loaded page: handle messages from `requests` and
    /// start the self-initiation poll for the refresh path. Dropping every
    /// clone of the agent tears both down.
    pub fn attach(
        runtime: Arc<dyn Runtime>,
        page: Arc<dyn Page>,
        config: AgentConfig,
        mut requests: mpsc::UnboundedReceiver<Envelope>,
    ) -> ContentAgent {
        let agent = ContentAgent {
            inner: Arc::new(AgentInner {
                runtime,
                page,
                config,
                settings: Mutex::new(Settings::default()),
                install_gate: Mutex::new(()),
                self_initiation: Mutex::new(None),
            }),
        };

        // The handler task must not keep the agent alive on its own, or the
        // self-initiation handle inside `AgentInner` would never drop.
        let handler = Arc::downgrade(&agent.inner);
        tokio::spawn(async move {
            while let Some(envelope) = requests.recv().await {
                let Some(inner) = handler.upgrade() else {
                    break;
                };
                ContentAgent { inner }.handle(envelope).await;
            }
        });

        agent.spawn_self_initiation();
        agent
    }

    async fn handle(&self, envelope: Envelope) {
        match Message::parse(&envelope.message) {
            Some(Message::InitiateContent { settings }) => {
                self.overwrite_mirror(settings);
                envelope.respond(Some(self.initiate().to_value()));
            }
            Some(Message::SetLocalSettings { settings }) => {
                envelope.respond(None);
                self.apply_local_settings(settings);
            }
            // Everything else is someone else's message.
            _ => envelope.respond(None),
        }
    }

    /// The initiate operation: checked preconditions in order, then either
    /// a rate re-apply (controls survived a same-tab navigation) or a fresh
    /// install.
    fn initiate(&self) -> Message {
        let page = &self.inner.page;

        if !page.url().contains(&self.inner.config.watch_fragment) {
            return Message::InitiateFailed {
                status: InitiateFailure::NotWatchPage,
            };
        }
        let Some(video) = page.main_video() else {
            return Message::InitiateFailed {
                status: InitiateFailure::NoVideo,
            };
        };
        let Some(bar) = page.control_bar() else {
            return Message::InitiateFailed {
                status: InitiateFailure::NoControls,
            };
        };

        if page.controls_present() {
            // The navigation rebuilt the video element, so its rate is back
            // at the default; restore the persisted one.
            self.apply_persisted_rate(&video, &bar);
            return Message::InitiateSuccess {
                status: InitiateStatus::ButtonsAlreadyAdded,
            };
        }

        self.install_controls(&video, &bar);
        Message::InitiateSuccess {
            status: InitiateStatus::ButtonsAdded,
        }
    }

    fn install_controls(&self, video: &Arc<dyn Video>, bar: &Arc<dyn ControlBar>) {
        let _gate = self.inner.install_gate.lock().unwrap();
        // Last check before inserting: a racing initiation may have won.
        if self.inner.page.controls_present() {
            return;
        }
        bar.install_controls();
        self.apply_persisted_rate(video, bar);
        tracing::debug!("rate controls installed");
    }

    /// Apply the mirrored persisted rate (if any) to the live video and
    /// refresh the readout either way.
    fn apply_persisted_rate(&self, video: &Arc<dyn Video>, bar: &Arc<dyn ControlBar>) {
        let persisted = {
            let settings = self.inner.settings.lock().unwrap();
            if settings.persistent_playback_rate {
                settings.current_rate
            } else {
                None
            }
        };
        if let Some(rate) = persisted {
            video.set_playback_rate(rate);
        }
        bar.set_readout(&format_rate(video.playback_rate()));
    }

    fn overwrite_mirror(&self, settings: Settings) {
        *self.inner.settings.lock().unwrap() = settings.normalize();
    }

    /// `setLocalSettings`: overwrite the mirror and push any persisted rate
    /// onto the live video.
    fn apply_local_settings(&self, settings: Settings) {
        self.overwrite_mirror(settings);
        let snapshot = self.inner.settings.lock().unwrap().clone();
        let Some(rate) = snapshot.current_rate else {
            return;
        };
        if let Some(video) = self.inner.page.main_video() {
            video.set_playback_rate(rate);
            if self.inner.page.controls_present() {
                if let Some(bar) = self.inner.page.control_bar() {
                    bar.set_readout(&format_rate(rate));
                }
            }
        }
    }

    /// Current mirror contents, for the sim and tests.
    pub fn settings(&self) -> Settings {
        self.inner.settings.lock().unwrap().clone()
    }

    // Control click handlers. Each re-queries the page because the video
    // element does not survive navigation.

    pub fn click_increase(&self) {
        let Some((video, bar)) = self.video_and_bar() else {
            return;
        };
        let rate = video.playback_rate();
        if rate >= MAX_RATE {
            return;
        }
        let step = self.inner.settings.lock().unwrap().increase_rate;
        let new_rate = round_to(rate + step, 5).min(MAX_RATE);
        video.set_playback_rate(new_rate);
        bar.set_readout(&format_rate(new_rate));
        self.report_rate(new_rate);
    }

    pub fn click_decrease(&self) {
        let Some((video, bar)) = self.video_and_bar() else {
            return;
        };
        let rate = video.playback_rate();
        if rate <= MIN_RATE {
            return;
        }
        let step = self.inner.settings.lock().unwrap().decrease_rate;
        let new_rate = round_to(rate - step, 6).max(MIN_RATE);
        video.set_playback_rate(new_rate);
        bar.set_readout(&format_rate(new_rate));
        self.report_rate(new_rate);
    }

    pub fn click_reset(&self) {
        let Some((video, bar)) = self.video_and_bar() else {
            return;
        };
        video.set_playback_rate(1.0);
        bar.set_readout(&format_rate(1.0));
        self.report_rate(1.0);
    }

    fn video_and_bar(&self) -> Option<(Arc<dyn Video>, Arc<dyn ControlBar>)> {
        let video = self.inner.page.main_video()?;
        let bar = self.inner.page.control_bar()?;
        Some((video, bar))
    }

    /// Report a rate change upward, fire-and-forget, only while persistence
    /// is on.
    fn report_rate(&self, rate: f64) {
        if !self.inner.settings.lock().unwrap().persistent_playback_rate {
            return;
        }
        let runtime = self.inner.runtime.clone();
        tokio::spawn(async move {
            let message = Message::CurrentPlayrate {
                current_playrate: rate,
            }
            .to_value();
            if let Err(err) = runtime.send_to_background(message).await {
                tracing::debug!("rate report not delivered: {err}");
            }
        });
    }

    /// Refresh fallback: no tab event fired, so poll for the player and pull
    /// settings ourselves. Bails out if a racing initiation installed the
    /// controls first.
    fn spawn_self_initiation(&self) {
        if self.inner.page.controls_present() {
            return;
        }
        // Weak, not a clone: the tick must not keep the agent (and with it
        // this poll's own handle) alive after every outside reference is gone.
        let weak: Weak<AgentInner> = Arc::downgrade(&self.inner);
        let interval = self.inner.config.poll_interval;
        let max_attempts = self.inner.config.max_attempts;
        let handle = spawn_bounded(interval, max_attempts, move |attempt| {
            let weak = weak.clone();
            async move {
                let Some(inner) = weak.upgrade() else {
                    return ControlFlow::Break(());
                };
                let agent = ContentAgent { inner };
                let page = &agent.inner.page;
                if page.main_video().is_none() || page.control_bar().is_none() {
                    tracing::debug!("self-initiation attempt {attempt}: player not ready");
                    return ControlFlow::Continue(());
                }

                let request = Message::GetGlobalSettings.to_value();
                let settings = match agent.inner.runtime.send_to_background(request).await {
                    Ok(Some(response)) => match Message::parse(&response) {
                        Some(Message::SendGlobalSettings { settings }) => settings,
                        _ => {
                            tracing::debug!("self-initiation attempt {attempt}: bad reply");
                            return ControlFlow::Continue(());
                        }
                    },
                    Ok(None) => return ControlFlow::Continue(()),
                    Err(err) => {
                        tracing::debug!("self-initiation attempt {attempt}: {err}");
                        return ControlFlow::Continue(());
                    }
                };

                if page.controls_present() {
                    // The coordinator's injection got here first.
                    return ControlFlow::Break(());
                }
                agent.overwrite_mirror(settings);
                if let (Some(video), Some(bar)) = (page.main_video(), page.control_bar()) {
                    agent.install_controls(&video, &bar);
                    tracing::info!("controls installed by self-initiation");
                }
                ControlFlow::Break(())
            }
        });
        *self.inner.self_initiation.lock().unwrap() = Some(handle);
    }
}

/// Fixed-decimal rounding so repeated clicks do not accumulate float drift.
fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// The readout label is the plain numeric rate: "1", "2.5".
fn format_rate(rate: f64) -> String {
    format!("{}", rate)
}
