// DOM boundary seen by the content agent. The real extension queries the
// document; here the same shapes are traits so the agent runs natively.

use std::sync::Arc;

/// The playing video element.
pub trait Video: Send + Sync {
    fn playback_rate(&self) -> f64;
    fn set_playback_rate(&self, rate: f64);
}

/// The page's existing control container the rate controls are inserted
/// into. Also owns the reset control's readout label once installed.
pub trait ControlBar: Send + Sync {
    /// Insert the three controls and the marker. Idempotency is the caller's
    /// job; a second install is a no-op.
    fn install_controls(&self);
    fn set_readout(&self, label: &str);
    fn readout(&self) -> String;
}

/// One page context. Handles are re-queried per operation because same-tab
/// navigation replaces the video element while the page survives.
pub trait Page: Send + Sync {
    fn url(&self) -> String;
    fn main_video(&self) -> Option<Arc<dyn Video>>;
    fn control_bar(&self) -> Option<Arc<dyn ControlBar>>;
    /// Marker query: were the controls already installed on this page?
    fn controls_present(&self) -> bool;
}
