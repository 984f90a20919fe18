//! The three extension contexts: background coordinator (with its settings
//! store), per-page content agent, and the settings popup.

pub mod agent;
pub mod config;
pub mod coordinator;
pub mod popup;
pub mod store;

pub use agent::{AgentConfig, ContentAgent};
pub use config::ConfigFile;
pub use coordinator::{Coordinator, CoordinatorConfig};
pub use popup::Popup;
pub use store::SettingsStore;
