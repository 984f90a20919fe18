//! Shared wire and storage definitions for the playrate extension core.
//!
//! Three isolated contexts (background coordinator, per-page content agent,
//! settings popup) agree on one settings record and a closed set of messages.
//! Everything here serializes to the exact JSON shapes the platform carries:
//! camelCase fields, `id`-tagged message objects.

pub mod messages;
pub mod settings;

pub use messages::{InitiateFailure, InitiateStatus, Message};
pub use settings::{GlobalSettingsPatch, Settings, STORAGE_KEY};
