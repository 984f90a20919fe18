//! Platform boundary for the playrate extension core.
//!
//! The host browser's extension runtime (message transport, persistent
//! key-value storage, tab lifecycle, CSS injection) and the page DOM are
//! external collaborators. This crate pins them down as traits and provides
//! the in-memory implementation that tests and the sim binary run against.

pub mod memory;
pub mod page;
pub mod platform;
pub mod poll;

pub use memory::{MemoryBrowser, MemoryControlBar, MemoryPage, MemoryVideo};
pub use page::{ControlBar, Page, Video};
pub use platform::{Envelope, Runtime, SendError, TabEvent, TabId, TabInfo};
pub use poll::{spawn_bounded, PollHandle};
