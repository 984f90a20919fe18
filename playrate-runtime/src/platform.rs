// The extension runtime surface the components are written against.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::oneshot;

/// Identifier the runtime assigns to a tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TabId(pub u32);

impl std::fmt::Display for TabId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tab {}", self.0)
    }
}

/// Snapshot of an open tab, as returned by a tab query.
#[derive(Debug, Clone)]
pub struct TabInfo {
    pub id: TabId,
    pub url: String,
}

/// A tab's URL changed through navigation. Page refreshes do not fire this;
/// only the content agent's self-initiation path covers them.
#[derive(Debug, Clone)]
pub struct TabEvent {
    pub tab: TabId,
    pub url: String,
}

/// One incoming request on a context's message endpoint. The reply sender
/// carries `None` for message kinds that answer nothing; dropping it reads
/// as an absent response on the caller's side.
#[derive(Debug)]
pub struct Envelope {
    pub message: Value,
    pub reply: oneshot::Sender<Option<Value>>,
}

impl Envelope {
    pub fn respond(self, response: Option<Value>) {
        // Caller may have timed out and gone away; that is its problem.
        let _ = self.reply.send(response);
    }
}

/// Transport failures. Callers treat every variant as retryable, exactly
/// like an initiate precondition failure.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("no responder registered for the destination")]
    NoResponder,
    #[error("messaging channel closed")]
    ChannelClosed,
    #[error("no response within the transport timeout")]
    Timeout,
}

/// What the host platform provides: persistent storage, tab queries,
/// request/response messaging, and stylesheet injection.
///
/// Every method is asynchronous; the three contexts share no memory and
/// coordinate only through these calls.
#[async_trait]
pub trait Runtime: Send + Sync + 'static {
    async fn storage_get(&self, key: &str) -> Result<Option<Value>>;
    async fn storage_set(&self, key: &str, value: Value) -> Result<()>;

    async fn query_tabs(&self) -> Vec<TabInfo>;

    /// Request/response send to a tab's content context. `Ok(None)` means a
    /// responder existed but answered nothing.
    async fn send_to_tab(&self, tab: TabId, message: Value) -> Result<Option<Value>, SendError>;

    /// Request/response send to the background context.
    async fn send_to_background(&self, message: Value) -> Result<Option<Value>, SendError>;

    async fn insert_css(&self, tab: TabId, file: &str) -> Result<()>;
}
