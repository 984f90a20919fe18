// Protocol messages between coordinator, content agent, and popup.
// Closed set; receivers ignore anything that does not parse.

use serde::{Deserialize, Serialize};

use crate::settings::{GlobalSettingsPatch, Settings};

/// Every message kind exchanged over the runtime's channel, tagged by `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "id", rename_all = "camelCase")]
pub enum Message {
    // popup, agent -> coordinator
    GetGlobalSettings,

    // popup -> coordinator
    #[serde(rename_all = "camelCase")]
    SetGlobalSettings { settings: GlobalSettingsPatch },

    // coordinator -> popup (reply to GetGlobalSettings)
    #[serde(rename_all = "camelCase")]
    SendGlobalSettings { settings: Settings },

    // coordinator -> agent, fire-and-forget broadcast on every store save
    #[serde(rename_all = "camelCase")]
    SetLocalSettings { settings: Settings },

    // coordinator -> agent, injection handshake
    #[serde(rename_all = "camelCase")]
    InitiateContent { settings: Settings },

    // agent -> coordinator, fire-and-forget rate report
    #[serde(rename_all = "camelCase")]
    CurrentPlayrate { current_playrate: f64 },

    // agent -> coordinator (reply to InitiateContent)
    #[serde(rename_all = "camelCase")]
    InitiateSuccess { status: InitiateStatus },
    #[serde(rename_all = "camelCase")]
    InitiateFailed { status: InitiateFailure },

    // coordinator -> popup (reply to SetGlobalSettings)
    SetGlobalSettingsSuccessful,
}

/// Successful initiate outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InitiateStatus {
    ButtonsAdded,
    ButtonsAlreadyAdded,
}

/// Expected, retryable initiate precondition failures. Not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InitiateFailure {
    NotWatchPage,
    NoVideo,
    NoControls,
}

impl Message {
    /// Parse a raw transport value. Unknown kinds come back as `None` and are
    /// dropped by every receiver (forward-compatible no-op).
    pub fn parse(value: &serde_json::Value) -> Option<Message> {
        serde_json::from_value(value.clone()).ok()
    }

    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).expect("message serializes")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_id_tags() {
        let value = Message::GetGlobalSettings.to_value();
        assert_eq!(value, serde_json::json!({ "id": "getGlobalSettings" }));

        let value = Message::CurrentPlayrate {
            current_playrate: 1.5,
        }
        .to_value();
        assert_eq!(
            value,
            serde_json::json!({ "id": "currentPlayrate", "currentPlayrate": 1.5 })
        );

        let value = Message::InitiateFailed {
            status: InitiateFailure::NotWatchPage,
        }
        .to_value();
        assert_eq!(
            value,
            serde_json::json!({ "id": "initiateFailed", "status": "notWatchPage" })
        );
    }

    #[test]
    fn roundtrip_through_transport_value() {
        let message = Message::InitiateContent {
            settings: Settings::default(),
        };
        assert_eq!(Message::parse(&message.to_value()), Some(message));
    }

    #[test]
    fn unknown_kind_is_ignored() {
        let value = serde_json::json!({ "id": "futureMessage", "payload": 1 });
        assert_eq!(Message::parse(&value), None);
    }
}
