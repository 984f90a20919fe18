//! Settings popup: two rate inputs and the persistence checkbox, backed
//! entirely by round trips through the coordinator. One instance per time
//! the user opens the UI.

use std::sync::Arc;

use anyhow::Result;
use playrate_protocol::{GlobalSettingsPatch, Message};
use playrate_runtime::Runtime;

/// Rate inputs are capped at this many characters.
const MAX_INPUT_LEN: usize = 5;

pub struct Popup {
    runtime: Arc<dyn Runtime>,
    decrease_input: String,
    increase_input: String,
    persist_checked: bool,
    closed: bool,
}

impl Popup {
    /// Open the popup: fetch the global settings and populate the form.
    /// A missing reply leaves the form blank, exactly like the real UI when
    /// the background is not answering.
    pub async fn open(runtime: Arc<dyn Runtime>) -> Result<Popup> {
        let mut popup = Popup {
            runtime,
            decrease_input: String::new(),
            increase_input: String::new(),
            persist_checked: false,
            closed: false,
        };

        let request = Message::GetGlobalSettings.to_value();
        let response = popup.runtime.send_to_background(request).await?;
        if let Some(Message::SendGlobalSettings { settings }) =
            response.as_ref().and_then(Message::parse)
        {
            popup.decrease_input = settings.decrease_rate.to_string();
            popup.increase_input = settings.increase_rate.to_string();
            popup.persist_checked = settings.persistent_playback_rate;
        }
        Ok(popup)
    }

    pub fn decrease_input(&self) -> &str {
        &self.decrease_input
    }

    pub fn increase_input(&self) -> &str {
        &self.increase_input
    }

    pub fn persist_checked(&self) -> bool {
        self.persist_checked
    }

    pub fn set_decrease_input(&mut self, raw: &str) {
        self.decrease_input = sanitize_rate_input(raw);
    }

    pub fn set_increase_input(&mut self, raw: &str) {
        self.increase_input = sanitize_rate_input(raw);
    }

    pub fn set_persist_checked(&mut self, checked: bool) {
        self.persist_checked = checked;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Submit the form. Empty or unparsable inputs keep the popup open and
    /// change nothing; on an acknowledged save the popup closes.
    pub async fn save(&mut self) -> Result<()> {
        if self.decrease_input.is_empty() || self.increase_input.is_empty() {
            return Ok(());
        }
        let (Ok(decrease_rate), Ok(increase_rate)) = (
            self.decrease_input.parse::<f64>(),
            self.increase_input.parse::<f64>(),
        ) else {
            return Ok(());
        };

        let request = Message::SetGlobalSettings {
            settings: GlobalSettingsPatch {
                decrease_rate,
                increase_rate,
                persistent_playback_rate: self.persist_checked,
            },
        }
        .to_value();
        let response = self.runtime.send_to_background(request).await?;
        if let Some(Message::SetGlobalSettingsSuccessful) = response.as_ref().and_then(Message::parse)
        {
            self.closed = true;
        }
        Ok(())
    }
}

/// Free-form text filtered to digits and a single decimal point, capped at
/// five characters.
fn sanitize_rate_input(raw: &str) -> String {
    let mut out = String::new();
    let mut seen_dot = false;
    for ch in raw.chars() {
        if out.len() == MAX_INPUT_LEN {
            break;
        }
        if ch.is_ascii_digit() {
            out.push(ch);
        } else if ch == '.' && !seen_dot {
            seen_dot = true;
            out.push(ch);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_keeps_digits_and_one_dot() {
        assert_eq!(sanitize_rate_input("0.25"), "0.25");
        assert_eq!(sanitize_rate_input("1.2.5"), "1.25");
        assert_eq!(sanitize_rate_input("rate: 2"), "2");
        assert_eq!(sanitize_rate_input("123456789"), "12345");
        assert_eq!(sanitize_rate_input(""), "");
    }

    #[tokio::test]
    async fn save_with_empty_input_is_a_no_op() {
        let (browser, _events) =
            playrate_runtime::MemoryBrowser::new(std::time::Duration::from_millis(50));
        let mut background = browser.register_background();
        // Background answering the open-time settings fetch.
        tokio::spawn(async move {
            while let Some(envelope) = background.recv().await {
                envelope.respond(Some(
                    Message::SendGlobalSettings {
                        settings: playrate_protocol::Settings::default(),
                    }
                    .to_value(),
                ));
            }
        });

        let mut popup = Popup::open(browser.clone()).await.unwrap();
        assert_eq!(popup.decrease_input(), "0.25");

        popup.set_decrease_input("");
        popup.save().await.unwrap();
        assert!(!popup.is_closed());
    }
}
