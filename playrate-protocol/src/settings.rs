use serde::{Deserialize, Serialize};

/// Fixed key of the one persisted record in the platform's key-value store.
pub const STORAGE_KEY: &str = "playrateSettings";

/// The single shared settings record.
///
/// Strict deserialization on purpose: a stored record is valid only if it
/// carries exactly these four fields. Anything else is treated as corrupt
/// and self-healed to defaults by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Settings {
    /// Amount subtracted from the playback rate per decrease click.
    pub decrease_rate: f64,
    /// Amount added to the playback rate per increase click.
    pub increase_rate: f64,
    /// Restore the last-used rate across navigations?
    pub persistent_playback_rate: bool,
    /// Last observed playback rate. Meaningful only while
    /// `persistent_playback_rate` is true.
    ///
    /// `deserialize_with` suppresses serde's implicit missing-`Option`
    /// defaulting so an absent field invalidates the record.
    #[serde(deserialize_with = "Option::deserialize")]
    pub current_rate: Option<f64>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            decrease_rate: 0.25,
            increase_rate: 0.25,
            persistent_playback_rate: false,
            current_rate: None,
        }
    }
}

impl Settings {
    /// Re-enforce the record invariant: `current_rate` is only carried while
    /// persistence is enabled. Applied at every write path.
    pub fn normalize(mut self) -> Self {
        if !self.persistent_playback_rate {
            self.current_rate = None;
        }
        self
    }

    /// Merge a popup submission over this record, keeping the stored
    /// `current_rate` and re-applying the invariant.
    pub fn apply_patch(self, patch: GlobalSettingsPatch) -> Self {
        Settings {
            decrease_rate: patch.decrease_rate,
            increase_rate: patch.increase_rate,
            persistent_playback_rate: patch.persistent_playback_rate,
            current_rate: self.current_rate,
        }
        .normalize()
    }
}

/// What the popup submits: everything except `current_rate`, which only the
/// coordinator may carry forward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct GlobalSettingsPatch {
    pub decrease_rate: f64,
    pub increase_rate: f64,
    pub persistent_playback_rate: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_record_shape() {
        let value = serde_json::to_value(Settings::default()).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "decreaseRate": 0.25,
                "increaseRate": 0.25,
                "persistentPlaybackRate": false,
                "currentRate": null,
            })
        );
    }

    #[test]
    fn normalize_clears_rate_without_persistence() {
        let settings = Settings {
            persistent_playback_rate: false,
            current_rate: Some(2.5),
            ..Settings::default()
        };
        assert_eq!(settings.normalize().current_rate, None);

        let settings = Settings {
            persistent_playback_rate: true,
            current_rate: Some(2.5),
            ..Settings::default()
        };
        assert_eq!(settings.normalize().current_rate, Some(2.5));
    }

    #[test]
    fn strict_parse_rejects_partial_or_extended_records() {
        // Missing field
        let record = serde_json::json!({
            "decreaseRate": 0.25,
            "increaseRate": 0.25,
            "persistentPlaybackRate": false,
        });
        assert!(serde_json::from_value::<Settings>(record).is_err());

        // Unknown fifth field
        let record = serde_json::json!({
            "decreaseRate": 0.25,
            "increaseRate": 0.25,
            "persistentPlaybackRate": false,
            "currentRate": null,
            "legacyField": 1,
        });
        assert!(serde_json::from_value::<Settings>(record).is_err());
    }

    #[test]
    fn patch_keeps_stored_current_rate_under_persistence() {
        let stored = Settings {
            persistent_playback_rate: true,
            current_rate: Some(1.75),
            ..Settings::default()
        };
        let merged = stored.apply_patch(GlobalSettingsPatch {
            decrease_rate: 0.5,
            increase_rate: 0.5,
            persistent_playback_rate: true,
        });
        assert_eq!(merged.current_rate, Some(1.75));
        assert_eq!(merged.decrease_rate, 0.5);

        // Turning persistence off drops the carried rate.
        let stored = Settings {
            persistent_playback_rate: true,
            current_rate: Some(1.75),
            ..Settings::default()
        };
        let merged = stored.apply_patch(GlobalSettingsPatch {
            decrease_rate: 0.25,
            increase_rate: 0.25,
            persistent_playback_rate: false,
        });
        assert_eq!(merged.current_rate, None);
    }
}
