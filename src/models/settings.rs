use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::Config;

/// A stored admin setting: one JSON-encoded value per key
#[derive(Queryable, Selectable, Insertable, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::settings)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SettingRow {
    pub key: String,
    pub value: String,
    pub updated_at: NaiveDateTime,
}

/// Effective runtime settings
///
/// Starts from the static [`Config`] and is overlaid with whatever the admin
/// panel has stored, so credentials can change without a restart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub immich_url: Option<String>,
    pub immich_api_key: Option<String>,
    /// Albums to sync; the whole library is synced when empty
    pub immich_album_ids: Vec<String>,
    pub astrometry_url: String,
    pub astrometry_enabled: bool,
    pub astrometry_api_key: Option<String>,
    /// Queue a plate-solve job for every newly synced image
    pub auto_plate_solve: bool,
    pub sidecar_enabled: bool,
    pub max_solve_attempts: u32,
}

/// Partial settings update, as stored in the database or sent by the admin panel
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsUpdate {
    pub immich_url: Option<String>,
    pub immich_api_key: Option<String>,
    pub immich_album_ids: Option<Vec<String>>,
    pub astrometry_enabled: Option<bool>,
    pub astrometry_api_key: Option<String>,
    pub auto_plate_solve: Option<bool>,
    pub sidecar_enabled: Option<bool>,
    pub max_solve_attempts: Option<u32>,
}

/// Largest accepted value for `max_solve_attempts`
pub const MAX_SOLVE_ATTEMPTS_LIMIT: u32 = 10;

impl Settings {
    /// Builds the defaults implied by the static configuration
    pub fn from_config(config: &Config) -> Self {
        Self {
            immich_url: config.immich_url.clone(),
            immich_api_key: config.immich_api_key.clone(),
            immich_album_ids: Vec::new(),
            astrometry_url: config.astrometry_url.clone(),
            astrometry_enabled: config.astrometry_api_key.is_some(),
            astrometry_api_key: config.astrometry_api_key.clone(),
            auto_plate_solve: false,
            sidecar_enabled: false,
            max_solve_attempts: config.max_solve_attempts,
        }
    }

    /// Applies a settings update, keeping current values for unset fields
    ///
    /// An empty string clears an optional credential. `astrometry_enabled`
    /// follows the key when the update sets a key but not the switch.
    pub fn apply_update(self, update: SettingsUpdate) -> Self {
        fn overlay(current: Option<String>, update: Option<String>) -> Option<String> {
            match update {
                Some(value) if value.trim().is_empty() => None,
                Some(value) => Some(value.trim().to_string()),
                None => current,
            }
        }

        let key_supplied = update.astrometry_api_key.is_some();
        let astrometry_api_key = overlay(self.astrometry_api_key, update.astrometry_api_key);
        // A key saved without an explicit switch turns solving on (or off when cleared)
        let astrometry_enabled = match update.astrometry_enabled {
            Some(enabled) => enabled,
            None if key_supplied => astrometry_api_key.is_some(),
            None => self.astrometry_enabled,
        };

        Self {
            immich_url: overlay(self.immich_url, update.immich_url),
            immich_api_key: overlay(self.immich_api_key, update.immich_api_key),
            immich_album_ids: update.immich_album_ids.unwrap_or(self.immich_album_ids),
            astrometry_url: self.astrometry_url,
            astrometry_enabled,
            astrometry_api_key,
            auto_plate_solve: update.auto_plate_solve.unwrap_or(self.auto_plate_solve),
            sidecar_enabled: update.sidecar_enabled.unwrap_or(self.sidecar_enabled),
            max_solve_attempts: update.max_solve_attempts.unwrap_or(self.max_solve_attempts),
        }
    }

    /// Immich URL and key, when both are configured
    pub fn immich_credentials(&self) -> Option<(&str, &str)> {
        Some((self.immich_url.as_deref()?, self.immich_api_key.as_deref()?))
    }

    /// Astrometry.net API key, when plate solving is enabled and configured
    pub fn astrometry_key(&self) -> Option<&str> {
        if self.astrometry_enabled {
            self.astrometry_api_key.as_deref()
        } else {
            None
        }
    }

    /// A copy safe to hand to clients, with API keys masked
    pub fn masked(&self) -> Self {
        Self {
            immich_api_key: self.immich_api_key.as_deref().map(mask_secret),
            astrometry_api_key: self.astrometry_api_key.as_deref().map(mask_secret),
            ..self.clone()
        }
    }
}

impl SettingsUpdate {
    /// Checks the update for values the admin panel must not store
    pub fn validate(&self) -> Result<(), String> {
        if let Some(url) = self.immich_url.as_deref() {
            let url = url.trim();
            if !url.is_empty() && !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(format!("Immich URL must start with http:// or https://: {}", url));
            }
        }
        if let Some(attempts) = self.max_solve_attempts {
            if !(1..=MAX_SOLVE_ATTEMPTS_LIMIT).contains(&attempts) {
                return Err(format!(
                    "max_solve_attempts must be between 1 and {}",
                    MAX_SOLVE_ATTEMPTS_LIMIT
                ));
            }
        }
        if let Some(album_ids) = &self.immich_album_ids {
            if album_ids.iter().any(|id| id.trim().is_empty()) {
                return Err("Album ids must not be blank".to_string());
            }
        }
        Ok(())
    }
}

/// Masks all but the last four characters of a secret
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 4 {
        return "*".repeat(chars.len());
    }
    let visible: String = chars[chars.len() - 4..].iter().collect();
    format!("{}{}", "*".repeat(chars.len() - 4), visible)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::base_config;

    #[test]
    fn test_from_config_enables_astrometry_only_with_key() {
        let mut config = base_config(None);
        assert!(!Settings::from_config(&config).astrometry_enabled);

        config.astrometry_api_key = Some("key".to_string());
        let settings = Settings::from_config(&config);
        assert!(settings.astrometry_enabled);
        assert_eq!(settings.astrometry_key(), Some("key"));
    }

    #[test]
    fn test_apply_update_overlays_and_clears() {
        let mut config = base_config(None);
        config.immich_url = Some("http://immich".to_string());
        config.immich_api_key = Some("old".to_string());

        let settings = Settings::from_config(&config).apply_update(SettingsUpdate {
            immich_api_key: Some("  new-key ".to_string()),
            immich_url: Some("".to_string()),
            auto_plate_solve: Some(true),
            ..Default::default()
        });

        assert_eq!(settings.immich_api_key.as_deref(), Some("new-key"));
        assert_eq!(settings.immich_url, None);
        assert!(settings.auto_plate_solve);
        assert!(settings.immich_credentials().is_none());
    }

    #[test]
    fn test_disabled_astrometry_hides_key() {
        let mut config = base_config(None);
        config.astrometry_api_key = Some("key".to_string());
        let settings = Settings::from_config(&config).apply_update(SettingsUpdate {
            astrometry_enabled: Some(false),
            ..Default::default()
        });
        assert_eq!(settings.astrometry_key(), None);
    }

    #[test]
    fn test_saved_key_enables_astrometry() {
        let settings = Settings::from_config(&base_config(None)).apply_update(SettingsUpdate {
            astrometry_api_key: Some("nova-key-1234".to_string()),
            ..Default::default()
        });
        assert!(settings.astrometry_enabled);
        assert_eq!(settings.astrometry_key(), Some("nova-key-1234"));

        let cleared = settings.apply_update(SettingsUpdate {
            astrometry_api_key: Some(String::new()),
            ..Default::default()
        });
        assert!(!cleared.astrometry_enabled);
    }

    #[test]
    fn test_explicit_switch_wins_over_saved_key() {
        let settings = Settings::from_config(&base_config(None)).apply_update(SettingsUpdate {
            astrometry_api_key: Some("nova-key-1234".to_string()),
            astrometry_enabled: Some(false),
            ..Default::default()
        });
        assert!(!settings.astrometry_enabled);

        // Later updates without a key leave the switch alone
        let settings = settings.apply_update(SettingsUpdate {
            auto_plate_solve: Some(true),
            ..Default::default()
        });
        assert!(!settings.astrometry_enabled);
    }

    #[test]
    fn test_mask_secret() {
        assert_eq!(mask_secret("abcdefgh"), "****efgh");
        assert_eq!(mask_secret("abc"), "***");
        assert_eq!(mask_secret(""), "");
    }

    #[test]
    fn test_masked_keeps_other_fields() {
        let mut config = base_config(None);
        config.immich_api_key = Some("secret-immich".to_string());
        config.immich_url = Some("http://immich".to_string());
        let masked = Settings::from_config(&config).masked();
        assert_eq!(masked.immich_api_key.as_deref(), Some("*********mich"));
        assert_eq!(masked.immich_url.as_deref(), Some("http://immich"));
    }

    #[test]
    fn test_validate() {
        assert!(SettingsUpdate::default().validate().is_ok());
        assert!(SettingsUpdate {
            immich_url: Some("ftp://nope".to_string()),
            ..Default::default()
        }
        .validate()
        .is_err());
        assert!(SettingsUpdate {
            immich_url: Some("".to_string()),
            ..Default::default()
        }
        .validate()
        .is_ok());
        assert!(SettingsUpdate {
            max_solve_attempts: Some(0),
            ..Default::default()
        }
        .validate()
        .is_err());
        assert!(SettingsUpdate {
            immich_album_ids: Some(vec!["a".to_string(), " ".to_string()]),
            ..Default::default()
        }
        .validate()
        .is_err());
    }
}
