use memberwatch_api::Credentials;
use memberwatch_store::{KeyValueStore, KeyValueStoreExt, Scope};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{Error, Result};

const BASE_URL_KEY: &str = "base_url";
const API_KEY_KEY: &str = "api_key";
const NOTIFICATIONS_KEY: &str = "notifications";

/// Per-feed notification toggles plus the poll interval
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub failed_payments: bool,
    #[serde(default = "default_true")]
    pub new_members: bool,
    #[serde(default = "default_true")]
    pub canceled_subscriptions: bool,
    #[serde(default = "default_true")]
    pub expiring_memberships: bool,
    /// Poll interval in minutes
    #[serde(default = "default_check_interval")]
    pub check_interval_minutes: u64,
    /// RFC 3339 timestamp of the last completed poll cycle
    #[serde(default)]
    pub last_check: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_check_interval() -> u64 {
    5
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            failed_payments: true,
            new_members: true,
            canceled_subscriptions: true,
            expiring_memberships: true,
            check_interval_minutes: default_check_interval(),
            last_check: None,
        }
    }
}

/// User settings, persisted in the synced scope of the key/value store
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings {
    pub credentials: Credentials,
    pub notifications: NotificationSettings,
}

impl Settings {
    pub fn load(store: &dyn KeyValueStore) -> Result<Self> {
        let base_url: String = store
            .get_json(Scope::Synced, BASE_URL_KEY)?
            .unwrap_or_default();
        let api_key: String = store
            .get_json(Scope::Synced, API_KEY_KEY)?
            .unwrap_or_default();
        let notifications = store
            .get_json(Scope::Synced, NOTIFICATIONS_KEY)?
            .unwrap_or_default();

        Ok(Self {
            credentials: Credentials::new(base_url, api_key),
            notifications,
        })
    }

    pub fn save(&self, store: &dyn KeyValueStore) -> Result<()> {
        store.set_json(Scope::Synced, BASE_URL_KEY, &self.credentials.base_url)?;
        store.set_json(Scope::Synced, API_KEY_KEY, &self.credentials.api_key)?;
        store.set_json(Scope::Synced, NOTIFICATIONS_KEY, &self.notifications)?;
        Ok(())
    }

    /// Credentials, or a configuration error pointing the user at settings
    pub fn credentials(&self) -> Result<Credentials> {
        if !self.credentials.is_complete() {
            return Err(Error::Config(
                "Base URL and API key are not configured. Run `memberwatch configure` first."
                    .to_string(),
            ));
        }
        Ok(self.credentials.clone())
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.notifications.check_interval_minutes.max(1) * 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memberwatch_store::MemoryStore;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert!(settings.notifications.enabled);
        assert!(settings.notifications.new_members);
        assert_eq!(settings.notifications.check_interval_minutes, 5);
        assert_eq!(settings.check_interval(), Duration::from_secs(300));
    }

    #[test]
    fn test_load_missing_store_gives_defaults() {
        let store = MemoryStore::new();
        let settings = Settings::load(&store).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_save_load_roundtrip() {
        let store = MemoryStore::new();

        let mut settings = Settings::default();
        settings.credentials = Credentials::new("https://example.com", "mp-key");
        settings.notifications.failed_payments = false;
        settings.notifications.check_interval_minutes = 15;
        settings.save(&store).unwrap();

        let loaded = Settings::load(&store).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_credentials_required() {
        let settings = Settings::default();
        let err = settings.credentials().unwrap_err();
        assert!(err.is_configuration());

        let mut settings = Settings::default();
        settings.credentials = Credentials::new("https://example.com", "key");
        assert!(settings.credentials().is_ok());
    }

    #[test]
    fn test_interval_floor_is_one_minute() {
        let mut settings = Settings::default();
        settings.notifications.check_interval_minutes = 0;
        assert_eq!(settings.check_interval(), Duration::from_secs(60));
    }

    #[test]
    fn test_settings_tolerate_partial_json() {
        // Older versions persisted fewer fields; serde defaults fill the rest
        let store = MemoryStore::new();
        use memberwatch_store::{KeyValueStore, Scope};
        store
            .set_raw(Scope::Synced, "notifications", r#"{"enabled":false}"#)
            .unwrap();

        let settings = Settings::load(&store).unwrap();
        assert!(!settings.notifications.enabled);
        assert!(settings.notifications.new_members);
        assert_eq!(settings.notifications.check_interval_minutes, 5);
    }
}
