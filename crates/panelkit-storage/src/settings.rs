//! User preferences stored next to the session.

use crate::{StorageError, StorageKeys, StorageMap, StorageResult, StorageService};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemePreference {
    #[default]
    Light,
    Dark,
    System,
}

/// Typed view of the preference keys. Keys missing from storage take their
/// default value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExtensionSettings {
    pub dark_mode: bool,
    pub theme_preference: ThemePreference,
    pub notifications: bool,
    pub auto_refresh: bool,
    pub debugging: bool,
    pub sync_frequency: bool,
}

impl Default for ExtensionSettings {
    fn default() -> Self {
        Self {
            dark_mode: false,
            theme_preference: ThemePreference::Light,
            notifications: true,
            auto_refresh: false,
            debugging: false,
            sync_frequency: false,
        }
    }
}

const SETTINGS_KEYS: [&str; 6] = [
    StorageKeys::DARK_MODE,
    StorageKeys::THEME_PREFERENCE,
    StorageKeys::NOTIFICATIONS,
    StorageKeys::AUTO_REFRESH,
    StorageKeys::DEBUGGING,
    StorageKeys::SYNC_FREQUENCY,
];

impl ExtensionSettings {
    fn to_items(&self) -> StorageResult<StorageMap> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            _ => Err(StorageError::Encoding(
                "settings did not serialize to an object".to_string(),
            )),
        }
    }
}

impl StorageService {
    /// Read the preference keys, defaulting whatever is missing.
    pub async fn load_settings(&self) -> StorageResult<ExtensionSettings> {
        let map = self.get(&SETTINGS_KEYS).await?;
        // Null entries count as missing.
        let map: StorageMap = map.into_iter().filter(|(_, v)| !v.is_null()).collect();
        Ok(serde_json::from_value(Value::Object(map))?)
    }

    pub async fn save_settings(&self, settings: &ExtensionSettings) -> StorageResult<()> {
        self.set(settings.to_items()?).await
    }

    /// Write the default preferences. The session keys are left alone.
    pub async fn reset_to_defaults(&self) -> StorageResult<()> {
        self.save_settings(&ExtensionSettings::default()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_load_defaults_when_empty() {
        let service = StorageService::in_memory();
        let settings = service.load_settings().await.unwrap();
        assert_eq!(settings, ExtensionSettings::default());
        assert!(settings.notifications);
    }

    #[tokio::test]
    async fn test_save_uses_camel_case_keys() {
        let service = StorageService::in_memory();
        let settings = ExtensionSettings {
            dark_mode: true,
            theme_preference: ThemePreference::System,
            ..Default::default()
        };
        service.save_settings(&settings).await.unwrap();

        assert_eq!(
            service.get_value(StorageKeys::DARK_MODE).await.unwrap(),
            Some(json!(true))
        );
        assert_eq!(
            service.get_value(StorageKeys::THEME_PREFERENCE).await.unwrap(),
            Some(json!("system"))
        );
        assert_eq!(service.load_settings().await.unwrap(), settings);
    }

    #[tokio::test]
    async fn test_reset_keeps_session_keys() {
        let service = StorageService::in_memory();
        service
            .set_value(StorageKeys::ACCESS_TOKEN, json!("T1"))
            .await
            .unwrap();
        service
            .set_value(StorageKeys::DARK_MODE, json!(true))
            .await
            .unwrap();

        service.reset_to_defaults().await.unwrap();

        assert!(!service.load_settings().await.unwrap().dark_mode);
        assert_eq!(
            service.get_value(StorageKeys::ACCESS_TOKEN).await.unwrap(),
            Some(json!("T1"))
        );
    }

    #[tokio::test]
    async fn test_wrong_type_is_error() {
        let service = StorageService::in_memory();
        service
            .set_value(StorageKeys::DARK_MODE, json!("yes"))
            .await
            .unwrap();

        assert!(matches!(
            service.load_settings().await,
            Err(StorageError::Json(_))
        ));
    }
}
