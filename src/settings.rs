use std::path::PathBuf;
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// On-disk shape of the persisted client settings
#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tmdb_key: Option<String>,
}

/// Catalog API key, read once at startup and replaceable at runtime
///
/// A key from the environment takes precedence over the settings file. Saving
/// a key writes the file and applies the key to every later catalog call.
pub struct SettingsStore {
    path: PathBuf,
    api_key: RwLock<Option<String>>,
}

impl SettingsStore {
    /// Loads the settings file; a missing or unreadable file means no key
    pub async fn load(path: impl Into<PathBuf>, env_key: Option<String>) -> Self {
        let path = path.into();
        let persisted = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => serde_json::from_str::<PersistedSettings>(&contents)
                .map_err(|e| {
                    tracing::warn!(path = %path.display(), error = %e, "Ignoring malformed settings file");
                })
                .unwrap_or_default(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => PersistedSettings::default(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Could not read settings file");
                PersistedSettings::default()
            }
        };

        let api_key = env_key
            .filter(|k| !k.trim().is_empty())
            .or(persisted.tmdb_key.filter(|k| !k.trim().is_empty()));
        tracing::info!(
            path = %path.display(),
            api_key_configured = api_key.is_some(),
            "Settings loaded"
        );

        Self {
            path,
            api_key: RwLock::new(api_key),
        }
    }

    /// Settings held in memory only, never written to disk
    pub fn in_memory(api_key: Option<String>) -> Self {
        Self {
            path: PathBuf::new(),
            api_key: RwLock::new(api_key),
        }
    }

    pub fn api_key(&self) -> Option<String> {
        self.api_key
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key().is_some()
    }

    /// Validates, persists and applies a new catalog API key
    pub async fn set_api_key(&self, key: &str) -> AppResult<()> {
        let key = key.trim();
        if key.is_empty() {
            return Err(AppError::InvalidInput("API key cannot be empty".to_string()));
        }

        if !self.path.as_os_str().is_empty() {
            let contents = serde_json::to_string_pretty(&PersistedSettings {
                tmdb_key: Some(key.to_string()),
            })?;
            tokio::fs::write(&self.path, contents).await.map_err(|e| {
                AppError::Internal(format!(
                    "Could not write settings to {}: {}",
                    self.path.display(),
                    e
                ))
            })?;
        }

        *self.api_key.write().unwrap_or_else(PoisonError::into_inner) = Some(key.to_string());
        tracing::info!(path = %self.path.display(), "Catalog API key updated");
        Ok(())
    }
}
