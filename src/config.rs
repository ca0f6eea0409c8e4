use serde::Deserialize;

/// Application configuration loaded from environment variables
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// TMDB API key; falls back to the persisted settings file when absent
    #[serde(default)]
    pub tmdb_api_key: Option<String>,

    /// TMDB API base URL
    #[serde(default = "default_tmdb_api_url")]
    pub tmdb_api_url: String,

    /// Language requested from the catalog first
    #[serde(default = "default_tmdb_language")]
    pub tmdb_language: String,

    /// Language used for videos when the localized result set is empty
    #[serde(default = "default_tmdb_fallback_language")]
    pub tmdb_fallback_language: String,

    /// Firebase Web API key (Identity Toolkit and Firestore REST)
    #[serde(default)]
    pub firebase_api_key: Option<String>,

    /// Firebase project id
    #[serde(default)]
    pub firebase_project_id: Option<String>,

    /// How often Firestore collections are polled for subscriptions
    #[serde(default = "default_firestore_poll_interval_ms")]
    pub firestore_poll_interval_ms: u64,

    /// Redis connection URL for catalog response caching
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Path of the persisted client settings file
    #[serde(default = "default_settings_path")]
    pub settings_path: String,

    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_tmdb_api_url() -> String {
    "https://api.themoviedb.org/3".to_string()
}

fn default_tmdb_language() -> String {
    "pt-BR".to_string()
}

fn default_tmdb_fallback_language() -> String {
    "en-US".to_string()
}

fn default_firestore_poll_interval_ms() -> u64 {
    2000
}

fn default_settings_path() -> String {
    "cinetrailers.json".to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_vars(std::env::vars())
    }

    /// Load configuration from an explicit set of variables
    pub fn from_vars<I>(vars: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        envy::from_iter::<_, Config>(vars).map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
    }

    /// Firebase credentials, when both halves are configured
    pub fn firebase(&self) -> Option<(&str, &str)> {
        match (&self.firebase_api_key, &self.firebase_project_id) {
            (Some(key), Some(project)) if !key.is_empty() && !project.is_empty() => {
                Some((key.as_str(), project.as_str()))
            }
            _ => None,
        }
    }
}
