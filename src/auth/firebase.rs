/// Firebase Authentication over the Identity Toolkit REST API
///
/// Email/password accounts only. The signed-in user's id token is kept in
/// memory and refreshed through the Secure Token API shortly before expiry.
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};
use reqwest::Client as HttpClient;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::watch;

use crate::{
    auth::AuthProvider,
    error::{AppError, AppResult, AuthFailure},
    models::Identity,
};

const IDENTITY_TOOLKIT_URL: &str = "https://identitytoolkit.googleapis.com/v1";
const SECURE_TOKEN_URL: &str = "https://securetoken.googleapis.com/v1";
/// Tokens this close to expiry are refreshed before use
const REFRESH_MARGIN_SECS: i64 = 60;

#[derive(Debug, Clone)]
struct Credentials {
    identity: Identity,
    id_token: String,
    refresh_token: String,
    expires_at: DateTime<Utc>,
}

/// Account payload returned by signIn / signUp / update
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountResponse {
    local_id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    id_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    id_token: String,
    refresh_token: String,
    expires_in: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordRequest<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

pub struct FirebaseAuth {
    http_client: HttpClient,
    api_key: String,
    identity_url: String,
    token_url: String,
    credentials: Mutex<Option<Credentials>>,
    current: watch::Sender<Option<Identity>>,
}

impl FirebaseAuth {
    pub fn new(api_key: String) -> Self {
        Self::with_endpoints(
            api_key,
            IDENTITY_TOOLKIT_URL.to_string(),
            SECURE_TOKEN_URL.to_string(),
        )
    }

    pub fn with_endpoints(api_key: String, identity_url: String, token_url: String) -> Self {
        Self {
            http_client: HttpClient::new(),
            api_key,
            identity_url,
            token_url,
            credentials: Mutex::new(None),
            current: watch::channel(None).0,
        }
    }

    fn credentials(&self) -> MutexGuard<'_, Option<Credentials>> {
        self.credentials.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn post<T: DeserializeOwned>(&self, method: &str, body: &impl Serialize) -> AppResult<T> {
        let url = format!("{}/accounts:{}", self.identity_url, method);
        let response = self
            .http_client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(map_error(status, &body));
        }

        Ok(response.json().await?)
    }

    /// Stores fresh credentials from an account response and publishes the identity
    fn establish(&self, account: AccountResponse, fallback_email: &str) -> AppResult<Identity> {
        let id_token = account
            .id_token
            .ok_or_else(|| AppError::ExternalApi("Auth response missing idToken".to_string()))?;
        let refresh_token = account.refresh_token.ok_or_else(|| {
            AppError::ExternalApi("Auth response missing refreshToken".to_string())
        })?;

        let identity = Identity {
            uid: account.local_id,
            email: account.email.unwrap_or_else(|| fallback_email.to_string()),
            display_name: account.display_name.filter(|name| !name.is_empty()),
        };

        *self.credentials() = Some(Credentials {
            identity: identity.clone(),
            id_token,
            refresh_token,
            expires_at: expiry(account.expires_in.as_deref()),
        });
        self.current.send_replace(Some(identity.clone()));
        Ok(identity)
    }

    /// Exchanges `uid`'s refresh token for a new id token
    ///
    /// The result is stored only if `uid` is still the one signed in.
    async fn refresh(&self, uid: &str, refresh_token: &str) -> AppResult<String> {
        let url = format!("{}/token", self.token_url);
        let response = self
            .http_client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(map_error(status, &body));
        }

        let refreshed: RefreshResponse = response.json().await?;
        {
            let mut guard = self.credentials();
            match guard.as_mut() {
                Some(credentials) if credentials.identity.uid == uid => {
                    credentials.id_token = refreshed.id_token.clone();
                    credentials.refresh_token = refreshed.refresh_token;
                    credentials.expires_at = expiry(Some(&refreshed.expires_in));
                }
                _ => {
                    tracing::debug!(uid = %uid, provider = "firebase", "Identity changed during refresh, token discarded");
                    return Err(AppError::SignInRequired);
                }
            }
        }

        tracing::debug!(uid = %uid, provider = "firebase", "Id token refreshed");
        Ok(refreshed.id_token)
    }
}

fn expiry(expires_in: Option<&str>) -> DateTime<Utc> {
    let secs = expires_in.and_then(|s| s.parse::<i64>().ok()).unwrap_or(3600);
    Utc::now() + Duration::seconds(secs)
}

fn map_error(status: reqwest::StatusCode, body: &str) -> AppError {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => {
            let failure = AuthFailure::from_code(&envelope.error.message);
            tracing::warn!(
                status = %status,
                code = %envelope.error.message,
                failure = ?failure,
                "Firebase auth request rejected"
            );
            AppError::Auth(failure)
        }
        Err(_) => AppError::ExternalApi(format!(
            "Firebase auth returned status {}: {}",
            status, body
        )),
    }
}

#[async_trait::async_trait]
impl AuthProvider for FirebaseAuth {
    fn current(&self) -> Option<Identity> {
        self.current.borrow().clone()
    }

    fn watch(&self) -> watch::Receiver<Option<Identity>> {
        self.current.subscribe()
    }

    async fn sign_in(&self, email: &str, password: &str) -> AppResult<Identity> {
        let account: AccountResponse = self
            .post(
                "signInWithPassword",
                &PasswordRequest {
                    email,
                    password,
                    return_secure_token: true,
                },
            )
            .await?;

        let identity = self.establish(account, email)?;
        tracing::info!(uid = %identity.uid, provider = "firebase", "Signed in");
        Ok(identity)
    }

    async fn register(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> AppResult<Identity> {
        let account: AccountResponse = self
            .post(
                "signUp",
                &PasswordRequest {
                    email,
                    password,
                    return_secure_token: true,
                },
            )
            .await?;
        let identity = self.establish(account, email)?;
        tracing::info!(uid = %identity.uid, provider = "firebase", "Account registered");

        if display_name.is_empty() {
            return Ok(identity);
        }
        self.update_display_name(display_name).await
    }

    async fn sign_out(&self) -> AppResult<()> {
        let previous = self.credentials().take();
        self.current.send_replace(None);
        if let Some(credentials) = previous {
            tracing::info!(uid = %credentials.identity.uid, provider = "firebase", "Signed out");
        }
        Ok(())
    }

    async fn update_display_name(&self, name: &str) -> AppResult<Identity> {
        let (uid, id_token, email) = {
            let guard = self.credentials();
            let credentials = guard.as_ref().ok_or(AppError::SignInRequired)?;
            (
                credentials.identity.uid.clone(),
                credentials.id_token.clone(),
                credentials.identity.email.clone(),
            )
        };

        let account: AccountResponse = self
            .post(
                "update",
                &json!({
                    "idToken": id_token,
                    "displayName": name,
                    "returnSecureToken": true,
                }),
            )
            .await?;

        if account.local_id != uid {
            return Err(AppError::ExternalApi(
                "Profile update answered for a different account".to_string(),
            ));
        }

        let identity = {
            let mut guard = self.credentials();
            let credentials = match guard.as_mut() {
                Some(credentials) if credentials.identity.uid == uid => credentials,
                _ => {
                    tracing::debug!(uid = %uid, provider = "firebase", "Identity changed during profile update, response discarded");
                    return Err(AppError::SignInRequired);
                }
            };
            credentials.identity.display_name = Some(name.to_string()).filter(|n| !n.is_empty());
            credentials.identity.email = account.email.unwrap_or(email);
            if let (Some(id_token), Some(refresh_token)) = (account.id_token, account.refresh_token) {
                credentials.id_token = id_token;
                credentials.refresh_token = refresh_token;
                credentials.expires_at = expiry(account.expires_in.as_deref());
            }
            credentials.identity.clone()
        };

        self.current.send_replace(Some(identity.clone()));
        tracing::info!(uid = %identity.uid, provider = "firebase", "Display name updated");
        Ok(identity)
    }

    async fn send_password_reset(&self, email: &str) -> AppResult<()> {
        let _: Value = self
            .post(
                "sendOobCode",
                &json!({
                    "requestType": "PASSWORD_RESET",
                    "email": email,
                }),
            )
            .await?;
        tracing::info!(provider = "firebase", "Password reset email requested");
        Ok(())
    }

    async fn id_token(&self) -> AppResult<Option<String>> {
        let (uid, token, refresh_token, expires_at) = match self.credentials().as_ref() {
            Some(c) => (
                c.identity.uid.clone(),
                c.id_token.clone(),
                c.refresh_token.clone(),
                c.expires_at,
            ),
            None => return Ok(None),
        };

        if expires_at - Utc::now() > Duration::seconds(REFRESH_MARGIN_SECS) {
            return Ok(Some(token));
        }
        self.refresh(&uid, &refresh_token).await.map(Some)
    }

    fn name(&self) -> &'static str {
        "firebase"
    }
}
