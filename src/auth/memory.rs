use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use uuid::Uuid;

use crate::{
    auth::{AuthProvider, MIN_PASSWORD_LEN},
    error::{AppError, AppResult, AuthFailure},
    models::Identity,
};

/// Password reset emails allowed per address before requests are throttled
const RESET_LIMIT: u32 = 3;

struct Account {
    uid: String,
    password: String,
    display_name: Option<String>,
    resets_sent: u32,
}

/// In-process accounts for local runs and tests
pub struct MemoryAuth {
    accounts: Mutex<HashMap<String, Account>>,
    current: watch::Sender<Option<Identity>>,
}

impl Default for MemoryAuth {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryAuth {
    pub fn new() -> Self {
        Self {
            accounts: Mutex::new(HashMap::new()),
            current: watch::channel(None).0,
        }
    }

    fn accounts(&self) -> MutexGuard<'_, HashMap<String, Account>> {
        self.accounts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn identity(email: &str, account: &Account) -> Identity {
        Identity {
            uid: account.uid.clone(),
            email: email.to_string(),
            display_name: account.display_name.clone(),
        }
    }
}

fn normalize_email(email: &str) -> AppResult<String> {
    let email = email.trim().to_lowercase();
    if !email.contains('@') {
        return Err(AppError::InvalidInput(format!("invalid email address: {}", email)));
    }
    Ok(email)
}

#[async_trait::async_trait]
impl AuthProvider for MemoryAuth {
    fn current(&self) -> Option<Identity> {
        self.current.borrow().clone()
    }

    fn watch(&self) -> watch::Receiver<Option<Identity>> {
        self.current.subscribe()
    }

    async fn sign_in(&self, email: &str, password: &str) -> AppResult<Identity> {
        let email = normalize_email(email)?;
        let identity = {
            let accounts = self.accounts();
            let account = accounts
                .get(&email)
                .ok_or(AppError::Auth(AuthFailure::UnknownAccount))?;
            if account.password != password {
                return Err(AppError::Auth(AuthFailure::InvalidCredentials));
            }
            Self::identity(&email, account)
        };

        self.current.send_replace(Some(identity.clone()));
        tracing::info!(uid = %identity.uid, provider = "memory", "Signed in");
        Ok(identity)
    }

    async fn register(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> AppResult<Identity> {
        let email = normalize_email(email)?;
        if password.len() < MIN_PASSWORD_LEN {
            return Err(AppError::Auth(AuthFailure::WeakPassword));
        }

        let identity = {
            let mut accounts = self.accounts();
            if accounts.contains_key(&email) {
                return Err(AppError::Auth(AuthFailure::EmailInUse));
            }
            let account = Account {
                uid: Uuid::new_v4().simple().to_string(),
                password: password.to_string(),
                display_name: Some(display_name.to_string()).filter(|n| !n.is_empty()),
                resets_sent: 0,
            };
            let identity = Self::identity(&email, &account);
            accounts.insert(email, account);
            identity
        };

        self.current.send_replace(Some(identity.clone()));
        tracing::info!(uid = %identity.uid, provider = "memory", "Account registered");
        Ok(identity)
    }

    async fn sign_out(&self) -> AppResult<()> {
        if let Some(identity) = self.current.send_replace(None) {
            tracing::info!(uid = %identity.uid, provider = "memory", "Signed out");
        }
        Ok(())
    }

    async fn update_display_name(&self, name: &str) -> AppResult<Identity> {
        let current = self.current().ok_or(AppError::SignInRequired)?;
        let identity = {
            let mut accounts = self.accounts();
            let account = accounts
                .get_mut(&current.email)
                .ok_or(AppError::Auth(AuthFailure::UnknownAccount))?;
            account.display_name = Some(name.to_string());
            Self::identity(&current.email, account)
        };

        self.current.send_replace(Some(identity.clone()));
        Ok(identity)
    }

    async fn send_password_reset(&self, email: &str) -> AppResult<()> {
        let email = normalize_email(email)?;
        let mut accounts = self.accounts();
        let account = accounts
            .get_mut(&email)
            .ok_or(AppError::Auth(AuthFailure::UnknownAccount))?;
        if account.resets_sent >= RESET_LIMIT {
            return Err(AppError::Auth(AuthFailure::TooManyRequests));
        }
        account.resets_sent += 1;
        tracing::info!(email = %email, provider = "memory", "Password reset email sent");
        Ok(())
    }

    async fn id_token(&self) -> AppResult<Option<String>> {
        Ok(self.current().map(|identity| format!("memory-token-{}", identity.uid)))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
