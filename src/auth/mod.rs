//! Authentication collaborator
//!
//! Owns the signed-in identity and publishes every sign-in, sign-out and
//! profile change on a watch channel. The rest of the crate only reads
//! identities through this trait.

use tokio::sync::watch;

use crate::{error::AppResult, models::Identity};

pub mod firebase;
pub mod memory;

pub use firebase::FirebaseAuth;
pub use memory::MemoryAuth;

/// Minimum password length accepted on registration
pub const MIN_PASSWORD_LEN: usize = 6;

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait AuthProvider: Send + Sync {
    /// Currently signed-in identity, if any
    fn current(&self) -> Option<Identity>;

    /// Change notifications for the current identity
    fn watch(&self) -> watch::Receiver<Option<Identity>>;

    async fn sign_in(&self, email: &str, password: &str) -> AppResult<Identity>;

    /// Creates an account, signs it in and sets its display name
    async fn register(&self, email: &str, password: &str, display_name: &str)
        -> AppResult<Identity>;

    async fn sign_out(&self) -> AppResult<()>;

    /// Updates the signed-in user's display name and republishes the identity
    async fn update_display_name(&self, name: &str) -> AppResult<Identity>;

    async fn send_password_reset(&self, email: &str) -> AppResult<()>;

    /// Bearer token for the signed-in user, for backends enforcing per-user rules
    async fn id_token(&self) -> AppResult<Option<String>>;

    /// Provider name for logging
    fn name(&self) -> &'static str;
}
