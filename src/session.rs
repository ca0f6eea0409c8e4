//! The running client session
//!
//! One `Session` owns the favorites state for whoever is signed in. It
//! follows the auth provider's identity changes, opens and closes the
//! favorites subscription accordingly and turns remote failures into notices.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::task::JoinHandle;

use crate::{
    auth::AuthProvider,
    error::{AppError, AppResult},
    favorites::{toggle_favorite, FavoriteIndex, FavoriteSync, ToggleOutcome},
    models::{FavoriteRecord, Identity, LooseMovie, MovieKey, SupportRequest},
    notify::Notifier,
    services::submit_support_message,
    store::DocumentStore,
};

const TOGGLE_FAILED_NOTICE: &str = "Could not update your favorites. Please try again.";
const SUPPORT_FAILED_NOTICE: &str = "Could not send your message. Please try again.";

pub struct Session {
    auth: Arc<dyn AuthProvider>,
    store: Arc<dyn DocumentStore>,
    index: Arc<FavoriteIndex>,
    sync: Arc<FavoriteSync>,
    notifier: Arc<dyn Notifier>,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    pub fn new(
        auth: Arc<dyn AuthProvider>,
        store: Arc<dyn DocumentStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let index = Arc::new(FavoriteIndex::new());
        let sync = Arc::new(FavoriteSync::new(
            store.clone(),
            index.clone(),
            notifier.clone(),
        ));

        Self {
            auth,
            store,
            index,
            sync,
            notifier,
            watcher: Mutex::new(None),
        }
    }

    /// Binds the favorites subscription to the auth provider's identity
    ///
    /// Must be called inside a Tokio runtime. Calling it again replaces the
    /// previous watcher.
    pub fn start(&self) {
        let mut identities = self.auth.watch();
        let sync = self.sync.clone();
        let auth = self.auth.clone();
        sync.follow_current(auth.as_ref());

        // announcements only wake the watcher; the identity is re-read under the sync lock
        let watcher = tokio::spawn(async move {
            while identities.changed().await.is_ok() {
                sync.follow_current(auth.as_ref());
            }
            tracing::debug!("Identity watcher stopped");
        });

        let previous = self
            .watcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(watcher);
        if let Some(previous) = previous {
            previous.abort();
        }
        tracing::info!(auth = self.auth.name(), store = self.store.name(), "Session started");
    }

    /// Stops following identity changes and closes the subscription
    pub fn shutdown(&self) {
        if let Some(watcher) = self
            .watcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            watcher.abort();
        }
        self.sync.stop();
    }

    pub fn identity(&self) -> Option<Identity> {
        self.auth.current()
    }

    fn require_identity(&self) -> AppResult<Identity> {
        self.auth.current().ok_or(AppError::SignInRequired)
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> AppResult<Identity> {
        let identity = self.auth.sign_in(email, password).await?;
        self.sync.follow_current(self.auth.as_ref());
        Ok(identity)
    }

    pub async fn register(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> AppResult<Identity> {
        let identity = self
            .auth
            .register(email, password, display_name.trim())
            .await?;
        self.sync.follow_current(self.auth.as_ref());
        Ok(identity)
    }

    pub async fn sign_out(&self) -> AppResult<()> {
        self.auth.sign_out().await?;
        self.sync.follow_current(self.auth.as_ref());
        Ok(())
    }

    pub async fn update_display_name(&self, name: &str) -> AppResult<Identity> {
        self.require_identity()?;
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::InvalidInput(
                "Display name cannot be empty".to_string(),
            ));
        }

        let identity = self.auth.update_display_name(name).await?;
        self.notifier.info("Profile updated");
        Ok(identity)
    }

    /// Sends a reset email to `email`, or to the signed-in user's address
    pub async fn send_password_reset(&self, email: Option<&str>) -> AppResult<()> {
        let email = match email.map(str::trim).filter(|e| !e.is_empty()) {
            Some(email) => email.to_string(),
            None => self.require_identity()?.email,
        };

        self.auth.send_password_reset(&email).await?;
        self.notifier.info("Password reset email sent");
        Ok(())
    }

    pub fn is_favorite(&self, key: &MovieKey) -> bool {
        self.index.is_favorite(key)
    }

    /// True while a toggle of `key` waits for its snapshot
    pub fn is_pending(&self, key: &MovieKey) -> bool {
        self.index.is_pending(key)
    }

    pub fn favorites(&self) -> Vec<FavoriteRecord> {
        self.index.list()
    }

    /// Toggles one favorite for the identity signed in at call time
    pub async fn toggle_favorite(&self, movie: LooseMovie) -> AppResult<ToggleOutcome> {
        let identity = self.require_identity()?;
        self.sync.follow_current(self.auth.as_ref());

        match toggle_favorite(self.store.as_ref(), &self.index, &identity, movie).await {
            Err(err) if err.is_transient() => {
                self.notifier.error(TOGGLE_FAILED_NOTICE);
                Err(err)
            }
            result => result,
        }
    }

    pub async fn submit_support(&self, request: SupportRequest) -> AppResult<String> {
        let identity = self.require_identity()?;

        match submit_support_message(self.store.as_ref(), &identity, request).await {
            Ok(id) => {
                self.notifier.info("Message sent. We will get back to you soon");
                Ok(id)
            }
            Err(err) => {
                if err.is_transient() {
                    self.notifier.error(SUPPORT_FAILED_NOTICE);
                }
                Err(err)
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(watcher) = self
            .watcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            watcher.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{MemoryAuth, MockAuthProvider};
    use crate::notify::{NoticeBoard, NoticeLevel};
    use crate::store::{MemoryStore, MockDocumentStore};
    use futures_util::StreamExt;
    use serde_json::json;
    use std::time::Duration;

    struct Fixture {
        auth: Arc<MemoryAuth>,
        store: MemoryStore,
        notices: Arc<NoticeBoard>,
        session: Session,
    }

    fn fixture() -> Fixture {
        let auth = Arc::new(MemoryAuth::new());
        let store = MemoryStore::new();
        let notices = Arc::new(NoticeBoard::default());
        let session = Session::new(auth.clone(), Arc::new(store.clone()), notices.clone());
        session.start();
        Fixture {
            auth,
            store,
            notices,
            session,
        }
    }

    fn inception() -> LooseMovie {
        serde_json::from_value(json!({
            "movieId": 27205,
            "title": "Inception",
            "release_date": "2010-07-16",
            "vote_average": 8.3
        }))
        .unwrap()
    }

    async fn eventually(check: impl Fn() -> bool) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !check() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition never became true");
    }

    #[tokio::test]
    async fn test_toggle_round_trip() {
        let f = fixture();
        f.session
            .register("ana@example.com", "secret123", "Ana")
            .await
            .unwrap();
        let key = MovieKey::new(27205);

        let added = f.session.toggle_favorite(inception()).await.unwrap();
        assert_eq!(added, ToggleOutcome::Added);
        eventually(|| f.session.is_favorite(&key)).await;
        assert!(!f.session.is_pending(&key));

        let removed = f.session.toggle_favorite(inception()).await.unwrap();
        assert_eq!(removed, ToggleOutcome::Removed);
        eventually(|| !f.session.is_favorite(&key)).await;
    }

    #[tokio::test]
    async fn test_unauthenticated_toggle_writes_nothing() {
        let f = fixture();
        let result = f.session.toggle_favorite(inception()).await;
        assert!(matches!(result, Err(AppError::SignInRequired)));
        assert_eq!(f.store.write_count(), 0);
        assert!(f.notices.is_empty());
    }

    #[tokio::test]
    async fn test_sign_out_empties_favorites_at_once() {
        let f = fixture();
        f.session
            .register("ana@example.com", "secret123", "Ana")
            .await
            .unwrap();
        f.session.toggle_favorite(inception()).await.unwrap();
        eventually(|| !f.session.favorites().is_empty()).await;

        f.session.sign_out().await.unwrap();
        assert!(f.session.favorites().is_empty());
    }

    #[tokio::test]
    async fn test_follows_identity_changed_outside_session() {
        let f = fixture();
        f.store
            .set("users/u-other/favorites", "603", json!({"movieId": 603}))
            .await
            .unwrap();
        let identity = f
            .auth
            .register("ana@example.com", "secret123", "Ana")
            .await
            .unwrap();
        f.store
            .set(&identity.favorites_collection(), "603", json!({"movieId": 603}))
            .await
            .unwrap();

        eventually(|| f.session.is_favorite(&MovieKey::new(603))).await;

        f.auth.sign_out().await.unwrap();
        eventually(|| f.session.favorites().is_empty()).await;
    }

    #[tokio::test]
    async fn test_failed_toggle_reports_notice() {
        let f = fixture();
        f.session
            .register("ana@example.com", "secret123", "Ana")
            .await
            .unwrap();
        f.store.set_unavailable(true);

        let result = f.session.toggle_favorite(inception()).await;
        assert!(matches!(result, Err(AppError::Store(_))));
        let notices = f.notices.take_pending();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].level, NoticeLevel::Error);
        assert!(!f.session.is_pending(&MovieKey::new(27205)));
    }

    #[tokio::test]
    async fn test_profile_and_password_reset() {
        let f = fixture();
        assert!(matches!(
            f.session.send_password_reset(None).await,
            Err(AppError::SignInRequired)
        ));

        f.session
            .register("ana@example.com", "secret123", "Ana")
            .await
            .unwrap();
        assert!(matches!(
            f.session.update_display_name("   ").await,
            Err(AppError::InvalidInput(_))
        ));

        let identity = f.session.update_display_name(" Ana Maria ").await.unwrap();
        assert_eq!(identity.display_name.as_deref(), Some("Ana Maria"));
        f.session.send_password_reset(None).await.unwrap();
        assert_eq!(f.notices.take_pending().len(), 2);
    }

    #[tokio::test]
    async fn test_support_requires_identity() {
        let f = fixture();
        let request = SupportRequest {
            subject: None,
            message: "hello".to_string(),
        };
        assert!(matches!(
            f.session.submit_support(request.clone()).await,
            Err(AppError::SignInRequired)
        ));

        f.session
            .register("ana@example.com", "secret123", "Ana")
            .await
            .unwrap();
        f.session.submit_support(request).await.unwrap();
        assert_eq!(f.store.documents("messages").len(), 1);
    }

    #[tokio::test]
    async fn test_toggle_uses_identity_captured_at_call_time() {
        let identity = Identity {
            uid: "u1".to_string(),
            email: "ana@example.com".to_string(),
            display_name: None,
        };
        let (tx, rx) = tokio::sync::watch::channel(Some(identity.clone()));

        let mut auth = MockAuthProvider::new();
        auth.expect_current().returning(move || Some(identity.clone()));
        auth.expect_watch().returning(move || rx.clone());
        auth.expect_name().return_const("mock");

        let mut store = MockDocumentStore::new();
        store
            .expect_subscribe()
            .returning(|_| futures_util::stream::pending().boxed());
        store
            .expect_set()
            .withf(|collection, _, _| collection.to_string() == "users/u1/favorites")
            .times(1)
            .returning(|_, _, _| Ok(()));
        store.expect_name().return_const("mock");

        let session = Session::new(
            Arc::new(auth),
            Arc::new(store),
            Arc::new(NoticeBoard::default()),
        );
        session.start();
        session.toggle_favorite(inception()).await.unwrap();
        drop(tx);
    }

    #[tokio::test]
    async fn test_watcher_follows_current_identity_not_announcement() {
        let announced = Identity {
            uid: "u1".to_string(),
            email: "ana@example.com".to_string(),
            display_name: None,
        };
        let (tx, rx) = tokio::sync::watch::channel(None);

        // the announced user has already signed out by the time the watcher runs
        let mut auth = MockAuthProvider::new();
        auth.expect_current().returning(|| None);
        auth.expect_watch().returning(move || rx.clone());
        auth.expect_name().return_const("mock");

        let mut store = MockDocumentStore::new();
        store.expect_subscribe().never();
        store.expect_name().return_const("mock");

        let session = Session::new(
            Arc::new(auth),
            Arc::new(store),
            Arc::new(NoticeBoard::default()),
        );
        session.start();

        tx.send_replace(Some(announced));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(session.sync.active_uid(), None);
        assert!(session.favorites().is_empty());
    }
}
