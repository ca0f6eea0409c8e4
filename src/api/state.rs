use std::sync::Arc;

use crate::{
    notify::NoticeBoard, services::CatalogProvider, session::Session, settings::SettingsStore,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub session: Arc<Session>,
    pub catalog: Arc<dyn CatalogProvider>,
    pub settings: Arc<SettingsStore>,
    pub notices: Arc<NoticeBoard>,
}

impl AppState {
    pub fn new(
        session: Arc<Session>,
        catalog: Arc<dyn CatalogProvider>,
        settings: Arc<SettingsStore>,
        notices: Arc<NoticeBoard>,
    ) -> Self {
        Self {
            session,
            catalog,
            settings,
            notices,
        }
    }
}
