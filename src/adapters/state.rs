use axum::extract::FromRef;
use std::sync::Arc;

use crate::application::services::CloudUuidStorageService;

/// Shared secret for the maintenance routes. `None` locks them entirely.
#[derive(Clone, Debug, Default)]
pub struct AdminSecret(pub Option<Arc<str>>);

#[derive(Clone, FromRef)]
pub struct AppState {
    pub storage_service: Arc<CloudUuidStorageService>,
    pub admin_secret: AdminSecret,
}
