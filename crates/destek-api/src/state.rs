use std::sync::Arc;

use anyhow::anyhow;
use tracing::error;

use destek_db::Database;
use destek_gateway::{Dispatcher, GatewayContext};

use crate::error::ApiError;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub jwt_secret: String,
    pub token_ttl: chrono::Duration,
    pub dispatcher: Dispatcher,
}

impl AppStateInner {
    pub fn gateway_context(&self) -> GatewayContext {
        GatewayContext {
            dispatcher: self.dispatcher.clone(),
            db: self.db.clone(),
            jwt_secret: self.jwt_secret.clone(),
        }
    }
}

/// Run a blocking database closure off the async runtime.
pub(crate) async fn run_db<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let db = state.db.clone();
    tokio::task::spawn_blocking(move || f(&db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal(anyhow!("blocking task failed"))
        })?
        .map_err(ApiError::from)
}
