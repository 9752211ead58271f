use axum::{Extension, Json, extract::State};
use tracing::warn;
use uuid::Uuid;

use destek_types::api::{NotificationQuery, UpdatedCount};
use destek_types::auth::Claims;
use destek_types::events::GatewayEvent;
use destek_types::models::{Notification, NotificationKind};

use crate::error::ApiError;
use crate::extract::{ApiPath, ApiQuery};
use crate::state::{AppState, run_db};

/// Store a notification and push it to the user if they are connected.
/// The triggering mutation has already committed, so failures are only logged.
pub(crate) async fn notify(
    state: &AppState,
    user_id: Uuid,
    kind: NotificationKind,
    title: String,
    message: String,
) {
    match run_db(state, move |db| db.insert_notification(user_id, kind, &title, &message)).await {
        Ok(notification) => {
            state
                .dispatcher
                .send_to_user(user_id, GatewayEvent::NotificationCreated { notification })
                .await;
        }
        Err(e) => warn!("Failed to store {} notification for {}: {}", kind, user_id, e),
    }
}

pub async fn list_notifications(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiQuery(query): ApiQuery<NotificationQuery>,
) -> Result<Json<Vec<Notification>>, ApiError> {
    let notifications = run_db(&state, move |db| db.list_notifications(claims.sub, query.unread)).await?;
    Ok(Json(notifications))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<UpdatedCount>, ApiError> {
    let found = run_db(&state, move |db| db.mark_notification_read(id, claims.sub)).await?;
    if !found {
        return Err(ApiError::NotFound("Notification"));
    }
    Ok(Json(UpdatedCount { updated: 1 }))
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<UpdatedCount>, ApiError> {
    let updated = run_db(&state, move |db| db.mark_all_notifications_read(claims.sub)).await?;
    Ok(Json(UpdatedCount { updated }))
}
