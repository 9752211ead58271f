use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use destek_gateway::Audience;
use destek_types::api::{ChatMessageQuery, PostMessageRequest, UpdatedCount};
use destek_types::auth::Claims;
use destek_types::events::GatewayEvent;
use destek_types::models::{ChatMessage, ChatRoom, NotificationKind};

use crate::error::ApiError;
use crate::extract::{ApiPath, ApiQuery, ValidJson};
use crate::notifications::notify;
use crate::state::{AppState, run_db};
use crate::tickets::preview;

const MAX_PAGE: u32 = 200;

async fn load_room(state: &AppState, claims: &Claims, id: Uuid) -> Result<ChatRoom, ApiError> {
    let room = run_db(state, move |db| db.get_chat_room(id))
        .await?
        .ok_or(ApiError::NotFound("Chat room"))?;
    if !claims.is_admin() && !room.is_participant(claims.sub) {
        return Err(ApiError::Forbidden("Not a participant of this chat"));
    }
    Ok(room)
}

pub async fn list_rooms(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<ChatRoom>>, ApiError> {
    let participant = (!claims.is_admin()).then_some(claims.sub);
    let rooms = run_db(&state, move |db| db.list_chat_rooms(participant)).await?;
    Ok(Json(rooms))
}

pub async fn list_messages(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(id): ApiPath<Uuid>,
    ApiQuery(query): ApiQuery<ChatMessageQuery>,
) -> Result<Json<Vec<ChatMessage>>, ApiError> {
    load_room(&state, &claims, id).await?;

    let limit = query.limit.clamp(1, MAX_PAGE);
    let messages = run_db(&state, move |db| db.list_chat_messages(id, limit, query.before)).await?;
    Ok(Json(messages))
}

pub async fn post_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(id): ApiPath<Uuid>,
    ValidJson(req): ValidJson<PostMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let room = load_room(&state, &claims, id).await?;

    let sender_id = claims.sub;
    let message = run_db(&state, move |db| db.insert_chat_message(id, sender_id, &req.content))
        .await?
        .ok_or(ApiError::NotFound("Chat room"))?;

    state
        .dispatcher
        .publish(
            Audience::Users(vec![room.buyer_id, room.seller_id]),
            GatewayEvent::ChatMessageCreated { message: message.clone() },
        )
        .await;

    for recipient in [room.buyer_id, room.seller_id] {
        if recipient != sender_id {
            notify(
                &state,
                recipient,
                NotificationKind::ChatMessage,
                "New chat message".into(),
                preview(&message.content),
            )
            .await;
        }
    }

    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<UpdatedCount>, ApiError> {
    load_room(&state, &claims, id).await?;
    let reader_id = claims.sub;
    let updated = run_db(&state, move |db| db.mark_chat_read(id, reader_id)).await?;
    Ok(Json(UpdatedCount { updated }))
}
