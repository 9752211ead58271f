use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;
use uuid::Uuid;

use destek_db::{NewTicket, PostTicketMessage, TicketPatch};
use destek_gateway::Audience;
use destek_types::api::{
    CreateTicketRequest, PostMessageRequest, TicketDetail, TicketQuery, UpdateTicketRequest,
    UpdatedCount,
};
use destek_types::auth::Claims;
use destek_types::events::GatewayEvent;
use destek_types::models::{NotificationKind, Ticket, TicketMessage};

use crate::error::ApiError;
use crate::extract::{ApiPath, ApiQuery, ValidJson};
use crate::middleware::ensure_admin;
use crate::notifications::notify;
use crate::state::{AppState, run_db};

/// Owners see their own tickets; admins see everything.
fn ensure_can_view(claims: &Claims, ticket: &Ticket) -> Result<(), ApiError> {
    if claims.is_admin() || ticket.user_id == claims.sub {
        Ok(())
    } else {
        Err(ApiError::Forbidden("Not your ticket"))
    }
}

async fn load_ticket(state: &AppState, claims: &Claims, id: Uuid) -> Result<Ticket, ApiError> {
    let ticket = run_db(state, move |db| db.get_ticket(id))
        .await?
        .ok_or(ApiError::NotFound("Ticket"))?;
    ensure_can_view(claims, &ticket)?;
    Ok(ticket)
}

pub async fn list_tickets(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiQuery(query): ApiQuery<TicketQuery>,
) -> Result<Json<Vec<Ticket>>, ApiError> {
    let owner = (!claims.is_admin()).then_some(claims.sub);
    let tickets = run_db(&state, move |db| db.list_tickets(owner, &query)).await?;
    Ok(Json(tickets))
}

pub async fn create_ticket(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ValidJson(req): ValidJson<CreateTicketRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims.sub;
    let ticket = run_db(&state, move |db| {
        db.insert_ticket(&NewTicket {
            id: Uuid::new_v4(),
            user_id,
            subject: req.subject.trim(),
            body: &req.body,
            priority: req.priority.unwrap_or_default(),
            category: req.category.as_deref(),
        })
    })
    .await?;

    info!("{} opened ticket {}", claims.email, ticket.reference);
    state
        .dispatcher
        .publish(Audience::Admins, GatewayEvent::TicketCreated { ticket: ticket.clone() })
        .await;

    Ok((StatusCode::CREATED, Json(ticket)))
}

pub async fn get_ticket(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<TicketDetail>, ApiError> {
    let ticket = load_ticket(&state, &claims, id).await?;
    let messages = run_db(&state, move |db| db.list_ticket_messages(id)).await?;
    Ok(Json(TicketDetail { ticket, messages }))
}

pub async fn update_ticket(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(id): ApiPath<Uuid>,
    ValidJson(req): ValidJson<UpdateTicketRequest>,
) -> Result<Json<Ticket>, ApiError> {
    if req.is_empty() {
        return Err(ApiError::BadRequest("Nothing to update".into()));
    }

    let before = load_ticket(&state, &claims, id).await?;
    if !claims.is_admin() && !req.is_close_only() {
        return Err(ApiError::Forbidden("Only admins can change this field"));
    }

    if let Some(Some(assignee)) = req.assigned_to {
        let user = run_db(&state, move |db| db.get_user(assignee)).await?;
        if !user.is_some_and(|u| u.role.is_admin()) {
            return Err(ApiError::BadRequest("assignedTo must be an admin".into()));
        }
    }

    let patch = TicketPatch {
        status: req.status,
        priority: req.priority,
        category: req.category,
        assigned_to: req.assigned_to,
    };
    let ticket = run_db(&state, move |db| db.update_ticket(id, &patch))
        .await?
        .ok_or(ApiError::NotFound("Ticket"))?;

    publish_ticket_update(&state, &ticket).await;

    if claims.sub != ticket.user_id {
        notify(
            &state,
            ticket.user_id,
            NotificationKind::TicketUpdate,
            format!("Ticket {} updated", ticket.reference),
            format!("Status: {}, priority: {}", ticket.status, ticket.priority),
        )
        .await;
    }

    if let Some(assignee) = ticket.assigned_to {
        if before.assigned_to != Some(assignee) && assignee != claims.sub {
            notify(
                &state,
                assignee,
                NotificationKind::TicketUpdate,
                format!("Ticket {} assigned to you", ticket.reference),
                ticket.subject.clone(),
            )
            .await;
        }
    }

    Ok(Json(ticket))
}

pub async fn delete_ticket(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<StatusCode, ApiError> {
    ensure_admin(&claims)?;

    let deleted = run_db(&state, move |db| db.delete_ticket(id)).await?;
    if !deleted {
        return Err(ApiError::NotFound("Ticket"));
    }

    info!("{} deleted ticket {}", claims.email, id);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_messages(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Vec<TicketMessage>>, ApiError> {
    load_ticket(&state, &claims, id).await?;
    let messages = run_db(&state, move |db| db.list_ticket_messages(id)).await?;
    Ok(Json(messages))
}

pub async fn post_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(id): ApiPath<Uuid>,
    ValidJson(req): ValidJson<PostMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    load_ticket(&state, &claims, id).await?;

    let sender_id = claims.sub;
    let is_admin = claims.is_admin();
    let outcome = run_db(&state, move |db| {
        db.insert_ticket_message(id, sender_id, &req.content, is_admin)
    })
    .await?;

    let (message, ticket, previous_status) = match outcome {
        PostTicketMessage::Posted { message, ticket, previous_status } => (message, ticket, previous_status),
        PostTicketMessage::NotFound => return Err(ApiError::NotFound("Ticket")),
        PostTicketMessage::Closed => return Err(ApiError::BadRequest("Ticket is closed".into())),
    };

    state
        .dispatcher
        .publish(
            Audience::UserAndAdmins(ticket.user_id),
            GatewayEvent::TicketMessageCreated { message: message.clone() },
        )
        .await;

    if ticket.status != previous_status {
        publish_ticket_update(&state, &ticket).await;
    }

    if is_admin && sender_id != ticket.user_id {
        notify(
            &state,
            ticket.user_id,
            NotificationKind::TicketReply,
            format!("New reply on {}", ticket.reference),
            preview(&message.content),
        )
        .await;
    } else if let Some(assignee) = ticket.assigned_to.filter(|a| *a != sender_id) {
        notify(
            &state,
            assignee,
            NotificationKind::TicketReply,
            format!("Customer replied on {}", ticket.reference),
            preview(&message.content),
        )
        .await;
    }

    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn mark_messages_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<UpdatedCount>, ApiError> {
    load_ticket(&state, &claims, id).await?;
    let reader_is_admin = claims.is_admin();
    let updated = run_db(&state, move |db| db.mark_ticket_messages_read(id, reader_is_admin)).await?;
    Ok(Json(UpdatedCount { updated }))
}

async fn publish_ticket_update(state: &AppState, ticket: &Ticket) {
    state
        .dispatcher
        .publish(
            Audience::UserAndAdmins(ticket.user_id),
            GatewayEvent::TicketUpdated { ticket: ticket.clone() },
        )
        .await;
}

/// First 80 characters of a message body, for notification text.
pub(crate) fn preview(content: &str) -> String {
    const MAX: usize = 80;
    if content.chars().count() <= MAX {
        content.to_string()
    } else {
        let cut: String = content.chars().take(MAX).collect();
        format!("{cut}…")
    }
}
