use axum::{
    Json, Router,
    extract::State,
    middleware,
    routing::{get, patch, post},
};

use destek_types::api::HealthResponse;

use crate::middleware::require_auth;
use crate::state::AppState;
use crate::{auth, chat, notifications, orders, products, tickets};

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        connected_clients: state.dispatcher.connected_count().await,
    })
}

/// All REST routes under `/api`. The `/ws` upgrade is mounted by the binary.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/api/health", get(health))
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route("/api/products", get(products::list_products))
        .route("/api/products/{id}", get(products::get_product));

    let protected_routes = Router::new()
        .route("/api/auth/me", get(auth::me))
        // Tickets
        .route("/api/tickets", get(tickets::list_tickets).post(tickets::create_ticket))
        .route(
            "/api/tickets/{id}",
            get(tickets::get_ticket)
                .patch(tickets::update_ticket)
                .delete(tickets::delete_ticket),
        )
        .route(
            "/api/tickets/{id}/messages",
            get(tickets::list_messages).post(tickets::post_message),
        )
        .route("/api/tickets/{id}/messages/read", post(tickets::mark_messages_read))
        // Products
        .route("/api/products", post(products::create_product))
        .route(
            "/api/products/{id}",
            patch(products::update_product).delete(products::delete_product),
        )
        .route("/api/products/{id}/rate", post(products::rate_product))
        // Orders
        .route("/api/orders", get(orders::list_orders).post(orders::create_order))
        .route("/api/orders/{id}", get(orders::get_order))
        .route("/api/orders/{id}/status", patch(orders::update_order_status))
        // Chat
        .route("/api/chat-rooms", get(chat::list_rooms))
        .route(
            "/api/chat-rooms/{id}/messages",
            get(chat::list_messages).post(chat::post_message),
        )
        .route("/api/chat-rooms/{id}/read", post(chat::mark_read))
        // Notifications
        .route("/api/notifications", get(notifications::list_notifications))
        .route("/api/notifications/{id}/read", post(notifications::mark_read))
        .route("/api/notifications/read-all", post(notifications::mark_all_read))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
