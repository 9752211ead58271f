use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;
use uuid::Uuid;

use destek_db::{OrderActor, OrderScope, PlaceOrder, StatusChange};
use destek_gateway::Audience;
use destek_types::api::{CreateOrderRequest, PlaceOrderResponse, UpdateOrderStatusRequest};
use destek_types::auth::Claims;
use destek_types::events::GatewayEvent;
use destek_types::models::{NotificationKind, Order};

use crate::error::ApiError;
use crate::extract::{ApiPath, ValidJson};
use crate::notifications::notify;
use crate::state::{AppState, run_db};

async fn load_order(state: &AppState, claims: &Claims, id: Uuid) -> Result<Order, ApiError> {
    let order = run_db(state, move |db| db.get_order(id))
        .await?
        .ok_or(ApiError::NotFound("Order"))?;
    if !claims.is_admin() && !order.involves(claims.sub) {
        return Err(ApiError::Forbidden("Not your order"));
    }
    Ok(order)
}

pub async fn create_order(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ValidJson(req): ValidJson<CreateOrderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let buyer_id = claims.sub;
    let outcome = run_db(&state, move |db| db.place_order(buyer_id, req.product_id, req.quantity)).await?;

    let (order, chat_room, remaining_stock) = match outcome {
        PlaceOrder::Placed { order, chat_room, remaining_stock } => (order, chat_room, remaining_stock),
        PlaceOrder::ProductNotFound => return Err(ApiError::NotFound("Product")),
        PlaceOrder::OwnProduct => {
            return Err(ApiError::BadRequest("You cannot order your own product".into()));
        }
        PlaceOrder::InsufficientStock { available } => {
            return Err(ApiError::Conflict(format!("Only {} left in stock", available)));
        }
    };

    info!("{} placed order {} for {} x {}", claims.email, order.id, order.quantity, order.product_id);

    state
        .dispatcher
        .publish(Audience::User(order.seller_id), GatewayEvent::OrderCreated { order: order.clone() })
        .await;
    state.dispatcher.broadcast(GatewayEvent::ProductStockChanged {
        product_id: order.product_id,
        stock: remaining_stock,
    });
    notify(
        &state,
        order.seller_id,
        NotificationKind::OrderUpdate,
        "New order".into(),
        format!("{} unit(s) ordered, total {:.2}", order.quantity, order.total_price),
    )
    .await;

    Ok((StatusCode::CREATED, Json(PlaceOrderResponse { order, chat_room })))
}

pub async fn list_orders(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<Order>>, ApiError> {
    let scope = if claims.is_admin() {
        OrderScope::All
    } else {
        OrderScope::Party(claims.sub)
    };
    let orders = run_db(&state, move |db| db.list_orders(scope)).await?;
    Ok(Json(orders))
}

pub async fn get_order(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Order>, ApiError> {
    Ok(Json(load_order(&state, &claims, id).await?))
}

pub async fn update_order_status(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(id): ApiPath<Uuid>,
    ValidJson(req): ValidJson<UpdateOrderStatusRequest>,
) -> Result<Json<Order>, ApiError> {
    load_order(&state, &claims, id).await?;
    let next = req.status;
    let actor = if claims.is_admin() {
        OrderActor::Admin
    } else {
        OrderActor::User(claims.sub)
    };

    let (order, restocked) = match run_db(&state, move |db| db.update_order_status(id, actor, next)).await? {
        StatusChange::Updated { order, restocked } => (order, restocked),
        StatusChange::NotFound => return Err(ApiError::NotFound("Order")),
        StatusChange::Forbidden => {
            return Err(ApiError::Forbidden("Buyers can only cancel pending orders"));
        }
        StatusChange::Invalid { from } => {
            return Err(ApiError::BadRequest(format!("Cannot move order from {} to {}", from, next)));
        }
    };

    info!("{} moved order {} to {}", claims.email, order.id, order.status);

    state
        .dispatcher
        .publish(
            Audience::Users(vec![order.buyer_id, order.seller_id]),
            GatewayEvent::OrderUpdated { order: order.clone() },
        )
        .await;

    if let Some(stock) = restocked {
        state.dispatcher.broadcast(GatewayEvent::ProductStockChanged {
            product_id: order.product_id,
            stock,
        });
    }

    for party in [order.buyer_id, order.seller_id] {
        if party != claims.sub {
            notify(
                &state,
                party,
                NotificationKind::OrderUpdate,
                format!("Order {}", order.status),
                format!("Order {} is now {}", order.id, order.status),
            )
            .await;
        }
    }

    Ok(Json(order))
}
