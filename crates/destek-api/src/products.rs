use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;
use uuid::Uuid;

use destek_db::DeleteProduct;
use destek_types::api::{CreateProductRequest, ProductQuery, RateProductRequest, UpdateProductRequest};
use destek_types::auth::Claims;
use destek_types::events::GatewayEvent;
use destek_types::models::Product;

use crate::error::ApiError;
use crate::extract::{ApiPath, ApiQuery, ValidJson};
use crate::state::{AppState, run_db};

async fn load_owned_product(state: &AppState, claims: &Claims, id: Uuid) -> Result<Product, ApiError> {
    let product = run_db(state, move |db| db.get_product(id))
        .await?
        .ok_or(ApiError::NotFound("Product"))?;
    if !claims.is_admin() && product.seller_id != claims.sub {
        return Err(ApiError::Forbidden("Not your product"));
    }
    Ok(product)
}

pub async fn list_products(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ProductQuery>,
) -> Result<Json<Vec<Product>>, ApiError> {
    if let (Some(min), Some(max)) = (query.min_price, query.max_price) {
        if min > max {
            return Err(ApiError::BadRequest("minPrice is greater than maxPrice".into()));
        }
    }

    let products = run_db(&state, move |db| db.list_products(&query)).await?;
    Ok(Json(products))
}

pub async fn get_product(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Product>, ApiError> {
    let product = run_db(&state, move |db| db.get_product(id))
        .await?
        .ok_or(ApiError::NotFound("Product"))?;
    Ok(Json(product))
}

pub async fn create_product(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ValidJson(req): ValidJson<CreateProductRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if !claims.role.can_sell() {
        return Err(ApiError::Forbidden("Only sellers can list products"));
    }

    let seller_id = claims.sub;
    let product = run_db(&state, move |db| db.insert_product(Uuid::new_v4(), seller_id, &req)).await?;

    info!("{} listed product {} ({})", claims.email, product.name, product.id);
    Ok((StatusCode::CREATED, Json(product)))
}

pub async fn update_product(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(id): ApiPath<Uuid>,
    ValidJson(req): ValidJson<UpdateProductRequest>,
) -> Result<Json<Product>, ApiError> {
    let before = load_owned_product(&state, &claims, id).await?;

    let product = run_db(&state, move |db| db.update_product(id, &req))
        .await?
        .ok_or(ApiError::NotFound("Product"))?;

    if product.stock != before.stock {
        state.dispatcher.broadcast(GatewayEvent::ProductStockChanged {
            product_id: product.id,
            stock: product.stock,
        });
    }

    Ok(Json(product))
}

pub async fn delete_product(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<StatusCode, ApiError> {
    load_owned_product(&state, &claims, id).await?;

    match run_db(&state, move |db| db.delete_product(id)).await? {
        DeleteProduct::Deleted => {
            info!("{} deleted product {}", claims.email, id);
            Ok(StatusCode::NO_CONTENT)
        }
        DeleteProduct::NotFound => Err(ApiError::NotFound("Product")),
        DeleteProduct::HasOrders => Err(ApiError::Conflict("Product has orders and cannot be deleted".into())),
    }
}

pub async fn rate_product(
    State(state): State<AppState>,
    Extension(_claims): Extension<Claims>,
    ApiPath(id): ApiPath<Uuid>,
    ValidJson(req): ValidJson<RateProductRequest>,
) -> Result<Json<Product>, ApiError> {
    let product = run_db(&state, move |db| db.rate_product(id, req.stars))
        .await?
        .ok_or(ApiError::NotFound("Product"))?;
    Ok(Json(product))
}
