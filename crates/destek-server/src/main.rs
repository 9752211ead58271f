mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::{Query, State, WebSocketUpgrade},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use destek_api::{AppState, AppStateInner};
use destek_db::Database;
use destek_gateway::{Dispatcher, GatewayContext, connection};
use destek_types::auth::verify_token;

use crate::config::Config;

#[derive(Deserialize)]
struct WsParams {
    token: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "destek=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    let db = Arc::new(Database::open(&config.db_path)?);
    info!("Database ready at {}", config.db_path.display());

    if let Some((email, password)) = &config.admin {
        destek_api::auth::bootstrap_admin(&db, email, password)?;
    }

    let app_state: AppState = Arc::new(AppStateInner {
        db,
        jwt_secret: config.jwt_secret.clone(),
        token_ttl: config.token_ttl,
        dispatcher: Dispatcher::new(),
    });

    let ws_route = Router::new()
        .route("/ws", get(ws_upgrade))
        .with_state(app_state.gateway_context());

    let app = destek_api::router(app_state)
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Destek server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// `/ws?token=...` authenticates during the upgrade; without a token the
/// client must send `Identify` as its first frame.
async fn ws_upgrade(
    State(ctx): State<GatewayContext>,
    Query(params): Query<WsParams>,
    ws: WebSocketUpgrade,
) -> Response {
    match params.token {
        Some(token) => match verify_token(&ctx.jwt_secret, &token) {
            Some(claims) => ws
                .on_upgrade(move |socket| connection::handle_connection_authenticated(socket, ctx, claims))
                .into_response(),
            None => {
                warn!("Rejected gateway upgrade with invalid token");
                StatusCode::UNAUTHORIZED.into_response()
            }
        },
        None => ws
            .on_upgrade(move |socket| connection::handle_connection(socket, ctx))
            .into_response(),
    }
}
