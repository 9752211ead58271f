use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use tracing::info;
use uuid::Uuid;

use destek_db::{Database, NewUser};
use destek_types::api::{AuthResponse, LoginRequest, RegisterRequest};
use destek_types::auth::{Claims, issue_token};
use destek_types::models::{Role, User};

use crate::error::ApiError;
use crate::extract::ValidJson;
use crate::state::{AppState, run_db};

/// Hash a password with Argon2id.
pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?
        .to_string();
    Ok(hash)
}

fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok())
        .unwrap_or(false)
}

/// Create the configured admin account unless the email is already taken.
pub fn bootstrap_admin(db: &Database, email: &str, password: &str) -> anyhow::Result<()> {
    let password_hash = hash_password(password)?;
    let created = db.create_user(&NewUser {
        id: Uuid::new_v4(),
        email,
        name: "Administrator",
        role: Role::Admin,
        password_hash: &password_hash,
    })?;

    match created {
        Some(user) => info!("Bootstrap admin {} created", user.email),
        None => info!("Bootstrap admin {} already exists", email),
    }
    Ok(())
}

fn token_for(state: &AppState, user: &User) -> Result<String, ApiError> {
    Ok(issue_token(&state.jwt_secret, user.id, &user.email, user.role, state.token_ttl)?)
}

pub async fn register(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let role = req.role.unwrap_or(Role::Customer);
    if role.is_admin() {
        return Err(ApiError::Forbidden("Admin accounts cannot self-register"));
    }

    let user = run_db(&state, move |db| {
        let password_hash = hash_password(&req.password)?;
        db.create_user(&NewUser {
            id: Uuid::new_v4(),
            email: req.email.trim(),
            name: req.name.trim(),
            role,
            password_hash: &password_hash,
        })
    })
    .await?
    .ok_or_else(|| ApiError::Conflict("Email already registered".into()))?;

    let token = token_for(&state, &user)?;
    info!("Registered {} ({}) as {}", user.email, user.id, user.role);

    Ok((StatusCode::CREATED, Json(AuthResponse { user, token })))
}

pub async fn login(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let user = run_db(&state, move |db| {
        let Some(row) = db.get_user_by_email(req.email.trim())? else {
            return Ok(None);
        };
        Ok(verify_password(&req.password, &row.password_hash).then_some(row.user))
    })
    .await?
    .ok_or(ApiError::InvalidCredentials)?;

    let token = token_for(&state, &user)?;
    Ok(Json(AuthResponse { user, token }))
}

pub async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<User>, ApiError> {
    let user = run_db(&state, move |db| db.get_user(claims.sub))
        .await?
        .ok_or(ApiError::NotFound("User"))?;
    Ok(Json(user))
}
