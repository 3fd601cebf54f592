use axum::{extract::State, Extension, Json};
use common::errors::AuthError;
use common::models::{User, UserClaims};
use serde::{Deserialize, Serialize};

use crate::handlers::{ErrorResponse, SuccessResponse};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: User,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default = "default_role")]
    pub role: String,
}

fn default_role() -> String {
    "operator".to_string()
}

/// Authenticate with username and password, returning a JWT
#[tracing::instrument(skip(state, req), fields(username = %req.username))]
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<SuccessResponse<LoginResponse>, ErrorResponse> {
    let (token, user) = state.auth.login(&req.username, &req.password).await?;
    Ok(SuccessResponse::new(LoginResponse { token, user }))
}

/// Create a user account. Admin only.
#[tracing::instrument(skip(state, req), fields(username = %req.username))]
pub async fn create_user(
    State(state): State<AppState>,
    Extension(claims): Extension<UserClaims>,
    Json(req): Json<CreateUserRequest>,
) -> Result<SuccessResponse<User>, ErrorResponse> {
    if !claims.is_admin() {
        return Err(AuthError::InsufficientPermissions("admin".to_string()).into());
    }

    let user = state
        .auth
        .create_user(&req.username, &req.email, &req.password, &req.role)
        .await?;
    Ok(SuccessResponse::new(user))
}

/// Return the claims of the calling user
#[tracing::instrument(skip_all)]
pub async fn me(
    Extension(claims): Extension<UserClaims>,
) -> Result<SuccessResponse<UserClaims>, ErrorResponse> {
    Ok(SuccessResponse::new(claims))
}
