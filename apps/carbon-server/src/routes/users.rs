use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};

use crate::auth::{check_new_password, hash_password, require_admin, verify_password, AuthUser};
use crate::error::{internal_error, AppError, AppResult};
use crate::input::JsonBody;
use crate::state::AppState;
use crate::store::StoreError;

const INVALID_LOGIN: &str = "Invalid login credentials.";
const RESET_REQUESTED: &str =
    "If an account exists for that email, a password reset link has been sent.";
const INVALID_RESET: &str = "Invalid or expired reset token.";

#[derive(Debug, Clone, Default, serde::Deserialize, utoipa::ToSchema)]
pub(crate) struct CredentialsRequest {
    username: Option<String>,
    password: Option<String>,
}

impl CredentialsRequest {
    /// Lowercased email plus the password exactly as typed.
    fn into_parts(self) -> AppResult<(String, String)> {
        let username = self
            .username
            .map(|value| value.trim().to_lowercase())
            .filter(|value| !value.is_empty());
        let password = self.password.filter(|value| !value.is_empty());
        match (username, password) {
            (Some(username), Some(password)) => Ok((username, password)),
            _ => Err(AppError::bad_request("Username and password are required.")),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, utoipa::ToSchema)]
pub(crate) struct MessageResponse {
    message: String,
}

impl MessageResponse {
    fn new(message: &str) -> Json<Self> {
        Json(Self {
            message: message.to_string(),
        })
    }
}

#[derive(Debug, Clone, serde::Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LoginResponse {
    message: String,
    token: String,
    user_id: String,
}

#[derive(Debug, Clone, Default, serde::Deserialize, utoipa::ToSchema)]
pub(crate) struct ForgotPasswordRequest {
    email: Option<String>,
}

#[derive(Debug, Clone, Default, serde::Deserialize, utoipa::ToSchema)]
pub(crate) struct ResetPasswordRequest {
    token: Option<String>,
    password: Option<String>,
}

#[utoipa::path(
    post,
    path = "/users/register",
    tag = "users",
    request_body = CredentialsRequest,
    responses(
        (status = 201, description = "User registered", body = MessageResponse),
        (status = 400, description = "Missing fields, short password or email in use"),
        (status = 401, description = "Missing or invalid token"),
        (status = 403, description = "Caller is not the administrator")
    ),
    security(("HTTPBearer" = []))
)]
pub(crate) async fn register(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    JsonBody(payload): JsonBody<CredentialsRequest>,
) -> AppResult<(StatusCode, Json<MessageResponse>)> {
    require_admin(&user, &state.config.admin_email)?;
    let (email, password) = payload.into_parts()?;
    check_new_password(&password).map_err(AppError::bad_request)?;

    if state.store.find_user_by_email(&email).await?.is_some() {
        return Err(AppError::bad_request("Email already in use"));
    }
    let password_hash = hash_password(&password).map_err(internal_error)?;
    let created = match state.store.insert_user(&email, &password_hash).await {
        Ok(created) => created,
        Err(StoreError::Conflict(_)) => return Err(AppError::bad_request("Email already in use")),
        Err(err) => return Err(err.into()),
    };

    tracing::info!(user_id = %created.id, email = %created.email, "registered user");
    Ok((
        StatusCode::CREATED,
        MessageResponse::new("User registered successfully."),
    ))
}

#[utoipa::path(
    post,
    path = "/users/login",
    tag = "users",
    request_body = CredentialsRequest,
    responses(
        (status = 200, description = "Bearer token", body = LoginResponse),
        (status = 400, description = "Missing username or password"),
        (status = 401, description = "Invalid credentials")
    )
)]
pub(crate) async fn login(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<CredentialsRequest>,
) -> AppResult<Json<LoginResponse>> {
    let (email, password) = payload.into_parts()?;
    let Some(user) = state.store.find_user_by_email(&email).await? else {
        return Err(AppError::unauthorized(INVALID_LOGIN));
    };
    if !verify_password(&password, &user.password_hash) {
        tracing::debug!(user_id = %user.id, "password mismatch");
        return Err(AppError::unauthorized(INVALID_LOGIN));
    }

    let token = state.auth.issue_session(user.id).await;
    Ok(Json(LoginResponse {
        message: "Login successful.".to_string(),
        token,
        user_id: user.id.to_string(),
    }))
}

#[utoipa::path(
    post,
    path = "/users/forgot-password",
    tag = "users",
    request_body = ForgotPasswordRequest,
    responses(
        (status = 200, description = "Same answer whether or not the account exists", body = MessageResponse),
        (status = 400, description = "Email missing")
    )
)]
pub(crate) async fn forgot_password(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<ForgotPasswordRequest>,
) -> AppResult<Json<MessageResponse>> {
    let email = payload
        .email
        .map(|value| value.trim().to_lowercase())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| AppError::bad_request("Email is required."))?;

    match state.store.find_user_by_email(&email).await {
        Ok(Some(user)) => {
            let token = state.auth.issue_reset(user.id).await;
            deliver_reset_link(&email, &state.config.reset_link(&token));
        }
        Ok(None) => tracing::debug!("password reset requested for unknown account"),
        // The caller must not learn whether the lookup happened.
        Err(err) => tracing::error!(error = %err, "password reset lookup failed"),
    }
    Ok(MessageResponse::new(RESET_REQUESTED))
}

/// Hands the reset link to the outbound channel. Only the link target is
/// logged; the token stays out of the logs.
fn deliver_reset_link(email: &str, link: &url::Url) {
    let mut target = link.clone();
    target.set_query(None);
    tracing::info!(email, target = %target, "password reset link issued");
}

#[utoipa::path(
    post,
    path = "/users/reset-password",
    tag = "users",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = MessageResponse),
        (status = 400, description = "Missing fields, short password, or unknown/expired token")
    )
)]
pub(crate) async fn reset_password(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<ResetPasswordRequest>,
) -> AppResult<Json<MessageResponse>> {
    let token = payload
        .token
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty());
    let (Some(token), Some(password)) = (token, payload.password) else {
        return Err(AppError::bad_request("Token and password are required."));
    };
    check_new_password(&password).map_err(AppError::bad_request)?;

    let user_id = state
        .auth
        .redeem_reset(&token)
        .await
        .ok_or_else(|| AppError::bad_request(INVALID_RESET))?;
    let password_hash = hash_password(&password).map_err(internal_error)?;
    if !state
        .store
        .update_user_password(user_id, &password_hash)
        .await?
    {
        return Err(AppError::bad_request(INVALID_RESET));
    }

    tracing::info!(user_id = %user_id, "password reset completed");
    Ok(MessageResponse::new("Password has been reset successfully."))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users/register", post(register))
        .route("/users/login", post(login))
        .route("/users/forgot-password", post(forgot_password))
        .route("/users/reset-password", post(reset_password))
}
