//! Local account endpoints and request guards

use axum::{
    Json, RequestPartsExt, Router,
    extract::{FromRequestParts, State},
    http::{StatusCode, request::Parts},
    routing::post,
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};
use serde::Deserialize;

use super::error::{ApiError, ApiResult};
use crate::AppState;
use crate::services::AuthenticatedUser;
use crate::services::auth::{LoginResult, RegisterInput};

/// Header every state-changing browser request must carry
pub const CSRF_HEADER: &str = "x-requested-with";
const CSRF_HEADER_VALUE: &str = "XMLHttpRequest";

/// The caller, resolved from `Authorization: Bearer <jwt>`
#[derive(Debug, Clone)]
pub struct AuthUser(pub AuthenticatedUser);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|_| ApiError::Unauthorized("Unauthorized".to_string()))?;

        let user = state.auth.validate_access_token(bearer.token())?;
        Ok(AuthUser(user))
    }
}

/// The caller when a valid Bearer token is present; anonymous otherwise
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<AuthenticatedUser>);

impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(
            AuthUser::from_request_parts(parts, state).await.ok().map(|AuthUser(user)| user),
        ))
    }
}

/// Rejects requests without `X-Requested-With: XMLHttpRequest`
pub struct CsrfGuard;

impl<S: Send + Sync> FromRequestParts<S> for CsrfGuard {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let ok = parts
            .headers
            .get(CSRF_HEADER)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v == CSRF_HEADER_VALUE);

        if ok {
            Ok(CsrfGuard)
        } else {
            Err(ApiError::Forbidden("Missing Anti-CSRF Header".to_string()))
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    #[serde(default)]
    pub name: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<LoginResult>)> {
    let result = state
        .auth
        .register(RegisterInput {
            email: body.email,
            name: body.name,
            password: body.password,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(result)))
}

async fn login(State(state): State<AppState>, Json(body): Json<LoginRequest>) -> ApiResult<Json<LoginResult>> {
    let result = state.auth.login(&body.email, &body.password).await?;
    Ok(Json(result))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
}
