use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};

use crate::auth::jwt::SESSION_COOKIE;
use crate::auth::store::User;
use crate::error::ApiError;
use crate::state::AppState;

/// Extracts and fully verifies the caller's session; rejects the request
/// with 401 otherwise.
pub struct CurrentUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_or_cookie_token(&parts.headers);
        let user = state.auth.verify_token(token.as_deref()).await?;
        Ok(CurrentUser(user))
    }
}

/// Same checks as [`CurrentUser`] but never fails the request: any problem
/// with the token simply yields an anonymous caller.
pub struct MaybeUser(pub Option<User>);

#[async_trait]
impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_or_cookie_token(&parts.headers);
        Ok(MaybeUser(state.auth.optional_verify(token.as_deref()).await))
    }
}

/// The bearer header wins; the session cookie is the fallback.
fn bearer_or_cookie_token(headers: &HeaderMap) -> Option<String> {
    if let Some(auth) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    {
        if let Some(token) = auth
            .strip_prefix("Bearer ")
            .or_else(|| auth.strip_prefix("bearer "))
        {
            return Some(token.trim().to_string());
        }
    }

    headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())?
        .split(';')
        .find_map(|part| part.trim().strip_prefix(SESSION_COOKIE)?.strip_prefix('='))
        .map(|token| token.to_string())
}
