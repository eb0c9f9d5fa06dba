use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;

use crate::response::AppError;

/// Header set by the upstream gateway after it has authenticated the caller.
pub const USER_ID_HEADER: &str = "x-user-id";

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
}

/// 用户 ID 会拼进 sled key，禁止分隔符和控制字符
fn is_valid_user_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 128
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b == b'.')
}

pub fn extract_user_id(headers: &HeaderMap) -> Result<String, AppError> {
    let raw = headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .ok_or_else(|| AppError::unauthorized("Missing x-user-id header"))?;

    if !is_valid_user_id(raw) {
        return Err(AppError::unauthorized("Invalid x-user-id header"));
    }
    Ok(raw.to_string())
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = extract_user_id(&parts.headers)?;
        Ok(AuthUser { user_id })
    }
}
