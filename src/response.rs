use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::learn::LearnError;
use crate::store::StoreError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub success: bool,
    pub code: String,
    pub message: String,
    pub trace_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppError {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
    pub is_operational: bool,
}

impl AppError {
    pub fn bad_request(code: &str, message: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: code.to_string(),
            message: message.to_string(),
            is_operational: true,
        }
    }

    pub fn unauthorized(message: &str) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            code: "AUTH_UNAUTHORIZED".to_string(),
            message: message.to_string(),
            is_operational: true,
        }
    }

    pub fn not_found(message: &str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            code: "NOT_FOUND".to_string(),
            message: message.to_string(),
            is_operational: true,
        }
    }

    pub fn conflict(code: &str, message: &str) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            code: code.to_string(),
            message: message.to_string(),
            is_operational: true,
        }
    }

    pub fn internal(message: &str) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "INTERNAL_ERROR".to_string(),
            message: message.to_string(),
            is_operational: false,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let exposed_message = if self.is_operational {
            self.message.clone()
        } else {
            "Internal server error".to_string()
        };

        if self.is_operational {
            tracing::warn!(status = %self.status, code = %self.code, error = %self.message, "API error");
        } else {
            tracing::error!(status = %self.status, code = %self.code, error = %self.message, "Internal API error");
        }

        (
            self.status,
            Json(ErrorBody {
                success: false,
                code: self.code,
                message: exposed_message,
                trace_id: None,
            }),
        )
            .into_response()
    }
}

// StoreError 映射：Validation -> 400，NotFound -> 404，Conflict -> 409，其余 500（消息被隐藏）
impl From<StoreError> for AppError {
    fn from(value: StoreError) -> Self {
        match &value {
            StoreError::Validation(msg) => AppError::bad_request("VALIDATION_ERROR", msg),
            StoreError::NotFound { entity, key } => {
                AppError::not_found(&format!("{entity} not found: {key}"))
            }
            StoreError::Conflict { entity, key } => {
                AppError::conflict("CONFLICT", &format!("{entity} already exists: {key}"))
            }
            _ => AppError::internal(&value.to_string()),
        }
    }
}

impl From<LearnError> for AppError {
    fn from(value: LearnError) -> Self {
        let message = value.to_string();
        match value {
            LearnError::InvalidModeConfig(_) => {
                AppError::bad_request("INVALID_MODE_CONFIG", &message)
            }
            LearnError::StaleSelection { .. } => AppError::conflict("STALE_SELECTION", &message),
            LearnError::RoundInProgress { .. } => {
                AppError::conflict("ROUND_IN_PROGRESS", &message)
            }
            LearnError::UnknownTerm(_) => AppError {
                status: StatusCode::NOT_FOUND,
                code: "UNKNOWN_TERM".to_string(),
                message,
                is_operational: true,
            },
            // Routes report round completion in the payload; reaching here is a bug.
            LearnError::EmptyPool { .. } => AppError::internal(&message),
        }
    }
}

pub fn ok<T: Serialize>(data: T) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(ApiResponse {
            success: true,
            data,
        }),
    )
}

pub fn created<T: Serialize>(data: T) -> impl IntoResponse {
    (
        StatusCode::CREATED,
        Json(ApiResponse {
            success: true,
            data,
        }),
    )
}

#[cfg(test)]
mod tests {
    use axum::body::to_bytes;
    use axum::response::IntoResponse;

    use super::*;

    async fn body_json(resp: Response) -> serde_json::Value {
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn internal_error_is_redacted() {
        let resp = AppError::internal("sled crash").into_response();
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(!text.contains("sled crash"));
        assert!(text.contains("Internal server error"));
    }

    #[tokio::test]
    async fn learn_errors_map_to_codes() {
        let cases = [
            (
                LearnError::InvalidModeConfig("x".to_string()),
                StatusCode::BAD_REQUEST,
                "INVALID_MODE_CONFIG",
            ),
            (
                LearnError::StaleSelection {
                    graded: "a".to_string(),
                    selected: None,
                },
                StatusCode::CONFLICT,
                "STALE_SELECTION",
            ),
            (
                LearnError::RoundInProgress {
                    round: 1,
                    selectable: 2,
                },
                StatusCode::CONFLICT,
                "ROUND_IN_PROGRESS",
            ),
            (
                LearnError::UnknownTerm("t".to_string()),
                StatusCode::NOT_FOUND,
                "UNKNOWN_TERM",
            ),
        ];

        for (error, status, code) in cases {
            let resp = AppError::from(error).into_response();
            assert_eq!(resp.status(), status);
            let json = body_json(resp).await;
            assert_eq!(json["code"], code);
            assert_eq!(json["success"], false);
        }
    }

    #[tokio::test]
    async fn store_not_found_is_404() {
        let err = StoreError::NotFound {
            entity: "study_set".to_string(),
            key: "s1".to_string(),
        };
        let resp = AppError::from(err).into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let json = body_json(resp).await;
        assert_eq!(json["code"], "NOT_FOUND");
    }
}
