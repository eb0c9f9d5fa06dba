use axum::body::Body;
use axum::extract::Request;
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use http_body_util::{BodyExt, Limited};
use tracing::Instrument;

use crate::auth::USER_ID_HEADER;
use crate::response::ErrorBody;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Error bodies larger than this are passed through untouched.
const MAX_ERROR_BODY: usize = 64 * 1024;

/// Id of the current request, available to handlers as an extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub String);

impl RequestId {
    /// Reuses a well-formed client id, otherwise mints a new one.
    fn from_request(req: &Request) -> Self {
        let id = req
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|s| is_valid_request_id(s))
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        Self(id)
    }
}

pub async fn request_id_middleware(mut req: Request, next: Next) -> Response {
    let request_id = RequestId::from_request(&req);
    let user_id = req
        .headers()
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string();
    let span = tracing::info_span!(
        "request",
        request_id = %request_id.0,
        user_id = %user_id,
        method = %req.method(),
        path = %req.uri().path(),
    );
    req.extensions_mut().insert(request_id.clone());

    let start = std::time::Instant::now();
    let mut response = next.run(req).instrument(span.clone()).await;

    let status = response.status();
    span.in_scope(|| {
        let latency_ms = start.elapsed().as_millis() as u64;
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), latency_ms, "request failed");
        } else {
            tracing::info!(status = status.as_u16(), latency_ms, "request completed");
        }
    });

    if let Ok(value) = HeaderValue::from_str(&request_id.0) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    if status.is_client_error() || status.is_server_error() {
        attach_trace_id(response, &request_id.0).await
    } else {
        response
    }
}

/// JSON error bodies get a `traceId` field; plain-text rejections from axum
/// (unknown route, wrong method) are rewritten into the JSON error shape.
async fn attach_trace_id(response: Response, request_id: &str) -> Response {
    let (parts, body) = response.into_parts();
    let bytes = match Limited::new(body, MAX_ERROR_BODY).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(_) => return Response::from_parts(parts, Body::empty()),
    };

    if let Ok(serde_json::Value::Object(mut obj)) = serde_json::from_slice(&bytes) {
        obj.insert(
            "traceId".to_string(),
            serde_json::Value::String(request_id.to_string()),
        );
        let patched = serde_json::to_vec(&obj).unwrap_or_else(|_| bytes.to_vec());
        let mut response = Response::from_parts(parts, Body::from(patched));
        response.headers_mut().remove(axum::http::header::CONTENT_LENGTH);
        return response;
    }

    let status = parts.status;
    let text = String::from_utf8_lossy(&bytes).trim().to_string();
    let message = if text.is_empty() {
        status.canonical_reason().unwrap_or("Error").to_string()
    } else {
        text
    };
    let mut wrapped = (
        status,
        axum::Json(ErrorBody {
            success: false,
            code: error_code_for_status(status).to_string(),
            message,
            trace_id: Some(request_id.to_string()),
        }),
    )
        .into_response();
    if let Some(value) = parts.headers.get(REQUEST_ID_HEADER) {
        wrapped.headers_mut().insert(REQUEST_ID_HEADER, value.clone());
    }
    wrapped
}

fn error_code_for_status(status: StatusCode) -> &'static str {
    match status {
        StatusCode::BAD_REQUEST => "BAD_REQUEST",
        StatusCode::UNAUTHORIZED => "AUTH_UNAUTHORIZED",
        StatusCode::NOT_FOUND => "NOT_FOUND",
        StatusCode::METHOD_NOT_ALLOWED => "METHOD_NOT_ALLOWED",
        StatusCode::CONFLICT => "CONFLICT",
        StatusCode::PAYLOAD_TOO_LARGE => "PAYLOAD_TOO_LARGE",
        StatusCode::UNSUPPORTED_MEDIA_TYPE | StatusCode::UNPROCESSABLE_ENTITY => {
            "INVALID_REQUEST_BODY"
        }
        s if s.is_client_error() => "BAD_REQUEST",
        _ => "INTERNAL_ERROR",
    }
}

/// 客户端传入的 x-request-id 最长 128，仅允许字母数字、`-`、`_`
fn is_valid_request_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 128
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}
