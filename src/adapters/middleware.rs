use axum::{
    body::Body,
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::warn;

use crate::adapters::state::AdminSecret;

pub const ADMIN_SECRET_HEADER: &str = "X-Storage-Secret";

/// Middleware to validate the X-Storage-Secret header
pub async fn validate_storage_secret(
    State(secret): State<AdminSecret>,
    headers: HeaderMap,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Some(expected_secret) = secret.0 else {
        warn!("Maintenance route called but no admin secret is configured");
        return (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
    };

    match headers.get(ADMIN_SECRET_HEADER) {
        Some(header_value) => match header_value.to_str() {
            Ok(provided_secret) if provided_secret == &*expected_secret => next.run(request).await,
            Ok(_) => {
                warn!("Invalid secret provided in {} header", ADMIN_SECRET_HEADER);
                (StatusCode::UNAUTHORIZED, "Unauthorized").into_response()
            }
            Err(_) => {
                warn!("{} header contains invalid UTF-8", ADMIN_SECRET_HEADER);
                (StatusCode::BAD_REQUEST, "Bad request").into_response()
            }
        },
        None => {
            warn!("{} header is missing", ADMIN_SECRET_HEADER);
            (StatusCode::UNAUTHORIZED, "Unauthorized").into_response()
        }
    }
}
