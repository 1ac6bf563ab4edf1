use axum::{
    body::Body,
    http::Request,
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::error::AppError;

/// Header carrying the authenticated user id, set by the upstream identity layer.
pub const CALLER_HEADER: &str = "x-user-id";

/// Identity of the user performing the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallerId(pub Uuid);

/// Reject requests without a well-formed caller id and expose it to the handlers.
pub async fn require_caller(mut req: Request<Body>, next: Next) -> Result<Response, AppError> {
    let raw = req
        .headers()
        .get(CALLER_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized(format!("missing `{CALLER_HEADER}` header")))?;
    let caller = Uuid::parse_str(raw.trim())
        .map_err(|_| AppError::Unauthorized(format!("malformed `{CALLER_HEADER}` header")))?;

    req.extensions_mut().insert(CallerId(caller));
    Ok(next.run(req).await)
}
