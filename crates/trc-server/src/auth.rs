//! Bearer authentication for the HTTP API.

use crate::error::ApiError;
use crate::AppState;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

/// The identity resolved from the caller's API key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Owning organization.
    pub org_id: String,
    /// Acting user.
    pub user_id: String,
    /// Billing plan id.
    pub billing_plan: String,
}

/// Extract the bearer token from an `Authorization` header value.
pub fn bearer_token(header: Option<&str>) -> Option<&str> {
    header?.strip_prefix("Bearer ").map(str::trim)
}

/// Middleware: resolve `Authorization: Bearer <api_key>` and stash the
/// [`Identity`] as a request extension. 401 on failure; no state change.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let header = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    let Some(token) = bearer_token(header) else {
        return Err(ApiError::unauthorized("missing bearer token"));
    };
    let Some(key) = state.store.resolve_api_key(token).await? else {
        return Err(ApiError::unauthorized("unknown API key"));
    };
    req.extensions_mut().insert(Identity {
        org_id: key.org_id,
        user_id: key.user_id,
        billing_plan: key.billing_plan,
    });
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_token_parses() {
        assert_eq!(bearer_token(Some("Bearer sk-1")), Some("sk-1"));
        assert_eq!(bearer_token(Some("Bearer  sk-1 ")), Some("sk-1"));
        assert_eq!(bearer_token(Some("Basic xyz")), None);
        assert_eq!(bearer_token(None), None);
    }
}
