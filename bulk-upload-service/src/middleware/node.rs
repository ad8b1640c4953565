//! Node and user context extractors.
//!
//! The gateway authenticates the caller and forwards the acting node and
//! user as `X-Node-ID`/`X-User-ID` headers; this service trusts them the
//! way the rest of the platform's internal services do.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use platform_core::error::AppError;
use std::str::FromStr;
use uuid::Uuid;

/// The company node acting in this request.
#[derive(Debug, Clone, Copy)]
pub struct NodeContext(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for NodeContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get("X-Node-ID")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::AuthError(anyhow::anyhow!("Missing X-Node-ID header")))?;

        let node_id = Uuid::from_str(raw)
            .map_err(|_| AppError::AuthError(anyhow::anyhow!("Invalid X-Node-ID header")))?;

        tracing::Span::current().record("node_id", raw);

        Ok(NodeContext(node_id))
    }
}

/// The user acting in this request; recorded on invitations.
#[derive(Debug, Clone)]
pub struct UserContext(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for UserContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get("X-User-ID")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::AuthError(anyhow::anyhow!("Missing X-User-ID header")))?;

        tracing::Span::current().record("user_id", user_id);

        Ok(UserContext(user_id.to_string()))
    }
}
