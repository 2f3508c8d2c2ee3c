//! Acting user extraction
//!
//! Authentication happens upstream; the gateway forwards the verified user
//! id in the `X-Actor-Id` header. Handlers only need to know who is acting.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::error::ApiError;

pub const ACTOR_ID_HEADER: &str = "x-actor-id";

/// Employee or investor performing the request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActorId(pub Uuid);

/// Extractor for the acting user
///
/// ```rust,ignore
/// async fn invest(ActorId(investor_id): ActorId) -> impl IntoResponse {
///     format!("Hello, investor {}", investor_id)
/// }
/// ```
#[async_trait]
impl<S> FromRequestParts<S> for ActorId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(ACTOR_ID_HEADER)
            .ok_or_else(|| ApiError::Unauthorized("X-Actor-Id header required".to_string()))?;

        let actor = raw
            .to_str()
            .ok()
            .and_then(|value| Uuid::parse_str(value.trim()).ok())
            .ok_or_else(|| ApiError::Unauthorized("X-Actor-Id must be a UUID".to_string()))?;

        Ok(ActorId(actor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(header: Option<&str>) -> Result<ActorId, ApiError> {
        let mut builder = Request::builder().uri("/");
        if let Some(value) = header {
            builder = builder.header(ACTOR_ID_HEADER, value);
        }
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        ActorId::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn test_valid_header() {
        let id = Uuid::new_v4();
        assert_eq!(extract(Some(&id.to_string())).await.unwrap(), ActorId(id));
    }

    #[tokio::test]
    async fn test_missing_or_malformed_header_is_unauthorized() {
        assert!(matches!(extract(None).await, Err(ApiError::Unauthorized(_))));
        assert!(matches!(
            extract(Some("not-a-uuid")).await,
            Err(ApiError::Unauthorized(_))
        ));
    }
}
