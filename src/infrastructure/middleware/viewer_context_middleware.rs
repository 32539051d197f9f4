// ViewerContext Middleware - verifies the bearer token and injects the viewer into request extensions

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::infrastructure::database::{Collection, DocumentDatabase};
use crate::infrastructure::security::TokenService;
use crate::infrastructure::viewer::ViewerContext;

/// Application state the middleware needs to resolve a viewer.
pub trait HasIdentity {
    fn token_service(&self) -> &TokenService;
    fn document_store(&self) -> &Arc<dyn DocumentDatabase>;
}

/// No Authorization header yields an anonymous viewer. A header that is present but invalid,
/// expired, or names a user that no longer exists is rejected with 401.
pub async fn viewer_context_middleware<T>(
    State(app_state): State<T>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError>
where
    T: HasIdentity + Clone + Send + Sync + 'static,
{
    let request_id = format!("req-{}", Uuid::new_v4());
    let token = bearer_token(request.headers())?;

    let viewer = match token {
        None => ViewerContext::anonymous(request_id),
        Some(token) => {
            let user_id = app_state.token_service().verify(&token)?;
            if app_state
                .document_store()
                .get(Collection::Users, &user_id)
                .await?
                .is_none()
            {
                warn!("Token for unknown user {} rejected ({})", user_id, request_id);
                return Err(AppError::Unauthorized("User not found".to_string()));
            }
            ViewerContext::authenticated(user_id, request_id)
        }
    };

    request.extensions_mut().insert(Arc::new(viewer));
    Ok(next.run(request).await)
}

fn bearer_token(headers: &HeaderMap) -> AppResult<Option<String>> {
    let Some(header) = headers.get(AUTHORIZATION) else {
        return Ok(None);
    };
    let value = header
        .to_str()
        .map_err(|_| AppError::Unauthorized("Malformed Authorization header".to_string()))?;

    match value.strip_prefix("Bearer ") {
        Some(token) if !token.trim().is_empty() => Ok(Some(token.trim().to_string())),
        _ => Err(AppError::Unauthorized(
            "Authorization header must be 'Bearer <token>'".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer_token_extraction() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers).unwrap(), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def.ghi"));
        assert_eq!(bearer_token(&headers).unwrap().as_deref(), Some("abc.def.ghi"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic dXNlcg=="));
        assert!(matches!(bearer_token(&headers), Err(AppError::Unauthorized(_))));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert!(bearer_token(&headers).is_err());
    }
}
