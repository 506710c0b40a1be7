pub mod articles;
pub mod auth;
pub mod preferences;

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::header,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::auth::hash_token;
use crate::db::Database;
use crate::error::ApiError;

pub struct AppState {
    pub db: Arc<Database>,
    /// Include reset tokens in forgot-password responses
    pub expose_reset_tokens: bool,
}

/// The caller resolved from a bearer token by [`require_auth`].
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: i64,
    pub email: String,
}

pub fn router(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .route("/logout", post(auth::logout))
        .route(
            "/user/preferences",
            get(preferences::show)
                .put(preferences::update)
                .post(preferences::update)
                .delete(preferences::reset),
        )
        .route(
            "/user/preferences/reset",
            post(preferences::reset).delete(preferences::reset),
        )
        .route("/user/feed", get(preferences::feed))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/health", get(health))
        .route("/articles", get(articles::index))
        .route("/articles/:id", get(articles::show))
        .route("/user/register", post(auth::register))
        .route("/user/login", post(auth::login))
        .route("/user/forgot-password", post(auth::forgot_password))
        .route("/user/reset-password", post(auth::reset_password))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let digest = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(hash_token)
        .ok_or(ApiError::Unauthorized)?;

    let user = state
        .db
        .find_user_by_token(&digest)
        .await?
        .ok_or(ApiError::Unauthorized)?;

    req.extensions_mut().insert(AuthUser {
        id: user.id,
        email: user.email,
    });

    Ok(next.run(req).await)
}

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_health_endpoint() {
        let (app, _db) = create_test_app().await;

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_protected_route_without_token() {
        let (app, _db) = create_test_app().await;

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/user/preferences")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_protected_route_with_unknown_token() {
        let (app, _db) = create_test_app().await;

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/user/feed")
                    .header(header::AUTHORIZATION, "Bearer not-a-real-token")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_valid_token_reaches_handler() {
        let (app, db) = create_test_app().await;
        let user_id = db
            .create_user("Jane", "jane@example.com", "hash")
            .await
            .unwrap();
        db.create_token(user_id, &hash_token("secret-token"))
            .await
            .unwrap();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/user/preferences")
                    .header(header::AUTHORIZATION, "Bearer secret-token")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }
}
