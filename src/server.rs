//! HTTP surface: the static page, a liveness probe and the generate endpoint.

use crate::{
    chef::Chef,
    exec_ctx::ExecCtx,
    transform::{fallback_response, transform, ErrorBody},
};
use axum::{
    extract::{rejection::JsonRejection, MatchedPath, State},
    http::{Request, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::Span;

const INDEX_HTML: &str = include_str!("../static/index.html");

/// Application state shared across all handlers.
#[derive(Debug)]
pub struct AppState {
    pub ctx: ExecCtx,
    pub chef: Chef,
}

pub type SharedState = Arc<AppState>;

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    #[serde(default)]
    pub leftovers: Option<String>,
}

/// Build the application router.
pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/healthz", get(healthz))
        .route("/api/generate", post(generate))
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<_>| {
                    let matched_path = request
                        .extensions()
                        .get::<MatchedPath>()
                        .map(MatchedPath::as_str)
                        .unwrap_or(request.uri().path());

                    if matched_path == "/healthz" {
                        tracing::trace_span!("http_request")
                    } else {
                        tracing::info_span!(
                            "http_request",
                            method = %request.method(),
                            path = %matched_path,
                        )
                    }
                })
                .on_request(|_request: &Request<_>, _span: &Span| {})
                .on_response(
                    |response: &axum::http::Response<_>, latency: Duration, span: &Span| {
                        if span.metadata().map(|m| m.level()) == Some(&tracing::Level::TRACE) {
                            return;
                        }
                        tracing::info!(
                            status = %response.status().as_u16(),
                            latency_ms = %latency.as_millis(),
                            "request completed"
                        );
                    },
                ),
        )
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn healthz() -> &'static str {
    "ok"
}

/// `POST /api/generate`
///
/// Pipeline failures still answer 200 with the fallback recipe, which is what
/// the page expects; the failing stage is logged. A body that is not a JSON
/// object with a string `leftovers` keeps axum's status but gets an
/// `{"error": ...}` body like every other client error.
async fn generate(
    State(state): State<SharedState>,
    request: std::result::Result<Json<GenerateRequest>, JsonRejection>,
) -> Response {
    let request = match request {
        Ok(Json(request)) => request,
        Err(rejection) => {
            tracing::warn!(error = %rejection.body_text(), "rejected generate request");
            return (rejection.status(), Json(ErrorBody::new(rejection.body_text())))
                .into_response();
        }
    };

    let leftovers = request.leftovers.unwrap_or_default();
    if leftovers.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorBody::new("Please provide leftovers")),
        )
            .into_response();
    }

    tracing::info!(%leftovers, "chef is thinking");

    let outputs = match state.chef.run(&state.ctx, &leftovers).await {
        Ok(outputs) => outputs,
        Err(e) => {
            tracing::error!(
                stage = e.stage().unwrap_or("unknown"),
                error = %e,
                "pipeline failed"
            );
            return Json(fallback_response()).into_response();
        }
    };

    match transform(
        outputs.diet.as_deref(),
        outputs.shopping.as_deref(),
        outputs.recipe.as_deref(),
    ) {
        Ok(recipe) => Json(recipe).into_response(),
        Err(e) => match e.client_body() {
            Some(body) => {
                tracing::warn!(error = %e, "branch output is not JSON");
                Json(body).into_response()
            }
            None => {
                tracing::error!(error = %e, "branch output has an unexpected shape");
                Json(fallback_response()).into_response()
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;
    use crate::chef::tests::{ctx_for, happy_mock};
    use crate::chef::ChefConfig;
    use axum::body::Body;
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn app(mock: MockBackend) -> Router {
        let state = AppState {
            ctx: ctx_for(Arc::new(mock)),
            chef: Chef::new(ChefConfig::default()).unwrap(),
        };
        router(Arc::new(state))
    }

    async fn post_generate(app: Router, body: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/generate")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_empty_leftovers_rejected() {
        for body in [r#"{"leftovers": ""}"#, "{}"] {
            let mock = MockBackend::new();
            let (status, json) = post_generate(app(mock), body).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(json, json!({"error": "Please provide leftovers"}));
        }
    }

    #[tokio::test]
    async fn test_malformed_body_gets_error_object() {
        let (status, json) = post_generate(app(MockBackend::new()), r#"{"leftovers": 5}"#).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(json["error"].as_str().is_some_and(|e| e.contains("leftovers")));

        let (status, json) = post_generate(app(MockBackend::new()), "{not json").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].is_string());
    }

    #[tokio::test]
    async fn test_missing_content_type_gets_error_object() {
        let response = app(MockBackend::new())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/generate")
                    .body(Body::from(r#"{"leftovers": "2 eggs"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json: Value = serde_json::from_slice(&bytes).unwrap();
        assert!(json["error"].is_string());
    }

    #[tokio::test]
    async fn test_empty_leftovers_never_reach_the_model() {
        let mock = Arc::new(MockBackend::new());
        let state = AppState {
            ctx: ctx_for(mock.clone()),
            chef: Chef::new(ChefConfig::default()).unwrap(),
        };
        let (status, _) = post_generate(router(Arc::new(state)), "{}").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(mock.requests().is_empty());
    }

    #[tokio::test]
    async fn test_generate_success() {
        let (status, json) =
            post_generate(app(happy_mock()), r#"{"leftovers": "2 eggs, old bread"}"#).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            json,
            json!({
                "recipe_name": "Toast",
                "missing_ingredients": ["butter"],
                "steps": ["Toast bread"],
                "nutrition": [{"name": "Protein", "amount": "20g", "daily_value": "36%"}]
            })
        );
    }

    #[tokio::test]
    async fn test_pipeline_failure_returns_fallback() {
        let mock = happy_mock().fail("RecipeThinker", 400);
        let (status, json) = post_generate(app(mock), r#"{"leftovers": "2 eggs"}"#).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            json,
            json!({
                "recipe_name": "Error generating recipe",
                "missing_ingredients": [],
                "steps": ["Could not generate recipe. Please try again."],
                "nutrition": []
            })
        );
    }

    #[tokio::test]
    async fn test_healthz_and_index() {
        let response = app(MockBackend::new())
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"ok");

        let response = app(MockBackend::new())
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert!(String::from_utf8_lossy(&bytes).contains("/api/generate"));
    }
}
