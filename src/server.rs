use crate::config::ProxyConfig;
use crate::error::{ProxyError, Result};
use crate::logging::SharedLogger;
use crate::providers::Provider;
use crate::proxy::{self, FrameStream};
use crate::translate::chat_types::Role;
use crate::validate::{validate_chat_request, ANTHROPIC_ROLES, OPENAI_ROLES};

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub const ANTHROPIC_ROUTE: &str = "/api/chat-anthropic";
pub const OPENAI_ROUTE: &str = "/api/chat-openai";

const CORS_ALLOW_METHODS: &str = "POST, OPTIONS";
const CORS_ALLOW_HEADERS: &str = "Content-Type, Authorization";

/// Everything a handler needs, resolved once at startup.
#[derive(Clone)]
pub struct AppState {
    pub config: ProxyConfig,
    pub anthropic_key: String,
    pub openai_key: Option<String>,
    pub client: reqwest::Client,
    pub logger: SharedLogger,
}

impl AppState {
    /// Build state with explicit credentials. The Anthropic key is mandatory.
    pub fn new(
        config: ProxyConfig,
        anthropic_key: impl Into<String>,
        openai_key: Option<String>,
        client: reqwest::Client,
        logger: SharedLogger,
    ) -> Result<Self> {
        let anthropic_key = anthropic_key.into();
        if anthropic_key.is_empty() {
            return Err(ProxyError::config("Anthropic API key is empty"));
        }

        Ok(Self {
            config,
            anthropic_key,
            openai_key: openai_key.filter(|k| !k.is_empty()),
            client,
            logger,
        })
    }

    /// Build state with credentials read from the environment variables the
    /// config names.
    pub fn from_config(
        config: ProxyConfig,
        client: reqwest::Client,
        logger: SharedLogger,
    ) -> Result<Self> {
        let anthropic_key = config.resolve_anthropic_key()?;
        let openai_key = config.resolve_openai_key();
        Self::new(config, anthropic_key, openai_key, client, logger)
    }

    fn anthropic_roles(&self) -> &'static [Role] {
        if self.config.anthropic.accept_system_role {
            OPENAI_ROLES
        } else {
            ANTHROPIC_ROLES
        }
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    let openai = Router::new()
        .route(OPENAI_ROUTE, post(handle_openai))
        .layer(cors);

    Router::new()
        .route(ANTHROPIC_ROUTE, post(handle_anthropic))
        .route("/health", get(handle_health))
        .merge(openai)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn handle_anthropic(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let log = state.logger.for_request(Provider::Anthropic);

    let req = match validate_chat_request(&body, state.anthropic_roles()) {
        Ok(r) => r,
        Err(e) => {
            log.warn("validate", format!("Rejected request: {}", e));
            return e.into_response();
        }
    };

    log.info(
        "server",
        format!(
            "Request: messages={} temperature={:?} max_tokens={:?}",
            req.messages.len(),
            req.temperature,
            req.max_tokens
        ),
    );

    match proxy::stream_anthropic(
        &req,
        &state.config.anthropic,
        &state.anthropic_key,
        &state.client,
        &log,
    )
    .await
    {
        Ok(frames) => sse_response(frames),
        Err(e @ ProxyError::Validation { .. }) => {
            log.warn("validate", format!("Rejected request: {}", e));
            e.into_response()
        }
        Err(e) => {
            log.error("server", format!("Streaming setup error: {}", e));
            e.into_response()
        }
    }
}

async fn handle_openai(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let log = state.logger.for_request(Provider::OpenAi);

    let Some(api_key) = state.openai_key.as_deref() else {
        log.error(
            "server",
            format!(
                "Rejected request: '{}' was not set at startup",
                state.config.openai.api_key_env
            ),
        );
        return with_cors(ProxyError::config("OpenAI API key not configured").into_response());
    };

    let req = match validate_chat_request(&body, OPENAI_ROLES) {
        Ok(r) => r,
        Err(e) => {
            log.warn("validate", format!("Rejected request: {}", e));
            return with_cors(e.into_response());
        }
    };

    log.info(
        "server",
        format!(
            "Request: messages={} temperature={:?}",
            req.messages.len(),
            req.temperature
        ),
    );

    match proxy::stream_openai(&req, &state.config.openai, api_key, &state.client, &log).await {
        Ok(frames) => with_cors(sse_response(frames)),
        Err(e) => {
            log.error("server", format!("Streaming setup error: {}", e));
            with_cors(e.into_response())
        }
    }
}

async fn handle_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

fn sse_response(frames: FrameStream) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache, no-transform")
        .body(Body::from_stream(frames))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

/// The CORS layer sets the origin header; the allowed methods and headers are
/// repeated on every response, not only on preflight.
fn with_cors(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(CORS_ALLOW_METHODS),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(CORS_ALLOW_HEADERS),
    );
    response
}
