use crate::config::{self, ProviderConfig};
use crate::error::{AppError, AppResult};
use crate::handoff::HandoffRegistry;
use crate::model_registry::ModelRegistry;
use axum::Router;
use axum::http::{HeaderName, StatusCode};
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub runtime: Arc<RuntimeConfig>,
    pub models: ModelRegistry,
    pub handoffs: HandoffRegistry,
    pub http: reqwest::Client,
    pub metrics: PrometheusHandle,
}

static PROMETHEUS: OnceLock<Result<PrometheusHandle, String>> = OnceLock::new();

const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub listen: String,
    pub metrics_path: String,
    pub static_dir: PathBuf,
    pub handoff_ttl: Duration,
    pub provider: ProviderConfig,
    pub model_map: Option<String>,
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        let listen = env_non_empty("CHATRELAY_LISTEN").unwrap_or_else(|| {
            let port = env_non_empty("PORT").unwrap_or_else(|| "3000".to_string());
            format!("0.0.0.0:{port}")
        });
        let metrics_path =
            env_non_empty("CHATRELAY_METRICS_PATH").unwrap_or_else(|| "/metrics".to_string());
        let static_dir = env_non_empty("CHATRELAY_STATIC_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("public"));
        let handoff_ttl_secs = env_non_empty("CHATRELAY_HANDOFF_TTL_SECS")
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or_else(config::default_handoff_ttl_secs);
        let provider = ProviderConfig {
            base_url: env_non_empty("OPENAI_BASE_URL")
                .unwrap_or_else(|| config::DEFAULT_BASE_URL.to_string()),
            api_key: env_non_empty("OPENAI_API_KEY"),
            request_timeout_ms: env_non_empty("CHATRELAY_REQUEST_TIMEOUT_MS")
                .and_then(|v| v.parse::<u64>().ok())
                .map(|v| v.max(1))
                .unwrap_or_else(config::default_request_timeout_ms),
        };
        Self {
            listen,
            metrics_path,
            static_dir,
            handoff_ttl: Duration::from_secs(handoff_ttl_secs),
            provider,
            model_map: env_non_empty("CHATRELAY_MODEL_MAP"),
        }
    }
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

pub async fn load_state() -> AppResult<AppState> {
    load_state_with_runtime(RuntimeConfig::from_env()).await
}

pub async fn load_state_with_runtime(runtime: RuntimeConfig) -> AppResult<AppState> {
    let http = reqwest::Client::builder()
        .user_agent("chatrelay/0.1")
        .build()
        .map_err(|err| {
            AppError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "http_client_init_failed",
                err.to_string(),
            )
        })?;

    let extra_models = match runtime.model_map.as_deref() {
        Some(raw) => config::parse_model_map(raw).map_err(|err| {
            AppError::new(StatusCode::BAD_REQUEST, "model_map_invalid", err)
        })?,
        None => Vec::new(),
    };
    let models = ModelRegistry::with_entries(extra_models);

    if !runtime.provider.has_credential() {
        tracing::warn!(
            "OPENAI_API_KEY is not set. Chat endpoints will fail until the key is provided."
        );
    }

    let metrics = init_metrics()?;
    let handoffs = HandoffRegistry::new(runtime.handoff_ttl);

    Ok(AppState {
        runtime: Arc::new(runtime),
        models,
        handoffs,
        http,
        metrics,
    })
}

fn init_metrics() -> AppResult<PrometheusHandle> {
    PROMETHEUS
        .get_or_init(|| {
            metrics_exporter_prometheus::PrometheusBuilder::new()
                .install_recorder()
                .map_err(|err| err.to_string())
        })
        .clone()
        .map_err(|message| {
            AppError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "metrics_init_failed",
                message,
            )
        })
}

pub fn build_app(state: AppState) -> Router {
    let metrics_path = state.runtime.metrics_path.clone();
    let api_router = build_api_router(&metrics_path);
    Router::<AppState>::new()
        .merge(api_router.clone())
        .nest("/api", api_router)
        .fallback(crate::frontend::frontend_fallback)
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(SetRequestIdLayer::new(REQUEST_ID_HEADER, MakeRequestUuid))
        .layer(PropagateRequestIdLayer::new(REQUEST_ID_HEADER))
        .layer(TraceLayer::new_for_http())
}

fn build_api_router(metrics_path: &str) -> Router<AppState> {
    Router::new()
        .route("/chat", post(crate::handlers::chat))
        .route(
            "/chat/stream",
            post(crate::handlers::chat_stream).get(crate::handlers::subscribe_stream),
        )
        .route("/chat/stream/init", post(crate::handlers::init_stream))
        .route("/models", get(crate::handlers::list_models))
        .route("/health", get(crate::handlers::health))
        .route(metrics_path, get(crate::handlers::metrics))
}
