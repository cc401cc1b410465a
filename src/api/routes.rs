//! HTTP route handlers.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{Html, Json},
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::agent::{render_report_html, render_task, sanitize_report, Agent};
use crate::config::Config;
use crate::llm::OpenAiCompatClient;
use crate::models::{all_models, default_model, find_model};
use crate::session::{Credentials, SessionError, SessionStore};
use crate::tools::{ToolInfo, ToolRegistry};

use super::types::*;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    /// Live sessions and their credentials
    pub sessions: Arc<SessionStore>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let sessions = Arc::new(SessionStore::new(config.session_ttl));
        Self { config, sessions }
    }
}

/// Build the router.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/health", get(health))
        .route("/api/models", get(list_models))
        .route("/api/tools", get(list_tools))
        .route("/api/session", post(create_session))
        .route("/api/session/:id", axum::routing::delete(delete_session))
        .route(
            "/api/session/:id/credentials",
            get(get_credentials).put(update_credentials),
        )
        .route("/api/session/:id/query", post(run_query))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let state = Arc::new(AppState::new(config.clone()));
    Arc::clone(&state.sessions).start_cleanup_task();

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on {}", addr);

    // Setup graceful shutdown on SIGTERM/SIGINT
    let shutdown_state = Arc::clone(&state);
    axum::serve(listener, app(state))
        .with_graceful_shutdown(async move {
            shutdown_signal(shutdown_state).await;
        })
        .await?;

    Ok(())
}

/// Wait for a shutdown signal.
async fn shutdown_signal(state: Arc<AppState>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!(
        "Shutdown signal received, dropping {} sessions",
        state.sessions.len()
    );
}

fn session_status(e: &SessionError) -> StatusCode {
    match e {
        SessionError::NotFound(_) => StatusCode::NOT_FOUND,
        SessionError::Busy(_) => StatusCode::CONFLICT,
    }
}

/// The research form.
async fn index() -> Html<&'static str> {
    Html(include_str!("index.html"))
}

/// Health check endpoint.
async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        active_sessions: state.sessions.len(),
        max_iterations: state.config.max_iterations,
    })
}

/// The model registry, default first.
async fn list_models() -> Json<Vec<ModelInfo>> {
    let default_label = default_model().label;
    Json(
        all_models()
            .iter()
            .map(|m| ModelInfo::new(m, m.label == default_label))
            .collect(),
    )
}

/// Tools available to the agent.
async fn list_tools(State(state): State<Arc<AppState>>) -> Json<Vec<ToolInfo>> {
    Json(ToolRegistry::for_session(&state.config.tools, &Credentials::new()).list_tools())
}

async fn create_session(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<CreateSessionResponse>) {
    let session_id = state.sessions.create();
    (StatusCode::CREATED, Json(CreateSessionResponse { session_id }))
}

async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, (StatusCode, String)> {
    if state.sessions.remove(id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err((
            StatusCode::NOT_FOUND,
            SessionError::NotFound(id).to_string(),
        ))
    }
}

async fn get_credentials(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<CredentialsResponse>, (StatusCode, String)> {
    let configured = state
        .sessions
        .configured(id)
        .map_err(|e| (session_status(&e), e.to_string()))?;
    Ok(Json(CredentialsResponse { configured }))
}

async fn update_credentials(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateCredentialsRequest>,
) -> Result<Json<CredentialsResponse>, (StatusCode, String)> {
    let configured = state
        .sessions
        .update_credentials(id, req.updates())
        .map_err(|e| (session_status(&e), e.to_string()))?;

    tracing::info!(
        "Session {} credentials updated; configured: {:?}",
        id,
        configured
    );
    Ok(Json(CredentialsResponse { configured }))
}

fn query_error(status: StatusCode, error: impl Into<String>) -> (StatusCode, Json<QueryFailure>) {
    (
        status,
        Json(QueryFailure {
            error: error.into(),
            raw_output: None,
        }),
    )
}

/// Run one research query to completion.
async fn run_query(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<QueryResponse>, (StatusCode, Json<QueryFailure>)> {
    let id: Uuid = id.parse().map_err(|_| {
        query_error(StatusCode::NOT_FOUND, format!("Session {} not found", id))
    })?;
    let Json(req) =
        payload.map_err(|rejection| query_error(rejection.status(), rejection.body_text()))?;

    let query = req.query.trim();
    if query.is_empty() {
        return Err(query_error(
            StatusCode::BAD_REQUEST,
            "Please enter a research query.",
        ));
    }

    let label = req.model.as_deref().unwrap_or(default_model().label);
    let spec = find_model(label).ok_or_else(|| {
        query_error(StatusCode::BAD_REQUEST, format!("Unknown model: {}", label))
    })?;

    // Held until the handler returns; a second query on this session gets 409.
    let (credentials, _guard) = state
        .sessions
        .begin_query(id)
        .map_err(|e| query_error(session_status(&e), e.to_string()))?;

    let api_key = credentials.get(spec.provider).cloned().ok_or_else(|| {
        query_error(
            StatusCode::BAD_REQUEST,
            format!("Please enter the {} API Key.", spec.provider.display_name()),
        )
    })?;
    let base_url = state
        .config
        .endpoints
        .base_url(spec.provider)
        .ok_or_else(|| {
            query_error(
                StatusCode::BAD_REQUEST,
                format!("{} does not serve chat models", spec.provider.display_name()),
            )
        })?;

    tracing::info!(
        "Session {} running query with {} ({})",
        id,
        spec.label,
        spec.id
    );

    let llm = Arc::new(
        OpenAiCompatClient::new(base_url, api_key).with_timeout(state.config.llm_timeout),
    );
    let tools = ToolRegistry::for_session(&state.config.tools, &credentials);
    let agent = Agent::new(llm, tools, spec.api_model())
        .with_max_iterations(state.config.max_iterations)
        .with_max_tool_output_chars(state.config.max_tool_output_chars);

    match agent.run(&render_task(query)).await {
        Ok(run) => {
            let sanitized = sanitize_report(&run.output);
            Ok(Json(QueryResponse {
                report_html: render_report_html(&sanitized.text),
                report: sanitized.text,
                sanitized: sanitized.changed,
                model: spec.label.to_string(),
                iterations: run.iterations,
                log: run.log,
            }))
        }
        Err(failure) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(QueryFailure {
                error: format!(
                    "An error occurred during report generation: {}",
                    failure.error
                ),
                raw_output: failure.raw_output,
            }),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Provider;
    use crate::test_support::spawn_mock;
    use serde_json::{json, Value};

    async fn start(config: Config) -> (String, Arc<AppState>) {
        let state = Arc::new(AppState::new(config));
        let base = spawn_mock(app(Arc::clone(&state))).await;
        (base, state)
    }

    async fn new_session(client: &reqwest::Client, base: &str) -> String {
        let res = client
            .post(format!("{}/api/session", base))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 201);
        let body: Value = res.json().await.unwrap();
        body["session_id"].as_str().unwrap().to_string()
    }

    async fn query(
        client: &reqwest::Client,
        base: &str,
        session: &str,
        body: Value,
    ) -> (u16, Value) {
        let res = client
            .post(format!("{}/api/session/{}/query", base, session))
            .json(&body)
            .send()
            .await
            .unwrap();
        (res.status().as_u16(), res.json().await.unwrap())
    }

    #[tokio::test]
    async fn test_registry_endpoints() {
        let (base, _) = start(Config::new()).await;
        let client = reqwest::Client::new();

        let health: Value = client
            .get(format!("{}/api/health", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(health["status"], "ok");
        assert_eq!(health["active_sessions"], 0);

        let models: Vec<Value> = client
            .get(format!("{}/api/models", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let labels: Vec<_> = models.iter().map(|m| m["label"].as_str().unwrap()).collect();
        assert_eq!(
            labels,
            vec![
                "Gemini 2.0 Flash Lite",
                "Gemini 2.5 Pro Exp",
                "OpenAI GPT-4o Mini",
                "XAI Grok-2"
            ]
        );
        assert_eq!(models[0]["default"], true);
        assert_eq!(models[2]["provider"], "openai");
        assert_eq!(models[3]["provider_name"], "XAI");

        let tools: Vec<Value> = client
            .get(format!("{}/api/tools", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(tools.len(), 3);

        let page = client.get(&base).send().await.unwrap().text().await.unwrap();
        assert!(page.contains("Run Query"));
    }

    #[tokio::test]
    async fn test_credentials_are_never_echoed() {
        let (base, state) = start(Config::new()).await;
        let client = reqwest::Client::new();
        let session = new_session(&client, &base).await;

        let res = client
            .put(format!("{}/api/session/{}/credentials", base, session))
            .json(&json!({"gemini_api_key": "gm-secret", "brave_api_key": "br-secret"}))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 200);
        let text = res.text().await.unwrap();
        assert!(!text.contains("secret"));
        let body: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(body["configured"], json!(["gemini", "brave"]));

        let res = client
            .put(format!("{}/api/session/{}/credentials", base, session))
            .json(&json!({"brave_api_key": ""}))
            .send()
            .await
            .unwrap();
        let body: Value = res.json().await.unwrap();
        assert_eq!(body["configured"], json!(["gemini"]));

        let res = client
            .delete(format!("{}/api/session/{}", base, session))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 204);
        assert!(state.sessions.is_empty());

        let res = client
            .put(format!("{}/api/session/{}/credentials", base, session))
            .json(&json!({"gemini_api_key": "x"}))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 404);
    }

    #[tokio::test]
    async fn test_query_validation() {
        let (base, state) = start(Config::new()).await;
        let client = reqwest::Client::new();
        let session = new_session(&client, &base).await;

        let (status, body) = query(&client, &base, &session, json!({"query": "   "})).await;
        assert_eq!(status, 400);
        assert_eq!(body["raw_output"], Value::Null);

        let (status, body) = query(
            &client,
            &base,
            &session,
            json!({"model": "GPT-9", "query": "q"}),
        )
        .await;
        assert_eq!(status, 400);
        assert_eq!(body["error"], "Unknown model: GPT-9");

        let (status, body) = query(&client, &base, &session, json!({"query": "q"})).await;
        assert_eq!(status, 400);
        assert_eq!(body["error"], "Please enter the GEMINI API Key.");

        let (status, _) = query(&client, &base, &Uuid::new_v4().to_string(), json!({"query": "q"})).await;
        assert_eq!(status, 404);

        let id: Uuid = session.parse().unwrap();
        state
            .sessions
            .update_credentials(id, [(Provider::Gemini, "k")])
            .unwrap();
        let (_credentials, _guard) = state.sessions.begin_query(id).unwrap();
        let (status, _) = query(&client, &base, &session, json!({"query": "q"})).await;
        assert_eq!(status, 409);
    }

    #[tokio::test]
    async fn test_malformed_query_requests_get_json_errors() {
        let (base, _) = start(Config::new()).await;
        let client = reqwest::Client::new();
        let session = new_session(&client, &base).await;

        let (status, body) = query(&client, &base, &session, json!({"model": "XAI Grok-2"})).await;
        assert_eq!(status, 422);
        assert!(body["error"].as_str().unwrap().contains("query"));

        let res = client
            .post(format!("{}/api/session/{}/query", base, session))
            .header("content-type", "application/json")
            .body("{\"query\": ")
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 400);
        let body: Value = res.json().await.unwrap();
        assert!(!body["error"].as_str().unwrap().is_empty());
        assert_eq!(body["raw_output"], Value::Null);

        let (status, body) = query(&client, &base, "abc", json!({"query": "q"})).await;
        assert_eq!(status, 404);
        assert_eq!(body["error"], "Session abc not found");
    }

    #[tokio::test]
    async fn test_configured_providers_are_listed() {
        let (base, _) = start(Config::new()).await;
        let client = reqwest::Client::new();
        let session = new_session(&client, &base).await;
        let url = format!("{}/api/session/{}/credentials", base, session);

        let body: Value = client.get(&url).send().await.unwrap().json().await.unwrap();
        assert_eq!(body["configured"], json!([]));

        client
            .put(&url)
            .json(&json!({"xai_api_key": "xk-secret"}))
            .send()
            .await
            .unwrap();
        let text = client.get(&url).send().await.unwrap().text().await.unwrap();
        assert!(!text.contains("secret"));
        let body: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(body["configured"], json!(["xai"]));

        let res = client
            .get(format!("{}/api/session/{}/credentials", base, Uuid::new_v4()))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 404);
    }

    #[tokio::test]
    async fn test_query_returns_sanitized_report() {
        let llm = axum::Router::new().route(
            "/chat/completions",
            post(|axum::Json(body): axum::Json<Value>| async move {
                assert_eq!(body["model"], "gpt-4o-mini");
                let task = body["messages"][1]["content"].as_str().unwrap();
                assert!(task.starts_with("Based on the query: 'test'"));
                axum::Json(json!({
                    "choices": [{
                        "finish_reason": "stop",
                        "message": {"content": "# Report\n:::warning\nAll good."}
                    }]
                }))
            }),
        );
        let mut config = Config::new();
        config.endpoints.openai = spawn_mock(llm).await;
        let (base, state) = start(config).await;
        let client = reqwest::Client::new();
        let session = new_session(&client, &base).await;

        client
            .put(format!("{}/api/session/{}/credentials", base, session))
            .json(&json!({"openai_api_key": "sk-test"}))
            .send()
            .await
            .unwrap();

        let (status, body) = query(
            &client,
            &base,
            &session,
            json!({"model": "OpenAI GPT-4o Mini", "query": "test"}),
        )
        .await;
        assert_eq!(status, 200);
        assert_eq!(body["report"], "# Report\n\nAll good.");
        let html = body["report_html"].as_str().unwrap();
        assert!(html.contains("<h1>Report</h1>"));
        assert!(html.contains("<p>All good.</p>"));
        assert_eq!(body["sanitized"], true);
        assert_eq!(body["model"], "OpenAI GPT-4o Mini");
        assert_eq!(body["iterations"], 1);

        // The busy flag is released once the query finishes.
        let id: Uuid = session.parse().unwrap();
        assert!(state.sessions.begin_query(id).is_ok());
    }

    #[tokio::test]
    async fn test_llm_failure_is_reported() {
        let llm = axum::Router::new().route(
            "/chat/completions",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        );
        let mut config = Config::new();
        config.endpoints.xai = spawn_mock(llm).await;
        let (base, _) = start(config).await;
        let client = reqwest::Client::new();
        let session = new_session(&client, &base).await;

        client
            .put(format!("{}/api/session/{}/credentials", base, session))
            .json(&json!({"xai_api_key": "xk"}))
            .send()
            .await
            .unwrap();

        let (status, body) = query(
            &client,
            &base,
            &session,
            json!({"model": "XAI Grok-2", "query": "test"}),
        )
        .await;
        assert_eq!(status, 500);
        let error = body["error"].as_str().unwrap();
        assert!(error.starts_with("An error occurred during report generation:"));
        assert!(error.contains("500"));
        assert_eq!(body["raw_output"], Value::Null);
    }
}
