use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tokio::task;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use extract_module::ExtractionClient;
use mailbox_module::{MailboxClient, MailboxError, Message};

use crate::integrations::IntegrationRegistry;
use crate::poller::{start_poller_thread, MailPoller, PollOutcome, PollerError};
use crate::todo_store::{StoreError, TodoCreate, TodoStore, TodoUpdate};

use super::config::ServiceConfig;
use super::state::AppState;
use super::BoxError;

pub async fn run_server(
    config: ServiceConfig,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<(), BoxError> {
    let config = Arc::new(config);
    let store = Arc::new(TodoStore::load(&config.todos_path)?);

    if !config.mailbox.has_credentials() {
        warn!("mailbox credentials not configured; polling will fail until they are set");
    }

    let mailbox = MailboxClient::new(config.mailbox.clone());
    let extractor = ExtractionClient::new(config.extract.clone())?;
    let poller = Arc::new(MailPoller::new(
        config.poller_config(),
        mailbox,
        extractor,
        store.clone(),
    ));

    let mut poller_control = start_poller_thread(poller.clone());

    let state = AppState {
        config: config.clone(),
        store,
        poller,
        integrations: Arc::new(IntegrationRegistry::with_defaults()),
    };

    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any);

    let host: IpAddr = config
        .host
        .parse()
        .map_err(|_| format!("invalid host: {}", config.host))?;
    let addr = SocketAddr::new(host, config.port);
    info!("mailbox todo service listening on {}", addr);

    let app = Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/api/todos", get(list_todos).post(create_todo))
        .route(
            "/api/todos/:id",
            get(get_todo).put(update_todo).delete(delete_todo),
        )
        .route("/api/todos/:id/toggle", patch(toggle_todo))
        .route("/api/messages/process", post(process_message))
        .route("/api/messages/gmail", post(process_gmail_message))
        .route("/api/messages/slack", post(process_slack_message))
        .route("/api/messages/whatsapp", post(process_whatsapp_message))
        .route("/api/messages/outlook", post(process_outlook_message))
        .route("/api/messages/telegram", post(process_telegram_message))
        .route("/api/integrations", get(list_integrations))
        .route("/api/integrations/:name", get(get_integration))
        .route("/api/integrations/:name/toggle", post(toggle_integration))
        .route("/api/mailbox/sync", post(sync_mailbox))
        .route("/api/mailbox/test-connection", get(test_connection))
        .route("/api/mailbox/polling-status", get(polling_status))
        .route("/api/mailbox/trigger-poll", post(trigger_poll))
        .with_state(state)
        .layer(cors);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let serve_result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await;
    poller_control.stop_and_join();
    serve_result?;
    Ok(())
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "healthy", "service": "mailbox-todo-service" }))
}

async fn list_todos(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.store.list())
}

async fn create_todo(
    State(state): State<AppState>,
    Json(fields): Json<TodoCreate>,
) -> Response {
    match state.store.create(fields) {
        Ok(todo) => Json(todo).into_response(),
        Err(err) => store_error(err),
    }
}

async fn get_todo(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.store.get(&id) {
        Ok(todo) => Json(todo).into_response(),
        Err(err) => store_error(err),
    }
}

async fn update_todo(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(fields): Json<TodoUpdate>,
) -> Response {
    match state.store.update(&id, fields) {
        Ok(todo) => Json(todo).into_response(),
        Err(err) => store_error(err),
    }
}

async fn delete_todo(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.store.delete(&id) {
        Ok(()) => Json(json!({ "message": "Todo deleted successfully" })).into_response(),
        Err(err) => store_error(err),
    }
}

async fn toggle_todo(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.store.toggle_complete(&id) {
        Ok(todo) => Json(todo).into_response(),
        Err(err) => store_error(err),
    }
}

#[derive(Debug, Deserialize)]
struct ProcessMessageRequest {
    content: String,
    sender: String,
    #[serde(default)]
    subject: Option<String>,
    #[serde(default)]
    source: Option<String>,
}

/// Run one ad-hoc message through extraction, outside the mailbox pipeline.
async fn process_message(
    State(state): State<AppState>,
    Json(request): Json<ProcessMessageRequest>,
) -> Response {
    let source = request
        .source
        .clone()
        .unwrap_or_else(|| "manual".to_string());
    extract_ad_hoc(state, request, source, "Message processed").await
}

async fn process_gmail_message(
    State(state): State<AppState>,
    Json(request): Json<ProcessMessageRequest>,
) -> Response {
    extract_ad_hoc(state, request, "gmail".to_string(), "Gmail message processed").await
}

async fn process_slack_message(
    State(state): State<AppState>,
    Json(request): Json<ProcessMessageRequest>,
) -> Response {
    extract_ad_hoc(state, request, "slack".to_string(), "Slack message processed").await
}

async fn process_whatsapp_message(
    State(state): State<AppState>,
    Json(request): Json<ProcessMessageRequest>,
) -> Response {
    extract_ad_hoc(
        state,
        request,
        "whatsapp".to_string(),
        "WhatsApp message processed",
    )
    .await
}

async fn process_outlook_message(
    State(state): State<AppState>,
    Json(request): Json<ProcessMessageRequest>,
) -> Response {
    extract_ad_hoc(
        state,
        request,
        "outlook".to_string(),
        "Outlook message processed",
    )
    .await
}

async fn process_telegram_message(
    State(state): State<AppState>,
    Json(request): Json<ProcessMessageRequest>,
) -> Response {
    extract_ad_hoc(
        state,
        request,
        "telegram".to_string(),
        "Telegram message processed",
    )
    .await
}

/// Shared body for the ad-hoc message routes. The per-source routes pin
/// `source` regardless of what the request carries.
async fn extract_ad_hoc(
    state: AppState,
    request: ProcessMessageRequest,
    source: String,
    label: &'static str,
) -> Response {
    let snippet = request.content.chars().take(200).collect();
    let message = Message {
        id: "manual".to_string(),
        message_id: None,
        subject: request.subject.unwrap_or_default(),
        sender_address: request.sender.clone(),
        sender_display_name: request.sender,
        recipient: String::new(),
        received_at: Utc::now(),
        body_text: request.content,
        snippet,
        is_unread: false,
    };

    let poller = state.poller.clone();
    let result = task::spawn_blocking(move || poller.process_message(&message, &source)).await;
    match result {
        Ok(Ok(todos)) => {
            let ids: Vec<&str> = todos.iter().map(|todo| todo.id.as_str()).collect();
            Json(json!({ "message": label, "todos_created": ids })).into_response()
        }
        Ok(Err(err)) => poller_error(err),
        Err(err) => join_error(err),
    }
}

async fn list_integrations(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.integrations.list())
}

async fn get_integration(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    match state.integrations.get(&name) {
        Some(integration) => Json(integration).into_response(),
        None => integration_not_found(),
    }
}

async fn toggle_integration(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    match state.integrations.toggle(&name) {
        Some(integration) => Json(integration).into_response(),
        None => integration_not_found(),
    }
}

fn integration_not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "detail": "Integration not found" })),
    )
        .into_response()
}

#[derive(Debug, Deserialize)]
struct SyncParams {
    #[serde(default = "default_sync_count")]
    count: usize,
    #[serde(default = "default_unread_only")]
    unread_only: bool,
}

fn default_sync_count() -> usize {
    10
}

fn default_unread_only() -> bool {
    true
}

async fn sync_mailbox(
    State(state): State<AppState>,
    Query(params): Query<SyncParams>,
) -> Response {
    let poller = state.poller.clone();
    let result =
        task::spawn_blocking(move || poller.full_sync(params.count, params.unread_only)).await;
    match result {
        Ok(Ok(PollOutcome::Completed(summary))) => Json(json!({
            "message": "Mailbox sync completed",
            "messages_seen": summary.messages_seen,
            "new_messages": summary.new_messages,
            "todos_created": summary.todos_created,
        }))
        .into_response(),
        Ok(Ok(PollOutcome::AlreadyRunning)) => already_running(),
        Ok(Err(err)) => poller_error(err),
        Err(err) => join_error(err),
    }
}

async fn test_connection(State(state): State<AppState>) -> Response {
    let poller = state.poller.clone();
    match task::spawn_blocking(move || poller.test_connection()).await {
        Ok(true) => Json(json!({
            "status": "connected",
            "message": "Successfully connected to the mailbox",
        }))
        .into_response(),
        Ok(false) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "disconnected", "detail": "mailbox connection failed" })),
        )
            .into_response(),
        Err(err) => join_error(err),
    }
}

async fn polling_status(State(state): State<AppState>) -> impl IntoResponse {
    let mut status = serde_json::to_value(state.poller.stats()).unwrap_or_else(|_| json!({}));
    if let Some(map) = status.as_object_mut() {
        map.insert(
            "folder".to_string(),
            json!(state.config.mailbox.folder.clone()),
        );
    }
    Json(status)
}

async fn trigger_poll(State(state): State<AppState>) -> Response {
    let poller = state.poller.clone();
    let result = task::spawn_blocking(move || poller.poll_once()).await;
    match result {
        Ok(Ok(PollOutcome::Completed(summary))) => Json(json!({
            "message": "Manual poll completed",
            "messages_seen": summary.messages_seen,
            "new_messages": summary.new_messages,
            "todos_created": summary.todos_created,
            "status": state.poller.stats(),
        }))
        .into_response(),
        Ok(Ok(PollOutcome::AlreadyRunning)) => already_running(),
        Ok(Err(err)) => poller_error(err),
        Err(err) => join_error(err),
    }
}

fn already_running() -> Response {
    (
        StatusCode::CONFLICT,
        Json(json!({ "detail": "poll already in progress" })),
    )
        .into_response()
}

fn store_error(err: StoreError) -> Response {
    let status = match err {
        StoreError::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({ "detail": err.to_string() }))).into_response()
}

fn poller_error(err: PollerError) -> Response {
    let status = match &err {
        PollerError::Mailbox(MailboxError::MissingCredentials) => StatusCode::BAD_REQUEST,
        PollerError::Mailbox(MailboxError::FolderNotFound(_)) => StatusCode::NOT_FOUND,
        PollerError::Mailbox(_) => StatusCode::SERVICE_UNAVAILABLE,
        PollerError::Extract(_) => StatusCode::BAD_GATEWAY,
        PollerError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({ "detail": err.to_string() }))).into_response()
}

fn join_error(err: task::JoinError) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "detail": format!("task failed: {err}") })),
    )
        .into_response()
}
