use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Json, Multipart, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::{
    app_state::{AppState, SessionSnapshot, Status, UploadSummary},
    error::{AppError, AppResult},
    llm::{ExplainOutput, ExplainRequest, FixOutput, FixRequest, SearchOutput},
    models::{FileContent, FileTreeNode},
};

// --- Payloads y Respuestas de la API ---

#[derive(Deserialize, Default)]
#[serde(default)]
pub struct OpenFilePayload {
    path: String,
}

#[derive(Deserialize, Default)]
#[serde(default)]
pub struct SearchPayload {
    query: String,
}

#[derive(Serialize)]
pub struct IndexResponse {
    success: bool,
    message: String,
}

// --- Router ---

pub fn create_router(app_state: AppState) -> Router {
    let upload_limit = app_state.config.max_upload_bytes;
    Router::new()
        .route(
            "/api/upload",
            post(upload_handler).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/api/index", post(index_handler))
        .route("/api/tree", get(tree_handler))
        .route("/api/file", post(open_file_handler))
        .route("/api/search", post(search_handler))
        .route("/api/explain", post(explain_handler))
        .route("/api/fix", post(fix_handler))
        .route("/api/session", get(session_handler))
        .route("/api/status", get(status_handler))
        .route("/api/shutdown", post(shutdown_handler))
        .with_state(app_state)
}

// --- Handlers ---

/// Recibe el ZIP como campo `file` de un formulario multipart.
#[axum::debug_handler]
async fn upload_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<Json<UploadSummary>> {
    let mut archive: Option<Vec<u8>> = None;
    // Un cuerpo por encima de `MAX_UPLOAD_BYTES` llega aquí como error 413.
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some("file") {
            let bytes = field.bytes().await?;
            archive = Some(bytes.to_vec());
            break;
        }
    }

    let bytes = archive
        .ok_or_else(|| AppError::Validation("Falta el campo 'file' con el ZIP.".to_string()))?;
    info!("ZIP recibido ({} bytes)", bytes.len());
    Ok(Json(state.upload(bytes).await?))
}

/// La indexación ocurre al subir el ZIP; aquí sólo se informa del estado.
#[axum::debug_handler]
async fn index_handler(State(state): State<AppState>) -> Json<IndexResponse> {
    let snapshot = state.snapshot().await;
    let message = match snapshot.workspace_id {
        Some(_) => format!("{} ficheros indexados en memoria.", snapshot.file_count),
        None => "Aún no se ha subido ningún código.".to_string(),
    };
    Json(IndexResponse {
        success: true,
        message,
    })
}

#[axum::debug_handler]
async fn tree_handler(State(state): State<AppState>) -> AppResult<Json<FileTreeNode>> {
    state
        .tree()
        .await
        .map(Json)
        .ok_or(AppError::NoWorkspace)
}

#[axum::debug_handler]
async fn open_file_handler(
    State(state): State<AppState>,
    payload: Result<Json<OpenFilePayload>, JsonRejection>,
) -> AppResult<Json<FileContent>> {
    let Json(payload) = payload?;
    state.open_file(&payload.path).await.map(Json).map_err(|e| {
        warn!("No se pudo abrir '{}': {}", payload.path, e);
        e
    })
}

#[axum::debug_handler]
async fn search_handler(
    State(state): State<AppState>,
    payload: Result<Json<SearchPayload>, JsonRejection>,
) -> AppResult<Json<SearchOutput>> {
    let Json(payload) = payload?;
    Ok(Json(state.search(&payload.query).await?))
}

#[axum::debug_handler]
async fn explain_handler(
    State(state): State<AppState>,
    payload: Result<Json<ExplainRequest>, JsonRejection>,
) -> AppResult<Json<ExplainOutput>> {
    let Json(payload) = payload?;
    let explanation = state.explain(payload).await?;
    Ok(Json(ExplainOutput { explanation }))
}

#[axum::debug_handler]
async fn fix_handler(
    State(state): State<AppState>,
    payload: Result<Json<FixRequest>, JsonRejection>,
) -> AppResult<Json<FixOutput>> {
    let Json(payload) = payload?;
    Ok(Json(state.fix(payload).await?))
}

#[axum::debug_handler]
async fn session_handler(State(state): State<AppState>) -> Json<SessionSnapshot> {
    Json(state.snapshot().await)
}

#[axum::debug_handler]
async fn status_handler(State(state): State<AppState>) -> Json<Status> {
    Json(state.status())
}

// --- Handler de Apagado ---

#[axum::debug_handler]
async fn shutdown_handler(State(state): State<AppState>) -> impl IntoResponse {
    info!("Petición de apagado recibida.");
    state.request_shutdown();
    (StatusCode::OK, Json(json!({ "message": "Apagando el servidor." })))
}
