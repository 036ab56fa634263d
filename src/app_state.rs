use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{oneshot, Mutex as AsyncMutex};
use tracing::{error, info};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    error::{AppError, AppResult},
    index::{format_search_snippet, FileIndex},
    ingest::{self, IngestedCodebase, IngestionSummary},
    llm::{AssistantGateway, ExplainRequest, FixOutput, FixRequest, SearchOutput, SearchRequest},
    models::{FileContent, FileTreeNode},
};

pub const SEARCH_RESULT_LABEL: &str = "Search Result";
pub const SEARCH_ERROR_LABEL: &str = "Search Result (Error)";

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub assistant: AssistantGateway,
    /// Las acciones del usuario se serializan tomando este lock.
    pub session: Arc<AsyncMutex<SessionState>>,
    pub status: Arc<Mutex<Status>>,
    pub shutdown_sender: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}

/// Indicador de tarea en curso para la interfaz.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    pub is_busy: bool,
    pub message: String,
}

/// Marca la tarea como activa mientras vive y la libera al soltarse, también
/// si la acción termina con error.
struct TaskGuard {
    status: Arc<Mutex<Status>>,
}

impl TaskGuard {
    fn begin(status: &Arc<Mutex<Status>>, label: &str) -> Self {
        {
            let mut s = status.lock().unwrap_or_else(PoisonError::into_inner);
            s.is_busy = true;
            s.message = label.to_string();
        }
        Self {
            status: status.clone(),
        }
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        let mut s = self.status.lock().unwrap_or_else(PoisonError::into_inner);
        s.is_busy = false;
        s.message = "Listo.".to_string();
    }
}

/// Código subido y ya indexado.
#[derive(Debug, Clone)]
pub struct Workspace {
    pub id: Uuid,
    pub uploaded_at: DateTime<Utc>,
    pub index: FileIndex,
    pub tree: FileTreeNode,
    pub summary: IngestionSummary,
}

/// Estado de la sesión de trabajo del usuario.
#[derive(Debug, Default)]
pub struct SessionState {
    workspace: Option<Workspace>,
    active_file: Option<String>,
    active_content: String,
    search_result: Option<SearchOutput>,
    explanation: Option<String>,
    error_fix: Option<FixOutput>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSummary {
    pub workspace_id: Uuid,
    pub uploaded_at: DateTime<Utc>,
    pub file_count: usize,
    pub skipped_count: usize,
    pub tree: FileTreeNode,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub workspace_id: Option<Uuid>,
    pub uploaded_at: Option<DateTime<Utc>>,
    pub file_count: usize,
    pub active_file: Option<String>,
    pub active_file_content: String,
    pub search_result: Option<SearchOutput>,
    pub explanation: Option<String>,
    pub error_fix: Option<FixOutput>,
}

impl SessionState {
    pub fn workspace(&self) -> Option<&Workspace> {
        self.workspace.as_ref()
    }

    /// Sustituye por completo el código anterior y limpia los resultados.
    pub fn install_workspace(&mut self, codebase: IngestedCodebase) -> &Workspace {
        *self = Self::default();
        self.workspace.insert(Workspace {
            id: Uuid::new_v4(),
            uploaded_at: Utc::now(),
            index: codebase.index,
            tree: codebase.tree,
            summary: codebase.summary,
        })
    }

    /// Abre un fichero en el editor. Si la ruta no existe el editor muestra
    /// "Error reading file." y se devuelve `NotFound`.
    pub fn open_file(&mut self, path: &str) -> AppResult<FileContent> {
        self.search_result = None;
        self.active_file = Some(path.to_string());

        let lookup = match &self.workspace {
            Some(ws) => ws.index.get_content(path).map(str::to_string),
            None => Err(AppError::NotFound(path.to_string())),
        };

        match lookup {
            Ok(content) => {
                self.active_content = content.clone();
                Ok(FileContent {
                    path: path.to_string(),
                    content,
                    mime_type: mime_guess::from_path(path).first().map(|m| m.to_string()),
                })
            }
            Err(err) => {
                self.active_content = err.to_string();
                Err(err)
            }
        }
    }

    pub fn record_search(&mut self, output: SearchOutput, degraded: bool) {
        let label = if degraded {
            SEARCH_ERROR_LABEL
        } else {
            SEARCH_RESULT_LABEL
        };
        self.active_file = Some(label.to_string());
        self.active_content = output.relevant_code.clone();
        self.search_result = Some(output);
    }

    pub fn record_explanation(&mut self, explanation: String) {
        self.explanation = Some(explanation);
    }

    pub fn record_fix(&mut self, fix: FixOutput) {
        self.error_fix = Some(fix);
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            workspace_id: self.workspace.as_ref().map(|ws| ws.id),
            uploaded_at: self.workspace.as_ref().map(|ws| ws.uploaded_at),
            file_count: self.workspace.as_ref().map_or(0, |ws| ws.index.len()),
            active_file: self.active_file.clone(),
            active_file_content: self.active_content.clone(),
            search_result: self.search_result.clone(),
            explanation: self.explanation.clone(),
            error_fix: self.error_fix.clone(),
        }
    }
}

fn require_input(value: &str, message: &str) -> AppResult<()> {
    if value.is_empty() {
        Err(AppError::Validation(message.to_string()))
    } else {
        Ok(())
    }
}

impl AppState {
    pub fn new(
        config: AppConfig,
        assistant: AssistantGateway,
        shutdown_sender: oneshot::Sender<()>,
    ) -> Self {
        Self {
            config,
            assistant,
            session: Arc::new(AsyncMutex::new(SessionState::default())),
            status: Arc::new(Mutex::new(Status {
                is_busy: false,
                message: "Servidor listo.".to_string(),
            })),
            shutdown_sender: Arc::new(Mutex::new(Some(shutdown_sender))),
        }
    }

    pub fn status(&self) -> Status {
        self.status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Descomprime e indexa el ZIP. Sólo si todo va bien se instala como
    /// código activo; un error deja la sesión anterior intacta.
    pub async fn upload(&self, bytes: Vec<u8>) -> AppResult<UploadSummary> {
        let mut session = self.session.lock().await;
        let _task = TaskGuard::begin(&self.status, "Processing codebase...");

        let codebase = tokio::task::spawn_blocking(move || ingest::ingest_archive(&bytes))
            .await
            .map_err(|e| AppError::Decode(format!("la tarea de descompresión falló: {e}")))?
            .map_err(|e| {
                error!("Error de ingesta: {e}");
                e
            })?;

        let skipped_count = codebase.summary.files_skipped;
        let ws = session.install_workspace(codebase);
        info!("Nuevo código activo {} con {} ficheros", ws.id, ws.index.len());

        Ok(UploadSummary {
            workspace_id: ws.id,
            uploaded_at: ws.uploaded_at,
            file_count: ws.index.len(),
            skipped_count,
            tree: ws.tree.clone(),
        })
    }

    pub async fn open_file(&self, path: &str) -> AppResult<FileContent> {
        self.session.lock().await.open_file(path)
    }

    /// Filtra los ficheros que contienen la consulta y delega en el LLM. Los
    /// fallos del modelo no llegan al usuario como error: se devuelve la
    /// respuesta de reserva.
    pub async fn search(&self, query: &str) -> AppResult<SearchOutput> {
        require_input(query, "Please enter a search query.")?;
        let mut session = self.session.lock().await;
        let snippet = match session.workspace() {
            Some(ws) => format_search_snippet(&ws.index.filter_by_substring(query)),
            None => {
                return Err(AppError::Validation(
                    "Upload a codebase before searching.".to_string(),
                ))
            }
        };

        let _task = TaskGuard::begin(&self.status, "Searching code...");
        let request = SearchRequest {
            query: query.to_string(),
            code_snippet: snippet,
        };
        let (output, degraded) = self.assistant.search_or_fallback(&request).await;
        session.record_search(output.clone(), degraded);
        Ok(output)
    }

    pub async fn explain(&self, request: ExplainRequest) -> AppResult<String> {
        require_input(&request.code, "Please select a code block to explain.")?;
        let mut session = self.session.lock().await;
        let _task = TaskGuard::begin(&self.status, "Generating explanation...");

        let output = self.assistant.explain(&request).await?;
        session.record_explanation(output.explanation.clone());
        Ok(output.explanation)
    }

    pub async fn fix(&self, request: FixRequest) -> AppResult<FixOutput> {
        let missing = "Please provide both an error message and a code snippet.";
        require_input(&request.error_message, missing)?;
        require_input(&request.code_snippet, missing)?;
        let mut session = self.session.lock().await;
        let _task = TaskGuard::begin(&self.status, "Analyzing error...");

        let output = self.assistant.fix(&request).await?;
        session.record_fix(output.clone());
        Ok(output)
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        self.session.lock().await.snapshot()
    }

    pub async fn tree(&self) -> Option<FileTreeNode> {
        self.session
            .lock()
            .await
            .workspace()
            .map(|ws| ws.tree.clone())
    }

    /// Dispara el apagado ordenado del servidor (sólo la primera vez).
    pub fn request_shutdown(&self) {
        if let Some(sender) = self
            .shutdown_sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            let _ = sender.send(());
        }
    }
}
