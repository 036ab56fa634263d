//! Pasarela hacia el LLM para las tres acciones del asistente: búsqueda,
//! explicación y corrección de errores.
//!
//! Cada acción rellena una plantilla fija, añade el esquema JSON de la salida
//! esperada al preámbulo y valida la respuesta contra ese esquema. El acceso
//! real al proveedor va detrás de [`CompletionBackend`].

use std::sync::Arc;

use async_trait::async_trait;
use rig::completion::Prompt;
use schemars::JsonSchema;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    config::{AppConfig, LlmProvider},
    error::{AppError, AppResult},
};

pub const NO_MATCH_CODE: &str = "No relevant code found.";
pub const NO_MATCH_EXPLANATION: &str = "Could not find any code matching your query.";
pub const SEARCH_FAILED_CODE: &str = "Error: The AI could not process the search request.";
pub const SEARCH_FAILED_EXPLANATION: &str = "An error occurred while trying to analyze the code.";

// --- Peticiones y respuestas (nombres de campo fijos en el cable) ---

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub query: String,
    /// Ficheros candidatos ya concatenados con `File: <ruta>`.
    pub code_snippet: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SearchOutput {
    /// Fragmentos relevantes combinados, cada uno precedido de `// File: <ruta>`.
    pub relevant_code: String,
    pub explanation: String,
}

impl SearchOutput {
    pub fn no_match() -> Self {
        Self {
            relevant_code: NO_MATCH_CODE.to_string(),
            explanation: NO_MATCH_EXPLANATION.to_string(),
        }
    }

    pub fn failed() -> Self {
        Self {
            relevant_code: SEARCH_FAILED_CODE.to_string(),
            explanation: SEARCH_FAILED_EXPLANATION.to_string(),
        }
    }
}

/// Los campos ausentes llegan vacíos y los rechaza la validación de la acción.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplainRequest {
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ExplainOutput {
    pub explanation: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FixRequest {
    pub error_message: String,
    pub code_snippet: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FixOutput {
    pub fixed_code: String,
    pub explanation: String,
}

// --- Proveedor ---

/// Colaborador externo de generación de texto.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Envía `prompt` con `preamble` como instrucciones de sistema y devuelve
    /// el texto crudo del modelo.
    async fn complete(&self, preamble: &str, prompt: &str) -> AppResult<String>;
}

/// Backend real sobre Rig. De momento se implementa OpenAI; Gemini/Ollama
/// quedan preparados para el futuro.
#[derive(Clone)]
pub struct RigBackend {
    pub provider: LlmProvider,
    pub chat_model: String,
    api_key: Option<String>,
}

impl std::fmt::Debug for RigBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RigBackend")
            .field("provider", &self.provider)
            .field("chat_model", &self.chat_model)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .finish()
    }
}

impl RigBackend {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self::new(
            cfg.llm_provider.clone(),
            cfg.llm_chat_model.clone(),
            cfg.openai_api_key.clone(),
        )
    }

    pub fn new(provider: LlmProvider, chat_model: String, api_key: Option<String>) -> Self {
        Self {
            provider,
            chat_model,
            api_key,
        }
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    async fn complete_with_openai(&self, preamble: &str, prompt: &str) -> AppResult<String> {
        use rig::providers::openai;
        // Trait para client.agent(...)
        use rig::client::CompletionClient as _;

        let api_key = self.api_key.as_deref().ok_or_else(|| {
            AppError::Assistant("Falta OPENAI_API_KEY en el entorno".to_string())
        })?;
        let client = openai::Client::new(api_key);

        // Modelo de chat por defecto si no se ha configurado otro
        let model_name = if self.chat_model.is_empty() {
            "gpt-4o-mini"
        } else {
            self.chat_model.as_str()
        };

        let agent = client.agent(model_name).preamble(preamble).build();

        agent
            .prompt(prompt)
            .await
            .map_err(|e| AppError::Assistant(e.to_string()))
    }
}

#[async_trait]
impl CompletionBackend for RigBackend {
    async fn complete(&self, preamble: &str, prompt: &str) -> AppResult<String> {
        match self.provider {
            LlmProvider::OpenAI => self.complete_with_openai(preamble, prompt).await,
            ref other => Err(AppError::Assistant(format!(
                "Proveedor LLM {:?} aún no implementado para chat",
                other
            ))),
        }
    }
}

// --- Pasarela ---

const BASE_PREAMBLE: &str = "You are an AI code assistant.";

#[derive(Clone)]
pub struct AssistantGateway {
    backend: Arc<dyn CompletionBackend>,
}

impl AssistantGateway {
    pub fn new(backend: Arc<dyn CompletionBackend>) -> Self {
        Self { backend }
    }

    /// Búsqueda sobre los ficheros candidatos. Sin candidatos no se llama al
    /// modelo y se devuelve la respuesta fija de "sin resultados".
    pub async fn search(&self, request: &SearchRequest) -> AppResult<SearchOutput> {
        if request.code_snippet.is_empty() {
            return Ok(SearchOutput::no_match());
        }
        let prompt = format!(
            r#"A user has searched their codebase with the query "{query}".

The following string contains the contents of one or more files that were found to contain the query. Your task is to analyze all the provided file contents and find the most relevant functions or code blocks that semantically match the user's query. The match does not need to be exact; for example, a query for "list tasks" should match a function named "list_task".

Combine all the relevant code snippets you find into a single code block. Crucially, before each snippet, you must add a comment with its original file path, for example:
// File: src/utils/tasks.ts
function list_task() {{ ... }}

// File: src/components/task-list.tsx
// ... another relevant snippet

Finally, provide a concise explanation of the combined code you've extracted.

File Content(s):
```
{snippet}
```
"#,
            query = request.query,
            snippet = request.code_snippet,
        );
        self.run::<SearchOutput>("search", &prompt).await
    }

    /// Como [`search`](Self::search), pero un fallo del modelo se degrada a
    /// la respuesta fija de error para que la interfaz siempre tenga algo que
    /// mostrar. El booleano indica si hubo degradación.
    pub async fn search_or_fallback(&self, request: &SearchRequest) -> (SearchOutput, bool) {
        match self.search(request).await {
            Ok(output) => (output, false),
            Err(e) => {
                warn!("La búsqueda con IA falló, usando respuesta de reserva: {e}");
                (SearchOutput::failed(), true)
            }
        }
    }

    pub async fn explain(&self, request: &ExplainRequest) -> AppResult<ExplainOutput> {
        let prompt = format!(
            "Explain the following code snippet in a clear and concise manner:\n\n{}",
            request.code
        );
        self.run::<ExplainOutput>("explain", &prompt).await
    }

    pub async fn fix(&self, request: &FixRequest) -> AppResult<FixOutput> {
        let prompt = format!(
            "You will be given an error message and a code snippet. You should analyze the error message and the code snippet and suggest a fix for the error. You should also provide an explanation of the fix.\n\nError message: {}\nCode snippet: {}\n\nSuggest code fix:",
            request.error_message, request.code_snippet
        );
        self.run::<FixOutput>("fix", &prompt).await
    }

    async fn run<T>(&self, action: &str, prompt: &str) -> AppResult<T>
    where
        T: DeserializeOwned + JsonSchema,
    {
        let preamble = output_preamble::<T>()?;
        info!("Enviando petición '{action}' al LLM ({} caracteres)", prompt.len());
        let response = self.backend.complete(&preamble, prompt).await?;
        parse_output(&response)
    }
}

/// Instrucciones de sistema con el esquema JSON que debe cumplir la respuesta.
fn output_preamble<T: JsonSchema>() -> AppResult<String> {
    let schema = schemars::schema_for!(T);
    let schema = serde_json::to_string_pretty(&schema)
        .map_err(|e| AppError::Assistant(format!("esquema no serializable: {e}")))?;
    Ok(format!(
        "{BASE_PREAMBLE}\nThe output MUST be a single valid JSON object matching this JSON Schema. Do not include explanations outside the JSON.\n{schema}"
    ))
}

/// Limpia posibles bloques ```json y valida la salida contra el tipo esperado.
pub fn parse_output<T: DeserializeOwned>(response: &str) -> AppResult<T> {
    let json_response = response
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    serde_json::from_str::<T>(json_response).map_err(|e| {
        warn!("No se pudo validar la salida del LLM. Error: {}. Respuesta LLM: '{}'", e, response);
        AppError::Assistant(format!("salida del modelo no válida: {e}"))
    })
}
