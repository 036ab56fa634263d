//! Carga y gestión de configuración de la aplicación (servidor + LLM).

use std::env;
use anyhow::{anyhow, Result};

/// Límite por defecto del ZIP subido (64 MiB).
const DEFAULT_MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

#[derive(Clone, Debug, PartialEq)]
pub enum LlmProvider {
    OpenAI,
    Gemini,
    Ollama,
}

impl LlmProvider {
    pub fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "gemini" => Ok(Self::Gemini),
            "ollama" => Ok(Self::Ollama),
            other => Err(anyhow!("Proveedor LLM no soportado: {other}")),
        }
    }
}

/// Configuración completa de la aplicación.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server_addr: String,
    pub open_browser: bool,
    pub max_upload_bytes: usize,

    pub llm_provider: LlmProvider,
    pub llm_chat_model: String,
    /// `None` si falta `OPENAI_API_KEY`; las peticiones al LLM fallarán con
    /// un error del asistente en lugar de tumbar la tarea.
    pub openai_api_key: Option<String>,
}

impl AppConfig {
    /// Carga la configuración desde variables de entorno (usando .env si existe).
    pub fn from_env() -> Result<Self> {
        let server_addr =
            env::var("SERVER_ADDR").unwrap_or_else(|_| "127.0.0.1:3322".to_string());

        let open_browser = match env::var("OPEN_BROWSER") {
            Ok(value) => parse_bool(&value)?,
            Err(_) => true,
        };

        let max_upload_bytes = match env::var("MAX_UPLOAD_BYTES") {
            Ok(value) => value
                .trim()
                .parse::<usize>()
                .map_err(|_| anyhow!("MAX_UPLOAD_BYTES no es un número válido: {value}"))?,
            Err(_) => DEFAULT_MAX_UPLOAD_BYTES,
        };

        let llm_provider_str =
            env::var("LLM_PROVIDER").unwrap_or_else(|_| "openai".to_string());
        let llm_provider = LlmProvider::from_str(&llm_provider_str)?;

        let llm_chat_model =
            env::var("LLM_CHAT_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());

        let openai_api_key = non_empty(env::var("OPENAI_API_KEY").ok());

        Ok(Self {
            server_addr,
            open_browser,
            max_upload_bytes,
            llm_provider,
            llm_chat_model,
            openai_api_key,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(anyhow!("Valor booleano no válido: {other}")),
    }
}
