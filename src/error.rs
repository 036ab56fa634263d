//! Errores de las acciones del usuario (subida, lectura, búsqueda, explicación, corrección).
//!
//! Ninguno es fatal para la sesión: cada handler los convierte en una
//! respuesta JSON `{"error": ...}` con su código HTTP.

use axum::{
    extract::{multipart::MultipartError, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

pub type AppResult<T> = std::result::Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    /// El ZIP no se pudo descomprimir; el índice activo no cambia.
    #[error("Could not process the ZIP file: {0}")]
    Decode(String),

    /// Ruta inexistente en el índice de ficheros.
    #[error("Error reading file.")]
    NotFound(String),

    /// Todavía no se ha subido ningún ZIP en esta sesión.
    #[error("No hay ningún código subido.")]
    NoWorkspace,

    /// El ZIP supera `MAX_UPLOAD_BYTES`.
    #[error("El ZIP supera el tamaño máximo permitido: {0}")]
    TooLarge(String),

    /// Falta una entrada obligatoria del usuario; no se llama al LLM.
    #[error("{0}")]
    Validation(String),

    /// El proveedor LLM falló o devolvió una salida que no cumple el esquema.
    #[error("Assistant error: {0}")]
    Assistant(String),
}

impl From<zip::result::ZipError> for AppError {
    fn from(err: zip::result::ZipError) -> Self {
        Self::Decode(err.to_string())
    }
}

/// Cuerpo JSON ausente o mal formado: se trata como entrada inválida.
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            Self::TooLarge(err.body_text())
        } else {
            Self::Decode(err.body_text())
        }
    }
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Decode(_) | Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) | Self::NoWorkspace => StatusCode::NOT_FOUND,
            Self::TooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Assistant(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_variant_maps_to_its_status() {
        assert_eq!(AppError::Decode("x".into()).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::Validation("x".into()).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::NotFound("a.ts".into()).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::Assistant("x".into()).status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(AppError::NoWorkspace.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::TooLarge("x".into()).status_code(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[test]
    fn not_found_renders_the_display_message() {
        assert_eq!(AppError::NotFound("src/a.ts".into()).to_string(), "Error reading file.");
    }
}
