//! Índice en memoria ruta → contenido de los ficheros conservados del ZIP.
//!
//! Mantiene el orden de inserción: es el orden en el que se entregan los
//! candidatos al asistente de búsqueda.

use std::collections::HashMap;

use crate::error::{AppError, AppResult};

/// Separador entre ficheros en el fragmento que se envía a la búsqueda.
pub const SNIPPET_SEPARATOR: &str = "\n\n---\n\n";

#[derive(Debug, Clone, Default)]
pub struct FileIndex {
    entries: Vec<(String, String)>,
    positions: HashMap<String, usize>,
}

impl FileIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserta o sobrescribe. Una ruta repetida conserva su posición original
    /// y se queda con el último contenido leído.
    pub fn insert(&mut self, path: String, content: String) {
        match self.positions.get(&path) {
            Some(&pos) => self.entries[pos].1 = content,
            None => {
                self.positions.insert(path.clone(), self.entries.len());
                self.entries.push((path, content));
            }
        }
    }

    pub fn get_content(&self, path: &str) -> AppResult<&str> {
        self.positions
            .get(path)
            .map(|&pos| self.entries[pos].1.as_str())
            .ok_or_else(|| AppError::NotFound(path.to_string()))
    }

    /// Ficheros cuyo contenido contiene `query` sin distinguir mayúsculas.
    /// Una consulta vacía no devuelve nada.
    pub fn filter_by_substring(&self, query: &str) -> Vec<(&str, &str)> {
        if query.is_empty() {
            return Vec::new();
        }
        let needle = query.to_lowercase();
        self.entries
            .iter()
            .filter(|(_, content)| content.to_lowercase().contains(&needle))
            .map(|(path, content)| (path.as_str(), content.as_str()))
            .collect()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(path, _)| path.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Concatena los candidatos como `File: <ruta>\n\n<contenido>` separados por
/// [`SNIPPET_SEPARATOR`].
pub fn format_search_snippet(matches: &[(&str, &str)]) -> String {
    matches
        .iter()
        .map(|(path, content)| format!("File: {path}\n\n{content}"))
        .collect::<Vec<_>>()
        .join(SNIPPET_SEPARATOR)
}
