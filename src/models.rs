//! Modelos de dominio (entradas del ZIP, árbol de ficheros y respuestas de la API).

use serde::Serialize;

/// Entrada tal cual sale del ZIP. Sólo vive durante la ingesta.
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    pub path: String,
    pub is_dir: bool,
    /// Vacío para directorios.
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    File,
    Folder,
}

/// Nodo del árbol que se muestra en el panel lateral.
///
/// La raíz es una carpeta con `path` vacío; el resto de nodos tienen
/// `path` = ruta del padre + "/" + `name`. Los ficheros no tienen `children`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileTreeNode {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<FileTreeNode>>,
}

impl FileTreeNode {
    pub fn root() -> Self {
        Self::folder("root", "")
    }

    pub fn folder(name: &str, path: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: NodeKind::Folder,
            path: path.to_string(),
            children: Some(Vec::new()),
        }
    }

    pub fn file(name: &str, path: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: NodeKind::File,
            path: path.to_string(),
            children: None,
        }
    }

    pub fn is_folder(&self) -> bool {
        self.kind == NodeKind::Folder
    }

    pub fn children(&self) -> &[FileTreeNode] {
        self.children.as_deref().unwrap_or(&[])
    }

    /// Busca un nodo por su ruta completa recorriendo segmento a segmento.
    pub fn find(&self, path: &str) -> Option<&FileTreeNode> {
        let mut current = self;
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            current = current.children().iter().find(|c| c.name == segment)?;
        }
        Some(current)
    }

    /// Número total de nodos, raíz incluida.
    pub fn node_count(&self) -> usize {
        1 + self.children().iter().map(FileTreeNode::node_count).sum::<usize>()
    }
}

/// Contenido de un fichero abierto en el editor.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileContent {
    pub path: String,
    pub content: String,
    pub mime_type: Option<String>,
}
