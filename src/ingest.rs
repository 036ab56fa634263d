//! Ingesta de un ZIP subido por el usuario: descompresión en memoria, filtrado
//! por extensión, índice ruta → contenido y árbol de carpetas para el panel.
//!
//! Todo ocurre sobre los bytes recibidos; no se escribe nada en disco.

use std::io::{Cursor, Read};

use tracing::{debug, info, warn};
use zip::ZipArchive;

use crate::{
    error::{AppError, AppResult},
    index::FileIndex,
    models::{ArchiveEntry, FileTreeNode},
};

/// Extensiones que se conservan (coincidencia exacta de sufijo, sensible a mayúsculas).
pub const KEPT_EXTENSIONS: [&str; 15] = [
    ".ts", ".tsx", ".js", ".jsx", ".py", ".go", ".java", ".cs", ".rb", ".php", ".html", ".css",
    ".scss", ".json", ".md",
];

/// Resumen de los resultados de una operación de ingesta.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct IngestionSummary {
    pub entries_scanned: usize,
    pub directories: usize,
    pub files_kept: usize,
    pub files_skipped: usize,
}

/// Implementa cómo se mostrará el resumen como texto.
impl std::fmt::Display for IngestionSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Resumen: {} entradas leídas ({} directorios), {} ficheros conservados, {} omitidos.",
            self.entries_scanned, self.directories, self.files_kept, self.files_skipped
        )
    }
}

/// Resultado completo de la ingesta: lo que la sesión instala de una vez.
#[derive(Debug, Clone)]
pub struct IngestedCodebase {
    pub index: FileIndex,
    pub tree: FileTreeNode,
    pub summary: IngestionSummary,
}

pub fn is_kept_path(path: &str) -> bool {
    KEPT_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

/// Ruta con los segmentos vacíos eliminados (`"/src//a.ts"` → `"src/a.ts"`).
pub fn normalize_path(path: &str) -> String {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Descomprime el ZIP y devuelve, en el orden del archivo, los directorios
/// (sin contenido) y los ficheros con extensión permitida. Los ficheros
/// descartados sólo se cuentan en el resumen.
pub fn read_archive(bytes: &[u8]) -> AppResult<(Vec<ArchiveEntry>, IngestionSummary)> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let mut summary = IngestionSummary::default();
    let mut entries = Vec::new();

    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        summary.entries_scanned += 1;

        let name = file.name().to_string();
        if file.is_dir() {
            summary.directories += 1;
            entries.push(ArchiveEntry {
                path: name,
                is_dir: true,
                bytes: Vec::new(),
            });
            continue;
        }

        if !is_kept_path(&name) {
            debug!("Saltando fichero con extensión no soportada: {name}");
            summary.files_skipped += 1;
            continue;
        }

        let mut data = Vec::with_capacity((file.size() as usize).min(1 << 20));
        file.read_to_end(&mut data)
            .map_err(|e| AppError::Decode(format!("{name}: {e}")))?;

        summary.files_kept += 1;
        entries.push(ArchiveEntry {
            path: name,
            is_dir: false,
            bytes: data,
        });
    }

    Ok((entries, summary))
}

/// Construye el árbol a partir de las rutas en el orden recibido.
///
/// Los hijos se buscan por nombre exacto y sólo se añaden la primera vez que
/// aparecen, así que rutas repetidas no crean nodos nuevos. El tipo de un nodo
/// queda fijado al crearlo: si una ruta posterior usa un fichero como carpeta
/// (o al revés) no se reconcilia y sólo se registra un aviso.
pub fn build_path_tree<'a, I>(paths: I) -> FileTreeNode
where
    I: IntoIterator<Item = &'a str>,
{
    let mut root = FileTreeNode::root();
    for path in paths {
        insert_path(&mut root, path);
    }
    root
}

fn insert_path(root: &mut FileTreeNode, path: &str) {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if segments.is_empty() {
        return;
    }

    let mut current = root;
    for (i, segment) in segments.iter().enumerate() {
        if !current.is_folder() {
            warn!(
                "'{}' es un fichero y no puede contener '{}'; la ruta no se añade al árbol",
                segments[..i].join("/"),
                path
            );
            return;
        }

        let is_last = i == segments.len() - 1;
        let node_path = segments[..=i].join("/");
        let children = current.children.get_or_insert_with(Vec::new);
        let pos = match children.iter().position(|c| c.name == *segment) {
            Some(pos) => pos,
            None => {
                children.push(if is_last {
                    FileTreeNode::file(segment, &node_path)
                } else {
                    FileTreeNode::folder(segment, &node_path)
                });
                children.len() - 1
            }
        };
        current = &mut children[pos];
    }

    if current.is_folder() {
        warn!("'{path}' ya existe como carpeta en el árbol; se mantiene como carpeta");
    }
}

/// Ingesta completa: ZIP → índice + árbol. O todo o nada: si falla la
/// descompresión no se devuelve nada parcial.
pub fn ingest_archive(bytes: &[u8]) -> AppResult<IngestedCodebase> {
    let (entries, summary) = read_archive(bytes)?;

    let mut index = FileIndex::new();
    for entry in entries {
        let path = normalize_path(&entry.path);
        if entry.is_dir || path.is_empty() {
            continue;
        }
        let text = String::from_utf8_lossy(&entry.bytes).into_owned();
        index.insert(path, text);
    }

    if index.is_empty() {
        warn!("El ZIP no contiene ficheros con extensión soportada");
    }

    let tree = build_path_tree(index.paths());
    info!(
        "ZIP ingerido: {} ficheros en el índice, {} nodos en el árbol. {}",
        index.len(),
        tree.node_count(),
        summary
    );

    Ok(IngestedCodebase {
        index,
        tree,
        summary,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::NodeKind;
    use std::io::Write;
    use zip::{write::SimpleFileOptions, ZipWriter};

    /// Construye un ZIP en memoria. Las rutas que terminan en '/' son directorios.
    pub(crate) fn build_zip(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();
        for (path, content) in entries {
            if path.ends_with('/') {
                writer.add_directory(*path, options).expect("add directory");
            } else {
                writer.start_file(*path, options).expect("start file");
                writer.write_all(content.as_bytes()).expect("write file");
            }
        }
        writer.finish().expect("finish zip").into_inner()
    }

    fn names(node: &FileTreeNode) -> Vec<&str> {
        node.children().iter().map(|c| c.name.as_str()).collect()
    }

    #[test]
    fn keeps_allow_listed_files_and_builds_tree() {
        let zip = build_zip(&[
            ("src/", ""),
            ("src/a.ts", "foo"),
            ("src/b.md", "bar"),
            ("README.exe", "MZ"),
        ]);
        let codebase = ingest_archive(&zip).unwrap();

        assert_eq!(codebase.index.len(), 2);
        assert_eq!(codebase.index.get_content("src/a.ts").unwrap(), "foo");
        assert_eq!(codebase.index.get_content("src/b.md").unwrap(), "bar");
        assert!(codebase.index.get_content("README.exe").is_err());

        let root = &codebase.tree;
        assert_eq!(names(root), vec!["src"]);
        let src = &root.children()[0];
        assert_eq!(src.kind, NodeKind::Folder);
        assert_eq!(src.path, "src");
        assert_eq!(names(src), vec!["a.ts", "b.md"]);
        assert!(src.children().iter().all(|c| c.kind == NodeKind::File));
        assert_eq!(src.children()[1].path, "src/b.md");

        assert_eq!(
            codebase.summary,
            IngestionSummary {
                entries_scanned: 4,
                directories: 1,
                files_kept: 2,
                files_skipped: 1,
            }
        );
    }

    #[test]
    fn search_candidates_come_from_ingested_index() {
        let zip = build_zip(&[("src/a.ts", "foo"), ("src/b.md", "bar"), ("README.exe", "")]);
        let codebase = ingest_archive(&zip).unwrap();
        let hits = codebase.index.filter_by_substring("foo");
        assert_eq!(hits, vec![("src/a.ts", "foo")]);
        assert_eq!(crate::index::format_search_snippet(&hits), "File: src/a.ts\n\nfoo");
    }

    #[test]
    fn directory_entries_are_read_but_never_indexed() {
        let zip = build_zip(&[("src/", ""), ("src/a.ts", "foo")]);
        let (entries, summary) = read_archive(&zip).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].is_dir);
        assert!(entries[0].bytes.is_empty());
        assert!(!entries[1].is_dir);
        assert_eq!(summary.directories, 1);
        assert_eq!(summary.files_kept, 1);

        let codebase = ingest_archive(&zip).unwrap();
        assert_eq!(codebase.index.paths().collect::<Vec<_>>(), vec!["src/a.ts"]);
        assert!(codebase.index.get_content("src").is_err());
    }

    #[test]
    fn archive_without_kept_files_gives_empty_index_and_bare_root() {
        let zip = build_zip(&[("bin/tool.exe", "x"), ("img/logo.png", "y"), ("Makefile", "z")]);
        let codebase = ingest_archive(&zip).unwrap();
        assert!(codebase.index.is_empty());
        assert!(codebase.tree.children().is_empty());
        assert_eq!(codebase.tree.node_count(), 1);
    }

    #[test]
    fn extension_match_is_case_sensitive_suffix() {
        assert!(is_kept_path("a/b/c.tsx"));
        assert!(is_kept_path("notes.md"));
        assert!(!is_kept_path("MAIN.PY"));
        assert!(!is_kept_path("archive.json.bak"));
    }

    #[test]
    fn corrupt_input_is_a_decode_error() {
        let err = ingest_archive(b"definitely not a zip file").unwrap_err();
        assert!(matches!(err, AppError::Decode(_)));
    }

    #[test]
    fn empty_segments_are_dropped_from_keys() {
        assert_eq!(normalize_path("/src//a.ts"), "src/a.ts");
        assert_eq!(normalize_path("src/lib/"), "src/lib");
        let tree = build_path_tree(["src//lib/x.js"]);
        assert_eq!(tree.find("src/lib/x.js").map(|n| n.path.as_str()), Some("src/lib/x.js"));
    }

    #[test]
    fn every_indexed_path_has_a_file_leaf() {
        let zip = build_zip(&[
            ("app/main.go", "package main"),
            ("app/web/index.html", "<html>"),
            ("app/web/site.css", "body{}"),
            ("docs/guide.md", "# guide"),
        ]);
        let codebase = ingest_archive(&zip).unwrap();
        for path in codebase.index.paths() {
            let node = codebase.tree.find(path).expect("leaf for indexed path");
            assert_eq!(node.kind, NodeKind::File);
            assert_eq!(node.path, path);
        }
    }

    #[test]
    fn prefix_paths_are_ancestors() {
        let tree = build_path_tree(["a/b/c.ts", "a/d.ts", "e.ts"]);
        let a = tree.find("a").unwrap();
        assert_eq!(a.kind, NodeKind::Folder);
        assert!(a.find("b/c.ts").is_some());
        assert!(a.find("d.ts").is_some());
        assert_eq!(names(&tree), vec!["a", "e.ts"]);
    }

    #[test]
    fn sibling_order_is_first_seen_order() {
        let tree = build_path_tree(["z/1.ts", "a/2.ts", "z/0.ts"]);
        assert_eq!(names(&tree), vec!["z", "a"]);
        assert_eq!(names(tree.find("z").unwrap()), vec!["1.ts", "0.ts"]);
    }

    #[test]
    fn duplicate_paths_do_not_create_nodes() {
        let once = build_path_tree(["src/a.ts", "src/b.ts"]);
        let twice = build_path_tree(["src/a.ts", "src/a.ts", "src/b.ts", "src/a.ts"]);
        assert_eq!(once, twice);
        assert_eq!(twice.node_count(), 4);
    }

    #[test]
    fn building_twice_is_identical() {
        let paths = ["x/y/z.py", "x/w.py", "q.json", "x/y/k.py"];
        assert_eq!(build_path_tree(paths), build_path_tree(paths));
    }

    #[test]
    fn kind_is_fixed_at_first_creation() {
        // Fichero primero, luego usado como carpeta: la segunda ruta no se cuelga.
        let tree = build_path_tree(["a", "a/b"]);
        assert_eq!(tree.find("a").map(|n| n.kind), Some(NodeKind::File));
        assert!(tree.find("a/b").is_none());

        // Carpeta primero, luego como fichero: sigue siendo carpeta.
        let tree = build_path_tree(["a/b", "a"]);
        assert_eq!(tree.find("a").map(|n| n.kind), Some(NodeKind::Folder));
        assert_eq!(tree.node_count(), 3);
    }
}
