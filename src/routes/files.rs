//! Geometry file listing: /api/data/files
//!
//! The raw city data has shipped under several directory conventions
//! (`Source A` with a space, `SourceA` without, nested under the city root
//! or flat under the data directory). The listing probes each known layout
//! and returns the files under the first directory that exists per source.

use crate::state::AppState;
use axum::extract::State;
use axum::Json;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

/// One listed geometry file
#[derive(Serialize)]
pub struct FileEntry {
    /// Bare file name
    pub filename: String,
    /// Path relative to the data directory (or absolute when outside it)
    pub path: String,
    /// File size in bytes
    pub size: u64,
}

/// File listing grouped by source dataset
#[derive(Serialize)]
pub struct FilesResponse {
    pub source_a: Vec<FileEntry>,
    pub source_b: Vec<FileEntry>,
}

/// List available geometry files from Source A and Source B
///
/// GET /api/data/files
///
/// Missing directories yield empty lists, not errors.
pub async fn list_files(State(state): State<Arc<AppState>>) -> Json<FilesResponse> {
    let data_dir = &state.config.data_dir;
    let nested_root = &state.config.nested_root;

    let source_a = first_existing(data_dir, nested_root, &["Source A", "SourceA"]);
    let source_b = first_existing(data_dir, nested_root, &["Source B", "SourceB"]);

    let response = FilesResponse {
        source_a: source_a.map(|dir| list_json_files(&dir, data_dir)).unwrap_or_default(),
        source_b: source_b.map(|dir| list_json_files(&dir, data_dir)).unwrap_or_default(),
    };

    tracing::debug!(
        source_a = response.source_a.len(),
        source_b = response.source_b.len(),
        "listed geometry files"
    );
    Json(response)
}

/// Probe the known directory layouts and return the first that exists
fn first_existing(data_dir: &Path, nested_root: &str, names: &[&str]) -> Option<PathBuf> {
    let nested = data_dir.join(nested_root);
    let mut candidates: Vec<PathBuf> = Vec::new();
    for name in names {
        candidates.push(nested.join(name));
    }
    for name in names {
        candidates.push(data_dir.join(name));
    }
    candidates.push(data_dir.to_path_buf());

    candidates.into_iter().find(|p| p.is_dir())
}

/// Recursively list `.json` files under a directory
fn list_json_files(dir: &Path, data_dir: &Path) -> Vec<FileEntry> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).into_iter().filter_map(|e| e.ok()) {
        let path = entry.path();
        if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let Ok(meta) = entry.metadata() else {
            continue;
        };
        let rel = path
            .strip_prefix(data_dir)
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|_| path.to_path_buf());
        files.push(FileEntry {
            filename: path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
            path: rel.to_string_lossy().to_string(),
            size: meta.len(),
        });
    }
    files.sort_by(|a, b| a.path.cmp(&b.path));
    files
}
