//! CityJSON-like geometry documents: model, candidate-path loading, and
//! single-building extraction
//!
//! A geometry document stores one shared vertex table and per-object
//! boundaries that reference vertices by index. Extraction produces a
//! minimal self-contained document for one building: only the vertices that
//! object references, with every boundary index rewritten through a
//! renumbering map.

use crate::error::{Result, ServerError};
use crate::resolve;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

/// A versioned CityJSON-like document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeometryDocument {
    /// Document type tag (e.g. "CityJSON")
    #[serde(rename = "type", default)]
    pub doc_type: Option<String>,

    /// Format version; string in CityJSON, left untyped here
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<JsonValue>,

    /// City objects keyed by external building identifier
    #[serde(rename = "CityObjects", default)]
    pub city_objects: BTreeMap<String, CityObject>,

    /// Shared vertex table; boundaries reference entries by index
    #[serde(default)]
    pub vertices: Vec<[f64; 3]>,

    /// Optional coordinate transform (scale/translate)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<JsonValue>,

    /// Optional document metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<JsonValue>,
}

/// One city object holding one or more geometry records
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CityObject {
    /// Object type (e.g. "Building")
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub object_type: Option<String>,

    /// Free-form per-object attributes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<JsonValue>,

    /// Geometry records (solid or multi-surface boundaries)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub geometry: Vec<GeometryRecord>,

    /// Fields not modeled here (children, parents, ...) round-trip untouched
    #[serde(flatten)]
    pub extra: BTreeMap<String, JsonValue>,
}

/// One geometry record with a nested boundary structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeometryRecord {
    /// Geometry type: "Solid" (shell -> face -> ring -> index, 4 deep) or
    /// "MultiSurface" (surface -> ring -> index, 3 deep)
    #[serde(rename = "type")]
    pub geometry_type: String,

    /// Level of detail
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lod: Option<JsonValue>,

    /// Raw nested index arrays; depth varies by geometry type
    pub boundaries: JsonValue,

    /// Semantics/material/texture round-trip untouched
    #[serde(flatten)]
    pub extra: BTreeMap<String, JsonValue>,
}

/// Build the ordered candidate path list for a requested geometry file.
///
/// The source datasets have shipped under several directory conventions:
/// nested under `<nested_root>/Source A` (with space) or `SourceA` (without),
/// or flat under the data directory. The requested path is tried as-is
/// first, then its bare file name under each known source directory.
pub fn candidate_paths(data_dir: &Path, nested_root: &str, requested: &str) -> Vec<PathBuf> {
    let file_name = Path::new(requested)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| requested.to_string());

    let nested = data_dir.join(nested_root);
    let mut paths = vec![data_dir.join(requested)];
    for source_dir in ["Source A", "Source B", "SourceA", "SourceB"] {
        paths.push(nested.join(source_dir).join(&file_name));
    }
    paths.push(nested.join(requested));
    paths
}

/// Load a geometry document from the first candidate that is a regular file.
///
/// Fails with `NotFound` when none exists and `Parse` when the chosen file
/// is not well-formed.
pub fn load_geometry(candidates: &[PathBuf]) -> Result<GeometryDocument> {
    let found = candidates.iter().find(|p| p.is_file());

    let Some(path) = found else {
        tracing::debug!(tried = candidates.len(), "no geometry candidate exists");
        return Err(ServerError::not_found(format!(
            "geometry file not found; tried {} candidate paths",
            candidates.len()
        )));
    };

    tracing::debug!(path = %path.display(), "loading geometry file");
    let raw = std::fs::read_to_string(path)?;
    serde_json::from_str(&raw)
        .map_err(|e| ServerError::parse(format!("{}: {}", path.display(), e)))
}

/// Extract the minimal self-contained subgraph for one building.
///
/// The target is located with the resolver cascade over the document's
/// object-id keyspace. The output contains exactly the vertices the object
/// references (in renumbered order) and the single city object with its
/// boundaries rewritten through the renumbering map.
pub fn extract_building(doc: &GeometryDocument, target_id: &str) -> Result<GeometryDocument> {
    let keys: Vec<&str> = doc.city_objects.keys().map(|k| k.as_str()).collect();
    let Some((matched, step)) = resolve::resolve(target_id, &keys) else {
        return Err(ServerError::not_found(format!(
            "building '{target_id}' not found in geometry document"
        )));
    };

    tracing::debug!(requested = target_id, matched, step = ?step, "resolved building in geometry");

    let object = &doc.city_objects[matched];

    // Collect every vertex index referenced through any boundary nesting
    let mut referenced = BTreeSet::new();
    for record in &object.geometry {
        collect_indices(&record.boundaries, &mut referenced);
    }

    // Renumber over the sorted set of in-range indices; out-of-range
    // references indicate a defective source document and are skipped
    let vertex_count = doc.vertices.len();
    let mut renumber = HashMap::new();
    let mut vertices = Vec::new();
    for &old in &referenced {
        if old < vertex_count {
            renumber.insert(old, vertices.len());
            vertices.push(doc.vertices[old]);
        } else {
            tracing::warn!(
                index = old,
                vertex_count,
                object = matched,
                "boundary references vertex out of range, skipping"
            );
        }
    }

    let mut extracted = object.clone();
    for record in &mut extracted.geometry {
        record.boundaries = rewrite_boundaries(&record.boundaries, &renumber);
    }

    let mut city_objects = BTreeMap::new();
    city_objects.insert(matched.to_string(), extracted);

    Ok(GeometryDocument {
        doc_type: doc.doc_type.clone(),
        version: doc.version.clone(),
        city_objects,
        vertices,
        transform: doc.transform.clone(),
        metadata: doc.metadata.clone(),
    })
}

/// Recursively collect integer leaves from a nested boundary structure.
///
/// Handles both the 4-deep solid nesting and the 3-deep multi-surface
/// nesting (and anything else array-shaped) with one walk.
fn collect_indices(boundaries: &JsonValue, out: &mut BTreeSet<usize>) {
    match boundaries {
        JsonValue::Number(n) => {
            if let Some(idx) = n.as_u64() {
                out.insert(idx as usize);
            }
        }
        JsonValue::Array(items) => {
            for item in items {
                collect_indices(item, out);
            }
        }
        _ => {}
    }
}

/// Rewrite integer leaves through the renumbering map, preserving structure.
///
/// Indices absent from the map (out-of-range in the source) are dropped from
/// their ring.
fn rewrite_boundaries(boundaries: &JsonValue, renumber: &HashMap<usize, usize>) -> JsonValue {
    match boundaries {
        JsonValue::Array(items) => {
            let rewritten: Vec<JsonValue> = items
                .iter()
                .filter_map(|item| match item {
                    JsonValue::Number(n) => n
                        .as_u64()
                        .and_then(|idx| renumber.get(&(idx as usize)))
                        .map(|&new| JsonValue::from(new)),
                    other => Some(rewrite_boundaries(other, renumber)),
                })
                .collect();
            JsonValue::Array(rewritten)
        }
        other => other.clone(),
    }
}
