//! Per-building geometric feature artifact
//!
//! The feature table is produced by an external extraction pipeline and has
//! shipped in two shapes: a flat columnar (parquet) table of
//! `(building_id, feature_name, value)` rows, and a legacy nested JSON
//! document of `{feature_name -> {"cands": {building_id -> value}}}`. Both
//! are materialized into the same in-memory [`FeatureMap`] keyed by
//! normalized building identifier, with all values converted to plain Rust
//! scalars/vectors — no columnar-library types leak past this module.

use crate::error::{Result, ServerError};
use crate::ident;
use arrow_array::{Array, Float64Array, Int64Array, StringArray};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::path::{Path, PathBuf};

/// A single feature value, already normalized to plain Rust types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    /// Scalar numeric feature
    Number(f64),
    /// Non-numeric feature
    Text(String),
    /// Numeric-vector feature (e.g. a shape descriptor)
    Vector(Vec<f64>),
}

/// Normalized building id -> feature name -> value
pub type FeatureMap = HashMap<String, BTreeMap<String, FeatureValue>>;

/// Where the feature artifact lives, with the shape made explicit.
///
/// Detection happens once at the loader boundary; nothing downstream
/// branches on source shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeatureSource {
    /// Flat parquet table with columns (building_id, feature_name, value)
    FlatTable(PathBuf),
    /// Legacy nested JSON of {feature -> {"cands": {building_id -> value}}}
    LegacyNested(PathBuf),
}

impl FeatureSource {
    /// Path to the backing artifact
    pub fn path(&self) -> &Path {
        match self {
            FeatureSource::FlatTable(p) | FeatureSource::LegacyNested(p) => p,
        }
    }
}

/// Detect the available feature source under the data directory.
///
/// The flat parquet table is preferred over the legacy nested document when
/// both exist.
pub fn detect_source(parquet_path: &Path, legacy_path: &Path) -> Option<FeatureSource> {
    if parquet_path.is_file() {
        Some(FeatureSource::FlatTable(parquet_path.to_path_buf()))
    } else if legacy_path.is_file() {
        Some(FeatureSource::LegacyNested(legacy_path.to_path_buf()))
    } else {
        None
    }
}

/// Load the feature artifact into a [`FeatureMap`].
///
/// Fails with `NotFound` when the backing file is absent and `Parse` when it
/// is malformed. A source that exists but contains zero usable rows yields
/// an empty map, not an error.
pub fn load_features(source: &FeatureSource) -> Result<FeatureMap> {
    if !source.path().is_file() {
        return Err(ServerError::not_found(format!(
            "feature source not found at {}",
            source.path().display()
        )));
    }

    let map = match source {
        FeatureSource::FlatTable(path) => load_flat_table(path)?,
        FeatureSource::LegacyNested(path) => load_legacy_nested(path)?,
    };

    tracing::info!(
        source = %source.path().display(),
        buildings = map.len(),
        "feature artifact loaded"
    );
    Ok(map)
}

/// Group a flat (building_id, feature_name, value) table by building
fn load_flat_table(path: &Path) -> Result<FeatureMap> {
    let file = File::open(path)?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)
        .map_err(|e| ServerError::parse(format!("{}: {}", path.display(), e)))?
        .build()
        .map_err(|e| ServerError::parse(format!("{}: {}", path.display(), e)))?;

    let mut map = FeatureMap::new();
    for batch in reader {
        let batch = batch.map_err(|e| ServerError::parse(format!("{}: {}", path.display(), e)))?;
        let schema = batch.schema();

        let building_col = schema
            .index_of("building_id")
            .map_err(|e| ServerError::parse(e.to_string()))?;
        let feature_col = schema
            .index_of("feature_name")
            .map_err(|e| ServerError::parse(e.to_string()))?;
        let value_col = schema
            .index_of("value")
            .map_err(|e| ServerError::parse(e.to_string()))?;

        let building_ids = batch
            .column(building_col)
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| ServerError::parse("building_id column is not utf8"))?;
        let feature_names = batch
            .column(feature_col)
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| ServerError::parse("feature_name column is not utf8"))?;
        let values = batch.column(value_col);

        for row in 0..batch.num_rows() {
            if building_ids.is_null(row) || feature_names.is_null(row) {
                continue;
            }
            let Some(value) = arrow_value(values.as_ref(), row) else {
                continue;
            };
            let building_id = ident::normalize(building_ids.value(row));
            let feature_name = feature_names.value(row).to_string();
            map.entry(building_id)
                .or_default()
                .insert(feature_name, value);
        }
    }

    Ok(map)
}

/// Convert one arrow cell into a plain [`FeatureValue`]
fn arrow_value(column: &dyn Array, row: usize) -> Option<FeatureValue> {
    if column.is_null(row) {
        return None;
    }
    if let Some(floats) = column.as_any().downcast_ref::<Float64Array>() {
        return Some(FeatureValue::Number(floats.value(row)));
    }
    if let Some(ints) = column.as_any().downcast_ref::<Int64Array>() {
        return Some(FeatureValue::Number(ints.value(row) as f64));
    }
    if let Some(strings) = column.as_any().downcast_ref::<StringArray>() {
        return Some(FeatureValue::Text(strings.value(row).to_string()));
    }
    tracing::warn!(row, "unsupported value column type in feature table");
    None
}

/// Transpose the legacy {feature -> {"cands": {building -> value}}} document
fn load_legacy_nested(path: &Path) -> Result<FeatureMap> {
    let raw = std::fs::read_to_string(path)?;
    let doc: JsonValue = serde_json::from_str(&raw)
        .map_err(|e| ServerError::parse(format!("{}: {}", path.display(), e)))?;

    let Some(features) = doc.as_object() else {
        return Err(ServerError::parse(format!(
            "{}: expected top-level object",
            path.display()
        )));
    };

    let mut map = FeatureMap::new();
    for (feature_name, feature_data) in features {
        // Entries without a "cands" object are not per-building features
        let Some(cands) = feature_data.get("cands").and_then(|c| c.as_object()) else {
            continue;
        };
        for (building_id, value) in cands {
            let Some(value) = json_feature_value(value) else {
                continue;
            };
            map.entry(ident::normalize(building_id))
                .or_default()
                .insert(feature_name.clone(), value);
        }
    }

    Ok(map)
}

/// Convert a legacy JSON value into a plain [`FeatureValue`]
fn json_feature_value(value: &JsonValue) -> Option<FeatureValue> {
    match value {
        JsonValue::Number(n) => n.as_f64().map(FeatureValue::Number),
        JsonValue::String(s) => Some(FeatureValue::Text(s.clone())),
        JsonValue::Array(items) => {
            let floats: Option<Vec<f64>> = items.iter().map(|v| v.as_f64()).collect();
            floats.map(FeatureValue::Vector)
        }
        _ => None,
    }
}
