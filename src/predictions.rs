//! Candidate-match prediction artifact
//!
//! The blocking/candidate-generation stage (BKAFI) plus classifier produce,
//! per source building, a short list of plausible index-building matches
//! with confidence scores and optional predicted/ground-truth labels. The
//! persisted document is nested by result file:
//! `{file_name -> {building_id -> {"possible_matches": [...]}}}`.
//!
//! The loader flattens across files into one building-keyed map (files
//! processed in name order, last write wins on key collision) while keeping
//! the by-file structure for per-file classifier metrics.

use crate::error::{Result, ServerError};
use crate::ident;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Confidence cutoff above which an unlabeled pair counts as a positive
/// prediction
pub const CONFIDENCE_THRESHOLD: f64 = 0.5;

/// One predicted candidate/index building pairing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchCandidate {
    /// Target (index-dataset) building identifier
    pub index_id: String,

    /// Classifier confidence in [0, 1]
    pub confidence: f64,

    /// Predicted label (1 = match); derived from confidence when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predicted_label: Option<u8>,

    /// Ground-truth label when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub true_label: Option<u8>,
}

impl MatchCandidate {
    /// Predicted label, defaulting from the confidence threshold when the
    /// classifier did not emit one
    pub fn effective_predicted_label(&self) -> u8 {
        match self.predicted_label {
            Some(label) => label,
            None => u8::from(self.confidence > CONFIDENCE_THRESHOLD),
        }
    }
}

/// Per-building wire entry in the persisted document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildingEntry {
    /// Candidate pairings for this building
    #[serde(default)]
    pub possible_matches: Vec<MatchCandidate>,
}

/// Flattened and by-file views of the prediction document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PredictionArtifact {
    /// Normalized building id -> candidate pairings (last file wins)
    pub flat: HashMap<String, Vec<MatchCandidate>>,

    /// Original nested-by-file structure, building ids as persisted
    pub by_file: BTreeMap<String, BTreeMap<String, BuildingEntry>>,
}

impl PredictionArtifact {
    /// Total candidate pairs across all files
    pub fn total_pairs(&self) -> usize {
        count_pairs(&self.by_file)
    }

    /// Number of distinct candidate buildings in the flattened view
    pub fn unique_candidates(&self) -> usize {
        self.flat.len()
    }
}

/// Total candidate pairs across a by-file view.
///
/// Shared by [`PredictionArtifact::total_pairs`] and callers holding only
/// the cached by-file view.
pub fn count_pairs(by_file: &BTreeMap<String, BTreeMap<String, BuildingEntry>>) -> usize {
    by_file
        .values()
        .flat_map(|buildings| buildings.values())
        .map(|entry| entry.possible_matches.len())
        .sum()
}

/// Load the prediction document and build both views.
///
/// Fails with `NotFound` when the file is absent and `Parse` on malformed
/// JSON.
pub fn load_predictions(path: &Path) -> Result<PredictionArtifact> {
    if !path.is_file() {
        return Err(ServerError::not_found(format!(
            "prediction results not found at {}",
            path.display()
        )));
    }

    let raw = std::fs::read_to_string(path)?;
    let by_file: BTreeMap<String, BTreeMap<String, BuildingEntry>> = serde_json::from_str(&raw)
        .map_err(|e| ServerError::parse(format!("{}: {}", path.display(), e)))?;

    let mut flat = HashMap::new();
    for buildings in by_file.values() {
        for (building_id, entry) in buildings {
            // Last write wins; no merge across files
            flat.insert(
                ident::normalize(building_id),
                entry.possible_matches.clone(),
            );
        }
    }

    let artifact = PredictionArtifact { flat, by_file };
    tracing::info!(
        files = artifact.by_file.len(),
        buildings = artifact.unique_candidates(),
        pairs = artifact.total_pairs(),
        "prediction artifact loaded"
    );
    Ok(artifact)
}

/// Per-building match classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    /// At least one pair predicted positive with ground truth positive
    TrueMatch,
    /// At least one pair predicted positive with ground truth negative
    FalsePositive,
    /// Labeled pairs exist but none predicted positive correctly or not
    NoMatch,
    /// No ground-truth labels available for any pair
    None,
}

/// Derived per-building availability and match summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildingStatus {
    /// Whether the feature artifact has an entry for this building
    pub has_features: bool,
    /// Whether the prediction artifact has pairs for this building
    pub has_pairs: bool,
    /// Match classification over all of this building's pairs
    pub match_status: MatchStatus,
}

/// Classify a building from all of its candidate pairs.
///
/// Precedence: TrueMatch > FalsePositive > NoMatch > None.
pub fn match_status(pairs: &[MatchCandidate]) -> MatchStatus {
    let mut saw_false_positive = false;
    let mut saw_labeled = false;

    for pair in pairs {
        let Some(true_label) = pair.true_label else {
            continue;
        };
        saw_labeled = true;
        if pair.effective_predicted_label() == 1 {
            if true_label == 1 {
                return MatchStatus::TrueMatch;
            }
            saw_false_positive = true;
        }
    }

    if saw_false_positive {
        MatchStatus::FalsePositive
    } else if saw_labeled {
        MatchStatus::NoMatch
    } else {
        MatchStatus::None
    }
}

/// Aggregate classifier metrics for one result file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub true_positives: usize,
    pub false_positives: usize,
    pub true_negatives: usize,
    pub false_negatives: usize,
    /// Pairs with a known ground-truth label (metrics denominator)
    pub labeled_pairs: usize,
    /// All pairs in the file, labeled or not
    pub total_pairs: usize,
    /// Distinct candidate buildings in the file
    pub buildings: usize,
}

/// Compute aggregate metrics over one file's labeled pairs.
///
/// Unlabeled pairs are counted in `total_pairs` but excluded from the
/// confusion matrix. Returns `None` when the file is not present.
pub fn classifier_metrics(
    by_file: &BTreeMap<String, BTreeMap<String, BuildingEntry>>,
    file_name: &str,
) -> Option<FileMetrics> {
    let buildings = by_file.get(file_name)?;

    let (mut tp, mut fp, mut tn, mut fn_) = (0usize, 0usize, 0usize, 0usize);
    let mut total_pairs = 0usize;

    for entry in buildings.values() {
        for pair in &entry.possible_matches {
            total_pairs += 1;
            let Some(true_label) = pair.true_label else {
                continue;
            };
            match (pair.effective_predicted_label(), true_label) {
                (1, 1) => tp += 1,
                (1, _) => fp += 1,
                (_, 1) => fn_ += 1,
                _ => tn += 1,
            }
        }
    }

    let labeled = tp + fp + tn + fn_;
    let ratio = |num: usize, den: usize| {
        if den == 0 {
            0.0
        } else {
            num as f64 / den as f64
        }
    };
    let precision = ratio(tp, tp + fp);
    let recall = ratio(tp, tp + fn_);
    let f1 = if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    };

    Some(FileMetrics {
        accuracy: ratio(tp + tn, labeled),
        precision,
        recall,
        f1,
        true_positives: tp,
        false_positives: fp,
        true_negatives: tn,
        false_negatives: fn_,
        labeled_pairs: labeled,
        total_pairs,
        buildings: buildings.len(),
    })
}
