//! Best-match lookup of a face descriptor against labeled reference descriptors.

use crate::types::Embedding;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Label reported when no reference set is close enough.
pub const UNKNOWN_LABEL: &str = "unknown";

/// Euclidean distance below which a match is accepted (L2-normalized ArcFace descriptors).
pub const DEFAULT_DISTANCE_THRESHOLD: f32 = 1.1;

#[derive(Error, Debug)]
pub enum MatcherError {
    #[error("label must not be empty")]
    EmptyLabel,
    #[error("label {0:?} has no descriptors")]
    NoDescriptors(String),
    #[error("matcher needs at least one labeled descriptor set")]
    EmptyGallery,
}

/// Reference descriptors enrolled under one label.
#[derive(Debug, Clone)]
pub struct LabeledDescriptors {
    label: String,
    descriptors: Vec<Embedding>,
}

impl LabeledDescriptors {
    pub fn new(label: impl Into<String>, descriptors: Vec<Embedding>) -> Result<Self, MatcherError> {
        let label = label.into();
        if label.is_empty() {
            return Err(MatcherError::EmptyLabel);
        }
        if descriptors.is_empty() {
            return Err(MatcherError::NoDescriptors(label));
        }
        Ok(Self { label, descriptors })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn descriptors(&self) -> &[Embedding] {
        &self.descriptors
    }
}

/// Outcome of a lookup: the best label and its mean distance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FaceMatch {
    pub label: String,
    pub distance: f32,
}

impl FaceMatch {
    pub fn is_unknown(&self) -> bool {
        self.label == UNKNOWN_LABEL
    }
}

impl fmt::Display for FaceMatch {
    /// `label (distance)`, distance floored to two decimals.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.label, floor_two_decimals(self.distance))
    }
}

/// Truncate the shortest decimal form of a non-negative value to two places.
///
/// Works on the printed digits so `0.29` stays `0.29` instead of picking up
/// the binary error of `0.29 * 100`.
fn floor_two_decimals(value: f32) -> String {
    let text = value.to_string();
    let Some((whole, frac)) = text.split_once('.') else {
        return text;
    };
    let frac = frac[..frac.len().min(2)].trim_end_matches('0');
    if frac.is_empty() {
        whole.to_string()
    } else {
        format!("{whole}.{frac}")
    }
}

/// Nearest-label matcher. Built once, read-only afterwards.
#[derive(Debug, Clone)]
pub struct FaceMatcher {
    labeled: Vec<LabeledDescriptors>,
    distance_threshold: f32,
}

impl FaceMatcher {
    pub fn new(labeled: Vec<LabeledDescriptors>, distance_threshold: f32) -> Result<Self, MatcherError> {
        if labeled.is_empty() {
            return Err(MatcherError::EmptyGallery);
        }
        Ok(Self { labeled, distance_threshold })
    }

    pub fn labeled(&self) -> &[LabeledDescriptors] {
        &self.labeled
    }

    pub fn distance_threshold(&self) -> f32 {
        self.distance_threshold
    }

    /// Find the label whose descriptors are closest on average to `probe`.
    ///
    /// A best distance that is not strictly below the threshold yields
    /// [`UNKNOWN_LABEL`] with that distance.
    pub fn find_best_match(&self, probe: &Embedding) -> FaceMatch {
        let mut best_label = UNKNOWN_LABEL;
        let mut best_distance = f32::INFINITY;

        for set in &self.labeled {
            let distance = compute_mean_distance(probe, &set.descriptors);
            if distance < best_distance {
                best_distance = distance;
                best_label = &set.label;
            }
        }

        if best_distance < self.distance_threshold {
            FaceMatch { label: best_label.to_string(), distance: best_distance }
        } else {
            FaceMatch { label: UNKNOWN_LABEL.to_string(), distance: best_distance }
        }
    }
}

/// Mean Euclidean distance from `probe` to each reference descriptor.
pub fn compute_mean_distance(probe: &Embedding, descriptors: &[Embedding]) -> f32 {
    if descriptors.is_empty() {
        return f32::INFINITY;
    }
    descriptors
        .iter()
        .map(|d| probe.euclidean_distance(d))
        .sum::<f32>()
        / descriptors.len() as f32
}
