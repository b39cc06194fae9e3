//! Build reference descriptors from a dataset directory.
//!
//! Layout: one subdirectory per label, each holding sample images of that person.
//! ```text
//! dataset/
//!   alice/  1.jpg 2.jpg
//!   bob/    a.png
//! ```

use crate::decode;
use crate::matcher::{FaceMatcher, LabeledDescriptors, MatcherError};
use crate::pipeline::{FacePipeline, PipelineError};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EnrollmentError {
    #[error("failed to read dataset directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("analysis of {path} failed: {source}")]
    Pipeline {
        path: PathBuf,
        #[source]
        source: PipelineError,
    },
    #[error(transparent)]
    Matcher(#[from] MatcherError),
}

/// Enroll every label directory under `dir`.
///
/// Each image contributes the descriptor of its most confident face. Images
/// that do not decode or show no face are skipped, as are labels left with
/// no descriptors. Inference errors abort enrollment.
pub fn enroll_dataset(
    dir: &Path,
    pipeline: &mut dyn FacePipeline,
) -> Result<Vec<LabeledDescriptors>, EnrollmentError> {
    let mut labeled = Vec::new();

    for label_dir in visible_entries(dir)? {
        if !label_dir.is_dir() {
            continue;
        }
        let Some(label) = label_dir.file_name().and_then(|n| n.to_str()).map(str::to_owned) else {
            tracing::warn!(path = %label_dir.display(), "skipping label directory with non-UTF-8 name");
            continue;
        };

        let mut descriptors = Vec::new();
        for image_path in visible_entries(&label_dir)? {
            if !image_path.is_file() {
                continue;
            }
            let image = match decode::load_rgb(&image_path) {
                Ok(image) => image,
                Err(e) => {
                    tracing::warn!(path = %image_path.display(), error = %e, "skipping unreadable sample");
                    continue;
                }
            };
            let faces = pipeline.analyze(&image).map_err(|source| EnrollmentError::Pipeline {
                path: image_path.clone(),
                source,
            })?;
            match faces.into_iter().next() {
                Some(face) => descriptors.push(face.descriptor),
                None => tracing::warn!(path = %image_path.display(), "no face in sample, skipping"),
            }
        }

        if descriptors.is_empty() {
            tracing::warn!(label = %label, "label has no usable samples, skipping");
            continue;
        }

        tracing::info!(label = %label, samples = descriptors.len(), "enrolled label");
        labeled.push(LabeledDescriptors::new(label, descriptors)?);
    }

    Ok(labeled)
}

/// Enroll `dir` and wrap the result in a matcher.
pub fn build_matcher(
    dir: &Path,
    pipeline: &mut dyn FacePipeline,
    distance_threshold: f32,
) -> Result<FaceMatcher, EnrollmentError> {
    let labeled = enroll_dataset(dir, pipeline)?;
    Ok(FaceMatcher::new(labeled, distance_threshold)?)
}

/// Non-hidden entries of `dir`, sorted by path.
fn visible_entries(dir: &Path) -> Result<Vec<PathBuf>, EnrollmentError> {
    let read_err = |source| EnrollmentError::ReadDir { path: dir.to_path_buf(), source };

    let mut entries = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(read_err)? {
        let entry = entry.map_err(read_err)?;
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }
        entries.push(entry.path());
    }
    entries.sort();
    Ok(entries)
}
