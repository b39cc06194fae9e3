//! Age and gender estimation with the InsightFace `genderage` model.

use crate::alignment;
use crate::expression::softmax;
use crate::types::{AgeGender, BoundingBox, Gender};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const GENDERAGE_INPUT_SIZE: u32 = 96;
const GENDERAGE_CROP_SCALE: f32 = 1.5;

#[derive(Error, Debug)]
pub enum AttributeError {
    #[error("model file not found: {0} — download from insightface and place in the model directory")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

pub struct AgeGenderEstimator {
    session: Session,
}

impl AgeGenderEstimator {
    pub fn load(model_path: &Path, intra_threads: usize) -> Result<Self, AttributeError> {
        if !model_path.exists() {
            return Err(AttributeError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(intra_threads)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = %model_path.display(),
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded genderage model"
        );

        Ok(Self { session })
    }

    pub fn estimate(&mut self, image: &RgbImage, face: &BoundingBox) -> Result<AgeGender, AttributeError> {
        let crop = alignment::crop_square(image, face, GENDERAGE_CROP_SCALE, GENDERAGE_INPUT_SIZE);
        let input = preprocess(&crop);

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;
        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| AttributeError::InferenceFailed(format!("genderage: {e}")))?;

        interpret(raw)
    }
}

/// Raw pixel values, no normalization; the model carries its own input scaling.
fn preprocess(crop: &RgbImage) -> Array4<f32> {
    let size = GENDERAGE_INPUT_SIZE as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    for (x, y, px) in crop.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = px.0[c] as f32;
        }
    }
    tensor
}

/// Output layout: [female_logit, male_logit, age / 100].
fn interpret(raw: &[f32]) -> Result<AgeGender, AttributeError> {
    let &[female, male, age, ..] = raw else {
        return Err(AttributeError::InferenceFailed(format!(
            "expected 3 genderage outputs, got {}",
            raw.len()
        )));
    };

    let probs = softmax(&[female, male]);
    let (gender, gender_probability) = if probs[1] > probs[0] {
        (Gender::Male, probs[1])
    } else {
        (Gender::Female, probs[0])
    };

    Ok(AgeGender {
        age: (age * 100.0).max(0.0),
        gender,
        gender_probability,
    })
}
