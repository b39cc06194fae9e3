//! Facial expression classification with the FER+ model.

use crate::alignment;
use crate::types::{BoundingBox, Expression};
use image::{imageops, RgbImage};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const FERPLUS_INPUT_SIZE: u32 = 64;
const FERPLUS_CROP_SCALE: f32 = 1.0;

#[derive(Error, Debug)]
pub enum ExpressionError {
    #[error("model file not found: {0} — download emotion-ferplus-8 from the ONNX model zoo")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

pub struct ExpressionClassifier {
    session: Session,
}

impl ExpressionClassifier {
    pub fn load(model_path: &Path, intra_threads: usize) -> Result<Self, ExpressionError> {
        if !model_path.exists() {
            return Err(ExpressionError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(intra_threads)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = %model_path.display(),
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded FER+ model"
        );

        Ok(Self { session })
    }

    /// Probability per expression class, in [`Expression::ALL`] order.
    pub fn classify(
        &mut self,
        image: &RgbImage,
        face: &BoundingBox,
    ) -> Result<Vec<(Expression, f32)>, ExpressionError> {
        let crop = alignment::crop_square(image, face, FERPLUS_CROP_SCALE, FERPLUS_INPUT_SIZE);
        let input = preprocess(&crop);

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;
        let (_, logits) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ExpressionError::InferenceFailed(format!("ferplus: {e}")))?;

        if logits.len() != Expression::ALL.len() {
            return Err(ExpressionError::InferenceFailed(format!(
                "expected {} expression scores, got {}",
                Expression::ALL.len(),
                logits.len()
            )));
        }

        Ok(Expression::ALL.into_iter().zip(softmax(logits)).collect())
    }
}

/// Single-channel luma tensor with raw 0..255 values.
fn preprocess(crop: &RgbImage) -> Array4<f32> {
    let size = FERPLUS_INPUT_SIZE as usize;
    let gray = imageops::grayscale(crop);
    let mut tensor = Array4::<f32>::zeros((1, 1, size, size));
    for (x, y, px) in gray.enumerate_pixels() {
        tensor[[0, 0, y as usize, x as usize]] = px.0[0] as f32;
    }
    tensor
}

/// Pick the most probable expression. Ties keep the earlier class.
pub fn dominant(expressions: &[(Expression, f32)]) -> Option<(Expression, f32)> {
    expressions
        .iter()
        .copied()
        .fold(None, |best, cur| match best {
            Some((_, p)) if p >= cur.1 => best,
            _ => Some(cur),
        })
}

pub(crate) fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|l| (l - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}
