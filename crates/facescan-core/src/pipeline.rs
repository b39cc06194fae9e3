//! Sequential per-image analysis: detect, then classify and describe each face.

use crate::attributes::{AgeGenderEstimator, AttributeError};
use crate::detector::{DetectorError, DetectorOptions, FaceDetector};
use crate::expression::{ExpressionClassifier, ExpressionError};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::FaceAnalysis;
use image::RgbImage;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DETECTOR_MODEL: &str = "det_10g.onnx";
pub const RECOGNIZER_MODEL: &str = "w600k_r50.onnx";
pub const GENDERAGE_MODEL: &str = "genderage.onnx";
pub const EXPRESSION_MODEL: &str = "emotion-ferplus-8.onnx";

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("detector: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer: {0}")]
    Recognizer(#[from] RecognizerError),
    #[error("age/gender: {0}")]
    Attributes(#[from] AttributeError),
    #[error("expression: {0}")]
    Expression(#[from] ExpressionError),
}

/// Anything that turns an RGB image into per-face analyses.
pub trait FacePipeline: Send {
    fn analyze(&mut self, image: &RgbImage) -> Result<Vec<FaceAnalysis>, PipelineError>;
}

/// Locations of the four ONNX models.
#[derive(Debug, Clone)]
pub struct ModelPaths {
    pub detector: PathBuf,
    pub recognizer: PathBuf,
    pub genderage: PathBuf,
    pub expression: PathBuf,
}

impl ModelPaths {
    /// Standard file names inside `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            detector: dir.join(DETECTOR_MODEL),
            recognizer: dir.join(RECOGNIZER_MODEL),
            genderage: dir.join(GENDERAGE_MODEL),
            expression: dir.join(EXPRESSION_MODEL),
        }
    }

    /// `(name, path)` pairs, in load order.
    pub fn entries(&self) -> [(&'static str, &Path); 4] {
        [
            ("detector", &self.detector),
            ("recognizer", &self.recognizer),
            ("genderage", &self.genderage),
            ("expression", &self.expression),
        ]
    }
}

/// Default model directory: `$FACESCAN_MODEL_DIR`, else `./models`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("FACESCAN_MODEL_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("models"))
}

/// The four loaded ONNX models, run one after another on each face.
pub struct FaceModels {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
    genderage: AgeGenderEstimator,
    expressions: ExpressionClassifier,
}

impl FaceModels {
    /// Load every model; fails on the first missing or invalid file.
    pub fn load(
        paths: &ModelPaths,
        options: DetectorOptions,
        intra_threads: usize,
    ) -> Result<Self, PipelineError> {
        let detector = FaceDetector::load(&paths.detector, options, intra_threads)?;
        let recognizer = FaceRecognizer::load(&paths.recognizer, intra_threads)?;
        let genderage = AgeGenderEstimator::load(&paths.genderage, intra_threads)?;
        let expressions = ExpressionClassifier::load(&paths.expression, intra_threads)?;
        tracing::info!("all face models loaded");

        Ok(Self {
            detector,
            recognizer,
            genderage,
            expressions,
        })
    }
}

impl FacePipeline for FaceModels {
    fn analyze(&mut self, image: &RgbImage) -> Result<Vec<FaceAnalysis>, PipelineError> {
        let detections = self.detector.detect(image)?;
        tracing::debug!(faces = detections.len(), "detection finished");

        let mut faces = Vec::with_capacity(detections.len());
        for detection in detections {
            if detection.landmarks.is_none() {
                tracing::warn!(confidence = detection.confidence, "face without landmarks skipped");
                continue;
            }

            let expressions = self.expressions.classify(image, &detection)?;
            let descriptor = self.recognizer.extract(image, &detection)?;
            let age_gender = self.genderage.estimate(image, &detection)?;

            faces.push(FaceAnalysis {
                detection,
                expressions,
                descriptor,
                age_gender,
            });
        }

        Ok(faces)
    }
}
