//! facescan-core — Face analysis and matching engine.
//!
//! Uses SCRFD for detection, ArcFace for descriptors, InsightFace genderage
//! and FER+ for attributes, all running via ONNX Runtime for CPU inference.

pub mod alignment;
pub mod attributes;
pub mod decode;
pub mod describe;
pub mod detector;
pub mod enrollment;
pub mod expression;
pub mod matcher;
pub mod pipeline;
pub mod recognizer;
pub mod types;

pub use describe::describe;
pub use detector::DetectorOptions;
pub use matcher::{FaceMatch, FaceMatcher, LabeledDescriptors};
pub use pipeline::{default_model_dir, FaceModels, FacePipeline, ModelPaths, PipelineError};
pub use types::{AgeGender, BoundingBox, Embedding, Expression, FaceAnalysis, Gender};
