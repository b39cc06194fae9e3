use facescan_core::{FaceMatch, FaceMatcher, FacePipeline, PipelineError};
use image::RgbImage;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("face analysis failed: {0}")]
    Pipeline(#[from] PipelineError),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// One detected face, rendered for the response.
#[derive(Debug, Clone)]
pub struct FaceReport {
    pub description: String,
    pub best_match: FaceMatch,
}

/// Messages sent from HTTP handlers to the engine thread.
enum EngineRequest {
    Analyze {
        image: RgbImage,
        reply: oneshot::Sender<Result<Vec<FaceReport>, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
    labels: usize,
}

impl EngineHandle {
    /// Analyze an image and match every detected face against the enrolled labels.
    pub async fn analyze(&self, image: RgbImage) -> Result<Vec<FaceReport>, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Analyze { image, reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Number of enrolled labels the matcher was built with.
    pub fn labels(&self) -> usize {
        self.labels
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// The thread owns the models and the matcher; requests are served one at a time.
pub fn spawn_engine(
    mut pipeline: Box<dyn FacePipeline>,
    matcher: FaceMatcher,
) -> Result<EngineHandle, EngineError> {
    let labels = matcher.labeled().len();
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("facescan-engine".into())
        .spawn(move || {
            tracing::info!(labels, "engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Analyze { image, reply } => {
                        let result = run_analyze(pipeline.as_mut(), &matcher, &image);
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok(EngineHandle { tx, labels })
}

/// Detect, describe, and match every face in one image.
fn run_analyze(
    pipeline: &mut dyn FacePipeline,
    matcher: &FaceMatcher,
    image: &RgbImage,
) -> Result<Vec<FaceReport>, EngineError> {
    let faces = pipeline.analyze(image)?;
    tracing::debug!(
        faces = faces.len(),
        width = image.width(),
        height = image.height(),
        "analyze: detection finished"
    );

    Ok(faces
        .iter()
        .map(|face| {
            let description = facescan_core::describe(face);
            let best_match = matcher.find_best_match(&face.descriptor);
            tracing::info!(%description, best_match = %best_match, "face");
            FaceReport { description, best_match }
        })
        .collect())
}
