use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use facescan_core::matcher::DEFAULT_DISTANCE_THRESHOLD;
use facescan_core::{decode, enrollment, DetectorOptions, FaceModels, FacePipeline, ModelPaths};
use image::RgbImage;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "facescan", about = "facescan offline face analysis CLI")]
struct Cli {
    /// Directory containing the ONNX models (default: $FACESCAN_MODEL_DIR or ./models)
    #[arg(long, global = true)]
    model_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Describe every face in an image file or http(s) URL
    Analyze {
        /// Image path or URL
        image: String,
        /// Match faces against this dataset directory
        #[arg(short, long)]
        dataset: Option<PathBuf>,
        /// Euclidean distance below which a face matches a label
        #[arg(long, default_value_t = DEFAULT_DISTANCE_THRESHOLD)]
        threshold: f32,
        /// Detections at or below this score are dropped
        #[arg(long, default_value_t = 0.15)]
        min_confidence: f32,
        /// Maximum number of faces to report
        #[arg(long, default_value_t = 5)]
        max_results: usize,
        /// Print full analyses as JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Enroll a dataset directory and list its labels
    Dataset {
        /// One subdirectory of sample images per label
        dir: PathBuf,
    },
    /// Show where each model is expected and whether it exists
    Models,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let model_dir = cli.model_dir.unwrap_or_else(facescan_core::default_model_dir);
    let paths = ModelPaths::in_dir(&model_dir);

    match cli.command {
        Commands::Analyze {
            image,
            dataset,
            threshold,
            min_confidence,
            max_results,
            json,
        } => {
            let options = DetectorOptions {
                min_confidence,
                max_results,
                ..Default::default()
            };
            let mut models = FaceModels::load(&paths, options, 2).context("loading face models")?;
            let matcher = dataset
                .map(|dir| enrollment::build_matcher(&dir, &mut models, threshold))
                .transpose()
                .context("enrolling dataset")?;

            let frame = load_image(&image)?;
            let faces = models.analyze(&frame)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&faces)?);
                return Ok(());
            }
            if faces.is_empty() {
                println!("No faces detected");
            }
            for (i, face) in faces.iter().enumerate() {
                println!("[{i}] {}", facescan_core::describe(face));
                if let Some(matcher) = &matcher {
                    println!("    match: {}", matcher.find_best_match(&face.descriptor));
                }
            }
        }
        Commands::Dataset { dir } => {
            let mut models = FaceModels::load(&paths, DetectorOptions::default(), 2)
                .context("loading face models")?;
            let labeled = enrollment::enroll_dataset(&dir, &mut models)?;
            if labeled.is_empty() {
                println!("No labels enrolled from {}", dir.display());
            }
            for set in &labeled {
                println!("{}: {} descriptor(s)", set.label(), set.descriptors().len());
            }
        }
        Commands::Models => {
            println!("Model directory: {}", model_dir.display());
            for (name, path) in paths.entries() {
                let state = if path.is_file() { "ok" } else { "missing" };
                println!("  {name:<10} {state:<8} {}", path.display());
            }
        }
    }

    Ok(())
}

/// Load an image from a local path or fetch it over http(s).
fn load_image(source: &str) -> Result<RgbImage> {
    if !(source.starts_with("http://") || source.starts_with("https://")) {
        return Ok(decode::load_rgb(Path::new(source))?);
    }

    tracing::info!(url = source, "fetching image");
    let response = reqwest::blocking::get(source).with_context(|| format!("fetching {source}"))?;
    let status = response.status();
    if !status.is_success() {
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown")
            .to_string();
        bail!("invalid image URL {source}: {status} ({content_type})");
    }
    let bytes = response.bytes()?;
    Ok(decode::decode_rgb(&bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_analyze_defaults() {
        let cli = Cli::try_parse_from(["facescan", "analyze", "me.jpg"]).unwrap();
        match cli.command {
            Commands::Analyze { image, dataset, threshold, max_results, json, .. } => {
                assert_eq!(image, "me.jpg");
                assert!(dataset.is_none());
                assert_eq!(threshold, DEFAULT_DISTANCE_THRESHOLD);
                assert_eq!(max_results, 5);
                assert!(!json);
            }
            _ => panic!("expected analyze"),
        }
    }

    #[test]
    fn test_load_image_missing_file() {
        let err = load_image("/nonexistent/me.jpg").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/me.jpg"));
    }
}
