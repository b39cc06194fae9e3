use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:4000";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid listen address {0:?}")]
    ListenAddr(String),
}

/// Daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP server binds to (default: 0.0.0.0:4000).
    pub listen_addr: SocketAddr,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// One subdirectory of sample images per label.
    pub dataset_dir: PathBuf,
    /// Where uploaded files are written.
    pub upload_dir: PathBuf,
    /// Detections at or below this score are dropped.
    pub min_confidence: f32,
    /// Maximum number of faces reported per image.
    pub max_results: usize,
    /// Euclidean distance below which a descriptor matches a label.
    pub match_threshold: f32,
    /// Request body limit for uploads.
    pub max_upload_bytes: usize,
    /// ONNX Runtime intra-op threads per model.
    pub intra_threads: usize,
}

/// Optional TOML file layer; every key may be omitted.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub listen_addr: Option<String>,
    pub model_dir: Option<PathBuf>,
    pub dataset_dir: Option<PathBuf>,
    pub upload_dir: Option<PathBuf>,
    pub min_confidence: Option<f32>,
    pub max_results: Option<usize>,
    pub match_threshold: Option<f32>,
    pub max_upload_bytes: Option<usize>,
    pub intra_threads: Option<usize>,
}

impl FileConfig {
    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl Config {
    /// Load configuration: the TOML file named by `FACESCAN_CONFIG` (if any),
    /// overridden by `FACESCAN_*` environment variables, then defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let file = match std::env::var("FACESCAN_CONFIG") {
            Ok(path) => FileConfig::read(Path::new(&path))?,
            Err(_) => FileConfig::default(),
        };
        Self::resolve(file, |key| std::env::var(key).ok())
    }

    fn resolve(file: FileConfig, env: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let listen = env("FACESCAN_LISTEN_ADDR")
            .or(file.listen_addr)
            .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string());
        let listen_addr = listen.parse().map_err(|_| ConfigError::ListenAddr(listen))?;

        Ok(Self {
            listen_addr,
            model_dir: env("FACESCAN_MODEL_DIR")
                .map(PathBuf::from)
                .or(file.model_dir)
                .unwrap_or_else(facescan_core::default_model_dir),
            dataset_dir: env("FACESCAN_DATASET_DIR")
                .map(PathBuf::from)
                .or(file.dataset_dir)
                .unwrap_or_else(|| PathBuf::from("dataset")),
            upload_dir: env("FACESCAN_UPLOAD_DIR")
                .map(PathBuf::from)
                .or(file.upload_dir)
                .unwrap_or_else(|| PathBuf::from("uploads")),
            min_confidence: env_parse(&env, "FACESCAN_MIN_CONFIDENCE")
                .or(file.min_confidence)
                .unwrap_or(0.15),
            max_results: env_parse(&env, "FACESCAN_MAX_RESULTS")
                .or(file.max_results)
                .unwrap_or(5),
            match_threshold: env_parse(&env, "FACESCAN_MATCH_THRESHOLD")
                .or(file.match_threshold)
                .unwrap_or(facescan_core::matcher::DEFAULT_DISTANCE_THRESHOLD),
            max_upload_bytes: env_parse(&env, "FACESCAN_MAX_UPLOAD_BYTES")
                .or(file.max_upload_bytes)
                .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
            intra_threads: env_parse(&env, "FACESCAN_INTRA_THREADS")
                .or(file.intra_threads)
                .unwrap_or(2),
        })
    }

    pub fn model_paths(&self) -> facescan_core::ModelPaths {
        facescan_core::ModelPaths::in_dir(&self.model_dir)
    }

    pub fn detector_options(&self) -> facescan_core::DetectorOptions {
        facescan_core::DetectorOptions {
            min_confidence: self.min_confidence,
            max_results: self.max_results,
            ..Default::default()
        }
    }
}

fn env_parse<T: FromStr>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    env(key).and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::resolve(FileConfig::default(), env_from(&[])).unwrap();
        assert_eq!(config.listen_addr, "0.0.0.0:4000".parse().unwrap());
        assert_eq!(config.dataset_dir, PathBuf::from("dataset"));
        assert_eq!(config.upload_dir, PathBuf::from("uploads"));
        assert_eq!(config.min_confidence, 0.15);
        assert_eq!(config.max_results, 5);
        assert_eq!(config.max_upload_bytes, 16 * 1024 * 1024);
        assert_eq!(config.intra_threads, 2);
    }

    #[test]
    fn test_env_overrides_file() {
        let file: FileConfig = toml::from_str(
            r#"
            listen_addr = "127.0.0.1:8080"
            max_results = 3
            match_threshold = 0.9
            "#,
        )
        .unwrap();
        let config = Config::resolve(file, env_from(&[("FACESCAN_MAX_RESULTS", "7")])).unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:8080".parse().unwrap());
        assert_eq!(config.max_results, 7);
        assert_eq!(config.match_threshold, 0.9);
    }

    #[test]
    fn test_unparseable_env_falls_back() {
        let config =
            Config::resolve(FileConfig::default(), env_from(&[("FACESCAN_MIN_CONFIDENCE", "high")])).unwrap();
        assert_eq!(config.min_confidence, 0.15);
    }

    #[test]
    fn test_bad_listen_addr() {
        let err = Config::resolve(FileConfig::default(), env_from(&[("FACESCAN_LISTEN_ADDR", "nowhere")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::ListenAddr(_)));
    }

    #[test]
    fn test_unknown_file_key_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("facescan.toml");
        std::fs::write(&path, "listen_port = 4000\n").unwrap();
        assert!(matches!(FileConfig::read(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_detector_options() {
        let config = Config::resolve(FileConfig::default(), env_from(&[("FACESCAN_MAX_RESULTS", "2")])).unwrap();
        let options = config.detector_options();
        assert_eq!(options.max_results, 2);
        assert_eq!(options.min_confidence, 0.15);
    }
}
