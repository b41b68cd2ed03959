use likeness_core::{MissPolicy, DEFAULT_CONFIDENCE_THRESHOLD};
use std::path::PathBuf;

/// Runtime configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root for the catalog database and trained model.
    pub data_dir: PathBuf,
    /// Path to the SQLite catalog.
    pub db_path: PathBuf,
    /// Directory of per-person photo folders.
    pub photos_dir: PathBuf,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Trained LBPH model artifact.
    pub recognizer_path: PathBuf,
    /// Camera device or image path.
    pub source: String,
    /// Frame shrink factor before detection, in (0, 1].
    pub scale_factor: f64,
    /// Recognizer distance below which a face is named.
    pub confidence_threshold: f64,
    pub miss_policy: MissPolicy,
}

impl Config {
    /// Load configuration from `LIKENESS_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let data_dir = var("LIKENESS_DATA_DIR").map(PathBuf::from).unwrap_or_else(|| {
            var("XDG_DATA_HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|| {
                    let home = var("HOME").unwrap_or_else(|| "/tmp".to_string());
                    PathBuf::from(home).join(".local/share")
                })
                .join("likeness")
        });

        let path_or = |key: &str, default: PathBuf| var(key).map(PathBuf::from).unwrap_or(default);

        let miss_policy = match var("LIKENESS_MISS_POLICY").map(|v| v.parse::<MissPolicy>()) {
            Some(Ok(policy)) => policy,
            Some(Err(e)) => {
                tracing::warn!(error = %e, "ignoring LIKENESS_MISS_POLICY");
                MissPolicy::default()
            }
            None => MissPolicy::default(),
        };

        Self {
            db_path: path_or("LIKENESS_DB_PATH", data_dir.join("catalog.db")),
            photos_dir: path_or("LIKENESS_PHOTOS_DIR", PathBuf::from("photos")),
            model_dir: path_or("LIKENESS_MODEL_DIR", data_dir.join("models")),
            recognizer_path: path_or(
                "LIKENESS_RECOGNIZER_PATH",
                data_dir.join("face_recognizer.json"),
            ),
            source: var("LIKENESS_SOURCE").unwrap_or_else(|| "/dev/video0".to_string()),
            scale_factor: parse_or(&var, "LIKENESS_SCALE_FACTOR", 0.5),
            confidence_threshold: parse_or(
                &var,
                "LIKENESS_CONFIDENCE_THRESHOLD",
                DEFAULT_CONFIDENCE_THRESHOLD,
            ),
            miss_policy,
            data_dir,
        }
    }

    /// Path to the SCRFD detection model.
    pub fn detector_model_path(&self) -> PathBuf {
        self.model_dir.join("det_10g.onnx")
    }
}

fn parse_or(var: &impl Fn(&str) -> Option<String>, key: &str, default: f64) -> f64 {
    var(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}
