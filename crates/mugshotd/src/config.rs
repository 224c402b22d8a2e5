use mugshot_core::locator::{DEFAULT_MIN_FACE_AREA, DEFAULT_SCAN_LIMIT, DEFAULT_SCAN_MIN_SCORE};
use mugshot_core::source::DEFAULT_MIN_SCORE;
use mugshot_core::ScanOptions;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required environment variables: {}", .0.join(", "))]
    Missing(Vec<&'static str>),
}

/// Service configuration, loaded from environment variables.
pub struct Config {
    pub reddit_client_id: String,
    pub reddit_client_secret: String,
    pub reddit_user_agent: String,
    /// Subreddits joined with `+` (default: memes+dankmemes).
    pub subreddits: String,
    pub xai_api_key: String,
    pub xai_model: String,
    /// Still image holding the face to insert.
    pub reference_face_path: PathBuf,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Where generated images are written and served from.
    pub output_dir: PathBuf,
    pub cache_file: PathBuf,
    pub cache_ttl_secs: u64,
    pub bind_addr: String,
    pub scan: ScanOptions,
    /// Engagement floor for the ranked pick.
    pub feed_min_score: i64,
    /// Number of candidates offered to the ranker.
    pub pick_limit: usize,
}

impl Config {
    /// Load configuration from the environment (and `.env`, if present).
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenv::dotenv() {
            tracing::debug!(path = %path.display(), "loaded .env");
        }

        let required = |key: &'static str, missing: &mut Vec<&'static str>| {
            std::env::var(key)
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| {
                    missing.push(key);
                    String::new()
                })
        };
        let mut missing = Vec::new();
        let reddit_client_id = required("REDDIT_CLIENT_ID", &mut missing);
        let reddit_client_secret = required("REDDIT_CLIENT_SECRET", &mut missing);
        let xai_api_key = required("XAI_API_KEY", &mut missing);
        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }

        Ok(Self {
            reddit_client_id,
            reddit_client_secret,
            reddit_user_agent: env_string(
                "REDDIT_USER_AGENT",
                concat!("mugshot/", env!("CARGO_PKG_VERSION")),
            ),
            subreddits: env_string("MUGSHOT_SUBREDDITS", "memes+dankmemes"),
            xai_api_key,
            xai_model: env_string("XAI_MODEL", mugshot_net::xai::DEFAULT_MODEL),
            reference_face_path: env_path("REFERENCE_FACE_PATH", "reference_face.jpg"),
            model_dir: std::env::var("MUGSHOT_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| mugshot_core::default_model_dir()),
            output_dir: env_path("MUGSHOT_OUTPUT_DIR", "static/output"),
            cache_file: env_path("MUGSHOT_CACHE_FILE", "meme_cache.json"),
            cache_ttl_secs: env_parse("MUGSHOT_CACHE_SECS", 7200),
            bind_addr: env_string("MUGSHOT_BIND", "0.0.0.0:5000"),
            scan: ScanOptions {
                scan_limit: env_parse("MUGSHOT_SCAN_LIMIT", DEFAULT_SCAN_LIMIT),
                min_score: env_parse("MUGSHOT_SCAN_MIN_SCORE", DEFAULT_SCAN_MIN_SCORE),
                min_face_area: env_parse("MUGSHOT_MIN_FACE_AREA", DEFAULT_MIN_FACE_AREA),
            },
            feed_min_score: env_parse("MUGSHOT_FEED_MIN_SCORE", DEFAULT_MIN_SCORE),
            pick_limit: env_parse("MUGSHOT_PICK_LIMIT", 12usize).max(1),
        })
    }

    /// Path to the SCRFD detection model.
    pub fn scrfd_model_path(&self) -> String {
        self.model_path("buffalo_l/det_10g.onnx")
    }

    /// Path to the ArcFace recognition model.
    pub fn arcface_model_path(&self) -> String {
        self.model_path("buffalo_l/w600k_r50.onnx")
    }

    /// Path to the inswapper model.
    pub fn inswapper_model_path(&self) -> String {
        self.model_path("inswapper_128.onnx")
    }

    /// Path to the inswapper embedding map (raw 512×512 f32).
    pub fn inswapper_emap_path(&self) -> String {
        self.model_path("inswapper_128.emap")
    }

    fn model_path(&self, name: &str) -> String {
        self.model_dir.join(name).to_string_lossy().into_owned()
    }
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_path(key: &str, default: &str) -> PathBuf {
    PathBuf::from(env_string(key, default))
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_parse_falls_back_on_garbage() {
        std::env::set_var("MUGSHOT_TEST_PARSE_GARBAGE", "lots");
        assert_eq!(env_parse("MUGSHOT_TEST_PARSE_GARBAGE", 7usize), 7);
        std::env::set_var("MUGSHOT_TEST_PARSE_OK", "12.5");
        assert_eq!(env_parse("MUGSHOT_TEST_PARSE_OK", 1.0f32), 12.5);
        assert_eq!(env_parse("MUGSHOT_TEST_PARSE_UNSET", -3i64), -3);
    }

    #[test]
    fn test_model_paths() {
        let config = Config {
            reddit_client_id: String::new(),
            reddit_client_secret: String::new(),
            reddit_user_agent: String::new(),
            subreddits: String::new(),
            xai_api_key: String::new(),
            xai_model: String::new(),
            reference_face_path: PathBuf::new(),
            model_dir: PathBuf::from("/models"),
            output_dir: PathBuf::new(),
            cache_file: PathBuf::new(),
            cache_ttl_secs: 0,
            bind_addr: String::new(),
            scan: ScanOptions::default(),
            feed_min_score: 0,
            pick_limit: 1,
        };
        assert_eq!(config.scrfd_model_path(), "/models/buffalo_l/det_10g.onnx");
        assert_eq!(config.arcface_model_path(), "/models/buffalo_l/w600k_r50.onnx");
        assert_eq!(config.inswapper_model_path(), "/models/inswapper_128.onnx");
        assert_eq!(config.inswapper_emap_path(), "/models/inswapper_128.emap");
    }

    #[test]
    fn test_missing_error_lists_keys() {
        let err = ConfigError::Missing(vec!["REDDIT_CLIENT_ID", "XAI_API_KEY"]);
        assert_eq!(
            err.to_string(),
            "missing required environment variables: REDDIT_CLIENT_ID, XAI_API_KEY"
        );
    }
}
