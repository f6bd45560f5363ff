use crate::core::errors::ConfigError;
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub log_level: Level,
}

/// Which classifier implementation serves inference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifierBackend {
    /// Local ONNX Runtime session
    Onnx,
    /// Hugging Face hosted inference API
    Hub,
}

impl FromStr for ClassifierBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "onnx" => Ok(Self::Onnx),
            "hub" => Ok(Self::Hub),
            other => Err(ConfigError::UnknownClassifierBackend(other.to_string())),
        }
    }
}

impl fmt::Display for ClassifierBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Onnx => "onnx",
            Self::Hub => "hub",
        })
    }
}

/// Classifier configuration
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    pub backend: ClassifierBackend,
    pub model_id: String,
    pub model_path: String,
    pub labels_path: String,
    pub input_size: u32,
    pub inference_backend: Option<String>,
    pub hub_endpoint: String,
    pub hub_api_token: Option<String>,
    pub timeout_seconds: u64,
}

/// Translation configuration
#[derive(Debug, Clone)]
pub struct TranslationConfig {
    pub endpoint: String,
    pub source_language: String,
    pub target_language: String,
    pub timeout_seconds: u64,
}

/// Upload limits
#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub max_upload_mb: usize,
    pub allowed_extensions: Vec<String>,
}

/// Session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub cookie_name: String,
    /// 0 disables idle expiry
    pub idle_timeout_secs: u64,
}

/// Rendering configuration
#[derive(Debug, Clone)]
pub struct DisplayConfig {
    pub thumbnail_max_width: u32,
    pub chart_color: String,
}

/// Main application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub classifier: ClassifierConfig,
    pub translation: TranslationConfig,
    pub upload: UploadConfig,
    pub session: SessionConfig,
    pub display: DisplayConfig,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn env_string(key: &str, default: &str) -> String {
    env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

impl Config {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        let config = Self::load_from_env()?;
        config.validate()?;
        Ok(config)
    }

    fn load_from_env() -> Result<Self, ConfigError> {
        let log_level = env::var("LOG_LEVEL")
            .ok()
            .and_then(|s| match s.to_lowercase().as_str() {
                "trace" => Some(Level::TRACE),
                "debug" => Some(Level::DEBUG),
                "info" => Some(Level::INFO),
                "warn" | "warning" => Some(Level::WARN),
                "error" => Some(Level::ERROR),
                _ => None,
            })
            .unwrap_or(Level::INFO);

        let backend = env::var("CLASSIFIER_BACKEND")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(|s| s.parse())
            .transpose()?
            .unwrap_or(ClassifierBackend::Onnx);

        Ok(Self {
            server: ServerConfig {
                port: env_or("SERVER_PORT", 8501),
                host: env_string("SERVER_HOST", "0.0.0.0"),
                log_level,
            },
            classifier: ClassifierConfig {
                backend,
                model_id: env_string("MODEL_ID", "google/vit-base-patch16-224"),
                model_path: env_string("MODEL_PATH", "models/vit-base-patch16-224.onnx"),
                labels_path: env_string(
                    "MODEL_LABELS_PATH",
                    "models/vit-base-patch16-224.config.json",
                ),
                input_size: env_or("MODEL_INPUT_SIZE", 224),
                inference_backend: env::var("INFERENCE_BACKEND")
                    .ok()
                    .map(|s| s.trim().to_uppercase())
                    .filter(|s| !s.is_empty()),
                hub_endpoint: env_string(
                    "HUB_ENDPOINT",
                    "https://api-inference.huggingface.co/models",
                ),
                hub_api_token: env::var("HUB_API_TOKEN")
                    .ok()
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty()),
                timeout_seconds: env_or("CLASSIFIER_TIMEOUT_SECONDS", 60),
            },
            translation: TranslationConfig {
                endpoint: env_string(
                    "TRANSLATE_ENDPOINT",
                    "https://translate.googleapis.com/translate_a/single",
                ),
                source_language: env_string("TRANSLATE_SOURCE", "auto"),
                target_language: env_string("TRANSLATE_TARGET", "ko"),
                timeout_seconds: env_or("TRANSLATE_TIMEOUT_SECONDS", 10),
            },
            upload: UploadConfig {
                max_upload_mb: env_or("MAX_UPLOAD_MB", 200),
                allowed_extensions: vec!["jpg".into(), "jpeg".into(), "png".into()],
            },
            session: SessionConfig {
                cookie_name: env_string("SESSION_COOKIE", "classifier_session"),
                idle_timeout_secs: env_or("SESSION_IDLE_TIMEOUT_SECS", 3600),
            },
            display: DisplayConfig {
                thumbnail_max_width: env_or("THUMBNAIL_MAX_WIDTH", 480),
                chart_color: env_string("CHART_COLOR", "#FF4B4B"),
            },
        })
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if !(32..=1024).contains(&self.classifier.input_size) {
            return Err(ConfigError::InvalidInputSize(self.classifier.input_size));
        }

        if self.translation.target_language.is_empty() {
            return Err(ConfigError::InvalidTranslationConfig(
                "target language must not be empty".to_string(),
            ));
        }
        if self.translation.timeout_seconds == 0 {
            return Err(ConfigError::InvalidTranslationConfig(
                "timeout must be > 0 seconds".to_string(),
            ));
        }

        if self.upload.max_upload_mb == 0 {
            return Err(ConfigError::InvalidUploadLimit(self.upload.max_upload_mb));
        }

        if self.display.thumbnail_max_width == 0 {
            return Err(ConfigError::InvalidDisplayConfig(
                "thumbnail_max_width must be > 0".to_string(),
            ));
        }
        let color = &self.display.chart_color;
        let is_hex = color.len() == 7
            && color.starts_with('#')
            && color[1..].chars().all(|c| c.is_ascii_hexdigit());
        if !is_hex {
            return Err(ConfigError::InvalidDisplayConfig(format!(
                "chart_color must look like #RRGGBB, got {}",
                color
            )));
        }

        let cookie = &self.session.cookie_name;
        if cookie.is_empty()
            || !cookie
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(ConfigError::InvalidSessionConfig(format!(
                "cookie name must be non-empty [A-Za-z0-9_-], got {:?}",
                cookie
            )));
        }

        Ok(())
    }

    /// Fixed configuration for tests and offline tools; skips the environment.
    pub fn for_tests() -> Self {
        Self {
            server: ServerConfig {
                port: 0,
                host: "127.0.0.1".to_string(),
                log_level: Level::DEBUG,
            },
            classifier: ClassifierConfig {
                backend: ClassifierBackend::Onnx,
                model_id: "google/vit-base-patch16-224".to_string(),
                model_path: "models/vit-base-patch16-224.onnx".to_string(),
                labels_path: "models/vit-base-patch16-224.config.json".to_string(),
                input_size: 224,
                inference_backend: None,
                hub_endpoint: "http://127.0.0.1:9/models".to_string(),
                hub_api_token: None,
                timeout_seconds: 5,
            },
            translation: TranslationConfig {
                endpoint: "http://127.0.0.1:9/translate".to_string(),
                source_language: "auto".to_string(),
                target_language: "ko".to_string(),
                timeout_seconds: 1,
            },
            upload: UploadConfig {
                max_upload_mb: 20,
                allowed_extensions: vec!["jpg".into(), "jpeg".into(), "png".into()],
            },
            session: SessionConfig {
                cookie_name: "classifier_session".to_string(),
                idle_timeout_secs: 0,
            },
            display: DisplayConfig {
                thumbnail_max_width: 64,
                chart_color: "#FF4B4B".to_string(),
            },
        }
    }

    pub fn server_port(&self) -> u16 {
        self.server.port
    }

    pub fn server_host(&self) -> &str {
        &self.server.host
    }

    pub fn log_level(&self) -> Level {
        self.server.log_level
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.upload.max_upload_mb * 1024 * 1024
    }

    pub fn session_idle_timeout(&self) -> Option<Duration> {
        match self.session.idle_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}
