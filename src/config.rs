use std::env;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Application-level constants
pub const APP_NAME: &str = "SkinDoc";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Diagnoses must score strictly above this (0–100 scale) to get advice.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 90.0;

/// Staged image size limit. 0 means no limit; set `SKINDOC_MAX_IMAGE_BYTES`
/// (for example 2097152 for 2 MiB) to enforce one.
pub const DEFAULT_MAX_IMAGE_BYTES: usize = 0;

pub const DEFAULT_CLASSIFIER_URL: &str = "http://127.0.0.1:5001/predict";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{0} is required but not set")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Default tracing filter when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    "skindoc=info,skindoc_lib=info"
}

/// Get the application data directory (~/SkinDoc/).
/// Falls back to the working directory when no home directory exists.
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Get the default directory for exported reports
pub fn exports_dir() -> PathBuf {
    app_data_dir().join("exports")
}

/// Runtime configuration for one diagnosis session.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub classifier_url: String,
    pub advice_url: String,
    pub advice_model: String,
    pub advice_api_key: Option<String>,
    pub confidence_threshold: f64,
    /// 0 disables the check.
    pub max_image_bytes: usize,
    pub http_timeout: Option<Duration>,
    pub export_dir: PathBuf,
}

impl AppConfig {
    /// Load configuration from `SKINDOC_*` environment variables.
    /// Loads `.env` file if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Best-effort .env load; ignore if missing
        let _ = dotenvy::dotenv();

        let confidence_threshold = match get_var_opt("SKINDOC_CONFIDENCE_THRESHOLD") {
            Some(raw) => parse_threshold(&raw)?,
            None => DEFAULT_CONFIDENCE_THRESHOLD,
        };

        let max_image_bytes = match get_var_opt("SKINDOC_MAX_IMAGE_BYTES") {
            Some(raw) => raw.trim().parse().map_err(|e| ConfigError::Invalid {
                key: "SKINDOC_MAX_IMAGE_BYTES",
                reason: format!("{e}"),
            })?,
            None => DEFAULT_MAX_IMAGE_BYTES,
        };

        let http_timeout = match get_var_opt("SKINDOC_HTTP_TIMEOUT_SECS") {
            Some(raw) => {
                let secs: u64 = raw.trim().parse().map_err(|e| ConfigError::Invalid {
                    key: "SKINDOC_HTTP_TIMEOUT_SECS",
                    reason: format!("{e}"),
                })?;
                Some(Duration::from_secs(secs))
            }
            None => None,
        };

        Ok(Self {
            classifier_url: get_var_or("SKINDOC_CLASSIFIER_URL", DEFAULT_CLASSIFIER_URL),
            advice_url: get_var("SKINDOC_ADVICE_URL")?,
            advice_model: get_var("SKINDOC_ADVICE_MODEL")?,
            advice_api_key: get_var_opt("SKINDOC_ADVICE_API_KEY"),
            confidence_threshold,
            max_image_bytes,
            http_timeout,
            export_dir: get_var_opt("SKINDOC_EXPORT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(exports_dir),
        })
    }
}

/// Parse a confidence threshold, which must lie on the 0–100 scale.
pub fn parse_threshold(raw: &str) -> Result<f64, ConfigError> {
    let value: f64 = raw.trim().parse().map_err(|e| ConfigError::Invalid {
        key: "SKINDOC_CONFIDENCE_THRESHOLD",
        reason: format!("{e}"),
    })?;
    if !(0.0..=100.0).contains(&value) {
        return Err(ConfigError::Invalid {
            key: "SKINDOC_CONFIDENCE_THRESHOLD",
            reason: format!("{value} is outside 0–100"),
        });
    }
    Ok(value)
}

fn get_var(key: &'static str) -> Result<String, ConfigError> {
    get_var_opt(key).ok_or(ConfigError::Missing(key))
}

fn get_var_or(key: &str, default: &str) -> String {
    get_var_opt(key).unwrap_or_else(|| default.to_owned())
}

/// Unset and blank variables are treated the same.
fn get_var_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const ALL_VARS: &[&str] = &[
        "SKINDOC_CLASSIFIER_URL",
        "SKINDOC_ADVICE_URL",
        "SKINDOC_ADVICE_MODEL",
        "SKINDOC_ADVICE_API_KEY",
        "SKINDOC_CONFIDENCE_THRESHOLD",
        "SKINDOC_MAX_IMAGE_BYTES",
        "SKINDOC_HTTP_TIMEOUT_SECS",
        "SKINDOC_EXPORT_DIR",
    ];

    fn clear_env() {
        for key in ALL_VARS {
            env::remove_var(key);
        }
    }

    #[test]
    fn from_env_applies_defaults() {
        let _guard = ENV_LOCK.lock().expect("env lock poisoned");
        clear_env();
        env::set_var("SKINDOC_ADVICE_URL", "http://localhost:9000/v1/chat/completions");
        env::set_var("SKINDOC_ADVICE_MODEL", "llama-3.3-70b");

        let cfg = AppConfig::from_env().expect("should parse config");
        assert_eq!(cfg.classifier_url, DEFAULT_CLASSIFIER_URL);
        assert_eq!(cfg.advice_model, "llama-3.3-70b");
        assert_eq!(cfg.advice_api_key, None);
        assert_eq!(cfg.confidence_threshold, 90.0);
        assert_eq!(cfg.max_image_bytes, 0, "no size limit unless configured");
        assert_eq!(cfg.http_timeout, None);
        assert!(cfg.export_dir.ends_with("exports"));

        clear_env();
    }

    #[test]
    fn from_env_reads_overrides() {
        let _guard = ENV_LOCK.lock().expect("env lock poisoned");
        clear_env();
        env::set_var("SKINDOC_ADVICE_URL", "http://localhost:9000");
        env::set_var("SKINDOC_ADVICE_MODEL", "m");
        env::set_var("SKINDOC_ADVICE_API_KEY", "secret");
        env::set_var("SKINDOC_CONFIDENCE_THRESHOLD", "75.5");
        env::set_var("SKINDOC_MAX_IMAGE_BYTES", "2097152");
        env::set_var("SKINDOC_HTTP_TIMEOUT_SECS", "30");
        env::set_var("SKINDOC_EXPORT_DIR", "/tmp/skindoc-out");

        let cfg = AppConfig::from_env().expect("should parse config");
        assert_eq!(cfg.advice_api_key.as_deref(), Some("secret"));
        assert_eq!(cfg.confidence_threshold, 75.5);
        assert_eq!(cfg.max_image_bytes, 2 * 1024 * 1024);
        assert_eq!(cfg.http_timeout, Some(Duration::from_secs(30)));
        assert_eq!(cfg.export_dir, PathBuf::from("/tmp/skindoc-out"));

        clear_env();
    }

    #[test]
    fn from_env_fails_without_advice_url() {
        let _guard = ENV_LOCK.lock().expect("env lock poisoned");
        clear_env();
        env::set_var("SKINDOC_ADVICE_MODEL", "m");

        let result = AppConfig::from_env();
        assert_eq!(result, Err(ConfigError::Missing("SKINDOC_ADVICE_URL")));

        clear_env();
    }

    #[test]
    fn from_env_rejects_non_numeric_threshold() {
        let _guard = ENV_LOCK.lock().expect("env lock poisoned");
        clear_env();
        env::set_var("SKINDOC_ADVICE_URL", "http://localhost:9000");
        env::set_var("SKINDOC_ADVICE_MODEL", "m");
        env::set_var("SKINDOC_CONFIDENCE_THRESHOLD", "ninety");

        assert!(matches!(
            AppConfig::from_env(),
            Err(ConfigError::Invalid { key: "SKINDOC_CONFIDENCE_THRESHOLD", .. })
        ));

        clear_env();
    }

    #[test]
    fn threshold_must_be_on_percentage_scale() {
        assert_eq!(parse_threshold("90").unwrap(), 90.0);
        assert_eq!(parse_threshold(" 0 ").unwrap(), 0.0);
        assert!(parse_threshold("100.5").is_err());
        assert!(parse_threshold("-1").is_err());
    }

    #[test]
    fn exports_dir_under_app_data() {
        let exports = exports_dir();
        assert!(exports.starts_with(app_data_dir()));
        assert!(exports.ends_with("exports"));
    }

    #[test]
    fn app_name_is_skindoc() {
        assert_eq!(APP_NAME, "SkinDoc");
    }
}
