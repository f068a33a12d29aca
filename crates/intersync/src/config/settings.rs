use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::error::ConfigError;
use crate::remote::Credentials;
use crate::sanitize::{redact_endpoint, redact_key};
use crate::schema::ValidationLevel;
use crate::secrets::{resolve_secret, SecretError};
use crate::sync::SyncOptions;

pub const DEFAULT_ENDPOINT: &str = "https://intersight.com";
pub const DEFAULT_FILES_DIR: &str = "./files";
pub const DEFAULT_LOG_LEVEL: &str = "info";

type Result<T> = std::result::Result<T, ConfigError>;

/// Runtime settings read from the process environment.
pub struct Settings {
    pub api_key: Option<String>,
    /// Path to the secret file, or the secret itself.
    api_secret: Option<SecretString>,
    pub endpoint: String,
    pub files_dir: PathBuf,
    pub safe_mode: bool,
    pub log_level: String,
    pub debug: bool,
    pub max_workers: usize,
    pub run_timeout: Option<Duration>,
    pub validation_level: ValidationLevel,
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("api_key", &self.api_key.as_deref().map(redact_key))
            .field("api_secret", &self.api_secret.as_ref().map(|_| "****"))
            .field("endpoint", &redact_endpoint(&self.endpoint))
            .field("files_dir", &self.files_dir)
            .field("safe_mode", &self.safe_mode)
            .field("log_level", &self.log_level)
            .field("debug", &self.debug)
            .field("max_workers", &self.max_workers)
            .field("run_timeout", &self.run_timeout)
            .field("validation_level", &self.validation_level)
            .finish()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: None,
            api_secret: None,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            files_dir: PathBuf::from(DEFAULT_FILES_DIR),
            safe_mode: false,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            debug: false,
            max_workers: num_cpus::get(),
            run_timeout: None,
            validation_level: ValidationLevel::Strict,
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds settings from any variable lookup. Blank values count as
    /// unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let max_workers = match get("MAX_WORKERS") {
            Some(raw) => parse_count("MAX_WORKERS", &raw)?,
            None => defaults.max_workers,
        };
        let run_timeout = get("RUN_TIMEOUT_SECS")
            .map(|raw| parse_count("RUN_TIMEOUT_SECS", &raw).map(|s| Duration::from_secs(s as u64)))
            .transpose()?;
        let validation_level = match get("VALIDATION_LEVEL") {
            Some(raw) => parse_level(&raw)?,
            None => defaults.validation_level,
        };

        Ok(Self {
            api_key: get("API_KEY"),
            api_secret: get("API_SECRET").map(SecretString::from),
            endpoint: get("IS_ENDPOINT")
                .map(|e| e.trim_end_matches('/').to_string())
                .unwrap_or(defaults.endpoint),
            files_dir: get("FILES_DIR").map(PathBuf::from).unwrap_or(defaults.files_dir),
            safe_mode: get("SAFE_MODE")
                .map(|v| parse_bool("SAFE_MODE", &v))
                .transpose()?
                .unwrap_or(defaults.safe_mode),
            log_level: get("LOG_LEVEL").unwrap_or(defaults.log_level),
            debug: get("DEBUG")
                .map(|v| parse_bool("DEBUG", &v))
                .transpose()?
                .unwrap_or(defaults.debug),
            max_workers,
            run_timeout,
            validation_level,
        })
    }

    /// Log level after applying the `DEBUG` switch.
    pub fn effective_log_level(&self) -> &str {
        if self.debug {
            "debug"
        } else {
            &self.log_level
        }
    }

    /// API credentials; only commands that talk to the backend need them.
    pub fn credentials(&self) -> Result<Credentials> {
        let client_id = self
            .api_key
            .clone()
            .ok_or(ConfigError::MissingVar { name: "API_KEY" })?;
        let raw = self
            .api_secret
            .as_ref()
            .ok_or(ConfigError::MissingVar { name: "API_SECRET" })?;
        let client_secret = resolve_secret(raw.expose_secret()).map_err(|source| match source {
            SecretError::NoSourceProvided => ConfigError::MissingVar { name: "API_SECRET" },
            source => ConfigError::Secret {
                name: "API_SECRET",
                source,
            },
        })?;
        Ok(Credentials {
            client_id,
            client_secret,
        })
    }

    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            safe_mode: self.safe_mode,
            dry_run: false,
            workers: self.max_workers,
            object_types: Vec::new(),
        }
    }
}

/// Accepts `1/true/yes/on` and `0/false/no/off`, case-insensitively.
pub fn parse_bool(name: &'static str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            name,
            value: value.to_string(),
            reason: "expected one of 1/true/yes/on or 0/false/no/off".to_string(),
        }),
    }
}

fn parse_count(name: &'static str, value: &str) -> Result<usize> {
    match value.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ConfigError::InvalidValue {
            name,
            value: value.to_string(),
            reason: "expected a positive integer".to_string(),
        }),
    }
}

fn parse_level(value: &str) -> Result<ValidationLevel> {
    match value.trim().to_ascii_lowercase().as_str() {
        "strict" => Ok(ValidationLevel::Strict),
        "lenient" => Ok(ValidationLevel::Lenient),
        _ => Err(ConfigError::InvalidValue {
            name: "VALIDATION_LEVEL",
            value: value.to_string(),
            reason: "expected strict or lenient".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::from_lookup(lookup(&[])).unwrap();
        assert_eq!(settings.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(settings.files_dir, PathBuf::from(DEFAULT_FILES_DIR));
        assert!(!settings.safe_mode);
        assert_eq!(settings.effective_log_level(), "info");
        assert!(settings.max_workers > 0);
        assert!(settings.run_timeout.is_none());
    }

    #[test]
    fn test_values_are_parsed() {
        let settings = Settings::from_lookup(lookup(&[
            ("IS_ENDPOINT", "https://eu-central-1.intersight.com/"),
            ("SAFE_MODE", "Yes"),
            ("DEBUG", "1"),
            ("MAX_WORKERS", "3"),
            ("RUN_TIMEOUT_SECS", "90"),
            ("VALIDATION_LEVEL", "lenient"),
        ]))
        .unwrap();
        assert_eq!(settings.endpoint, "https://eu-central-1.intersight.com");
        assert!(settings.safe_mode);
        assert_eq!(settings.effective_log_level(), "debug");
        assert_eq!(settings.max_workers, 3);
        assert_eq!(settings.run_timeout, Some(Duration::from_secs(90)));
        assert_eq!(settings.validation_level, ValidationLevel::Lenient);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            Settings::from_lookup(lookup(&[("SAFE_MODE", "maybe")])),
            Err(ConfigError::InvalidValue { name: "SAFE_MODE", .. })
        ));
        assert!(matches!(
            Settings::from_lookup(lookup(&[("MAX_WORKERS", "0")])),
            Err(ConfigError::InvalidValue { name: "MAX_WORKERS", .. })
        ));
    }

    #[test]
    fn test_credentials_require_both_values() {
        let settings = Settings::from_lookup(lookup(&[("API_KEY", "key-id")])).unwrap();
        assert!(matches!(
            settings.credentials(),
            Err(ConfigError::MissingVar { name: "API_SECRET" })
        ));

        let settings =
            Settings::from_lookup(lookup(&[("API_KEY", "key-id"), ("API_SECRET", "s3cr3t")]))
                .unwrap();
        let credentials = settings.credentials().unwrap();
        assert_eq!(credentials.client_id, "key-id");
        assert_eq!(credentials.client_secret.expose_secret(), "s3cr3t");
    }

    #[test]
    fn test_debug_output_hides_secret() {
        let settings = Settings::from_lookup(lookup(&[
            ("API_KEY", "0123456789abcdef"),
            ("API_SECRET", "s3cr3t"),
        ]))
        .unwrap();
        let shown = format!("{:?}", settings);
        assert!(!shown.contains("s3cr3t"));
        assert!(!shown.contains("0123456789abcdef"));
    }

    #[test]
    fn test_inline_secret_is_expanded_on_use() {
        let settings = Settings::from_lookup(lookup(&[
            ("API_KEY", "key-id"),
            ("API_SECRET", "-----BEGIN KEY-----\\nabc\\n-----END KEY-----"),
        ]))
        .unwrap();
        assert!(settings.api_secret.is_some());
        let credentials = settings.credentials().unwrap();
        assert_eq!(
            credentials.client_secret.expose_secret(),
            "-----BEGIN KEY-----\nabc\n-----END KEY-----"
        );
    }

    #[test]
    #[serial]
    fn test_from_env() {
        std::env::set_var("FILES_DIR", "/tmp/intersync-files");
        std::env::set_var("SAFE_MODE", "on");
        let settings = Settings::from_env().unwrap();
        std::env::remove_var("FILES_DIR");
        std::env::remove_var("SAFE_MODE");
        assert_eq!(settings.files_dir, PathBuf::from("/tmp/intersync-files"));
        assert!(settings.safe_mode);
    }
}
