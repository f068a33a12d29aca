//! Resolution of the API secret.
//!
//! The secret is configured as a single value that is either a path to a
//! file holding the secret (Docker secrets, mounted PEM files) or the
//! secret text itself. Inline text may encode line breaks as literal `\n`.

use std::fs;
use std::path::Path;

use secrecy::SecretString;

#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("No secret provided")]
    NoSourceProvided,

    #[error("Failed to read secret from file '{path}': {source}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Secret file '{path}' is empty")]
    EmptyFile { path: String },
}

pub type Result<T> = std::result::Result<T, SecretError>;

/// Resolves `value` as a file path when such a file exists, as inline
/// secret text otherwise.
pub fn resolve_secret(value: &str) -> Result<SecretString> {
    let value = value.trim();
    if value.is_empty() {
        return Err(SecretError::NoSourceProvided);
    }

    let expanded = expand_home(value);
    if Path::new(&expanded).is_file() {
        let content = fs::read_to_string(&expanded).map_err(|e| SecretError::FileReadError {
            path: expanded.clone(),
            source: e,
        })?;
        let content = content.trim();
        if content.is_empty() {
            return Err(SecretError::EmptyFile { path: expanded });
        }
        return Ok(SecretString::from(content.to_string()));
    }

    Ok(SecretString::from(value.replace("\\n", "\n")))
}

/// Like [`resolve_secret`], with `None` and blank values mapping to `None`.
pub fn resolve_secret_optional(value: Option<&str>) -> Result<Option<SecretString>> {
    match value.map(resolve_secret) {
        None | Some(Err(SecretError::NoSourceProvided)) => Ok(None),
        Some(result) => result.map(Some),
    }
}

/// Expands a leading `~` to the user's home directory.
fn expand_home(path: &str) -> String {
    if path == "~" || path.starts_with("~/") {
        if let Some(home) = std::env::var_os("HOME").or_else(|| std::env::var_os("USERPROFILE")) {
            return path.replacen('~', &home.to_string_lossy(), 1);
        }
    }
    path.to_string()
}
