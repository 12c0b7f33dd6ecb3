//! Secret resolution from a direct value or a file.
//!
//! Secrets may be given inline (e.g. `GOOGLE_CLIENT_SECRET=...`) or as a
//! path to a file holding them, which is the Docker secrets pattern
//! (e.g. `GOOGLE_CLIENT_SECRET_FILE=/run/secrets/google_client_secret`).
//! A non-empty direct value wins over a file.

use secrecy::SecretString;
use std::fs;

/// Error type for secret resolution failures.
#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("No secret source provided (need a direct value or a file path)")]
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

/// Resolves a secret from a direct value, falling back to a file.
///
/// File contents are trimmed; secrets files commonly end with a newline.
pub fn resolve_secret(direct: Option<&str>, file_path: Option<&str>) -> Result<SecretString> {
    if let Some(value) = direct.filter(|v| !v.is_empty()) {
        return Ok(SecretString::from(value.to_string()));
    }

    if let Some(path) = file_path.filter(|p| !p.is_empty()) {
        let expanded = expand_home(path);
        let content = fs::read_to_string(&expanded).map_err(|e| SecretError::FileReadError {
            path: expanded.clone(),
            source: e,
        })?;
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Err(SecretError::EmptyFile { path: expanded });
        }
        return Ok(SecretString::from(trimmed.to_string()));
    }

    Err(SecretError::NoSourceProvided)
}

/// Like [`resolve_secret`], but a missing source is `Ok(None)`.
pub fn resolve_secret_optional(
    direct: Option<&str>,
    file_path: Option<&str>,
) -> Result<Option<SecretString>> {
    match resolve_secret(direct, file_path) {
        Ok(secret) => Ok(Some(secret)),
        Err(SecretError::NoSourceProvided) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Expands a leading `~` to the user's home directory.
///
/// `~user/path` is not supported.
fn expand_home(path: &str) -> String {
    if path == "~" || path.starts_with("~/") {
        if let Some(home) = std::env::var_os("HOME").or_else(|| std::env::var_os("USERPROFILE")) {
            if path == "~" {
                return home.to_string_lossy().into_owned();
            }
            return path.replacen('~', &home.to_string_lossy(), 1);
        }
    }
    path.to_string()
}
