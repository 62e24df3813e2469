//! # Settings Loader
//!
//! Centralized settings loading for the SAVR gateway and CLI.
//! Settings come from a `settings.json` file (all fields optional, see
//! [`models::Settings`]) and are then overlaid with environment variables,
//! which may also be provided through a `.env` file.
//!
//! ## Environment overrides
//!
//! - `SAVR_CANISTER_ID`, `SAVR_IDENTITY_PROVIDER_URL`, `SAVR_PRINCIPAL`
//! - `LLM_BASE_URL`, `LLM_MODEL`
//! - `PRICE_API_URL`
//! - `HOST`, `PORT`
//!
//! API keys (`LLM_API_KEY`, `PRICE_API_KEY`) are never part of [`Settings`];
//! they are read by [`secret`] at the point of use so they stay server-side.
//!
//! ## Usage Examples
//!
//! ```rust,no_run
//! use std::path::PathBuf;
//!
//! // Load settings from a specific path
//! let settings = settings_loader::load_settings("config/settings.json")?;
//!
//! // Settings from the given path, else settings.json, else defaults
//! let path = Some(PathBuf::from("settings.json"));
//! let settings = settings_loader::load_settings_or_default(path.as_ref())?;
//! # Ok::<(), anyhow::Error>(())
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use models::Settings;

pub const DEFAULT_SETTINGS_FILE: &str = "settings.json";

/// Loads settings from a JSON file
pub fn load_settings<P: AsRef<Path>>(path: P) -> Result<Settings> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Reading settings file: {}", path.display()))?;
    let settings: Settings = serde_json::from_str(&raw)
        .with_context(|| format!("Parsing settings JSON in {}", path.display()))?;
    Ok(settings)
}

/// Loads settings from a default location (settings.json in the current directory)
pub fn load_default_settings() -> Result<Settings> {
    load_settings(DEFAULT_SETTINGS_FILE)
}

/// Tries to load settings from the provided path, falling back to default location if the path is None
/// or if the file doesn't exist. Returns None only if no settings file is found anywhere.
///
/// A file that exists but cannot be parsed is an error, not a fallback.
pub fn load_settings_with_fallback(path: Option<&PathBuf>) -> Result<Option<Settings>> {
    if let Some(settings_path) = path {
        if settings_file_exists(settings_path) {
            return load_settings(settings_path).map(Some);
        }
        tracing::warn!(
            path = %settings_path.display(),
            "settings file not found, trying default location"
        );
    }

    if default_settings_exist() {
        return load_default_settings().map(Some);
    }

    Ok(None)
}

/// Full resolution used by the binaries: file (or defaults), then `.env` and
/// process environment overrides.
pub fn load_settings_or_default(path: Option<&PathBuf>) -> Result<Settings> {
    report_dotenv(dotenvy::dotenv());

    let mut settings = match load_settings_with_fallback(path)? {
        Some(settings) => settings,
        None => {
            tracing::info!("no settings file found, using built-in defaults");
            Settings::default()
        }
    };
    apply_env_overrides(&mut settings, |key| std::env::var(key).ok())?;
    Ok(settings)
}

/// A missing `.env` is normal; a malformed one is logged and skipped.
/// Returns whether a file was loaded.
fn report_dotenv<T>(result: dotenvy::Result<T>) -> bool {
    match result {
        Ok(_) => true,
        Err(err) if err.not_found() => false,
        Err(err) => {
            tracing::warn!(error = %err, "ignoring unreadable .env file");
            false
        }
    }
}

/// Applies overrides from `lookup` (normally the process environment).
pub fn apply_env_overrides<F>(settings: &mut Settings, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = lookup("SAVR_CANISTER_ID") {
        settings.canister_id = v;
    }
    if let Some(v) = lookup("SAVR_IDENTITY_PROVIDER_URL") {
        settings.identity_provider_url = v;
    }
    if let Some(v) = lookup("SAVR_PRINCIPAL") {
        settings.dev_principal = Some(v);
    }
    if let Some(v) = lookup("LLM_BASE_URL") {
        settings.llm.base_url = v;
    }
    if let Some(v) = lookup("LLM_MODEL") {
        settings.llm.model = v;
    }
    if let Some(v) = lookup("PRICE_API_URL") {
        settings.price.api_url = v;
    }
    if let Some(v) = lookup("HOST") {
        settings.server.host = v;
    }
    if let Some(v) = lookup("PORT") {
        settings.server.port = v
            .parse()
            .with_context(|| format!("Invalid PORT value: {v}"))?;
    }
    Ok(())
}

/// Reads a secret from the environment, treating blank values as absent.
pub fn secret(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Checks if a settings file exists at the given path
pub fn settings_file_exists<P: AsRef<Path>>(path: P) -> bool {
    path.as_ref().exists() && path.as_ref().is_file()
}

/// Checks if the default settings file (settings.json) exists
pub fn default_settings_exist() -> bool {
    settings_file_exists(DEFAULT_SETTINGS_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_dotenv_missing_and_malformed() {
        assert!(!report_dotenv(dotenvy::from_path("/nonexistent/savr/.env")));

        let mut malformed = NamedTempFile::new().unwrap();
        writeln!(malformed, "SAVR_TEST_BROKEN='unterminated").unwrap();
        assert!(!report_dotenv(dotenvy::from_path(malformed.path())));

        let mut valid = NamedTempFile::new().unwrap();
        writeln!(valid, "SAVR_TEST_DOTENV_LOADED=1").unwrap();
        assert!(report_dotenv(dotenvy::from_path(valid.path())));
    }

    #[test]
    fn test_load_partial_settings_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "canister_id": "ryjl3-tyaaa-aaaaa-aaaba-cai", "server": {{ "port": 8080 }} }}"#
        )
        .unwrap();

        let settings = load_settings(file.path()).unwrap();
        assert_eq!(settings.canister_id, "ryjl3-tyaaa-aaaaa-aaaba-cai");
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.identity_provider_url, "https://identity.ic0.app");
    }

    #[test]
    fn test_malformed_settings_is_error() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();

        let path = file.path().to_path_buf();
        assert!(load_settings(&path).is_err());
        assert!(load_settings_with_fallback(Some(&path)).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("SAVR_PRINCIPAL", "2vxsx-fae"),
            ("LLM_MODEL", "llama-3.1-8b-instant"),
            ("PORT", "4000"),
        ]);
        let mut settings = Settings::default();
        apply_env_overrides(&mut settings, |k| env.get(k).map(|v| v.to_string())).unwrap();

        assert_eq!(settings.dev_principal.as_deref(), Some("2vxsx-fae"));
        assert_eq!(settings.llm.model, "llama-3.1-8b-instant");
        assert_eq!(settings.server.port, 4000);
    }

    #[test]
    fn test_invalid_port_override() {
        let mut settings = Settings::default();
        let result = apply_env_overrides(&mut settings, |k| {
            (k == "PORT").then(|| "not-a-port".to_string())
        });
        assert!(result.is_err());
    }
}
