//! Configuration model and service file loading.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_yaml::Mapping;

use crate::constants;
use crate::error::{FlotillaError, Result};

/// Root configuration for a Flotilla session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlotillaConfig {
    /// Path to the service configuration file.
    pub file: PathBuf,
    /// Explicit project name; derived from the file location when absent.
    pub project_name: Option<String>,
    /// Grace period in seconds for `stop` and `restart`.
    pub stop_timeout_secs: u64,
}

impl Default for FlotillaConfig {
    fn default() -> Self {
        Self {
            file: PathBuf::from(constants::DEFAULT_CONFIG_FILE),
            project_name: None,
            stop_timeout_secs: constants::DEFAULT_STOP_TIMEOUT_SECS,
        }
    }
}

impl FlotillaConfig {
    /// Returns the project name for this configuration.
    #[must_use]
    pub fn resolved_project_name(&self) -> String {
        project_name(self.project_name.as_deref(), &self.file)
    }
}

/// Reads a service configuration file into a name-to-options mapping.
///
/// Validation of the individual entries happens when the project is built.
///
/// # Errors
///
/// Returns an error if the file cannot be read, is not valid YAML, or its
/// top level is not a mapping.
pub fn load_services(path: &Path) -> Result<Mapping> {
    tracing::debug!(path = %path.display(), "loading service configuration");
    let content = std::fs::read_to_string(path).map_err(|e| FlotillaError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    parse_services(&content)
}

/// Parses service configuration text.
///
/// An empty document yields an empty mapping.
///
/// # Errors
///
/// Returns an error if the text is not valid YAML or is not a mapping.
pub fn parse_services(content: &str) -> Result<Mapping> {
    let value: serde_yaml::Value = serde_yaml::from_str(content)?;
    match value {
        serde_yaml::Value::Mapping(map) => Ok(map),
        serde_yaml::Value::Null => Ok(Mapping::new()),
        _ => Err(FlotillaError::config(
            "top level of the service configuration must be a mapping of service names",
        )),
    }
}

/// Determines the project name.
///
/// Precedence: `explicit`, then the `FLOTILLA_PROJECT_NAME` environment
/// variable, then the name of the directory holding `file`.
#[must_use]
pub fn project_name(explicit: Option<&str>, file: &Path) -> String {
    if let Some(name) = explicit {
        return normalize_project_name(name);
    }
    if let Ok(name) = std::env::var(constants::PROJECT_NAME_ENV) {
        return normalize_project_name(&name);
    }
    let dir = std::fs::canonicalize(file)
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf))
        .or_else(|| std::env::current_dir().ok());
    let base = dir
        .as_deref()
        .and_then(Path::file_name)
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    normalize_project_name(&base)
}

/// Lowercases and strips everything except ASCII letters and digits.
#[must_use]
pub fn normalize_project_name(raw: &str) -> String {
    let name: String = raw
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect();
    if name.is_empty() {
        constants::DEFAULT_PROJECT_NAME.to_string()
    } else {
        name
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn default_config_points_at_default_file() {
        let cfg = FlotillaConfig::default();
        assert_eq!(cfg.file, PathBuf::from("flotilla.yml"));
        assert_eq!(cfg.stop_timeout_secs, 10);
    }

    #[test]
    fn normalize_strips_punctuation_and_case() {
        assert_eq!(normalize_project_name("My-App_2"), "myapp2");
        assert_eq!(normalize_project_name("__"), "default");
    }

    #[test]
    fn explicit_name_wins() {
        let name = project_name(Some("Flotilla-Test"), Path::new("nowhere/flotilla.yml"));
        assert_eq!(name, "flotillatest");
    }

    #[test]
    fn load_services_reads_mapping() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "web:\n  image: busybox:latest\n  links: [db]\ndb:\n  image: postgres"
        )
        .unwrap();

        let services = load_services(file.path()).unwrap();
        assert_eq!(services.len(), 2);
        let keys: Vec<_> = services.keys().filter_map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["web", "db"]);
    }

    #[test]
    fn load_services_rejects_sequence() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "- web\n- db").unwrap();

        let err = load_services(file.path()).unwrap_err();
        assert!(err.is_configuration_error(), "got: {err}");
    }

    #[test]
    fn load_services_reports_missing_file() {
        let err = load_services(Path::new("/definitely/not/here.yml")).unwrap_err();
        assert!(matches!(err, FlotillaError::Io { .. }));
    }

    #[test]
    fn empty_document_is_empty_mapping() {
        assert!(parse_services("").unwrap().is_empty());
    }
}
