//! Configuration file discovery and loading
//!
//! Bootstrap configuration follows this priority order:
//! 1. Explicit path (command-line argument)
//! 2. Environment variable (`CADENCE_CONFIG`)
//! 3. Per-user config file (`<config dir>/cadence/config.toml`)
//! 4. System config file (`/etc/cadence/config.toml`, Linux only)
//!
//! A missing file is not an error: callers get `T::default()` and a warning.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "CADENCE_CONFIG";

const APP_DIR: &str = "cadence";
const CONFIG_FILE: &str = "config.toml";

/// Locate the configuration file to use, if any exists
pub fn locate_config_file(cli_arg: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    let user_config = dirs::config_dir().map(|d| d.join(APP_DIR).join(CONFIG_FILE));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc").join(APP_DIR).join(CONFIG_FILE);
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Load a TOML configuration, degrading to defaults when the file is absent
///
/// A file that exists but fails to parse is an error: silently ignoring a
/// typo'd config would be worse than refusing to start.
pub fn load_toml_or_default<T>(path: Option<&Path>) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    let Some(path) = path else {
        debug!("No config file found, using built-in defaults");
        return Ok(T::default());
    };

    match std::fs::read_to_string(path) {
        Ok(content) => {
            debug!("Loading config from {}", path.display());
            toml::from_str(&content).map_err(|e| {
                Error::Config(format!("Failed to parse {}: {}", path.display(), e))
            })
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!("Config file {} not found, using defaults", path.display());
            Ok(T::default())
        }
        Err(e) => Err(Error::Io(e)),
    }
}

/// OS-dependent data directory for the database and other state
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from("./cadence_data"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serial_test::serial;
    use std::io::Write;

    #[derive(Debug, Default, Deserialize, PartialEq)]
    struct Sample {
        #[serde(default)]
        port: u16,
        #[serde(default)]
        name: Option<String>,
    }

    #[test]
    fn test_missing_file_yields_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let cfg: Sample = load_toml_or_default(Some(&path)).unwrap();
        assert_eq!(cfg, Sample::default());
    }

    #[test]
    fn test_none_path_yields_default() {
        let cfg: Sample = load_toml_or_default(None).unwrap();
        assert_eq!(cfg, Sample::default());
    }

    #[test]
    fn test_valid_file_is_parsed() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "port = 6001\nname = \"den\"").unwrap();
        let cfg: Sample = load_toml_or_default(Some(file.path())).unwrap();
        assert_eq!(cfg.port, 6001);
        assert_eq!(cfg.name.as_deref(), Some("den"));
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "port = [oops").unwrap();
        let err = load_toml_or_default::<Sample>(Some(file.path())).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    #[serial]
    fn test_cli_arg_beats_environment() {
        std::env::set_var(CONFIG_ENV_VAR, "/tmp/from-env.toml");
        let chosen = locate_config_file(Some(Path::new("/tmp/from-cli.toml")));
        assert_eq!(chosen, Some(PathBuf::from("/tmp/from-cli.toml")));

        let chosen = locate_config_file(None);
        assert_eq!(chosen, Some(PathBuf::from("/tmp/from-env.toml")));
        std::env::remove_var(CONFIG_ENV_VAR);
    }
}
