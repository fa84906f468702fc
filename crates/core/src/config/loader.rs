use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use std::path::Path;

use super::{types::Config, ConfigError};

/// Prefix of environment overrides; nested keys are joined with `__`.
pub const ENV_PREFIX: &str = "HARVESTER_";

fn extract(figment: Figment) -> Result<Config, ConfigError> {
    figment
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))
}

/// Load a TOML file, then apply environment overrides on top.
///
/// `HARVESTER_ORCHESTRATOR__MAX_CONCURRENT_REQUESTS=4` sets
/// `orchestrator.max_concurrent_requests`.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    extract(
        Figment::from(Toml::file(path)).merge(Env::prefixed(ENV_PREFIX).split("__")),
    )
}

/// Parse TOML text alone; the environment is not consulted.
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    extract(Figment::from(Toml::string(toml_str)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_str_overrides_defaults() {
        let config = load_config_from_str("[orchestrator]\nmax_pages = 3\n").unwrap();
        assert_eq!(config.orchestrator.max_pages, 3);
        assert_eq!(config.orchestrator.max_concurrent_requests, 8);
        assert!(config.indexers.is_empty());
    }

    #[test]
    fn test_wrong_type_is_parse_error() {
        let result = load_config_from_str("[orchestrator]\nmax_pages = \"many\"\n");
        assert!(matches!(result.unwrap_err(), ConfigError::ParseError(_)));
    }

    #[test]
    fn test_missing_file() {
        let result = load_config(Path::new("/nonexistent/harvester.toml"));
        assert!(matches!(result.unwrap_err(), ConfigError::FileNotFound(_)));
    }

    #[test]
    fn test_file_with_application() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[transport]
timeout_secs = 12

[[applications]]
id = 3
name = "Radarr"
implementation = "radarr"
base_url = "http://radarr:7878"
api_key = "k"
sync_level = "add_only"
"#
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.transport.timeout_secs, 12);
        assert_eq!(config.applications.len(), 1);
        assert_eq!(config.applications[0].id, 3);
    }

    #[test]
    fn test_env_overrides_nested_key() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[orchestrator]\nsearch_timeout_secs = 30\n").unwrap();

        std::env::set_var("HARVESTER_ORCHESTRATOR__SEARCH_TIMEOUT_SECS", "7");
        let from_file = load_config(file.path());
        let from_str = load_config_from_str("[orchestrator]\nsearch_timeout_secs = 30\n");
        std::env::remove_var("HARVESTER_ORCHESTRATOR__SEARCH_TIMEOUT_SECS");

        assert_eq!(from_file.unwrap().orchestrator.search_timeout_secs, 7);
        assert_eq!(from_str.unwrap().orchestrator.search_timeout_secs, 30);
    }
}
