//! Configuration file loader for layer-publisher
//!
//! This module provides configuration loading, validation, and merging capabilities.

use super::config::*;
use lazy_static::lazy_static;
use crate::core::error::PublishError;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Configuration file name
pub const CONFIG_FILENAME: &str = ".layer-publisher.yml";

/// Environment variable pattern (${VAR_NAME})
const ENV_VAR_PATTERN: &str = r"\$\{([A-Z_][A-Z0-9_]*)\}";

lazy_static! {
    static ref ENV_VAR_REGEX: Regex = Regex::new(ENV_VAR_PATTERN).unwrap();
}

/// Configuration load options
#[derive(Debug, Clone)]
pub struct ConfigLoadOptions {
    /// Directory holding the project config
    pub project_path: PathBuf,

    /// Home directory holding the global config, if any
    pub home_path: Option<PathBuf>,

    /// Environment variables
    pub env: HashMap<String, String>,
}

impl ConfigLoadOptions {
    /// Options for the current process environment
    pub fn from_env<P: Into<PathBuf>>(project_path: P) -> Self {
        let env: HashMap<String, String> = std::env::vars().collect();
        Self {
            project_path: project_path.into(),
            home_path: env.get("HOME").map(PathBuf::from),
            env,
        }
    }
}

/// Configuration validation result
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigValidationResult {
    pub valid: bool,
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationWarning>,
}

/// Configuration validation error
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigValidationError {
    /// Field path (e.g., "servers.geodata[0].url")
    pub field: String,
    pub message: String,
}

/// Configuration validation warning
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

/// Configuration file loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from multiple sources with priority
    ///
    /// Priority (high to low):
    /// 1. Environment variables
    /// 2. Project config (./.layer-publisher.yml)
    /// 3. Global config (~/.layer-publisher.yml)
    /// 4. Default values
    pub async fn load(options: ConfigLoadOptions) -> Result<BridgeConfig, PublishError> {
        let mut configs: Vec<BridgeConfig> = vec![BridgeConfig::default()];

        if let Some(home) = &options.home_path
            && let Some(global_config) = Self::load_config_file(&home.join(CONFIG_FILENAME)).await?
        {
            configs.push(global_config);
        }

        if let Some(project_config) =
            Self::load_config_file(&options.project_path.join(CONFIG_FILENAME)).await?
        {
            configs.push(project_config);
        }

        if let Some(env_config) = Self::load_env_config(&options.env) {
            configs.push(env_config);
        }

        let merged_config = Self::merge_configs(configs);

        Ok(Self::expand_env_vars(merged_config, &options.env))
    }

    /// Load configuration from YAML file
    pub async fn load_config_file(file_path: &Path) -> Result<Option<BridgeConfig>, PublishError> {
        if fs::metadata(file_path).await.is_err() {
            tracing::debug!(path = %file_path.display(), "no configuration file");
            return Ok(None);
        }

        let content = fs::read_to_string(file_path).await.map_err(|e| {
            PublishError::ConfigError(format!("Failed to read config file: {}", e))
        })?;

        let config: BridgeConfig = serde_yaml::from_str(&content).map_err(|e| {
            PublishError::ConfigError(format!("Failed to parse YAML config: {}", e))
        })?;

        tracing::debug!(path = %file_path.display(), "loaded configuration file");
        Ok(Some(config))
    }

    /// Load configuration from environment variables
    fn load_env_config(env: &HashMap<String, String>) -> Option<BridgeConfig> {
        let mut config = BridgeConfig {
            version: String::new(),
            ..Default::default()
        };
        let mut has_changes = false;

        let geodata = env.get("LAYER_PUBLISHER_GEODATA_SERVER");
        let metadata = env.get("LAYER_PUBLISHER_METADATA_SERVER");
        if geodata.is_some() || metadata.is_some() {
            config.publish = Some(PublishDefaults {
                geodata_server: geodata.cloned(),
                metadata_server: metadata.cloned(),
                ..Default::default()
            });
            has_changes = true;
        }

        if let Some(level) = env.get("LAYER_PUBLISHER_LOG") {
            config.logging = Some(LoggingConfig {
                level: level.clone(),
            });
            has_changes = true;
        }

        if has_changes { Some(config) } else { None }
    }

    /// Merge multiple configurations with priority
    fn merge_configs(configs: Vec<BridgeConfig>) -> BridgeConfig {
        let mut result = BridgeConfig::default();

        for config in configs {
            Self::merge_into(&mut result, config);
        }

        result
    }

    /// Merge source config into target
    fn merge_into(target: &mut BridgeConfig, source: BridgeConfig) {
        if !source.version.is_empty() {
            target.version = source.version;
        }

        // Server lists replace each other per role
        if !source.servers.geodata.is_empty() {
            target.servers.geodata = source.servers.geodata;
        }
        if !source.servers.metadata.is_empty() {
            target.servers.metadata = source.servers.metadata;
        }

        if let Some(source_publish) = source.publish {
            let target_publish = target.publish.get_or_insert_with(PublishDefaults::default);

            if source_publish.geodata_server.is_some() {
                target_publish.geodata_server = source_publish.geodata_server;
            }
            if source_publish.metadata_server.is_some() {
                target_publish.metadata_server = source_publish.metadata_server;
            }
            if source_publish.only_symbology.is_some() {
                target_publish.only_symbology = source_publish.only_symbology;
            }
            if source_publish.background.is_some() {
                target_publish.background = source_publish.background;
            }
            if source_publish.export.is_some() {
                target_publish.export = source_publish.export;
            }
        }

        if source.logging.is_some() {
            target.logging = source.logging;
        }
    }

    /// Expand `${VAR}` references in server URLs and credentials
    fn expand_env_vars(mut config: BridgeConfig, env: &HashMap<String, String>) -> BridgeConfig {
        for server in &mut config.servers.geodata {
            server.url = Self::expand_string(&server.url, env);
            server.username = server.username.as_deref().map(|s| Self::expand_string(s, env));
            server.password = server.password.as_deref().map(|s| Self::expand_string(s, env));
        }
        for server in &mut config.servers.metadata {
            server.url = Self::expand_string(&server.url, env);
            server.username = server.username.as_deref().map(|s| Self::expand_string(s, env));
            server.password = server.password.as_deref().map(|s| Self::expand_string(s, env));
        }
        if let Some(export) = config.publish.as_mut().and_then(|p| p.export.as_mut()) {
            export.folder = Self::expand_string(&export.folder, env);
        }
        config
    }

    /// Expand environment variables in a single string; unknown variables
    /// are left in place
    fn expand_string(input: &str, env: &HashMap<String, String>) -> String {
        ENV_VAR_REGEX
            .replace_all(input, |cap: &regex::Captures| match env.get(&cap[1]) {
                Some(value) => value.clone(),
                None => {
                    tracing::warn!(variable = &cap[1], "environment variable not found");
                    cap[0].to_string()
                }
            })
            .into_owned()
    }

    /// Validate configuration
    pub fn validate(config: &BridgeConfig) -> ConfigValidationResult {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if config.version.is_empty() {
            errors.push(ConfigValidationError {
                field: "version".to_string(),
                message: "Version is required".to_string(),
            });
        } else if config.version != "1.0" {
            warnings.push(ConfigValidationWarning {
                field: "version".to_string(),
                message: format!("Unknown version: {}", config.version),
                suggestion: Some("Currently supported version is \"1.0\" only".to_string()),
            });
        }

        let geodata: Vec<(&str, &str)> = config
            .servers
            .geodata
            .iter()
            .map(|s| (s.name.as_str(), s.url.as_str()))
            .collect();
        Self::validate_servers("servers.geodata", &geodata, &mut errors, &mut warnings);

        let metadata: Vec<(&str, &str)> = config
            .servers
            .metadata
            .iter()
            .map(|s| (s.name.as_str(), s.url.as_str()))
            .collect();
        Self::validate_servers("servers.metadata", &metadata, &mut errors, &mut warnings);

        if let Some(publish) = &config.publish {
            Self::validate_publish_defaults(config, publish, &mut errors, &mut warnings);
        }

        ConfigValidationResult {
            valid: errors.is_empty(),
            errors,
            warnings,
        }
    }

    /// Validate one role's server list
    fn validate_servers(
        prefix: &str,
        servers: &[(&str, &str)],
        errors: &mut Vec<ConfigValidationError>,
        warnings: &mut Vec<ConfigValidationWarning>,
    ) {
        let mut seen = HashSet::new();

        for (i, (name, url)) in servers.iter().enumerate() {
            if name.trim().is_empty() {
                errors.push(ConfigValidationError {
                    field: format!("{}[{}].name", prefix, i),
                    message: "name is required".to_string(),
                });
            } else if !seen.insert(*name) {
                errors.push(ConfigValidationError {
                    field: format!("{}[{}].name", prefix, i),
                    message: format!("duplicate server name: {}", name),
                });
            }

            if url.trim().is_empty() {
                errors.push(ConfigValidationError {
                    field: format!("{}[{}].url", prefix, i),
                    message: "url is required".to_string(),
                });
            } else if !url.starts_with("http://") && !url.starts_with("https://") {
                warnings.push(ConfigValidationWarning {
                    field: format!("{}[{}].url", prefix, i),
                    message: format!("url does not look like an HTTP URL: {}", url),
                    suggestion: Some("Use http:// or https://".to_string()),
                });
            } else if url.contains("${") {
                warnings.push(ConfigValidationWarning {
                    field: format!("{}[{}].url", prefix, i),
                    message: "url contains an unexpanded variable".to_string(),
                    suggestion: Some("Export the referenced environment variable".to_string()),
                });
            }
        }
    }

    /// Validate publish defaults against the server lists
    fn validate_publish_defaults(
        config: &BridgeConfig,
        publish: &PublishDefaults,
        errors: &mut Vec<ConfigValidationError>,
        warnings: &mut Vec<ConfigValidationWarning>,
    ) {
        if let Some(name) = &publish.geodata_server
            && !config.servers.geodata.iter().any(|s| &s.name == name)
        {
            warnings.push(ConfigValidationWarning {
                field: "publish.geodataServer".to_string(),
                message: format!("unknown geodata server: {}", name),
                suggestion: Some("Data will not be published".to_string()),
            });
        }

        if let Some(name) = &publish.metadata_server
            && !config.servers.metadata.iter().any(|s| &s.name == name)
        {
            warnings.push(ConfigValidationWarning {
                field: "publish.metadataServer".to_string(),
                message: format!("unknown metadata server: {}", name),
                suggestion: Some("Metadata will not be published".to_string()),
            });
        }

        if let Some(export) = &publish.export
            && export.folder.trim().is_empty()
        {
            errors.push(ConfigValidationError {
                field: "publish.export.folder".to_string(),
                message: "folder is required".to_string(),
            });
        }
    }

    /// Format validation result as human-readable string
    pub fn format_validation_result(result: &ConfigValidationResult) -> String {
        let mut lines = Vec::new();

        if result.valid {
            lines.push("✅ Configuration validation succeeded".to_string());
        } else {
            lines.push("❌ Configuration has errors".to_string());
        }

        if !result.errors.is_empty() {
            lines.push("\n🔴 Errors:".to_string());
            for error in &result.errors {
                lines.push(format!("  - [{}] {}", error.field, error.message));
            }
        }

        if !result.warnings.is_empty() {
            lines.push("\n🟡 Warnings:".to_string());
            for warning in &result.warnings {
                lines.push(format!("  - [{}] {}", warning.field, warning.message));
                if let Some(suggestion) = &warning.suggestion {
                    lines.push(format!("    Suggestion: {}", suggestion));
                }
            }
        }

        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn geoserver(name: &str, url: &str) -> GeodataServerConfig {
        GeodataServerConfig {
            name: name.to_string(),
            server_type: GeodataServerType::Geoserver,
            url: url.to_string(),
            workspace: None,
            username: None,
            password: None,
            timeout_secs: None,
        }
    }

    #[tokio::test]
    async fn test_load_project_config_with_env_expansion() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(
            temp_dir.path().join(CONFIG_FILENAME),
            r#"
version: "1.0"
servers:
  geodata:
    - name: GS
      type: geoserver
      url: http://localhost:8080/geoserver
      username: admin
      password: ${GS_PASSWORD}
"#,
        )
        .unwrap();

        let mut env = HashMap::new();
        env.insert("GS_PASSWORD".to_string(), "geoserver".to_string());
        env.insert("LAYER_PUBLISHER_GEODATA_SERVER".to_string(), "GS".to_string());

        let config = ConfigLoader::load(ConfigLoadOptions {
            project_path: temp_dir.path().to_path_buf(),
            home_path: None,
            env,
        })
        .await
        .unwrap();

        assert_eq!(config.servers.geodata[0].password.as_deref(), Some("geoserver"));
        assert_eq!(
            config.publish.unwrap().geodata_server.as_deref(),
            Some("GS")
        );
    }

    #[tokio::test]
    async fn test_project_config_overrides_global() {
        let home = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        std::fs::write(
            home.path().join(CONFIG_FILENAME),
            "version: \"1.0\"\nlogging:\n  level: warn\npublish:\n  onlySymbology: true\n",
        )
        .unwrap();
        std::fs::write(
            project.path().join(CONFIG_FILENAME),
            "version: \"1.0\"\nlogging:\n  level: debug\n",
        )
        .unwrap();

        let config = ConfigLoader::load(ConfigLoadOptions {
            project_path: project.path().to_path_buf(),
            home_path: Some(home.path().to_path_buf()),
            env: HashMap::new(),
        })
        .await
        .unwrap();

        assert_eq!(config.logging.unwrap().level, "debug");
        assert_eq!(config.publish.unwrap().only_symbology, Some(true));
    }

    #[tokio::test]
    async fn test_missing_config_gives_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = ConfigLoader::load(ConfigLoadOptions {
            project_path: temp_dir.path().to_path_buf(),
            home_path: None,
            env: HashMap::new(),
        })
        .await
        .unwrap();

        assert_eq!(config, BridgeConfig::default());
    }

    #[tokio::test]
    async fn test_invalid_yaml_is_config_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(CONFIG_FILENAME);
        std::fs::write(&path, "servers: [unclosed").unwrap();

        let err = ConfigLoader::load_config_file(&path).await.unwrap_err();
        assert_eq!(err.code(), "CONFIG_ERROR");
    }

    #[test]
    fn test_expand_string_keeps_unknown_variables() {
        let mut env = HashMap::new();
        env.insert("GS_USER".to_string(), "admin".to_string());

        let result = ConfigLoader::expand_string("${GS_USER}:${MISSING}", &env);
        assert_eq!(result, "admin:${MISSING}");
    }

    #[test]
    fn test_validate_duplicate_and_empty() {
        let mut config = BridgeConfig::default();
        config.servers.geodata = vec![
            geoserver("GS", "http://a"),
            geoserver("GS", "http://b"),
            geoserver("", ""),
        ];

        let result = ConfigLoader::validate(&config);

        assert!(!result.valid);
        assert_eq!(result.errors.len(), 3);
        assert_eq!(result.errors[0].field, "servers.geodata[1].name");
    }

    #[test]
    fn test_validate_unknown_default_server_warns() {
        let mut config = BridgeConfig::default();
        config.servers.geodata = vec![geoserver("GS", "http://localhost")];
        config.publish = Some(PublishDefaults {
            geodata_server: Some("Other".to_string()),
            ..Default::default()
        });

        let result = ConfigLoader::validate(&config);

        assert!(result.valid);
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.warnings[0].field, "publish.geodataServer");
    }

    #[test]
    fn test_format_validation_result() {
        let result = ConfigValidationResult {
            valid: false,
            errors: vec![ConfigValidationError {
                field: "version".to_string(),
                message: "Version is required".to_string(),
            }],
            warnings: vec![ConfigValidationWarning {
                field: "servers.geodata[0].url".to_string(),
                message: "url does not look like an HTTP URL".to_string(),
                suggestion: Some("Use http:// or https://".to_string()),
            }],
        };

        let formatted = ConfigLoader::format_validation_result(&result);

        assert!(formatted.contains("❌ Configuration has errors"));
        assert!(formatted.contains("[version]"));
        assert!(formatted.contains("🟡 Warnings:"));
        assert!(formatted.contains("Suggestion: Use http://"));
    }
}
