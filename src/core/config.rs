//! Configuration structures and types for layer-publisher
//!
//! This module provides type-safe configuration management with serde support.

use crate::core::traits::MetadataProfile;
use serde::{Deserialize, Serialize};

/// Root configuration object
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BridgeConfig {
    /// Schema version (required)
    pub version: String,

    /// Configured servers, per role
    #[serde(default)]
    pub servers: ServersConfig,

    /// Publish defaults (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publish: Option<PublishDefaults>,

    /// Logging settings (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            servers: ServersConfig::default(),
            publish: None,
            logging: None,
        }
    }
}

/// Server lists; order is the order shown to the user
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ServersConfig {
    #[serde(default)]
    pub geodata: Vec<GeodataServerConfig>,

    #[serde(default)]
    pub metadata: Vec<MetadataServerConfig>,
}

/// Geodata server product
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GeodataServerType {
    Geoserver,
}

/// Metadata server product
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MetadataServerType {
    Geonetwork,
}

/// Geodata server entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeodataServerConfig {
    /// Display name, unique per role
    pub name: String,

    #[serde(rename = "type")]
    pub server_type: GeodataServerType,

    /// Base URL (e.g. "http://localhost:8080/geoserver")
    pub url: String,

    /// Workspace layers are published into (default: "bridge")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Password, usually `${ENV_VAR}`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Request timeout in seconds (default: 30)
    #[serde(skip_serializing_if = "Option::is_none", rename = "timeoutSecs")]
    pub timeout_secs: Option<u64>,
}

/// Metadata server entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetadataServerConfig {
    /// Display name, unique per role
    pub name: String,

    #[serde(rename = "type")]
    pub server_type: MetadataServerType,

    /// Base URL (e.g. "http://localhost:8080/geonetwork")
    pub url: String,

    #[serde(default)]
    pub profile: MetadataProfile,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none", rename = "timeoutSecs")]
    pub timeout_secs: Option<u64>,
}

/// Publish defaults
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PublishDefaults {
    /// Server selected for data at start-up
    #[serde(skip_serializing_if = "Option::is_none", rename = "geodataServer")]
    pub geodata_server: Option<String>,

    /// Server selected for metadata at start-up
    #[serde(skip_serializing_if = "Option::is_none", rename = "metadataServer")]
    pub metadata_server: Option<String>,

    /// Publish symbology only (default: false)
    #[serde(skip_serializing_if = "Option::is_none", rename = "onlySymbology")]
    pub only_symbology: Option<bool>,

    /// Run publish tasks in the background (default: false)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background: Option<bool>,

    /// Offline export settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub export: Option<ExportConfig>,
}

/// Offline export settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExportConfig {
    pub folder: String,

    #[serde(default = "default_true")]
    pub data: bool,

    #[serde(default = "default_true")]
    pub metadata: bool,

    #[serde(default = "default_true")]
    pub symbology: bool,
}

fn default_true() -> bool {
    true
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Filter directive (e.g. "info", "layer_publisher=debug")
    pub level: String,
}
