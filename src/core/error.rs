//! Error handling for layer publishing
//!
//! This module provides the error type shared by every component, together
//! with the classification the orchestration layer uses to decide how a
//! failure is reported to the user.

use crate::core::traits::ServerRole;
use thiserror::Error;

/// Error categories used to route a failure to the right kind of report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// User-actionable problems found before any network effect
    Validation,
    /// A server could not be reached
    Connectivity,
    /// Anything else raised while publishing or exporting
    TaskExecution,
    /// A selected server or layer no longer resolves
    Lookup,
}

/// Main error type for layer publishing operations
#[derive(Error, Debug)]
pub enum PublishError {
    // Lookup errors
    #[error("[{role}] server not found: {name}")]
    ServerNotFound { role: ServerRole, name: String },

    #[error("layer not found: {name}")]
    LayerNotFound { name: String },

    // Validation errors
    #[error("publishing rejected, {} issue(s) found", errors.len())]
    ValidationRejected { errors: Vec<String> },

    // Connectivity errors
    #[error("[{server}] connection error: {message}")]
    ConnectionFailed { server: String, message: String },

    // Task execution errors
    #[error("[{server}] request failed: {message}")]
    ServerRequest { server: String, message: String },

    #[error("export to {path} failed: {message}")]
    ExportFailed { path: String, message: String },

    #[error("cannot read metadata file {path}: {message}")]
    MetadataFormat { path: String, message: String },

    #[error("cannot reproject extent from {from} to {to}")]
    Reprojection { from: String, to: String },

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PublishError {
    /// Classify this error for reporting
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::ServerNotFound { .. } | Self::LayerNotFound { .. } => ErrorClass::Lookup,
            Self::ValidationRejected { .. } => ErrorClass::Validation,
            Self::ConnectionFailed { .. } => ErrorClass::Connectivity,
            Self::ServerRequest { .. }
            | Self::ExportFailed { .. }
            | Self::MetadataFormat { .. }
            | Self::Reprojection { .. }
            | Self::ConfigError(_)
            | Self::Io(_) => ErrorClass::TaskExecution,
        }
    }

    /// Check if this error means a server was unreachable
    pub fn is_connectivity(&self) -> bool {
        self.class() == ErrorClass::Connectivity
    }

    /// Get error code for this error
    pub fn code(&self) -> &'static str {
        match self {
            Self::ServerNotFound { .. } => "SERVER_NOT_FOUND",
            Self::LayerNotFound { .. } => "LAYER_NOT_FOUND",
            Self::ValidationRejected { .. } => "VALIDATION_REJECTED",
            Self::ConnectionFailed { .. } => "CONNECTION_FAILED",
            Self::ServerRequest { .. } => "SERVER_REQUEST",
            Self::ExportFailed { .. } => "EXPORT_FAILED",
            Self::MetadataFormat { .. } => "METADATA_FORMAT",
            Self::Reprojection { .. } => "REPROJECTION",
            Self::ConfigError(_) => "CONFIG_ERROR",
            Self::Io(_) => "IO_ERROR",
        }
    }

    /// Get suggested actions for this error
    pub fn suggested_actions(&self) -> Vec<&'static str> {
        match self {
            Self::ServerNotFound { .. } => vec![
                "Check the server list in .layer-publisher.yml",
                "Select another server",
            ],
            Self::LayerNotFound { .. } => vec!["Reload the project layers"],
            Self::ValidationRejected { .. } => vec!["Fix the listed issues and publish again"],
            Self::ConnectionFailed { .. } => vec![
                "Check that the server is running",
                "Check the server URL and credentials",
            ],
            Self::ServerRequest { .. } => vec![
                "Check the server log",
                "Check that the account can write to the server",
            ],
            Self::ExportFailed { .. } => vec!["Check that the export folder is writable"],
            Self::MetadataFormat { .. } => {
                vec!["Use an ISO19139 or ESRI-ISO metadata document"]
            }
            Self::Reprojection { .. } => vec!["Check the layer CRS"],
            Self::ConfigError(_) => vec!["Run `layer-publisher check` to validate the configuration"],
            Self::Io(_) => vec!["Check file permissions"],
        }
    }
}
