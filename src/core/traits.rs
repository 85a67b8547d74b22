//! Core traits and types for layer publishing
//!
//! This module defines the capability contracts every geodata server,
//! metadata server and export target must provide. The orchestration layer
//! only talks to servers through these traits.

use crate::core::error::PublishError;
use crate::core::layer::{BoundingBox, FieldInclusion, Layer};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;

/// Accumulated pre-publication issues, de-duplicated and sorted
pub type ValidationErrors = BTreeSet<String>;

// ============================================================================
// Roles
// ============================================================================

/// The two independent publishing targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerRole {
    Geodata,
    Metadata,
}

impl ServerRole {
    pub const ALL: [ServerRole; 2] = [ServerRole::Geodata, ServerRole::Metadata];

    pub fn as_str(&self) -> &'static str {
        match self {
            ServerRole::Geodata => "geodata",
            ServerRole::Metadata => "metadata",
        }
    }

    /// Label of the "none selected" entry at index 0
    pub fn none_label(&self) -> &'static str {
        match self {
            ServerRole::Geodata => "Do not publish data",
            ServerRole::Metadata => "Do not publish metadata",
        }
    }
}

impl fmt::Display for ServerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata profile a catalog enforces
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetadataProfile {
    #[default]
    Default,
    Inspire,
    Dutch,
}

// ============================================================================
// Geodata Server Trait
// ============================================================================

/// Capability contract of a geospatial data server
///
/// `test_connection` and `open_preview` never fail the caller; everything
/// else reports transport problems as [`PublishError::ConnectionFailed`] and
/// server-side refusals as [`PublishError::ServerRequest`].
#[async_trait]
pub trait GeodataServer: Send + Sync {
    /// Configured display name, unique within the registry
    fn name(&self) -> &str;

    /// Server product (e.g. "geoserver")
    fn kind(&self) -> &str;

    /// Check that the server answers; `false` on any failure
    async fn test_connection(&self) -> bool;

    async fn layer_exists(&self, name: &str) -> Result<bool, PublishError>;

    async fn delete_layer(&self, name: &str) -> Result<(), PublishError>;

    async fn delete_style(&self, name: &str) -> Result<(), PublishError>;

    /// Add server-specific issues for the candidate layers; no side effects
    async fn validate_geodata_before_publication(
        &self,
        candidates: &[Layer],
        errors: &mut ValidationErrors,
    );

    /// Open a map view of the given layers
    async fn open_preview(&self, names: &[String], bbox: &BoundingBox, crs: &str);

    /// Upload the layer data, restricted to the included fields
    async fn publish_layer(&self, layer: &Layer, fields: &FieldInclusion)
    -> Result<(), PublishError>;

    /// Upload the layer symbology
    async fn publish_style(&self, layer: &Layer) -> Result<(), PublishError>;
}

// ============================================================================
// Metadata Server Trait
// ============================================================================

/// Capability contract of a metadata catalog
#[async_trait]
pub trait MetadataServer: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> &str;

    fn profile(&self) -> MetadataProfile {
        MetadataProfile::Default
    }

    async fn test_connection(&self) -> bool;

    async fn metadata_exists(&self, uuid: &str) -> Result<bool, PublishError>;

    async fn delete_metadata(&self, uuid: &str) -> Result<(), PublishError>;

    /// Add catalog-specific issues for the candidate layers; no side effects
    async fn validate_metadata_before_publication(
        &self,
        candidates: &[Layer],
        errors: &mut ValidationErrors,
    );

    /// Open the catalog page of a record
    async fn open_metadata(&self, uuid: &str);

    /// Insert or replace the record of a layer
    async fn publish_metadata(&self, layer: &Layer, uuid: &str) -> Result<(), PublishError>;
}

// ============================================================================
// Exporter Trait
// ============================================================================

/// Writes layers to a local folder; the layout inside the folder is owned by
/// the implementation
#[async_trait]
pub trait Exporter: Send + Sync {
    async fn export_data(
        &self,
        folder: &Path,
        layer: &Layer,
        fields: &FieldInclusion,
    ) -> Result<(), PublishError>;

    async fn export_metadata(
        &self,
        folder: &Path,
        layer: &Layer,
        uuid: &str,
    ) -> Result<(), PublishError>;

    async fn export_symbology(&self, folder: &Path, layer: &Layer) -> Result<(), PublishError>;
}
