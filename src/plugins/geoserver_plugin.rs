//! GeoServer Plugin - Geodata publishing through the GeoServer REST API
//!
//! This module provides the GeoServer integration:
//! - Connection check against the version endpoint
//! - Layer/style existence and deletion in a workspace
//! - GeoPackage and GeoTIFF upload with attribute restriction
//! - SLD style upload and assignment
//! - WMS preview URLs

use crate::core::config::GeodataServerConfig;
use crate::core::error::PublishError;
use crate::core::layer::{BoundingBox, FieldInclusion, Layer};
use crate::core::traits::{GeodataServer, ValidationErrors};
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use std::path::Path;
use std::time::Duration;
use tokio::fs;

/// Workspace used when the configuration names none
pub const DEFAULT_WORKSPACE: &str = "bridge";

/// Default request timeout in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Data formats the upload endpoints accept, by file extension
const VECTOR_FORMATS: &[&str] = &["gpkg"];
const RASTER_FORMATS: &[&str] = &["tif", "tiff"];

/// GeoServer geodata server
pub struct GeoServerPlugin {
    name: String,
    base_url: String,
    workspace: String,
    username: Option<String>,
    password: Option<SecretString>,
    client: reqwest::Client,
}

impl GeoServerPlugin {
    /// Create a GeoServer client from its configuration entry
    pub fn from_config(config: &GeodataServerConfig) -> Result<Self, PublishError> {
        let timeout = Duration::from_secs(config.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS));
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PublishError::ConfigError(format!("HTTP client: {}", e)))?;

        Ok(Self {
            name: config.name.clone(),
            base_url: config.url.trim_end_matches('/').to_string(),
            workspace: config
                .workspace
                .clone()
                .unwrap_or_else(|| DEFAULT_WORKSPACE.to_string()),
            username: config.username.clone(),
            password: config
                .password
                .as_ref()
                .map(|p| SecretString::new(p.clone().into())),
            client,
        })
    }

    pub fn workspace(&self) -> &str {
        &self.workspace
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let builder = self.client.request(method, url);
        match &self.username {
            Some(user) => builder.basic_auth(
                user,
                self.password.as_ref().map(|p| p.expose_secret().to_string()),
            ),
            None => builder,
        }
    }

    /// Translate a transport error
    fn transport_error(&self, e: reqwest::Error) -> PublishError {
        if e.is_connect() || e.is_timeout() {
            PublishError::ConnectionFailed {
                server: self.name.clone(),
                message: e.to_string(),
            }
        } else {
            PublishError::ServerRequest {
                server: self.name.clone(),
                message: e.to_string(),
            }
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<reqwest::Response, PublishError> {
        builder.send().await.map_err(|e| self.transport_error(e))
    }

    /// Fail unless the response status is a success
    async fn expect_success(
        &self,
        response: reqwest::Response,
        action: &str,
    ) -> Result<(), PublishError> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(PublishError::ServerRequest {
            server: self.name.clone(),
            message: format!("{} failed (HTTP {}): {}", action, status, body.trim()),
        })
    }

    /// GET a resource and report whether it exists
    async fn resource_exists(&self, path: &str) -> Result<bool, PublishError> {
        let response = self
            .send(self.request(Method::GET, path).header("Accept", "application/json"))
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            status => Err(PublishError::ServerRequest {
                server: self.name.clone(),
                message: format!("GET {} returned HTTP {}", path, status),
            }),
        }
    }

    async fn ensure_workspace(&self) -> Result<(), PublishError> {
        let path = format!("/rest/workspaces/{}.json", self.workspace);
        if self.resource_exists(&path).await? {
            return Ok(());
        }

        tracing::info!(server = %self.name, workspace = %self.workspace, "creating workspace");
        let response = self
            .send(
                self.request(Method::POST, "/rest/workspaces")
                    .json(&json!({ "workspace": { "name": self.workspace } })),
            )
            .await?;
        self.expect_success(response, "create workspace").await
    }

    /// Upload a vector file as a datastore, then restrict its attributes
    async fn upload_vector(
        &self,
        layer: &Layer,
        extension: &str,
        fields: &FieldInclusion,
    ) -> Result<(), PublishError> {
        let data = fs::read(&layer.source).await?;
        let path = format!(
            "/rest/workspaces/{}/datastores/{}/file.{}?update=overwrite",
            self.workspace, layer.name, extension
        );
        let response = self
            .send(
                self.request(Method::PUT, &path)
                    .header("Content-Type", "application/x-sqlite3")
                    .body(data),
            )
            .await?;
        self.expect_success(response, "upload data").await?;

        let included = fields.included();
        if included.len() == fields.entries().len() {
            return Ok(());
        }

        let attributes: Vec<_> = included.iter().map(|name| json!({ "name": name })).collect();
        let path = format!(
            "/rest/workspaces/{}/datastores/{}/featuretypes/{}?recalculate=nativebbox",
            self.workspace, layer.name, layer.name
        );
        let response = self
            .send(self.request(Method::PUT, &path).json(&json!({
                "featureType": { "attributes": { "attribute": attributes } }
            })))
            .await?;
        self.expect_success(response, "restrict attributes").await
    }

    async fn upload_raster(&self, layer: &Layer) -> Result<(), PublishError> {
        let data = fs::read(&layer.source).await?;
        let path = format!(
            "/rest/workspaces/{}/coveragestores/{}/file.geotiff?update=overwrite",
            self.workspace, layer.name
        );
        let response = self
            .send(
                self.request(Method::PUT, &path)
                    .header("Content-Type", "image/tiff")
                    .body(data),
            )
            .await?;
        self.expect_success(response, "upload coverage").await
    }

    /// WMS GetMap URL opening an OpenLayers preview
    pub fn preview_url(&self, names: &[String], bbox: &BoundingBox, crs: &str) -> String {
        let layers = names
            .iter()
            .map(|n| format!("{}:{}", self.workspace, n))
            .collect::<Vec<_>>()
            .join(",");
        let width = 768.0;
        let height = if bbox.width() > 0.0 {
            (width * bbox.height() / bbox.width()).round().max(1.0)
        } else {
            width
        };

        format!(
            "{}/{}/wms?service=WMS&version=1.1.0&request=GetMap&layers={}&bbox={}&width={}&height={}&srs={}&format=application/openlayers",
            self.base_url,
            self.workspace,
            layers,
            bbox.to_query_string(),
            width,
            height,
            crs
        )
    }
}

fn extension_of(source: &str) -> String {
    Path::new(source)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

#[async_trait]
impl GeodataServer for GeoServerPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        "geoserver"
    }

    async fn test_connection(&self) -> bool {
        match self.resource_exists("/rest/about/version.json").await {
            Ok(true) => true,
            Ok(false) => {
                tracing::warn!(server = %self.name, "version endpoint not found");
                false
            }
            Err(e) => {
                tracing::warn!(server = %self.name, error = %e, "connection test failed");
                false
            }
        }
    }

    async fn layer_exists(&self, name: &str) -> Result<bool, PublishError> {
        self.resource_exists(&format!(
            "/rest/workspaces/{}/layers/{}.json",
            self.workspace, name
        ))
        .await
    }

    async fn delete_layer(&self, name: &str) -> Result<(), PublishError> {
        let path = format!(
            "/rest/workspaces/{}/layers/{}?recurse=true",
            self.workspace, name
        );
        let response = self.send(self.request(Method::DELETE, &path)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            tracing::debug!(server = %self.name, layer = name, "layer already absent");
            return Ok(());
        }
        self.expect_success(response, "delete layer").await
    }

    async fn delete_style(&self, name: &str) -> Result<(), PublishError> {
        let path = format!(
            "/rest/workspaces/{}/styles/{}?purge=true",
            self.workspace, name
        );
        let response = self.send(self.request(Method::DELETE, &path)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        self.expect_success(response, "delete style").await
    }

    async fn validate_geodata_before_publication(
        &self,
        candidates: &[Layer],
        errors: &mut ValidationErrors,
    ) {
        for layer in candidates {
            if layer.name.starts_with(|c: char| c.is_ascii_digit()) {
                errors.insert(format!("Layer name cannot start with a digit: {}", layer.name));
            }

            let extension = extension_of(&layer.source);
            let supported = if layer.is_vector() {
                VECTOR_FORMATS
            } else {
                RASTER_FORMATS
            };
            if !supported.contains(&extension.as_str()) {
                errors.insert(format!(
                    "Unsupported data format for layer {}: {}",
                    layer.name,
                    if extension.is_empty() { "none" } else { &extension }
                ));
            }
        }
    }

    async fn open_preview(&self, names: &[String], bbox: &BoundingBox, crs: &str) {
        let url = self.preview_url(names, bbox, crs);
        tracing::info!(server = %self.name, %url, "opening WMS preview");
        println!("🗺️  Preview: {}", url);
    }

    async fn publish_layer(
        &self,
        layer: &Layer,
        fields: &FieldInclusion,
    ) -> Result<(), PublishError> {
        self.ensure_workspace().await?;

        let extension = extension_of(&layer.source);
        if layer.is_vector() && VECTOR_FORMATS.contains(&extension.as_str()) {
            self.upload_vector(layer, &extension, fields).await
        } else if !layer.is_vector() && RASTER_FORMATS.contains(&extension.as_str()) {
            self.upload_raster(layer).await
        } else {
            Err(PublishError::ServerRequest {
                server: self.name.clone(),
                message: format!("unsupported data format: {}", layer.source),
            })
        }
    }

    async fn publish_style(&self, layer: &Layer) -> Result<(), PublishError> {
        let Some(sld) = &layer.style else {
            tracing::debug!(layer = %layer.name, "layer has no symbology, keeping server default");
            return Ok(());
        };
        self.ensure_workspace().await?;

        let style_path = format!("/rest/workspaces/{}/styles/{}", self.workspace, layer.name);
        let exists = self.resource_exists(&format!("{}.json", style_path)).await?;
        let builder = if exists {
            self.request(Method::PUT, &style_path)
        } else {
            self.request(
                Method::POST,
                &format!("/rest/workspaces/{}/styles?name={}", self.workspace, layer.name),
            )
        };
        let response = self
            .send(
                builder
                    .header("Content-Type", "application/vnd.ogc.sld+xml")
                    .body(sld.clone()),
            )
            .await?;
        self.expect_success(response, "upload style").await?;

        let response = self
            .send(
                self.request(
                    Method::PUT,
                    &format!("/rest/layers/{}:{}", self.workspace, layer.name),
                )
                .json(&json!({
                    "layer": { "defaultStyle": { "name": format!("{}:{}", self.workspace, layer.name) } }
                })),
            )
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            // symbology-only publish of a layer the server does not hold yet
            tracing::debug!(layer = %layer.name, "style uploaded without a layer to assign it to");
            return Ok(());
        }
        self.expect_success(response, "assign style").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::layer::LayerKind;
    use crate::core::metadata::LayerMetadata;

    fn plugin(url: &str) -> GeoServerPlugin {
        GeoServerPlugin::from_config(&GeodataServerConfig {
            name: "GS".to_string(),
            server_type: crate::core::config::GeodataServerType::Geoserver,
            url: url.to_string(),
            workspace: Some("demo".to_string()),
            username: Some("admin".to_string()),
            password: Some("geoserver".to_string()),
            timeout_secs: Some(1),
        })
        .unwrap()
    }

    fn layer(name: &str, kind: LayerKind, source: &str) -> Layer {
        Layer {
            id: name.to_string(),
            name: name.to_string(),
            kind,
            provider: "ogr".to_string(),
            source: source.to_string(),
            crs: "EPSG:4326".to_string(),
            extent: BoundingBox::new(0.0, 0.0, 2.0, 1.0),
            fields: vec![],
            metadata: LayerMetadata::default(),
            style: None,
        }
    }

    #[test]
    fn test_default_workspace() {
        let plugin = GeoServerPlugin::from_config(&GeodataServerConfig {
            name: "GS".to_string(),
            server_type: crate::core::config::GeodataServerType::Geoserver,
            url: "http://localhost/geoserver/".to_string(),
            workspace: None,
            username: None,
            password: None,
            timeout_secs: None,
        })
        .unwrap();

        assert_eq!(plugin.workspace(), DEFAULT_WORKSPACE);
        assert_eq!(plugin.kind(), "geoserver");
    }

    #[test]
    fn test_preview_url() {
        let plugin = plugin("http://localhost:8080/geoserver/");
        let url = plugin.preview_url(
            &["roads".to_string(), "rivers".to_string()],
            &BoundingBox::new(0.0, 0.0, 2.0, 1.0),
            "EPSG:4326",
        );

        assert!(url.starts_with("http://localhost:8080/geoserver/demo/wms?"));
        assert!(url.contains("layers=demo:roads,demo:rivers"));
        assert!(url.contains("bbox=0,0,2,1"));
        assert!(url.contains("height=384"));
        assert!(url.contains("srs=EPSG:4326"));
    }

    #[tokio::test]
    async fn test_validation_flags_formats_and_names() {
        let plugin = plugin("http://localhost:8080/geoserver");
        let candidates = vec![
            layer("roads", LayerKind::Vector, "/data/roads.gpkg"),
            layer("1dem", LayerKind::Raster, "/data/dem.TIF"),
            layer("parcels", LayerKind::Vector, "/data/parcels.shp"),
        ];
        let mut errors = ValidationErrors::new();

        plugin
            .validate_geodata_before_publication(&candidates, &mut errors)
            .await;

        assert_eq!(errors.len(), 2);
        assert!(errors.contains("Layer name cannot start with a digit: 1dem"));
        assert!(errors.contains("Unsupported data format for layer parcels: shp"));
    }

    #[tokio::test]
    async fn test_unreachable_server_fails_connection_test() {
        // port 9 (discard) is closed on test machines
        let plugin = plugin("http://127.0.0.1:9/geoserver");
        assert!(!plugin.test_connection().await);

        let err = plugin.layer_exists("roads").await.unwrap_err();
        assert!(err.is_connectivity());
    }
}
