//! GeoNetwork Plugin - Metadata publishing through the GeoNetwork records API

use crate::core::config::MetadataServerConfig;
use crate::core::error::PublishError;
use crate::core::layer::Layer;
use crate::core::traits::{MetadataProfile, MetadataServer, ValidationErrors};
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// GeoNetwork metadata catalog
pub struct GeoNetworkPlugin {
    name: String,
    base_url: String,
    profile: MetadataProfile,
    username: Option<String>,
    password: Option<SecretString>,
    client: reqwest::Client,
}

impl GeoNetworkPlugin {
    pub fn from_config(config: &MetadataServerConfig) -> Result<Self, PublishError> {
        let timeout = Duration::from_secs(config.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS));
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PublishError::ConfigError(format!("HTTP client: {}", e)))?;

        Ok(Self {
            name: config.name.clone(),
            base_url: config.url.trim_end_matches('/').to_string(),
            profile: config.profile,
            username: config.username.clone(),
            password: config
                .password
                .as_ref()
                .map(|p| SecretString::new(p.clone().into())),
            client,
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        match &self.username {
            Some(user) => builder.basic_auth(
                user,
                self.password.as_ref().map(|p| p.expose_secret().to_string()),
            ),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<reqwest::Response, PublishError> {
        builder.send().await.map_err(|e| {
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
        })
    }

    fn status_error(&self, action: &str, status: StatusCode) -> PublishError {
        PublishError::ServerRequest {
            server: self.name.clone(),
            message: format!("{} failed (HTTP {})", action, status),
        }
    }

    /// Catalog page of a record
    pub fn record_url(&self, uuid: &str) -> String {
        format!("{}/srv/eng/catalog.search#/metadata/{}", self.base_url, uuid)
    }
}

#[async_trait]
impl MetadataServer for GeoNetworkPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        "geonetwork"
    }

    fn profile(&self) -> MetadataProfile {
        self.profile
    }

    async fn test_connection(&self) -> bool {
        let response = self
            .send(self.request(Method::GET, "/srv/api/site").header("Accept", "application/json"))
            .await;

        match response {
            Ok(r) if r.status().is_success() => true,
            Ok(r) => {
                tracing::warn!(server = %self.name, status = %r.status(), "catalog answered with an error");
                false
            }
            Err(e) => {
                tracing::warn!(server = %self.name, error = %e, "connection test failed");
                false
            }
        }
    }

    async fn metadata_exists(&self, uuid: &str) -> Result<bool, PublishError> {
        let response = self
            .send(
                self.request(Method::GET, &format!("/srv/api/records/{}", uuid))
                    .header("Accept", "application/xml"),
            )
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            status => Err(self.status_error("record lookup", status)),
        }
    }

    async fn delete_metadata(&self, uuid: &str) -> Result<(), PublishError> {
        let response = self
            .send(self.request(Method::DELETE, &format!("/srv/api/records/{}", uuid)))
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(()),
            status if status.is_success() => Ok(()),
            status => Err(self.status_error("record deletion", status)),
        }
    }

    async fn validate_metadata_before_publication(
        &self,
        candidates: &[Layer],
        errors: &mut ValidationErrors,
    ) {
        let profile = match self.profile {
            MetadataProfile::Default => return,
            MetadataProfile::Inspire => "INSPIRE",
            MetadataProfile::Dutch => "Dutch",
        };

        for layer in candidates {
            if layer.metadata.topic_categories().is_empty() {
                errors.insert(format!(
                    "Layer {} has no topic category ({} profile)",
                    layer.name, profile
                ));
            }
            if layer.metadata.licenses.is_empty() {
                errors.insert(format!(
                    "Layer {} has no license ({} profile)",
                    layer.name, profile
                ));
            }
        }
    }

    async fn open_metadata(&self, uuid: &str) {
        let url = self.record_url(uuid);
        tracing::info!(server = %self.name, %url, "opening metadata record");
        println!("📄 Metadata: {}", url);
    }

    async fn publish_metadata(&self, layer: &Layer, uuid: &str) -> Result<(), PublishError> {
        let body = layer.metadata.to_iso19139(uuid);
        let response = self
            .send(
                self.request(
                    Method::PUT,
                    "/srv/api/records?metadataType=METADATA&uuidProcessing=OVERWRITE&publishToAll=true",
                )
                .header("Content-Type", "application/xml")
                .header("Accept", "application/json")
                .body(body),
            )
            .await?;

        let status = response.status();
        if status.is_success() {
            tracing::debug!(server = %self.name, layer = %layer.name, uuid, "metadata record stored");
            Ok(())
        } else {
            let text = response.text().await.unwrap_or_default();
            Err(PublishError::ServerRequest {
                server: self.name.clone(),
                message: format!("record upload failed (HTTP {}): {}", status, text.trim()),
            })
        }
    }
}
