//! Server Registry - Holds the configured geodata and metadata servers
//!
//! Servers are listed per role in configuration order. Every selectable list
//! starts with an implicit "none" entry at index 0 that never resolves to a
//! server.
//!
//! # Example
//!
//! ```no_run
//! use layer_publisher::core::config::BridgeConfig;
//! use layer_publisher::core::traits::ServerRole;
//! use layer_publisher::plugins::ServerRegistry;
//!
//! # fn example() -> Result<(), layer_publisher::core::error::PublishError> {
//! let registry = ServerRegistry::from_config(&BridgeConfig::default())?;
//! let names = registry.selectable_names(ServerRole::Geodata);
//!
//! assert_eq!(names[0], "Do not publish data");
//! # Ok(())
//! # }
//! ```

use crate::core::config::{BridgeConfig, GeodataServerType, MetadataServerType};
use crate::core::error::PublishError;
use crate::core::traits::{GeodataServer, MetadataServer, ServerRole};
use crate::plugins::geonetwork_plugin::GeoNetworkPlugin;
use crate::plugins::geoserver_plugin::GeoServerPlugin;
use std::sync::Arc;

/// Registry of configured servers, per role
#[derive(Default, Clone)]
pub struct ServerRegistry {
    geodata: Vec<(String, Arc<dyn GeodataServer>)>,
    metadata: Vec<(String, Arc<dyn MetadataServer>)>,
}

impl ServerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Build concrete server clients for every configured entry
    ///
    /// # Arguments
    ///
    /// * `config` - Loaded configuration
    ///
    /// # Returns
    ///
    /// Registry with servers in configuration order
    pub fn from_config(config: &BridgeConfig) -> Result<Self, PublishError> {
        let mut registry = Self::new();

        for server in &config.servers.geodata {
            match server.server_type {
                GeodataServerType::Geoserver => {
                    registry.register_geodata(Arc::new(GeoServerPlugin::from_config(server)?));
                }
            }
        }

        for server in &config.servers.metadata {
            match server.server_type {
                MetadataServerType::Geonetwork => {
                    registry.register_metadata(Arc::new(GeoNetworkPlugin::from_config(server)?));
                }
            }
        }

        tracing::debug!(
            geodata = registry.geodata.len(),
            metadata = registry.metadata.len(),
            "server registry built"
        );
        Ok(registry)
    }

    /// Add a geodata server; a server with the same name is replaced in place
    pub fn register_geodata(&mut self, server: Arc<dyn GeodataServer>) {
        let name = server.name().to_string();
        match self.geodata.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = server,
            None => self.geodata.push((name, server)),
        }
    }

    /// Add a metadata server; a server with the same name is replaced in place
    pub fn register_metadata(&mut self, server: Arc<dyn MetadataServer>) {
        let name = server.name().to_string();
        match self.metadata.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = server,
            None => self.metadata.push((name, server)),
        }
    }

    /// Ordered geodata servers
    pub fn list_geodata_servers(&self) -> &[(String, Arc<dyn GeodataServer>)] {
        &self.geodata
    }

    /// Ordered metadata servers
    pub fn list_metadata_servers(&self) -> &[(String, Arc<dyn MetadataServer>)] {
        &self.metadata
    }

    /// Configured server names of a role, without the "none" entry
    pub fn names(&self, role: ServerRole) -> Vec<String> {
        match role {
            ServerRole::Geodata => self.geodata.iter().map(|(n, _)| n.clone()).collect(),
            ServerRole::Metadata => self.metadata.iter().map(|(n, _)| n.clone()).collect(),
        }
    }

    /// Display list of a role with the "none" entry at index 0
    pub fn selectable_names(&self, role: ServerRole) -> Vec<String> {
        let mut names = vec![role.none_label().to_string()];
        names.extend(self.names(role));
        names
    }

    /// Map a position in [`ServerRegistry::selectable_names`] to a server name
    ///
    /// Index 0 and out-of-range indices mean "none selected".
    pub fn selection_from_index(&self, role: ServerRole, index: usize) -> Option<String> {
        if index == 0 {
            return None;
        }
        self.names(role).into_iter().nth(index - 1)
    }

    pub fn contains(&self, role: ServerRole, name: &str) -> bool {
        match role {
            ServerRole::Geodata => self.geodata.iter().any(|(n, _)| n == name),
            ServerRole::Metadata => self.metadata.iter().any(|(n, _)| n == name),
        }
    }

    /// Resolve a geodata server by name
    pub fn resolve_geodata(&self, name: &str) -> Result<Arc<dyn GeodataServer>, PublishError> {
        self.geodata
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, server)| Arc::clone(server))
            .ok_or_else(|| PublishError::ServerNotFound {
                role: ServerRole::Geodata,
                name: name.to_string(),
            })
    }

    /// Resolve a metadata server by name
    pub fn resolve_metadata(&self, name: &str) -> Result<Arc<dyn MetadataServer>, PublishError> {
        self.metadata
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, server)| Arc::clone(server))
            .ok_or_else(|| PublishError::ServerNotFound {
                role: ServerRole::Metadata,
                name: name.to_string(),
            })
    }
}
