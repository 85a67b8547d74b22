//! Publication Status Tracker - Per-layer, per-role publication state
//!
//! Status is only trusted right after a refresh against the selected server
//! or after a publish/unpublish of that role. Lookup failures of single
//! layers are kept as [`PublicationStatus::Unknown`] rather than folded into
//! "not published".

use crate::core::traits::{GeodataServer, MetadataServer, ServerRole};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Publication state of one layer for one role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PublicationStatus {
    Unknown,
    NotPublished,
    /// Published on the named server
    PublishedBy(String),
}

impl PublicationStatus {
    pub fn is_published(&self) -> bool {
        matches!(self, Self::PublishedBy(_))
    }
}

impl fmt::Display for PublicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => f.write_str("unknown"),
            Self::NotPublished => f.write_str("not published"),
            Self::PublishedBy(server) => write!(f, "published on {}", server),
        }
    }
}

#[derive(Debug, Clone)]
struct RoleStatus {
    statuses: BTreeMap<String, PublicationStatus>,
    /// False when the selected server failed its connection test
    usable: bool,
}

impl Default for RoleStatus {
    fn default() -> Self {
        Self {
            statuses: BTreeMap::new(),
            usable: true,
        }
    }
}

impl RoleStatus {
    fn set_all(&mut self, names: &[String], status: PublicationStatus) {
        self.statuses = names
            .iter()
            .map(|n| (n.clone(), status.clone()))
            .collect();
    }
}

/// Cached publication status of every catalog layer
#[derive(Debug, Clone, Default)]
pub struct StatusTracker {
    geodata: RoleStatus,
    metadata: RoleStatus,
}

impl StatusTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn role(&self, role: ServerRole) -> &RoleStatus {
        match role {
            ServerRole::Geodata => &self.geodata,
            ServerRole::Metadata => &self.metadata,
        }
    }

    fn role_mut(&mut self, role: ServerRole) -> &mut RoleStatus {
        match role {
            ServerRole::Geodata => &mut self.geodata,
            ServerRole::Metadata => &mut self.metadata,
        }
    }

    /// Recompute data status against the selected geodata server
    ///
    /// # Arguments
    ///
    /// * `server` - Selected server, `None` when "none" is selected
    /// * `names` - Names of every catalog layer
    pub async fn refresh_geodata(&mut self, server: Option<&dyn GeodataServer>, names: &[String]) {
        let Some(server) = server else {
            self.geodata.set_all(names, PublicationStatus::NotPublished);
            self.geodata.usable = true;
            return;
        };

        if !server.test_connection().await {
            tracing::warn!(server = server.name(), "geodata server unavailable");
            self.geodata.set_all(names, PublicationStatus::NotPublished);
            self.geodata.usable = false;
            return;
        }

        let mut statuses = BTreeMap::new();
        for name in names {
            let status = match server.layer_exists(name).await {
                Ok(true) => PublicationStatus::PublishedBy(server.name().to_string()),
                Ok(false) => PublicationStatus::NotPublished,
                Err(e) => {
                    tracing::warn!(server = server.name(), layer = %name, error = %e, "cannot query layer");
                    PublicationStatus::Unknown
                }
            };
            statuses.insert(name.clone(), status);
        }
        self.geodata.statuses = statuses;
        self.geodata.usable = true;
    }

    /// Recompute metadata status against the selected metadata server
    ///
    /// # Arguments
    ///
    /// * `server` - Selected server, `None` when "none" is selected
    /// * `layers` - `(layer name, metadata uuid)` of every catalog layer
    pub async fn refresh_metadata(
        &mut self,
        server: Option<&dyn MetadataServer>,
        layers: &[(String, String)],
    ) {
        let names: Vec<String> = layers.iter().map(|(name, _)| name.clone()).collect();
        let Some(server) = server else {
            self.metadata.set_all(&names, PublicationStatus::NotPublished);
            self.metadata.usable = true;
            return;
        };

        if !server.test_connection().await {
            tracing::warn!(server = server.name(), "metadata server unavailable");
            self.metadata.set_all(&names, PublicationStatus::NotPublished);
            self.metadata.usable = false;
            return;
        }

        let mut statuses = BTreeMap::new();
        for (name, uuid) in layers {
            let status = match server.metadata_exists(uuid).await {
                Ok(true) => PublicationStatus::PublishedBy(server.name().to_string()),
                Ok(false) => PublicationStatus::NotPublished,
                Err(e) => {
                    tracing::warn!(server = server.name(), layer = %name, %uuid, error = %e, "cannot query record");
                    PublicationStatus::Unknown
                }
            };
            statuses.insert(name.clone(), status);
        }
        self.metadata.statuses = statuses;
        self.metadata.usable = true;
    }

    /// Record the result of a publish or unpublish
    pub fn mark(&mut self, role: ServerRole, name: &str, status: PublicationStatus) {
        self.role_mut(role).statuses.insert(name.to_string(), status);
    }

    pub fn status(&self, role: ServerRole, name: &str) -> PublicationStatus {
        self.role(role)
            .statuses
            .get(name)
            .cloned()
            .unwrap_or(PublicationStatus::Unknown)
    }

    pub fn is_published(&self, role: ServerRole, name: &str) -> bool {
        self.status(role, name).is_published()
    }

    /// Names of layers published for a role, sorted
    pub fn published_names(&self, role: ServerRole) -> Vec<String> {
        self.role(role)
            .statuses
            .iter()
            .filter(|(_, status)| status.is_published())
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Whether the selected server of a role passed its last connection test
    pub fn is_usable(&self, role: ServerRole) -> bool {
        self.role(role).usable
    }

    /// Publishing is possible when every selected server is reachable and
    /// the catalog holds at least one layer
    pub fn can_publish(&self, layer_count: usize) -> bool {
        self.geodata.usable && self.metadata.usable && layer_count > 0
    }
}
