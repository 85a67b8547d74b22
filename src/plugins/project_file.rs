//! Project file layer source
//!
//! A YAML description of a map project, used by the command line tool as its
//! [`LayerSource`]:
//!
//! ```yaml
//! crs: EPSG:3857
//! layers:
//!   - group: Transport
//!     children:
//!       - id: roads_1
//!         name: roads
//!         kind: vector
//!         provider: ogr
//!         source: data/roads.gpkg
//!         crs: EPSG:4326
//!         extent: { xmin: 4.0, ymin: 52.0, xmax: 5.0, ymax: 53.0 }
//!         fields: [id, name]
//! ```

use crate::core::error::PublishError;
use crate::core::layer::{BoundingBox, LayerSource, LayerTreeNode};
use crate::core::metadata::LayerMetadata;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tokio::fs;

const EARTH_RADIUS: f64 = 6_378_137.0;
const WGS84: &str = "EPSG:4326";
const WEB_MERCATOR: &str = "EPSG:3857";

/// On-disk project document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectFile {
    /// Project CRS, used for combined extents
    #[serde(default = "default_crs")]
    pub crs: String,

    #[serde(default)]
    pub layers: Vec<LayerTreeNode>,
}

fn default_crs() -> String {
    WGS84.to_string()
}

/// Layer source backed by a project file; metadata edits stay in memory
/// until [`ProjectFileSource::save`]
pub struct ProjectFileSource {
    path: PathBuf,
    project: RwLock<ProjectFile>,
}

impl ProjectFileSource {
    pub fn new(path: PathBuf, project: ProjectFile) -> Self {
        Self {
            path,
            project: RwLock::new(project),
        }
    }

    /// Read and parse a project file
    pub async fn load(path: &Path) -> Result<Self, PublishError> {
        let content = fs::read_to_string(path).await.map_err(|e| {
            PublishError::ConfigError(format!("cannot read project {}: {}", path.display(), e))
        })?;
        let project: ProjectFile = serde_yaml::from_str(&content).map_err(|e| {
            PublishError::ConfigError(format!("invalid project {}: {}", path.display(), e))
        })?;

        tracing::debug!(path = %path.display(), "project loaded");
        Ok(Self::new(path.to_path_buf(), project))
    }

    /// Write the project, including stored metadata, back to disk
    pub async fn save(&self) -> Result<(), PublishError> {
        let content = {
            let project = self.project.read().unwrap_or_else(|e| e.into_inner());
            serde_yaml::to_string(&*project)
                .map_err(|e| PublishError::ConfigError(format!("cannot serialize project: {}", e)))?
        };
        fs::write(&self.path, content).await?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn set_metadata(nodes: &mut [LayerTreeNode], layer_id: &str, metadata: &LayerMetadata) -> bool {
    for node in nodes {
        match node {
            LayerTreeNode::Layer(layer) if layer.id == layer_id => {
                layer.metadata = metadata.clone();
                return true;
            }
            LayerTreeNode::Layer(_) => {}
            LayerTreeNode::Group { children, .. } => {
                if set_metadata(children, layer_id, metadata) {
                    return true;
                }
            }
        }
    }
    false
}

fn to_mercator(lon: f64, lat: f64) -> (f64, f64) {
    let x = lon.to_radians() * EARTH_RADIUS;
    let y = (PI / 4.0 + lat.to_radians() / 2.0).tan().ln() * EARTH_RADIUS;
    (x, y)
}

fn to_geographic(x: f64, y: f64) -> (f64, f64) {
    let lon = (x / EARTH_RADIUS).to_degrees();
    let lat = (2.0 * (y / EARTH_RADIUS).exp().atan() - PI / 2.0).to_degrees();
    (lon, lat)
}

impl LayerSource for ProjectFileSource {
    fn layer_tree_root(&self) -> LayerTreeNode {
        let project = self.project.read().unwrap_or_else(|e| e.into_inner());
        LayerTreeNode::Group {
            group: String::new(),
            children: project.layers.clone(),
        }
    }

    fn store_metadata(&self, layer_id: &str, metadata: LayerMetadata) -> Result<(), PublishError> {
        let mut project = self.project.write().unwrap_or_else(|e| e.into_inner());
        if set_metadata(&mut project.layers, layer_id, &metadata) {
            Ok(())
        } else {
            Err(PublishError::LayerNotFound {
                name: layer_id.to_string(),
            })
        }
    }

    fn project_crs(&self) -> String {
        self.project
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .crs
            .clone()
    }

    /// Supports the identity transform and EPSG:4326 <-> EPSG:3857
    fn transform_extent(
        &self,
        extent: &BoundingBox,
        from_crs: &str,
        to_crs: &str,
    ) -> Result<BoundingBox, PublishError> {
        if from_crs.eq_ignore_ascii_case(to_crs) || extent.is_null() {
            return Ok(*extent);
        }

        let convert: fn(f64, f64) -> (f64, f64) = match (from_crs, to_crs) {
            (WGS84, WEB_MERCATOR) => to_mercator,
            (WEB_MERCATOR, WGS84) => to_geographic,
            _ => {
                return Err(PublishError::Reprojection {
                    from: from_crs.to_string(),
                    to: to_crs.to_string(),
                });
            }
        };

        let (xmin, ymin) = convert(extent.xmin, extent.ymin);
        let (xmax, ymax) = convert(extent.xmax, extent.ymax);
        Ok(BoundingBox::new(xmin, ymin, xmax, ymax))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const PROJECT: &str = r#"
crs: EPSG:3857
layers:
  - group: Transport
    children:
      - id: roads_1
        name: roads
        kind: vector
        provider: ogr
        source: data/roads.gpkg
        crs: EPSG:4326
        extent: { xmin: 4.0, ymin: 52.0, xmax: 5.0, ymax: 53.0 }
        fields: [id, name]
  - id: osm
    name: basemap
    kind: raster
    provider: wms
    source: "url=https://tiles.example.org"
    crs: EPSG:3857
    extent: { xmin: 0.0, ymin: 0.0, xmax: 1.0, ymax: 1.0 }
"#;

    async fn source(dir: &TempDir) -> ProjectFileSource {
        let path = dir.path().join("project.yml");
        std::fs::write(&path, PROJECT).unwrap();
        ProjectFileSource::load(&path).await.unwrap()
    }

    #[tokio::test]
    async fn test_load_project_tree() {
        let dir = TempDir::new().unwrap();
        let source = source(&dir).await;

        let root = source.layer_tree_root();
        let names: Vec<&str> = root.layers().iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["roads", "basemap"]);
        assert_eq!(source.project_crs(), "EPSG:3857");
    }

    #[tokio::test]
    async fn test_store_metadata_and_save() {
        let dir = TempDir::new().unwrap();
        let source = source(&dir).await;

        let metadata = LayerMetadata {
            title: "Main roads".to_string(),
            ..Default::default()
        };
        source.store_metadata("roads_1", metadata).unwrap();
        assert!(source.store_metadata("missing", LayerMetadata::default()).is_err());
        source.save().await.unwrap();

        let reloaded = ProjectFileSource::load(source.path()).await.unwrap();
        let root = reloaded.layer_tree_root();
        assert_eq!(root.layers()[0].metadata.title, "Main roads");
    }

    #[test]
    fn test_transform_extent() {
        let source = ProjectFileSource::new(
            PathBuf::from("project.yml"),
            ProjectFile {
                crs: WEB_MERCATOR.to_string(),
                layers: vec![],
            },
        );
        let extent = BoundingBox::new(0.0, 0.0, 10.0, 10.0);

        let mercator = source.transform_extent(&extent, WGS84, WEB_MERCATOR).unwrap();
        assert!((mercator.xmax - 1_113_194.9).abs() < 1.0);
        assert!(mercator.ymin.abs() < 1e-6);

        let back = source.transform_extent(&mercator, WEB_MERCATOR, WGS84).unwrap();
        assert!((back.ymax - 10.0).abs() < 1e-9);

        let same = source.transform_extent(&extent, "epsg:4326", WGS84).unwrap();
        assert_eq!(same, extent);

        let err = source.transform_extent(&extent, "EPSG:28992", WGS84).unwrap_err();
        assert_eq!(err.code(), "REPROJECTION");
    }
}
