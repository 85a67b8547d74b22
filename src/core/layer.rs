//! Map layer model and the layer-source collaborator
//!
//! Layers are owned by the map project; the crate only reads snapshots of
//! them through [`LayerSource`] and writes metadata back on commit.

use crate::core::error::PublishError;
use crate::core::metadata::LayerMetadata;
use serde::{Deserialize, Serialize};

/// Provider name of remote map services, whose layers are never publishable
pub const REMOTE_PROVIDER: &str = "wms";

/// Layer type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerKind {
    Vector,
    Raster,
    Mesh,
    Plugin,
}

/// Axis-aligned extent in the units of a layer CRS
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
}

impl BoundingBox {
    pub fn new(xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> Self {
        Self {
            xmin,
            ymin,
            xmax,
            ymax,
        }
    }

    /// An extent that contains nothing; the identity for [`BoundingBox::combine`]
    pub fn null() -> Self {
        Self {
            xmin: f64::INFINITY,
            ymin: f64::INFINITY,
            xmax: f64::NEG_INFINITY,
            ymax: f64::NEG_INFINITY,
        }
    }

    pub fn is_null(&self) -> bool {
        !(self.xmin.is_finite()
            && self.ymin.is_finite()
            && self.xmax.is_finite()
            && self.ymax.is_finite())
    }

    pub fn width(&self) -> f64 {
        self.xmax - self.xmin
    }

    pub fn height(&self) -> f64 {
        self.ymax - self.ymin
    }

    /// True when the box has no area (a point, a line, or null)
    pub fn is_empty(&self) -> bool {
        self.is_null() || self.width() <= 0.0 || self.height() <= 0.0
    }

    /// Grow the box by `delta` on every side
    pub fn grow(&mut self, delta: f64) {
        self.xmin -= delta;
        self.ymin -= delta;
        self.xmax += delta;
        self.ymax += delta;
    }

    /// Expand an empty box so it always has a non-zero extent
    pub fn ensure_area(mut self) -> Self {
        if self.is_null() {
            self = Self::new(0.0, 0.0, 0.0, 0.0);
        }
        if self.is_empty() {
            self.grow(1.0);
        }
        self
    }

    /// Union with another box; null boxes are ignored
    pub fn combine(&mut self, other: &BoundingBox) {
        if other.is_null() {
            return;
        }
        self.xmin = self.xmin.min(other.xmin);
        self.ymin = self.ymin.min(other.ymin);
        self.xmax = self.xmax.max(other.xmax);
        self.ymax = self.ymax.max(other.ymax);
    }

    /// `xmin,ymin,xmax,ymax`, the form map servers expect in a `bbox` parameter
    pub fn to_query_string(&self) -> String {
        format!("{},{},{},{}", self.xmin, self.ymin, self.xmax, self.ymax)
    }
}

/// Snapshot of a map layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    /// Stable identifier assigned by the map project
    pub id: String,
    pub name: String,
    pub kind: LayerKind,
    /// Data provider name (e.g. "ogr", "gdal", "wms")
    pub provider: String,
    /// Data source URI, usually a file path
    pub source: String,
    /// CRS authority id (e.g. "EPSG:4326")
    pub crs: String,
    pub extent: BoundingBox,
    /// Attribute names, vector layers only
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default)]
    pub metadata: LayerMetadata,
    /// Layer symbology as an SLD document
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
}

impl Layer {
    pub fn is_vector(&self) -> bool {
        self.kind == LayerKind::Vector
    }

    /// Vector or raster, and not backed by a remote map service
    pub fn is_publishable(&self) -> bool {
        matches!(self.kind, LayerKind::Vector | LayerKind::Raster)
            && self.provider != REMOTE_PROVIDER
    }
}

/// Per-field "include in publish" flags of one layer, in field order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldInclusion {
    fields: Vec<(String, bool)>,
}

impl FieldInclusion {
    /// Every field of the layer included
    pub fn all_included(layer: &Layer) -> Self {
        Self {
            fields: layer.fields.iter().map(|f| (f.clone(), true)).collect(),
        }
    }

    /// Set the flag of a known field; unknown fields are rejected
    pub fn set(&mut self, field: &str, included: bool) -> bool {
        match self.fields.iter_mut().find(|(name, _)| name == field) {
            Some(entry) => {
                entry.1 = included;
                true
            }
            None => false,
        }
    }

    pub fn is_included(&self, field: &str) -> bool {
        self.fields
            .iter()
            .any(|(name, included)| name == field && *included)
    }

    /// Names of the included fields
    pub fn included(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|(_, included)| *included)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn entries(&self) -> &[(String, bool)] {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Node of the project layer tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LayerTreeNode {
    Group {
        group: String,
        #[serde(default)]
        children: Vec<LayerTreeNode>,
    },
    Layer(Box<Layer>),
}

impl LayerTreeNode {
    /// Leaves of the tree in depth-first order
    pub fn layers(&self) -> Vec<&Layer> {
        let mut out = Vec::new();
        self.collect_layers(&mut out);
        out
    }

    fn collect_layers<'a>(&'a self, out: &mut Vec<&'a Layer>) {
        match self {
            Self::Layer(layer) => out.push(layer),
            Self::Group { children, .. } => {
                for child in children {
                    child.collect_layers(out);
                }
            }
        }
    }
}

/// Access to the map project that owns the layers
pub trait LayerSource: Send + Sync {
    /// Root of the project layer tree
    fn layer_tree_root(&self) -> LayerTreeNode;

    /// Persist metadata edits on the layer with the given id
    fn store_metadata(&self, layer_id: &str, metadata: LayerMetadata) -> Result<(), PublishError>;

    /// CRS used to combine extents of several layers
    fn project_crs(&self) -> String;

    /// Reproject an extent between two CRS
    fn transform_extent(
        &self,
        extent: &BoundingBox,
        from_crs: &str,
        to_crs: &str,
    ) -> Result<BoundingBox, PublishError>;
}
