//! In-memory collaborators for unit tests
//!
//! Servers record every call as `"operation:argument"` so tests can assert
//! on exactly which network effects an operation would have had.

use crate::core::error::PublishError;
use crate::core::layer::{BoundingBox, FieldInclusion, Layer, LayerKind, LayerSource, LayerTreeNode};
use crate::core::metadata::LayerMetadata;
use crate::core::traits::{
    Exporter, GeodataServer, MetadataProfile, MetadataServer, ValidationErrors,
};
use crate::orchestration::task::{ProgressEvent, ProgressObserver};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, RwLock};

/// How a scripted failure surfaces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailMode {
    Connectivity,
    Request,
}

#[derive(Default)]
struct CallLog {
    calls: Mutex<Vec<String>>,
    failures: Mutex<Vec<(String, FailMode)>>,
}

impl CallLog {
    fn record(&self, server: &str, op: &str, arg: &str) -> Result<(), PublishError> {
        let entry = if arg.is_empty() {
            op.to_string()
        } else {
            format!("{}:{}", op, arg)
        };
        self.calls.lock().unwrap().push(entry);

        let failures = self.failures.lock().unwrap();
        match failures.iter().find(|(o, _)| o == op) {
            Some((_, FailMode::Connectivity)) => Err(PublishError::ConnectionFailed {
                server: server.to_string(),
                message: "connection refused".to_string(),
            }),
            Some((_, FailMode::Request)) => Err(PublishError::ServerRequest {
                server: server.to_string(),
                message: format!("{} rejected", op),
            }),
            None => Ok(()),
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

// ============================================================================
// Geodata
// ============================================================================

pub struct MockGeodataServer {
    name: String,
    reachable: AtomicBool,
    layers: Mutex<BTreeSet<String>>,
    validation_errors: Vec<String>,
    log: CallLog,
}

impl MockGeodataServer {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            reachable: AtomicBool::new(true),
            layers: Mutex::new(BTreeSet::new()),
            validation_errors: Vec::new(),
            log: CallLog::default(),
        }
    }

    /// Layers already present before any publish
    pub fn with_layers(self, names: &[&str]) -> Self {
        self.layers
            .lock()
            .unwrap()
            .extend(names.iter().map(|n| n.to_string()));
        self
    }

    pub fn unreachable(self) -> Self {
        self.reachable.store(false, Ordering::SeqCst);
        self
    }

    pub fn failing(self, op: &str, mode: FailMode) -> Self {
        self.log.failures.lock().unwrap().push((op.to_string(), mode));
        self
    }

    pub fn with_validation_error(mut self, error: &str) -> Self {
        self.validation_errors.push(error.to_string());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.log.calls()
    }

    pub fn has_layer(&self, name: &str) -> bool {
        self.layers.lock().unwrap().contains(name)
    }
}

#[async_trait]
impl GeodataServer for MockGeodataServer {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        "mock"
    }

    async fn test_connection(&self) -> bool {
        let _ = self.log.record(&self.name, "test_connection", "");
        self.reachable.load(Ordering::SeqCst)
    }

    async fn layer_exists(&self, name: &str) -> Result<bool, PublishError> {
        self.log.record(&self.name, "layer_exists", name)?;
        Ok(self.has_layer(name))
    }

    async fn delete_layer(&self, name: &str) -> Result<(), PublishError> {
        self.log.record(&self.name, "delete_layer", name)?;
        self.layers.lock().unwrap().remove(name);
        Ok(())
    }

    async fn delete_style(&self, name: &str) -> Result<(), PublishError> {
        self.log.record(&self.name, "delete_style", name)
    }

    async fn validate_geodata_before_publication(
        &self,
        candidates: &[Layer],
        errors: &mut ValidationErrors,
    ) {
        let names: Vec<&str> = candidates.iter().map(|l| l.name.as_str()).collect();
        let _ = self.log.record(&self.name, "validate", &names.join(","));
        errors.extend(self.validation_errors.iter().cloned());
    }

    async fn open_preview(&self, names: &[String], bbox: &BoundingBox, crs: &str) {
        let _ = self.log.record(
            &self.name,
            "open_preview",
            &format!("{}|{}|{}", names.join(","), bbox.to_query_string(), crs),
        );
    }

    async fn publish_layer(&self, layer: &Layer, fields: &FieldInclusion) -> Result<(), PublishError> {
        self.log.record(
            &self.name,
            "publish_layer",
            &format!("{}[{}]", layer.name, fields.included().join(",")),
        )?;
        self.layers.lock().unwrap().insert(layer.name.clone());
        Ok(())
    }

    async fn publish_style(&self, layer: &Layer) -> Result<(), PublishError> {
        self.log.record(&self.name, "publish_style", &layer.name)
    }
}

// ============================================================================
// Metadata
// ============================================================================

pub struct MockMetadataServer {
    name: String,
    profile: MetadataProfile,
    reachable: AtomicBool,
    records: Mutex<BTreeSet<String>>,
    validation_errors: Vec<String>,
    log: CallLog,
}

impl MockMetadataServer {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            profile: MetadataProfile::Default,
            reachable: AtomicBool::new(true),
            records: Mutex::new(BTreeSet::new()),
            validation_errors: Vec::new(),
            log: CallLog::default(),
        }
    }

    pub fn with_records(self, uuids: &[&str]) -> Self {
        self.records
            .lock()
            .unwrap()
            .extend(uuids.iter().map(|u| u.to_string()));
        self
    }

    pub fn with_profile(mut self, profile: MetadataProfile) -> Self {
        self.profile = profile;
        self
    }

    pub fn unreachable(self) -> Self {
        self.reachable.store(false, Ordering::SeqCst);
        self
    }

    pub fn failing(self, op: &str, mode: FailMode) -> Self {
        self.log.failures.lock().unwrap().push((op.to_string(), mode));
        self
    }

    pub fn with_validation_error(mut self, error: &str) -> Self {
        self.validation_errors.push(error.to_string());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.log.calls()
    }

    pub fn has_record(&self, uuid: &str) -> bool {
        self.records.lock().unwrap().contains(uuid)
    }
}

#[async_trait]
impl MetadataServer for MockMetadataServer {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        "mock"
    }

    fn profile(&self) -> MetadataProfile {
        self.profile
    }

    async fn test_connection(&self) -> bool {
        let _ = self.log.record(&self.name, "test_connection", "");
        self.reachable.load(Ordering::SeqCst)
    }

    async fn metadata_exists(&self, uuid: &str) -> Result<bool, PublishError> {
        self.log.record(&self.name, "metadata_exists", uuid)?;
        Ok(self.has_record(uuid))
    }

    async fn delete_metadata(&self, uuid: &str) -> Result<(), PublishError> {
        self.log.record(&self.name, "delete_metadata", uuid)?;
        self.records.lock().unwrap().remove(uuid);
        Ok(())
    }

    async fn validate_metadata_before_publication(
        &self,
        candidates: &[Layer],
        errors: &mut ValidationErrors,
    ) {
        let names: Vec<&str> = candidates.iter().map(|l| l.name.as_str()).collect();
        let _ = self.log.record(&self.name, "validate", &names.join(","));
        errors.extend(self.validation_errors.iter().cloned());
    }

    async fn open_metadata(&self, uuid: &str) {
        let _ = self.log.record(&self.name, "open_metadata", uuid);
    }

    async fn publish_metadata(&self, layer: &Layer, uuid: &str) -> Result<(), PublishError> {
        self.log.record(&self.name, "publish_metadata", &layer.name)?;
        self.records.lock().unwrap().insert(uuid.to_string());
        Ok(())
    }
}

// ============================================================================
// Exporter
// ============================================================================

#[derive(Default)]
pub struct MockExporter {
    log: CallLog,
}

impl MockExporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(self, op: &str, mode: FailMode) -> Self {
        self.log.failures.lock().unwrap().push((op.to_string(), mode));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.log.calls()
    }
}

#[async_trait]
impl Exporter for MockExporter {
    async fn export_data(
        &self,
        folder: &Path,
        layer: &Layer,
        _fields: &FieldInclusion,
    ) -> Result<(), PublishError> {
        self.log.record(
            "exporter",
            "export_data",
            &format!("{}/{}", folder.display(), layer.name),
        )
    }

    async fn export_metadata(
        &self,
        folder: &Path,
        layer: &Layer,
        _uuid: &str,
    ) -> Result<(), PublishError> {
        self.log.record(
            "exporter",
            "export_metadata",
            &format!("{}/{}", folder.display(), layer.name),
        )
    }

    async fn export_symbology(&self, folder: &Path, layer: &Layer) -> Result<(), PublishError> {
        self.log.record(
            "exporter",
            "export_symbology",
            &format!("{}/{}", folder.display(), layer.name),
        )
    }
}

// ============================================================================
// Layer source
// ============================================================================

/// Layer source holding a fixed tree; extents in another CRS are "reprojected"
/// by scaling with 10 so tests can see the transform was applied. Only
/// EPSG:4326 and EPSG:3857 are known, other CRSs fail to reproject.
pub struct MemoryLayerSource {
    tree: RwLock<Vec<LayerTreeNode>>,
    crs: String,
    stored: Mutex<Vec<(String, LayerMetadata)>>,
}

impl MemoryLayerSource {
    pub fn new(layers: Vec<Layer>) -> Self {
        Self::with_tree(
            layers
                .into_iter()
                .map(|l| LayerTreeNode::Layer(Box::new(l)))
                .collect(),
        )
    }

    pub fn with_tree(tree: Vec<LayerTreeNode>) -> Self {
        Self {
            tree: RwLock::new(tree),
            crs: "EPSG:3857".to_string(),
            stored: Mutex::new(Vec::new()),
        }
    }

    /// Replace the project layers, as if the user edited the map
    pub fn set_layers(&self, layers: Vec<Layer>) {
        *self.tree.write().unwrap() = layers
            .into_iter()
            .map(|l| LayerTreeNode::Layer(Box::new(l)))
            .collect();
    }

    /// Every `store_metadata` call, in order
    pub fn stored(&self) -> Vec<(String, LayerMetadata)> {
        self.stored.lock().unwrap().clone()
    }
}

fn store_in(nodes: &mut [LayerTreeNode], layer_id: &str, metadata: &LayerMetadata) -> bool {
    nodes.iter_mut().any(|node| match node {
        LayerTreeNode::Layer(layer) if layer.id == layer_id => {
            layer.metadata = metadata.clone();
            true
        }
        LayerTreeNode::Layer(_) => false,
        LayerTreeNode::Group { children, .. } => store_in(children, layer_id, metadata),
    })
}

impl LayerSource for MemoryLayerSource {
    fn layer_tree_root(&self) -> LayerTreeNode {
        LayerTreeNode::Group {
            group: "root".to_string(),
            children: self.tree.read().unwrap().clone(),
        }
    }

    fn store_metadata(&self, layer_id: &str, metadata: LayerMetadata) -> Result<(), PublishError> {
        self.stored
            .lock()
            .unwrap()
            .push((layer_id.to_string(), metadata.clone()));
        if store_in(&mut self.tree.write().unwrap(), layer_id, &metadata) {
            Ok(())
        } else {
            Err(PublishError::LayerNotFound {
                name: layer_id.to_string(),
            })
        }
    }

    fn project_crs(&self) -> String {
        self.crs.clone()
    }

    fn transform_extent(
        &self,
        extent: &BoundingBox,
        from_crs: &str,
        to_crs: &str,
    ) -> Result<BoundingBox, PublishError> {
        if from_crs == to_crs {
            return Ok(*extent);
        }
        let known = ["EPSG:4326", "EPSG:3857"];
        if !known.contains(&from_crs) || !known.contains(&to_crs) {
            return Err(PublishError::Reprojection {
                from: from_crs.to_string(),
                to: to_crs.to_string(),
            });
        }
        Ok(BoundingBox::new(
            extent.xmin * 10.0,
            extent.ymin * 10.0,
            extent.xmax * 10.0,
            extent.ymax * 10.0,
        ))
    }
}

// ============================================================================
// Progress
// ============================================================================

#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl ProgressObserver for RecordingObserver {
    fn on_event(&self, event: &ProgressEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

// ============================================================================
// Layers
// ============================================================================

pub fn vector_layer(name: &str, fields: &[&str]) -> Layer {
    Layer {
        id: format!("{}_id", name),
        name: name.to_string(),
        kind: LayerKind::Vector,
        provider: "ogr".to_string(),
        source: format!("/data/{}.gpkg", name),
        crs: "EPSG:4326".to_string(),
        extent: BoundingBox::new(0.0, 0.0, 1.0, 1.0),
        fields: fields.iter().map(|f| f.to_string()).collect(),
        metadata: LayerMetadata {
            title: name.to_string(),
            ..Default::default()
        },
        style: Some("<StyledLayerDescriptor/>".to_string()),
    }
}

pub fn raster_layer(name: &str) -> Layer {
    Layer {
        id: format!("{}_id", name),
        name: name.to_string(),
        kind: LayerKind::Raster,
        provider: "gdal".to_string(),
        source: format!("/data/{}.tif", name),
        crs: "EPSG:3857".to_string(),
        extent: BoundingBox::new(10.0, 10.0, 20.0, 20.0),
        fields: vec![],
        metadata: LayerMetadata::default(),
        style: None,
    }
}
