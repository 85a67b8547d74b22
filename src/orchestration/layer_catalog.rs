//! Layer Catalog - Publishable layers and their per-session edit buffers
//!
//! The catalog is an arena keyed by the stable layer id. Each entry carries
//! the layer snapshot, the checked flag, the field inclusion map (committed
//! and staged), and the metadata buffer. Staged edits reach the layer only
//! through [`LayerCatalog::commit`], which runs whenever focus moves away
//! from a layer and before any publish.

use crate::core::error::PublishError;
use crate::core::layer::{FieldInclusion, Layer, LayerSource};
use crate::core::metadata::LayerMetadata;
use std::collections::HashMap;
use std::sync::Arc;

/// Immutable snapshot of the layers checked at publish time, in catalog order
#[derive(Debug, Clone, PartialEq)]
pub struct PublishCandidate {
    pub layers: Vec<CandidateLayer>,
}

/// One checked layer with its committed field inclusion
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateLayer {
    pub layer: Layer,
    pub fields: FieldInclusion,
}

impl PublishCandidate {
    pub fn names(&self) -> Vec<&str> {
        self.layers.iter().map(|c| c.layer.name.as_str()).collect()
    }

    pub fn layers(&self) -> Vec<Layer> {
        self.layers.iter().map(|c| c.layer.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

#[derive(Debug, Clone)]
struct CatalogEntry {
    layer: Layer,
    checked: bool,
    committed_fields: Option<FieldInclusion>,
    staged_fields: Option<FieldInclusion>,
    metadata_buffer: Option<LayerMetadata>,
}

impl CatalogEntry {
    fn new(layer: Layer) -> Self {
        Self {
            layer,
            checked: true,
            committed_fields: None,
            staged_fields: None,
            metadata_buffer: None,
        }
    }

    fn committed_fields(&mut self) -> &FieldInclusion {
        let layer = &self.layer;
        self.committed_fields
            .get_or_insert_with(|| FieldInclusion::all_included(layer))
    }

    fn staged_fields(&mut self) -> &mut FieldInclusion {
        if self.staged_fields.is_none() {
            let committed = self.committed_fields().clone();
            self.staged_fields = Some(committed);
        }
        self.staged_fields
            .get_or_insert_with(FieldInclusion::default)
    }
}

/// Session cache of the publishable layers
pub struct LayerCatalog {
    source: Arc<dyn LayerSource>,
    order: Vec<String>,
    entries: HashMap<String, CatalogEntry>,
    focused: Option<String>,
}

impl LayerCatalog {
    /// Create a catalog and read the layers from the source
    pub fn new(source: Arc<dyn LayerSource>) -> Self {
        let mut catalog = Self {
            source,
            order: Vec::new(),
            entries: HashMap::new(),
            focused: None,
        };
        catalog.reload();
        catalog
    }

    pub fn source(&self) -> &Arc<dyn LayerSource> {
        &self.source
    }

    /// Re-read the layer tree, keeping session state of layers that remain
    ///
    /// A layer whose field set changed gets a fresh "all included" map so the
    /// inclusion map always matches the current fields.
    pub fn reload(&mut self) {
        let root = self.source.layer_tree_root();
        let layers: Vec<Layer> = root
            .layers()
            .into_iter()
            .filter(|l| l.is_publishable())
            .cloned()
            .collect();

        let mut entries = HashMap::with_capacity(layers.len());
        let mut order = Vec::with_capacity(layers.len());
        for layer in layers {
            let id = layer.id.clone();
            let entry = match self.entries.remove(&id) {
                Some(mut entry) => {
                    if entry.layer.fields != layer.fields {
                        entry.committed_fields = None;
                        entry.staged_fields = None;
                    }
                    entry.layer = layer;
                    entry
                }
                None => CatalogEntry::new(layer),
            };
            if entries.insert(id.clone(), entry).is_none() {
                order.push(id);
            }
        }

        if self
            .focused
            .as_ref()
            .is_none_or(|focused| !entries.contains_key(focused))
        {
            self.focused = order.first().cloned();
        }

        tracing::debug!(layers = order.len(), "layer catalog reloaded");
        self.entries = entries;
        self.order = order;
    }

    /// Publishable layers in catalog order
    pub fn list_publishable_layers(&self) -> Vec<&Layer> {
        self.order
            .iter()
            .filter_map(|id| self.entries.get(id))
            .map(|e| &e.layer)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn layer(&self, id: &str) -> Option<&Layer> {
        self.entries.get(id).map(|e| &e.layer)
    }

    /// First layer carrying `name`, in catalog order
    pub fn layer_by_name(&self, name: &str) -> Option<&Layer> {
        self.order
            .iter()
            .filter_map(|id| self.entries.get(id))
            .map(|e| &e.layer)
            .find(|l| l.name == name)
    }

    fn entry_mut(&mut self, id: &str) -> Result<&mut CatalogEntry, PublishError> {
        self.entries
            .get_mut(id)
            .ok_or_else(|| PublishError::LayerNotFound {
                name: id.to_string(),
            })
    }

    /// Field inclusion as currently displayed (staged) for a layer
    pub fn fields_for(&mut self, id: &str) -> Result<&FieldInclusion, PublishError> {
        Ok(self.entry_mut(id)?.staged_fields())
    }

    /// Field inclusion last committed for a layer
    pub fn committed_fields_for(&mut self, id: &str) -> Result<&FieldInclusion, PublishError> {
        Ok(self.entry_mut(id)?.committed_fields())
    }

    /// Stage a field flag; returns `false` for a field the layer does not have
    pub fn set_field_included(
        &mut self,
        id: &str,
        field: &str,
        included: bool,
    ) -> Result<bool, PublishError> {
        Ok(self.entry_mut(id)?.staged_fields().set(field, included))
    }

    /// Working copy of a layer's metadata, cloned on first access
    pub fn metadata_buffer_for(&mut self, id: &str) -> Result<&mut LayerMetadata, PublishError> {
        let entry = self.entry_mut(id)?;
        let persisted = &entry.layer.metadata;
        Ok(entry
            .metadata_buffer
            .get_or_insert_with(|| persisted.clone()))
    }

    /// Take metadata that was already stored through the layer source, e.g.
    /// after an import; the buffer restarts from it
    pub fn replace_metadata(&mut self, id: &str, metadata: LayerMetadata) -> Result<(), PublishError> {
        let entry = self.entry_mut(id)?;
        entry.metadata_buffer = Some(metadata.clone());
        entry.layer.metadata = metadata;
        Ok(())
    }

    pub fn focused(&self) -> Option<&str> {
        self.focused.as_deref()
    }

    /// Move focus to another layer, committing the previous one first
    pub fn focus(&mut self, id: Option<&str>) -> Result<(), PublishError> {
        if let Some(next) = id
            && !self.entries.contains_key(next)
        {
            return Err(PublishError::LayerNotFound {
                name: next.to_string(),
            });
        }
        if let Some(previous) = self.focused.take() {
            self.commit(&previous)?;
        }
        self.focused = id.map(str::to_string);
        Ok(())
    }

    /// Copy staged fields and the metadata buffer into the layer
    pub fn commit(&mut self, id: &str) -> Result<(), PublishError> {
        let source = Arc::clone(&self.source);
        let entry = self.entry_mut(id)?;

        if let Some(staged) = &entry.staged_fields {
            entry.committed_fields = Some(staged.clone());
        }

        if let Some(buffer) = &entry.metadata_buffer
            && *buffer != entry.layer.metadata
        {
            source.store_metadata(id, buffer.clone())?;
            entry.layer.metadata = buffer.clone();
            tracing::debug!(layer = %entry.layer.name, "metadata committed");
        }
        Ok(())
    }

    /// Commit every layer holding staged edits, focused or not
    pub fn commit_pending(&mut self) -> Result<(), PublishError> {
        let pending: Vec<String> = self
            .order
            .iter()
            .filter(|id| {
                self.entries
                    .get(*id)
                    .is_some_and(|e| e.staged_fields.is_some() || e.metadata_buffer.is_some())
            })
            .cloned()
            .collect();
        for id in pending {
            self.commit(&id)?;
        }
        Ok(())
    }

    /// Throw away staged edits of a layer
    pub fn discard(&mut self, id: &str) -> Result<(), PublishError> {
        let entry = self.entry_mut(id)?;
        entry.staged_fields = None;
        entry.metadata_buffer = None;
        Ok(())
    }

    pub fn set_checked(&mut self, id: &str, checked: bool) -> Result<(), PublishError> {
        self.entry_mut(id)?.checked = checked;
        Ok(())
    }

    pub fn is_checked(&self, id: &str) -> bool {
        self.entries.get(id).is_some_and(|e| e.checked)
    }

    /// Check or uncheck every layer
    pub fn check_all(&mut self, checked: bool) {
        for entry in self.entries.values_mut() {
            entry.checked = checked;
        }
    }

    /// Snapshot of the checked layers with their committed field maps
    pub fn candidate(&mut self) -> PublishCandidate {
        let mut layers = Vec::new();
        for id in &self.order {
            if let Some(entry) = self.entries.get_mut(id)
                && entry.checked
            {
                let fields = entry.committed_fields().clone();
                layers.push(CandidateLayer {
                    layer: entry.layer.clone(),
                    fields,
                });
            }
        }
        PublishCandidate { layers }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::layer::LayerTreeNode;
    use crate::testing::{MemoryLayerSource, raster_layer, vector_layer};

    fn catalog(layers: Vec<Layer>) -> (Arc<MemoryLayerSource>, LayerCatalog) {
        let source = Arc::new(MemoryLayerSource::new(layers));
        let catalog = LayerCatalog::new(source.clone());
        (source, catalog)
    }

    #[test]
    fn test_filters_unpublishable_layers() {
        let mut wms = raster_layer("basemap");
        wms.provider = "wms".to_string();
        let mut mesh = vector_layer("mesh", &[]);
        mesh.kind = crate::core::layer::LayerKind::Mesh;

        let source = Arc::new(MemoryLayerSource::with_tree(vec![
            LayerTreeNode::Group {
                group: "g".to_string(),
                children: vec![
                    LayerTreeNode::Layer(Box::new(vector_layer("roads", &["id"]))),
                    LayerTreeNode::Layer(Box::new(wms)),
                ],
            },
            LayerTreeNode::Layer(Box::new(mesh)),
            LayerTreeNode::Layer(Box::new(raster_layer("dem"))),
        ]));
        let catalog = LayerCatalog::new(source);

        let names: Vec<&str> = catalog
            .list_publishable_layers()
            .iter()
            .map(|l| l.name.as_str())
            .collect();
        assert_eq!(names, vec!["roads", "dem"]);
    }

    #[test]
    fn test_fields_default_to_all_included() {
        let (_, mut catalog) = catalog(vec![vector_layer("roads", &["id", "name"]), raster_layer("dem")]);

        assert_eq!(catalog.fields_for("roads_id").unwrap().included(), vec!["id", "name"]);
        assert!(catalog.fields_for("dem_id").unwrap().is_empty());
        assert!(catalog.fields_for("missing").is_err());
    }

    #[test]
    fn test_commit_on_switch() {
        let (_, mut catalog) = catalog(vec![
            vector_layer("a", &["id", "name", "geom_area"]),
            vector_layer("b", &["id"]),
        ]);

        catalog.focus(Some("a_id")).unwrap();
        assert!(catalog.set_field_included("a_id", "name", false).unwrap());
        assert!(!catalog.set_field_included("a_id", "unknown", false).unwrap());

        // nothing committed yet
        assert_eq!(catalog.committed_fields_for("a_id").unwrap().included().len(), 3);

        catalog.focus(Some("b_id")).unwrap();

        let committed = catalog.committed_fields_for("a_id").unwrap().clone();
        assert_eq!(committed.included(), vec!["id", "geom_area"]);
        assert_eq!(&committed, catalog.fields_for("a_id").unwrap());
        assert_eq!(catalog.focused(), Some("b_id"));
    }

    #[test]
    fn test_metadata_buffer_committed_to_source() {
        let (source, mut catalog) = catalog(vec![vector_layer("roads", &[])]);

        catalog.focus(Some("roads_id")).unwrap();
        catalog.metadata_buffer_for("roads_id").unwrap().title = "Main roads".to_string();
        assert!(source.stored().is_empty());

        catalog.commit_pending().unwrap();

        let stored = source.stored();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].1.title, "Main roads");
        assert_eq!(catalog.layer("roads_id").unwrap().metadata.title, "Main roads");

        // unchanged buffer is not stored again
        catalog.commit("roads_id").unwrap();
        assert_eq!(source.stored().len(), 1);
    }

    #[test]
    fn test_discard_drops_staged_edits() {
        let (source, mut catalog) = catalog(vec![vector_layer("roads", &["id", "name"])]);

        catalog.set_field_included("roads_id", "id", false).unwrap();
        catalog.metadata_buffer_for("roads_id").unwrap().title = "draft".to_string();
        catalog.discard("roads_id").unwrap();
        catalog.commit("roads_id").unwrap();

        assert!(source.stored().is_empty());
        assert_eq!(catalog.fields_for("roads_id").unwrap().included(), vec!["id", "name"]);
        assert_eq!(catalog.metadata_buffer_for("roads_id").unwrap().title, "roads");
    }

    #[test]
    fn test_candidate_uses_committed_fields_and_order() {
        let (_, mut catalog) = catalog(vec![
            vector_layer("a", &["x", "y"]),
            raster_layer("b"),
            vector_layer("c", &[]),
        ]);

        catalog.check_all(true);
        catalog.set_checked("b_id", false).unwrap();
        catalog.set_field_included("a_id", "y", false).unwrap();

        let candidate = catalog.candidate();
        assert_eq!(candidate.names(), vec!["a", "c"]);
        // staged only, not committed
        assert_eq!(candidate.layers[0].fields.included(), vec!["x", "y"]);

        catalog.commit("a_id").unwrap();
        assert_eq!(catalog.candidate().layers[0].fields.included(), vec!["x"]);
    }

    #[test]
    fn test_reload_keeps_state_and_tracks_field_changes() {
        let (source, mut catalog) = catalog(vec![vector_layer("a", &["x", "y"]), vector_layer("b", &["z"])]);
        catalog.set_checked("a_id", false).unwrap();
        catalog.set_field_included("a_id", "y", false).unwrap();
        catalog.commit("a_id").unwrap();
        catalog.set_field_included("b_id", "z", false).unwrap();
        catalog.commit("b_id").unwrap();
        catalog.focus(Some("b_id")).unwrap();

        let mut b = vector_layer("b", &["z", "w"]);
        b.id = "b_id".to_string();
        source.set_layers(vec![vector_layer("a", &["x", "y"]), b]);
        catalog.reload();

        assert!(!catalog.is_checked("a_id"));
        assert!(catalog.is_checked("b_id"));
        assert_eq!(catalog.focused(), Some("b_id"));
        assert_eq!(catalog.committed_fields_for("a_id").unwrap().included(), vec!["x"]);
        assert_eq!(catalog.committed_fields_for("b_id").unwrap().included(), vec!["z", "w"]);

        source.set_layers(vec![vector_layer("a", &["x", "y"])]);
        catalog.reload();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.focused(), Some("a_id"));

        source.set_layers(vec![]);
        catalog.reload();
        assert_eq!(catalog.focused(), None);
    }

    #[test]
    fn test_new_catalog_checks_all_and_focuses_first() {
        let (_, mut catalog) = catalog(vec![vector_layer("a", &[]), raster_layer("b")]);

        assert!(catalog.is_checked("a_id"));
        assert!(catalog.is_checked("b_id"));
        assert_eq!(catalog.focused(), Some("a_id"));
        assert_eq!(catalog.candidate().names(), vec!["a", "b"]);
    }

    #[test]
    fn test_commit_pending_includes_unfocused_layers() {
        let (source, mut catalog) = catalog(vec![
            vector_layer("a", &["x"]),
            vector_layer("roads", &["id", "name"]),
        ]);
        assert_eq!(catalog.focused(), Some("a_id"));

        catalog.set_field_included("roads_id", "name", false).unwrap();
        catalog.metadata_buffer_for("roads_id").unwrap().title = "Roads".to_string();

        catalog.commit_pending().unwrap();

        assert_eq!(catalog.committed_fields_for("roads_id").unwrap().included(), vec!["id"]);
        assert_eq!(source.stored().len(), 1);
        assert_eq!(source.stored()[0].0, "roads_id");
        assert_eq!(catalog.focused(), Some("a_id"));
    }

    #[test]
    fn test_layer_by_name_returns_first() {
        let mut second = vector_layer("roads", &[]);
        second.id = "roads_2".to_string();
        let (_, catalog) = catalog(vec![vector_layer("roads", &[]), second]);

        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.layer_by_name("roads").unwrap().id, "roads_id");
        assert!(catalog.layer_by_name("rivers").is_none());
    }
}
