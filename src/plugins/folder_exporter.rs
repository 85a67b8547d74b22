//! Folder exporter - Writes layers to a local folder
//!
//! Layout inside the destination folder:
//!
//! ```text
//! <folder>/data/<layer>.<ext>          copy of the layer source
//! <folder>/data/<layer>.fields.json    included fields, when some are excluded
//! <folder>/metadata/<layer>.xml        ISO 19139 record
//! <folder>/symbology/<layer>.sld       layer style
//! ```

use crate::core::error::PublishError;
use crate::core::layer::{FieldInclusion, Layer};
use crate::core::traits::Exporter;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;

pub const DATA_DIR: &str = "data";
pub const METADATA_DIR: &str = "metadata";
pub const SYMBOLOGY_DIR: &str = "symbology";

/// Exporter writing into a plain directory tree
#[derive(Debug, Default, Clone, Copy)]
pub struct FolderExporter;

impl FolderExporter {
    pub fn new() -> Self {
        Self
    }

    async fn prepare_dir(folder: &Path, sub: &str) -> Result<PathBuf, PublishError> {
        let dir = folder.join(sub);
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| export_error(&dir, e))?;
        Ok(dir)
    }
}

fn export_error(path: &Path, e: impl std::fmt::Display) -> PublishError {
    PublishError::ExportFailed {
        path: path.display().to_string(),
        message: e.to_string(),
    }
}

#[async_trait]
impl Exporter for FolderExporter {
    async fn export_data(
        &self,
        folder: &Path,
        layer: &Layer,
        fields: &FieldInclusion,
    ) -> Result<(), PublishError> {
        let dir = Self::prepare_dir(folder, DATA_DIR).await?;
        let source = Path::new(&layer.source);
        let file_name = match source.extension() {
            Some(ext) => format!("{}.{}", layer.name, ext.to_string_lossy()),
            None => layer.name.clone(),
        };
        let target = dir.join(file_name);

        fs::copy(source, &target)
            .await
            .map_err(|e| export_error(&target, e))?;

        let included = fields.included();
        if layer.is_vector() && included.len() != fields.entries().len() {
            let sidecar = dir.join(format!("{}.fields.json", layer.name));
            let content =
                serde_json::to_string_pretty(&included).map_err(|e| export_error(&sidecar, e))?;
            fs::write(&sidecar, content)
                .await
                .map_err(|e| export_error(&sidecar, e))?;
        }

        tracing::debug!(layer = %layer.name, target = %target.display(), "data exported");
        Ok(())
    }

    async fn export_metadata(
        &self,
        folder: &Path,
        layer: &Layer,
        uuid: &str,
    ) -> Result<(), PublishError> {
        let dir = Self::prepare_dir(folder, METADATA_DIR).await?;
        let target = dir.join(format!("{}.xml", layer.name));

        fs::write(&target, layer.metadata.to_iso19139(uuid))
            .await
            .map_err(|e| export_error(&target, e))
    }

    async fn export_symbology(&self, folder: &Path, layer: &Layer) -> Result<(), PublishError> {
        let Some(sld) = &layer.style else {
            tracing::debug!(layer = %layer.name, "layer has no symbology to export");
            return Ok(());
        };
        let dir = Self::prepare_dir(folder, SYMBOLOGY_DIR).await?;
        let target = dir.join(format!("{}.sld", layer.name));

        fs::write(&target, sld)
            .await
            .map_err(|e| export_error(&target, e))
    }
}
