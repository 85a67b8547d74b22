pub mod core;
pub mod orchestration;
pub mod plugins;
pub mod validation;

#[cfg(test)]
pub mod testing;

pub use crate::core::*;
pub use orchestration::{
    ExportSettings, LayerPublisher, PublicationStatus, PublishMode, PublishReport, Submission,
    TaskOutcome,
};
pub use plugins::{FolderExporter, GeoNetworkPlugin, GeoServerPlugin, ProjectFileSource, ServerRegistry};
pub use validation::{MetadataValidator, PublishValidator, ValidationReport};
