pub mod folder_exporter;
pub mod geonetwork_plugin;
pub mod geoserver_plugin;
pub mod project_file;
pub mod server_registry;

pub use folder_exporter::FolderExporter;
pub use geonetwork_plugin::GeoNetworkPlugin;
pub use geoserver_plugin::GeoServerPlugin;
pub use project_file::{ProjectFile, ProjectFileSource};
pub use server_registry::ServerRegistry;
