//! Orchestration layer for layer publishing
//!
//! This module provides the high-level components that turn the checked
//! layers of a map project into a publish or export task, run it, and keep
//! the per-layer publication status in sync with the selected servers.

pub mod background;
pub mod layer_catalog;
pub mod layer_publisher;
pub mod status_tracker;
pub mod task;

// Re-export main types for convenience
pub use background::{TaskHandle, TaskScheduler, TerminationCallback, TokioScheduler, submit_task};
pub use layer_catalog::{CandidateLayer, LayerCatalog, PublishCandidate};
pub use layer_publisher::{
    ExportSettings, LayerPublisher, LayerStatusRow, PublishMode, PublishReport, Submission,
    UnpublishSummary,
};
pub use status_tracker::{PublicationStatus, StatusTracker};
pub use task::{
    ConsoleProgress, ExportTask, FailureNotice, ProgressEvent, ProgressObserver, PublishTask,
    Step, StepKind, Task, TaskLayer, TaskOutcome,
};
