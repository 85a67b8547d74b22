//! Task model and step execution
//!
//! A [`Task`] is built once per publish request and owns everything it needs
//! (layer snapshots, metadata UUIDs, field maps, server handles), so it can
//! run inline or move to a background scheduler unchanged. Steps run strictly
//! in order; the first failing step ends the task.

use crate::core::error::{ErrorClass, PublishError};
use crate::core::layer::{FieldInclusion, Layer};
use crate::core::traits::{Exporter, GeodataServer, MetadataServer, ServerRole};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

/// User-facing text of a failure
pub const FAILURE_TITLE: &str = "Error while publishing";
pub const CONNECTION_FAILURE_MESSAGE: &str = "Connection error. Server unavailable.\nSee log for details";
pub const GENERIC_FAILURE_MESSAGE: &str = "See log for details";

// ============================================================================
// Steps and progress
// ============================================================================

/// Kind of work a step performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StepKind {
    Data,
    Symbology,
    Metadata,
    ExportData,
    ExportMetadata,
    ExportSymbology,
}

impl StepKind {
    pub fn label(&self) -> &'static str {
        match self {
            StepKind::Data => "Publish data",
            StepKind::Symbology => "Publish symbology",
            StepKind::Metadata => "Publish metadata",
            StepKind::ExportData => "Export data",
            StepKind::ExportMetadata => "Export metadata",
            StepKind::ExportSymbology => "Export symbology",
        }
    }
}

/// One step of a task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    /// Position in the task, from 0
    pub index: usize,
    pub layer: String,
    pub kind: StepKind,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.layer, self.kind.label())
    }
}

/// Progress notification of synchronous execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "step", rename_all = "camelCase")]
pub enum ProgressEvent {
    StepStarted(Step),
    StepSkipped(Step),
    StepFinished(Step),
}

impl ProgressEvent {
    pub fn step(&self) -> &Step {
        match self {
            Self::StepStarted(step) | Self::StepSkipped(step) | Self::StepFinished(step) => step,
        }
    }
}

/// Receiver of progress events
///
/// Every step gets `StepStarted` followed by `StepFinished` or
/// `StepSkipped`. A step that fails gets `StepStarted` only: no terminal
/// event follows, and no later step is started. The error is reported
/// through the task's outcome.
pub trait ProgressObserver: Send + Sync {
    fn on_event(&self, event: &ProgressEvent);
}

/// Prints progress lines to stdout
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleProgress;

impl ProgressObserver for ConsoleProgress {
    fn on_event(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::StepStarted(step) => println!("⏳ {}...", step),
            ProgressEvent::StepSkipped(step) => println!("  ⏭️  {} skipped", step),
            ProgressEvent::StepFinished(step) => println!("  ✅ {}", step),
        }
    }
}

// ============================================================================
// Tasks
// ============================================================================

/// A layer as it travels inside a task
#[derive(Debug, Clone, PartialEq)]
pub struct TaskLayer {
    pub layer: Layer,
    /// Metadata record UUID
    pub uuid: String,
    pub fields: FieldInclusion,
}

/// Push layers to the selected servers
pub struct PublishTask {
    pub layers: Vec<TaskLayer>,
    pub only_symbology: bool,
    pub geodata: Option<Arc<dyn GeodataServer>>,
    pub metadata: Option<Arc<dyn MetadataServer>>,
}

/// Write layers to a local folder
pub struct ExportTask {
    pub folder: PathBuf,
    pub layers: Vec<TaskLayer>,
    pub export_data: bool,
    pub export_metadata: bool,
    pub export_symbology: bool,
    pub exporter: Arc<dyn Exporter>,
}

/// Unit of work produced by one publish request
pub enum Task {
    Publish(PublishTask),
    Export(ExportTask),
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Task::Publish(task) => f
                .debug_struct("PublishTask")
                .field("layers", &task.layers.len())
                .field("only_symbology", &task.only_symbology)
                .field("geodata", &task.geodata.as_ref().map(|s| s.name().to_string()))
                .field("metadata", &task.metadata.as_ref().map(|s| s.name().to_string()))
                .finish(),
            Task::Export(task) => f
                .debug_struct("ExportTask")
                .field("folder", &task.folder)
                .field("layers", &task.layers.len())
                .field("export_data", &task.export_data)
                .field("export_metadata", &task.export_metadata)
                .field("export_symbology", &task.export_symbology)
                .finish(),
        }
    }
}

impl Task {
    pub fn layers(&self) -> &[TaskLayer] {
        match self {
            Task::Publish(task) => &task.layers,
            Task::Export(task) => &task.layers,
        }
    }

    /// Roles whose server was resolved in a publish task
    pub fn published_roles(&self) -> Vec<ServerRole> {
        let mut roles = Vec::new();
        if let Task::Publish(task) = self {
            if task.geodata.is_some() {
                roles.push(ServerRole::Geodata);
            }
            if task.metadata.is_some() {
                roles.push(ServerRole::Metadata);
            }
        }
        roles
    }

    /// Every step the task will go through, in execution order
    pub fn plan(&self) -> Vec<Step> {
        let kinds: &[StepKind] = match self {
            Task::Publish(_) => &[StepKind::Data, StepKind::Symbology, StepKind::Metadata],
            Task::Export(_) => &[
                StepKind::ExportData,
                StepKind::ExportMetadata,
                StepKind::ExportSymbology,
            ],
        };

        self.layers()
            .iter()
            .flat_map(|tl| kinds.iter().map(move |kind| (tl.layer.name.clone(), *kind)))
            .enumerate()
            .map(|(index, (layer, kind))| Step { index, layer, kind })
            .collect()
    }

    /// Run every step in order
    ///
    /// Each step emits `StepStarted`, then `StepSkipped` or `StepFinished`.
    /// A failing step emits nothing further and its error is returned.
    pub async fn run(&self, observer: Option<&dyn ProgressObserver>) -> Result<(), PublishError> {
        let emit = |event: ProgressEvent| {
            if let Some(observer) = observer {
                observer.on_event(&event);
            }
        };

        let plan = self.plan();
        let per_layer = 3;
        for step in plan {
            let task_layer = &self.layers()[step.index / per_layer];
            emit(ProgressEvent::StepStarted(step.clone()));

            let performed = self.run_step(step.kind, task_layer).await.inspect_err(|e| {
                tracing::debug!(step = %step, error = %e, "step failed");
            })?;

            if performed {
                emit(ProgressEvent::StepFinished(step));
            } else {
                emit(ProgressEvent::StepSkipped(step));
            }
        }
        Ok(())
    }

    /// Perform one step; `Ok(false)` when the step is switched off
    async fn run_step(&self, kind: StepKind, tl: &TaskLayer) -> Result<bool, PublishError> {
        match (self, kind) {
            (Task::Publish(task), StepKind::Data) => match &task.geodata {
                Some(server) if !task.only_symbology => {
                    server.publish_layer(&tl.layer, &tl.fields).await?;
                    Ok(true)
                }
                _ => Ok(false),
            },
            (Task::Publish(task), StepKind::Symbology) => match &task.geodata {
                Some(server) => {
                    server.publish_style(&tl.layer).await?;
                    Ok(true)
                }
                None => Ok(false),
            },
            (Task::Publish(task), StepKind::Metadata) => match &task.metadata {
                Some(server) => {
                    server.publish_metadata(&tl.layer, &tl.uuid).await?;
                    Ok(true)
                }
                None => Ok(false),
            },
            (Task::Export(task), StepKind::ExportData) if task.export_data => {
                task.exporter
                    .export_data(&task.folder, &tl.layer, &tl.fields)
                    .await?;
                Ok(true)
            }
            (Task::Export(task), StepKind::ExportMetadata) if task.export_metadata => {
                task.exporter
                    .export_metadata(&task.folder, &tl.layer, &tl.uuid)
                    .await?;
                Ok(true)
            }
            (Task::Export(task), StepKind::ExportSymbology) if task.export_symbology => {
                task.exporter.export_symbology(&task.folder, &tl.layer).await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

// ============================================================================
// Outcome
// ============================================================================

/// How a failure is presented to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureNotice {
    /// A server could not be reached (synchronous execution only)
    ServerUnavailable,
    /// Any other failure
    Generic,
}

impl FailureNotice {
    /// Classify an error raised by synchronous execution
    pub fn for_sync(error: &PublishError) -> Self {
        if error.class() == ErrorClass::Connectivity {
            Self::ServerUnavailable
        } else {
            Self::Generic
        }
    }

    /// Background execution has no modal context, so every failure is generic
    pub fn for_background(_error: &PublishError) -> Self {
        Self::Generic
    }

    pub fn title(&self) -> &'static str {
        FAILURE_TITLE
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::ServerUnavailable => CONNECTION_FAILURE_MESSAGE,
            Self::Generic => GENERIC_FAILURE_MESSAGE,
        }
    }
}

/// Result of a finished task
#[derive(Debug)]
pub struct TaskOutcome {
    pub task_id: Uuid,
    /// Roles whose server was resolved in a publish task
    pub published_roles: Vec<ServerRole>,
    /// Names of the layers the task covered
    pub layers: Vec<String>,
    pub error: Option<PublishError>,
    pub notice: Option<FailureNotice>,
}

impl TaskOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }

    /// Build the outcome of a task run, logging the raw error
    pub fn from_run(
        task_id: Uuid,
        task: &Task,
        result: Result<(), PublishError>,
        background: bool,
    ) -> Self {
        let (error, notice) = match result {
            Ok(()) => (None, None),
            Err(e) => {
                tracing::error!(task = %task_id, error = %e, code = e.code(), "task failed");
                let notice = if background {
                    FailureNotice::for_background(&e)
                } else {
                    FailureNotice::for_sync(&e)
                };
                (Some(e), Some(notice))
            }
        };

        Self {
            task_id,
            published_roles: task.published_roles(),
            layers: task.layers().iter().map(|tl| tl.layer.name.clone()).collect(),
            error,
            notice,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        FailMode, MockExporter, MockGeodataServer, MockMetadataServer, RecordingObserver,
        raster_layer, vector_layer,
    };

    fn task_layer(layer: Layer) -> TaskLayer {
        TaskLayer {
            uuid: format!("uuid-{}", layer.name),
            fields: FieldInclusion::all_included(&layer),
            layer,
        }
    }

    fn kinds(events: &[ProgressEvent]) -> Vec<String> {
        events
            .iter()
            .map(|e| {
                let tag = match e {
                    ProgressEvent::StepStarted(_) => "started",
                    ProgressEvent::StepSkipped(_) => "skipped",
                    ProgressEvent::StepFinished(_) => "finished",
                };
                format!("{}:{:?}", tag, e.step().kind)
            })
            .collect()
    }

    #[tokio::test]
    async fn test_publish_runs_steps_in_order() {
        let geodata = Arc::new(MockGeodataServer::new("GS"));
        let metadata = Arc::new(MockMetadataServer::new("GN"));
        let task = Task::Publish(PublishTask {
            layers: vec![task_layer(vector_layer("roads", &["id"]))],
            only_symbology: false,
            geodata: Some(geodata.clone()),
            metadata: Some(metadata.clone()),
        });
        let observer = RecordingObserver::new();

        task.run(Some(&observer)).await.unwrap();

        assert_eq!(
            kinds(&observer.events()),
            vec![
                "started:Data",
                "finished:Data",
                "started:Symbology",
                "finished:Symbology",
                "started:Metadata",
                "finished:Metadata"
            ]
        );
        assert_eq!(geodata.calls(), vec!["publish_layer:roads[id]", "publish_style:roads"]);
        assert!(metadata.has_record("uuid-roads"));
        assert_eq!(task.published_roles(), ServerRole::ALL.to_vec());
    }

    #[tokio::test]
    async fn test_metadata_only_skips_geodata_steps() {
        let metadata = Arc::new(MockMetadataServer::new("GN"));
        let task = Task::Publish(PublishTask {
            layers: vec![
                task_layer(vector_layer("a", &[])),
                task_layer(raster_layer("b")),
            ],
            only_symbology: false,
            geodata: None,
            metadata: Some(metadata.clone()),
        });
        let observer = RecordingObserver::new();

        task.run(Some(&observer)).await.unwrap();

        let events = observer.events();
        assert_eq!(events.len(), 12);
        assert_eq!(&kinds(&events)[..4], &["started:Data", "skipped:Data", "started:Symbology", "skipped:Symbology"]);
        assert_eq!(metadata.calls(), vec!["publish_metadata:a", "publish_metadata:b"]);
        assert_eq!(task.published_roles(), vec![ServerRole::Metadata]);
    }

    #[tokio::test]
    async fn test_only_symbology_skips_data() {
        let geodata = Arc::new(MockGeodataServer::new("GS"));
        let task = Task::Publish(PublishTask {
            layers: vec![task_layer(vector_layer("roads", &[]))],
            only_symbology: true,
            geodata: Some(geodata.clone()),
            metadata: None,
        });

        task.run(None).await.unwrap();

        assert_eq!(geodata.calls(), vec!["publish_style:roads"]);
    }

    #[tokio::test]
    async fn test_first_failure_stops_task() {
        let geodata = Arc::new(MockGeodataServer::new("GS").failing("publish_style", FailMode::Request));
        let metadata = Arc::new(MockMetadataServer::new("GN"));
        let task = Task::Publish(PublishTask {
            layers: vec![
                task_layer(vector_layer("a", &[])),
                task_layer(vector_layer("b", &[])),
            ],
            only_symbology: false,
            geodata: Some(geodata.clone()),
            metadata: Some(metadata.clone()),
        });
        let observer = RecordingObserver::new();

        let err = task.run(Some(&observer)).await.unwrap_err();

        assert_eq!(err.code(), "SERVER_REQUEST");
        assert_eq!(
            kinds(&observer.events()),
            vec!["started:Data", "finished:Data", "started:Symbology"]
        );
        assert!(metadata.calls().is_empty());
    }

    #[tokio::test]
    async fn test_export_flags() {
        let exporter = Arc::new(MockExporter::new());
        let task = Task::Export(ExportTask {
            folder: PathBuf::from("/out"),
            layers: vec![task_layer(vector_layer("roads", &[]))],
            export_data: true,
            export_metadata: false,
            export_symbology: true,
            exporter: exporter.clone(),
        });
        let observer = RecordingObserver::new();

        task.run(Some(&observer)).await.unwrap();

        assert_eq!(
            exporter.calls(),
            vec!["export_data:/out/roads", "export_symbology:/out/roads"]
        );
        assert_eq!(
            kinds(&observer.events())[2..4],
            ["started:ExportMetadata", "skipped:ExportMetadata"]
        );
        assert!(task.published_roles().is_empty());
    }

    #[test]
    fn test_plan_indices() {
        let task = Task::Export(ExportTask {
            folder: PathBuf::from("/out"),
            layers: vec![task_layer(raster_layer("a")), task_layer(raster_layer("b"))],
            export_data: true,
            export_metadata: true,
            export_symbology: true,
            exporter: Arc::new(MockExporter::new()),
        });

        let plan = task.plan();
        assert_eq!(plan.len(), 6);
        assert_eq!(plan[4].index, 4);
        assert_eq!(plan[4].layer, "b");
        assert_eq!(plan[4].to_string(), "b: Export metadata");
    }

    #[test]
    fn test_failure_notice_classification() {
        let connectivity = PublishError::ConnectionFailed {
            server: "GS".to_string(),
            message: "refused".to_string(),
        };
        let request = PublishError::ServerRequest {
            server: "GS".to_string(),
            message: "HTTP 500".to_string(),
        };

        assert_eq!(FailureNotice::for_sync(&connectivity), FailureNotice::ServerUnavailable);
        assert_eq!(FailureNotice::for_sync(&request), FailureNotice::Generic);
        assert_eq!(FailureNotice::for_background(&connectivity), FailureNotice::Generic);
        assert!(FailureNotice::ServerUnavailable.message().contains("Server unavailable"));
    }
}
