//! Layer Publisher - Main orchestrator for layer publishing
//!
//! Manages the complete publishing workflow including:
//! - Server selection per role and publication status refresh
//! - Commit of pending layer edits and pre-publication validation
//! - Task building and synchronous or background execution
//! - Failure classification
//! - Unpublish, preview and metadata import/validation

use crate::core::error::PublishError;
use crate::core::layer::{BoundingBox, LayerKind, LayerSource};
use crate::core::metadata::{
    DeterministicIdentity, IsoXmlImporter, MetadataIdentity, MetadataImporter,
    locate_metadata_file,
};
use crate::core::state_machine::{TaskState, TaskStateMachine};
use crate::core::traits::{Exporter, GeodataServer, MetadataProfile, MetadataServer, ServerRole};
use crate::orchestration::background::{TaskHandle, TaskScheduler, TerminationCallback, TokioScheduler, submit_task};
use crate::orchestration::layer_catalog::{LayerCatalog, PublishCandidate};
use crate::orchestration::status_tracker::{PublicationStatus, StatusTracker};
use crate::orchestration::task::{ExportTask, ProgressObserver, PublishTask, Task, TaskLayer, TaskOutcome};
use crate::plugins::folder_exporter::FolderExporter;
use crate::plugins::server_registry::ServerRegistry;
use crate::validation::metadata_validator::{MetadataIssue, MetadataValidator};
use crate::validation::publish_validator::{PublishValidator, ValidationReport};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

/// Offline export settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSettings {
    pub folder: PathBuf,
    pub data: bool,
    pub metadata: bool,
    pub symbology: bool,
}

/// Online publish or offline export; exactly one per request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishMode {
    Online { only_symbology: bool },
    Export(ExportSettings),
}

impl Default for PublishMode {
    fn default() -> Self {
        PublishMode::Online {
            only_symbology: false,
        }
    }
}

/// Report of a synchronous publish request
#[derive(Debug)]
pub struct PublishReport {
    /// `Rejected`, `Succeeded` or `Failed`
    pub state: TaskState,
    pub validation: ValidationReport,
    /// Present once the task ran
    pub outcome: Option<TaskOutcome>,
    /// Milliseconds from the request to the end of the task
    pub duration: i64,
}

impl PublishReport {
    pub fn success(&self) -> bool {
        self.state == TaskState::Succeeded
    }

    /// Text to show the user, if any
    pub fn message(&self) -> Option<String> {
        match self.state {
            TaskState::Rejected => Some(self.validation.to_message()),
            _ => self
                .outcome
                .as_ref()
                .and_then(|o| o.notice)
                .map(|notice| format!("{}\n{}", notice.title(), notice.message())),
        }
    }
}

/// Result of a background publish request
#[derive(Debug)]
pub enum Submission {
    Rejected(ValidationReport),
    Submitted(TaskHandle),
}

/// Result of [`LayerPublisher::unpublish_all`]
#[derive(Debug, Default, Clone, PartialEq)]
pub struct UnpublishSummary {
    pub unpublished: Vec<(String, ServerRole)>,
    /// `(layer, role, error message)`
    pub failures: Vec<(String, ServerRole, String)>,
}

impl UnpublishSummary {
    pub fn success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Status line of one catalog layer
#[derive(Debug, Clone, PartialEq)]
pub struct LayerStatusRow {
    pub id: String,
    pub name: String,
    pub kind: LayerKind,
    pub checked: bool,
    pub data: PublicationStatus,
    pub metadata: PublicationStatus,
}

enum Prepared {
    Rejected(ValidationReport),
    Ready(Task, ValidationReport),
}

/// Task state shared with background terminations
///
/// `attempt` counts publish requests so a late termination cannot finish a
/// newer request.
#[derive(Default)]
struct TaskTracking {
    attempt: u64,
    machine: TaskStateMachine,
}

impl TaskTracking {
    /// Move a running task to its end state, then back to `Idle`
    fn finish(&mut self, state: TaskState) {
        if self.machine.transition(state, None) {
            self.machine.transition(TaskState::Idle, None);
        }
    }
}

/// Main layer publisher orchestrator
pub struct LayerPublisher {
    registry: ServerRegistry,
    catalog: LayerCatalog,
    tracker: StatusTracker,
    identity: Arc<dyn MetadataIdentity>,
    importer: Arc<dyn MetadataImporter>,
    exporter: Arc<dyn Exporter>,
    scheduler: Option<Arc<dyn TaskScheduler>>,
    geodata_selection: Option<String>,
    metadata_selection: Option<String>,
    mode: PublishMode,
    tracking: Arc<Mutex<TaskTracking>>,
}

impl LayerPublisher {
    /// Create a new LayerPublisher
    ///
    /// # Arguments
    ///
    /// * `registry` - Configured servers
    /// * `source` - Map project the layers come from
    ///
    /// Nothing is selected; call [`LayerPublisher::refresh_all`] or select a
    /// server to compute publication status.
    pub fn new(registry: ServerRegistry, source: Arc<dyn LayerSource>) -> Self {
        Self {
            registry,
            catalog: LayerCatalog::new(source),
            tracker: StatusTracker::new(),
            identity: Arc::new(DeterministicIdentity),
            importer: Arc::new(IsoXmlImporter),
            exporter: Arc::new(FolderExporter::new()),
            scheduler: None,
            geodata_selection: None,
            metadata_selection: None,
            mode: PublishMode::default(),
            tracking: Arc::new(Mutex::new(TaskTracking::default())),
        }
    }

    pub fn with_identity(mut self, identity: Arc<dyn MetadataIdentity>) -> Self {
        self.identity = identity;
        self
    }

    pub fn with_importer(mut self, importer: Arc<dyn MetadataImporter>) -> Self {
        self.importer = importer;
        self
    }

    pub fn with_exporter(mut self, exporter: Arc<dyn Exporter>) -> Self {
        self.exporter = exporter;
        self
    }

    /// Scheduler for background tasks (default: the current tokio runtime)
    pub fn with_scheduler(mut self, scheduler: Arc<dyn TaskScheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn registry(&self) -> &ServerRegistry {
        &self.registry
    }

    pub fn catalog(&self) -> &LayerCatalog {
        &self.catalog
    }

    /// Catalog access for field/metadata edits and checked flags
    pub fn catalog_mut(&mut self) -> &mut LayerCatalog {
        &mut self.catalog
    }

    pub fn tracker(&self) -> &StatusTracker {
        &self.tracker
    }

    /// Current task state; `Idle` again once a request has ended
    pub fn task_state(&self) -> TaskState {
        self.tracking().machine.get_state()
    }

    /// Transition history of the last publish request
    pub fn task_history(&self) -> String {
        self.tracking().machine.get_history()
    }

    fn tracking(&self) -> MutexGuard<'_, TaskTracking> {
        self.tracking.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn mode(&self) -> &PublishMode {
        &self.mode
    }

    pub fn set_mode(&mut self, mode: PublishMode) {
        self.mode = mode;
    }

    // ------------------------------------------------------------------
    // Server selection and status
    // ------------------------------------------------------------------

    pub fn selected_server(&self, role: ServerRole) -> Option<&str> {
        match role {
            ServerRole::Geodata => self.geodata_selection.as_deref(),
            ServerRole::Metadata => self.metadata_selection.as_deref(),
        }
    }

    /// Select a server by name (`None` for "do not publish") and refresh
    /// that role
    pub async fn select_server(&mut self, role: ServerRole, name: Option<String>) {
        match role {
            ServerRole::Geodata => self.geodata_selection = name,
            ServerRole::Metadata => self.metadata_selection = name,
        }
        self.refresh(role).await;
    }

    /// Select by position in [`ServerRegistry::selectable_names`]
    pub async fn select_server_index(&mut self, role: ServerRole, index: usize) {
        let name = self.registry.selection_from_index(role, index);
        self.select_server(role, name).await;
    }

    /// Selected geodata server; a stale name counts as "none selected"
    fn geodata_server(&self) -> Option<Arc<dyn GeodataServer>> {
        let name = self.geodata_selection.as_deref()?;
        match self.registry.resolve_geodata(name) {
            Ok(server) => Some(server),
            Err(e) => {
                tracing::debug!(error = %e, "geodata selection does not resolve");
                None
            }
        }
    }

    /// Selected metadata server; a stale name counts as "none selected"
    fn metadata_server(&self) -> Option<Arc<dyn MetadataServer>> {
        let name = self.metadata_selection.as_deref()?;
        match self.registry.resolve_metadata(name) {
            Ok(server) => Some(server),
            Err(e) => {
                tracing::debug!(error = %e, "metadata selection does not resolve");
                None
            }
        }
    }

    /// Profile of the selected metadata server
    pub fn metadata_profile(&self) -> MetadataProfile {
        self.metadata_server()
            .map(|s| s.profile())
            .unwrap_or_default()
    }

    fn layer_names(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.catalog
            .list_publishable_layers()
            .into_iter()
            .filter(|l| seen.insert(l.name.clone()))
            .map(|l| l.name.clone())
            .collect()
    }

    /// Recompute publication status of one role
    pub async fn refresh(&mut self, role: ServerRole) {
        match role {
            ServerRole::Geodata => {
                let server = self.geodata_server();
                let names = self.layer_names();
                self.tracker.refresh_geodata(server.as_deref(), &names).await;
            }
            ServerRole::Metadata => {
                let server = self.metadata_server();
                let mut seen = HashSet::new();
                let layers: Vec<(String, String)> = self
                    .catalog
                    .list_publishable_layers()
                    .into_iter()
                    .filter(|l| seen.insert(l.name.clone()))
                    .map(|l| (l.name.clone(), self.identity.uuid_for_layer(l)))
                    .collect();
                self.tracker
                    .refresh_metadata(server.as_deref(), &layers)
                    .await;
            }
        }
    }

    pub async fn refresh_all(&mut self) {
        for role in ServerRole::ALL {
            self.refresh(role).await;
        }
    }

    /// Gate for the publish actions
    pub fn can_publish(&self) -> bool {
        self.tracker.can_publish(self.catalog.len())
    }

    /// Replace the server list, keeping each selection whose name still
    /// exists, then refresh both roles
    pub async fn update_servers(&mut self, registry: ServerRegistry) {
        self.registry = registry;
        for role in ServerRole::ALL {
            let keep = self
                .selected_server(role)
                .is_some_and(|name| self.registry.contains(role, name));
            if !keep {
                match role {
                    ServerRole::Geodata => self.geodata_selection = None,
                    ServerRole::Metadata => self.metadata_selection = None,
                }
            }
        }
        self.refresh_all().await;
    }

    /// Re-read the project layers and refresh both roles
    pub async fn reload_layers(&mut self) {
        self.catalog.reload();
        self.refresh_all().await;
    }

    /// Status of every catalog layer, in catalog order
    pub fn status_rows(&self) -> Vec<LayerStatusRow> {
        self.catalog
            .list_publishable_layers()
            .into_iter()
            .map(|l| LayerStatusRow {
                id: l.id.clone(),
                name: l.name.clone(),
                kind: l.kind,
                checked: self.catalog.is_checked(&l.id),
                data: self.tracker.status(ServerRole::Geodata, &l.name),
                metadata: self.tracker.status(ServerRole::Metadata, &l.name),
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Publishing
    // ------------------------------------------------------------------

    /// Validate the checked layers and build the task
    ///
    /// A request still running in the background is superseded: its
    /// termination no longer moves the state.
    async fn prepare(&mut self) -> Result<Prepared, PublishError> {
        {
            let mut tracking = self.tracking();
            if tracking.machine.get_state() == TaskState::Running {
                tracing::warn!("new publish request while a task is still running");
            }
            tracking.attempt += 1;
            tracking.machine.reset();
            tracking.machine.transition(TaskState::Validating, None);
        }

        if let Err(e) = self.catalog.commit_pending() {
            self.tracking().machine.reset();
            return Err(e);
        }
        let candidate = self.catalog.candidate();

        // server validators apply to exports too
        let geodata = self.geodata_server();
        let metadata = self.metadata_server();
        let report =
            PublishValidator::validate(&candidate, geodata.as_deref(), metadata.as_deref()).await;

        if !report.is_ok() {
            self.tracking().machine.transition(
                TaskState::Rejected,
                Some(format!("{} issue(s)", report.errors().len())),
            );
            return Ok(Prepared::Rejected(report));
        }

        self.tracking().machine.transition(TaskState::Building, None);
        let task = self.build_task(candidate, geodata, metadata);
        Ok(Prepared::Ready(task, report))
    }

    /// Servers are only handed to online publish tasks
    fn build_task(
        &self,
        candidate: PublishCandidate,
        geodata: Option<Arc<dyn GeodataServer>>,
        metadata: Option<Arc<dyn MetadataServer>>,
    ) -> Task {
        let layers = candidate
            .layers
            .into_iter()
            .map(|c| TaskLayer {
                uuid: self.identity.uuid_for_layer(&c.layer),
                layer: c.layer,
                fields: c.fields,
            })
            .collect();

        match &self.mode {
            PublishMode::Online { only_symbology } => Task::Publish(PublishTask {
                layers,
                only_symbology: *only_symbology,
                geodata,
                metadata,
            }),
            PublishMode::Export(settings) => Task::Export(ExportTask {
                folder: settings.folder.clone(),
                layers,
                export_data: settings.data,
                export_metadata: settings.metadata,
                export_symbology: settings.symbology,
                exporter: Arc::clone(&self.exporter),
            }),
        }
    }

    /// Publish the checked layers, waiting for the task to finish
    ///
    /// # Arguments
    ///
    /// * `observer` - Receives step progress events
    ///
    /// # Returns
    ///
    /// Report with the final state; `Err` only when pending edits could not
    /// be committed. The task state is back to `Idle` when this returns.
    pub async fn publish(
        &mut self,
        observer: Option<&dyn ProgressObserver>,
    ) -> Result<PublishReport, PublishError> {
        let (task, validation) = match self.prepare().await? {
            Prepared::Rejected(report) => {
                let mut tracking = self.tracking();
                let duration = tracking.machine.get_elapsed_time();
                tracking.machine.transition(TaskState::Idle, None);
                return Ok(PublishReport {
                    state: TaskState::Rejected,
                    validation: report,
                    outcome: None,
                    duration,
                });
            }
            Prepared::Ready(task, report) => (task, report),
        };

        let task_id = Uuid::new_v4();
        self.tracking().machine.transition(TaskState::Running, None);
        tracing::info!(task = %task_id, layers = task.layers().len(), "running task");

        let result = task.run(observer).await;
        let outcome = TaskOutcome::from_run(task_id, &task, result, false);

        let state = if outcome.succeeded() {
            TaskState::Succeeded
        } else {
            TaskState::Failed
        };
        self.tracking().machine.transition(state, None);

        // partially published layers need fresh status as well
        for role in &outcome.published_roles {
            self.refresh(*role).await;
        }

        let duration = {
            let mut tracking = self.tracking();
            let duration = tracking.machine.get_elapsed_time();
            tracking.machine.transition(TaskState::Idle, None);
            duration
        };
        Ok(PublishReport {
            state,
            validation,
            outcome: Some(outcome),
            duration,
        })
    }

    /// Publish the checked layers in the background
    ///
    /// `dismiss` runs after validation passed and before the task is handed
    /// off, so the caller can close its view. `on_terminated` runs exactly
    /// once when the task ends, after the task state has moved through
    /// `Succeeded` or `Failed` back to `Idle`. A rejected request is back to
    /// `Idle` on return. Status is not refreshed automatically.
    pub async fn publish_in_background<F>(
        &mut self,
        dismiss: F,
        on_terminated: TerminationCallback,
    ) -> Result<Submission, PublishError>
    where
        F: FnOnce(),
    {
        let task = match self.prepare().await? {
            Prepared::Rejected(report) => {
                self.tracking().machine.transition(TaskState::Idle, None);
                return Ok(Submission::Rejected(report));
            }
            Prepared::Ready(task, _) => task,
        };

        dismiss();

        let scheduler: Arc<dyn TaskScheduler> = match &self.scheduler {
            Some(scheduler) => Arc::clone(scheduler),
            None => Arc::new(TokioScheduler::current()),
        };
        let attempt = {
            let mut tracking = self.tracking();
            tracking
                .machine
                .transition(TaskState::Running, Some("background".to_string()));
            tracking.attempt
        };

        let tracking = Arc::clone(&self.tracking);
        let on_terminated: TerminationCallback = Box::new(move |outcome: TaskOutcome| {
            {
                let mut tracking = tracking.lock().unwrap_or_else(|e| e.into_inner());
                if tracking.attempt == attempt {
                    tracking.finish(if outcome.succeeded() {
                        TaskState::Succeeded
                    } else {
                        TaskState::Failed
                    });
                } else {
                    tracing::debug!(task = %outcome.task_id, "superseded task terminated");
                }
            }
            on_terminated(outcome);
        });
        let handle = submit_task(scheduler.as_ref(), task, on_terminated);

        Ok(Submission::Submitted(handle))
    }

    // ------------------------------------------------------------------
    // Unpublish / preview
    // ------------------------------------------------------------------

    fn uuid_for(&self, name: &str) -> Result<String, PublishError> {
        let layer = self
            .catalog
            .layer_by_name(name)
            .ok_or_else(|| PublishError::LayerNotFound {
                name: name.to_string(),
            })?;
        Ok(self.identity.uuid_for_layer(layer))
    }

    /// Delete a layer and its style from the selected geodata server
    pub async fn unpublish_data(&mut self, name: &str) -> Result<(), PublishError> {
        let Some(server) = self.geodata_server() else {
            tracing::debug!(layer = name, "no geodata server selected, nothing to unpublish");
            return Ok(());
        };
        if self.tracker.status(ServerRole::Geodata, name) == PublicationStatus::NotPublished {
            return Ok(());
        }

        server.delete_layer(name).await?;
        if let Err(e) = server.delete_style(name).await {
            tracing::warn!(server = server.name(), layer = name, error = %e, "style not deleted");
        }
        self.tracker
            .mark(ServerRole::Geodata, name, PublicationStatus::NotPublished);
        tracing::info!(server = server.name(), layer = name, "data unpublished");
        Ok(())
    }

    /// Delete a layer's record from the selected metadata server
    pub async fn unpublish_metadata(&mut self, name: &str) -> Result<(), PublishError> {
        let Some(server) = self.metadata_server() else {
            tracing::debug!(layer = name, "no metadata server selected, nothing to unpublish");
            return Ok(());
        };
        if self.tracker.status(ServerRole::Metadata, name) == PublicationStatus::NotPublished {
            return Ok(());
        }

        let uuid = self.uuid_for(name)?;
        server.delete_metadata(&uuid).await?;
        self.tracker
            .mark(ServerRole::Metadata, name, PublicationStatus::NotPublished);
        tracing::info!(server = server.name(), layer = name, %uuid, "metadata unpublished");
        Ok(())
    }

    /// Unpublish every published layer; failures are collected, not fatal
    pub async fn unpublish_all(&mut self) -> UnpublishSummary {
        let mut summary = UnpublishSummary::default();

        for name in self.layer_names() {
            for role in ServerRole::ALL {
                if !self.tracker.is_published(role, &name) {
                    continue;
                }
                let result = match role {
                    ServerRole::Geodata => self.unpublish_data(&name).await,
                    ServerRole::Metadata => self.unpublish_metadata(&name).await,
                };
                match result {
                    Ok(()) => summary.unpublished.push((name.clone(), role)),
                    Err(e) => {
                        tracing::error!(layer = %name, %role, error = %e, "unpublish failed");
                        summary.failures.push((name.clone(), role, e.to_string()));
                    }
                }
            }
        }
        summary
    }

    /// Open a preview of one layer on the selected geodata server
    pub async fn preview_data(&self, name: &str) -> Result<(), PublishError> {
        let Some(server) = self.geodata_server() else {
            tracing::debug!(layer = name, "no geodata server selected, no preview");
            return Ok(());
        };
        let layer = self
            .catalog
            .layer_by_name(name)
            .ok_or_else(|| PublishError::LayerNotFound {
                name: name.to_string(),
            })?;

        let bbox = layer.extent.ensure_area();
        server
            .open_preview(&[layer.name.clone()], &bbox, &layer.crs)
            .await;
        Ok(())
    }

    /// Open a preview of every published layer, extents combined in the
    /// project CRS
    pub async fn preview_all(&self) -> Result<(), PublishError> {
        let Some(server) = self.geodata_server() else {
            tracing::debug!("no geodata server selected, no preview");
            return Ok(());
        };
        let source = self.catalog.source();
        let target_crs = source.project_crs();

        let mut names = Vec::new();
        let mut bbox = BoundingBox::null();
        for layer in self.catalog.list_publishable_layers() {
            if !self.tracker.is_published(ServerRole::Geodata, &layer.name)
                || names.contains(&layer.name)
            {
                continue;
            }
            let extent = match source.transform_extent(&layer.extent, &layer.crs, &target_crs) {
                Ok(extent) => extent,
                Err(e) => {
                    tracing::warn!(layer = %layer.name, error = %e, "layer left out of preview");
                    continue;
                }
            };
            bbox.combine(&extent);
            names.push(layer.name.clone());
        }

        if names.is_empty() {
            tracing::debug!("no published layers to preview");
            return Ok(());
        }
        server
            .open_preview(&names, &bbox.ensure_area(), &target_crs)
            .await;
        Ok(())
    }

    /// Open a layer's record on the selected metadata server
    pub async fn preview_metadata(&self, name: &str) -> Result<(), PublishError> {
        let Some(server) = self.metadata_server() else {
            tracing::debug!(layer = name, "no metadata server selected, no preview");
            return Ok(());
        };
        let uuid = self.uuid_for(name)?;
        server.open_metadata(&uuid).await;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Metadata
    // ------------------------------------------------------------------

    /// Import a metadata document into a layer
    ///
    /// # Arguments
    ///
    /// * `id` - Layer id
    /// * `path` - Document to import; `None` looks next to the layer source
    ///
    /// # Returns
    ///
    /// Path of the imported document
    pub async fn import_metadata(
        &mut self,
        id: &str,
        path: Option<&Path>,
    ) -> Result<PathBuf, PublishError> {
        let layer = self
            .catalog
            .layer(id)
            .ok_or_else(|| PublishError::LayerNotFound {
                name: id.to_string(),
            })?;

        let path = match path {
            Some(p) => p.to_path_buf(),
            None => locate_metadata_file(&layer.source).await.ok_or_else(|| {
                PublishError::MetadataFormat {
                    path: layer.source.clone(),
                    message: "could not find a suitable metadata file".to_string(),
                }
            })?,
        };

        let metadata = self.importer.load_metadata_from_xml(&path).await?;
        self.catalog.source().store_metadata(id, metadata.clone())?;
        self.catalog.replace_metadata(id, metadata)?;

        tracing::info!(layer = id, path = %path.display(), "metadata imported");
        Ok(path)
    }

    /// Commit the metadata buffer of a layer and check it for completeness
    pub fn validate_layer_metadata(&mut self, id: &str) -> Result<Vec<MetadataIssue>, PublishError> {
        self.catalog.commit(id)?;
        let metadata = self.catalog.metadata_buffer_for(id)?;
        Ok(MetadataValidator::validate(metadata))
    }
}
