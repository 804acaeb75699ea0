//! Inspector session.
//!
//! Owns the scene graph and everything that reads or edits it. Viewport and
//! property-panel events come in as method calls; exports leave through the
//! sink router.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

use crate::config::InspectorConfig;
use crate::edit::{apply_property_change, EditError, PropertyIntent};
use crate::export::{serialize, ExportBuffer, ExportError, ExportOptions};
use crate::import::{read_scene_file, ImportError};
use crate::scene::serialization::{load_scene_from_file, save_scene_to_file, SerializationError};
use crate::scene::{NodeId, SceneGraph, SceneNode};
use crate::selection::SelectionTracker;
use crate::sink::remote::{DirectoryStore, RemoteUploader, UploadEvent, UploadOutcome, UploadTask};
use crate::sink::{Delivery, DeliveryError, Sink, SinkRouter};

#[derive(Debug, thiserror::Error)]
pub enum InspectorError {
    #[error(transparent)]
    Edit(#[from] EditError),
    #[error("export failed: {0}")]
    Export(#[from] ExportError),
    #[error("delivery failed: {0}")]
    Delivery(#[from] DeliveryError),
    #[error("import failed: {0}")]
    Import(#[from] ImportError),
    #[error("project file error: {0}")]
    Project(#[from] SerializationError),
    #[error("IO runtime error: {0}")]
    Runtime(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, InspectorError>;

/// Where an export should end up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportTarget {
    /// A file name, or the default `scene.glb` / `scene.gltf` when `None`.
    Local(Option<PathBuf>),
    /// A fresh timestamped object under the remote prefix.
    Remote,
}

pub enum SceneCommand {
    Export { target: ExportTarget },
    SaveProject { path: PathBuf },
    LoadProject { path: PathBuf },
    ImportGltf { path: PathBuf },
}

#[derive(Debug)]
pub enum CommandOutcome {
    None,
    Message(String),
    Upload(UploadTask),
}

pub struct Inspector {
    scene: SceneGraph,
    tracker: SelectionTracker,
    router: SinkRouter,
    options: ExportOptions,
    upload_events: Option<UnboundedReceiver<UploadEvent>>,
    // Dropped last.
    io_runtime: Option<tokio::runtime::Runtime>,
}

impl Inspector {
    /// Session without its own IO runtime. Remote delivery works only if the
    /// router was given an uploader.
    pub fn new(router: SinkRouter) -> Self {
        Self {
            scene: SceneGraph::new(),
            tracker: SelectionTracker::new(),
            router,
            options: ExportOptions::default(),
            upload_events: None,
            io_runtime: None,
        }
    }

    /// Session with a dedicated IO runtime and a directory-backed remote store.
    pub fn from_config(config: &InspectorConfig) -> Result<Self> {
        let io_runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("scene-inspector-io")
            .build()?;

        let (tx, rx) = unbounded_channel();
        let store = Arc::new(DirectoryStore::new(&config.remote_root));
        let uploader = RemoteUploader::new(store, io_runtime.handle().clone())
            .with_chunk_size(config.upload_chunk_size)
            .with_prefix(config.remote_prefix.clone())
            .with_listener(tx);
        let router = SinkRouter::new(&config.export_dir).with_remote(uploader);

        let mut inspector = Self::new(router);
        inspector.upload_events = Some(rx);
        inspector.io_runtime = Some(io_runtime);
        Ok(inspector)
    }

    pub fn scene(&self) -> &SceneGraph {
        &self.scene
    }

    pub fn tracker(&self) -> &SelectionTracker {
        &self.tracker
    }

    pub fn export_options(&self) -> &ExportOptions {
        &self.options
    }

    pub fn add_node(&mut self, node: SceneNode) -> NodeId {
        self.scene.add(node)
    }

    pub fn add_child(&mut self, parent: NodeId, node: SceneNode) -> Option<NodeId> {
        self.scene.add_child(parent, node)
    }

    /// Click in the viewport. `None` means empty space and keeps the selection.
    pub fn pointer_click(&mut self, node: Option<NodeId>) {
        if let Some(id) = node.filter(|id| self.scene.contains(*id)) {
            self.tracker.select(Some(id));
        }
    }

    pub fn pointer_hover(&mut self, node: Option<NodeId>) {
        self.tracker.hover(&mut self.scene, node);
    }

    pub fn close_panel(&mut self) {
        self.tracker.select(None);
    }

    pub fn selected_node(&self) -> Option<&SceneNode> {
        self.tracker.selected().and_then(|id| self.scene.get(id))
    }

    /// Applies `intent` to the selected node. `Ok(false)` when nothing is
    /// selected.
    pub fn apply(&mut self, intent: &PropertyIntent) -> std::result::Result<bool, EditError> {
        let Some(node) = self.selected_node() else {
            log::debug!("Ignoring {:?}: nothing selected", intent);
            return Ok(false);
        };
        let updated = apply_property_change(node, intent)?;
        let id = updated.id;
        self.scene.replace(updated);
        if let PropertyIntent::Color(color) = intent {
            self.tracker.rebase(&mut self.scene, id, *color);
        }
        Ok(true)
    }

    /// Property-panel entry point. Unknown material and geometry names fall
    /// back to the default variant instead of failing.
    pub fn apply_raw(
        &mut self,
        property: &str,
        value: &str,
    ) -> std::result::Result<bool, EditError> {
        let intent = PropertyIntent::parse_or_default(property, value)?;
        self.apply(&intent)
    }

    /// Serializes the scene as it is without hover darkening.
    pub fn export(&self) -> std::result::Result<ExportBuffer, ExportError> {
        serialize(&self.tracker.unhighlighted(&self.scene), &self.options)
    }

    /// Exports and hands the buffer to a sink. Failures are logged here;
    /// the scene is never touched.
    pub fn export_to(&self, target: ExportTarget) -> Result<Delivery> {
        let delivered = self.export().map_err(InspectorError::from).and_then(|buffer| {
            let sink = match target {
                ExportTarget::Local(Some(path)) => Sink::LocalSave(path),
                ExportTarget::Local(None) => Sink::default_local(buffer.kind()),
                ExportTarget::Remote => self.router.remote_sink(buffer.kind())?,
            };
            Ok(self.router.deliver(&buffer, sink)?)
        });
        if let Err(err) = &delivered {
            log::error!("{}", err);
        }
        delivered
    }

    #[cfg(feature = "dialog")]
    pub fn export_with_dialog(&self) -> Result<Option<Delivery>> {
        let buffer = self.export()?;
        let Some(sink) = Sink::pick_local(buffer.kind()) else {
            return Ok(None);
        };
        match self.router.deliver(&buffer, sink) {
            Ok(delivery) => Ok(Some(delivery)),
            Err(err) => {
                log::error!("Failed to save export: {}", err);
                Err(err.into())
            }
        }
    }

    /// Clears the scene and attaches `graph`. No merge.
    pub fn import(&mut self, graph: SceneGraph) {
        log::info!(
            "Replacing scene ({} nodes) with imported scene ({} nodes)",
            self.scene.len(),
            graph.len()
        );
        self.scene.import(graph);
        self.tracker.reset();
    }

    pub fn import_gltf(&mut self, path: &Path) -> Result<()> {
        let graph = read_scene_file(path)?;
        self.import(graph);
        Ok(())
    }

    pub fn save_project(&self, path: &Path) -> Result<()> {
        save_scene_to_file(&self.tracker.unhighlighted(&self.scene), path)?;
        Ok(())
    }

    pub fn load_project(&mut self, path: &Path) -> Result<()> {
        let graph = load_scene_from_file(path)?;
        self.import(graph);
        Ok(())
    }

    #[cfg(feature = "dialog")]
    pub fn save_project_with_dialog(&self) {
        if let Some(path) = rfd::FileDialog::new()
            .add_filter("Scene", &["json"])
            .set_file_name("scene.json")
            .save_file()
        {
            if let Err(e) = self.save_project(&path) {
                log::warn!("Failed to save scene: {}", e);
            }
        }
    }

    pub fn run_command(&mut self, command: SceneCommand) -> CommandOutcome {
        let result = match command {
            SceneCommand::Export { target } => {
                return match self.export_to(target) {
                    Ok(Delivery::Saved(path)) => {
                        CommandOutcome::Message(format!("Saved {}", path.display()))
                    }
                    Ok(Delivery::Uploading(task)) => CommandOutcome::Upload(task),
                    Err(err) => CommandOutcome::Message(format!("Export failed: {err}")),
                };
            }
            SceneCommand::SaveProject { path } => self.save_project(&path),
            SceneCommand::LoadProject { path } => self.load_project(&path),
            SceneCommand::ImportGltf { path } => self.import_gltf(&path),
        };
        match result {
            Ok(()) => CommandOutcome::None,
            Err(err) => {
                log::warn!("Scene command failed: {}", err);
                CommandOutcome::Message(err.to_string())
            }
        }
    }

    /// Upload events received since the last call.
    pub fn drain_upload_events(&mut self) -> Vec<UploadEvent> {
        let mut events = Vec::new();
        if let Some(rx) = &mut self.upload_events {
            while let Ok(event) = rx.try_recv() {
                events.push(event);
            }
        }
        events
    }

    /// Blocks until `task` ends. Only for callers outside the IO runtime,
    /// such as the CLI before exit.
    pub fn wait_for_upload(&self, task: UploadTask) -> UploadOutcome {
        match &self.io_runtime {
            Some(runtime) => runtime.block_on(task.join()),
            None => UploadOutcome::Failed("session has no IO runtime".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::ExportKind;
    use crate::scene::{Color, GeometryKind, MaterialDescriptor, MaterialKind};
    use crate::selection::HIGHLIGHT_FACTOR;

    fn temp_dir(label: &str) -> PathBuf {
        let mut path = std::env::temp_dir();
        let nonce = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        path.push(format!(
            "scene_inspector_app_{}_{}_{}",
            label,
            std::process::id(),
            nonce
        ));
        path
    }

    fn inspector_with_box() -> (Inspector, NodeId) {
        let mut inspector = Inspector::new(SinkRouter::new(temp_dir("unused")));
        let id = inspector.add_node(
            SceneNode::new(GeometryKind::Box.descriptor(), MaterialDescriptor::default())
                .with_name("Crate"),
        );
        (inspector, id)
    }

    #[test]
    fn edits_without_selection_are_ignored() {
        let (mut inspector, id) = inspector_with_box();
        assert_eq!(inspector.apply(&PropertyIntent::ToggleWireframe), Ok(false));
        assert!(!inspector.scene().get(id).unwrap().material.wireframe);
    }

    #[test]
    fn click_selects_and_close_clears() {
        let (mut inspector, id) = inspector_with_box();
        inspector.pointer_click(Some(id));
        assert_eq!(inspector.selected_node().unwrap().id, id);

        inspector.pointer_click(None);
        assert_eq!(inspector.tracker().selected(), Some(id));

        inspector.close_panel();
        assert!(inspector.selected_node().is_none());
    }

    #[test]
    fn raw_edits_fall_back_on_unknown_variants() {
        let (mut inspector, id) = inspector_with_box();
        inspector.pointer_click(Some(id));

        assert_eq!(inspector.apply_raw("material", "MeshDepthMaterial"), Ok(true));
        assert_eq!(
            inspector.scene().get(id).unwrap().material.kind,
            MaterialKind::Basic
        );

        inspector.apply_raw("geometry", "ConeGeometry").unwrap();
        inspector.apply_raw("geometry", "TorusKnotGeometry").unwrap();
        assert_eq!(
            inspector.scene().get(id).unwrap().geometry.kind(),
            GeometryKind::Box
        );

        assert!(inspector.apply_raw("opacity", "opaque").is_err());
    }

    #[test]
    fn color_edit_while_hovered_survives_unhover() {
        let (mut inspector, id) = inspector_with_box();
        inspector.pointer_click(Some(id));
        inspector.pointer_hover(Some(id));
        inspector.apply_raw("color", "#ff0000").unwrap();

        let red = Color::from_hex("#ff0000").unwrap();
        assert_eq!(
            inspector.scene().get(id).unwrap().material.color,
            red.scaled(HIGHLIGHT_FACTOR)
        );
        inspector.pointer_hover(None);
        assert_eq!(inspector.scene().get(id).unwrap().material.color, red);
    }

    #[test]
    fn color_edit_matching_the_darkened_value_survives_unhover() {
        let (mut inspector, id) = inspector_with_box();
        inspector.pointer_click(Some(id));
        inspector.pointer_hover(Some(id));
        assert_eq!(
            inspector.scene().get(id).unwrap().material.color.to_hex(),
            "#cccccc"
        );

        inspector.apply_raw("color", "#cccccc").unwrap();
        inspector.pointer_hover(None);
        assert_eq!(
            inspector.scene().get(id).unwrap().material.color.to_hex(),
            "#cccccc"
        );
    }

    #[test]
    fn export_ignores_hover_darkening() {
        let (mut inspector, id) = inspector_with_box();
        inspector.pointer_click(Some(id));
        inspector.apply_raw("color", "#ff0000").unwrap();
        let plain = inspector.export().unwrap();

        inspector.pointer_hover(Some(id));
        assert_eq!(inspector.export().unwrap(), plain);
    }

    #[test]
    fn import_replaces_scene_and_resets_selection() {
        let (mut inspector, id) = inspector_with_box();
        inspector.pointer_click(Some(id));
        inspector.pointer_hover(Some(id));

        let mut imported = SceneGraph::new();
        imported.add(SceneNode::new(
            GeometryKind::Sphere.descriptor(),
            MaterialDescriptor::default(),
        ));
        inspector.import(imported);

        assert_eq!(inspector.scene().len(), 1);
        assert!(!inspector.scene().contains(id));
        assert!(inspector.tracker().selected().is_none());
        assert!(inspector.tracker().highlighted().is_none());
    }

    #[test]
    fn local_export_and_project_roundtrip() {
        let dir = temp_dir("roundtrip");
        let mut inspector = Inspector::new(SinkRouter::new(&dir));
        let id = inspector.add_node(
            SceneNode::new(GeometryKind::Cone.descriptor(), MaterialDescriptor::default())
                .with_name("Marker"),
        );
        inspector.pointer_click(Some(id));
        inspector.apply_raw("size", "3").unwrap();

        let outcome = inspector.run_command(SceneCommand::Export {
            target: ExportTarget::Local(None),
        });
        assert!(matches!(outcome, CommandOutcome::Message(msg) if msg.contains("scene.glb")));
        assert!(dir.join(ExportKind::Glb.default_file_name()).exists());

        let project = dir.join("project.json");
        assert!(matches!(
            inspector.run_command(SceneCommand::SaveProject {
                path: project.clone()
            }),
            CommandOutcome::None
        ));
        inspector.import(SceneGraph::new());
        inspector.run_command(SceneCommand::LoadProject { path: project });
        assert_eq!(inspector.scene().get(id).unwrap().transform.scale, [3.0; 3]);

        inspector.run_command(SceneCommand::ImportGltf {
            path: dir.join("scene.glb"),
        });
        assert_eq!(inspector.scene().node_names(), vec!["Marker"]);
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn remote_export_without_store_reports_failure() {
        let (inspector, _) = inspector_with_box();
        assert!(matches!(
            inspector.export_to(ExportTarget::Remote),
            Err(InspectorError::Delivery(DeliveryError::NoRemote))
        ));
    }

    #[test]
    fn remote_export_through_configured_store() {
        let root = temp_dir("remote");
        let config = InspectorConfig {
            export_dir: root.join("local"),
            remote_root: root.join("bucket"),
            upload_chunk_size: 64,
            ..Default::default()
        };
        let mut inspector = Inspector::from_config(&config).unwrap();
        inspector.add_node(SceneNode::new(
            GeometryKind::Sphere.descriptor(),
            MaterialDescriptor::default(),
        ));

        let Ok(Delivery::Uploading(task)) = inspector.export_to(ExportTarget::Remote) else {
            panic!("expected an upload");
        };
        let path = task.path().to_string();
        assert_eq!(inspector.wait_for_upload(task), UploadOutcome::Succeeded);
        assert!(root.join("bucket").join(&path).exists());

        let events = inspector.drain_upload_events();
        assert!(events.len() > 1);
        assert_eq!(
            events.last(),
            Some(&UploadEvent::Succeeded { path: path.clone() })
        );
        let _ = std::fs::remove_dir_all(root);
    }
}
