//! Scene inspector core: property editing of scene nodes, hover highlight,
//! glTF / GLB export and delivery to local or remote sinks.

pub mod app;
pub mod config;
pub mod edit;
pub mod export;
pub mod import;
pub mod scene;
pub mod selection;
pub mod sink;

pub use app::{ExportTarget, Inspector, InspectorError};
pub use edit::{apply_property_change, EditError, PropertyIntent};
pub use export::{serialize, serialize_subtree, ExportBuffer, ExportKind, ExportOptions};
pub use scene::{NodeId, SceneGraph, SceneNode};
pub use selection::SelectionTracker;
pub use sink::{Delivery, Sink, SinkRouter};
