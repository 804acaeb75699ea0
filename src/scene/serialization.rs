use crate::scene::{GraphError, SceneGraph};
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum SerializationError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid scene graph: {0}")]
    Graph(#[from] GraphError),
}

pub type Result<T> = std::result::Result<T, SerializationError>;

/// Writes a project snapshot of the whole graph as pretty JSON.
pub fn save_scene_to_file(scene: &SceneGraph, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(scene)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, json)?;
    log::info!("Saved project snapshot to {}", path.display());
    Ok(())
}

pub fn load_scene_from_file(path: &Path) -> Result<SceneGraph> {
    let json = std::fs::read_to_string(path)?;
    let scene: SceneGraph = serde_json::from_str(&json)?;
    scene.validate()?;
    log::info!(
        "Loaded project snapshot {} ({} nodes)",
        path.display(),
        scene.len()
    );
    Ok(scene)
}
