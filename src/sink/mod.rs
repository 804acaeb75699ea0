pub mod remote;

use std::path::{Path, PathBuf};

use crate::export::{ExportBuffer, ExportKind};
use remote::{RemoteUploader, UploadTask};

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("remote store error: {0}")]
    Remote(String),
    #[error("path '{0}' is not a plain relative object path")]
    RejectedPath(String),
    #[error("no remote store is configured")]
    NoRemote,
}

pub type Result<T> = std::result::Result<T, DeliveryError>;

/// Where an export goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sink {
    /// A file name; relative names resolve against the export directory.
    LocalSave(PathBuf),
    /// A remote object path, see [`remote::remote_object_path`].
    RemoteUpload(String),
}

impl Sink {
    /// `scene.glb` / `scene.gltf` in the export directory.
    pub fn default_local(kind: ExportKind) -> Self {
        Sink::LocalSave(PathBuf::from(kind.default_file_name()))
    }

    /// Asks the user for a destination. `None` when the dialog is cancelled.
    #[cfg(feature = "dialog")]
    pub fn pick_local(kind: ExportKind) -> Option<Self> {
        rfd::FileDialog::new()
            .add_filter("glTF", &[kind.extension()])
            .set_file_name(kind.default_file_name())
            .save_file()
            .map(Sink::LocalSave)
    }
}

#[derive(Debug)]
pub enum Delivery {
    /// Written synchronously to this path.
    Saved(PathBuf),
    /// Upload started in the background.
    Uploading(UploadTask),
}

/// Routes export buffers to the local file system or the remote uploader.
pub struct SinkRouter {
    export_dir: PathBuf,
    remote: Option<RemoteUploader>,
}

impl SinkRouter {
    pub fn new(export_dir: impl Into<PathBuf>) -> Self {
        Self {
            export_dir: export_dir.into(),
            remote: None,
        }
    }

    pub fn with_remote(mut self, uploader: RemoteUploader) -> Self {
        self.remote = Some(uploader);
        self
    }

    pub fn export_dir(&self) -> &Path {
        &self.export_dir
    }

    pub fn remote(&self) -> Option<&RemoteUploader> {
        self.remote.as_ref()
    }

    /// Remote path for a new upload of `kind`, stamped with the current time.
    pub fn remote_sink(&self, kind: ExportKind) -> Result<Sink> {
        let uploader = self.remote.as_ref().ok_or(DeliveryError::NoRemote)?;
        Ok(Sink::RemoteUpload(uploader.object_path(kind)))
    }

    /// Local saves finish before returning. Remote uploads return as soon as
    /// the background task is spawned; their result arrives through the
    /// uploader's events and the returned task.
    pub fn deliver(&self, buffer: &ExportBuffer, sink: Sink) -> Result<Delivery> {
        match sink {
            Sink::LocalSave(name) => {
                let path = if name.is_absolute() {
                    name
                } else {
                    self.export_dir.join(name)
                };
                save_local(buffer, &path)?;
                Ok(Delivery::Saved(path))
            }
            Sink::RemoteUpload(path) => {
                let uploader = self.remote.as_ref().ok_or(DeliveryError::NoRemote)?;
                let task = uploader.upload(path, buffer.as_bytes().to_vec(), buffer.content_type());
                Ok(Delivery::Uploading(task))
            }
        }
    }
}

fn save_local(buffer: &ExportBuffer, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, buffer.as_bytes())?;
    log::info!(
        "Saved {} ({} bytes, {})",
        path.display(),
        buffer.len(),
        buffer.content_type()
    );
    Ok(())
}
