//! Background remote upload.
//!
//! An upload runs on the IO runtime and is never awaited by the caller. It
//! writes the payload in chunks, reports a progress event after each chunk
//! and finishes with exactly one `Succeeded` or `Failed` event. Failures are
//! logged and not retried.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio::runtime::Handle as TokioHandle;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

use super::DeliveryError;
use crate::export::ExportKind;

pub const DEFAULT_CHUNK_SIZE: usize = 256 * 1024;
pub const DEFAULT_PREFIX: &str = "models/glb";

/// `<prefix>/<epoch-ms>_scene.<glb|gltf>`
pub fn remote_object_path(prefix: &str, epoch_ms: i64, kind: ExportKind) -> String {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        format!("{epoch_ms}_scene.{}", kind.extension())
    } else {
        format!("{prefix}/{epoch_ms}_scene.{}", kind.extension())
    }
}

/// Destination bucket for resumable uploads.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Writes `chunk` at `offset` of the pending object at `path`.
    async fn write_chunk(
        &self,
        path: &str,
        offset: u64,
        chunk: &[u8],
    ) -> Result<(), DeliveryError>;

    /// Publishes the pending object.
    async fn finish(&self, path: &str, content_type: &str) -> Result<(), DeliveryError>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    /// Set once the object is published.
    pub content_type: Option<String>,
}

/// In-process store, mostly for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: Mutex<HashMap<String, StoredObject>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str) -> Option<StoredObject> {
        self.objects.lock().ok()?.get(path).cloned()
    }

    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self
            .objects
            .lock()
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default();
        paths.sort();
        paths
    }
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> DeliveryError {
    DeliveryError::Remote("memory store lock poisoned".to_string())
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn write_chunk(
        &self,
        path: &str,
        offset: u64,
        chunk: &[u8],
    ) -> Result<(), DeliveryError> {
        let mut objects = self.objects.lock().map_err(poisoned)?;
        let object = objects.entry(path.to_string()).or_default();
        if offset == 0 {
            // A new upload to an existing key replaces the object.
            *object = StoredObject::default();
        }
        if offset != object.bytes.len() as u64 {
            return Err(DeliveryError::Remote(format!(
                "chunk for {path} starts at {offset}, expected {}",
                object.bytes.len()
            )));
        }
        object.bytes.extend_from_slice(chunk);
        Ok(())
    }

    async fn finish(&self, path: &str, content_type: &str) -> Result<(), DeliveryError> {
        let mut objects = self.objects.lock().map_err(poisoned)?;
        let object = objects
            .get_mut(path)
            .ok_or_else(|| DeliveryError::Remote(format!("nothing uploaded to {path}")))?;
        object.content_type = Some(content_type.to_string());
        Ok(())
    }
}

/// Stores objects as files below `root`. Chunks go to `<path>.part`, which is
/// renamed into place on finish.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, DeliveryError> {
        let relative = Path::new(path);
        let is_plain = !path.is_empty()
            && relative
                .components()
                .all(|component| matches!(component, Component::Normal(_)));
        if !is_plain {
            return Err(DeliveryError::RejectedPath(path.to_string()));
        }
        Ok(self.root.join(relative))
    }

    fn part_path(target: &Path) -> PathBuf {
        let mut part = target.as_os_str().to_owned();
        part.push(".part");
        PathBuf::from(part)
    }
}

#[async_trait]
impl RemoteStore for DirectoryStore {
    async fn write_chunk(
        &self,
        path: &str,
        offset: u64,
        chunk: &[u8],
    ) -> Result<(), DeliveryError> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let part = Self::part_path(&target);
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(offset == 0)
            .open(&part)
            .await?;
        file.seek(std::io::SeekFrom::Start(offset)).await?;
        file.write_all(chunk).await?;
        file.flush().await?;
        Ok(())
    }

    async fn finish(&self, path: &str, content_type: &str) -> Result<(), DeliveryError> {
        let target = self.resolve(path)?;
        tokio::fs::rename(Self::part_path(&target), &target).await?;
        log::debug!("Published {} ({})", target.display(), content_type);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadEvent {
    Progress {
        path: String,
        bytes_transferred: u64,
        total_bytes: u64,
    },
    Succeeded {
        path: String,
    },
    Failed {
        path: String,
        reason: String,
    },
}

impl UploadEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, UploadEvent::Progress { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Succeeded,
    Failed(String),
}

/// Handle on an in-flight upload. Dropping it does not cancel the upload.
#[derive(Debug)]
pub struct UploadTask {
    path: String,
    handle: JoinHandle<UploadOutcome>,
}

impl UploadTask {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub async fn join(self) -> UploadOutcome {
        match self.handle.await {
            Ok(outcome) => outcome,
            Err(err) => UploadOutcome::Failed(format!("upload task aborted: {err}")),
        }
    }
}

#[derive(Clone)]
pub struct RemoteUploader {
    store: Arc<dyn RemoteStore>,
    io: TokioHandle,
    chunk_size: usize,
    prefix: String,
    listener: Option<UnboundedSender<UploadEvent>>,
    last_stamp: Arc<AtomicI64>,
}

impl RemoteUploader {
    pub fn new(store: Arc<dyn RemoteStore>, io: TokioHandle) -> Self {
        Self {
            store,
            io,
            chunk_size: DEFAULT_CHUNK_SIZE,
            prefix: DEFAULT_PREFIX.to_string(),
            listener: None,
            last_stamp: Arc::new(AtomicI64::new(i64::MIN)),
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_listener(mut self, listener: UnboundedSender<UploadEvent>) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Fresh object path stamped with the current wall clock. Stamps issued by
    /// one uploader (and its clones) strictly increase, so two exports in the
    /// same millisecond still get distinct paths.
    pub fn object_path(&self, kind: ExportKind) -> String {
        remote_object_path(&self.prefix, self.next_stamp(), kind)
    }

    fn next_stamp(&self) -> i64 {
        let now = chrono::Utc::now().timestamp_millis();
        let previous = self
            .last_stamp
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last.saturating_add(1)))
            })
            .unwrap_or(now);
        now.max(previous.saturating_add(1))
    }

    /// Starts the upload on the IO runtime and returns immediately.
    pub fn upload(&self, path: String, bytes: Vec<u8>, content_type: &'static str) -> UploadTask {
        let store = self.store.clone();
        let listener = self.listener.clone();
        let chunk_size = self.chunk_size;
        let task_path = path.clone();

        log::info!("Uploading {} ({} bytes)", path, bytes.len());
        let handle = self.io.spawn(async move {
            let emit = |event: UploadEvent| {
                if let Some(listener) = &listener {
                    let _ = listener.send(event);
                }
            };

            let total_bytes = bytes.len() as u64;
            let progress = |sent: u64| {
                emit(UploadEvent::Progress {
                    path: path.clone(),
                    bytes_transferred: sent,
                    total_bytes,
                })
            };
            let store = store.as_ref();
            let result =
                send_chunks(store, &path, &bytes, chunk_size, content_type, progress).await;

            match result {
                Ok(()) => {
                    log::info!("Upload of {} finished", path);
                    emit(UploadEvent::Succeeded { path });
                    UploadOutcome::Succeeded
                }
                Err(err) => {
                    let reason = err.to_string();
                    log::error!("Upload of {} failed: {}", path, reason);
                    emit(UploadEvent::Failed {
                        path,
                        reason: reason.clone(),
                    });
                    UploadOutcome::Failed(reason)
                }
            }
        });

        UploadTask {
            path: task_path,
            handle,
        }
    }
}

async fn send_chunks(
    store: &dyn RemoteStore,
    path: &str,
    bytes: &[u8],
    chunk_size: usize,
    content_type: &str,
    mut on_progress: impl FnMut(u64),
) -> Result<(), DeliveryError> {
    let mut sent = 0u64;
    if bytes.is_empty() {
        store.write_chunk(path, 0, &[]).await?;
        on_progress(0);
    }
    for chunk in bytes.chunks(chunk_size) {
        store.write_chunk(path, sent, chunk).await?;
        sent += chunk.len() as u64;
        log::debug!("Uploaded {}/{} bytes of {}", sent, bytes.len(), path);
        on_progress(sent);
    }
    store.finish(path, content_type).await
}
