//! Uploaded identity documents and their preview handles.
//!
//! A preview is a URI that stays valid while its handle is alive. The handle is
//! owned by exactly one `UploadedDocument`; dropping the document releases the
//! preview, so a preview can neither leak nor be released twice.

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::errors::{AppError, ResultExt};
use crate::http_client::FormPayload;

const PREVIEW_SCHEME: &str = "blob:preview/";

/// Issues and tracks preview URIs.
#[derive(Debug, Default)]
pub struct PreviewRegistry {
    live: Mutex<HashSet<Uuid>>,
}

impl PreviewRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Creates a preview owned by the returned handle.
    pub fn create(registry: &Arc<Self>) -> PreviewHandle {
        let id = Uuid::new_v4();
        registry.lock().insert(id);
        PreviewHandle {
            id,
            registry: Arc::clone(registry),
        }
    }

    /// Whether `uri` still resolves to a live preview.
    pub fn is_live(&self, uri: &str) -> bool {
        uri.strip_prefix(PREVIEW_SCHEME)
            .and_then(|id| Uuid::parse_str(id).ok())
            .map(|id| self.lock().contains(&id))
            .unwrap_or(false)
    }

    pub fn live_count(&self) -> usize {
        self.lock().len()
    }

    fn revoke(&self, id: Uuid) {
        if !self.lock().remove(&id) {
            tracing::warn!("Preview {} was already released", id);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashSet<Uuid>> {
        self.live
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Exclusive owner of one preview URI; releases it on drop.
#[derive(Debug)]
pub struct PreviewHandle {
    id: Uuid,
    registry: Arc<PreviewRegistry>,
}

impl PreviewHandle {
    pub fn uri(&self) -> String {
        format!("{}{}", PREVIEW_SCHEME, self.id)
    }
}

impl Drop for PreviewHandle {
    fn drop(&mut self) {
        self.registry.revoke(self.id);
    }
}

/// A file selected for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl DocumentFile {
    pub fn new(file_name: impl Into<String>, content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }

    /// Reads a file from disk, guessing its content type from the extension.
    pub async fn from_path(path: &Path) -> Result<Self, AppError> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Reading {}", path.display()))?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());

        Ok(Self {
            content_type: content_type_for(&file_name),
            file_name,
            bytes,
        })
    }

    pub fn append_to(&self, form: &mut FormPayload, field_name: &str) {
        form.file(
            field_name,
            self.file_name.clone(),
            self.content_type.clone(),
            self.bytes.clone(),
        );
    }
}

fn content_type_for(file_name: &str) -> String {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .and_then(|ext| mime_guess::from_ext(ext).first())
        .map(|m| m.to_string())
        .unwrap_or_else(|| "application/octet-stream".to_string())
}

/// A selected file together with its preview.
#[derive(Debug)]
pub struct UploadedDocument {
    pub file: DocumentFile,
    preview: PreviewHandle,
}

impl UploadedDocument {
    pub fn preview_uri(&self) -> String {
        self.preview.uri()
    }
}

/// The ordered list of documents attached to a registration.
#[derive(Debug)]
pub struct DocumentSet {
    docs: Vec<UploadedDocument>,
    registry: Arc<PreviewRegistry>,
}

impl DocumentSet {
    pub fn new(registry: Arc<PreviewRegistry>) -> Self {
        Self {
            docs: Vec::new(),
            registry,
        }
    }

    /// Appends files in selection order, creating one preview per file.
    pub fn add_files(&mut self, files: impl IntoIterator<Item = DocumentFile>) {
        for file in files {
            let preview = PreviewRegistry::create(&self.registry);
            tracing::debug!("Attached {} as {}", file.file_name, preview.uri());
            self.docs.push(UploadedDocument { file, preview });
        }
    }

    /// Removes the document at `index`, releasing its preview.
    ///
    /// Returns `false` when the index is out of range.
    pub fn remove(&mut self, index: usize) -> bool {
        if index >= self.docs.len() {
            tracing::warn!(
                "Cannot remove document {}: only {} attached",
                index,
                self.docs.len()
            );
            return false;
        }
        drop(self.docs.remove(index));
        true
    }

    /// Drops every document and its preview.
    pub fn clear(&mut self) {
        self.docs.clear();
    }

    pub fn get(&self, index: usize) -> Option<&UploadedDocument> {
        self.docs.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &UploadedDocument> {
        self.docs.iter()
    }

    pub fn as_slice(&self) -> &[UploadedDocument] {
        &self.docs
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(name: &str) -> DocumentFile {
        DocumentFile::new(name, "image/jpeg", vec![0xFF, 0xD8])
    }

    #[test]
    fn removing_releases_only_that_preview() {
        let registry = PreviewRegistry::new();
        let mut docs = DocumentSet::new(Arc::clone(&registry));
        docs.add_files(vec![scan("a.jpg"), scan("b.jpg"), scan("c.jpg")]);

        let uris: Vec<String> = docs.iter().map(|d| d.preview_uri()).collect();
        assert_eq!(registry.live_count(), 3);

        assert!(docs.remove(1));

        assert!(registry.is_live(&uris[0]));
        assert!(!registry.is_live(&uris[1]));
        assert!(registry.is_live(&uris[2]));
        assert_eq!(registry.live_count(), 2);

        let names: Vec<&str> = docs.iter().map(|d| d.file.file_name.as_str()).collect();
        assert_eq!(names, vec!["a.jpg", "c.jpg"]);
        assert_eq!(docs.get(1).unwrap().preview_uri(), uris[2]);
    }

    #[test]
    fn out_of_range_removal_is_a_no_op() {
        let registry = PreviewRegistry::new();
        let mut docs = DocumentSet::new(Arc::clone(&registry));
        docs.add_files(vec![scan("a.jpg")]);

        assert!(!docs.remove(5));
        assert_eq!(docs.len(), 1);
        assert_eq!(registry.live_count(), 1);
    }

    #[test]
    fn clearing_releases_every_preview() {
        let registry = PreviewRegistry::new();
        let mut docs = DocumentSet::new(Arc::clone(&registry));
        docs.add_files(vec![scan("a.jpg"), scan("b.jpg")]);

        docs.clear();

        assert!(docs.is_empty());
        assert_eq!(registry.live_count(), 0);
    }

    #[test]
    fn content_type_follows_extension() {
        assert_eq!(content_type_for("passport.JPG"), "image/jpeg");
        assert_eq!(content_type_for("id.png"), "image/png");
        assert_eq!(content_type_for("scan.pdf"), "application/pdf");
        assert_eq!(content_type_for("scan.gif"), "image/gif");
        assert_eq!(content_type_for("README"), "application/octet-stream");
    }

    #[tokio::test]
    async fn from_path_reads_bytes_and_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("front.png");
        std::fs::write(&path, [1u8, 2, 3]).unwrap();

        let file = DocumentFile::from_path(&path).await.unwrap();
        assert_eq!(file.file_name, "front.png");
        assert_eq!(file.content_type, "image/png");
        assert_eq!(file.bytes, vec![1, 2, 3]);
    }
}
