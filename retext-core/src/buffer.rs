use std::sync::Arc;

use once_cell::sync::Lazy;
use tracing::debug;
use uuid::Uuid;

use crate::error::EditorError;
use crate::signature::{self, Signature};

pub type DocumentId = Uuid;

static DOCUMENT_NAMESPACE: Lazy<Uuid> = Lazy::new(|| {
    Uuid::parse_str("2f0c1f4e-5d8b-5b0e-9a57-3c1d6e0a4b21").expect("valid namespace UUID")
});

/// Content-derived id: the same bytes always map to the same document.
pub fn document_id_for_bytes(bytes: &[u8]) -> DocumentId {
    Uuid::new_v5(&DOCUMENT_NAMESPACE, bytes)
}

/// An owned copy of the document bytes handed to one consuming operation.
/// Once taken, the buffer is detached and cannot be read again.
#[derive(Debug)]
pub struct DocumentBuffer {
    bytes: Option<Vec<u8>>,
}

impl DocumentBuffer {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes: Some(bytes) }
    }

    pub fn as_bytes(&self) -> Result<&[u8], EditorError> {
        self.bytes.as_deref().ok_or(EditorError::DetachedBuffer)
    }

    pub fn take(&mut self) -> Result<Vec<u8>, EditorError> {
        self.bytes.take().ok_or(EditorError::DetachedBuffer)
    }

    pub fn is_detached(&self) -> bool {
        self.bytes.is_none()
    }
}

/// The authoritative original bytes of one loaded document. Immutable.
#[derive(Debug, Clone)]
pub struct DocumentSnapshot {
    id: DocumentId,
    bytes: Arc<[u8]>,
    signature: Signature,
    page_count: usize,
}

impl DocumentSnapshot {
    /// Validates `bytes` and keeps a private copy. The page count is unknown
    /// until the first decode and starts at zero.
    pub fn capture(bytes: &[u8]) -> Result<Self, EditorError> {
        let signature = signature::validate(bytes)?;
        Ok(Self {
            id: document_id_for_bytes(bytes),
            bytes: Arc::from(bytes),
            signature,
            page_count: 0,
        })
    }

    pub fn id(&self) -> DocumentId {
        self.id
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn clone_for_use(&self) -> DocumentBuffer {
        DocumentBuffer::new(self.bytes.to_vec())
    }
}

/// Sole owner of the current [`DocumentSnapshot`]. Never lends the
/// authoritative bytes out; every consumer gets its own clone.
#[derive(Debug, Default)]
pub struct BufferGuard {
    snapshot: Option<DocumentSnapshot>,
}

impl BufferGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&mut self, bytes: &[u8], page_count: usize) -> Result<&DocumentSnapshot, EditorError> {
        let snapshot = DocumentSnapshot::capture(bytes)?;
        self.install(snapshot, page_count)
    }

    /// Replaces any previous snapshot wholesale.
    pub fn install(
        &mut self,
        mut snapshot: DocumentSnapshot,
        page_count: usize,
    ) -> Result<&DocumentSnapshot, EditorError> {
        if page_count == 0 {
            return Err(EditorError::EmptyDocument);
        }
        snapshot.page_count = page_count;
        debug!(id = %snapshot.id, bytes = snapshot.len(), page_count, "installed document snapshot");
        Ok(self.snapshot.insert(snapshot))
    }

    pub fn snapshot(&self) -> Option<&DocumentSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn clone_for_use(&self) -> Result<DocumentBuffer, EditorError> {
        self.snapshot
            .as_ref()
            .map(DocumentSnapshot::clone_for_use)
            .ok_or(EditorError::NoDocument)
    }

    pub fn clear(&mut self) {
        self.snapshot = None;
    }
}
