//! Document-format independent pieces of the text editor: run extraction,
//! native/viewport coordinate mapping, the editable overlay and the session
//! that ties loading and saving together.

pub mod buffer;
pub mod codec;
pub mod config;
pub mod error;
pub mod extract;
pub mod geometry;
pub mod overlay;
pub mod run;
pub mod session;
pub mod signature;
pub mod viewport;

pub use buffer::{document_id_for_bytes, BufferGuard, DocumentBuffer, DocumentId, DocumentSnapshot};
pub use codec::{DecodedPage, DocumentCodec, PageRenderer, ReinsertionRequest, RenderImage, RenderedPage};
pub use config::{DrawFailurePolicy, EditorConfig, ReinsertOptions, ReinsertionPolicy, ScaleConfig};
pub use error::{EditorError, EditorResult};
pub use extract::{extract_runs, Extraction};
pub use geometry::{
    NativeDelta, NativePoint, PageGeometry, Rgb, Transform, ViewportDelta, ViewportPoint,
};
pub use overlay::{MoveGesture, OverlayStore, StyleChange};
pub use run::{RunId, RunStyle, TextRecord, TextRun};
pub use session::{
    edited_file_name, EditorSession, LoadOutcome, PageSummary, SaveOutcome, SavedDocument,
    SessionEvent,
};
pub use signature::{Signature, PDF_MAGIC};
