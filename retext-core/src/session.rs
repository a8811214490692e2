use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, instrument};

use crate::buffer::{BufferGuard, DocumentId, DocumentSnapshot};
use crate::codec::{DocumentCodec, ReinsertionRequest};
use crate::config::EditorConfig;
use crate::error::EditorError;
use crate::extract::extract_runs;
use crate::geometry::{NativePoint, PageGeometry};
use crate::overlay::OverlayStore;
use crate::run::{RunId, TextRun};

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    DocumentLoaded(DocumentId),
    PageChanged { page: usize },
    RedrawNeeded,
    Saved(DocumentId),
    ResultDiscarded { generation: u64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PageSummary {
    pub document: DocumentId,
    pub page_index: usize,
    pub page_count: usize,
    pub runs: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    Loaded(PageSummary),
    /// A newer load or page change started while this one was decoding.
    Superseded,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SavedDocument {
    pub document: DocumentId,
    pub file_name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    Saved(SavedDocument),
    Superseded,
}

struct SessionState {
    load_generation: u64,
    view_generation: u64,
    guard: BufferGuard,
    source_name: Option<String>,
    store: Option<OverlayStore>,
    page_index: usize,
    scale: f32,
    save_in_flight: bool,
}

/// One open document: its snapshot, the current page's run set and the
/// bookkeeping that keeps async loads and saves from overlapping.
pub struct EditorSession {
    codec: Arc<dyn DocumentCodec>,
    config: EditorConfig,
    state: Mutex<SessionState>,
    events: Arc<Mutex<Vec<SessionEvent>>>,
}

impl EditorSession {
    pub fn new(codec: Arc<dyn DocumentCodec>, config: EditorConfig) -> Self {
        let scale = config.scale.clamp(config.scale.initial);
        Self {
            codec,
            config,
            state: Mutex::new(SessionState {
                load_generation: 0,
                view_generation: 0,
                guard: BufferGuard::new(),
                source_name: None,
                store: None,
                page_index: 0,
                scale,
                save_in_flight: false,
            }),
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn events(&self) -> Arc<Mutex<Vec<SessionEvent>>> {
        Arc::clone(&self.events)
    }

    fn push_event(&self, event: SessionEvent) {
        self.events.lock().push(event);
    }

    /// Validates and decodes `bytes`, replacing the current document on
    /// success. On failure the previous document and runs stay as they were.
    #[instrument(skip(self, bytes), fields(bytes = bytes.len()))]
    pub async fn load(&self, name: &str, bytes: &[u8]) -> Result<LoadOutcome, EditorError> {
        let snapshot = DocumentSnapshot::capture(bytes)?;
        let (generation, scale) = {
            let mut state = self.state.lock();
            state.load_generation += 1;
            state.view_generation += 1;
            (state.load_generation, state.scale)
        };

        let mut buffer = snapshot.clone_for_use();
        let decoded = self.codec.decode_page(&mut buffer, 0).await;

        let mut state = self.state.lock();
        if state.load_generation != generation {
            debug!(generation, current = state.load_generation, "discarding stale load");
            self.push_event(SessionEvent::ResultDiscarded { generation });
            return Ok(LoadOutcome::Superseded);
        }
        let page = decoded?;
        let geometry = page.geometry(scale);
        let extraction = extract_runs(page.records, geometry, &self.config.default_style());
        let document = state.guard.install(snapshot, page.page_count)?.id();
        let summary = PageSummary {
            document,
            page_index: 0,
            page_count: page.page_count,
            runs: extraction.runs.len(),
        };
        state.store = Some(OverlayStore::new(extraction));
        state.page_index = 0;
        state.source_name = Some(name.to_owned());
        // Page decodes started against the previous snapshot are now stale.
        state.view_generation += 1;
        drop(state);

        info!(%document, page_count = summary.page_count, runs = summary.runs, "document loaded");
        self.push_event(SessionEvent::DocumentLoaded(document));
        Ok(LoadOutcome::Loaded(summary))
    }

    /// Discards the current run set and extracts `page_index` from a fresh
    /// clone of the snapshot. The result is dropped if another page change
    /// or a load lands first.
    #[instrument(skip(self))]
    pub async fn goto_page(&self, page_index: usize) -> Result<LoadOutcome, EditorError> {
        let (generation, document, mut buffer, scale) = {
            let mut state = self.state.lock();
            let page_count = state
                .guard
                .snapshot()
                .map(DocumentSnapshot::page_count)
                .ok_or(EditorError::NoDocument)?;
            if page_index >= page_count {
                return Err(EditorError::PageOutOfRange {
                    page: page_index,
                    page_count,
                });
            }
            let document = state.guard.snapshot().map(DocumentSnapshot::id);
            let buffer = state.guard.clone_for_use()?;
            state.view_generation += 1;
            (state.view_generation, document, buffer, state.scale)
        };

        let decoded = self.codec.decode_page(&mut buffer, page_index).await;

        let mut state = self.state.lock();
        let current = state.guard.snapshot().map(DocumentSnapshot::id);
        if state.view_generation != generation || current != document {
            debug!(generation, current = state.view_generation, "discarding stale page decode");
            self.push_event(SessionEvent::ResultDiscarded { generation });
            return Ok(LoadOutcome::Superseded);
        }
        let page = decoded?;
        let geometry = page.geometry(scale);
        let extraction = extract_runs(page.records, geometry, &self.config.default_style());
        let document = document.ok_or(EditorError::NoDocument)?;
        let summary = PageSummary {
            document,
            page_index,
            page_count: page.page_count,
            runs: extraction.runs.len(),
        };
        state.store = Some(OverlayStore::new(extraction));
        state.page_index = page_index;
        drop(state);

        self.push_event(SessionEvent::PageChanged { page: page_index });
        Ok(LoadOutcome::Loaded(summary))
    }

    /// Clamps `scale` to the configured bounds and re-derives viewport fields.
    pub fn set_scale(&self, scale: f32) -> f32 {
        let scale = self.config.scale.clamp(scale);
        let mut state = self.state.lock();
        if (state.scale - scale).abs() > f32::EPSILON {
            state.scale = scale;
            if let Some(store) = state.store.as_mut() {
                store.rescale(scale);
            }
            drop(state);
            self.push_event(SessionEvent::RedrawNeeded);
        }
        scale
    }

    pub fn scale(&self) -> f32 {
        self.state.lock().scale
    }

    pub fn page_index(&self) -> usize {
        self.state.lock().page_index
    }

    pub fn page_count(&self) -> Option<usize> {
        self.state
            .lock()
            .guard
            .snapshot()
            .map(DocumentSnapshot::page_count)
    }

    pub fn document_id(&self) -> Option<DocumentId> {
        self.state.lock().guard.snapshot().map(DocumentSnapshot::id)
    }

    pub fn geometry(&self) -> Result<PageGeometry, EditorError> {
        self.with_store(|store| Ok(store.geometry()))
    }

    /// Current runs in draw order.
    pub fn runs(&self) -> Result<Vec<TextRun>, EditorError> {
        self.with_store(|store| Ok(store.draw_order()))
    }

    fn with_store<R>(
        &self,
        f: impl FnOnce(&OverlayStore) -> Result<R, EditorError>,
    ) -> Result<R, EditorError> {
        let state = self.state.lock();
        let store = state.store.as_ref().ok_or(EditorError::NoDocument)?;
        f(store)
    }

    /// Runs a synchronous edit against the current page's run set.
    pub fn edit<R>(
        &self,
        f: impl FnOnce(&mut OverlayStore) -> Result<R, EditorError>,
    ) -> Result<R, EditorError> {
        let mut state = self.state.lock();
        let store = state.store.as_mut().ok_or(EditorError::NoDocument)?;
        let result = f(store)?;
        drop(state);
        self.push_event(SessionEvent::RedrawNeeded);
        Ok(result)
    }

    pub fn add_run(&self, content: &str, position: NativePoint) -> Result<RunId, EditorError> {
        let style = self.config.default_style();
        self.edit(|store| Ok(store.add_run(content, position, style)))
    }

    /// Produces new document bytes for the current page. Only one save runs at
    /// a time; a concurrent request is rejected with `SaveInProgress`. A load
    /// or page change that lands mid-save supersedes it.
    #[instrument(skip(self))]
    pub async fn save(&self) -> Result<SaveOutcome, EditorError> {
        let (generations, mut buffer, request, document, source_name) = {
            let mut state = self.state.lock();
            if state.save_in_flight {
                return Err(EditorError::SaveInProgress);
            }
            let buffer = state.guard.clone_for_use()?;
            let store = state.store.as_ref().ok_or(EditorError::NoDocument)?;
            let request = ReinsertionRequest {
                page_index: state.page_index,
                runs: store.draw_order(),
                options: self.config.reinsert_options(),
            };
            let document = state
                .guard
                .snapshot()
                .map(DocumentSnapshot::id)
                .ok_or(EditorError::NoDocument)?;
            state.save_in_flight = true;
            (
                (state.load_generation, state.view_generation),
                buffer,
                request,
                document,
                state.source_name.clone(),
            )
        };

        let slot = SaveSlot { state: &self.state };
        let encoded = self.codec.encode(&mut buffer, &request).await;
        drop(slot);

        let current = {
            let state = self.state.lock();
            (state.load_generation, state.view_generation)
        };
        if current != generations {
            let (generation, _) = generations;
            debug!(generation, "discarding save of replaced page");
            self.push_event(SessionEvent::ResultDiscarded { generation });
            return Ok(SaveOutcome::Superseded);
        }
        let bytes = encoded?;
        info!(%document, bytes = bytes.len(), runs = request.runs.len(), "document saved");
        self.push_event(SessionEvent::Saved(document));
        Ok(SaveOutcome::Saved(SavedDocument {
            document,
            file_name: edited_file_name(source_name.as_deref()),
            bytes,
        }))
    }
}

/// Releases the save slot even when the save future is dropped mid-flight.
struct SaveSlot<'a> {
    state: &'a Mutex<SessionState>,
}

impl Drop for SaveSlot<'_> {
    fn drop(&mut self) {
        self.state.lock().save_in_flight = false;
    }
}

pub fn edited_file_name(source: Option<&str>) -> String {
    let stem = source
        .map(Path::new)
        .and_then(|path| path.file_stem())
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.is_empty());
    match stem {
        Some(stem) => format!("{stem}-edited.pdf"),
        None => "modified-document.pdf".to_owned(),
    }
}
