use async_trait::async_trait;
use lopdf::{Document, ObjectId};
use rayon::prelude::*;
use retext_core::signature;
use retext_core::{
    DecodedPage, DocumentBuffer, DocumentCodec, EditorError, NativePoint, ReinsertionRequest,
};
use tracing::{debug, instrument};

use crate::content;
use crate::objects::{self, decode_err};
use crate::serializer;

/// Stateless lopdf-backed codec. Every call parses its own copy of the bytes.
#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfCodec;

impl LopdfCodec {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DocumentCodec for LopdfCodec {
    #[instrument(skip(self, buffer))]
    async fn decode_page(
        &self,
        buffer: &mut DocumentBuffer,
        page_index: usize,
    ) -> Result<DecodedPage, EditorError> {
        let bytes = buffer.take()?;
        decode_page_bytes(&bytes, page_index)
    }

    #[instrument(skip(self, buffer, request), fields(page = request.page_index))]
    async fn encode(
        &self,
        buffer: &mut DocumentBuffer,
        request: &ReinsertionRequest,
    ) -> Result<Vec<u8>, EditorError> {
        let bytes = buffer.take()?;
        serializer::reinsert(&bytes, request)
    }
}

fn load(bytes: &[u8]) -> Result<Document, EditorError> {
    signature::validate(bytes)?;
    Document::load_mem(bytes).map_err(|err| decode_err("failed to parse document", err))
}

fn decode_loaded(
    doc: &Document,
    page_id: ObjectId,
    page_index: usize,
    page_count: usize,
) -> Result<DecodedPage, EditorError> {
    let bounds = objects::media_box(doc, page_id);
    let records = content::page_records(doc, page_id)?;
    Ok(DecodedPage {
        page_index,
        page_count,
        native_width: bounds.width,
        native_height: bounds.height,
        origin: NativePoint::new(bounds.x0, bounds.y0),
        records,
    })
}

pub fn decode_page_bytes(bytes: &[u8], page_index: usize) -> Result<DecodedPage, EditorError> {
    let doc = load(bytes)?;
    let page_count = doc.get_pages().len();
    let page_id = objects::page_id(&doc, page_index)?;
    decode_loaded(&doc, page_id, page_index, page_count)
}

/// Decodes every page. Pages are split into one chunk per rayon worker and
/// each chunk parses its own copy of the document.
pub fn decode_all_pages(bytes: &[u8]) -> Result<Vec<DecodedPage>, EditorError> {
    let page_count = load(bytes)?.get_pages().len();
    if page_count == 0 {
        return Err(EditorError::EmptyDocument);
    }
    let chunk = page_count.div_ceil(rayon::current_num_threads().max(1));
    let indices: Vec<usize> = (0..page_count).collect();

    let chunks: Vec<Vec<DecodedPage>> = indices
        .par_chunks(chunk)
        .map(|chunk| {
            let doc = load(bytes)?;
            let page_ids = objects::page_ids(&doc);
            chunk
                .iter()
                .map(|&index| decode_loaded(&doc, page_ids[index], index, page_count))
                .collect::<Result<Vec<_>, _>>()
        })
        .collect::<Result<_, _>>()?;

    debug!(page_count, chunks = chunks.len(), "decoded all pages");
    Ok(chunks.into_iter().flatten().collect())
}
