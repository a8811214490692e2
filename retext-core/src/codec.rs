use async_trait::async_trait;

use crate::buffer::DocumentBuffer;
use crate::config::ReinsertOptions;
use crate::error::EditorError;
use crate::geometry::{NativePoint, PageGeometry};
use crate::run::{TextRecord, TextRun};

/// One page as decoded for display: its box and text records.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedPage {
    pub page_index: usize,
    pub page_count: usize,
    pub native_width: f32,
    pub native_height: f32,
    /// Lower-left corner of the page box.
    pub origin: NativePoint,
    pub records: Vec<TextRecord>,
}

impl DecodedPage {
    pub fn geometry(&self, scale: f32) -> PageGeometry {
        PageGeometry::new(self.native_width, self.native_height, scale).with_origin(self.origin)
    }
}

#[derive(Debug, Clone)]
pub struct ReinsertionRequest {
    pub page_index: usize,
    /// Runs to draw; the codec orders them by `TextRun::order`.
    pub runs: Vec<TextRun>,
    pub options: ReinsertOptions,
}

/// Decode/encode capability for one document format. Implementations take
/// the bytes out of the buffers they are given, leaving them detached.
#[async_trait]
pub trait DocumentCodec: Send + Sync {
    async fn decode_page(
        &self,
        buffer: &mut DocumentBuffer,
        page_index: usize,
    ) -> Result<DecodedPage, EditorError>;

    async fn encode(
        &self,
        buffer: &mut DocumentBuffer,
        request: &ReinsertionRequest,
    ) -> Result<Vec<u8>, EditorError>;
}

#[derive(Debug, Clone)]
pub struct RenderImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub image: RenderImage,
    pub native_width: f32,
    pub native_height: f32,
}

/// Raster collaborator. The editor core only reads the native dimensions.
pub trait PageRenderer: Send + Sync {
    fn render(
        &self,
        buffer: &mut DocumentBuffer,
        page_index: usize,
        scale: f32,
    ) -> Result<RenderedPage, EditorError>;
}
