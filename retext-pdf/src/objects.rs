use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use retext_core::EditorError;

/// US Letter, used when a page carries no usable MediaBox.
pub const DEFAULT_PAGE_SIZE: (f32, f32) = (612.0, 792.0);

const MAX_REFERENCE_DEPTH: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MediaBox {
    pub x0: f32,
    pub y0: f32,
    pub width: f32,
    pub height: f32,
}

pub(crate) fn decode_err(context: &str, err: lopdf::Error) -> EditorError {
    EditorError::DecodeFailure(format!("{context}: {err}"))
}

pub(crate) fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r as f32),
        _ => None,
    }
}

/// Follows indirect references until a direct object is reached.
pub(crate) fn resolve<'a>(doc: &'a Document, mut obj: &'a Object) -> Option<&'a Object> {
    for _ in 0..MAX_REFERENCE_DEPTH {
        match obj {
            Object::Reference(id) => obj = doc.get_object(*id).ok()?,
            other => return Some(other),
        }
    }
    None
}

pub(crate) fn resolve_dict<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Dictionary> {
    resolve(doc, obj).and_then(|obj| obj.as_dict().ok())
}

/// Looks `key` up on the page, then up the `/Parent` chain.
pub(crate) fn inherited<'a>(doc: &'a Document, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut current = doc.get_dictionary(page_id).ok()?;
    for _ in 0..MAX_REFERENCE_DEPTH {
        if let Ok(value) = current.get(key) {
            return Some(value);
        }
        let parent = current.get(b"Parent").ok()?;
        current = resolve_dict(doc, parent)?;
    }
    None
}

pub fn page_ids(doc: &Document) -> Vec<ObjectId> {
    doc.get_pages().into_values().collect()
}

pub(crate) fn page_id(doc: &Document, page_index: usize) -> Result<ObjectId, EditorError> {
    let pages = page_ids(doc);
    if pages.is_empty() {
        return Err(EditorError::EmptyDocument);
    }
    pages
        .get(page_index)
        .copied()
        .ok_or(EditorError::PageOutOfRange {
            page: page_index,
            page_count: pages.len(),
        })
}

pub fn media_box(doc: &Document, page_id: ObjectId) -> MediaBox {
    let (width, height) = DEFAULT_PAGE_SIZE;
    let fallback = MediaBox {
        x0: 0.0,
        y0: 0.0,
        width,
        height,
    };
    let Some(array) = inherited(doc, page_id, b"MediaBox")
        .and_then(|obj| resolve(doc, obj))
        .and_then(|obj| obj.as_array().ok())
    else {
        return fallback;
    };
    let values: Vec<f32> = array
        .iter()
        .filter_map(|obj| resolve(doc, obj).and_then(number))
        .collect();
    match values.as_slice() {
        [x0, y0, x1, y1] if (x1 - x0).abs() > 0.0 && (y1 - y0).abs() > 0.0 => MediaBox {
            x0: x0.min(*x1),
            y0: y0.min(*y1),
            width: (x1 - x0).abs(),
            height: (y1 - y0).abs(),
        },
        _ => fallback,
    }
}

/// Concatenated, decompressed content streams of a page. A page without
/// `/Contents` yields an empty buffer.
pub(crate) fn page_content(doc: &Document, page_id: ObjectId) -> Result<Vec<u8>, EditorError> {
    let page = doc
        .get_dictionary(page_id)
        .map_err(|err| decode_err("failed to read page dictionary", err))?;
    let Ok(contents) = page.get(b"Contents") else {
        return Ok(Vec::new());
    };
    let streams: Vec<&Object> = match resolve(doc, contents) {
        Some(Object::Array(items)) => items.iter().collect(),
        Some(other) => vec![other],
        None => return Err(EditorError::DecodeFailure("dangling /Contents reference".to_owned())),
    };

    let mut content = Vec::new();
    for item in streams {
        let stream = resolve(doc, item)
            .and_then(|obj| obj.as_stream().ok())
            .ok_or_else(|| EditorError::DecodeFailure("/Contents entry is not a stream".to_owned()))?;
        let bytes = stream_bytes(stream)?;
        if !content.is_empty() {
            content.push(b'\n');
        }
        content.extend_from_slice(&bytes);
    }
    Ok(content)
}

/// Stream data with any `/Filter` undone.
pub(crate) fn stream_bytes(stream: &Stream) -> Result<Vec<u8>, EditorError> {
    if stream.dict.get(b"Filter").is_ok() {
        stream
            .decompressed_content()
            .map_err(|err| decode_err("failed to decompress stream", err))
    } else {
        Ok(stream.content.clone())
    }
}

/// The page's effective `/Resources`, copied so it can be written back inline.
pub(crate) fn page_resources(doc: &Document, page_id: ObjectId) -> Dictionary {
    inherited(doc, page_id, b"Resources")
        .and_then(|obj| resolve_dict(doc, obj))
        .cloned()
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::dictionary;

    #[test]
    fn media_box_is_inherited_from_parent() {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::Reference(page_id)],
                "Count" => 1,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), Object::Real(842.0)],
            }),
        );

        let bounds = media_box(&doc, page_id);
        assert_eq!(bounds.width, 595.0);
        assert_eq!(bounds.height, 842.0);
    }

    #[test]
    fn missing_media_box_falls_back_to_letter() {
        let mut doc = Document::with_version("1.5");
        let page_id = doc.add_object(dictionary! { "Type" => "Page" });
        let bounds = media_box(&doc, page_id);
        assert_eq!((bounds.width, bounds.height), DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn page_without_contents_is_empty() {
        let mut doc = Document::with_version("1.5");
        let page_id = doc.add_object(dictionary! { "Type" => "Page" });
        assert!(page_content(&doc, page_id).unwrap().is_empty());
    }
}
