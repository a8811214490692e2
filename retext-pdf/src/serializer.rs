use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, StringFormat};
use retext_core::signature;
use retext_core::{DrawFailurePolicy, EditorError, ReinsertionPolicy, ReinsertionRequest, TextRun};
use tracing::{debug, instrument, warn};

use crate::encoding::encode_win_ansi;
use crate::fonts::FontResolver;
use crate::objects::{self, decode_err};

/// Produces new document bytes with `request.runs` drawn onto the requested
/// page. The input is parsed afresh here; nothing from a display decode is
/// reused. Either the whole document is returned or an error, never a
/// partially drawn page.
#[instrument(skip_all, fields(page = request.page_index, runs = request.runs.len()))]
pub fn reinsert(bytes: &[u8], request: &ReinsertionRequest) -> Result<Vec<u8>, EditorError> {
    signature::validate(bytes)?;
    let mut doc =
        Document::load_mem(bytes).map_err(|err| decode_err("failed to parse document", err))?;
    let page_id = objects::page_id(&doc, request.page_index)?;
    let options = &request.options;

    let mut body = match options.policy {
        ReinsertionPolicy::Repaint => Vec::new(),
        ReinsertionPolicy::Overlay => {
            let mut existing = b"q\n".to_vec();
            existing.extend_from_slice(&objects::page_content(&doc, page_id)?);
            existing.extend_from_slice(b"\nQ\n");
            existing
        }
    };

    let mut operations = Vec::new();
    if options.policy == ReinsertionPolicy::Repaint {
        let bounds = objects::media_box(&doc, page_id);
        let [r, g, b] = options.background.to_unit();
        operations.extend([
            Operation::new("q", vec![]),
            Operation::new("rg", vec![Object::Real(r), Object::Real(g), Object::Real(b)]),
            Operation::new(
                "re",
                vec![
                    Object::Real(bounds.x0),
                    Object::Real(bounds.y0),
                    Object::Real(bounds.width),
                    Object::Real(bounds.height),
                ],
            ),
            Operation::new("f", vec![]),
            Operation::new("Q", vec![]),
        ]);
    }

    let mut runs: Vec<&TextRun> = request.runs.iter().collect();
    runs.sort_by_key(|run| run.order());

    let mut resolver = FontResolver::new(&options.default_font);
    let mut skipped = 0usize;
    for run in runs {
        match draw_run(&mut doc, page_id, &mut resolver, run) {
            Ok(ops) => operations.extend(ops),
            Err(reason) => match options.draw_failure {
                DrawFailurePolicy::Abort => {
                    return Err(EditorError::DrawFailure {
                        run: run.id(),
                        reason,
                    })
                }
                DrawFailurePolicy::Skip => {
                    warn!(run = %run.id(), order = run.order(), %reason, "skipping run that could not be drawn");
                    skipped += 1;
                }
            },
        }
    }

    let drawn = Content { operations }
        .encode()
        .map_err(|err| EditorError::EncodeFailure(format!("failed to encode content: {err}")))?;
    body.extend_from_slice(&drawn);
    replace_contents(&mut doc, page_id, body)?;

    let mut output = Vec::new();
    doc.save_to(&mut output)
        .map_err(|err| EditorError::EncodeFailure(format!("failed to write document: {err}")))?;
    debug!(
        bytes = output.len(),
        fonts = resolver.registered_count(),
        skipped,
        "serialized document"
    );
    Ok(output)
}

fn replace_contents(doc: &mut Document, page_id: ObjectId, body: Vec<u8>) -> Result<(), EditorError> {
    let stream_id = doc.add_object(Stream::new(Dictionary::new(), body));
    doc.get_object_mut(page_id)
        .and_then(Object::as_dict_mut)
        .map_err(|err| decode_err("failed to update page contents", err))?
        .set("Contents", Object::Reference(stream_id));
    Ok(())
}

fn draw_run(
    doc: &mut Document,
    page_id: ObjectId,
    resolver: &mut FontResolver,
    run: &TextRun,
) -> Result<Vec<Operation>, String> {
    let size = run.draw_font_size();
    let position = run.native_position();
    let [a, b, c, d] = run.native_transform().unit_basis(run.glyph_scale());
    let finite = [size, position.x, position.y, a, b, c, d]
        .iter()
        .all(|v| v.is_finite());
    if !finite {
        return Err("non-finite position, size or transform".to_owned());
    }

    let font = resolver
        .resource_name(doc, page_id, run.font_family())
        .map_err(|err| err.to_string())?;
    let (text, replaced) = encode_win_ansi(run.content());
    if replaced > 0 {
        warn!(run = %run.id(), replaced, "replaced characters missing from WinAnsiEncoding");
    }
    let [r, g, bl] = run.color().to_unit();

    Ok(vec![
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec![Object::Name(font.into_bytes()), Object::Real(size)]),
        Operation::new("rg", vec![Object::Real(r), Object::Real(g), Object::Real(bl)]),
        Operation::new(
            "Tm",
            [a, b, c, d, position.x, position.y]
                .into_iter()
                .map(Object::Real)
                .collect(),
        ),
        Operation::new("Tj", vec![Object::String(text, StringFormat::Literal)]),
        Operation::new("ET", vec![]),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::page_records;
    use crate::fixtures;
    use retext_core::{
        extract_runs, NativeDelta, NativePoint, OverlayStore, PageGeometry, ReinsertOptions,
        RunStyle, StyleChange,
    };

    fn store_for(bytes: &[u8]) -> OverlayStore {
        let doc = Document::load_mem(bytes).unwrap();
        let page_id = objects::page_id(&doc, 0).unwrap();
        let records = page_records(&doc, page_id).unwrap();
        OverlayStore::new(extract_runs(
            records,
            PageGeometry::new(612.0, 792.0, 1.5),
            &RunStyle::default(),
        ))
    }

    fn request(store: &OverlayStore, options: ReinsertOptions) -> ReinsertionRequest {
        ReinsertionRequest {
            page_index: 0,
            runs: store.draw_order(),
            options,
        }
    }

    fn texts_and_origins(bytes: &[u8]) -> Vec<(String, f32, f32)> {
        let doc = Document::load_mem(bytes).unwrap();
        let page_id = objects::page_id(&doc, 0).unwrap();
        page_records(&doc, page_id)
            .unwrap()
            .into_iter()
            .map(|r| (r.text, r.transform.e, r.transform.f))
            .collect()
    }

    #[test]
    fn unedited_save_keeps_text_and_positions() {
        let pdf = fixtures::three_line_pdf();
        let store = store_for(&pdf);
        let saved = reinsert(&pdf, &request(&store, ReinsertOptions::default())).unwrap();
        assert_eq!(texts_and_origins(&saved), texts_and_origins(&pdf));
    }

    #[test]
    fn edited_run_lands_at_its_native_position() {
        let pdf = fixtures::three_line_pdf();
        let mut store = store_for(&pdf);
        let hello = store.by_order(1).unwrap().id();
        store.set_content(hello, "Goodbye").unwrap();

        let saved = reinsert(&pdf, &request(&store, ReinsertOptions::default())).unwrap();
        assert_eq!(
            texts_and_origins(&saved),
            vec![
                ("Heading".to_owned(), 72.0, 700.0),
                ("Goodbye".to_owned(), 72.0, 650.0),
                ("Footer".to_owned(), 72.0, 600.0),
            ]
        );
    }

    #[test]
    fn added_run_is_drawn_with_all_originals() {
        let pdf = fixtures::three_line_pdf();
        let mut store = store_for(&pdf);
        store.add_run("Stamp", NativePoint::new(100.0, 100.0), RunStyle::default());

        let saved = reinsert(&pdf, &request(&store, ReinsertOptions::default())).unwrap();
        let drawn = texts_and_origins(&saved);
        assert_eq!(drawn.len(), 4);
        assert_eq!(drawn[3], ("Stamp".to_owned(), 100.0, 100.0));
    }

    #[test]
    fn repaint_replaces_original_graphics() {
        let pdf = fixtures::three_line_pdf();
        let store = store_for(&pdf);
        let saved = reinsert(&pdf, &request(&store, ReinsertOptions::default())).unwrap();

        let doc = Document::load_mem(&saved).unwrap();
        let page_id = objects::page_id(&doc, 0).unwrap();
        let content = Content::decode(&objects::page_content(&doc, page_id).unwrap()).unwrap();
        let fills: Vec<_> = content
            .operations
            .iter()
            .filter(|op| op.operator == "re")
            .collect();
        assert_eq!(fills.len(), 1);
        assert_eq!(objects::number(&fills[0].operands[2]), Some(612.0));
    }

    #[test]
    fn overlay_keeps_original_content_underneath() {
        let pdf = fixtures::three_line_pdf();
        let mut store = store_for(&pdf);
        let hello = store.by_order(1).unwrap().id();
        store.set_content(hello, "Goodbye").unwrap();
        let options = ReinsertOptions {
            policy: ReinsertionPolicy::Overlay,
            ..ReinsertOptions::default()
        };

        let saved = reinsert(&pdf, &request(&store, options)).unwrap();
        let texts: Vec<_> = texts_and_origins(&saved).into_iter().map(|t| t.0).collect();
        assert_eq!(
            texts,
            vec!["Heading", "Hello", "Footer", "Heading", "Goodbye", "Footer"]
        );
    }

    #[test]
    fn one_font_resource_per_distinct_font() {
        let pdf = fixtures::three_line_pdf();
        let mut store = store_for(&pdf);
        let footer = store.by_order(2).unwrap().id();
        store
            .set_style(footer, StyleChange::FontFamily("Times-Bold".to_owned()))
            .unwrap();

        let saved = reinsert(&pdf, &request(&store, ReinsertOptions::default())).unwrap();
        let doc = Document::load_mem(&saved).unwrap();
        let page_id = objects::page_id(&doc, 0).unwrap();
        let resources = objects::page_resources(&doc, page_id);
        let fonts = objects::resolve_dict(&doc, resources.get(b"Font").unwrap()).unwrap();
        let added: Vec<_> = fonts
            .iter()
            .filter(|(name, _)| name.starts_with(b"RT"))
            .collect();
        assert_eq!(added.len(), 2);
    }

    #[test]
    fn draw_failure_aborts_or_skips_per_policy() {
        let pdf = fixtures::three_line_pdf();
        let mut store = store_for(&pdf);
        let broken = store.by_order(0).unwrap().id();
        store
            .move_run(broken, NativeDelta::new(f32::INFINITY, 0.0))
            .unwrap();

        let err = reinsert(&pdf, &request(&store, ReinsertOptions::default())).unwrap_err();
        assert!(matches!(err, EditorError::DrawFailure { run, .. } if run == broken));

        let options = ReinsertOptions {
            draw_failure: DrawFailurePolicy::Skip,
            ..ReinsertOptions::default()
        };
        let saved = reinsert(&pdf, &request(&store, options)).unwrap();
        let texts: Vec<_> = texts_and_origins(&saved).into_iter().map(|t| t.0).collect();
        assert_eq!(texts, vec!["Hello", "Footer"]);
    }

    #[test]
    fn rejects_non_pdf_bytes_before_parsing() {
        let store = store_for(&fixtures::three_line_pdf());
        let err = reinsert(b"GIF89a...", &request(&store, ReinsertOptions::default())).unwrap_err();
        assert_eq!(err, EditorError::InvalidFormat);
    }

    #[test]
    fn garbage_after_signature_is_a_decode_failure() {
        let store = store_for(&fixtures::three_line_pdf());
        let err = reinsert(b"%PDF-1.4 garbage", &request(&store, ReinsertOptions::default()))
            .unwrap_err();
        assert!(matches!(err, EditorError::DecodeFailure(_)));
    }

    #[test]
    fn type0_text_is_redrawn_readable() {
        let pdf = fixtures::type0_pdf("BT /F1 12 Tf 72 700 Td <00480069> Tj ET", None);
        let store = store_for(&pdf);
        let saved = reinsert(&pdf, &request(&store, ReinsertOptions::default())).unwrap();
        assert_eq!(texts_and_origins(&saved), vec![("Hi".to_owned(), 72.0, 700.0)]);
    }

    #[test]
    fn form_text_survives_repaint() {
        let pdf = fixtures::form_pdf(
            "BT /F1 12 Tf 72 700 Td (Body) Tj ET /X1 Do",
            "BT /F9 10 Tf 0 0 Td (Footer in form) Tj ET",
            [1.0, 0.0, 0.0, 1.0, 72.0, 100.0],
        );
        let store = store_for(&pdf);
        let saved = reinsert(&pdf, &request(&store, ReinsertOptions::default())).unwrap();
        assert_eq!(
            texts_and_origins(&saved),
            vec![
                ("Body".to_owned(), 72.0, 700.0),
                ("Footer in form".to_owned(), 72.0, 100.0),
            ]
        );
    }

    #[test]
    fn rotated_run_keeps_size_and_orientation() {
        let pdf = fixtures::pdf_with_pages(&["BT /F1 12 Tf 0 1 -1 0 200 300 Tm (Up) Tj ET"]);
        let store = store_for(&pdf);
        let saved = reinsert(&pdf, &request(&store, ReinsertOptions::default())).unwrap();

        let doc = Document::load_mem(&saved).unwrap();
        let page_id = objects::page_id(&doc, 0).unwrap();
        let records = page_records(&doc, page_id).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].text, "Up");
        assert_eq!(
            records[0].transform,
            retext_core::Transform::new(0.0, 12.0, -12.0, 0.0, 200.0, 300.0)
        );
    }
}
