use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};

pub(crate) const THREE_LINES: &str = "0 0 1 rg 300 300 100 50 re f \
    0 g BT /F1 12 Tf 72 700 Td (Heading) Tj ET \
    BT /F1 12 Tf 72 650 Td (Hello) Tj ET \
    BT /F1 12 Tf 72 600 Td (Footer) Tj ET";

fn letter() -> Object {
    Object::Array(vec![0.into(), 0.into(), 612.into(), 792.into()])
}

fn helvetica(doc: &mut Document) -> ObjectId {
    doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    })
}

fn content_stream(doc: &mut Document, content: &str) -> ObjectId {
    doc.add_object(Stream::new(Dictionary::new(), content.as_bytes().to_vec()))
}

/// Wires `pages` under a fresh page tree and catalog, then serializes.
fn finish(mut doc: Document, pages_id: ObjectId, pages: Vec<ObjectId>, tree: Dictionary) -> Vec<u8> {
    let mut tree = tree;
    tree.set("Type", "Pages");
    tree.set("Count", pages.len() as i64);
    tree.set(
        "Kids",
        pages.into_iter().map(Object::Reference).collect::<Vec<_>>(),
    );
    doc.objects.insert(pages_id, Object::Dictionary(tree));
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).expect("fixture document serializes");
    buffer
}

/// A letter-sized document with one page per entry of `contents`, all
/// sharing a Helvetica resource named `F1`.
pub(crate) fn pdf_with_pages(contents: &[&str]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = helvetica(&mut doc);
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut pages = Vec::new();
    for content in contents {
        let content_id = content_stream(&mut doc, content);
        pages.push(doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        }));
    }

    finish(
        doc,
        pages_id,
        pages,
        dictionary! {
            "Resources" => resources_id,
            "MediaBox" => letter(),
        },
    )
}

pub(crate) fn three_line_pdf() -> Vec<u8> {
    pdf_with_pages(&[THREE_LINES])
}

/// One page with the given `/MediaBox` and a Helvetica `F1`.
pub(crate) fn pdf_with_media_box(media_box: &[f32], content: &str) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = helvetica(&mut doc);
    let content_id = content_stream(&mut doc, content);
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => media_box.iter().map(|v| Object::Real(*v)).collect::<Vec<_>>(),
        "Resources" => dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        },
        "Contents" => content_id,
    });
    finish(doc, pages_id, vec![page_id], Dictionary::new())
}

/// One page whose `F1` is a Type0 font with `/Identity-H` encoding, plus a
/// `/ToUnicode` CMap when `to_unicode` is given.
pub(crate) fn type0_pdf(content: &str, to_unicode: Option<&str>) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let descendant_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "CIDFontType2",
        "BaseFont" => "ABCDEF+NotoSans-Regular",
        "DW" => 1000,
        "W" => vec![Object::Integer(3), Object::Array(vec![Object::Integer(600), Object::Integer(400)])],
    });
    let mut font = dictionary! {
        "Type" => "Font",
        "Subtype" => "Type0",
        "BaseFont" => "ABCDEF+NotoSans-Regular",
        "Encoding" => "Identity-H",
        "DescendantFonts" => vec![Object::Reference(descendant_id)],
    };
    if let Some(cmap) = to_unicode {
        let cmap_id = content_stream(&mut doc, cmap);
        font.set("ToUnicode", Object::Reference(cmap_id));
    }
    let font_id = doc.add_object(font);
    let content_id = content_stream(&mut doc, content);
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Resources" => dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        },
        "Contents" => content_id,
    });
    finish(doc, pages_id, vec![page_id], dictionary! { "MediaBox" => letter() })
}

/// One page drawing `page_content` with a form XObject `X1` available. The
/// form has its own `/Resources` naming Helvetica `F9` and the given
/// `/Matrix`.
pub(crate) fn form_pdf(page_content: &str, form_content: &str, matrix: [f32; 6]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = helvetica(&mut doc);
    let form_id = doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Form",
            "BBox" => letter(),
            "Matrix" => matrix.iter().map(|v| Object::Real(*v)).collect::<Vec<_>>(),
            "Resources" => dictionary! {
                "Font" => dictionary! { "F9" => font_id },
            },
        },
        form_content.as_bytes().to_vec(),
    ));
    let content_id = content_stream(&mut doc, page_content);
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Resources" => dictionary! {
            "Font" => dictionary! { "F1" => font_id },
            "XObject" => dictionary! { "X1" => form_id },
        },
        "Contents" => content_id,
    });
    finish(doc, pages_id, vec![page_id], dictionary! { "MediaBox" => letter() })
}
