use std::collections::HashMap;
use std::fmt;

use lopdf::{dictionary, Document, Object, ObjectId};
use retext_core::EditorError;
use tracing::debug;

use crate::objects::{self, decode_err};

/// Fonts every conforming reader ships, so nothing has to be embedded beyond
/// a font dictionary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StandardFont {
    Helvetica,
    HelveticaBold,
    HelveticaOblique,
    TimesRoman,
    TimesBold,
    TimesItalic,
    Courier,
    CourierBold,
}

impl StandardFont {
    pub const ALL: [StandardFont; 8] = [
        StandardFont::Helvetica,
        StandardFont::HelveticaBold,
        StandardFont::HelveticaOblique,
        StandardFont::TimesRoman,
        StandardFont::TimesBold,
        StandardFont::TimesItalic,
        StandardFont::Courier,
        StandardFont::CourierBold,
    ];

    pub fn base_font(self) -> &'static str {
        match self {
            StandardFont::Helvetica => "Helvetica",
            StandardFont::HelveticaBold => "Helvetica-Bold",
            StandardFont::HelveticaOblique => "Helvetica-Oblique",
            StandardFont::TimesRoman => "Times-Roman",
            StandardFont::TimesBold => "Times-Bold",
            StandardFont::TimesItalic => "Times-Italic",
            StandardFont::Courier => "Courier",
            StandardFont::CourierBold => "Courier-Bold",
        }
    }

    /// Average glyph advance in em, used when a font has no `/Widths`.
    pub fn average_advance(self) -> f32 {
        match self {
            StandardFont::Courier | StandardFont::CourierBold => 0.6,
            _ => 0.5,
        }
    }

    /// Matches a logical or PostScript font name. Subset tags (`ABCDEF+`) are
    /// ignored, as is case.
    pub fn lookup(name: &str) -> Option<Self> {
        let name = strip_subset_tag(name.trim()).to_ascii_lowercase();
        let compact: String = name
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '_' | ','))
            .collect();
        if compact.is_empty() {
            return None;
        }
        let bold = compact.contains("bold") || compact.contains("black") || compact.contains("heavy");
        let italic = compact.contains("italic") || compact.contains("oblique");

        if compact.starts_with("helvetica")
            || compact.starts_with("arial")
            || compact == "sansserif"
            || compact == "sans"
        {
            return Some(if bold {
                StandardFont::HelveticaBold
            } else if italic {
                StandardFont::HelveticaOblique
            } else {
                StandardFont::Helvetica
            });
        }
        if compact.starts_with("times") || compact == "serif" {
            return Some(if bold {
                StandardFont::TimesBold
            } else if italic {
                StandardFont::TimesItalic
            } else {
                StandardFont::TimesRoman
            });
        }
        if compact.starts_with("courier") || compact == "monospace" || compact == "mono" {
            return Some(if bold {
                StandardFont::CourierBold
            } else {
                StandardFont::Courier
            });
        }
        None
    }
}

impl fmt::Display for StandardFont {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.base_font())
    }
}

fn strip_subset_tag(name: &str) -> &str {
    match name.split_once('+') {
        Some((tag, rest)) if tag.len() == 6 && tag.bytes().all(|b| b.is_ascii_uppercase()) => rest,
        _ => name,
    }
}

/// Maps run font families onto standard fonts and registers each one on the
/// page at most once. One resolver lives for exactly one save.
#[derive(Debug)]
pub struct FontResolver {
    fallback: StandardFont,
    registered: HashMap<StandardFont, String>,
    next_index: usize,
}

impl FontResolver {
    pub fn new(default_family: &str) -> Self {
        Self {
            fallback: StandardFont::lookup(default_family).unwrap_or(StandardFont::Helvetica),
            registered: HashMap::new(),
            next_index: 1,
        }
    }

    pub fn resolve(&self, family: &str) -> StandardFont {
        StandardFont::lookup(family).unwrap_or(self.fallback)
    }

    pub fn registered_count(&self) -> usize {
        self.registered.len()
    }

    /// Returns the page resource name to use with `Tf` for `family`, adding
    /// the font dictionary to the document on first use.
    pub fn resource_name(
        &mut self,
        doc: &mut Document,
        page_id: ObjectId,
        family: &str,
    ) -> Result<String, EditorError> {
        let font = self.resolve(family);
        if let Some(name) = self.registered.get(&font) {
            return Ok(name.clone());
        }

        let mut resources = objects::page_resources(doc, page_id);
        let mut fonts = resources
            .get(b"Font")
            .ok()
            .and_then(|obj| objects::resolve_dict(doc, obj))
            .cloned()
            .unwrap_or_default();

        let name = loop {
            let candidate = format!("RT{}", self.next_index);
            self.next_index += 1;
            if !fonts.has(candidate.as_bytes()) {
                break candidate;
            }
        };

        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => font.base_font(),
            "Encoding" => "WinAnsiEncoding",
        });
        fonts.set(name.as_bytes().to_vec(), Object::Reference(font_id));
        resources.set("Font", Object::Dictionary(fonts));

        doc.get_object_mut(page_id)
            .and_then(Object::as_dict_mut)
            .map_err(|err| decode_err("failed to update page resources", err))?
            .set("Resources", Object::Dictionary(resources));

        debug!(%font, resource = %name, "registered standard font");
        self.registered.insert(font, name.clone());
        Ok(name)
    }
}
