//! Content-stream interpreter producing one [`TextRecord`] per text-showing
//! operator, including those inside form XObjects.

use std::collections::HashMap;
use std::rc::Rc;

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId};
use retext_core::{EditorError, Rgb, TextRecord, Transform};
use tracing::{debug, warn};

use crate::encoding::{glyph_name_char, win_ansi_char, ToUnicode};
use crate::fonts::StandardFont;
use crate::objects::{self, decode_err, number};

const MAX_FORM_DEPTH: usize = 16;

fn name_of(doc: &Document, dict: &Dictionary, key: &[u8]) -> Option<String> {
    dict.get(key)
        .ok()
        .and_then(|obj| objects::resolve(doc, obj))
        .and_then(|obj| obj.as_name().ok())
        .map(|name| String::from_utf8_lossy(name).into_owned())
}

/// Decoding and width data of one font resource.
#[derive(Debug, Clone, Default)]
struct FontMetrics {
    base_font: Option<String>,
    /// Type0 fonts read two bytes per character code.
    two_byte: bool,
    first_char: u32,
    /// Simple-font advances in thousandths of an em, from `/FirstChar`.
    widths: Vec<f32>,
    /// CID advances in thousandths of an em, from the descendant's `/W`.
    cid_widths: HashMap<u32, f32>,
    cid_default_width: f32,
    average_advance: f32,
    differences: HashMap<u8, char>,
    to_unicode: Option<ToUnicode>,
}

impl FontMetrics {
    fn from_dict(doc: &Document, dict: &Dictionary) -> Self {
        let base_font = name_of(doc, dict, b"BaseFont");
        let average_advance = base_font
            .as_deref()
            .and_then(StandardFont::lookup)
            .map(StandardFont::average_advance)
            .unwrap_or(0.5);
        let to_unicode = dict
            .get(b"ToUnicode")
            .ok()
            .and_then(|obj| objects::resolve(doc, obj))
            .and_then(|obj| obj.as_stream().ok())
            .and_then(|stream| match objects::stream_bytes(stream) {
                Ok(bytes) => Some(ToUnicode::parse(&bytes)),
                Err(err) => {
                    warn!(%err, "ignoring unreadable /ToUnicode stream");
                    None
                }
            });

        let mut metrics = Self {
            base_font,
            average_advance,
            cid_default_width: 1000.0,
            ..Self::default()
        };

        if name_of(doc, dict, b"Subtype").as_deref() == Some("Type0") {
            metrics.two_byte = to_unicode.as_ref().map_or(true, ToUnicode::is_multi_byte)
                || matches!(
                    name_of(doc, dict, b"Encoding").as_deref(),
                    Some("Identity-H" | "Identity-V")
                );
            if let Some(descendant) = dict
                .get(b"DescendantFonts")
                .ok()
                .and_then(|obj| objects::resolve(doc, obj))
                .and_then(|obj| obj.as_array().ok())
                .and_then(|fonts| fonts.first())
                .and_then(|obj| objects::resolve_dict(doc, obj))
            {
                if let Some(dw) = descendant
                    .get(b"DW")
                    .ok()
                    .and_then(|obj| objects::resolve(doc, obj))
                    .and_then(number)
                {
                    metrics.cid_default_width = dw.max(0.0);
                }
                if let Some(w) = descendant
                    .get(b"W")
                    .ok()
                    .and_then(|obj| objects::resolve(doc, obj))
                    .and_then(|obj| obj.as_array().ok())
                {
                    metrics.cid_widths = cid_widths(doc, w);
                }
            }
        } else {
            metrics.first_char = dict
                .get(b"FirstChar")
                .ok()
                .and_then(number)
                .map(|v| v.max(0.0) as u32)
                .unwrap_or(0);
            metrics.widths = dict
                .get(b"Widths")
                .ok()
                .and_then(|obj| objects::resolve(doc, obj))
                .and_then(|obj| obj.as_array().ok())
                .map(|items| {
                    items
                        .iter()
                        .map(|w| objects::resolve(doc, w).and_then(number).unwrap_or(0.0))
                        .collect()
                })
                .unwrap_or_default();
            metrics.differences = dict
                .get(b"Encoding")
                .ok()
                .and_then(|obj| objects::resolve_dict(doc, obj))
                .map(|encoding| differences(doc, encoding))
                .unwrap_or_default();
        }
        metrics.to_unicode = to_unicode;
        metrics
    }

    /// Advance of `code` in em.
    fn advance(&self, code: u32) -> f32 {
        if self.two_byte {
            return self
                .cid_widths
                .get(&code)
                .copied()
                .unwrap_or(self.cid_default_width)
                / 1000.0;
        }
        code.checked_sub(self.first_char)
            .and_then(|i| self.widths.get(i as usize))
            .map(|w| w / 1000.0)
            .unwrap_or(self.average_advance)
    }

    fn decode(&self, bytes: &[u8]) -> Vec<Glyph> {
        if self.two_byte {
            return bytes
                .chunks(2)
                .map(|pair| {
                    let code = (u32::from(pair[0]) << 8) | u32::from(pair.get(1).copied().unwrap_or(0));
                    let text = match self.to_unicode.as_ref().and_then(|cmap| cmap.get(code)) {
                        Some(text) => text.to_owned(),
                        // Identity-H without a CMap: CIDs commonly equal code points.
                        None => char::from_u32(code)
                            .unwrap_or(char::REPLACEMENT_CHARACTER)
                            .to_string(),
                    };
                    Glyph {
                        text,
                        code,
                        is_space: false,
                    }
                })
                .collect();
        }
        if self.to_unicode.is_none() && bytes.starts_with(&[0xFE, 0xFF]) {
            return decode_utf16(&bytes[2..]);
        }
        bytes
            .iter()
            .map(|&byte| {
                let code = u32::from(byte);
                let text = self
                    .to_unicode
                    .as_ref()
                    .and_then(|cmap| cmap.get(code))
                    .map(str::to_owned)
                    .or_else(|| self.differences.get(&byte).map(|ch| ch.to_string()))
                    .unwrap_or_else(|| win_ansi_char(byte).to_string());
                Glyph {
                    text,
                    code,
                    is_space: byte == b' ',
                }
            })
            .collect()
    }
}

fn cid_widths(doc: &Document, w: &[Object]) -> HashMap<u32, f32> {
    let mut widths = HashMap::new();
    let mut i = 0;
    while i < w.len() {
        let Some(first) = objects::resolve(doc, &w[i]).and_then(number) else {
            break;
        };
        let first = first.max(0.0) as u32;
        match w.get(i + 1).and_then(|obj| objects::resolve(doc, obj)) {
            Some(Object::Array(list)) => {
                for (offset, width) in list.iter().enumerate() {
                    if let Some(width) = objects::resolve(doc, width).and_then(number) {
                        widths.insert(first + offset as u32, width);
                    }
                }
                i += 2;
            }
            Some(last) => {
                let (Some(last), Some(width)) = (
                    number(last),
                    w.get(i + 2)
                        .and_then(|obj| objects::resolve(doc, obj))
                        .and_then(number),
                ) else {
                    break;
                };
                for code in first..=(last.max(0.0) as u32).min(first.saturating_add(0xFFFF)) {
                    widths.insert(code, width);
                }
                i += 3;
            }
            None => break,
        }
    }
    widths
}

fn differences(doc: &Document, encoding: &Dictionary) -> HashMap<u8, char> {
    let mut map = HashMap::new();
    let Some(items) = encoding
        .get(b"Differences")
        .ok()
        .and_then(|obj| objects::resolve(doc, obj))
        .and_then(|obj| obj.as_array().ok())
    else {
        return map;
    };
    let mut code: u32 = 0;
    for item in items {
        match item {
            Object::Name(name) => {
                if let (Ok(byte), Some(ch)) = (
                    u8::try_from(code),
                    glyph_name_char(&String::from_utf8_lossy(name)),
                ) {
                    map.insert(byte, ch);
                }
                code += 1;
            }
            other => {
                if let Some(start) = number(other) {
                    code = start.max(0.0) as u32;
                }
            }
        }
    }
    map
}

/// Fonts and XObjects reachable from one `/Resources` dictionary.
#[derive(Debug, Default)]
struct Resources {
    fonts: HashMap<Vec<u8>, Rc<FontMetrics>>,
    xobjects: HashMap<Vec<u8>, ObjectId>,
}

impl Resources {
    fn load(doc: &Document, dict: &Dictionary) -> Self {
        let fonts = dict
            .get(b"Font")
            .ok()
            .and_then(|obj| objects::resolve_dict(doc, obj))
            .map(|fonts| {
                fonts
                    .iter()
                    .filter_map(|(name, obj)| {
                        let font = objects::resolve_dict(doc, obj)?;
                        Some((name.clone(), Rc::new(FontMetrics::from_dict(doc, font))))
                    })
                    .collect()
            })
            .unwrap_or_default();
        let xobjects = dict
            .get(b"XObject")
            .ok()
            .and_then(|obj| objects::resolve_dict(doc, obj))
            .map(|xobjects| {
                xobjects
                    .iter()
                    .filter_map(|(name, obj)| Some((name.clone(), obj.as_reference().ok()?)))
                    .collect()
            })
            .unwrap_or_default();
        Self { fonts, xobjects }
    }
}

#[derive(Debug, Clone)]
struct TextState {
    font: Option<Rc<FontMetrics>>,
    size: f32,
    char_spacing: f32,
    word_spacing: f32,
    horizontal_scale: f32,
    leading: f32,
    rise: f32,
}

impl Default for TextState {
    fn default() -> Self {
        Self {
            font: None,
            size: 0.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            horizontal_scale: 1.0,
            leading: 0.0,
            rise: 0.0,
        }
    }
}

#[derive(Debug, Clone)]
struct GraphicsState {
    ctm: Transform,
    fill: Rgb,
    text: TextState,
}

impl Default for GraphicsState {
    fn default() -> Self {
        Self {
            ctm: Transform::IDENTITY,
            fill: Rgb::BLACK,
            text: TextState::default(),
        }
    }
}

/// One decoded character code: its text and the code used for metrics.
struct Glyph {
    text: String,
    code: u32,
    /// Single-byte code 32, the only code word spacing applies to.
    is_space: bool,
}

fn decode_utf16(bytes: &[u8]) -> Vec<Glyph> {
    let units: Vec<u16> = bytes
        .chunks(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair.get(1).copied().unwrap_or(0)]))
        .collect();
    char::decode_utf16(units)
        .map(|ch| {
            let ch = ch.unwrap_or(char::REPLACEMENT_CHARACTER);
            Glyph {
                text: ch.to_string(),
                code: ch as u32,
                is_space: false,
            }
        })
        .collect()
}

fn decode_without_font(bytes: &[u8]) -> Vec<Glyph> {
    FontMetrics {
        average_advance: 0.5,
        ..FontMetrics::default()
    }
    .decode(bytes)
}

struct Interpreter<'a> {
    doc: &'a Document,
    state: GraphicsState,
    stack: Vec<GraphicsState>,
    text_matrix: Transform,
    line_matrix: Transform,
    /// Form XObjects currently being drawn, outermost first.
    forms: Vec<ObjectId>,
    records: Vec<TextRecord>,
}

impl<'a> Interpreter<'a> {
    fn new(doc: &'a Document) -> Self {
        Self {
            doc,
            state: GraphicsState::default(),
            stack: Vec::new(),
            text_matrix: Transform::IDENTITY,
            line_matrix: Transform::IDENTITY,
            forms: Vec::new(),
            records: Vec::new(),
        }
    }

    fn run(&mut self, content: &Content, resources: &Resources) {
        for op in &content.operations {
            self.apply(op, resources);
        }
    }

    fn move_line(&mut self, tx: f32, ty: f32) {
        self.line_matrix = Transform::translation(tx, ty).then(self.line_matrix);
        self.text_matrix = self.line_matrix;
    }

    fn next_line(&mut self) {
        let leading = self.state.text.leading;
        self.move_line(0.0, -leading);
    }

    fn advance(&mut self, tx: f32) {
        self.text_matrix = Transform::translation(tx, 0.0).then(self.text_matrix);
    }

    fn apply(&mut self, op: &Operation, resources: &Resources) {
        let operands = &op.operands;
        let num = |i: usize| operands.get(i).and_then(number);
        match op.operator.as_str() {
            "q" => self.stack.push(self.state.clone()),
            "Q" => {
                if let Some(previous) = self.stack.pop() {
                    self.state = previous;
                }
            }
            "cm" => {
                if let Some(m) = matrix(operands) {
                    self.state.ctm = m.then(self.state.ctm);
                }
            }
            "BT" => {
                self.text_matrix = Transform::IDENTITY;
                self.line_matrix = Transform::IDENTITY;
            }
            "ET" => {}
            "Tf" => {
                if let Some(Object::Name(name)) = operands.first() {
                    self.state.text.font = resources.fonts.get(name).cloned();
                }
                if let Some(size) = num(1) {
                    self.state.text.size = size;
                }
            }
            "Td" => {
                if let (Some(tx), Some(ty)) = (num(0), num(1)) {
                    self.move_line(tx, ty);
                }
            }
            "TD" => {
                if let (Some(tx), Some(ty)) = (num(0), num(1)) {
                    self.state.text.leading = -ty;
                    self.move_line(tx, ty);
                }
            }
            "Tm" => {
                if let Some(m) = matrix(operands) {
                    self.text_matrix = m;
                    self.line_matrix = m;
                }
            }
            "T*" => self.next_line(),
            "TL" => {
                if let Some(v) = num(0) {
                    self.state.text.leading = v;
                }
            }
            "Tc" => {
                if let Some(v) = num(0) {
                    self.state.text.char_spacing = v;
                }
            }
            "Tw" => {
                if let Some(v) = num(0) {
                    self.state.text.word_spacing = v;
                }
            }
            "Tz" => {
                if let Some(v) = num(0) {
                    self.state.text.horizontal_scale = v / 100.0;
                }
            }
            "Ts" => {
                if let Some(v) = num(0) {
                    self.state.text.rise = v;
                }
            }
            "Tj" => {
                if let Some(Object::String(bytes, _)) = operands.first() {
                    self.show(&[TextPiece::Text(bytes)]);
                }
            }
            "'" => {
                self.next_line();
                if let Some(Object::String(bytes, _)) = operands.first() {
                    self.show(&[TextPiece::Text(bytes)]);
                }
            }
            "\"" => {
                if let (Some(aw), Some(ac)) = (num(0), num(1)) {
                    self.state.text.word_spacing = aw;
                    self.state.text.char_spacing = ac;
                }
                self.next_line();
                if let Some(Object::String(bytes, _)) = operands.get(2) {
                    self.show(&[TextPiece::Text(bytes)]);
                }
            }
            "TJ" => {
                if let Some(Object::Array(items)) = operands.first() {
                    let pieces: Vec<TextPiece<'_>> = items
                        .iter()
                        .filter_map(|item| match item {
                            Object::String(bytes, _) => Some(TextPiece::Text(bytes)),
                            other => number(other).map(TextPiece::Adjust),
                        })
                        .collect();
                    self.show(&pieces);
                }
            }
            "rg" => {
                if let (Some(r), Some(g), Some(b)) = (num(0), num(1), num(2)) {
                    self.state.fill = Rgb::from_unit(r, g, b);
                }
            }
            "g" => {
                if let Some(gray) = num(0) {
                    self.state.fill = Rgb::from_unit(gray, gray, gray);
                }
            }
            "k" => {
                if let (Some(c), Some(m), Some(y), Some(k)) = (num(0), num(1), num(2), num(3)) {
                    let k = k.clamp(0.0, 1.0);
                    self.state.fill = Rgb::from_unit(
                        (1.0 - c.clamp(0.0, 1.0)) * (1.0 - k),
                        (1.0 - m.clamp(0.0, 1.0)) * (1.0 - k),
                        (1.0 - y.clamp(0.0, 1.0)) * (1.0 - k),
                    );
                }
            }
            "Do" => {
                if let Some(id) = operands
                    .first()
                    .and_then(|obj| obj.as_name().ok())
                    .and_then(|name| resources.xobjects.get(name))
                {
                    self.draw_form(*id, resources);
                }
            }
            _ => {}
        }
    }

    /// Interprets a form XObject in place: its `/Matrix` is applied on top
    /// of the current CTM and its own `/Resources` win over the caller's.
    /// Image XObjects are ignored.
    fn draw_form(&mut self, id: ObjectId, parent: &Resources) {
        if self.forms.contains(&id) || self.forms.len() >= MAX_FORM_DEPTH {
            warn!(?id, depth = self.forms.len(), "skipping recursive form XObject");
            return;
        }
        let doc = self.doc;
        let Some(stream) = doc.get_object(id).ok().and_then(|obj| obj.as_stream().ok()) else {
            return;
        };
        if name_of(doc, &stream.dict, b"Subtype").as_deref() != Some("Form") {
            return;
        }
        let content = match objects::stream_bytes(stream)
            .and_then(|bytes| Content::decode(&bytes).map_err(|err| decode_err("failed to parse form", err)))
        {
            Ok(content) => content,
            Err(err) => {
                warn!(?id, %err, "skipping unreadable form XObject");
                return;
            }
        };
        let form_matrix = stream
            .dict
            .get(b"Matrix")
            .ok()
            .and_then(|obj| objects::resolve(doc, obj))
            .and_then(|obj| obj.as_array().ok())
            .and_then(|values| matrix(values))
            .unwrap_or(Transform::IDENTITY);
        let own = stream
            .dict
            .get(b"Resources")
            .ok()
            .and_then(|obj| objects::resolve_dict(doc, obj))
            .map(|dict| Resources::load(doc, dict));

        let saved_state = self.state.clone();
        let saved_depth = self.stack.len();
        let saved_matrices = (self.text_matrix, self.line_matrix);

        self.state.ctm = form_matrix.then(self.state.ctm);
        self.forms.push(id);
        self.run(&content, own.as_ref().unwrap_or(parent));
        self.forms.pop();

        self.stack.truncate(saved_depth);
        self.state = saved_state;
        (self.text_matrix, self.line_matrix) = saved_matrices;
    }

    /// Emits one record for a whole showing operator and advances the text
    /// matrix past it.
    fn show(&mut self, pieces: &[TextPiece<'_>]) {
        let text_state = self.state.text.clone();
        let size = text_state.size;
        let th = text_state.horizontal_scale;
        let render = Transform::new(size * th, 0.0, 0.0, size, 0.0, text_state.rise);
        let user = self.text_matrix.then(self.state.ctm);
        let transform = render.then(user);
        let font = text_state.font.as_deref();

        let mut text = String::new();
        let mut total = 0.0_f32;
        for piece in pieces {
            match piece {
                TextPiece::Text(bytes) => {
                    let glyphs = match font {
                        Some(font) => font.decode(bytes),
                        None => decode_without_font(bytes),
                    };
                    for glyph in glyphs {
                        let w0 = font.map_or(0.5, |f| f.advance(glyph.code));
                        let mut tx = w0 * size + text_state.char_spacing;
                        if glyph.is_space {
                            tx += text_state.word_spacing;
                        }
                        let tx = tx * th;
                        text.push_str(&glyph.text);
                        total += tx;
                        self.advance(tx);
                    }
                }
                TextPiece::Adjust(amount) => {
                    let tx = -(amount / 1000.0) * size * th;
                    total += tx;
                    self.advance(tx);
                }
            }
        }

        let width = total * user.a.hypot(user.b);
        let height = transform.c.hypot(transform.d);
        let mut record = TextRecord::new(text, transform, width, height);
        record.font_family = font.and_then(|f| f.base_font.clone());
        record.color = Some(self.state.fill);
        self.records.push(record);
    }
}

enum TextPiece<'b> {
    Text(&'b [u8]),
    Adjust(f32),
}

fn matrix(operands: &[Object]) -> Option<Transform> {
    if operands.len() < 6 {
        return None;
    }
    let mut values = [0.0_f32; 6];
    for (slot, obj) in values.iter_mut().zip(operands) {
        *slot = number(obj)?;
    }
    Some(Transform::from_array(values))
}

/// Interprets the page's content streams and returns its text records in
/// content-stream order. Text drawn by form XObjects is included at the
/// point of the `Do` that draws it.
pub fn page_records(doc: &Document, page_id: ObjectId) -> Result<Vec<TextRecord>, EditorError> {
    let bytes = objects::page_content(doc, page_id)?;
    if bytes.is_empty() {
        return Ok(Vec::new());
    }
    let content =
        Content::decode(&bytes).map_err(|err| decode_err("failed to parse content stream", err))?;
    let resources = Resources::load(doc, &objects::page_resources(doc, page_id));

    let mut interpreter = Interpreter::new(doc);
    interpreter.run(&content, &resources);
    debug!(
        operations = content.operations.len(),
        records = interpreter.records.len(),
        "interpreted page content"
    );
    Ok(interpreter.records)
}
