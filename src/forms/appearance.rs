//! Appearance-stream generation (§4.7) and widget flattening.
//!
//! Content-stream operator emission follows the same pattern as a page's
//! drawing operations elsewhere in this codebase's history: plain text
//! operators (`re`, `f`, `BT`/`Tf`/`Td`/`Tj`/`ET`) written directly into a
//! byte buffer, no intermediate AST.

use super::field::FieldKind;
use super::FieldNode;
use crate::errors::PdfResult;
use crate::geom::Rgb;
use crate::object::registry::Registry;
use crate::object::{Dictionary, Object, ObjectId, Stream};
use std::fmt::Write as _;

const DEFAULT_FONT_SIZE: f64 = 12.0;
const ZAPF_CHECK: u8 = 0x34;
const ZAPF_DOT: u8 = 0x6C;

#[derive(Debug, Clone)]
struct DefaultAppearance {
    font_name: String,
    size: f64,
    color: Rgb,
}

/// Parses a `/DA` string's `/Name size Tf`, `r g b rg`, `g g`, `c m y k k`
/// tokens, ignoring anything it doesn't recognize.
fn parse_da(da: &str) -> DefaultAppearance {
    let mut result = DefaultAppearance { font_name: "Helv".to_string(), size: DEFAULT_FONT_SIZE, color: Rgb::BLACK };
    let mut operands: Vec<&str> = Vec::new();
    for token in da.split_whitespace() {
        match token {
            "Tf" => {
                if operands.len() >= 2 {
                    result.font_name = operands[operands.len() - 2].trim_start_matches('/').to_string();
                    if let Ok(size) = operands[operands.len() - 1].parse() {
                        result.size = size;
                    }
                }
                operands.clear();
            }
            "g" => {
                if let Some(&level) = operands.last() {
                    if let Ok(level) = level.parse() {
                        result.color = Rgb::gray(level);
                    }
                }
                operands.clear();
            }
            "rg" => {
                if operands.len() >= 3 {
                    let n = operands.len();
                    if let (Ok(r), Ok(g), Ok(b)) =
                        (operands[n - 3].parse(), operands[n - 2].parse(), operands[n - 1].parse())
                    {
                        result.color = Rgb { r, g, b };
                    }
                }
                operands.clear();
            }
            "k" => {
                if operands.len() >= 4 {
                    let n = operands.len();
                    if let (Ok(c), Ok(m), Ok(y), Ok(k)) = (
                        operands[n - 4].parse::<f64>(),
                        operands[n - 3].parse::<f64>(),
                        operands[n - 2].parse::<f64>(),
                        operands[n - 1].parse::<f64>(),
                    ) {
                        result.color = Rgb {
                            r: (1.0 - c) * (1.0 - k),
                            g: (1.0 - m) * (1.0 - k),
                            b: (1.0 - y) * (1.0 - k),
                        };
                    }
                }
                operands.clear();
            }
            other => operands.push(other),
        }
    }
    result
}

fn rect_of(registry: &Registry, widget: ObjectId) -> [f64; 4] {
    let dict = match registry.get(widget).and_then(Object::as_dict) {
        Some(d) => d,
        None => return [0.0, 0.0, 0.0, 0.0],
    };
    let values: Vec<f64> = dict
        .get("Rect")
        .and_then(Object::as_array)
        .map(|arr| arr.iter().filter_map(Object::as_f64).collect())
        .unwrap_or_default();
    if values.len() == 4 {
        [values[0], values[1], values[2], values[3]]
    } else {
        [0.0, 0.0, 0.0, 0.0]
    }
}

/// An average-width estimate for the core 14 fonts, used when no embedded
/// font metrics are available for auto-sizing and word wrapping. Close enough
/// for layout purposes; it is not a substitute for real glyph metrics.
fn average_glyph_width_em(font_name: &str) -> f64 {
    if font_name.starts_with('C') || font_name.contains("Courier") {
        0.6
    } else {
        0.5
    }
}

fn escape_literal(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '(' => out.push_str("\\("),
            ')' => out.push_str("\\)"),
            '\\' => out.push_str("\\\\"),
            _ => out.push(ch),
        }
    }
    out
}

/// Returns the six-element `/Matrix` mapping the form's own BBox space (sized
/// `content_w` x `content_h`, the dimensions the content stream is drawn in)
/// onto the widget's unrotated `width` x `height` rect.
fn rotation_matrix(rotate: i64, width: f64, height: f64) -> (Vec<f64>, f64, f64) {
    match ((rotate % 360) + 360) % 360 {
        90 => (vec![0.0, 1.0, -1.0, 0.0, height, 0.0], height, width),
        180 => (vec![-1.0, 0.0, 0.0, -1.0, width, height], width, height),
        270 => (vec![0.0, -1.0, 1.0, 0.0, 0.0, width], height, width),
        _ => (vec![1.0, 0.0, 0.0, 1.0, 0.0, 0.0], width, height),
    }
}

fn background_and_border(dict: &Dictionary, width: f64, height: f64) -> String {
    let mut out = String::new();
    let mk = dict.get("MK").and_then(Object::as_dict);
    if let Some(bg) = mk.and_then(|mk| mk.get("BG")).and_then(Object::as_array) {
        write_color(&mut out, bg, false);
        let _ = write!(out, "0 0 {} {} re f\n", width, height);
    }
    if let Some(bc) = mk.and_then(|mk| mk.get("BC")).and_then(Object::as_array) {
        let line_width = dict
            .get("BS")
            .and_then(Object::as_dict)
            .and_then(|bs| bs.get("W"))
            .and_then(Object::as_f64)
            .unwrap_or(1.0);
        write_color(&mut out, bc, true);
        let _ = write!(out, "{} w 0.5 0.5 {} {} re S\n", line_width, width - 1.0, height - 1.0);
    }
    out
}

fn write_color(out: &mut String, components: &[Object], stroking: bool) {
    let values: Vec<f64> = components.iter().filter_map(Object::as_f64).collect();
    let op = match values.len() {
        1 if stroking => "G",
        1 => "g",
        4 if stroking => "K",
        4 => "k",
        _ if stroking => "RG",
        _ => "rg",
    };
    for v in &values {
        let _ = write!(out, "{} ", v);
    }
    let _ = writeln!(out, "{}", op);
}

/// Builds the `/N` appearance stream content for a text, dropdown, or
/// listbox widget showing `text` inside `[width, height]`.
fn text_appearance_body(da: &DefaultAppearance, rect_w: f64, rect_h: f64, text: &str, multiline: bool, comb: bool, max_len: Option<i64>) -> String {
    let mut out = String::new();
    let pad = 2.0;
    let content_w = (rect_w - 2.0 * pad).max(1.0);
    let content_h = (rect_h - 2.0 * pad).max(1.0);
    let mut size = da.size;
    if size <= 0.0 {
        size = content_h * 0.7;
        let em = average_glyph_width_em(&da.font_name);
        let longest = text.split('\n').map(str::len).max().unwrap_or(0) as f64;
        while size > 1.0 && longest * size * em > content_w {
            size -= 0.5;
        }
    }

    out.push_str("/Tx BMC\nq\nBT\n");
    let _ = write!(out, "/{} {} Tf\n", da.font_name, size);
    let _ = write!(out, "{} {} {} rg\n", da.color.r, da.color.g, da.color.b);

    if comb {
        let cells = max_len.unwrap_or(text.chars().count().max(1) as i64).max(1) as f64;
        let cell_width = rect_w / cells;
        let em = average_glyph_width_em(&da.font_name);
        for (i, ch) in text.chars().enumerate() {
            let char_w = size * em;
            let x = cell_width * i as f64 + (cell_width - char_w) / 2.0;
            let _ = write!(out, "1 0 0 1 {} {} Tm ({}) Tj\n", x, (rect_h - size) / 2.0, escape_literal(&ch.to_string()));
        }
    } else if multiline {
        let em = average_glyph_width_em(&da.font_name);
        let max_chars = ((content_w / (size * em)).floor() as usize).max(1);
        let leading = size * 1.2;
        let lines = wrap_text(text, max_chars);
        let _ = write!(out, "{} TL\n", leading);
        let _ = write!(out, "1 0 0 1 {} {} Td\n", pad, rect_h - pad - size);
        for (i, line) in lines.iter().enumerate() {
            if i > 0 {
                out.push_str("T*\n");
            }
            let _ = write!(out, "({}) Tj\n", escape_literal(line));
        }
    } else {
        let em = average_glyph_width_em(&da.font_name);
        let text_width = text.len() as f64 * size * em;
        let x = pad.max((content_w - text_width) / 2.0 + pad);
        let y = (rect_h - size) / 2.0;
        let _ = write!(out, "1 0 0 1 {} {} Td\n", x, y);
        let _ = write!(out, "({}) Tj\n", escape_literal(text));
    }
    out.push_str("ET\nQ\nEMC\n");
    out
}

fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        let mut word = word;
        while word.len() > max_chars {
            let (head, tail) = word.split_at(max_chars);
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            lines.push(head.to_string());
            word = tail;
        }
        if current.is_empty() {
            current = word.to_string();
        } else if current.len() + 1 + word.len() <= max_chars {
            current.push(' ');
            current.push_str(word);
        } else {
            lines.push(std::mem::take(&mut current));
            current = word.to_string();
        }
    }
    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }
    lines
}

fn checkbox_symbol_appearance(glyph: u8, rect_w: f64, rect_h: f64) -> String {
    let size = rect_h.min(rect_w) * 0.8;
    let x = (rect_w - size) / 2.0;
    let y = (rect_h - size) / 2.0;
    format!(
        "q\nBT\n/ZaDb {size} Tf\n0 g\n1 0 0 1 {x} {y} Td\n<{glyph:02X}> Tj\nET\nQ\n",
        size = size,
        x = x,
        y = y,
        glyph = glyph
    )
}

fn make_xobject(dict: Dictionary, body: String, rect_w: f64, rect_h: f64) -> Object {
    let mut dict = dict;
    dict.set("Type", "XObject");
    dict.set("Subtype", "Form");
    dict.set("FormType", 1);
    dict.set(
        "BBox",
        Object::Array(vec![0.into(), 0.into(), Object::Real(rect_w), Object::Real(rect_h)]),
    );
    let mut resources = Dictionary::new();
    let mut font_res = Dictionary::new();
    font_res.set("Helv", standard_font_ref());
    font_res.set("ZaDb", standard_zapf_ref());
    resources.set("Font", Object::Dictionary(font_res));
    dict.set("Resources", Object::Dictionary(resources));
    Object::Stream(Stream::new(dict, body.into_bytes()))
}

/// The AcroForm default-resources fonts, referenced by name from every
/// generated appearance. These are built-in (non-embedded) standard fonts, so
/// no font program needs to accompany them.
fn standard_font_dict(base_font: &str) -> Dictionary {
    let mut d = Dictionary::new();
    d.set("Type", "Font");
    d.set("Subtype", "Type1");
    d.set("BaseFont", base_font);
    d.set("Encoding", "WinAnsiEncoding");
    d
}

fn standard_font_ref() -> Object {
    Object::Dictionary(standard_font_dict("Helvetica"))
}

fn standard_zapf_ref() -> Object {
    Object::Dictionary(standard_font_dict("ZapfDingbats"))
}

/// Rebuilds every widget's `/AP /N` (and, for checkbox/radio, `/AP /D`-less
/// two-state dict) after a value change.
pub(super) fn rebuild_appearances(registry: &mut Registry, node: &FieldNode) -> PdfResult<()> {
    let widgets: Vec<ObjectId> = node.widgets.iter().map(|w| w.id).collect();
    for widget in widgets {
        let rect = rect_of(registry, widget);
        let (width, height) = ((rect[2] - rect[0]).abs(), (rect[3] - rect[1]).abs());
        let rotate = registry
            .get(widget)
            .and_then(Object::as_dict)
            .and_then(|d| d.get("MK"))
            .and_then(Object::as_dict)
            .and_then(|mk| mk.get("R"))
            .and_then(Object::as_integer)
            .unwrap_or(0);
        let (matrix, w, h) = rotation_matrix(rotate, width, height);

        let border = registry.get(widget).and_then(Object::as_dict).map(|d| background_and_border(d, w, h)).unwrap_or_default();
        let matrix_entries = Object::Array(matrix.iter().map(|&v| Object::Real(v)).collect());

        let ap_object = match &node.kind {
            FieldKind::Text { multiline, comb, max_len } => {
                let text = node.get_value(registry);
                let text = match text {
                    super::FieldValue::Text(s) => s,
                    _ => String::new(),
                };
                let da = registry
                    .get(node.id)
                    .and_then(Object::as_dict)
                    .and_then(|d| d.get("DA"))
                    .and_then(Object::as_string)
                    .map(|s| parse_da(&s.as_utf8_lossy()))
                    .unwrap_or_else(|| parse_da("/Helv 0 Tf 0 g"));
                let body = border + &text_appearance_body(&da, w, h, &text, *multiline, *comb, *max_len);
                let mut dict = Dictionary::new();
                dict.set("Matrix", matrix_entries.clone());
                make_xobject(dict, body, w, h)
            }
            FieldKind::Dropdown { .. } => {
                let text = match node.get_value(registry) {
                    super::FieldValue::Single(s) => s,
                    _ => String::new(),
                };
                let da = parse_da("/Helv 0 Tf 0 g");
                let body = border + &text_appearance_body(&da, w, h, &text, false, false, None);
                let mut dict = Dictionary::new();
                dict.set("Matrix", matrix_entries.clone());
                make_xobject(dict, body, w, h)
            }
            FieldKind::ListBox { .. } => {
                let text = match node.get_value(registry) {
                    super::FieldValue::Multi(items) => items.join(", "),
                    _ => String::new(),
                };
                let da = parse_da("/Helv 0 Tf 0 g");
                let body = border + &text_appearance_body(&da, w, h, &text, true, false, None);
                let mut dict = Dictionary::new();
                dict.set("Matrix", matrix_entries.clone());
                make_xobject(dict, body, w, h)
            }
            FieldKind::Checkbox { on_value } => {
                let on_body = border.clone() + &checkbox_symbol_appearance(ZAPF_CHECK, w, h);
                let off_body = border;
                let mut n = Dictionary::new();
                let mut on_dict = Dictionary::new();
                on_dict.set("Matrix", matrix_entries.clone());
                let mut off_dict = Dictionary::new();
                off_dict.set("Matrix", matrix_entries.clone());
                n.set(on_value.as_str(), make_xobject(on_dict, on_body, w, h));
                n.set("Off", make_xobject(off_dict, off_body, w, h));
                Object::Dictionary(n)
            }
            FieldKind::Radio { .. } => {
                let on_value = super::field::widget_on_value(registry, widget).unwrap_or_default();
                let on_body = border.clone() + &checkbox_symbol_appearance(ZAPF_DOT, w, h);
                let off_body = border;
                let mut n = Dictionary::new();
                let mut on_dict = Dictionary::new();
                on_dict.set("Matrix", matrix_entries.clone());
                let mut off_dict = Dictionary::new();
                off_dict.set("Matrix", matrix_entries);
                n.set(on_value.as_str(), make_xobject(on_dict, on_body, w, h));
                n.set("Off", make_xobject(off_dict, off_body, w, h));
                Object::Dictionary(n)
            }
            FieldKind::Signature => Object::Null,
        };

        if let Some(Object::Dictionary(widget_dict)) = registry.get_mut(widget) {
            let mut ap = Dictionary::new();
            ap.set("N", ap_object);
            widget_dict.set("AP", Object::Dictionary(ap));
        }
    }
    Ok(())
}

/// Draws a widget's current normal appearance onto its page's content stream
/// at the widget's `/Rect`, registers the appearance as a page XObject, and
/// removes the widget from the page's `/Annots`.
pub(super) fn flatten_widget(registry: &mut Registry, widget: ObjectId) -> PdfResult<()> {
    let Some(widget_dict) = registry.get(widget).and_then(Object::as_dict) else { return Ok(()) };
    let page_id = widget_dict.get("P").and_then(Object::as_reference);
    let rect = rect_of(registry, widget);
    let as_state = widget_dict.get("AS").and_then(Object::as_name).map(|n| n.as_str().into_owned());
    let normal = widget_dict.get("AP").and_then(Object::as_dict).and_then(|ap| ap.get("N")).cloned();

    let xobject_id = match normal {
        Some(stream @ Object::Stream(_)) => registry.register(stream),
        Some(Object::Dictionary(states)) => {
            let key = as_state.unwrap_or_else(|| "Off".to_string());
            match states.get(&key).cloned() {
                Some(stream @ Object::Stream(_)) => registry.register(stream),
                _ => return Ok(()),
            }
        }
        _ => return Ok(()),
    };

    let Some(page_id) = page_id else { return Ok(()) };
    let Some(page_dict) = registry.get(page_id).and_then(Object::as_dict) else { return Ok(()) };
    let mut resources = page_dict.get("Resources").and_then(Object::as_dict).cloned().unwrap_or_default();
    let mut xobjects = resources.get("XObject").and_then(Object::as_dict).cloned().unwrap_or_default();
    let name = format!("Fm{}", xobjects.iter().count());
    xobjects.set(name.as_str(), xobject_id);
    resources.set("XObject", Object::Dictionary(xobjects));

    let invocation = format!("q 1 0 0 1 {} {} cm /{} Do Q\n", rect[0], rect[1], name);
    let contents_ref = page_dict.get("Contents").and_then(Object::as_reference);
    if let Some(contents_ref) = contents_ref {
        if let Some(Object::Stream(stream)) = registry.get_mut(contents_ref) {
            let mut data = std::mem::take(&mut stream.data);
            data.extend_from_slice(invocation.as_bytes());
            stream.data = data;
        }
    }

    let annots: Vec<Object> = page_dict
        .get("Annots")
        .and_then(Object::as_array)
        .map(|arr| arr.iter().filter(|o| o.as_reference() != Some(widget)).cloned().collect())
        .unwrap_or_default();

    if let Some(Object::Dictionary(page_dict)) = registry.get_mut(page_id) {
        page_dict.set("Resources", Object::Dictionary(resources));
        page_dict.set("Annots", Object::Array(annots));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_font_size_and_gray_color_from_da() {
        let da = parse_da("/Helv 10 Tf 0.2 g");
        assert_eq!(da.font_name, "Helv");
        assert_eq!(da.size, 10.0);
        assert_eq!(da.color, Rgb::gray(0.2));
    }

    #[test]
    fn parses_rgb_color_from_da() {
        let da = parse_da("/Helv 12 Tf 1 0 0 rg");
        assert_eq!(da.color, Rgb { r: 1.0, g: 0.0, b: 0.0 });
    }

    #[test]
    fn wraps_long_words_by_character() {
        let lines = wrap_text("supercalifragilisticexpialidocious", 10);
        assert!(lines.iter().all(|l| l.len() <= 10));
        assert!(lines.len() > 1);
    }

    #[test]
    fn rotation_matrix_swaps_dimensions_at_90_degrees() {
        let (_, w, h) = rotation_matrix(90, 100.0, 40.0);
        assert_eq!((w, h), (40.0, 100.0));
    }
}
