//! Typed access to the trailer's `/Info` dictionary (§4.9): the usual
//! title/author/subject/keywords/creator/producer plus the two PDF-format
//! dates. A document built from scratch gets `producer` stamped
//! automatically, mirroring the teacher's `/Producer` write in
//! `pdf/convert.rs`; a loaded document's `/Info` is left alone unless the
//! caller calls a setter.

use crate::object::registry::Registry;
use crate::object::{Dictionary, Object, ObjectId, PdfString};

/// Stamped into `/Producer` for documents created from scratch.
pub const PRODUCER: &str = "pdfcore <https://github.com/SimonSapin/victor>";

/// A PDF date string (`D:YYYYMMDDHHmmSSOHH'mm'`), kept in its own fields
/// rather than pulled apart and reassembled through a general-purpose clock
/// type, since this is the only place this crate needs one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PdfDate {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    /// Offset from UTC in minutes, e.g. `-300` for `-05'00'`.
    pub utc_offset_minutes: i16,
}

impl PdfDate {
    pub fn parse(bytes: &[u8]) -> Option<PdfDate> {
        let s = std::str::from_utf8(bytes).ok()?;
        let s = s.strip_prefix("D:").unwrap_or(s);
        let take = |s: &str, n: usize| -> Option<(&str, &str)> {
            if s.len() < n {
                None
            } else {
                Some(s.split_at(n))
            }
        };
        let (year, rest) = take(s, 4)?;
        let year: u16 = year.parse().ok()?;
        let mut month = 1u8;
        let mut day = 1u8;
        let mut hour = 0u8;
        let mut minute = 0u8;
        let mut second = 0u8;
        let mut rest = rest;
        if let Some((m, r)) = take(rest, 2) {
            month = m.parse().ok()?;
            rest = r;
        }
        if let Some((d, r)) = take(rest, 2) {
            day = d.parse().ok()?;
            rest = r;
        }
        if let Some((h, r)) = take(rest, 2) {
            hour = h.parse().ok()?;
            rest = r;
        }
        if let Some((min, r)) = take(rest, 2) {
            minute = min.parse().ok()?;
            rest = r;
        }
        if let Some((sec, r)) = take(rest, 2) {
            second = sec.parse().ok()?;
            rest = r;
        }
        let utc_offset_minutes = parse_offset(rest).unwrap_or(0);
        Some(PdfDate { year, month, day, hour, minute, second, utc_offset_minutes })
    }

    pub fn format(&self) -> String {
        let sign = if self.utc_offset_minutes < 0 { '-' } else { '+' };
        let abs = self.utc_offset_minutes.unsigned_abs();
        format!(
            "D:{:04}{:02}{:02}{:02}{:02}{:02}{}{:02}'{:02}'",
            self.year,
            self.month,
            self.day,
            self.hour,
            self.minute,
            self.second,
            sign,
            abs / 60,
            abs % 60,
        )
    }
}

fn parse_offset(rest: &str) -> Option<i16> {
    let mut chars = rest.chars();
    let sign = match chars.next()? {
        '+' => 1,
        '-' => -1,
        'Z' => return Some(0),
        _ => return None,
    };
    let rest: String = chars.collect();
    let rest = rest.trim_end_matches('\'');
    let mut parts = rest.splitn(2, '\'');
    let hours: i16 = parts.next()?.parse().ok()?;
    let minutes: i16 = parts.next().unwrap_or("0").parse().ok()?;
    Some(sign * (hours * 60 + minutes))
}

/// A view over one document's `/Info` dict. Holds the dict's object id so
/// writes go through the registry and get picked up by incremental save's
/// dirty tracking.
pub struct DocumentInfo {
    id: ObjectId,
}

impl DocumentInfo {
    /// Looks up the trailer's `/Info` entry, creating an empty dict (stamped
    /// with `producer`) if `from_scratch` is true and none exists yet.
    pub fn new(id: ObjectId) -> DocumentInfo {
        DocumentInfo { id }
    }

    /// Registers a fresh `/Info` dict with `/Producer` pre-filled, for
    /// documents built from scratch rather than loaded.
    pub fn create(registry: &mut Registry) -> DocumentInfo {
        let mut dict = Dictionary::new();
        dict.set("Producer", Object::String(PdfString::literal(PRODUCER)));
        let id = registry.register(Object::Dictionary(dict));
        DocumentInfo { id }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    fn get_str(&self, registry: &Registry, key: &str) -> Option<String> {
        registry.get(self.id)?.as_dict()?.get(key)?.as_string().map(|s| s.as_utf8_lossy().into_owned())
    }

    fn set_str(&self, registry: &mut Registry, key: &str, value: &str) {
        if let Some(dict) = registry.get_mut(self.id).and_then(Object::as_dict_mut) {
            dict.set(key, Object::String(PdfString::literal(value.to_string())));
        }
    }

    fn get_date(&self, registry: &Registry, key: &str) -> Option<PdfDate> {
        let bytes = registry.get(self.id)?.as_dict()?.get(key)?.as_string()?.bytes.clone();
        PdfDate::parse(&bytes)
    }

    fn set_date(&self, registry: &mut Registry, key: &str, value: PdfDate) {
        if let Some(dict) = registry.get_mut(self.id).and_then(Object::as_dict_mut) {
            dict.set(key, Object::String(PdfString::literal(value.format())));
        }
    }

    pub fn title(&self, registry: &Registry) -> Option<String> {
        self.get_str(registry, "Title")
    }
    pub fn set_title(&self, registry: &mut Registry, value: &str) {
        self.set_str(registry, "Title", value)
    }

    pub fn author(&self, registry: &Registry) -> Option<String> {
        self.get_str(registry, "Author")
    }
    pub fn set_author(&self, registry: &mut Registry, value: &str) {
        self.set_str(registry, "Author", value)
    }

    pub fn subject(&self, registry: &Registry) -> Option<String> {
        self.get_str(registry, "Subject")
    }
    pub fn set_subject(&self, registry: &mut Registry, value: &str) {
        self.set_str(registry, "Subject", value)
    }

    pub fn keywords(&self, registry: &Registry) -> Option<String> {
        self.get_str(registry, "Keywords")
    }
    pub fn set_keywords(&self, registry: &mut Registry, value: &str) {
        self.set_str(registry, "Keywords", value)
    }

    pub fn creator(&self, registry: &Registry) -> Option<String> {
        self.get_str(registry, "Creator")
    }
    pub fn set_creator(&self, registry: &mut Registry, value: &str) {
        self.set_str(registry, "Creator", value)
    }

    pub fn producer(&self, registry: &Registry) -> Option<String> {
        self.get_str(registry, "Producer")
    }
    pub fn set_producer(&self, registry: &mut Registry, value: &str) {
        self.set_str(registry, "Producer", value)
    }

    pub fn creation_date(&self, registry: &Registry) -> Option<PdfDate> {
        self.get_date(registry, "CreationDate")
    }
    pub fn set_creation_date(&self, registry: &mut Registry, value: PdfDate) {
        self.set_date(registry, "CreationDate", value)
    }

    pub fn mod_date(&self, registry: &Registry) -> Option<PdfDate> {
        self.get_date(registry, "ModDate")
    }
    pub fn set_mod_date(&self, registry: &mut Registry, value: PdfDate) {
        self.set_date(registry, "ModDate", value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Object;

    #[test]
    fn create_stamps_the_producer_string() {
        let mut registry = Registry::new();
        let info = DocumentInfo::create(&mut registry);
        assert_eq!(info.producer(&registry).as_deref(), Some(PRODUCER));
    }

    #[test]
    fn title_round_trips_through_set_and_get() {
        let mut registry = Registry::new();
        let info = DocumentInfo::create(&mut registry);
        info.set_title(&mut registry, "Annual Report");
        assert_eq!(info.title(&registry).as_deref(), Some("Annual Report"));
    }

    #[test]
    fn loaded_document_producer_is_left_untouched() {
        let mut registry = Registry::new();
        let mut dict = Dictionary::new();
        dict.set("Producer", Object::String(PdfString::literal("Acrobat Distiller")));
        let id = registry.register(Object::Dictionary(dict));
        let info = DocumentInfo::new(id);
        assert_eq!(info.producer(&registry).as_deref(), Some("Acrobat Distiller"));
    }

    #[test]
    fn pdf_date_round_trips_through_parse_and_format() {
        let date = PdfDate { year: 2024, month: 3, day: 5, hour: 9, minute: 30, second: 0, utc_offset_minutes: -300 };
        let formatted = date.format();
        assert_eq!(formatted, "D:20240305093000-05'00'");
        let parsed = PdfDate::parse(formatted.as_bytes()).unwrap();
        assert_eq!(parsed, date);
    }

    #[test]
    fn pdf_date_parses_a_utc_zulu_suffix() {
        let parsed = PdfDate::parse(b"D:20240101120000Z").unwrap();
        assert_eq!(parsed.utc_offset_minutes, 0);
    }
}
