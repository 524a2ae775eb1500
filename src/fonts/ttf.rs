//! TrueType/OpenType table directory and per-table decoding.
//!
//! Structural field layouts here are grounded on the table struct definitions
//! this codebase has carried in two earlier, mutually inconsistent forms (a
//! lazy offset-arithmetic reader, and a separate `unsafe` pointer-cast reader).
//! This version keeps the field layouts both agreed on but reads them through
//! the safe `ByteScanner` cursor instead.

use crate::bytes::ByteScanner;
use crate::fonts::types::{LongDateTime, Tag};
use crate::fonts::FontError;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy)]
pub struct TableRecord {
    pub tag: Tag,
    pub offset: u32,
    pub length: u32,
}

#[derive(Debug, Clone)]
pub struct TableDirectory {
    pub sfnt_version: u32,
    pub records: Vec<TableRecord>,
}

impl TableDirectory {
    pub fn parse(bytes: &[u8]) -> Result<Self, FontError> {
        let mut s = ByteScanner::new(bytes);
        let sfnt_version = s.read_u32()?;
        const TRUETYPE: u32 = 0x0001_0000;
        const TRUETYPE_APPLE: u32 = 0x7472_7565; // "true"
        const OPENTYPE_CFF: u32 = 0x4F54_544F; // "OTTO"
        const TYPE1: u32 = 0x7479_7031; // "typ1"
        if !matches!(sfnt_version, TRUETYPE | TRUETYPE_APPLE | OPENTYPE_CFF | TYPE1) {
            return Err(FontError::UnsupportedFormat);
        }
        let num_tables = s.read_u16()?;
        s.advance(6); // searchRange, entrySelector, rangeShift
        let mut records = Vec::with_capacity(num_tables as usize);
        for _ in 0..num_tables {
            let tag = Tag::from_bytes(s.read_tag()?);
            let checksum = s.read_u32()?;
            let offset = s.read_u32()?;
            let length = s.read_u32()?;
            let _ = checksum;
            records.push(TableRecord { tag, offset, length });
        }
        Ok(TableDirectory { sfnt_version, records })
    }

    pub fn find(&self, tag: &[u8; 4]) -> Option<&TableRecord> {
        self.records.iter().find(|r| &r.tag.0 == tag)
    }

    pub fn table_bytes<'a>(&self, bytes: &'a [u8], tag: &[u8; 4]) -> Result<&'a [u8], FontError> {
        let record = self.find(tag).ok_or_else(|| {
            FontError::MissingTable(String::from_utf8_lossy(tag).into_owned())
        })?;
        bytes
            .get(record.offset as usize..(record.offset + record.length) as usize)
            .ok_or(FontError::OffsetPlusLengthBeyondEof)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Head {
    pub units_per_em: u16,
    pub x_min: i16,
    pub y_min: i16,
    pub x_max: i16,
    pub y_max: i16,
    pub index_to_loc_format: i16,
    pub created: LongDateTime,
    pub modified: LongDateTime,
    pub mac_style: u16,
}

impl Head {
    pub fn parse(bytes: &[u8]) -> Result<Self, FontError> {
        let mut s = ByteScanner::new(bytes);
        s.advance(4); // version
        s.advance(4); // fontRevision
        s.advance(4); // checksumAdjustment
        let magic = s.read_u32()?;
        if magic != 0x5F0F_3CF5 {
            return Err(FontError::MissingTable("head (bad magic)".into()));
        }
        s.advance(2); // flags
        let units_per_em = s.read_u16()?;
        let created = LongDateTime(s.read_i64()?);
        let modified = LongDateTime(s.read_i64()?);
        let x_min = s.read_i16()?;
        let y_min = s.read_i16()?;
        let x_max = s.read_i16()?;
        let y_max = s.read_i16()?;
        let mac_style = s.read_u16()?;
        s.advance(2); // lowestRecPPEM
        s.advance(2); // fontDirectionHint
        let index_to_loc_format = s.read_i16()?;
        Ok(Head {
            units_per_em,
            x_min,
            y_min,
            x_max,
            y_max,
            index_to_loc_format,
            created,
            modified,
            mac_style,
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Hhea {
    pub ascender: i16,
    pub descender: i16,
    pub line_gap: i16,
    pub number_of_h_metrics: u16,
}

impl Hhea {
    pub fn parse(bytes: &[u8]) -> Result<Self, FontError> {
        let mut s = ByteScanner::new(bytes);
        s.advance(4); // version
        let ascender = s.read_i16()?;
        let descender = s.read_i16()?;
        let line_gap = s.read_i16()?;
        s.advance(2 * 11); // advanceWidthMax .. metricDataFormat
        let number_of_h_metrics = s.read_u16()?;
        Ok(Hhea { ascender, descender, line_gap, number_of_h_metrics })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Maxp {
    pub num_glyphs: u16,
    pub max_component_depth: u16,
}

impl Maxp {
    pub fn parse(bytes: &[u8]) -> Result<Self, FontError> {
        let mut s = ByteScanner::new(bytes);
        let version = s.read_u32()?;
        let num_glyphs = s.read_u16()?;
        let max_component_depth = if version >= 0x0001_0000 {
            // Skip to maxComponentDepth: 13 additional u16 fields before it.
            s.advance(2 * 12);
            s.read_u16()?
        } else {
            1
        };
        Ok(Maxp { num_glyphs, max_component_depth: max_component_depth.max(1) })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LongHorMetric {
    pub advance_width: u16,
    pub lsb: i16,
}

pub fn parse_hmtx(
    bytes: &[u8],
    number_of_h_metrics: u16,
    num_glyphs: u16,
) -> Result<Vec<LongHorMetric>, FontError> {
    let mut s = ByteScanner::new(bytes);
    let mut metrics = Vec::with_capacity(num_glyphs as usize);
    for _ in 0..number_of_h_metrics {
        let advance_width = s.read_u16()?;
        let lsb = s.read_i16()?;
        metrics.push(LongHorMetric { advance_width, lsb });
    }
    let last = *metrics.last().ok_or(FontError::NoHorizontalGlyphMetrics)?;
    for _ in number_of_h_metrics..num_glyphs {
        let lsb = s.read_i16().unwrap_or(0);
        metrics.push(LongHorMetric { advance_width: last.advance_width, lsb });
    }
    Ok(metrics)
}

pub fn parse_loca(bytes: &[u8], num_glyphs: u16, long_format: bool) -> Result<Vec<u32>, FontError> {
    let mut s = ByteScanner::new(bytes);
    let mut offsets = Vec::with_capacity(num_glyphs as usize + 1);
    for _ in 0..=num_glyphs {
        offsets.push(if long_format { s.read_u32()? } else { s.read_u16()? as u32 * 2 });
    }
    Ok(offsets)
}

#[derive(Debug, Clone)]
pub enum GlyphOutline {
    Empty,
    Simple,
    Composite { components: Vec<u16> },
}

/// Reads just enough of a glyph's `glyf` entry to classify it and, for
/// composites, discover every referenced component id (used by the subsetter's
/// glyph closure and not otherwise exposed to callers of this module).
pub fn read_glyph_components(glyf_bytes: &[u8]) -> Result<GlyphOutline, FontError> {
    if glyf_bytes.is_empty() {
        return Ok(GlyphOutline::Empty);
    }
    let mut s = ByteScanner::new(glyf_bytes);
    let number_of_contours = s.read_i16()?;
    if number_of_contours >= 0 {
        return Ok(GlyphOutline::Simple);
    }
    s.advance(8); // xMin, yMin, xMax, yMax
    let mut components = Vec::new();
    loop {
        let flags = s.read_u16()?;
        let glyph_index = s.read_u16()?;
        components.push(glyph_index);

        const ARG_1_AND_2_ARE_WORDS: u16 = 0x0001;
        const WE_HAVE_A_SCALE: u16 = 0x0008;
        const MORE_COMPONENTS: u16 = 0x0020;
        const WE_HAVE_AN_X_AND_Y_SCALE: u16 = 0x0040;
        const WE_HAVE_A_TWO_BY_TWO: u16 = 0x0080;

        s.advance(if flags & ARG_1_AND_2_ARE_WORDS != 0 { 4 } else { 2 });
        if flags & WE_HAVE_A_SCALE != 0 {
            s.advance(2);
        } else if flags & WE_HAVE_AN_X_AND_Y_SCALE != 0 {
            s.advance(4);
        } else if flags & WE_HAVE_A_TWO_BY_TWO != 0 {
            s.advance(8);
        }
        if flags & MORE_COMPONENTS == 0 {
            break;
        }
    }
    Ok(GlyphOutline::Composite { components })
}

#[derive(Debug, Clone)]
pub struct NameTable {
    pub records: HashMap<(u16, u16, u16, u16), String>,
}

impl NameTable {
    pub fn parse(bytes: &[u8]) -> Result<Self, FontError> {
        let mut s = ByteScanner::new(bytes);
        s.advance(2); // format
        let count = s.read_u16()?;
        let string_offset = s.read_u16()? as usize;
        let mut entries = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let platform_id = s.read_u16()?;
            let encoding_id = s.read_u16()?;
            let language_id = s.read_u16()?;
            let name_id = s.read_u16()?;
            let length = s.read_u16()?;
            let offset = s.read_u16()?;
            entries.push((platform_id, encoding_id, language_id, name_id, length, offset));
        }
        let mut records = HashMap::new();
        for (platform_id, encoding_id, language_id, name_id, length, offset) in entries {
            let start = string_offset + offset as usize;
            let end = start + length as usize;
            let raw = match bytes.get(start..end) {
                Some(raw) => raw,
                None => continue,
            };
            let decoded = decode_name_bytes(platform_id, encoding_id, raw);
            records.insert((platform_id, encoding_id, language_id, name_id), decoded);
        }
        Ok(NameTable { records })
    }

    /// Preferred English name for a given name id, trying Unicode, then
    /// Windows, then Macintosh platforms in turn.
    pub fn preferred(&self, name_id: u16) -> Option<&str> {
        const UNICODE: u16 = 0;
        const MACINTOSH: u16 = 1;
        const WINDOWS: u16 = 3;
        self.records
            .iter()
            .filter(|((platform, _, _, nid), _)| *nid == name_id && *platform == UNICODE)
            .map(|(_, v)| v.as_str())
            .next()
            .or_else(|| {
                self.records
                    .iter()
                    .filter(|((platform, _, lang, nid), _)| {
                        *nid == name_id && *platform == WINDOWS && *lang == 0x0409
                    })
                    .map(|(_, v)| v.as_str())
                    .next()
            })
            .or_else(|| {
                self.records
                    .iter()
                    .filter(|((platform, _, _, nid), _)| *nid == name_id && *platform == MACINTOSH)
                    .map(|(_, v)| v.as_str())
                    .next()
            })
    }
}

fn decode_name_bytes(platform_id: u16, encoding_id: u16, raw: &[u8]) -> String {
    const MACINTOSH: u16 = 1;
    if platform_id == MACINTOSH && encoding_id == 0 {
        raw.iter().map(|&b| b as char).collect()
    } else {
        let units: Vec<u16> = raw
            .chunks(2)
            .map(|c| if c.len() == 2 { u16::from_be_bytes([c[0], c[1]]) } else { 0 })
            .collect();
        String::from_utf16_lossy(&units)
    }
}

/// Macintosh standard glyph order, used by `post` table format 2.0 for indices
/// below 258 (§4.5).
pub const MACINTOSH_STANDARD_GLYPH_NAMES: [&str; 258] = macintosh_glyph_names::NAMES;

mod macintosh_glyph_names {
    pub const NAMES: [&str; 258] = [
        ".notdef", ".null", "nonmarkingreturn", "space", "exclam", "quotedbl", "numbersign",
        "dollar", "percent", "ampersand", "quotesingle", "parenleft", "parenright", "asterisk",
        "plus", "comma", "hyphen", "period", "slash", "zero", "one", "two", "three", "four",
        "five", "six", "seven", "eight", "nine", "colon", "semicolon", "less", "equal", "greater",
        "question", "at", "A", "B", "C", "D", "E", "F", "G", "H", "I", "J", "K", "L", "M", "N",
        "O", "P", "Q", "R", "S", "T", "U", "V", "W", "X", "Y", "Z", "bracketleft", "backslash",
        "bracketright", "asciicircum", "underscore", "grave", "a", "b", "c", "d", "e", "f", "g",
        "h", "i", "j", "k", "l", "m", "n", "o", "p", "q", "r", "s", "t", "u", "v", "w", "x", "y",
        "z", "braceleft", "bar", "braceright", "asciitilde", "Adieresis", "Aring", "Ccedilla",
        "Eacute", "Ntilde", "Odieresis", "Udieresis", "aacute", "agrave", "acircumflex",
        "adieresis", "atilde", "aring", "ccedilla", "eacute", "egrave", "ecircumflex",
        "edieresis", "iacute", "igrave", "icircumflex", "idieresis", "ntilde", "oacute", "ograve",
        "ocircumflex", "odieresis", "otilde", "uacute", "ugrave", "ucircumflex", "udieresis",
        "dagger", "degree", "cent", "sterling", "section", "bullet", "paragraph", "germandbls",
        "registered", "copyright", "trademark", "acute", "dieresis", "notequal", "AE", "Oslash",
        "infinity", "plusminus", "lessequal", "greaterequal", "yen", "mu", "partialdiff",
        "summation", "product", "pi", "integral", "ordfeminine", "ordmasculine", "Omega", "ae",
        "oslash", "questiondown", "exclamdown", "logicalnot", "radical", "florin", "approxequal",
        "Delta", "guillemotleft", "guillemotright", "ellipsis", "nonbreakingspace", "Agrave",
        "Atilde", "Otilde", "OE", "oe", "endash", "emdash", "quotedblleft", "quotedblright",
        "quoteleft", "quoteright", "divide", "lozenge", "ydieresis", "Ydieresis", "fraction",
        "currency", "guilsinglleft", "guilsinglright", "fi", "fl", "daggerdbl", "periodcentered",
        "quotesinglbase", "quotedblbase", "perthousand", "Acircumflex", "Ecircumflex", "Aacute",
        "Edieresis", "Egrave", "Iacute", "Icircumflex", "Idieresis", "Igrave", "Oacute",
        "Ocircumflex", "apple", "Ograve", "Uacute", "Ucircumflex", "Ugrave", "dotlessi",
        "circumflex", "tilde", "macron", "breve", "dotaccent", "ring", "cedilla",
        "hungarumlaut", "ogonek", "caron", "Lslash", "lslash", "Scaron", "scaron", "Zcaron",
        "zcaron", "brokenbar", "Eth", "eth", "Yacute", "yacute", "Thorn", "thorn", "minus",
        "multiply", "onesuperior", "twosuperior", "threesuperior", "onehalf", "onequarter",
        "threequarters", "franc", "Gbreve", "gbreve", "Idotaccent", "Scedilla", "scedilla",
        "Cacute", "cacute", "Ccaron", "ccaron", "dcroat",
    ];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unknown_sfnt_version() {
        let mut data = vec![0xFFu8, 0xFF, 0xFF, 0xFF];
        data.extend_from_slice(&[0, 0, 0, 0, 0, 0]);
        assert!(matches!(TableDirectory::parse(&data), Err(FontError::UnsupportedFormat)));
    }

    #[test]
    fn simple_glyph_has_no_components() {
        let glyf = [0u8, 1]; // numberOfContours = 1, truncated but enough to classify
        let outline = read_glyph_components(&glyf).unwrap();
        assert!(matches!(outline, GlyphOutline::Simple));
    }

    #[test]
    fn empty_glyph_is_empty() {
        assert!(matches!(read_glyph_components(&[]).unwrap(), GlyphOutline::Empty));
    }
}
