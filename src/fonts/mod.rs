//! TrueType/OpenType font parsing, metrics, and glyph lookup.
//!
//! The table directory and per-table decoders live in [`ttf`] and
//! [`extra_tables`]; this module assembles them into the `Font` value the rest
//! of the crate (fonts embedded on a PDF page, and the subsetter) works with.

mod cmap;
pub mod extra_tables;
pub mod subset;
pub mod ttf;
mod types;

use crate::bytes::ScanError;
use crate::fonts::cmap::Cmap;
use crate::fonts::extra_tables::{Avar, Fvar, Os2, Post, Stat};
use crate::fonts::ttf::{Head, Hhea, Maxp, NameTable, TableDirectory};
use std::sync::Arc;
use thiserror::Error;

/// The EM square unit.
pub(crate) struct Em;
/// The unit of `FWord`/`UFWord` quantities read from font tables.
pub(crate) struct FontDesignUnit;

#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub struct GlyphId(pub u16);

#[derive(Debug, Error)]
pub enum FontError {
    #[error("unsupported font format (only TrueType/OpenType sfnt fonts are supported)")]
    UnsupportedFormat,

    #[error("font data ends before the offset being read")]
    OffsetBeyondEof,

    #[error("a table's offset + length extends past the end of the font data")]
    OffsetPlusLengthBeyondEof,

    #[error("required table {0:?} is missing")]
    MissingTable(String),

    #[error("no PostScript name in a supported encoding")]
    NoSupportedPostscriptName,

    #[error("no character map in a supported format")]
    NoSupportedCmap,

    #[error("no horizontal metrics for glyphs")]
    NoHorizontalGlyphMetrics,

    #[error(transparent)]
    Scan(#[from] ScanError),
}

/// A parsed font plus the glyph-by-glyph metrics and tables this crate's font
/// embedding and subsetting code needs. `bytes` retains the original file so
/// glyph outlines can be re-read lazily by the subsetter.
pub struct Font {
    bytes: Vec<u8>,
    table_directory: TableDirectory,
    cmap: Cmap,
    pub postscript_name: String,
    pub family_name: Option<String>,
    /// Indexed by glyph id.
    pub glyph_widths: Vec<u16>,
    pub units_per_em: u16,
    pub ascender: i16,
    pub descender: i16,
    pub bbox: (i16, i16, i16, i16),
    pub num_glyphs: u16,
    pub max_component_depth: u16,
    pub index_to_loc_format: i16,
    pub italic_angle_from_post: bool,
    pub os2: Option<Os2>,
    pub post: Option<Post>,
    pub fvar: Option<Fvar>,
    pub stat: Option<Stat>,
    pub avar: Option<Avar>,
}

impl Font {
    pub fn parse(bytes: impl Into<Vec<u8>>) -> Result<Arc<Self>, FontError> {
        let bytes = bytes.into();
        let font = Self::parse_ref(&bytes)?;
        Ok(Arc::new(font))
    }

    fn parse_ref(bytes: &[u8]) -> Result<Self, FontError> {
        let table_directory = TableDirectory::parse(bytes)?;

        let head_bytes = table_directory.table_bytes(bytes, b"head")?;
        let head = Head::parse(head_bytes)?;

        let maxp_bytes = table_directory.table_bytes(bytes, b"maxp")?;
        let maxp = Maxp::parse(maxp_bytes)?;

        let hhea_bytes = table_directory.table_bytes(bytes, b"hhea")?;
        let hhea = Hhea::parse(hhea_bytes)?;

        let hmtx_bytes = table_directory.table_bytes(bytes, b"hmtx")?;
        let metrics = ttf::parse_hmtx(hmtx_bytes, hhea.number_of_h_metrics, maxp.num_glyphs)?;
        let glyph_widths = metrics.iter().map(|m| m.advance_width).collect();

        let name_bytes = table_directory.table_bytes(bytes, b"name")?;
        let name_table = NameTable::parse(name_bytes)?;
        const POSTSCRIPT_NAME_ID: u16 = 6;
        const FAMILY_NAME_ID: u16 = 1;
        let postscript_name = name_table
            .preferred(POSTSCRIPT_NAME_ID)
            .map(str::to_owned)
            .ok_or(FontError::NoSupportedPostscriptName)?;
        let family_name = name_table.preferred(FAMILY_NAME_ID).map(str::to_owned);

        let cmap_bytes = table_directory.table_bytes(bytes, b"cmap")?;
        let cmap = Cmap::parse(bytes, cmap_bytes)?;

        let os2 = table_directory
            .table_bytes(bytes, b"OS/2")
            .ok()
            .and_then(|b| Os2::parse(b).ok());
        let post = table_directory
            .table_bytes(bytes, b"post")
            .ok()
            .and_then(|b| Post::parse(b).ok());
        let fvar = table_directory
            .table_bytes(bytes, b"fvar")
            .ok()
            .and_then(|b| Fvar::parse(b).ok());
        let stat = table_directory
            .table_bytes(bytes, b"STAT")
            .ok()
            .and_then(|b| Stat::parse(b).ok());
        let avar = table_directory
            .table_bytes(bytes, b"avar")
            .ok()
            .and_then(|b| Avar::parse(b).ok());

        Ok(Font {
            bytes: bytes.to_vec(),
            table_directory,
            cmap,
            postscript_name,
            family_name,
            glyph_widths,
            units_per_em: head.units_per_em,
            ascender: hhea.ascender,
            descender: hhea.descender,
            bbox: (head.x_min, head.y_min, head.x_max, head.y_max),
            num_glyphs: maxp.num_glyphs,
            max_component_depth: maxp.max_component_depth,
            index_to_loc_format: head.index_to_loc_format,
            italic_angle_from_post: head.mac_style & 0x0002 != 0,
            os2,
            post,
            fvar,
            stat,
            avar,
        })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn table_directory(&self) -> &TableDirectory {
        &self.table_directory
    }

    pub fn glyph_id_for(&self, ch: char) -> GlyphId {
        const NOTDEF: u16 = 0;
        GlyphId(self.cmap.get(ch as u32).unwrap_or(NOTDEF))
    }

    pub fn to_glyph_ids(&self, text: &str) -> Vec<GlyphId> {
        text.chars().map(|c| self.glyph_id_for(c)).collect()
    }

    pub fn each_code_point<F: FnMut(char, GlyphId)>(&self, mut f: F) {
        self.cmap.each_code_point(|ch, glyph| f(ch, GlyphId(glyph)))
    }

    pub fn advance_width(&self, glyph_id: GlyphId) -> u16 {
        self.glyph_widths.get(glyph_id.0 as usize).copied().unwrap_or(0)
    }

    pub fn glyph_name(&self, glyph_id: GlyphId) -> Option<String> {
        self.post.as_ref().and_then(|p| p.glyph_name(glyph_id.0))
    }
}

/// Tracks which glyphs of a font have been used so far, so the subsetter and
/// the "do not subset this font" decision (when it is also used in a form
/// field appearance) have somewhere to accumulate state.
#[derive(Debug, Default, Clone)]
pub struct UsedGlyphs {
    bits: smallbitvec::SmallBitVec,
    pub used_in_form: bool,
}

impl UsedGlyphs {
    pub fn new() -> Self {
        let mut bits = smallbitvec::SmallBitVec::new();
        bits.push(true); // glyph 0 (.notdef) is always kept
        UsedGlyphs { bits, used_in_form: false }
    }

    pub fn mark(&mut self, glyph_id: GlyphId) {
        let index = glyph_id.0 as usize;
        while self.bits.len() <= index {
            self.bits.push(false);
        }
        self.bits.set(index, true);
    }

    pub fn mark_all(&mut self, ids: impl IntoIterator<Item = GlyphId>) {
        for id in ids {
            self.mark(id);
        }
    }

    pub fn iter_used(&self) -> impl Iterator<Item = u16> + '_ {
        self.bits
            .iter()
            .enumerate()
            .filter(|&(_, used)| used)
            .map(|(i, _)| i as u16)
    }

    pub fn is_used(&self, glyph_id: u16) -> bool {
        self.bits.get(glyph_id as usize).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn used_glyphs_always_keeps_notdef() {
        let glyphs = UsedGlyphs::new();
        assert!(glyphs.is_used(0));
    }

    #[test]
    fn used_glyphs_marks_and_iterates_in_order() {
        let mut glyphs = UsedGlyphs::new();
        glyphs.mark(GlyphId(5));
        glyphs.mark(GlyphId(2));
        let used: Vec<u16> = glyphs.iter_used().collect();
        assert_eq!(used, vec![0, 2, 5]);
    }
}
