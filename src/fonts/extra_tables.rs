//! Decoders for `post`, `OS/2`, and the variable-font tables `fvar`/`STAT`/`avar`.
//! These are read structurally (enough to answer the accessors this crate
//! exposes) rather than exhaustively modeling every field a font tool would need.

use crate::bytes::ByteScanner;
use crate::fonts::ttf::MACINTOSH_STANDARD_GLYPH_NAMES;
use crate::fonts::FontError;

#[derive(Debug, Clone)]
pub enum Post {
    /// Format 1.0: glyphs use the standard Macintosh glyph order verbatim.
    Version1,
    /// Format 2.0: per-glyph indices, with custom names appended for indices >= 258.
    Version2 { glyph_name_index: Vec<u16>, custom_names: Vec<String> },
    /// Format 3.0 (no glyph names stored) or any other version we don't special-case.
    NoNames,
}

impl Post {
    pub fn parse(bytes: &[u8]) -> Result<Self, FontError> {
        let mut s = ByteScanner::new(bytes);
        let version = s.read_u32()?;
        match version {
            0x0001_0000 => Ok(Post::Version1),
            0x0002_0000 => {
                s.advance(4 * 7); // italicAngle, underlinePosition/Thickness, isFixedPitch, min/maxMemType
                let num_glyphs = s.read_u16()?;
                let mut glyph_name_index = Vec::with_capacity(num_glyphs as usize);
                for _ in 0..num_glyphs {
                    glyph_name_index.push(s.read_u16()?);
                }
                let mut custom_names = Vec::new();
                while s.remaining() > 0 {
                    let len = match s.read_u8() {
                        Ok(len) => len,
                        Err(_) => break,
                    };
                    match s.read_bytes(len as usize) {
                        Ok(raw) => custom_names.push(String::from_utf8_lossy(raw).into_owned()),
                        Err(_) => break,
                    }
                }
                Ok(Post::Version2 { glyph_name_index, custom_names })
            }
            _ => Ok(Post::NoNames),
        }
    }

    pub fn glyph_name(&self, glyph_id: u16) -> Option<String> {
        match self {
            Post::Version1 => MACINTOSH_STANDARD_GLYPH_NAMES
                .get(glyph_id as usize)
                .map(|s| s.to_string()),
            Post::Version2 { glyph_name_index, custom_names } => {
                let index = *glyph_name_index.get(glyph_id as usize)?;
                if index < 258 {
                    MACINTOSH_STANDARD_GLYPH_NAMES.get(index as usize).map(|s| s.to_string())
                } else {
                    custom_names.get(index as usize - 258).cloned()
                }
            }
            Post::NoNames => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Os2 {
    pub us_weight_class: u16,
    pub fs_type: u16,
    pub s_family_class: i16,
    pub panose: [u8; 10],
    pub us_first_char_index: u16,
    pub us_last_char_index: u16,
    pub s_typo_ascender: i16,
    pub s_typo_descender: i16,
    pub s_cap_height: i16,
    pub fs_selection: u16,
}

impl Os2 {
    pub fn parse(bytes: &[u8]) -> Result<Self, FontError> {
        let mut s = ByteScanner::new(bytes);
        s.advance(2); // version
        s.advance(2); // xAvgCharWidth
        let us_weight_class = s.read_u16()?;
        s.advance(2); // usWidthClass
        let fs_type = s.read_u16()?;
        s.advance(2 * 11); // ySubscript*4, ySuperscript*4, yStrikeout*2
        let s_family_class = s.read_i16()?;
        let mut panose = [0u8; 10];
        for slot in panose.iter_mut() {
            *slot = s.read_u8()?;
        }
        s.advance(4 * 4); // ulUnicodeRange1..4
        s.advance(4); // achVendID
        let fs_selection = s.read_u16()?;
        let us_first_char_index = s.read_u16()?;
        let us_last_char_index = s.read_u16()?;
        let s_typo_ascender = s.read_i16()?;
        let s_typo_descender = s.read_i16()?;
        s.advance(2); // sTypoLineGap
        s.advance(2 * 2); // usWinAscent/Descent
        let s_cap_height = if s.remaining() >= 2 + 2 + 2 + 2 + 2 {
            s.advance(4 * 2); // ulCodePageRange1/2 (version >= 1)
            s.advance(2); // sxHeight
            s.read_i16().unwrap_or(0)
        } else {
            0
        };
        Ok(Os2 {
            us_weight_class,
            fs_type,
            s_family_class,
            panose,
            us_first_char_index,
            us_last_char_index,
            s_typo_ascender,
            s_typo_descender,
            s_cap_height,
            fs_selection,
        })
    }
}

#[derive(Debug, Clone)]
pub struct VariationAxis {
    pub tag: [u8; 4],
    pub min_value: f32,
    pub default_value: f32,
    pub max_value: f32,
}

#[derive(Debug, Clone, Default)]
pub struct Fvar {
    pub axes: Vec<VariationAxis>,
}

impl Fvar {
    pub fn parse(bytes: &[u8]) -> Result<Self, FontError> {
        let mut s = ByteScanner::new(bytes);
        s.advance(4); // version
        let axes_array_offset = s.read_u16()?;
        s.advance(2); // reserved
        let axis_count = s.read_u16()?;
        let axis_size = s.read_u16()?;
        let mut axes = Vec::with_capacity(axis_count as usize);
        let mut reader = ByteScanner::at(bytes, axes_array_offset as usize);
        for _ in 0..axis_count {
            let start = reader.position();
            let tag = reader.read_tag()?;
            let min_value = reader.read_fixed()?;
            let default_value = reader.read_fixed()?;
            let max_value = reader.read_fixed()?;
            axes.push(VariationAxis { tag, min_value, default_value, max_value });
            reader.seek(start + axis_size as usize);
        }
        Ok(Fvar { axes })
    }
}

/// `STAT`: only the axis records are read; style-attribute value tables are
/// left to the caller if it needs them (not used by this crate's own callers).
#[derive(Debug, Clone, Default)]
pub struct Stat {
    pub axis_tags: Vec<[u8; 4]>,
}

impl Stat {
    pub fn parse(bytes: &[u8]) -> Result<Self, FontError> {
        let mut s = ByteScanner::new(bytes);
        s.advance(2); // majorVersion
        s.advance(2); // minorVersion
        let design_axis_size = s.read_u16()?;
        let design_axis_count = s.read_u16()?;
        let design_axes_offset = s.read_u32()?;
        let mut axis_tags = Vec::with_capacity(design_axis_count as usize);
        let mut reader = ByteScanner::at(bytes, design_axes_offset as usize);
        for _ in 0..design_axis_count {
            let start = reader.position();
            axis_tags.push(reader.read_tag()?);
            reader.seek(start + design_axis_size as usize);
        }
        Ok(Stat { axis_tags })
    }
}

/// `avar`: segment maps normalizing each axis's `[-1, 1]` range.
#[derive(Debug, Clone, Default)]
pub struct Avar {
    pub segment_maps: Vec<Vec<(f32, f32)>>,
}

impl Avar {
    pub fn parse(bytes: &[u8]) -> Result<Self, FontError> {
        let mut s = ByteScanner::new(bytes);
        s.advance(4); // version
        s.advance(2); // reserved
        let axis_count = s.read_u16()?;
        let mut segment_maps = Vec::with_capacity(axis_count as usize);
        for _ in 0..axis_count {
            let pair_count = s.read_u16()?;
            let mut pairs = Vec::with_capacity(pair_count as usize);
            for _ in 0..pair_count {
                pairs.push((s.read_f2dot14()?, s.read_f2dot14()?));
            }
            segment_maps.push(pairs);
        }
        Ok(Avar { segment_maps })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post_version1_uses_standard_names() {
        let post = Post::Version1;
        assert_eq!(post.glyph_name(0).as_deref(), Some(".notdef"));
        assert_eq!(post.glyph_name(36).as_deref(), Some("A"));
    }
}
