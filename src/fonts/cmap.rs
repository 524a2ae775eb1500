//! `cmap` subtable decoding: formats 0, 4, 6 and 12.
//!
//! The segment-search logic for format 4 and the group-search logic for format
//! 12 are grounded on this codebase's earlier `Position<T>`/binary-search based
//! reader; both are reworked here against the safe `ByteScanner` cursor and
//! extended to cover formats 0 and 6.

use crate::bytes::ByteScanner;
use crate::fonts::FontError;
use std::char;

pub enum Cmap {
    Format0 { glyph_id_array: Vec<u8> },
    Format4(Format4),
    Format6 { first_code: u16, glyph_ids: Vec<u16> },
    Format12(Format12),
}

impl Cmap {
    pub fn parse(bytes: &[u8], cmap_table: &[u8]) -> Result<Self, FontError> {
        let mut s = ByteScanner::new(cmap_table);
        s.advance(2); // version
        let num_tables = s.read_u16()?;
        let mut candidates = Vec::with_capacity(num_tables as usize);
        for _ in 0..num_tables {
            let platform_id = s.read_u16()?;
            let encoding_id = s.read_u16()?;
            let offset = s.read_u32()?;
            candidates.push((platform_id, encoding_id, offset));
        }

        // Preference order: (3,10) > (0,4) > (3,1) > (0,3) > (0,x) > (1,0) > anything.
        let rank = |platform: u16, encoding: u16| -> i32 {
            match (platform, encoding) {
                (3, 10) => 0,
                (0, 4) | (0, 6) => 1,
                (3, 1) => 2,
                (0, 3) => 3,
                (0, _) => 4,
                (3, 0) => 5,
                (1, 0) => 6,
                _ => 100,
            }
        };
        candidates.sort_by_key(|&(p, e, _)| rank(p, e));

        for (_, _, offset) in candidates {
            let subtable = match cmap_table.get(offset as usize..) {
                Some(bytes) => bytes,
                None => continue,
            };
            let mut sub = ByteScanner::new(subtable);
            let format = match sub.read_u16() {
                Ok(f) => f,
                Err(_) => continue,
            };
            match format {
                0 => return Ok(Self::parse_format0(subtable)?),
                4 => return Ok(Cmap::Format4(Format4::parse(subtable)?)),
                6 => return Ok(Self::parse_format6(subtable)?),
                12 => return Ok(Cmap::Format12(Format12::parse(subtable)?)),
                _ => continue,
            }
        }
        let _ = bytes;
        Err(FontError::NoSupportedCmap)
    }

    fn parse_format0(subtable: &[u8]) -> Result<Self, FontError> {
        let mut s = ByteScanner::new(subtable);
        s.advance(2 + 2 + 2); // format, length, language
        let glyph_id_array = s.read_bytes(256)?.to_vec();
        Ok(Cmap::Format0 { glyph_id_array })
    }

    fn parse_format6(subtable: &[u8]) -> Result<Self, FontError> {
        let mut s = ByteScanner::new(subtable);
        s.advance(2 + 2 + 2); // format, length, language
        let first_code = s.read_u16()?;
        let entry_count = s.read_u16()?;
        let mut glyph_ids = Vec::with_capacity(entry_count as usize);
        for _ in 0..entry_count {
            glyph_ids.push(s.read_u16()?);
        }
        Ok(Cmap::Format6 { first_code, glyph_ids })
    }

    pub fn get(&self, code_point: u32) -> Option<u16> {
        match self {
            Cmap::Format0 { glyph_id_array } => {
                glyph_id_array.get(code_point as usize).map(|&g| g as u16).filter(|&g| g != 0)
            }
            Cmap::Format4(table) => table.get(code_point),
            Cmap::Format6 { first_code, glyph_ids } => {
                let code = code_point.checked_sub(*first_code as u32)?;
                glyph_ids.get(code as usize).copied().filter(|&g| g != 0)
            }
            Cmap::Format12(table) => table.get(code_point),
        }
    }

    pub fn each_code_point<F: FnMut(char, u16)>(&self, mut f: F) {
        let mut emit = |code_point: u32, glyph_id: u16| {
            if glyph_id != 0 {
                if let Some(ch) = char::from_u32(code_point) {
                    f(ch, glyph_id);
                }
            }
        };
        match self {
            Cmap::Format0 { glyph_id_array } => {
                for (code, &glyph) in glyph_id_array.iter().enumerate() {
                    emit(code as u32, glyph as u16);
                }
            }
            Cmap::Format4(table) => table.each_code_point(emit),
            Cmap::Format6 { first_code, glyph_ids } => {
                for (i, &glyph) in glyph_ids.iter().enumerate() {
                    emit(*first_code as u32 + i as u32, glyph);
                }
            }
            Cmap::Format12(table) => table.each_code_point(emit),
        }
    }
}

pub struct Format4 {
    segment_count: u16,
    end_codes: Vec<u16>,
    start_codes: Vec<u16>,
    id_deltas: Vec<i16>,
    id_range_offsets: Vec<u16>,
    id_range_offsets_pos: usize,
    bytes: Vec<u8>,
}

impl Format4 {
    fn parse(subtable: &[u8]) -> Result<Self, FontError> {
        let mut s = ByteScanner::new(subtable);
        s.advance(2); // format
        s.advance(2); // length
        s.advance(2); // language
        let segment_count = s.read_u16()? / 2;
        s.advance(6); // searchRange, entrySelector, rangeShift

        let mut end_codes = Vec::with_capacity(segment_count as usize);
        for _ in 0..segment_count {
            end_codes.push(s.read_u16()?);
        }
        s.advance(2); // reservedPad
        let mut start_codes = Vec::with_capacity(segment_count as usize);
        for _ in 0..segment_count {
            start_codes.push(s.read_u16()?);
        }
        let mut id_deltas = Vec::with_capacity(segment_count as usize);
        for _ in 0..segment_count {
            id_deltas.push(s.read_i16()?);
        }
        let id_range_offsets_pos = s.position();
        let mut id_range_offsets = Vec::with_capacity(segment_count as usize);
        for _ in 0..segment_count {
            id_range_offsets.push(s.read_u16()?);
        }

        Ok(Format4 {
            segment_count,
            end_codes,
            start_codes,
            id_deltas,
            id_range_offsets,
            id_range_offsets_pos,
            bytes: subtable.to_vec(),
        })
    }

    pub fn get(&self, code_point: u32) -> Option<u16> {
        if code_point > 0xFFFF {
            return None;
        }
        let code_point = code_point as u16;
        let segment = self.end_codes.iter().position(|&end| code_point <= end)?;
        if code_point < self.start_codes[segment] {
            return None;
        }
        self.glyph_id(segment, code_point)
    }

    fn each_code_point<F: FnMut(u32, u16)>(&self, mut f: F) {
        for segment in 0..self.segment_count as usize {
            let start = self.start_codes[segment];
            let end = self.end_codes[segment];
            let mut code_point = start;
            loop {
                if let Some(glyph_id) = self.glyph_id(segment, code_point) {
                    f(code_point as u32, glyph_id);
                }
                if code_point == end {
                    break;
                }
                code_point += 1;
            }
        }
    }

    fn glyph_id(&self, segment: usize, code_point: u16) -> Option<u16> {
        let id_delta = self.id_deltas[segment];
        let id_range_offset = self.id_range_offsets[segment];
        let glyph_id = if id_range_offset != 0 {
            let offset_in_bytes = self.id_range_offsets_pos
                + segment * 2
                + id_range_offset as usize
                + (code_point - self.start_codes[segment]) as usize * 2;
            let raw = self.bytes.get(offset_in_bytes..offset_in_bytes + 2)?;
            let result = u16::from_be_bytes([raw[0], raw[1]]);
            if result == 0 {
                0
            } else {
                (result as i32 + id_delta as i32) as u16
            }
        } else {
            (code_point as i32 + id_delta as i32) as u16
        };
        if glyph_id != 0 {
            Some(glyph_id)
        } else {
            None
        }
    }
}

pub struct Format12 {
    groups: Vec<(u32, u32, u32)>, // (start_char_code, end_char_code, start_glyph_id)
}

impl Format12 {
    fn parse(subtable: &[u8]) -> Result<Self, FontError> {
        let mut s = ByteScanner::new(subtable);
        s.advance(2); // format
        s.advance(2); // reserved
        s.advance(4); // length
        s.advance(4); // language
        let num_groups = s.read_u32()?;
        let mut groups = Vec::with_capacity(num_groups as usize);
        for _ in 0..num_groups {
            let start = s.read_u32()?;
            let end = s.read_u32()?;
            let glyph = s.read_u32()?;
            groups.push((start, end, glyph));
        }
        Ok(Format12 { groups })
    }

    pub fn get(&self, code_point: u32) -> Option<u16> {
        let group = self
            .groups
            .iter()
            .find(|&&(start, end, _)| code_point >= start && code_point <= end)?;
        let id32 = group.2 + (code_point - group.0);
        if id32 <= 0xFFFF {
            Some(id32 as u16)
        } else {
            None
        }
    }

    fn each_code_point<F: FnMut(u32, u16)>(&self, mut f: F) {
        for &(start, end, start_glyph) in &self.groups {
            let mut code_point = start;
            loop {
                let glyph_id = start_glyph + (code_point - start);
                if glyph_id <= 0xFFFF {
                    f(code_point, glyph_id as u16);
                }
                if code_point == end {
                    break;
                }
                code_point += 1;
            }
        }
    }
}
