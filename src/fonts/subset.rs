//! TrueType subsetting: glyph closure, id remapping, and table rewriting.

use crate::bytes::ByteWriter;
use crate::fonts::ttf::{self, GlyphOutline};
use crate::fonts::{Font, FontError, UsedGlyphs};
use std::collections::BTreeSet;

/// A 6-uppercase-letter subset tag, deterministic for a given seed so repeated
/// subsetting of the same document is reproducible.
pub fn subset_tag(seed: u64) -> String {
    let mut n = seed.wrapping_mul(2654435761).wrapping_add(0x9E3779B9);
    let mut tag = String::with_capacity(6);
    for _ in 0..6 {
        let letter = (n % 26) as u8 + b'A';
        tag.push(letter as char);
        n /= 26;
        n = n.wrapping_mul(1103515245).wrapping_add(12345);
    }
    tag
}

/// Computes the glyph closure: the used set plus glyph 0, plus every component
/// referenced (directly or transitively, bounded by `max_component_depth`) by
/// a composite glyph already in the set.
pub fn glyph_closure(font: &Font, loca: &[u32], used: &UsedGlyphs) -> Result<BTreeSet<u16>, FontError> {
    let glyf = font.table_directory().table_bytes(font.bytes(), b"glyf")?;
    let mut closure: BTreeSet<u16> = used.iter_used().collect();
    closure.insert(0);

    let mut frontier: Vec<u16> = closure.iter().copied().collect();
    for _ in 0..font.max_component_depth.max(1) {
        let mut next_frontier = Vec::new();
        for &glyph_id in &frontier {
            let start = *loca.get(glyph_id as usize).unwrap_or(&0) as usize;
            let end = *loca.get(glyph_id as usize + 1).unwrap_or(&0) as usize;
            let bytes = glyf.get(start..end).unwrap_or(&[]);
            if let GlyphOutline::Composite { components } = ttf::read_glyph_components(bytes)? {
                for component in components {
                    if closure.insert(component) {
                        next_frontier.push(component);
                    }
                }
            }
        }
        if next_frontier.is_empty() {
            break;
        }
        frontier = next_frontier;
    }
    Ok(closure)
}

pub struct SubsetResult {
    pub bytes: Vec<u8>,
    pub subset_tag: String,
    pub glyph_id_map: Vec<(u16, u16)>, // (old id, new id), sorted by old id
}

/// Produce a standalone TrueType font containing only the glyphs in `used`
/// (plus their composite dependencies and glyph 0).
pub fn subset(font: &Font, used: &UsedGlyphs, tag_seed: u64) -> Result<SubsetResult, FontError> {
    let loca = ttf::parse_loca(
        font.table_directory().table_bytes(font.bytes(), b"loca")?,
        font.num_glyphs,
        font.index_to_loc_format != 0,
    )?;
    let closure = glyph_closure(font, &loca, used)?;
    let old_ids: Vec<u16> = closure.into_iter().collect();
    let remap: Vec<(u16, u16)> = old_ids
        .iter()
        .enumerate()
        .map(|(new_id, &old_id)| (old_id, new_id as u16))
        .collect();
    let new_id_of = |old: u16| -> u16 {
        remap.binary_search_by_key(&old, |&(o, _)| o).map(|i| remap[i].1).unwrap_or(0)
    };

    let glyf = font.table_directory().table_bytes(font.bytes(), b"glyf")?;
    let (new_glyf, new_loca) = rewrite_glyf_and_loca(glyf, &loca, &old_ids, new_id_of)?;
    let new_hmtx = rewrite_hmtx(font, &old_ids);
    let tag = subset_tag(tag_seed);
    let new_name = rewrite_name_table(font, &tag)?;
    let new_post = rewrite_post(font, &old_ids);

    let tables = build_tables(font, &old_ids, &new_glyf, &new_loca, &new_hmtx, &new_name, &new_post)?;

    Ok(SubsetResult { bytes: tables, subset_tag: tag, glyph_id_map: remap })
}

fn rewrite_glyf_and_loca(
    glyf: &[u8],
    loca: &[u32],
    old_ids: &[u16],
    new_id_of: impl Fn(u16) -> u16,
) -> Result<(Vec<u8>, Vec<u32>), FontError> {
    let mut new_glyf = ByteWriter::new();
    let mut new_loca = Vec::with_capacity(old_ids.len() + 1);
    for &old_id in old_ids {
        new_loca.push(new_glyf.len() as u32);
        let start = *loca.get(old_id as usize).unwrap_or(&0) as usize;
        let end = *loca.get(old_id as usize + 1).unwrap_or(&0) as usize;
        let bytes = glyf.get(start..end).unwrap_or(&[]);
        match ttf::read_glyph_components(bytes)? {
            GlyphOutline::Composite { .. } => {
                new_glyf.write_bytes(&remap_composite(bytes, &new_id_of)?);
            }
            _ => new_glyf.write_bytes(bytes),
        }
        new_glyf.pad_to(4);
    }
    new_loca.push(new_glyf.len() as u32);
    Ok((new_glyf.into_bytes(), new_loca))
}

fn remap_composite(bytes: &[u8], new_id_of: &impl Fn(u16) -> u16) -> Result<Vec<u8>, FontError> {
    use crate::bytes::ByteScanner;
    let mut out = bytes.to_vec();
    let mut s = ByteScanner::new(bytes);
    let _number_of_contours = s.read_i16()?;
    s.advance(8);
    loop {
        let flags_pos = s.position();
        let flags = s.read_u16()?;
        let glyph_index_pos = s.position();
        let old_glyph_id = s.read_u16()?;
        let new_glyph_id = new_id_of(old_glyph_id);
        out[glyph_index_pos..glyph_index_pos + 2].copy_from_slice(&new_glyph_id.to_be_bytes());

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
        let _ = flags_pos;
        if flags & MORE_COMPONENTS == 0 {
            break;
        }
    }
    Ok(out)
}

fn rewrite_hmtx(font: &Font, old_ids: &[u16]) -> Vec<(u16, i16)> {
    old_ids
        .iter()
        .map(|&old_id| {
            let width = font.glyph_widths.get(old_id as usize).copied().unwrap_or(0);
            (width, 0i16)
        })
        .collect()
}

fn rewrite_name_table(font: &Font, tag: &str) -> Result<Vec<(u16, String)>, FontError> {
    let prefixed_postscript = format!("{}+{}", tag, font.postscript_name);
    let mut records = vec![(6u16, prefixed_postscript.clone())];
    if let Some(family) = &font.family_name {
        records.push((1, family.clone()));
    }
    records.push((4, prefixed_postscript));
    Ok(records)
}

fn rewrite_post(font: &Font, old_ids: &[u16]) -> Vec<Option<String>> {
    old_ids.iter().map(|&old_id| font.post.as_ref().and_then(|p| p.glyph_name(old_id))).collect()
}

/// Assembles the final sfnt: alphabetically ordered table directory, 4-byte
/// padded tables, per-table checksums, and `head.checksumAdjustment` fixup.
fn build_tables(
    font: &Font,
    old_ids: &[u16],
    new_glyf: &[u8],
    new_loca: &[u32],
    new_hmtx: &[(u16, i16)],
    new_name: &[(u16, String)],
    new_post: &[Option<String>],
) -> Result<Vec<u8>, FontError> {
    let head_bytes = font.table_directory().table_bytes(font.bytes(), b"head")?;
    let mut head = head_bytes.to_vec();
    head[50..52].copy_from_slice(&1i16.to_be_bytes()); // indexToLocFormat = long
    head[8..12].copy_from_slice(&0u32.to_be_bytes()); // checksumAdjustment cleared pre-fixup

    let mut maxp = font.table_directory().table_bytes(font.bytes(), b"maxp")?.to_vec();
    if maxp.len() >= 6 {
        maxp[4..6].copy_from_slice(&(old_ids.len() as u16).to_be_bytes());
    }

    let mut loca_writer = ByteWriter::new();
    for &offset in new_loca {
        loca_writer.write_u32(offset);
    }

    let number_of_h_metrics = new_hmtx.len() as u16;
    let mut hmtx_writer = ByteWriter::new();
    for &(advance, lsb) in new_hmtx {
        hmtx_writer.write_u16(advance);
        hmtx_writer.write_i16(lsb);
    }

    let mut hhea = font
        .table_directory()
        .table_bytes(font.bytes(), b"hhea")
        .map(|b| b.to_vec())
        .unwrap_or_default();
    if hhea.len() >= 36 {
        hhea[34..36].copy_from_slice(&number_of_h_metrics.to_be_bytes());
    }

    let name_bytes = build_name_table(new_name);
    let post_bytes = build_post_table(new_post);
    let cmap_bytes = build_cmap_format4(font, old_ids);

    let mut tables: Vec<([u8; 4], Vec<u8>)> = vec![
        (*b"head", head),
        (*b"hhea", hhea),
        (*b"maxp", maxp),
        (*b"hmtx", hmtx_writer.into_bytes()),
        (*b"loca", loca_writer.into_bytes()),
        (*b"glyf", new_glyf.to_vec()),
        (*b"name", name_bytes),
        (*b"post", post_bytes),
        (*b"cmap", cmap_bytes),
    ];
    tables.sort_by_key(|(tag, _)| *tag);

    emit_sfnt(&tables)
}

fn build_name_table(records: &[(u16, String)]) -> Vec<u8> {
    let mut header = ByteWriter::new();
    let mut storage = ByteWriter::new();
    header.write_u16(0); // format
    header.write_u16(records.len() as u16);
    header.write_u16(0); // stringOffsetPlaceholder, patched below
    for (name_id, value) in records {
        let utf16: Vec<u16> = value.encode_utf16().collect();
        let mut bytes = Vec::with_capacity(utf16.len() * 2);
        for unit in utf16 {
            bytes.extend_from_slice(&unit.to_be_bytes());
        }
        header.write_u16(3); // platformID: Windows
        header.write_u16(1); // encodingID: Unicode BMP
        header.write_u16(0x0409); // languageID: en-US
        header.write_u16(*name_id);
        header.write_u16(bytes.len() as u16);
        header.write_u16(storage.len() as u16);
        storage.write_bytes(&bytes);
    }
    let string_offset = header.len() as u16;
    header.patch(4, &string_offset.to_be_bytes());
    let mut out = header.into_bytes();
    out.extend_from_slice(storage.as_slice());
    out
}

fn build_post_table(names: &[Option<String>]) -> Vec<u8> {
    let mut w = ByteWriter::new();
    w.write_u32(0x0002_0000);
    w.write_i32(0); // italicAngle
    w.write_i16(0); // underlinePosition
    w.write_i16(0); // underlineThickness
    w.write_u32(0); // isFixedPitch
    w.write_u32(0);
    w.write_u32(0);
    w.write_u32(0);
    w.write_u32(0);
    w.write_u16(names.len() as u16);

    let mut custom = Vec::new();
    let mut storage = ByteWriter::new();
    for name in names {
        match name {
            Some(n) => {
                custom.push(n.clone());
                w.write_u16(258 + (custom.len() as u16 - 1));
            }
            None => w.write_u16(0), // .notdef
        }
    }
    for name in &custom {
        let bytes = name.as_bytes();
        storage.write_u8(bytes.len().min(255) as u8);
        storage.write_bytes(&bytes[..bytes.len().min(255)]);
    }
    w.write_bytes(storage.as_slice());
    w.into_bytes()
}

/// Synthesizes a format-4 cmap covering only the (sparse) Unicode code points
/// that still map to a kept glyph, per §4.6's subset cmap rule.
fn build_cmap_format4(font: &Font, old_ids: &[u16]) -> Vec<u8> {
    let old_to_new: std::collections::HashMap<u16, u16> =
        old_ids.iter().enumerate().map(|(new, &old)| (old, new as u16)).collect();

    let mut mappings: Vec<(u16, u16)> = Vec::new();
    font.each_code_point(|ch, glyph_id| {
        if ch as u32 <= 0xFFFF {
            if let Some(&new_id) = old_to_new.get(&glyph_id.0) {
                mappings.push((ch as u16, new_id));
            }
        }
    });
    mappings.sort_unstable();

    let mut segments: Vec<(u16, u16, i32)> = Vec::new();
    for &(code, glyph) in &mappings {
        if let Some(last) = segments.last_mut() {
            if last.1 == code.wrapping_sub(1) && (glyph as i32 - code as i32) == last.2 {
                last.1 = code;
                continue;
            }
        }
        segments.push((code, code, glyph as i32 - code as i32));
    }
    segments.push((0xFFFF, 0xFFFF, 1)); // required terminator segment

    let seg_count = segments.len() as u16;
    let mut header = ByteWriter::new();
    header.write_u16(4); // format
    header.write_u16(0); // length placeholder
    header.write_u16(0); // language
    header.write_u16(seg_count * 2);
    let search_range = {
        let mut n = 1u16;
        while n * 2 <= seg_count {
            n *= 2;
        }
        n * 2
    };
    header.write_u16(search_range);
    header.write_u16((search_range / 2).trailing_zeros() as u16);
    header.write_u16(seg_count * 2 - search_range);

    for &(_, end, _) in &segments {
        header.write_u16(end);
    }
    header.write_u16(0); // reservedPad
    for &(start, _, _) in &segments {
        header.write_u16(start);
    }
    for &(_, _, delta) in &segments {
        header.write_i16(delta as i16);
    }
    for _ in &segments {
        header.write_u16(0); // idRangeOffset: always use idDelta
    }

    let total_len = header.len() as u16;
    header.patch(2, &total_len.to_be_bytes());

    let mut cmap_header = ByteWriter::new();
    cmap_header.write_u16(0); // version
    cmap_header.write_u16(1); // numTables
    cmap_header.write_u16(3); // platformID: Windows
    cmap_header.write_u16(1); // encodingID: Unicode BMP
    cmap_header.write_u32(12); // offset to subtable
    cmap_header.write_bytes(header.as_slice());
    cmap_header.into_bytes()
}

fn emit_sfnt(tables: &[([u8; 4], Vec<u8>)]) -> Result<Vec<u8>, FontError> {
    let num_tables = tables.len() as u16;
    let mut search_range = 1u16;
    let mut entry_selector = 0u16;
    while search_range * 2 <= num_tables {
        search_range *= 2;
        entry_selector += 1;
    }
    search_range *= 16;

    let mut directory = ByteWriter::new();
    directory.write_u32(0x0001_0000);
    directory.write_u16(num_tables);
    directory.write_u16(search_range);
    directory.write_u16(entry_selector);
    directory.write_u16(num_tables * 16 - search_range);

    let mut body = ByteWriter::new();
    let header_len = 12 + 16 * tables.len();
    let mut checksum_adjustment_offset = None;
    for (tag, data) in tables {
        let offset = header_len + body.len();
        let checksum = table_checksum(data);
        directory.write_tag(tag);
        directory.write_u32(checksum);
        directory.write_u32(offset as u32);
        directory.write_u32(data.len() as u32);
        if tag == b"head" {
            checksum_adjustment_offset = Some(offset + 8);
        }
        body.write_bytes(data);
        body.pad_to(4);
    }

    let mut out = directory.into_bytes();
    out.extend_from_slice(body.as_slice());

    if let Some(offset) = checksum_adjustment_offset {
        let whole_font_checksum = table_checksum(&out);
        let adjustment = 0xB1B0_AFBAu32.wrapping_sub(whole_font_checksum);
        out[offset..offset + 4].copy_from_slice(&adjustment.to_be_bytes());
    }

    Ok(out)
}

fn table_checksum(data: &[u8]) -> u32 {
    let mut sum: u32 = 0;
    let mut chunks = data.chunks(4);
    for chunk in &mut chunks {
        let mut word = [0u8; 4];
        word[..chunk.len()].copy_from_slice(chunk);
        sum = sum.wrapping_add(u32::from_be_bytes(word));
    }
    sum
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subset_tag_is_six_uppercase_letters() {
        let tag = subset_tag(42);
        assert_eq!(tag.len(), 6);
        assert!(tag.chars().all(|c| c.is_ascii_uppercase()));
    }

    #[test]
    fn subset_tag_is_deterministic() {
        assert_eq!(subset_tag(7), subset_tag(7));
    }

    #[test]
    fn table_checksum_of_empty_is_zero() {
        assert_eq!(table_checksum(&[]), 0);
    }
}
