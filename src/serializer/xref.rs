//! Cross-reference section emission: the classic `xref` table plus `trailer`
//! dict, or a compressed `/Type /XRef` stream covering both direct and
//! object-stream-compressed placements.

use super::Placement;
use crate::filters::{self, Filter};
use crate::object::write as objwrite;
use crate::object::{Dictionary, Object, ObjectId, Stream};
use std::collections::BTreeMap;
use std::io::Write;

/// Writes `xref\n<sections>\ntrailer\n<dict>\nstartxref\n<offset>\n%%EOF\n`.
///
/// `full` selects between a single `0 size` section covering every object
/// number (full save) and one or more contiguous subsections covering only
/// the updated numbers in `placements` (incremental save).
pub fn write_xref_table(
    out: &mut Vec<u8>,
    placements: &BTreeMap<u32, (u16, Placement)>,
    size: u32,
    trailer: &Dictionary,
    full: bool,
) {
    let startxref = out.len();
    out.extend_from_slice(b"xref\n");
    if full {
        write!(out, "0 {}\n", size).unwrap();
        out.extend_from_slice(b"0000000000 65535 f \n");
        for num in 1..size {
            match placements.get(&num) {
                Some((gen, Placement::Direct(offset))) => {
                    write!(out, "{:010} {:05} n \n", offset, gen).unwrap();
                }
                // A classic table can't name an object compressed inside an
                // ObjStm; callers only take this path when object streams are
                // disabled, so this arm should not occur in practice.
                Some((_, Placement::Compressed { .. })) | None => {
                    out.extend_from_slice(b"0000000000 65535 f \n");
                }
            }
        }
    } else {
        let nums: Vec<u32> = placements.keys().copied().collect();
        let mut i = 0;
        while i < nums.len() {
            let start = nums[i];
            let mut count = 1;
            while i + count < nums.len() && nums[i + count] == start + count as u32 {
                count += 1;
            }
            write!(out, "{} {}\n", start, count).unwrap();
            for num in &nums[i..i + count] {
                let (gen, placement) = &placements[num];
                match placement {
                    Placement::Direct(offset) => {
                        write!(out, "{:010} {:05} n \n", offset, gen).unwrap()
                    }
                    Placement::Compressed { .. } => {
                        out.extend_from_slice(b"0000000000 00000 f \n")
                    }
                }
            }
            i += count;
        }
    }
    write!(out, "trailer\n").unwrap();
    objwrite::write_dictionary_body(out, trailer).unwrap();
    write!(out, "\nstartxref\n{}\n%%EOF\n", startxref).unwrap();
}

/// Writes a `/Type /XRef` cross-reference stream, which (unlike the classic
/// table) can itself name compressed placements. The stream's own indirect
/// object is bootstrapped here: its id must already be reserved by the caller,
/// and its own entry is folded into the table before the W-encoded body is
/// produced, since the stream describes the whole file including itself.
pub fn write_xref_stream(
    out: &mut Vec<u8>,
    placements: &mut BTreeMap<u32, (u16, Placement)>,
    xref_id: ObjectId,
    size: u32,
    trailer_template: &Dictionary,
    prev: Option<usize>,
    full: bool,
    compress: bool,
) {
    let xref_offset = out.len();
    placements.insert(xref_id.0, (xref_id.1, Placement::Direct(xref_offset)));

    let nums: Vec<u32> = if full { (0..size).collect() } else { placements.keys().copied().collect() };

    let mut index = Vec::new();
    let mut body = Vec::new();
    let mut i = 0;
    while i < nums.len() {
        let start = nums[i];
        let mut count = 1;
        while i + count < nums.len() && nums[i + count] == start + count as u32 {
            count += 1;
        }
        index.push(Object::Integer(start as i64));
        index.push(Object::Integer(count as i64));
        for num in &nums[i..i + count] {
            match placements.get(num) {
                Some((gen, Placement::Direct(offset))) => {
                    body.push(1u8);
                    body.extend_from_slice(&(*offset as u32).to_be_bytes());
                    body.extend_from_slice(&gen.to_be_bytes());
                }
                Some((_, Placement::Compressed { stream_num, index })) => {
                    body.push(2u8);
                    body.extend_from_slice(&stream_num.to_be_bytes());
                    body.extend_from_slice(&(*index as u16).to_be_bytes());
                }
                None => {
                    body.push(0u8);
                    body.extend_from_slice(&0u32.to_be_bytes());
                    body.extend_from_slice(&0xFFFFu16.to_be_bytes());
                }
            }
        }
        i += count;
    }

    let mut dict = trailer_template.clone();
    dict.set("Type", "XRef");
    dict.set("W", vec![Object::Integer(1), Object::Integer(4), Object::Integer(2)]);
    dict.set("Index", index);
    dict.set("Size", size as i64);
    if let Some(prev) = prev {
        dict.set("Prev", prev as i64);
    } else {
        dict.remove("Prev");
    }

    let payload = if compress {
        dict.set("Filter", "FlateDecode");
        filters::encode(Filter::FlateDecode, &body).unwrap_or(body)
    } else {
        body
    };
    let stream = Stream::new(dict, payload);

    write!(out, "{} {} obj\n", xref_id.0, xref_id.1).unwrap();
    objwrite::write_object(out, &Object::Stream(stream)).unwrap();
    write!(out, "\nendobj\n").unwrap();
    write!(out, "startxref\n{}\n%%EOF\n", xref_offset).unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classic_table_full_covers_every_object_number() {
        let mut placements = BTreeMap::new();
        placements.insert(1u32, (0u16, Placement::Direct(9)));
        let mut trailer = Dictionary::new();
        trailer.set("Root", (1u32, 0u16));
        let mut out = Vec::new();
        write_xref_table(&mut out, &placements, 2, &trailer, true);
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("xref\n0 2\n"));
        assert!(text.contains("0000000000 65535 f"));
        assert!(text.contains("startxref\n"));
    }

    #[test]
    fn classic_table_incremental_emits_only_touched_subsections() {
        let mut placements = BTreeMap::new();
        placements.insert(5u32, (0u16, Placement::Direct(100)));
        placements.insert(6u32, (0u16, Placement::Direct(200)));
        placements.insert(9u32, (0u16, Placement::Direct(300)));
        let mut trailer = Dictionary::new();
        trailer.set("Root", (1u32, 0u16));
        let mut out = Vec::new();
        write_xref_table(&mut out, &placements, 10, &trailer, false);
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("5 2\n"));
        assert!(text.contains("9 1\n"));
    }
}
