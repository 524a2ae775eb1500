//! Full and incremental serialization of a [`Registry`] back to PDF bytes.
//!
//! Two entry points mirror the two save modes from the component design: a
//! full rewrite that walks every live object in id order, and an incremental
//! append that preserves the original bytes verbatim and only emits the dirty
//! set. Both can optionally batch small non-stream objects into compressed
//! object streams, in which case the cross-reference section is written as a
//! stream rather than a classic table (only a stream can name a compressed
//! placement).

mod xref;

use crate::filters::{self, Filter};
use crate::object::registry::Registry;
use crate::object::write as objwrite;
use crate::object::{Dictionary, Object, ObjectId, Stream};
use std::collections::BTreeMap;
use std::io::Write;

/// Configuration recognized by the save operation (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveOptions {
    /// Append to the original bytes instead of rewriting the whole file.
    pub incremental: bool,
    /// Enable font subsetting for eligible embedded fonts. Interpreted by the
    /// fonts finalize hook; the serializer itself only emits whatever the
    /// registry holds at save time.
    pub subset_fonts: bool,
    /// Batch non-stream objects into compressed object streams and emit a
    /// cross-reference stream instead of a classic table.
    pub use_object_streams: bool,
    /// Default-encode previously-decoded streams with FlateDecode.
    pub compress_streams: bool,
}

impl Default for SaveOptions {
    fn default() -> Self {
        SaveOptions {
            incremental: false,
            subset_fonts: false,
            use_object_streams: false,
            compress_streams: false,
        }
    }
}

/// Where a written object's bytes ended up, for cross-reference emission.
#[derive(Debug, Clone, Copy)]
enum Placement {
    Direct(usize),
    Compressed { stream_num: u32, index: u32 },
}

const OBJECT_STREAM_BATCH: usize = 128;

/// Full rewrite: file header, every live object in id order, cross-reference
/// section, trailer. `trailer_template` must already carry `/Root` and any of
/// `/Info`, `/ID`, `/Encrypt` the caller wants kept; `/Size` (and `/Prev` for
/// incremental saves) are computed here.
pub fn save_full(
    registry: &mut Registry,
    trailer_template: &Dictionary,
    pdf_version: (u8, u8),
    options: &SaveOptions,
) -> Vec<u8> {
    let mut out = Vec::new();
    write!(out, "%PDF-{}.{}\n", pdf_version.0, pdf_version.1).unwrap();
    out.extend_from_slice(b"%\xE2\xE3\xCF\xD3\n");

    let live = registry.live_ids();
    let mut placements: BTreeMap<u32, (u16, Placement)> = BTreeMap::new();
    write_body(registry, &live, &mut out, &mut placements, options);

    finish(registry, &mut out, &mut placements, trailer_template, options, true, None);
    out
}

/// Incremental: append to `original_bytes` exactly, re-emitting only the dirty
/// set (plus newly allocated ids), and link back to the previous
/// cross-reference section via `/Prev`.
pub fn save_incremental(
    registry: &mut Registry,
    trailer_template: &Dictionary,
    original_bytes: &[u8],
    prev_startxref: usize,
    options: &SaveOptions,
) -> Vec<u8> {
    let mut out = original_bytes.to_vec();
    if !out.ends_with(b"\n") {
        out.push(b'\n');
    }

    let mut dirty: Vec<ObjectId> = registry.dirty_ids().copied().collect();
    dirty.sort();
    let mut placements: BTreeMap<u32, (u16, Placement)> = BTreeMap::new();
    write_body(registry, &dirty, &mut out, &mut placements, options);

    finish(registry, &mut out, &mut placements, trailer_template, options, false, Some(prev_startxref));
    out
}

/// Writes every object in `ids` either directly or, when eligible and
/// `use_object_streams` is on, batched into compressed object streams.
fn write_body(
    registry: &mut Registry,
    ids: &[ObjectId],
    out: &mut Vec<u8>,
    placements: &mut BTreeMap<u32, (u16, Placement)>,
    options: &SaveOptions,
) {
    let mut batched = Vec::new();
    for &id in ids {
        let Some(object) = registry.get(id) else { continue };
        if options.use_object_streams && is_object_stream_eligible(object) {
            batched.push(id);
            continue;
        }
        let encoded = maybe_compress_stream(object, options);
        let offset = out.len();
        write_indirect_object(out, id, &encoded);
        placements.insert(id.0, (id.1, Placement::Direct(offset)));
    }
    for chunk in batched.chunks(OBJECT_STREAM_BATCH) {
        write_object_stream(registry, chunk, out, placements, options);
    }
}

/// Non-stream objects can live inside a `/Type /ObjStm`; streams (including
/// object streams themselves and the cross-reference stream) cannot.
fn is_object_stream_eligible(object: &Object) -> bool {
    !matches!(object, Object::Stream(_))
}

fn maybe_compress_stream(object: &Object, options: &SaveOptions) -> Object {
    let Object::Stream(stream) = object else { return object.clone() };
    if !options.compress_streams || !stream.filter_names().is_empty() || stream.data.is_empty() {
        return object.clone();
    }
    match filters::encode(Filter::FlateDecode, &stream.data) {
        Ok(encoded) => {
            let mut dict = stream.dict.clone();
            dict.set("Filter", "FlateDecode");
            Object::Stream(Stream::new(dict, encoded))
        }
        Err(_) => object.clone(),
    }
}

fn write_indirect_object(out: &mut Vec<u8>, id: ObjectId, object: &Object) {
    write!(out, "{} {} obj\n", id.0, id.1).unwrap();
    objwrite::write_object(out, object).unwrap();
    write!(out, "\nendobj\n").unwrap();
}

/// Batches up to `OBJECT_STREAM_BATCH` objects into one `/Type /ObjStm`
/// stream, recording a [`Placement::Compressed`] entry for each member and a
/// direct one for the owning stream.
fn write_object_stream(
    registry: &mut Registry,
    ids: &[ObjectId],
    out: &mut Vec<u8>,
    placements: &mut BTreeMap<u32, (u16, Placement)>,
    options: &SaveOptions,
) {
    let stream_id = registry.allocate_ref();
    let mut header = Vec::new();
    let mut body = Vec::new();
    for (index, &id) in ids.iter().enumerate() {
        let Some(object) = registry.get(id) else { continue };
        let offset = body.len();
        objwrite::write_object(&mut body, object).unwrap();
        body.push(b' ');
        write!(header, "{} {} ", id.0, offset).unwrap();
        placements.insert(id.0, (id.1, Placement::Compressed { stream_num: stream_id.0, index: index as u32 }));
    }
    let first = header.len();
    let mut payload = header;
    payload.extend_from_slice(&body);
    let payload = if options.compress_streams {
        filters::encode(Filter::FlateDecode, &payload).unwrap_or(payload)
    } else {
        payload
    };

    let mut dict = Dictionary::new();
    dict.set("Type", "ObjStm");
    dict.set("N", ids.len() as i64);
    dict.set("First", first as i64);
    if options.compress_streams {
        dict.set("Filter", "FlateDecode");
    }
    let stream_object = Object::Stream(Stream::new(dict, payload));
    registry.register_at(stream_id, stream_object.clone());

    let offset = out.len();
    write_indirect_object(out, stream_id, &stream_object);
    placements.insert(stream_id.0, (stream_id.1, Placement::Direct(offset)));
}

fn finish(
    registry: &mut Registry,
    out: &mut Vec<u8>,
    placements: &mut BTreeMap<u32, (u16, Placement)>,
    trailer_template: &Dictionary,
    options: &SaveOptions,
    full: bool,
    prev: Option<usize>,
) {
    if options.use_object_streams {
        let xref_id = registry.allocate_ref();
        let size = registry.highest_id() + 1;
        let mut trailer = trailer_template.clone();
        trailer.set("Size", size as i64);
        xref::write_xref_stream(
            out,
            placements,
            xref_id,
            size,
            &trailer,
            prev,
            full,
            options.compress_streams,
        );
    } else {
        let size = registry.highest_id() + 1;
        let mut trailer = trailer_template.clone();
        trailer.set("Size", size as i64);
        if let Some(prev) = prev {
            trailer.set("Prev", prev as i64);
        }
        xref::write_xref_table(out, placements, size, &trailer, full);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Name;
    use crate::parser::xref::Loader;

    fn minimal_document() -> (Registry, Dictionary) {
        let mut registry = Registry::new();
        let pages = registry.allocate_ref();
        let page = registry.allocate_ref();
        let catalog_id = registry.register({
            let mut d = Dictionary::new();
            d.set("Type", "Catalog");
            d.set("Pages", pages);
            Object::Dictionary(d)
        });
        registry.register_at(pages, {
            let mut d = Dictionary::new();
            d.set("Type", "Pages");
            d.set("Kids", vec![Object::Reference(page)]);
            d.set("Count", 1);
            Object::Dictionary(d)
        });
        registry.register_at(page, {
            let mut d = Dictionary::new();
            d.set("Type", "Page");
            d.set("Parent", pages);
            d.set("MediaBox", vec![0.into(), 0.into(), 612.into(), 792.into()]);
            Object::Dictionary(d)
        });
        let mut trailer = Dictionary::new();
        trailer.set("Root", catalog_id);
        (registry, trailer)
    }

    #[test]
    fn full_save_round_trips_through_the_parser() {
        let (mut registry, trailer) = minimal_document();
        let options = SaveOptions::default();
        let bytes = save_full(&mut registry, &trailer, (1, 7), &options);
        assert!(bytes.starts_with(b"%PDF-1.7\n"));

        let (loaded, loaded_trailer) = Loader::new(&bytes).load().unwrap();
        assert!(loaded_trailer.get("Root").is_some());
        let root = loaded_trailer.get("Root").unwrap().as_reference().unwrap();
        let catalog = loaded.get(root).unwrap();
        assert!(catalog.as_dict().unwrap().type_is("Catalog"));
    }

    #[test]
    fn full_save_with_object_streams_uses_a_cross_reference_stream() {
        let (mut registry, trailer) = minimal_document();
        let options = SaveOptions { use_object_streams: true, compress_streams: true, ..Default::default() };
        let bytes = save_full(&mut registry, &trailer, (1, 7), &options);
        let text = String::from_utf8_lossy(&bytes);
        assert!(!text.contains("\nxref\n"));

        let (loaded, loaded_trailer) = Loader::new(&bytes).load().unwrap();
        let root = loaded_trailer.get("Root").unwrap().as_reference().unwrap();
        assert!(loaded.get(root).unwrap().as_dict().unwrap().type_is("Catalog"));
    }

    #[test]
    fn incremental_save_preserves_the_original_prefix() {
        let (mut registry, trailer) = minimal_document();
        let original = save_full(&mut registry, &trailer, (1, 7), &SaveOptions::default());

        let (mut reloaded, reloaded_trailer) = Loader::new(&original).load().unwrap();
        let root = reloaded_trailer.get("Root").unwrap().as_reference().unwrap();
        let pages_ref = reloaded.get(root).unwrap().as_dict().unwrap().get("Pages").unwrap().as_reference().unwrap();
        if let Some(Object::Dictionary(d)) = reloaded.get_mut(pages_ref) {
            d.set("Count", 1);
        }
        let prev_startxref = find_last_startxref(&original);
        let updated = save_incremental(&mut reloaded, &reloaded_trailer, &original, prev_startxref, &SaveOptions::default());

        assert_eq!(&updated[..original.len()], &original[..]);
        let (_, final_trailer) = Loader::new(&updated).load().unwrap();
        assert!(final_trailer.get("Root").is_some());
    }

    fn find_last_startxref(bytes: &[u8]) -> usize {
        let marker = b"startxref\n";
        let pos = bytes.windows(marker.len()).rposition(|w| w == marker).unwrap();
        let start = pos + marker.len();
        let end = bytes[start..].iter().position(|&b| b == b'\n').unwrap() + start;
        std::str::from_utf8(&bytes[start..end]).unwrap().parse().unwrap()
    }

    #[test]
    fn name_escaping_is_untouched_by_round_trip() {
        let mut dict = Dictionary::new();
        dict.set("Type", Object::Name(Name::from("Catalog")));
        let mut out = Vec::new();
        objwrite::write_object(&mut out, &Object::Dictionary(dict)).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "<</Type /Catalog >>");
    }
}
