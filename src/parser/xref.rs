//! Cross-reference table and cross-reference stream ingestion, `/Prev` chain
//! merging, hybrid `/XRefStm` handling, and the salvage pass for files whose
//! cross-reference section cannot be trusted.

use super::lexer::{Lexer, Token};
use super::objects::ObjectParser;
use crate::errors::PdfError;
use crate::filters;
use crate::object::registry::Registry;
use crate::object::{Dictionary, Object, ObjectId};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy)]
enum XrefEntry {
    Free,
    Uncompressed { offset: usize, gen: u16 },
    Compressed { stream_num: u32, index: u32 },
}

pub struct Loader<'a> {
    bytes: &'a [u8],
    registry: Registry,
    seen: HashSet<u32>,
    trailer: Dictionary,
    /// Type-2 (compressed) entries seen so far, deferred until every direct
    /// entry and `/Type /ObjStm` owner across the whole chain has been
    /// materialized, so member lookup order never depends on an object
    /// stream happening to be listed before the objects it contains.
    pending_compressed: Vec<(u32, u32, u32)>,
}

impl<'a> Loader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Loader {
            bytes,
            registry: Registry::new(),
            seen: HashSet::new(),
            trailer: Dictionary::new(),
            pending_compressed: Vec::new(),
        }
    }

    pub fn load(mut self) -> Result<(Registry, Dictionary), PdfError> {
        match find_startxref(self.bytes) {
            Some(start) => {
                if let Err(e) = self.follow_chain(start) {
                    self.registry.add_warning(format!("cross-reference chain broken: {}", e));
                    self.salvage();
                }
            }
            None => {
                self.registry.add_warning("no startxref keyword found; running salvage pass".into());
                self.salvage();
            }
        }
        self.resolve_pending_compressed();
        if !self.trailer.contains_key("Root") {
            self.salvage();
            self.resolve_pending_compressed();
        }
        if !self.trailer.contains_key("Root") {
            return Err(PdfError::MalformedFile("no /Root found after salvage".into()));
        }
        Ok((self.registry, self.trailer))
    }

    fn follow_chain(&mut self, start: usize) -> Result<(), PdfError> {
        let mut next = Some(start);
        let mut hops = 0;
        while let Some(offset) = next {
            hops += 1;
            if hops > 64 {
                self.registry.add_warning("giving up on /Prev chain after 64 hops".into());
                break;
            }
            let (entries, trailer) = self.read_section(offset)?;
            if let Some(xrefstm) = trailer.get("XRefStm").and_then(Object::as_integer) {
                let (hybrid_entries, _) = self.read_section(xrefstm as usize)?;
                self.materialize(hybrid_entries);
            }
            self.materialize(entries);
            self.merge_trailer(&trailer);
            next = trailer.get("Prev").and_then(Object::as_integer).map(|n| n as usize);
        }
        Ok(())
    }

    fn merge_trailer(&mut self, trailer: &Dictionary) {
        for (key, value) in trailer.iter() {
            let key_str = String::from_utf8_lossy(key);
            if !self.trailer.contains_key(&key_str) {
                self.trailer.set(key.clone(), value.clone());
            }
        }
    }

    /// Reads one cross-reference section (classic table+trailer, or a
    /// cross-reference stream) at `offset`.
    fn read_section(&mut self, offset: usize) -> Result<(Vec<(u32, XrefEntry)>, Dictionary), PdfError> {
        let mut lexer = Lexer::at(self.bytes, offset);
        let save = lexer.position();
        match lexer.next_token() {
            Some(Token::Keyword(ref kw)) if kw == b"xref" => self.read_classic_table(lexer.position()),
            _ => {
                lexer.seek(save);
                self.read_xref_stream(offset)
            }
        }
    }

    fn read_classic_table(&mut self, mut pos: usize) -> Result<(Vec<(u32, XrefEntry)>, Dictionary), PdfError> {
        let mut entries = Vec::new();
        loop {
            let mut lexer = Lexer::at(self.bytes, pos);
            let save = lexer.position();
            match lexer.next_token() {
                Some(Token::Integer(start)) => {
                    let count = match lexer.next_token() {
                        Some(Token::Integer(n)) => n,
                        _ => {
                            lexer.seek(save);
                            break;
                        }
                    };
                    pos = lexer.position();
                    for i in 0..count {
                        let entry_lexer_pos = pos;
                        let entry = self.bytes.get(entry_lexer_pos..entry_lexer_pos + 20);
                        let Some(entry) = entry else { break };
                        let offset: usize =
                            std::str::from_utf8(&entry[0..10]).ok().and_then(|s| s.trim().parse().ok()).unwrap_or(0);
                        let gen: u16 =
                            std::str::from_utf8(&entry[11..16]).ok().and_then(|s| s.trim().parse().ok()).unwrap_or(0);
                        let kind = entry[17];
                        let id = (start + i) as u32;
                        let xref_entry = if kind == b'n' {
                            XrefEntry::Uncompressed { offset, gen }
                        } else {
                            XrefEntry::Free
                        };
                        entries.push((id, xref_entry));
                        pos += 20;
                    }
                }
                _ => {
                    lexer.seek(save);
                    break;
                }
            }
        }
        let mut lexer = Lexer::at(self.bytes, pos);
        match lexer.next_token() {
            Some(Token::Keyword(ref kw)) if kw == b"trailer" => {}
            _ => {
                return Err(PdfError::CorruptXref {
                    offset: pos,
                    reason: "expected trailer keyword".into(),
                })
            }
        }
        let mut parser = ObjectParser::new(self.bytes, lexer.position());
        let trailer = parser
            .parse_value()
            .and_then(|v| if let Object::Dictionary(d) = v { Some(d) } else { None })
            .ok_or_else(|| PdfError::CorruptXref { offset: pos, reason: "missing trailer dict".into() })?;
        Ok((entries, trailer))
    }

    fn read_xref_stream(&mut self, offset: usize) -> Result<(Vec<(u32, XrefEntry)>, Dictionary), PdfError> {
        let mut parser = ObjectParser::new(self.bytes, offset);
        let (_, value) = parser
            .parse_indirect_object()
            .ok_or_else(|| PdfError::CorruptXref { offset, reason: "expected indirect xref stream object".into() })?;
        let Object::Stream(stream) = value else {
            return Err(PdfError::CorruptXref { offset, reason: "xref entry is not a stream".into() });
        };
        let decoded = filters::decode_stream(&stream.dict, &stream.data)?;

        let w = match stream.dict.get("W") {
            Some(Object::Array(a)) if a.len() == 3 => {
                let get = |i: usize| a[i].as_integer().unwrap_or(0) as usize;
                [get(0), get(1), get(2)]
            }
            _ => return Err(PdfError::CorruptXref { offset, reason: "missing /W".into() }),
        };
        let size = stream.dict.get("Size").and_then(Object::as_integer).unwrap_or(0);
        let index: Vec<i64> = match stream.dict.get("Index") {
            Some(Object::Array(a)) => a.iter().filter_map(Object::as_integer).collect(),
            _ => vec![0, size],
        };

        let mut entries = Vec::new();
        let mut cursor = 0usize;
        let stride = w[0] + w[1] + w[2];
        for pair in index.chunks(2) {
            let [start, count] = [pair[0], *pair.get(1).unwrap_or(&0)];
            for i in 0..count {
                let Some(chunk) = decoded.get(cursor..cursor + stride) else { break };
                cursor += stride;
                let field = |width: usize, skip: usize| -> u64 {
                    if width == 0 {
                        return 1; // default type field is "in use" per spec default
                    }
                    let bytes = &chunk[skip..skip + width];
                    bytes.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64)
                };
                let kind = field(w[0], 0);
                let field2 = field(w[1], w[0]);
                let field3 = field(w[2], w[0] + w[1]);
                let id = (start + i) as u32;
                let xref_entry = match kind {
                    0 => XrefEntry::Free,
                    1 => XrefEntry::Uncompressed { offset: field2 as usize, gen: field3 as u16 },
                    2 => XrefEntry::Compressed { stream_num: field2 as u32, index: field3 as u32 },
                    _ => XrefEntry::Free,
                };
                entries.push((id, xref_entry));
            }
        }
        Ok((entries, stream.dict))
    }

    fn materialize(&mut self, entries: Vec<(u32, XrefEntry)>) {
        for (id, entry) in entries {
            if self.seen.contains(&id) {
                continue;
            }
            self.seen.insert(id);
            match entry {
                XrefEntry::Free => {}
                XrefEntry::Uncompressed { offset, gen } => {
                    let mut parser = ObjectParser::new(self.bytes, offset);
                    if let Some(((num, parsed_gen), value)) = parser.parse_indirect_object() {
                        if num != id {
                            self.registry.add_warning(format!(
                                "xref said object {} lives at offset {} but found object {} there",
                                id, offset, num
                            ));
                        }
                        self.registry.insert_loaded((id, parsed_gen.max(gen)), value);
                    } else {
                        self.registry.add_warning(format!("could not parse object {} at offset {}", id, offset));
                    }
                    for warning in parser.take_warnings() {
                        self.registry.add_warning(warning);
                    }
                }
                XrefEntry::Compressed { stream_num, index } => {
                    self.pending_compressed.push((id, stream_num, index));
                }
            }
        }
    }

    /// Resolves every type-2 entry queued by `materialize`, now that every
    /// direct (type-1) entry across the whole `/Prev` chain — including any
    /// `/Type /ObjStm` owners — has already been loaded, regardless of
    /// which object number or `/Index` position came first on disk.
    fn resolve_pending_compressed(&mut self) {
        for (id, stream_num, index) in std::mem::take(&mut self.pending_compressed) {
            if let Err(e) = self.materialize_compressed(id, stream_num, index) {
                self.registry.add_warning(format!("failed to materialize compressed object {}: {}", id, e));
            }
        }
    }

    fn materialize_compressed(&mut self, id: u32, stream_num: u32, index: u32) -> Result<(), PdfError> {
        let Some(Object::Stream(objstm)) = self.registry.get((stream_num, 0)).cloned() else {
            self.registry.add_warning(format!(
                "object {} references object stream {} which was not found",
                id, stream_num
            ));
            return Ok(());
        };
        let decoded = filters::decode_stream(&objstm.dict, &objstm.data)?;
        let n = objstm.dict.get("N").and_then(Object::as_integer).unwrap_or(0);
        let first = objstm.dict.get("First").and_then(Object::as_integer).unwrap_or(0) as usize;

        let mut header_lexer = Lexer::new(&decoded);
        let mut offsets = Vec::with_capacity(n as usize);
        for _ in 0..n {
            let obj_num = match header_lexer.next_token() {
                Some(Token::Integer(v)) => v as u32,
                _ => break,
            };
            let obj_offset = match header_lexer.next_token() {
                Some(Token::Integer(v)) => v as usize,
                _ => break,
            };
            offsets.push((obj_num, obj_offset));
        }
        if let Some(&(obj_num, obj_offset)) = offsets.get(index as usize) {
            let mut parser = ObjectParser::new(&decoded, first + obj_offset);
            if let Some(value) = parser.parse_value() {
                self.registry.insert_loaded((obj_num, 0), value);
            }
        }
        Ok(())
    }

    /// Linear scan for `N G obj` markers, ignoring the cross-reference section
    /// entirely. Used when the normal chain is unreadable or incomplete.
    fn salvage(&mut self) {
        self.registry.add_warning("running salvage pass over the whole file".into());
        let bytes = self.bytes;
        let mut pos = 0;
        while pos < bytes.len() {
            let Some(rel) = find_subsequence(&bytes[pos..], b" obj") else { break };
            let obj_keyword_at = pos + rel;
            if let Some((num, gen, header_start)) = backtrack_object_header(bytes, obj_keyword_at) {
                let mut parser = ObjectParser::new(bytes, header_start);
                if let Some(((parsed_num, parsed_gen), value)) = parser.parse_indirect_object() {
                    let id = (parsed_num.max(num), parsed_gen.max(gen));
                    self.registry.insert_loaded(id, value);
                }
            }
            pos = obj_keyword_at + 4;
        }
        if !self.trailer.contains_key("Root") {
            if let Some(offset) = find_subsequence(bytes, b"trailer") {
                let mut parser = ObjectParser::new(bytes, offset + "trailer".len());
                if let Some(Object::Dictionary(dict)) = parser.parse_value() {
                    self.merge_trailer(&dict);
                }
            }
        }
        if !self.trailer.contains_key("Root") {
            // Fall back to scanning materialized objects for a /Type /Catalog dict.
            for id in self.registry.live_ids() {
                if let Some(Object::Dictionary(dict)) = self.registry.get(id) {
                    if dict.type_is("Catalog") {
                        self.trailer.set("Root", id);
                        break;
                    }
                }
            }
        }
    }
}

fn find_startxref(bytes: &[u8]) -> Option<usize> {
    let marker_pos = find_subsequence_reverse(bytes, b"startxref")?;
    let mut lexer = Lexer::at(bytes, marker_pos + "startxref".len());
    match lexer.next_token() {
        Some(Token::Integer(n)) if n >= 0 => Some(n as usize),
        _ => None,
    }
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn find_subsequence_reverse(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.len() > haystack.len() {
        return None;
    }
    (0..=haystack.len() - needle.len()).rev().find(|&i| &haystack[i..i + needle.len()] == needle)
}

/// Given the position of the `obj` keyword, scans backward over whitespace and
/// digits to recover `N G obj`'s object number and generation.
fn backtrack_object_header(bytes: &[u8], obj_at: usize) -> Option<(u32, u16, usize)> {
    let mut i = obj_at;
    let skip_ws_back = |bytes: &[u8], mut i: usize| -> usize {
        while i > 0 && bytes[i - 1].is_ascii_whitespace() {
            i -= 1;
        }
        i
    };
    let read_digits_back = |bytes: &[u8], mut i: usize| -> (usize, usize) {
        let end = i;
        while i > 0 && bytes[i - 1].is_ascii_digit() {
            i -= 1;
        }
        (i, end)
    };

    i = skip_ws_back(bytes, i);
    let (gen_start, gen_end) = read_digits_back(bytes, i);
    if gen_start == gen_end {
        return None;
    }
    let gen: u16 = std::str::from_utf8(&bytes[gen_start..gen_end]).ok()?.parse().ok()?;

    i = skip_ws_back(bytes, gen_start);
    let (num_start, num_end) = read_digits_back(bytes, i);
    if num_start == num_end {
        return None;
    }
    let num: u32 = std::str::from_utf8(&bytes[num_start..num_end]).ok()?.parse().ok()?;

    Some((num, gen, num_start))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_startxref_offset() {
        let data = b"...\nstartxref\n1234\n%%EOF";
        assert_eq!(find_startxref(data), Some(1234));
    }

    #[test]
    fn backtracks_object_header_correctly() {
        let data = b"garbage 12 0 obj";
        let obj_at = find_subsequence(data, b" obj").unwrap();
        let (num, gen, start) = backtrack_object_header(data, obj_at).unwrap();
        assert_eq!((num, gen), (12, 0));
        assert_eq!(&data[start..], b"12 0 obj");
    }
}
