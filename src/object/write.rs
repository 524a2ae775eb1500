//! Serialization of [`Object`] values to raw PDF syntax bytes.
//!
//! The name/string escaping rules below are grounded on the teacher's own
//! `CharKind`-table approach to classifying bytes that need escaping in names.

use super::{Dictionary, Name, Object, PdfString, Stream};
use std::io::{self, Write};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CharKind {
    Whitespace,
    Delimiter,
    Regular,
}

const fn classify(byte: u8) -> CharKind {
    match byte {
        0x00 | 0x09 | 0x0A | 0x0C | 0x0D | 0x20 => CharKind::Whitespace,
        b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%' => {
            CharKind::Delimiter
        }
        _ => CharKind::Regular,
    }
}

const fn build_table() -> [CharKind; 256] {
    let mut table = [CharKind::Regular; 256];
    let mut i = 0;
    while i < 256 {
        table[i] = classify(i as u8);
        i += 1;
    }
    table
}

static CHAR_KIND: [CharKind; 256] = build_table();

pub fn char_kind(byte: u8) -> CharKind {
    CHAR_KIND[byte as usize]
}

fn needs_name_escape(byte: u8) -> bool {
    !(byte.is_ascii_graphic()) || byte == b'#' || char_kind(byte) != CharKind::Regular
}

fn write_name(w: &mut dyn Write, name: &Name) -> io::Result<()> {
    write!(w, "/")?;
    for &byte in name.as_bytes() {
        if needs_name_escape(byte) {
            write!(w, "#{:02X}", byte)?;
        } else {
            w.write_all(&[byte])?;
        }
    }
    Ok(())
}

fn write_literal_string(w: &mut dyn Write, bytes: &[u8]) -> io::Result<()> {
    write!(w, "(")?;
    for &byte in bytes {
        match byte {
            b'(' => write!(w, "\\(")?,
            b')' => write!(w, "\\)")?,
            b'\\' => write!(w, "\\\\")?,
            b'\n' => write!(w, "\\n")?,
            b'\r' => write!(w, "\\r")?,
            _ => w.write_all(&[byte])?,
        }
    }
    write!(w, ")")
}

fn write_hex_string(w: &mut dyn Write, bytes: &[u8]) -> io::Result<()> {
    write!(w, "<")?;
    for &byte in bytes {
        write!(w, "{:02X}", byte)?;
    }
    write!(w, ">")
}

fn write_string(w: &mut dyn Write, s: &PdfString) -> io::Result<()> {
    if s.hex {
        write_hex_string(w, &s.bytes)
    } else {
        write_literal_string(w, &s.bytes)
    }
}

fn write_number(w: &mut dyn Write, value: f64) -> io::Result<()> {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        itoa::write(w, value as i64)?;
    } else {
        dtoa::write(w, value)?;
    }
    Ok(())
}

pub fn write_dictionary_body(w: &mut dyn Write, dict: &Dictionary) -> io::Result<()> {
    write!(w, "<<")?;
    for (key, value) in dict.iter() {
        write_name(w, &Name(key.clone()))?;
        write!(w, " ")?;
        write_object(w, value)?;
        write!(w, " ")?;
    }
    write!(w, ">>")
}

pub fn write_object(w: &mut dyn Write, object: &Object) -> io::Result<()> {
    match object {
        Object::Null => write!(w, "null"),
        Object::Boolean(b) => write!(w, "{}", if *b { "true" } else { "false" }),
        Object::Integer(i) => {
            itoa::write(w, *i)?;
            Ok(())
        }
        Object::Real(r) => write_number(w, *r),
        Object::Name(n) => write_name(w, n),
        Object::String(s) => write_string(w, s),
        Object::Array(items) => {
            write!(w, "[")?;
            for (i, item) in items.iter().enumerate() {
                if i != 0 {
                    write!(w, " ")?;
                }
                write_object(w, item)?;
            }
            write!(w, "]")
        }
        Object::Dictionary(d) => write_dictionary_body(w, d),
        Object::Stream(s) => write_stream_body(w, s),
        Object::Reference((num, gen)) => write!(w, "{} {} R", num, gen),
    }
}

/// Writes a stream's dictionary (with `/Length` set to the current payload length)
/// followed by its raw (already filter-encoded) bytes between `stream`/`endstream`.
pub fn write_stream_body(w: &mut dyn Write, stream: &Stream) -> io::Result<()> {
    let mut dict = stream.dict.clone();
    dict.set("Length", stream.data.len() as i64);
    write_dictionary_body(w, &dict)?;
    write!(w, "\nstream\n")?;
    w.write_all(&stream.data)?;
    write!(w, "\nendstream")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ObjectId;

    fn to_string(o: &Object) -> String {
        let mut buf = Vec::new();
        write_object(&mut buf, o).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn writes_reference() {
        let id: ObjectId = (3, 0);
        assert_eq!(to_string(&Object::Reference(id)), "3 0 R");
    }

    #[test]
    fn escapes_name_delimiters() {
        let name = Name::new(b"A B".to_vec());
        assert_eq!(to_string(&Object::Name(name)), "/A#20B");
    }

    #[test]
    fn writes_literal_string_with_escapes() {
        let s = PdfString::literal(b"a(b)c".to_vec());
        assert_eq!(to_string(&Object::String(s)), "(a\\(b\\)c)");
    }

    #[test]
    fn writes_integers_without_decimal() {
        assert_eq!(to_string(&Object::Real(612.0)), "612");
        assert_eq!(to_string(&Object::Real(0.5)), "0.5");
    }
}
