//! The PDF value model: a closed tagged union plus helpers to serialize it to
//! raw PDF syntax. Dictionaries keep insertion order (via `indexmap`) so that
//! round-tripped documents stay diff-friendly even though order is not semantically
//! significant.

pub mod write;

pub use self::write::CharKind;

use indexmap::IndexMap;
use std::fmt;

pub mod registry;

/// Identity of an indirect object: `(object number, generation)`.
pub type ObjectId = (u32, u16);

#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    Null,
    Boolean(bool),
    Integer(i64),
    Real(f64),
    Name(Name),
    String(PdfString),
    Array(Vec<Object>),
    Dictionary(Dictionary),
    Stream(Stream),
    Reference(ObjectId),
}

/// A PDF name, stored without its leading `/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Name(pub Vec<u8>);

impl Name {
    pub fn new(s: impl Into<Vec<u8>>) -> Self {
        Name(s.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn as_str(&self) -> std::borrow::Cow<str> {
        String::from_utf8_lossy(&self.0)
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "/{}", self.as_str())
    }
}

impl<'a> From<&'a str> for Name {
    fn from(s: &'a str) -> Self {
        Name(s.as_bytes().to_vec())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PdfString {
    pub bytes: Vec<u8>,
    /// Whether this string was (or should be, on write) encoded as a hex string
    /// `<...>` rather than a literal `(...)` string.
    pub hex: bool,
}

impl PdfString {
    pub fn literal(bytes: impl Into<Vec<u8>>) -> Self {
        PdfString { bytes: bytes.into(), hex: false }
    }

    pub fn hex(bytes: impl Into<Vec<u8>>) -> Self {
        PdfString { bytes: bytes.into(), hex: true }
    }

    pub fn as_utf8_lossy(&self) -> std::borrow::Cow<str> {
        String::from_utf8_lossy(&self.bytes)
    }
}

/// An ordered name -> value mapping. Order is preserved for diagnostics and
/// deterministic serialization, but lookups never depend on it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dictionary(pub IndexMap<Vec<u8>, Object>);

impl Dictionary {
    pub fn new() -> Self {
        Dictionary(IndexMap::new())
    }

    pub fn get(&self, key: &str) -> Option<&Object> {
        self.0.get(key.as_bytes())
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Object> {
        self.0.get_mut(key.as_bytes())
    }

    pub fn set(&mut self, key: impl Into<Vec<u8>>, value: impl Into<Object>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<Object> {
        self.0.shift_remove(key.as_bytes())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key.as_bytes())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Vec<u8>, &Object)> {
        self.0.iter()
    }

    pub fn type_is(&self, expected: &str) -> bool {
        matches!(self.get("Type"), Some(Object::Name(n)) if n.as_bytes() == expected.as_bytes())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stream {
    pub dict: Dictionary,
    /// Bytes exactly as read from the source file (still filtered), or, after a
    /// `set_data` call, plain decoded bytes with `/Filter` cleared.
    pub data: Vec<u8>,
}

impl Stream {
    pub fn new(dict: Dictionary, data: Vec<u8>) -> Self {
        Stream { dict, data }
    }

    /// Replace this stream's payload with already-decoded bytes, dropping any
    /// `/Filter` and `/DecodeParms` entries (the caller now owns encode-on-save).
    pub fn set_data(&mut self, data: Vec<u8>) {
        self.dict.remove("Filter");
        self.dict.remove("DecodeParms");
        self.dict.remove("DP");
        self.data = data;
    }

    pub fn filter_names(&self) -> Vec<Name> {
        match self.dict.get("Filter") {
            Some(Object::Name(n)) => vec![n.clone()],
            Some(Object::Array(arr)) => arr
                .iter()
                .filter_map(|o| match o {
                    Object::Name(n) => Some(n.clone()),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }
}

impl Object {
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Object::Integer(i) => Some(*i),
            Object::Real(r) => Some(*r as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Object::Integer(i) => Some(*i as f64),
            Object::Real(r) => Some(*r),
            _ => None,
        }
    }

    pub fn as_name(&self) -> Option<&Name> {
        match self {
            Object::Name(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Object]> {
        match self {
            Object::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&Dictionary> {
        match self {
            Object::Dictionary(d) => Some(d),
            Object::Stream(s) => Some(&s.dict),
            _ => None,
        }
    }

    pub fn as_dict_mut(&mut self) -> Option<&mut Dictionary> {
        match self {
            Object::Dictionary(d) => Some(d),
            Object::Stream(s) => Some(&mut s.dict),
            _ => None,
        }
    }

    pub fn as_stream(&self) -> Option<&Stream> {
        match self {
            Object::Stream(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_stream_mut(&mut self) -> Option<&mut Stream> {
        match self {
            Object::Stream(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&PdfString> {
        match self {
            Object::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<ObjectId> {
        match self {
            Object::Reference(id) => Some(*id),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Object::Null)
    }
}

impl From<bool> for Object {
    fn from(v: bool) -> Self {
        Object::Boolean(v)
    }
}
impl From<i64> for Object {
    fn from(v: i64) -> Self {
        Object::Integer(v)
    }
}
impl From<i32> for Object {
    fn from(v: i32) -> Self {
        Object::Integer(v as i64)
    }
}
impl From<f64> for Object {
    fn from(v: f64) -> Self {
        Object::Real(v)
    }
}
impl From<f32> for Object {
    fn from(v: f32) -> Self {
        Object::Real(v as f64)
    }
}
impl From<Name> for Object {
    fn from(v: Name) -> Self {
        Object::Name(v)
    }
}
impl From<&str> for Object {
    fn from(v: &str) -> Self {
        Object::Name(Name::from(v))
    }
}
impl From<PdfString> for Object {
    fn from(v: PdfString) -> Self {
        Object::String(v)
    }
}
impl From<Vec<Object>> for Object {
    fn from(v: Vec<Object>) -> Self {
        Object::Array(v)
    }
}
impl From<Dictionary> for Object {
    fn from(v: Dictionary) -> Self {
        Object::Dictionary(v)
    }
}
impl From<Stream> for Object {
    fn from(v: Stream) -> Self {
        Object::Stream(v)
    }
}
impl From<ObjectId> for Object {
    fn from(v: ObjectId) -> Self {
        Object::Reference(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dictionary_preserves_insertion_order() {
        let mut d = Dictionary::new();
        d.set("Type", "Catalog");
        d.set("Pages", (2, 0));
        let keys: Vec<_> = d.iter().map(|(k, _)| k.clone()).collect();
        assert_eq!(keys, vec![b"Type".to_vec(), b"Pages".to_vec()]);
    }

    #[test]
    fn stream_set_data_clears_filter() {
        let mut dict = Dictionary::new();
        dict.set("Filter", "FlateDecode");
        let mut stream = Stream::new(dict, vec![1, 2, 3]);
        stream.set_data(vec![4, 5]);
        assert!(!stream.dict.contains_key("Filter"));
        assert_eq!(stream.data, vec![4, 5]);
    }
}
