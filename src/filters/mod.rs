//! Stream filter pipeline: decodes (and where meaningful, encodes) the codecs a
//! PDF stream's `/Filter` array may name, applying them in order.

mod ascii85;
mod asciihex;
mod flate;
mod lzw;
mod predictor;
mod rle;

use crate::errors::PdfError;
use crate::object::{Dictionary, Name, Object};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    FlateDecode,
    Ascii85Decode,
    RunLengthDecode,
    AsciiHexDecode,
    LzwDecode,
    DctDecode,
    CcittFaxDecode,
    Jbig2Decode,
    Crypt,
}

impl Filter {
    pub fn from_name(name: &Name) -> Result<Self, PdfError> {
        Ok(match name.as_bytes() {
            b"FlateDecode" | b"Fl" => Filter::FlateDecode,
            b"ASCII85Decode" | b"A85" => Filter::Ascii85Decode,
            b"RunLengthDecode" | b"RL" => Filter::RunLengthDecode,
            b"ASCIIHexDecode" | b"AHx" => Filter::AsciiHexDecode,
            b"LZWDecode" | b"LZW" => Filter::LzwDecode,
            b"DCTDecode" | b"DCT" => Filter::DctDecode,
            b"CCITTFaxDecode" | b"CCF" => Filter::CcittFaxDecode,
            b"JBIG2Decode" => Filter::Jbig2Decode,
            b"Crypt" => Filter::Crypt,
            other => {
                return Err(PdfError::UnknownFilter(String::from_utf8_lossy(other).into_owned()))
            }
        })
    }

    fn name(&self) -> &'static str {
        match self {
            Filter::FlateDecode => "FlateDecode",
            Filter::Ascii85Decode => "ASCII85Decode",
            Filter::RunLengthDecode => "RunLengthDecode",
            Filter::AsciiHexDecode => "ASCIIHexDecode",
            Filter::LzwDecode => "LZWDecode",
            Filter::DctDecode => "DCTDecode",
            Filter::CcittFaxDecode => "CCITTFaxDecode",
            Filter::Jbig2Decode => "JBIG2Decode",
            Filter::Crypt => "Crypt",
        }
    }
}

/// Parameters for a single filter stage, taken from `/DecodeParms`.
#[derive(Debug, Clone, Default)]
pub struct DecodeParms {
    pub predictor: i64,
    pub colors: i64,
    pub bits_per_component: i64,
    pub columns: i64,
    pub early_change: i64,
}

impl DecodeParms {
    pub fn from_dict(dict: Option<&Dictionary>) -> Self {
        let get = |key: &str, default: i64| {
            dict.and_then(|d| d.get(key)).and_then(Object::as_integer).unwrap_or(default)
        };
        DecodeParms {
            predictor: get("Predictor", 1),
            colors: get("Colors", 1),
            bits_per_component: get("BitsPerComponent", 8),
            columns: get("Columns", 1),
            early_change: get("EarlyChange", 1),
        }
    }
}

pub fn decode(filter: Filter, data: &[u8], parms: &DecodeParms) -> Result<Vec<u8>, PdfError> {
    let decoded = match filter {
        Filter::FlateDecode => self::flate::decode(data)?,
        Filter::Ascii85Decode => self::ascii85::decode(data)?,
        Filter::RunLengthDecode => self::rle::decode(data)?,
        Filter::AsciiHexDecode => self::asciihex::decode(data)?,
        Filter::LzwDecode => self::lzw::decode(data, parms.early_change != 0)?,
        Filter::DctDecode | Filter::CcittFaxDecode => data.to_vec(),
        Filter::Jbig2Decode => {
            return Err(PdfError::Unsupported("JBIG2Decode is not implemented".into()))
        }
        Filter::Crypt => data.to_vec(),
    };
    if parms.predictor > 1 {
        Ok(self::predictor::undo(
            &decoded,
            parms.predictor,
            parms.colors.max(1) as usize,
            parms.bits_per_component.max(1) as usize,
            parms.columns.max(1) as usize,
        )?)
    } else {
        Ok(decoded)
    }
}

pub fn encode(filter: Filter, data: &[u8]) -> Result<Vec<u8>, PdfError> {
    match filter {
        Filter::FlateDecode => self::flate::encode(data),
        Filter::Ascii85Decode => Ok(self::ascii85::encode(data)),
        Filter::RunLengthDecode => Ok(self::rle::encode(data)),
        Filter::AsciiHexDecode => Ok(self::asciihex::encode(data)),
        _ => Err(PdfError::Unsupported(format!("encoding with {} is not supported", filter.name()))),
    }
}

/// Decode every filter stage named on a stream dictionary, in order.
pub fn decode_stream(dict: &Dictionary, data: &[u8]) -> Result<Vec<u8>, PdfError> {
    let filters = filter_list(dict);
    let parms_list = parms_list(dict, filters.len());
    let mut buf = data.to_vec();
    for (filter, parms) in filters.iter().zip(parms_list.iter()) {
        buf = decode(*filter, &buf, parms)?;
    }
    Ok(buf)
}

fn filter_list(dict: &Dictionary) -> Vec<Filter> {
    match dict.get("Filter") {
        Some(Object::Name(n)) => Filter::from_name(n).into_iter().collect(),
        Some(Object::Array(arr)) => arr
            .iter()
            .filter_map(|o| o.as_name())
            .filter_map(|n| Filter::from_name(n).ok())
            .collect(),
        _ => Vec::new(),
    }
}

fn parms_list(dict: &Dictionary, count: usize) -> Vec<DecodeParms> {
    let raw = match dict.get("DecodeParms").or_else(|| dict.get("DP")) {
        Some(Object::Dictionary(d)) => vec![Some(d.clone())],
        Some(Object::Array(arr)) => arr
            .iter()
            .map(|o| match o {
                Object::Dictionary(d) => Some(d.clone()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    };
    (0..count)
        .map(|i| DecodeParms::from_dict(raw.get(i).and_then(|o| o.as_ref())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_filter_name_is_rejected() {
        let name = Name::from("Xyz");
        assert!(Filter::from_name(&name).is_err());
    }

    #[test]
    fn recognizes_abbreviated_filter_names() {
        assert_eq!(Filter::from_name(&Name::from("Fl")).unwrap(), Filter::FlateDecode);
        assert_eq!(Filter::from_name(&Name::from("AHx")).unwrap(), Filter::AsciiHexDecode);
    }
}
