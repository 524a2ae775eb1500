//! ASCIIHexDecode/Encode (`/AHx`).

use crate::errors::PdfError;

pub fn decode(data: &[u8]) -> Result<Vec<u8>, PdfError> {
    let mut out = Vec::new();
    let mut high: Option<u8> = None;
    for &byte in data {
        if byte == b'>' {
            break;
        }
        if byte.is_ascii_whitespace() {
            continue;
        }
        let nibble = (byte as char).to_digit(16).ok_or_else(|| PdfError::FilterDecodeError {
            filter: "ASCIIHexDecode".into(),
            reason: format!("invalid hex digit {:#x}", byte),
        })? as u8;
        match high.take() {
            Some(h) => out.push((h << 4) | nibble),
            None => high = Some(nibble),
        }
    }
    if let Some(h) = high {
        out.push(h << 4);
    }
    Ok(out)
}

pub fn encode(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() * 2 + 1);
    for &byte in data {
        out.extend(format!("{:02X}", byte).into_bytes());
    }
    out.push(b'>');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let original = b"Hello".to_vec();
        let encoded = encode(&original);
        let decoded = decode(&encoded).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn odd_length_pads_final_nibble() {
        let decoded = decode(b"4A1>").unwrap();
        assert_eq!(decoded, vec![0x4A, 0x10]);
    }
}
