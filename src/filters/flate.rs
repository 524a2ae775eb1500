//! FlateDecode: zlib inflate, with recovery for producers that terminate the
//! stream with a sync-flush marker (`00 00 FF FF`) instead of a final block.

use crate::errors::PdfError;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{Read, Write};

const SYNC_FLUSH_MARKER: [u8; 4] = [0x00, 0x00, 0xFF, 0xFF];

pub fn decode(data: &[u8]) -> Result<Vec<u8>, PdfError> {
    let mut out = Vec::new();
    let mut decoder = ZlibDecoder::new(data);
    match decoder.read_to_end(&mut out) {
        Ok(_) => Ok(out),
        Err(_) if data.windows(4).any(|w| w == SYNC_FLUSH_MARKER) => {
            decode_sync_flush(data)
        }
        Err(e) => Err(PdfError::FilterDecodeError {
            filter: "FlateDecode".into(),
            reason: e.to_string(),
        }),
    }
}

/// Drive the inflater incrementally and keep whatever bytes it managed to
/// produce before the stream ends early at a sync-flush boundary.
fn decode_sync_flush(data: &[u8]) -> Result<Vec<u8>, PdfError> {
    let mut out = Vec::new();
    let mut decoder = ZlibDecoder::new(data);
    let mut chunk = [0u8; 4096];
    loop {
        match decoder.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => out.extend_from_slice(&chunk[..n]),
            Err(_) => break,
        }
    }
    Ok(out)
}

pub fn encode(data: &[u8]) -> Result<Vec<u8>, PdfError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| PdfError::FilterDecodeError { filter: "FlateDecode".into(), reason: e.to_string() })?;
    encoder
        .finish()
        .map_err(|e| PdfError::FilterDecodeError { filter: "FlateDecode".into(), reason: e.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_arbitrary_bytes() {
        let original = b"the quick brown fox jumps over the lazy dog".to_vec();
        let encoded = encode(&original).unwrap();
        let decoded = decode(&encoded).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn recovers_sync_flush_terminated_stream() {
        // zlib header + deflate("q\n") with a sync-flush ending, matching the
        // documented S3 scenario: `78 9C 2A E4 02 00 00 00 FF FF` decodes to "q\n".
        let bytes = [0x78, 0x9C, 0x2A, 0xE4, 0x02, 0x00, 0x00, 0x00, 0xFF, 0xFF];
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded, b"q\n");
    }
}
