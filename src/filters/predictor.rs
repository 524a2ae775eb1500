//! PNG-style predictor undoing, applied after FlateDecode/LZWDecode when
//! `/Predictor > 1`.

use crate::errors::PdfError;

pub fn undo(
    data: &[u8],
    predictor: i64,
    colors: usize,
    bits_per_component: usize,
    columns: usize,
) -> Result<Vec<u8>, PdfError> {
    if predictor == 2 {
        return Ok(undo_tiff(data, colors, bits_per_component, columns));
    }
    // Predictor values 10-15 all mean "PNG predictor"; the per-row tag byte
    // selects the actual algorithm and may vary row to row.
    let bytes_per_pixel = ((colors * bits_per_component + 7) / 8).max(1);
    let row_bytes = (colors * bits_per_component * columns + 7) / 8;
    let stride = row_bytes + 1;
    if stride == 0 || data.is_empty() {
        return Ok(Vec::new());
    }

    let mut out = Vec::with_capacity(data.len() / stride * row_bytes);
    let mut prev_row = vec![0u8; row_bytes];
    for chunk in data.chunks(stride) {
        if chunk.len() < 2 {
            break;
        }
        let tag = chunk[0];
        let mut row = chunk[1..].to_vec();
        row.resize(row_bytes, 0);
        for i in 0..row_bytes {
            let a = if i >= bytes_per_pixel { row[i - bytes_per_pixel] } else { 0 };
            let b = prev_row[i];
            let c = if i >= bytes_per_pixel { prev_row[i - bytes_per_pixel] } else { 0 };
            let x = row[i];
            row[i] = match tag {
                0 => x,
                1 => x.wrapping_add(a),
                2 => x.wrapping_add(b),
                3 => x.wrapping_add(((a as u16 + b as u16) / 2) as u8),
                4 => x.wrapping_add(paeth(a, b, c)),
                _ => x,
            };
        }
        out.extend_from_slice(&row);
        prev_row = row;
    }
    Ok(out)
}

fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let (a, b, c) = (a as i32, b as i32, c as i32);
    let p = a + b - c;
    let pa = (p - a).abs();
    let pb = (p - b).abs();
    let pc = (p - c).abs();
    if pa <= pb && pa <= pc {
        a as u8
    } else if pb <= pc {
        b as u8
    } else {
        c as u8
    }
}

fn undo_tiff(data: &[u8], colors: usize, bits_per_component: usize, columns: usize) -> Vec<u8> {
    if bits_per_component != 8 {
        // Sub-byte TIFF prediction is rare in PDF producers; pass through
        // unchanged rather than guessing at bit-packing.
        return data.to_vec();
    }
    let row_bytes = colors * columns;
    let mut out = data.to_vec();
    for row in out.chunks_mut(row_bytes) {
        for i in colors..row.len() {
            row[i] = row[i].wrapping_add(row[i - colors]);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undoes_sub_filter_on_single_row() {
        // colors=1, bpc=8, columns=3; tag=1 (Sub), raw deltas [5, 1, 1] -> 5, 6, 7
        let data = [1u8, 5, 1, 1];
        let out = undo(&data, 10, 1, 8, 3).unwrap();
        assert_eq!(out, vec![5, 6, 7]);
    }

    #[test]
    fn passthrough_for_none_tag() {
        let data = [0u8, 9, 8, 7];
        let out = undo(&data, 15, 1, 8, 3).unwrap();
        assert_eq!(out, vec![9, 8, 7]);
    }
}
