use std::io::Cursor;

/// Keyword under which the UI stores the generation infotext in PNG files.
const PARAMETERS_KEYWORD: &str = "parameters";

/// Read the generation-parameters text from a PNG's text chunks.
///
/// Checks tEXt, then zTXt, then iTXt, which covers both how PIL writes the
/// chunk and how browsers re-encode it. `None` when the bytes are not a PNG
/// or carry no parameters chunk.
pub fn read_parameters(png_bytes: &[u8]) -> Option<String> {
    let decoder = png::Decoder::new(Cursor::new(png_bytes));
    let reader = decoder.read_info().ok()?;
    let info = reader.info();

    for chunk in &info.uncompressed_latin1_text {
        if chunk.keyword == PARAMETERS_KEYWORD {
            return Some(chunk.text.clone());
        }
    }
    for chunk in &info.compressed_latin1_text {
        if chunk.keyword == PARAMETERS_KEYWORD {
            if let Ok(text) = chunk.get_text() {
                return Some(text);
            }
        }
    }
    for chunk in &info.utf8_text {
        if chunk.keyword == PARAMETERS_KEYWORD {
            if let Ok(text) = chunk.get_text() {
                return Some(text);
            }
        }
    }
    None
}

/// Test fixture: a 1x1 PNG carrying one tEXt chunk.
#[cfg(test)]
pub(crate) fn png_with_text(keyword: &str, text: &str) -> Vec<u8> {
    let mut out = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut out, 1, 1);
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        encoder
            .add_text_chunk(keyword.to_string(), text.to_string())
            .unwrap();
        let mut writer = encoder.write_header().unwrap();
        writer.write_image_data(&[0, 0, 0, 0]).unwrap();
    }
    out
}
