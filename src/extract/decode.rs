//! Byte-to-text decoding with legacy encoding fallbacks.

use encoding_rs::WINDOWS_1252;

/// Which decoder produced the text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    Utf8,
    Windows1252,
    Latin1,
}

/// Decode `bytes` as UTF-8, then Windows-1252, then Latin-1.
///
/// A UTF-8 byte-order mark is stripped. Windows-1252 follows the WHATWG
/// mapping, where bytes the code page leaves undefined become the matching
/// C1 control, so the Latin-1 branch is a last resort that maps every byte.
pub fn decode_text(bytes: &[u8]) -> (String, TextEncoding) {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);

    if let Ok(text) = std::str::from_utf8(bytes) {
        return (text.to_string(), TextEncoding::Utf8);
    }
    if let Some(text) = WINDOWS_1252.decode_without_bom_handling_and_without_replacement(bytes) {
        return (text.into_owned(), TextEncoding::Windows1252);
    }
    (decode_latin1(bytes), TextEncoding::Latin1)
}

fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utf8_passes_through() {
        let (text, enc) = decode_text("Grüezi mitenand".as_bytes());
        assert_eq!(text, "Grüezi mitenand");
        assert_eq!(enc, TextEncoding::Utf8);
    }

    #[test]
    fn test_bom_is_stripped() {
        let (text, _) = decode_text(b"\xEF\xBB\xBFhello");
        assert_eq!(text, "hello");
    }

    #[test]
    fn test_cp1252_fallback() {
        // euro sign, en dash and curly quotes
        let bytes = b"Preis: 5\x80 \x96 \x93ok\x94";
        let (text, enc) = decode_text(bytes);
        assert_eq!(enc, TextEncoding::Windows1252);
        assert_eq!(text, "Preis: 5€ \u{2013} \u{201C}ok\u{201D}");
    }

    #[test]
    fn test_latin1_umlauts_decode_via_cp1252() {
        let (text, enc) = decode_text(b"Z\xFCrich");
        assert_eq!(text, "Zürich");
        assert_eq!(enc, TextEncoding::Windows1252);
    }

    #[test]
    fn test_undefined_cp1252_byte_maps_to_c1_control() {
        let (text, enc) = decode_text(b"a\x81b\xE9 \x9D");
        assert_eq!(enc, TextEncoding::Windows1252);
        assert_eq!(text, "a\u{0081}bé \u{009D}");
    }

    #[test]
    fn test_latin1_maps_every_byte() {
        let bytes: Vec<u8> = (0..=255).collect();
        let text = decode_latin1(&bytes);
        assert_eq!(text.chars().count(), 256);
        assert!(text.chars().zip(0u32..).all(|(c, b)| u32::from(c) == b));
    }
}
