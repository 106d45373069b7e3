//! Body text encoding round trip
//!
//! The response body is decoded once at capture time using the charset the
//! live response declared, stored as text, and re-encoded at replay time
//! using a numeric encoding identifier. The identifier indexes a fixed table
//! of supported encodings; anything outside the table falls back to UTF-8.

use encoding_rs::Encoding;

/// Supported encodings; a stored `bodyEncodingRaw` is an index into this table
static SUPPORTED: &[&Encoding] = &[
    encoding_rs::UTF_8,        // 0
    encoding_rs::WINDOWS_1252, // 1 (also covers iso-8859-1 labels)
    encoding_rs::ISO_8859_2,   // 2
    encoding_rs::ISO_8859_15,  // 3
    encoding_rs::UTF_16LE,     // 4
    encoding_rs::UTF_16BE,     // 5
    encoding_rs::SHIFT_JIS,    // 6
    encoding_rs::EUC_JP,       // 7
    encoding_rs::GBK,          // 8
    encoding_rs::BIG5,         // 9
    encoding_rs::EUC_KR,       // 10
    encoding_rs::KOI8_R,       // 11
];

/// Identifier of UTF-8, the default and fallback encoding
pub const UTF_8_ID: u32 = 0;

/// Extract the charset parameter from a `Content-Type` header value
#[must_use]
pub fn charset_from_content_type(content_type: &str) -> Option<&str> {
    content_type.split(';').skip(1).find_map(|segment| {
        let segment = segment.trim();
        let value = segment
            .strip_prefix("charset=")
            .or_else(|| segment.strip_prefix("CHARSET="))
            .or_else(|| segment.strip_prefix("Charset="))?;
        Some(value.trim_matches('"'))
    })
}

/// Resolve a declared charset label to an encoding, defaulting to UTF-8
#[must_use]
pub fn encoding_for_charset(label: Option<&str>) -> &'static Encoding {
    label
        .and_then(|label| Encoding::for_label(label.as_bytes()))
        .unwrap_or(encoding_rs::UTF_8)
}

/// Numeric identifier for an encoding; unsupported encodings map to UTF-8
#[must_use]
pub fn encoding_id(encoding: &'static Encoding) -> u32 {
    SUPPORTED
        .iter()
        .position(|candidate| *candidate == encoding)
        .map_or(UTF_8_ID, |index| index as u32)
}

/// Decode raw body bytes into text
#[must_use]
pub fn decode_body(bytes: &[u8], encoding: &'static Encoding) -> String {
    let (text, _, _) = encoding.decode(bytes);
    text.into_owned()
}

/// Re-encode stored body text using a stored encoding identifier
///
/// Unknown identifiers, and encodings the encoder cannot express (UTF-16
/// output), fall back to the UTF-8 bytes of the text.
#[must_use]
pub fn encode_body(id: u32, text: &str) -> Vec<u8> {
    match SUPPORTED.get(id as usize) {
        Some(encoding) => {
            let (bytes, _, _) = encoding.encode(text);
            bytes.into_owned()
        }
        None => text.as_bytes().to_vec(),
    }
}
