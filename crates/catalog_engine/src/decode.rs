use chardetng::EncodingDetector;
use encoding_rs::{Encoding, UTF_8};

use crate::{FailureKind, ItemError};

/// How many leading bytes are scanned for a `<meta charset>` declaration.
const META_PRESCAN_BYTES: usize = 1024;

/// Decodes a page body to UTF-8.
///
/// Order: byte-order mark, `charset` parameter of the Content-Type header,
/// `<meta charset>` in the first kilobyte, then a chardetng guess.
pub fn decode_page(bytes: &[u8], content_type: Option<&str>) -> Result<String, ItemError> {
    if let Some((encoding, _)) = Encoding::for_bom(bytes) {
        return decode_with(bytes, encoding);
    }

    let declared = content_type
        .and_then(header_charset)
        .or_else(|| meta_charset(bytes))
        .and_then(|label| Encoding::for_label(label.as_bytes()));
    if let Some(encoding) = declared {
        return decode_with(bytes, encoding);
    }

    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    decode_with(bytes, detector.guess(None, true))
}

fn header_charset(content_type: &str) -> Option<String> {
    content_type.split(';').find_map(|part| {
        let (key, value) = part.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches(['"', '\'']).to_string())
    })
}

fn meta_charset(bytes: &[u8]) -> Option<String> {
    let head = &bytes[..bytes.len().min(META_PRESCAN_BYTES)];
    let head = String::from_utf8_lossy(head).to_ascii_lowercase();
    let start = head.find("charset=")? + "charset=".len();
    let label: String = head[start..]
        .trim_start_matches(['"', '\''])
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'))
        .collect();
    (!label.is_empty()).then_some(label)
}

fn decode_with(bytes: &[u8], encoding: &'static Encoding) -> Result<String, ItemError> {
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors && encoding == UTF_8 {
        return Err(ItemError::new(
            FailureKind::Decode,
            format!("invalid {} sequence", encoding.name()),
        ));
    }
    Ok(text.into_owned())
}

#[cfg(test)]
mod tests {
    use super::decode_page;

    #[test]
    fn header_charset_wins_over_detection() {
        let bytes = b"<p>caf\xe9</p>";
        let text = decode_page(bytes, Some("text/html; charset=ISO-8859-1")).unwrap();
        assert_eq!(text, "<p>café</p>");
    }

    #[test]
    fn meta_charset_is_honoured() {
        let bytes = b"<html><head><meta charset=\"windows-1252\"></head><p>\x93hi\x94</p>";
        let text = decode_page(bytes, Some("text/html")).unwrap();
        assert!(text.contains("\u{201c}hi\u{201d}"));
    }

    #[test]
    fn broken_utf8_is_reported() {
        let err = decode_page(b"<p>\xff\xfe\xfd</p>", Some("text/html; charset=utf-8")).unwrap_err();
        assert_eq!(err.kind, crate::FailureKind::Decode);
    }
}
