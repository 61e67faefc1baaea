//! Charset resolution for response bodies.
//!
//! The declared charset comes from the `charset` parameter of the first
//! `Content-Type` header. A missing, malformed, or unknown declaration is not
//! an error: the decoder falls back to its configured default.

use std::borrow::Cow;
use std::fmt;

use encoding_rs::Encoding;
use tracing::debug;

/// Labels that decode as true ISO-8859-1. `encoding_rs` maps these to
/// windows-1252, which differs in the 0x80..=0x9F range.
const LATIN1_LABELS: &[&str] = &[
    "iso-8859-1",
    "iso8859-1",
    "iso_8859-1",
    "iso88591",
    "latin1",
    "l1",
    "cp819",
    "ibm819",
];

/// A text encoding used to turn body bytes into JSON text.
#[derive(Clone, Copy, PartialEq)]
pub enum Charset {
    /// Every byte maps to the code point with the same value.
    Latin1,
    Encoding(&'static Encoding),
}

impl Charset {
    pub fn utf8() -> Self {
        Charset::Encoding(encoding_rs::UTF_8)
    }

    /// Resolves a charset label such as `UTF-8` or `ISO-8859-1`.
    pub fn for_label(label: &str) -> Option<Self> {
        let label = label.trim();
        if LATIN1_LABELS
            .iter()
            .any(|known| known.eq_ignore_ascii_case(label))
        {
            return Some(Charset::Latin1);
        }
        Encoding::for_label(label.as_bytes()).map(Charset::Encoding)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Charset::Latin1 => "ISO-8859-1",
            Charset::Encoding(encoding) => encoding.name(),
        }
    }

    /// Decodes `bytes` without BOM sniffing: the resolved charset is always
    /// used, and a leading U+FEFF is dropped from the text. Malformed
    /// sequences become U+FFFD rather than failing.
    pub fn decode<'a>(&self, bytes: &'a [u8]) -> Cow<'a, str> {
        let text = match self {
            Charset::Latin1 => encoding_rs::mem::decode_latin1(bytes),
            Charset::Encoding(encoding) => encoding.decode_without_bom_handling(bytes).0,
        };
        strip_bom(text)
    }
}

impl fmt::Debug for Charset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Display for Charset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn strip_bom(text: Cow<'_, str>) -> Cow<'_, str> {
    const BOM: char = '\u{feff}';
    match text {
        Cow::Borrowed(s) => Cow::Borrowed(s.strip_prefix(BOM).unwrap_or(s)),
        Cow::Owned(mut s) => {
            if s.starts_with(BOM) {
                s.replace_range(..BOM.len_utf8(), "");
            }
            Cow::Owned(s)
        }
    }
}

/// Charset declared by a `Content-Type` value, if any can be resolved.
pub fn from_content_type(content_type: &str) -> Option<Charset> {
    let media_type: mime::Mime = match content_type.parse() {
        Ok(media_type) => media_type,
        Err(err) => {
            debug!(content_type, error = %err, "malformed content-type");
            return None;
        }
    };
    let label = media_type.get_param(mime::CHARSET)?;
    let charset = Charset::for_label(label.as_str());
    if charset.is_none() {
        debug!(charset = label.as_str(), "unknown charset label");
    }
    charset
}

/// Charset for a response with `headers`, falling back to `default`.
pub fn resolve(headers: &[(String, String)], default: Charset) -> Charset {
    let declared = headers
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("content-type"))
        .and_then(|(_, value)| from_content_type(value));
    match declared {
        Some(charset) => charset,
        None => {
            debug!(charset = %default, "no usable charset declared, using default");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(content_type: &str) -> Vec<(String, String)> {
        vec![("Content-Type".to_string(), content_type.to_string())]
    }

    #[test]
    fn latin1_labels_bypass_windows_1252() {
        assert_eq!(Charset::for_label("ISO-8859-1"), Some(Charset::Latin1));
        assert_eq!(Charset::for_label(" latin1 "), Some(Charset::Latin1));
        // 0x80 is a C1 control in ISO-8859-1 but the euro sign in windows-1252.
        assert_eq!(Charset::Latin1.decode(&[0x80]), "\u{80}");
    }

    #[test]
    fn declared_charset_is_used() {
        let charset = resolve(
            &headers("application/json;charset=ISO-8859-1"),
            Charset::utf8(),
        );
        assert_eq!(charset, Charset::Latin1);

        let charset = resolve(&headers("application/json; charset=utf-16le"), Charset::utf8());
        assert_eq!(charset.name(), "UTF-16LE");
    }

    #[test]
    fn header_name_is_case_insensitive() {
        let headers = vec![(
            "CONTENT-TYPE".to_string(),
            "application/json; charset=iso-8859-1".to_string(),
        )];
        assert_eq!(resolve(&headers, Charset::utf8()), Charset::Latin1);
    }

    #[test]
    fn missing_or_bad_charset_falls_back() {
        assert_eq!(resolve(&[], Charset::utf8()), Charset::utf8());
        assert_eq!(
            resolve(&headers("application/json"), Charset::utf8()),
            Charset::utf8()
        );
        assert_eq!(
            resolve(&headers("application/json; charset=klingon"), Charset::utf8()),
            Charset::utf8()
        );
        assert_eq!(resolve(&headers(";;;=="), Charset::Latin1), Charset::Latin1);
    }

    #[test]
    fn latin1_round_trips_accented_text() {
        let text = "ÁÉÍÓÚÀÈÌÒÙÄËÏÖÜÑ";
        let bytes: Vec<u8> = text.chars().map(|c| c as u32 as u8).collect();
        assert_eq!(bytes.len(), text.chars().count());
        assert_eq!(Charset::Latin1.decode(&bytes), text);
        assert_ne!(Charset::utf8().decode(&bytes), text);
    }

    #[test]
    fn leading_byte_order_mark_is_dropped() {
        assert_eq!(Charset::utf8().decode(b"\xEF\xBB\xBF{}"), "{}");
        let utf16: Vec<u8> = [0xFF, 0xFE, b'[', 0, b']', 0].to_vec();
        let charset = Charset::for_label("utf-16le").unwrap();
        assert_eq!(charset.decode(&utf16), "[]");
        // Only a leading mark is dropped.
        assert_eq!(Charset::utf8().decode("a\u{feff}".as_bytes()), "a\u{feff}");
    }
}
