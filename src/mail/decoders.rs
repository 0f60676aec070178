//! Charset resolution for message payloads and header values.
//!
//! Bodies arrive as bytes in whatever encoding the sender declared (or didn't). A declared
//! charset is trusted when `encoding_rs` knows the label; otherwise the bytes go through
//! `chardetng`. Decoding never fails: invalid sequences become U+FFFD.

use std::borrow::Cow;

use chardetng::EncodingDetector;
use encoding_rs::{Encoding, REPLACEMENT, UTF_8};
use mailparse::MailHeader;

/// Input to [`decode_text`]: either text that is already decoded, or raw bytes.
#[derive(Debug, Clone, Copy)]
pub enum Payload<'a> {
    Text(&'a str),
    Bytes(&'a [u8]),
}

impl<'a> From<&'a str> for Payload<'a> {
    fn from(text: &'a str) -> Self {
        Payload::Text(text)
    }
}

impl<'a> From<&'a [u8]> for Payload<'a> {
    fn from(bytes: &'a [u8]) -> Self {
        Payload::Bytes(bytes)
    }
}

impl<'a> From<&'a Vec<u8>> for Payload<'a> {
    fn from(bytes: &'a Vec<u8>) -> Self {
        Payload::Bytes(bytes.as_slice())
    }
}

/// Decode `payload` using the declared `charset`, or a detected one when none is declared.
pub fn decode_text<'a>(payload: impl Into<Payload<'a>>, charset: Option<&str>) -> Cow<'a, str> {
    let bytes = match payload.into() {
        Payload::Text(text) => return Cow::Borrowed(text),
        Payload::Bytes(bytes) => bytes,
    };
    if bytes.is_empty() {
        return Cow::Borrowed("");
    }

    if let Some(encoding) = charset.and_then(declared_encoding) {
        let (text, _, _) = encoding.decode(bytes);
        return text;
    }

    let (text, _, had_errors) = detect_encoding(bytes).decode(bytes);
    if had_errors {
        // detection picked something that doesn't fit; lossy UTF-8 is the last resort
        return String::from_utf8_lossy(bytes);
    }
    text
}

fn declared_encoding(label: &str) -> Option<&'static Encoding> {
    let label = label.trim().trim_matches('"');
    if label.is_empty() {
        return None;
    }
    match Encoding::for_label(label.as_bytes()) {
        // labels like iso-2022-kr map to the replacement encoding, which would
        // swallow the whole payload
        Some(encoding) if encoding != REPLACEMENT => Some(encoding),
        _ => {
            log::debug!("unknown charset {label:?}; falling back to detection");
            None
        }
    }
}

fn detect_encoding(bytes: &[u8]) -> &'static Encoding {
    if std::str::from_utf8(bytes).is_ok() {
        return UTF_8;
    }
    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    let (encoding, _is_confident) = detector.guess_assess(None, true);
    encoding
}

/// Decoded value of a header.
///
/// ASCII headers go through mailparse's RFC 2047 decoding. Raw 8-bit headers (common from
/// SMTPUTF8 senders) are charset-detected instead of being read as Latin-1.
pub fn decode_header_value(header: &MailHeader) -> String {
    let raw = header.get_value_raw();
    if raw.is_ascii() {
        return header.get_value().trim().to_string();
    }
    decode_text(raw, None)
        .replace("\r\n", "")
        .replace('\n', "")
        .trim()
        .to_string()
}
