use chrono::Utc;
use mailparse::body::Body;
use mailparse::{MailHeader, MailHeaderMap, ParsedMail};
use serde::{Deserialize, Serialize};

use crate::domain::email::NormalizedEmail;
use crate::error::ParseError;
use crate::mail::decoders::{decode_header_value, decode_text};

// wide enough that html2text doesn't re-wrap ordinary paragraphs
const HTML_WRAP_WIDTH: usize = 400;

/// Which `text/*` part of a multipart message becomes the body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyPreference {
    /// First text part in document order, whatever its subtype.
    #[default]
    FirstText,
    /// First `text/plain` part; first text part of any kind if there is none.
    PreferPlain,
}

#[derive(Debug, Clone)]
pub struct Normalizer {
    /// Convert `text/html` bodies to plain text.
    pub strip_html: bool,
    pub preference: BodyPreference,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self {
            strip_html: true,
            preference: BodyPreference::FirstText,
        }
    }
}

struct SelectedPart {
    content_type: String,
    charset: Option<String>,
    payload: Vec<u8>,
}

impl Normalizer {
    pub fn new(strip_html: bool, preference: BodyPreference) -> Self {
        Self {
            strip_html,
            preference,
        }
    }

    /// Parse raw MIME source and flatten it into a [`NormalizedEmail`].
    pub fn normalize(&self, raw: &[u8]) -> Result<NormalizedEmail, ParseError> {
        let parsed = mailparse::parse_mail(raw).map_err(|e| {
            log::error!("failed to parse message ({} bytes): {e}", raw.len());
            ParseError::from(e)
        })?;

        let subject = header_text(&parsed.headers, "Subject");
        let (content_type, body) = match self.select_body(&parsed) {
            Some(part) => {
                let text = decode_text(&part.payload, part.charset.as_deref());
                let body = if self.strip_html && part.content_type == "text/html" {
                    html_to_text(&text)
                } else {
                    text.into_owned()
                };
                (part.content_type, body)
            }
            None => (String::new(), String::new()),
        };

        let email = NormalizedEmail {
            id: header_text(&parsed.headers, "Message-ID"),
            subject,
            from: header_text(&parsed.headers, "From"),
            to: header_text(&parsed.headers, "To"),
            date: raw_header(&parsed.headers, "Date"),
            content_type,
            body: body.trim().to_string(),
            processed_at: Utc::now(),
        };
        log::info!("normalized message: {}", email.label());
        Ok(email)
    }

    fn select_body(&self, parsed: &ParsedMail) -> Option<SelectedPart> {
        if !is_multipart(parsed) {
            return Some(SelectedPart::from_part(parsed, body_bytes(parsed)));
        }

        let mut parts = Vec::new();
        collect_text_parts(parsed, &mut parts);

        let mut fallback = None;
        for part in parts {
            let payload = body_bytes(part);
            if payload.is_empty() {
                continue;
            }
            let selected = SelectedPart::from_part(part, payload);
            match self.preference {
                BodyPreference::FirstText => return Some(selected),
                BodyPreference::PreferPlain if selected.content_type == "text/plain" => {
                    return Some(selected);
                }
                BodyPreference::PreferPlain => {
                    fallback.get_or_insert(selected);
                }
            }
        }
        fallback
    }
}

impl SelectedPart {
    fn from_part(part: &ParsedMail, payload: Vec<u8>) -> Self {
        // mailparse fills in us-ascii when nothing is declared, so read the raw param
        let charset = part
            .ctype
            .params
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("charset"))
            .map(|(_, v)| v.clone());
        Self {
            content_type: part.ctype.mimetype.to_ascii_lowercase(),
            charset,
            payload,
        }
    }
}

fn is_multipart(part: &ParsedMail) -> bool {
    part.ctype.mimetype.to_ascii_lowercase().starts_with("multipart/")
}

/// Transfer-decoded payload of `part`. A body that claims base64 or quoted-printable but
/// does not decode is kept as written and left to the charset resolver.
fn body_bytes(part: &ParsedMail) -> Vec<u8> {
    match part.get_body_encoded() {
        Body::Base64(body) | Body::QuotedPrintable(body) => {
            body.get_decoded().unwrap_or_else(|e| {
                log::warn!(
                    "bad transfer encoding in {} part, keeping it undecoded: {e}",
                    part.ctype.mimetype
                );
                body.get_raw().to_vec()
            })
        }
        Body::SevenBit(body) | Body::EightBit(body) => body.get_raw().to_vec(),
        Body::Binary(body) => body.get_raw().to_vec(),
    }
}

/// Depth-first, document order.
fn collect_text_parts<'p, 'a>(part: &'p ParsedMail<'a>, out: &mut Vec<&'p ParsedMail<'a>>) {
    if part.ctype.mimetype.to_ascii_lowercase().starts_with("text/") {
        out.push(part);
    }
    for sp in &part.subparts {
        collect_text_parts(sp, out);
    }
}

fn header_text(headers: &[MailHeader], name: &str) -> String {
    headers
        .get_first_header(name)
        .map(decode_header_value)
        .unwrap_or_default()
}

/// Header value without RFC 2047 decoding, unfolded.
fn raw_header(headers: &[MailHeader], name: &str) -> String {
    headers
        .get_first_header(name)
        .map(|h| {
            String::from_utf8_lossy(h.get_value_raw())
                .replace("\r\n", "")
                .replace('\n', "")
                .trim()
                .to_string()
        })
        .unwrap_or_default()
}

fn html_to_text(html: &str) -> String {
    match html2text::from_read(html.as_bytes(), HTML_WRAP_WIDTH) {
        Ok(text) => text,
        Err(e) => {
            log::warn!("HTML to text conversion failed, keeping markup: {e}");
            html.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const ALTERNATIVE_PLAIN_FIRST: &str = "From: Alice <a@x.com>\r\n\
To: b@x.com\r\n\
Subject: Report\r\n\
Message-ID: <abc123@x.com>\r\n\
Date: Mon, 19 Oct 2026 10:00:00 +0000\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/alternative; boundary=\"XYZ\"\r\n\
\r\n\
--XYZ\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
Plain version\r\n\
--XYZ\r\n\
Content-Type: text/html; charset=utf-8\r\n\
\r\n\
<p>HTML version</p>\r\n\
--XYZ--\r\n";

    const ALTERNATIVE_HTML_FIRST: &str = "From: a@x.com\r\n\
To: b@x.com\r\n\
Subject: Newsletter\r\n\
Content-Type: multipart/alternative; boundary=\"XYZ\"\r\n\
\r\n\
--XYZ\r\n\
Content-Type: text/html; charset=utf-8\r\n\
\r\n\
<html><body><p>Rich text</p></body></html>\r\n\
--XYZ\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
Plain text\r\n\
--XYZ--\r\n";

    #[test]
    fn single_part_plain_message() {
        let raw = "From: a@x.com\r\nTo: b@x.com\r\nSubject: Hello\r\n\r\nHi there\r\n";
        let email = Normalizer::default().normalize(raw.as_bytes()).unwrap();

        assert_eq!(email.subject, "Hello");
        assert_eq!(email.from, "a@x.com");
        assert_eq!(email.to, "b@x.com");
        assert_eq!(email.body, "Hi there");
        assert_eq!(email.content_type, "text/plain");
        assert_eq!(email.id, "");
        assert_eq!(email.date, "");
    }

    #[test]
    fn plain_part_wins_when_it_comes_first() {
        let email = Normalizer::default()
            .normalize(ALTERNATIVE_PLAIN_FIRST.as_bytes())
            .unwrap();
        assert_eq!(email.body, "Plain version");
        assert_eq!(email.content_type, "text/plain");
        assert_eq!(email.id, "<abc123@x.com>");
        assert_eq!(email.from, "Alice <a@x.com>");
        assert_eq!(email.date, "Mon, 19 Oct 2026 10:00:00 +0000");
    }

    #[test]
    fn first_text_part_wins_even_when_html() {
        let email = Normalizer::default()
            .normalize(ALTERNATIVE_HTML_FIRST.as_bytes())
            .unwrap();
        assert_eq!(email.content_type, "text/html");
        assert!(email.body.contains("Rich text"));
        assert!(!email.body.contains('<'));
    }

    #[test]
    fn prefer_plain_skips_leading_html() {
        let normalizer = Normalizer::new(true, BodyPreference::PreferPlain);
        let email = normalizer.normalize(ALTERNATIVE_HTML_FIRST.as_bytes()).unwrap();
        assert_eq!(email.content_type, "text/plain");
        assert_eq!(email.body, "Plain text");
    }

    #[test]
    fn prefer_plain_falls_back_to_html() {
        let raw = "Subject: Only html\r\n\
Content-Type: multipart/mixed; boundary=\"B\"\r\n\
\r\n\
--B\r\n\
Content-Type: text/html\r\n\
\r\n\
<div>Just markup &amp; text</div>\r\n\
--B--\r\n";
        let normalizer = Normalizer::new(true, BodyPreference::PreferPlain);
        let email = normalizer.normalize(raw.as_bytes()).unwrap();
        assert_eq!(email.content_type, "text/html");
        assert!(email.body.contains("Just markup & text"));
    }

    #[test]
    fn html_markup_is_kept_when_stripping_is_off() {
        let normalizer = Normalizer::new(false, BodyPreference::FirstText);
        let email = normalizer.normalize(ALTERNATIVE_HTML_FIRST.as_bytes()).unwrap();
        assert_eq!(email.body, "<html><body><p>Rich text</p></body></html>");
    }

    #[test]
    fn quoted_printable_latin1_body_is_decoded() {
        let raw = "Subject: Menu\r\n\
Content-Type: text/plain; charset=iso-8859-1\r\n\
Content-Transfer-Encoding: quoted-printable\r\n\
\r\n\
Caf=E9 cr=E8me\r\n";
        let email = Normalizer::default().normalize(raw.as_bytes()).unwrap();
        assert_eq!(email.body, "Café crème");
    }

    #[test]
    fn base64_part_inside_nested_multipart() {
        // "Olá mundo" in base64
        let raw = "Subject: =?UTF-8?Q?Ol=C3=A1?=\r\n\
Content-Type: multipart/mixed; boundary=\"OUTER\"\r\n\
\r\n\
--OUTER\r\n\
Content-Type: multipart/alternative; boundary=\"INNER\"\r\n\
\r\n\
--INNER\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
T2zDoSBtdW5kbw==\r\n\
--INNER--\r\n\
--OUTER\r\n\
Content-Type: application/pdf\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
JVBERi0xLjQK\r\n\
--OUTER--\r\n";
        let email = Normalizer::default().normalize(raw.as_bytes()).unwrap();
        assert_eq!(email.subject, "Olá");
        assert_eq!(email.body, "Olá mundo");
        assert_eq!(email.content_type, "text/plain");
    }

    #[test]
    fn multipart_without_text_has_empty_body() {
        let raw = "Subject: Attachment only\r\n\
Content-Type: multipart/mixed; boundary=\"B\"\r\n\
\r\n\
--B\r\n\
Content-Type: application/octet-stream\r\n\
\r\n\
binary-ish\r\n\
--B--\r\n";
        let email = Normalizer::default().normalize(raw.as_bytes()).unwrap();
        assert_eq!(email.body, "");
        assert_eq!(email.content_type, "");
        assert_eq!(email.subject, "Attachment only");
    }

    #[test]
    fn body_whitespace_is_trimmed() {
        let raw = "Subject: Spaces\r\n\r\n\r\n   padded body \t\r\n\r\n";
        let email = Normalizer::default().normalize(raw.as_bytes()).unwrap();
        assert_eq!(email.body, "padded body");
    }

    #[test]
    fn undecodable_base64_body_is_kept_as_written() {
        let raw = "Subject: B64\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
This is not base64!!! @@@\r\n";
        let email = Normalizer::default().normalize(raw.as_bytes()).unwrap();
        assert_eq!(email.subject, "B64");
        assert_eq!(email.content_type, "text/plain");
        assert_eq!(email.body, "This is not base64!!! @@@");
    }

    #[test]
    fn undecodable_base64_part_inside_multipart_is_kept_as_written() {
        let raw = "Subject: B64 parts\r\n\
Content-Type: multipart/mixed; boundary=\"B\"\r\n\
\r\n\
--B\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
!!!not base64\r\n\
--B--\r\n";
        let email = Normalizer::default().normalize(raw.as_bytes()).unwrap();
        assert_eq!(email.content_type, "text/plain");
        assert_eq!(email.body, "!!!not base64");
    }

    #[test]
    fn folded_date_is_unfolded_but_not_decoded() {
        let raw = "Subject: Late\r\n\
Date: Mon, 19 Oct 2026\r\n 10:00:00 +0000\r\n\
\r\n\
body\r\n";
        let email = Normalizer::default().normalize(raw.as_bytes()).unwrap();
        assert_eq!(email.date, "Mon, 19 Oct 2026 10:00:00 +0000");
    }

    #[test]
    fn header_block_starting_with_whitespace_is_a_parse_error() {
        let raw = " continuation: without a header\r\n\r\nbody\r\n";
        assert!(Normalizer::default().normalize(raw.as_bytes()).is_err());
    }

    #[test]
    fn record_serializes_with_expected_fields() {
        let raw = "Subject: Hello\r\n\r\nHi there\r\n";
        let email = Normalizer::default().normalize(raw.as_bytes()).unwrap();
        let value = serde_json::to_value(&email).unwrap();
        let object = value.as_object().unwrap();
        let mut keys: Vec<_> = object.keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(
            keys,
            ["body", "content_type", "date", "from", "id", "processed_at", "subject", "to"]
        );
    }
}
