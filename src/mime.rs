//! Message parsing and MIME handling
//!
//! Parses RFC822 messages using `mailparse` into a [`DecodedMessage`]:
//! decoded headers, the first plain/HTML bodies, and an attachment
//! inventory with payload bytes. Decoding never fails; broken parts degrade
//! to empty fields.

use std::collections::BTreeMap;

use charset::Charset;
use mailparse::{DispositionType, MailHeaderMap, ParsedMail};

/// Placeholder when a message has no usable `text/plain` part
pub const NO_TEXT_BODY: &str = "(No plain text content found)";
/// Placeholder when a message has no usable `text/html` part
pub const NO_HTML_BODY: &str = "(No HTML content found)";

const NO_SUBJECT: &str = "(No Subject)";
const UNKNOWN_SENDER: &str = "Unknown Sender";
const UNKNOWN_DATE: &str = "Unknown Date";

/// Attachment extracted from a message part
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedAttachment {
    /// Decoded filename
    pub filename: String,
    /// MIME content type (lowercase)
    pub content_type: String,
    /// Transfer-decoded payload
    pub payload: Vec<u8>,
}

/// Parsed message representation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedMessage {
    pub subject: String,
    pub sender: String,
    pub date: String,
    /// Trimmed plain text body, or [`NO_TEXT_BODY`]
    pub text_body: String,
    /// Trimmed HTML body, or [`NO_HTML_BODY`]
    pub html_body: String,
    /// Attachments in document order
    pub attachments: Vec<DecodedAttachment>,
}

impl DecodedMessage {
    pub fn attachment_names(&self) -> Vec<String> {
        self.attachments.iter().map(|a| a.filename.clone()).collect()
    }
}

/// Decode raw RFC822 bytes
pub fn decode(raw: &[u8]) -> DecodedMessage {
    let parsed = match mailparse::parse_mail(raw) {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::debug!(error = %e, "message did not parse; returning empty view");
            return DecodedMessage {
                subject: NO_SUBJECT.to_owned(),
                sender: UNKNOWN_SENDER.to_owned(),
                date: UNKNOWN_DATE.to_owned(),
                text_body: NO_TEXT_BODY.to_owned(),
                html_body: NO_HTML_BODY.to_owned(),
                attachments: Vec::new(),
            };
        }
    };

    let mut bodies = Bodies::default();
    if parsed.subparts.is_empty() {
        bodies.classify(&parsed);
    } else {
        walk_bodies(&parsed, &mut bodies);
    }

    let mut attachments = Vec::new();
    collect_attachments(&parsed, &mut attachments);

    DecodedMessage {
        subject: header_or(&parsed, "Subject", NO_SUBJECT),
        sender: header_or(&parsed, "From", UNKNOWN_SENDER),
        date: header_or(&parsed, "Date", UNKNOWN_DATE),
        text_body: or_placeholder(&bodies.text, NO_TEXT_BODY),
        html_body: or_placeholder(&bodies.html, NO_HTML_BODY),
        attachments,
    }
}

/// First-match body slots
#[derive(Default)]
struct Bodies {
    text: String,
    html: String,
}

impl Bodies {
    /// Fill the matching slot if it is still empty
    fn classify(&mut self, part: &ParsedMail<'_>) {
        let slot = match part.ctype.mimetype.to_ascii_lowercase().as_str() {
            "text/plain" => &mut self.text,
            "text/html" => &mut self.html,
            _ => return,
        };
        if !slot.is_empty() {
            return;
        }
        match part.get_body_raw() {
            Ok(bytes) => *slot = decode_text(part, &bytes),
            Err(e) => tracing::debug!(error = %e, "skipping undecodable body part"),
        }
    }
}

/// Decode body bytes with the declared charset, UTF-8 when none is usable
fn decode_text(part: &ParsedMail<'_>, bytes: &[u8]) -> String {
    let declared = part
        .ctype
        .params
        .get("charset")
        .and_then(|label| Charset::for_label(label.trim().as_bytes()));
    match declared {
        Some(charset) => charset.decode_without_bom_handling(bytes).0.into_owned(),
        None => String::from_utf8_lossy(bytes).into_owned(),
    }
}

/// Walk MIME part tree recursively, skipping attachment-disposition leaves
fn walk_bodies(part: &ParsedMail<'_>, bodies: &mut Bodies) {
    if part.subparts.is_empty() {
        if part.get_content_disposition().disposition != DispositionType::Attachment {
            bodies.classify(part);
        }
        return;
    }
    for sub in &part.subparts {
        walk_bodies(sub, bodies);
    }
}

/// Collect attachment-disposition parts that carry a filename
fn collect_attachments(part: &ParsedMail<'_>, out: &mut Vec<DecodedAttachment>) {
    let disp = part.get_content_disposition();
    if disp.disposition == DispositionType::Attachment
        && let Some(filename) = attachment_filename(part, &disp.params)
    {
        let payload = part.get_body_raw().unwrap_or_else(|e| {
            tracing::debug!(error = %e, %filename, "attachment payload did not decode");
            Vec::new()
        });
        out.push(DecodedAttachment {
            filename,
            content_type: part.ctype.mimetype.to_ascii_lowercase(),
            payload,
        });
    }
    for sub in &part.subparts {
        collect_attachments(sub, out);
    }
}

/// Extract attachment filename from part
///
/// Checks Content-Disposition parameter first, falls back to Content-Type
/// name parameter. Encoded words are decoded; blank names count as absent.
fn attachment_filename(
    part: &ParsedMail<'_>,
    disp_params: &BTreeMap<String, String>,
) -> Option<String> {
    disp_params
        .get("filename")
        .or_else(|| part.ctype.params.get("name"))
        .map(|name| decode_mime_words(name).trim().to_owned())
        .filter(|name| !name.is_empty())
}

/// Decode RFC 2047 encoded words in a header-like value
///
/// Each word is decoded with its declared charset; words that fail to decode
/// are kept verbatim.
pub fn decode_mime_words(value: &str) -> String {
    if !value.contains("=?") || value.contains(['\r', '\n']) {
        return value.to_owned();
    }
    let line = format!("X-Decode: {value}");
    match mailparse::parse_header(line.as_bytes()) {
        Ok((header, _)) => header.get_value(),
        Err(_) => value.to_owned(),
    }
}

fn header_or(parsed: &ParsedMail<'_>, key: &str, fallback: &str) -> String {
    parsed
        .headers
        .get_first_value(key)
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| fallback.to_owned())
}

fn or_placeholder(body: &str, placeholder: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        placeholder.to_owned()
    } else {
        trimmed.to_owned()
    }
}

/// Truncate string to maximum characters (Unicode-aware)
///
/// Preserves complete characters, never splitting multi-byte sequences.
pub fn truncate_chars(input: &str, max_chars: usize) -> String {
    input.chars().take(max_chars).collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::{NO_HTML_BODY, NO_TEXT_BODY, decode, decode_mime_words, truncate_chars};

    /// Multipart fixture: alternative text/html plus one attachment
    pub(crate) fn multipart_fixture(subject: &str, attachment: Option<&str>) -> Vec<u8> {
        let mut raw = format!(
            "From: Alice <alice@example.com>\r\n\
             To: bob@example.com\r\n\
             Subject: {subject}\r\n\
             Date: Wed, 1 Jan 2025 10:00:00 +0000\r\n\
             MIME-Version: 1.0\r\n\
             Content-Type: multipart/mixed; boundary=\"outer\"\r\n\
             \r\n\
             --outer\r\n\
             Content-Type: multipart/alternative; boundary=\"inner\"\r\n\
             \r\n\
             --inner\r\n\
             Content-Type: text/plain; charset=utf-8\r\n\
             \r\n\
             Quarterly numbers attached.\r\n\
             --inner\r\n\
             Content-Type: text/html; charset=utf-8\r\n\
             \r\n\
             <p>Quarterly numbers attached.</p>\r\n\
             --inner--\r\n"
        );
        if let Some(name) = attachment {
            raw.push_str(&format!(
                "--outer\r\n\
                 Content-Type: application/pdf; name=\"{name}\"\r\n\
                 Content-Disposition: attachment; filename=\"{name}\"\r\n\
                 Content-Transfer-Encoding: base64\r\n\
                 \r\n\
                 JVBERi0xLjQK\r\n"
            ));
        }
        raw.push_str("--outer--\r\n");
        raw.into_bytes()
    }

    #[test]
    fn truncates_unicode_by_character() {
        let out = truncate_chars("a😀b😀c", 4);
        assert_eq!(out, "a😀b😀");
    }

    #[test]
    fn parses_simple_plain_text_message() {
        let raw = b"From: sender@example.com\r\nTo: user@example.com\r\nSubject: Hi\r\nDate: Wed, 1 Jan 2025 00:00:00 +0000\r\n\r\nHello there\r\n\r\n";
        let decoded = decode(raw);

        assert_eq!(decoded.subject, "Hi");
        assert_eq!(decoded.sender, "sender@example.com");
        assert_eq!(decoded.date, "Wed, 1 Jan 2025 00:00:00 +0000");
        assert_eq!(decoded.text_body, "Hello there");
        assert_eq!(decoded.html_body, NO_HTML_BODY);
        assert!(decoded.attachments.is_empty());
    }

    #[test]
    fn multipart_yields_both_bodies_and_attachment() {
        let decoded = decode(&multipart_fixture("Q1 report", Some("report.pdf")));

        assert_eq!(decoded.text_body, "Quarterly numbers attached.");
        assert_eq!(decoded.html_body, "<p>Quarterly numbers attached.</p>");
        assert_eq!(decoded.attachments.len(), 1);
        assert_eq!(decoded.attachments[0].filename, "report.pdf");
        assert_eq!(decoded.attachments[0].content_type, "application/pdf");
        assert_eq!(decoded.attachments[0].payload, b"%PDF-1.4\n");
    }

    #[test]
    fn decoding_is_deterministic() {
        let raw = multipart_fixture("Same", Some("a.pdf"));
        assert_eq!(decode(&raw), decode(&raw));
    }

    #[test]
    fn first_text_part_wins() {
        let raw = b"Subject: twice\r\n\
            Content-Type: multipart/mixed; boundary=\"b\"\r\n\
            \r\n\
            --b\r\n\
            Content-Type: text/plain\r\n\
            \r\n\
            first\r\n\
            --b\r\n\
            Content-Type: text/plain\r\n\
            \r\n\
            second\r\n\
            --b--\r\n";
        let decoded = decode(raw);
        assert_eq!(decoded.text_body, "first");
        assert_eq!(decoded.html_body, NO_HTML_BODY);
    }

    #[test]
    fn attachment_disposition_text_is_not_a_body() {
        let raw = b"Subject: notes\r\n\
            Content-Type: multipart/mixed; boundary=\"b\"\r\n\
            \r\n\
            --b\r\n\
            Content-Type: text/plain\r\n\
            Content-Disposition: attachment; filename=\"notes.txt\"\r\n\
            \r\n\
            attached notes\r\n\
            --b--\r\n";
        let decoded = decode(raw);
        assert_eq!(decoded.text_body, NO_TEXT_BODY);
        assert_eq!(decoded.attachment_names(), vec!["notes.txt".to_owned()]);
    }

    #[test]
    fn attachment_without_filename_is_not_listed() {
        let raw = b"Subject: blob\r\n\
            Content-Type: multipart/mixed; boundary=\"b\"\r\n\
            \r\n\
            --b\r\n\
            Content-Type: application/octet-stream\r\n\
            Content-Disposition: attachment\r\n\
            \r\n\
            xyz\r\n\
            --b--\r\n";
        assert!(decode(raw).attachments.is_empty());
    }

    #[test]
    fn honours_declared_charset() {
        let raw = b"Subject: latin\r\nContent-Type: text/plain; charset=iso-8859-1\r\n\r\ncaf\xe9\r\n";
        assert_eq!(decode(raw).text_body, "café");
    }

    #[test]
    fn undeclared_charset_reads_as_utf8() {
        let raw = "Subject: x\r\nContent-Type: text/plain\r\n\r\ncafé ünïcode\r\n";
        assert_eq!(decode(raw.as_bytes()).text_body, "café ünïcode");

        let html = "Subject: x\r\nContent-Type: text/html\r\n\r\n<p>café</p>\r\n";
        assert_eq!(decode(html.as_bytes()).html_body, "<p>café</p>");
    }

    #[test]
    fn missing_content_type_reads_as_utf8() {
        let raw = "Subject: x\r\n\r\ncafé\r\n";
        assert_eq!(decode(raw.as_bytes()).text_body, "café");
    }

    #[test]
    fn unknown_charset_label_falls_back_to_utf8() {
        let raw = b"Subject: x\r\nContent-Type: text/plain; charset=x-bogus\r\n\r\ncaf\xc3\xa9\r\n";
        assert_eq!(decode(raw).text_body, "café");
    }

    #[test]
    fn invalid_utf8_is_replaced_not_fatal() {
        let raw = b"Subject: x\r\nContent-Type: text/plain\r\n\r\nok \xff done\r\n";
        assert_eq!(decode(raw).text_body, "ok \u{fffd} done");
    }

    #[test]
    fn quoted_printable_body_uses_declared_charset() {
        let raw = b"Subject: x\r\n\
            Content-Type: text/plain; charset=\"ISO-8859-1\"\r\n\
            Content-Transfer-Encoding: quoted-printable\r\n\
            \r\n\
            Gr=FC=DFe\r\n";
        assert_eq!(decode(raw).text_body, "Grüße");
    }

    #[test]
    fn single_html_part_classified_by_content_type() {
        let raw = b"Subject: promo\r\nContent-Type: text/html; charset=utf-8\r\n\r\n  <b>Sale</b>  \r\n";
        let decoded = decode(raw);
        assert_eq!(decoded.text_body, NO_TEXT_BODY);
        assert_eq!(decoded.html_body, "<b>Sale</b>");
    }

    #[test]
    fn missing_headers_use_defaults() {
        let decoded = decode(b"\r\nbody only\r\n");
        assert_eq!(decoded.subject, "(No Subject)");
        assert_eq!(decoded.sender, "Unknown Sender");
        assert_eq!(decoded.date, "Unknown Date");
    }

    #[test]
    fn decodes_encoded_words_in_subject_and_filename() {
        let raw = b"Subject: =?ISO-8859-1?Q?Caf=E9?= menu\r\n\
            Content-Type: multipart/mixed; boundary=\"b\"\r\n\
            \r\n\
            --b\r\n\
            Content-Type: application/pdf\r\n\
            Content-Disposition: attachment; filename=\"=?UTF-8?B?cmFwcG9ydC5wZGY=?=\"\r\n\
            \r\n\
            data\r\n\
            --b--\r\n";
        let decoded = decode(raw);
        assert_eq!(decoded.subject, "Café menu");
        assert_eq!(decoded.attachment_names(), vec!["rapport.pdf".to_owned()]);
    }

    #[test]
    fn mixed_charset_encoded_words_concatenate_in_order() {
        assert_eq!(
            decode_mime_words("=?UTF-8?B?SGVsbG8=?= =?ISO-8859-1?Q?W=F6rld?="),
            "HelloWörld"
        );
    }

    #[test]
    fn bad_encoded_word_keeps_the_rest_of_the_header() {
        let out = decode_mime_words("=?x-bogus?Q?abc?= =?UTF-8?Q?ok?=");
        assert!(out.ends_with("ok"), "got {out:?}");
        assert!(!out.contains("=?UTF-8?"));
    }

    #[test]
    fn plain_values_pass_through_mime_word_decoding() {
        assert_eq!(decode_mime_words("report.pdf"), "report.pdf");
        assert_eq!(decode_mime_words("=?UTF-8?B?SGVsbG8=?="), "Hello");
    }
}
