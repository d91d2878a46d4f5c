//! Sender extraction from a single message.

use std::{
    fmt,
    io::{BufRead, BufReader, Read},
};

use crate::error::ExtractError;

/// Pulls the sender identifier out of one message stream.
///
/// `Ok(None)` means the message parsed but carries no usable sender.
/// Implementations must not read past what they need; the stream is a view
/// into a larger archive.
pub trait SenderExtractor: Send + Sync + fmt::Debug {
    fn extract(
        &self,
        message: &mut dyn Read,
    ) -> Result<Option<String>, ExtractError>;
}

pub const DEFAULT_MAX_HEADER_BYTES: usize = 256 * 1024;

/// Reads the RFC 5322 header section and takes the first `From` address,
/// falling back to `Sender` when the message has no `From` header at all.
#[derive(Debug, Clone)]
pub struct HeaderSenderExtractor {
    max_header_bytes: usize,
}

impl Default for HeaderSenderExtractor {
    fn default() -> Self {
        Self {
            max_header_bytes: DEFAULT_MAX_HEADER_BYTES,
        }
    }
}

impl HeaderSenderExtractor {
    pub fn with_max_header_bytes(max_header_bytes: usize) -> Self {
        Self { max_header_bytes }
    }

    fn read_header_section(
        &self,
        message: &mut dyn Read,
    ) -> Result<String, ExtractError> {
        // One byte over the cap is enough to tell "too large" from "fits".
        let limit = self.max_header_bytes as u64 + 1;
        let mut reader = BufReader::with_capacity(4096, message.take(limit));

        let mut section = Vec::new();
        let mut line = Vec::new();
        loop {
            line.clear();
            let n = reader.read_until(b'\n', &mut line)?;
            if n == 0 {
                break;
            }
            if section.len() + n > self.max_header_bytes {
                return Err(ExtractError::malformed(format!(
                    "header section exceeds {} bytes",
                    self.max_header_bytes
                )));
            }
            if is_blank_line(&line) {
                break;
            }
            section.extend_from_slice(&line);
        }

        if section.is_empty() {
            return Err(ExtractError::malformed("message has no header section"));
        }
        String::from_utf8(section).map_err(|_| {
            ExtractError::malformed("header section is not valid UTF-8")
        })
    }
}

impl SenderExtractor for HeaderSenderExtractor {
    fn extract(
        &self,
        message: &mut dyn Read,
    ) -> Result<Option<String>, ExtractError> {
        let section = self.read_header_section(message)?;
        let fields = unfold_fields(&section)?;

        let value = header_value(&fields, "From")
            .or_else(|| header_value(&fields, "Sender"));
        Ok(value.and_then(first_address).and_then(sender_from_address))
    }
}

fn is_blank_line(line: &[u8]) -> bool {
    matches!(line, b"\n" | b"\r\n")
}

/// Splits the header section into `(name, value)` pairs, joining folded
/// continuation lines onto the field they belong to.
fn unfold_fields(section: &str) -> Result<Vec<(&str, String)>, ExtractError> {
    let mut fields: Vec<(&str, String)> = Vec::new();

    for raw in section.split('\n') {
        let line = raw.strip_suffix('\r').unwrap_or(raw);
        if line.is_empty() {
            continue;
        }

        if line.starts_with([' ', '\t']) {
            let Some((_, value)) = fields.last_mut() else {
                return Err(ExtractError::malformed(
                    "continuation line before first header field",
                ));
            };
            value.push(' ');
            value.push_str(line.trim());
            continue;
        }

        let Some((name, value)) = line.split_once(':') else {
            return Err(ExtractError::malformed(format!(
                "header line without a field name: {:?}",
                truncate_for_log(line)
            )));
        };
        let name = name.trim_end();
        if name.is_empty() {
            return Err(ExtractError::malformed("header field with empty name"));
        }
        fields.push((name, value.trim().to_owned()));
    }

    Ok(fields)
}

fn header_value<'a>(fields: &'a [(&str, String)], name: &str) -> Option<&'a str> {
    fields
        .iter()
        .find(|(field, _)| field.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

/// First entry of an address list. Commas inside quoted strings, angle
/// brackets or comments do not split.
fn first_address(list: &str) -> Option<&str> {
    let mut in_quotes = false;
    let mut escaped = false;
    let mut angle = 0u32;
    let mut comment = 0u32;

    for (idx, ch) in list.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_quotes || comment > 0 => escaped = true,
            '"' if comment == 0 => in_quotes = !in_quotes,
            '(' if !in_quotes => comment += 1,
            ')' if !in_quotes => comment = comment.saturating_sub(1),
            '<' if !in_quotes && comment == 0 => angle += 1,
            '>' if !in_quotes && comment == 0 => angle = angle.saturating_sub(1),
            ',' if !in_quotes && comment == 0 && angle == 0 => {
                return non_empty(&list[..idx]);
            }
            _ => {}
        }
    }
    non_empty(list)
}

fn sender_from_address(address: &str) -> Option<String> {
    let start = address.rfind('<');
    let end = address.rfind('>');
    let sender = match (start, end) {
        (Some(start), Some(end)) if start < end => &address[start + 1..end],
        _ => address,
    };
    non_empty(sender).map(str::to_owned)
}

fn non_empty(s: &str) -> Option<&str> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

fn truncate_for_log(line: &str) -> &str {
    match line.char_indices().nth(64) {
        Some((idx, _)) => &line[..idx],
        None => line,
    }
}
