//! Lead chunk serialization.
//!
//! A lead chunk travels as the UTF-8 CSV rendering of one lead row plus one
//! row per header name, carried inside a single TLV record. CSV quoting
//! follows RFC 4180: fields containing comma, quote, CR or LF are quoted with
//! embedded quotes doubled, and the empty string is always written as `""` so
//! it cannot be mistaken for an absent field.
//!
//! The first field of the lead row is a format version marker; decoders
//! reject markers they do not recognize so future formats can coexist.
//! Requests and responses differ only in the meaning of the middle lead
//! fields:
//!
//! ```text
//! request:  01,<method>,<target>,<version>,<content-length>
//! response: 01,<version>,<status-code>,<status-message>,<content-length>
//! headers:  <name>,<value1>,<value2>,...
//! ```
//!
//! Header names are restricted to `[A-Za-z0-9-]` and are normalized to
//! lowercase on decode, uniformly for requests and responses. Header values
//! and lead fields must be printable ASCII.

use bytes::Bytes;

use crate::ensure;
use crate::protocol::{Headers, LeadChunk, QuasiHttpError};

/// Version marker written as the first field of every lead row.
pub const FORMAT_MARKER: &str = "01";

const LEAD_ROW_FIELD_COUNT: usize = 5;

/// Which direction a lead chunk travels; decides the lead-row field layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeadKind {
    Request,
    Response,
}

/// Serializes `lead` into a CSV block, failing with `MessageTooLarge` when the
/// encoded size exceeds `max_size`.
pub fn encode_lead_chunk(
    lead: &LeadChunk,
    kind: LeadKind,
    max_size: usize,
) -> Result<Bytes, QuasiHttpError> {
    let content_length = lead.content_length.to_string();
    let status_code = lead.status_code.unwrap_or_default().to_string();
    let lead_row: [&str; LEAD_ROW_FIELD_COUNT] = match kind {
        LeadKind::Request => [
            FORMAT_MARKER,
            lead.method.as_deref().unwrap_or(""),
            lead.target.as_deref().unwrap_or(""),
            lead.version.as_deref().unwrap_or(""),
            &content_length,
        ],
        LeadKind::Response => [
            FORMAT_MARKER,
            lead.version.as_deref().unwrap_or(""),
            &status_code,
            lead.status_message.as_deref().unwrap_or(""),
            &content_length,
        ],
    };
    for field in &lead_row[1..] {
        ensure!(
            is_printable_ascii(field),
            QuasiHttpError::protocol_violation(format!("lead field is not printable ascii: {field:?}"))
        );
    }

    let mut out = String::new();
    write_csv_row(&mut out, lead_row.iter().copied());

    for (name, values) in &lead.headers {
        // headers without any value are dropped on encode
        if values.is_empty() {
            continue;
        }
        ensure!(
            is_valid_header_name(name),
            QuasiHttpError::protocol_violation(format!("invalid header name: {name:?}"))
        );
        for value in values {
            ensure!(
                is_printable_ascii(value),
                QuasiHttpError::protocol_violation(format!(
                    "header {name:?} has a non printable ascii value: {value:?}"
                ))
            );
        }
        out.push('\n');
        write_csv_row(&mut out, std::iter::once(name.as_str()).chain(values.iter().map(String::as_str)));
    }

    ensure!(
        out.len() <= max_size,
        QuasiHttpError::message_too_large(out.len(), max_size)
    );
    Ok(Bytes::from(out))
}

/// Parses a CSV block back into a lead chunk.
///
/// Rows beyond the first merge into the header map; multiple rows with the
/// same (lowercased) name concatenate their value lists in row order.
pub fn decode_lead_chunk(data: &[u8], kind: LeadKind) -> Result<LeadChunk, QuasiHttpError> {
    let text = std::str::from_utf8(data)
        .map_err(|e| QuasiHttpError::protocol_violation(format!("lead chunk is not utf-8: {e}")))?;
    let rows = parse_csv(text)?;
    let mut rows = rows.into_iter();

    let lead_row = rows
        .next()
        .ok_or_else(|| QuasiHttpError::protocol_violation("empty lead chunk"))?;
    ensure!(
        lead_row.len() >= LEAD_ROW_FIELD_COUNT,
        QuasiHttpError::protocol_violation(format!(
            "lead row has {} fields, expected at least {LEAD_ROW_FIELD_COUNT}",
            lead_row.len()
        ))
    );
    ensure!(
        lead_row[0] == FORMAT_MARKER,
        QuasiHttpError::protocol_violation(format!("unknown format marker: {:?}", lead_row[0]))
    );
    for field in &lead_row[1..] {
        ensure!(
            is_printable_ascii(field),
            QuasiHttpError::protocol_violation(format!("lead field is not printable ascii: {field:?}"))
        );
    }

    let content_length: i64 = lead_row[4]
        .parse()
        .map_err(|_| QuasiHttpError::protocol_violation(format!("invalid content length: {:?}", lead_row[4])))?;

    let mut lead = LeadChunk { content_length, ..Default::default() };
    match kind {
        LeadKind::Request => {
            lead.method = Some(lead_row[1].clone());
            lead.target = Some(lead_row[2].clone());
            lead.version = Some(lead_row[3].clone());
        }
        LeadKind::Response => {
            lead.version = Some(lead_row[1].clone());
            lead.status_code = Some(lead_row[2].parse().map_err(|_| {
                QuasiHttpError::protocol_violation(format!("invalid status code: {:?}", lead_row[2]))
            })?);
            lead.status_message = Some(lead_row[3].clone());
        }
    }

    let mut headers = Headers::new();
    for row in rows {
        let mut fields = row.into_iter();
        let Some(name) = fields.next() else { continue };
        ensure!(
            is_valid_header_name(&name),
            QuasiHttpError::protocol_violation(format!("invalid header name: {name:?}"))
        );
        let values: Vec<String> = fields.collect();
        if values.is_empty() {
            continue;
        }
        for value in &values {
            ensure!(
                is_printable_ascii(value),
                QuasiHttpError::protocol_violation(format!(
                    "header {name:?} has a non printable ascii value: {value:?}"
                ))
            );
        }
        headers.entry(name.to_ascii_lowercase()).or_default().extend(values);
    }
    lead.headers = headers;
    Ok(lead)
}

fn is_printable_ascii(s: &str) -> bool {
    s.bytes().all(|b| (0x20..=0x7e).contains(&b))
}

fn is_valid_header_name(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
}

fn write_csv_row<'a>(out: &mut String, fields: impl Iterator<Item = &'a str>) {
    for (i, field) in fields.enumerate() {
        if i > 0 {
            out.push(',');
        }
        write_csv_field(out, field);
    }
}

fn write_csv_field(out: &mut String, field: &str) {
    let needs_quoting =
        field.is_empty() || field.bytes().any(|b| matches!(b, b',' | b'"' | b'\r' | b'\n'));
    if !needs_quoting {
        out.push_str(field);
        return;
    }
    out.push('"');
    for c in field.chars() {
        if c == '"' {
            out.push('"');
        }
        out.push(c);
    }
    out.push('"');
}

fn parse_csv(text: &str) -> Result<Vec<Vec<String>>, QuasiHttpError> {
    enum State {
        FieldStart,
        Unquoted,
        Quoted,
        QuoteSeen,
    }

    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut state = State::FieldStart;
    let mut chars = text.chars().peekable();

    fn end_row(rows: &mut Vec<Vec<String>>, row: &mut Vec<String>, field: &mut String) {
        row.push(std::mem::take(field));
        rows.push(std::mem::take(row));
    }

    while let Some(c) = chars.next() {
        // outside quotes, CRLF and lone CR count as a row break; inside
        // quotes a CR is data
        let c = if c == '\r' && !matches!(state, State::Quoted) {
            chars.next_if_eq(&'\n');
            '\n'
        } else {
            c
        };
        match state {
            State::FieldStart => match c {
                '"' => state = State::Quoted,
                ',' => row.push(String::new()),
                '\n' => {
                    // a blank line is tolerated; a trailing comma still yields
                    // an empty last field
                    if !row.is_empty() {
                        end_row(&mut rows, &mut row, &mut field);
                    }
                }
                _ => {
                    field.push(c);
                    state = State::Unquoted;
                }
            },
            State::Unquoted => match c {
                ',' => {
                    row.push(std::mem::take(&mut field));
                    state = State::FieldStart;
                }
                '\n' => {
                    end_row(&mut rows, &mut row, &mut field);
                    state = State::FieldStart;
                }
                '"' => {
                    return Err(QuasiHttpError::protocol_violation(
                        "malformed csv: quote inside unquoted field",
                    ));
                }
                _ => field.push(c),
            },
            State::Quoted => match c {
                '"' => state = State::QuoteSeen,
                _ => field.push(c),
            },
            State::QuoteSeen => match c {
                '"' => {
                    field.push('"');
                    state = State::Quoted;
                }
                ',' => {
                    row.push(std::mem::take(&mut field));
                    state = State::FieldStart;
                }
                '\n' => {
                    end_row(&mut rows, &mut row, &mut field);
                    state = State::FieldStart;
                }
                _ => {
                    return Err(QuasiHttpError::protocol_violation(
                        "malformed csv: unexpected character after closing quote",
                    ));
                }
            },
        }
    }

    match state {
        State::FieldStart => {
            if !row.is_empty() {
                end_row(&mut rows, &mut row, &mut field);
            }
        }
        State::Unquoted | State::QuoteSeen => end_row(&mut rows, &mut row, &mut field),
        State::Quoted => {
            return Err(QuasiHttpError::protocol_violation("malformed csv: unterminated quoted field"));
        }
    }

    Ok(rows)
}
