//! Record format shared by the history command and the parser.
//!
//! Every record is `sha 0x1F parents 0x1F author 0x1F committer 0x1F
//! timestamp 0x1F subject 0x1F body`, terminated by NUL (`git log -z`).
//! The body is the last field, so a unit separator inside a message can
//! not shift the fields that precede it.

use crate::core::{CommitId, CommitRecord, Parents};
use chrono::{TimeZone, Utc};
use std::fmt;

pub const FIELD_SEPARATOR: u8 = 0x1f;
pub const RECORD_TERMINATOR: u8 = 0;

/// `--format` argument producing the fields in the order `parse_record` expects
pub const LOG_FORMAT: &str = "%H%x1f%P%x1f%an%x1f%cn%x1f%ct%x1f%s%x1f%B";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Sha,
    Parents,
    Author,
    Committer,
    Timestamp,
    Subject,
    Body,
}

impl Field {
    pub const ALL: [Field; 7] = [
        Field::Sha,
        Field::Parents,
        Field::Author,
        Field::Committer,
        Field::Timestamp,
        Field::Subject,
        Field::Body,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Field::Sha => "sha",
            Field::Parents => "parents",
            Field::Author => "author",
            Field::Committer => "committer",
            Field::Timestamp => "timestamp",
            Field::Subject => "subject",
            Field::Body => "body",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed {field} field: {reason}")]
pub struct ParseError {
    pub field: Field,
    /// The offending record, lossily decoded for diagnostics
    pub raw: String,
    pub reason: String,
}

impl ParseError {
    fn new(field: Field, raw: &[u8], reason: impl Into<String>) -> Self {
        Self {
            field,
            raw: String::from_utf8_lossy(raw).into_owned(),
            reason: reason.into(),
        }
    }
}

/// Parse one record (without its terminator)
pub fn parse_record(raw: &[u8]) -> Result<CommitRecord, ParseError> {
    let mut parts = raw.splitn(Field::ALL.len(), |&b| b == FIELD_SEPARATOR);
    let mut fields: [&[u8]; 7] = [&[]; 7];
    for (slot, field) in fields.iter_mut().zip(Field::ALL) {
        *slot = parts
            .next()
            .ok_or_else(|| ParseError::new(field, raw, "field is missing"))?;
    }
    let [sha, parents, author, committer, timestamp, subject, body] = fields;

    let id = CommitId::parse(ascii(Field::Sha, sha, raw)?)
        .map_err(|e| ParseError::new(Field::Sha, raw, e.to_string()))?;

    let parents = ascii(Field::Parents, parents, raw)?
        .split(' ')
        .filter(|p| !p.is_empty())
        .map(CommitId::parse)
        .collect::<Result<Parents, _>>()
        .map_err(|e| ParseError::new(Field::Parents, raw, e.to_string()))?;

    let seconds: i64 = ascii(Field::Timestamp, timestamp, raw)?
        .parse()
        .map_err(|e| ParseError::new(Field::Timestamp, raw, format!("{}", e)))?;
    let timestamp = Utc
        .timestamp_opt(seconds, 0)
        .single()
        .ok_or_else(|| ParseError::new(Field::Timestamp, raw, "timestamp out of range"))?;

    Ok(CommitRecord::new(
        id,
        parents,
        decode_text(author),
        decode_text(committer),
        timestamp,
        decode_text(subject),
        decode_text(body),
    ))
}

/// Emit the record in the same layout `parse_record` reads (no terminator).
///
/// Text fields are always written as UTF-8. Input that was decoded from
/// ISO-8859-1 therefore comes back re-encoded, not byte for byte.
pub fn serialize_record(record: &CommitRecord) -> Vec<u8> {
    let parents = record
        .parents
        .iter()
        .map(CommitId::as_str)
        .collect::<Vec<_>>()
        .join(" ");
    let seconds = record.timestamp.timestamp().to_string();
    let fields: [&str; 7] = [
        record.id.as_str(),
        &parents,
        &record.author,
        &record.committer,
        &seconds,
        &record.subject,
        &record.message,
    ];
    fields.join("\u{1f}").into_bytes()
}

fn ascii<'a>(field: Field, bytes: &'a [u8], raw: &[u8]) -> Result<&'a str, ParseError> {
    match std::str::from_utf8(bytes) {
        Ok(text) if text.is_ascii() => Ok(text),
        _ => Err(ParseError::new(field, raw, "expected ASCII")),
    }
}

/// UTF-8, falling back to ISO-8859-1 for commits in legacy encodings
fn decode_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => bytes.iter().map(|&b| char::from(b)).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const A: &str = "1111111111111111111111111111111111111111";
    const B: &str = "2222222222222222222222222222222222222222";
    const C: &str = "3333333333333333333333333333333333333333";

    fn raw(fields: &[&str]) -> Vec<u8> {
        fields.join("\u{1f}").into_bytes()
    }

    #[test]
    fn parses_normal_commit() {
        let bytes = raw(&[A, B, "Ann", "Carl", "1700000000", "Fix it", "Fix it\n\nDetails\n"]);
        let record = parse_record(&bytes).unwrap();
        assert_eq!(record.id.as_str(), A);
        assert_eq!(record.parents.len(), 1);
        assert_eq!(record.author, "Ann");
        assert_eq!(record.committer, "Carl");
        assert_eq!(record.timestamp.timestamp(), 1_700_000_000);
        assert_eq!(record.subject, "Fix it");
        assert_eq!(record.message, "Fix it\n\nDetails\n");
    }

    #[test]
    fn parses_root_and_octopus_parents() {
        let root = parse_record(&raw(&[A, "", "a", "c", "0", "root", ""])).unwrap();
        assert!(root.is_root());

        let parents = format!("{} {} {}", A, B, C);
        let octopus = parse_record(&raw(&[A, &parents, "a", "c", "0", "octopus", ""])).unwrap();
        let ids: Vec<&str> = octopus.parents.iter().map(|p| p.as_str()).collect();
        assert_eq!(ids, vec![A, B, C]);
    }

    #[test]
    fn body_may_contain_the_separator() {
        let bytes = raw(&[A, "", "a", "c", "0", "s", "body with \u{1f} inside\n"]);
        let record = parse_record(&bytes).unwrap();
        assert_eq!(record.message, "body with \u{1f} inside\n");
    }

    #[test]
    fn names_the_missing_field() {
        let err = parse_record(&raw(&[A, "", "a", "c"])).unwrap_err();
        assert_eq!(err.field, Field::Timestamp);
        assert!(err.raw.contains("a"));
    }

    #[test]
    fn names_the_malformed_field() {
        let err = parse_record(&raw(&["nothex", "", "a", "c", "0", "s", ""])).unwrap_err();
        assert_eq!(err.field, Field::Sha);

        let err = parse_record(&raw(&[A, "abc", "a", "c", "0", "s", ""])).unwrap_err();
        assert_eq!(err.field, Field::Parents);

        let err = parse_record(&raw(&[A, "", "a", "c", "yesterday", "s", ""])).unwrap_err();
        assert_eq!(err.field, Field::Timestamp);
        assert_eq!(err.to_string().split(':').next(), Some("malformed timestamp field"));
    }

    #[test]
    fn decodes_latin1_names() {
        let mut bytes = raw(&[A, "", "Ren", "c", "0", "s", ""]);
        // "René" in ISO-8859-1 lands right after "Ren"
        let at = bytes.windows(3).position(|w| w == b"Ren").unwrap() + 3;
        bytes.insert(at, 0xe9);
        let record = parse_record(&bytes).unwrap();
        assert_eq!(record.author, "René");

        // written back as UTF-8
        let written = serialize_record(&record);
        assert!(!written.contains(&0xe9));
        assert!(written.windows(2).any(|w| w == b"\xc3\xa9"));
        assert_eq!(parse_record(&written).unwrap(), record);
    }

    #[test]
    fn serializing_reproduces_the_input() {
        let merge = format!("{} {}", B, C);
        let inputs = [
            raw(&[A, "", "Ann Lee", "Carl", "0", "root", "root\n"]),
            raw(&[A, B, "Ann", "Carl", "1700000000", "Subject", "Subject\n\nBody\nmore\n"]),
            raw(&[A, &merge, "Zoë", "Ünal", "42", "Merge branch 'x'", ""]),
        ];
        for input in inputs {
            let record = parse_record(&input).unwrap();
            assert_eq!(serialize_record(&record), input);
        }
    }
}
