//! Two-column CSV records for the index log.
//!
//! Rows are `hash,url` with no header. Fields are quoted only when they
//! contain a comma, a double quote, CR/LF or surrounding spaces, with inner
//! quotes doubled. Parsing is best effort: a row that does not decode to
//! exactly two fields with a well-formed digest is counted and skipped.

use super::IndexEntry;
use crate::store::is_valid_hash;

/// Result of decoding an index log.
#[derive(Debug, Default)]
pub(crate) struct ParsedLog {
    /// Well-formed rows in file order.
    pub entries: Vec<IndexEntry>,
    /// Rows that failed to parse.
    pub skipped: usize,
    /// True if the text does not end with a record terminator.
    pub unterminated: bool,
}

/// Encodes one record, including the trailing newline.
pub(crate) fn encode_record(hash: &str, url: &str) -> String {
    let mut line = String::with_capacity(hash.len() + url.len() + 4);
    push_field(&mut line, hash);
    line.push(',');
    push_field(&mut line, url);
    line.push('\n');
    line
}

fn push_field(out: &mut String, field: &str) {
    let needs_quotes = field.contains([',', '"', '\r', '\n'])
        || field.starts_with(' ')
        || field.ends_with(' ');
    if !needs_quotes {
        out.push_str(field);
        return;
    }
    out.push('"');
    for ch in field.chars() {
        if ch == '"' {
            out.push('"');
        }
        out.push(ch);
    }
    out.push('"');
}

#[derive(Default)]
struct RowState {
    fields: Vec<String>,
    field: String,
    in_quotes: bool,
    after_quote: bool,
    malformed: bool,
}

impl RowState {
    fn end_field(&mut self) {
        self.fields.push(std::mem::take(&mut self.field));
        self.after_quote = false;
    }

    fn finish(&mut self, log: &mut ParsedLog) {
        self.end_field();
        let fields = std::mem::take(&mut self.fields);
        let malformed = std::mem::take(&mut self.malformed);
        self.in_quotes = false;

        if fields.len() == 1 && fields[0].is_empty() {
            return;
        }
        match <[String; 2]>::try_from(fields) {
            Ok([hash, url]) if !malformed && is_valid_hash(&hash) && !url.is_empty() => {
                log.entries.push(IndexEntry { hash, url });
            }
            _ => log.skipped += 1,
        }
    }
}

/// Decodes a whole index log. A final row without its newline is treated as
/// a torn write and skipped.
pub(crate) fn parse_log(text: &str) -> ParsedLog {
    let mut log = ParsedLog {
        unterminated: !text.is_empty() && !text.ends_with('\n'),
        ..ParsedLog::default()
    };
    let mut row = RowState::default();
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        if row.in_quotes {
            if ch == '"' {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    row.field.push('"');
                } else {
                    row.in_quotes = false;
                    row.after_quote = true;
                }
            } else {
                row.field.push(ch);
            }
            continue;
        }

        match ch {
            ',' => row.end_field(),
            '\n' => row.finish(&mut log),
            '\r' if chars.peek() == Some(&'\n') => {}
            '"' if row.field.is_empty() && !row.after_quote => row.in_quotes = true,
            _ => {
                if row.after_quote || ch == '"' {
                    row.malformed = true;
                }
                row.field.push(ch);
            }
        }
    }

    if log.unterminated {
        let torn = !row.field.is_empty() || !row.fields.is_empty() || row.in_quotes;
        if torn {
            log.skipped += 1;
        }
    }
    log
}
