//! Line-oriented scanning of text-tagged headers.
//!
//! Instrument formats such as NanoScope store their header as ASCII lines:
//!
//! ```text
//! \*File list
//! \Version: 0x04220200
//! \*Ciao image list
//! \Data offset: 8192
//! \Samps/line: 512
//! \*File list end
//! ```
//!
//! [`LineReader`] splits a stream into logical lines through a fixed-size
//! refillable buffer; [`classify`] tells the line shapes apart. Interpreting
//! the tags is left to the format; unrecognized lines usually end up in a
//! free-text blob that [`TagStore::parse_ini`](crate::TagStore::parse_ini)
//! promotes to `key: value` tags later.

use crate::error::IoResult;
use std::io::Read;

/// Size of the internal lookahead chunk.
pub const LINE_CHUNK_SIZE: usize = 2048;

/// End-of-text marker (Ctrl-Z) that terminates the line sequence.
pub const EOF_MARKER: u8 = 0x1A;

/// Splits a byte stream into lines.
///
/// A line ends at LF, at CR (a following LF is consumed with it), at the
/// [`EOF_MARKER`], or at the end of the stream. The marker also ends the
/// whole sequence, so binary data following a text header is never
/// scanned.
pub struct LineReader<R> {
    inner: R,
    buf: Box<[u8; LINE_CHUNK_SIZE]>,
    pos: usize,
    len: usize,
    done: bool,
    consumed: u64,
}

impl<R: Read> LineReader<R> {
    /// Wraps `inner`, reading from its current position.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: Box::new([0u8; LINE_CHUNK_SIZE]),
            pos: 0,
            len: 0,
            done: false,
            consumed: 0,
        }
    }

    /// Returns `true` once the end of the line sequence was reached.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Bytes consumed so far, terminators included.
    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    /// Reads the next line, without its terminator.
    ///
    /// Bytes are decoded lossily, so non-ASCII unit symbols never fail the
    /// scan. Returns `None` at the end of the sequence.
    pub fn next_line(&mut self) -> IoResult<Option<String>> {
        if self.done {
            return Ok(None);
        }
        let mut line = Vec::new();
        loop {
            let Some(byte) = self.peek_byte()? else {
                self.done = true;
                return Ok((!line.is_empty()).then(|| decode(&line)));
            };
            match byte {
                EOF_MARKER => {
                    self.done = true;
                    return Ok((!line.is_empty()).then(|| decode(&line)));
                }
                b'\n' => {
                    self.advance();
                    return Ok(Some(decode(&line)));
                }
                b'\r' => {
                    self.advance();
                    if self.peek_byte()? == Some(b'\n') {
                        self.advance();
                    }
                    return Ok(Some(decode(&line)));
                }
                other => {
                    line.push(other);
                    self.advance();
                }
            }
        }
    }

    fn peek_byte(&mut self) -> IoResult<Option<u8>> {
        if self.pos >= self.len {
            self.len = self.inner.read(&mut self.buf[..])?;
            self.pos = 0;
            if self.len == 0 {
                return Ok(None);
            }
        }
        Ok(Some(self.buf[self.pos]))
    }

    #[inline]
    fn advance(&mut self) {
        self.pos += 1;
        self.consumed += 1;
    }
}

fn decode(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Shape of a header line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    /// `\*... image list` marker; starts a new page's key-value namespace.
    ImageSection,
    /// `\*File list end`.
    End,
    /// Any other `\*...` section/key marker.
    Key,
    /// `\key: value1 [value2] [unit]`.
    Tag,
    /// Anything else.
    Text,
}

/// Marker ending a text header.
pub const END_TAG: &str = "\\*File list end";

/// Classifies one line.
pub fn classify(line: &str) -> LineKind {
    if line.starts_with("\\*") {
        if line == END_TAG {
            LineKind::End
        } else if line.contains("image list") {
            LineKind::ImageSection
        } else {
            LineKind::Key
        }
    } else if line.starts_with('\\') {
        LineKind::Tag
    } else {
        LineKind::Text
    }
}

/// Name of a `\*` marker without its prefix.
pub fn key_name(line: &str) -> &str {
    line.strip_prefix("\\*").unwrap_or(line)
}

/// Body of a `\` tag line without its prefix.
pub fn tag_body(line: &str) -> &str {
    line.strip_prefix('\\').unwrap_or(line)
}

/// Text following `tag` if `line` starts with it.
pub fn tag_value<'a>(line: &'a str, tag: &str) -> Option<&'a str> {
    line.strip_prefix(tag).map(str::trim)
}

/// Leading integer after `tag`, as `sscanf("%d")` would read it.
pub fn tag_int(line: &str, tag: &str) -> Option<i64> {
    leading_int(tag_value(line, tag)?)
}

/// Two numbers and the remaining token after `tag`:
/// `\Scan size: 353.381 353.381 nm` gives `(353.381, 353.381, "nm")`.
pub fn tag_two_doubles_and_rest(line: &str, tag: &str) -> Option<(f64, f64, String)> {
    let mut tokens = tag_value(line, tag)?.split_whitespace();
    let a = tokens.next()?.parse().ok()?;
    let b = tokens.next()?.parse().ok()?;
    let rest = tokens.next().unwrap_or("").to_string();
    Some((a, b, rest))
}

/// Text between the first pair of double quotes.
pub fn quoted_value(line: &str) -> Option<&str> {
    let start = line.find('"')? + 1;
    let len = line[start..].find('"')?;
    Some(&line[start..start + len])
}

/// Splits `line` at the first `sep` into trimmed key and value.
pub fn split_key_value<'a>(line: &'a str, sep: &str) -> Option<(&'a str, &'a str)> {
    let (k, v) = line.split_once(sep)?;
    Some((k.trim(), v.trim()))
}

/// Parses an optionally signed run of leading digits.
pub fn leading_int(s: &str) -> Option<i64> {
    let s = s.trim_start();
    let digits_start = usize::from(s.starts_with(['-', '+']));
    let end = s[digits_start..]
        .find(|c: char| !c.is_ascii_digit())
        .map_or(s.len(), |i| i + digits_start);
    if end == digits_start {
        return None;
    }
    s[..end].parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_lines(data: &[u8]) -> Vec<String> {
        let mut r = LineReader::new(data);
        let mut out = Vec::new();
        while let Some(l) = r.next_line().unwrap() {
            out.push(l);
        }
        out
    }

    #[test]
    fn test_terminators() {
        assert_eq!(all_lines(b"a\nb\r\nc\rd"), vec!["a", "b", "c", "d"]);
        assert_eq!(all_lines(b"a\n\nb\n"), vec!["a", "", "b"]);
        assert!(all_lines(b"").is_empty());
    }

    #[test]
    fn test_eof_marker_stops_scan() {
        let mut data = b"one\ntwo\n".to_vec();
        data.push(EOF_MARKER);
        data.extend_from_slice(b"\x00\x01binary\nmore\n");
        assert_eq!(all_lines(&data), vec!["one", "two"]);
    }

    #[test]
    fn test_lines_span_chunks() {
        let long = "x".repeat(LINE_CHUNK_SIZE + 100);
        let data = format!("{long}\r\nshort\r\n");
        let mut r = LineReader::new(data.as_bytes());
        assert_eq!(r.next_line().unwrap().unwrap().len(), LINE_CHUNK_SIZE + 100);
        assert_eq!(r.next_line().unwrap().unwrap(), "short");
        assert_eq!(r.next_line().unwrap(), None);
        assert!(r.is_done());
        assert_eq!(r.consumed(), data.len() as u64);
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify("\\*File list"), LineKind::Key);
        assert_eq!(classify("\\*Ciao image list"), LineKind::ImageSection);
        assert_eq!(classify("\\*File list end"), LineKind::End);
        assert_eq!(classify("\\Samps/line: 512"), LineKind::Tag);
        assert_eq!(classify("free text"), LineKind::Text);
    }

    #[test]
    fn test_tag_helpers() {
        assert_eq!(tag_int("\\Data offset: 8192", "\\Data offset:"), Some(8192));
        assert_eq!(tag_int("\\Data offset: -3 bytes", "\\Data offset:"), Some(-3));
        assert_eq!(tag_int("\\Data offset: none", "\\Data offset:"), None);
        assert_eq!(tag_int("\\Other: 1", "\\Data offset:"), None);

        let (x, y, unit) =
            tag_two_doubles_and_rest("\\Scan size: 353.5 200 nm", "\\Scan size:").unwrap();
        assert_eq!((x, y, unit.as_str()), (353.5, 200.0, "nm"));

        assert_eq!(quoted_value("\\@2:Image Data: S [Height] \"Height\""), Some("Height"));
        assert_eq!(quoted_value("no quotes"), None);

        assert_eq!(split_key_value(" Scan rate : 1.5 Hz", ":"), Some(("Scan rate", "1.5 Hz")));
        assert_eq!(key_name("\\*Scanner list"), "Scanner list");
        assert_eq!(tag_body("\\Version: 4"), "Version: 4");
    }

    #[test]
    fn test_leading_int() {
        assert_eq!(leading_int("42abc"), Some(42));
        assert_eq!(leading_int("  +7"), Some(7));
        assert_eq!(leading_int("-"), None);
        assert_eq!(leading_int(""), None);
    }
}
