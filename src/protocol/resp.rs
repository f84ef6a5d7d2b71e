//! RESP2 streaming parser and encoder.
//!
//! The parser consumes from a byte buffer and reports how many bytes each
//! complete frame used, so callers can drain pipelined input incrementally.
//! Inline commands (`SET key value\r\n`) are accepted alongside array
//! frames, matching what redis-cli sends in inline mode.

use super::RespValue;
use bytes::Bytes;

/// Upper bound on a single bulk string (512 MB, the Redis limit).
const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Upper bound on array element count.
const MAX_ELEMENTS: usize = 1024 * 1024;

/// Maximum array nesting depth.
const MAX_NESTING_DEPTH: usize = 16;

/// Result of a parse attempt.
#[derive(Debug, PartialEq)]
pub enum ParseResult {
    /// A complete frame: the value and the number of bytes consumed.
    Complete(RespValue, usize),
    /// More data is needed.
    Incomplete,
    /// The stream is malformed and cannot be resynchronized.
    Error(String),
}

/// RESP2 parser.
#[derive(Debug, Default)]
pub struct RespParser {
    depth: usize,
}

impl RespParser {
    /// Create a new parser.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse one frame from the front of `data`.
    pub fn parse(&mut self, data: &[u8]) -> ParseResult {
        self.depth = 0;
        self.parse_value(data)
    }

    fn parse_value(&mut self, data: &[u8]) -> ParseResult {
        if data.is_empty() {
            return ParseResult::Incomplete;
        }
        if self.depth > MAX_NESTING_DEPTH {
            return ParseResult::Error("maximum nesting depth exceeded".to_string());
        }

        match data[0] {
            b'+' => parse_simple(&data[1..], RespValue::Simple),
            b'-' => parse_simple(&data[1..], RespValue::Error),
            b':' => parse_integer(&data[1..]),
            b'$' => parse_bulk(&data[1..]),
            b'*' => self.parse_array(&data[1..]),
            _ => parse_inline(data),
        }
    }

    fn parse_array(&mut self, data: &[u8]) -> ParseResult {
        let (len, header) = match parse_length(data) {
            LengthResult::Value(len, header) => (len, header),
            LengthResult::Incomplete => return ParseResult::Incomplete,
            LengthResult::Error(e) => return ParseResult::Error(e),
        };
        if len < 0 {
            // Null array.
            return ParseResult::Complete(RespValue::Null, 1 + header);
        }
        let len = len as usize;
        if len > MAX_ELEMENTS {
            return ParseResult::Error(format!("array too large: {}", len));
        }

        self.depth += 1;
        let mut elements = Vec::with_capacity(len);
        let mut consumed = header;
        for _ in 0..len {
            match self.parse_value(&data[consumed..]) {
                ParseResult::Complete(value, used) => {
                    elements.push(value);
                    consumed += used;
                }
                ParseResult::Incomplete => {
                    self.depth -= 1;
                    return ParseResult::Incomplete;
                }
                ParseResult::Error(e) => {
                    self.depth -= 1;
                    return ParseResult::Error(e);
                }
            }
        }
        self.depth -= 1;
        ParseResult::Complete(RespValue::Array(elements), 1 + consumed)
    }
}

enum LengthResult {
    Value(i64, usize),
    Incomplete,
    Error(String),
}

/// Parse a signed decimal length terminated by CRLF. Returns the value and
/// the bytes consumed including the CRLF.
fn parse_length(data: &[u8]) -> LengthResult {
    match find_crlf(data) {
        Some(pos) => {
            let s = match std::str::from_utf8(&data[..pos]) {
                Ok(s) => s,
                Err(_) => return LengthResult::Error("invalid length".to_string()),
            };
            match s.parse::<i64>() {
                Ok(n) => LengthResult::Value(n, pos + 2),
                Err(_) => LengthResult::Error("invalid length".to_string()),
            }
        }
        None => LengthResult::Incomplete,
    }
}

fn parse_simple(data: &[u8], build: impl FnOnce(String) -> RespValue) -> ParseResult {
    match find_crlf(data) {
        Some(pos) => {
            let s = String::from_utf8_lossy(&data[..pos]).to_string();
            ParseResult::Complete(build(s), 1 + pos + 2)
        }
        None => ParseResult::Incomplete,
    }
}

fn parse_integer(data: &[u8]) -> ParseResult {
    match parse_length(data) {
        LengthResult::Value(n, used) => ParseResult::Complete(RespValue::Integer(n), 1 + used),
        LengthResult::Incomplete => ParseResult::Incomplete,
        LengthResult::Error(_) => ParseResult::Error("invalid integer".to_string()),
    }
}

fn parse_bulk(data: &[u8]) -> ParseResult {
    let (len, header) = match parse_length(data) {
        LengthResult::Value(len, header) => (len, header),
        LengthResult::Incomplete => return ParseResult::Incomplete,
        LengthResult::Error(e) => return ParseResult::Error(e),
    };
    if len < 0 {
        return ParseResult::Complete(RespValue::Null, 1 + header);
    }
    let len = len as usize;
    if len > MAX_BULK_SIZE {
        return ParseResult::Error(format!("bulk string too large: {}", len));
    }

    let start = header;
    let end = start + len;
    if data.len() < end + 2 {
        return ParseResult::Incomplete;
    }
    if &data[end..end + 2] != b"\r\n" {
        return ParseResult::Error("missing CRLF after bulk string".to_string());
    }
    let bytes = Bytes::copy_from_slice(&data[start..end]);
    ParseResult::Complete(RespValue::Bulk(bytes), 1 + end + 2)
}

/// Parse an inline command: a single space-separated line.
fn parse_inline(data: &[u8]) -> ParseResult {
    match find_crlf(data) {
        Some(pos) => {
            let parts: Vec<&[u8]> = data[..pos]
                .split(|&b| b == b' ')
                .filter(|p| !p.is_empty())
                .collect();
            if parts.is_empty() {
                return ParseResult::Error("empty command".to_string());
            }
            let elements = parts
                .into_iter()
                .map(|p| RespValue::Bulk(Bytes::copy_from_slice(p)))
                .collect();
            ParseResult::Complete(RespValue::Array(elements), pos + 2)
        }
        None => ParseResult::Incomplete,
    }
}

/// Find CRLF in data, returning the position of the `\r`.
fn find_crlf(data: &[u8]) -> Option<usize> {
    data.windows(2).position(|w| w == b"\r\n")
}

/// Encode a value into a buffer.
pub fn encode(value: &RespValue, buf: &mut Vec<u8>) {
    match value {
        RespValue::Simple(s) => {
            buf.push(b'+');
            buf.extend_from_slice(s.as_bytes());
            buf.extend_from_slice(b"\r\n");
        }
        RespValue::Error(e) => {
            buf.push(b'-');
            buf.extend_from_slice(e.as_bytes());
            buf.extend_from_slice(b"\r\n");
        }
        RespValue::Integer(n) => {
            buf.push(b':');
            buf.extend_from_slice(n.to_string().as_bytes());
            buf.extend_from_slice(b"\r\n");
        }
        RespValue::Bulk(data) => {
            buf.push(b'$');
            buf.extend_from_slice(data.len().to_string().as_bytes());
            buf.extend_from_slice(b"\r\n");
            buf.extend_from_slice(data);
            buf.extend_from_slice(b"\r\n");
        }
        RespValue::Array(elements) => {
            buf.push(b'*');
            buf.extend_from_slice(elements.len().to_string().as_bytes());
            buf.extend_from_slice(b"\r\n");
            for elem in elements {
                encode(elem, buf);
            }
        }
        RespValue::Null => {
            buf.extend_from_slice(b"$-1\r\n");
        }
    }
}

/// Encode a value into a fresh buffer.
pub fn encode_to_vec(value: &RespValue) -> Vec<u8> {
    let mut buf = Vec::with_capacity(64);
    encode(value, &mut buf);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete(data: &[u8]) -> (RespValue, usize) {
        match RespParser::new().parse(data) {
            ParseResult::Complete(value, used) => (value, used),
            other => panic!("expected complete frame, got {:?}", other),
        }
    }

    #[test]
    fn parse_simple_string() {
        let (value, used) = complete(b"+OK\r\n");
        assert_eq!(value, RespValue::Simple("OK".to_string()));
        assert_eq!(used, 5);
    }

    #[test]
    fn parse_error() {
        let (value, _) = complete(b"-ERR unknown command 'x'\r\n");
        assert!(matches!(value, RespValue::Error(s) if s.starts_with("ERR ")));
    }

    #[test]
    fn parse_integer() {
        let (value, _) = complete(b":1000\r\n");
        assert_eq!(value, RespValue::Integer(1000));
        let (value, _) = complete(b":-42\r\n");
        assert_eq!(value, RespValue::Integer(-42));
    }

    #[test]
    fn parse_bulk_string() {
        let (value, used) = complete(b"$6\r\nfoobar\r\n");
        assert_eq!(value, RespValue::bulk("foobar"));
        assert_eq!(used, 12);

        let (value, _) = complete(b"$0\r\n\r\n");
        assert_eq!(value, RespValue::bulk(""));
    }

    #[test]
    fn parse_null_bulk() {
        let (value, _) = complete(b"$-1\r\n");
        assert!(value.is_null());
    }

    #[test]
    fn parse_array() {
        let (value, used) = complete(b"*2\r\n$3\r\nfoo\r\n$3\r\nbar\r\n");
        let items = value.as_array().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0], RespValue::bulk("foo"));
        assert_eq!(items[1], RespValue::bulk("bar"));
        assert_eq!(used, 22);
    }

    #[test]
    fn parse_inline_command() {
        let (value, _) = complete(b"SET key value\r\n");
        let items = value.as_array().unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0], RespValue::bulk("SET"));
    }

    #[test]
    fn parse_incomplete_frames() {
        let mut parser = RespParser::new();
        assert_eq!(parser.parse(b"+OK"), ParseResult::Incomplete);
        assert_eq!(parser.parse(b"$6\r\nfoo"), ParseResult::Incomplete);
        assert_eq!(parser.parse(b"*2\r\n$3\r\nfoo\r\n"), ParseResult::Incomplete);
    }

    #[test]
    fn parse_pipelined_frames() {
        let data = b"*1\r\n$4\r\nPING\r\n+OK\r\n";
        let (value, used) = complete(data);
        assert!(value.as_array().is_some());
        let (value, _) = complete(&data[used..]);
        assert_eq!(value, RespValue::Simple("OK".to_string()));
    }

    #[test]
    fn parse_missing_bulk_terminator() {
        let mut parser = RespParser::new();
        assert!(matches!(
            parser.parse(b"$3\r\nfooXY"),
            ParseResult::Error(_)
        ));
    }

    #[test]
    fn encode_round_trip() {
        let values = vec![
            RespValue::ok(),
            RespValue::Integer(42),
            RespValue::bulk("hello"),
            RespValue::Null,
            RespValue::Array(vec![RespValue::Integer(1), RespValue::bulk("x")]),
            RespValue::Error("ERR boom".to_string()),
        ];
        for original in values {
            let encoded = encode_to_vec(&original);
            let (parsed, used) = complete(&encoded);
            assert_eq!(parsed, original);
            assert_eq!(used, encoded.len());
        }
    }

    #[test]
    fn encode_set_command_bytes() {
        let value = RespValue::Array(vec![
            RespValue::bulk("SET"),
            RespValue::bulk("foo"),
            RespValue::bulk("bar"),
        ]);
        assert_eq!(
            encode_to_vec(&value),
            b"*3\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$3\r\nbar\r\n"
        );
    }
}
