// SPDX-License-Identifier: Apache-2.0

use std::borrow::Cow;
use std::io::{self, BufRead, BufReader, Read};

/// One complete, newline-terminated line.
#[derive(Debug)]
pub struct Line<'a> {
    /// Line content without its terminator, capped at the reader's maximum
    pub bytes: &'a [u8],
    /// Byte offset just past the terminator
    pub end_offset: u64,
    /// The line was longer than the maximum and `bytes` holds only its prefix
    pub truncated: bool,
}

impl Line<'_> {
    /// Content as text, invalid UTF-8 replaced
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.bytes)
    }
}

/// Reads complete lines from a byte stream while tracking the offset of the
/// last complete line.
///
/// A trailing line without a newline is never returned: `next_line` yields
/// `None` and the offset stays at the end of the previous complete line, so
/// the partial line is re-read once its writer finishes it. The reader is
/// spent after returning `None`.
pub struct LineReader<R> {
    inner: BufReader<R>,
    max_line_size: usize,
    buf: Vec<u8>,
    offset: u64,
}

impl<R: Read> LineReader<R> {
    /// `start_offset` is the position `inner` is already at.
    pub fn new(inner: R, start_offset: u64, max_line_size: usize) -> Self {
        Self {
            inner: BufReader::with_capacity(max_line_size.max(1), inner),
            max_line_size,
            buf: Vec::with_capacity(max_line_size.min(64 * 1024)),
            offset: start_offset,
        }
    }

    /// Offset just past the last complete line returned
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Read the next complete line.
    ///
    /// Lines longer than the maximum are consumed in full but only their first
    /// `max_line_size` bytes are kept, so memory stays bounded.
    pub fn next_line(&mut self) -> io::Result<Option<Line<'_>>> {
        self.buf.clear();
        let mut consumed: u64 = 0;
        let mut truncated = false;

        loop {
            let (used, complete) = {
                let available = match self.inner.fill_buf() {
                    Ok(bytes) => bytes,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e),
                };
                if available.is_empty() {
                    return Ok(None);
                }

                let (content_len, complete) = match available.iter().position(|&b| b == b'\n') {
                    Some(i) => (i, true),
                    None => (available.len(), false),
                };

                let room = self.max_line_size.saturating_sub(self.buf.len());
                let keep = content_len.min(room);
                self.buf.extend_from_slice(&available[..keep]);
                if keep < content_len {
                    truncated = true;
                }
                (content_len + usize::from(complete), complete)
            };

            self.inner.consume(used);
            consumed += used as u64;

            if complete {
                break;
            }
        }

        self.offset += consumed;

        if !truncated && self.buf.last() == Some(&b'\r') {
            self.buf.pop();
        }

        Ok(Some(Line {
            bytes: &self.buf,
            end_offset: self.offset,
            truncated,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn read_all(data: &[u8], max: usize) -> (Vec<(String, u64, bool)>, u64) {
        let mut reader = LineReader::new(Cursor::new(data.to_vec()), 0, max);
        let mut lines = Vec::new();
        while let Some(line) = reader.next_line().unwrap() {
            lines.push((line.text().into_owned(), line.end_offset, line.truncated));
        }
        (lines, reader.offset())
    }

    #[test]
    fn test_complete_lines() {
        let (lines, offset) = read_all(b"ERROR disk full\nINFO ok\n", 4096);
        assert_eq!(
            lines,
            vec![
                ("ERROR disk full".to_string(), 16, false),
                ("INFO ok".to_string(), 24, false),
            ]
        );
        assert_eq!(offset, 24);
    }

    #[test]
    fn test_partial_line_not_consumed() {
        let (lines, offset) = read_all(b"one\ntwo\nthr", 4096);
        assert_eq!(lines.len(), 2);
        assert_eq!(offset, 8);
    }

    #[test]
    fn test_empty_lines_count() {
        let (lines, offset) = read_all(b"\n\nx\n", 4096);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].0, "");
        assert_eq!(offset, 4);
    }

    #[test]
    fn test_crlf_stripped() {
        let (lines, offset) = read_all(b"windows line\r\n", 4096);
        assert_eq!(lines[0].0, "windows line");
        assert_eq!(offset, 14);
    }

    #[test]
    fn test_long_line_truncated_but_consumed() {
        let (lines, offset) = read_all(b"abcdefghij\nok\n", 4);
        assert_eq!(
            lines,
            vec![("abcd".to_string(), 11, true), ("ok".to_string(), 14, false)]
        );
        assert_eq!(offset, 14);
    }

    #[test]
    fn test_line_exactly_at_limit_is_not_truncated() {
        let (lines, _) = read_all(b"abcd\n", 4);
        assert_eq!(lines, vec![("abcd".to_string(), 5, false)]);
    }

    #[test]
    fn test_invalid_utf8_is_lossy() {
        let (lines, offset) = read_all(b"bad \xff byte\n", 4096);
        assert_eq!(lines[0].0, "bad \u{fffd} byte");
        assert_eq!(offset, 11);
    }

    #[test]
    fn test_start_offset_is_added() {
        let mut reader = LineReader::new(Cursor::new(b"tail\n".to_vec()), 100, 4096);
        let line = reader.next_line().unwrap().unwrap();
        assert_eq!(line.end_offset, 105);
    }
}
