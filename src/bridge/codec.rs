//! Line-delimited JSON framing
//!
//! Accumulates raw agent output, splits it on `\n`, and parses each
//! non-empty line as JSON. Malformed lines are logged and dropped without
//! interrupting the stream. The same logic serves push-style callers
//! (`feed`) and `FramedRead` over the child's stdout (`Decoder`).

use bytes::BytesMut;
use serde_json::Value;
use tokio_util::codec::Decoder;

/// Upper bound on an unterminated line before it is discarded
pub const MAX_LINE_BYTES: usize = 16 * 1024 * 1024;

/// Counters describing what the codec has seen
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CodecStats {
    /// Non-empty lines handed to the JSON parser
    pub lines: u64,
    /// Lines that parsed successfully
    pub parsed: u64,
    /// Lines that failed to parse and were discarded
    pub malformed: u64,
    /// Oversized fragments dropped without a terminator
    pub overflowed: u64,
}

/// NDJSON codec with an internal accumulation buffer
#[derive(Debug, Default)]
pub struct LineProtocolCodec {
    buffer: BytesMut,
    stats: CodecStats,
}

impl LineProtocolCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every JSON value completed by it, in order.
    ///
    /// Partial trailing lines stay buffered for the next call.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Value> {
        self.buffer.extend_from_slice(chunk);
        let mut buf = std::mem::take(&mut self.buffer);
        let mut values = Vec::new();
        while let Some(value) = self.next_value(&mut buf) {
            values.push(value);
        }
        self.guard_overflow(&mut buf);
        self.buffer = buf;
        values
    }

    /// Bytes currently held waiting for a terminator
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Drop any partial line
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    pub fn stats(&self) -> CodecStats {
        self.stats
    }

    /// Pop complete lines off `buf` until one parses or none remain
    fn next_value(&mut self, buf: &mut BytesMut) -> Option<Value> {
        loop {
            let newline = buf.iter().position(|b| *b == b'\n')?;
            let line = buf.split_to(newline + 1);
            if let Some(value) = self.parse_line(&line) {
                return Some(value);
            }
        }
    }

    fn parse_line(&mut self, raw: &[u8]) -> Option<Value> {
        let text = String::from_utf8_lossy(raw);
        let line = text.trim();
        if line.is_empty() {
            return None;
        }

        self.stats.lines += 1;
        match serde_json::from_str::<Value>(line) {
            Ok(value) => {
                self.stats.parsed += 1;
                Some(value)
            }
            Err(e) => {
                self.stats.malformed += 1;
                tracing::warn!(
                    error = %e,
                    line = %truncate(line, 200),
                    "Discarding malformed protocol line"
                );
                None
            }
        }
    }

    fn guard_overflow(&mut self, buf: &mut BytesMut) {
        if buf.len() > MAX_LINE_BYTES {
            tracing::warn!(
                bytes = buf.len(),
                "Discarding unterminated protocol line over size limit"
            );
            self.stats.overflowed += 1;
            buf.clear();
        }
    }
}

impl Decoder for LineProtocolCodec {
    type Item = Value;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> std::io::Result<Option<Value>> {
        let value = self.next_value(src);
        if value.is_none() {
            self.guard_overflow(src);
        }
        Ok(value)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> std::io::Result<Option<Value>> {
        if let Some(value) = self.decode(src)? {
            return Ok(Some(value));
        }
        if !src.is_empty() {
            tracing::debug!(
                bytes = src.len(),
                "Discarding unterminated trailing output at end of stream"
            );
            src.clear();
        }
        Ok(None)
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use tokio_util::codec::FramedRead;

    #[test]
    fn test_single_line() {
        let mut codec = LineProtocolCodec::new();
        let values = codec.feed(b"{\"a\":1}\n");
        assert_eq!(values, vec![serde_json::json!({"a": 1})]);
        assert_eq!(codec.buffered_len(), 0);
    }

    #[test]
    fn test_partial_line_stays_buffered() {
        let mut codec = LineProtocolCodec::new();
        assert!(codec.feed(b"{\"message_type\":\"assis").is_empty());
        assert!(codec.buffered_len() > 0);

        let values = codec.feed(b"tant_message\",\"content\":\"hi\"}\n");
        assert_eq!(values.len(), 1);
        assert_eq!(values[0]["content"], "hi");
        assert_eq!(codec.buffered_len(), 0);
    }

    #[test]
    fn test_chunk_boundaries_do_not_change_parse_count() {
        let input = b"{\"n\":1}\n{\"n\":2}\r\n\n{\"n\":3}\n{\"n\":4}\n";

        // Whole input at once
        let mut whole = LineProtocolCodec::new();
        let expected = whole.feed(input);
        assert_eq!(expected.len(), 4);

        // Every possible split point, and byte-at-a-time
        for split in 0..input.len() {
            let mut codec = LineProtocolCodec::new();
            let mut got = codec.feed(&input[..split]);
            got.extend(codec.feed(&input[split..]));
            assert_eq!(got, expected, "split at {}", split);
            assert_eq!(codec.stats().lines, 4);
        }

        let mut codec = LineProtocolCodec::new();
        let mut got = Vec::new();
        for b in input.iter() {
            got.extend(codec.feed(std::slice::from_ref(b)));
        }
        assert_eq!(got, expected);
    }

    #[test]
    fn test_malformed_line_does_not_stop_stream() {
        let mut codec = LineProtocolCodec::new();
        let values = codec.feed(b"{\"n\":1}\nnot json at all\n{\"n\":2}\n");

        assert_eq!(values.len(), 2);
        assert_eq!(values[1]["n"], 2);

        let stats = codec.stats();
        assert_eq!(stats.lines, 3);
        assert_eq!(stats.parsed, 2);
        assert_eq!(stats.malformed, 1);
    }

    #[test]
    fn test_whitespace_lines_are_skipped() {
        let mut codec = LineProtocolCodec::new();
        let values = codec.feed(b"   \n\t\n{\"ok\":true}  \n");
        assert_eq!(values.len(), 1);
        assert_eq!(codec.stats().lines, 1);
    }

    #[test]
    fn test_scalar_json_lines_are_values() {
        let mut codec = LineProtocolCodec::new();
        let values = codec.feed(b"\"[DONE]\"\n42\n");
        assert_eq!(values, vec![serde_json::json!("[DONE]"), serde_json::json!(42)]);
    }

    #[test]
    fn test_clear_drops_partial_line() {
        let mut codec = LineProtocolCodec::new();
        codec.feed(b"{\"half\":");
        codec.clear();
        assert_eq!(codec.buffered_len(), 0);
        assert!(codec.feed(b"1}\n").is_empty());
        assert_eq!(codec.stats().malformed, 1);
    }

    #[tokio::test]
    async fn test_framed_read_skips_malformed_and_trailing_fragment() {
        let input: &[u8] = b"{\"n\":1}\ngarbage\n{\"n\":2}\n{\"unterminated\":";
        let mut framed = FramedRead::new(input, LineProtocolCodec::new());

        let mut got = Vec::new();
        while let Some(item) = framed.next().await {
            got.push(item.unwrap());
        }
        assert_eq!(got, vec![serde_json::json!({"n": 1}), serde_json::json!({"n": 2})]);
        assert_eq!(framed.decoder().stats().malformed, 1);
    }

    #[tokio::test]
    async fn test_framed_read_across_split_reads() {
        let reader = tokio_test::io::Builder::new()
            .read(b"{\"message_type\":\"assistant_")
            .read(b"message\",\"content\":\"hel")
            .read(b"lo\"}\n{\"n\"")
            .read(b":2}\n")
            .build();
        let mut framed = FramedRead::new(reader, LineProtocolCodec::new());

        let first = framed.next().await.unwrap().unwrap();
        assert_eq!(first["content"], "hello");
        let second = framed.next().await.unwrap().unwrap();
        assert_eq!(second["n"], 2);
        assert!(framed.next().await.is_none());
    }
}
