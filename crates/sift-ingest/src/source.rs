//! Stream sources feeding the ingestion loop.
//!
//! A [`StreamSource`] yields one [`Message`] per call. Any error ends
//! ingestion, so a source should only fail when it cannot produce further
//! messages.
//!
//! The loop may drop a pending [`read_one`](StreamSource::read_one) future when
//! shutdown is signalled. Implementations must tolerate that without losing a
//! message they have not yet returned.

use crate::{error::SourceError, record::Message};
use bytes::Bytes;
use core::future::Future;
use std::collections::VecDeque;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

pub trait StreamSource: Send {
    fn read_one(&mut self) -> impl Future<Output = Result<Message, SourceError>> + Send;
}

/// Longest line a [`LineSource`] buffers by default, excluding the newline.
pub const DEFAULT_MAX_LINE_LEN: usize = 1024 * 1024;

/// Reads newline-delimited messages from any async reader.
///
/// Lines are handed on as raw bytes, so a line that is not valid UTF-8 (or not
/// valid JSON) becomes a message that fails to parse rather than a source
/// error. Blank lines are skipped. A message's offset is its 1-based line
/// number, which is what an operator needs to find it again in the input. End
/// of input is reported as [`SourceError::EndOfStream`].
///
/// A line longer than the configured maximum is cut at that length and the
/// remainder is discarded.
pub struct LineSource<R> {
    reader: R,
    buf: Vec<u8>,
    line_no: u64,
    max_line_len: usize,
    discarding: bool,
}

impl<R: AsyncBufRead + Unpin> LineSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
            line_no: 0,
            max_line_len: DEFAULT_MAX_LINE_LEN,
            discarding: false,
        }
    }

    /// Caps how many bytes of a single line are kept.
    #[must_use]
    pub fn with_max_line_len(mut self, max_line_len: usize) -> Self {
        self.max_line_len = max_line_len.max(1);
        self
    }

    /// Appends to `buf` until a newline, end of input, or one byte past the
    /// line cap. Returns the number of bytes read.
    async fn fill_line(&mut self) -> std::io::Result<usize> {
        let limit = (self.max_line_len + 1).saturating_sub(self.buf.len());
        (&mut self.reader)
            .take(limit as u64)
            .read_until(b'\n', &mut self.buf)
            .await
    }
}

impl<R: AsyncBufRead + Unpin + Send> StreamSource for LineSource<R> {
    async fn read_one(&mut self) -> Result<Message, SourceError> {
        // Partial reads stay in `buf`, so dropping this future mid-line loses
        // nothing.
        loop {
            let n = self.fill_line().await?;
            let terminated = self.buf.last() == Some(&b'\n');

            // Tail of a line that was already cut.
            if self.discarding {
                if terminated || n == 0 {
                    self.discarding = false;
                }
                self.buf.clear();
                if n == 0 {
                    return Err(SourceError::EndOfStream);
                }
                continue;
            }

            if !terminated && self.buf.len() > self.max_line_len {
                self.line_no += 1;
                self.discarding = true;
                self.buf.truncate(self.max_line_len);
                tracing::warn!(
                    offset = self.line_no,
                    max_line_len = self.max_line_len,
                    "Line exceeds the maximum length, truncating"
                );
                let line = core::mem::take(&mut self.buf);
                return Ok(Message::new(self.line_no, line));
            }

            if self.buf.is_empty() {
                return Err(SourceError::EndOfStream);
            }

            self.line_no += 1;
            let mut line = core::mem::take(&mut self.buf);
            if terminated {
                line.pop();
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
            }

            if line.trim_ascii().is_empty() {
                continue;
            }
            return Ok(Message::new(self.line_no, line));
        }
    }
}

/// What a [`MemorySource`] does once its messages run out.
#[derive(Debug)]
enum Exhausted {
    Fail(Option<SourceError>),
    Hang,
}

/// An in-memory source, mostly for tests and local runs.
///
/// Yields its messages in order with offsets starting at 1, then either fails
/// with a chosen error or never returns again.
#[derive(Debug)]
pub struct MemorySource {
    pending: VecDeque<Bytes>,
    next_offset: u64,
    reads: u64,
    exhausted: Exhausted,
}

impl MemorySource {
    /// Yields `payloads`, then [`SourceError::EndOfStream`].
    pub fn new<I, B>(payloads: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        Self {
            pending: payloads.into_iter().map(Into::into).collect(),
            next_offset: 1,
            reads: 0,
            exhausted: Exhausted::Fail(None),
        }
    }

    /// Fails with `error` once the payloads are exhausted.
    #[must_use]
    pub fn then_fail(mut self, error: SourceError) -> Self {
        self.exhausted = Exhausted::Fail(Some(error));
        self
    }

    /// Blocks forever once the payloads are exhausted, like an idle broker.
    #[must_use]
    pub fn then_hang(mut self) -> Self {
        self.exhausted = Exhausted::Hang;
        self
    }

    /// Number of successful reads so far.
    pub const fn reads(&self) -> u64 {
        self.reads
    }
}

impl StreamSource for MemorySource {
    async fn read_one(&mut self) -> Result<Message, SourceError> {
        if let Some(payload) = self.pending.pop_front() {
            let offset = self.next_offset;
            self.next_offset += 1;
            self.reads += 1;
            return Ok(Message::new(offset, payload));
        }

        match &mut self.exhausted {
            Exhausted::Fail(error) => Err(error.take().unwrap_or(SourceError::EndOfStream)),
            Exhausted::Hang => core::future::pending().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tokio::io::{AsyncWriteExt, BufReader};

    #[tokio::test]
    async fn line_source_skips_blank_lines_and_numbers_by_line() {
        let input = "first\n\n  \nsecond\r\nthird";
        let mut source = LineSource::new(BufReader::new(Cursor::new(input.as_bytes().to_vec())));

        let a = source.read_one().await.unwrap();
        let b = source.read_one().await.unwrap();
        let c = source.read_one().await.unwrap();
        assert_eq!(a, Message::new(1, "first"));
        assert_eq!(b, Message::new(4, "second"));
        assert_eq!(c, Message::new(5, "third"));
        assert!(matches!(
            source.read_one().await,
            Err(SourceError::EndOfStream)
        ));
    }

    #[tokio::test]
    async fn line_source_passes_invalid_utf8_through() {
        let input = b"{\"a\":1}\n\xff\xfe garbage\n{\"b\":2}\n".to_vec();
        let mut source = LineSource::new(Cursor::new(input));

        assert_eq!(source.read_one().await.unwrap().offset, 1);
        let bad = source.read_one().await.unwrap();
        assert_eq!(bad.offset, 2);
        assert_eq!(&bad.payload[..], b"\xff\xfe garbage");
        assert_eq!(source.read_one().await.unwrap().offset, 3);
        assert!(matches!(
            source.read_one().await,
            Err(SourceError::EndOfStream)
        ));
    }

    #[tokio::test]
    async fn line_source_truncates_long_lines() {
        let input = "short\nabcdefghij\nok\n0123456789";
        let mut source =
            LineSource::new(Cursor::new(input.as_bytes().to_vec())).with_max_line_len(4);

        assert_eq!(source.read_one().await.unwrap(), Message::new(1, "shor"));
        assert_eq!(source.read_one().await.unwrap(), Message::new(2, "abcd"));
        assert_eq!(source.read_one().await.unwrap(), Message::new(3, "ok"));
        assert_eq!(source.read_one().await.unwrap(), Message::new(4, "0123"));
        assert!(matches!(
            source.read_one().await,
            Err(SourceError::EndOfStream)
        ));
    }

    #[tokio::test]
    async fn line_source_resumes_after_dropped_read() {
        let (mut client, server) = tokio::io::duplex(64);
        let mut source = LineSource::new(BufReader::new(server));

        client.write_all(b"{\"par").await.unwrap();
        let pending =
            tokio::time::timeout(core::time::Duration::from_millis(20), source.read_one()).await;
        assert!(pending.is_err());

        client.write_all(b"tial\":1}\n").await.unwrap();
        let msg = source.read_one().await.unwrap();
        assert_eq!(msg, Message::new(1, r#"{"partial":1}"#));
    }

    #[tokio::test]
    async fn memory_source_fails_after_payloads() {
        let mut source = MemorySource::new(["a", "b"]).then_fail(SourceError::Disconnected {
            reason: "broker gone".to_string(),
        });

        assert_eq!(source.read_one().await.unwrap().offset, 1);
        assert_eq!(source.read_one().await.unwrap().offset, 2);
        assert!(matches!(
            source.read_one().await,
            Err(SourceError::Disconnected { .. })
        ));
        assert!(matches!(
            source.read_one().await,
            Err(SourceError::EndOfStream)
        ));
        assert_eq!(source.reads(), 2);
    }

    #[tokio::test]
    async fn memory_source_can_hang() {
        let mut source = MemorySource::new(Vec::<Bytes>::new()).then_hang();
        let res =
            tokio::time::timeout(core::time::Duration::from_millis(20), source.read_one()).await;
        assert!(res.is_err());
    }
}
