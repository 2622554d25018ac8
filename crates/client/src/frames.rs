//! Reassembly of newline-delimited frames from a chunked byte stream.
//!
//! Network reads arrive at arbitrary boundaries: a single read may
//! hold several frames, half a frame, or half of a multi-byte UTF-8
//! character. [`FrameAssembler`] keeps the unterminated tail of every
//! read and prepends it to the next one, so frames come out exactly as
//! the server wrote them.

use futures::{Stream, StreamExt};
use maiopinion_core::error::DiagnosisError;

/// The unterminated tail grew past the configured bound.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("frame exceeds {limit} bytes without a line terminator")]
pub struct FrameTooLong {
    pub limit: usize,
}

impl From<FrameTooLong> for DiagnosisError {
    fn from(err: FrameTooLong) -> Self {
        DiagnosisError::MalformedEvent(err.to_string())
    }
}

/// Incremental line splitter with carry-over between reads.
///
/// `scanned` marks how far the pending region is known to hold no
/// newline, so a long partial frame is not rescanned on every read.
/// `partial_len` is updated from the newest chunk alone.
#[derive(Debug)]
pub struct FrameAssembler {
    buffer: Vec<u8>,
    /// Start of the not-yet-emitted region of `buffer`.
    cursor: usize,
    /// `buffer[cursor..scanned]` contains no `\n`.
    scanned: usize,
    /// Bytes after the last `\n` in `buffer`.
    partial_len: usize,
    max_frame_bytes: usize,
}

impl FrameAssembler {
    pub fn new(max_frame_bytes: usize) -> Self {
        Self {
            buffer: Vec::new(),
            cursor: 0,
            scanned: 0,
            partial_len: 0,
            max_frame_bytes,
        }
    }

    /// Append one network read.
    ///
    /// Fails when the trailing partial frame exceeds the bound; the
    /// assembler should be dropped afterwards.
    pub fn push(&mut self, chunk: &[u8]) -> Result<(), FrameTooLong> {
        self.compact();
        self.buffer.extend_from_slice(chunk);

        self.partial_len = match chunk.iter().rposition(|b| *b == b'\n') {
            Some(i) => chunk.len() - i - 1,
            None => self.partial_len + chunk.len(),
        };
        if self.partial_len > self.max_frame_bytes {
            return Err(FrameTooLong {
                limit: self.max_frame_bytes,
            });
        }
        Ok(())
    }

    /// Pop the next complete frame, without its line terminator.
    ///
    /// A trailing `\r` is stripped so CRLF streams decode the same as
    /// LF streams. Invalid UTF-8 becomes U+FFFD instead of failing the
    /// frame, so a corrupted byte inside a `data: ` line alters the
    /// decoded text rather than aborting the stream.
    pub fn next_frame(&mut self) -> Option<String> {
        let Some(offset) = self.buffer[self.scanned..].iter().position(|b| *b == b'\n') else {
            self.scanned = self.buffer.len();
            return None;
        };
        let newline = self.scanned + offset;

        let mut line = &self.buffer[self.cursor..newline];
        if let Some(stripped) = line.strip_suffix(b"\r") {
            line = stripped;
        }
        let frame = String::from_utf8_lossy(line).into_owned();
        self.cursor = newline + 1;
        self.scanned = self.cursor;
        Some(frame)
    }

    /// Number of buffered bytes that do not yet form a complete frame.
    pub fn pending_len(&self) -> usize {
        self.buffer.len() - self.cursor
    }

    /// End of data. Any unterminated tail is discarded and its length
    /// returned.
    pub fn finish(mut self) -> usize {
        while self.next_frame().is_some() {}
        let discarded = self.pending_len();
        if discarded > 0 {
            tracing::warn!(bytes = discarded, "Discarding incomplete frame at end of stream");
        }
        discarded
    }

    /// Drop emitted bytes once they make up at least half the buffer,
    /// keeping the copy cost amortized.
    fn compact(&mut self) {
        if self.cursor > 0 && self.cursor * 2 >= self.buffer.len() {
            self.buffer.drain(..self.cursor);
            self.scanned -= self.cursor;
            self.cursor = 0;
        }
    }
}

/// Adapt a stream of byte chunks into a lazy stream of complete frames.
///
/// Read errors end the stream with [`DiagnosisError::Transport`]; an
/// oversized partial frame ends it with
/// [`DiagnosisError::MalformedEvent`]. Frames are yielded in the order
/// they appear in the byte stream.
pub fn frame_stream<S, B, E>(
    bytes: S,
    max_frame_bytes: usize,
) -> impl Stream<Item = Result<String, DiagnosisError>>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    let state = (Box::pin(bytes), FrameAssembler::new(max_frame_bytes));

    futures::stream::unfold(Some(state), |state| async move {
        let (mut bytes, mut assembler) = state?;
        loop {
            if let Some(frame) = assembler.next_frame() {
                tracing::trace!(frame = %frame, "Frame assembled");
                return Some((Ok(frame), Some((bytes, assembler))));
            }

            match bytes.next().await {
                Some(Ok(chunk)) => {
                    if let Err(e) = assembler.push(chunk.as_ref()) {
                        return Some((Err(e.into()), None));
                    }
                }
                Some(Err(e)) => {
                    return Some((Err(DiagnosisError::Transport(e.to_string())), None));
                }
                None => {
                    assembler.finish();
                    return None;
                }
            }
        }
    })
}
