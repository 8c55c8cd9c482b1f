//! Line framing for streamed HTTP bodies
//!
//! Both streaming wire formats in use (SSE `data:` lines and NDJSON) are
//! line-oriented. [`fragment_stream`] buffers raw body chunks, splits them on
//! `\n`, and hands each complete line to a provider-specific parser.
//! Bytes are buffered before decoding so multi-byte characters split across
//! chunks survive intact.

use std::collections::VecDeque;

use futures::stream::{self, BoxStream, StreamExt};

use super::FragmentStream;
use crate::types::{FailureClassifier, ProviderFailure};

/// Outcome of parsing one line of a streamed body
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Frame {
    Fragment(String),
    /// Final fragment; the stream ends after it
    Last(String),
    /// Keep-alive, comment, or empty payload
    Skip,
    /// End-of-stream marker
    Done,
}

struct LineFramer<B, F> {
    body: BoxStream<'static, reqwest::Result<B>>,
    provider: &'static str,
    parse: F,
    buffer: Vec<u8>,
    lines: VecDeque<String>,
    body_done: bool,
    finished: bool,
}

impl<B, F> LineFramer<B, F>
where
    B: AsRef<[u8]>,
    F: Fn(&str) -> Result<Frame, ProviderFailure>,
{
    fn push_chunk(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            self.push_line(&line[..line.len() - 1]);
        }
    }

    fn flush(&mut self) {
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            self.push_line(&rest);
        }
    }

    fn push_line(&mut self, raw: &[u8]) {
        let line = String::from_utf8_lossy(raw);
        let line = line.trim_end_matches('\r');
        if !line.trim().is_empty() {
            self.lines.push_back(line.to_string());
        }
    }

    async fn next_fragment(&mut self) -> Option<Result<String, ProviderFailure>> {
        loop {
            if self.finished {
                return None;
            }

            if let Some(line) = self.lines.pop_front() {
                match (self.parse)(&line) {
                    Ok(Frame::Fragment(text)) => return Some(Ok(text)),
                    Ok(Frame::Last(text)) => {
                        self.finished = true;
                        return Some(Ok(text));
                    }
                    Ok(Frame::Skip) => continue,
                    Ok(Frame::Done) => {
                        self.finished = true;
                        return None;
                    }
                    Err(failure) => {
                        self.finished = true;
                        return Some(Err(failure));
                    }
                }
            }

            if self.body_done {
                self.finished = true;
                return None;
            }

            match self.body.next().await {
                Some(Ok(chunk)) => self.push_chunk(chunk.as_ref()),
                Some(Err(e)) => {
                    self.finished = true;
                    return Some(Err(FailureClassifier::classify_reqwest(&e, self.provider)));
                }
                None => {
                    self.body_done = true;
                    self.flush();
                }
            }
        }
    }
}

/// Turn a chunked HTTP body into a stream of text fragments
///
/// Transport errors are classified into [`ProviderFailure`]s; the stream
/// ends after the first failure or at the parser's end marker.
pub(crate) fn fragment_stream<S, B, F>(body: S, provider: &'static str, parse: F) -> FragmentStream
where
    S: futures::Stream<Item = reqwest::Result<B>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    F: Fn(&str) -> Result<Frame, ProviderFailure> + Send + 'static,
{
    let framer = LineFramer {
        body: body.boxed(),
        provider,
        parse,
        buffer: Vec::new(),
        lines: VecDeque::new(),
        body_done: false,
        finished: false,
    };

    stream::unfold(framer, |mut framer| async move {
        let item = framer.next_fragment().await?;
        Some((item, framer))
    })
    .boxed()
}
