//! SSE job transport.
//!
//! Job endpoints answer with a stream of `data: <json>` lines. The decoder
//! keeps partial lines across chunks, ignores everything that is not a data
//! line, drops frames that fail to parse, and stops at `data: [DONE]`.

use std::collections::VecDeque;
use std::fmt::Display;
use std::pin::Pin;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use readwise_core::defaults::{SSE_DATA_PREFIX, SSE_DONE};
use readwise_core::{Error, ErrorBody, Result};

/// Lazy sequence of decoded job events.
pub type JobStream<T> = Pin<Box<dyn Stream<Item = Result<T>> + Send>>;

/// One meaningful line of an event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseLine {
    /// Payload of a `data: ` line.
    Data(String),
    /// The `[DONE]` marker.
    Done,
}

/// Incremental line framer for `data:` event streams.
///
/// Bytes are buffered until a newline arrives, and only complete lines are
/// decoded, so a multi-byte character split across chunks is reassembled.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
    done: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once `[DONE]` was seen. Later input is ignored.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feed a chunk and collect the lines it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseLine> {
        let mut lines = Vec::new();
        if self.done {
            return lines;
        }
        self.buf.extend_from_slice(chunk);

        let mut start = 0;
        while let Some(offset) = self.buf[start..].iter().position(|b| *b == b'\n') {
            let end = start + offset;
            if let Some(line) = classify(&self.buf[start..end]) {
                let is_done = line == SseLine::Done;
                lines.push(line);
                if is_done {
                    self.done = true;
                    self.buf.clear();
                    return lines;
                }
            }
            start = end + 1;
        }
        self.buf.drain(..start);
        lines
    }

    /// Flush a trailing line that was not newline-terminated.
    pub fn finish(&mut self) -> Option<SseLine> {
        if self.done || self.buf.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buf);
        let line = classify(&rest);
        if line == Some(SseLine::Done) {
            self.done = true;
        }
        line
    }
}

fn classify(raw: &[u8]) -> Option<SseLine> {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    let text = String::from_utf8_lossy(raw);
    let payload = text.strip_prefix(SSE_DATA_PREFIX)?;
    if payload.trim() == SSE_DONE {
        Some(SseLine::Done)
    } else {
        Some(SseLine::Data(payload.to_string()))
    }
}

/// Decode one data payload, dropping it if it is not valid JSON for `T`.
pub fn decode_frame<T: DeserializeOwned>(payload: &str) -> Option<T> {
    match serde_json::from_str::<T>(payload) {
        Ok(event) => Some(event),
        Err(e) => {
            let err = Error::Decode(e.to_string());
            debug!(error = %err, payload, "Dropping malformed event frame");
            None
        }
    }
}

struct DecodeState<S, T> {
    bytes: Pin<Box<S>>,
    decoder: SseDecoder,
    pending: VecDeque<T>,
    cancel: CancellationToken,
    finished: bool,
}

impl<S, T: DeserializeOwned> DecodeState<S, T> {
    fn absorb(&mut self, lines: Vec<SseLine>) {
        for line in lines {
            match line {
                SseLine::Data(payload) => {
                    if let Some(event) = decode_frame::<T>(&payload) {
                        self.pending.push_back(event);
                    }
                }
                SseLine::Done => {
                    debug!("Event stream reached [DONE]");
                    self.finished = true;
                }
            }
        }
    }
}

/// Turn a body byte stream into a stream of decoded events.
///
/// The sequence ends at `[DONE]`, at natural close, or as soon as `cancel`
/// fires. A read error yields a single `Error::Transport` and ends it.
pub fn decode_stream<S, E, T>(bytes: S, cancel: CancellationToken) -> JobStream<T>
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
    E: Display + Send + 'static,
    T: DeserializeOwned + Send + 'static,
{
    let state = DecodeState {
        bytes: Box::pin(bytes),
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        cancel,
        finished: false,
    };

    let stream = futures::stream::unfold(state, |mut st| async move {
        loop {
            if st.cancel.is_cancelled() {
                debug!("Event stream cancelled by caller");
                return None;
            }
            if let Some(event) = st.pending.pop_front() {
                return Some((Ok(event), st));
            }
            if st.finished {
                return None;
            }

            let next = tokio::select! {
                biased;
                _ = st.cancel.cancelled() => {
                    debug!("Event stream cancelled by caller");
                    return None;
                }
                next = st.bytes.next() => next,
            };

            match next {
                Some(Ok(chunk)) => {
                    let lines = st.decoder.push(&chunk);
                    st.absorb(lines);
                }
                Some(Err(e)) => {
                    st.finished = true;
                    st.pending.clear();
                    return Some((Err(Error::Transport(format!("Stream error: {}", e))), st));
                }
                None => {
                    let tail = st.decoder.finish().into_iter().collect();
                    st.absorb(tail);
                    st.finished = true;
                }
            }
        }
    });

    Box::pin(stream)
}

/// Single-use streamed request for a job endpoint.
pub struct JobTransport {
    request: RequestBuilder,
    cancel: CancellationToken,
    label: String,
}

impl JobTransport {
    pub fn new(request: RequestBuilder, label: impl Into<String>) -> Self {
        Self {
            request,
            cancel: CancellationToken::new(),
            label: label.into(),
        }
    }

    /// Use `token` to abort the connection.
    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Issue the request and return the event sequence.
    ///
    /// Consumes the transport; retries need a new one.
    pub async fn open<T>(self) -> Result<JobStream<T>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let Self {
            request,
            cancel,
            label,
        } = self;

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(label = %label, "Cancelled before the stream opened");
                return Ok(Box::pin(futures::stream::empty()));
            }
            response = request.send() => response
                .map_err(|e| Error::Transport(format!("Failed to start {}: {}", label, e)))?,
        };

        if !response.status().is_success() {
            let status = response.status();
            let detail = response
                .json::<ErrorBody>()
                .await
                .ok()
                .and_then(|b| b.detail)
                .unwrap_or_else(|| "no detail".to_string());
            warn!(label = %label, %status, detail = %detail, "Job stream rejected");
            return Err(Error::Transport(format!(
                "Failed to start {}: {} {}",
                label, status, detail
            )));
        }

        debug!(label = %label, "Job stream opened");
        Ok(decode_stream(response.bytes_stream(), cancel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use readwise_core::{JobProgress, JobStatus};

    fn chunks(parts: &[&[u8]]) -> impl Stream<Item = std::result::Result<Bytes, String>> {
        let owned: Vec<std::result::Result<Bytes, String>> = parts
            .iter()
            .map(|p| Ok(Bytes::copy_from_slice(p)))
            .collect();
        futures::stream::iter(owned)
    }

    async fn collect(parts: &[&[u8]]) -> Vec<JobProgress> {
        let stream = decode_stream::<_, _, JobProgress>(chunks(parts), CancellationToken::new());
        stream.map(|r| r.unwrap()).collect().await
    }

    #[test]
    fn test_decoder_ignores_non_data_lines() {
        let mut d = SseDecoder::new();
        let lines = d.push(b": keep-alive\nevent: progress\n\ndata: {\"a\":1}\n");
        assert_eq!(lines, vec![SseLine::Data("{\"a\":1}".to_string())]);
    }

    #[test]
    fn test_decoder_buffers_partial_lines() {
        let mut d = SseDecoder::new();
        assert!(d.push(b"data: {\"sta").is_empty());
        assert_eq!(
            d.push(b"tus\":\"idle\"}\n"),
            vec![SseLine::Data("{\"status\":\"idle\"}".to_string())]
        );
    }

    #[test]
    fn test_decoder_strips_carriage_return() {
        let mut d = SseDecoder::new();
        assert_eq!(d.push(b"data: [DONE]\r\n"), vec![SseLine::Done]);
        assert!(d.is_done());
    }

    #[test]
    fn test_decoder_ignores_input_after_done() {
        let mut d = SseDecoder::new();
        let lines = d.push(b"data: [DONE]\ndata: {\"late\":true}\n");
        assert_eq!(lines, vec![SseLine::Done]);
        assert!(d.push(b"data: {}\n").is_empty());
        assert!(d.finish().is_none());
    }

    #[test]
    fn test_decoder_finish_flushes_unterminated_line() {
        let mut d = SseDecoder::new();
        assert!(d.push(b"data: {\"x\":2}").is_empty());
        assert_eq!(d.finish(), Some(SseLine::Data("{\"x\":2}".to_string())));
    }

    #[test]
    fn test_multibyte_character_split_across_chunks() {
        let frame = "data: {\"message\":\"正在提取\"}\n".as_bytes();
        // split inside the first CJK character
        let (a, b) = frame.split_at(22);
        let mut d = SseDecoder::new();
        assert!(d.push(a).is_empty());
        let lines = d.push(b);
        assert_eq!(
            lines,
            vec![SseLine::Data("{\"message\":\"正在提取\"}".to_string())]
        );
    }

    #[tokio::test]
    async fn test_stream_ends_at_done() {
        let events = collect(&[
            b"data: {\"status\":\"extracting\",\"progress\":10,\"message\":\"a\"}\n\n",
            b"data: {\"status\":\"completed\",\"progress\":100,\"message\":\"b\"}\n\n",
            b"data: [DONE]\n\n",
            b"data: {\"status\":\"error\",\"progress\":0,\"message\":\"late\"}\n\n",
        ])
        .await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].status, JobStatus::Extracting);
        assert_eq!(events[1].status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_malformed_frame_is_skipped() {
        let events = collect(&[
            b"data: {\"progress\":10,\"message\":\"one\"}\n",
            b"data: {not json\n",
            b"data: {\"progress\":20,\"message\":\"two\"}\n",
        ])
        .await;
        let messages: Vec<&str> = events.iter().map(|e| e.message()).collect();
        assert_eq!(messages, vec!["one", "two"]);
    }

    #[tokio::test]
    async fn test_frames_split_mid_line_across_chunks() {
        let events = collect(&[
            b"data: {\"progress\":3",
            b"3,\"message\":\"x\"}\nda",
            b"ta: {\"progress\":66,\"message\":\"y\"}\n",
        ])
        .await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].percent(), 33);
        assert_eq!(events[1].percent(), 66);
    }

    #[tokio::test]
    async fn test_read_error_yields_transport_error() {
        let parts: Vec<std::result::Result<Bytes, String>> = vec![
            Ok(Bytes::from_static(b"data: {\"progress\":5}\n")),
            Err("connection reset".to_string()),
            Ok(Bytes::from_static(b"data: {\"progress\":6}\n")),
        ];
        let mut stream = decode_stream::<_, _, JobProgress>(
            futures::stream::iter(parts),
            CancellationToken::new(),
        );
        assert_eq!(stream.next().await.unwrap().unwrap().percent(), 5);
        let err = stream.next().await.unwrap().unwrap_err();
        assert!(err.is_transport());
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_cancel_ends_stream_immediately() {
        let token = CancellationToken::new();
        let (tx, rx) = futures::channel::mpsc::unbounded::<std::result::Result<Bytes, String>>();
        let mut stream = decode_stream::<_, _, JobProgress>(rx, token.clone());

        tx.unbounded_send(Ok(Bytes::from_static(b"data: {\"progress\":1}\n")))
            .unwrap();
        assert!(stream.next().await.is_some());

        token.cancel();
        // cancel is idempotent
        token.cancel();
        assert!(stream.next().await.is_none());
    }
}
