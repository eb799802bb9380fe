//! Bounded body capture.
//!
//! # Responsibilities
//! - Keep at most [`PREVIEW_LIMIT`] bytes of each body, plus its true length
//! - Pre-read the head of a request body and replay it to the handler
//! - Tee a response body while it streams and report when it is finished
//!
//! # Design Decisions
//! - Bodies are never fully buffered; only the preview prefix is copied
//! - The response is reported exactly once: at end of stream, on error, or on drop

use std::borrow::Cow;
use std::collections::VecDeque;
use std::fmt;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};

use axum::body::{Body, Bytes};
use http_body::{Body as HttpBody, Frame, SizeHint};
use http_body_util::BodyExt;

/// Bytes of each body kept for logging.
pub const PREVIEW_LIMIT: usize = 2000;

/// Prefix of a body (byte-exact, at most [`PREVIEW_LIMIT`] bytes) and its total length.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BodyPreview {
    prefix: Vec<u8>,
    total: u64,
}

impl BodyPreview {
    pub fn new() -> Self {
        Self::default()
    }

    /// Account for the next chunk of the body.
    pub fn record(&mut self, chunk: &[u8]) {
        let room = PREVIEW_LIMIT.saturating_sub(self.prefix.len());
        self.prefix.extend_from_slice(&chunk[..room.min(chunk.len())]);
        self.total += chunk.len() as u64;
    }

    /// The captured prefix.
    pub fn bytes(&self) -> &[u8] {
        &self.prefix
    }

    /// Total body length seen so far.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Prefix decoded for display; invalid UTF-8 is replaced.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.prefix)
    }
}

/// Preview shared between a body wrapper and whoever reads it later.
#[derive(Clone, Default)]
pub struct SharedPreview(Arc<Mutex<BodyPreview>>);

impl SharedPreview {
    fn record(&self, chunk: &[u8]) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record(chunk);
    }

    /// Copy of the preview as it stands now.
    pub fn snapshot(&self) -> BodyPreview {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

/// Read the head of `body` into a preview, returning a body that replays it.
///
/// Reading stops once [`PREVIEW_LIMIT`] bytes are captured; the remainder is
/// streamed to the handler and counted as it goes.
pub async fn capture_request(mut body: Body) -> (Body, SharedPreview) {
    let preview = SharedPreview::default();
    let mut buffered = VecDeque::new();
    let mut pending_error = None;
    let mut finished = false;
    let mut captured = 0usize;

    while captured < PREVIEW_LIMIT {
        match body.frame().await {
            Some(Ok(frame)) => {
                if let Some(data) = frame.data_ref() {
                    captured += data.len();
                    preview.record(data);
                }
                buffered.push_back(frame);
            }
            Some(Err(e)) => {
                pending_error = Some(e);
                break;
            }
            None => {
                finished = true;
                break;
            }
        }
    }

    let replay = ReplayBody {
        buffered,
        pending_error,
        inner: if finished { None } else { Some(body) },
        preview: preview.clone(),
    };
    (Body::new(replay), preview)
}

/// Request body that yields pre-read frames before resuming the original stream.
struct ReplayBody {
    buffered: VecDeque<Frame<Bytes>>,
    pending_error: Option<axum::Error>,
    inner: Option<Body>,
    preview: SharedPreview,
}

impl HttpBody for ReplayBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, Self::Error>>> {
        let this = self.get_mut();

        if let Some(frame) = this.buffered.pop_front() {
            return Poll::Ready(Some(Ok(frame)));
        }
        if let Some(err) = this.pending_error.take() {
            return Poll::Ready(Some(Err(err)));
        }
        let Some(inner) = this.inner.as_mut() else {
            return Poll::Ready(None);
        };

        match Pin::new(inner).poll_frame(cx) {
            Poll::Ready(Some(Ok(frame))) => {
                if let Some(data) = frame.data_ref() {
                    this.preview.record(data);
                }
                Poll::Ready(Some(Ok(frame)))
            }
            Poll::Ready(None) => {
                this.inner = None;
                Poll::Ready(None)
            }
            other => other,
        }
    }

    fn is_end_stream(&self) -> bool {
        self.buffered.is_empty()
            && self.pending_error.is_none()
            && self.inner.as_ref().map_or(true, HttpBody::is_end_stream)
    }

    fn size_hint(&self) -> SizeHint {
        let buffered: u64 = self
            .buffered
            .iter()
            .filter_map(Frame::data_ref)
            .map(|d| d.len() as u64)
            .sum();

        let Some(inner) = &self.inner else {
            return SizeHint::with_exact(buffered);
        };
        let rest = inner.size_hint();
        let mut hint = SizeHint::new();
        hint.set_lower(rest.lower() + buffered);
        if let Some(upper) = rest.upper() {
            hint.set_upper(upper + buffered);
        }
        hint
    }
}

/// How a response body stream ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyOutcome {
    /// All frames were produced.
    Complete,
    /// The stream failed with this message.
    Failed(String),
    /// The body was dropped before its end, e.g. the client went away.
    Abandoned,
}

type Completion = Box<dyn FnOnce(BodyPreview, BodyOutcome) + Send>;

/// Response body that previews what streams through and reports once at the end.
pub struct RecordingBody {
    inner: Body,
    preview: BodyPreview,
    on_complete: Option<Completion>,
}

impl RecordingBody {
    pub fn new<F>(inner: Body, on_complete: F) -> Self
    where
        F: FnOnce(BodyPreview, BodyOutcome) + Send + 'static,
    {
        Self {
            inner,
            preview: BodyPreview::new(),
            on_complete: Some(Box::new(on_complete)),
        }
    }

    fn finish(&mut self, outcome: BodyOutcome) {
        if let Some(callback) = self.on_complete.take() {
            callback(std::mem::take(&mut self.preview), outcome);
        }
    }
}

impl HttpBody for RecordingBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, Self::Error>>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_frame(cx) {
            Poll::Ready(Some(Ok(frame))) => {
                if let Some(data) = frame.data_ref() {
                    this.preview.record(data);
                }
                Poll::Ready(Some(Ok(frame)))
            }
            Poll::Ready(Some(Err(e))) => {
                this.finish(BodyOutcome::Failed(e.to_string()));
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                this.finish(BodyOutcome::Complete);
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl Drop for RecordingBody {
    fn drop(&mut self) {
        let outcome = if self.inner.is_end_stream() {
            BodyOutcome::Complete
        } else {
            BodyOutcome::Abandoned
        };
        self.finish(outcome);
    }
}

impl fmt::Debug for RecordingBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordingBody")
            .field("preview_len", &self.preview.bytes().len())
            .field("pending", &self.on_complete.is_some())
            .finish()
    }
}
