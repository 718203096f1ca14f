// Upstream body relaying
// Author: kelexine (https://github.com/kelexine)

use crate::error::{RelayError, Result};
use crate::metrics;
use crate::utils::logging::redact;
use bytes::Bytes;
use futures::stream::{Stream, StreamExt};
use pin_project::{pin_project, pinned_drop};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;
use tokio_util::sync::{CancellationToken, DropGuard, WaitForCancellationFutureOwned};
use tracing::{debug, error, warn};

/// Turn an upstream response into a relay stream, or an error if streaming
/// must not begin.
///
/// Waits for the first non-empty body chunk so that empty bodies and early
/// transport failures are reported as JSON errors instead of a truncated
/// event stream. Only that one chunk is held before it is handed on.
pub async fn open_stream(
    response: reqwest::Response,
    cancel: CancellationToken,
    started: Instant,
    sanitize_tokens: bool,
) -> Result<RelayStream<impl Stream<Item = reqwest::Result<Bytes>>>> {
    let status = response.status();
    if !status.is_success() {
        let error_text = response.text().await.unwrap_or_default();
        let message = extract_error_message(&error_text).unwrap_or(error_text);
        error!(
            "Upstream API error: HTTP {} - {}",
            status.as_u16(),
            redact(&message, sanitize_tokens)
        );
        return Err(RelayError::UpstreamStatus {
            status: status.as_u16(),
            message,
        });
    }

    let mut body = Box::pin(response.bytes_stream());
    let first = loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RelayError::Cancelled),
            next = body.next() => next,
        };
        match next {
            Some(Ok(chunk)) if chunk.is_empty() => continue,
            Some(Ok(chunk)) => break chunk,
            Some(Err(e)) => {
                return Err(RelayError::UpstreamTransport(format!(
                    "Failed to read response body: {}",
                    e
                )))
            }
            None => return Err(RelayError::EmptyUpstreamBody),
        }
    };

    metrics::record_first_byte(started.elapsed().as_secs_f64());
    debug!("First upstream chunk after {:?} ({} bytes)", started.elapsed(), first.len());

    Ok(RelayStream::new(first, body, cancel))
}

/// Extract error message from an upstream `{"error": {"message": ...}}` body
fn extract_error_message(response_text: &str) -> Option<String> {
    #[derive(serde::Deserialize)]
    struct ErrorResponse {
        error: Option<ErrorDetail>,
    }

    #[derive(serde::Deserialize)]
    struct ErrorDetail {
        message: Option<String>,
        code: Option<String>,
    }

    let error = serde_json::from_str::<ErrorResponse>(response_text).ok()?.error?;
    error.message.or(error.code).filter(|m| !m.is_empty())
}

/// Byte-for-byte relay of an upstream body.
///
/// Owns the request's cancellation token through a drop guard: when the
/// downstream body is dropped (client disconnect) the token is cancelled and
/// the upstream stream is dropped with it, closing the upstream connection.
/// Cancelling the token from outside (server shutdown) ends the stream at
/// the next poll.
#[pin_project(PinnedDrop)]
pub struct RelayStream<S> {
    first: Option<Bytes>,
    #[pin]
    upstream: S,
    #[pin]
    cancelled: WaitForCancellationFutureOwned,
    _guard: DropGuard,
    finished: bool,
    chunks: u64,
}

impl<S> RelayStream<S> {
    pub fn new(first: Bytes, upstream: S, cancel: CancellationToken) -> Self {
        metrics::stream_opened();
        Self {
            first: Some(first),
            upstream,
            cancelled: cancel.clone().cancelled_owned(),
            _guard: cancel.drop_guard(),
            finished: false,
            chunks: 0,
        }
    }
}

impl<S> Stream for RelayStream<S>
where
    S: Stream<Item = reqwest::Result<Bytes>>,
{
    type Item = Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        if *this.finished {
            return Poll::Ready(None);
        }

        if this.cancelled.poll(cx).is_ready() {
            debug!("Relay cancelled after {} chunks", this.chunks);
            *this.finished = true;
            return Poll::Ready(None);
        }

        if let Some(first) = this.first.take() {
            *this.chunks += 1;
            metrics::record_chunk(first.len());
            return Poll::Ready(Some(Ok(first)));
        }

        match this.upstream.poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                *this.chunks += 1;
                metrics::record_chunk(chunk.len());
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(e))) => {
                // Headers are already sent; the only signal left is to abort the body
                warn!("Upstream stream failed after {} chunks: {}", this.chunks, e);
                *this.finished = true;
                Poll::Ready(Some(Err(RelayError::UpstreamTransport(e.to_string()))))
            }
            Poll::Ready(None) => {
                debug!("Upstream stream completed after {} chunks", this.chunks);
                *this.finished = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

#[pinned_drop]
impl<S> PinnedDrop for RelayStream<S> {
    fn drop(self: Pin<&mut Self>) {
        if !self.finished {
            debug!("Client went away mid-stream; closing upstream connection");
        }
        metrics::stream_closed();
    }
}
