//! Per-call deadline and cancellation.
//!
//! Every client operation takes a [`CallContext`]. It is consulted before each
//! attempt, while sleeping between attempts, when sizing the per-request timeout
//! and while a request or a download body is in flight.

use std::io::{self, Read};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use reqwest::StatusCode;
use reqwest::blocking::{RequestBuilder, Response};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Longest uninterrupted wait before the context is consulted again.
pub(crate) const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Read size of the body pump thread.
const BODY_CHUNK: usize = 64 * 1024;

/// Chunks buffered between the body pump and the reader.
const BODY_QUEUE: usize = 4;

#[derive(Debug, Clone)]
pub struct CallContext {
    deadline: Option<Instant>,
    cancel: CancellationToken,
}

impl Default for CallContext {
    fn default() -> Self {
        Self::new()
    }
}

impl CallContext {
    /// A context with no deadline that is never cancelled unless its token is.
    pub fn new() -> Self {
        Self {
            deadline: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        self
    }

    /// Ties this context to an externally owned token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Time left before the deadline, `None` when unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Fails when the call has been cancelled or has run past its deadline.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if self.is_expired() {
            return Err(Error::DeadlineExceeded);
        }
        Ok(())
    }

    /// Per-request timeout: the configured one, shortened to the deadline.
    ///
    /// The flag is true when the deadline is the binding limit.
    pub(crate) fn request_timeout(&self, configured: Duration) -> Result<(Duration, bool)> {
        self.check()?;
        Ok(match self.remaining() {
            Some(left) if left < configured => (left, true),
            _ => (configured, false),
        })
    }

    /// Sleeps for `duration`, waking early on cancellation.
    ///
    /// A deadline that lands inside the sleep fails immediately.
    pub(crate) fn sleep(&self, duration: Duration) -> Result<()> {
        self.check()?;
        let wake = Instant::now() + duration;
        if self.deadline.is_some_and(|d| d < wake) {
            return Err(Error::DeadlineExceeded);
        }
        loop {
            let now = Instant::now();
            if now >= wake {
                return Ok(());
            }
            thread::sleep((wake - now).min(SLEEP_SLICE));
            if self.is_cancelled() {
                return Err(Error::Cancelled);
            }
        }
    }

    /// Maps a send failure. A timeout imposed by the deadline, rather than by
    /// the configured request timeout, reports as [`Error::DeadlineExceeded`].
    pub(crate) fn classify_transport(&self, err: reqwest::Error, bounded: bool) -> Error {
        if self.is_cancelled() {
            Error::Cancelled
        } else if (bounded && err.is_timeout()) || self.is_expired() {
            Error::DeadlineExceeded
        } else {
            Error::Transport(err)
        }
    }

    /// Runs a blocking exchange on a helper thread and waits for it, giving up
    /// as soon as the call is cancelled or runs past its deadline.
    ///
    /// An abandoned exchange finishes in the background, bounded by its own
    /// request timeout, and its result is dropped. A result that arrives after
    /// cancellation is discarded too.
    pub(crate) fn run_interruptible<T, F>(&self, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        self.check()?;
        let (tx, rx) = mpsc::sync_channel(1);
        thread::Builder::new()
            .name("bdds-request".into())
            .spawn(move || {
                let _ = tx.send(work());
            })?;

        loop {
            match rx.recv_timeout(SLEEP_SLICE) {
                Ok(result) => {
                    if self.is_cancelled() {
                        return Err(Error::Cancelled);
                    }
                    return result;
                }
                Err(RecvTimeoutError::Timeout) => self.check()?,
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(Error::Io(io::Error::other(
                        "request worker stopped without a result",
                    )));
                }
            }
        }
    }

    /// Sends `req` and reads the whole response body as text, both interruptible.
    pub(crate) fn fetch_text(
        &self,
        req: RequestBuilder,
        bounded: bool,
    ) -> Result<(StatusCode, String)> {
        let worker = self.clone();
        self.run_interruptible(move || {
            let resp = req
                .send()
                .map_err(|e| worker.classify_transport(e, bounded))?;
            let status = resp.status();
            let body = resp
                .text()
                .map_err(|e| worker.classify_transport(e, bounded))?;
            Ok((status, body))
        })
    }

    /// Sends `req` without waiting for the body, interruptible.
    pub(crate) fn send(&self, req: RequestBuilder, bounded: bool) -> Result<Response> {
        let worker = self.clone();
        self.run_interruptible(move || {
            req.send()
                .map_err(|e| worker.classify_transport(e, bounded))
        })
    }

    /// Moves the reads of `body` onto a pump thread so that a stalled read
    /// cannot hold the caller past cancellation or the deadline.
    pub(crate) fn stream_body<R>(&self, body: R) -> Result<BodyReader>
    where
        R: Read + Send + 'static,
    {
        let (tx, rx) = mpsc::sync_channel(BODY_QUEUE);
        thread::Builder::new()
            .name("bdds-body".into())
            .spawn(move || pump(body, tx))?;
        Ok(BodyReader {
            rx,
            chunk: Vec::new(),
            pos: 0,
            done: false,
            ctx: self.clone(),
        })
    }

    pub(crate) fn check_io(&self) -> io::Result<()> {
        if self.is_cancelled() {
            return Err(io::Error::other("operation cancelled"));
        }
        if self.is_expired() {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "deadline exceeded"));
        }
        Ok(())
    }

    /// Maps an I/O failure on the download path, preferring the context's own
    /// verdict when it was cancelled or expired.
    pub(crate) fn classify_io(&self, err: io::Error) -> Error {
        if self.is_cancelled() {
            Error::Cancelled
        } else if self.is_expired() {
            Error::DeadlineExceeded
        } else {
            Error::Io(err)
        }
    }
}

fn pump<R: Read>(mut body: R, tx: mpsc::SyncSender<io::Result<Vec<u8>>>) {
    loop {
        let mut buf = vec![0u8; BODY_CHUNK];
        match body.read(&mut buf) {
            Ok(0) => {
                let _ = tx.send(Ok(Vec::new()));
                return;
            }
            Ok(n) => {
                buf.truncate(n);
                if tx.send(Ok(buf)).is_err() {
                    return;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                let _ = tx.send(Err(e));
                return;
            }
        }
    }
}

/// Reader side of [`CallContext::stream_body`]. An empty chunk marks the end
/// of the body.
pub(crate) struct BodyReader {
    rx: Receiver<io::Result<Vec<u8>>>,
    chunk: Vec<u8>,
    pos: usize,
    done: bool,
    ctx: CallContext,
}

impl Read for BodyReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.pos >= self.chunk.len() {
            if self.done {
                return Ok(0);
            }
            self.ctx.check_io()?;
            match self.rx.recv_timeout(SLEEP_SLICE) {
                Ok(Ok(chunk)) => {
                    self.done = chunk.is_empty();
                    self.chunk = chunk;
                    self.pos = 0;
                }
                Ok(Err(e)) => return Err(e),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "body reader stopped",
                    ));
                }
            }
        }
        let n = buf.len().min(self.chunk.len() - self.pos);
        buf[..n].copy_from_slice(&self.chunk[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}
