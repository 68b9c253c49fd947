//! Byte-counting reader used on the download path.
//!
//! The callback runs inline on every read, so it must return quickly. Anything
//! heavier than bookkeeping (terminal redraws, logging) should throttle itself;
//! [`bar`] does this through `indicatif`'s own draw rate limit.

use std::io::{self, Read};

use indicatif::{ProgressBar, ProgressStyle};

use crate::context::CallContext;

/// Wraps a reader and reports `(bytes_read_so_far, total)` after each read.
///
/// `total` is `None` when the server did not advertise a length.
pub struct ProgressReader<R, F = fn(u64, Option<u64>)> {
    inner: R,
    read: u64,
    total: Option<u64>,
    callback: Option<F>,
    ctx: Option<CallContext>,
}

impl<R: Read> ProgressReader<R> {
    /// A counting reader with no observer.
    pub fn new(inner: R, total: Option<u64>) -> Self {
        Self {
            inner,
            read: 0,
            total,
            callback: None,
            ctx: None,
        }
    }
}

impl<R, F> ProgressReader<R, F>
where
    R: Read,
    F: FnMut(u64, Option<u64>),
{
    pub fn with_callback(inner: R, total: Option<u64>, callback: F) -> Self {
        Self {
            inner,
            read: 0,
            total,
            callback: Some(callback),
            ctx: None,
        }
    }

    /// Makes reads fail once `ctx` is cancelled or past its deadline.
    pub fn with_context(mut self, ctx: CallContext) -> Self {
        self.ctx = Some(ctx);
        self
    }

    /// Bytes read so far.
    pub fn bytes_read(&self) -> u64 {
        self.read
    }

    pub fn total(&self) -> Option<u64> {
        self.total
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R, F> Read for ProgressReader<R, F>
where
    R: Read,
    F: FnMut(u64, Option<u64>),
{
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if let Some(ctx) = &self.ctx {
            ctx.check_io()?;
        }
        let n = self.inner.read(buf)?;
        self.read += n as u64;
        if let Some(callback) = self.callback.as_mut() {
            callback(self.read, self.total);
        }
        Ok(n)
    }
}

/// A progress callback that renders an `indicatif` bar on stderr.
///
/// The bar is created on the first report, sized from the advertised total,
/// or as a byte spinner when the length is unknown.
pub fn bar() -> impl FnMut(u64, Option<u64>) {
    let mut pb: Option<ProgressBar> = None;
    move |read, total| {
        let pb = pb.get_or_insert_with(|| new_bar(total));
        pb.set_position(read);
        if total.is_some_and(|t| read >= t) && !pb.is_finished() {
            pb.finish_and_clear();
        }
    }
}

fn new_bar(total: Option<u64>) -> ProgressBar {
    match total {
        Some(total) => {
            let pb = ProgressBar::new(total);
            if let Ok(style) = ProgressStyle::with_template(
                "{spinner:.green} {bytes}/{total_bytes} ({bytes_per_sec}) {wide_bar} {eta}",
            ) {
                pb.set_style(style.progress_chars("=>-"));
            }
            pb
        }
        None => {
            let pb = ProgressBar::new_spinner();
            if let Ok(style) =
                ProgressStyle::with_template("{spinner:.green} {bytes} ({bytes_per_sec})")
            {
                pb.set_style(style);
            }
            pb
        }
    }
}
