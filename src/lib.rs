//! A small Rust client for the EPO Bulk Data Distribution Service (BDDS) API.
//!
//! The service publishes datasets ("products"), each released periodically as
//! a "delivery" made of downloadable files. This crate lists products, walks
//! their deliveries and streams files to any [`std::io::Write`] sink.
//!
//! Every call goes through the same resilience layer:
//! - an OAuth2 password-grant token, cached and refreshed five minutes before
//!   it expires;
//! - bounded retries with linear back-off, re-authenticating after a 401;
//! - a per-call [`CallContext`] carrying a deadline and a cancellation token.
//!
//! ## Quick start
//! - Configure credentials via environment variables (`BDDS_USERNAME`,
//!   `BDDS_PASSWORD`) or a `.bddsrc` file in the current or home directory.
//!   Without credentials only free products are reachable.
//! - Look up a product, pick its latest delivery and download a file.
//!
//! ```no_run
//! use anyhow::Result;
//! use bdds::{CallContext, Client};
//! use std::time::Duration;
//!
//! fn main() -> Result<()> {
//!     let client = Client::from_env()?.with_progress(true);
//!     let ctx = CallContext::new().with_timeout(Duration::from_secs(600));
//!
//!     let product = client.find_product_by_name(&ctx, "EP DocDB front file")?;
//!     let delivery = client.get_latest_delivery(&ctx, product.id)?;
//!     if let Some(file) = delivery.files.first() {
//!         client.download_file_to_path(
//!             &ctx,
//!             product.id,
//!             delivery.id,
//!             file.id,
//!             std::path::Path::new(&file.name),
//!         )?;
//!     }
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]

mod auth;
mod client;
mod config;
mod context;
mod error;
mod progress;
mod retry;
mod token;
mod types;
mod util;

pub use auth::{Credentials, DEFAULT_AUTH_URL, DEFAULT_CLIENT_ID};
pub use client::{
    Client, ClientConfig, DEFAULT_BASE_URL, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY,
    DEFAULT_TIMEOUT,
};
pub use context::CallContext;
pub use error::{Error, ErrorKind, Result};
pub use progress::{ProgressReader, bar as progress_bar};
pub use tokio_util::sync::CancellationToken;
pub use types::{Delivery, DeliveryFile, Product, ProductWithDeliveries};
