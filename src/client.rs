use reqwest::StatusCode;
use reqwest::blocking::{Client as HttpClient, RequestBuilder};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::de::DeserializeOwned;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::auth::{Authenticator, Credentials, DEFAULT_AUTH_URL, DEFAULT_CLIENT_ID};
use crate::config::{Overrides, load_config};
use crate::context::CallContext;
use crate::error::{Error, Result};
use crate::progress::{self, ProgressReader};
use crate::retry::RetryPolicy;
use crate::token::TokenManager;
use crate::types::{Delivery, Product, ProductWithDeliveries};
use crate::util::{api_root, urljoin};

pub const DEFAULT_BASE_URL: &str = "https://publication-bdds.apps.epo.org";
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Service host, typically `https://publication-bdds.apps.epo.org`.
    pub base_url: String,
    pub user_agent: String,
    /// Without credentials every request is sent anonymously and only
    /// free-tier products are reachable.
    pub credentials: Option<Credentials>,
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Back-off unit: the wait before retry `n` (1-based) is `n * retry_delay`.
    pub retry_delay: Duration,
    /// Per-request timeout. It covers the whole exchange including the body,
    /// so raise it for large downloads.
    pub timeout: Duration,
    /// OAuth2 token endpoint.
    pub auth_url: String,
    /// Base64 client identifier sent as HTTP Basic credentials to `auth_url`.
    pub client_id: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            user_agent: format!("bdds-rs/{}", env!("CARGO_PKG_VERSION")),
            credentials: None,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            timeout: DEFAULT_TIMEOUT,
            auth_url: DEFAULT_AUTH_URL.to_string(),
            client_id: DEFAULT_CLIENT_ID.to_string(),
        }
    }
}

impl ClientConfig {
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.credentials = Some(Credentials::new(username, password));
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_auth_url(mut self, auth_url: impl Into<String>) -> Self {
        self.auth_url = auth_url.into();
        self
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }
}

#[derive(Debug)]
pub struct Client {
    config: ClientConfig,
    api_root: String,
    progress: bool,

    http: HttpClient,
    tokens: TokenManager,
    retry: RetryPolicy,
}

impl Client {
    /// Creates a client from environment variables and/or `.bddsrc`.
    ///
    /// This is equivalent to `Client::from_sources(None, None, None)`.
    pub fn from_env() -> Result<Self> {
        Self::from_sources(None, None, None)
    }

    /// Creates a client using (in order of precedence):
    /// - explicit `url`/`username`/`password` arguments
    /// - environment variables `BDDS_URL` / `BDDS_USERNAME` / `BDDS_PASSWORD`
    /// - config file from `BDDS_RC` or `.bddsrc`
    pub fn from_sources(
        url: Option<String>,
        username: Option<String>,
        password: Option<String>,
    ) -> Result<Self> {
        let cfg = load_config(Overrides {
            url,
            username,
            password,
        })?;
        Self::new(cfg)
    }

    pub fn new(config: ClientConfig) -> Result<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent).map_err(|_| {
                Error::Config(format!("invalid user agent {:?}", config.user_agent))
            })?,
        );

        let http = HttpClient::builder()
            .default_headers(default_headers)
            .timeout(config.timeout)
            .build()?;

        let authenticator = config.credentials.clone().map(|credentials| {
            Authenticator::new(
                http.clone(),
                config.auth_url.clone(),
                config.client_id.clone(),
                credentials,
                config.timeout,
            )
        });

        Ok(Self {
            api_root: api_root(&config.base_url),
            progress: false,
            tokens: TokenManager::new(authenticator),
            retry: RetryPolicy::new(config.max_retries, config.retry_delay),
            http,
            config,
        })
    }

    /// Show an `indicatif` progress bar in [`Client::download_file_to_path`].
    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// True when credentials are configured. Says nothing about whether a
    /// token has been obtained yet.
    pub fn has_credentials(&self) -> bool {
        self.config.credentials.is_some()
    }

    /// Lists every product visible to the configured account.
    pub fn list_products(&self, ctx: &CallContext) -> Result<Vec<Product>> {
        let url = self.endpoint("products/");
        let products: Vec<Product> = self
            .retry
            .run(ctx, &self.tokens, |token| self.api_json(ctx, &url, token, None))?;
        debug!(count = products.len(), "listed products");
        Ok(products)
    }

    /// Fetches a product with its deliveries and their files.
    pub fn get_product(&self, ctx: &CallContext, product_id: i64) -> Result<ProductWithDeliveries> {
        let url = self.endpoint(&format!("products/{}", product_id));
        let id = product_id.to_string();
        self.retry.run(ctx, &self.tokens, |token| {
            self.api_json(ctx, &url, token, Some(("product", id.as_str())))
        })
    }

    /// Finds a product by name, ignoring case. Partial names do not match.
    pub fn find_product_by_name(&self, ctx: &CallContext, name: &str) -> Result<Product> {
        let wanted = name.to_lowercase();
        self.list_products(ctx)?
            .into_iter()
            .find(|p| p.name.to_lowercase() == wanted)
            .ok_or_else(|| Error::NotFound {
                resource: "product",
                id: name.to_string(),
            })
    }

    /// Returns the most recently published delivery of a product.
    pub fn get_latest_delivery(&self, ctx: &CallContext, product_id: i64) -> Result<Delivery> {
        let product = self.get_product(ctx, product_id)?;
        product
            .latest_delivery()
            .cloned()
            .ok_or_else(|| Error::NotFound {
                resource: "delivery",
                id: format!("product {} has no deliveries", product_id),
            })
    }

    /// Streams a file into `dst`, returning the number of bytes written.
    ///
    /// A failed attempt may already have written part of the body to `dst`
    /// before the retry starts over; use [`Client::download_file_to_path`]
    /// when that matters.
    pub fn download_file<W>(
        &self,
        ctx: &CallContext,
        product_id: i64,
        delivery_id: i64,
        file_id: i64,
        dst: &mut W,
    ) -> Result<u64>
    where
        W: Write + ?Sized,
    {
        self.download_file_with_progress(ctx, product_id, delivery_id, file_id, dst, |_, _| {})
    }

    /// Like [`Client::download_file`], calling `progress(bytes_so_far, total)`
    /// after every read. `total` is `None` when the server sends no length.
    ///
    /// The callback runs on the read path and must not block.
    pub fn download_file_with_progress<W, F>(
        &self,
        ctx: &CallContext,
        product_id: i64,
        delivery_id: i64,
        file_id: i64,
        dst: &mut W,
        mut progress: F,
    ) -> Result<u64>
    where
        W: Write + ?Sized,
        F: FnMut(u64, Option<u64>),
    {
        let (url, id) = self.download_target(product_id, delivery_id, file_id);
        self.retry.run(ctx, &self.tokens, |token| {
            self.download_attempt(ctx, &url, token, &id, &mut *dst, &mut progress)
        })
    }

    /// Downloads a file to `target`, creating parent directories.
    ///
    /// The file is truncated at the start of every attempt, so a retried
    /// download never leaves a mix of partial bodies behind.
    pub fn download_file_to_path(
        &self,
        ctx: &CallContext,
        product_id: i64,
        delivery_id: i64,
        file_id: i64,
        target: &Path,
    ) -> Result<PathBuf> {
        if let Some(parent) = target.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let (url, id) = self.download_target(product_id, delivery_id, file_id);
        let mut observer: Box<dyn FnMut(u64, Option<u64>)> = if self.progress {
            Box::new(progress::bar())
        } else {
            Box::new(|_, _| {})
        };

        let written = self.retry.run(ctx, &self.tokens, |token| {
            let mut out = File::create(target)?;
            let n = self.download_attempt(ctx, &url, token, &id, &mut out, &mut observer)?;
            out.flush()?;
            Ok(n)
        })?;
        debug!(bytes = written, path = %target.display(), "download saved");
        Ok(target.to_path_buf())
    }

    fn download_target(&self, product_id: i64, delivery_id: i64, file_id: i64) -> (String, String) {
        let url = self.endpoint(&format!(
            "products/{}/delivery/{}/file/{}/download",
            product_id, delivery_id, file_id
        ));
        (url, format!("{}/{}/{}", product_id, delivery_id, file_id))
    }

    fn download_attempt<W, F>(
        &self,
        ctx: &CallContext,
        url: &str,
        token: Option<&str>,
        id: &str,
        dst: &mut W,
        progress: &mut F,
    ) -> Result<u64>
    where
        W: Write + ?Sized,
        F: FnMut(u64, Option<u64>) + ?Sized,
    {
        let (req, bounded) = self.request(ctx, url, token)?;
        let resp = ctx.send(req, bounded)?;
        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Err(Error::NotFound {
                resource: "file",
                id: id.to_string(),
            });
        }
        if !status.is_success() {
            let body = ctx.run_interruptible(move || Ok(resp.text().unwrap_or_default()))?;
            return Err(status_error(status, body));
        }

        let total = resp.content_length();
        let body = ctx.stream_body(resp)?;
        let mut reader =
            ProgressReader::with_callback(body, total, |read: u64, total: Option<u64>| {
                progress(read, total)
            })
            .with_context(ctx.clone());
        let written = io::copy(&mut reader, dst).map_err(|e| ctx.classify_io(e))?;
        debug!(file = id, bytes = written, "download finished");
        Ok(written)
    }

    fn endpoint(&self, path: &str) -> String {
        urljoin(&self.api_root, path)
    }

    /// Builds a decorated GET: user agent from the default headers, bearer
    /// token when one is in use, timeout capped by the deadline.
    fn request(
        &self,
        ctx: &CallContext,
        url: &str,
        token: Option<&str>,
    ) -> Result<(RequestBuilder, bool)> {
        let (timeout, bounded) = ctx.request_timeout(self.config.timeout)?;
        let mut req = self.http.get(url).timeout(timeout);
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        Ok((req, bounded))
    }

    fn api_json<T: DeserializeOwned>(
        &self,
        ctx: &CallContext,
        url: &str,
        token: Option<&str>,
        not_found: Option<(&'static str, &str)>,
    ) -> Result<T> {
        let (req, bounded) = self.request(ctx, url, token)?;
        let (status, text) = ctx.fetch_text(req, bounded)?;

        if status == StatusCode::NOT_FOUND {
            if let Some((resource, id)) = not_found {
                return Err(Error::NotFound {
                    resource,
                    id: id.to_string(),
                });
            }
        }
        if !status.is_success() {
            return Err(status_error(status, text));
        }

        let empty = || Error::EmptyResponse {
            url: url.to_string(),
        };
        if text.trim().is_empty() {
            return Err(empty());
        }
        serde_json::from_str::<Option<T>>(&text)?.ok_or_else(empty)
    }
}

/// Maps a non-success response. A 401 becomes an authentication error so the
/// retry loop can refresh the token.
fn status_error(status: StatusCode, body: String) -> Error {
    if status == StatusCode::UNAUTHORIZED {
        return Error::Authentication {
            status: status.as_u16(),
            body,
        };
    }
    Error::Status {
        status: status.as_u16(),
        body,
    }
}

#[cfg(test)]
mod tests;
