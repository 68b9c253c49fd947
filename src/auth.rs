//! OAuth2 password-grant exchange against the EPO identity endpoint.
//!
//! The identity provider issues bearer tokens valid for one hour. That lifetime
//! is a documented property of the service, so the `expires_in` field of the
//! response is not consulted.

use std::fmt;
use std::time::{Duration, Instant};

use reqwest::StatusCode;
use reqwest::blocking::Client as HttpClient;
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;
use tracing::{debug, info};

use crate::context::CallContext;
use crate::error::{Error, Result};
use crate::token::{AccessToken, TOKEN_TTL};

/// Token endpoint of the EPO login service.
pub const DEFAULT_AUTH_URL: &str = "https://login.epo.org/oauth2/aus3up3nz0N133c0V417/v1/token";

/// Public client identifier of the BDDS web application, already base64 encoded.
pub const DEFAULT_CLIENT_ID: &str = "MG9hM3VwZG43YW41cE1JOE80MTc=";

/// Username and password pair. Both are required; there is no half-configured
/// state.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Performs the password grant. Never retries on its own.
#[derive(Debug, Clone)]
pub(crate) struct Authenticator {
    http: HttpClient,
    url: String,
    client_id: String,
    credentials: Credentials,
    timeout: Duration,
}

impl Authenticator {
    pub(crate) fn new(
        http: HttpClient,
        url: impl Into<String>,
        client_id: impl Into<String>,
        credentials: Credentials,
        timeout: Duration,
    ) -> Self {
        Self {
            http,
            url: url.into(),
            client_id: client_id.into(),
            credentials,
            timeout,
        }
    }

    pub(crate) fn authenticate(&self, ctx: &CallContext) -> Result<AccessToken> {
        let (timeout, bounded) = ctx.request_timeout(self.timeout)?;
        debug!(username = %self.credentials.username, "requesting access token");

        let req = self
            .http
            .post(&self.url)
            .header(AUTHORIZATION, format!("Basic {}", self.client_id))
            .form(&[
                ("grant_type", "password"),
                ("username", self.credentials.username.as_str()),
                ("password", self.credentials.password.as_str()),
                ("scope", "openid"),
            ])
            .timeout(timeout);
        let (status, body) = ctx.fetch_text(req, bounded)?;
        if status != StatusCode::OK {
            return Err(Error::Authentication {
                status: status.as_u16(),
                body,
            });
        }

        let payload: TokenResponse = serde_json::from_str(&body)?;
        info!(username = %self.credentials.username, "authenticated");
        Ok(AccessToken::new(
            payload.access_token,
            Instant::now() + TOKEN_TTL,
        ))
    }
}
