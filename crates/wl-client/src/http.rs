//! HTTP plumbing shared by the API based adapters.

use std::fmt;
use std::time::Duration;

use reqwest::{RequestBuilder, Url};
use serde::Serialize;
use tracing::debug;

use crate::error::{ClientError, ConfigError};

/// Credentials attached to every request.
#[derive(Clone)]
pub enum Auth {
    /// Username and password based authentication.
    Basic { username: String, password: String },
    /// Token sent in a header, optionally prefixed by a scheme (`Bearer`).
    Token {
        header: String,
        scheme: Option<String>,
        token: String,
    },
}

impl fmt::Debug for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"[REDACTED]")
                .finish(),
            Self::Token { header, scheme, .. } => f
                .debug_struct("Token")
                .field("header", header)
                .field("scheme", scheme)
                .field("token", &"[REDACTED]")
                .finish(),
        }
    }
}

impl Auth {
    /// Creates basic auth. Both parts must be non-empty.
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Result<Self, ConfigError> {
        let username = username.into();
        let password = password.into();
        if username.trim().is_empty() || password.trim().is_empty() {
            return Err(ConfigError::InvalidAuth(
                "username and password cannot be empty",
            ));
        }
        Ok(Self::Basic { username, password })
    }

    /// Creates token auth. The header defaults to `Authorization`.
    pub fn token(
        header: Option<&str>,
        scheme: Option<&str>,
        token: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(ConfigError::InvalidAuth("token cannot be empty"));
        }
        Ok(Self::Token {
            header: header.unwrap_or("Authorization").to_string(),
            scheme: scheme.map(String::from),
            token,
        })
    }

    fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        match self {
            Self::Basic { username, password } => request.basic_auth(username, Some(password)),
            Self::Token {
                header,
                scheme,
                token,
            } => {
                let value = scheme
                    .as_ref()
                    .map_or_else(|| token.clone(), |scheme| format!("{scheme} {token}"));
                request.header(header.as_str(), value)
            }
        }
    }
}

/// A JSON API client bound to one base URL.
///
/// Cloning is cheap; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct HttpClient {
    http: reqwest::Client,
    base_url: Url,
    auth: Auth,
    headers: Vec<(String, String)>,
}

impl HttpClient {
    /// Creates a client for `base_url`. Every request times out after `timeout`.
    pub fn new(
        section: &'static str,
        base_url: &str,
        auth: Auth,
        timeout: Duration,
    ) -> Result<Self, ConfigError> {
        if base_url.trim().is_empty() {
            return Err(ConfigError::MissingOption {
                section,
                option: "url",
            });
        }
        let base_url = Url::parse(base_url).map_err(|err| ConfigError::InvalidUrl {
            section,
            url: base_url.to_string(),
            reason: err.to_string(),
        })?;

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ConfigError::ClientBuild)?;

        Ok(Self {
            http,
            base_url,
            auth,
            headers: Vec::new(),
        })
    }

    /// Adds a header sent with every request.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Resolves `path` against the base URL and appends query parameters.
    pub fn url(&self, path: &str, params: &[(&str, String)]) -> Result<Url, ClientError> {
        let mut url = self
            .base_url
            .join(path)
            .map_err(|err| ClientError::InvalidUrl(format!("{path}: {err}")))?;
        if !params.is_empty() {
            let mut query = url.query_pairs_mut();
            for (key, value) in params {
                query.append_pair(key, value);
            }
        }
        Ok(url)
    }

    /// Sends a GET request and returns the response body.
    pub async fn get(&self, url: Url) -> Result<String, ClientError> {
        self.send(self.http.get(url)).await
    }

    /// Sends a POST request with a JSON body and returns the response body.
    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        url: Url,
        body: &T,
    ) -> Result<String, ClientError> {
        self.send(self.http.post(url).json(body)).await
    }

    async fn send(&self, request: RequestBuilder) -> Result<String, ClientError> {
        let mut request = self.auth.apply(request);
        for (name, value) in &self.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        debug!(status = status.as_u16(), bytes = body.len(), "received response");

        if !status.is_success() {
            return Err(ClientError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }
}
