//! Account login against the ClientLogin endpoint.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::http::check_status;

const LOGIN_SERVICE: &str = "androidsecure";
const ACCOUNT_TYPE: &str = "HOSTED_OR_GOOGLE";

/// Account credentials, held only for the duration of a login call.
#[derive(Clone)]
pub struct Credentials {
    /// Account e-mail address.
    pub email: String,
    /// Account password.
    pub password: String,
}

impl Credentials {
    /// Creates credentials from an e-mail and password.
    #[must_use]
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Key/value pairs returned by a successful login.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthTokens(HashMap<String, String>);

impl AuthTokens {
    /// Parses newline-delimited `key=value` lines.
    ///
    /// Every line is kept; a later duplicate key replaces an earlier one.
    /// Lines are split on the first `=`, lines without one are ignored.
    #[must_use]
    pub fn parse(body: &str) -> Self {
        Self(
            body.lines()
                .filter_map(|line| line.split_once('='))
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect(),
        )
    }

    /// Returns the value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Returns the `Auth` token used by the market requests.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingResponseField`] if the login response had no
    /// `Auth` line.
    pub fn auth(&self) -> Result<&str> {
        self.get("Auth").ok_or(Error::MissingResponseField("Auth"))
    }

    /// Returns the number of parsed entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if no entries were parsed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Client for the account login exchange.
#[derive(Debug, Clone)]
pub struct AuthClient {
    http: reqwest::Client,
    login_url: String,
}

impl AuthClient {
    /// Creates a client posting to `login_url`.
    #[must_use]
    pub fn new(http: reqwest::Client, login_url: impl Into<String>) -> Self {
        Self {
            http,
            login_url: login_url.into(),
        }
    }

    /// Logs in and returns the parsed token map.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] with the server's error body for statuses
    /// of 400 and above, or [`Error::Request`] on transport failure.
    pub async fn login(&self, credentials: &Credentials) -> Result<AuthTokens> {
        log::info!("Logging in as {}", credentials.email);
        let form = [
            ("Email", credentials.email.as_str()),
            ("Passwd", credentials.password.as_str()),
            ("service", LOGIN_SERVICE),
            ("accountType", ACCOUNT_TYPE),
        ];

        let response = self.http.post(&self.login_url).form(&form).send().await?;
        let response = check_status(response).await?;
        let body = response.text().await?;

        let tokens = AuthTokens::parse(&body);
        log::debug!("Login returned {} field(s)", tokens.len());
        Ok(tokens)
    }
}
