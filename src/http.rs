//! Shared HTTP client setup and status handling.

use std::time::Duration;

use reqwest::redirect::Policy;

use crate::error::{Error, Result};

/// Builds the HTTP client used by every stage.
///
/// Redirects are never followed automatically: the download stage has to
/// see the `302` and its `Location` itself.
///
/// # Errors
///
/// Returns an error if the TLS backend cannot be initialised.
pub fn build_client(user_agent: &str) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(user_agent)
        .redirect(Policy::none())
        .connect_timeout(Duration::from_secs(30))
        .tcp_keepalive(Duration::from_secs(30))
        .pool_max_idle_per_host(0)
        .build()
}

/// Passes `response` through unless its status is 400 or above, in which
/// case the body is read and returned inside [`Error::Http`].
pub(crate) async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.as_u16() < 400 {
        return Ok(response);
    }
    log::warn!("{} answered {status}", response.url());
    let body = match response.text().await {
        Ok(body) => body,
        Err(e) => {
            log::debug!("Could not read error body: {e}");
            String::new()
        }
    };
    Err(Error::Http {
        status: status.as_u16(),
        body,
    })
}
