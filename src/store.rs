//! Market API request that resolves a package to a download URL.

use std::io::Read;
use std::sync::LazyLock;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use flate2::read::GzDecoder;
use regex::Regex;

use crate::config::DeviceProfile;
use crate::error::{Error, Result};
use crate::http::check_status;
use crate::request::MarketRequest;

const PROTOCOL_VERSION: u32 = 2;

// Host, optional port, then the path up to the first colon, whitespace or
// control byte of the surrounding binary framing.
static URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"https?://[^/:\s[:cntrl:]\x{FFFD}]+(?::\d+)?[^:\s[:cntrl:]\x{FFFD}]*")
        .expect("valid regex")
});

static MARKET_DA_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"MarketDA.*?(\d+)").expect("valid regex"));

/// Where and how to fetch a resolved package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTarget {
    /// Signed download URL.
    pub url: String,
    /// `MarketDA` session cookie value.
    pub market_da: String,
}

/// Pulls the download URL and `MarketDA` value out of a decoded response.
///
/// The response is a binary message; only these two strings are needed, so
/// it is searched as text instead of being decoded.
///
/// # Errors
///
/// Returns [`Error::MissingResponseField`] if either value is absent.
pub fn extract_target(response: &str) -> Result<DownloadTarget> {
    let url = URL_RE
        .find(response)
        .ok_or(Error::MissingResponseField("download URL"))?
        .as_str()
        .to_string();
    let market_da = MARKET_DA_RE
        .captures(response)
        .and_then(|c| c.get(1))
        .ok_or(Error::MissingResponseField("MarketDA"))?
        .as_str()
        .to_string();
    Ok(DownloadTarget { url, market_da })
}

/// Returns the form body carrying a serialized request.
#[must_use]
pub fn encode_form(request: &[u8]) -> String {
    format!(
        "version={PROTOCOL_VERSION}&request={}",
        URL_SAFE_NO_PAD.encode(request)
    )
}

fn gunzip(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoded = Vec::new();
    GzDecoder::new(data).read_to_end(&mut decoded)?;
    Ok(decoded)
}

/// Client for the market API.
#[derive(Debug, Clone)]
pub struct StoreClient {
    http: reqwest::Client,
    store_url: String,
    user_agent: String,
    profile: DeviceProfile,
}

impl StoreClient {
    /// Creates a client for `store_url` reporting `profile` as the device.
    #[must_use]
    pub fn new(
        http: reqwest::Client,
        store_url: impl Into<String>,
        user_agent: impl Into<String>,
        profile: DeviceProfile,
    ) -> Self {
        Self {
            http,
            store_url: store_url.into(),
            user_agent: user_agent.into(),
            profile,
        }
    }

    /// Resolves `package_name` to a download target.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingField`] for empty inputs, [`Error::Http`] for
    /// error statuses, an I/O error if the body is not gzip, and
    /// [`Error::MissingResponseField`] if the URL or session is absent.
    pub async fn resolve_download(
        &self,
        auth_token: &str,
        device_id: &str,
        package_name: &str,
    ) -> Result<DownloadTarget> {
        let request = MarketRequest {
            auth_token,
            device_id,
            package_name,
        }
        .encode(&self.profile)?;

        log::info!("Requesting download URL for {package_name}");
        let response = self
            .http
            .post(&self.store_url)
            .header(reqwest::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .header(reqwest::header::COOKIE, format!("ANDROIDSECURE={auth_token}"))
            .body(encode_form(&request))
            .send()
            .await?;
        let response = check_status(response).await?;
        let compressed = response.bytes().await?;

        let decoded = gunzip(&compressed)?;
        let target = extract_target(&String::from_utf8_lossy(&decoded))?;
        log::debug!("Resolved {package_name} to {}", target.url);
        Ok(target)
    }
}
