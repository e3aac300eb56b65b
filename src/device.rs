//! Device identity reported to the market.

use std::fmt;

use crate::error::{Error, Result};

/// The device id sent with every market request, as lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity(String);

impl DeviceIdentity {
    /// Builds the identity from the platform's decimal android id.
    ///
    /// Negative ids are rendered as their two's-complement 64-bit value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeviceIdUnavailable`] if `android_id` is empty or not
    /// a signed 64-bit decimal number.
    #[allow(clippy::cast_sign_loss)]
    pub fn from_android_id(android_id: &str) -> Result<Self> {
        let id: i64 = android_id
            .trim()
            .parse()
            .map_err(|_| Error::DeviceIdUnavailable)?;
        Ok(Self(format!("{:x}", id as u64)))
    }

    /// Returns the hex id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
