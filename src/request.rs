//! Binary market request construction.
//!
//! The request is a fixed-shape message: a length-delimited context block
//! (field 1) followed by a group (field 2) holding a single package request.
//! Field keys are written as raw tag bytes.

use crate::config::DeviceProfile;
use crate::error::{Error, Result};
use crate::wire::{varint_len, write_bytes, write_varint};

const TAG_CONTEXT: u8 = 10;
const TAG_AUTH: u8 = 10;
const TAG_SECURE: u8 = 16;
const TAG_VERSION: u8 = 24;
const TAG_DEVICE_ID: u8 = 34;
const TAG_DEVICE_MODEL: u8 = 42;
const TAG_LANGUAGE: u8 = 50;
const TAG_COUNTRY: u8 = 58;
const TAG_OPERATOR: u8 = 66;
const TAG_SIM_OPERATOR: u8 = 74;
const TAG_OPERATOR_NUMERIC: u8 = 82;
const TAG_SIM_OPERATOR_NUMERIC: u8 = 90;
const TAG_GROUP_START: u8 = 19;
const TAG_GROUP_END: u8 = 20;
const TAG_INSTALL_REQUEST: u8 = 82;
const TAG_PACKAGE: u8 = 10;

/// Inputs of a single market request.
#[derive(Debug, Clone, Copy)]
pub struct MarketRequest<'a> {
    /// `Auth` value from the login response.
    pub auth_token: &'a str,
    /// Hex device id.
    pub device_id: &'a str,
    /// Package to resolve.
    pub package_name: &'a str,
}

impl MarketRequest<'_> {
    /// Serializes the request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingField`] if any input is empty, or
    /// [`Error::FieldTooLarge`] if a field cannot be length-prefixed.
    pub fn encode(&self, profile: &DeviceProfile) -> Result<Vec<u8>> {
        self.validate()?;

        let mut body = self.context(profile)?;
        let base_len = base_len(body.len());
        self.append_package_group(&mut body)?;

        let context_len = to_u32(base_len + 2)?;
        let mut request = Vec::with_capacity(1 + varint_len(context_len) + body.len());
        request.push(TAG_CONTEXT);
        write_varint(&mut request, context_len);
        request.extend_from_slice(&body);
        log::debug!("Built market request: {} bytes", request.len());
        Ok(request)
    }

    fn validate(&self) -> Result<()> {
        if self.auth_token.is_empty() {
            return Err(Error::MissingField("auth token"));
        }
        if self.device_id.is_empty() {
            return Err(Error::MissingField("device id"));
        }
        if self.package_name.is_empty() {
            return Err(Error::MissingField("package name"));
        }
        Ok(())
    }

    fn context(&self, profile: &DeviceProfile) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(128);
        buf.push(TAG_AUTH);
        write_bytes(&mut buf, self.auth_token.as_bytes())?;
        buf.push(TAG_SECURE);
        buf.push(1);
        buf.push(TAG_VERSION);
        write_varint(&mut buf, profile.client_version);
        buf.push(TAG_DEVICE_ID);
        write_bytes(&mut buf, self.device_id.as_bytes())?;

        for (tag, value) in [
            (TAG_DEVICE_MODEL, &profile.device_model),
            (TAG_LANGUAGE, &profile.language),
            (TAG_COUNTRY, &profile.country),
            (TAG_OPERATOR, &profile.operator_name),
            (TAG_SIM_OPERATOR, &profile.sim_operator_name),
            (TAG_OPERATOR_NUMERIC, &profile.operator_numeric),
            (TAG_SIM_OPERATOR_NUMERIC, &profile.sim_operator_numeric),
        ] {
            buf.push(tag);
            write_bytes(&mut buf, value.as_bytes())?;
        }
        Ok(buf)
    }

    fn append_package_group(&self, buf: &mut Vec<u8>) -> Result<()> {
        let package = self.package_name.as_bytes();
        let package_len = to_u32(package.len())?;
        let inner_len = to_u32(1 + varint_len(package_len) + package.len())?;

        buf.push(TAG_GROUP_START);
        buf.push(TAG_INSTALL_REQUEST);
        write_varint(buf, inner_len);
        buf.push(TAG_PACKAGE);
        write_bytes(buf, package)?;
        buf.push(TAG_GROUP_END);
        Ok(())
    }
}

/// Context length as the wire format records it: the body size plus one,
/// less the three bytes of the outer tag and a two-byte length.
///
/// The outer length written is `base_len + 2`, i.e. the body size itself.
/// Bodies shorter than two bytes give zero.
#[must_use]
pub const fn base_len(body_len: usize) -> usize {
    body_len.saturating_sub(2)
}

fn to_u32(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| Error::FieldTooLarge { len })
}
