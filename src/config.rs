//! Explicit unpack and pack overrides.
//!
//! Nothing here is read implicitly. [`UnpackConfig::from_env`] and
//! [`PackConfig::from_env`] consult the process environment only when
//! called; [`UnpackConfig::from_lookup`] takes any key lookup so callers
//! can feed values from their own configuration source.

use crate::types::{ByteOrder, EncodingFormat};
use crate::{MseedError, Result};

/// Highest encoding code defined by SEED.
pub const MAX_ENCODING_CODE: u8 = 33;

pub const ENV_UNPACK_HEADER_BYTEORDER: &str = "UNPACK_HEADER_BYTEORDER";
pub const ENV_UNPACK_DATA_BYTEORDER: &str = "UNPACK_DATA_BYTEORDER";
pub const ENV_UNPACK_DATA_FORMAT: &str = "UNPACK_DATA_FORMAT";
pub const ENV_UNPACK_DATA_FORMAT_FALLBACK: &str = "UNPACK_DATA_FORMAT_FALLBACK";
pub const ENV_PACK_HEADER_BYTEORDER: &str = "PACK_HEADER_BYTEORDER";
pub const ENV_PACK_DATA_BYTEORDER: &str = "PACK_DATA_BYTEORDER";

/// Overrides applied while unpacking records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnpackConfig {
    /// Force the fixed header byte order instead of inferring it.
    pub header_byte_order: Option<ByteOrder>,
    /// Force the data payload byte order.
    pub data_byte_order: Option<ByteOrder>,
    /// Force the encoding code, ignoring Blockette 1000.
    pub encoding: Option<u8>,
    /// Encoding code used when a record has no Blockette 1000.
    pub fallback_encoding: u8,
}

impl Default for UnpackConfig {
    fn default() -> Self {
        Self {
            header_byte_order: None,
            data_byte_order: None,
            encoding: None,
            fallback_encoding: EncodingFormat::Steim1.to_code(),
        }
    }
}

impl UnpackConfig {
    /// Create a configuration with no overrides and a Steim1 fallback.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_header_byte_order(mut self, order: ByteOrder) -> Self {
        self.header_byte_order = Some(order);
        self
    }

    pub fn with_data_byte_order(mut self, order: ByteOrder) -> Self {
        self.data_byte_order = Some(order);
        self
    }

    /// Force every record to be decoded with `code`.
    pub fn with_encoding(mut self, code: u8) -> Self {
        self.encoding = Some(code);
        self
    }

    pub fn with_fallback_encoding(mut self, code: u8) -> Self {
        self.fallback_encoding = code;
        self
    }

    /// Reject encoding codes outside the SEED range.
    pub fn validate(&self) -> Result<()> {
        if let Some(code) = self.encoding {
            check_encoding(ENV_UNPACK_DATA_FORMAT, code)?;
        }
        check_encoding(ENV_UNPACK_DATA_FORMAT_FALLBACK, self.fallback_encoding)
    }

    /// Build from a key lookup using the `UNPACK_*` names. Missing keys
    /// keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(v) = lookup(ENV_UNPACK_HEADER_BYTEORDER) {
            config.header_byte_order = Some(parse_byte_order(ENV_UNPACK_HEADER_BYTEORDER, &v)?);
        }
        if let Some(v) = lookup(ENV_UNPACK_DATA_BYTEORDER) {
            config.data_byte_order = Some(parse_byte_order(ENV_UNPACK_DATA_BYTEORDER, &v)?);
        }
        if let Some(v) = lookup(ENV_UNPACK_DATA_FORMAT) {
            config.encoding = Some(parse_code(ENV_UNPACK_DATA_FORMAT, &v)?);
        }
        if let Some(v) = lookup(ENV_UNPACK_DATA_FORMAT_FALLBACK) {
            config.fallback_encoding = parse_code(ENV_UNPACK_DATA_FORMAT_FALLBACK, &v)?;
        }
        config.validate()?;
        Ok(config)
    }

    /// Build from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }
}

/// Overrides applied while packing records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PackConfig {
    /// Byte order of the fixed header and blockettes.
    pub header_byte_order: Option<ByteOrder>,
    /// Byte order of the data payload.
    pub data_byte_order: Option<ByteOrder>,
}

impl PackConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_header_byte_order(mut self, order: ByteOrder) -> Self {
        self.header_byte_order = Some(order);
        self
    }

    pub fn with_data_byte_order(mut self, order: ByteOrder) -> Self {
        self.data_byte_order = Some(order);
        self
    }

    /// Build from a key lookup using the `PACK_*` names.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(v) = lookup(ENV_PACK_HEADER_BYTEORDER) {
            config.header_byte_order = Some(parse_byte_order(ENV_PACK_HEADER_BYTEORDER, &v)?);
        }
        if let Some(v) = lookup(ENV_PACK_DATA_BYTEORDER) {
            config.data_byte_order = Some(parse_byte_order(ENV_PACK_DATA_BYTEORDER, &v)?);
        }
        Ok(config)
    }

    /// Build from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }
}

fn parse_code(key: &str, value: &str) -> Result<u8> {
    value
        .trim()
        .parse::<u8>()
        .map_err(|_| MseedError::InvalidConfig(format!("{key}: '{value}' is not an encoding code")))
}

fn parse_byte_order(key: &str, value: &str) -> Result<ByteOrder> {
    let flag = value.trim().parse::<u8>().map_err(|_| {
        MseedError::InvalidConfig(format!("{key}: '{value}' is not a byte order flag"))
    })?;
    ByteOrder::from_flag(flag).map_err(|_| {
        MseedError::InvalidConfig(format!("{key}: byte order must be 0 or 1, got {flag}"))
    })
}

fn check_encoding(key: &str, code: u8) -> Result<()> {
    if code > MAX_ENCODING_CODE {
        return Err(MseedError::InvalidConfig(format!(
            "{key}: encoding code {code} outside 0..={MAX_ENCODING_CODE}"
        )));
    }
    Ok(())
}
