//! Shared types: [`ByteOrder`], [`EncodingFormat`], [`SampleType`], and
//! byte order primitives.

use std::fmt;

use crate::{MseedError, Result};

/// Byte order for multi-byte fields in a Mini-SEED record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ByteOrder {
    Big,
    Little,
}

impl ByteOrder {
    /// Byte order of the running host, probed at runtime.
    pub fn host() -> Self {
        if is_big_endian_host() {
            Self::Big
        } else {
            Self::Little
        }
    }

    /// Convert a SEED byte order flag (0 = little, 1 = big).
    pub fn from_flag(flag: u8) -> Result<Self> {
        match flag {
            0 => Ok(Self::Little),
            1 => Ok(Self::Big),
            other => Err(MseedError::InvalidConfig(format!(
                "byte order flag must be 0 or 1, got {other}"
            ))),
        }
    }

    /// The SEED byte order flag for Blockette 1000.
    pub fn to_flag(self) -> u8 {
        match self {
            Self::Little => 0,
            Self::Big => 1,
        }
    }

    pub(crate) fn read_u16(self, data: &[u8], offset: usize) -> u16 {
        let bytes = [data[offset], data[offset + 1]];
        match self {
            Self::Big => u16::from_be_bytes(bytes),
            Self::Little => u16::from_le_bytes(bytes),
        }
    }

    pub(crate) fn read_i16(self, data: &[u8], offset: usize) -> i16 {
        self.read_u16(data, offset) as i16
    }

    pub(crate) fn read_u32(self, data: &[u8], offset: usize) -> u32 {
        let bytes = [
            data[offset],
            data[offset + 1],
            data[offset + 2],
            data[offset + 3],
        ];
        match self {
            Self::Big => u32::from_be_bytes(bytes),
            Self::Little => u32::from_le_bytes(bytes),
        }
    }

    pub(crate) fn read_i32(self, data: &[u8], offset: usize) -> i32 {
        self.read_u32(data, offset) as i32
    }

    pub(crate) fn read_f32(self, data: &[u8], offset: usize) -> f32 {
        f32::from_bits(self.read_u32(data, offset))
    }

    pub(crate) fn read_f64(self, data: &[u8], offset: usize) -> f64 {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&data[offset..offset + 8]);
        match self {
            Self::Big => f64::from_be_bytes(bytes),
            Self::Little => f64::from_le_bytes(bytes),
        }
    }

    pub(crate) fn write_u16(self, buf: &mut [u8], offset: usize, value: u16) {
        let bytes = match self {
            Self::Big => value.to_be_bytes(),
            Self::Little => value.to_le_bytes(),
        };
        buf[offset..offset + 2].copy_from_slice(&bytes);
    }

    pub(crate) fn write_i16(self, buf: &mut [u8], offset: usize, value: i16) {
        self.write_u16(buf, offset, value as u16);
    }

    pub(crate) fn write_u32(self, buf: &mut [u8], offset: usize, value: u32) {
        let bytes = match self {
            Self::Big => value.to_be_bytes(),
            Self::Little => value.to_le_bytes(),
        };
        buf[offset..offset + 4].copy_from_slice(&bytes);
    }

    pub(crate) fn write_i32(self, buf: &mut [u8], offset: usize, value: i32) {
        self.write_u32(buf, offset, value as u32);
    }

    pub(crate) fn write_f32(self, buf: &mut [u8], offset: usize, value: f32) {
        self.write_u32(buf, offset, value.to_bits());
    }

    pub(crate) fn write_f64(self, buf: &mut [u8], offset: usize, value: f64) {
        let bytes = match self {
            Self::Big => value.to_be_bytes(),
            Self::Little => value.to_le_bytes(),
        };
        buf[offset..offset + 8].copy_from_slice(&bytes);
    }
}

impl fmt::Display for ByteOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Big => write!(f, "Big endian"),
            Self::Little => write!(f, "Little endian"),
        }
    }
}

/// Runtime probe of the host byte order.
pub fn is_big_endian_host() -> bool {
    let probe: u16 = 0x0102;
    probe.to_ne_bytes()[0] == 0x01
}

/// Reverse the byte order of every `width`-byte quantity in `buf`.
///
/// Supported widths are 2, 4 and 8; anything else leaves the buffer
/// untouched. A trailing partial quantity is not modified.
pub fn swap_in_place(buf: &mut [u8], width: usize) {
    if !matches!(width, 2 | 4 | 8) {
        return;
    }
    for chunk in buf.chunks_exact_mut(width) {
        chunk.reverse();
    }
}

/// Encoding format for sample data in a Mini-SEED v2 record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EncodingFormat {
    /// ASCII text (code 0).
    Ascii,
    /// 16-bit signed integer (code 1).
    Int16,
    /// 32-bit signed integer (code 3).
    Int32,
    /// 32-bit IEEE float (code 4).
    Float32,
    /// 64-bit IEEE double (code 5).
    Float64,
    /// Steim-1 compressed integers (code 10).
    Steim1,
    /// Steim-2 compressed integers (code 11).
    Steim2,
}

impl EncodingFormat {
    /// Convert a raw encoding code (from Blockette 1000) to an `EncodingFormat`.
    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            0 => Ok(Self::Ascii),
            1 => Ok(Self::Int16),
            3 => Ok(Self::Int32),
            4 => Ok(Self::Float32),
            5 => Ok(Self::Float64),
            10 => Ok(Self::Steim1),
            11 => Ok(Self::Steim2),
            _ => Err(MseedError::UnsupportedEncoding(code)),
        }
    }

    /// Convert to the raw encoding code for Blockette 1000.
    pub fn to_code(self) -> u8 {
        match self {
            Self::Ascii => 0,
            Self::Int16 => 1,
            Self::Int32 => 3,
            Self::Float32 => 4,
            Self::Float64 => 5,
            Self::Steim1 => 10,
            Self::Steim2 => 11,
        }
    }

    /// The sample type this encoding decodes to and packs from.
    pub fn sample_type(self) -> SampleType {
        match self {
            Self::Ascii => SampleType::Ascii,
            Self::Int16 | Self::Int32 | Self::Steim1 | Self::Steim2 => SampleType::Int,
            Self::Float32 => SampleType::Float,
            Self::Float64 => SampleType::Double,
        }
    }

    pub fn is_steim(self) -> bool {
        matches!(self, Self::Steim1 | Self::Steim2)
    }

    /// Long description used by the record printer.
    pub fn description(self) -> &'static str {
        match self {
            Self::Ascii => "ASCII text",
            Self::Int16 => "16 bit integers",
            Self::Int32 => "32 bit integers",
            Self::Float32 => "IEEE 32 bit floats",
            Self::Float64 => "IEEE 64 bit floats",
            Self::Steim1 => "STEIM 1 Compression",
            Self::Steim2 => "STEIM 2 Compression",
        }
    }
}

/// Describe any raw encoding code, including the SEED codes this crate
/// does not decode.
pub fn encoding_description(code: u8) -> &'static str {
    if let Ok(enc) = EncodingFormat::from_code(code) {
        return enc.description();
    }
    match code {
        2 => "24 bit integers",
        12 => "GEOSCOPE Muxed 24 bit int",
        13 => "GEOSCOPE Muxed 16/3 bit gain/exp",
        14 => "GEOSCOPE Muxed 16/4 bit gain/exp",
        15 => "US National Network compression",
        16 => "CDSN 16 bit gain ranged",
        17 => "Graefenberg 16 bit gain ranged",
        18 => "IPG - Strasbourg 16 bit gain",
        19 => "STEIM 3 Compression",
        30 => "SRO Gain Ranged Format",
        31 => "HGLP Format",
        32 => "DWWSSN Format",
        33 => "RSTN 16 bit gain ranged",
        _ => "Unknown format code",
    }
}

impl fmt::Display for EncodingFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ascii => write!(f, "ASCII"),
            Self::Int16 => write!(f, "INT16"),
            Self::Int32 => write!(f, "INT32"),
            Self::Float32 => write!(f, "FLOAT32"),
            Self::Float64 => write!(f, "FLOAT64"),
            Self::Steim1 => write!(f, "Steim1"),
            Self::Steim2 => write!(f, "Steim2"),
        }
    }
}

/// Type tag of a decoded sample buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleType {
    /// ASCII bytes (`'a'`).
    Ascii,
    /// 32-bit integers (`'i'`).
    Int,
    /// 32-bit floats (`'f'`).
    Float,
    /// 64-bit floats (`'d'`).
    Double,
}

impl SampleType {
    /// Single character code: `a`, `i`, `f` or `d`.
    pub fn code(self) -> char {
        match self {
            Self::Ascii => 'a',
            Self::Int => 'i',
            Self::Float => 'f',
            Self::Double => 'd',
        }
    }

    /// Size of one sample in bytes.
    pub fn size(self) -> usize {
        match self {
            Self::Ascii => 1,
            Self::Int | Self::Float => 4,
            Self::Double => 8,
        }
    }
}

impl fmt::Display for SampleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// True for the SEED data quality indicators `D`, `R`, `Q` and `M`.
pub fn is_data_indicator(c: u8) -> bool {
    matches!(c, b'D' | b'R' | b'Q' | b'M')
}
