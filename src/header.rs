//! The 48-byte fixed section of data header (FSDH).

use crate::time::BTime;
use crate::types::{ByteOrder, is_data_indicator};
use crate::{MseedError, Result};

/// Size of the fixed header in bytes.
pub const FIXED_HEADER_SIZE: usize = 48;

/// Smallest record length accepted by the unpacker and packer.
pub const MIN_RECORD_LENGTH: usize = 256;

/// Largest record length accepted by the unpacker and packer.
pub const MAX_RECORD_LENGTH: usize = 1_048_576;

/// Activity flag bit: time correction already applied to the start time.
pub const ACT_TIME_CORRECTION_APPLIED: u8 = 0x02;

/// Fixed header fields as stored in the record.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FixedHeader {
    pub sequence_number: u32,
    pub quality: u8,
    pub reserved: u8,
    pub station: String,
    pub location: String,
    pub channel: String,
    pub network: String,
    pub start_time: BTime,
    pub num_samples: u16,
    pub samprate_factor: i16,
    pub samprate_multiplier: i16,
    pub activity_flags: u8,
    pub io_flags: u8,
    pub dq_flags: u8,
    pub num_blockettes: u8,
    /// Time correction in 0.0001 second units.
    pub time_correction: i32,
    pub data_offset: u16,
    pub blockette_offset: u16,
}

impl FixedHeader {
    /// Parse the fixed header from the start of `data`.
    ///
    /// Rejects buffers shorter than 48 bytes and headers whose quality
    /// byte is not a data indicator.
    pub fn parse(data: &[u8], order: ByteOrder) -> Result<Self> {
        if data.len() < FIXED_HEADER_SIZE {
            return Err(MseedError::RecordTooShort {
                expected: FIXED_HEADER_SIZE,
                actual: data.len(),
            });
        }
        if !is_data_indicator(data[6]) {
            return Err(MseedError::InvalidDataIndicator(data[6] as char));
        }

        Ok(Self {
            sequence_number: parse_sequence(&data[0..6]),
            quality: data[6],
            reserved: data[7],
            station: text_field(&data[8..13], "station")?,
            location: text_field(&data[13..15], "location")?,
            channel: text_field(&data[15..18], "channel")?,
            network: text_field(&data[18..20], "network")?,
            start_time: BTime::parse(data, 20, order),
            num_samples: order.read_u16(data, 30),
            samprate_factor: order.read_i16(data, 32),
            samprate_multiplier: order.read_i16(data, 34),
            activity_flags: data[36],
            io_flags: data[37],
            dq_flags: data[38],
            num_blockettes: data[39],
            time_correction: order.read_i32(data, 40),
            data_offset: order.read_u16(data, 44),
            blockette_offset: order.read_u16(data, 46),
        })
    }

    /// Serialize into the first 48 bytes of `buf`.
    pub fn write(&self, buf: &mut [u8], order: ByteOrder) {
        let seq = format!("{:06}", self.sequence_number % 1_000_000);
        buf[0..6].copy_from_slice(seq.as_bytes());
        buf[6] = self.quality;
        buf[7] = self.reserved;
        write_padded(&mut buf[8..13], &self.station);
        write_padded(&mut buf[13..15], &self.location);
        write_padded(&mut buf[15..18], &self.channel);
        write_padded(&mut buf[18..20], &self.network);
        self.start_time.write(buf, 20, order);
        order.write_u16(buf, 30, self.num_samples);
        order.write_i16(buf, 32, self.samprate_factor);
        order.write_i16(buf, 34, self.samprate_multiplier);
        buf[36] = self.activity_flags;
        buf[37] = self.io_flags;
        buf[38] = self.dq_flags;
        buf[39] = self.num_blockettes;
        order.write_i32(buf, 40, self.time_correction);
        order.write_u16(buf, 44, self.data_offset);
        order.write_u16(buf, 46, self.blockette_offset);
    }
}

/// Guess the header byte order from the start year: big endian unless the
/// big-endian reading of the year is implausible.
pub fn infer_byte_order(data: &[u8]) -> ByteOrder {
    if data.len() < 22 {
        return ByteOrder::Big;
    }
    let year = ByteOrder::Big.read_u16(data, 20);
    if (1900..=2050).contains(&year) {
        ByteOrder::Big
    } else {
        ByteOrder::Little
    }
}

/// Structural sanity test of a candidate fixed header: six digits (or
/// space/NUL), a data indicator, a space/NUL reserved byte and plausible
/// hour, minute and second values.
pub fn is_valid_header(data: &[u8]) -> bool {
    if data.len() < FIXED_HEADER_SIZE {
        return false;
    }
    data[0..6]
        .iter()
        .all(|&b| b.is_ascii_digit() || b == b' ' || b == 0)
        && is_data_indicator(data[6])
        && (data[7] == b' ' || data[7] == 0)
        && data[24] <= 23
        && data[25] <= 59
        && data[26] <= 60
}

fn parse_sequence(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .skip_while(|&&b| b == b' ' || b == 0)
        .take_while(|b| b.is_ascii_digit())
        .fold(0u32, |acc, &b| acc * 10 + u32::from(b - b'0'))
}

fn text_field(bytes: &[u8], name: &str) -> Result<String> {
    let s = std::str::from_utf8(bytes)
        .map_err(|_| MseedError::InvalidHeader(format!("{name} is not valid text")))?;
    Ok(s.trim_matches(|c: char| c == ' ' || c == '\0').to_string())
}

pub(crate) fn write_padded(dest: &mut [u8], src: &str) {
    let bytes = src.as_bytes();
    for (i, slot) in dest.iter_mut().enumerate() {
        *slot = if i < bytes.len() { bytes[i] } else { b' ' };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> FixedHeader {
        FixedHeader {
            sequence_number: 42,
            quality: b'D',
            reserved: b' ',
            station: "ANMO".into(),
            location: "00".into(),
            channel: "BHZ".into(),
            network: "IU".into(),
            start_time: BTime {
                year: 2025,
                day: 100,
                hour: 12,
                minute: 30,
                second: 45,
                fract: 1234,
            },
            num_samples: 412,
            samprate_factor: 20,
            samprate_multiplier: 1,
            activity_flags: 0x02,
            io_flags: 0x20,
            dq_flags: 0,
            num_blockettes: 1,
            time_correction: -15,
            data_offset: 64,
            blockette_offset: 48,
        }
    }

    #[test]
    fn test_header_layout_big_endian() {
        let mut buf = [0u8; 48];
        header().write(&mut buf, ByteOrder::Big);
        assert_eq!(&buf[0..8], b"000042D ");
        assert_eq!(&buf[8..20], b"ANMO 00BHZIU");
        assert_eq!(&buf[30..32], &412u16.to_be_bytes());
        assert_eq!(&buf[40..44], &(-15i32).to_be_bytes());
        assert_eq!(&buf[46..48], &48u16.to_be_bytes());
        assert_eq!(FixedHeader::parse(&buf, ByteOrder::Big).unwrap(), header());
        assert!(is_valid_header(&buf));
        assert_eq!(infer_byte_order(&buf), ByteOrder::Big);
    }

    #[test]
    fn test_header_layout_little_endian() {
        let mut buf = [0u8; 48];
        header().write(&mut buf, ByteOrder::Little);
        assert_eq!(&buf[20..22], &2025u16.to_le_bytes());
        assert_eq!(infer_byte_order(&buf), ByteOrder::Little);
        assert_eq!(FixedHeader::parse(&buf, ByteOrder::Little).unwrap(), header());
    }

    #[test]
    fn test_bad_quality_rejected() {
        let mut buf = [0u8; 48];
        header().write(&mut buf, ByteOrder::Big);
        buf[6] = b'X';
        assert!(matches!(
            FixedHeader::parse(&buf, ByteOrder::Big),
            Err(MseedError::InvalidDataIndicator('X'))
        ));
        assert!(!is_valid_header(&buf));
    }

    #[test]
    fn test_valid_header_checks_clock_fields() {
        let mut buf = [0u8; 48];
        header().write(&mut buf, ByteOrder::Big);
        buf[24] = 24;
        assert!(!is_valid_header(&buf));
        assert!(!is_valid_header(&buf[..40]));
    }

    #[test]
    fn test_sequence_parsing() {
        assert_eq!(parse_sequence(b"000123"), 123);
        assert_eq!(parse_sequence(b"   123"), 123);
        assert_eq!(parse_sequence(b"12 456"), 12);
        assert_eq!(parse_sequence(b"      "), 0);
    }
}
