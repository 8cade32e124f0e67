//! Decode Mini-SEED v2 records from raw bytes.
//!
//! The main entry point is [`unpack()`], which parses one record buffer
//! into an [`MseedRecord`] under an [`UnpackConfig`]. [`decode()`] is the
//! same with default settings. For multi-record data, see
//! [`MseedReader`](crate::MseedReader) and
//! [`MseedFileReader`](crate::MseedFileReader).

use log::{debug, warn};

use crate::blockette::read_chain;
use crate::codec;
use crate::config::UnpackConfig;
use crate::header::{
    ACT_TIME_CORRECTION_APPLIED, FIXED_HEADER_SIZE, FixedHeader, MAX_RECORD_LENGTH,
    MIN_RECORD_LENGTH, infer_byte_order,
};
use crate::record::{MseedRecord, RecordWarning, Samples};
use crate::time::HPTMODULUS;
use crate::types::{ByteOrder, EncodingFormat, SampleType, is_data_indicator};
use crate::{MseedError, Result};

/// Decode a single record with default settings, unpacking samples.
pub fn decode(data: &[u8]) -> Result<MseedRecord> {
    unpack(data, &UnpackConfig::default(), true)
}

/// Parse one record occupying all of `data`.
///
/// The buffer length is the record length; a different length declared
/// in Blockette 1000 is reported as a warning. With `unpack_data` false
/// the samples are left empty but `sample_count` still holds the
/// declared count.
pub fn unpack(data: &[u8], config: &UnpackConfig, unpack_data: bool) -> Result<MseedRecord> {
    config.validate()?;

    let reclen = data.len();
    if !(MIN_RECORD_LENGTH..=MAX_RECORD_LENGTH).contains(&reclen) {
        return Err(MseedError::RecordLengthOutOfRange(reclen));
    }
    if !is_data_indicator(data[6]) {
        return Err(MseedError::InvalidDataIndicator(data[6] as char));
    }

    let header_order = match config.header_byte_order {
        Some(order) => order,
        None => {
            let order = infer_byte_order(data);
            debug!("header byte order inferred as {order}");
            order
        }
    };
    let header = FixedHeader::parse(data, header_order)?;

    let (blockettes, mut warnings) = read_chain(
        data,
        header.blockette_offset as usize,
        header.data_offset as usize,
        header_order,
    );

    let mut record = MseedRecord {
        sequence_number: header.sequence_number,
        quality: header.quality as char,
        network: header.network.clone(),
        station: header.station.clone(),
        location: header.location.clone(),
        channel: header.channel.clone(),
        start_time: 0,
        sample_rate: 0.0,
        sample_count: header.num_samples as usize,
        encoding: None,
        byte_order: None,
        record_length: reclen,
        blockettes,
        samples: Samples::Int(vec![]),
        header,
        warnings: Vec::new(),
    };

    let mut encoding_code = None;
    let mut data_order = None;
    match record.blkt1000().copied() {
        Some(b1000) => {
            encoding_code = Some(b1000.encoding);
            data_order = Some(if b1000.byte_order == 0 {
                ByteOrder::Little
            } else {
                ByteOrder::Big
            });
            if let Some(declared) = b1000.record_length() {
                if declared != reclen {
                    warn!(
                        "{}: record length in Blockette 1000 ({declared}) != actual length ({reclen})",
                        record.source_name()
                    );
                    warnings.push(RecordWarning::RecordLengthMismatch {
                        declared,
                        actual: reclen,
                    });
                }
            }
        }
        None => {
            warn!("No Blockette 1000 found: {}", record.source_name());
            warnings.push(RecordWarning::MissingBlockette1000);
        }
    }

    record.start_time = start_time(&record)?;
    record.sample_rate = match record.blkt100() {
        Some(b100) => f64::from(b100.sample_rate),
        None => record.nominal_sample_rate(),
    };

    if let Some(forced) = config.data_byte_order {
        data_order = Some(forced);
    }
    if let Some(forced) = config.encoding {
        encoding_code = Some(forced);
    }
    let encoding_code = encoding_code.unwrap_or(config.fallback_encoding);
    let data_order = data_order.unwrap_or(header_order);
    record.encoding = EncodingFormat::from_code(encoding_code).ok();
    record.byte_order = Some(data_order);

    let count = record.sample_count;
    if unpack_data && count > 0 {
        let encoding = EncodingFormat::from_code(encoding_code)?;
        let data_offset = record.header.data_offset as usize;
        if data_offset < FIXED_HEADER_SIZE || data_offset > reclen {
            return Err(MseedError::InvalidHeader(format!(
                "data offset {data_offset} outside record of {reclen} bytes"
            )));
        }

        debug!(
            "unpacking {count} samples, {encoding} in {data_order}, from offset {data_offset}"
        );
        let decoded =
            codec::decode_samples(encoding, &data[data_offset..], count, count, data_order)?;
        if let Some((last, xn)) = decoded.integrity_failure {
            warnings.push(RecordWarning::SteimIntegrity { last, xn });
        }
        if decoded.samples.len() != count {
            if !encoding.is_steim() {
                warn!(
                    "{}: header declares {count} samples, payload holds {}",
                    record.source_name(),
                    decoded.samples.len()
                );
            }
            warnings.push(RecordWarning::SampleCountMismatch {
                declared: count,
                decoded: decoded.samples.len(),
            });
        }
        record.samples = decoded.samples;
    } else {
        let sample_type = record
            .encoding
            .map_or(SampleType::Int, EncodingFormat::sample_type);
        record.samples = Samples::empty(sample_type);
    }

    record.warnings = warnings;
    Ok(record)
}

/// Header start time with the time correction (unless already applied)
/// and the Blockette 1001 microsecond offset folded in.
fn start_time(record: &MseedRecord) -> Result<i64> {
    let header = &record.header;
    let mut start = header.start_time.to_hptime()?;

    if header.time_correction != 0 && header.activity_flags & ACT_TIME_CORRECTION_APPLIED == 0 {
        start += i64::from(header.time_correction) * (HPTMODULUS / 10_000);
    }
    if let Some(b1001) = record.blkt1001() {
        start += i64::from(b1001.usec);
    }

    Ok(start)
}
