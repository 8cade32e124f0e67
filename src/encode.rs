//! Encode [`MseedRecord`] templates into Mini-SEED v2 record bytes.
//!
//! [`pack()`] splits a template's samples over as many records as needed
//! and hands each finished record to a caller-supplied sink.
//! [`encode()`] is the single-record convenience and [`pack_header()`]
//! serializes only the header and blockettes.

use log::{debug, trace};

use crate::blockette::{Blkt1000, Blockette, ChainPosition, write_chain};
use crate::codec;
use crate::config::PackConfig;
use crate::header::{
    ACT_TIME_CORRECTION_APPLIED, FIXED_HEADER_SIZE, MAX_RECORD_LENGTH, MIN_RECORD_LENGTH,
};
use crate::record::{DEFAULT_RECORD_LENGTH, MseedRecord};
use crate::samplerate;
use crate::steim::FRAME_SIZE;
use crate::time::{HPTMODULUS, HpTime, hptime_to_btime};
use crate::types::{ByteOrder, EncodingFormat, is_data_indicator};
use crate::{MseedError, Result};

/// Highest sequence number before wrapping back to 1.
pub const MAX_SEQUENCE_NUMBER: u32 = 999_999;

/// Counts returned by [`pack()`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PackSummary {
    /// Records handed to the sink.
    pub records: usize,
    /// Samples packed into those records.
    pub samples: usize,
}

/// Pack the template's samples into records.
///
/// Full records are emitted while more samples remain than one record can
/// hold; with `flush`, the remainder goes into a final partial record.
/// Unset template fields are defaulted in place (quality 'D', 4096-byte
/// records, big endian, Steim2) and Blockette 1000 is added when missing.
/// On return the template's sequence number and start time point past the
/// packed records.
pub fn pack<F>(
    record: &mut MseedRecord,
    flush: bool,
    config: &PackConfig,
    mut sink: F,
) -> Result<PackSummary>
where
    F: FnMut(&[u8]),
{
    apply_defaults(record);
    check_record_length(record.record_length)?;

    if record.samples.is_empty() {
        return Err(MseedError::EncodeError("No samples to pack".into()));
    }
    if !record.quality.is_ascii() || !is_data_indicator(record.quality as u8) {
        return Err(MseedError::InvalidDataIndicator(record.quality));
    }

    let encoding = record.encoding.unwrap_or(EncodingFormat::Steim2);
    let expected = encoding.sample_type();
    if record.samples.sample_type() != expected {
        return Err(MseedError::SampleTypeMismatch {
            expected,
            found: record.samples.sample_type(),
        });
    }

    if record.blkt1000().is_none() {
        debug!("adding Blockette 1000 to {}", record.source_name());
        record.add_blockette(
            Blockette::DataOnly(Blkt1000::default()),
            ChainPosition::Tail,
        );
    }

    let order = record.byte_order.unwrap_or(ByteOrder::Big);
    let header_order = config.header_byte_order.unwrap_or(order);
    let data_order = config.data_byte_order.unwrap_or(order);
    let reclen = record.record_length;

    let total = record.samples.len();
    let mut summary = PackSummary::default();

    while total - summary.samples > 0 {
        let mut buf = vec![0u8; reclen];
        let header_len = write_header(record, &mut buf, reclen, header_order, data_order)?;

        let data_offset = if encoding.is_steim() {
            header_len.div_ceil(FRAME_SIZE).max(1) * FRAME_SIZE
        } else {
            header_len
        };
        if data_offset >= reclen {
            return Err(MseedError::EncodeError(format!(
                "header ({header_len} bytes) leaves no room for data in a {reclen}-byte record"
            )));
        }

        let max_samples = codec::max_samples(encoding, reclen - data_offset).min(u16::MAX as usize);
        if total - summary.samples <= max_samples && !flush {
            break;
        }

        let end = total.min(summary.samples + max_samples);
        let encoded = codec::encode_samples(
            &record.samples,
            summary.samples..end,
            encoding,
            reclen - data_offset,
            data_order,
        )?;
        if encoded.packed == 0 {
            return Err(MseedError::EncodeError(format!(
                "no room for a single {encoding} sample in a {reclen}-byte record"
            )));
        }

        buf[data_offset..data_offset + encoded.bytes.len()].copy_from_slice(&encoded.bytes);
        header_order.write_u16(&mut buf, 30, encoded.packed as u16);
        header_order.write_u16(&mut buf, 44, data_offset as u16);

        sink(&buf);

        trace!(
            "Packed {} samples for {}",
            encoded.packed,
            record.source_name()
        );
        summary.records += 1;
        summary.samples += encoded.packed;

        record.sequence_number = next_sequence_number(record.sequence_number);
        record.start_time = advance(record.start_time, encoded.packed, record.sample_rate);
    }

    debug!(
        "Packed {} total samples in {} records for {}",
        summary.samples,
        summary.records,
        record.source_name()
    );
    Ok(summary)
}

/// Serialize a record into exactly one record buffer.
///
/// Fails when the samples need more than one record.
pub fn encode(record: &MseedRecord) -> Result<Vec<u8>> {
    let mut template = record.clone();
    let mut out = Vec::new();
    let summary = pack(&mut template, true, &PackConfig::default(), |rec| {
        if out.is_empty() {
            out.extend_from_slice(rec);
        }
    })?;
    if summary.records != 1 {
        return Err(MseedError::EncodeError(format!(
            "{} samples need {} records of {} bytes",
            record.samples.len(),
            summary.records,
            template.record_length
        )));
    }
    Ok(out)
}

/// Serialize only the fixed header and blockettes into a record-length
/// buffer. Samples and the data offset are taken from the template as is.
///
/// Blockettes must fit before the template's data offset, or within the
/// record when no data offset is set.
pub fn pack_header(record: &MseedRecord, config: &PackConfig) -> Result<Vec<u8>> {
    let reclen = if record.record_length == 0 {
        DEFAULT_RECORD_LENGTH
    } else {
        record.record_length
    };
    check_record_length(reclen)?;

    let order = record.byte_order.unwrap_or(ByteOrder::Big);
    let header_order = config.header_byte_order.unwrap_or(order);
    let data_order = config.data_byte_order.unwrap_or(order);

    let max_header_len = match record.header.data_offset as usize {
        0 => reclen,
        offset => offset.min(reclen),
    };
    if max_header_len < FIXED_HEADER_SIZE {
        return Err(MseedError::EncodeError(format!(
            "header limit {max_header_len} is smaller than the fixed header"
        )));
    }

    let mut buf = vec![0u8; reclen];
    let mut template = record.clone();
    template.record_length = reclen;
    write_header(&template, &mut buf, max_header_len, header_order, data_order)?;

    let count = u16::try_from(record.sample_count).map_err(|_| {
        MseedError::EncodeError(format!("{} samples exceed the header field", record.sample_count))
    })?;
    header_order.write_u16(&mut buf, 30, count);
    header_order.write_u16(&mut buf, 44, record.header.data_offset);
    Ok(buf)
}

fn apply_defaults(record: &mut MseedRecord) {
    if record.quality == '\0' {
        record.quality = 'D';
    }
    if record.record_length == 0 {
        record.record_length = DEFAULT_RECORD_LENGTH;
    }
    if record.byte_order.is_none() {
        record.byte_order = Some(ByteOrder::Big);
    }
    if record.encoding.is_none() {
        record.encoding = Some(EncodingFormat::Steim2);
    }
    if record.sequence_number == 0 || record.sequence_number > MAX_SEQUENCE_NUMBER {
        record.sequence_number = 1;
    }
}

fn check_record_length(reclen: usize) -> Result<()> {
    if !(MIN_RECORD_LENGTH..=MAX_RECORD_LENGTH).contains(&reclen) {
        return Err(MseedError::RecordLengthOutOfRange(reclen));
    }
    if !reclen.is_power_of_two() {
        return Err(MseedError::RecordLengthNotPowerOfTwo(reclen));
    }
    Ok(())
}

fn next_sequence_number(seq: u32) -> u32 {
    if seq >= MAX_SEQUENCE_NUMBER { 1 } else { seq + 1 }
}

fn advance(start: HpTime, packed: usize, rate: f64) -> HpTime {
    if rate > 0.0 {
        start + (packed as f64 / rate * HPTMODULUS as f64) as i64
    } else {
        start
    }
}

/// Write the fixed header and blockette chain into `buf`, refreshing the
/// derived blockette fields. Returns the header length. The sample count
/// and data offset are left for the caller.
fn write_header(
    record: &MseedRecord,
    buf: &mut [u8],
    max_header_len: usize,
    header_order: ByteOrder,
    data_order: ByteOrder,
) -> Result<usize> {
    let encoding = record.encoding.unwrap_or(EncodingFormat::Steim2);
    let (factor, multiplier) = samplerate::factor_multiplier(record.sample_rate)?;

    let blockettes: Vec<Blockette> = record
        .blockettes
        .iter()
        .map(|b| refresh_blockette(b, record, encoding, data_order))
        .collect();

    let mut header = record.header.clone();
    header.sequence_number = record.sequence_number % (MAX_SEQUENCE_NUMBER + 1);
    header.quality = record.quality as u8;
    header.reserved = b' ';
    header.network = record.network.clone();
    header.station = record.station.clone();
    header.location = record.location.clone();
    header.channel = record.channel.clone();
    header.start_time = hptime_to_btime(record.start_time)?;
    header.samprate_factor = factor;
    header.samprate_multiplier = multiplier;
    header.num_samples = 0;
    header.data_offset = 0;
    // start_time already carries any correction
    if header.time_correction != 0 {
        header.activity_flags |= ACT_TIME_CORRECTION_APPLIED;
    }

    let (written, end) = write_chain(
        &blockettes,
        buf,
        FIXED_HEADER_SIZE,
        max_header_len,
        header_order,
    );
    header.num_blockettes = written as u8;
    header.blockette_offset = if written > 0 {
        FIXED_HEADER_SIZE as u16
    } else {
        0
    };
    header.write(buf, header_order);

    Ok(end)
}

fn refresh_blockette(
    blockette: &Blockette,
    record: &MseedRecord,
    encoding: EncodingFormat,
    data_order: ByteOrder,
) -> Blockette {
    match blockette {
        Blockette::SampleRate(b) => {
            let mut b = *b;
            b.sample_rate = record.sample_rate as f32;
            Blockette::SampleRate(b)
        }
        Blockette::DataOnly(b) => {
            let mut b = *b;
            b.encoding = encoding.to_code();
            b.byte_order = data_order.to_flag();
            b.reclen_exp = record.record_length.trailing_zeros() as u8;
            Blockette::DataOnly(b)
        }
        Blockette::DataExtension(b) => {
            let mut b = *b;
            // sub-100 microsecond remainder not representable in BTIME
            b.usec = record.start_time.rem_euclid(HPTMODULUS / 10_000) as i8;
            Blockette::DataExtension(b)
        }
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockette::{Blkt100, Blkt1001};
    use crate::decode::decode;
    use crate::record::Samples;
    use crate::types::SampleType;

    fn template(samples: Samples) -> MseedRecord {
        MseedRecord::new()
            .with_nslc("XX", "TEST", "", "TID")
            .with_sample_rate(1.0)
            .with_record_length(512)
            .with_samples(samples)
    }

    fn collect(record: &mut MseedRecord, flush: bool) -> (PackSummary, Vec<Vec<u8>>) {
        let mut records = Vec::new();
        let summary = pack(record, flush, &PackConfig::default(), |r| {
            records.push(r.to_vec())
        })
        .unwrap();
        (summary, records)
    }

    #[test]
    fn test_pack_splits_across_records() {
        let samples: Vec<i32> = (0..2000).map(|i| (i % 97) * 1000).collect();
        let mut tmpl = template(Samples::Int(samples.clone()))
            .with_encoding(EncodingFormat::Int32);
        let (summary, records) = collect(&mut tmpl, true);

        // 512 - 56 = 456 bytes, 114 samples per record
        assert_eq!(summary.records, 18);
        assert_eq!(summary.samples, 2000);
        assert_eq!(tmpl.sequence_number, 19);
        assert_eq!(tmpl.start_time, 2000 * HPTMODULUS);

        let mut decoded = Vec::new();
        for (i, raw) in records.iter().enumerate() {
            let rec = decode(raw).unwrap();
            assert_eq!(rec.sequence_number, i as u32 + 1);
            assert_eq!(rec.start_time, (i as i64) * 114 * HPTMODULUS);
            assert_eq!(rec.header.data_offset, 56);
            match rec.samples {
                Samples::Int(v) => decoded.extend(v),
                other => panic!("unexpected samples {other:?}"),
            }
        }
        assert_eq!(decoded, samples);
    }

    #[test]
    fn test_pack_without_flush_keeps_remainder() {
        let mut tmpl = template(Samples::Int(vec![5; 300])).with_encoding(EncodingFormat::Int32);
        let (summary, _) = collect(&mut tmpl, false);
        assert_eq!(summary.records, 2);
        assert_eq!(summary.samples, 228);
    }

    #[test]
    fn test_steim_data_offset_is_frame_aligned() {
        let mut tmpl = template(Samples::Int((0..10).collect()))
            .with_blockette(Blockette::SampleRate(Blkt100::default()))
            .with_blockette(Blockette::DataExtension(Blkt1001::default()));
        let (summary, records) = collect(&mut tmpl, true);
        assert_eq!(summary.records, 1);

        let rec = decode(&records[0]).unwrap();
        // 48 + 12 + 8 + 8 = 76 rounds up to 128
        assert_eq!(rec.header.data_offset, 128);
        assert!(records[0][76..128].iter().all(|&b| b == 0));
        assert_eq!(rec.encoding, Some(EncodingFormat::Steim2));
        assert_eq!(rec.blkt100().map(|b| b.sample_rate), Some(1.0));
        assert_eq!(rec.samples, Samples::Int((0..10).collect()));
    }

    #[test]
    fn test_blockette_1001_carries_microseconds() {
        let start = 1_000_000_000 * HPTMODULUS + 123_456;
        let mut tmpl = template(Samples::Int(vec![1, 2, 3]))
            .with_start_time(start)
            .with_blockette(Blockette::DataExtension(Blkt1001::default()));
        let (_, records) = collect(&mut tmpl, true);
        let rec = decode(&records[0]).unwrap();
        assert_eq!(rec.blkt1001().map(|b| b.usec), Some(56));
        assert_eq!(rec.header.start_time.fract, 1234);
        assert_eq!(rec.start_time, start);
    }

    #[test]
    fn test_sequence_number_wraps() {
        let mut tmpl = template(Samples::Int(vec![0; 300]))
            .with_encoding(EncodingFormat::Int32)
            .with_sequence_number(999_999);
        let (_, records) = collect(&mut tmpl, true);
        assert_eq!(&records[0][0..6], b"999999");
        assert_eq!(&records[1][0..6], b"000001");
        assert_eq!(tmpl.sequence_number, 3);
    }

    #[test]
    fn test_out_of_range_sequence_resets() {
        let mut tmpl = template(Samples::Int(vec![1])).with_sequence_number(5_000_000);
        let (_, records) = collect(&mut tmpl, true);
        assert_eq!(&records[0][0..6], b"000001");
    }

    #[test]
    fn test_record_length_must_be_power_of_two() {
        let mut tmpl = template(Samples::Int(vec![1])).with_record_length(1000);
        assert!(matches!(
            pack(&mut tmpl, true, &PackConfig::default(), |_| {}),
            Err(MseedError::RecordLengthNotPowerOfTwo(1000))
        ));
        let mut tmpl = template(Samples::Int(vec![1])).with_record_length(128);
        assert!(matches!(
            pack(&mut tmpl, true, &PackConfig::default(), |_| {}),
            Err(MseedError::RecordLengthOutOfRange(128))
        ));
    }

    #[test]
    fn test_pack_rejects_bad_input() {
        let mut tmpl = template(Samples::Int(vec![]));
        assert!(matches!(
            pack(&mut tmpl, true, &PackConfig::default(), |_| {}),
            Err(MseedError::EncodeError(_))
        ));

        let mut tmpl = template(Samples::Float(vec![1.0])).with_encoding(EncodingFormat::Steim1);
        assert!(matches!(
            pack(&mut tmpl, true, &PackConfig::default(), |_| {}),
            Err(MseedError::SampleTypeMismatch {
                expected: SampleType::Int,
                found: SampleType::Float
            })
        ));

        let mut tmpl = template(Samples::Int(vec![1])).with_quality('X');
        assert!(matches!(
            pack(&mut tmpl, true, &PackConfig::default(), |_| {}),
            Err(MseedError::InvalidDataIndicator('X'))
        ));
    }

    #[test]
    fn test_forced_byte_orders() {
        let mut tmpl = template(Samples::Double(vec![1.5, -2.5]))
            .with_encoding(EncodingFormat::Float64);
        let config = PackConfig::new()
            .with_header_byte_order(ByteOrder::Little)
            .with_data_byte_order(ByteOrder::Little);
        let mut raw = Vec::new();
        pack(&mut tmpl, true, &config, |r| raw = r.to_vec()).unwrap();
        assert_eq!(&raw[20..22], &1970u16.to_le_bytes());
        let rec = decode(&raw).unwrap();
        assert_eq!(rec.byte_order, Some(ByteOrder::Little));
        assert_eq!(rec.samples, Samples::Double(vec![1.5, -2.5]));
    }

    #[test]
    fn test_encode_single_record() {
        let rec = template(Samples::Ascii(b"station log entry".to_vec()))
            .with_encoding(EncodingFormat::Ascii)
            .with_sample_rate(0.0);
        let raw = encode(&rec).unwrap();
        assert_eq!(raw.len(), 512);
        let back = decode(&raw).unwrap();
        assert_eq!(back.samples, Samples::Ascii(b"station log entry".to_vec()));

        let big = template(Samples::Int(vec![0; 200])).with_encoding(EncodingFormat::Int32);
        assert!(encode(&big).is_err());
    }

    #[test]
    fn test_pack_header_only() {
        let mut rec = template(Samples::Int(vec![]));
        rec.sample_count = 0;
        rec.add_blockette(
            Blockette::DataOnly(Blkt1000::default()),
            ChainPosition::Tail,
        );
        let raw = pack_header(&rec, &PackConfig::default()).unwrap();
        assert_eq!(raw.len(), 512);
        let back = crate::decode::unpack(&raw, &crate::UnpackConfig::default(), false).unwrap();
        assert_eq!(back.nslc(), "XX.TEST..TID");
        assert_eq!(back.sample_count, 0);
        assert_eq!(back.blkt1000().map(|b| b.reclen_exp), Some(9));
    }
}
