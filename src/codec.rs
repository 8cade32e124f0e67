//! Sample payload codecs.
//!
//! Fixed-width encodings (INT16, INT32, FLOAT32, FLOAT64, ASCII) live here;
//! the Steim compressors live in [`crate::steim`]. [`decode_samples`] and
//! [`encode_samples`] dispatch on [`EncodingFormat`].

use std::ops::Range;

use crate::record::Samples;
use crate::steim::{self, FRAME_SIZE};
use crate::types::{ByteOrder, EncodingFormat};
use crate::{MseedError, Result};

/// Output of [`decode_samples`].
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedData {
    pub samples: Samples,
    /// Samples the payload actually holds (Steim differences or
    /// fixed-width slots), before the request limit.
    pub available: usize,
    /// Steim only: `(last integrated value, XN)` when they disagree.
    pub integrity_failure: Option<(i32, i32)>,
}

/// Output of [`encode_samples`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedData {
    pub bytes: Vec<u8>,
    /// Number of samples consumed from the input.
    pub packed: usize,
}

fn slots(data: &[u8], count: usize, width: usize) -> usize {
    count.min(data.len() / width)
}

/// Decode up to `count` big- or little-endian 16-bit integers.
pub fn decode_int16(data: &[u8], count: usize, order: ByteOrder) -> Vec<i32> {
    (0..slots(data, count, 2))
        .map(|i| i32::from(order.read_i16(data, i * 2)))
        .collect()
}

/// Decode up to `count` 32-bit integers.
pub fn decode_int32(data: &[u8], count: usize, order: ByteOrder) -> Vec<i32> {
    (0..slots(data, count, 4))
        .map(|i| order.read_i32(data, i * 4))
        .collect()
}

/// Decode up to `count` IEEE 32-bit floats.
pub fn decode_float32(data: &[u8], count: usize, order: ByteOrder) -> Vec<f32> {
    (0..slots(data, count, 4))
        .map(|i| order.read_f32(data, i * 4))
        .collect()
}

/// Decode up to `count` IEEE 64-bit floats.
pub fn decode_float64(data: &[u8], count: usize, order: ByteOrder) -> Vec<f64> {
    (0..slots(data, count, 8))
        .map(|i| order.read_f64(data, i * 8))
        .collect()
}

/// Copy up to `count` ASCII bytes.
pub fn decode_ascii(data: &[u8], count: usize) -> Vec<u8> {
    data[..slots(data, count, 1)].to_vec()
}

/// Decode a data payload.
///
/// `num_samples` is the header's declared count and `req_samples` the
/// number of samples wanted; at most `min(req_samples, available)` are
/// returned. Steim integrity failures are reported, not raised.
pub fn decode_samples(
    encoding: EncodingFormat,
    data: &[u8],
    num_samples: usize,
    req_samples: usize,
    order: ByteOrder,
) -> Result<DecodedData> {
    let want = num_samples.min(req_samples);
    let fixed = |samples: Samples, width: usize| DecodedData {
        available: num_samples.min(data.len() / width),
        samples,
        integrity_failure: None,
    };

    let decoded = match encoding {
        EncodingFormat::Ascii => fixed(Samples::Ascii(decode_ascii(data, want)), 1),
        EncodingFormat::Int16 => fixed(Samples::Int(decode_int16(data, want, order)), 2),
        EncodingFormat::Int32 => fixed(Samples::Int(decode_int32(data, want, order)), 4),
        EncodingFormat::Float32 => fixed(Samples::Float(decode_float32(data, want, order)), 4),
        EncodingFormat::Float64 => fixed(Samples::Double(decode_float64(data, want, order)), 8),
        EncodingFormat::Steim1 | EncodingFormat::Steim2 => {
            let out = if encoding == EncodingFormat::Steim1 {
                steim::decode_steim1(data, num_samples, req_samples, order)?
            } else {
                steim::decode_steim2(data, num_samples, req_samples, order)?
            };
            let integrity_failure = (!out.integrity_ok()).then_some((out.last_value, out.xn));
            DecodedData {
                available: out.differences,
                samples: Samples::Int(out.samples),
                integrity_failure,
            }
        }
    };

    Ok(decoded)
}

/// Encode `samples[range]` into at most `capacity` bytes.
///
/// Fixed-width encodings take as many leading samples as fit; Steim
/// encodings fill `capacity / 64` frames. The sample variant must match
/// the encoding's sample type.
pub fn encode_samples(
    samples: &Samples,
    range: Range<usize>,
    encoding: EncodingFormat,
    capacity: usize,
    order: ByteOrder,
) -> Result<EncodedData> {
    let expected = encoding.sample_type();
    if samples.sample_type() != expected {
        return Err(MseedError::SampleTypeMismatch {
            expected,
            found: samples.sample_type(),
        });
    }
    let Range { start, end } = range;
    if start >= end || end > samples.len() {
        return Err(MseedError::EncodeError(format!(
            "sample range {start}..{end} is empty or beyond {} samples",
            samples.len()
        )));
    }

    let fit = |width: usize| (end - start).min(capacity / width);

    match (encoding, samples) {
        (EncodingFormat::Ascii, Samples::Ascii(v)) => {
            let n = fit(1);
            Ok(EncodedData {
                bytes: v[start..start + n].to_vec(),
                packed: n,
            })
        }
        (EncodingFormat::Int16, Samples::Int(v)) => {
            let n = fit(2);
            let mut bytes = vec![0u8; n * 2];
            for (i, &s) in v[start..start + n].iter().enumerate() {
                let value = i16::try_from(s).map_err(|_| {
                    MseedError::EncodeError(format!("sample {s} does not fit in 16 bits"))
                })?;
                order.write_i16(&mut bytes, i * 2, value);
            }
            Ok(EncodedData { bytes, packed: n })
        }
        (EncodingFormat::Int32, Samples::Int(v)) => {
            let n = fit(4);
            let mut bytes = vec![0u8; n * 4];
            for (i, &s) in v[start..start + n].iter().enumerate() {
                order.write_i32(&mut bytes, i * 4, s);
            }
            Ok(EncodedData { bytes, packed: n })
        }
        (EncodingFormat::Float32, Samples::Float(v)) => {
            let n = fit(4);
            let mut bytes = vec![0u8; n * 4];
            for (i, &s) in v[start..start + n].iter().enumerate() {
                order.write_f32(&mut bytes, i * 4, s);
            }
            Ok(EncodedData { bytes, packed: n })
        }
        (EncodingFormat::Float64, Samples::Double(v)) => {
            let n = fit(8);
            let mut bytes = vec![0u8; n * 8];
            for (i, &s) in v[start..start + n].iter().enumerate() {
                order.write_f64(&mut bytes, i * 8, s);
            }
            Ok(EncodedData { bytes, packed: n })
        }
        (EncodingFormat::Steim1, Samples::Int(v)) => {
            let out = steim::encode_steim1(&v[start..end], capacity / FRAME_SIZE, false, order)?;
            Ok(EncodedData {
                bytes: out.bytes,
                packed: out.packed,
            })
        }
        (EncodingFormat::Steim2, Samples::Int(v)) => {
            let out = steim::encode_steim2(&v[start..end], capacity / FRAME_SIZE, false, order)?;
            Ok(EncodedData {
                bytes: out.bytes,
                packed: out.packed,
            })
        }
        _ => Err(MseedError::SampleTypeMismatch {
            expected,
            found: samples.sample_type(),
        }),
    }
}

/// Most samples of `encoding` that fit in `data_bytes` of payload.
///
/// Steim capacity assumes every difference fits the narrowest field.
pub fn max_samples(encoding: EncodingFormat, data_bytes: usize) -> usize {
    match encoding {
        EncodingFormat::Steim1 => data_bytes / FRAME_SIZE * steim::STEIM1_MAX_PER_FRAME,
        EncodingFormat::Steim2 => data_bytes / FRAME_SIZE * steim::STEIM2_MAX_PER_FRAME,
        other => data_bytes / other.sample_type().size(),
    }
}
