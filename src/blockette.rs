//! Typed blockettes and the offset-linked blockette chain.
//!
//! Every blockette starts with a 4-byte header (type, offset of the next
//! blockette). Known types are decoded into structs; anything else is kept
//! as [`Blockette::Unknown`] with its raw payload so it can be written back
//! unchanged.

use log::warn;

use crate::record::RecordWarning;
use crate::time::BTime;
use crate::types::ByteOrder;
use crate::{MseedError, Result};

/// Size of the type + next-offset header at the start of each blockette.
pub const BLOCKETTE_HEADER_SIZE: usize = 4;

/// Fixed length (including the 4-byte header) of a blockette type, or
/// `None` for variable-length and unrecognized types.
pub fn blockette_length(kind: u16) -> Option<usize> {
    let len = match kind {
        100 => 12,
        200 => 52,
        201 => 60,
        300 => 60,
        310 => 60,
        320 => 64,
        390 => 28,
        395 => 16,
        400 => 16,
        405 => 6,
        500 => 200,
        1000 => 8,
        1001 => 8,
        _ => return None,
    };
    Some(len)
}

/// Human readable name of a blockette type.
pub fn blockette_description(kind: u16) -> Option<&'static str> {
    let desc = match kind {
        100 => "Sample Rate",
        200 => "Generic Event Detection",
        201 => "Murdock Event Detection",
        300 => "Step Calibration",
        310 => "Sine Calibration",
        320 => "Pseudo-random Calibration",
        390 => "Generic Calibration",
        395 => "Calibration Abort",
        400 => "Beam",
        405 => "Beam Delay",
        500 => "Timing",
        1000 => "Data Only SEED",
        1001 => "Data Extension",
        2000 => "Opaque Data",
        _ => return None,
    };
    Some(desc)
}

/// Blockette 100: actual sample rate.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Blkt100 {
    pub sample_rate: f32,
    pub flags: u8,
    pub reserved: [u8; 3],
}

/// Blockette 200: generic event detection.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Blkt200 {
    pub amplitude: f32,
    pub period: f32,
    pub background_estimate: f32,
    pub flags: u8,
    pub reserved: u8,
    pub time: BTime,
    pub detector: [u8; 24],
}

/// Blockette 201: Murdock event detection.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Blkt201 {
    pub amplitude: f32,
    pub period: f32,
    pub background_estimate: f32,
    pub flags: u8,
    pub reserved: u8,
    pub time: BTime,
    pub snr_values: [u8; 6],
    pub loopback: u8,
    pub pick_algorithm: u8,
    pub detector: [u8; 24],
}

/// Blockette 300: step calibration.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Blkt300 {
    pub time: BTime,
    pub num_calibrations: u8,
    pub flags: u8,
    pub step_duration: u32,
    pub interval_duration: u32,
    pub amplitude: f32,
    pub input_channel: [u8; 3],
    pub reserved: u8,
    pub reference_amplitude: u32,
    pub coupling: [u8; 12],
    pub rolloff: [u8; 12],
}

/// Blockette 310: sine calibration.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Blkt310 {
    pub time: BTime,
    pub reserved1: u8,
    pub flags: u8,
    pub duration: u32,
    pub period: f32,
    pub amplitude: f32,
    pub input_channel: [u8; 3],
    pub reserved2: u8,
    pub reference_amplitude: u32,
    pub coupling: [u8; 12],
    pub rolloff: [u8; 12],
}

/// Blockette 320: pseudo-random calibration.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Blkt320 {
    pub time: BTime,
    pub reserved1: u8,
    pub flags: u8,
    pub duration: u32,
    pub ptp_amplitude: f32,
    pub input_channel: [u8; 3],
    pub reserved2: u8,
    pub reference_amplitude: u32,
    pub coupling: [u8; 12],
    pub rolloff: [u8; 12],
    pub noise_type: [u8; 8],
}

/// Blockette 390: generic calibration.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Blkt390 {
    pub time: BTime,
    pub reserved1: u8,
    pub flags: u8,
    pub duration: u32,
    pub amplitude: f32,
    pub input_channel: [u8; 3],
    pub reserved2: u8,
}

/// Blockette 395: calibration abort.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Blkt395 {
    pub time: BTime,
    pub reserved: [u8; 2],
}

/// Blockette 400: beam.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Blkt400 {
    pub azimuth: f32,
    pub slowness: f32,
    pub configuration: u16,
    pub reserved: [u8; 2],
}

/// Blockette 405: beam delay.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Blkt405 {
    pub delay_values: u16,
}

/// Blockette 500: timing.
#[derive(Debug, Clone, PartialEq)]
pub struct Blkt500 {
    pub vco_correction: f32,
    pub time: BTime,
    pub usec: i8,
    pub reception_quality: u8,
    pub exception_count: u32,
    pub exception_type: [u8; 16],
    pub clock_model: [u8; 32],
    pub clock_status: [u8; 128],
}

impl Default for Blkt500 {
    fn default() -> Self {
        Self {
            vco_correction: 0.0,
            time: BTime::default(),
            usec: 0,
            reception_quality: 0,
            exception_count: 0,
            exception_type: [0; 16],
            clock_model: [0; 32],
            clock_status: [0; 128],
        }
    }
}

/// Blockette 1000: data only SEED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Blkt1000 {
    /// Raw encoding code.
    pub encoding: u8,
    /// 0 = little endian, 1 = big endian.
    pub byte_order: u8,
    /// Record length as a power of two exponent.
    pub reclen_exp: u8,
    pub reserved: u8,
}

impl Blkt1000 {
    /// Record length in bytes, if the exponent is sane.
    pub fn record_length(&self) -> Option<usize> {
        (self.reclen_exp < usize::BITS as u8).then(|| 1usize << self.reclen_exp)
    }
}

/// Blockette 1001: data extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Blkt1001 {
    pub timing_quality: u8,
    /// Microsecond offset added to the start time.
    pub usec: i8,
    pub reserved: u8,
    pub frame_count: u8,
}

/// Blockette 2000: opaque data. `payload` holds the header fields and the
/// opaque bytes that follow the fixed part.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Blkt2000 {
    pub data_offset: u16,
    pub record_number: u32,
    pub byte_order: u8,
    pub flags: u8,
    pub num_header_fields: u8,
    pub payload: Vec<u8>,
}

impl Blkt2000 {
    /// Length of the type/next header plus fixed fields.
    pub const FIXED_SIZE: usize = 15;
}

/// A decoded blockette, keyed by type.
#[derive(Debug, Clone, PartialEq)]
pub enum Blockette {
    SampleRate(Blkt100),
    GenericEvent(Blkt200),
    MurdockEvent(Blkt201),
    StepCalibration(Blkt300),
    SineCalibration(Blkt310),
    RandomCalibration(Blkt320),
    GenericCalibration(Blkt390),
    CalibrationAbort(Blkt395),
    Beam(Blkt400),
    BeamDelay(Blkt405),
    Timing(Blkt500),
    DataOnly(Blkt1000),
    DataExtension(Blkt1001),
    Opaque(Blkt2000),
    /// Unrecognized type, kept verbatim.
    Unknown { kind: u16, payload: Vec<u8> },
}

impl Blockette {
    /// Blockette type number.
    pub fn kind(&self) -> u16 {
        match self {
            Self::SampleRate(_) => 100,
            Self::GenericEvent(_) => 200,
            Self::MurdockEvent(_) => 201,
            Self::StepCalibration(_) => 300,
            Self::SineCalibration(_) => 310,
            Self::RandomCalibration(_) => 320,
            Self::GenericCalibration(_) => 390,
            Self::CalibrationAbort(_) => 395,
            Self::Beam(_) => 400,
            Self::BeamDelay(_) => 405,
            Self::Timing(_) => 500,
            Self::DataOnly(_) => 1000,
            Self::DataExtension(_) => 1001,
            Self::Opaque(_) => 2000,
            Self::Unknown { kind, .. } => *kind,
        }
    }

    /// Encoded length including the 4-byte header.
    pub fn encoded_len(&self) -> usize {
        match self {
            Self::Opaque(b) => Blkt2000::FIXED_SIZE + b.payload.len(),
            Self::Unknown { payload, .. } => BLOCKETTE_HEADER_SIZE + payload.len(),
            other => blockette_length(other.kind()).unwrap_or(BLOCKETTE_HEADER_SIZE),
        }
    }

    /// Decode a blockette body (the bytes after the 4-byte header).
    pub fn parse(kind: u16, body: &[u8], order: ByteOrder) -> Result<Self> {
        let needed = match kind {
            2000 => Blkt2000::FIXED_SIZE - BLOCKETTE_HEADER_SIZE,
            k => blockette_length(k).map_or(0, |len| len - BLOCKETTE_HEADER_SIZE),
        };
        if body.len() < needed {
            return Err(MseedError::RecordTooShort {
                expected: needed,
                actual: body.len(),
            });
        }

        let mut r = FieldReader::new(body, order);
        let blockette = match kind {
            100 => Self::SampleRate(Blkt100 {
                sample_rate: r.f32(),
                flags: r.u8(),
                reserved: r.bytes(),
            }),
            200 => Self::GenericEvent(Blkt200 {
                amplitude: r.f32(),
                period: r.f32(),
                background_estimate: r.f32(),
                flags: r.u8(),
                reserved: r.u8(),
                time: r.btime(),
                detector: r.bytes(),
            }),
            201 => Self::MurdockEvent(Blkt201 {
                amplitude: r.f32(),
                period: r.f32(),
                background_estimate: r.f32(),
                flags: r.u8(),
                reserved: r.u8(),
                time: r.btime(),
                snr_values: r.bytes(),
                loopback: r.u8(),
                pick_algorithm: r.u8(),
                detector: r.bytes(),
            }),
            300 => Self::StepCalibration(Blkt300 {
                time: r.btime(),
                num_calibrations: r.u8(),
                flags: r.u8(),
                step_duration: r.u32(),
                interval_duration: r.u32(),
                amplitude: r.f32(),
                input_channel: r.bytes(),
                reserved: r.u8(),
                reference_amplitude: r.u32(),
                coupling: r.bytes(),
                rolloff: r.bytes(),
            }),
            310 => Self::SineCalibration(Blkt310 {
                time: r.btime(),
                reserved1: r.u8(),
                flags: r.u8(),
                duration: r.u32(),
                period: r.f32(),
                amplitude: r.f32(),
                input_channel: r.bytes(),
                reserved2: r.u8(),
                reference_amplitude: r.u32(),
                coupling: r.bytes(),
                rolloff: r.bytes(),
            }),
            320 => Self::RandomCalibration(Blkt320 {
                time: r.btime(),
                reserved1: r.u8(),
                flags: r.u8(),
                duration: r.u32(),
                ptp_amplitude: r.f32(),
                input_channel: r.bytes(),
                reserved2: r.u8(),
                reference_amplitude: r.u32(),
                coupling: r.bytes(),
                rolloff: r.bytes(),
                noise_type: r.bytes(),
            }),
            390 => Self::GenericCalibration(Blkt390 {
                time: r.btime(),
                reserved1: r.u8(),
                flags: r.u8(),
                duration: r.u32(),
                amplitude: r.f32(),
                input_channel: r.bytes(),
                reserved2: r.u8(),
            }),
            395 => Self::CalibrationAbort(Blkt395 {
                time: r.btime(),
                reserved: r.bytes(),
            }),
            400 => Self::Beam(Blkt400 {
                azimuth: r.f32(),
                slowness: r.f32(),
                configuration: r.u16(),
                reserved: r.bytes(),
            }),
            405 => Self::BeamDelay(Blkt405 {
                delay_values: r.u16(),
            }),
            500 => Self::Timing(Blkt500 {
                vco_correction: r.f32(),
                time: r.btime(),
                usec: r.u8() as i8,
                reception_quality: r.u8(),
                exception_count: r.u32(),
                exception_type: r.bytes(),
                clock_model: r.bytes(),
                clock_status: r.bytes(),
            }),
            1000 => Self::DataOnly(Blkt1000 {
                encoding: r.u8(),
                byte_order: r.u8(),
                reclen_exp: r.u8(),
                reserved: r.u8(),
            }),
            1001 => Self::DataExtension(Blkt1001 {
                timing_quality: r.u8(),
                usec: r.u8() as i8,
                reserved: r.u8(),
                frame_count: r.u8(),
            }),
            2000 => {
                let _total_len = r.u16();
                Self::Opaque(Blkt2000 {
                    data_offset: r.u16(),
                    record_number: r.u32(),
                    byte_order: r.u8(),
                    flags: r.u8(),
                    num_header_fields: r.u8(),
                    payload: r.rest().to_vec(),
                })
            }
            kind => Self::Unknown {
                kind,
                payload: body.to_vec(),
            },
        };
        Ok(blockette)
    }

    /// Write the blockette body into `body`, which must be exactly
    /// `encoded_len() - 4` bytes.
    pub(crate) fn write_body(&self, body: &mut [u8], order: ByteOrder) {
        let mut w = FieldWriter::new(body, order);
        match self {
            Self::SampleRate(b) => {
                w.f32(b.sample_rate);
                w.u8(b.flags);
                w.bytes(&b.reserved);
            }
            Self::GenericEvent(b) => {
                w.f32(b.amplitude);
                w.f32(b.period);
                w.f32(b.background_estimate);
                w.u8(b.flags);
                w.u8(b.reserved);
                w.btime(&b.time);
                w.bytes(&b.detector);
            }
            Self::MurdockEvent(b) => {
                w.f32(b.amplitude);
                w.f32(b.period);
                w.f32(b.background_estimate);
                w.u8(b.flags);
                w.u8(b.reserved);
                w.btime(&b.time);
                w.bytes(&b.snr_values);
                w.u8(b.loopback);
                w.u8(b.pick_algorithm);
                w.bytes(&b.detector);
            }
            Self::StepCalibration(b) => {
                w.btime(&b.time);
                w.u8(b.num_calibrations);
                w.u8(b.flags);
                w.u32(b.step_duration);
                w.u32(b.interval_duration);
                w.f32(b.amplitude);
                w.bytes(&b.input_channel);
                w.u8(b.reserved);
                w.u32(b.reference_amplitude);
                w.bytes(&b.coupling);
                w.bytes(&b.rolloff);
            }
            Self::SineCalibration(b) => {
                w.btime(&b.time);
                w.u8(b.reserved1);
                w.u8(b.flags);
                w.u32(b.duration);
                w.f32(b.period);
                w.f32(b.amplitude);
                w.bytes(&b.input_channel);
                w.u8(b.reserved2);
                w.u32(b.reference_amplitude);
                w.bytes(&b.coupling);
                w.bytes(&b.rolloff);
            }
            Self::RandomCalibration(b) => {
                w.btime(&b.time);
                w.u8(b.reserved1);
                w.u8(b.flags);
                w.u32(b.duration);
                w.f32(b.ptp_amplitude);
                w.bytes(&b.input_channel);
                w.u8(b.reserved2);
                w.u32(b.reference_amplitude);
                w.bytes(&b.coupling);
                w.bytes(&b.rolloff);
                w.bytes(&b.noise_type);
            }
            Self::GenericCalibration(b) => {
                w.btime(&b.time);
                w.u8(b.reserved1);
                w.u8(b.flags);
                w.u32(b.duration);
                w.f32(b.amplitude);
                w.bytes(&b.input_channel);
                w.u8(b.reserved2);
            }
            Self::CalibrationAbort(b) => {
                w.btime(&b.time);
                w.bytes(&b.reserved);
            }
            Self::Beam(b) => {
                w.f32(b.azimuth);
                w.f32(b.slowness);
                w.u16(b.configuration);
                w.bytes(&b.reserved);
            }
            Self::BeamDelay(b) => w.u16(b.delay_values),
            Self::Timing(b) => {
                w.f32(b.vco_correction);
                w.btime(&b.time);
                w.u8(b.usec as u8);
                w.u8(b.reception_quality);
                w.u32(b.exception_count);
                w.bytes(&b.exception_type);
                w.bytes(&b.clock_model);
                w.bytes(&b.clock_status);
            }
            Self::DataOnly(b) => {
                w.u8(b.encoding);
                w.u8(b.byte_order);
                w.u8(b.reclen_exp);
                w.u8(b.reserved);
            }
            Self::DataExtension(b) => {
                w.u8(b.timing_quality);
                w.u8(b.usec as u8);
                w.u8(b.reserved);
                w.u8(b.frame_count);
            }
            Self::Opaque(b) => {
                w.u16(self.encoded_len() as u16);
                w.u16(b.data_offset);
                w.u32(b.record_number);
                w.u8(b.byte_order);
                w.u8(b.flags);
                w.u8(b.num_header_fields);
                w.bytes(&b.payload);
            }
            Self::Unknown { payload, .. } => w.bytes(payload),
        }
    }
}

/// Where [`crate::MseedRecord::add_blockette`] places a new blockette.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainPosition {
    Head,
    Tail,
}

/// Walk the blockette chain of a record starting at `first_offset`.
///
/// Chain problems never fail the record: traversal stops and a
/// [`RecordWarning::BlocketteChain`] is reported instead.
pub(crate) fn read_chain(
    record: &[u8],
    first_offset: usize,
    data_offset: usize,
    order: ByteOrder,
) -> (Vec<Blockette>, Vec<RecordWarning>) {
    let reclen = record.len();
    let mut blockettes = Vec::new();
    let mut warnings = Vec::new();
    let stop = |offset: usize, reason: String| {
        warn!("blockette chain at offset {offset}: {reason}");
        RecordWarning::BlocketteChain { offset, reason }
    };

    let mut offset = first_offset;
    if offset != 0 && offset < crate::header::FIXED_HEADER_SIZE {
        warnings.push(stop(offset, "first blockette offset inside fixed header".into()));
        return (blockettes, warnings);
    }

    while offset != 0 && offset < reclen {
        if offset + BLOCKETTE_HEADER_SIZE > reclen {
            warnings.push(stop(offset, "blockette header exceeds record length".into()));
            break;
        }
        let kind = order.read_u16(record, offset);
        let next = order.read_u16(record, offset + 2) as usize;

        let length = match kind {
            2000 if offset + 6 <= reclen => order.read_u16(record, offset + 4) as usize,
            2000 => 0,
            k => blockette_length(k).unwrap_or_else(|| {
                if next > offset {
                    next - offset
                } else if data_offset > offset {
                    data_offset - offset
                } else {
                    0
                }
            }),
        };

        let min_length = if kind == 2000 {
            Blkt2000::FIXED_SIZE
        } else {
            BLOCKETTE_HEADER_SIZE
        };
        if length < min_length {
            warnings.push(stop(offset, format!("unknown blockette length for type {kind}")));
            break;
        }
        if offset + length > reclen {
            warnings.push(stop(
                offset,
                format!("blockette {kind} ({length} bytes) extends beyond record"),
            ));
            break;
        }

        let body = &record[offset + BLOCKETTE_HEADER_SIZE..offset + length];
        match Blockette::parse(kind, body, order) {
            Ok(b) => blockettes.push(b),
            Err(e) => {
                warnings.push(stop(offset, format!("blockette {kind}: {e}")));
                break;
            }
        }

        if next != 0 && next <= offset {
            warnings.push(stop(offset, format!("next blockette offset ({next}) did not increase")));
            break;
        }
        if next > reclen {
            warnings.push(stop(
                offset,
                format!("next blockette offset ({next}) beyond record length ({reclen})"),
            ));
            break;
        }
        offset = next;
    }

    (blockettes, warnings)
}

/// Write `blockettes` into `buf` starting at `start`, linking each
/// next-offset and stopping before `limit`. Returns the number written and
/// the offset just past the last one.
pub(crate) fn write_chain(
    blockettes: &[Blockette],
    buf: &mut [u8],
    start: usize,
    limit: usize,
    order: ByteOrder,
) -> (usize, usize) {
    let mut offset = start;
    let mut previous: Option<usize> = None;
    let mut written = 0;

    for blockette in blockettes {
        let len = blockette.encoded_len();
        if offset + len > limit || offset + len > u16::MAX as usize {
            warn!(
                "blockette {} ({} bytes) does not fit before offset {limit}, chain truncated",
                blockette.kind(),
                len
            );
            break;
        }
        if let Some(prev) = previous {
            order.write_u16(buf, prev + 2, offset as u16);
        }
        order.write_u16(buf, offset, blockette.kind());
        order.write_u16(buf, offset + 2, 0);
        blockette.write_body(&mut buf[offset + BLOCKETTE_HEADER_SIZE..offset + len], order);
        previous = Some(offset);
        offset += len;
        written += 1;
    }

    (written, offset)
}

/// Trim NUL and space padding from a fixed-width text field.
pub fn field_text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches(['\0', ' '])
        .to_string()
}

struct FieldReader<'a> {
    data: &'a [u8],
    pos: usize,
    order: ByteOrder,
}

impl<'a> FieldReader<'a> {
    fn new(data: &'a [u8], order: ByteOrder) -> Self {
        Self {
            data,
            pos: 0,
            order,
        }
    }

    fn u8(&mut self) -> u8 {
        let v = self.data[self.pos];
        self.pos += 1;
        v
    }

    fn u16(&mut self) -> u16 {
        let v = self.order.read_u16(self.data, self.pos);
        self.pos += 2;
        v
    }

    fn u32(&mut self) -> u32 {
        let v = self.order.read_u32(self.data, self.pos);
        self.pos += 4;
        v
    }

    fn f32(&mut self) -> f32 {
        let v = self.order.read_f32(self.data, self.pos);
        self.pos += 4;
        v
    }

    fn btime(&mut self) -> BTime {
        let v = BTime::parse(self.data, self.pos, self.order);
        self.pos += BTime::SIZE;
        v
    }

    fn bytes<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.data[self.pos..self.pos + N]);
        self.pos += N;
        out
    }

    fn rest(&mut self) -> &'a [u8] {
        let rest = &self.data[self.pos..];
        self.pos = self.data.len();
        rest
    }
}

struct FieldWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
    order: ByteOrder,
}

impl<'a> FieldWriter<'a> {
    fn new(buf: &'a mut [u8], order: ByteOrder) -> Self {
        Self { buf, pos: 0, order }
    }

    fn u8(&mut self, v: u8) {
        self.buf[self.pos] = v;
        self.pos += 1;
    }

    fn u16(&mut self, v: u16) {
        self.order.write_u16(self.buf, self.pos, v);
        self.pos += 2;
    }

    fn u32(&mut self, v: u32) {
        self.order.write_u32(self.buf, self.pos, v);
        self.pos += 4;
    }

    fn f32(&mut self, v: f32) {
        self.order.write_f32(self.buf, self.pos, v);
        self.pos += 4;
    }

    fn btime(&mut self, t: &BTime) {
        t.write(self.buf, self.pos, self.order);
        self.pos += BTime::SIZE;
    }

    fn bytes(&mut self, v: &[u8]) {
        self.buf[self.pos..self.pos + v.len()].copy_from_slice(v);
        self.pos += v.len();
    }
}
