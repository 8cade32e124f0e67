//! The Mini-SEED v2 record type.
//!
//! [`MseedRecord`] is produced by the unpacker and consumed by the packer
//! and the trace assembler. It carries the decoded identity, timing and
//! samples, the typed blockette chain, and any non-fatal warnings raised
//! while unpacking.

use std::fmt;

use chrono::Utc;

use crate::blockette::{Blkt100, Blkt1000, Blkt1001, Blockette, ChainPosition};
use crate::header::FixedHeader;
use crate::samplerate;
use crate::time::{self, HPTMODULUS, HpTime};
use crate::types::{ByteOrder, EncodingFormat, SampleType};

/// Default record length used by [`MseedRecord::new`].
pub const DEFAULT_RECORD_LENGTH: usize = 4096;

/// A decoded (or to-be-packed) Mini-SEED v2 record.
#[derive(Debug, Clone, PartialEq)]
pub struct MseedRecord {
    pub sequence_number: u32,
    pub quality: char,
    pub network: String,
    pub station: String,
    pub location: String,
    pub channel: String,

    /// Start time with the time correction and Blockette 1001
    /// microseconds applied.
    pub start_time: HpTime,
    /// Blockette 100 rate when present, otherwise the nominal rate.
    pub sample_rate: f64,
    /// Number of samples declared by the header.
    pub sample_count: usize,

    /// `None` until known; the packer defaults to Steim2.
    pub encoding: Option<EncodingFormat>,
    /// Byte order of the data payload; the packer defaults to big endian.
    pub byte_order: Option<ByteOrder>,
    pub record_length: usize,

    pub blockettes: Vec<Blockette>,
    pub samples: Samples,

    /// Raw fixed header as read. The packer reuses its flags and time
    /// correction.
    pub header: FixedHeader,
    /// Non-fatal problems found while unpacking this record.
    pub warnings: Vec<RecordWarning>,
}

impl MseedRecord {
    /// Create an empty record.
    ///
    /// Defaults: sequence 1, quality 'D', empty NSLC, epoch start,
    /// 1 Hz, 4096-byte records, encoding and byte order unset, no samples.
    pub fn new() -> Self {
        Self {
            sequence_number: 1,
            quality: 'D',
            network: String::new(),
            station: String::new(),
            location: String::new(),
            channel: String::new(),
            start_time: 0,
            sample_rate: 1.0,
            sample_count: 0,
            encoding: None,
            byte_order: None,
            record_length: DEFAULT_RECORD_LENGTH,
            blockettes: Vec::new(),
            samples: Samples::Int(vec![]),
            header: FixedHeader::default(),
            warnings: Vec::new(),
        }
    }

    /// Set network, station, location, and channel codes.
    pub fn with_nslc(
        mut self,
        network: &str,
        station: &str,
        location: &str,
        channel: &str,
    ) -> Self {
        self.network = network.into();
        self.station = station.into();
        self.location = location.into();
        self.channel = channel.into();
        self
    }

    pub fn with_start_time(mut self, time: HpTime) -> Self {
        self.start_time = time;
        self
    }

    /// Set the sample rate in Hz.
    pub fn with_sample_rate(mut self, rate: f64) -> Self {
        self.sample_rate = rate;
        self
    }

    pub fn with_encoding(mut self, enc: EncodingFormat) -> Self {
        self.encoding = Some(enc);
        self
    }

    pub fn with_byte_order(mut self, order: ByteOrder) -> Self {
        self.byte_order = Some(order);
        self
    }

    /// Set the sample data and the declared sample count.
    pub fn with_samples(mut self, samples: Samples) -> Self {
        self.sample_count = samples.len();
        self.samples = samples;
        self
    }

    /// Set the record length (a power of two, 256 to 1048576).
    pub fn with_record_length(mut self, len: usize) -> Self {
        self.record_length = len;
        self
    }

    pub fn with_quality(mut self, quality: char) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_sequence_number(mut self, seq: u32) -> Self {
        self.sequence_number = seq;
        self
    }

    /// Append a blockette to the chain.
    pub fn with_blockette(mut self, blockette: Blockette) -> Self {
        self.add_blockette(blockette, ChainPosition::Tail);
        self
    }

    /// Insert a blockette at the head or tail of the chain.
    pub fn add_blockette(&mut self, blockette: Blockette, position: ChainPosition) {
        match position {
            ChainPosition::Head => self.blockettes.insert(0, blockette),
            ChainPosition::Tail => self.blockettes.push(blockette),
        }
    }

    /// Return the NSLC identifier: `"NET.STA.LOC.CHA"`.
    pub fn nslc(&self) -> String {
        format!(
            "{}.{}.{}.{}",
            self.network, self.station, self.location, self.channel
        )
    }

    /// Source name used for trace matching and sorting:
    /// `"NET_STA_LOC_CHAN"`.
    pub fn source_name(&self) -> String {
        source_name(&self.network, &self.station, &self.location, &self.channel)
    }

    /// Time of the last sample.
    pub fn end_time(&self) -> HpTime {
        end_time(self.start_time, self.sample_count, self.sample_rate)
    }

    /// Rate from the header factor and multiplier, ignoring Blockette 100.
    pub fn nominal_sample_rate(&self) -> f64 {
        samplerate::nominal_rate(self.header.samprate_factor, self.header.samprate_multiplier)
    }

    /// Seconds between the last sample and the host clock.
    pub fn host_latency(&self) -> f64 {
        let now = Utc::now().timestamp_micros();
        let span = if self.sample_rate > 0.0 && self.sample_count > 0 {
            (self.sample_count as f64 / self.sample_rate * HPTMODULUS as f64) as i64
        } else {
            0
        };
        (now - (self.start_time + span)) as f64 / HPTMODULUS as f64
    }

    pub fn blkt100(&self) -> Option<&Blkt100> {
        self.blockettes.iter().find_map(|b| match b {
            Blockette::SampleRate(v) => Some(v),
            _ => None,
        })
    }

    pub fn blkt1000(&self) -> Option<&Blkt1000> {
        self.blockettes.iter().find_map(|b| match b {
            Blockette::DataOnly(v) => Some(v),
            _ => None,
        })
    }

    pub fn blkt1001(&self) -> Option<&Blkt1001> {
        self.blockettes.iter().find_map(|b| match b {
            Blockette::DataExtension(v) => Some(v),
            _ => None,
        })
    }

    /// True when any Steim integrity check failed for this record.
    pub fn has_integrity_warning(&self) -> bool {
        self.warnings
            .iter()
            .any(|w| matches!(w, RecordWarning::SteimIntegrity { .. }))
    }
}

impl Default for MseedRecord {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MseedRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let start = time::hptime_to_seed_string(self.start_time)
            .unwrap_or_else(|_| self.start_time.to_string());
        write!(
            f,
            "{}, {:06}, {}, {}, {} samples, {} Hz, {}",
            self.source_name(),
            self.sequence_number,
            self.quality,
            self.record_length,
            self.sample_count,
            self.sample_rate,
            start,
        )
    }
}

/// `"NET_STA_LOC_CHAN"` from identity codes.
pub fn source_name(network: &str, station: &str, location: &str, channel: &str) -> String {
    format!("{network}_{station}_{location}_{channel}")
}

/// Time of the last of `count` samples starting at `start`.
pub fn end_time(start: HpTime, count: usize, rate: f64) -> HpTime {
    if rate > 0.0 && count > 0 {
        start + ((count - 1) as f64 / rate * HPTMODULUS as f64 + 0.5) as i64
    } else {
        start
    }
}

/// A non-fatal problem found while unpacking a record.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordWarning {
    /// Chain traversal stopped early at `offset`.
    BlocketteChain { offset: usize, reason: String },
    /// No Blockette 1000; encoding and byte order came from fallbacks.
    MissingBlockette1000,
    /// Blockette 1000 declares a different length than the buffer.
    RecordLengthMismatch { declared: usize, actual: usize },
    /// The decoder produced a different count than the header declares.
    SampleCountMismatch { declared: usize, decoded: usize },
    /// The last integrated Steim sample does not equal XN.
    SteimIntegrity { last: i32, xn: i32 },
}

impl fmt::Display for RecordWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BlocketteChain { offset, reason } => {
                write!(f, "blockette chain truncated at offset {offset}: {reason}")
            }
            Self::MissingBlockette1000 => write!(f, "no Blockette 1000 found"),
            Self::RecordLengthMismatch { declared, actual } => write!(
                f,
                "record length in Blockette 1000 ({declared}) != actual length ({actual})"
            ),
            Self::SampleCountMismatch { declared, decoded } => {
                write!(f, "header declares {declared} samples, decoded {decoded}")
            }
            Self::SteimIntegrity { last, xn } => write!(
                f,
                "data integrity check failed, last_data={last}, xn={xn}"
            ),
        }
    }
}

/// Decoded sample data.
#[derive(Debug, Clone, PartialEq)]
pub enum Samples {
    Int(Vec<i32>),
    Float(Vec<f32>),
    Double(Vec<f64>),
    Ascii(Vec<u8>),
}

impl Samples {
    /// An empty buffer of the given type.
    pub fn empty(sample_type: SampleType) -> Self {
        match sample_type {
            SampleType::Int => Self::Int(vec![]),
            SampleType::Float => Self::Float(vec![]),
            SampleType::Double => Self::Double(vec![]),
            SampleType::Ascii => Self::Ascii(vec![]),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Samples::Int(v) => v.len(),
            Samples::Float(v) => v.len(),
            Samples::Double(v) => v.len(),
            Samples::Ascii(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn sample_type(&self) -> SampleType {
        match self {
            Samples::Int(_) => SampleType::Int,
            Samples::Float(_) => SampleType::Float,
            Samples::Double(_) => SampleType::Double,
            Samples::Ascii(_) => SampleType::Ascii,
        }
    }

    /// Lossy conversion to 32-bit floats for writers that only store
    /// floats. ASCII bytes convert to their code values.
    pub fn to_f32(&self) -> Vec<f32> {
        match self {
            Samples::Int(v) => v.iter().map(|&x| x as f32).collect(),
            Samples::Float(v) => v.clone(),
            Samples::Double(v) => v.iter().map(|&x| x as f32).collect(),
            Samples::Ascii(v) => v.iter().map(|&x| f32::from(x)).collect(),
        }
    }

    /// Copy of the samples in `range`.
    pub fn slice(&self, range: std::ops::Range<usize>) -> Samples {
        match self {
            Samples::Int(v) => Samples::Int(v[range].to_vec()),
            Samples::Float(v) => Samples::Float(v[range].to_vec()),
            Samples::Double(v) => Samples::Double(v[range].to_vec()),
            Samples::Ascii(v) => Samples::Ascii(v[range].to_vec()),
        }
    }

    /// Remove the first `n` samples.
    pub fn drain_front(&mut self, n: usize) {
        let n = n.min(self.len());
        match self {
            Samples::Int(v) => drop(v.drain(..n)),
            Samples::Float(v) => drop(v.drain(..n)),
            Samples::Double(v) => drop(v.drain(..n)),
            Samples::Ascii(v) => drop(v.drain(..n)),
        }
    }

    /// Append `other` after the existing samples. Returns `false` and
    /// leaves `self` unchanged when the types differ.
    pub fn extend_back(&mut self, other: &Samples) -> bool {
        match (self, other) {
            (Samples::Int(a), Samples::Int(b)) => a.extend_from_slice(b),
            (Samples::Float(a), Samples::Float(b)) => a.extend_from_slice(b),
            (Samples::Double(a), Samples::Double(b)) => a.extend_from_slice(b),
            (Samples::Ascii(a), Samples::Ascii(b)) => a.extend_from_slice(b),
            _ => return false,
        }
        true
    }

    /// Insert `other` before the existing samples. Returns `false` and
    /// leaves `self` unchanged when the types differ.
    pub fn extend_front(&mut self, other: &Samples) -> bool {
        fn prepend<T: Clone>(a: &mut Vec<T>, b: &[T]) {
            a.splice(0..0, b.iter().cloned());
        }
        match (self, other) {
            (Samples::Int(a), Samples::Int(b)) => prepend(a, b),
            (Samples::Float(a), Samples::Float(b)) => prepend(a, b),
            (Samples::Double(a), Samples::Double(b)) => prepend(a, b),
            (Samples::Ascii(a), Samples::Ascii(b)) => prepend(a, b),
            _ => return false,
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockette::Blkt1000;

    #[test]
    fn test_builder_defaults() {
        let r = MseedRecord::new().with_nslc("XX", "TEST", "", "TID");
        assert_eq!(r.sequence_number, 1);
        assert_eq!(r.quality, 'D');
        assert_eq!(r.record_length, 4096);
        assert_eq!(r.encoding, None);
        assert_eq!(r.nslc(), "XX.TEST..TID");
        assert_eq!(r.source_name(), "XX_TEST__TID");
    }

    #[test]
    fn test_end_time() {
        let r = MseedRecord::new()
            .with_sample_rate(1.0)
            .with_samples(Samples::Int(vec![0; 100]));
        assert_eq!(r.end_time(), 99 * HPTMODULUS);

        let r = r.with_sample_rate(40.0);
        assert_eq!(r.end_time(), 2_475_000);

        assert_eq!(end_time(5, 0, 1.0), 5);
        assert_eq!(end_time(5, 10, 0.0), 5);
    }

    #[test]
    fn test_add_blockette_positions() {
        let mut r = MseedRecord::new();
        r.add_blockette(
            Blockette::DataExtension(Blkt1001::default()),
            ChainPosition::Tail,
        );
        r.add_blockette(
            Blockette::DataOnly(Blkt1000::default()),
            ChainPosition::Head,
        );
        assert_eq!(r.blockettes[0].kind(), 1000);
        assert_eq!(r.blockettes[1].kind(), 1001);
        assert!(r.blkt1000().is_some());
        assert!(r.blkt1001().is_some());
        assert!(r.blkt100().is_none());
    }

    #[test]
    fn test_samples_splicing() {
        let mut s = Samples::Int(vec![3, 4]);
        assert!(s.extend_front(&Samples::Int(vec![1, 2])));
        assert!(s.extend_back(&Samples::Int(vec![5])));
        assert_eq!(s, Samples::Int(vec![1, 2, 3, 4, 5]));
        assert!(!s.extend_back(&Samples::Float(vec![1.0])));
        s.drain_front(2);
        assert_eq!(s, Samples::Int(vec![3, 4, 5]));
        assert_eq!(s.slice(1..3), Samples::Int(vec![4, 5]));
        assert_eq!(s.to_f32(), vec![3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_display_line() {
        let r = MseedRecord::new()
            .with_nslc("XX", "TEST", "", "TID")
            .with_sample_rate(20.0)
            .with_samples(Samples::Int(vec![1, 2, 3]));
        assert_eq!(
            r.to_string(),
            "XX_TEST__TID, 000001, D, 4096, 3 samples, 20 Hz, 1970,001,00:00:00.000000"
        );
    }

    #[test]
    fn test_host_latency() {
        let now = Utc::now().timestamp_micros();
        let r = MseedRecord::new()
            .with_start_time(now - 100 * HPTMODULUS)
            .with_samples(Samples::Int(vec![0; 40]));
        let latency = r.host_latency();
        assert!((59.0..70.0).contains(&latency), "latency {latency}");
    }
}
