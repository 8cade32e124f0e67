//! Error types for Mini-SEED unpacking, packing, and trace assembly.

use thiserror::Error;

use crate::types::SampleType;

#[derive(Debug, Error)]
pub enum MseedError {
    #[error("record too short: expected at least {expected} bytes, got {actual}")]
    RecordTooShort { expected: usize, actual: usize },

    #[error("invalid fixed header: {0}")]
    InvalidHeader(String),

    #[error("record header does not have a valid data indicator: {0:?}")]
    InvalidDataIndicator(char),

    #[error("record length {0} is outside the range 256..=1048576")]
    RecordLengthOutOfRange(usize),

    #[error("record length {0} is not a power of two")]
    RecordLengthNotPowerOfTwo(usize),

    #[error("detected record length {detected} differs from read length {read}")]
    WrongLength { detected: usize, read: usize },

    #[error("data is not SEED: {0}")]
    NotSeed(String),

    #[error("unsupported encoding format: {0}")]
    UnsupportedEncoding(u8),

    #[error("data encoding could not be determined")]
    UnknownEncoding,

    #[error("steim decode error: {0}")]
    SteimDecode(String),

    #[error("sample type mismatch: expected '{expected}', found '{found}'")]
    SampleTypeMismatch {
        expected: SampleType,
        found: SampleType,
    },

    #[error("encode error: {0}")]
    EncodeError(String),

    #[error("invalid time: {0}")]
    Time(String),

    #[error("sample rate {0} cannot be represented as factor and multiplier")]
    SampleRate(f64),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("at byte offset {offset}: {source}")]
    AtOffset {
        offset: u64,
        #[source]
        source: Box<MseedError>,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl MseedError {
    /// Attach the stream position at which this error was raised.
    pub fn at_offset(self, offset: u64) -> Self {
        match self {
            already @ MseedError::AtOffset { .. } => already,
            other => MseedError::AtOffset {
                offset,
                source: Box::new(other),
            },
        }
    }

    /// True when the error concerns a single record (structural or
    /// encoding problems), so a stream caller may skip the record and
    /// continue. I/O and configuration errors return false.
    pub fn is_record_level(&self) -> bool {
        match self {
            MseedError::AtOffset { source, .. } => source.is_record_level(),
            MseedError::Io(_) | MseedError::InvalidConfig(_) => false,
            _ => true,
        }
    }
}

pub type Result<T> = std::result::Result<T, MseedError>;
