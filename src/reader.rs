//! Readers for concatenated Mini-SEED records.
//!
//! [`MseedReader`] iterates over records in a byte slice. [`MseedFileReader`]
//! pulls records from any [`Read`] source, detecting record lengths as it
//! goes, and reports the byte offset of every record.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use log::{debug, warn};

use crate::config::UnpackConfig;
use crate::decode;
use crate::header::{
    FIXED_HEADER_SIZE, MAX_RECORD_LENGTH, MIN_RECORD_LENGTH, infer_byte_order, is_valid_header,
};
use crate::record::MseedRecord;
use crate::trace::{RateTolerance, TimeTolerance, TraceGroup};
use crate::types::is_data_indicator;
use crate::{MseedError, Result};

/// Largest window searched for Blockette 1000 during length detection.
pub const MAX_DETECT_LENGTH: usize = 8192;

/// Outcome of [`find_record_length`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detection {
    /// The buffer does not start with a data record header.
    NotData,
    /// A data record starts here but its length could not be determined.
    Undetermined,
    /// Record length in bytes.
    Length(usize),
}

/// Determine the length of the record at the start of `record`.
///
/// The header must pass [`is_valid_header`]. The blockette chain is then
/// searched within `record` for Blockette 1000. Without one, `following`
/// decides: the bytes right after `record` confirm `record.len()` as the
/// length when they hold a valid header, or when fewer than a header's
/// worth remain (end of data). `None` skips that check.
pub fn find_record_length(record: &[u8], following: Option<&[u8]>) -> Detection {
    if !is_valid_header(record) {
        return Detection::NotData;
    }

    let order = infer_byte_order(record);
    let mut offset = order.read_u16(record, 46) as usize;
    while offset != 0 && offset + 8 <= record.len() {
        let kind = order.read_u16(record, offset);
        let next = order.read_u16(record, offset + 2) as usize;
        if kind == 1000 {
            let exp = record[offset + 6];
            return if exp < 32 {
                Detection::Length(1 << exp)
            } else {
                Detection::Undetermined
            };
        }
        if next <= offset {
            break;
        }
        offset = next;
    }

    match following {
        Some(next) if next.len() < FIXED_HEADER_SIZE || is_valid_header(next) => {
            Detection::Length(record.len())
        }
        _ => Detection::Undetermined,
    }
}

/// Try doubling windows from the minimum record length up to
/// [`MAX_DETECT_LENGTH`]. `buf` must hold everything available up to
/// `MAX_DETECT_LENGTH` plus one header, so a short buffer means end of
/// data.
fn detect(buf: &[u8]) -> Detection {
    let mut trial = MIN_RECORD_LENGTH;
    while trial <= MAX_DETECT_LENGTH && trial <= buf.len() {
        let following = &buf[trial..buf.len().min(trial + FIXED_HEADER_SIZE)];
        match find_record_length(&buf[..trial], Some(following)) {
            Detection::Undetermined => trial *= 2,
            found => return found,
        }
    }
    if buf.len() >= FIXED_HEADER_SIZE && !is_valid_header(buf) {
        Detection::NotData
    } else {
        Detection::Undetermined
    }
}

fn check_length(len: usize) -> Result<usize> {
    if (MIN_RECORD_LENGTH..=MAX_RECORD_LENGTH).contains(&len) {
        Ok(len)
    } else {
        Err(MseedError::RecordLengthOutOfRange(len))
    }
}

/// Iterator over Mini-SEED v2 records in a byte slice.
///
/// Each call to `next()` detects the length of the next record, decodes
/// it and advances past it. Iteration stops when fewer bytes than a
/// minimum-length record remain, or after the first error.
///
/// # Example
///
/// ```
/// use mseed_codec::{encode, EncodingFormat, MseedRecord, MseedReader, Samples};
///
/// let record = MseedRecord::new()
///     .with_nslc("XX", "TEST", "00", "BHZ")
///     .with_record_length(512)
///     .with_encoding(EncodingFormat::Int32)
///     .with_samples(Samples::Int(vec![1, 2, 3]));
/// let data = encode(&record).unwrap();
///
/// let records: Vec<_> = MseedReader::new(&data)
///     .collect::<Result<Vec<_>, _>>()
///     .unwrap();
/// assert_eq!(records.len(), 1);
/// ```
pub struct MseedReader<'a> {
    data: &'a [u8],
    offset: usize,
    config: UnpackConfig,
    unpack_data: bool,
}

impl<'a> MseedReader<'a> {
    /// Create a new reader over the given byte slice.
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            offset: 0,
            config: UnpackConfig::default(),
            unpack_data: true,
        }
    }

    pub fn with_config(mut self, config: UnpackConfig) -> Self {
        self.config = config;
        self
    }

    /// Skip sample decoding; records carry headers and blockettes only.
    pub fn headers_only(mut self) -> Self {
        self.unpack_data = false;
        self
    }

    /// Byte offset of the next record.
    pub fn offset(&self) -> usize {
        self.offset
    }

    fn fail(&mut self, err: MseedError) -> Option<Result<MseedRecord>> {
        let at = self.offset as u64;
        self.offset = self.data.len();
        Some(Err(err.at_offset(at)))
    }
}

impl Iterator for MseedReader<'_> {
    type Item = Result<MseedRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        let remaining = self.data.get(self.offset..)?;
        if remaining.len() < MIN_RECORD_LENGTH {
            return None;
        }

        let window = &remaining[..remaining.len().min(MAX_DETECT_LENGTH + FIXED_HEADER_SIZE)];
        let record_length = match detect(window) {
            Detection::Length(len) => match check_length(len) {
                Ok(len) => len,
                Err(e) => return self.fail(e),
            },
            Detection::NotData => {
                return self.fail(MseedError::NotSeed("no data record header".into()));
            }
            Detection::Undetermined => {
                return self.fail(MseedError::NotSeed("cannot detect record length".into()));
            }
        };

        if remaining.len() < record_length {
            return None;
        }

        match decode::unpack(&remaining[..record_length], &self.config, self.unpack_data) {
            Ok(record) => {
                self.offset += record_length;
                Some(Ok(record))
            }
            Err(e) => self.fail(e),
        }
    }
}

/// How [`MseedFileReader`] determines record lengths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordLength {
    /// Every record has this length.
    Fixed(usize),
    /// Detect the first record's length and assume it for the rest.
    #[default]
    DetectOnce,
    /// Detect the length of every record.
    DetectEach,
}

/// A record and its position in the stream.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadRecord {
    pub record: MseedRecord,
    /// Byte offset of the record's first byte.
    pub offset: u64,
    /// True when no data follows this record.
    pub last: bool,
}

/// Record-at-a-time reader over a byte stream.
///
/// The reader owns its source, a read-ahead buffer and the detected
/// record length. [`read_record`](Self::read_record) returns one record
/// per call and `Ok(None)` at the end of the stream. Errors carry the
/// byte offset of the record that raised them; after a record-level
/// error (see [`MseedError::is_record_level`]) the offending bytes have
/// been consumed and reading may continue.
pub struct MseedFileReader<R> {
    inner: Option<R>,
    buffer: Vec<u8>,
    eof: bool,
    position: u64,
    length: RecordLength,
    detected: Option<usize>,
    skip_not_data: bool,
    config: UnpackConfig,
    unpack_data: bool,
    records_read: usize,
    failed: bool,
}

impl MseedFileReader<BufReader<File>> {
    /// Open a file for reading.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        debug!("opened {}", path.as_ref().display());
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: Read> MseedFileReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner: Some(inner),
            buffer: Vec::new(),
            eof: false,
            position: 0,
            length: RecordLength::default(),
            detected: None,
            skip_not_data: false,
            config: UnpackConfig::default(),
            unpack_data: true,
            records_read: 0,
            failed: false,
        }
    }

    pub fn with_record_length(mut self, length: RecordLength) -> Self {
        self.length = length;
        self
    }

    /// Skip chunks that do not hold data records instead of failing.
    pub fn skip_not_data(mut self, skip: bool) -> Self {
        self.skip_not_data = skip;
        self
    }

    pub fn with_config(mut self, config: UnpackConfig) -> Self {
        self.config = config;
        self
    }

    /// Skip sample decoding; records carry headers and blockettes only.
    pub fn headers_only(mut self) -> Self {
        self.unpack_data = false;
        self
    }

    /// Byte offset of the next unread byte.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Record length found by detection, if any.
    pub fn detected_length(&self) -> Option<usize> {
        self.detected
    }

    /// Read the next record. Returns `Ok(None)` at the end of the stream.
    ///
    /// A stream that ends before any record was read is
    /// [`MseedError::NotSeed`]. Trailing bytes too short for a record end
    /// the stream with a warning.
    pub fn read_record(&mut self) -> Result<Option<ReadRecord>> {
        self.config.validate()?;
        loop {
            if self.inner.is_none() {
                return Ok(None);
            }
            let offset = self.position;

            let reclen = match (self.length, self.detected) {
                (RecordLength::Fixed(len), _) => check_length(len).map_err(|e| e.at_offset(offset))?,
                (RecordLength::DetectOnce, Some(len)) => len,
                _ => {
                    self.fill(MAX_DETECT_LENGTH + FIXED_HEADER_SIZE)?;
                    if self.buffer.len() < MIN_RECORD_LENGTH {
                        self.drop_trailing(offset);
                        return self.end_of_stream(offset);
                    }
                    match detect(&self.buffer) {
                        Detection::Length(len) => {
                            let len = check_length(len).map_err(|e| {
                                self.discard(MIN_RECORD_LENGTH);
                                e.at_offset(offset)
                            })?;
                            debug!("detected record length of {len} bytes at offset {offset}");
                            len
                        }
                        Detection::NotData if self.skip_not_data => {
                            debug!("skipped non-data record at byte offset {offset}");
                            self.discard(MIN_RECORD_LENGTH);
                            continue;
                        }
                        other => {
                            self.discard(MIN_RECORD_LENGTH);
                            let reason = if other == Detection::NotData {
                                "no data record header"
                            } else {
                                "cannot detect record length"
                            };
                            return Err(MseedError::NotSeed(reason.into()).at_offset(offset));
                        }
                    }
                }
            };

            self.fill(reclen)?;
            if self.buffer.len() < reclen {
                self.drop_trailing(offset);
                return self.end_of_stream(offset);
            }

            if self.skip_not_data && !is_data_indicator(self.buffer[6]) {
                debug!("skipped non-data record at byte offset {offset}");
                self.discard(reclen);
                continue;
            }

            let raw: Vec<u8> = self.buffer.drain(..reclen).collect();
            self.position += reclen as u64;
            self.fill(1)?;
            let last = self.buffer.is_empty();

            let record = decode::unpack(&raw, &self.config, self.unpack_data)
                .map_err(|e| e.at_offset(offset))?;

            if self.length != RecordLength::DetectEach {
                if let Some(declared) = record.blkt1000().and_then(|b| b.record_length()) {
                    if declared != reclen {
                        return Err(MseedError::WrongLength {
                            detected: declared,
                            read: reclen,
                        }
                        .at_offset(offset));
                    }
                }
            }

            if !matches!(self.length, RecordLength::Fixed(_)) {
                self.detected = Some(reclen);
            }
            self.records_read += 1;
            return Ok(Some(ReadRecord {
                record,
                offset,
                last,
            }));
        }
    }

    /// Release the source and buffers. Further reads return `Ok(None)`.
    /// Calling it again has no effect.
    pub fn close(&mut self) {
        if self.inner.take().is_some() {
            debug!("closed reader after {} records", self.records_read);
        }
        self.buffer = Vec::new();
        self.detected = None;
        self.eof = true;
    }

    /// Read every remaining record into a trace group.
    pub fn read_traces(
        &mut self,
        time_tol: TimeTolerance,
        rate_tol: RateTolerance,
    ) -> Result<TraceGroup> {
        let mut group = TraceGroup::new();
        while let Some(read) = self.read_record()? {
            group
                .add_record(&read.record, time_tol, rate_tol)
                .map_err(|e| e.at_offset(read.offset))?;
        }
        Ok(group)
    }

    fn end_of_stream(&mut self, offset: u64) -> Result<Option<ReadRecord>> {
        if self.records_read == 0 {
            self.close();
            return Err(MseedError::NotSeed("no data records read".into()).at_offset(offset));
        }
        Ok(None)
    }

    fn drop_trailing(&mut self, offset: u64) {
        if !self.buffer.is_empty() {
            warn!(
                "{} trailing bytes at offset {offset} are too short for a record",
                self.buffer.len()
            );
            self.discard(self.buffer.len());
        }
    }

    fn discard(&mut self, n: usize) {
        let n = n.min(self.buffer.len());
        self.buffer.drain(..n);
        self.position += n as u64;
    }

    /// Read until the buffer holds `want` bytes or the source is exhausted.
    fn fill(&mut self, want: usize) -> Result<()> {
        let Some(inner) = self.inner.as_mut() else {
            return Ok(());
        };
        while self.buffer.len() < want && !self.eof {
            let start = self.buffer.len();
            self.buffer.resize(want, 0);
            match inner.read(&mut self.buffer[start..]) {
                Ok(0) => {
                    self.buffer.truncate(start);
                    self.eof = true;
                }
                Ok(n) => self.buffer.truncate(start + n),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => self.buffer.truncate(start),
                Err(e) => {
                    self.buffer.truncate(start);
                    return Err(MseedError::from(e).at_offset(self.position));
                }
            }
        }
        Ok(())
    }
}

/// Iterates until the end of the stream or the first error.
impl<R: Read> Iterator for MseedFileReader<R> {
    type Item = Result<ReadRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.read_record() {
            Ok(Some(read)) => Some(Ok(read)),
            Ok(None) => None,
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

/// Read a whole file into a trace group.
pub fn read_traces<P: AsRef<Path>>(
    path: P,
    length: RecordLength,
    time_tol: TimeTolerance,
    rate_tol: RateTolerance,
) -> Result<TraceGroup> {
    let mut reader = MseedFileReader::open(path)?.with_record_length(length);
    let group = reader.read_traces(time_tol, rate_tol);
    reader.close();
    group
}
