//! Pure Rust Mini-SEED v2 record codec.
//!
//! Zero `unsafe`, zero C dependencies. Unpacks and packs fixed-length
//! SEED data records with Steim1/2 compression or uncompressed
//! INT16/32, FLOAT32/64 and ASCII payloads, walks the blockette chain,
//! detects record lengths in files, and assembles records into
//! continuous traces with gap reporting.
//!
//! # Decoding a record
//!
//! ```
//! use mseed_codec::{decode, encode, MseedRecord, Samples};
//!
//! let record = MseedRecord::new()
//!     .with_nslc("IU", "ANMO", "00", "BHZ")
//!     .with_sample_rate(20.0)
//!     .with_samples(Samples::Int(vec![100, 200, 300]));
//!
//! let bytes = encode(&record).unwrap();
//! let decoded = decode(&bytes).unwrap();
//!
//! assert_eq!(decoded.network, "IU");
//! assert_eq!(decoded.station, "ANMO");
//! assert_eq!(decoded.samples, Samples::Int(vec![100, 200, 300]));
//! ```
//!
//! # Packing a long series
//!
//! ```
//! use mseed_codec::{pack, EncodingFormat, MseedRecord, PackConfig, Samples};
//!
//! let mut record = MseedRecord::new()
//!     .with_nslc("XX", "TEST", "", "TID")
//!     .with_record_length(512)
//!     .with_encoding(EncodingFormat::Steim2)
//!     .with_samples(Samples::Int((0..1000).collect()));
//!
//! let mut records = Vec::new();
//! let summary = pack(&mut record, true, &PackConfig::default(), |bytes| {
//!     records.push(bytes.to_vec())
//! })
//! .unwrap();
//!
//! assert_eq!(summary.samples, 1000);
//! assert_eq!(records.len(), summary.records);
//! assert!(records.iter().all(|r| r.len() == 512));
//! ```
//!
//! # Iterating multi-record data
//!
//! ```
//! use mseed_codec::{encode, MseedRecord, MseedReader, Samples};
//!
//! let r1 = MseedRecord::new()
//!     .with_nslc("IU", "ANMO", "00", "BHZ")
//!     .with_samples(Samples::Int(vec![1, 2, 3]));
//! let r2 = MseedRecord::new()
//!     .with_nslc("IU", "ANMO", "00", "BHN")
//!     .with_samples(Samples::Int(vec![4, 5, 6]));
//!
//! let mut data = encode(&r1).unwrap();
//! data.extend_from_slice(&encode(&r2).unwrap());
//!
//! let records: Vec<_> = MseedReader::new(&data)
//!     .collect::<Result<Vec<_>, _>>()
//!     .unwrap();
//!
//! assert_eq!(records.len(), 2);
//! assert_eq!(records[0].channel, "BHZ");
//! assert_eq!(records[1].channel, "BHN");
//! ```
//!
//! # Assembling traces
//!
//! ```
//! use mseed_codec::{MseedRecord, RateTolerance, Samples, TimeTolerance, TraceGroup};
//!
//! let mut group = TraceGroup::new();
//! for i in 0..3 {
//!     let record = MseedRecord::new()
//!         .with_nslc("XX", "TEST", "", "TID")
//!         .with_start_time(i * 100 * 1_000_000)
//!         .with_samples(Samples::Int(vec![0; 100]));
//!     group
//!         .add_record(&record, TimeTolerance::Default, RateTolerance::Default)
//!         .unwrap();
//! }
//!
//! assert_eq!(group.len(), 1);
//! assert_eq!(group.traces[0].sample_count, 300);
//! assert!(group.gaps(None, None).is_empty());
//! ```

pub mod blockette;
pub mod codec;
pub mod config;
pub mod decode;
pub mod encode;
pub mod error;
pub mod header;
pub mod print;
pub mod reader;
pub mod record;
pub mod samplerate;
pub mod steim;
pub mod time;
pub mod trace;
pub mod types;

pub use blockette::Blockette;
pub use config::{PackConfig, UnpackConfig};
pub use error::{MseedError, Result};
pub use reader::{MseedFileReader, MseedReader, ReadRecord, RecordLength, read_traces};
pub use record::{MseedRecord, RecordWarning, Samples};
pub use time::{BTime, HpTime};
pub use trace::{Gap, RateTolerance, TimeTolerance, Trace, TraceGroup};
pub use types::{ByteOrder, EncodingFormat, SampleType};

pub use decode::{decode, unpack};
pub use encode::{PackSummary, encode, pack, pack_header};
