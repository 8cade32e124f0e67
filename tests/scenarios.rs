//! End-to-end scenarios: pack records, read them back as a stream, and
//! assemble traces and gap reports.

use std::io::Cursor;

use mseed_codec::print::{TimeFormat, print_gap_list};
use mseed_codec::{
    EncodingFormat, MseedError, MseedFileReader, MseedRecord, PackConfig, RateTolerance,
    RecordLength, Samples, TimeTolerance, TraceGroup, decode, encode, read_traces,
};
use pretty_assertions::assert_eq;

const SECOND: i64 = 1_000_000;

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// One 1 Hz Steim2 record for XX.TEST..TID.
fn steim2_record(start_seconds: i64, samples: Vec<i32>) -> Vec<u8> {
    let record = MseedRecord::new()
        .with_nslc("XX", "TEST", "", "TID")
        .with_start_time(start_seconds * SECOND)
        .with_sample_rate(1.0)
        .with_encoding(EncodingFormat::Steim2)
        .with_samples(Samples::Int(samples));
    encode(&record).unwrap()
}

fn stream(records: &[(i64, usize)]) -> Vec<u8> {
    let mut data = Vec::new();
    for &(start, n) in records {
        let samples = (0..n as i32).map(|i| (i * 7) % 50 - 25).collect();
        data.extend_from_slice(&steim2_record(start, samples));
    }
    data
}

fn traces(data: Vec<u8>, time_tol: TimeTolerance) -> TraceGroup {
    let mut group = MseedFileReader::new(Cursor::new(data))
        .read_traces(time_tol, RateTolerance::Default)
        .unwrap();
    group.sort();
    group
}

#[test]
fn contiguous_records_form_one_trace() {
    init();
    let group = traces(stream(&[(0, 100), (100, 100), (200, 100)]), TimeTolerance::Default);

    assert_eq!(group.len(), 1);
    let trace = &group.traces[0];
    assert_eq!(trace.source_name(), "XX_TEST__TID");
    assert_eq!(trace.sample_count, 300);
    assert_eq!(trace.samples.len(), 300);
    assert_eq!(trace.start_time, 0);
    assert_eq!(trace.end_time, 299 * SECOND);
    assert!(group.gaps(None, None).is_empty());
}

#[test]
fn out_of_order_records_are_prepended() {
    init();
    let group = traces(stream(&[(100, 100), (0, 100), (200, 100)]), TimeTolerance::Default);

    assert_eq!(group.len(), 1);
    let expected: Vec<i32> = (0..3)
        .flat_map(|_| (0..100).map(|i| (i * 7) % 50 - 25))
        .collect();
    assert_eq!(group.traces[0].samples, Samples::Int(expected));
}

#[test]
fn fifty_second_gap_splits_trace() {
    init();
    let group = traces(stream(&[(0, 100), (150, 100)]), TimeTolerance::Default);

    assert_eq!(group.len(), 2);
    let gaps = group.gaps(None, None);
    assert_eq!(gaps.len(), 1);
    assert_eq!(gaps[0].seconds, 51.0);
    assert_eq!(gaps[0].samples, 50.0);
    assert_eq!(gaps[0].last_sample, 99 * SECOND);
    assert_eq!(gaps[0].next_sample, 150 * SECOND);

    let mut out = Vec::new();
    print_gap_list(&mut out, &group, TimeFormat::Seed, None, None).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("1970,001,00:01:39.000000 1970,001,00:02:30.000000 51    50\n"));
    assert!(text.ends_with("Total: 1 gap(s)\n"));
}

#[test]
fn wide_tolerance_bridges_gap() {
    init();
    let group = traces(stream(&[(0, 100), (150, 100)]), TimeTolerance::Seconds(60.0));

    assert_eq!(group.len(), 1);
    assert_eq!(group.traces[0].sample_count, 200);
    assert_eq!(group.traces[0].end_time, 249 * SECOND);
}

#[test]
fn half_period_offset_is_still_adjacent() {
    init();
    let mut group = TraceGroup::new();
    for (start, n) in [(0, 100), (100 * SECOND + SECOND / 2, 100)] {
        let record = MseedRecord::new()
            .with_nslc("XX", "TEST", "", "TID")
            .with_start_time(start)
            .with_samples(Samples::Int(vec![0; n]));
        group
            .add_record(&record, TimeTolerance::Default, RateTolerance::Default)
            .unwrap();
    }
    assert_eq!(group.len(), 1);

    assert_eq!(group.traces[0].end_time, 199 * SECOND + SECOND / 2);

    let late = MseedRecord::new()
        .with_nslc("XX", "TEST", "", "TID")
        .with_start_time(group.traces[0].end_time + SECOND + 6 * SECOND / 10)
        .with_samples(Samples::Int(vec![0; 10]));
    group
        .add_record(&late, TimeTolerance::Default, RateTolerance::Default)
        .unwrap();
    assert_eq!(group.len(), 2);
}

#[test]
fn overlap_is_clamped_to_shorter_trace() {
    init();
    let group = traces(stream(&[(0, 100), (10, 10)]), TimeTolerance::Default);

    assert_eq!(group.len(), 2);
    let gaps = group.gaps(None, None);
    assert_eq!(gaps.len(), 1);
    assert_eq!(gaps[0].seconds, -10.0);
    assert_eq!(gaps[0].samples, 11.0);
}

#[test]
fn malformed_header_is_rejected() {
    init();
    let mut data = steim2_record(0, vec![1, 2, 3]);
    data[6] = b'X';
    assert!(matches!(
        decode(&data),
        Err(MseedError::InvalidDataIndicator('X'))
    ));

    let err = MseedFileReader::new(Cursor::new(data))
        .read_record()
        .unwrap_err();
    match err {
        MseedError::AtOffset { offset, source } => {
            assert_eq!(offset, 0);
            assert!(matches!(*source, MseedError::NotSeed(_)));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn leading_garbage_is_skipped_on_request() {
    init();
    let mut data = vec![0u8; 256];
    data.extend_from_slice(&stream(&[(0, 100), (100, 100)]));

    let mut strict = MseedFileReader::new(Cursor::new(data.clone()));
    assert!(strict.read_record().is_err());

    let offsets: Vec<u64> = MseedFileReader::new(Cursor::new(data))
        .skip_not_data(true)
        .map(|r| r.unwrap().offset)
        .collect();
    assert_eq!(offsets, vec![256, 256 + 4096]);
}

#[test]
fn record_length_modes() {
    init();
    let data = stream(&[(0, 10), (10, 10), (20, 10)]);

    let mut fixed =
        MseedFileReader::new(Cursor::new(data.clone())).with_record_length(RecordLength::Fixed(4096));
    let mut count = 0;
    let mut last = false;
    while let Some(read) = fixed.read_record().unwrap() {
        assert_eq!(read.record.record_length, 4096);
        count += 1;
        last = read.last;
    }
    assert_eq!(count, 3);
    assert!(last);

    let mut each =
        MseedFileReader::new(Cursor::new(data)).with_record_length(RecordLength::DetectEach);
    assert!(each.read_record().unwrap().is_some());
    assert_eq!(each.detected_length(), Some(4096));
}

#[test]
fn trace_repacks_into_records() {
    init();
    let mut group = traces(stream(&[(0, 100), (100, 100), (200, 100)]), TimeTolerance::Default);

    let mut template = MseedRecord::new()
        .with_record_length(512)
        .with_encoding(EncodingFormat::Steim2);
    let mut packed = Vec::new();
    let summary = group
        .pack(&mut template, true, &PackConfig::default(), |bytes| {
            packed.extend_from_slice(bytes)
        })
        .unwrap();
    assert_eq!(summary.samples, 300);
    assert_eq!(packed.len(), summary.records * 512);

    let reread = traces(packed, TimeTolerance::Default);
    assert_eq!(reread.len(), 1);
    assert_eq!(reread.traces[0].source_name(), "XX_TEST__TID");
    assert_eq!(reread.traces[0].sample_count, 300);
    assert_eq!(reread.traces[0].end_time, 299 * SECOND);
}

#[test]
fn reads_traces_from_file() {
    init();
    let path = std::env::temp_dir().join(format!("mseed-codec-{}.mseed", std::process::id()));
    std::fs::write(&path, stream(&[(0, 100), (100, 100)])).unwrap();

    let group = read_traces(
        &path,
        RecordLength::default(),
        TimeTolerance::Default,
        RateTolerance::Default,
    );
    std::fs::remove_file(&path).unwrap();

    let group = group.unwrap();
    assert_eq!(group.len(), 1);
    assert_eq!(group.traces[0].sample_count, 200);

    let missing = MseedFileReader::open(std::env::temp_dir().join("mseed-codec-missing.mseed"));
    assert!(matches!(missing, Err(MseedError::Io(_))));
}
