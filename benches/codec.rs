use std::io::Cursor;

use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use mseed_codec::{
    EncodingFormat, MseedFileReader, MseedReader, MseedRecord, PackConfig, RateTolerance, Samples,
    TimeTolerance, decode, encode, pack,
};

/// Generate realistic seismic-like samples (smooth with small diffs, good for Steim).
fn seismic_samples(n: usize) -> Vec<i32> {
    let mut v = Vec::with_capacity(n);
    for i in 0..n {
        let drift = (i as f64 * 0.05).sin() * 50.0;
        let noise = ((i as f64 * 1.7).sin() * 10.0) as i32;
        v.push(1000 + drift as i32 + noise);
    }
    v
}

fn template(encoding: EncodingFormat, samples: Samples) -> MseedRecord {
    MseedRecord::new()
        .with_nslc("IU", "ANMO", "00", "BHZ")
        .with_start_time(1_744_200_000 * 1_000_000)
        .with_sample_rate(100.0)
        .with_encoding(encoding)
        .with_samples(samples)
}

/// Pack `n` samples into 512-byte Steim2 records.
fn packed_stream(n: usize) -> Vec<u8> {
    let mut record = template(EncodingFormat::Steim2, Samples::Int(seismic_samples(n)))
        .with_record_length(512);
    let mut stream = Vec::new();
    pack(&mut record, true, &PackConfig::default(), |bytes| {
        stream.extend_from_slice(bytes)
    })
    .unwrap();
    stream
}

fn bench_decode(c: &mut Criterion) {
    let samples_100 = seismic_samples(100);
    let steim1 = encode(&template(EncodingFormat::Steim1, Samples::Int(samples_100.clone()))).unwrap();
    let steim2 = encode(&template(EncodingFormat::Steim2, Samples::Int(samples_100.clone()))).unwrap();
    let int32 = encode(&template(EncodingFormat::Int32, Samples::Int(samples_100.clone()))).unwrap();
    let float64 = encode(&template(
        EncodingFormat::Float64,
        Samples::Double(samples_100.iter().map(|&s| f64::from(s)).collect()),
    ))
    .unwrap();

    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Elements(100));

    group.bench_function("steim1/100samp", |b| b.iter(|| decode(black_box(&steim1)).unwrap()));
    group.bench_function("steim2/100samp", |b| b.iter(|| decode(black_box(&steim2)).unwrap()));
    group.bench_function("int32/100samp", |b| b.iter(|| decode(black_box(&int32)).unwrap()));
    group.bench_function("float64/100samp", |b| b.iter(|| decode(black_box(&float64)).unwrap()));

    group.finish();
}

fn bench_encode(c: &mut Criterion) {
    let samples_100 = seismic_samples(100);
    let steim1 = template(EncodingFormat::Steim1, Samples::Int(samples_100.clone()));
    let steim2 = template(EncodingFormat::Steim2, Samples::Int(samples_100.clone()));
    let int32 = template(EncodingFormat::Int32, Samples::Int(samples_100));

    let mut group = c.benchmark_group("encode");
    group.throughput(Throughput::Elements(100));

    group.bench_function("steim1/100samp", |b| b.iter(|| encode(black_box(&steim1)).unwrap()));
    group.bench_function("steim2/100samp", |b| b.iter(|| encode(black_box(&steim2)).unwrap()));
    group.bench_function("int32/100samp", |b| b.iter(|| encode(black_box(&int32)).unwrap()));

    group.finish();
}

fn bench_pack(c: &mut Criterion) {
    let samples = seismic_samples(10_000);

    let mut group = c.benchmark_group("pack");
    group.throughput(Throughput::Elements(10_000));

    group.bench_function("steim2/512/10000samp", |b| {
        b.iter(|| {
            let mut record = template(EncodingFormat::Steim2, Samples::Int(samples.clone()))
                .with_record_length(512);
            let mut bytes = 0;
            pack(&mut record, true, &PackConfig::default(), |r| bytes += r.len()).unwrap();
            black_box(bytes)
        })
    });

    group.finish();
}

fn bench_reader(c: &mut Criterion) {
    let stream = packed_stream(10_000);

    let mut group = c.benchmark_group("reader");
    group.throughput(Throughput::Bytes(stream.len() as u64));

    group.bench_function("slice/10000samp", |b| {
        b.iter(|| {
            MseedReader::new(black_box(&stream))
                .collect::<Result<Vec<_>, _>>()
                .unwrap()
        })
    });
    group.bench_function("traces/10000samp", |b| {
        b.iter(|| {
            let group = MseedFileReader::new(Cursor::new(black_box(&stream)))
                .read_traces(TimeTolerance::Default, RateTolerance::Default)
                .unwrap();
            assert_eq!(group.len(), 1);
        })
    });

    group.finish();
}

criterion_group!(benches, bench_decode, bench_encode, bench_pack, bench_reader);
criterion_main!(benches);
