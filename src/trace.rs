//! Continuous trace segments assembled from records.
//!
//! A [`TraceGroup`] collects records into [`Trace`]s, one per contiguous
//! stretch of samples of a single channel. Records are matched by source,
//! sample rate and time adjacency, then appended or prepended. Groups
//! assembled from out-of-order input can be merged afterwards with
//! [`TraceGroup::heal`].

use log::{debug, trace, warn};

use crate::config::PackConfig;
use crate::encode::{self, PackSummary};
use crate::record::{MseedRecord, Samples, source_name};
use crate::samplerate;
use crate::time::{HPTMODULUS, HpTime};
use crate::types::SampleType;
use crate::{MseedError, Result};

/// Time tolerance for adjacency tests.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum TimeTolerance {
    /// Half a sample period.
    #[default]
    Default,
    /// Absolute tolerance in seconds.
    Seconds(f64),
    /// No tolerance check; the closer end wins.
    Disabled,
}

/// Sample rate tolerance for matching traces.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum RateTolerance {
    /// Relative difference below [`samplerate::RATE_TOLERANCE`].
    #[default]
    Default,
    /// Absolute difference in Hz.
    Absolute(f64),
    /// Rates are not compared.
    Disabled,
}

impl RateTolerance {
    /// True when `rate` is close enough to `reference`.
    pub fn matches(self, rate: f64, reference: f64) -> bool {
        match self {
            RateTolerance::Default => samplerate::is_rate_tolerable(rate, reference),
            RateTolerance::Absolute(tol) => (rate - reference).abs() <= tol,
            RateTolerance::Disabled => true,
        }
    }
}

/// Where a span fits relative to a trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    /// After the last sample.
    Append,
    /// Before the first sample.
    Prepend,
}

/// A contiguous run of samples from one channel.
#[derive(Debug, Clone, PartialEq)]
pub struct Trace {
    pub network: String,
    pub station: String,
    pub location: String,
    pub channel: String,
    /// Time of the first sample.
    pub start_time: HpTime,
    /// Time of the last sample.
    pub end_time: HpTime,
    pub sample_rate: f64,
    pub sample_type: SampleType,
    /// Samples covered by the trace, including any that were not kept
    /// in `samples` (headers-only assembly).
    pub sample_count: usize,
    pub samples: Samples,
}

impl Trace {
    /// Start a trace covering a single record.
    pub fn from_record(record: &MseedRecord) -> Self {
        let sample_type = if record.samples.is_empty() {
            record
                .encoding
                .map_or(record.samples.sample_type(), |e| e.sample_type())
        } else {
            record.samples.sample_type()
        };
        Self {
            network: record.network.clone(),
            station: record.station.clone(),
            location: record.location.clone(),
            channel: record.channel.clone(),
            start_time: record.start_time,
            end_time: record.end_time(),
            sample_rate: record.sample_rate,
            sample_type,
            sample_count: record.sample_count,
            samples: if record.samples.sample_type() == sample_type {
                record.samples.clone()
            } else {
                Samples::empty(sample_type)
            },
        }
    }

    /// `"NET_STA_LOC_CHAN"`.
    pub fn source_name(&self) -> String {
        source_name(&self.network, &self.station, &self.location, &self.channel)
    }

    /// Covered time in seconds, counting the last sample period.
    pub fn duration(&self) -> f64 {
        let span = (self.end_time - self.start_time) as f64 / HPTMODULUS as f64;
        if self.sample_rate > 0.0 {
            span + 1.0 / self.sample_rate
        } else {
            span
        }
    }

    fn same_source(&self, network: &str, station: &str, location: &str, channel: &str) -> bool {
        self.network == network
            && self.station == station
            && self.location == location
            && self.channel == channel
    }

    fn add_record(&mut self, record: &MseedRecord, whence: Whence) -> Result<()> {
        if !record.samples.is_empty() {
            if record.samples.len() != record.sample_count {
                warn!(
                    "{}: sample counts do not match ({} of {}), trace will contain a discontinuity",
                    record.source_name(),
                    record.samples.len(),
                    record.sample_count
                );
            }
            if record.samples.sample_type() != self.sample_type {
                return Err(MseedError::SampleTypeMismatch {
                    expected: self.sample_type,
                    found: record.samples.sample_type(),
                });
            }
        }

        match whence {
            Whence::Append => {
                self.samples.extend_back(&record.samples);
                self.end_time = record.end_time();
            }
            Whence::Prepend => {
                self.samples.extend_front(&record.samples);
                self.start_time = record.start_time;
            }
        }
        self.sample_count += record.sample_count;
        Ok(())
    }

    fn absorb(&mut self, other: Trace, whence: Whence) {
        match whence {
            Whence::Append => {
                self.samples.extend_back(&other.samples);
                self.end_time = other.end_time;
            }
            Whence::Prepend => {
                self.samples.extend_front(&other.samples);
                self.start_time = other.start_time;
            }
        }
        self.sample_count += other.sample_count;
    }

    /// Pack the buffered samples into records.
    ///
    /// Identity, start time, rate and samples come from the trace; every
    /// other field (record length, encoding, byte order, quality, extra
    /// blockettes) from `template`. Packed samples are removed from the
    /// trace and its start time moves past them. The template's sequence
    /// number advances so consecutive calls continue the numbering.
    pub fn pack<F>(
        &mut self,
        template: &mut MseedRecord,
        flush: bool,
        config: &PackConfig,
        sink: F,
    ) -> Result<PackSummary>
    where
        F: FnMut(&[u8]),
    {
        if self.sample_count != self.samples.len() {
            return Err(MseedError::EncodeError(format!(
                "{}: sample count {} does not match {} buffered samples",
                self.source_name(),
                self.sample_count,
                self.samples.len()
            )));
        }

        let mut record = MseedRecord {
            network: self.network.clone(),
            station: self.station.clone(),
            location: self.location.clone(),
            channel: self.channel.clone(),
            start_time: self.start_time,
            sample_rate: self.sample_rate,
            sample_count: self.samples.len(),
            samples: std::mem::replace(&mut self.samples, Samples::empty(self.sample_type)),
            ..template.clone()
        };

        let result = encode::pack(&mut record, flush, config, sink);
        self.samples = std::mem::replace(&mut record.samples, Samples::empty(self.sample_type));
        let summary = result?;

        if summary.samples > 0 {
            self.samples.drain_front(summary.samples);
            self.sample_count -= summary.samples;
            self.start_time = record.start_time;
        }
        template.sequence_number = record.sequence_number;
        debug!(
            "Packed {} records for {} trace",
            summary.records,
            self.source_name()
        );
        Ok(summary)
    }
}

/// A gap (positive) or overlap (negative) between two traces.
#[derive(Debug, Clone, PartialEq)]
pub struct Gap {
    pub source: String,
    /// Last sample before the gap.
    pub last_sample: HpTime,
    /// First sample after the gap.
    pub next_sample: HpTime,
    /// Gap length in seconds.
    pub seconds: f64,
    /// Missing samples, or overlapping samples for an overlap.
    pub samples: f64,
}

/// An ordered collection of traces.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TraceGroup {
    pub traces: Vec<Trace>,
}

impl TraceGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.traces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.traces.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Trace> {
        self.traces.iter()
    }

    /// Find a trace with the record's source and a compatible rate into
    /// which the span `start..=end` fits.
    pub fn find_adjacent(
        &self,
        record: &MseedRecord,
        end: HpTime,
        time_tol: TimeTolerance,
        rate_tol: RateTolerance,
    ) -> Option<(usize, Whence)> {
        self.traces.iter().enumerate().find_map(|(idx, t)| {
            if !t.same_source(&record.network, &record.station, &record.location, &record.channel)
                || !rate_tol.matches(record.sample_rate, t.sample_rate)
            {
                return None;
            }
            fit(t, record.start_time, end, record.sample_rate, time_tol).map(|w| (idx, w))
        })
    }

    /// Add a record to the matching trace, or start a new trace.
    ///
    /// Returns the index of the trace that received the record. A record
    /// without samples or with a non-positive rate leaves a matching trace
    /// unchanged.
    pub fn add_record(
        &mut self,
        record: &MseedRecord,
        time_tol: TimeTolerance,
        rate_tol: RateTolerance,
    ) -> Result<usize> {
        let end = record.end_time();
        match self.find_adjacent(record, end, time_tol, rate_tol) {
            Some((idx, whence)) => {
                if record.sample_count == 0 || record.sample_rate <= 0.0 {
                    return Ok(idx);
                }
                trace!("{}: {whence:?} to trace {idx}", record.source_name());
                self.traces[idx].add_record(record, whence)?;
                Ok(idx)
            }
            None => {
                trace!("{}: new trace", record.source_name());
                self.traces.push(Trace::from_record(record));
                Ok(self.traces.len() - 1)
            }
        }
    }

    /// Append a trace to the group.
    pub fn add_trace(&mut self, trace: Trace) -> usize {
        self.traces.push(trace);
        self.traces.len() - 1
    }

    /// Merge traces that abut each other. Passes repeat until nothing
    /// merges, so chains of segments collapse into one trace. Returns the
    /// number of merges.
    pub fn heal(&mut self, time_tol: TimeTolerance, rate_tol: RateTolerance) -> usize {
        let mut merges = 0;
        while let Some((target, source, whence)) = self.find_mergeable(time_tol, rate_tol) {
            let other = self.traces.remove(source);
            let target = if source < target { target - 1 } else { target };
            self.traces[target].absorb(other, whence);
            merges += 1;
        }
        if merges > 0 {
            debug!("healed {merges} trace segment(s)");
        }
        merges
    }

    fn find_mergeable(
        &self,
        time_tol: TimeTolerance,
        rate_tol: RateTolerance,
    ) -> Option<(usize, usize, Whence)> {
        for (i, cur) in self.traces.iter().enumerate() {
            for (j, other) in self.traces.iter().enumerate() {
                if i == j
                    || !cur.same_source(&other.network, &other.station, &other.location, &other.channel)
                    || !rate_tol.matches(other.sample_rate, cur.sample_rate)
                    || (cur.sample_type != other.sample_type && !other.samples.is_empty())
                {
                    continue;
                }
                if let Some(whence) =
                    fit(cur, other.start_time, other.end_time, cur.sample_rate, time_tol)
                {
                    return Some((i, j, whence));
                }
            }
        }
        None
    }

    /// Sort by source name, then ascending rate, then ascending start
    /// time, then descending end time (longest first).
    pub fn sort(&mut self) {
        self.traces.sort_by(|a, b| {
            a.source_name()
                .cmp(&b.source_name())
                .then_with(|| a.sample_rate.total_cmp(&b.sample_rate))
                .then_with(|| a.start_time.cmp(&b.start_time))
                .then_with(|| b.end_time.cmp(&a.end_time))
        });
    }

    /// Gaps and overlaps between consecutive traces of the same source.
    ///
    /// Expects a sorted group. Pairs with a zero rate or with rates that
    /// differ beyond the default tolerance are skipped. An overlap longer
    /// than the shorter of the two traces is clamped to that trace's
    /// duration. `min` and `max` are inclusive bounds on the gap in
    /// seconds.
    pub fn gaps(&self, min: Option<f64>, max: Option<f64>) -> Vec<Gap> {
        let mut gaps = Vec::new();
        for pair in self.traces.windows(2) {
            let (cur, next) = (&pair[0], &pair[1]);
            let source = cur.source_name();
            if source != next.source_name() || cur.sample_rate == 0.0 {
                continue;
            }
            if !samplerate::is_rate_tolerable(cur.sample_rate, next.sample_rate) {
                warn!(
                    "{source} Sample rate changed! {} -> {}",
                    cur.sample_rate, next.sample_rate
                );
                continue;
            }

            let mut seconds = (next.start_time - cur.end_time) as f64 / HPTMODULUS as f64;
            if seconds < 0.0 {
                let limit = cur.duration().min(next.duration());
                if -seconds > limit {
                    seconds = -limit;
                }
            }

            if min.is_some_and(|m| seconds < m) || max.is_some_and(|m| seconds > m) {
                continue;
            }

            let mut samples = seconds.abs() * cur.sample_rate;
            if seconds > 0.0 {
                samples -= 1.0;
            } else {
                samples += 1.0;
            }

            gaps.push(Gap {
                source,
                last_sample: cur.end_time,
                next_sample: next.start_time,
                seconds,
                samples,
            });
        }
        gaps
    }

    /// Pack every trace that still holds samples. Traces without samples
    /// are skipped.
    pub fn pack<F>(
        &mut self,
        template: &mut MseedRecord,
        flush: bool,
        config: &PackConfig,
        mut sink: F,
    ) -> Result<PackSummary>
    where
        F: FnMut(&[u8]),
    {
        let mut total = PackSummary::default();
        for t in &mut self.traces {
            if t.samples.is_empty() {
                debug!("No data samples for {}, skipping", t.source_name());
                continue;
            }
            let summary = t.pack(template, flush, config, &mut sink)?;
            total.records += summary.records;
            total.samples += summary.samples;
        }
        Ok(total)
    }
}

impl<'a> IntoIterator for &'a TraceGroup {
    type Item = &'a Trace;
    type IntoIter = std::slice::Iter<'a, Trace>;

    fn into_iter(self) -> Self::IntoIter {
        self.traces.iter()
    }
}

/// Where `start..=end` fits against `trace`, if anywhere. Gaps are
/// measured in seconds beyond one sample period, so a perfectly
/// contiguous span has a gap of zero.
fn fit(
    trace: &Trace,
    start: HpTime,
    end: HpTime,
    rate: f64,
    tol: TimeTolerance,
) -> Option<Whence> {
    let period = if rate > 0.0 { 1.0 / rate } else { 0.0 };
    let postgap = (start - trace.end_time) as f64 / HPTMODULUS as f64 - period;
    let pregap = (trace.start_time - end) as f64 / HPTMODULUS as f64 - period;

    let tol = match tol {
        TimeTolerance::Disabled => {
            return Some(if postgap.abs() < pregap.abs() {
                Whence::Append
            } else {
                Whence::Prepend
            });
        }
        TimeTolerance::Seconds(s) => s,
        TimeTolerance::Default if rate > 0.0 => 0.5 / rate,
        TimeTolerance::Default => f64::INFINITY,
    };

    if postgap.abs() <= tol {
        Some(Whence::Append)
    } else if pregap.abs() <= tol {
        Some(Whence::Prepend)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EncodingFormat;
    use pretty_assertions::assert_eq;

    const SEC: HpTime = HPTMODULUS;

    fn rec(start_sec: i64, values: std::ops::Range<i32>) -> MseedRecord {
        MseedRecord::new()
            .with_nslc("XX", "TEST", "", "TID")
            .with_sample_rate(1.0)
            .with_start_time(start_sec * SEC)
            .with_samples(Samples::Int(values.collect()))
    }

    fn group(records: &[MseedRecord], tol: TimeTolerance) -> TraceGroup {
        let mut g = TraceGroup::new();
        for r in records {
            g.add_record(r, tol, RateTolerance::Default).unwrap();
        }
        g
    }

    #[test]
    fn test_append_and_prepend() {
        let g = group(
            &[rec(100, 100..200), rec(0, 0..100), rec(200, 200..300)],
            TimeTolerance::Default,
        );
        assert_eq!(g.len(), 1);
        let t = &g.traces[0];
        assert_eq!(t.start_time, 0);
        assert_eq!(t.end_time, 299 * SEC);
        assert_eq!(t.sample_count, 300);
        assert_eq!(t.samples, Samples::Int((0..300).collect()));
    }

    #[test]
    fn test_gap_creates_second_trace() {
        let records = [rec(0, 0..100), rec(150, 150..250)];
        let mut g = group(&records, TimeTolerance::Default);
        assert_eq!(g.len(), 2);
        g.sort();
        let gaps = g.gaps(None, None);
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].seconds, 51.0);
        assert_eq!(gaps[0].samples, 50.0);
        assert_eq!(gaps[0].last_sample, 99 * SEC);
        assert_eq!(gaps[0].next_sample, 150 * SEC);

        let g = group(&records, TimeTolerance::Seconds(60.0));
        assert_eq!(g.len(), 1);
        assert_eq!(g.traces[0].sample_count, 200);
    }

    #[test]
    fn test_half_period_boundary() {
        let base = rec(0, 0..10);
        let on_edge = rec(0, 10..20).with_start_time(10 * SEC + SEC / 2);
        let beyond = rec(0, 10..20).with_start_time(10 * SEC + SEC / 2 + 1);

        let g = group(&[base.clone(), on_edge], TimeTolerance::Default);
        assert_eq!(g.len(), 1);
        let g = group(&[base, beyond], TimeTolerance::Default);
        assert_eq!(g.len(), 2);
    }

    #[test]
    fn test_disabled_tolerance_picks_closer_end() {
        let mut g = group(&[rec(1000, 0..10)], TimeTolerance::Default);
        let idx = g
            .add_record(&rec(0, 0..10), TimeTolerance::Disabled, RateTolerance::Default)
            .unwrap();
        assert_eq!(idx, 0);
        assert_eq!(g.traces[0].start_time, 0);
        assert_eq!(g.traces[0].end_time, 1009 * SEC);
    }

    #[test]
    fn test_rate_tolerance() {
        assert!(RateTolerance::Default.matches(100.0, 100.005));
        assert!(!RateTolerance::Default.matches(100.0, 100.02));
        assert!(RateTolerance::Absolute(0.5).matches(100.0, 100.4));
        assert!(RateTolerance::Disabled.matches(1.0, 50.0));

        let mut g = group(&[rec(0, 0..10)], TimeTolerance::Default);
        let fast = rec(10, 10..20).with_sample_rate(2.0);
        g.add_record(&fast, TimeTolerance::Default, RateTolerance::Default)
            .unwrap();
        assert_eq!(g.len(), 2);
    }

    #[test]
    fn test_empty_record_leaves_trace_unchanged() {
        let mut g = group(&[rec(0, 0..10)], TimeTolerance::Default);
        let empty = rec(10, 0..0);
        assert_eq!(
            g.add_record(&empty, TimeTolerance::Default, RateTolerance::Default)
                .unwrap(),
            0
        );
        assert_eq!(g.len(), 1);
        assert_eq!(g.traces[0].sample_count, 10);
        assert_eq!(g.traces[0].end_time, 9 * SEC);
    }

    #[test]
    fn test_sample_type_mismatch() {
        let mut g = group(&[rec(0, 0..10)], TimeTolerance::Default);
        let floats = MseedRecord::new()
            .with_nslc("XX", "TEST", "", "TID")
            .with_sample_rate(1.0)
            .with_start_time(10 * SEC)
            .with_samples(Samples::Float(vec![1.0; 5]));
        assert!(matches!(
            g.add_record(&floats, TimeTolerance::Default, RateTolerance::Default),
            Err(MseedError::SampleTypeMismatch { .. })
        ));
    }

    #[test]
    fn test_heal_is_transitive() {
        let mut g = TraceGroup::new();
        for start in [300, 0, 200, 100] {
            g.add_trace(Trace::from_record(&rec(start, start as i32..start as i32 + 100)));
        }
        assert_eq!(g.heal(TimeTolerance::Default, RateTolerance::Default), 3);
        assert_eq!(g.len(), 1);
        assert_eq!(g.traces[0].start_time, 0);
        assert_eq!(g.traces[0].end_time, 399 * SEC);
        assert_eq!(g.traces[0].samples, Samples::Int((0..400).collect()));
    }

    #[test]
    fn test_sort_order() {
        let mut g = TraceGroup::new();
        let mk = |sta: &str, rate: f64, start: i64, n: i32| {
            Trace::from_record(
                &MseedRecord::new()
                    .with_nslc("XX", sta, "", "BHZ")
                    .with_sample_rate(rate)
                    .with_start_time(start * SEC)
                    .with_samples(Samples::Int(vec![0; n as usize])),
            )
        };
        g.add_trace(mk("B", 1.0, 0, 10));
        g.add_trace(mk("A", 2.0, 0, 10));
        g.add_trace(mk("A", 1.0, 5, 10));
        g.add_trace(mk("A", 1.0, 0, 5));
        g.add_trace(mk("A", 1.0, 0, 20));
        g.sort();
        let keys: Vec<_> = g
            .iter()
            .map(|t| (t.station.as_str(), t.sample_rate, t.start_time / SEC, t.sample_count))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("A", 1.0, 0, 20),
                ("A", 1.0, 0, 5),
                ("A", 1.0, 5, 10),
                ("A", 2.0, 0, 10),
                ("B", 1.0, 0, 10),
            ]
        );
    }

    #[test]
    fn test_overlap_clamped_to_shorter_trace() {
        let mut g = TraceGroup::new();
        g.add_trace(Trace::from_record(&rec(0, 0..100)));
        g.add_trace(Trace::from_record(&rec(10, 0..5)));
        g.sort();
        let gaps = g.gaps(None, None);
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].seconds, -5.0);
        assert_eq!(gaps[0].samples, 6.0);
    }

    #[test]
    fn test_gap_filters_are_inclusive() {
        let mut g = group(
            &[rec(0, 0..10), rec(20, 0..10), rec(100, 0..10)],
            TimeTolerance::Default,
        );
        g.sort();
        assert_eq!(g.gaps(None, None).len(), 2);
        let gaps = g.gaps(Some(11.0), Some(11.0));
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].seconds, 11.0);
        assert!(g.gaps(Some(100.0), None).is_empty());
    }

    #[test]
    fn test_trace_pack_consumes_samples() {
        let mut g = group(&[rec(0, 0..300)], TimeTolerance::Default);
        let mut template = MseedRecord::new()
            .with_record_length(512)
            .with_encoding(EncodingFormat::Int32);
        let mut records = Vec::new();
        let summary = g
            .pack(&mut template, false, &PackConfig::default(), |r| {
                records.push(r.to_vec())
            })
            .unwrap();

        assert_eq!(summary.records, 2);
        assert_eq!(summary.samples, 228);
        assert_eq!(records.len(), 2);
        assert_eq!(template.sequence_number, 3);
        let t = &g.traces[0];
        assert_eq!(t.sample_count, 72);
        assert_eq!(t.samples, Samples::Int((228..300).collect()));
        assert_eq!(t.start_time, 228 * SEC);

        let summary = g
            .pack(&mut template, true, &PackConfig::default(), |r| {
                records.push(r.to_vec())
            })
            .unwrap();
        assert_eq!(summary.records, 1);
        assert!(g.traces[0].samples.is_empty());
        let last = crate::decode::decode(&records[2]).unwrap();
        assert_eq!(last.sequence_number, 3);
        assert_eq!(last.start_time, 228 * SEC);
        assert_eq!(last.nslc(), "XX.TEST..TID");

        let summary = g
            .pack(&mut template, true, &PackConfig::default(), |_| {})
            .unwrap();
        assert_eq!(summary, PackSummary::default());
    }
}
