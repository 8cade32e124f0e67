//! Human readable record, trace and gap listings.
//!
//! Every function writes to a caller-supplied [`Write`] so output can go
//! to stdout, a file or a buffer.

use std::io::Write;

use crate::blockette::{Blockette, blockette_description, field_text};
use crate::record::MseedRecord;
use crate::samplerate;
use crate::time::{self, HPTMODULUS, HpTime};
use crate::trace::TraceGroup;
use crate::types::encoding_description;
use crate::Result;

/// Time layout used in listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeFormat {
    /// `YYYY,DDD,HH:MM:SS.FFFFFF`
    #[default]
    Seed,
    /// `YYYY-MM-DDTHH:MM:SS.FFFFFF`
    Iso,
    /// Seconds since the epoch with six decimals.
    Epoch,
}

impl TimeFormat {
    pub fn format(self, time: HpTime) -> Result<String> {
        match self {
            TimeFormat::Seed => time::hptime_to_seed_string(time),
            TimeFormat::Iso => time::hptime_to_iso_string(time),
            TimeFormat::Epoch => Ok(format!("{:.6}", time as f64 / HPTMODULUS as f64)),
        }
    }
}

const ACTIVITY_FLAGS: [&str; 8] = [
    "Calibration signals present",
    "Time correction applied",
    "Beginning of an event, station trigger",
    "End of an event, station detrigger",
    "A positive leap second happened in this record",
    "A negative leap second happened in this record",
    "Event in progress",
    "Undefined bit set",
];

const IO_FLAGS: [&str; 8] = [
    "Station volume parity error possibly present",
    "Long record read (possibly no problem)",
    "Short record read (record padded)",
    "Start of time series",
    "End of time series",
    "Clock locked",
    "Undefined bit set",
    "Undefined bit set",
];

const QUALITY_FLAGS: [&str; 8] = [
    "Amplifier saturation detected",
    "Digitizer clipping detected",
    "Spikes detected",
    "Glitches detected",
    "Missing/padded data present",
    "Telemetry synchronization error",
    "A digital filter may be charging",
    "Time tag is questionable",
];

/// Print a record.
///
/// `details` 0 prints one summary line, 1 adds the fixed header fields and
/// the blockette chain, 2 also decodes the flag bytes.
pub fn print_record<W: Write>(out: &mut W, record: &MseedRecord, details: u8) -> Result<()> {
    if details == 0 {
        writeln!(out, "{record}")?;
        return Ok(());
    }

    let header = &record.header;
    writeln!(
        out,
        "{}, {:06}, {}",
        record.source_name(),
        record.sequence_number,
        record.quality
    )?;
    writeln!(
        out,
        "             start time: {}",
        time::hptime_to_seed_string(record.start_time)?
    )?;
    writeln!(out, "      number of samples: {}", header.num_samples)?;
    writeln!(
        out,
        "     sample rate factor: {}  ({} samples per second)",
        header.samprate_factor,
        format_g(record.nominal_sample_rate(), 10)
    )?;
    writeln!(out, " sample rate multiplier: {}", header.samprate_multiplier)?;

    if details > 1 {
        print_flags(out, "         activity flags", header.activity_flags, &ACTIVITY_FLAGS)?;
        print_flags(out, "    I/O and clock flags", header.io_flags, &IO_FLAGS)?;
        print_flags(out, "     data quality flags", header.dq_flags, &QUALITY_FLAGS)?;
    }

    writeln!(out, "   number of blockettes: {}", header.num_blockettes)?;
    writeln!(out, "        time correction: {}", header.time_correction)?;
    writeln!(out, "            data offset: {}", header.data_offset)?;
    writeln!(out, " first blockette offset: {}", header.blockette_offset)?;

    for blockette in &record.blockettes {
        print_blockette(out, blockette, details)?;
    }
    for warning in &record.warnings {
        writeln!(out, "                warning: {warning}")?;
    }
    Ok(())
}

fn print_flags<W: Write>(out: &mut W, label: &str, flags: u8, names: &[&str; 8]) -> Result<()> {
    writeln!(out, "{label}: [{}] 8 bits", bit_string(flags))?;
    for (i, name) in names.iter().enumerate() {
        if flags & (1 << i) != 0 {
            writeln!(out, "                         [Bit {i}] {name}")?;
        }
    }
    Ok(())
}

fn print_blockette<W: Write>(out: &mut W, blockette: &Blockette, details: u8) -> Result<()> {
    let kind = blockette.kind();
    writeln!(
        out,
        "          BLOCKETTE {kind}: ({})",
        blockette_description(kind).unwrap_or("Unknown")
    )?;
    match blockette {
        Blockette::SampleRate(b) => {
            field(out, "actual sample rate", format_g(f64::from(b.sample_rate), 10))?;
            if details > 1 {
                let [r0, r1, r2] = b.reserved;
                field(out, "reserved bytes (3)", format!("{r0},{r1},{r2}"))?;
            }
        }
        Blockette::GenericEvent(b) => {
            print_detection(out, b.amplitude, b.period, b.background_estimate, b.flags)?;
            field(out, "signal onset time", b.time)?;
            field(out, "detector name", field_text(&b.detector))?;
        }
        Blockette::MurdockEvent(b) => {
            print_detection(out, b.amplitude, b.period, b.background_estimate, b.flags)?;
            field(out, "signal onset time", b.time)?;
            let snr: Vec<String> = b.snr_values.iter().map(u8::to_string).collect();
            field(out, "SNR values", snr.join(","))?;
            field(out, "loopback value", b.loopback)?;
            field(out, "pick algorithm", b.pick_algorithm)?;
            field(out, "detector name", field_text(&b.detector))?;
        }
        Blockette::StepCalibration(b) => {
            field(out, "calibration start time", b.time)?;
            field(out, "number of calibrations", b.num_calibrations)?;
            field(out, "calibration flags", format!("[{}]", bit_string(b.flags)))?;
            field(out, "step duration", b.step_duration)?;
            field(out, "interval duration", b.interval_duration)?;
            field(out, "signal amplitude", format_g(f64::from(b.amplitude), 10))?;
            field(out, "input signal channel", field_text(&b.input_channel))?;
            field(out, "reference amplitude", b.reference_amplitude)?;
            field(out, "coupling", field_text(&b.coupling))?;
            field(out, "rolloff", field_text(&b.rolloff))?;
        }
        Blockette::SineCalibration(b) => {
            field(out, "calibration start time", b.time)?;
            field(out, "calibration flags", format!("[{}]", bit_string(b.flags)))?;
            field(out, "calibration duration", b.duration)?;
            field(out, "period of signal", format_g(f64::from(b.period), 10))?;
            field(out, "amplitude of signal", format_g(f64::from(b.amplitude), 10))?;
            field(out, "input signal channel", field_text(&b.input_channel))?;
            field(out, "reference amplitude", b.reference_amplitude)?;
            field(out, "coupling", field_text(&b.coupling))?;
            field(out, "rolloff", field_text(&b.rolloff))?;
        }
        Blockette::RandomCalibration(b) => {
            field(out, "calibration start time", b.time)?;
            field(out, "calibration flags", format!("[{}]", bit_string(b.flags)))?;
            field(out, "calibration duration", b.duration)?;
            field(out, "peak-to-peak amplitude", format_g(f64::from(b.ptp_amplitude), 10))?;
            field(out, "input signal channel", field_text(&b.input_channel))?;
            field(out, "reference amplitude", b.reference_amplitude)?;
            field(out, "noise type", field_text(&b.noise_type))?;
        }
        Blockette::GenericCalibration(b) => {
            field(out, "calibration start time", b.time)?;
            field(out, "calibration flags", format!("[{}]", bit_string(b.flags)))?;
            field(out, "calibration duration", b.duration)?;
            field(out, "signal amplitude", format_g(f64::from(b.amplitude), 10))?;
            field(out, "input signal channel", field_text(&b.input_channel))?;
        }
        Blockette::CalibrationAbort(b) => {
            field(out, "calibration end time", b.time)?;
        }
        Blockette::Beam(b) => {
            field(out, "beam azimuth (degrees)", format_g(f64::from(b.azimuth), 10))?;
            field(out, "beam slowness (sec/degree)", format_g(f64::from(b.slowness), 10))?;
            field(out, "configuration", b.configuration)?;
        }
        Blockette::BeamDelay(b) => {
            field(out, "delay values", b.delay_values)?;
        }
        Blockette::Timing(b) => {
            field(out, "VCO correction", format!("{}%", format_g(f64::from(b.vco_correction), 10)))?;
            field(out, "time of exception", b.time)?;
            field(out, "micro second", b.usec)?;
            field(out, "reception quality", format!("{}%", b.reception_quality))?;
            field(out, "exception count", b.exception_count)?;
            field(out, "exception type", field_text(&b.exception_type))?;
            field(out, "clock model", field_text(&b.clock_model))?;
            field(out, "clock status", field_text(&b.clock_status))?;
        }
        Blockette::DataOnly(b) => {
            field(
                out,
                "encoding",
                format!("{} (val:{})", encoding_description(b.encoding), b.encoding),
            )?;
            let order = match b.byte_order {
                0 => "Little endian",
                1 => "Big endian",
                _ => "Unknown",
            };
            field(out, "byte order", format!("{order} (val:{})", b.byte_order))?;
            let reclen = b
                .record_length()
                .map_or_else(|| "invalid".to_string(), |len| len.to_string());
            field(out, "record length", format!("{reclen} (val:{})", b.reclen_exp))?;
        }
        Blockette::DataExtension(b) => {
            field(out, "timing quality", format!("{}%", b.timing_quality))?;
            field(out, "micro second", b.usec)?;
            field(out, "frame count", b.frame_count)?;
        }
        Blockette::Opaque(b) => {
            field(out, "record number", b.record_number)?;
            field(out, "data byte order", b.byte_order)?;
            field(out, "data flags", format!("[{}]", bit_string(b.flags)))?;
            field(out, "header fields", b.num_header_fields)?;
            field(out, "opaque data bytes", b.payload.len())?;
        }
        Blockette::Unknown { payload, .. } => {
            field(out, "payload bytes", payload.len())?;
        }
    }
    Ok(())
}

fn field<W: Write>(out: &mut W, label: &str, value: impl std::fmt::Display) -> Result<()> {
    writeln!(out, "{label:>32}: {value}")?;
    Ok(())
}

fn print_detection<W: Write>(
    out: &mut W,
    amplitude: f32,
    period: f32,
    background: f32,
    flags: u8,
) -> Result<()> {
    field(out, "signal amplitude", format_g(f64::from(amplitude), 10))?;
    field(out, "signal period", format_g(f64::from(period), 10))?;
    field(out, "background estimate", format_g(f64::from(background), 10))?;
    let wave = if flags & 0x01 != 0 { "dilatation" } else { "compression" };
    field(out, "event detection flags", format!("[{}] {wave} wave", bit_string(flags)))
}

fn bit_string(flags: u8) -> String {
    (0..8)
        .map(|i| if flags & (1 << i) != 0 { '1' } else { '0' })
        .collect()
}

/// Print one line per trace: source, start and end time, and optionally
/// the gap from the previous trace of the same source, the rate and the
/// sample count. Ends with the trace total.
pub fn print_trace_list<W: Write>(
    out: &mut W,
    group: &TraceGroup,
    format: TimeFormat,
    details: bool,
    gaps: bool,
) -> Result<()> {
    let heading = match (details, gaps) {
        (true, true) => {
            "   Source              Start sample             End sample        Gap  Hz   Samples"
        }
        (false, true) => "   Source              Start sample             End sample        Gap",
        (true, false) => {
            "   Source              Start sample             End sample        Hz   Samples"
        }
        (false, false) => "   Source              Start sample             End sample",
    };
    writeln!(out, "{heading}")?;

    let mut previous: Option<(String, f64, HpTime)> = None;
    for trace in group {
        let source = trace.source_name();
        let start = format.format(trace.start_time)?;
        let end = format.format(trace.end_time)?;

        if gaps {
            let mut gap = 0.0;
            if let Some((prev_source, prev_rate, prev_end)) = &previous {
                if *prev_source == source
                    && samplerate::is_rate_tolerable(*prev_rate, trace.sample_rate)
                {
                    gap = (trace.start_time - prev_end) as f64 / HPTMODULUS as f64;
                }
            }
            if gap < 0.0 && -gap > trace.duration() {
                gap = -trace.duration();
            }
            let gap = format_gap(gap);
            if details {
                writeln!(
                    out,
                    "{source:<15} {start:<24} {end:<24} {gap} {:<4} {}",
                    format_g(trace.sample_rate, 4),
                    trace.sample_count
                )?;
            } else {
                writeln!(out, "{source:<15} {start:<24} {end:<24} {gap:<4}")?;
            }
            previous = Some((source, trace.sample_rate, trace.end_time));
        } else if details {
            writeln!(
                out,
                "{source:<15} {start:<24} {end:<24} {:<4} {}",
                format_g(trace.sample_rate, 4),
                trace.sample_count
            )?;
        } else {
            writeln!(out, "{source:<15} {start:<24} {end:<24}")?;
        }
    }

    writeln!(out, "Total: {} trace(s)", group.len())?;
    Ok(())
}

/// Print the gaps and overlaps of a sorted group (see
/// [`TraceGroup::gaps`]), one per line, followed by the gap total.
pub fn print_gap_list<W: Write>(
    out: &mut W,
    group: &TraceGroup,
    format: TimeFormat,
    min: Option<f64>,
    max: Option<f64>,
) -> Result<()> {
    writeln!(
        out,
        "   Source              Last Sample              Next Sample       Gap   Samples"
    )?;
    let gaps = group.gaps(min, max);
    for gap in &gaps {
        writeln!(
            out,
            "{:<15} {:<24} {:<24} {:<4}  {}",
            gap.source,
            format.format(gap.last_sample)?,
            format.format(gap.next_sample)?,
            format_gap(gap.seconds),
            format_g(gap.samples, 8)
        )?;
    }
    writeln!(out, "Total: {} gap(s)", gaps.len())?;
    Ok(())
}

/// Gap length in days or hours once it reaches one, otherwise seconds.
pub fn format_gap(seconds: f64) -> String {
    if seconds.abs() >= 86_400.0 {
        format!("{:<3.1}d", seconds / 86_400.0)
    } else if seconds.abs() >= 3_600.0 {
        format!("{:<3.1}h", seconds / 3_600.0)
    } else {
        format!("{:<4}", format_g(seconds, 4))
    }
}

/// Shortest of fixed and exponent notation with `precision` significant
/// digits and trailing zeros removed, as C's `%g` does.
pub fn format_g(value: f64, precision: usize) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    if !value.is_finite() {
        return value.to_string();
    }

    let precision = precision.max(1);
    let sci = format!("{:.*e}", precision - 1, value);
    let (mantissa, exp) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
    let exp: i32 = exp.parse().unwrap_or(0);

    if exp < -4 || exp >= precision as i32 {
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{}e{sign}{:02}", trim_fraction(mantissa), exp.abs())
    } else {
        let decimals = (precision as i32 - 1 - exp).max(0) as usize;
        trim_fraction(&format!("{value:.decimals$}")).to_string()
    }
}

fn trim_fraction(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}
