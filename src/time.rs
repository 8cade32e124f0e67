//! High-precision epoch times and the SEED BTIME representation.
//!
//! [`HpTime`] counts microseconds since 1970-01-01T00:00:00 UTC and is the
//! time base used throughout the crate. [`BTime`] is the 10-byte start
//! time stored in the fixed header, with 1/10000 second resolution.
//!
//! Calendar arithmetic (day-of-year, month/day, epoch conversion) goes
//! through `chrono`.

use std::fmt;

use chrono::{DateTime, Datelike, Duration, NaiveDate, Timelike, Utc};

use crate::types::ByteOrder;
use crate::{MseedError, Result};

/// High-precision time: microseconds since the Unix epoch.
pub type HpTime = i64;

/// Ticks per second of [`HpTime`].
pub const HPTMODULUS: i64 = 1_000_000;

/// BTIME timestamp (10 bytes in the Mini-SEED v2 fixed header).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BTime {
    pub year: u16,
    pub day: u16,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub fract: u16, // 0.0001 second units
}

impl BTime {
    /// Size of an encoded BTIME in bytes.
    pub const SIZE: usize = 10;

    /// Convert to [`HpTime`], validating every field.
    ///
    /// The year must be within 1900..=2100, the day within 1..=366 and
    /// the fraction below 10000.
    pub fn to_hptime(&self) -> Result<HpTime> {
        if self.fract > 9999 {
            return Err(MseedError::Time(format!(
                "fractional seconds ({}) out of range",
                self.fract
            )));
        }
        time_to_hptime(
            self.year as i32,
            self.day as i32,
            self.hour as i32,
            self.minute as i32,
            self.second as i32,
            self.fract as i32 * 100,
        )
    }

    /// Convert an [`HpTime`] to a BTIME, truncating below 1/10000 second.
    pub fn from_hptime(time: HpTime) -> Result<Self> {
        hptime_to_btime(time)
    }

    pub(crate) fn parse(data: &[u8], offset: usize, order: ByteOrder) -> Self {
        Self {
            year: order.read_u16(data, offset),
            day: order.read_u16(data, offset + 2),
            hour: data[offset + 4],
            minute: data[offset + 5],
            second: data[offset + 6],
            // byte 7 is unused
            fract: order.read_u16(data, offset + 8),
        }
    }

    pub(crate) fn write(&self, buf: &mut [u8], offset: usize, order: ByteOrder) {
        order.write_u16(buf, offset, self.year);
        order.write_u16(buf, offset + 2, self.day);
        buf[offset + 4] = self.hour;
        buf[offset + 5] = self.minute;
        buf[offset + 6] = self.second;
        buf[offset + 7] = 0;
        order.write_u16(buf, offset + 8, self.fract);
    }
}

impl fmt::Display for BTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:03} {:02}:{:02}:{:02}.{:04}",
            self.year, self.day, self.hour, self.minute, self.second, self.fract
        )
    }
}

/// Build an [`HpTime`] from ordinal date and time components.
///
/// Ranges: year 1900..=2100, day 1..=366, hour 0..=23, minute 0..=59,
/// second 0..=60, microsecond 0..=999999.
pub fn time_to_hptime(
    year: i32,
    day: i32,
    hour: i32,
    minute: i32,
    second: i32,
    usec: i32,
) -> Result<HpTime> {
    check_range("year", year, 1900, 2100)?;
    check_fields(day, hour, minute, second, usec)?;
    compose(year, day, hour, minute, second, usec)
}

fn check_range(name: &str, value: i32, min: i32, max: i32) -> Result<()> {
    if value < min || value > max {
        return Err(MseedError::Time(format!("{name} ({value}) out of range")));
    }
    Ok(())
}

fn check_fields(day: i32, hour: i32, minute: i32, second: i32, usec: i32) -> Result<()> {
    check_range("day", day, 1, 366)?;
    check_range("hour", hour, 0, 23)?;
    check_range("minute", minute, 0, 59)?;
    check_range("second", second, 0, 60)?;
    check_range("microsecond", usec, 0, 999_999)
}

/// Unchecked composition; day 366 of a common year rolls into the next
/// year as the SEED time arithmetic does.
fn compose(year: i32, day: i32, hour: i32, minute: i32, second: i32, usec: i32) -> Result<HpTime> {
    let jan1 = NaiveDate::from_yo_opt(year, 1)
        .ok_or_else(|| MseedError::Time(format!("year ({year}) not representable")))?;
    let date = jan1 + Duration::days(i64::from(day) - 1);
    let days = date.signed_duration_since(NaiveDate::default()).num_days();
    let seconds = days * 86_400
        + i64::from(hour) * 3_600
        + i64::from(minute) * 60
        + i64::from(second);
    Ok(seconds * HPTMODULUS + i64::from(usec))
}

/// Split an [`HpTime`] into a UTC datetime, flooring negative values.
pub fn hptime_to_datetime(time: HpTime) -> Result<DateTime<Utc>> {
    let secs = time.div_euclid(HPTMODULUS);
    let usec = time.rem_euclid(HPTMODULUS) as u32;
    DateTime::from_timestamp(secs, usec * 1_000)
        .ok_or_else(|| MseedError::Time(format!("time {time} not representable")))
}

/// Convert an [`HpTime`] to a BTIME, truncating below 1/10000 second.
/// Times before the epoch floor toward the earlier tick.
pub fn hptime_to_btime(time: HpTime) -> Result<BTime> {
    let dt = hptime_to_datetime(time)?;
    let year = u16::try_from(dt.year())
        .map_err(|_| MseedError::Time(format!("year ({}) out of range", dt.year())))?;
    Ok(BTime {
        year,
        day: dt.ordinal() as u16,
        hour: dt.hour() as u8,
        minute: dt.minute() as u8,
        second: dt.second() as u8,
        fract: (time.rem_euclid(HPTMODULUS) / 100) as u16,
    })
}

/// Month and day of month for a day-of-year. Years 1900..=2100.
pub fn doy_to_md(year: i32, doy: u32) -> Result<(u32, u32)> {
    check_range("year", year, 1900, 2100)?;
    let date = NaiveDate::from_yo_opt(year, doy)
        .ok_or_else(|| MseedError::Time(format!("day-of-year ({doy}) out of range for {year}")))?;
    Ok((date.month(), date.day()))
}

/// Day-of-year for a month and day of month. Years 1900..=2100.
pub fn md_to_doy(year: i32, month: u32, mday: u32) -> Result<u32> {
    check_range("year", year, 1900, 2100)?;
    calendar_doy(year, month, mday)
}

fn calendar_doy(year: i32, month: u32, mday: u32) -> Result<u32> {
    if !(1..=12).contains(&month) {
        return Err(MseedError::Time(format!("month ({month}) out of range")));
    }
    NaiveDate::from_ymd_opt(year, month, mday)
        .map(|d| d.ordinal())
        .ok_or_else(|| {
            MseedError::Time(format!("day-of-month ({mday}) out of range for {year}-{month:02}"))
        })
}

/// Format as `YYYY,DDD,HH:MM:SS.FFFFFF`.
pub fn hptime_to_seed_string(time: HpTime) -> Result<String> {
    let dt = hptime_to_datetime(time)?;
    Ok(format!(
        "{:4},{:03},{:02}:{:02}:{:02}.{:06}",
        dt.year(),
        dt.ordinal(),
        dt.hour(),
        dt.minute(),
        dt.second(),
        time.rem_euclid(HPTMODULUS)
    ))
}

/// Format as `YYYY-MM-DDTHH:MM:SS.FFFFFF`.
pub fn hptime_to_iso_string(time: HpTime) -> Result<String> {
    let dt = hptime_to_datetime(time)?;
    Ok(format!(
        "{:4}-{:02}-{:02}T{:02}:{:02}:{:02}.{:06}",
        dt.year(),
        dt.month(),
        dt.day(),
        dt.hour(),
        dt.minute(),
        dt.second(),
        time.rem_euclid(HPTMODULUS)
    ))
}

/// Text layouts accepted by [`parse_time_string`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeDialect {
    /// `YYYY,DDD,HH:MM:SS.FFFFFF` with `,`, `:` or `.` separators.
    Ordinal,
    /// `YYYY-MM-DD[THH:MM:SS.FFFFFF]` with `-`, `/`, `:` or `.`
    /// separators and `T` or a space before the hour.
    Calendar,
}

/// Parse a time string. Omitted trailing fields default to zero, except
/// day (and month) which default to 1. Years 1900..=3000 are accepted.
pub fn parse_time_string(text: &str, dialect: TimeDialect) -> Result<HpTime> {
    match dialect {
        TimeDialect::Ordinal => parse_ordinal(text),
        TimeDialect::Calendar => parse_calendar(text),
    }
}

/// Shorthand for [`parse_time_string`] with [`TimeDialect::Ordinal`].
pub fn parse_seed_time(text: &str) -> Result<HpTime> {
    parse_ordinal(text)
}

/// Shorthand for [`parse_time_string`] with [`TimeDialect::Calendar`].
pub fn parse_iso_time(text: &str) -> Result<HpTime> {
    parse_calendar(text)
}

fn parse_ordinal(text: &str) -> Result<HpTime> {
    const SEP: &[u8] = b",:.";
    let (ints, frac) = scan_fields(text, &[SEP, SEP, SEP, SEP])?;
    let field = |i: usize, default: i64| ints.get(i).copied().unwrap_or(default);

    let year = to_i32(field(0, 0))?;
    check_range("year", year, 1900, 3000)?;
    let usec = frac_to_usec(frac);
    let (day, hour, minute, second) = (
        to_i32(field(1, 1))?,
        to_i32(field(2, 0))?,
        to_i32(field(3, 0))?,
        to_i32(field(4, 0))?,
    );
    check_fields(day, hour, minute, second, usec)?;
    compose(year, day, hour, minute, second, usec)
}

fn parse_calendar(text: &str) -> Result<HpTime> {
    const SEP: &[u8] = b"-/:.";
    const DATE_TIME: &[u8] = b"-/:.T ";
    let (ints, frac) = scan_fields(text, &[SEP, SEP, DATE_TIME, SEP, SEP])?;
    let field = |i: usize, default: i64| ints.get(i).copied().unwrap_or(default);

    let year = to_i32(field(0, 0))?;
    check_range("year", year, 1900, 3000)?;
    let month = u32::try_from(field(1, 1))
        .map_err(|_| MseedError::Time(format!("month ({}) out of range", field(1, 1))))?;
    let mday = u32::try_from(field(2, 1))
        .map_err(|_| MseedError::Time(format!("day ({}) out of range", field(2, 1))))?;
    let day = calendar_doy(year, month, mday)? as i32;
    let usec = frac_to_usec(frac);
    let (hour, minute, second) = (
        to_i32(field(3, 0))?,
        to_i32(field(4, 0))?,
        to_i32(field(5, 0))?,
    );
    check_fields(day, hour, minute, second, usec)?;
    compose(year, day, hour, minute, second, usec)
}

fn to_i32(value: i64) -> Result<i32> {
    i32::try_from(value).map_err(|_| MseedError::Time(format!("field ({value}) out of range")))
}

fn frac_to_usec(frac: f64) -> i32 {
    (frac * 1_000_000.0 + 0.5) as i32
}

/// Scan `int (sep+ int)* [.digits]` where `separators[i]` is the set
/// allowed before integer `i + 1`. Scanning stops quietly at the first
/// token that does not fit, like `sscanf`.
fn scan_fields(text: &str, separators: &[&[u8]]) -> Result<(Vec<i64>, f64)> {
    let bytes = text.trim().as_bytes();
    let mut pos = 0;
    let mut ints = Vec::with_capacity(separators.len() + 1);

    loop {
        if let Some(sep) = ints.len().checked_sub(1).and_then(|i| separators.get(i)) {
            let start = pos;
            while pos < bytes.len() && sep.contains(&bytes[pos]) {
                pos += 1;
            }
            if pos == start {
                break;
            }
        }
        match scan_int(bytes, &mut pos) {
            Some(v) => ints.push(v),
            None => break,
        }
        if ints.len() > separators.len() {
            break;
        }
    }

    if ints.is_empty() {
        return Err(MseedError::Time(format!("unrecognized time string: {text:?}")));
    }

    let mut frac = 0.0;
    if ints.len() == separators.len() + 1 && bytes.get(pos) == Some(&b'.') {
        let start = pos;
        pos += 1;
        while pos < bytes.len() && bytes[pos].is_ascii_digit() {
            pos += 1;
        }
        // text is ASCII up to here, the slice is valid UTF-8
        let digits = std::str::from_utf8(&bytes[start..pos]).unwrap_or(".");
        frac = format!("0{digits}").parse::<f64>().unwrap_or(0.0);
    }

    Ok((ints, frac))
}

fn scan_int(bytes: &[u8], pos: &mut usize) -> Option<i64> {
    let start = *pos;
    let mut end = start;
    if end < bytes.len() && (bytes[end] == b'-' || bytes[end] == b'+') {
        end += 1;
    }
    let digits_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if end == digits_start {
        return None;
    }
    let value = std::str::from_utf8(&bytes[start..end]).ok()?.parse().ok()?;
    *pos = end;
    Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bt(year: u16, day: u16, hour: u8, minute: u8, second: u8, fract: u16) -> BTime {
        BTime {
            year,
            day,
            hour,
            minute,
            second,
            fract,
        }
    }

    #[test]
    fn test_epoch() {
        assert_eq!(bt(1970, 1, 0, 0, 0, 0).to_hptime().unwrap(), 0);
        assert_eq!(hptime_to_btime(0).unwrap(), bt(1970, 1, 0, 0, 0, 0));
    }

    #[test]
    fn test_known_time() {
        // 2004-07-28T20:28:06.185Z
        let t = bt(2004, 210, 20, 28, 6, 1850).to_hptime().unwrap();
        assert_eq!(t, 1_091_046_486_185_000);
        assert_eq!(
            hptime_to_iso_string(t).unwrap(),
            "2004-07-28T20:28:06.185000"
        );
        assert_eq!(
            hptime_to_seed_string(t).unwrap(),
            "2004,210,20:28:06.185000"
        );
    }

    #[test]
    fn test_btime_roundtrip_grid() {
        for year in 1900u16..2100 {
            for day in [1u16, 2, 59, 60, 180, 364, 365] {
                for (hour, minute, second) in [(0u8, 0u8, 0u8), (12, 30, 45), (23, 59, 59)] {
                    for fract in [0u16, 1, 5000, 9999] {
                        let t = bt(year, day, hour, minute, second, fract);
                        let hp = t.to_hptime().unwrap();
                        assert_eq!(hptime_to_btime(hp).unwrap(), t, "{t}");
                    }
                }
            }
        }
    }

    #[test]
    fn test_btime_roundtrip_all_clock_fields() {
        for hour in 0u8..24 {
            for minute in 0u8..60 {
                for second in 0u8..60 {
                    let t = bt(2001, 77, hour, minute, second, 0);
                    let hp = t.to_hptime().unwrap();
                    assert_eq!(hptime_to_btime(hp).unwrap(), t);
                }
            }
        }
    }

    #[test]
    fn test_truncation_not_rounding() {
        let hp = bt(2010, 1, 0, 0, 0, 0).to_hptime().unwrap() + 199;
        assert_eq!(hptime_to_btime(hp).unwrap().fract, 1);
    }

    #[test]
    fn test_negative_floors() {
        assert_eq!(hptime_to_btime(-1).unwrap(), bt(1969, 365, 23, 59, 59, 9999));
        assert_eq!(
            hptime_to_btime(-1_500_000).unwrap(),
            bt(1969, 365, 23, 59, 58, 5000)
        );
        assert_eq!(
            hptime_to_iso_string(-1).unwrap(),
            "1969-12-31T23:59:59.999999"
        );
    }

    #[test]
    fn test_range_checks() {
        assert!(bt(1899, 1, 0, 0, 0, 0).to_hptime().is_err());
        assert!(bt(2101, 1, 0, 0, 0, 0).to_hptime().is_err());
        assert!(bt(2000, 0, 0, 0, 0, 0).to_hptime().is_err());
        assert!(bt(2000, 367, 0, 0, 0, 0).to_hptime().is_err());
        assert!(bt(2000, 1, 24, 0, 0, 0).to_hptime().is_err());
        assert!(bt(2000, 1, 0, 60, 0, 0).to_hptime().is_err());
        assert!(bt(2000, 1, 0, 0, 61, 0).to_hptime().is_err());
        assert!(bt(2000, 1, 0, 0, 0, 10000).to_hptime().is_err());
        // leap second is accepted
        assert!(bt(2016, 366, 23, 59, 60, 0).to_hptime().is_ok());
    }

    #[test]
    fn test_doy_md() {
        assert_eq!(doy_to_md(2000, 60).unwrap(), (2, 29));
        assert_eq!(doy_to_md(2001, 60).unwrap(), (3, 1));
        assert_eq!(md_to_doy(2004, 12, 31).unwrap(), 366);
        assert_eq!(md_to_doy(1900, 3, 1).unwrap(), 60);
        assert!(doy_to_md(2001, 366).is_err());
        assert!(md_to_doy(2001, 2, 29).is_err());
        assert!(md_to_doy(2200, 1, 1).is_err());
    }

    #[test]
    fn test_parse_ordinal() {
        let expect = bt(2004, 210, 20, 28, 6, 1850).to_hptime().unwrap();
        assert_eq!(parse_seed_time("2004,210,20:28:06.185").unwrap(), expect);
        assert_eq!(parse_seed_time("2004.210.20.28.06.185").unwrap(), expect);
        assert_eq!(
            parse_seed_time("2004,210").unwrap(),
            bt(2004, 210, 0, 0, 0, 0).to_hptime().unwrap()
        );
        assert_eq!(
            parse_seed_time("2004").unwrap(),
            bt(2004, 1, 0, 0, 0, 0).to_hptime().unwrap()
        );
        assert_eq!(
            parse_seed_time("2004,001,00:00:00.0000006").unwrap(),
            bt(2004, 1, 0, 0, 0, 0).to_hptime().unwrap() + 1
        );
    }

    #[test]
    fn test_parse_calendar() {
        let expect = bt(2004, 210, 20, 28, 6, 1850).to_hptime().unwrap();
        assert_eq!(parse_iso_time("2004-07-28T20:28:06.185").unwrap(), expect);
        assert_eq!(parse_iso_time("2004/07/28 20:28:06.185").unwrap(), expect);
        assert_eq!(
            parse_iso_time("2004-07-28").unwrap(),
            bt(2004, 210, 0, 0, 0, 0).to_hptime().unwrap()
        );
        assert_eq!(
            parse_iso_time("2004").unwrap(),
            bt(2004, 1, 0, 0, 0, 0).to_hptime().unwrap()
        );
    }

    #[test]
    fn test_parse_year_range_is_wider_than_binary() {
        let far = parse_time_string("2500,001", TimeDialect::Ordinal).unwrap();
        assert!(far > 0);
        assert!(parse_time_string("3001,001", TimeDialect::Ordinal).is_err());
        assert!(parse_time_string("1899-12-31", TimeDialect::Calendar).is_err());
        assert!(parse_time_string("2004-13-01", TimeDialect::Calendar).is_err());
        assert!(parse_time_string("garbage", TimeDialect::Calendar).is_err());
    }

    #[test]
    fn test_btime_wire_layout() {
        let t = bt(2025, 100, 12, 30, 45, 1234);
        let mut buf = [0xAAu8; 10];
        t.write(&mut buf, 0, ByteOrder::Big);
        assert_eq!(buf, [0x07, 0xE9, 0x00, 0x64, 12, 30, 45, 0, 0x04, 0xD2]);
        assert_eq!(BTime::parse(&buf, 0, ByteOrder::Big), t);

        t.write(&mut buf, 0, ByteOrder::Little);
        assert_eq!(buf[0..2], [0xE9, 0x07]);
        assert_eq!(BTime::parse(&buf, 0, ByteOrder::Little), t);
    }

    #[test]
    fn test_btime_display() {
        assert_eq!(
            format!("{}", bt(2024, 15, 10, 30, 0, 5000)),
            "2024-015 10:30:00.5000"
        );
    }
}
