//! CF-convention time coordinates
//!
//! Slice dates are always read from the `time` coordinate, never inferred from
//! the slice position: sources can have offset or irregular time axes.

use crate::errors::{PipelineError, Result};
use chrono::{NaiveDate, TimeDelta};

const SECONDS_PER_DAY: i64 = 86_400;
const NOLEAP_MONTHS: [u32; 12] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];
const ALL_LEAP_MONTHS: [u32; 12] = [31, 29, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];

fn time_error(message: impl Into<String>) -> PipelineError {
    PipelineError::TimeAxis(message.into())
}

/// Calendars understood by the decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Calendar {
    /// `standard`, `gregorian`, `proleptic_gregorian` (decoded as proleptic Gregorian)
    Standard,
    /// `noleap` / `365_day`
    NoLeap,
    /// `all_leap` / `366_day`
    AllLeap,
}

impl Calendar {
    pub fn parse(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "" | "standard" | "gregorian" | "proleptic_gregorian" => Ok(Self::Standard),
            "noleap" | "365_day" => Ok(Self::NoLeap),
            "all_leap" | "366_day" => Ok(Self::AllLeap),
            other => Err(time_error(format!("unsupported calendar '{other}'"))),
        }
    }

    fn month_lengths(self) -> Option<&'static [u32; 12]> {
        match self {
            Self::Standard => None,
            Self::NoLeap => Some(&NOLEAP_MONTHS),
            Self::AllLeap => Some(&ALL_LEAP_MONTHS),
        }
    }
}

/// Unit of a CF time offset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Days,
    Hours,
    Minutes,
    Seconds,
}

impl TimeUnit {
    fn parse(unit: &str) -> Result<Self> {
        match unit.to_ascii_lowercase().as_str() {
            "days" | "day" | "d" => Ok(Self::Days),
            "hours" | "hour" | "hrs" | "hr" | "h" => Ok(Self::Hours),
            "minutes" | "minute" | "mins" | "min" => Ok(Self::Minutes),
            "seconds" | "second" | "secs" | "sec" | "s" => Ok(Self::Seconds),
            other => Err(time_error(format!("unsupported time unit '{other}'"))),
        }
    }

    #[must_use]
    pub const fn seconds(self) -> f64 {
        match self {
            Self::Days => 86_400.0,
            Self::Hours => 3_600.0,
            Self::Minutes => 60.0,
            Self::Seconds => 1.0,
        }
    }
}

/// Parsed `"<unit> since <epoch>"` attribute
#[derive(Debug, Clone, PartialEq)]
pub struct TimeUnits {
    pub unit: TimeUnit,
    pub epoch_date: (i32, u32, u32),
    /// Seconds after midnight on the epoch date
    pub epoch_seconds: f64,
}

impl TimeUnits {
    /// Parses strings such as `hours since 1800-1-1 00:00:0.0` or
    /// `days since 2000-01-01T00:00:00Z`.
    pub fn parse(units: &str) -> Result<Self> {
        let (unit, epoch) = units
            .split_once(" since ")
            .ok_or_else(|| time_error(format!("unexpected time units format: '{units}'")))?;
        let unit = TimeUnit::parse(unit.trim())?;

        let epoch = epoch.trim().replacen('T', " ", 1);
        let mut pieces = epoch.split_whitespace();
        let date_part = pieces
            .next()
            .ok_or_else(|| time_error(format!("missing epoch in '{units}'")))?;
        let time_part = pieces.next().map(|t| t.trim_end_matches('Z'));

        let date_fields: Vec<&str> = date_part.split('-').collect();
        let [year, month, day] = date_fields.as_slice() else {
            return Err(time_error(format!("cannot parse epoch date '{date_part}'")));
        };
        let parse = |s: &str| {
            s.parse::<i64>()
                .map_err(|_| time_error(format!("cannot parse epoch date '{date_part}'")))
        };
        let epoch_date = (parse(*year)? as i32, parse(*month)? as u32, parse(*day)? as u32);

        let epoch_seconds = match time_part {
            Some(time) => parse_clock(time)?,
            None => 0.0,
        };

        Ok(Self {
            unit,
            epoch_date,
            epoch_seconds,
        })
    }
}

fn parse_clock(time: &str) -> Result<f64> {
    let fields: Vec<&str> = time.split(':').collect();
    let mut seconds = 0.0;
    for (field, scale) in fields.iter().zip([3_600.0, 60.0, 1.0]) {
        let value: f64 = field
            .parse()
            .map_err(|_| time_error(format!("cannot parse epoch time '{time}'")))?;
        seconds += value * scale;
    }
    Ok(seconds)
}

/// Decodes raw time coordinate values into calendar dates.
pub fn decode_dates(
    units: &TimeUnits,
    calendar: Calendar,
    values: &[f64],
) -> Result<Vec<NaiveDate>> {
    values
        .iter()
        .map(|&value| {
            if !value.is_finite() {
                return Err(time_error(format!("non-finite time value {value}")));
            }
            let offset = (value * units.unit.seconds() + units.epoch_seconds).round() as i64;
            match calendar.month_lengths() {
                None => standard_date(units, offset),
                Some(months) => fixed_year_date(units, months, offset),
            }
        })
        .collect()
}

/// `offset` counts seconds from midnight of the epoch date.
fn standard_date(units: &TimeUnits, offset: i64) -> Result<NaiveDate> {
    let (y, m, d) = units.epoch_date;
    let epoch = NaiveDate::from_ymd_opt(y, m, d)
        .ok_or_else(|| time_error(format!("invalid epoch date {y}-{m}-{d}")))?;
    let midnight = epoch
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| time_error(format!("invalid epoch date {epoch}")))?;
    let delta = TimeDelta::try_seconds(offset)
        .ok_or_else(|| time_error(format!("time offset {offset}s out of range")))?;
    midnight
        .checked_add_signed(delta)
        .map(|dt| dt.date())
        .ok_or_else(|| time_error(format!("date overflow adding {offset}s to {epoch}")))
}

fn fixed_year_date(units: &TimeUnits, months: &[u32; 12], offset: i64) -> Result<NaiveDate> {
    let year_len: i64 = months.iter().map(|&m| i64::from(m)).sum();
    let (y, m, d) = units.epoch_date;
    if !(1..=12).contains(&m) || d == 0 || d > months[(m - 1) as usize] {
        return Err(time_error(format!("invalid epoch date {y}-{m}-{d}")));
    }
    let epoch_doy: i64 = months[..(m - 1) as usize]
        .iter()
        .map(|&len| i64::from(len))
        .sum::<i64>()
        + i64::from(d - 1);

    let absolute = i64::from(y) * year_len + epoch_doy + offset.div_euclid(SECONDS_PER_DAY);
    let year = absolute.div_euclid(year_len);
    let mut doy = absolute.rem_euclid(year_len);
    let mut month = 0;
    while doy >= i64::from(months[month]) {
        doy -= i64::from(months[month]);
        month += 1;
    }

    let year = i32::try_from(year).map_err(|_| time_error("year out of range"))?;
    NaiveDate::from_ymd_opt(year, month as u32 + 1, doy as u32 + 1).ok_or_else(|| {
        time_error(format!(
            "{year}-{:02}-{:02} does not exist in the Gregorian calendar",
            month + 1,
            doy + 1
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn parses_reanalysis_style_units() {
        let units = TimeUnits::parse("hours since 1800-1-1 00:00:0.0").unwrap();
        assert_eq!(units.unit, TimeUnit::Hours);
        assert_eq!(units.epoch_date, (1800, 1, 1));
        assert_eq!(units.epoch_seconds, 0.0);

        let units = TimeUnits::parse("days since 2000-01-01T12:00:00Z").unwrap();
        assert_eq!(units.unit, TimeUnit::Days);
        assert_eq!(units.epoch_seconds, 43_200.0);

        assert!(TimeUnits::parse("days after 2000-01-01").is_err());
        assert!(TimeUnits::parse("fortnights since 2000-01-01").is_err());
    }

    #[test]
    fn decodes_standard_calendar() {
        let units = TimeUnits::parse("days since 2000-01-01").unwrap();
        let dates = decode_dates(&units, Calendar::Standard, &[0.0, 59.0, 60.0, 366.0]).unwrap();
        assert_eq!(
            dates,
            vec![date(2000, 1, 1), date(2000, 2, 29), date(2000, 3, 1), date(2001, 1, 1)]
        );
    }

    #[test]
    fn decodes_hours_with_float_noise() {
        let units = TimeUnits::parse("hours since 1800-1-1 00:00:0.0").unwrap();
        // 1990-01-01 is 69396 days after 1800-01-01
        let hours = 69_396.0 * 24.0 - 1e-7;
        let dates = decode_dates(&units, Calendar::Standard, &[hours]).unwrap();
        assert_eq!(dates, vec![date(1990, 1, 1)]);
    }

    #[test]
    fn decodes_noleap_calendar() {
        let units = TimeUnits::parse("days since 2000-01-01").unwrap();
        let dates = decode_dates(&units, Calendar::NoLeap, &[58.0, 59.0, 365.0]).unwrap();
        assert_eq!(dates, vec![date(2000, 2, 28), date(2000, 3, 1), date(2001, 1, 1)]);
    }

    #[test]
    fn all_leap_rejects_dates_outside_gregorian() {
        let units = TimeUnits::parse("days since 2001-02-28").unwrap();
        assert!(decode_dates(&units, Calendar::AllLeap, &[1.0]).is_err());
    }

    #[test]
    fn unknown_calendar_is_an_error() {
        assert!(Calendar::parse("julian").is_err());
        assert_eq!(Calendar::parse("gregorian").unwrap(), Calendar::Standard);
        assert_eq!(Calendar::parse("365_day").unwrap(), Calendar::NoLeap);
    }
}
