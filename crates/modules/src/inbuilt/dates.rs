//! `moment`: date parsing, formatting and arithmetic.
//!
//! Instants cross the bridge as milliseconds since the epoch and are always
//! interpreted in UTC. The script-side adapter builds chainable moment
//! objects on top of these calls.

use chrono::{
    DateTime, Datelike, Duration, Months, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike,
    Utc,
};
use serde_json::{json, Value};

use scriptbox_core::{traits::Export, traits::NativeModule, Error, Result};

use super::{arg, arg_text, unknown_function};

/// Default pattern used by `format()` without arguments.
pub const DEFAULT_FORMAT: &str = "YYYY-MM-DDTHH:mm:ssZ";

/// Date helpers behind the `moment` adapter.
pub struct DatesModule;

// Longest tokens first so `YYYY` wins over `YY`.
const TOKENS: &[(&str, &str)] = &[
    ("YYYY", "%Y"),
    ("YY", "%y"),
    ("MMMM", "%B"),
    ("MMM", "%b"),
    ("MM", "%m"),
    ("M", "%-m"),
    ("DDDD", "%j"),
    ("DD", "%d"),
    ("D", "%-d"),
    ("dddd", "%A"),
    ("ddd", "%a"),
    ("HH", "%H"),
    ("H", "%-H"),
    ("hh", "%I"),
    ("h", "%-I"),
    ("mm", "%M"),
    ("m", "%-M"),
    ("ss", "%S"),
    ("s", "%-S"),
    ("SSS", "%3f"),
    ("A", "%p"),
    ("a", "%P"),
    ("ZZ", "%z"),
    ("Z", "%:z"),
    ("X", "%s"),
];

/// English ordinal for a day of the month (`1st`, `2nd`, `11th`, `23rd`).
pub fn ordinal(day: u32) -> String {
    let suffix = match (day % 10, day % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    };
    format!("{}{}", day, suffix)
}

/// Translate a moment format pattern into a chrono format string.
///
/// `[...]` sections are copied literally.
pub fn to_chrono_format(pattern: &str) -> String {
    translate(pattern, None)
}

/// `Do` has no chrono counterpart: it renders as `day` when one is given and
/// as the plain day number otherwise.
fn translate(pattern: &str, day: Option<u32>) -> String {
    let mut out = String::with_capacity(pattern.len() * 2);
    let mut rest = pattern;

    'outer: while let Some(c) = rest.chars().next() {
        if c == '[' {
            if let Some(end) = rest.find(']') {
                out.push_str(&rest[1..end].replace('%', "%%"));
                rest = &rest[end + 1..];
                continue;
            }
        }
        if let Some(tail) = rest.strip_prefix("Do") {
            match day {
                Some(day) => out.push_str(&ordinal(day)),
                None => out.push_str("%-d"),
            }
            rest = tail;
            continue;
        }
        for (token, spec) in TOKENS {
            if let Some(tail) = rest.strip_prefix(token) {
                out.push_str(spec);
                rest = tail;
                continue 'outer;
            }
        }
        if c == '%' {
            out.push_str("%%");
        } else {
            out.push(c);
        }
        rest = &rest[c.len_utf8()..];
    }
    out
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| Error::module_call(format!("invalid timestamp {}", ms)))
}

fn millis_arg(args: &[Value], index: usize) -> Result<DateTime<Utc>> {
    let value = arg(args, index);
    let ms = value
        .as_i64()
        .or_else(|| value.as_f64().map(|f| f as i64))
        .ok_or_else(|| Error::module_call("moment: expected a timestamp"))?;
    from_millis(ms)
}

fn midnight(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN)
}

/// Parse a date string, optionally with a moment pattern. `None` if invalid.
pub fn parse(input: &str, pattern: Option<&str>) -> Option<DateTime<Utc>> {
    if let Some(pattern) = pattern {
        let format = to_chrono_format(pattern);
        if let Ok(dt) = DateTime::parse_from_str(input, &format) {
            return Some(dt.with_timezone(&Utc));
        }
        return NaiveDateTime::parse_from_str(input, &format)
            .ok()
            .or_else(|| NaiveDate::parse_from_str(input, &format).ok().map(midnight))
            .map(|naive| Utc.from_utc_datetime(&naive));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(input) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(input, f).ok())
        .or_else(|| NaiveDate::parse_from_str(input, "%Y-%m-%d").ok().map(midnight))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Normalize moment unit names (`days`, `d`, `day`) to their singular form.
fn unit(name: &str) -> Result<&'static str> {
    let unit = match name {
        "ms" | "millisecond" | "milliseconds" => "millisecond",
        "s" | "second" | "seconds" => "second",
        "m" | "minute" | "minutes" => "minute",
        "h" | "hour" | "hours" => "hour",
        "d" | "day" | "days" | "date" => "day",
        "w" | "week" | "weeks" => "week",
        "M" | "month" | "months" => "month",
        "Q" | "quarter" | "quarters" => "quarter",
        "y" | "year" | "years" => "year",
        other => return Err(Error::module_call(format!("moment: unknown unit '{}'", other))),
    };
    Ok(unit)
}

/// Shift an instant by `amount` units.
pub fn add(dt: DateTime<Utc>, amount: i64, unit_name: &str) -> Result<DateTime<Utc>> {
    let overflow = || Error::module_call("moment: date out of range");
    let shifted = match unit(unit_name)? {
        "millisecond" => dt.checked_add_signed(Duration::milliseconds(amount)),
        "second" => dt.checked_add_signed(Duration::seconds(amount)),
        "minute" => dt.checked_add_signed(Duration::minutes(amount)),
        "hour" => dt.checked_add_signed(Duration::hours(amount)),
        "day" => dt.checked_add_signed(Duration::days(amount)),
        "week" => dt.checked_add_signed(Duration::weeks(amount)),
        months_unit => {
            let months = match months_unit {
                "quarter" => amount * 3,
                "year" => amount * 12,
                _ => amount,
            };
            let magnitude = Months::new(u32::try_from(months.unsigned_abs()).map_err(|_| overflow())?);
            if months >= 0 {
                dt.checked_add_months(magnitude)
            } else {
                dt.checked_sub_months(magnitude)
            }
        }
    };
    shifted.ok_or_else(overflow)
}

fn month_index(dt: &DateTime<Utc>) -> i64 {
    i64::from(dt.year()) * 12 + i64::from(dt.month0())
}

/// Difference `a - b` in the given unit, truncated toward zero unless `precise`.
pub fn diff(a: DateTime<Utc>, b: DateTime<Utc>, unit_name: &str, precise: bool) -> Result<f64> {
    let ms = (a - b).num_milliseconds() as f64;
    let value = match unit(unit_name)? {
        "millisecond" => ms,
        "second" => ms / 1_000.0,
        "minute" => ms / 60_000.0,
        "hour" => ms / 3_600_000.0,
        "day" => ms / 86_400_000.0,
        "week" => ms / 604_800_000.0,
        months_unit => {
            let mut months = (month_index(&a) - month_index(&b)) as f64;
            // Count a partial month only once its day/time has been reached
            let anchor = add(b, months as i64, "month")?;
            let remainder = (a - anchor).num_milliseconds() as f64;
            months += remainder / (31.0 * 86_400_000.0);
            match months_unit {
                "quarter" => months / 3.0,
                "year" => months / 12.0,
                _ => months,
            }
        }
    };
    Ok(if precise { value } else { value.trunc() })
}

/// Round down to the start of a unit.
pub fn start_of(dt: DateTime<Utc>, unit_name: &str) -> Result<DateTime<Utc>> {
    let date = dt.date_naive();
    let naive = match unit(unit_name)? {
        "year" => NaiveDate::from_ymd_opt(date.year(), 1, 1).map(midnight),
        "quarter" => NaiveDate::from_ymd_opt(date.year(), date.month0() / 3 * 3 + 1, 1).map(midnight),
        "month" => NaiveDate::from_ymd_opt(date.year(), date.month(), 1).map(midnight),
        "week" => date
            .checked_sub_signed(Duration::days(i64::from(date.weekday().num_days_from_sunday())))
            .map(midnight),
        "day" => Some(midnight(date)),
        "hour" => date.and_hms_opt(dt.hour(), 0, 0),
        "minute" => date.and_hms_opt(dt.hour(), dt.minute(), 0),
        "second" => date.and_hms_opt(dt.hour(), dt.minute(), dt.second()),
        _ => Some(dt.naive_utc()),
    };
    naive
        .map(|n| Utc.from_utc_datetime(&n))
        .ok_or_else(|| Error::module_call("moment: date out of range"))
}

/// Format an instant with a moment pattern.
pub fn format(dt: DateTime<Utc>, pattern: &str) -> String {
    dt.format(&translate(pattern, Some(dt.day()))).to_string()
}

impl NativeModule for DatesModule {
    fn name(&self) -> &str {
        "moment"
    }

    fn exports(&self) -> Vec<Export> {
        ["now", "parse", "format", "add", "diff", "startOf"]
            .into_iter()
            .map(Export::sync)
            .collect()
    }

    fn adapter(&self) -> Option<&str> {
        Some("moment")
    }

    fn call(&self, function: &str, args: &[Value]) -> Result<Value> {
        match function {
            "now" => Ok(json!(Utc::now().timestamp_millis())),
            "parse" => {
                let parsed = match arg(args, 0) {
                    Value::Number(n) => n.as_f64().and_then(|f| from_millis(f as i64).ok()),
                    Value::String(s) => {
                        let pattern = arg(args, 1).as_str();
                        parse(s, pattern)
                    }
                    _ => None,
                };
                Ok(parsed.map_or(Value::Null, |dt| json!(dt.timestamp_millis())))
            }
            "format" => {
                let dt = millis_arg(args, 0)?;
                let pattern = arg(args, 1).as_str().unwrap_or(DEFAULT_FORMAT);
                Ok(json!(format(dt, pattern)))
            }
            "add" => {
                let dt = millis_arg(args, 0)?;
                let amount = arg(args, 1)
                    .as_f64()
                    .ok_or_else(|| Error::module_call("moment.add: amount must be a number"))?;
                let shifted = add(dt, amount as i64, &arg_text(args, 2))?;
                Ok(json!(shifted.timestamp_millis()))
            }
            "diff" => {
                let a = millis_arg(args, 0)?;
                let b = millis_arg(args, 1)?;
                let unit_name = match arg(args, 2).as_str() {
                    Some(u) if !u.is_empty() => u.to_string(),
                    _ => "millisecond".to_string(),
                };
                let precise = arg(args, 3).as_bool().unwrap_or(false);
                Ok(json!(diff(a, b, &unit_name, precise)?))
            }
            "startOf" => {
                let dt = millis_arg(args, 0)?;
                Ok(json!(start_of(dt, &arg_text(args, 1))?.timestamp_millis()))
            }
            other => Err(unknown_function("moment", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        parse(s, None).unwrap()
    }

    #[test]
    fn test_ordinals() {
        let days: Vec<String> = [1, 2, 3, 4, 11, 12, 13, 21, 22, 23, 31].into_iter().map(ordinal).collect();
        assert_eq!(
            days,
            vec!["1st", "2nd", "3rd", "4th", "11th", "12th", "13th", "21st", "22nd", "23rd", "31st"]
        );
    }

    #[test]
    fn test_format_tokens() {
        let dt = at("2024-03-05T07:08:09.123Z");
        assert_eq!(format(dt, "YYYY-MM-DD"), "2024-03-05");
        assert_eq!(format(dt, "D/M/YY H:mm"), "5/3/24 7:08");
        assert_eq!(format(dt, "[Today is] dddd"), "Today is Tuesday");
        assert_eq!(format(dt, "HH:mm:ss.SSS"), "07:08:09.123");
        assert_eq!(format(dt, "MMMM Do YYYY"), "March 5th 2024");
        assert_eq!(format(dt, DEFAULT_FORMAT), "2024-03-05T07:08:09+00:00");
    }

    #[test]
    fn test_parse_variants() {
        assert_eq!(at("2024-03-05").timestamp(), 1_709_596_800);
        assert_eq!(at("2024-03-05 10:00:00").hour(), 10);
        assert!(parse("not a date", None).is_none());

        let custom = parse("05/03/2024", Some("DD/MM/YYYY")).unwrap();
        assert_eq!(custom.month(), 3);
        assert_eq!(custom.day(), 5);
    }

    #[test]
    fn test_add_and_diff() {
        let start = at("2024-01-31T00:00:00Z");
        assert_eq!(format(add(start, 1, "month").unwrap(), "YYYY-MM-DD"), "2024-02-29");
        assert_eq!(format(add(start, -2, "days").unwrap(), "YYYY-MM-DD"), "2024-01-29");
        assert_eq!(format(add(start, 1, "y").unwrap(), "YYYY"), "2025");

        let later = at("2024-01-31T12:00:00Z");
        assert_eq!(diff(later, start, "hours", false).unwrap(), 12.0);
        assert_eq!(diff(later, start, "days", true).unwrap(), 0.5);
        assert_eq!(diff(at("2024-06-15"), at("2024-01-15"), "months", false).unwrap(), 5.0);
        assert!(add(start, 1, "fortnight").is_err());
    }

    #[test]
    fn test_start_of() {
        let dt = at("2024-03-05T07:08:09Z");
        assert_eq!(format(start_of(dt, "month").unwrap(), "YYYY-MM-DD HH:mm"), "2024-03-01 00:00");
        assert_eq!(format(start_of(dt, "hour").unwrap(), "HH:mm:ss"), "07:00:00");
    }

    #[test]
    fn test_module_dispatch() {
        let ms = DatesModule.call("parse", &[json!("2024-03-05")]).unwrap();
        let out = DatesModule.call("format", &[ms, json!("YYYY")]).unwrap();
        assert_eq!(out, json!("2024"));
        assert_eq!(DatesModule.call("parse", &[json!("garbage")]).unwrap(), Value::Null);
    }
}
