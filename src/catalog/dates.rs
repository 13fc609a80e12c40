use crate::catalog::types::CellValue;
use chrono::{DateTime, Datelike, Local, NaiveDate, NaiveDateTime, Timelike};

pub const DEFAULT_DATE_FORMAT: &str = "isoDate";

const WEEKDAYS: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

const MONTHS: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

/// Display format for date cells, expressed as a dateformat-style mask
/// (`yyyy-mm-dd`, `mmm d, yyyy`, ...) or one of the named masks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateFormat {
    mask: String,
}

impl DateFormat {
    pub fn new(spec: &str) -> Self {
        let mask = named_mask(spec).unwrap_or(spec);
        Self {
            mask: mask.to_string(),
        }
    }

    pub fn mask(&self) -> &str {
        &self.mask
    }

    pub fn format(&self, value: &NaiveDateTime) -> String {
        render_mask(&self.mask, value)
    }
}

impl Default for DateFormat {
    fn default() -> Self {
        Self::new(DEFAULT_DATE_FORMAT)
    }
}

fn named_mask(name: &str) -> Option<&'static str> {
    let mask = match name {
        "default" => "ddd mmm dd yyyy HH:MM:ss",
        "shortDate" => "m/d/yy",
        "paddedShortDate" => "mm/dd/yyyy",
        "mediumDate" => "mmm d, yyyy",
        "longDate" => "mmmm d, yyyy",
        "fullDate" => "dddd, mmmm d, yyyy",
        "shortTime" => "h:MM TT",
        "mediumTime" => "h:MM:ss TT",
        "longTime" => "h:MM:ss TT",
        "isoDate" => "yyyy-mm-dd",
        "isoTime" => "HH:MM:ss",
        "isoDateTime" => "yyyy-mm-dd'T'HH:MM:ss",
        _ => return None,
    };
    Some(mask)
}

fn run_length(chars: &[char], start: usize, max: usize) -> usize {
    let c = chars[start];
    let mut len = 1;
    while len < max && start + len < chars.len() && chars[start + len] == c {
        len += 1;
    }
    len
}

fn render_mask(mask: &str, value: &NaiveDateTime) -> String {
    let chars: Vec<char> = mask.chars().collect();
    let mut out = String::with_capacity(mask.len() + 8);
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            '\'' | '"' => match chars[i + 1..].iter().position(|&q| q == c) {
                Some(offset) => {
                    out.extend(&chars[i + 1..i + 1 + offset]);
                    i += offset + 2;
                }
                None => {
                    out.push(c);
                    i += 1;
                }
            },
            'd' => {
                let len = run_length(&chars, i, 4);
                let weekday = value.weekday().num_days_from_monday() as usize;
                match len {
                    1 => out.push_str(&value.day().to_string()),
                    2 => out.push_str(&format!("{:02}", value.day())),
                    3 => out.push_str(&WEEKDAYS[weekday][..3]),
                    _ => out.push_str(WEEKDAYS[weekday]),
                }
                i += len;
            }
            'm' => {
                let len = run_length(&chars, i, 4);
                let month = value.month0() as usize;
                match len {
                    1 => out.push_str(&value.month().to_string()),
                    2 => out.push_str(&format!("{:02}", value.month())),
                    3 => out.push_str(&MONTHS[month][..3]),
                    _ => out.push_str(MONTHS[month]),
                }
                i += len;
            }
            'y' => {
                let len = run_length(&chars, i, 4);
                if len == 4 {
                    out.push_str(&format!("{:04}", value.year()));
                    i += 4;
                } else if len >= 2 {
                    out.push_str(&format!("{:02}", value.year().rem_euclid(100)));
                    i += 2;
                } else {
                    out.push(c);
                    i += 1;
                }
            }
            'H' | 'h' | 'M' | 's' | 'T' | 't' => {
                let len = run_length(&chars, i, 2);
                out.push_str(&time_field(c, len == 2, value));
                i += len;
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }
    out
}

fn time_field(token: char, padded: bool, value: &NaiveDateTime) -> String {
    let pad = |n: u32| {
        if padded {
            format!("{n:02}")
        } else {
            n.to_string()
        }
    };
    let hour = value.hour();
    match token {
        'H' => pad(hour),
        'h' => pad(if hour % 12 == 0 { 12 } else { hour % 12 }),
        'M' => pad(value.minute()),
        's' => pad(value.second()),
        'T' => match (hour < 12, padded) {
            (true, true) => "AM".to_string(),
            (true, false) => "A".to_string(),
            (false, true) => "PM".to_string(),
            (false, false) => "P".to_string(),
        },
        _ => match (hour < 12, padded) {
            (true, true) => "am".to_string(),
            (true, false) => "a".to_string(),
            (false, true) => "pm".to_string(),
            (false, false) => "p".to_string(),
        },
    }
}

const DATETIME_PATTERNS: [&str; 7] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%a %b %d %Y %H:%M:%S",
];

const DATE_PATTERNS: [&str; 10] = [
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%y",
    "%m/%d/%Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%A, %B %d, %Y",
    "%a, %b %d, %Y",
    "%a %b %d %Y",
    "%d %B %Y",
];

/// Parses a date cell the way a browser `Date` constructor would for the
/// common shapes: ISO dates and datetimes (with or without offset), US
/// slash dates and spelled-out month names.
pub fn parse_date(input: &str) -> Option<NaiveDateTime> {
    let s = input.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Local).naive_local());
    }
    for pattern in DATETIME_PATTERNS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, pattern) {
            return Some(dt);
        }
    }
    for pattern in DATE_PATTERNS {
        if let Ok(date) = NaiveDate::parse_from_str(s, pattern) {
            return date.and_hms_opt(0, 0, 0);
        }
    }
    None
}

/// Interprets a cell as a date: text is parsed, numbers are epoch millis.
pub fn cell_date(value: &CellValue) -> Option<NaiveDateTime> {
    match value {
        CellValue::Text(s) => parse_date(s),
        CellValue::Number(n) if n.is_finite() => {
            DateTime::from_timestamp_millis(*n as i64).map(|dt| dt.naive_utc())
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::{DateFormat, cell_date, parse_date};
    use crate::catalog::types::CellValue;
    use chrono::{NaiveDate, NaiveDateTime};

    fn at(y: i32, m: u32, d: u32, hh: u32, mm: u32, ss: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .expect("date")
            .and_hms_opt(hh, mm, ss)
            .expect("time")
    }

    #[test]
    fn named_masks_resolve() {
        let when = at(2024, 3, 7, 14, 5, 9);
        assert_eq!(DateFormat::new("isoDate").format(&when), "2024-03-07");
        assert_eq!(DateFormat::new("shortDate").format(&when), "3/7/24");
        assert_eq!(DateFormat::new("mediumDate").format(&when), "Mar 7, 2024");
        assert_eq!(
            DateFormat::new("fullDate").format(&when),
            "Thursday, March 7, 2024"
        );
        assert_eq!(
            DateFormat::new("isoDateTime").format(&when),
            "2024-03-07T14:05:09"
        );
        assert_eq!(DateFormat::new("shortTime").format(&when), "2:05 PM");
    }

    #[test]
    fn custom_masks_keep_literals() {
        let when = at(2024, 12, 25, 0, 30, 0);
        assert_eq!(
            DateFormat::new("dd.mm.yyyy 'at' hh:MM tt").format(&when),
            "25.12.2024 at 12:30 am"
        );
        assert_eq!(DateFormat::new("ddd, yyy").format(&when), "Wed, 24y");
    }

    #[test]
    fn parse_accepts_common_shapes() {
        let expected = at(2024, 1, 15, 0, 0, 0);
        assert_eq!(parse_date("2024-01-15"), Some(expected));
        assert_eq!(parse_date("1/15/2024"), Some(expected));
        assert_eq!(parse_date("01/15/24"), Some(expected));
        assert_eq!(parse_date("January 15, 2024"), Some(expected));
        assert_eq!(parse_date("Jan 15, 2024"), Some(expected));
        assert_eq!(
            parse_date("2024-01-15T08:30:00"),
            Some(at(2024, 1, 15, 8, 30, 0))
        );
        assert_eq!(parse_date("not a date"), None);
        assert_eq!(parse_date("   "), None);
    }

    #[test]
    fn numbers_are_epoch_millis() {
        let parsed = cell_date(&CellValue::Number(86_400_000.0)).expect("epoch date");
        assert_eq!(parsed, at(1970, 1, 2, 0, 0, 0));
        assert_eq!(cell_date(&CellValue::Bool(true)), None);
    }
}
