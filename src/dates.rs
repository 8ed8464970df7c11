//! Date and time parsing for free-text listing dates.
//!
//! Venue pages write dates every way imaginable: `"Sat, March 7th, 2026"`,
//! `"Mar 3 – 5, 2026"`, `"2026-03-05T19:30:00-05:00"`, `"3/5/2026 | 8pm"`.
//! [`parse_when`] runs a fixed list of regex patterns in priority order and
//! applies defaults for whatever the text leaves out.
//!
//! Defaults:
//! - no time: 10:00 to 17:00
//! - one time: the event lasts two hours
//! - no year: this year, or next year if the month has already passed

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use once_cell::sync::Lazy;
use regex::Regex;

const MONTHS: &str = "jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec";

static WEEKDAY_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(mon|tue|wed|thu|fri|sat|sun)[a-z]*\.?,?\s+").unwrap()
});
static ORDINAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\b(\d{1,2})(st|nd|rd|th)\b").unwrap());
static ISO_TIME: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d{4}-\d{2}-\d{2})[T ](\d{2}):(\d{2})\S*").unwrap());
static RANGE_SEP: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*[–—]\s*|\s+-\s+|(?i:\s+to\s+)").unwrap());

static TIME_RANGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(\d{1,2})(?::(\d{2}))?\s*([ap])?\.?m?\.?\s*(?:-|–|—|to)\s*(\d{1,2})(?::(\d{2}))?\s*([ap])\.?m\.?",
    )
    .unwrap()
});
static TIME_RANGE_24H: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(\d{1,2}):(\d{2})\s*(?:-|–|—|to)\s*(\d{1,2}):(\d{2})\b").unwrap()
});
static TIME_SINGLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(\d{1,2})(?::(\d{2}))?\s*(?:([ap])\.?m\b\.?)?").unwrap()
});

static ISO_DATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d{4})-(\d{1,2})-(\d{1,2})\b").unwrap());
static US_DATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d{1,2})/(\d{1,2})/(\d{2,4})\b").unwrap());
static DMY_DASH: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d{1,2})-(\d{1,2})-(\d{4})\b").unwrap());
static MONTH_DAY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)\b({MONTHS})[a-z]*\.?\s+(\d{{1,2}})\b(?:,?\s+(\d{{4}}))?"
    ))
    .unwrap()
});
static DAY_MONTH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)\b(\d{{1,2}})\s+({MONTHS})[a-z]*\.?(?:,?\s+(\d{{4}}))?"
    ))
    .unwrap()
});
static BARE_DAY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{1,2})(?:,?\s+(\d{4}))?$").unwrap());

/// Start and end of an event, in the venue's local time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct When {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

/// A calendar date with any component possibly missing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct PartialDate {
    year: Option<i32>,
    month: Option<u32>,
    day: u32,
}

impl PartialDate {
    fn resolve(self, today: NaiveDate) -> Option<NaiveDate> {
        let month = self.month?;
        let year = self.year.unwrap_or_else(|| infer_year(month, today));
        NaiveDate::from_ymd_opt(year, month, self.day)
    }
}

fn infer_year(month: u32, today: NaiveDate) -> i32 {
    if month < today.month() {
        today.year() + 1
    } else {
        today.year()
    }
}

fn month_number(name: &str) -> Option<u32> {
    let prefix: String = name.chars().take(3).flat_map(char::to_lowercase).collect();
    MONTHS
        .split('|')
        .position(|m| m == prefix)
        .map(|i| i as u32 + 1)
}

fn plausible_year(year: i32) -> Option<i32> {
    (2000..=2100).contains(&year).then_some(year)
}

fn full_year(raw: &str) -> Option<i32> {
    let y: i32 = raw.parse().ok()?;
    plausible_year(if raw.len() == 2 { 2000 + y } else { y })
}

/// Weekday prefix and ordinal suffixes removed, whitespace collapsed.
pub fn normalize_date_text(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let no_weekday = WEEKDAY_PREFIX.replace(&collapsed, "");
    ORDINAL.replace_all(&no_weekday, "$1").into_owned()
}

fn parse_day(text: &str) -> Option<PartialDate> {
    let text = text.trim().trim_matches(',').trim();
    if let Some(c) = ISO_DATE.captures(text) {
        return Some(PartialDate {
            year: full_year(&c[1]),
            month: c[2].parse().ok(),
            day: c[3].parse().ok()?,
        });
    }
    if let Some(c) = US_DATE.captures(text) {
        return Some(PartialDate {
            year: full_year(&c[3]),
            month: c[1].parse().ok(),
            day: c[2].parse().ok()?,
        });
    }
    if let Some(c) = DMY_DASH.captures(text) {
        return Some(PartialDate {
            year: full_year(&c[3]),
            month: c[2].parse().ok(),
            day: c[1].parse().ok()?,
        });
    }
    if let Some(c) = MONTH_DAY.captures(text) {
        return Some(PartialDate {
            year: c.get(3).and_then(|y| full_year(y.as_str())),
            month: month_number(&c[1]),
            day: c[2].parse().ok()?,
        });
    }
    if let Some(c) = DAY_MONTH.captures(text) {
        return Some(PartialDate {
            year: c.get(3).and_then(|y| full_year(y.as_str())),
            month: month_number(&c[2]),
            day: c[1].parse().ok()?,
        });
    }
    if let Some(c) = BARE_DAY.captures(text) {
        return Some(PartialDate {
            year: c.get(2).and_then(|y| full_year(y.as_str())),
            month: None,
            day: c[1].parse().ok()?,
        });
    }
    None
}

fn to_time(hour: &str, minute: Option<&str>, meridiem: Option<&str>) -> Option<NaiveTime> {
    let mut h: u32 = hour.parse().ok()?;
    let m: u32 = minute.map(str::parse).transpose().ok()?.unwrap_or(0);
    match meridiem.map(|s| s.to_ascii_lowercase()) {
        Some(p) if p == "p" && h < 12 => h += 12,
        Some(p) if p == "a" && h == 12 => h = 0,
        Some(_) if h > 12 => return None,
        _ => {}
    }
    NaiveTime::from_hms_opt(h, m, 0)
}

/// Start and optional end time found in `text`.
///
/// A bare number only counts as a time with a colon or an am/pm marker, so
/// the day in `"March 5"` is never read as 5 o'clock.
pub fn parse_times(text: &str) -> (Option<NaiveTime>, Option<NaiveTime>) {
    if let Some(c) = TIME_RANGE.captures(text) {
        let end_meridiem = c.get(6).map(|m| m.as_str());
        let start_meridiem = c.get(3).map(|m| m.as_str()).or(end_meridiem);
        let start = to_time(&c[1], c.get(2).map(|m| m.as_str()), start_meridiem);
        let end = to_time(&c[4], c.get(5).map(|m| m.as_str()), end_meridiem);
        if start.is_some() {
            return (start, end);
        }
    }
    if let Some(c) = TIME_RANGE_24H.captures(text) {
        let start = to_time(&c[1], Some(&c[2]), None);
        let end = to_time(&c[3], Some(&c[4]), None);
        if start.is_some() {
            return (start, end);
        }
    }
    for c in TIME_SINGLE.captures_iter(text) {
        let minute = c.get(2).map(|m| m.as_str());
        let meridiem = c.get(3).map(|m| m.as_str());
        if minute.is_none() && meridiem.is_none() {
            continue;
        }
        if let Some(t) = to_time(&c[1], minute, meridiem) {
            return (Some(t), None);
        }
    }
    (None, None)
}

/// Split off a time expression embedded in the date text.
fn split_embedded_time(text: &str) -> (String, String) {
    if let Some(m) = TIME_RANGE.find(text).or_else(|| TIME_RANGE_24H.find(text)) {
        let rest = format!("{} {}", &text[..m.start()], &text[m.end()..]);
        return (rest, m.as_str().to_string());
    }
    for c in TIME_SINGLE.captures_iter(text) {
        if c.get(2).is_none() && c.get(3).is_none() {
            continue;
        }
        if let Some(m) = c.get(0) {
            let rest = format!("{} {}", &text[..m.start()], &text[m.end()..]);
            return (rest, m.as_str().to_string());
        }
    }
    (text.to_string(), String::new())
}

/// Parse listing date text (and optional separate time text) into a start
/// and end. `today` anchors year inference.
pub fn parse_when(date_text: &str, time_text: &str, today: NaiveDate) -> Option<When> {
    let mut text = normalize_date_text(date_text);
    let mut time_text = time_text.trim().to_string();

    if let Some(c) = ISO_TIME.captures(&text) {
        if time_text.is_empty() {
            time_text = format!("{}:{}", &c[2], &c[3]);
        }
        text = c[1].to_string();
    }
    if time_text.is_empty() {
        let (rest, embedded) = split_embedded_time(&text);
        text = rest;
        time_text = embedded;
    }

    let mut parts = RANGE_SEP.splitn(text.trim(), 2);
    let first = parts.next().unwrap_or_default();
    let second = parts.next();

    let mut start = parse_day(first)?;
    let mut end = second.and_then(parse_day).unwrap_or(start);
    let end_had_year = end.year.is_some();
    start.month = start.month.or(end.month);
    end.month = end.month.or(start.month);
    if start.year.is_none() {
        // "Dec 30 – Jan 2, 2027" starts the year before.
        let crosses_year = matches!((start.month, end.month), (Some(s), Some(e)) if s > e);
        start.year = end.year.map(|y| if crosses_year { y - 1 } else { y });
    }
    end.year = end.year.or(start.year);

    let start_day = start.resolve(today)?;
    let end_day = match end.resolve(today) {
        // An inferred end year that lands before the start wraps forward.
        Some(d) if d < start_day && !end_had_year && d.month() < start_day.month() => {
            d.with_year(d.year() + 1).unwrap_or(start_day)
        }
        Some(d) if d >= start_day => d,
        _ => start_day,
    };

    let (start_time, end_time) = parse_times(&time_text);
    let (start, end) = match (start_time, end_time) {
        (Some(st), Some(et)) => {
            let start = start_day.and_time(st);
            let end = end_day.and_time(et);
            (start, if end > start { end } else { start + Duration::hours(2) })
        }
        (Some(st), None) => (start_day.and_time(st), end_day.and_time(st) + Duration::hours(2)),
        (None, _) => (
            start_day.and_hms_opt(10, 0, 0)?,
            end_day.and_hms_opt(17, 0, 0)?,
        ),
    };
    Some(When { start, end })
}

/// True when the text carries an explicit four-digit year.
pub fn has_full_year(text: &str) -> bool {
    static YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(19|20)\d{2}\b").unwrap());
    YEAR.is_match(text)
}
