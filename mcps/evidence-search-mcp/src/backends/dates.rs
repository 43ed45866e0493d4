//! Date-range filter syntaxes
//!
//! Backends disagree on how a publication window is expressed. Some take two
//! absolute dates in their own encoding, others only a relative token. All
//! functions here work on the inclusive day span of a [`DateRange`]: the
//! first day of the start month through the last day of the end month.

use chrono::{Datelike, NaiveDate, NaiveTime};

use crate::types::DateRange;

/// Coarse relative window understood by token-only backends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelativeWindow {
    Day,
    Week,
    Month,
    Year,
}

impl RelativeWindow {
    /// Smallest window reaching back to the range start, if any fits
    pub fn covering(range: &DateRange, today: NaiveDate) -> Option<Self> {
        let age = (today - range.start_date()).num_days();
        match age {
            i64::MIN..=1 => Some(Self::Day),
            2..=7 => Some(Self::Week),
            8..=31 => Some(Self::Month),
            32..=366 => Some(Self::Year),
            _ => None,
        }
    }

    /// Single-letter form (`d`, `w`, `m`, `y`)
    pub fn letter(&self) -> &'static str {
        match self {
            Self::Day => "d",
            Self::Week => "w",
            Self::Month => "m",
            Self::Year => "y",
        }
    }

    /// Word form (`day`, `week`, `month`, `year`)
    pub fn word(&self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
            Self::Year => "year",
        }
    }
}

fn month_day_year(date: NaiveDate) -> String {
    format!("{}/{}/{}", date.month(), date.day(), date.year())
}

/// Google custom date range: `cdr:1,cd_min:M/D/YYYY,cd_max:M/D/YYYY`
pub fn google_tbs(range: &DateRange) -> String {
    format!(
        "cdr:1,cd_min:{},cd_max:{}",
        month_day_year(range.start_date()),
        month_day_year(range.end_date())
    )
}

fn days_since_epoch(date: NaiveDate) -> i64 {
    date.and_time(NaiveTime::MIN)
        .and_utc()
        .timestamp()
        .div_euclid(86_400)
}

/// Bing custom range filter, expressed in days since 1970-01-01
pub fn bing_filter(range: &DateRange) -> String {
    format!(
        "ex1:\"ez5_{}_{}\"",
        days_since_epoch(range.start_date()),
        days_since_epoch(range.end_date())
    )
}

/// Unix seconds covering the whole range, start of first day to end of last
pub fn unix_bounds(range: &DateRange) -> (i64, i64) {
    let start = range.start_date().and_time(NaiveTime::MIN).and_utc().timestamp();
    let end = range.end_date().and_time(NaiveTime::MIN).and_utc().timestamp() + 86_399;
    (start, end)
}

/// Baidu `gpc` parameter with absolute timestamps
pub fn baidu_gpc(range: &DateRange) -> String {
    let (start, end) = unix_bounds(range);
    format!("stf={},{}|stftype=1", start, end)
}

/// Yandex in-query date operator: `date:YYYYMMDD..YYYYMMDD`
pub fn yandex_operator(range: &DateRange) -> String {
    format!(
        "date:{}..{}",
        range.start_date().format("%Y%m%d"),
        range.end_date().format("%Y%m%d")
    )
}
